/*!
 * # Authentication boundary
 *
 * Bearer tokens are HS256 JWTs issued by the account service. This module
 * only verifies them and turns the claims into the two identities the order
 * flows understand:
 *
 * - a [`Purchaser`] (any authenticated user with an email)
 * - a seller id (users holding the `admin` role)
 */

use crate::{config::AppConfig, errors::ServiceError, services::Purchaser};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Role carried by seller accounts
pub const SELLER_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Subject (user ID)
    pub name: Option<String>,  // Display name
    pub email: Option<String>, // Login email
    #[serde(default)]
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r.eq_ignore_ascii_case(role))
    }

    /// The seller this user acts for. Sellers are identified by their user id.
    pub fn seller_id(&self) -> Result<Uuid, ServiceError> {
        if self.has_role(SELLER_ROLE) {
            Ok(self.user_id)
        } else {
            Err(ServiceError::Forbidden(
                "seller access requires the admin role".to_string(),
            ))
        }
    }

    /// The purchaser identity used at checkout and in self-service flows.
    /// Falls back to the email's local part when the token has no name.
    pub fn purchaser(&self) -> Result<Purchaser, ServiceError> {
        let email = self
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("token carries no email".to_string()))?;
        let display_name = match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => email.split('@').next().unwrap_or(email).to_string(),
        };
        Ok(Purchaser::new(email, display_name))
    }
}

/// Verifies `token` against `secret` and returns its claims
pub fn decode_token(token: &str, secret: &str) -> Result<Claims, ServiceError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        ServiceError::Unauthorized("invalid or expired token".to_string())
    })?;
    Ok(data.claims)
}

/// Signs a token for the given identity. Used by the seed tooling and tests;
/// interactive login lives in the account service.
pub fn issue_token(
    secret: &str,
    user_id: Uuid,
    name: &str,
    email: &str,
    roles: &[&str],
    ttl: Duration,
) -> Result<String, ServiceError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        name: Some(name.to_string()),
        email: Some(email.to_string()),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        iat: now.timestamp(),
        exp: (now + ttl).timestamp(),
    };
    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
}

impl TryFrom<Claims> for AuthUser {
    type Error = ServiceError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("token subject is not a user id".to_string()))?;
        Ok(AuthUser {
            user_id,
            name: claims.name,
            email: claims.email,
            roles: claims.roles,
        })
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    Arc<AppConfig>: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = Arc::<AppConfig>::from_ref(state);
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("missing bearer token".to_string()))?;

        decode_token(token, &config.jwt_secret)?.try_into()
    }
}
