/*!
 * # Health Check Module
 *
 * - `/health` reports liveness and build version
 * - `/health/ready` additionally pings the database
 */

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::db::{check_connection, DbPool};

/// Basic health status
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Up,
    Down,
}

/// Liveness: the process is serving requests
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": HealthStatus::Up,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness: the database answers
pub async fn readiness_check(State(db): State<Arc<DbPool>>) -> impl IntoResponse {
    let status = match check_connection(&db).await {
        Ok(()) => HealthStatus::Up,
        Err(e) => {
            warn!(error = %e, "readiness check failed");
            HealthStatus::Down
        }
    };
    let code = match status {
        HealthStatus::Up => StatusCode::OK,
        HealthStatus::Down => StatusCode::SERVICE_UNAVAILABLE,
    };

    (
        code,
        Json(json!({
            "ready": status == HealthStatus::Up,
            "database": status,
            "timestamp": Utc::now().to_rfc3339(),
        })),
    )
}

pub fn health_routes(db_pool: Arc<DbPool>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .with_state(db_pool)
}
