use axum::{
    extract::{Query, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{auth::AuthUser, errors::ServiceError, ApiResponse, AppState};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct EligibilityQuery {
    pub item_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReviewEligibility {
    pub item_id: Uuid,
    pub eligible: bool,
}

/// Whether the purchaser may review an item (requires a completed order)
#[utoipa::path(
    get,
    path = "/api/v1/reviews/eligibility",
    params(EligibilityQuery),
    responses(
        (status = 200, description = "Eligibility computed", body = ApiResponse<ReviewEligibility>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "reviews"
)]
pub async fn review_eligibility(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<EligibilityQuery>,
) -> Result<Json<ApiResponse<ReviewEligibility>>, ServiceError> {
    let purchaser = auth_user.purchaser()?;
    let eligible = state
        .services
        .queries
        .review_eligibility(&purchaser, query.item_id)
        .await?;
    Ok(Json(ApiResponse::success(ReviewEligibility {
        item_id: query.item_id,
        eligible,
    })))
}
