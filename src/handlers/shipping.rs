use axum::{
    extract::{Path, State},
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::shipping::{self, ShippingStatus},
    errors::ServiceError,
    handlers::orders::StatusUpdateRequest,
    services::{Actor, OrderTriple},
    ApiResponse, AppState,
};

/// The seller's shipments that have not been delivered yet
#[utoipa::path(
    get,
    path = "/api/v1/shipping",
    responses(
        (status = 200, description = "Open shipments", body = ApiResponse<Vec<shipping::Model>>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "shipping"
)]
pub async fn list_open_shipments(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<shipping::Model>>>, ServiceError> {
    let seller_id = auth_user.seller_id()?;
    let shipments = state.services.queries.open_shipments(seller_id).await?;
    Ok(Json(ApiResponse::success(shipments)))
}

/// Change a shipping record's status; order and payment follow
#[utoipa::path(
    put,
    path = "/api/v1/shipping/{id}/status",
    params(("id" = Uuid, Path, description = "Shipping record ID")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status applied", body = ApiResponse<OrderTriple>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Shipping record not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "shipping"
)]
pub async fn update_shipping_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<OrderTriple>>, ServiceError> {
    let actor = Actor::Seller(auth_user.seller_id()?);
    let status: ShippingStatus = payload.status.parse()?;
    let triple = state.services.status.apply_to_shipping(&actor, id, status).await?;
    Ok(Json(ApiResponse::success(triple)))
}
