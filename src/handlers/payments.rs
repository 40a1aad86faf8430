use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::payment::{self, PaymentStatus},
    errors::ServiceError,
    handlers::orders::StatusUpdateRequest,
    services::{Actor, AttachPaymentRequest, OrderTriple},
    ApiResponse, AppState,
};

/// Attach a payment to an order that has none
#[utoipa::path(
    post,
    path = "/api/v1/payments",
    request_body = AttachPaymentRequest,
    responses(
        (status = 201, description = "Payment created", body = ApiResponse<payment::Model>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already has a payment", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
pub async fn attach_payment(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<AttachPaymentRequest>,
) -> Result<(StatusCode, Json<ApiResponse<payment::Model>>), ServiceError> {
    let seller_id = auth_user.seller_id()?;
    let payment = state.services.payments.attach_payment(seller_id, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(payment))))
}

/// Change a payment's status; the order follows
#[utoipa::path(
    put,
    path = "/api/v1/payments/{id}/status",
    params(("id" = Uuid, Path, description = "Payment ID")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status applied", body = ApiResponse<OrderTriple>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "payments"
)]
pub async fn update_payment_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<OrderTriple>>, ServiceError> {
    let actor = Actor::Seller(auth_user.seller_id()?);
    let status: PaymentStatus = payload.status.parse()?;
    let triple = state.services.status.apply_to_payment(&actor, id, status).await?;
    Ok(Json(ApiResponse::success(triple)))
}
