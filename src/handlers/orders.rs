use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    errors::ServiceError,
    services::{
        Actor, CheckoutRequest, OrderTriple, SellerOrderRequest, StatusChange, StatusTarget,
    },
    ApiResponse, AppState,
};

/// Body of the seller status endpoints
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StatusUpdateRequest {
    #[schema(example = "shipped")]
    pub status: String,
}

/// Place an order as the signed-in purchaser
#[utoipa::path(
    post,
    path = "/api/v1/orders/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 201, description = "Order and payment created", body = ApiResponse<OrderTriple>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Item not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn checkout(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderTriple>>), ServiceError> {
    let purchaser = auth_user.purchaser()?;
    let triple = state.services.checkout.checkout(&purchaser, payload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(triple))))
}

/// Orders placed by the signed-in purchaser with any seller
#[utoipa::path(
    get,
    path = "/api/v1/orders/my-orders",
    responses(
        (status = 200, description = "Purchaser order history", body = ApiResponse<Vec<OrderTriple>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn my_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<Vec<OrderTriple>>>, ServiceError> {
    let purchaser = auth_user.purchaser()?;
    let orders = state.services.queries.orders_for_purchaser(&purchaser).await?;
    Ok(Json(ApiResponse::success(orders)))
}

/// Confirm a shipped order arrived
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/received",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order completed", body = ApiResponse<OrderTriple>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order is not shipped", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn mark_received(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderTriple>>, ServiceError> {
    let actor = Actor::Purchaser(auth_user.purchaser()?);
    let triple = state
        .services
        .status
        .apply_status_change(&actor, id, StatusChange::MarkReceived)
        .await?;
    Ok(Json(ApiResponse::success(triple)))
}

/// Withdraw an order that has not been paid or shipped
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Order and payment removed"),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<StatusCode, ServiceError> {
    let purchaser = auth_user.purchaser()?;
    state.services.cancellation.cancel(&purchaser, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Record an order on behalf of one of the seller's customers
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = SellerOrderRequest,
    responses(
        (status = 201, description = "Order and payment created", body = ApiResponse<OrderTriple>),
        (status = 403, description = "Forbidden", body = crate::errors::ErrorResponse),
        (status = 404, description = "Customer or item not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(payload): Json<SellerOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderTriple>>), ServiceError> {
    let seller_id = auth_user.seller_id()?;
    let triple = state
        .services
        .checkout
        .create_seller_order(seller_id, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(triple))))
}

/// Get an order with its payment and shipping records
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderTriple>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
) -> Result<Json<ApiResponse<OrderTriple>>, ServiceError> {
    let actor = Actor::Seller(auth_user.seller_id()?);
    let triple = state.services.queries.order_triple(&actor, id).await?;
    Ok(Json(ApiResponse::success(triple)))
}

/// Change an order's status; payment and shipping follow
#[utoipa::path(
    put,
    path = "/api/v1/orders/{id}/status",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = StatusUpdateRequest,
    responses(
        (status = 200, description = "Status applied", body = ApiResponse<OrderTriple>),
        (status = 400, description = "Unknown status", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 422, description = "Transition not allowed", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    auth_user: AuthUser,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<Json<ApiResponse<OrderTriple>>, ServiceError> {
    let actor = Actor::Seller(auth_user.seller_id()?);
    let change = StatusChange::parse(StatusTarget::Order, &payload.status)?;
    let triple = state
        .services
        .status
        .apply_status_change(&actor, id, change)
        .await?;
    Ok(Json(ApiResponse::success(triple)))
}
