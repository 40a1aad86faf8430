use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MarketMate API",
        version = "0.1.0",
        description = r#"
# MarketMate seller back-office API

Orders move from checkout to completion with their payment and shipping
records kept in step. Every status change made through any of the order,
payment or shipping endpoints produces one of these combinations:

| Order | Payment | Shipping |
|---|---|---|
| pending / new | pending | none |
| paid | paid | none |
| shipped | pending / paid | shipped |
| completed | paid | delivered |

## Authentication

Send a bearer JWT in the `Authorization` header. Seller endpoints require the
`admin` role.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "orders", description = "Checkout, order history and order status"),
        (name = "payments", description = "Payment records"),
        (name = "shipping", description = "Shipping records"),
        (name = "reviews", description = "Review eligibility")
    ),
    paths(
        crate::handlers::orders::checkout,
        crate::handlers::orders::my_orders,
        crate::handlers::orders::mark_received,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::payments::attach_payment,
        crate::handlers::payments::update_payment_status,
        crate::handlers::shipping::list_open_shipments,
        crate::handlers::shipping::update_shipping_status,
        crate::handlers::reviews::review_eligibility,
    ),
    components(
        schemas(
            crate::services::CheckoutRequest,
            crate::services::SellerOrderRequest,
            crate::services::AttachPaymentRequest,
            crate::services::OrderTriple,
            crate::handlers::orders::StatusUpdateRequest,
            crate::handlers::reviews::ReviewEligibility,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub async fn openapi_json() -> axum::Json<utoipa::openapi::OpenApi> {
    axum::Json(ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_lifecycle_routes_and_bearer_scheme() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("MarketMate API"));
        assert!(json.contains("/api/v1/orders/checkout"));
        assert!(json.contains("/api/v1/shipping/{id}/status"));
        assert!(json.contains("bearer_auth"));
    }
}
