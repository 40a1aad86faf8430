mod common;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use assert_matches::assert_matches;
use common::{purchaser, TestApp};
use marketmate_api::{
    entities::{order::OrderStatus, payment::PaymentStatus, shipping::ShippingStatus},
    errors::ServiceError,
    services::{
        codes::{CodeGenerator, CodeKind, RandomCodeGenerator},
        Actor, CheckoutRequest, OrderTriple, StatusChange,
    },
};
use rust_decimal_macros::dec;
use uuid::Uuid;

/// Hands out the same shipping code every time, so a second shipment always collides.
#[derive(Debug)]
struct RepeatingShippingCodes;

impl CodeGenerator for RepeatingShippingCodes {
    fn generate(&self, kind: CodeKind) -> String {
        match kind {
            CodeKind::Shipping => "SHP-000000000001".to_string(),
            other => RandomCodeGenerator.generate(other),
        }
    }
}

/// Repeats the first shipping code once, then falls back to random codes.
#[derive(Debug, Default)]
struct OneShippingCollision {
    issued: AtomicUsize,
}

impl CodeGenerator for OneShippingCollision {
    fn generate(&self, kind: CodeKind) -> String {
        match kind {
            CodeKind::Shipping if self.issued.fetch_add(1, Ordering::SeqCst) < 2 => {
                "SHP-00000000000A".to_string()
            }
            other => RandomCodeGenerator.generate(other),
        }
    }
}

async fn checkout_one(app: &TestApp, seller_id: Uuid, email: &str) -> OrderTriple {
    let item = app.seed_item(seller_id, dec!(78000.00)).await;
    app.state
        .services
        .checkout
        .checkout(
            &purchaser(email),
            CheckoutRequest {
                item_id: item.id,
                quantity: 2,
                payment_method: Some("Cash on Delivery".to_string()),
                shipping_method: None,
            },
        )
        .await
        .expect("checkout succeeds")
}

fn statuses(triple: &OrderTriple) -> (OrderStatus, Option<PaymentStatus>, Option<ShippingStatus>) {
    (
        triple.order.status,
        triple.payment.as_ref().map(|p| p.status),
        triple.shipping.as_ref().map(|s| s.status),
    )
}

#[tokio::test]
async fn checkout_ship_and_receive_walks_the_full_table() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();

    let placed = checkout_one(&app, seller_id, "juan@example.com").await;
    assert_eq!(statuses(&placed), (OrderStatus::Pending, Some(PaymentStatus::Pending), None));
    assert_eq!(placed.payment.as_ref().unwrap().amount, dec!(156000.00));
    assert_eq!(app.count_shipping().await, 0);

    let seller = Actor::Seller(seller_id);
    let shipped = engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    assert_eq!(
        statuses(&shipped),
        (OrderStatus::Shipped, Some(PaymentStatus::Pending), Some(ShippingStatus::Shipped))
    );
    let record = shipped.shipping.as_ref().unwrap();
    assert!(record.shipping_code.starts_with("SHP-"));
    assert_eq!(record.courier, app.defaults().default_courier);
    assert_eq!(record.address, app.defaults().placeholder_address);

    // Shipping again updates in place
    let again = engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    assert_eq!(again.shipping.as_ref().unwrap().id, record.id);
    assert_eq!(app.count_shipping().await, 1);

    let buyer = Actor::Purchaser(purchaser("juan@example.com"));
    let received = engine
        .apply_status_change(&buyer, placed.order.id, StatusChange::MarkReceived)
        .await
        .unwrap();
    assert_eq!(
        statuses(&received),
        (OrderStatus::Completed, Some(PaymentStatus::Paid), Some(ShippingStatus::Delivered))
    );
}

#[tokio::test]
async fn delivering_a_shipment_forces_payment_paid() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let seller = Actor::Seller(seller_id);

    let placed = checkout_one(&app, seller_id, "ana@example.com").await;
    let shipped = engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    let shipping_id = shipped.shipping.unwrap().id;

    let delivered = engine
        .apply_to_shipping(&seller, shipping_id, ShippingStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(
        statuses(&delivered),
        (OrderStatus::Completed, Some(PaymentStatus::Paid), Some(ShippingStatus::Delivered))
    );
}

#[tokio::test]
async fn paying_promotes_the_order_and_leaves_shipping_alone() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let seller = Actor::Seller(seller_id);

    let placed = checkout_one(&app, seller_id, "ben@example.com").await;
    let payment_id = placed.payment.as_ref().unwrap().id;

    let paid = engine
        .apply_to_payment(&seller, payment_id, PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(statuses(&paid), (OrderStatus::Paid, Some(PaymentStatus::Paid), None));

    let shipped = engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    assert_eq!(
        statuses(&shipped),
        (OrderStatus::Shipped, Some(PaymentStatus::Paid), Some(ShippingStatus::Shipped))
    );
}

#[tokio::test]
async fn completing_an_unshipped_order_changes_nothing() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let queries = app.state.services.queries.clone();
    let seller = Actor::Seller(seller_id);

    let placed = checkout_one(&app, seller_id, "carla@example.com").await;

    assert_matches!(
        engine
            .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Completed))
            .await,
        Err(ServiceError::InvalidState(_))
    );
    assert_matches!(
        engine
            .apply_status_change(
                &Actor::Purchaser(purchaser("carla@example.com")),
                placed.order.id,
                StatusChange::MarkReceived
            )
            .await,
        Err(ServiceError::InvalidState(_))
    );

    let after = queries.order_triple(&seller, placed.order.id).await.unwrap();
    assert_eq!(statuses(&after), statuses(&placed));
    assert_eq!(app.count_shipping().await, 0);
}

#[tokio::test]
async fn shipping_writes_require_an_existing_record() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let placed = checkout_one(&app, seller_id, "dina@example.com").await;

    assert_matches!(
        app.state
            .services
            .status
            .apply_status_change(
                &Actor::Seller(seller_id),
                placed.order.id,
                StatusChange::Shipping(ShippingStatus::Delivered)
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.state
            .services
            .status
            .apply_to_shipping(&Actor::Seller(seller_id), Uuid::new_v4(), ShippingStatus::Shipped)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn other_sellers_and_purchasers_cannot_see_the_order() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let placed = checkout_one(&app, seller_id, "eli@example.com").await;

    assert_matches!(
        engine
            .apply_status_change(
                &Actor::Seller(Uuid::new_v4()),
                placed.order.id,
                StatusChange::Order(OrderStatus::Shipped)
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        engine
            .apply_status_change(
                &Actor::Purchaser(purchaser("stranger@example.com")),
                placed.order.id,
                StatusChange::MarkReceived
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        engine
            .apply_to_payment(
                &Actor::Seller(Uuid::new_v4()),
                placed.payment.as_ref().unwrap().id,
                PaymentStatus::Paid
            )
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn completed_orders_accept_no_further_changes() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let seller = Actor::Seller(seller_id);
    let placed = checkout_one(&app, seller_id, "fe@example.com").await;

    engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Completed))
        .await
        .unwrap();

    assert_matches!(
        engine
            .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
            .await,
        Err(ServiceError::InvalidState(_))
    );
}

#[tokio::test]
async fn repeated_delivery_and_payment_on_completed_orders_are_no_ops() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let seller = Actor::Seller(seller_id);
    let placed = checkout_one(&app, seller_id, "again@example.com").await;
    let payment_id = placed.payment.as_ref().unwrap().id;

    let shipped = engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    let shipping_id = shipped.shipping.unwrap().id;
    engine
        .apply_to_shipping(&seller, shipping_id, ShippingStatus::Delivered)
        .await
        .unwrap();

    let redelivered = engine
        .apply_to_shipping(&seller, shipping_id, ShippingStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(
        statuses(&redelivered),
        (OrderStatus::Completed, Some(PaymentStatus::Paid), Some(ShippingStatus::Delivered))
    );

    let repaid = engine
        .apply_to_payment(&seller, payment_id, PaymentStatus::Paid)
        .await
        .unwrap();
    assert_eq!(statuses(&repaid), statuses(&redelivered));
    assert_eq!(app.count_shipping().await, 1);
}

#[tokio::test]
async fn a_failed_cascade_leaves_every_record_untouched() {
    let app = TestApp::with_codes(Arc::new(RepeatingShippingCodes)).await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let seller = Actor::Seller(seller_id);
    let first = checkout_one(&app, seller_id, "first@example.com").await;
    let second = checkout_one(&app, seller_id, "second@example.com").await;

    engine
        .apply_status_change(&seller, first.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    assert_matches!(
        engine
            .apply_status_change(&seller, second.order.id, StatusChange::Order(OrderStatus::Shipped))
            .await,
        Err(ServiceError::Conflict(_))
    );

    let after = app
        .state
        .services
        .queries
        .order_triple(&seller, second.order.id)
        .await
        .unwrap();
    assert_eq!(statuses(&after), (OrderStatus::Pending, Some(PaymentStatus::Pending), None));
    assert_eq!(app.count_shipping().await, 1);
}

#[tokio::test]
async fn a_shipping_code_collision_is_retried_with_a_fresh_code() {
    let app = TestApp::with_codes(Arc::new(OneShippingCollision::default())).await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let seller = Actor::Seller(seller_id);
    let first = checkout_one(&app, seller_id, "one@example.com").await;
    let second = checkout_one(&app, seller_id, "two@example.com").await;

    let a = engine
        .apply_status_change(&seller, first.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    let b = engine
        .apply_status_change(&seller, second.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();

    let code_a = &a.shipping.as_ref().unwrap().shipping_code;
    let code_b = &b.shipping.as_ref().unwrap().shipping_code;
    assert_eq!(code_a, "SHP-00000000000A");
    assert_ne!(code_a, code_b);
    assert!(code_b.starts_with("SHP-"));
    assert_eq!(app.count_shipping().await, 2);
}

#[tokio::test]
async fn shipment_working_set_and_review_eligibility_follow_the_lifecycle() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let engine = app.state.services.status.clone();
    let queries = app.state.services.queries.clone();
    let seller = Actor::Seller(seller_id);
    let buyer = purchaser("gia@example.com");

    let placed = checkout_one(&app, seller_id, "gia@example.com").await;
    assert!(!queries.review_eligibility(&buyer, placed.order.item_id).await.unwrap());

    engine
        .apply_status_change(&seller, placed.order.id, StatusChange::Order(OrderStatus::Shipped))
        .await
        .unwrap();
    assert_eq!(queries.open_shipments(seller_id).await.unwrap().len(), 1);
    assert!(queries.open_shipments(Uuid::new_v4()).await.unwrap().is_empty());

    engine
        .apply_status_change(&Actor::Purchaser(buyer.clone()), placed.order.id, StatusChange::MarkReceived)
        .await
        .unwrap();
    assert!(queries.open_shipments(seller_id).await.unwrap().is_empty());
    assert!(queries.review_eligibility(&buyer, placed.order.item_id).await.unwrap());
    assert!(!queries
        .review_eligibility(&purchaser("other@example.com"), placed.order.item_id)
        .await
        .unwrap());
}
