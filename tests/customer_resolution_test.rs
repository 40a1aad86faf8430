mod common;

use common::{purchaser, TestApp};
use marketmate_api::entities::customer::CustomerStatus;
use uuid::Uuid;

// The test pool holds a single connection, so these resolves run one after
// the other; the lost-insert path is covered by the test below.
#[tokio::test]
async fn repeated_resolution_with_differently_cased_email_yields_one_customer() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let resolver = app.state.services.customers.clone();

    let first = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve(&purchaser("race@example.com"), seller_id).await })
    };
    let second = {
        let resolver = resolver.clone();
        tokio::spawn(async move { resolver.resolve(&purchaser("RACE@example.com"), seller_id).await })
    };

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();
    assert_eq!(a.id, b.id);
    assert_eq!(app.count_customers().await, 1);
}

#[tokio::test]
async fn losing_an_insert_race_returns_the_existing_row() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let resolver = app.state.services.customers.clone();
    let buyer = purchaser("late@example.com");

    let winner = resolver.resolve(&buyer, seller_id).await.unwrap();

    // Skip the lookup and go straight to the insert, as a racing caller would
    let resolved = resolver
        .insert_or_find(&*app.state.db, &buyer, seller_id)
        .await
        .unwrap();
    assert!(!resolved.created);
    assert_eq!(resolved.customer.id, winner.id);
    assert_eq!(app.count_customers().await, 1);
}

#[tokio::test]
async fn implicit_customers_are_active_with_placeholder_address() {
    let app = TestApp::new().await;
    let seller_id = Uuid::new_v4();
    let customer = app
        .state
        .services
        .customers
        .resolve(&purchaser("new@example.com"), seller_id)
        .await
        .unwrap();

    assert_eq!(customer.status, CustomerStatus::Active);
    assert_eq!(customer.name, "Juan Dela Cruz");
    assert_eq!(customer.email, "new@example.com");
    assert_eq!(customer.address, app.defaults().placeholder_address);
    assert!(customer.customer_code.starts_with("CUST-"));
}

#[tokio::test]
async fn the_same_purchaser_gets_one_customer_per_seller() {
    let app = TestApp::new().await;
    let resolver = app.state.services.customers.clone();
    let buyer = purchaser("multi@example.com");

    let a = resolver.resolve(&buyer, Uuid::new_v4()).await.unwrap();
    let b = resolver.resolve(&buyer, Uuid::new_v4()).await.unwrap();
    assert_ne!(a.id, b.id);
    assert_eq!(app.count_customers().await, 2);
}
