#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use marketmate_api::{
    auth::{issue_token, SELLER_ROLE},
    config::{AppConfig, OrderDefaults},
    db,
    entities::{
        customer::{self, CustomerStatus},
        item, order, payment, shipping,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        catalog::{DbItemCatalog, ItemCatalog},
        codes::{CodeGenerator, CodeKind, RandomCodeGenerator},
        Purchaser,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, Set};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "marketmate_test_secret_key_with_enough_entropy_42";

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        Self::with_codes(Arc::new(RandomCodeGenerator)).await
    }

    /// Same as [`TestApp::new`] but with a custom external-code source.
    pub async fn with_codes(codes: Arc<dyn CodeGenerator>) -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        // A single connection keeps every query on the same in-memory database.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let catalog: Arc<dyn ItemCatalog> = Arc::new(DbItemCatalog::new(db_arc.clone()));
        let services = AppServices::with_collaborators(
            db_arc.clone(),
            event_sender.clone(),
            cfg.order_defaults.clone(),
            catalog,
            codes,
        );

        let state = AppState {
            db: db_arc,
            config: Arc::new(cfg),
            event_sender,
            services,
        };
        let router = marketmate_api::app_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn defaults(&self) -> &OrderDefaults {
        &self.state.config.order_defaults
    }

    /// Bearer token for a seller account
    pub fn seller_token(&self, seller_id: Uuid) -> String {
        issue_token(
            JWT_SECRET,
            seller_id,
            "Seller",
            &format!("seller-{}@example.com", seller_id.simple()),
            &[SELLER_ROLE],
            Duration::hours(1),
        )
        .expect("issue seller token")
    }

    /// Bearer token for a purchaser without seller rights
    pub fn purchaser_token(&self, email: &str, name: &str) -> String {
        issue_token(JWT_SECRET, Uuid::new_v4(), name, email, &["customer"], Duration::hours(1))
            .expect("issue purchaser token")
    }

    /// Send a request against the router and decode the JSON body (Null when empty).
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("read response body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::String(
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        };
        (status, json)
    }

    pub async fn seed_item(&self, seller_id: Uuid, price: Decimal) -> item::Model {
        let now = Utc::now();
        item::ActiveModel {
            id: Set(Uuid::new_v4()),
            item_code: Set(RandomCodeGenerator.generate(CodeKind::Item)),
            seller_id: Set(seller_id),
            name: Set("Test Item".to_string()),
            description: Set(Some("Item seeded for integration tests".to_string())),
            price: Set(price),
            is_deleted: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed item for tests")
    }

    pub async fn seed_customer(&self, seller_id: Uuid, email: &str, address: &str) -> customer::Model {
        let now = Utc::now();
        customer::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_code: Set(RandomCodeGenerator.generate(CodeKind::Customer)),
            seller_id: Set(seller_id),
            name: Set("Seeded Customer".to_string()),
            email: Set(email.to_string()),
            address: Set(address.to_string()),
            phone: Set(None),
            status: Set(CustomerStatus::Active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed customer for tests")
    }

    pub async fn count_customers(&self) -> u64 {
        customer::Entity::find().count(&*self.state.db).await.expect("count customers")
    }

    pub async fn count_orders(&self) -> u64 {
        order::Entity::find().count(&*self.state.db).await.expect("count orders")
    }

    pub async fn count_payments(&self) -> u64 {
        payment::Entity::find().count(&*self.state.db).await.expect("count payments")
    }

    pub async fn count_shipping(&self) -> u64 {
        shipping::Entity::find().count(&*self.state.db).await.expect("count shipping")
    }
}

pub fn purchaser(email: &str) -> Purchaser {
    Purchaser::new(email, "Juan Dela Cruz")
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}
