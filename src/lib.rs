//! MarketMate API Library
//!
//! Seller back-office services that keep an order, its payment and its
//! shipping record consistent from checkout to completion.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::FromRef,
    http::HeaderValue,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<db::DbPool>,
    pub config: Arc<config::AppConfig>,
    pub event_sender: Arc<events::EventSender>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the state with the default service wiring
    pub fn new(
        db: Arc<db::DbPool>,
        config: Arc<config::AppConfig>,
        event_sender: Arc<events::EventSender>,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            event_sender.clone(),
            config.order_defaults.clone(),
        );
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

impl FromRef<AppState> for Arc<config::AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            meta: Some(ResponseMeta::capture()),
        }
    }
}


/// Order lifecycle routes, mounted under `/api/v1`
pub fn api_v1_routes() -> Router<AppState> {
    let purchaser = Router::new()
        .route("/orders/checkout", post(handlers::orders::checkout))
        .route("/orders/my-orders", get(handlers::orders::my_orders))
        .route("/orders/:id/received", post(handlers::orders::mark_received))
        .route("/orders/:id/cancel", post(handlers::orders::cancel_order))
        .route(
            "/reviews/eligibility",
            get(handlers::reviews::review_eligibility),
        );

    let seller = Router::new()
        .route("/orders", post(handlers::orders::create_order))
        .route("/orders/:id", get(handlers::orders::get_order))
        .route(
            "/orders/:id/status",
            put(handlers::orders::update_order_status),
        )
        .route("/payments", post(handlers::payments::attach_payment))
        .route(
            "/payments/:id/status",
            put(handlers::payments::update_payment_status),
        )
        .route("/shipping", get(handlers::shipping::list_open_shipments))
        .route(
            "/shipping/:id/status",
            put(handlers::shipping::update_shipping_status),
        );

    Router::new()
        .route("/status", get(api_status))
        .merge(purchaser)
        .merge(seller)
}

async fn api_status() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// CORS from `cors_allowed_origins`; permissive only in development when unset
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_origins()
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if !origins.is_empty() {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    } else if cfg.is_development() {
        ::tracing::info!("Using permissive CORS because no origins are configured in development");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    }
}

/// The full application: API, health, metrics and the OpenAPI document
pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config);
    let db = state.db.clone();

    Router::new()
        .nest("/api/v1", api_v1_routes())
        .with_state(state)
        .route("/metrics", get(crate::metrics::metrics_handler))
        .route("/api-docs/openapi.json", get(crate::openapi::openapi_json))
        .merge(crate::health::health_routes(db))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
}
