//! Prometheus counters for the order lifecycle, exposed at `/metrics`.

use axum::{http::header, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

use crate::errors::ServiceError;

lazy_static! {
    pub static ref CHECKOUTS: IntCounter =
        register_int_counter!("checkouts_total", "Total number of completed checkouts")
            .expect("metric can be created");
    pub static ref CUSTOMERS_CREATED: IntCounter = register_int_counter!(
        "customers_created_total",
        "Customers created implicitly during checkout"
    )
    .expect("metric can be created");
    pub static ref STATUS_CASCADES: IntCounterVec = register_int_counter_vec!(
        "status_cascades_total",
        "Status changes applied across order, payment and shipping",
        &["change"]
    )
    .expect("metric can be created");
    pub static ref STATUS_CASCADES_REJECTED: IntCounter = register_int_counter!(
        "status_cascades_rejected_total",
        "Status changes rejected because the transition is not allowed"
    )
    .expect("metric can be created");
    pub static ref ORDERS_CANCELLED: IntCounter = register_int_counter!(
        "orders_cancelled_total",
        "Orders cancelled by purchasers before fulfilment"
    )
    .expect("metric can be created");
}

/// Renders every registered metric in the Prometheus text format
pub fn render() -> Result<String, ServiceError> {
    // Counters register on first use; force them so a fresh process reports zeros.
    lazy_static::initialize(&CHECKOUTS);
    lazy_static::initialize(&CUSTOMERS_CREATED);
    lazy_static::initialize(&STATUS_CASCADES);
    lazy_static::initialize(&STATUS_CASCADES_REJECTED);
    lazy_static::initialize(&ORDERS_CANCELLED);

    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| ServiceError::InternalError(format!("metrics encoding failed: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| ServiceError::InternalError(format!("metrics are not utf-8: {}", e)))
}

pub async fn metrics_handler() -> Result<impl IntoResponse, ServiceError> {
    let body = render()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
