pub mod orders;
pub mod payments;
pub mod reviews;
pub mod shipping;

use crate::{
    config::OrderDefaults,
    db::DbPool,
    events::EventSender,
    services::{
        catalog::{DbItemCatalog, ItemCatalog},
        codes::{CodeGenerator, RandomCodeGenerator},
        CancellationGuard, CheckoutService, CustomerResolver, OrderQueryService, PaymentService,
        StatusCascadeEngine,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub customers: Arc<CustomerResolver>,
    pub checkout: Arc<CheckoutService>,
    pub status: Arc<StatusCascadeEngine>,
    pub cancellation: Arc<CancellationGuard>,
    pub payments: Arc<PaymentService>,
    pub queries: Arc<OrderQueryService>,
}

impl AppServices {
    /// Wires the order services over the database-backed item catalog and
    /// random external codes.
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>, defaults: OrderDefaults) -> Self {
        let catalog: Arc<dyn ItemCatalog> = Arc::new(DbItemCatalog::new(db_pool.clone()));
        Self::with_collaborators(
            db_pool,
            event_sender,
            defaults,
            catalog,
            Arc::new(RandomCodeGenerator),
        )
    }

    pub fn with_collaborators(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        defaults: OrderDefaults,
        catalog: Arc<dyn ItemCatalog>,
        codes: Arc<dyn CodeGenerator>,
    ) -> Self {
        let resolver = CustomerResolver::new(
            db_pool.clone(),
            event_sender.clone(),
            codes.clone(),
            defaults.placeholder_address.clone(),
        );
        let checkout = CheckoutService::new(
            db_pool.clone(),
            event_sender.clone(),
            catalog,
            resolver.clone(),
            codes.clone(),
            defaults.clone(),
        );
        let status = StatusCascadeEngine::new(
            db_pool.clone(),
            event_sender.clone(),
            codes.clone(),
            defaults.clone(),
        );
        let payments = PaymentService::new(db_pool.clone(), event_sender.clone(), codes, defaults);

        Self {
            customers: Arc::new(resolver),
            checkout: Arc::new(checkout),
            status: Arc::new(status),
            cancellation: Arc::new(CancellationGuard::new(db_pool.clone(), event_sender)),
            payments: Arc::new(payments),
            queries: Arc::new(OrderQueryService::new(db_pool)),
        }
    }
}
