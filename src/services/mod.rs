// Order lifecycle
pub mod cancellation;
pub mod checkout;
pub mod order_status;
pub mod orders;
pub mod payments;

// Collaborators
pub mod catalog;
pub mod codes;
pub mod customers;

pub use cancellation::CancellationGuard;
pub use checkout::{CheckoutRequest, CheckoutService, SellerOrderRequest};
pub use customers::{CustomerResolver, Purchaser};
pub use order_status::{StatusCascadeEngine, StatusChange, StatusTarget};
pub use orders::{Actor, OrderQueryService, OrderTriple};
pub use payments::{AttachPaymentRequest, PaymentService};
