//! The single entry point for every order, payment and shipping status change.
//!
//! A change is planned against the current `(order, payment, shipping)`
//! statuses by [`plan_transition`], which either rejects it or returns the
//! target triple. [`StatusCascadeEngine::apply_status_change`] then writes
//! all three records in one transaction.
//!
//! Reachable triples:
//!
//! | Order               | Payment           | Shipping    |
//! |---------------------|-------------------|-------------|
//! | `pending` / `new`   | `pending`         | none        |
//! | `paid`              | `paid`            | none        |
//! | `shipped`           | `pending`/`paid`  | `shipped`   |
//! | `completed`         | `paid`            | `delivered` |

use crate::{
    config::OrderDefaults,
    db::DbPool,
    entities::{
        customer,
        order::{self, OrderStatus},
        payment::{self, PaymentStatus},
        shipping::{self, ShippingStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::{STATUS_CASCADES, STATUS_CASCADES_REJECTED},
    services::{
        codes::{CodeGenerator, CodeKind},
        orders::{find_order_for_actor, find_payment, find_shipping, Actor, OrderTriple},
    },
};
use chrono::Utc;
use sea_orm::{
    error::SqlErr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseTransaction,
    EntityTrait, QueryFilter, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Attempts before giving up when a new shipping record keeps colliding on its code
const MAX_SHIPPING_CODE_ATTEMPTS: usize = 3;

/// Which record a status write is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum StatusTarget {
    Order,
    Payment,
    Shipping,
}

/// A requested status change, tagged by the record it is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusChange {
    Order(OrderStatus),
    Payment(PaymentStatus),
    Shipping(ShippingStatus),
    /// Purchaser confirms the parcel arrived
    MarkReceived,
}

impl StatusChange {
    /// Parses a raw status string for `target`; unknown strings are `UnknownStatus`.
    pub fn parse(target: StatusTarget, raw: &str) -> Result<Self, ServiceError> {
        Ok(match target {
            StatusTarget::Order => StatusChange::Order(raw.parse()?),
            StatusTarget::Payment => StatusChange::Payment(raw.parse()?),
            StatusTarget::Shipping => StatusChange::Shipping(raw.parse()?),
        })
    }

    /// Metric label, e.g. `order_shipped`
    pub fn label(&self) -> String {
        match self {
            StatusChange::Order(s) => format!("{}_{}", StatusTarget::Order, s),
            StatusChange::Payment(s) => format!("{}_{}", StatusTarget::Payment, s),
            StatusChange::Shipping(s) => format!("{}_{}", StatusTarget::Shipping, s),
            StatusChange::MarkReceived => "mark_received".to_string(),
        }
    }
}

/// Statuses of an order's three records; `shipping` is `None` until dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusTriple {
    pub order: OrderStatus,
    pub payment: PaymentStatus,
    pub shipping: Option<ShippingStatus>,
}

impl StatusTriple {
    pub fn is_canonical(&self) -> bool {
        use OrderStatus as O;
        use PaymentStatus as P;
        use ShippingStatus as S;

        matches!(
            (self.order, self.payment, self.shipping),
            (O::Pending | O::New, P::Pending, None)
                | (O::Paid, P::Paid, None)
                | (O::Shipped, P::Pending | P::Paid, Some(S::Shipped))
                | (O::Completed, P::Paid, Some(S::Delivered))
        )
    }
}

/// Computes the triple that `change` leads to from `current`, or the reason
/// it is refused. Pure; nothing is written.
pub fn plan_transition(
    current: StatusTriple,
    change: StatusChange,
) -> Result<StatusTriple, ServiceError> {
    // Repeated delivery or payment confirmations on a completed order are no-ops.
    if current.order == OrderStatus::Completed
        && matches!(
            change,
            StatusChange::Shipping(ShippingStatus::Delivered)
                | StatusChange::Payment(PaymentStatus::Paid)
        )
    {
        return Ok(current);
    }

    if current.order.is_terminal() {
        return Err(ServiceError::InvalidState(format!(
            "order is {}; no further status changes are accepted",
            current.order
        )));
    }

    let completed = StatusTriple {
        order: OrderStatus::Completed,
        payment: PaymentStatus::Paid,
        shipping: Some(ShippingStatus::Delivered),
    };

    match change {
        StatusChange::Order(OrderStatus::Shipped) => Ok(StatusTriple {
            order: OrderStatus::Shipped,
            payment: current.payment,
            shipping: Some(ShippingStatus::Shipped),
        }),
        StatusChange::Shipping(ShippingStatus::Shipped) => {
            require_shipping(current)?;
            Ok(StatusTriple {
                order: OrderStatus::Shipped,
                payment: current.payment,
                shipping: Some(ShippingStatus::Shipped),
            })
        }
        StatusChange::Order(OrderStatus::Completed) | StatusChange::MarkReceived => {
            if current.order != OrderStatus::Shipped {
                return Err(ServiceError::InvalidState(format!(
                    "order is {}; only shipped orders can be completed",
                    current.order
                )));
            }
            Ok(completed)
        }
        StatusChange::Shipping(ShippingStatus::Delivered) => {
            require_shipping(current)?;
            Ok(completed)
        }
        StatusChange::Payment(PaymentStatus::Paid) => {
            let order = match current.order {
                OrderStatus::New | OrderStatus::Pending | OrderStatus::Paid => OrderStatus::Paid,
                other => other,
            };
            Ok(StatusTriple {
                order,
                payment: PaymentStatus::Paid,
                shipping: current.shipping,
            })
        }
        StatusChange::Order(OrderStatus::Cancelled) => Err(ServiceError::InvalidState(
            "orders are cancelled through the purchaser cancellation flow".to_string(),
        )),
        StatusChange::Order(other) => Err(ServiceError::InvalidState(format!(
            "order cannot be set to {} directly",
            other
        ))),
        StatusChange::Payment(other) => Err(ServiceError::InvalidState(format!(
            "payment cannot be set to {} directly",
            other
        ))),
        StatusChange::Shipping(other) => Err(ServiceError::InvalidState(format!(
            "shipping cannot be set to {} directly",
            other
        ))),
    }
}

async fn shipping_code_taken<C: ConnectionTrait>(conn: &C, code: &str) -> Result<bool, ServiceError> {
    Ok(shipping::Entity::find()
        .filter(shipping::Column::ShippingCode.eq(code))
        .one(conn)
        .await?
        .is_some())
}

fn require_shipping(current: StatusTriple) -> Result<(), ServiceError> {
    if current.shipping.is_none() {
        return Err(ServiceError::NotFound(
            "order has no shipping record yet".to_string(),
        ));
    }
    Ok(())
}

/// Applies status changes across an order's payment and shipping records.
#[derive(Clone)]
pub struct StatusCascadeEngine {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    codes: Arc<dyn CodeGenerator>,
    defaults: OrderDefaults,
}

impl StatusCascadeEngine {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        codes: Arc<dyn CodeGenerator>,
        defaults: OrderDefaults,
    ) -> Self {
        Self {
            db,
            event_sender,
            codes,
            defaults,
        }
    }

    /// Applies `change` to the order and cascades to its payment and shipping
    /// records atomically. On any failure nothing is written.
    #[instrument(skip(self, actor))]
    pub async fn apply_status_change(
        &self,
        actor: &Actor,
        order_id: Uuid,
        change: StatusChange,
    ) -> Result<OrderTriple, ServiceError> {
        let txn = self.db.begin().await?;

        let order = find_order_for_actor(&txn, actor, order_id, true).await?;
        let payment = find_payment(&txn, order.id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Payment for order {} not found", order.order_code))
        })?;
        let shipping = find_shipping(&txn, order.id).await?;

        let current = StatusTriple {
            order: order.status,
            payment: payment.status,
            shipping: shipping.as_ref().map(|s| s.status),
        };
        let target = plan_transition(current, change).map_err(|e| {
            STATUS_CASCADES_REJECTED.inc();
            warn!(order_code = %order.order_code, ?current, ?change, error = %e, "status change rejected");
            e
        })?;

        let now = Utc::now();
        let mut events = Vec::new();

        let order = if target.order != current.order {
            events.push(Event::OrderStatusChanged {
                order_id: order.id,
                old_status: current.order.to_string(),
                new_status: target.order.to_string(),
            });
            if target.order == OrderStatus::Completed {
                events.push(Event::OrderCompleted(order.id));
            }
            let mut active: order::ActiveModel = order.into();
            active.status = Set(target.order);
            active.updated_at = Set(now);
            active.update(&txn).await?
        } else {
            order
        };

        let payment = if target.payment != current.payment {
            events.push(Event::PaymentStatusChanged {
                payment_id: payment.id,
                order_id: order.id,
                old_status: current.payment.to_string(),
                new_status: target.payment.to_string(),
            });
            let mut active: payment::ActiveModel = payment.into();
            active.status = Set(target.payment);
            active.updated_at = Set(now);
            active.update(&txn).await?
        } else {
            payment
        };

        let shipping = match (shipping, target.shipping) {
            (Some(existing), Some(status)) if existing.status != status => {
                events.push(Event::ShipmentStatusChanged {
                    shipping_id: existing.id,
                    order_id: order.id,
                    new_status: status.to_string(),
                });
                let mut active: shipping::ActiveModel = existing.into();
                active.status = Set(status);
                active.updated_at = Set(now);
                Some(active.update(&txn).await?)
            }
            (Some(existing), _) => Some(existing),
            (None, Some(status)) => {
                let created = self.insert_shipping(&txn, &order, status).await?;
                events.push(Event::ShipmentCreated {
                    shipping_id: created.id,
                    order_id: order.id,
                });
                Some(created)
            }
            (None, None) => None,
        };

        txn.commit().await?;

        STATUS_CASCADES.with_label_values(&[&change.label()]).inc();
        info!(
            order_code = %order.order_code,
            order_status = %order.status,
            payment_status = %payment.status,
            shipping_status = ?shipping.as_ref().map(|s| s.status),
            "status change applied"
        );

        for event in events {
            self.event_sender.send_or_log(event).await;
        }

        Ok(OrderTriple {
            order,
            payment: Some(payment),
            shipping,
        })
    }

    /// Opens the shipping record for `order`. The courier comes from the
    /// order's shipping method and the address from its customer, each with a
    /// configured fallback. A collision on the generated code is retried with
    /// a fresh one inside a savepoint.
    async fn insert_shipping(
        &self,
        txn: &DatabaseTransaction,
        order: &order::Model,
        status: ShippingStatus,
    ) -> Result<shipping::Model, ServiceError> {
        let address = customer::Entity::find_by_id(order.customer_id)
            .one(txn)
            .await?
            .map(|c| c.address)
            .unwrap_or_else(|| self.defaults.placeholder_address.clone());
        let courier = order
            .shipping_method
            .clone()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| self.defaults.default_courier.clone());

        for attempt in 1..=MAX_SHIPPING_CODE_ATTEMPTS {
            let now = Utc::now();
            let shipping_code = self.codes.generate(CodeKind::Shipping);
            let candidate = shipping::ActiveModel {
                id: Set(Uuid::new_v4()),
                shipping_code: Set(shipping_code.clone()),
                order_id: Set(order.id),
                seller_id: Set(order.seller_id),
                courier: Set(courier.clone()),
                address: Set(address.clone()),
                status: Set(status),
                created_at: Set(now),
                updated_at: Set(now),
            };

            let savepoint = txn.begin().await?;
            match candidate.insert(&savepoint).await {
                Ok(model) => {
                    savepoint.commit().await?;
                    return Ok(model);
                }
                Err(err) => {
                    let unique_violation =
                        matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)));
                    savepoint.rollback().await?;
                    if !unique_violation || !shipping_code_taken(txn, &shipping_code).await? {
                        return Err(ServiceError::from_insert(err, "Shipping record"));
                    }
                    warn!(attempt, %shipping_code, "shipping code collision; retrying with a new code");
                }
            }
        }

        Err(ServiceError::Conflict(format!(
            "could not allocate a shipping code for order {} after {} attempts",
            order.order_code, MAX_SHIPPING_CODE_ATTEMPTS
        )))
    }

    /// Applies a payment status write addressed by payment id
    pub async fn apply_to_payment(
        &self,
        actor: &Actor,
        payment_id: Uuid,
        status: PaymentStatus,
    ) -> Result<OrderTriple, ServiceError> {
        let payment = payment::Entity::find_by_id(payment_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))?;
        self.apply_status_change(actor, payment.order_id, StatusChange::Payment(status))
            .await
            .map_err(|e| not_found_as(e, "Payment", payment_id))
    }

    /// Applies a shipping status write addressed by shipping id
    pub async fn apply_to_shipping(
        &self,
        actor: &Actor,
        shipping_id: Uuid,
        status: ShippingStatus,
    ) -> Result<OrderTriple, ServiceError> {
        let record = shipping::Entity::find_by_id(shipping_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Shipping record {} not found", shipping_id))
            })?;
        self.apply_status_change(actor, record.order_id, StatusChange::Shipping(status))
            .await
            .map_err(|e| not_found_as(e, "Shipping record", shipping_id))
    }
}

/// Keeps "not found" errors about the addressed record rather than its order,
/// so the order id of another seller is never revealed.
fn not_found_as(err: ServiceError, what: &str, id: Uuid) -> ServiceError {
    match err {
        ServiceError::NotFound(_) => ServiceError::NotFound(format!("{} {} not found", what, id)),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;

    fn triple(
        order: OrderStatus,
        payment: PaymentStatus,
        shipping: Option<ShippingStatus>,
    ) -> StatusTriple {
        StatusTriple {
            order,
            payment,
            shipping,
        }
    }

    fn checked_out() -> StatusTriple {
        triple(OrderStatus::Pending, PaymentStatus::Pending, None)
    }

    #[test]
    fn payment_paid_promotes_pending_order() {
        let next = plan_transition(checked_out(), StatusChange::Payment(PaymentStatus::Paid)).unwrap();
        assert_eq!(next, triple(OrderStatus::Paid, PaymentStatus::Paid, None));
    }

    #[test]
    fn payment_paid_keeps_shipped_order_shipped() {
        let shipped = triple(
            OrderStatus::Shipped,
            PaymentStatus::Pending,
            Some(ShippingStatus::Shipped),
        );
        let next = plan_transition(shipped, StatusChange::Payment(PaymentStatus::Paid)).unwrap();
        assert_eq!(next.order, OrderStatus::Shipped);
        assert_eq!(next.payment, PaymentStatus::Paid);
        assert!(next.is_canonical());
    }

    #[test]
    fn shipping_order_leaves_payment_alone() {
        let next = plan_transition(checked_out(), StatusChange::Order(OrderStatus::Shipped)).unwrap();
        assert_eq!(
            next,
            triple(
                OrderStatus::Shipped,
                PaymentStatus::Pending,
                Some(ShippingStatus::Shipped)
            )
        );
    }

    #[test]
    fn completing_requires_shipped_order() {
        for change in [StatusChange::Order(OrderStatus::Completed), StatusChange::MarkReceived] {
            assert_matches!(
                plan_transition(checked_out(), change),
                Err(ServiceError::InvalidState(_))
            );
        }
    }

    #[test]
    fn delivery_forces_payment_paid() {
        let shipped = triple(
            OrderStatus::Shipped,
            PaymentStatus::Pending,
            Some(ShippingStatus::Shipped),
        );
        let next = plan_transition(shipped, StatusChange::Shipping(ShippingStatus::Delivered)).unwrap();
        assert_eq!(
            next,
            triple(
                OrderStatus::Completed,
                PaymentStatus::Paid,
                Some(ShippingStatus::Delivered)
            )
        );
    }

    #[test]
    fn shipping_writes_need_a_shipping_record() {
        assert_matches!(
            plan_transition(checked_out(), StatusChange::Shipping(ShippingStatus::Delivered)),
            Err(ServiceError::NotFound(_))
        );
    }

    #[test]
    fn completed_orders_are_frozen() {
        let done = triple(
            OrderStatus::Completed,
            PaymentStatus::Paid,
            Some(ShippingStatus::Delivered),
        );
        assert_matches!(
            plan_transition(done, StatusChange::Order(OrderStatus::Shipped)),
            Err(ServiceError::InvalidState(_))
        );
        assert_matches!(
            plan_transition(done, StatusChange::MarkReceived),
            Err(ServiceError::InvalidState(_))
        );
    }

    #[test]
    fn repeated_confirmations_on_completed_orders_are_no_ops() {
        let done = triple(
            OrderStatus::Completed,
            PaymentStatus::Paid,
            Some(ShippingStatus::Delivered),
        );
        for change in [
            StatusChange::Shipping(ShippingStatus::Delivered),
            StatusChange::Payment(PaymentStatus::Paid),
        ] {
            assert_eq!(plan_transition(done, change).unwrap(), done);
        }
    }

    #[test]
    fn direct_writes_outside_the_table_are_rejected() {
        for change in [
            StatusChange::Order(OrderStatus::Paid),
            StatusChange::Order(OrderStatus::Delivered),
            StatusChange::Order(OrderStatus::Cancelled),
            StatusChange::Payment(PaymentStatus::Failed),
            StatusChange::Shipping(ShippingStatus::Preparing),
        ] {
            assert_matches!(
                plan_transition(checked_out(), change),
                Err(ServiceError::InvalidState(_))
            );
        }
    }

    #[test]
    fn parses_changes_per_target() {
        assert_eq!(
            StatusChange::parse(StatusTarget::Shipping, "Delivered").unwrap(),
            StatusChange::Shipping(ShippingStatus::Delivered)
        );
        assert_matches!(
            StatusChange::parse(StatusTarget::Payment, "refunded"),
            Err(ServiceError::UnknownStatus(_))
        );
        assert_eq!("ORDER".parse::<StatusTarget>().unwrap(), StatusTarget::Order);
        assert_eq!(StatusChange::Order(OrderStatus::Shipped).label(), "order_shipped");
    }

    fn any_change() -> impl Strategy<Value = StatusChange> {
        let order = prop::sample::select(vec![
            OrderStatus::New,
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ]);
        let payment = prop::sample::select(vec![
            PaymentStatus::Pending,
            PaymentStatus::Paid,
            PaymentStatus::Failed,
        ]);
        let shipping = prop::sample::select(vec![
            ShippingStatus::Preparing,
            ShippingStatus::Shipped,
            ShippingStatus::Delivered,
            ShippingStatus::Cancelled,
        ]);
        prop_oneof![
            order.prop_map(StatusChange::Order),
            payment.prop_map(StatusChange::Payment),
            shipping.prop_map(StatusChange::Shipping),
            Just(StatusChange::MarkReceived),
        ]
    }

    proptest! {
        #[test]
        fn random_change_sequences_stay_on_the_table(
            start_new in any::<bool>(),
            changes in prop::collection::vec(any_change(), 0..24),
        ) {
            let mut state = checked_out();
            if start_new {
                state.order = OrderStatus::New;
            }
            for change in changes {
                if let Ok(next) = plan_transition(state, change) {
                    prop_assert!(next.is_canonical(), "{:?} -> {:?} gave {:?}", state, change, next);
                    state = next;
                }
            }
            prop_assert!(state.is_canonical());
        }
    }
}
