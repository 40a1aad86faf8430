use crate::{
    db::DbPool,
    entities::payment,
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::ORDERS_CANCELLED,
    services::{
        customers::Purchaser,
        orders::{find_order_for_actor, Actor},
    },
};
use chrono::Utc;
use sea_orm::{ColumnTrait, EntityTrait, ModelTrait, QueryFilter, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Lets purchasers withdraw orders nobody has started working on.
#[derive(Clone)]
pub struct CancellationGuard {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl CancellationGuard {
    pub fn new(db: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Deletes a `pending` or `new` order and its payment.
    ///
    /// The order is located through any customer row carrying the
    /// purchaser's email. The payment goes first because it references the
    /// order; both deletions share one transaction.
    #[instrument(skip(self, purchaser), fields(email = %purchaser.email))]
    pub async fn cancel(&self, purchaser: &Purchaser, order_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let actor = Actor::Purchaser(purchaser.clone());
        let order = find_order_for_actor(&txn, &actor, order_id, true).await?;

        if !order.status.is_cancellable() {
            return Err(ServiceError::InvalidState(format!(
                "order {} is {}; only pending or new orders can be cancelled",
                order.order_code, order.status
            )));
        }

        let removed_payments = payment::Entity::delete_many()
            .filter(payment::Column::OrderId.eq(order.id))
            .exec(&txn)
            .await?
            .rows_affected;
        let order_code = order.order_code.clone();
        order.delete(&txn).await?;
        txn.commit().await?;

        ORDERS_CANCELLED.inc();
        info!(%order_code, removed_payments, "order cancelled");
        self.event_sender
            .send_or_log(Event::OrderCancelled {
                order_id,
                at: Utc::now(),
            })
            .await;
        Ok(())
    }
}

