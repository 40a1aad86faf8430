use crate::{
    config::OrderDefaults,
    db::DbPool,
    entities::{
        item,
        order::PaymentMethod,
        payment::{self, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    services::{
        checkout::order_amount,
        codes::{CodeGenerator, CodeKind},
        orders::{find_order_for_actor, find_payment, Actor},
    },
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of `POST /payments`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AttachPaymentRequest {
    pub order_id: Uuid,
    #[serde(default)]
    pub payment_method: Option<String>,
}

/// Attaches payments to orders that were recorded without one.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    codes: Arc<dyn CodeGenerator>,
    defaults: OrderDefaults,
}

impl PaymentService {
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

    /// Creates the order's `pending` payment. An order carries at most one
    /// payment, so a second call is a `Conflict`.
    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn attach_payment(
        &self,
        seller_id: Uuid,
        request: AttachPaymentRequest,
    ) -> Result<payment::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let order =
            find_order_for_actor(&txn, &Actor::Seller(seller_id), request.order_id, true).await?;

        if find_payment(&txn, order.id).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "Order {} already has a payment",
                order.order_code
            )));
        }

        let price = item::Entity::find_by_id(order.item_id)
            .one(&txn)
            .await?
            .map(|i| i.price)
            .ok_or_else(|| ServiceError::NotFound(format!("Item {} not found", order.item_id)))?;
        let method = match request.payment_method.as_deref() {
            Some(raw) => PaymentMethod::normalize(Some(raw), self.defaults.default_payment_method),
            None => order.payment_method,
        };

        let now = Utc::now();
        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_code: Set(self.codes.generate(CodeKind::Payment)),
            order_id: Set(order.id),
            seller_id: Set(order.seller_id),
            amount: Set(order_amount(price, order.quantity)),
            payment_method: Set(method),
            status: Set(PaymentStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::from_insert(e, "Payment"))?;
        txn.commit().await?;

        info!(payment_code = %payment.payment_code, order_code = %order.order_code, "payment attached");
        self.event_sender
            .send_or_log(Event::PaymentCreated {
                payment_id: payment.id,
                order_id: order.id,
            })
            .await;
        Ok(payment)
    }
}
