use crate::{
    config::OrderDefaults,
    db::DbPool,
    entities::{
        customer,
        order::{self, OrderStatus, PaymentMethod},
        payment::{self, PaymentStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::CHECKOUTS,
    services::{
        catalog::{CatalogItem, ItemCatalog},
        codes::{CodeGenerator, CodeKind},
        customers::{CustomerResolver, Purchaser},
        orders::OrderTriple,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of `POST /orders/checkout`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CheckoutRequest {
    pub item_id: Uuid,
    pub quantity: i32,
    /// Free-form; aliases such as "Cash on Delivery" are accepted
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub shipping_method: Option<String>,
}

/// Body of `POST /orders`, used by sellers recording an order by hand
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SellerOrderRequest {
    pub customer_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub shipping_method: Option<String>,
}

struct NewOrder<'a> {
    item: &'a CatalogItem,
    customer_id: Uuid,
    quantity: i32,
    payment_method: PaymentMethod,
    shipping_method: Option<String>,
    status: OrderStatus,
}

/// Creates orders together with their first payment.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    catalog: Arc<dyn ItemCatalog>,
    resolver: CustomerResolver,
    codes: Arc<dyn CodeGenerator>,
    defaults: OrderDefaults,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        catalog: Arc<dyn ItemCatalog>,
        resolver: CustomerResolver,
        codes: Arc<dyn CodeGenerator>,
        defaults: OrderDefaults,
    ) -> Self {
        Self {
            db,
            event_sender,
            catalog,
            resolver,
            codes,
            defaults,
        }
    }

    /// Places an order for `purchaser`.
    ///
    /// The purchaser's customer row under the item's seller, the order and
    /// its payment are written in a single transaction; if any insert fails
    /// none of them persist.
    #[instrument(skip(self, purchaser, request), fields(email = %purchaser.email, item_id = %request.item_id))]
    pub async fn checkout(
        &self,
        purchaser: &Purchaser,
        request: CheckoutRequest,
    ) -> Result<OrderTriple, ServiceError> {
        check_quantity(request.quantity)?;
        let item = self.require_item(request.item_id).await?;
        let payment_method = self.payment_method(request.payment_method.as_deref());

        let txn = self.db.begin().await?;
        let resolved = self
            .resolver
            .resolve_in(&txn, purchaser, item.seller_id)
            .await?;
        let triple = self
            .insert_order_with_payment(
                &txn,
                NewOrder {
                    item: &item,
                    customer_id: resolved.customer.id,
                    quantity: request.quantity,
                    payment_method,
                    shipping_method: request.shipping_method,
                    status: OrderStatus::Pending,
                },
            )
            .await?;
        txn.commit().await?;

        CHECKOUTS.inc();
        info!(
            order_code = %triple.order.order_code,
            customer_id = %resolved.customer.id,
            "checkout completed"
        );

        if resolved.created {
            self.resolver.announce(&resolved.customer).await;
        }
        self.announce(&triple).await;
        Ok(triple)
    }

    /// Records an order a seller took outside the storefront. The order
    /// starts as `new` with a `pending` payment.
    #[instrument(skip(self, request), fields(item_id = %request.item_id))]
    pub async fn create_seller_order(
        &self,
        seller_id: Uuid,
        request: SellerOrderRequest,
    ) -> Result<OrderTriple, ServiceError> {
        check_quantity(request.quantity)?;
        let item = self
            .require_item(request.item_id)
            .await
            .and_then(|item| {
                if item.seller_id == seller_id {
                    Ok(item)
                } else {
                    Err(item_not_found(request.item_id))
                }
            })?;
        let payment_method = self.payment_method(request.payment_method.as_deref());

        let txn = self.db.begin().await?;
        let customer = customer::Entity::find_by_id(request.customer_id)
            .filter(customer::Column::SellerId.eq(seller_id))
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Customer {} not found", request.customer_id))
            })?;
        let triple = self
            .insert_order_with_payment(
                &txn,
                NewOrder {
                    item: &item,
                    customer_id: customer.id,
                    quantity: request.quantity,
                    payment_method,
                    shipping_method: request.shipping_method,
                    status: OrderStatus::New,
                },
            )
            .await?;
        txn.commit().await?;

        info!(order_code = %triple.order.order_code, %seller_id, "seller order recorded");
        self.announce(&triple).await;
        Ok(triple)
    }

    async fn require_item(&self, item_id: Uuid) -> Result<CatalogItem, ServiceError> {
        self.catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| item_not_found(item_id))
    }

    fn payment_method(&self, raw: Option<&str>) -> PaymentMethod {
        PaymentMethod::normalize(raw, self.defaults.default_payment_method)
    }

    async fn insert_order_with_payment<C: ConnectionTrait>(
        &self,
        conn: &C,
        new: NewOrder<'_>,
    ) -> Result<OrderTriple, ServiceError> {
        let now = Utc::now();
        let order = order::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_code: Set(self.codes.generate(CodeKind::Order)),
            seller_id: Set(new.item.seller_id),
            customer_id: Set(new.customer_id),
            item_id: Set(new.item.id),
            quantity: Set(new.quantity),
            payment_method: Set(new.payment_method),
            shipping_method: Set(new.shipping_method.filter(|s| !s.trim().is_empty())),
            status: Set(new.status),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(|e| ServiceError::from_insert(e, "Order"))?;

        let payment = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            payment_code: Set(self.codes.generate(CodeKind::Payment)),
            order_id: Set(order.id),
            seller_id: Set(order.seller_id),
            amount: Set(order_amount(new.item.price, new.quantity)),
            payment_method: Set(new.payment_method),
            status: Set(PaymentStatus::Pending),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(conn)
        .await
        .map_err(|e| ServiceError::from_insert(e, "Payment"))?;

        Ok(OrderTriple {
            order,
            payment: Some(payment),
            shipping: None,
        })
    }

    async fn announce(&self, triple: &OrderTriple) {
        self.event_sender
            .send_or_log(Event::OrderCreated(triple.order.id))
            .await;
        if let Some(payment) = &triple.payment {
            self.event_sender
                .send_or_log(Event::PaymentCreated {
                    payment_id: payment.id,
                    order_id: triple.order.id,
                })
                .await;
        }
    }
}

/// `price × quantity`, rounded to cents
pub fn order_amount(price: Decimal, quantity: i32) -> Decimal {
    (price * Decimal::from(quantity)).round_dp(2)
}

fn check_quantity(quantity: i32) -> Result<(), ServiceError> {
    if quantity < 1 {
        return Err(ServiceError::InvalidQuantity(quantity));
    }
    Ok(())
}

fn item_not_found(item_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("Item {} not found", item_id))
}
