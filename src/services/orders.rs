use crate::{
    db::DbPool,
    entities::{
        customer,
        order::{self, OrderStatus},
        payment,
        shipping::{self, ShippingStatus},
    },
    errors::ServiceError,
    services::customers::{customer_ids_for_email, Purchaser},
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

/// Who is acting on an order. Orders outside the actor's scope are reported
/// as not found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// Seller (admin) owning the item the order is for
    Seller(Uuid),
    /// End-user whose customer rows placed the order
    Purchaser(Purchaser),
}

/// An order together with its payment and shipping records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct OrderTriple {
    pub order: order::Model,
    pub payment: Option<payment::Model>,
    pub shipping: Option<shipping::Model>,
}

/// Loads an order the actor is allowed to touch.
///
/// With `lock` set the order row is selected `FOR UPDATE` on backends that
/// support it, serialising concurrent changes to the same order.
pub(crate) async fn find_order_for_actor<C: ConnectionTrait>(
    conn: &C,
    actor: &Actor,
    order_id: Uuid,
    lock: bool,
) -> Result<order::Model, ServiceError> {
    let mut query = order::Entity::find_by_id(order_id);
    if let Actor::Seller(seller_id) = actor {
        query = query.filter(order::Column::SellerId.eq(*seller_id));
    }
    if lock {
        query = query.lock_exclusive();
    }

    let not_found = || ServiceError::NotFound(format!("Order {} not found", order_id));
    let order = query.one(conn).await?.ok_or_else(not_found)?;

    if let Actor::Purchaser(purchaser) = actor {
        let owner = customer::Entity::find_by_id(order.customer_id)
            .one(conn)
            .await?;
        match owner {
            Some(c) if c.email == purchaser.email => {}
            _ => return Err(not_found()),
        }
    }

    Ok(order)
}

pub(crate) async fn find_payment<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<payment::Model>, ServiceError> {
    Ok(payment::Entity::find()
        .filter(payment::Column::OrderId.eq(order_id))
        .one(conn)
        .await?)
}

pub(crate) async fn find_shipping<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Option<shipping::Model>, ServiceError> {
    Ok(shipping::Entity::find()
        .filter(shipping::Column::OrderId.eq(order_id))
        .one(conn)
        .await?)
}

/// Read-side views over orders for sellers and purchasers
#[derive(Clone)]
pub struct OrderQueryService {
    db: Arc<DbPool>,
}

impl OrderQueryService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, actor))]
    pub async fn order_triple(
        &self,
        actor: &Actor,
        order_id: Uuid,
    ) -> Result<OrderTriple, ServiceError> {
        let db = &*self.db;
        let order = find_order_for_actor(db, actor, order_id, false).await?;
        let payment = find_payment(db, order.id).await?;
        let shipping = find_shipping(db, order.id).await?;
        Ok(OrderTriple {
            order,
            payment,
            shipping,
        })
    }

    /// Every order placed under any customer row sharing the purchaser's email,
    /// newest first
    #[instrument(skip(self, purchaser), fields(email = %purchaser.email))]
    pub async fn orders_for_purchaser(
        &self,
        purchaser: &Purchaser,
    ) -> Result<Vec<OrderTriple>, ServiceError> {
        let db = &*self.db;
        let customer_ids = customer_ids_for_email(db, &purchaser.email).await?;
        if customer_ids.is_empty() {
            return Ok(Vec::new());
        }

        let orders = order::Entity::find()
            .filter(order::Column::CustomerId.is_in(customer_ids))
            .order_by_desc(order::Column::CreatedAt)
            .all(db)
            .await?;
        let order_ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let mut payments: HashMap<Uuid, payment::Model> = payment::Entity::find()
            .filter(payment::Column::OrderId.is_in(order_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.order_id, p))
            .collect();
        let mut shipments: HashMap<Uuid, shipping::Model> = shipping::Entity::find()
            .filter(shipping::Column::OrderId.is_in(order_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|s| (s.order_id, s))
            .collect();

        Ok(orders
            .into_iter()
            .map(|order| OrderTriple {
                payment: payments.remove(&order.id),
                shipping: shipments.remove(&order.id),
                order,
            })
            .collect())
    }

    /// The seller's shipments that still need attention (not yet delivered)
    #[instrument(skip(self))]
    pub async fn open_shipments(
        &self,
        seller_id: Uuid,
    ) -> Result<Vec<shipping::Model>, ServiceError> {
        Ok(shipping::Entity::find()
            .filter(shipping::Column::SellerId.eq(seller_id))
            .filter(shipping::Column::Status.ne(ShippingStatus::Delivered))
            .order_by_asc(shipping::Column::CreatedAt)
            .all(&*self.db)
            .await?)
    }

    /// True once the purchaser has a completed order for the item
    #[instrument(skip(self, purchaser), fields(email = %purchaser.email))]
    pub async fn review_eligibility(
        &self,
        purchaser: &Purchaser,
        item_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let db = &*self.db;
        let customer_ids = customer_ids_for_email(db, &purchaser.email).await?;
        if customer_ids.is_empty() {
            return Ok(false);
        }

        let completed = order::Entity::find()
            .filter(order::Column::ItemId.eq(item_id))
            .filter(order::Column::CustomerId.is_in(customer_ids))
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .count(db)
            .await?;
        Ok(completed > 0)
    }
}
