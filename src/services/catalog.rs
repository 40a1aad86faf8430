use crate::{db::DbPool, entities::item, errors::ServiceError};
use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use std::sync::Arc;
use uuid::Uuid;

/// What order flows need to know about an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: Uuid,
    pub seller_id: Uuid,
    pub name: String,
    pub price: Decimal,
}

impl From<item::Model> for CatalogItem {
    fn from(model: item::Model) -> Self {
        Self {
            id: model.id,
            seller_id: model.seller_id,
            name: model.name,
            price: model.price,
        }
    }
}

/// Item lookup used by checkout and seller order flows
#[async_trait]
pub trait ItemCatalog: Send + Sync {
    /// Returns `None` for unknown or soft-deleted items
    async fn get_item(&self, item_id: Uuid) -> Result<Option<CatalogItem>, ServiceError>;
}

/// Catalog backed by the `items` table
#[derive(Clone)]
pub struct DbItemCatalog {
    db: Arc<DbPool>,
}

impl DbItemCatalog {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ItemCatalog for DbItemCatalog {
    async fn get_item(&self, item_id: Uuid) -> Result<Option<CatalogItem>, ServiceError> {
        let found = item::Entity::find_by_id(item_id)
            .filter(item::Column::IsDeleted.eq(false))
            .one(&*self.db)
            .await?;
        Ok(found.map(CatalogItem::from))
    }
}
