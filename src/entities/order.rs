use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "orders")]
#[schema(as = Order)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub order_code: String,
    /// Owner of the purchased item, not the purchaser
    pub seller_id: Uuid,
    pub customer_id: Uuid,
    pub item_id: Uuid,
    pub quantity: i32,
    pub payment_method: PaymentMethod,
    /// Courier the purchaser asked for at checkout
    #[sea_orm(nullable)]
    pub shipping_method: Option<String>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::customer::Entity",
        from = "Column::CustomerId",
        to = "super::customer::Column::Id"
    )]
    Customer,
    #[sea_orm(
        belongs_to = "super::item::Entity",
        from = "Column::ItemId",
        to = "super::item::Column::Id"
    )]
    Item,
    #[sea_orm(has_one = "super::payment::Entity")]
    Payment,
    #[sea_orm(has_one = "super::shipping::Entity")]
    Shipping,
}

impl Related<super::customer::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Customer.def()
    }
}

impl Related<super::item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Item.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payment.def()
    }
}

impl Related<super::shipping::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Shipping.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Order status enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "shipped")]
    Shipped,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl OrderStatus {
    /// Orders that have not been paid for or dispatched yet
    pub fn is_cancellable(self) -> bool {
        matches!(self, OrderStatus::Pending | OrderStatus::New)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Completed | OrderStatus::Cancelled)
    }
}

super::status_enum_text!(OrderStatus);

/// Payment methods offered at checkout
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "GCash")]
    GCash,
    #[sea_orm(string_value = "Maya")]
    Maya,
    #[sea_orm(string_value = "COD")]
    #[serde(rename = "COD")]
    Cod,
    #[sea_orm(string_value = "Card")]
    Card,
    #[sea_orm(string_value = "PayPal")]
    PayPal,
}

impl PaymentMethod {
    /// Maps free-form input onto a known method.
    ///
    /// Matching ignores case, spaces, dashes and underscores, so "Cash on
    /// Delivery", "cash-on-delivery" and "COD" all land on the same method.
    /// Returns `None` for anything unrecognised.
    pub fn from_alias(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();

        match key.as_str() {
            "cod" | "cash" | "cashondelivery" => Some(PaymentMethod::Cod),
            "gcash" => Some(PaymentMethod::GCash),
            "maya" | "paymaya" => Some(PaymentMethod::Maya),
            "card" | "creditcard" | "debitcard" => Some(PaymentMethod::Card),
            "paypal" => Some(PaymentMethod::PayPal),
            _ => None,
        }
    }

    /// Like `from_alias`, falling back to `default` for unrecognised input
    pub fn normalize(raw: Option<&str>, default: PaymentMethod) -> Self {
        raw.and_then(Self::from_alias).unwrap_or(default)
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&sea_orm::ActiveEnum::to_value(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ServiceError;
    use rstest::rstest;

    #[rstest]
    #[case("COD", PaymentMethod::Cod)]
    #[case("Cash on Delivery", PaymentMethod::Cod)]
    #[case("cash-on-delivery", PaymentMethod::Cod)]
    #[case("gcash", PaymentMethod::GCash)]
    #[case("PayMaya", PaymentMethod::Maya)]
    #[case("Credit Card", PaymentMethod::Card)]
    #[case("PAYPAL", PaymentMethod::PayPal)]
    fn recognises_aliases(#[case] raw: &str, #[case] expected: PaymentMethod) {
        assert_eq!(PaymentMethod::from_alias(raw), Some(expected));
    }

    #[rstest]
    #[case(Some("bitcoin"))]
    #[case(Some(""))]
    #[case(None)]
    fn unrecognised_methods_use_default(#[case] raw: Option<&str>) {
        assert_eq!(
            PaymentMethod::normalize(raw, PaymentMethod::Cod),
            PaymentMethod::Cod
        );
    }

    #[test]
    fn parses_status_strings_case_insensitively() {
        assert_eq!(" Shipped ".parse::<OrderStatus>().unwrap(), OrderStatus::Shipped);
        assert_eq!(OrderStatus::Completed.to_string(), "completed");
    }

    #[test]
    fn unknown_status_string_is_reported() {
        let err = "lost_in_transit".parse::<OrderStatus>().unwrap_err();
        assert!(matches!(err, ServiceError::UnknownStatus(s) if s == "lost_in_transit"));
    }

    #[test]
    fn only_unfulfilled_orders_are_cancellable() {
        assert!(OrderStatus::Pending.is_cancellable());
        assert!(OrderStatus::New.is_cancellable());
        assert!(!OrderStatus::Paid.is_cancellable());
        assert!(!OrderStatus::Shipped.is_cancellable());
    }
}
