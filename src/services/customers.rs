use crate::{
    db::DbPool,
    entities::customer::{self, CustomerStatus},
    errors::ServiceError,
    events::{Event, EventSender},
    metrics::CUSTOMERS_CREATED,
    services::codes::{CodeGenerator, CodeKind},
};
use chrono::Utc;
use sea_orm::{
    error::SqlErr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Attempts before giving up when inserts keep colliding on the generated code
const MAX_CREATE_ATTEMPTS: usize = 3;

/// The authenticated end-user acting at checkout or in self-service flows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchaser {
    /// Lowercased, trimmed email; the identity key within a seller
    pub email: String,
    pub display_name: String,
}

impl Purchaser {
    pub fn new(email: impl AsRef<str>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.as_ref().trim().to_ascii_lowercase(),
            display_name: display_name.into(),
        }
    }
}

/// Outcome of a resolution; `created` is true only for the call that inserted the row.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub customer: customer::Model,
    pub created: bool,
}

/// Finds or creates the per-seller customer row for a purchaser.
#[derive(Clone)]
pub struct CustomerResolver {
    db: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    codes: Arc<dyn CodeGenerator>,
    placeholder_address: String,
}

impl CustomerResolver {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        codes: Arc<dyn CodeGenerator>,
        placeholder_address: impl Into<String>,
    ) -> Self {
        Self {
            db,
            event_sender,
            codes,
            placeholder_address: placeholder_address.into(),
        }
    }

    /// Resolves in a transaction of its own and announces a newly created customer.
    #[instrument(skip(self, purchaser), fields(email = %purchaser.email))]
    pub async fn resolve(
        &self,
        purchaser: &Purchaser,
        seller_id: Uuid,
    ) -> Result<customer::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let resolved = self.resolve_in(&txn, purchaser, seller_id).await?;
        txn.commit().await?;

        if resolved.created {
            self.announce(&resolved.customer).await;
        }
        Ok(resolved.customer)
    }

    /// Resolves using `conn`, which is usually the caller's open transaction.
    /// The caller is responsible for calling [`CustomerResolver::announce`]
    /// after its commit when `created` is set.
    pub async fn resolve_in<C>(
        &self,
        conn: &C,
        purchaser: &Purchaser,
        seller_id: Uuid,
    ) -> Result<Resolved, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if let Some(existing) = find_customer(conn, seller_id, &purchaser.email).await? {
            return Ok(Resolved {
                customer: existing,
                created: false,
            });
        }
        self.insert_or_find(conn, purchaser, seller_id).await
    }

    /// Inserts the customer row, treating a uniqueness conflict on
    /// `(seller_id, email)` as a lost race and returning the winner's row.
    ///
    /// Each insert runs in a savepoint so a failed attempt leaves the
    /// surrounding transaction usable for the follow-up lookup.
    pub async fn insert_or_find<C>(
        &self,
        conn: &C,
        purchaser: &Purchaser,
        seller_id: Uuid,
    ) -> Result<Resolved, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            let now = Utc::now();
            let candidate = customer::ActiveModel {
                id: Set(Uuid::new_v4()),
                customer_code: Set(self.codes.generate(CodeKind::Customer)),
                seller_id: Set(seller_id),
                name: Set(purchaser.display_name.clone()),
                email: Set(purchaser.email.clone()),
                address: Set(self.placeholder_address.clone()),
                phone: Set(None),
                status: Set(CustomerStatus::Active),
                created_at: Set(now),
                updated_at: Set(now),
            };

            let savepoint = conn.begin().await?;
            match candidate.insert(&savepoint).await {
                Ok(model) => {
                    savepoint.commit().await?;
                    CUSTOMERS_CREATED.inc();
                    info!(customer_id = %model.id, %seller_id, "created customer for purchaser");
                    return Ok(Resolved {
                        customer: model,
                        created: true,
                    });
                }
                Err(err) => {
                    let unique_violation =
                        matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)));
                    savepoint.rollback().await?;
                    if !unique_violation {
                        return Err(err.into());
                    }
                }
            }

            if let Some(winner) = find_customer(conn, seller_id, &purchaser.email).await? {
                debug!(customer_id = %winner.id, "customer created concurrently; using existing row");
                return Ok(Resolved {
                    customer: winner,
                    created: false,
                });
            }

            // No row for the pair, so the collision was on the generated code.
            warn!(attempt, "customer code collision; retrying with a new code");
        }

        Err(ServiceError::Conflict(format!(
            "could not allocate a customer code for {} after {} attempts",
            purchaser.email, MAX_CREATE_ATTEMPTS
        )))
    }

    pub async fn announce(&self, customer: &customer::Model) {
        self.event_sender
            .send_or_log(Event::CustomerCreated {
                customer_id: customer.id,
                seller_id: customer.seller_id,
            })
            .await;
    }
}

pub(crate) async fn find_customer<C: ConnectionTrait>(
    conn: &C,
    seller_id: Uuid,
    email: &str,
) -> Result<Option<customer::Model>, ServiceError> {
    Ok(customer::Entity::find()
        .filter(customer::Column::SellerId.eq(seller_id))
        .filter(customer::Column::Email.eq(email))
        .one(conn)
        .await?)
}

/// Ids of every customer row sharing the purchaser's email, across all sellers
pub(crate) async fn customer_ids_for_email<C: ConnectionTrait>(
    conn: &C,
    email: &str,
) -> Result<Vec<Uuid>, ServiceError> {
    Ok(customer::Entity::find()
        .filter(customer::Column::Email.eq(email))
        .all(conn)
        .await?
        .into_iter()
        .map(|c| c.id)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purchaser_email_is_normalized() {
        let purchaser = Purchaser::new("  Juan.Dela.Cruz@Example.COM ", "Juan");
        assert_eq!(purchaser.email, "juan.dela.cruz@example.com");
        assert_eq!(purchaser.display_name, "Juan");
    }
}
