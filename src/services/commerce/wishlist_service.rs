use super::catalog_service::find_product_in;
use crate::{
    entities::{product, wishlist_item},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct WishlistEntry {
    pub added_at: chrono::DateTime<Utc>,
    pub product: product::Model,
}

#[derive(Clone)]
pub struct WishlistService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl WishlistService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Adds the product to the wishlist or removes it if already there.
    /// Returns whether the product is a favorite afterwards.
    #[instrument(skip(self))]
    pub async fn toggle_favorite(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let txn = self.db.begin().await?;
        find_product_in(&txn, product_id).await?;

        let existing = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::UserId.eq(user_id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .one(&txn)
            .await?;

        let favorite = match existing {
            Some(entry) => {
                wishlist_item::Entity::delete_by_id(entry.id)
                    .exec(&txn)
                    .await?;
                false
            }
            None => {
                wishlist_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    created_at: Set(Utc::now()),
                }
                .insert(&txn)
                .await?;
                true
            }
        };

        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::WishlistToggled {
                user_id,
                product_id,
                favorite,
            })
            .await;

        info!(%user_id, %product_id, favorite, "wishlist toggled");
        Ok(favorite)
    }

    pub async fn is_favorite(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, ServiceError> {
        let count = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::UserId.eq(user_id))
            .filter(wishlist_item::Column::ProductId.eq(product_id))
            .count(&*self.db)
            .await?;
        Ok(count > 0)
    }

    /// Wishlist entries with their products, most recently added first
    #[instrument(skip(self))]
    pub async fn wishlist_for_user(&self, user_id: Uuid) -> Result<Vec<WishlistEntry>, ServiceError> {
        let rows = wishlist_item::Entity::find()
            .filter(wishlist_item::Column::UserId.eq(user_id))
            .order_by_desc(wishlist_item::Column::CreatedAt)
            .find_also_related(product::Entity)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(entry, product)| {
                product.map(|product| WishlistEntry {
                    added_at: entry.created_at,
                    product,
                })
            })
            .collect())
    }
}
