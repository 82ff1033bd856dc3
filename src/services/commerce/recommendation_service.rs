use crate::{
    entities::{order_item, product},
    errors::ServiceError,
};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    QueryTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

/// "Frequently bought together" lookups over order history.
///
/// Read-only; the connection may point at a read replica.
#[derive(Clone)]
pub struct RecommendationService {
    db: Arc<DatabaseConnection>,
    default_limit: u64,
}

impl RecommendationService {
    pub fn new(db: Arc<DatabaseConnection>, default_limit: u64) -> Self {
        Self { db, default_limit }
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// Other products appearing in orders that contain `product_id`, most
    /// frequent first, at most `limit` of them. Ties go to the lower id.
    #[instrument(skip(self))]
    pub async fn frequently_bought_with(
        &self,
        product_id: Uuid,
        limit: u64,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let ranked = self.co_purchase_counts(product_id, limit).await?;
        if ranked.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = ranked.iter().map(|(id, _)| *id).collect();
        let mut by_id: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(ids))
            .all(&*self.db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        Ok(ranked
            .into_iter()
            .filter_map(|(id, _)| by_id.remove(&id))
            .collect())
    }

    /// `(product_id, occurrences)` pairs behind [`Self::frequently_bought_with`]
    #[instrument(skip(self))]
    pub async fn co_purchase_counts(
        &self,
        product_id: Uuid,
        limit: u64,
    ) -> Result<Vec<(Uuid, i64)>, ServiceError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let orders_with_product = order_item::Entity::find()
            .select_only()
            .column(order_item::Column::OrderId)
            .filter(order_item::Column::ProductId.eq(product_id))
            .into_query();

        let counts: Vec<(Uuid, i64)> = order_item::Entity::find()
            .select_only()
            .column(order_item::Column::ProductId)
            .column_as(order_item::Column::Id.count(), "occurrences")
            .filter(order_item::Column::OrderId.in_subquery(orders_with_product))
            .filter(order_item::Column::ProductId.ne(product_id))
            .group_by(order_item::Column::ProductId)
            .order_by_desc(order_item::Column::Id.count())
            .order_by_asc(order_item::Column::ProductId)
            .limit(limit)
            .into_tuple()
            .all(&*self.db)
            .await?;

        debug!(%product_id, found = counts.len(), "co-purchase counts");
        Ok(counts)
    }
}
