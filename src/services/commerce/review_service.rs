use super::catalog_service::{find_product_in, validate_not_blank};
use crate::{
    entities::review,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

/// Input for adding a review
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddReviewInput {
    #[validate(range(min = 1, max = 5))]
    pub rating: i32,
    #[validate(length(max = 4000), custom = "validate_not_blank")]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RatingSummary {
    pub count: u64,
    /// Mean rating rounded to two places; `None` without reviews
    pub average: Option<Decimal>,
}

impl RatingSummary {
    pub fn from_ratings(ratings: &[i32]) -> Self {
        if ratings.is_empty() {
            return Self {
                count: 0,
                average: None,
            };
        }
        let count = ratings.len() as u64;
        let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
        let average = (Decimal::from(sum) / Decimal::from(count))
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            count,
            average: Some(average),
        }
    }
}

#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, input))]
    pub async fn add_review(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        input: AddReviewInput,
    ) -> Result<review::Model, ServiceError> {
        input.validate()?;
        find_product_in(&*self.db, product_id).await?;

        let created = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product_id),
            user_id: Set(user_id),
            rating: Set(input.rating),
            comment: Set(input.comment.trim().to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        self.event_sender
            .send_or_log(Event::ReviewAdded {
                review_id: created.id,
                product_id,
                rating: created.rating,
            })
            .await;

        info!(review_id = %created.id, %product_id, "review added");
        Ok(created)
    }

    /// Reviews for a product, newest first
    pub async fn reviews_for_product(
        &self,
        product_id: Uuid,
    ) -> Result<Vec<review::Model>, ServiceError> {
        Ok(review::Entity::find()
            .filter(review::Column::ProductId.eq(product_id))
            .order_by_desc(review::Column::CreatedAt)
            .order_by_desc(review::Column::Id)
            .all(&*self.db)
            .await?)
    }

    pub async fn rating_summary(&self, product_id: Uuid) -> Result<RatingSummary, ServiceError> {
        let ratings: Vec<i32> = review::Entity::find()
            .select_only()
            .column(review::Column::Rating)
            .filter(review::Column::ProductId.eq(product_id))
            .into_tuple()
            .all(&*self.db)
            .await?;
        Ok(RatingSummary::from_ratings(&ratings))
    }
}
