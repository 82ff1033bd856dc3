use crate::{
    entities::product,
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryOrder, Set,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Read access to the product catalog, plus the handful of writes needed to
/// seed it and change prices.
#[derive(Clone)]
pub struct CatalogService {
    db: Arc<DatabaseConnection>,
}

impl CatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Loads a product or fails with `ProductNotFound`.
    #[instrument(skip(self))]
    pub async fn find_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        find_product_in(&*self.db, product_id).await
    }

    /// Lists products newest first. `page` is 1-indexed.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = product::Entity::find()
            .order_by_desc(product::Column::CreatedAt)
            .order_by_asc(product::Column::Id)
            .paginate(&*self.db, per_page.max(1));

        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((data, total))
    }

    #[instrument(skip(self))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let now = Utc::now();
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(input.name.trim().to_string()),
            description: Set(input.description),
            price: Set(input.price),
            original_price: Set(input.original_price),
            stock: Set(input.stock),
            image_url: Set(input.image_url),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(product_id = %product.id, "created product {}", product.name);
        Ok(product)
    }

    /// Changes the current selling price. Past orders keep the price they
    /// were placed at.
    #[instrument(skip(self))]
    pub async fn update_price(
        &self,
        product_id: Uuid,
        price: Decimal,
    ) -> Result<product::Model, ServiceError> {
        if price.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "Price cannot be negative".to_string(),
            ));
        }

        let existing = find_product_in(&*self.db, product_id).await?;
        let previous = existing.price;

        let mut active: product::ActiveModel = existing.into();
        active.price = Set(price);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db).await?;

        info!(%product_id, %previous, new_price = %price, "product price changed");
        Ok(updated)
    }
}

pub(crate) async fn find_product_in<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
) -> Result<product::Model, ServiceError> {
    product::Entity::find_by_id(product_id)
        .one(conn)
        .await?
        .ok_or(ServiceError::ProductNotFound(product_id))
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 255), custom = "validate_not_blank")]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_non_negative")]
    pub price: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub original_price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub stock: i32,
    pub image_url: Option<String>,
}

pub(crate) fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("must not be blank".into());
        return Err(err);
    }
    Ok(())
}

pub(crate) fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    Ok(())
}
