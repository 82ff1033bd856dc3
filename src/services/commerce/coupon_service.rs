use super::catalog_service::{validate_non_negative, validate_not_blank};
use crate::{
    entities::coupon::{self, normalize_code},
    errors::{CouponError, ServiceError},
    events::{Event, EventSender},
};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Checks a coupon against an order total.
///
/// Steps short-circuit in this order: unknown code, expired or inactive,
/// minimum spend not met. Pure; the caller supplies the lookup result and
/// today's date.
pub fn validate_coupon(
    coupon: Option<coupon::Model>,
    code: &str,
    order_total: Decimal,
    today: NaiveDate,
) -> Result<coupon::Model, CouponError> {
    let code = normalize_code(code);
    let coupon = coupon.ok_or_else(|| CouponError::NotFound(code.clone()))?;

    if !coupon.is_valid_on(today) {
        return Err(CouponError::Expired(coupon.code));
    }

    if !coupon.meets_min_spend(order_total) {
        return Err(CouponError::MinSpendNotMet {
            min_spend: coupon.min_spend.unwrap_or(Decimal::ZERO),
            code: coupon.code,
            order_total,
        });
    }

    Ok(coupon)
}

/// Looks up a coupon by its case-insensitive code
pub(crate) async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<coupon::Model>, DbErr> {
    coupon::Entity::find()
        .filter(coupon::Column::Code.eq(normalize_code(code)))
        .one(conn)
        .await
}

/// Looks up and validates a coupon on the given connection.
pub(crate) async fn get_valid_coupon_in<C: ConnectionTrait>(
    conn: &C,
    code: &str,
    order_total: Decimal,
) -> Result<coupon::Model, ServiceError> {
    let found = find_by_code(conn, code).await?;
    Ok(validate_coupon(
        found,
        code,
        order_total,
        Utc::now().date_naive(),
    )?)
}

/// Coupon lookup for shoppers and coupon administration for the back office.
#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self))]
    pub async fn get_valid_coupon(
        &self,
        code: &str,
        order_total: Decimal,
    ) -> Result<coupon::Model, ServiceError> {
        get_valid_coupon_in(&*self.db, code, order_total).await
    }

    #[instrument(skip(self))]
    pub async fn create_coupon(
        &self,
        input: CreateCouponInput,
    ) -> Result<coupon::Model, ServiceError> {
        input.validate()?;
        let code = normalize_code(&input.code);

        if find_by_code(&*self.db, &code).await?.is_some() {
            return Err(ServiceError::InvalidOperation(format!(
                "Coupon {} already exists",
                code
            )));
        }

        let created = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.clone()),
            discount_percent: Set(input.discount_percent),
            min_spend: Set(input.min_spend),
            expiry_date: Set(input.expiry_date),
            active: Set(input.active.unwrap_or(true)),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::InvalidOperation(format!("Coupon {} already exists", code))
            }
            _ => ServiceError::from(e),
        })?;

        self.event_sender
            .send_or_log(Event::CouponCreated {
                coupon_id: created.id,
                code: created.code.clone(),
            })
            .await;

        info!(coupon_id = %created.id, "created coupon {}", created.code);
        Ok(created)
    }

    pub async fn list_coupons(&self) -> Result<Vec<coupon::Model>, ServiceError> {
        Ok(coupon::Entity::find()
            .order_by_asc(coupon::Column::Code)
            .all(&*self.db)
            .await?)
    }

    #[instrument(skip(self))]
    pub async fn delete_coupon(&self, coupon_id: Uuid) -> Result<(), ServiceError> {
        let result = coupon::Entity::delete_by_id(coupon_id)
            .exec(&*self.db)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "Coupon {} not found",
                coupon_id
            )));
        }

        info!("Deleted coupon {}", coupon_id);
        Ok(())
    }
}

/// Input for creating a coupon
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCouponInput {
    #[validate(length(min = 1, max = 64), custom = "validate_not_blank")]
    pub code: String,
    #[validate(custom = "validate_discount_percent")]
    pub discount_percent: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub min_spend: Option<Decimal>,
    pub expiry_date: Option<NaiveDate>,
    pub active: Option<bool>,
}

fn validate_discount_percent(value: &Decimal) -> Result<(), ValidationError> {
    if (value.is_sign_negative() && !value.is_zero()) || *value >= Decimal::ONE {
        let mut err = ValidationError::new("discount_percent");
        err.message = Some("discount_percent must be in [0, 1)".into());
        return Err(err);
    }
    Ok(())
}
