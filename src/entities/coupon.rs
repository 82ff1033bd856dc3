use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Percentage-off discount rule, looked up by its upper-cased code
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    /// Fraction in `[0, 1)`, e.g. `0.20` for 20% off
    #[sea_orm(column_type = "Decimal(Some((5, 4)))")]
    pub discount_percent: Decimal,
    /// Minimum order total; `None` means no threshold
    #[sea_orm(column_type = "Decimal(Some((16, 4)))", nullable)]
    pub min_spend: Option<Decimal>,
    /// Last day the coupon can be used; `None` never expires
    #[sea_orm(nullable)]
    pub expiry_date: Option<NaiveDate>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// The expiry date itself is still a valid day.
    pub fn is_valid_on(&self, today: NaiveDate) -> bool {
        self.active && self.expiry_date.map_or(true, |expiry| today <= expiry)
    }

    pub fn meets_min_spend(&self, order_total: Decimal) -> bool {
        self.min_spend.map_or(true, |min| order_total >= min)
    }

    /// Discount in currency units, rounded to cents
    pub fn discount_for(&self, order_total: Decimal) -> Decimal {
        (order_total * self.discount_percent)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Canonical form of a user-entered coupon code
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn coupon(expiry_date: Option<NaiveDate>, active: bool) -> Model {
        Model {
            id: Uuid::new_v4(),
            code: "SPRING20".into(),
            discount_percent: dec!(0.20),
            min_spend: None,
            expiry_date,
            active,
            created_at: Utc::now(),
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[rstest]
    #[case(Some(10), true, 9, true)]
    #[case(Some(10), true, 10, true)]
    #[case(Some(10), true, 11, false)]
    #[case(None, true, 28, true)]
    #[case(None, false, 1, false)]
    #[case(Some(10), false, 9, false)]
    fn validity_window(
        #[case] expiry: Option<u32>,
        #[case] active: bool,
        #[case] today: u32,
        #[case] expected: bool,
    ) {
        assert_eq!(coupon(expiry.map(day), active).is_valid_on(day(today)), expected);
    }

    #[test]
    fn twenty_percent_off_one_hundred() {
        let c = coupon(None, true);
        let discount = c.discount_for(dec!(100.00));
        assert_eq!(discount, dec!(20.00));
        assert_eq!(dec!(100.00) - discount, dec!(80.00));
    }

    #[test]
    fn discount_rounds_half_cents_away_from_zero() {
        let mut c = coupon(None, true);
        c.discount_percent = dec!(0.15);
        // 0.15 * 10.10 = 1.515
        assert_eq!(c.discount_for(dec!(10.10)), dec!(1.52));
    }

    #[test]
    fn min_spend_is_inclusive() {
        let mut c = coupon(None, true);
        c.min_spend = Some(dec!(50.00));
        assert!(c.meets_min_spend(dec!(50.00)));
        assert!(!c.meets_min_spend(dec!(40.00)));
    }

    #[test]
    fn codes_are_upper_cased_and_trimmed() {
        assert_eq!(normalize_code("  spring20 "), "SPRING20");
    }
}
