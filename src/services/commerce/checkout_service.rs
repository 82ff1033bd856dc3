use super::{
    cart_service::{self, CartWithItems},
    coupon_service,
    order_service::OrderWithItems,
};
use crate::{
    entities::{
        coupon,
        order::{self, OrderStatus},
        order_item, product,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, DatabaseConnection, DatabaseTransaction,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Price breakdown shown before the order is placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutQuote {
    pub original_total: Decimal,
    pub discount: Decimal,
    pub final_total: Decimal,
    pub coupon_code: Option<String>,
    pub item_count: i64,
}

/// Returns `(discount, final_total)` for an order total and optional coupon
pub fn apply_coupon(original_total: Decimal, coupon: Option<&coupon::Model>) -> (Decimal, Decimal) {
    let discount = coupon.map_or(Decimal::ZERO, |c| c.discount_for(original_total));
    (discount, original_total - discount)
}

/// Turns a cart into an order.
///
/// `place_order` is a single transaction: the cart row and every product row
/// it references are locked (products in ascending id order), the coupon is
/// validated again, stock is checked for every line before any of it is
/// decremented, and the cart is emptied only once the order rows exist. Any
/// failure rolls all of it back. Persistence failures are not retried.
#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl CheckoutService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Prices the current cart with an optional coupon without placing
    /// anything. Used to give feedback when a shopper applies a code.
    #[instrument(skip(self))]
    pub async fn quote(
        &self,
        user_id: Uuid,
        coupon_code: Option<&str>,
    ) -> Result<CheckoutQuote, ServiceError> {
        let cart = cart_service::load_cart(&*self.db, user_id).await?;
        if cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let original_total = cart.total_amount();
        let coupon = match normalized(coupon_code) {
            Some(code) => {
                Some(coupon_service::get_valid_coupon_in(&*self.db, code, original_total).await?)
            }
            None => None,
        };
        let (discount, final_total) = apply_coupon(original_total, coupon.as_ref());

        Ok(CheckoutQuote {
            original_total,
            discount,
            final_total,
            coupon_code: coupon.map(|c| c.code),
            item_count: cart.item_count(),
        })
    }

    /// Places an order for everything in the user's cart.
    #[instrument(skip(self))]
    pub async fn place_order(
        &self,
        user_id: Uuid,
        coupon_code: Option<&str>,
    ) -> Result<OrderWithItems, ServiceError> {
        match self.place_order_atomically(user_id, normalized(coupon_code)).await {
            Ok(placed) => {
                counter!("storefront.orders_placed", 1);
                info!(
                    order_id = %placed.order.id,
                    total = %placed.order.total_amount,
                    "Placed order for user {}",
                    user_id
                );
                self.event_sender
                    .send_or_log(Event::OrderPlaced {
                        order_id: placed.order.id,
                        user_id,
                        total_amount: placed.order.total_amount,
                        coupon_code: placed.order.coupon_code.clone(),
                        placed_at: placed.order.created_at,
                    })
                    .await;
                Ok(placed)
            }
            Err(e) if e.is_user_correctable() => {
                counter!("storefront.checkout_rejected", 1, "reason" => rejection_reason(&e));
                warn!(error = %e, "Checkout rejected for user {}", user_id);
                self.event_sender
                    .send_or_log(Event::CheckoutRejected {
                        user_id,
                        reason: e.to_string(),
                    })
                    .await;
                Err(e)
            }
            Err(e) => {
                counter!("storefront.checkout_failed", 1);
                error!(error = %e, "Checkout failed for user {}; rolled back", user_id);
                Err(e)
            }
        }
    }

    async fn place_order_atomically(
        &self,
        user_id: Uuid,
        coupon_code: Option<&str>,
    ) -> Result<OrderWithItems, ServiceError> {
        let txn = self.db.begin().await?;

        // Holding the cart row serializes checkouts and edits of this cart.
        let locked_cart = cart_service::lock_user_cart(&txn, user_id).await?;
        let cart = cart_service::load_cart(&txn, user_id).await?;
        if cart.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let products = lock_products(&txn, &cart).await?;
        let original_total = priced_total(&cart, &products);

        let coupon = match coupon_code {
            Some(code) => {
                Some(coupon_service::get_valid_coupon_in(&txn, code, original_total).await?)
            }
            None => None,
        };
        let (discount, final_total) = apply_coupon(original_total, coupon.as_ref());

        // Every line is checked before any stock moves.
        for line in &cart.items {
            let product = products
                .get(&line.product_id)
                .ok_or(ServiceError::ProductNotFound(line.product_id))?;
            if !product.in_stock(line.quantity) {
                return Err(ServiceError::InsufficientStock {
                    product_id: product.id,
                    requested: line.quantity,
                    available: product.stock,
                });
            }
        }

        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let mut items = Vec::with_capacity(products.len());

        for (product_id, product) in &products {
            let quantity = cart
                .items
                .iter()
                .find(|line| line.product_id == *product_id)
                .map_or(0, |line| line.quantity);

            decrement_stock(&txn, *product_id, quantity).await?;

            items.push(order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(*product_id),
                quantity: Set(quantity),
                price_at_purchase: Set(product.price),
            });
        }

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            subtotal: Set(original_total),
            discount_total: Set(discount),
            total_amount: Set(final_total),
            coupon_code: Set(coupon.map(|c| c.code)),
            status: Set(OrderStatus::Placed),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        order_item::Entity::insert_many(items)
            .exec_without_returning(&txn)
            .await?;

        cart_service::clear_items(&txn, locked_cart.id).await?;

        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .order_by_asc(order_item::Column::ProductId)
            .all(&txn)
            .await?;

        txn.commit().await?;

        Ok(OrderWithItems { order, items })
    }
}

/// Locks every product in the cart, lowest id first, so two checkouts
/// sharing products always acquire locks in the same order.
async fn lock_products(
    txn: &DatabaseTransaction,
    cart: &CartWithItems,
) -> Result<BTreeMap<Uuid, product::Model>, ServiceError> {
    let mut ids: Vec<Uuid> = cart.items.iter().map(|line| line.product_id).collect();
    ids.sort();
    ids.dedup();

    let mut locked = BTreeMap::new();
    for id in ids {
        let product = product::Entity::find_by_id(id)
            .lock_exclusive()
            .one(txn)
            .await?
            .ok_or(ServiceError::ProductNotFound(id))?;
        locked.insert(id, product);
    }
    Ok(locked)
}

/// Order total at the locked prices, which are the prices snapshotted into
/// the order lines.
fn priced_total(cart: &CartWithItems, products: &BTreeMap<Uuid, product::Model>) -> Decimal {
    cart.items
        .iter()
        .filter_map(|line| {
            products
                .get(&line.product_id)
                .map(|p| p.price * Decimal::from(line.quantity))
        })
        .sum()
}

/// `stock = stock - quantity` guarded by `stock >= quantity`. Zero affected
/// rows means another checkout took the units first.
async fn decrement_stock(
    txn: &DatabaseTransaction,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = product::Entity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(txn)
        .await?;

    if result.rows_affected == 0 {
        let available = product::Entity::find_by_id(product_id)
            .one(txn)
            .await?
            .map_or(0, |p| p.stock);
        return Err(ServiceError::InsufficientStock {
            product_id,
            requested: quantity,
            available,
        });
    }
    Ok(())
}

fn normalized(code: Option<&str>) -> Option<&str> {
    code.map(str::trim).filter(|c| !c.is_empty())
}

fn rejection_reason(err: &ServiceError) -> &'static str {
    match err {
        ServiceError::EmptyCart => "empty_cart",
        ServiceError::Coupon(_) => "coupon",
        ServiceError::InsufficientStock { .. } => "insufficient_stock",
        ServiceError::ProductNotFound(_) => "product_not_found",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn coupon(percent: Decimal) -> coupon::Model {
        coupon::Model {
            id: Uuid::new_v4(),
            code: "TAKE".into(),
            discount_percent: percent,
            min_spend: None,
            expiry_date: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn no_coupon_charges_the_original_total() {
        assert_eq!(apply_coupon(dec!(42.10), None), (Decimal::ZERO, dec!(42.10)));
    }

    #[test]
    fn twenty_percent_of_one_hundred() {
        let c = coupon(dec!(0.20));
        assert_eq!(apply_coupon(dec!(100.00), Some(&c)), (dec!(20.00), dec!(80.00)));
    }

    #[test]
    fn final_total_never_exceeds_original() {
        let c = coupon(dec!(0.333));
        let (discount, final_total) = apply_coupon(dec!(9.99), Some(&c));
        assert_eq!(discount, dec!(3.33));
        assert_eq!(final_total, dec!(6.66));
    }

    #[test]
    fn blank_coupon_code_is_ignored() {
        assert_eq!(normalized(Some("  ")), None);
        assert_eq!(normalized(Some(" save ")), Some("save"));
        assert_eq!(normalized(None), None);
    }
}
