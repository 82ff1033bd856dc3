use crate::{
    config::AppConfig,
    entities::{cart, cart_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::{Expr, OnConflict}, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection,
    DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Cart manager.
///
/// Every user owns exactly one cart, created lazily on first access. The
/// stored `total_amount` is never trusted: each load recomputes it from the
/// live product prices and overwrites the stored value when they differ.
///
/// Mutations run in a transaction that locks the cart row, so two tabs
/// editing the same cart are applied one after the other.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
    config: Arc<AppConfig>,
}

impl CartService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            db,
            event_sender,
            config,
        }
    }

    /// Returns the user's cart with a freshly recomputed total, creating an
    /// empty cart on first access.
    #[instrument(skip(self))]
    pub async fn get_or_create_cart(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        load_cart(&*self.db, user_id).await
    }

    /// Adds `quantity` units of a product, merging with an existing line.
    ///
    /// Stock is not reserved here. With `enforce_stock_on_add` enabled the
    /// resulting line quantity must not exceed current stock.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be greater than zero".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let cart = lock_user_cart(&txn, user_id).await?;

        let product = product::Entity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or(ServiceError::ProductNotFound(product_id))?;

        let existing = find_line(&txn, cart.id, product_id).await?;
        let current = existing.as_ref().map_or(0, |item| item.quantity);
        let new_quantity = current.checked_add(quantity).ok_or_else(|| {
            ServiceError::ValidationError("Quantity is too large".to_string())
        })?;

        if self.config.enforce_stock_on_add && new_quantity > product.stock {
            return Err(ServiceError::InsufficientStock {
                product_id,
                requested: new_quantity,
                available: product.stock,
            });
        }

        let now = Utc::now();
        match existing {
            Some(item) => {
                let mut item: cart_item::ActiveModel = item.into();
                item.quantity = Set(new_quantity);
                item.updated_at = Set(now);
                item.update(&txn).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&txn)
                .await?;
            }
        }

        let view = load_cart(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemAdded {
                user_id,
                product_id,
                quantity,
            })
            .await;

        info!(
            "Added product {} x{} to cart of user {}",
            product_id, quantity, user_id
        );
        Ok(view)
    }

    /// Removes the line for `product_id`. Removing a product that is not in
    /// the cart leaves the cart unchanged.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = lock_user_cart(&txn, user_id).await?;

        let removed = cart_item::Entity::delete_many()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .exec(&txn)
            .await?
            .rows_affected;

        let view = load_cart(&txn, user_id).await?;
        txn.commit().await?;

        if removed > 0 {
            self.event_sender
                .send_or_log(Event::CartItemRemoved {
                    user_id,
                    product_id,
                })
                .await;
            info!("Removed product {} from cart of user {}", product_id, user_id);
        }

        Ok(view)
    }

    /// Overwrites the quantity of an existing line. A quantity of zero or
    /// less is the same as [`CartService::remove_item`].
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<CartWithItems, ServiceError> {
        if quantity <= 0 {
            return self.remove_item(user_id, product_id).await;
        }

        let txn = self.db.begin().await?;
        let cart = lock_user_cart(&txn, user_id).await?;

        let item = find_line(&txn, cart.id, product_id).await?.ok_or_else(|| {
            ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
        })?;

        if self.config.enforce_stock_on_add {
            let product = product::Entity::find_by_id(product_id)
                .one(&txn)
                .await?
                .ok_or(ServiceError::ProductNotFound(product_id))?;
            if quantity > product.stock {
                return Err(ServiceError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available: product.stock,
                });
            }
        }

        let mut item: cart_item::ActiveModel = item.into();
        item.quantity = Set(quantity);
        item.updated_at = Set(Utc::now());
        item.update(&txn).await?;

        let view = load_cart(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartItemQuantityChanged {
                user_id,
                product_id,
                quantity,
            })
            .await;

        Ok(view)
    }

    /// Empties the cart and zeroes its total.
    #[instrument(skip(self))]
    pub async fn clear(&self, user_id: Uuid) -> Result<CartWithItems, ServiceError> {
        let txn = self.db.begin().await?;
        let cart = lock_user_cart(&txn, user_id).await?;
        clear_items(&txn, cart.id).await?;
        let view = load_cart(&txn, user_id).await?;
        txn.commit().await?;

        self.event_sender
            .send_or_log(Event::CartCleared { user_id })
            .await;

        info!("Cleared cart of user {}", user_id);
        Ok(view)
    }
}

/// A cart line joined with its product.
///
/// `product` is `None` when the product has been deleted since it was added;
/// such a line contributes nothing to the cart total and blocks checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub item_id: Uuid,
    pub product_id: Uuid,
    pub product: Option<product::Model>,
    pub quantity: i32,
    pub line_total: Decimal,
}

impl CartLine {
    fn new(item: cart_item::Model, product: Option<product::Model>) -> Self {
        let line_total = product
            .as_ref()
            .map_or(Decimal::ZERO, |p| p.price * Decimal::from(item.quantity));
        Self {
            item_id: item.id,
            product_id: item.product_id,
            product,
            quantity: item.quantity,
            line_total,
        }
    }
}

/// Cart with items
#[derive(Debug, Clone, Serialize)]
pub struct CartWithItems {
    pub cart: cart::Model,
    pub items: Vec<CartLine>,
}

impl CartWithItems {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_amount(&self) -> Decimal {
        self.cart.total_amount
    }

    /// Total number of units across all lines
    pub fn item_count(&self) -> i64 {
        self.items.iter().map(|line| i64::from(line.quantity)).sum()
    }
}

/// Sum of price × quantity over lines whose product still exists
pub fn cart_total(lines: &[CartLine]) -> Decimal {
    lines.iter().map(|line| line.line_total).sum()
}

/// Input for adding item to cart
#[derive(Debug, Clone, Deserialize)]
pub struct AddToCartInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Loads the user's cart and items, recomputing the total from live prices.
///
/// Runs on whatever connection it is given so checkout can load the cart
/// inside its own transaction.
pub(crate) async fn load_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<CartWithItems, ServiceError> {
    let cart = find_or_create_cart(conn, user_id).await?;

    let items = cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .order_by_asc(cart_item::Column::CreatedAt)
        .order_by_asc(cart_item::Column::Id)
        .all(conn)
        .await?;

    let product_ids: Vec<Uuid> = items.iter().map(|item| item.product_id).collect();
    let products: HashMap<Uuid, product::Model> = if product_ids.is_empty() {
        HashMap::new()
    } else {
        product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect()
    };

    let lines: Vec<CartLine> = items
        .into_iter()
        .map(|item| {
            let product = products.get(&item.product_id).cloned();
            CartLine::new(item, product)
        })
        .collect();

    let total = cart_total(&lines);
    let cart = if cart.total_amount != total {
        debug!(
            cart_id = %cart.id,
            stored = %cart.total_amount,
            recomputed = %total,
            "overwriting stale cart total"
        );
        let mut active: cart::ActiveModel = cart.into();
        active.total_amount = Set(total);
        active.updated_at = Set(Utc::now());
        active.update(conn).await?
    } else {
        cart
    };

    Ok(CartWithItems { cart, items: lines })
}

/// Finds the user's cart, creating it if needed. Safe against two requests
/// creating the same cart concurrently.
pub(crate) async fn find_or_create_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<cart::Model, ServiceError> {
    if let Some(cart) = find_cart_by_user(conn, user_id).await? {
        return Ok(cart);
    }

    let now = Utc::now();
    let new_cart = cart::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user_id),
        total_amount: Set(Decimal::ZERO),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let inserted = cart::Entity::insert(new_cart)
        .on_conflict(
            OnConflict::column(cart::Column::UserId)
                .do_nothing()
                .to_owned(),
        )
        .exec(conn)
        .await;

    match inserted {
        Ok(_) => info!("Created cart for user {}", user_id),
        Err(DbErr::RecordNotInserted) => debug!("Cart for user {} created concurrently", user_id),
        Err(e) => return Err(e.into()),
    }

    find_cart_by_user(conn, user_id).await?.ok_or_else(|| {
        ServiceError::InternalError(format!("Cart for user {} vanished after creation", user_id))
    })
}

/// Finds or creates the cart, then re-reads it with a row lock held until
/// the surrounding transaction ends.
pub(crate) async fn lock_user_cart<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<cart::Model, ServiceError> {
    let cart = find_or_create_cart(conn, user_id).await?;
    cart::Entity::find_by_id(cart.id)
        .lock_exclusive()
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart.id)))
}

/// Deletes every line and zeroes the stored total
pub(crate) async fn clear_items<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
) -> Result<(), ServiceError> {
    cart_item::Entity::delete_many()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .exec(conn)
        .await?;

    cart::Entity::update_many()
        .col_expr(cart::Column::TotalAmount, Expr::value(Decimal::ZERO))
        .col_expr(cart::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(cart::Column::Id.eq(cart_id))
        .exec(conn)
        .await?;

    Ok(())
}

async fn find_cart_by_user<C: ConnectionTrait>(
    conn: &C,
    user_id: Uuid,
) -> Result<Option<cart::Model>, DbErr> {
    cart::Entity::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(conn)
        .await
}

async fn find_line<C: ConnectionTrait>(
    conn: &C,
    cart_id: Uuid,
    product_id: Uuid,
) -> Result<Option<cart_item::Model>, DbErr> {
    cart_item::Entity::find()
        .filter(cart_item::Column::CartId.eq(cart_id))
        .filter(cart_item::Column::ProductId.eq(product_id))
        .one(conn)
        .await
}
