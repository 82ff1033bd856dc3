use crate::handlers::common::{success_response, CurrentUser};
use crate::{
    errors::ServiceError,
    services::commerce::{AddToCartInput, CartWithItems},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Creates the router for the caller's cart
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_cart).delete(clear_cart))
        .route("/items", post(add_to_cart))
        .route(
            "/items/:product_id",
            put(update_cart_item).delete(remove_cart_item),
        )
}

/// Get cart with items; totals are recomputed from current prices
async fn get_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.get_or_create_cart(user_id).await?;
    Ok(success_response(CartResponse::from(cart)))
}

/// Add item to cart
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<AddToCartInput>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .cart
        .add_item(user_id, payload.product_id, payload.quantity)
        .await?;
    Ok(success_response(CartResponse::from(cart)))
}

/// Update cart item quantity; zero removes the line
async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(product_id): Path<Uuid>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .cart
        .update_quantity(user_id, product_id, payload.quantity)
        .await?;
    Ok(success_response(CartResponse::from(cart)))
}

async fn remove_cart_item(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state
        .services
        .cart
        .remove_item(user_id, product_id)
        .await?;
    Ok(success_response(CartResponse::from(cart)))
}

async fn clear_cart(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.cart.clear(user_id).await?;
    Ok(success_response(CartResponse::from(cart)))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

// Response DTOs

#[derive(Debug, Serialize, Deserialize)]
pub struct CartResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<CartItemResponse>,
    pub item_count: i64,
    pub total_amount: rust_decimal::Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CartItemResponse {
    pub product_id: Uuid,
    pub name: Option<String>,
    pub unit_price: Option<rust_decimal::Decimal>,
    pub quantity: i32,
    pub line_total: rust_decimal::Decimal,
    /// False when the product no longer exists
    pub available: bool,
}

impl From<CartWithItems> for CartResponse {
    fn from(view: CartWithItems) -> Self {
        let item_count = view.item_count();
        let items = view
            .items
            .into_iter()
            .map(|line| CartItemResponse {
                product_id: line.product_id,
                available: line.product.is_some(),
                name: line.product.as_ref().map(|p| p.name.clone()),
                unit_price: line.product.as_ref().map(|p| p.price),
                quantity: line.quantity,
                line_total: line.line_total,
            })
            .collect();

        Self {
            id: view.cart.id,
            user_id: view.cart.user_id,
            items,
            item_count,
            total_amount: view.cart.total_amount,
        }
    }
}
