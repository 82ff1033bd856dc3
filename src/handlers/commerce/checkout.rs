use crate::handlers::common::{created_response, success_response, CurrentUser};
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Json, State},
    response::IntoResponse,
    routing::post,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(place_order))
        .route("/quote", post(quote))
}

/// Price the cart with an optional coupon
async fn quote(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    payload: Option<Json<CheckoutRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon_code = payload.and_then(|Json(p)| p.coupon_code);
    let quote = state
        .services
        .checkout
        .quote(user_id, coupon_code.as_deref())
        .await?;
    Ok(success_response(quote))
}

/// Place the order; the coupon is validated again at this point
async fn place_order(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    payload: Option<Json<CheckoutRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupon_code = payload.and_then(|Json(p)| p.coupon_code);
    let order = state
        .services
        .checkout
        .place_order(user_id, coupon_code.as_deref())
        .await?;
    Ok(created_response(order))
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckoutRequest {
    pub coupon_code: Option<String>,
}
