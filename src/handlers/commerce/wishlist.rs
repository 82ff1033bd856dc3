use crate::handlers::common::{success_response, CurrentUser};
use crate::{errors::ServiceError, AppState};
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

pub fn wishlist_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(get_wishlist))
        .route("/:product_id", post(toggle_favorite))
}

async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<impl IntoResponse, ServiceError> {
    let entries = state.services.wishlist.wishlist_for_user(user_id).await?;
    Ok(success_response(entries))
}

/// Adds or removes the product; responds with the resulting state
async fn toggle_favorite(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let favorite = state
        .services
        .wishlist
        .toggle_favorite(user_id, product_id)
        .await?;
    Ok(success_response(json!({
        "product_id": product_id,
        "favorite": favorite,
    })))
}
