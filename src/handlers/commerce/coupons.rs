use crate::handlers::common::{created_response, no_content_response, success_response, validate_input};
use crate::{errors::ServiceError, services::commerce::CreateCouponInput, AppState};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;
use uuid::Uuid;

/// Back-office coupon management
pub fn admin_coupons_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_coupons).post(create_coupon))
        .route("/:id", delete(delete_coupon))
}

async fn list_coupons(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServiceError> {
    let coupons = state.services.coupons.list_coupons().await?;
    Ok(success_response(coupons))
}

async fn create_coupon(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateCouponInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let coupon = state.services.coupons.create_coupon(payload).await?;
    Ok(created_response(coupon))
}

async fn delete_coupon(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.coupons.delete_coupon(id).await?;
    Ok(no_content_response())
}
