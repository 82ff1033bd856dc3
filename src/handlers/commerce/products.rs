use crate::handlers::common::{
    created_response, success_response, validate_input, CurrentUser, PaginatedResponse,
    PaginationParams,
};
use crate::{
    entities::{product, review},
    errors::ServiceError,
    services::commerce::{AddReviewInput, RatingSummary},
    AppState,
};
use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const MAX_RECOMMENDATIONS: u64 = 50;

/// Creates the router for product endpoints
pub fn products_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/recommendations", get(get_recommendations))
        .route("/:id/reviews", get(list_reviews).post(add_review))
}

/// List products, newest first
async fn list_products(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> Result<impl IntoResponse, ServiceError> {
    let (page, per_page) = params.normalized();
    let (products, total) = state
        .services
        .catalog
        .list_products(page, per_page)
        .await?;

    let data = products.into_iter().map(ProductResponse::from).collect();
    Ok(success_response(PaginatedResponse::new(
        data, page, per_page, total,
    )))
}

async fn get_product(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.catalog.find_product(id).await?;
    Ok(success_response(ProductResponse::from(product)))
}

/// "Frequently bought together"
async fn get_recommendations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecommendationQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let recommendations = &state.services.recommendations;
    let limit = query
        .limit
        .unwrap_or_else(|| recommendations.default_limit())
        .min(MAX_RECOMMENDATIONS);

    let products = recommendations.frequently_bought_with(id, limit).await?;
    let data: Vec<ProductResponse> = products.into_iter().map(ProductResponse::from).collect();
    Ok(success_response(data))
}

async fn list_reviews(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    state.services.catalog.find_product(id).await?;
    let reviews = state.services.reviews.reviews_for_product(id).await?;
    let summary = state.services.reviews.rating_summary(id).await?;
    Ok(success_response(ReviewsResponse { summary, reviews }))
}

async fn add_review(
    State(state): State<Arc<AppState>>,
    CurrentUser(user_id): CurrentUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<AddReviewInput>,
) -> Result<impl IntoResponse, ServiceError> {
    validate_input(&payload)?;
    let review = state
        .services
        .reviews
        .add_review(user_id, id, payload)
        .await?;
    Ok(created_response(review))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    pub limit: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ReviewsResponse {
    pub summary: RatingSummary,
    pub reviews: Vec<review::Model>,
}

/// Product as shown to shoppers
#[derive(Debug, Serialize, Deserialize)]
pub struct ProductResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price: rust_decimal::Decimal,
    pub original_price: Option<rust_decimal::Decimal>,
    pub is_discounted: bool,
    pub stock: i32,
    pub in_stock: bool,
    pub image_url: Option<String>,
}

impl From<product::Model> for ProductResponse {
    fn from(p: product::Model) -> Self {
        Self {
            is_discounted: p.is_discounted(),
            in_stock: p.stock > 0,
            id: p.id,
            name: p.name,
            description: p.description,
            price: p.price,
            original_price: p.original_price,
            stock: p.stock,
            image_url: p.image_url,
        }
    }
}
