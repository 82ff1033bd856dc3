use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::commerce::{
        CartService, CatalogService, CheckoutService, CouponService, OrderService,
        RecommendationService, ReviewService, WishlistService,
    },
};
use std::sync::Arc;

pub mod commerce;
pub mod common;
pub mod health;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub cart: Arc<CartService>,
    pub coupons: Arc<CouponService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub recommendations: Arc<RecommendationService>,
    pub wishlist: Arc<WishlistService>,
    pub reviews: Arc<ReviewService>,
}

impl AppServices {
    /// Wires every service against the primary pool. Recommendations read
    /// from `read_pool`, which is the primary pool when no replica is set.
    pub fn new(
        db_pool: Arc<DbPool>,
        read_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(db_pool.clone())),
            cart: Arc::new(CartService::new(
                db_pool.clone(),
                event_sender.clone(),
                config.clone(),
            )),
            coupons: Arc::new(CouponService::new(db_pool.clone(), event_sender.clone())),
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            orders: Arc::new(OrderService::new(db_pool.clone(), event_sender.clone())),
            recommendations: Arc::new(RecommendationService::new(
                read_pool,
                config.recommendation_limit,
            )),
            wishlist: Arc::new(WishlistService::new(
                db_pool.clone(),
                event_sender.clone(),
            )),
            reviews: Arc::new(ReviewService::new(db_pool, event_sender)),
        }
    }
}
