//! Storefront services: catalog, cart, coupons, checkout, orders,
//! recommendations, wishlists and reviews.

pub mod cart_service;
pub mod catalog_service;
pub mod checkout_service;
pub mod coupon_service;
pub mod order_service;
pub mod recommendation_service;
pub mod review_service;
pub mod wishlist_service;

pub use cart_service::{AddToCartInput, CartLine, CartService, CartWithItems};
pub use catalog_service::{CatalogService, CreateProductInput};
pub use checkout_service::{CheckoutQuote, CheckoutService};
pub use coupon_service::{CouponService, CreateCouponInput};
pub use order_service::{OrderService, OrderWithItems};
pub use recommendation_service::RecommendationService;
pub use review_service::{AddReviewInput, RatingSummary, ReviewService};
pub use wishlist_service::{WishlistEntry, WishlistService};
