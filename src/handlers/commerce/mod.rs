/// Storefront API handlers
pub mod carts;
pub mod checkout;
pub mod coupons;
pub mod orders;
pub mod products;
pub mod wishlist;

// Re-export route builders
pub use carts::carts_routes;
pub use checkout::checkout_routes;
pub use coupons::admin_coupons_routes;
pub use orders::{admin_orders_routes, orders_routes};
pub use products::products_routes;
pub use wishlist::wishlist_routes;
