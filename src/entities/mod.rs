//! Persistence models for the storefront aggregates.
//!
//! Cart and Order are aggregate roots; Product and Coupon are referenced by
//! identity only.

pub mod cart;
pub mod cart_item;
pub mod coupon;
pub mod order;
pub mod order_item;
pub mod product;
pub mod review;
pub mod wishlist_item;
