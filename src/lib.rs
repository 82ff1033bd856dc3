//! Storefront transaction core
//!
//! Carts, coupon-discounted checkout and orders over a relational store,
//! with the thin HTTP surface that exposes them.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod services;

use axum::{routing::get, Router};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Builds the state and every service. `read_db` serves analytical
    /// lookups and may be the primary pool itself.
    pub fn new(
        db: Arc<DatabaseConnection>,
        read_db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            read_db,
            Arc::new(event_sender.clone()),
            Arc::new(config.clone()),
        );
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

/// Versioned storefront API routes
pub fn api_v1_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/products", handlers::commerce::products_routes())
        .nest("/cart", handlers::commerce::carts_routes())
        .nest("/checkout", handlers::commerce::checkout_routes())
        .nest("/orders", handlers::commerce::orders_routes())
        .nest("/wishlist", handlers::commerce::wishlist_routes())
        .nest("/admin/coupons", handlers::commerce::admin_coupons_routes())
        .nest("/admin/orders", handlers::commerce::admin_orders_routes())
}

/// Full application router with tracing, request ids and a request timeout
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/health", handlers::health::health_routes())
        .route("/", get(|| async { "storefront" }))
        .nest("/api/v1", api_v1_routes())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .with_state(state)
}
