mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use common::TestApp;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use storefront::{
    entities::{order, order::OrderStatus, product},
    errors::{CouponError, ServiceError},
};
use uuid::Uuid;

async fn order_count(app: &TestApp) -> u64 {
    order::Entity::find().count(&*app.state.db).await.unwrap()
}

#[tokio::test]
async fn places_an_order_and_empties_the_cart() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(12.50), 5).await;
    let mug = app.seed_product("Mug", dec!(4.25), 5).await;

    app.state.services.cart.add_item(user, lamp.id, 2).await.unwrap();
    app.state.services.cart.add_item(user, mug.id, 1).await.unwrap();

    let placed = app.state.services.checkout.place_order(user, None).await.unwrap();

    assert_eq!(placed.order.user_id, user);
    assert_eq!(placed.order.status, OrderStatus::Placed);
    assert_eq!(placed.order.subtotal, dec!(29.25));
    assert_eq!(placed.order.discount_total, dec!(0));
    assert_eq!(placed.order.total_amount, dec!(29.25));
    assert_eq!(placed.order.coupon_code, None);
    assert_eq!(placed.items.len(), 2);

    assert_eq!(app.stock_of(lamp.id).await, 3);
    assert_eq!(app.stock_of(mug.id).await, 4);

    let cart = app.state.services.cart.get_or_create_cart(user).await.unwrap();
    assert!(cart.is_empty());
    assert_eq!(cart.total_amount(), dec!(0));
}

#[tokio::test]
async fn twenty_percent_coupon_on_a_hundred_charges_eighty() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let desk = app.seed_product("Desk", dec!(50.00), 4).await;
    app.seed_coupon("SAVE20", dec!(0.20), None, None).await;

    app.state.services.cart.add_item(user, desk.id, 2).await.unwrap();
    let placed = app
        .state
        .services
        .checkout
        .place_order(user, Some("save20"))
        .await
        .unwrap();

    assert_eq!(placed.order.subtotal, dec!(100.00));
    assert_eq!(placed.order.discount_total, dec!(20.00));
    assert_eq!(placed.order.total_amount, dec!(80.00));
    assert_eq!(placed.order.coupon_code.as_deref(), Some("SAVE20"));
}

#[tokio::test]
async fn minimum_spend_not_met_rejects_without_side_effects() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(20.00), 5).await;
    app.seed_coupon("BIGSPEND", dec!(0.10), Some(dec!(50.00)), None).await;

    app.state.services.cart.add_item(user, lamp.id, 2).await.unwrap();
    let err = app
        .state
        .services
        .checkout
        .place_order(user, Some("BIGSPEND"))
        .await
        .unwrap_err();

    assert_matches!(
        err,
        ServiceError::Coupon(CouponError::MinSpendNotMet { order_total, .. }) if order_total == dec!(40.00)
    );
    assert_eq!(app.stock_of(lamp.id).await, 5);
    assert_eq!(order_count(&app).await, 0);

    let cart = app.state.services.cart.get_or_create_cart(user).await.unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.total_amount(), dec!(40.00));
}

#[tokio::test]
async fn expired_coupon_is_rejected() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(20.00), 5).await;
    let yesterday = (Utc::now() - Duration::days(1)).date_naive();
    app.seed_coupon("OLD", dec!(0.50), None, Some(yesterday)).await;

    app.state.services.cart.add_item(user, lamp.id, 1).await.unwrap();
    let err = app
        .state
        .services
        .checkout
        .place_order(user, Some("OLD"))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Coupon(CouponError::Expired(_)));
    assert_eq!(app.stock_of(lamp.id).await, 5);
}

#[tokio::test]
async fn coupon_expiring_today_is_still_accepted() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(20.00), 5).await;
    let today = Utc::now().date_naive();
    app.seed_coupon("LASTDAY", dec!(0.25), None, Some(today)).await;

    app.state.services.cart.add_item(user, lamp.id, 1).await.unwrap();
    let placed = app
        .state
        .services
        .checkout
        .place_order(user, Some("LASTDAY"))
        .await
        .unwrap();

    assert_eq!(placed.order.total_amount, dec!(15.00));
}

#[tokio::test]
async fn unknown_coupon_is_rejected() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(20.00), 5).await;

    app.state.services.cart.add_item(user, lamp.id, 1).await.unwrap();
    let err = app
        .state
        .services
        .checkout
        .place_order(user, Some("NOPE"))
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::Coupon(CouponError::NotFound(code)) if code == "NOPE");
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn blank_coupon_code_is_ignored() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(20.00), 5).await;

    app.state.services.cart.add_item(user, lamp.id, 1).await.unwrap();
    let placed = app
        .state
        .services
        .checkout
        .place_order(user, Some("   "))
        .await
        .unwrap();

    assert_eq!(placed.order.coupon_code, None);
    assert_eq!(placed.order.total_amount, dec!(20.00));
}

#[tokio::test]
async fn empty_cart_cannot_be_checked_out() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .checkout
        .place_order(Uuid::new_v4(), None)
        .await
        .unwrap_err();

    assert_matches!(err, ServiceError::EmptyCart);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn partial_stock_shortage_rolls_back_every_line() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let plenty = app.seed_product("Plenty", dec!(5.00), 10).await;
    let scarce = app.seed_product("Scarce", dec!(7.50), 1).await;

    app.state.services.cart.add_item(user, plenty.id, 3).await.unwrap();
    app.state.services.cart.add_item(user, scarce.id, 2).await.unwrap();

    let err = app.state.services.checkout.place_order(user, None).await.unwrap_err();

    assert_matches!(
        err,
        ServiceError::InsufficientStock { product_id, requested: 2, available: 1 } if product_id == scarce.id
    );
    assert_eq!(app.stock_of(plenty.id).await, 10);
    assert_eq!(app.stock_of(scarce.id).await, 1);
    assert_eq!(order_count(&app).await, 0);

    let cart = app.state.services.cart.get_or_create_cart(user).await.unwrap();
    assert_eq!(cart.items.len(), 2);
}

#[tokio::test]
async fn concurrent_checkouts_for_the_last_unit_sell_it_once() {
    let app = TestApp::new().await;
    let last = app.seed_product("Last One", dec!(99.00), 1).await;
    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());

    app.state.services.cart.add_item(alice, last.id, 1).await.unwrap();
    app.state.services.cart.add_item(bob, last.id, 1).await.unwrap();

    let checkout = &app.state.services.checkout;
    let (first, second) = tokio::join!(
        checkout.place_order(alice, None),
        checkout.place_order(bob, None)
    );

    let outcomes = [first, second];
    let placed = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(placed, 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(ServiceError::InsufficientStock { .. }))));

    assert_eq!(app.stock_of(last.id).await, 0);
    assert_eq!(order_count(&app).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_shoppers_racing_for_the_last_unit_on_a_full_pool() {
    let app = TestApp::with_config(|cfg| {
        cfg.db_max_connections = 16;
        cfg.db_min_connections = 2;
    })
    .await;
    let last = app.seed_product("Last One", dec!(99.00), 1).await;

    let shoppers: Vec<Uuid> = (0..8).map(|_| Uuid::new_v4()).collect();
    for shopper in &shoppers {
        app.state.services.cart.add_item(*shopper, last.id, 1).await.unwrap();
    }

    let handles: Vec<_> = shoppers
        .iter()
        .map(|shopper| {
            let checkout = app.state.services.checkout.clone();
            let shopper = *shopper;
            tokio::spawn(async move { checkout.place_order(shopper, None).await })
        })
        .collect();

    let mut placed = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(ServiceError::InsufficientStock { product_id, requested: 1, available: 0 })
                if product_id == last.id =>
            {
                sold_out += 1
            }
            Err(other) => panic!("unexpected checkout error: {other:?}"),
        }
    }

    assert_eq!(placed, 1);
    assert_eq!(sold_out, 7);
    assert_eq!(app.stock_of(last.id).await, 0);
    assert_eq!(order_count(&app).await, 1);
}

/// Stock is decremented before the order rows are written; a failure while
/// writing them must put every unit back and leave the cart intact.
async fn assert_failed_write_rolls_back(table: &str) {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(10.00), 5).await;
    let mug = app.seed_product("Mug", dec!(4.00), 5).await;

    app.state.services.cart.add_item(user, lamp.id, 2).await.unwrap();
    app.state.services.cart.add_item(user, mug.id, 3).await.unwrap();
    common::fail_inserts_into(&app, table).await;

    let err = app.state.services.checkout.place_order(user, None).await.unwrap_err();

    assert_matches!(err, ServiceError::PersistenceFailure(_));
    assert_eq!(app.stock_of(lamp.id).await, 5);
    assert_eq!(app.stock_of(mug.id).await, 5);
    assert_eq!(order_count(&app).await, 0);

    let cart = app.state.services.cart.get_or_create_cart(user).await.unwrap();
    assert_eq!(cart.items.len(), 2);
    assert_eq!(cart.total_amount(), dec!(32.00));
}

#[tokio::test]
async fn failed_order_insert_rolls_back_stock_and_keeps_the_cart() {
    assert_failed_write_rolls_back("orders").await;
}

#[tokio::test]
async fn failed_order_line_insert_rolls_back_stock_and_keeps_the_cart() {
    assert_failed_write_rolls_back("order_items").await;
}

#[tokio::test]
async fn order_keeps_the_price_paid_after_a_price_change() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(10.00), 5).await;

    app.state.services.cart.add_item(user, lamp.id, 2).await.unwrap();
    let placed = app.state.services.checkout.place_order(user, None).await.unwrap();

    app.state
        .services
        .catalog
        .update_price(lamp.id, dec!(15.00))
        .await
        .unwrap();

    let details = app
        .state
        .services
        .orders
        .order_details(placed.order.id)
        .await
        .unwrap();
    assert_eq!(details.items[0].price_at_purchase, dec!(10.00));
    assert_eq!(details.items[0].line_total(), dec!(20.00));
    assert_eq!(details.order.total_amount, dec!(20.00));
}

#[tokio::test]
async fn deleted_product_in_cart_blocks_checkout() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(10.00), 5).await;
    let mug = app.seed_product("Mug", dec!(4.00), 5).await;

    app.state.services.cart.add_item(user, lamp.id, 1).await.unwrap();
    app.state.services.cart.add_item(user, mug.id, 1).await.unwrap();
    product::Entity::delete_by_id(lamp.id)
        .exec(&*app.state.db)
        .await
        .unwrap();

    let err = app.state.services.checkout.place_order(user, None).await.unwrap_err();

    assert_matches!(err, ServiceError::ProductNotFound(id) if id == lamp.id);
    assert_eq!(app.stock_of(mug.id).await, 5);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn quote_prices_the_cart_without_placing_anything() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let desk = app.seed_product("Desk", dec!(50.00), 4).await;
    app.seed_coupon("SAVE20", dec!(0.20), None, None).await;

    app.state.services.cart.add_item(user, desk.id, 2).await.unwrap();
    let quote = app
        .state
        .services
        .checkout
        .quote(user, Some("save20"))
        .await
        .unwrap();

    assert_eq!(quote.original_total, dec!(100.00));
    assert_eq!(quote.discount, dec!(20.00));
    assert_eq!(quote.final_total, dec!(80.00));
    assert_eq!(quote.coupon_code.as_deref(), Some("SAVE20"));
    assert_eq!(quote.item_count, 2);

    assert_eq!(app.stock_of(desk.id).await, 4);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn quote_on_an_empty_cart_is_rejected() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .checkout
        .quote(Uuid::new_v4(), None)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::EmptyCart);
}
