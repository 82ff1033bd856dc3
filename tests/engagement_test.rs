mod common;

use assert_matches::assert_matches;
use common::TestApp;
use rust_decimal_macros::dec;
use storefront::{
    errors::{CouponError, ServiceError},
    services::commerce::{AddReviewInput, CreateCouponInput},
};
use uuid::Uuid;

#[tokio::test]
async fn toggling_a_favorite_twice_removes_it() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let lamp = app.seed_product("Lamp", dec!(10.00), 5).await;
    let wishlist = &app.state.services.wishlist;

    assert!(wishlist.toggle_favorite(user, lamp.id).await.unwrap());
    assert!(wishlist.is_favorite(user, lamp.id).await.unwrap());

    let entries = wishlist.wishlist_for_user(user).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].product.id, lamp.id);

    assert!(!wishlist.toggle_favorite(user, lamp.id).await.unwrap());
    assert!(!wishlist.is_favorite(user, lamp.id).await.unwrap());
    assert!(wishlist.wishlist_for_user(user).await.unwrap().is_empty());
}

#[tokio::test]
async fn favoriting_an_unknown_product_fails() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .wishlist
        .toggle_favorite(Uuid::new_v4(), Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ProductNotFound(_));
}

#[tokio::test]
async fn reviews_are_summarized_per_product() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(10.00), 5).await;
    let reviews = &app.state.services.reviews;

    for rating in [5, 4, 4] {
        reviews
            .add_review(
                Uuid::new_v4(),
                lamp.id,
                AddReviewInput {
                    rating,
                    comment: "Bright and sturdy".into(),
                },
            )
            .await
            .unwrap();
    }

    let summary = reviews.rating_summary(lamp.id).await.unwrap();
    assert_eq!(summary.count, 3);
    assert_eq!(summary.average, Some(dec!(4.33)));
    assert_eq!(reviews.reviews_for_product(lamp.id).await.unwrap().len(), 3);
}

#[tokio::test]
async fn out_of_range_rating_is_rejected() {
    let app = TestApp::new().await;
    let lamp = app.seed_product("Lamp", dec!(10.00), 5).await;

    let err = app
        .state
        .services
        .reviews
        .add_review(
            Uuid::new_v4(),
            lamp.id,
            AddReviewInput {
                rating: 6,
                comment: "Too good".into(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let summary = app.state.services.reviews.rating_summary(lamp.id).await.unwrap();
    assert_eq!(summary.count, 0);
    assert_eq!(summary.average, None);
}

#[tokio::test]
async fn created_coupons_are_normalized_and_unique() {
    let app = TestApp::new().await;
    let coupons = &app.state.services.coupons;

    let input = CreateCouponInput {
        code: " spring10 ".into(),
        discount_percent: dec!(0.10),
        min_spend: Some(dec!(25.00)),
        expiry_date: None,
        active: None,
    };
    let created = coupons.create_coupon(input.clone()).await.unwrap();
    assert_eq!(created.code, "SPRING10");
    assert!(created.active);

    let err = coupons.create_coupon(input).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    assert_eq!(coupons.list_coupons().await.unwrap().len(), 1);
}

#[tokio::test]
async fn coupon_discount_must_be_a_fraction() {
    let app = TestApp::new().await;
    let err = app
        .state
        .services
        .coupons
        .create_coupon(CreateCouponInput {
            code: "HALF".into(),
            discount_percent: dec!(50),
            min_spend: None,
            expiry_date: None,
            active: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn inactive_coupon_is_treated_as_expired() {
    let app = TestApp::new().await;
    app.state
        .services
        .coupons
        .create_coupon(CreateCouponInput {
            code: "PAUSED".into(),
            discount_percent: dec!(0.10),
            min_spend: None,
            expiry_date: None,
            active: Some(false),
        })
        .await
        .unwrap();

    let err = app
        .state
        .services
        .coupons
        .get_valid_coupon("paused", dec!(100.00))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Coupon(CouponError::Expired(_)));
}

#[tokio::test]
async fn deleting_a_coupon_makes_the_code_unknown() {
    let app = TestApp::new().await;
    let coupon = app.seed_coupon("GONE", dec!(0.10), None, None).await;
    let coupons = &app.state.services.coupons;

    coupons.delete_coupon(coupon.id).await.unwrap();

    let err = coupons.get_valid_coupon("GONE", dec!(10.00)).await.unwrap_err();
    assert_matches!(err, ServiceError::Coupon(CouponError::NotFound(_)));

    let err = coupons.delete_coupon(coupon.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
