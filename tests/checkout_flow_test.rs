mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, checkout_payload, money, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use uuid::Uuid;

use storefront_api::entities::{
    cart_item, coupon, coupon::DiscountKind, order, order_item, product, stock_movement,
    stock_movement::MovementType,
};

#[tokio::test]
async fn checkout_creates_pending_order_and_reserves_stock() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-1", dec!(25.00), 5).await;
    app.seed_cart(user, &[(widget.id, 2)]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(None)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let order_body = &body["data"]["order"];
    assert_eq!(order_body["status"], "pending");
    assert_eq!(money(&order_body["subtotal"]), dec!(50.00));
    assert_eq!(money(&order_body["shipping_total"]), dec!(10.00));
    assert_eq!(money(&order_body["total"]), dec!(60.00));
    assert!(order_body["order_number"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    // Stock is held, not yet deducted.
    let after = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.stock, 5);
    assert_eq!(after.reserved_stock, 2);

    // One reservation movement in the ledger.
    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(widget.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Reservation);
    assert_eq!(movements[0].quantity, 2);

    // Cart lines are cleared.
    let remaining = cart_item::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(remaining, 0);
}

#[tokio::test]
async fn checkout_applies_percentage_coupon() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-2", dec!(30.00), 10).await;
    app.seed_cart(user, &[(widget.id, 2)]).await;
    let save10 = app
        .seed_coupon(
            "SAVE10",
            DiscountKind::Percentage,
            dec!(10),
            dec!(50.00),
            100,
            1,
        )
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(Some("SAVE10"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = body_json(response).await;
    let order_body = &body["data"]["order"];
    assert_eq!(money(&order_body["subtotal"]), dec!(60.00));
    assert_eq!(money(&order_body["discount_total"]), dec!(6.00));
    assert_eq!(money(&order_body["total"]), dec!(64.00));
    assert_eq!(order_body["coupon_code"], "SAVE10");

    let after = coupon::Entity::find_by_id(save10.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.usage_count, 1);
}

#[tokio::test]
async fn failed_checkout_leaves_no_partial_state() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    // Coupon redeems first in the transaction, then the reservation fails:
    // the rollback must also undo the coupon usage.
    let widget = app.seed_product("WIDGET-3", dec!(40.00), 1).await;
    app.seed_cart(user, &[(widget.id, 3)]).await;
    let save10 = app
        .seed_coupon(
            "SAVE10",
            DiscountKind::Percentage,
            dec!(10),
            dec!(50.00),
            100,
            1,
        )
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(Some("SAVE10"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "insufficient_stock");

    assert_eq!(
        order::Entity::find().count(&*app.state.db).await.unwrap(),
        0
    );
    assert_eq!(
        order_item::Entity::find()
            .count(&*app.state.db)
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        stock_movement::Entity::find()
            .count(&*app.state.db)
            .await
            .unwrap(),
        0
    );

    let after = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.reserved_stock, 0);

    let coupon_after = coupon::Entity::find_by_id(save10.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(coupon_after.usage_count, 0);

    // The cart survives for a corrected retry.
    let remaining = cart_item::Entity::find()
        .count(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(remaining, 1);
}

#[tokio::test]
async fn checkout_depletes_available_stock_for_later_buyers() {
    let app = TestApp::new().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-7", dec!(25.00), 2).await;

    app.seed_cart(first, &[(widget.id, 2)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(first),
            Some(checkout_payload(None)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // Everything is reserved; a second buyer finds nothing available.
    let after = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.stock - after.reserved_stock, 0);

    app.seed_cart(second, &[(widget.id, 1)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(second),
            Some(checkout_payload(None)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "insufficient_stock");
}

#[tokio::test]
async fn coupon_last_use_succeeds_then_limit_is_exhausted() {
    let app = TestApp::new().await;
    let first = Uuid::new_v4();
    let second = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-8", dec!(60.00), 10).await;
    let save10 = app
        .seed_coupon(
            "SAVE10",
            DiscountKind::Percentage,
            dec!(10),
            dec!(50.00),
            2,
            1,
        )
        .await;

    // One use already consumed; this checkout takes the last remaining one.
    let mut active: coupon::ActiveModel = save10.clone().into();
    active.usage_count = sea_orm::Set(1);
    sea_orm::ActiveModelTrait::update(active, &*app.state.db)
        .await
        .unwrap();

    app.seed_cart(first, &[(widget.id, 1)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(first),
            Some(checkout_payload(Some("SAVE10"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let after = coupon::Entity::find_by_id(save10.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.usage_count, after.usage_limit);

    app.seed_cart(second, &[(widget.id, 1)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(second),
            Some(checkout_payload(Some("SAVE10"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_coupon");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("limit-exhausted"));
}

#[tokio::test]
async fn coupon_per_user_limit_blocks_second_redemption() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-9", dec!(60.00), 10).await;
    let save10 = app
        .seed_coupon(
            "SAVE10",
            DiscountKind::Percentage,
            dec!(10),
            dec!(50.00),
            100,
            1,
        )
        .await;

    app.seed_cart(user, &[(widget.id, 1)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(Some("SAVE10"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    app.seed_cart(user, &[(widget.id, 1)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(Some("SAVE10"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_coupon");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("per-user-limit-exhausted"));

    // The rejected attempt rolled its counter increment back.
    let after = coupon::Entity::find_by_id(save10.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.usage_count, 1);
}

#[tokio::test]
async fn checkout_rejects_empty_cart() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    app.seed_cart(user, &[]).await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(None)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "empty_cart");
}

#[tokio::test]
async fn checkout_rejects_coupon_below_minimum_order() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-4", dec!(10.00), 5).await;
    app.seed_cart(user, &[(widget.id, 1)]).await;
    app.seed_coupon(
        "SAVE10",
        DiscountKind::Percentage,
        dec!(10),
        dec!(50.00),
        100,
        1,
    )
    .await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(Some("SAVE10"))),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = body_json(response).await;
    assert_eq!(body["code"], "invalid_coupon");

    let after = product::Entity::find_by_id(widget.id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.reserved_stock, 0);
}

#[tokio::test]
async fn checkout_rejects_unknown_shipping_method() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-5", dec!(10.00), 5).await;
    app.seed_cart(user, &[(widget.id, 1)]).await;

    let mut payload = checkout_payload(None);
    payload["shipping_method"] = serde_json::json!("carrier-pigeon");
    let response = app
        .request(Method::POST, "/api/v1/checkout", Some(user), Some(payload))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_requires_identity() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            None,
            Some(checkout_payload(None)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_rejects_inactive_product() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let widget = app.seed_product("WIDGET-6", dec!(10.00), 5).await;

    let mut active: product::ActiveModel = widget.clone().into();
    active.is_active = sea_orm::Set(false);
    sea_orm::ActiveModelTrait::update(active, &*app.state.db)
        .await
        .unwrap();

    app.seed_cart(user, &[(widget.id, 1)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(None)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["code"], "inactive_product");
}
