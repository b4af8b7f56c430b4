mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, checkout_payload, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::json;
use uuid::Uuid;

use storefront_api::entities::{
    order::OrderStatus, product, stock_movement, stock_movement::MovementType,
};
use storefront_api::services::inventory::replay_movements;

async fn checkout_order(app: &TestApp, user: Uuid, stock: i32, qty: i32) -> (Uuid, Uuid) {
    let widget = app
        .seed_product(&format!("SKU-{}", Uuid::new_v4().simple()), dec!(12.50), stock)
        .await;
    app.seed_cart(user, &[(widget.id, qty)]).await;

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
    let order_id: Uuid = body["data"]["order"]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    (order_id, widget.id)
}

/// Confirms the order by settling its payment through the webhook path.
async fn confirm_via_payment(app: &TestApp, user: Uuid, order_id: Uuid) -> String {
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/payment-intent"),
            Some(user),
            None,
        )
        .await;
    let body = body_json(response).await;
    let intent_id = body["data"]["provider_intent_id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .deliver_webhook(
            &json!({
                "id": format!("evt_{}", Uuid::new_v4().simple()),
                "type": "payment_succeeded",
                "data": {"intent_id": intent_id}
            }),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    intent_id
}

#[tokio::test]
async fn get_order_returns_items_and_is_scoped_to_owner() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (order_id, _) = checkout_order(&app, user, 5, 2).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(user),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["items"].as_array().unwrap().len(), 1);

    let stranger = Uuid::new_v4();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(stranger),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cancelling_pending_order_releases_reservation() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (order_id, product_id) = checkout_order(&app, user, 5, 3).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            Some(user),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");

    let after = product::Entity::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.stock, 5);
    assert_eq!(after.reserved_stock, 0);

    // Cancelled is terminal.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            Some(user),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "illegal_status_transition");
}

#[tokio::test]
async fn confirmed_order_with_succeeded_payment_requires_refund_before_cancel() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (order_id, _) = checkout_order(&app, user, 5, 1).await;
    confirm_via_payment(&app, user, order_id).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            Some(user),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["code"], "conflict");
}

#[tokio::test]
async fn confirmed_order_cancel_after_refund_restocks_units() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (order_id, product_id) = checkout_order(&app, user, 5, 2).await;
    let intent_id = confirm_via_payment(&app, user, order_id).await;

    // Full refund settles before the cancellation.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}"),
            Some(user),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let payment_row = app
        .state
        .services
        .payments
        .payments_for_order(order_id)
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap();
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/payments/{}/refund", payment_row.id),
            Some(user),
            Some(json!({})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.deliver_webhook(
        &json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": "refund_succeeded",
            "data": {"intent_id": intent_id}
        }),
        None,
    )
    .await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            Some(user),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    // Sold units came back as returns.
    let after = product::Entity::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.stock, 5);
    assert_eq!(after.reserved_stock, 0);

    let returns = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .filter(stock_movement::Column::MovementType.eq(MovementType::Return))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(returns.len(), 1);
    assert_eq!(returns[0].quantity, 2);
}

#[tokio::test]
async fn fulfillment_advances_one_stage_at_a_time() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let (order_id, _) = checkout_order(&app, user, 5, 1).await;
    confirm_via_payment(&app, user, order_id).await;

    // Skipping processing is rejected.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(user),
            Some(json!({"status": "shipped"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    for stage in ["processing", "shipped", "delivered"] {
        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/orders/{order_id}/status"),
                Some(user),
                Some(json!({"status": stage})),
            )
            .await;
        assert_eq!(response.status(), StatusCode::OK, "advance to {stage}");
        let body = body_json(response).await;
        assert_eq!(body["data"]["status"], stage);
    }

    // Delivered is terminal.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(user),
            Some(json!({"status": "processing"})),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let order_row = storefront_api::entities::order::Entity::find_by_id(order_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(order_row.status, OrderStatus::Delivered);
}

#[tokio::test]
async fn movement_ledger_replays_to_live_counters() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();

    // A history with a reservation, a sale, and a release across two orders.
    let (first, product_id) = checkout_order(&app, user, 10, 3).await;
    confirm_via_payment(&app, user, first).await;

    app.seed_cart(user, &[(product_id, 2)]).await;
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
    let second: Uuid = body["data"]["order"]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{second}/cancel"),
            Some(user),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let live = product::Entity::find_by_id(product_id)
        .one(&*app.state.db)
        .await
        .unwrap()
        .unwrap();
    let history = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(product_id))
        .order_by_asc(stock_movement::Column::CreatedAt)
        .all(&*app.state.db)
        .await
        .unwrap();

    // Seeded at (10, 0); replaying the ledger must land on the live row.
    assert_eq!(
        replay_movements(10, 0, &history),
        (live.stock, live.reserved_stock)
    );

    // Every row's before/after values chain onto the live counters too.
    let last = history.last().unwrap();
    assert_eq!(last.stock_after, live.stock);
    assert_eq!(last.reserved_after, live.reserved_stock);
}
