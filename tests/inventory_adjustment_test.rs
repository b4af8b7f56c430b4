mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use common::{checkout_payload, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use storefront_api::entities::{stock_movement, stock_movement::MovementType};
use storefront_api::errors::ServiceError;

#[tokio::test]
async fn restock_raises_stock_and_appends_movement() {
    let app = TestApp::new().await;
    let widget = app.seed_product("ADJ-1", dec!(9.99), 10).await;

    let after = app
        .state
        .services
        .inventory
        .adjust(widget.id, 15, MovementType::Restock, Some("ops".into()))
        .await
        .unwrap();
    assert_eq!(after.stock, 25);
    assert_eq!(after.reserved_stock, 0);

    let movements = stock_movement::Entity::find()
        .filter(stock_movement::Column::ProductId.eq(widget.id))
        .all(&*app.state.db)
        .await
        .unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::Restock);
    assert_eq!(movements[0].quantity, 15);
    assert_eq!(movements[0].stock_before, 10);
    assert_eq!(movements[0].stock_after, 25);
    assert_eq!(movements[0].actor.as_deref(), Some("ops"));
}

#[tokio::test]
async fn write_off_cannot_drop_stock_below_reservations() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let widget = app.seed_product("ADJ-2", dec!(9.99), 5).await;
    app.seed_cart(user, &[(widget.id, 4)]).await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(user),
            Some(checkout_payload(None)),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    // 5 on hand, 4 reserved: writing off 2 would strand a reservation.
    let result = app
        .state
        .services
        .inventory
        .adjust(widget.id, -2, MovementType::Adjustment, None)
        .await;
    assert_matches!(result, Err(ServiceError::Conflict(_)));

    let current = app
        .state
        .services
        .inventory
        .get_product(&*app.state.db, widget.id)
        .await
        .unwrap();
    assert_eq!(current.stock, 5);
    assert_eq!(current.reserved_stock, 4);

    // Writing off the single free unit is fine.
    let after = app
        .state
        .services
        .inventory
        .adjust(widget.id, -1, MovementType::Adjustment, None)
        .await
        .unwrap();
    assert_eq!(after.stock, 4);
    assert_eq!(after.available_stock(), 0);
}

#[tokio::test]
async fn adjustment_rejects_order_flow_reasons_and_zero_delta() {
    let app = TestApp::new().await;
    let widget = app.seed_product("ADJ-3", dec!(9.99), 10).await;

    assert_matches!(
        app.state
            .services
            .inventory
            .adjust(widget.id, 1, MovementType::Sale, None)
            .await,
        Err(ServiceError::BadRequest(_))
    );
    assert_matches!(
        app.state
            .services
            .inventory
            .adjust(widget.id, 0, MovementType::Restock, None)
            .await,
        Err(ServiceError::ValidationError(_))
    );
}
