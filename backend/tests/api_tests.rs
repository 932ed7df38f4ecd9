//! HTTP API tests
//!
//! Drives the router end to end over the in-memory store.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use stock_ledger::{create_app, AppState, Config, MemoryInventoryStore};
use tower::ServiceExt;

fn app() -> Router {
    let state = AppState::new(Arc::new(MemoryInventoryStore::new()), Config::default());
    create_app(state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn create_widget(app: &Router) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/v1/products",
        Some(json!({
            "sku": "wid-1",
            "name": "Widget",
            "category": "Hardware",
            "unit_price": "9.99"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, "GET", "/api/v1/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn test_receipt_then_oversized_delivery() {
    let app = app();
    let product_id = create_widget(&app).await;

    let (status, receipt) = send(
        &app,
        "POST",
        "/api/v1/operations/receipts",
        Some(json!({
            "status": "completed",
            "items": [{ "product_id": product_id, "quantity": 10, "location_name": "Main" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(receipt["type"], "receipt");
    let warehouse_id = receipt["items"][0]["location_id"].as_str().unwrap().to_string();

    let (status, error) = send(
        &app,
        "POST",
        "/api/v1/operations/deliveries",
        Some(json!({
            "status": "completed",
            "items": [{ "product_id": product_id, "quantity": 999, "location_id": warehouse_id }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "INSUFFICIENT_STOCK");
    assert_eq!(error["error"]["product_id"], product_id.as_str());

    let (status, stock) = send(
        &app,
        "GET",
        &format!("/api/v1/products/{}/stock", product_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stock["total_stock"], 10);

    let (_, transactions) = send(
        &app,
        "GET",
        &format!("/api/v1/transactions?product_id={}", product_id),
        None,
    )
    .await;
    let transactions = transactions.as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["type"], "IN");
}

#[tokio::test]
async fn test_warehouses_are_listed_for_transfers() {
    let app = app();
    let (status, listed) = send(&app, "GET", "/api/v1/warehouses", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(listed.as_array().unwrap().is_empty());

    let product_id = create_widget(&app).await;
    for name in ["Store", "Main"] {
        let (status, _) = send(
            &app,
            "POST",
            "/api/v1/operations/receipts",
            Some(json!({
                "status": "completed",
                "items": [{ "product_id": product_id, "quantity": 4, "location_name": name }]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, listed) = send(&app, "GET", "/api/v1/warehouses", None).await;
    assert_eq!(status, StatusCode::OK);
    let listed = listed.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["name"], "Main");
    assert_eq!(listed[1]["name"], "Store");

    // Ids from the listing address a transfer
    let (status, transfer) = send(
        &app,
        "POST",
        "/api/v1/operations/transfers",
        Some(json!({
            "from_location_id": listed[0]["id"],
            "to_location_id": listed[1]["id"],
            "product_id": product_id,
            "quantity": 3,
            "status": "completed"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(transfer["status"], "completed");
}

#[tokio::test]
async fn test_complete_and_cancel_by_reference() {
    let app = app();
    let product_id = create_widget(&app).await;

    let (_, receipt) = send(
        &app,
        "POST",
        "/api/v1/operations/receipts",
        Some(json!({ "items": [{ "product_id": product_id, "quantity": 3 }] })),
    )
    .await;
    assert_eq!(receipt["status"], "waiting");
    let reference = receipt["reference_no"].as_str().unwrap().to_string();

    let uri = format!("/api/v1/operations/{}/complete", reference);
    let (status, done) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(done["status"], "completed");

    // Second completion is a no-op
    let (status, _) = send(&app, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, error) = send(
        &app,
        "POST",
        &format!("/api/v1/operations/{}/cancel", reference),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(error["error"]["code"], "INVALID_STATE_TRANSITION");

    let (status, history) = send(&app, "GET", "/api/v1/operations/history?limit=5", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 1);

    let (status, _) = send(&app, "GET", "/api/v1/operations/REC-20000101-00000000", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_requests() {
    let app = app();

    let (status, error) = send(
        &app,
        "POST",
        "/api/v1/operations/receipts",
        Some(json!({ "items": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["field"], "items");

    let (status, _) = send(
        &app,
        "POST",
        "/api/v1/operations/transfers",
        Some(json!({ "quantity": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, error) = send(
        &app,
        "POST",
        "/api/v1/operations/receipts",
        Some(json!({ "items": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(error["error"]["code"], "INVALID_INPUT");

    create_widget(&app).await;
    let (status, error) = send(
        &app,
        "POST",
        "/api/v1/products",
        Some(json!({
            "sku": "WID-1",
            "name": "Widget again",
            "category": "Hardware",
            "unit_price": "1.00"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(error["error"]["code"], "DUPLICATE_ENTRY");
}
