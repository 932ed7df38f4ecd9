//! Route definitions for the Stock Ledger service

use axum::{
    routing::{get, post},
    Router,
};

use crate::{handlers, AppState};

/// Create API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/operations", operation_routes())
        .nest("/products", product_routes())
        .route("/transactions", get(handlers::list_transactions))
        .route("/warehouses", get(handlers::list_warehouses))
}

/// Operation engine routes
fn operation_routes() -> Router<AppState> {
    Router::new()
        .route("/receipts", post(handlers::create_receipt))
        .route("/deliveries", post(handlers::create_delivery))
        .route("/transfers", post(handlers::create_transfer))
        .route("/adjustments", post(handlers::create_adjustment))
        .route("/history", get(handlers::list_history))
        .route("/:reference", get(handlers::get_operation))
        .route("/:reference/complete", post(handlers::complete_operation))
        .route("/:reference/cancel", post(handlers::cancel_operation))
        .route("/:reference/status", post(handlers::transition_operation))
}

/// Product catalog routes
fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::list_products).post(handlers::create_product))
        .route("/movements", post(handlers::record_movement))
        .route("/:product_id/stock", get(handlers::get_product_stock))
}
