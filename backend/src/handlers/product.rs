//! HTTP handlers for product endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use shared::{CreateProductInput, ProductWithStock, RecordMovementInput, Transaction};
use uuid::Uuid;

use crate::error::AppResult;
use crate::services::ProductService;
use crate::AppState;

/// Create a product
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<CreateProductInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<ProductWithStock>)> {
    let Json(input) = payload?;
    let service = ProductService::new(state.store.clone(), &state.config);
    let product = service.create_product(input).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

/// List products with their stock
pub async fn list_products(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ProductWithStock>>> {
    let service = ProductService::new(state.store.clone(), &state.config);
    let products = service.list_products().await?;
    Ok(Json(products))
}

/// Per-warehouse stock of one product
pub async fn get_product_stock(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> AppResult<Json<ProductWithStock>> {
    let service = ProductService::new(state.store.clone(), &state.config);
    let stock = service.get_stock(product_id).await?;
    Ok(Json(stock))
}

/// Record a manual stock movement
pub async fn record_movement(
    State(state): State<AppState>,
    payload: Result<Json<RecordMovementInput>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Transaction>)> {
    let Json(input) = payload?;
    let service = ProductService::new(state.store.clone(), &state.config);
    let transaction = service.record_movement(input).await?;
    Ok((StatusCode::CREATED, Json(transaction)))
}
