//! HTTP handlers for warehouse lookups

use axum::{extract::State, Json};
use shared::Warehouse;

use crate::error::AppResult;
use crate::services::Resolver;
use crate::AppState;

/// List warehouses so clients can address transfers and counts by id
pub async fn list_warehouses(State(state): State<AppState>) -> AppResult<Json<Vec<Warehouse>>> {
    let resolver = Resolver::new(state.store.clone(), state.config.inventory.clone());
    let warehouses = resolver.warehouses().await?;
    Ok(Json(warehouses))
}
