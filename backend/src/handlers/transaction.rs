//! HTTP handlers for the transaction audit trail

use axum::{
    extract::{Query, State},
    Json,
};
use shared::{Transaction, TransactionQuery};

use crate::error::AppResult;
use crate::services::TransactionLog;
use crate::store::TransactionFilter;
use crate::AppState;

/// List transactions, most recent first
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<Vec<Transaction>>> {
    let log = TransactionLog::new(state.store.clone(), state.config.inventory.page_limit());
    let filter = TransactionFilter {
        product_id: query.product_id,
        warehouse_id: query.warehouse_id,
    };
    let transactions = log.recent(filter, query.limit).await?;
    Ok(Json(transactions))
}
