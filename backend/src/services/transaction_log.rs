//! Read side of the append-only transaction trail

use std::sync::Arc;

use shared::{net_quantity, PageLimit, Transaction};
use uuid::Uuid;

use crate::error::AppResult;
use crate::store::{InventoryStore, TransactionFilter};

#[derive(Clone)]
pub struct TransactionLog {
    store: Arc<dyn InventoryStore>,
    limits: PageLimit,
}

impl TransactionLog {
    pub fn new(store: Arc<dyn InventoryStore>, limits: PageLimit) -> Self {
        Self { store, limits }
    }

    /// Most recent transactions first, bounded by the page limit
    pub async fn recent(
        &self,
        filter: TransactionFilter,
        limit: Option<i64>,
    ) -> AppResult<Vec<Transaction>> {
        self.store
            .recent_transactions(filter, self.limits.resolve(limit))
            .await
    }

    /// Full history of one cell, oldest first
    pub async fn cell_history(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Vec<Transaction>> {
        self.store.cell_transactions(product_id, warehouse_id).await
    }

    /// Signed sum of a cell's transactions; equals the cell quantity
    pub async fn cell_balance(&self, product_id: Uuid, warehouse_id: Uuid) -> AppResult<i64> {
        let history = self.cell_history(product_id, warehouse_id).await?;
        Ok(net_quantity(&history))
    }
}
