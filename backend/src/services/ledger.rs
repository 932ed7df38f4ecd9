//! Stock ledger: the only writer of stock cells
//!
//! Single movements and multi-step units of work both end in one
//! [`InventoryStore::commit`], so a cell never changes without its audit
//! transaction and the two never disagree.

use std::collections::BTreeMap;
use std::sync::Arc;

use shared::{Product, StockCell};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::store::{AppliedStep, CommitOutcome, InventoryStore, OperationWrite, StockBatch};

#[derive(Clone)]
pub struct StockLedger {
    store: Arc<dyn InventoryStore>,
}

impl StockLedger {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Committed quantity; 0 when the cell does not exist
    pub async fn get_quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> AppResult<i64> {
        self.store.quantity(product_id, warehouse_id).await
    }

    pub async fn cells(&self, product_id: Uuid) -> AppResult<Vec<StockCell>> {
        self.store.cells(product_id).await
    }

    /// Apply a signed delta to one cell and return its new quantity
    pub async fn apply_movement(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        delta: i64,
        actor: Option<Uuid>,
        notes: Option<String>,
    ) -> AppResult<i64> {
        let mut batch = StockBatch::new(OperationWrite::None, actor);
        batch.apply_delta(product_id, warehouse_id, delta, notes);
        Ok(self.commit_single(batch).await?.quantity)
    }

    /// Create `product` and place its first stock in one commit; returns the
    /// new quantity
    pub async fn open_product(
        &self,
        product: Product,
        warehouse_id: Uuid,
        quantity: i64,
        actor: Option<Uuid>,
        notes: Option<String>,
    ) -> AppResult<i64> {
        let product_id = product.id;
        let mut batch = StockBatch::new(OperationWrite::None, actor);
        batch
            .create_product(product)
            .apply_delta(product_id, warehouse_id, quantity, notes);
        Ok(self.commit_single(batch).await?.quantity)
    }

    /// Overwrite one cell with an absolute quantity and return the previous one
    pub async fn set_absolute(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i64,
        actor: Option<Uuid>,
        notes: Option<String>,
    ) -> AppResult<i64> {
        let mut batch = StockBatch::new(OperationWrite::None, actor);
        batch.set_absolute(product_id, warehouse_id, quantity, notes);
        Ok(self.commit_single(batch).await?.previous)
    }

    /// Check that every cell can cover the summed outflow requested of it.
    ///
    /// `demands` holds (product, warehouse, quantity) triples; repeated cells
    /// are aggregated. This is a fast pre-check; the commit re-checks under
    /// the store's lock.
    pub async fn ensure_available(&self, demands: &[(Uuid, Uuid, i64)]) -> AppResult<()> {
        let mut totals: BTreeMap<(Uuid, Uuid), i64> = BTreeMap::new();
        for &(product_id, warehouse_id, quantity) in demands {
            let total = totals.entry((product_id, warehouse_id)).or_insert(0);
            *total = total.checked_add(quantity).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "Requested quantity for product {} at warehouse {} is out of range",
                    product_id, warehouse_id
                ))
            })?;
        }

        for ((product_id, warehouse_id), requested) in totals {
            let available = self.get_quantity(product_id, warehouse_id).await?;
            if available < requested {
                tracing::warn!(
                    "Insufficient stock for product {} at warehouse {}: requested {}, available {}",
                    product_id,
                    warehouse_id,
                    requested,
                    available
                );
                return Err(AppError::InsufficientStock {
                    product_id,
                    warehouse_id,
                    requested,
                    available,
                });
            }
        }

        Ok(())
    }

    /// Run `build` against a fresh batch and commit everything it staged,
    /// together with `operation`, as one unit.
    ///
    /// Nothing is written when `build` or the commit fails.
    pub async fn with_stock_transaction<F>(
        &self,
        operation: OperationWrite,
        actor: Option<Uuid>,
        build: F,
    ) -> AppResult<CommitOutcome>
    where
        F: FnOnce(&mut StockBatch) -> AppResult<()>,
    {
        let mut batch = StockBatch::new(operation, actor);
        build(&mut batch)?;
        self.store.commit(batch).await
    }

    async fn commit_single(&self, batch: StockBatch) -> AppResult<AppliedStep> {
        match self.store.commit(batch).await? {
            CommitOutcome::Applied { steps, .. } => steps
                .into_iter()
                .next()
                .ok_or_else(|| AppError::Internal("Commit applied no steps".to_string())),
            CommitOutcome::AlreadyCompleted => Err(AppError::Internal(
                "Stand-alone movement reported an operation completion".to_string(),
            )),
        }
    }
}
