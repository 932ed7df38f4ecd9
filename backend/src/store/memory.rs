//! In-memory inventory store
//!
//! Used by the test suite and by local runs without a database. All state sits
//! behind one mutex that is never held across an await point, so every call is
//! atomic with respect to every other call.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use shared::{
    Category, Operation, OperationStatus, Product, StockCell, Transaction, Vendor, Warehouse,
};
use uuid::Uuid;

use super::{
    not_completable, stage, CommitOutcome, InventoryStore, OperationWrite, StockBatch,
    TransactionFilter,
};
use crate::error::{AppError, AppResult};

#[derive(Default)]
struct State {
    categories: Vec<Category>,
    warehouses: Vec<Warehouse>,
    vendors: Vec<Vendor>,
    products: HashMap<Uuid, Product>,
    // Insertion order is creation order
    operations: Vec<Operation>,
    transactions: Vec<Transaction>,
}

impl State {
    fn quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> i64 {
        self.products
            .get(&product_id)
            .map(|p| p.quantity_at(warehouse_id))
            .unwrap_or(0)
    }

    fn write_cell(&mut self, product_id: Uuid, warehouse_id: Uuid, quantity: i64) {
        let Some(product) = self.products.get_mut(&product_id) else {
            return;
        };
        match product
            .stock_locations
            .iter_mut()
            .find(|cell| cell.warehouse_id == warehouse_id)
        {
            Some(cell) => cell.quantity = quantity,
            None => product.stock_locations.push(StockCell {
                warehouse_id,
                quantity,
            }),
        }
        product.updated_at = Utc::now();
    }

    fn check_sku(&self, product: &Product) -> AppResult<()> {
        if self.products.values().any(|p| p.sku == product.sku) {
            return Err(AppError::DuplicateEntry("sku".to_string()));
        }
        Ok(())
    }

    fn add_product(&mut self, product: &Product) {
        let mut product = product.clone();
        product.stock_locations.clear();
        self.products.insert(product.id, product);
    }

    fn check_unique(&self, operation: &Operation) -> AppResult<()> {
        if self
            .operations
            .iter()
            .any(|op| op.reference_no == operation.reference_no)
        {
            return Err(AppError::DuplicateEntry("reference_no".to_string()));
        }
        if let Some(key) = &operation.idempotency_key {
            if self
                .operations
                .iter()
                .any(|op| op.idempotency_key.as_ref() == Some(key))
            {
                return Err(AppError::DuplicateEntry("idempotency_key".to_string()));
            }
        }
        Ok(())
    }

    fn operation_mut(&mut self, operation_id: Uuid) -> AppResult<&mut Operation> {
        self.operations
            .iter_mut()
            .find(|op| op.id == operation_id)
            .ok_or_else(|| AppError::NotFound("Operation".to_string()))
    }
}

/// Thread-safe in-memory store
#[derive(Clone, Default)]
pub struct MemoryInventoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        Ok(self.state.lock().products.get(&id).cloned())
    }

    async fn find_product_by_sku(&self, sku: &str) -> AppResult<Option<Product>> {
        Ok(self
            .state
            .lock()
            .products
            .values()
            .find(|p| p.sku == sku)
            .cloned())
    }

    async fn insert_product(&self, product: &Product) -> AppResult<()> {
        let mut state = self.state.lock();
        state.check_sku(product)?;
        state.add_product(product);
        Ok(())
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let mut products: Vec<Product> = self.state.lock().products.values().cloned().collect();
        products.sort_by(|a, b| a.sku.cmp(&b.sku));
        Ok(products)
    }

    async fn list_warehouses(&self) -> AppResult<Vec<Warehouse>> {
        let mut warehouses = self.state.lock().warehouses.clone();
        warehouses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(warehouses)
    }

    async fn find_warehouse(&self, id: Uuid) -> AppResult<Option<Warehouse>> {
        Ok(self
            .state
            .lock()
            .warehouses
            .iter()
            .find(|w| w.id == id)
            .cloned())
    }

    async fn upsert_warehouse(&self, name: &str, location: &str) -> AppResult<Warehouse> {
        let mut state = self.state.lock();
        if let Some(existing) = state.warehouses.iter().find(|w| w.name == name) {
            return Ok(existing.clone());
        }
        let warehouse = Warehouse {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location: location.to_string(),
            manager_id: None,
            created_at: Utc::now(),
        };
        state.warehouses.push(warehouse.clone());
        Ok(warehouse)
    }

    async fn find_vendor(&self, id: Uuid) -> AppResult<Option<Vendor>> {
        Ok(self
            .state
            .lock()
            .vendors
            .iter()
            .find(|v| v.id == id)
            .cloned())
    }

    async fn upsert_vendor(&self, name: &str) -> AppResult<Vendor> {
        let mut state = self.state.lock();
        if let Some(existing) = state.vendors.iter().find(|v| v.name == name) {
            return Ok(existing.clone());
        }
        let vendor = Vendor {
            id: Uuid::new_v4(),
            name: name.to_string(),
            phone: None,
            email: None,
            address: None,
        };
        state.vendors.push(vendor.clone());
        Ok(vendor)
    }

    async fn find_category(&self, id: Uuid) -> AppResult<Option<Category>> {
        Ok(self
            .state
            .lock()
            .categories
            .iter()
            .find(|c| c.id == id)
            .cloned())
    }

    async fn upsert_category(&self, name: &str) -> AppResult<Category> {
        let mut state = self.state.lock();
        if let Some(existing) = state.categories.iter().find(|c| c.name == name) {
            return Ok(existing.clone());
        }
        let category = Category {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: None,
        };
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> AppResult<i64> {
        Ok(self.state.lock().quantity(product_id, warehouse_id))
    }

    async fn cells(&self, product_id: Uuid) -> AppResult<Vec<StockCell>> {
        Ok(self
            .state
            .lock()
            .products
            .get(&product_id)
            .map(|p| p.stock_locations.clone())
            .unwrap_or_default())
    }

    async fn commit(&self, batch: StockBatch) -> AppResult<CommitOutcome> {
        let mut state = self.state.lock();

        match &batch.operation {
            OperationWrite::None => {}
            OperationWrite::Insert(operation) => state.check_unique(operation)?,
            OperationWrite::Complete { operation_id } => {
                let operation = state.operation_mut(*operation_id)?;
                match operation.status {
                    OperationStatus::Completed => return Ok(CommitOutcome::AlreadyCompleted),
                    status if status.is_open() => {}
                    status => return Err(not_completable(&operation.reference_no, status)),
                }
            }
        }
        if let Some(product) = &batch.product {
            state.check_sku(product)?;
        }

        // Stage every step on a scratch copy; nothing is published on error
        let mut scratch: HashMap<(Uuid, Uuid), i64> = HashMap::new();
        for (product_id, warehouse_id) in batch.cells() {
            if !state.products.contains_key(&product_id) && !batch.creates(product_id) {
                return Err(AppError::NotFound("Product".to_string()));
            }
            if !state.warehouses.iter().any(|w| w.id == warehouse_id) {
                return Err(AppError::NotFound("Warehouse".to_string()));
            }
            scratch.insert(
                (product_id, warehouse_id),
                state.quantity(product_id, warehouse_id),
            );
        }

        let ctx = batch.context(Utc::now());
        let (steps, transactions) = stage(&batch, &mut scratch, &ctx)?;

        if let Some(product) = &batch.product {
            state.add_product(product);
        }
        for ((product_id, warehouse_id), quantity) in scratch {
            state.write_cell(product_id, warehouse_id, quantity);
        }
        state.transactions.extend(transactions.iter().cloned());
        match batch.operation {
            OperationWrite::None => {}
            OperationWrite::Insert(operation) => state.operations.push(operation),
            OperationWrite::Complete { operation_id } => {
                let operation = state.operation_mut(operation_id)?;
                operation.status = OperationStatus::Completed;
                operation.updated_at = ctx.timestamp;
            }
        }

        Ok(CommitOutcome::Applied {
            steps,
            transactions,
        })
    }

    async fn insert_operation(&self, operation: &Operation) -> AppResult<()> {
        let mut state = self.state.lock();
        state.check_unique(operation)?;
        state.operations.push(operation.clone());
        Ok(())
    }

    async fn find_operation(&self, reference_no: &str) -> AppResult<Option<Operation>> {
        Ok(self
            .state
            .lock()
            .operations
            .iter()
            .find(|op| op.reference_no == reference_no)
            .cloned())
    }

    async fn find_operation_by_key(&self, idempotency_key: &str) -> AppResult<Option<Operation>> {
        Ok(self
            .state
            .lock()
            .operations
            .iter()
            .find(|op| op.idempotency_key.as_deref() == Some(idempotency_key))
            .cloned())
    }

    async fn update_operation_status(
        &self,
        operation_id: Uuid,
        from: &[OperationStatus],
        to: OperationStatus,
    ) -> AppResult<bool> {
        let mut state = self.state.lock();
        let operation = state.operation_mut(operation_id)?;
        if !from.contains(&operation.status) {
            return Ok(false);
        }
        operation.status = to;
        operation.updated_at = Utc::now();
        Ok(true)
    }

    async fn recent_operations(&self, limit: i64) -> AppResult<Vec<Operation>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .lock()
            .operations
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }

    async fn recent_transactions(
        &self,
        filter: TransactionFilter,
        limit: i64,
    ) -> AppResult<Vec<Transaction>> {
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .rev()
            .filter(|tx| filter.matches(tx))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn cell_transactions(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Vec<Transaction>> {
        let filter = TransactionFilter::cell(product_id, warehouse_id);
        Ok(self
            .state
            .lock()
            .transactions
            .iter()
            .filter(|tx| filter.matches(tx))
            .cloned()
            .collect())
    }
}
