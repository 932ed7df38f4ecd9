//! Persistence seam for the stock ledger
//!
//! Every stock mutation goes through [`InventoryStore::commit`], which applies
//! a [`StockBatch`] (cell changes, their audit transactions and the owning
//! operation write) as one atomic unit.

mod memory;
mod postgres;

pub use memory::MemoryInventoryStore;
pub use postgres::PgInventoryStore;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    Category, Direction, MovementType, Operation, OperationStatus, Product, StockCell,
    Transaction, Vendor, Warehouse,
};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// How a step changes a stock cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    /// Signed increment; never applied if the result would be negative
    Delta(i64),
    /// Absolute quantity written by stock counts
    Set(i64),
}

/// One staged change to a (product, warehouse) cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockStep {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub change: StockChange,
    pub notes: Option<String>,
}

impl StockStep {
    /// Quantity of the cell after this step, given its current quantity
    pub fn apply_to(&self, current: i64) -> AppResult<i64> {
        match self.change {
            StockChange::Delta(0) => Err(AppError::InvalidInput(
                "Stock movement quantity must be non-zero".to_string(),
            )),
            StockChange::Delta(delta) => {
                let next = current.checked_add(delta).ok_or_else(|| {
                    AppError::InvalidInput(format!(
                        "Stock movement of {} on a cell holding {} is out of range",
                        delta, current
                    ))
                })?;
                if next < 0 {
                    return Err(AppError::InsufficientStock {
                        product_id: self.product_id,
                        warehouse_id: self.warehouse_id,
                        requested: -delta,
                        available: current,
                    });
                }
                Ok(next)
            }
            StockChange::Set(quantity) if quantity < 0 => Err(AppError::InvalidInput(
                "Stock quantity cannot be negative".to_string(),
            )),
            StockChange::Set(quantity) => Ok(quantity),
        }
    }

    /// Audit record for the realized change `previous -> current`.
    ///
    /// Returns `None` when nothing moved.
    pub fn transaction(
        &self,
        previous: i64,
        current: i64,
        ctx: &CommitContext,
    ) -> Option<Transaction> {
        let change = current - previous;
        let direction = Direction::of_change(change)?;
        let movement_type = match (self.change, direction) {
            (StockChange::Set(_), _) => MovementType::Adjust,
            (StockChange::Delta(_), Direction::In) => MovementType::In,
            (StockChange::Delta(_), Direction::Out) => MovementType::Out,
        };

        Some(Transaction {
            id: Uuid::new_v4(),
            movement_type,
            direction,
            product_id: self.product_id,
            warehouse_id: self.warehouse_id,
            quantity: change.abs(),
            notes: self.notes.clone(),
            user_id: ctx.actor,
            operation_id: ctx.operation_id,
            timestamp: ctx.timestamp,
        })
    }
}

/// What happens to the owning operation inside the batch
#[derive(Debug, Clone, PartialEq)]
pub enum OperationWrite {
    /// Stand-alone stock movement
    None,
    /// Create the operation document (already carrying its final status)
    Insert(Operation),
    /// Move an open operation to `completed`
    Complete { operation_id: Uuid },
}

impl OperationWrite {
    pub fn operation_id(&self) -> Option<Uuid> {
        match self {
            OperationWrite::None => None,
            OperationWrite::Insert(op) => Some(op.id),
            OperationWrite::Complete { operation_id } => Some(*operation_id),
        }
    }
}

/// Unit of work committed atomically by the store
#[derive(Debug, Clone, PartialEq)]
pub struct StockBatch {
    pub operation: OperationWrite,
    /// Product inserted before any step runs, so it can receive its first stock
    pub product: Option<Product>,
    pub steps: Vec<StockStep>,
    pub actor: Option<Uuid>,
}

impl StockBatch {
    pub fn new(operation: OperationWrite, actor: Option<Uuid>) -> Self {
        Self {
            operation,
            product: None,
            steps: Vec::new(),
            actor,
        }
    }

    /// Create `product` in the same unit; a duplicate SKU fails the whole batch
    pub fn create_product(&mut self, product: Product) -> &mut Self {
        self.product = Some(product);
        self
    }

    /// Whether `product_id` is the product this batch creates
    pub fn creates(&self, product_id: Uuid) -> bool {
        self.product.as_ref().map_or(false, |p| p.id == product_id)
    }

    /// Stage a signed increment
    pub fn apply_delta(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
        delta: i64,
        notes: Option<String>,
    ) -> &mut Self {
        self.steps.push(StockStep {
            product_id,
            warehouse_id,
            change: StockChange::Delta(delta),
            notes,
        });
        self
    }

    /// Stage an absolute write
    pub fn set_absolute(
        &mut self,
        product_id: Uuid,
        warehouse_id: Uuid,
        quantity: i64,
        notes: Option<String>,
    ) -> &mut Self {
        self.steps.push(StockStep {
            product_id,
            warehouse_id,
            change: StockChange::Set(quantity),
            notes,
        });
        self
    }

    /// Distinct cells touched, sorted so locks are always taken in one order
    pub fn cells(&self) -> Vec<(Uuid, Uuid)> {
        let mut cells: Vec<(Uuid, Uuid)> = self
            .steps
            .iter()
            .map(|step| (step.product_id, step.warehouse_id))
            .collect();
        cells.sort();
        cells.dedup();
        cells
    }

    pub fn context(&self, timestamp: DateTime<Utc>) -> CommitContext {
        CommitContext {
            actor: self.actor,
            operation_id: self.operation.operation_id(),
            timestamp,
        }
    }
}

/// Attribution stamped on every transaction of a batch
#[derive(Debug, Clone, Copy)]
pub struct CommitContext {
    pub actor: Option<Uuid>,
    pub operation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

/// Cell state after a committed step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedStep {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    pub previous: i64,
    pub quantity: i64,
}

/// Result of [`InventoryStore::commit`]
#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    Applied {
        steps: Vec<AppliedStep>,
        transactions: Vec<Transaction>,
    },
    /// The operation was already completed by an earlier commit; nothing ran
    AlreadyCompleted,
}

/// Filter for the transaction audit trail
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
}

impl TransactionFilter {
    pub fn cell(product_id: Uuid, warehouse_id: Uuid) -> Self {
        Self {
            product_id: Some(product_id),
            warehouse_id: Some(warehouse_id),
        }
    }

    pub fn matches(&self, tx: &Transaction) -> bool {
        self.product_id.map_or(true, |id| id == tx.product_id)
            && self.warehouse_id.map_or(true, |id| id == tx.warehouse_id)
    }
}

/// Document store backing the ledger
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Connectivity check
    async fn ping(&self) -> AppResult<()>;

    // Reference data

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>>;

    async fn find_product_by_sku(&self, sku: &str) -> AppResult<Option<Product>>;

    /// Insert a product without stock; duplicate SKU yields `DuplicateEntry("sku")`
    async fn insert_product(&self, product: &Product) -> AppResult<()>;

    async fn list_products(&self) -> AppResult<Vec<Product>>;

    /// All warehouses ordered by name
    async fn list_warehouses(&self) -> AppResult<Vec<Warehouse>>;

    async fn find_warehouse(&self, id: Uuid) -> AppResult<Option<Warehouse>>;

    /// Return the warehouse with this name, creating it once if missing
    async fn upsert_warehouse(&self, name: &str, location: &str) -> AppResult<Warehouse>;

    async fn find_vendor(&self, id: Uuid) -> AppResult<Option<Vendor>>;

    /// Return the vendor with this name, creating it once if missing
    async fn upsert_vendor(&self, name: &str) -> AppResult<Vendor>;

    async fn find_category(&self, id: Uuid) -> AppResult<Option<Category>>;

    /// Return the category with this name, creating it once if missing
    async fn upsert_category(&self, name: &str) -> AppResult<Category>;

    // Ledger

    /// Committed quantity of a cell, zero when the cell does not exist
    async fn quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> AppResult<i64>;

    async fn cells(&self, product_id: Uuid) -> AppResult<Vec<StockCell>>;

    /// Apply a batch atomically: all steps, their transactions and the
    /// operation write commit together or not at all.
    async fn commit(&self, batch: StockBatch) -> AppResult<CommitOutcome>;

    // Operations

    /// Insert an operation that does not touch stock.
    ///
    /// Collisions yield `DuplicateEntry("reference_no")` or
    /// `DuplicateEntry("idempotency_key")`.
    async fn insert_operation(&self, operation: &Operation) -> AppResult<()>;

    async fn find_operation(&self, reference_no: &str) -> AppResult<Option<Operation>>;

    async fn find_operation_by_key(&self, idempotency_key: &str) -> AppResult<Option<Operation>>;

    /// Set `to` only when the current status is one of `from`; returns whether
    /// a row changed
    async fn update_operation_status(
        &self,
        operation_id: Uuid,
        from: &[OperationStatus],
        to: OperationStatus,
    ) -> AppResult<bool>;

    /// Most recent operations first
    async fn recent_operations(&self, limit: i64) -> AppResult<Vec<Operation>>;

    // Transactions

    /// Most recent transactions first
    async fn recent_transactions(
        &self,
        filter: TransactionFilter,
        limit: i64,
    ) -> AppResult<Vec<Transaction>>;

    /// Every transaction of a cell, oldest first
    async fn cell_transactions(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Vec<Transaction>>;
}

/// Run every step of `batch` against `cells` (current quantities keyed by
/// product and warehouse), updating them in place.
///
/// Fails on the first step that would break a cell invariant; callers only
/// publish `cells` when this returns `Ok`.
pub(crate) fn stage(
    batch: &StockBatch,
    cells: &mut HashMap<(Uuid, Uuid), i64>,
    ctx: &CommitContext,
) -> AppResult<(Vec<AppliedStep>, Vec<Transaction>)> {
    let mut steps = Vec::with_capacity(batch.steps.len());
    let mut transactions = Vec::with_capacity(batch.steps.len());

    for step in &batch.steps {
        let cell = cells.entry((step.product_id, step.warehouse_id)).or_insert(0);
        let previous = *cell;
        let quantity = step.apply_to(previous)?;
        *cell = quantity;

        steps.push(AppliedStep {
            product_id: step.product_id,
            warehouse_id: step.warehouse_id,
            previous,
            quantity,
        });
        transactions.extend(step.transaction(previous, quantity, ctx));
    }

    Ok((steps, transactions))
}

/// Error for a completion guard that found the operation in another state
pub(crate) fn not_completable(reference: &str, status: OperationStatus) -> AppError {
    AppError::InvalidStateTransition(format!(
        "Operation {} is {} and cannot be completed",
        reference, status
    ))
}
