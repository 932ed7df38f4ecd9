//! Operation engine: receipts, deliveries, transfers and adjustments
//!
//! Every operation is a document with a small status machine. Only the move
//! into `completed` touches stock, and it does so in the same store commit
//! that writes the document, so an operation is never completed with part of
//! its lines applied.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use shared::{
    non_blank, validate_idempotency_key, validate_quantity, validate_transfer_locations,
    AdjustmentInput, DeliveryInput, LineItemInput, Operation, OperationItem, OperationStatus,
    OperationType, PageLimit, ReceiptInput, TransferInput, TransitionInput,
};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::ledger::StockLedger;
use crate::services::reference::ReferenceGenerator;
use crate::services::resolve::Resolver;
use crate::store::{CommitOutcome, InventoryStore, OperationWrite, StockBatch};

/// Attempts at drawing a reference number that is not taken yet
const MAX_REFERENCE_ATTEMPTS: usize = 3;

/// Operation engine
#[derive(Clone)]
pub struct OperationService {
    store: Arc<dyn InventoryStore>,
    ledger: StockLedger,
    resolver: Resolver,
    limits: PageLimit,
}

/// Everything about a new operation except its identity
struct Draft {
    operation_type: OperationType,
    vendor_id: Option<Uuid>,
    customer_name: Option<String>,
    items: Vec<OperationItem>,
    status: OperationStatus,
    notes: Option<String>,
    created_by: Option<Uuid>,
    idempotency_key: Option<String>,
    date: NaiveDate,
}

impl Draft {
    fn build(&self, reference_no: String) -> Operation {
        let now = Utc::now();
        Operation {
            id: Uuid::new_v4(),
            operation_type: self.operation_type,
            reference_no,
            vendor_id: self.vendor_id,
            customer_name: self.customer_name.clone(),
            items: self.items.clone(),
            status: self.status,
            notes: self.notes.clone(),
            created_by: self.created_by,
            idempotency_key: self.idempotency_key.clone(),
            date: self.date,
            created_at: now,
            updated_at: now,
        }
    }
}

impl OperationService {
    /// Create a new OperationService instance
    pub fn new(store: Arc<dyn InventoryStore>, config: &Config) -> Self {
        Self {
            ledger: StockLedger::new(store.clone()),
            resolver: Resolver::new(store.clone(), config.inventory.clone()),
            limits: config.inventory.page_limit(),
            store,
        }
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Record a receipt; completing it adds every line to stock
    pub async fn create_receipt(&self, input: ReceiptInput) -> AppResult<Operation> {
        input.validate()?;
        if let Some(existing) = self.replay(input.idempotency_key.as_deref()).await? {
            return Ok(existing);
        }
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "Receipt must include at least one item",
            ));
        }

        let status = initial_status(OperationType::Receipt, input.status)?;
        let vendor = self.resolver.vendor(input.vendor.as_deref()).await?;
        let items = self.resolve_lines(&input.items).await?;

        self.persist(Draft {
            operation_type: OperationType::Receipt,
            vendor_id: vendor.map(|v| v.id),
            customer_name: None,
            items,
            status,
            notes: input.notes,
            created_by: input.user_id,
            idempotency_key: input.idempotency_key,
            date: input.date.unwrap_or_else(today),
        })
        .await
    }

    /// Record a delivery; completing it removes every line from stock, or
    /// nothing at all when any cell falls short
    pub async fn create_delivery(&self, input: DeliveryInput) -> AppResult<Operation> {
        input.validate()?;
        if let Some(existing) = self.replay(input.idempotency_key.as_deref()).await? {
            return Ok(existing);
        }
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "Delivery must include at least one item",
            ));
        }

        let status = initial_status(OperationType::Delivery, input.status)?;
        let items = self.resolve_lines(&input.items).await?;

        let draft = Draft {
            operation_type: OperationType::Delivery,
            vendor_id: None,
            customer_name: non_blank(input.customer_name.as_deref()).map(str::to_string),
            items,
            status,
            notes: input.notes,
            created_by: input.user_id,
            idempotency_key: input.idempotency_key,
            date: input.date.unwrap_or_else(today),
        };

        if status == OperationStatus::Completed {
            self.ledger
                .ensure_available(&outflows(OperationType::Delivery, &draft.items))
                .await?;
        }

        self.persist(draft).await
    }

    /// Record an internal transfer between two existing warehouses
    pub async fn create_transfer(&self, input: TransferInput) -> AppResult<Operation> {
        input.validate()?;
        if let Some(existing) = self.replay(input.idempotency_key.as_deref()).await? {
            return Ok(existing);
        }

        let (from, to, product_id, quantity) = match (
            input.from_location_id,
            input.to_location_id,
            input.product_id,
            input.quantity,
        ) {
            (Some(from), Some(to), Some(product_id), Some(quantity)) => {
                (from, to, product_id, quantity)
            }
            _ => {
                return Err(AppError::InvalidInput(
                    "Missing required transfer fields".to_string(),
                ))
            }
        };
        validate_quantity(quantity).map_err(|msg| AppError::validation("quantity", msg))?;
        validate_transfer_locations(from, to)
            .map_err(|msg| AppError::validation("to_location_id", msg))?;

        let status = initial_status(OperationType::Transfer, input.status)?;
        self.resolver.product(product_id).await?;
        self.resolver.existing_warehouse(from).await?;
        self.resolver.existing_warehouse(to).await?;

        let draft = Draft {
            operation_type: OperationType::Transfer,
            vendor_id: None,
            customer_name: None,
            items: vec![OperationItem::between(product_id, quantity, from, to)],
            status,
            notes: input.notes,
            created_by: input.user_id,
            idempotency_key: input.idempotency_key,
            date: input.date.unwrap_or_else(today),
        };

        if status == OperationStatus::Completed {
            self.ledger
                .ensure_available(&outflows(OperationType::Transfer, &draft.items))
                .await?;
        }

        self.persist(draft).await
    }

    /// Record a stock count; completing it sets the cell to the counted
    /// quantity
    pub async fn create_adjustment(&self, input: AdjustmentInput) -> AppResult<Operation> {
        input.validate()?;
        if let Some(existing) = self.replay(input.idempotency_key.as_deref()).await? {
            return Ok(existing);
        }

        let (product_id, location_id, counted_qty) =
            match (input.product_id, input.location_id, input.counted_qty) {
                (Some(product_id), Some(location_id), Some(counted_qty)) => {
                    (product_id, location_id, counted_qty)
                }
                _ => {
                    return Err(AppError::InvalidInput(
                        "Missing required adjustment fields".to_string(),
                    ))
                }
            };

        let status = initial_status(OperationType::Adjustment, input.status)?;
        self.resolver.product(product_id).await?;
        self.resolver.existing_warehouse(location_id).await?;

        let on_hand = self.ledger.get_quantity(product_id, location_id).await?;
        let system_qty = input.system_qty.unwrap_or(on_hand);
        if system_qty != on_hand {
            tracing::warn!(
                "Adjustment for product {} at warehouse {} assumed {} on hand, ledger has {}",
                product_id,
                location_id,
                system_qty,
                on_hand
            );
        }

        let item = OperationItem {
            system_qty: Some(system_qty),
            counted_qty: Some(counted_qty),
            ..OperationItem::at(product_id, (counted_qty - system_qty).abs(), location_id)
        };

        self.persist(Draft {
            operation_type: OperationType::Adjustment,
            vendor_id: None,
            customer_name: None,
            items: vec![item],
            status,
            notes: non_blank(input.reason.as_deref()).map(str::to_string),
            created_by: input.user_id,
            idempotency_key: input.idempotency_key,
            date: input.date.unwrap_or_else(today),
        })
        .await
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Complete an open operation, applying its lines.
    ///
    /// Completing an operation that is already completed returns it unchanged.
    pub async fn complete(&self, reference: &str, actor: Option<Uuid>) -> AppResult<Operation> {
        let operation = self.get(reference).await?;

        match operation.status {
            OperationStatus::Completed => {
                tracing::debug!("Operation {} already completed", reference);
                return Ok(operation);
            }
            status if status.is_terminal() => {
                return Err(AppError::InvalidStateTransition(format!(
                    "Operation {} is {} and cannot be completed",
                    reference, status
                )));
            }
            _ => {}
        }

        self.ledger
            .ensure_available(&outflows(operation.operation_type, &operation.items))
            .await?;

        let outcome = self
            .ledger
            .with_stock_transaction(
                OperationWrite::Complete {
                    operation_id: operation.id,
                },
                actor.or(operation.created_by),
                |batch| stage_items(&operation, batch),
            )
            .await?;

        match outcome {
            CommitOutcome::Applied { transactions, .. } => tracing::info!(
                "Completed {} {} ({} transaction(s))",
                operation.operation_type.as_str(),
                reference,
                transactions.len()
            ),
            CommitOutcome::AlreadyCompleted => {
                tracing::debug!("Operation {} was completed concurrently", reference)
            }
        }

        self.get(reference).await
    }

    /// Cancel an open operation; stock is never touched
    pub async fn cancel(&self, reference: &str) -> AppResult<Operation> {
        self.move_open(reference, OperationStatus::Cancelled).await
    }

    /// Move an operation to `input.status`
    pub async fn transition(
        &self,
        reference: &str,
        input: TransitionInput,
    ) -> AppResult<Operation> {
        match input.status {
            OperationStatus::Completed => self.complete(reference, input.user_id).await,
            status => self.move_open(reference, status).await,
        }
    }

    pub async fn get(&self, reference: &str) -> AppResult<Operation> {
        self.store
            .find_operation(reference)
            .await?
            .ok_or_else(|| AppError::NotFound("Operation".to_string()))
    }

    /// Most recent operations first
    pub async fn history(&self, limit: Option<i64>) -> AppResult<Vec<Operation>> {
        self.store
            .recent_operations(self.limits.resolve(limit))
            .await
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Status change between open statuses, or into `cancelled`
    async fn move_open(&self, reference: &str, to: OperationStatus) -> AppResult<Operation> {
        let operation = self.get(reference).await?;
        if !operation.status.is_open() || !operation.status.can_transition_to(to) {
            return Err(AppError::InvalidStateTransition(format!(
                "Operation {} cannot move from {} to {}",
                reference, operation.status, to
            )));
        }

        // Guarded so a concurrent completion wins cleanly
        let changed = self
            .store
            .update_operation_status(operation.id, &OperationStatus::OPEN, to)
            .await?;
        if !changed {
            let current = self.get(reference).await?;
            return Err(AppError::InvalidStateTransition(format!(
                "Operation {} cannot move from {} to {}",
                reference, current.status, to
            )));
        }

        tracing::info!("Operation {} moved from {} to {}", reference, operation.status, to);
        self.get(reference).await
    }

    /// Operation previously created with this idempotency key, if any
    async fn replay(&self, key: Option<&str>) -> AppResult<Option<Operation>> {
        let Some(key) = key else {
            return Ok(None);
        };
        validate_idempotency_key(key).map_err(|msg| AppError::validation("idempotency_key", msg))?;

        let existing = self.store.find_operation_by_key(key).await?;
        if let Some(operation) = &existing {
            tracing::info!(
                "Idempotency key {} already used by {}; returning it",
                key,
                operation.reference_no
            );
        }
        Ok(existing)
    }

    async fn resolve_lines(&self, lines: &[LineItemInput]) -> AppResult<Vec<OperationItem>> {
        let mut items = Vec::with_capacity(lines.len());
        for line in lines {
            self.resolver.product(line.product_id).await?;
            let warehouse = self
                .resolver
                .warehouse(line.location_id, line.location_name.as_deref())
                .await?;
            items.push(OperationItem::at(line.product_id, line.quantity, warehouse.id));
        }
        Ok(items)
    }

    /// Write the operation, applying its lines in the same commit when it is
    /// created completed. Reference collisions are retried with a new number.
    async fn persist(&self, draft: Draft) -> AppResult<Operation> {
        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let reference = ReferenceGenerator::next(draft.operation_type.reference_prefix());
            let operation = draft.build(reference);

            let result = if operation.status == OperationStatus::Completed {
                self.ledger
                    .with_stock_transaction(
                        OperationWrite::Insert(operation.clone()),
                        operation.created_by,
                        |batch| stage_items(&operation, batch),
                    )
                    .await
                    .map(|_| ())
            } else {
                self.store.insert_operation(&operation).await
            };

            match result {
                Ok(()) => {
                    tracing::info!(
                        "Recorded {} {} with {} item(s) as {}",
                        operation.operation_type.as_str(),
                        operation.reference_no,
                        operation.items.len(),
                        operation.status
                    );
                    return Ok(operation);
                }
                Err(AppError::DuplicateEntry(field)) if field == "reference_no" => {
                    tracing::warn!(
                        "Reference {} already taken (attempt {}/{})",
                        operation.reference_no,
                        attempt,
                        MAX_REFERENCE_ATTEMPTS
                    );
                }
                Err(AppError::DuplicateEntry(field)) if field == "idempotency_key" => {
                    // A concurrent request with the same key committed first
                    return self
                        .replay(operation.idempotency_key.as_deref())
                        .await?
                        .ok_or(AppError::DuplicateEntry(field));
                }
                Err(err) => return Err(err),
            }
        }

        Err(AppError::Internal(
            "Could not allocate a unique reference number".to_string(),
        ))
    }
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Status a new operation starts in
fn initial_status(
    operation_type: OperationType,
    requested: Option<OperationStatus>,
) -> AppResult<OperationStatus> {
    match requested {
        Some(OperationStatus::Cancelled) => Err(AppError::validation(
            "status",
            "An operation cannot be created cancelled",
        )),
        Some(status) => Ok(status),
        None => Ok(operation_type.default_status()),
    }
}

/// Stock each line takes out of a cell, as (product, warehouse, quantity)
fn outflows(operation_type: OperationType, items: &[OperationItem]) -> Vec<(Uuid, Uuid, i64)> {
    items
        .iter()
        .filter_map(|item| match operation_type {
            OperationType::Delivery => item.location_id.map(|w| (item.product_id, w, item.quantity)),
            OperationType::Transfer => item
                .from_location_id
                .map(|w| (item.product_id, w, item.quantity)),
            OperationType::Receipt | OperationType::Adjustment => None,
        })
        .collect()
}

fn movement_notes(operation: &Operation, fallback: &str) -> Option<String> {
    Some(
        operation
            .notes
            .clone()
            .unwrap_or_else(|| fallback.to_string()),
    )
}

fn required_location(location: Option<Uuid>, reference: &str) -> AppResult<Uuid> {
    location.ok_or_else(|| {
        AppError::Internal(format!("Operation {} has a line without a location", reference))
    })
}

/// Stage the stock effect of every line of `operation`
fn stage_items(operation: &Operation, batch: &mut StockBatch) -> AppResult<()> {
    let reference = operation.reference_no.as_str();

    for item in &operation.items {
        match operation.operation_type {
            OperationType::Receipt => {
                let location = required_location(item.location_id, reference)?;
                batch.apply_delta(
                    item.product_id,
                    location,
                    item.quantity,
                    movement_notes(operation, "Receipt completed"),
                );
            }
            OperationType::Delivery => {
                let location = required_location(item.location_id, reference)?;
                batch.apply_delta(
                    item.product_id,
                    location,
                    -item.quantity,
                    movement_notes(operation, "Delivery completed"),
                );
            }
            OperationType::Transfer => {
                let from = required_location(item.from_location_id, reference)?;
                let to = required_location(item.to_location_id, reference)?;
                batch
                    .apply_delta(
                        item.product_id,
                        from,
                        -item.quantity,
                        movement_notes(operation, "Transfer out"),
                    )
                    .apply_delta(
                        item.product_id,
                        to,
                        item.quantity,
                        movement_notes(operation, "Transfer in"),
                    );
            }
            OperationType::Adjustment => {
                let location = required_location(item.location_id, reference)?;
                let counted = item.counted_qty.ok_or_else(|| {
                    AppError::Internal(format!(
                        "Adjustment {} has a line without a counted quantity",
                        reference
                    ))
                })?;
                batch.set_absolute(
                    item.product_id,
                    location,
                    counted,
                    movement_notes(operation, "Stock adjustment"),
                );
            }
        }
    }

    Ok(())
}
