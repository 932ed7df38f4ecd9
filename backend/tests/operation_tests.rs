//! Operation engine tests
//!
//! Tests for receipts, deliveries, transfers and adjustments including:
//! - Worked scenarios from receipt to adjustment
//! - Insufficient stock leaves no trace
//! - Idempotent completion
//! - Status machine and idempotency keys

mod common;

use common::{delivery, line, receipt, Harness};
use shared::{
    AdjustmentInput, DeliveryInput, Direction, MovementType, OperationStatus, OperationType,
    ReceiptInput, TransferInput, TransitionInput,
};
use stock_ledger::{AppError, InventoryStore};
use uuid::Uuid;

fn transfer(product_id: Uuid, from: Uuid, to: Uuid, quantity: i64) -> TransferInput {
    TransferInput {
        from_location_id: Some(from),
        to_location_id: Some(to),
        product_id: Some(product_id),
        quantity: Some(quantity),
        date: None,
        notes: None,
        status: Some(OperationStatus::Completed),
        user_id: None,
        idempotency_key: None,
    }
}

fn adjustment(product_id: Uuid, location_id: Uuid, system: i64, counted: i64) -> AdjustmentInput {
    AdjustmentInput {
        product_id: Some(product_id),
        location_id: Some(location_id),
        system_qty: Some(system),
        counted_qty: Some(counted),
        reason: Some("Cycle count".to_string()),
        date: None,
        status: None,
        user_id: None,
        idempotency_key: None,
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_receipt_creates_cell() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let op = h
        .operations
        .create_receipt(receipt(widget, main, 100))
        .await
        .unwrap();

    assert_eq!(op.status, OperationStatus::Completed);
    assert!(op.reference_no.starts_with("REC-"));
    assert_eq!(h.quantity(widget, main).await, 100);

    let log = h.cell_log(widget, main).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].movement_type, MovementType::In);
    assert_eq!(log[0].quantity, 100);
    assert_eq!(log[0].operation_id, Some(op.id));
}

#[tokio::test]
async fn test_delivery_removes_stock() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 100).await;

    h.operations
        .create_delivery(delivery(widget, main, 30))
        .await
        .unwrap();

    assert_eq!(h.quantity(widget, main).await, 70);
    let log = h.cell_log(widget, main).await;
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].movement_type, MovementType::Out);
    assert_eq!(log[1].quantity, 30);
}

#[tokio::test]
async fn test_transfer_moves_between_warehouses() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let store = h.warehouse("Store").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 70).await;

    let op = h
        .operations
        .create_transfer(transfer(widget, main, store, 50))
        .await
        .unwrap();

    assert_eq!(h.quantity(widget, main).await, 20);
    assert_eq!(h.quantity(widget, store).await, 50);

    let out = h.cell_log(widget, main).await;
    let inbound = h.cell_log(widget, store).await;
    assert_eq!(out.last().unwrap().movement_type, MovementType::Out);
    assert_eq!(out.last().unwrap().quantity, 50);
    assert_eq!(inbound.len(), 1);
    assert_eq!(inbound[0].movement_type, MovementType::In);
    assert_eq!(inbound[0].quantity, 50);
    assert_eq!(inbound[0].operation_id, Some(op.id));
}

#[tokio::test]
async fn test_adjustment_sets_counted_quantity() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 20).await;

    let op = h
        .operations
        .create_adjustment(adjustment(widget, main, 20, 18))
        .await
        .unwrap();

    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.items[0].quantity, 2);
    assert_eq!(h.quantity(widget, main).await, 18);

    let log = h.cell_log(widget, main).await;
    let adjust = log.last().unwrap();
    assert_eq!(adjust.movement_type, MovementType::Adjust);
    assert_eq!(adjust.direction, Direction::Out);
    assert_eq!(adjust.quantity, 2);
    assert_eq!(adjust.notes.as_deref(), Some("Cycle count"));
}

#[tokio::test]
async fn test_oversized_delivery_is_rejected() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 10).await;

    let err = h
        .operations
        .create_delivery(delivery(widget, main, 999))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        AppError::InsufficientStock {
            requested: 999,
            available: 10,
            ..
        }
    ));
    assert_eq!(h.quantity(widget, main).await, 10);
    assert_eq!(h.cell_log(widget, main).await.len(), 1);
    // Only the seeding receipt exists
    assert_eq!(h.operations.history(None).await.unwrap().len(), 1);
}

// ============================================================================
// Atomicity
// ============================================================================

#[tokio::test]
async fn test_multi_line_delivery_is_all_or_nothing() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let a = h.product("A-1").await;
    let b = h.product("B-1").await;
    h.stock(a, main, 10).await;
    h.stock(b, main, 1).await;

    let input = DeliveryInput {
        items: vec![line(a, main, 5), line(b, main, 2)],
        ..delivery(a, main, 1)
    };
    let err = h.operations.create_delivery(input).await.unwrap_err();

    assert!(matches!(err, AppError::InsufficientStock { product_id, .. } if product_id == b));
    assert_eq!(h.quantity(a, main).await, 10);
    assert_eq!(h.quantity(b, main).await, 1);
}

#[tokio::test]
async fn test_delivery_lines_on_same_cell_are_summed() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 10).await;

    let input = DeliveryInput {
        items: vec![line(widget, main, 6), line(widget, main, 6)],
        ..delivery(widget, main, 1)
    };
    let err = h.operations.create_delivery(input).await.unwrap_err();

    assert!(matches!(err, AppError::InsufficientStock { requested: 12, .. }));
    assert_eq!(h.quantity(widget, main).await, 10);
}

#[tokio::test]
async fn test_unknown_product_fails_before_any_write() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        items: vec![line(widget, main, 5), line(Uuid::new_v4(), main, 5)],
        ..receipt(widget, main, 1)
    };
    let err = h.operations.create_receipt(input).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.quantity(widget, main).await, 0);
    assert!(h.operations.history(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transfer_shortfall_changes_nothing() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let store = h.warehouse("Store").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 5).await;

    let err = h
        .operations
        .create_transfer(transfer(widget, main, store, 6))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InsufficientStock { .. }));
    assert_eq!(h.quantity(widget, main).await, 5);
    assert_eq!(h.quantity(widget, store).await, 0);
}

#[tokio::test]
async fn test_receipt_past_i64_max_is_rejected_without_writes() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 1).await;

    let err = h
        .operations
        .create_receipt(receipt(widget, main, i64::MAX))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(h.quantity(widget, main).await, 1);
    assert_eq!(h.cell_log(widget, main).await.len(), 1);
    assert_eq!(h.operations.history(None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_delivery_lines_summing_past_i64_max_are_rejected() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 10).await;

    let input = DeliveryInput {
        items: vec![line(widget, main, i64::MAX), line(widget, main, i64::MAX)],
        ..delivery(widget, main, 1)
    };
    let err = h.operations.create_delivery(input).await.unwrap_err();

    assert!(matches!(err, AppError::InvalidInput(_)));
    assert_eq!(h.quantity(widget, main).await, 10);
}

// ============================================================================
// Validation
// ============================================================================

#[tokio::test]
async fn test_receipt_without_items_is_invalid() {
    let h = Harness::new();
    let input = ReceiptInput {
        items: Vec::new(),
        ..receipt(Uuid::new_v4(), Uuid::new_v4(), 1)
    };
    let err = h.operations.create_receipt(input).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { field, .. } if field == "items"));
}

#[tokio::test]
async fn test_zero_quantity_line_is_invalid() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let err = h
        .operations
        .create_receipt(receipt(widget, main, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn test_transfer_requires_distinct_locations() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 5).await;

    let err = h
        .operations
        .create_transfer(transfer(widget, main, main, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation { .. }));
}

#[tokio::test]
async fn test_transfer_missing_fields() {
    let h = Harness::new();
    let input = TransferInput {
        product_id: None,
        ..transfer(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), 1)
    };
    let err = h.operations.create_transfer(input).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidInput(_)));
}

#[tokio::test]
async fn test_transfer_to_unknown_warehouse() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 5).await;

    let err = h
        .operations
        .create_transfer(transfer(widget, main, Uuid::new_v4(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(h.quantity(widget, main).await, 5);
}

// ============================================================================
// Resolution
// ============================================================================

#[tokio::test]
async fn test_lines_without_location_use_default_warehouse() {
    let h = Harness::new();
    let widget = h.product("WIDGET").await;

    let mut input = receipt(widget, Uuid::nil(), 4);
    input.items[0].location_id = None;
    let op = h.operations.create_receipt(input).await.unwrap();

    let default = h
        .store
        .upsert_warehouse(&h.config.inventory.default_warehouse_name, "Default")
        .await
        .unwrap();
    assert_eq!(op.items[0].location_id, Some(default.id));
    assert_eq!(h.quantity(widget, default.id).await, 4);
}

#[tokio::test]
async fn test_location_name_is_resolved_once() {
    let h = Harness::new();
    let widget = h.product("WIDGET").await;

    let mut first = receipt(widget, Uuid::nil(), 1);
    first.items[0].location_id = None;
    first.items[0].location_name = Some("Overflow".to_string());
    let second = first.clone();

    let a = h.operations.create_receipt(first).await.unwrap();
    let b = h.operations.create_receipt(second).await.unwrap();

    assert_eq!(a.items[0].location_id, b.items[0].location_id);
}

#[tokio::test]
async fn test_vendor_name_is_resolved() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        vendor: Some("Acme Supply".to_string()),
        ..receipt(widget, main, 1)
    };
    let op = h.operations.create_receipt(input).await.unwrap();
    let vendor = h.store.upsert_vendor("Acme Supply").await.unwrap();
    assert_eq!(op.vendor_id, Some(vendor.id));

    let unknown = ReceiptInput {
        vendor: Some(Uuid::new_v4().to_string()),
        ..receipt(widget, main, 1)
    };
    let err = h.operations.create_receipt(unknown).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_waiting_receipt_applies_on_completion() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        status: None,
        ..receipt(widget, main, 12)
    };
    let op = h.operations.create_receipt(input).await.unwrap();
    assert_eq!(op.status, OperationStatus::Waiting);
    assert_eq!(h.quantity(widget, main).await, 0);

    let done = h.operations.complete(&op.reference_no, None).await.unwrap();
    assert_eq!(done.status, OperationStatus::Completed);
    assert_eq!(h.quantity(widget, main).await, 12);
}

#[tokio::test]
async fn test_completing_twice_applies_once() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        status: Some(OperationStatus::Draft),
        ..receipt(widget, main, 7)
    };
    let op = h.operations.create_receipt(input).await.unwrap();

    h.operations.complete(&op.reference_no, None).await.unwrap();
    let again = h.operations.complete(&op.reference_no, None).await.unwrap();

    assert_eq!(again.status, OperationStatus::Completed);
    assert_eq!(h.quantity(widget, main).await, 7);
    assert_eq!(h.cell_log(widget, main).await.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_completions_apply_once() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        status: None,
        ..receipt(widget, main, 3)
    };
    let op = h.operations.create_receipt(input).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let operations = h.operations.clone();
        let reference = op.reference_no.clone();
        handles.push(tokio::spawn(async move {
            operations.complete(&reference, None).await
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(h.quantity(widget, main).await, 3);
    assert_eq!(h.cell_log(widget, main).await.len(), 1);
}

#[tokio::test]
async fn test_pending_delivery_rechecks_stock_on_completion() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 5).await;

    let pending = DeliveryInput {
        status: Some(OperationStatus::Pending),
        ..delivery(widget, main, 5)
    };
    let op = h.operations.create_delivery(pending).await.unwrap();
    h.operations
        .create_delivery(delivery(widget, main, 3))
        .await
        .unwrap();

    let err = h
        .operations
        .complete(&op.reference_no, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientStock { .. }));
    assert_eq!(
        h.operations.get(&op.reference_no).await.unwrap().status,
        OperationStatus::Pending
    );
    assert_eq!(h.quantity(widget, main).await, 2);
}

#[tokio::test]
async fn test_cancel_rules() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let open = ReceiptInput {
        status: None,
        ..receipt(widget, main, 4)
    };
    let op = h.operations.create_receipt(open).await.unwrap();
    let cancelled = h.operations.cancel(&op.reference_no).await.unwrap();
    assert_eq!(cancelled.status, OperationStatus::Cancelled);

    // Terminal: neither completion nor a second cancel
    let err = h
        .operations
        .complete(&op.reference_no, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    assert!(h.operations.cancel(&op.reference_no).await.is_err());
    assert_eq!(h.quantity(widget, main).await, 0);

    let done = h
        .operations
        .create_receipt(receipt(widget, main, 4))
        .await
        .unwrap();
    let err = h.operations.cancel(&done.reference_no).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
    assert_eq!(h.quantity(widget, main).await, 4);
}

#[tokio::test]
async fn test_transitions_between_open_statuses() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        status: Some(OperationStatus::Draft),
        ..receipt(widget, main, 2)
    };
    let op = h.operations.create_receipt(input).await.unwrap();

    let waiting = h
        .operations
        .transition(
            &op.reference_no,
            TransitionInput {
                status: OperationStatus::Waiting,
                user_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(waiting.status, OperationStatus::Waiting);
    assert_eq!(h.quantity(widget, main).await, 0);

    let done = h
        .operations
        .transition(
            &op.reference_no,
            TransitionInput {
                status: OperationStatus::Completed,
                user_id: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(done.status, OperationStatus::Completed);
    assert_eq!(h.quantity(widget, main).await, 2);

    let err = h
        .operations
        .transition(
            &op.reference_no,
            TransitionInput {
                status: OperationStatus::Draft,
                user_id: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidStateTransition(_)));
}

#[tokio::test]
async fn test_pending_adjustment_applies_on_completion() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 9).await;

    let input = AdjustmentInput {
        status: Some(OperationStatus::Pending),
        ..adjustment(widget, main, 9, 12)
    };
    let op = h.operations.create_adjustment(input).await.unwrap();
    assert_eq!(h.quantity(widget, main).await, 9);

    h.operations.complete(&op.reference_no, None).await.unwrap();
    assert_eq!(h.quantity(widget, main).await, 12);
    let adjust = h.cell_log(widget, main).await.pop().unwrap();
    assert_eq!(adjust.direction, Direction::In);
    assert_eq!(adjust.quantity, 3);
}

#[tokio::test]
async fn test_matching_count_records_no_transaction() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;
    h.stock(widget, main, 9).await;

    let op = h
        .operations
        .create_adjustment(adjustment(widget, main, 9, 9))
        .await
        .unwrap();

    assert_eq!(op.items[0].quantity, 0);
    assert_eq!(h.cell_log(widget, main).await.len(), 1);
}

#[tokio::test]
async fn test_unknown_reference_is_not_found() {
    let h = Harness::new();
    let err = h
        .operations
        .complete("REC-20240101-DEADBEEF", None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

// ============================================================================
// Idempotency keys and history
// ============================================================================

#[tokio::test]
async fn test_repeated_idempotency_key_returns_first_operation() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        idempotency_key: Some("receipt-42".to_string()),
        ..receipt(widget, main, 10)
    };
    let first = h.operations.create_receipt(input.clone()).await.unwrap();
    let second = h.operations.create_receipt(input).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.reference_no, second.reference_no);
    assert_eq!(h.quantity(widget, main).await, 10);
}

#[tokio::test]
async fn test_malformed_idempotency_key_is_invalid() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let widget = h.product("WIDGET").await;

    let input = ReceiptInput {
        idempotency_key: Some("has spaces".to_string()),
        ..receipt(widget, main, 1)
    };
    let err = h.operations.create_receipt(input).await.unwrap_err();
    assert!(matches!(err, AppError::Validation { field, .. } if field == "idempotency_key"));
}

#[tokio::test]
async fn test_history_is_most_recent_first() {
    let h = Harness::new();
    let main = h.warehouse("Main").await;
    let store = h.warehouse("Store").await;
    let widget = h.product("WIDGET").await;

    h.stock(widget, main, 10).await;
    h.operations
        .create_transfer(transfer(widget, main, store, 4))
        .await
        .unwrap();
    h.operations
        .create_delivery(delivery(widget, store, 1))
        .await
        .unwrap();

    let history = h.operations.history(None).await.unwrap();
    let types: Vec<OperationType> = history.iter().map(|op| op.operation_type).collect();
    assert_eq!(
        types,
        vec![
            OperationType::Delivery,
            OperationType::Transfer,
            OperationType::Receipt
        ]
    );
    assert_eq!(h.operations.history(Some(2)).await.unwrap().len(), 2);

    let fetched = h.operations.get(&history[1].reference_no).await.unwrap();
    assert_eq!(fetched.id, history[1].id);
}
