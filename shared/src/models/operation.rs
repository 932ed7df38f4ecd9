//! Operation documents: receipts, deliveries, transfers and adjustments

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Business operation kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    Receipt,
    Delivery,
    Transfer,
    Adjustment,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Receipt => "receipt",
            OperationType::Delivery => "delivery",
            OperationType::Transfer => "transfer",
            OperationType::Adjustment => "adjustment",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "receipt" => Some(OperationType::Receipt),
            "delivery" => Some(OperationType::Delivery),
            "transfer" => Some(OperationType::Transfer),
            "adjustment" => Some(OperationType::Adjustment),
            _ => None,
        }
    }

    /// Prefix used in reference numbers
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            OperationType::Receipt => "REC",
            OperationType::Delivery => "DEL",
            OperationType::Transfer => "TRF",
            OperationType::Adjustment => "ADJ",
        }
    }

    /// Status applied when the caller does not request one
    pub fn default_status(&self) -> OperationStatus {
        match self {
            OperationType::Receipt | OperationType::Delivery => OperationStatus::Waiting,
            OperationType::Transfer => OperationStatus::Pending,
            OperationType::Adjustment => OperationStatus::Completed,
        }
    }
}

/// Operation lifecycle status
///
/// `Draft`, `Waiting` and `Pending` are open and have not touched stock.
/// `Completed` is terminal and means every line item was applied.
/// `Cancelled` is terminal and means nothing will ever be applied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Draft,
    Waiting,
    Pending,
    Completed,
    Cancelled,
}

impl OperationStatus {
    /// Statuses from which an operation may still move
    pub const OPEN: [OperationStatus; 3] = [
        OperationStatus::Draft,
        OperationStatus::Waiting,
        OperationStatus::Pending,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Draft => "draft",
            OperationStatus::Waiting => "waiting",
            OperationStatus::Pending => "pending",
            OperationStatus::Completed => "completed",
            OperationStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(OperationStatus::Draft),
            "waiting" => Some(OperationStatus::Waiting),
            "pending" => Some(OperationStatus::Pending),
            "completed" => Some(OperationStatus::Completed),
            "cancelled" => Some(OperationStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }

    /// Whether `self -> to` is a legal status change.
    ///
    /// Completing a completed operation is accepted here; the engine turns it
    /// into a no-op.
    pub fn can_transition_to(&self, to: OperationStatus) -> bool {
        match (self, to) {
            (OperationStatus::Completed, OperationStatus::Completed) => true,
            (from, _) if from.is_terminal() => false,
            _ => true,
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of an operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperationItem {
    pub product_id: Uuid,
    pub quantity: i64,
    /// Receipt, delivery and adjustment location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_location_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_location_id: Option<Uuid>,
    /// Quantity the submitter believed was on hand (adjustments only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_qty: Option<i64>,
    /// Physically counted quantity (adjustments only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counted_qty: Option<i64>,
}

impl OperationItem {
    /// Line at a single location
    pub fn at(product_id: Uuid, quantity: i64, location_id: Uuid) -> Self {
        Self {
            product_id,
            quantity,
            location_id: Some(location_id),
            from_location_id: None,
            to_location_id: None,
            system_qty: None,
            counted_qty: None,
        }
    }

    /// Line moving stock between two locations
    pub fn between(product_id: Uuid, quantity: i64, from: Uuid, to: Uuid) -> Self {
        Self {
            product_id,
            quantity,
            location_id: None,
            from_location_id: Some(from),
            to_location_id: Some(to),
            system_qty: None,
            counted_qty: None,
        }
    }
}

/// Durable record of an inventory operation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Operation {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub operation_type: OperationType,
    /// Unique human-readable identifier (e.g., "REC-20240115-1A2B3C4D")
    pub reference_no: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    pub items: Vec<OperationItem>,
    pub status: OperationStatus,
    pub notes: Option<String>,
    pub created_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Business date of the operation
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Build a reference number: PREFIX-YYYYMMDD-SUFFIX
pub fn generate_reference_no(prefix: &str, date: NaiveDate, suffix: &str) -> String {
    format!(
        "{}-{}-{}",
        prefix.to_uppercase(),
        date.format("%Y%m%d"),
        suffix.to_uppercase()
    )
}

// ============================================================================
// Inputs
// ============================================================================

/// Receipt or delivery line as submitted by a client
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LineItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i64,
    pub location_id: Option<Uuid>,
    /// Warehouse name, resolved or created when no id is given
    pub location_name: Option<String>,
}

/// Input for recording a receipt
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReceiptInput {
    /// Vendor id or vendor name
    pub vendor: Option<String>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<OperationStatus>,
    #[validate]
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    pub user_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

/// Input for recording a delivery
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeliveryInput {
    pub customer_name: Option<String>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<OperationStatus>,
    #[validate]
    #[serde(default)]
    pub items: Vec<LineItemInput>,
    pub user_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

/// Input for recording an internal transfer
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TransferInput {
    pub from_location_id: Option<Uuid>,
    pub to_location_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: Option<i64>,
    pub date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub status: Option<OperationStatus>,
    pub user_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

/// Input for recording a stock count adjustment
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AdjustmentInput {
    pub product_id: Option<Uuid>,
    pub location_id: Option<Uuid>,
    #[validate(range(min = 0, message = "System quantity cannot be negative"))]
    pub system_qty: Option<i64>,
    #[validate(range(min = 0, message = "Counted quantity cannot be negative"))]
    pub counted_qty: Option<i64>,
    pub reason: Option<String>,
    pub date: Option<NaiveDate>,
    pub status: Option<OperationStatus>,
    pub user_id: Option<Uuid>,
    pub idempotency_key: Option<String>,
}

/// Input for moving an operation to another status
#[derive(Debug, Clone, Deserialize)]
pub struct TransitionInput {
    pub status: OperationStatus,
    pub user_id: Option<Uuid>,
}
