//! Stock movement audit records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Kind of realized stock movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum MovementType {
    In,
    Out,
    Adjust,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjust => "ADJUST",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "IN" => Some(MovementType::In),
            "OUT" => Some(MovementType::Out),
            "ADJUST" => Some(MovementType::Adjust),
            _ => None,
        }
    }
}

/// Direction of a movement relative to the stock cell
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in" => Some(Direction::In),
            "out" => Some(Direction::Out),
            _ => None,
        }
    }

    /// Direction of a signed quantity change; `None` for zero
    pub fn of_change(change: i64) -> Option<Self> {
        match change.signum() {
            1 => Some(Direction::In),
            -1 => Some(Direction::Out),
            _ => None,
        }
    }
}

/// Immutable record of one realized stock movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub direction: Direction,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    /// Always at least 1; the sign lives in `direction`
    pub quantity: i64,
    pub notes: Option<String>,
    pub user_id: Option<Uuid>,
    /// Operation that caused the movement, when there is one
    pub operation_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    /// Quantity with the direction applied (in = +, out = -)
    pub fn signed_quantity(&self) -> i64 {
        match self.direction {
            Direction::In => self.quantity,
            Direction::Out => -self.quantity,
        }
    }
}

/// Net effect of a set of transactions on one stock cell
pub fn net_quantity<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> i64 {
    transactions
        .into_iter()
        .map(Transaction::signed_quantity)
        .sum()
}

/// Manual stock movement against one cell
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RecordMovementInput {
    /// `IN` or `OUT`
    #[serde(rename = "type")]
    pub movement_type: String,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be a positive number"))]
    pub quantity: i64,
    pub notes: Option<String>,
    pub user_id: Option<Uuid>,
}
