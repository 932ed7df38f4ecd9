//! Common types used across the service

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Query parameters for the operation history feed
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// Query parameters for the transaction audit trail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// Bounds applied to most-recent-first listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimit {
    pub default: i64,
    pub max: i64,
}

impl PageLimit {
    pub fn new(default: i64, max: i64) -> Self {
        Self { default, max }
    }

    /// Resolve a requested page size, falling back to the default and
    /// clamping into `1..=max`.
    pub fn resolve(&self, requested: Option<i64>) -> i64 {
        requested.unwrap_or(self.default).clamp(1, self.max.max(1))
    }
}

impl Default for PageLimit {
    fn default() -> Self {
        Self {
            default: 50,
            max: 200,
        }
    }
}
