//! Reference data: warehouses, vendors and product categories

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stock-holding location
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Warehouse {
    pub id: Uuid,
    /// Unique display name
    pub name: String,
    /// Free-text location label (e.g., "Mumbai", "Building B")
    pub location: String,
    pub manager_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// A supplier referenced by receipts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vendor {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// Product category
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
}
