//! Product and stock cell models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Default reorder point applied when a product is created without one
pub const DEFAULT_REORDER_POINT: i64 = 10;

/// Quantity of one product held at one warehouse
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockCell {
    pub warehouse_id: Uuid,
    pub quantity: i64,
}

/// A stocked product
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: Uuid,
    /// Unique, upper-cased stock keeping unit
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    pub category_id: Uuid,
    pub unit_price: Decimal,
    pub reorder_point: i64,
    /// One entry per warehouse holding this product
    pub stock_locations: Vec<StockCell>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Quantity held at a warehouse, zero when no cell exists
    pub fn quantity_at(&self, warehouse_id: Uuid) -> i64 {
        self.stock_locations
            .iter()
            .find(|cell| cell.warehouse_id == warehouse_id)
            .map(|cell| cell.quantity)
            .unwrap_or(0)
    }

    /// Total quantity across all warehouses, saturating at `i64::MAX`
    pub fn total_stock(&self) -> i64 {
        self.stock_locations
            .iter()
            .fold(0i64, |total, cell| total.saturating_add(cell.quantity))
    }
}

/// Product with its aggregated stock, as listed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductWithStock {
    #[serde(flatten)]
    pub product: Product,
    pub total_stock: i64,
}

impl From<Product> for ProductWithStock {
    fn from(product: Product) -> Self {
        let total_stock = product.total_stock();
        Self {
            product,
            total_stock,
        }
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, message = "SKU is required"))]
    pub sku: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub description: Option<String>,
    /// Category id or category name
    #[validate(length(min = 1, message = "Category is required"))]
    pub category: String,
    pub unit_price: Decimal,
    #[validate(range(min = 0, message = "Reorder point cannot be negative"))]
    pub reorder_point: Option<i64>,
    #[validate(range(min = 0, message = "Initial stock cannot be negative"))]
    pub initial_stock: Option<i64>,
    /// Warehouse receiving the initial stock; the default warehouse otherwise
    pub warehouse_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
}
