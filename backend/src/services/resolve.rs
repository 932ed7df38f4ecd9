//! Resolution of product, warehouse, vendor and category references
//!
//! Clients may name a warehouse, vendor or category either by id or by name.
//! Ids must exist; names are resolved or created once through the store's
//! upsert on the unique name.

use std::sync::Arc;

use shared::{non_blank, validate_category_name, Category, Product, Vendor, Warehouse};
use uuid::Uuid;

use crate::config::InventoryConfig;
use crate::error::{AppError, AppResult};
use crate::store::InventoryStore;

#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn InventoryStore>,
    inventory: InventoryConfig,
}

impl Resolver {
    pub fn new(store: Arc<dyn InventoryStore>, inventory: InventoryConfig) -> Self {
        Self { store, inventory }
    }

    /// The configured default warehouse, created on first use
    pub async fn default_warehouse(&self) -> AppResult<Warehouse> {
        self.store
            .upsert_warehouse(
                &self.inventory.default_warehouse_name,
                &self.inventory.default_warehouse_location,
            )
            .await
    }

    /// Explicit id, then name (created if missing), then the default warehouse
    pub async fn warehouse(&self, id: Option<Uuid>, name: Option<&str>) -> AppResult<Warehouse> {
        if let Some(id) = id {
            return self.existing_warehouse(id).await;
        }
        match non_blank(name) {
            Some(name) => {
                tracing::debug!("Resolving warehouse by name: {}", name);
                self.store
                    .upsert_warehouse(name, &self.inventory.default_warehouse_location)
                    .await
            }
            None => self.default_warehouse().await,
        }
    }

    /// Every warehouse, ordered by name
    pub async fn warehouses(&self) -> AppResult<Vec<Warehouse>> {
        self.store.list_warehouses().await
    }

    pub async fn existing_warehouse(&self, id: Uuid) -> AppResult<Warehouse> {
        self.store
            .find_warehouse(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Warehouse".to_string()))
    }

    /// Vendor by id or by name; `None` when no vendor was given
    pub async fn vendor(&self, vendor: Option<&str>) -> AppResult<Option<Vendor>> {
        let Some(vendor) = non_blank(vendor) else {
            return Ok(None);
        };

        if let Ok(id) = Uuid::parse_str(vendor) {
            return self
                .store
                .find_vendor(id)
                .await?
                .map(Some)
                .ok_or_else(|| AppError::NotFound("Vendor".to_string()));
        }

        tracing::debug!("Resolving vendor by name: {}", vendor);
        self.store.upsert_vendor(vendor).await.map(Some)
    }

    /// Category by id or by name
    pub async fn category(&self, category: &str) -> AppResult<Category> {
        let category = category.trim();

        if let Ok(id) = Uuid::parse_str(category) {
            return self
                .store
                .find_category(id)
                .await?
                .ok_or_else(|| AppError::NotFound("Category".to_string()));
        }

        validate_category_name(category).map_err(|msg| AppError::validation("category", msg))?;
        tracing::debug!("Resolving category by name: {}", category);
        self.store.upsert_category(category).await
    }

    pub async fn product(&self, id: Uuid) -> AppResult<Product> {
        self.store
            .find_product(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }
}
