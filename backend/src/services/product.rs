//! Product catalog and manual stock movements

use std::sync::Arc;

use chrono::Utc;
use shared::{
    non_blank, normalize_sku, validate_sku, validate_unit_price, CreateProductInput, Product,
    ProductWithStock, RecordMovementInput, Transaction, DEFAULT_REORDER_POINT,
};
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::services::ledger::StockLedger;
use crate::services::resolve::Resolver;
use crate::store::{CommitOutcome, InventoryStore, OperationWrite};

#[derive(Clone)]
pub struct ProductService {
    store: Arc<dyn InventoryStore>,
    ledger: StockLedger,
    resolver: Resolver,
}

impl ProductService {
    /// Create a new ProductService instance
    pub fn new(store: Arc<dyn InventoryStore>, config: &Config) -> Self {
        Self {
            ledger: StockLedger::new(store.clone()),
            resolver: Resolver::new(store.clone(), config.inventory.clone()),
            store,
        }
    }

    /// Create a product, optionally placing initial stock through the ledger
    pub async fn create_product(&self, input: CreateProductInput) -> AppResult<ProductWithStock> {
        input.validate()?;
        validate_sku(&input.sku).map_err(|msg| AppError::validation("sku", msg))?;
        validate_unit_price(input.unit_price)
            .map_err(|msg| AppError::validation("unit_price", msg))?;

        let sku = normalize_sku(&input.sku);
        if self.store.find_product_by_sku(&sku).await?.is_some() {
            return Err(AppError::DuplicateEntry("sku".to_string()));
        }

        let category = self.resolver.category(&input.category).await?;

        let initial = match input.initial_stock {
            Some(quantity) if quantity > 0 => {
                let warehouse = self.resolver.warehouse(input.warehouse_id, None).await?;
                Some((warehouse.id, quantity))
            }
            _ => None,
        };

        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            sku,
            name: input.name.trim().to_string(),
            description: non_blank(input.description.as_deref()).map(str::to_string),
            category_id: category.id,
            unit_price: input.unit_price,
            reorder_point: input.reorder_point.unwrap_or(DEFAULT_REORDER_POINT),
            stock_locations: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let (id, sku) = (product.id, product.sku.clone());

        // Product and initial stock commit together or not at all
        match initial {
            Some((warehouse_id, quantity)) => {
                self.ledger
                    .open_product(
                        product,
                        warehouse_id,
                        quantity,
                        input.user_id,
                        Some("Initial stock".to_string()),
                    )
                    .await?;
            }
            None => self.store.insert_product(&product).await?,
        }

        tracing::info!("Created product {} ({})", sku, id);
        Ok(self.resolver.product(id).await?.into())
    }

    /// All products with their cells and total stock, ordered by SKU
    pub async fn list_products(&self) -> AppResult<Vec<ProductWithStock>> {
        let products = self.store.list_products().await?;
        Ok(products.into_iter().map(ProductWithStock::from).collect())
    }

    /// One product with its per-warehouse stock
    pub async fn get_stock(&self, product_id: Uuid) -> AppResult<ProductWithStock> {
        Ok(self.resolver.product(product_id).await?.into())
    }

    /// Manual IN/OUT movement against one cell
    pub async fn record_movement(&self, input: RecordMovementInput) -> AppResult<Transaction> {
        input.validate()?;

        let delta = match input.movement_type.trim().to_uppercase().as_str() {
            "IN" => input.quantity,
            "OUT" => -input.quantity,
            "TRANSFER" => {
                return Err(AppError::InvalidInput(
                    "Transfers must be recorded as transfer operations".to_string(),
                ))
            }
            "ADJUST" => {
                return Err(AppError::InvalidInput(
                    "Adjustments must be recorded as adjustment operations".to_string(),
                ))
            }
            _ => return Err(AppError::InvalidInput("Invalid transaction type".to_string())),
        };

        self.resolver.product(input.product_id).await?;
        self.resolver.existing_warehouse(input.warehouse_id).await?;

        let notes = non_blank(input.notes.as_deref()).map(str::to_string);
        let outcome = self
            .ledger
            .with_stock_transaction(OperationWrite::None, input.user_id, |batch| {
                batch.apply_delta(input.product_id, input.warehouse_id, delta, notes);
                Ok(())
            })
            .await?;

        match outcome {
            CommitOutcome::Applied { transactions, .. } => {
                transactions.into_iter().next().ok_or_else(|| {
                    AppError::Internal("Movement produced no transaction".to_string())
                })
            }
            CommitOutcome::AlreadyCompleted => Err(AppError::Internal(
                "Stand-alone movement reported an operation completion".to_string(),
            )),
        }
    }
}
