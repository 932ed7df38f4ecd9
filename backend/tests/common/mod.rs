//! Fixtures shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use rust_decimal::Decimal;
use shared::{
    CreateProductInput, DeliveryInput, LineItemInput, OperationStatus, ReceiptInput, Transaction,
};
use stock_ledger::services::{OperationService, ProductService, StockLedger, TransactionLog};
use stock_ledger::store::TransactionFilter;
use stock_ledger::{Config, InventoryStore, MemoryInventoryStore};
use uuid::Uuid;

/// Services wired over one fresh in-memory store
pub struct Harness {
    pub store: Arc<dyn InventoryStore>,
    pub config: Config,
    pub operations: OperationService,
    pub products: ProductService,
    pub ledger: StockLedger,
    pub log: TransactionLog,
}

impl Harness {
    pub fn new() -> Self {
        let store: Arc<dyn InventoryStore> = Arc::new(MemoryInventoryStore::new());
        let config = Config::default();
        Self {
            operations: OperationService::new(store.clone(), &config),
            products: ProductService::new(store.clone(), &config),
            ledger: StockLedger::new(store.clone()),
            log: TransactionLog::new(store.clone(), config.inventory.page_limit()),
            store,
            config,
        }
    }

    pub async fn warehouse(&self, name: &str) -> Uuid {
        self.store.upsert_warehouse(name, "Default").await.unwrap().id
    }

    pub async fn product(&self, sku: &str) -> Uuid {
        let product = self
            .products
            .create_product(CreateProductInput {
                sku: sku.to_string(),
                name: format!("Product {}", sku),
                description: None,
                category: "General".to_string(),
                unit_price: Decimal::new(999, 2),
                reorder_point: None,
                initial_stock: None,
                warehouse_id: None,
                user_id: None,
            })
            .await
            .unwrap();
        product.product.id
    }

    pub async fn quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> i64 {
        self.ledger.get_quantity(product_id, warehouse_id).await.unwrap()
    }

    pub async fn cell_log(&self, product_id: Uuid, warehouse_id: Uuid) -> Vec<Transaction> {
        self.log.cell_history(product_id, warehouse_id).await.unwrap()
    }

    pub async fn all_transactions(&self) -> Vec<Transaction> {
        self.store
            .recent_transactions(TransactionFilter::default(), i64::MAX)
            .await
            .unwrap()
    }

    /// Completed receipt of `quantity` into one cell
    pub async fn stock(&self, product_id: Uuid, warehouse_id: Uuid, quantity: i64) {
        self.operations
            .create_receipt(receipt(product_id, warehouse_id, quantity))
            .await
            .unwrap();
    }
}

pub fn line(product_id: Uuid, warehouse_id: Uuid, quantity: i64) -> LineItemInput {
    LineItemInput {
        product_id,
        quantity,
        location_id: Some(warehouse_id),
        location_name: None,
    }
}

pub fn receipt(product_id: Uuid, warehouse_id: Uuid, quantity: i64) -> ReceiptInput {
    ReceiptInput {
        vendor: None,
        date: None,
        notes: None,
        status: Some(OperationStatus::Completed),
        items: vec![line(product_id, warehouse_id, quantity)],
        user_id: None,
        idempotency_key: None,
    }
}

pub fn delivery(product_id: Uuid, warehouse_id: Uuid, quantity: i64) -> DeliveryInput {
    DeliveryInput {
        customer_name: Some("Acme".to_string()),
        date: None,
        notes: None,
        status: Some(OperationStatus::Completed),
        items: vec![line(product_id, warehouse_id, quantity)],
        user_id: None,
        idempotency_key: None,
    }
}
