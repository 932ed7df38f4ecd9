//! PostgreSQL inventory store
//!
//! Cells live in `stock_cells` with a `CHECK (quantity >= 0)` backstop. A commit
//! runs in one SQL transaction and locks every touched cell row with
//! `FOR UPDATE` in (product, warehouse) order before computing new quantities.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use shared::{
    Category, Direction, MovementType, Operation, OperationItem, OperationStatus,
    OperationType, Product, StockCell, Transaction, Vendor, Warehouse,
};
use rust_decimal::Decimal;
use sqlx::{types::Json, FromRow, PgPool, Postgres};
use uuid::Uuid;

use super::{
    not_completable, stage, CommitOutcome, InventoryStore, OperationWrite, StockBatch,
    TransactionFilter,
};
use crate::error::{AppError, AppResult};

/// Inventory store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgInventoryStore {
    db: PgPool,
}

impl PgInventoryStore {
    /// Create a new PgInventoryStore instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn attach_cells(&self, mut product: Product) -> AppResult<Product> {
        product.stock_locations = self.cells(product.id).await?;
        Ok(product)
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    description: Option<String>,
    category_id: Uuid,
    unit_price: Decimal,
    reorder_point: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            sku: row.sku,
            name: row.name,
            description: row.description,
            category_id: row.category_id,
            unit_price: row.unit_price,
            reorder_point: row.reorder_point,
            stock_locations: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct WarehouseRow {
    id: Uuid,
    name: String,
    location: String,
    manager_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl From<WarehouseRow> for Warehouse {
    fn from(row: WarehouseRow) -> Self {
        Warehouse {
            id: row.id,
            name: row.name,
            location: row.location,
            manager_id: row.manager_id,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VendorRow {
    id: Uuid,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    address: Option<String>,
}

impl From<VendorRow> for Vendor {
    fn from(row: VendorRow) -> Self {
        Vendor {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            address: row.address,
        }
    }
}

#[derive(Debug, FromRow)]
struct OperationRow {
    id: Uuid,
    operation_type: String,
    reference_no: String,
    vendor_id: Option<Uuid>,
    customer_name: Option<String>,
    items: Json<Vec<OperationItem>>,
    status: String,
    notes: Option<String>,
    created_by: Option<Uuid>,
    idempotency_key: Option<String>,
    date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OperationRow> for Operation {
    type Error = AppError;

    fn try_from(row: OperationRow) -> Result<Self, Self::Error> {
        let operation_type = OperationType::from_str(&row.operation_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown operation type: {}", row.operation_type))
        })?;
        Ok(Operation {
            id: row.id,
            operation_type,
            reference_no: row.reference_no,
            vendor_id: row.vendor_id,
            customer_name: row.customer_name,
            items: row.items.0,
            status: parse_status(&row.status)?,
            notes: row.notes,
            created_by: row.created_by,
            idempotency_key: row.idempotency_key,
            date: row.date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    movement_type: String,
    direction: String,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity: i64,
    notes: Option<String>,
    user_id: Option<Uuid>,
    operation_id: Option<Uuid>,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let movement_type = MovementType::from_str(&row.movement_type).ok_or_else(|| {
            AppError::Internal(format!("Unknown movement type: {}", row.movement_type))
        })?;
        let direction = Direction::from_str(&row.direction)
            .ok_or_else(|| AppError::Internal(format!("Unknown direction: {}", row.direction)))?;
        Ok(Transaction {
            id: row.id,
            movement_type,
            direction,
            product_id: row.product_id,
            warehouse_id: row.warehouse_id,
            quantity: row.quantity,
            notes: row.notes,
            user_id: row.user_id,
            operation_id: row.operation_id,
            timestamp: row.occurred_at,
        })
    }
}

const PRODUCT_COLUMNS: &str = "id, sku, name, description, category_id, unit_price, \
                               reorder_point, created_at, updated_at";

const OPERATION_COLUMNS: &str = "id, operation_type, reference_no, vendor_id, customer_name, \
                                 items, status, notes, created_by, idempotency_key, date, \
                                 created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, movement_type, direction, product_id, warehouse_id, \
                                   quantity, notes, user_id, operation_id, occurred_at";

fn parse_status(status: &str) -> AppResult<OperationStatus> {
    OperationStatus::from_str(status)
        .ok_or_else(|| AppError::Internal(format!("Unknown operation status: {}", status)))
}

/// Map unique violations to `DuplicateEntry` naming the offending field
fn map_unique(err: sqlx::Error) -> AppError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let field = match db_err.constraint() {
                Some("operations_reference_no_key") => "reference_no",
                Some("operations_idempotency_key_key") => "idempotency_key",
                Some("products_sku_key") => "sku",
                Some(other) => other,
                None => "value",
            };
            return AppError::DuplicateEntry(field.to_string());
        }
    }
    AppError::DatabaseError(err)
}

async fn insert_operation_with<'e, E>(executor: E, operation: &Operation) -> AppResult<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO operations (
            id, operation_type, reference_no, vendor_id, customer_name, items, status,
            notes, created_by, idempotency_key, date, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(operation.id)
    .bind(operation.operation_type.as_str())
    .bind(&operation.reference_no)
    .bind(operation.vendor_id)
    .bind(&operation.customer_name)
    .bind(Json(&operation.items))
    .bind(operation.status.as_str())
    .bind(&operation.notes)
    .bind(operation.created_by)
    .bind(&operation.idempotency_key)
    .bind(operation.date)
    .bind(operation.created_at)
    .bind(operation.updated_at)
    .execute(executor)
    .await
    .map_err(map_unique)?;

    Ok(())
}

async fn insert_product_with<'e, E>(executor: E, product: &Product) -> AppResult<()>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO products (
            id, sku, name, description, category_id, unit_price, reorder_point,
            created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(product.id)
    .bind(&product.sku)
    .bind(&product.name)
    .bind(&product.description)
    .bind(product.category_id)
    .bind(product.unit_price)
    .bind(product.reorder_point)
    .bind(product.created_at)
    .bind(product.updated_at)
    .execute(executor)
    .await
    .map_err(map_unique)?;

    Ok(())
}

#[async_trait]
impl InventoryStore for PgInventoryStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.db).await?;
        Ok(())
    }

    async fn find_product(&self, id: Uuid) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE id = $1",
            PRODUCT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Some(self.attach_cells(row.into()).await?)),
            None => Ok(None),
        }
    }

    async fn find_product_by_sku(&self, sku: &str) -> AppResult<Option<Product>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products WHERE sku = $1",
            PRODUCT_COLUMNS
        ))
        .bind(sku)
        .fetch_optional(&self.db)
        .await?;

        match row {
            Some(row) => Ok(Some(self.attach_cells(row.into()).await?)),
            None => Ok(None),
        }
    }

    async fn insert_product(&self, product: &Product) -> AppResult<()> {
        insert_product_with(&self.db, product).await
    }

    async fn list_products(&self) -> AppResult<Vec<Product>> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {} FROM products ORDER BY sku",
            PRODUCT_COLUMNS
        ))
        .fetch_all(&self.db)
        .await?;

        let cell_rows = sqlx::query_as::<_, (Uuid, Uuid, i64)>(
            "SELECT product_id, warehouse_id, quantity FROM stock_cells ORDER BY created_at",
        )
        .fetch_all(&self.db)
        .await?;

        let mut cells: HashMap<Uuid, Vec<StockCell>> = HashMap::new();
        for (product_id, warehouse_id, quantity) in cell_rows {
            cells.entry(product_id).or_default().push(StockCell {
                warehouse_id,
                quantity,
            });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut product = Product::from(row);
                product.stock_locations = cells.remove(&product.id).unwrap_or_default();
                product
            })
            .collect())
    }

    async fn list_warehouses(&self) -> AppResult<Vec<Warehouse>> {
        let rows = sqlx::query_as::<_, WarehouseRow>(
            "SELECT id, name, location, manager_id, created_at FROM warehouses ORDER BY name",
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_warehouse(&self, id: Uuid) -> AppResult<Option<Warehouse>> {
        let row = sqlx::query_as::<_, WarehouseRow>(
            "SELECT id, name, location, manager_id, created_at FROM warehouses WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn upsert_warehouse(&self, name: &str, location: &str) -> AppResult<Warehouse> {
        // The no-op update makes RETURNING yield the existing row on conflict
        let row = sqlx::query_as::<_, WarehouseRow>(
            r#"
            INSERT INTO warehouses (id, name, location)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, location, manager_id, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(location)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn find_vendor(&self, id: Uuid) -> AppResult<Option<Vendor>> {
        let row = sqlx::query_as::<_, VendorRow>(
            "SELECT id, name, phone, email, address FROM vendors WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn upsert_vendor(&self, name: &str) -> AppResult<Vendor> {
        let row = sqlx::query_as::<_, VendorRow>(
            r#"
            INSERT INTO vendors (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, phone, email, address
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        Ok(row.into())
    }

    async fn find_category(&self, id: Uuid) -> AppResult<Option<Category>> {
        let row = sqlx::query_as::<_, (Uuid, String, Option<String>)>(
            "SELECT id, name, description FROM categories WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(|(id, name, description)| Category {
            id,
            name,
            description,
        }))
    }

    async fn upsert_category(&self, name: &str) -> AppResult<Category> {
        let (id, name, description) = sqlx::query_as::<_, (Uuid, String, Option<String>)>(
            r#"
            INSERT INTO categories (id, name)
            VALUES ($1, $2)
            ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
            RETURNING id, name, description
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .fetch_one(&self.db)
        .await?;

        Ok(Category {
            id,
            name,
            description,
        })
    }

    async fn quantity(&self, product_id: Uuid, warehouse_id: Uuid) -> AppResult<i64> {
        let quantity = sqlx::query_scalar::<_, i64>(
            "SELECT quantity FROM stock_cells WHERE product_id = $1 AND warehouse_id = $2",
        )
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_optional(&self.db)
        .await?;

        Ok(quantity.unwrap_or(0))
    }

    async fn cells(&self, product_id: Uuid) -> AppResult<Vec<StockCell>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT warehouse_id, quantity
            FROM stock_cells
            WHERE product_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(warehouse_id, quantity)| StockCell {
                warehouse_id,
                quantity,
            })
            .collect())
    }

    async fn commit(&self, batch: StockBatch) -> AppResult<CommitOutcome> {
        // Dropping `tx` on any early return rolls everything back
        let mut tx = self.db.begin().await?;

        match &batch.operation {
            OperationWrite::None => {}
            OperationWrite::Insert(operation) => {
                insert_operation_with(&mut *tx, operation).await?;
            }
            OperationWrite::Complete { operation_id } => {
                let (status, reference_no) = sqlx::query_as::<_, (String, String)>(
                    "SELECT status, reference_no FROM operations WHERE id = $1 FOR UPDATE",
                )
                .bind(operation_id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| AppError::NotFound("Operation".to_string()))?;

                match parse_status(&status)? {
                    OperationStatus::Completed => return Ok(CommitOutcome::AlreadyCompleted),
                    status if status.is_open() => {}
                    status => return Err(not_completable(&reference_no, status)),
                }
            }
        }

        if let Some(product) = &batch.product {
            insert_product_with(&mut *tx, product).await?;
        }

        let mut cells: HashMap<(Uuid, Uuid), i64> = HashMap::new();
        for (product_id, warehouse_id) in batch.cells() {
            let product_exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
            )
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await?;
            if !product_exists {
                return Err(AppError::NotFound("Product".to_string()));
            }

            let warehouse_exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM warehouses WHERE id = $1)",
            )
            .bind(warehouse_id)
            .fetch_one(&mut *tx)
            .await?;
            if !warehouse_exists {
                return Err(AppError::NotFound("Warehouse".to_string()));
            }

            sqlx::query(
                r#"
                INSERT INTO stock_cells (product_id, warehouse_id, quantity)
                VALUES ($1, $2, 0)
                ON CONFLICT (product_id, warehouse_id) DO NOTHING
                "#,
            )
            .bind(product_id)
            .bind(warehouse_id)
            .execute(&mut *tx)
            .await?;

            let quantity = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT quantity FROM stock_cells
                WHERE product_id = $1 AND warehouse_id = $2
                FOR UPDATE
                "#,
            )
            .bind(product_id)
            .bind(warehouse_id)
            .fetch_one(&mut *tx)
            .await?;

            cells.insert((product_id, warehouse_id), quantity);
        }

        let ctx = batch.context(Utc::now());
        let (steps, transactions) = stage(&batch, &mut cells, &ctx)?;

        for ((product_id, warehouse_id), quantity) in &cells {
            sqlx::query(
                r#"
                UPDATE stock_cells
                SET quantity = $3, updated_at = NOW()
                WHERE product_id = $1 AND warehouse_id = $2
                "#,
            )
            .bind(product_id)
            .bind(warehouse_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }

        for entry in &transactions {
            sqlx::query(
                r#"
                INSERT INTO transactions (
                    id, movement_type, direction, product_id, warehouse_id, quantity,
                    notes, user_id, operation_id, occurred_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(entry.id)
            .bind(entry.movement_type.as_str())
            .bind(entry.direction.as_str())
            .bind(entry.product_id)
            .bind(entry.warehouse_id)
            .bind(entry.quantity)
            .bind(&entry.notes)
            .bind(entry.user_id)
            .bind(entry.operation_id)
            .bind(entry.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        if let OperationWrite::Complete { operation_id } = &batch.operation {
            sqlx::query(
                "UPDATE operations SET status = 'completed', updated_at = $2 WHERE id = $1",
            )
            .bind(operation_id)
            .bind(ctx.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(CommitOutcome::Applied {
            steps,
            transactions,
        })
    }

    async fn insert_operation(&self, operation: &Operation) -> AppResult<()> {
        insert_operation_with(&self.db, operation).await
    }

    async fn find_operation(&self, reference_no: &str) -> AppResult<Option<Operation>> {
        let row = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {} FROM operations WHERE reference_no = $1",
            OPERATION_COLUMNS
        ))
        .bind(reference_no)
        .fetch_optional(&self.db)
        .await?;

        row.map(Operation::try_from).transpose()
    }

    async fn find_operation_by_key(&self, idempotency_key: &str) -> AppResult<Option<Operation>> {
        let row = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {} FROM operations WHERE idempotency_key = $1",
            OPERATION_COLUMNS
        ))
        .bind(idempotency_key)
        .fetch_optional(&self.db)
        .await?;

        row.map(Operation::try_from).transpose()
    }

    async fn update_operation_status(
        &self,
        operation_id: Uuid,
        from: &[OperationStatus],
        to: OperationStatus,
    ) -> AppResult<bool> {
        let from: Vec<&str> = from.iter().map(OperationStatus::as_str).collect();
        let result = sqlx::query(
            r#"
            UPDATE operations
            SET status = $2, updated_at = NOW()
            WHERE id = $1 AND status = ANY($3)
            "#,
        )
        .bind(operation_id)
        .bind(to.as_str())
        .bind(&from)
        .execute(&self.db)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }

        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM operations WHERE id = $1)",
        )
        .bind(operation_id)
        .fetch_one(&self.db)
        .await?;
        if !exists {
            return Err(AppError::NotFound("Operation".to_string()));
        }

        Ok(false)
    }

    async fn recent_operations(&self, limit: i64) -> AppResult<Vec<Operation>> {
        let rows = sqlx::query_as::<_, OperationRow>(&format!(
            "SELECT {} FROM operations ORDER BY seq DESC LIMIT $1",
            OPERATION_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Operation::try_from).collect()
    }

    async fn recent_transactions(
        &self,
        filter: TransactionFilter,
        limit: i64,
    ) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::uuid IS NULL OR warehouse_id = $2)
            ORDER BY seq DESC
            LIMIT $3
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(filter.product_id)
        .bind(filter.warehouse_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }

    async fn cell_transactions(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
    ) -> AppResult<Vec<Transaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            SELECT {} FROM transactions
            WHERE product_id = $1 AND warehouse_id = $2
            ORDER BY seq
            "#,
            TRANSACTION_COLUMNS
        ))
        .bind(product_id)
        .bind(warehouse_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Transaction::try_from).collect()
    }
}
