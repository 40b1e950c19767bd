//! Postgres-backed store implementation.
//!
//! Products carry their cached counters and a `version` column; the ledger
//! lives in `stock_transactions` with a `BIGSERIAL` sequence that defines
//! replay order. A movement commit runs in one database transaction that
//! locks the product row, checks the version, writes the ledger row and the
//! counters, and commits.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Duplicate` |
//! | Database (foreign key violation) | `23503` | `Referenced` |
//! | Database (check constraint violation) | `23514` | `Backend` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / RowNotFound / Other | N/A | `Backend` |

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Row};
use tracing::instrument;

use stockroom_core::{
    CategoryId, ExpectedVersion, ProductId, TransactionId, UnitId, UserId,
};
use stockroom_stock::{
    Category, Counters, Pricing, Product, Quantity, Transaction, TransactionType, Unit,
};

use super::{
    CatalogStore, CommittedMovement, InventoryStore, LedgerWrite, MovementWrite, Page,
    Pagination, ProductFilter, StoreError, StoreResult, TransactionFilter,
};

const MIGRATION: &str = include_str!("../../migrations/0001_stockroom.sql");

const PRODUCT_COLUMNS: &str = "id, name, description, category_id, unit_id, \
    quantity_in_store, quantity_in_market, opening_store, opening_market, \
    price, wholesale_price, pieces_no, created_by, last_updated_by, \
    created_at, updated_at, version";

const TRANSACTION_COLUMNS: &str = "t.id, t.sequence, t.product_id, t.type, t.quantity, \
    t.description, t.created_by, t.last_updated_by, t.created_at, t.updated_at";

/// Postgres-backed store.
///
/// `Send + Sync`; all access goes through the SQLx pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Open a pool against `database_url`.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they do not exist yet.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(MIGRATION)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for PostgresStore {
    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        let sql = format!(
            r#"
            INSERT INTO products (
                id, name, description, category_id, unit_id,
                quantity_in_store, quantity_in_market, opening_store, opening_market,
                price, wholesale_price, pieces_no, created_by, last_updated_by,
                created_at, updated_at, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, 0)
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(product.description.as_deref())
            .bind(product.category_id.as_uuid())
            .bind(product.unit_id.as_uuid())
            .bind(product.counters.store)
            .bind(product.counters.market)
            .bind(product.opening.store)
            .bind(product.opening.market)
            .bind(product.pricing.price)
            .bind(product.pricing.wholesale_price)
            .bind(product.pricing.pieces_no)
            .bind(product.created_by.as_uuid())
            .bind(product.last_updated_by.as_uuid())
            .bind(product.created_at)
            .bind(product.updated_at)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;

        product_from_row(&row)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_product", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_product_by_name(&self, name: &str) -> StoreResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE name = $1");
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("find_product_by_name", e))?;

        row.as_ref().map(product_from_row).transpose()
    }

    #[instrument(skip(self, filter), err)]
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(like_pattern);

        let sql = format!(
            r#"
            SELECT {PRODUCT_COLUMNS}
            FROM products
            WHERE ($1::uuid IS NULL OR category_id = $1)
                AND ($2::uuid IS NULL OR unit_id = $2)
                AND ($3::uuid IS NULL OR created_by = $3)
                AND ($4::text IS NULL OR name ILIKE $4 OR description ILIKE $4)
            ORDER BY name ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(filter.category_id.map(|id| *id.as_uuid()))
            .bind(filter.unit_id.map(|id| *id.as_uuid()))
            .bind(filter.created_by.map(|id| *id.as_uuid()))
            .bind(search)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_products", e))?;

        rows.iter().map(product_from_row).collect()
    }

    #[instrument(skip(self, product), fields(product_id = %product.id), err)]
    async fn update_product(
        &self,
        product: &Product,
        expected_version: ExpectedVersion,
    ) -> StoreResult<Product> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        lock_product_version(&mut tx, product.id, expected_version).await?;

        let sql = format!(
            r#"
            UPDATE products SET
                name = $2,
                description = $3,
                category_id = $4,
                unit_id = $5,
                quantity_in_store = $6,
                quantity_in_market = $7,
                opening_store = $8,
                opening_market = $9,
                price = $10,
                wholesale_price = $11,
                pieces_no = $12,
                last_updated_by = $13,
                updated_at = $14,
                version = version + 1
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(product.id.as_uuid())
            .bind(&product.name)
            .bind(product.description.as_deref())
            .bind(product.category_id.as_uuid())
            .bind(product.unit_id.as_uuid())
            .bind(product.counters.store)
            .bind(product.counters.market)
            .bind(product.opening.store)
            .bind(product.opening.market)
            .bind(product.pricing.price)
            .bind(product.pricing.wholesale_price)
            .bind(product.pricing.pieces_no)
            .bind(product.last_updated_by.as_uuid())
            .bind(product.updated_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_product", e))?;

        let updated = product_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(updated)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_product", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("product {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(transaction_id = %id), err)]
    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM stock_transactions t WHERE t.id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_transaction", e))?;

        row.as_ref().map(transaction_from_row).transpose()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn product_ledger(&self, product_id: ProductId) -> StoreResult<Vec<Transaction>> {
        let sql = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM stock_transactions t
            WHERE t.product_id = $1
            ORDER BY t.sequence ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .bind(product_id.as_uuid())
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("product_ledger", e))?;

        rows.iter().map(transaction_from_row).collect()
    }

    #[instrument(skip(self), fields(product_id = %product_id), err)]
    async fn has_transactions(&self, product_id: ProductId) -> StoreResult<bool> {
        let row = sqlx::query(
            "SELECT EXISTS (SELECT 1 FROM stock_transactions WHERE product_id = $1) AS present",
        )
        .bind(product_id.as_uuid())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("has_transactions", e))?;

        row.try_get("present")
            .map_err(|e| StoreError::Backend(format!("failed to read present: {e}")))
    }

    #[instrument(skip(self, filter), fields(page = pagination.page, limit = pagination.limit), err)]
    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<Transaction>> {
        let product_param = filter.product_id.map(|id| *id.as_uuid());
        let types_param: Vec<String> = filter.types.iter().map(|t| t.as_str().to_string()).collect();
        let created_by_param = filter.created_by.map(|id| *id.as_uuid());
        let updated_by_param = filter.last_updated_by.map(|id| *id.as_uuid());
        let search_param = filter.search_term().map(like_pattern);
        let quantity_param = filter.search_term().and_then(|s| s.parse::<i64>().ok());

        // Shared WHERE clause for count + page queries.
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR t.product_id = $1)
                AND (cardinality($2::text[]) = 0 OR t.type = ANY($2))
                AND ($3::uuid IS NULL OR t.created_by = $3)
                AND ($4::uuid IS NULL OR t.last_updated_by = $4)
                AND ($5::timestamptz IS NULL OR t.created_at >= $5)
                AND ($6::timestamptz IS NULL OR t.created_at <= $6)
                AND ($7::text IS NULL
                     OR p.name ILIKE $7
                     OR t.description ILIKE $7
                     OR t.quantity = $8::bigint)
        "#;

        let count_sql = format!(
            "SELECT COUNT(*) AS total FROM stock_transactions t JOIN products p ON p.id = t.product_id {WHERE}"
        );
        let count_row = sqlx::query(&count_sql)
            .bind(product_param)
            .bind(&types_param)
            .bind(created_by_param)
            .bind(updated_by_param)
            .bind(filter.range.start)
            .bind(filter.range.end)
            .bind(search_param.as_deref())
            .bind(quantity_param)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_transactions", e))?;

        let total: i64 = count_row
            .try_get("total")
            .map_err(|e| StoreError::Backend(format!("failed to read count: {e}")))?;

        let page_sql = format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM stock_transactions t
            JOIN products p ON p.id = t.product_id
            {WHERE}
            ORDER BY t.created_at DESC, t.sequence DESC
            LIMIT $9 OFFSET $10
            "#
        );
        let rows = sqlx::query(&page_sql)
            .bind(product_param)
            .bind(&types_param)
            .bind(created_by_param)
            .bind(updated_by_param)
            .bind(filter.range.start)
            .bind(filter.range.end)
            .bind(search_param.as_deref())
            .bind(quantity_param)
            .bind(i64::from(pagination.limit))
            .bind(i64::try_from(pagination.offset()).unwrap_or(i64::MAX))
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("query_transactions", e))?;

        let items = rows
            .iter()
            .map(transaction_from_row)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Page {
            items,
            total: u64::try_from(total).unwrap_or(0),
            pagination,
        })
    }

    #[instrument(
        skip(self, write),
        fields(product_id = %write.product_id, expected_version = ?write.expected_version),
        err
    )]
    async fn commit_movement(&self, write: MovementWrite) -> StoreResult<CommittedMovement> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        lock_product_version(&mut tx, write.product_id, write.expected_version).await?;

        let transaction = match write.ledger {
            LedgerWrite::Append(row) => {
                let sql = format!(
                    r#"
                    INSERT INTO stock_transactions AS t (
                        id, product_id, type, quantity, description,
                        created_by, last_updated_by, created_at, updated_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                    RETURNING {TRANSACTION_COLUMNS}
                    "#
                );
                let inserted = sqlx::query(&sql)
                    .bind(row.id.as_uuid())
                    .bind(row.product_id.as_uuid())
                    .bind(row.kind.as_str())
                    .bind(row.quantity.get())
                    .bind(row.description.as_deref())
                    .bind(row.created_by.as_uuid())
                    .bind(row.last_updated_by.as_uuid())
                    .bind(row.created_at)
                    .bind(row.updated_at)
                    .fetch_one(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("append_transaction", e))?;
                Some(transaction_from_row(&inserted)?)
            }
            LedgerWrite::Amend(row) => {
                let sql = format!(
                    r#"
                    UPDATE stock_transactions AS t SET
                        quantity = $3,
                        description = $4,
                        last_updated_by = $5,
                        updated_at = $6
                    WHERE t.id = $1 AND t.product_id = $2
                    RETURNING {TRANSACTION_COLUMNS}
                    "#
                );
                let updated = sqlx::query(&sql)
                    .bind(row.id.as_uuid())
                    .bind(row.product_id.as_uuid())
                    .bind(row.quantity.get())
                    .bind(row.description.as_deref())
                    .bind(row.last_updated_by.as_uuid())
                    .bind(row.updated_at)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("amend_transaction", e))?
                    .ok_or_else(|| StoreError::NotFound(format!("transaction {}", row.id)))?;
                Some(transaction_from_row(&updated)?)
            }
            LedgerWrite::Remove(id) => {
                let result = sqlx::query(
                    "DELETE FROM stock_transactions WHERE id = $1 AND product_id = $2",
                )
                .bind(id.as_uuid())
                .bind(write.product_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("remove_transaction", e))?;
                if result.rows_affected() == 0 {
                    return Err(StoreError::NotFound(format!("transaction {id}")));
                }
                None
            }
            LedgerWrite::Nothing => None,
        };

        let sql = format!(
            r#"
            UPDATE products SET
                quantity_in_store = $2,
                quantity_in_market = $3,
                updated_at = $4,
                version = version + 1
            WHERE id = $1
            RETURNING {PRODUCT_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(write.product_id.as_uuid())
            .bind(write.counters.store)
            .bind(write.counters.market)
            .bind(write.at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("update_counters", e))?;
        let product = product_from_row(&row)?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        tracing::debug!(
            product_id = %product.id,
            version = product.version,
            "movement committed"
        );

        Ok(CommittedMovement {
            product,
            transaction,
        })
    }
}

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        sqlx::query("INSERT INTO categories (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .bind(category.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_category", e))?;
        Ok(())
    }

    #[instrument(skip(self, category), fields(category_id = %category.id), err)]
    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let result = sqlx::query("UPDATE categories SET name = $2 WHERE id = $1")
            .bind(category.id.as_uuid())
            .bind(&category.name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_category", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("category {}", category.id)));
        }
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        let row = sqlx::query("SELECT id, name, created_at FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_category", e))?;

        row.map(|r| {
            CatalogRow::from_row(&r)
                .map(CatalogRow::into_category)
                .map_err(|e| StoreError::Backend(format!("failed to deserialize category row: {e}")))
        })
        .transpose()
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM categories ORDER BY name ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_categories", e))?;

        rows.iter()
            .map(|r| {
                CatalogRow::from_row(r)
                    .map(CatalogRow::into_category)
                    .map_err(|e| {
                        StoreError::Backend(format!("failed to deserialize category row: {e}"))
                    })
            })
            .collect()
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_category", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("category {id}")));
        }
        Ok(())
    }

    #[instrument(skip(self, unit), fields(unit_id = %unit.id), err)]
    async fn insert_unit(&self, unit: &Unit) -> StoreResult<()> {
        sqlx::query("INSERT INTO units (id, name, created_at) VALUES ($1, $2, $3)")
            .bind(unit.id.as_uuid())
            .bind(&unit.name)
            .bind(unit.created_at)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_unit", e))?;
        Ok(())
    }

    #[instrument(skip(self, unit), fields(unit_id = %unit.id), err)]
    async fn update_unit(&self, unit: &Unit) -> StoreResult<()> {
        let result = sqlx::query("UPDATE units SET name = $2 WHERE id = $1")
            .bind(unit.id.as_uuid())
            .bind(&unit.name)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("update_unit", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("unit {}", unit.id)));
        }
        Ok(())
    }

    async fn get_unit(&self, id: UnitId) -> StoreResult<Option<Unit>> {
        let row = sqlx::query("SELECT id, name, created_at FROM units WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_unit", e))?;

        row.map(|r| {
            CatalogRow::from_row(&r)
                .map(CatalogRow::into_unit)
                .map_err(|e| StoreError::Backend(format!("failed to deserialize unit row: {e}")))
        })
        .transpose()
    }

    async fn list_units(&self) -> StoreResult<Vec<Unit>> {
        let rows = sqlx::query("SELECT id, name, created_at FROM units ORDER BY name ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list_units", e))?;

        rows.iter()
            .map(|r| {
                CatalogRow::from_row(r)
                    .map(CatalogRow::into_unit)
                    .map_err(|e| StoreError::Backend(format!("failed to deserialize unit row: {e}")))
            })
            .collect()
    }

    #[instrument(skip(self), fields(unit_id = %id), err)]
    async fn delete_unit(&self, id: UnitId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM units WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_unit", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("unit {id}")));
        }
        Ok(())
    }
}

/// Lock the product row and compare its version.
async fn lock_product_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    product_id: ProductId,
    expected_version: ExpectedVersion,
) -> StoreResult<()> {
    let row = sqlx::query("SELECT version FROM products WHERE id = $1 FOR UPDATE")
        .bind(product_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("lock_product", e))?
        .ok_or_else(|| StoreError::NotFound(format!("product {product_id}")))?;

    let current: i64 = row
        .try_get("version")
        .map_err(|e| StoreError::Backend(format!("failed to read version: {e}")))?;
    let current = current as u64;

    if !expected_version.matches(current) {
        return Err(StoreError::Conflict(format!(
            "product {product_id}: expected {expected_version:?}, found {current}"
        )));
    }
    Ok(())
}

/// `%term%` with LIKE metacharacters escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());

            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    // Unique violation
                    "23505" => StoreError::Duplicate(msg),
                    // Foreign key violation
                    "23503" => StoreError::Referenced(msg),
                    // Check constraint violation
                    "23514" => StoreError::Backend(msg),
                    _ => StoreError::Backend(msg),
                }
            } else {
                StoreError::Backend(msg)
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::RowNotFound => {
            StoreError::Backend(format!("unexpected row not found in {}", operation))
        }
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}

// SQLx row types

#[derive(Debug)]
struct ProductRow {
    id: uuid::Uuid,
    name: String,
    description: Option<String>,
    category_id: uuid::Uuid,
    unit_id: uuid::Uuid,
    quantity_in_store: i64,
    quantity_in_market: i64,
    opening_store: i64,
    opening_market: i64,
    price: Option<i64>,
    wholesale_price: Option<i64>,
    pieces_no: Option<i32>,
    created_by: uuid::Uuid,
    last_updated_by: uuid::Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl<'r> FromRow<'r, PgRow> for ProductRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(ProductRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            category_id: row.try_get("category_id")?,
            unit_id: row.try_get("unit_id")?,
            quantity_in_store: row.try_get("quantity_in_store")?,
            quantity_in_market: row.try_get("quantity_in_market")?,
            opening_store: row.try_get("opening_store")?,
            opening_market: row.try_get("opening_market")?,
            price: row.try_get("price")?,
            wholesale_price: row.try_get("wholesale_price")?,
            pieces_no: row.try_get("pieces_no")?,
            created_by: row.try_get("created_by")?,
            last_updated_by: row.try_get("last_updated_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            version: row.try_get("version")?,
        })
    }
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let corrupt = |e: stockroom_core::DomainError| {
            StoreError::Backend(format!("corrupt product row {}: {e}", row.id))
        };
        Ok(Product {
            id: ProductId::from_uuid(row.id),
            counters: Counters::new(row.quantity_in_store, row.quantity_in_market)
                .map_err(corrupt)?,
            opening: Counters::new(row.opening_store, row.opening_market).map_err(corrupt)?,
            name: row.name,
            description: row.description,
            category_id: CategoryId::from_uuid(row.category_id),
            unit_id: UnitId::from_uuid(row.unit_id),
            pricing: Pricing {
                price: row.price,
                wholesale_price: row.wholesale_price,
                pieces_no: row.pieces_no,
            },
            created_by: UserId::from_uuid(row.created_by),
            last_updated_by: UserId::from_uuid(row.last_updated_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version as u64,
        })
    }
}

fn product_from_row(row: &PgRow) -> StoreResult<Product> {
    ProductRow::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize product row: {e}")))?
        .try_into()
}

#[derive(Debug)]
struct TransactionRow {
    id: uuid::Uuid,
    sequence: i64,
    product_id: uuid::Uuid,
    kind: String,
    quantity: i64,
    description: Option<String>,
    created_by: uuid::Uuid,
    last_updated_by: uuid::Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for TransactionRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(TransactionRow {
            id: row.try_get("id")?,
            sequence: row.try_get("sequence")?,
            product_id: row.try_get("product_id")?,
            kind: row.try_get("type")?,
            quantity: row.try_get("quantity")?,
            description: row.try_get("description")?,
            created_by: row.try_get("created_by")?,
            last_updated_by: row.try_get("last_updated_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let corrupt = |e: stockroom_core::DomainError| {
            StoreError::Backend(format!("corrupt transaction row {}: {e}", row.id))
        };
        Ok(Transaction {
            id: TransactionId::from_uuid(row.id),
            sequence: row.sequence,
            product_id: ProductId::from_uuid(row.product_id),
            kind: TransactionType::from_str(&row.kind).map_err(corrupt)?,
            quantity: Quantity::new(row.quantity).map_err(corrupt)?,
            description: row.description,
            created_by: UserId::from_uuid(row.created_by),
            last_updated_by: UserId::from_uuid(row.last_updated_by),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn transaction_from_row(row: &PgRow) -> StoreResult<Transaction> {
    TransactionRow::from_row(row)
        .map_err(|e| StoreError::Backend(format!("failed to deserialize transaction row: {e}")))?
        .try_into()
}

#[derive(Debug)]
struct CatalogRow {
    id: uuid::Uuid,
    name: String,
    created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for CatalogRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(CatalogRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl CatalogRow {
    fn into_category(self) -> Category {
        Category {
            id: CategoryId::from_uuid(self.id),
            name: self.name,
            created_at: self.created_at,
        }
    }

    fn into_unit(self) -> Unit {
        Unit {
            id: UnitId::from_uuid(self.id),
            name: self.name,
            created_at: self.created_at,
        }
    }
}
