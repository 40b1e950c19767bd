//! Persistence boundary for products, the transaction ledger and the catalog.
//!
//! The traits make no storage assumptions: `InMemoryStore` backs tests and
//! local development, `PostgresStore` backs production. Both honour the same
//! contract for [`InventoryStore::commit_movement`]: the product counter
//! write and the ledger write land together or not at all.

pub mod in_memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockroom_core::{
    CategoryId, DomainError, DomainResult, ExpectedVersion, ProductId, TransactionId, UnitId,
    UserId,
};
use stockroom_stock::{Category, Counters, DateRange, Product, Transaction, TransactionType, Unit};

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store operation error.
///
/// These are **infrastructure errors**; the service layer translates them
/// into caller-facing error kinds.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// A unique constraint (product/category/unit name) was violated.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// The record is still referenced and cannot be removed.
    #[error("still referenced: {0}")]
    Referenced(String),

    /// Optimistic concurrency check failed (the product moved underneath us).
    #[error("optimistic concurrency check failed: {0}")]
    Conflict(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Ledger half of an atomic movement commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerWrite {
    /// Append a new row; the store assigns its `sequence`.
    Append(Transaction),
    /// Overwrite quantity, description and audit fields of an existing row.
    Amend(Transaction),
    /// Delete a row.
    Remove(TransactionId),
    /// Counters only (repair).
    Nothing,
}

/// One atomic unit: compare-and-swap the product's counters on
/// `expected_version` and apply `ledger`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementWrite {
    pub product_id: ProductId,
    pub expected_version: ExpectedVersion,
    pub counters: Counters,
    pub at: DateTime<Utc>,
    pub ledger: LedgerWrite,
}

/// What a successful [`MovementWrite`] left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedMovement {
    /// Product with its new version.
    pub product: Product,
    /// The appended or amended row (`None` for removals and repairs).
    pub transaction: Option<Transaction>,
}

/// Page request. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub const MAX_LIMIT: u32 = 100;

    pub fn new(page: Option<u32>, limit: Option<u32>, default_limit: u32) -> DomainResult<Self> {
        let page = page.unwrap_or(1);
        let limit = limit.unwrap_or(default_limit);
        if page == 0 {
            return Err(DomainError::invalid_argument("page must be at least 1"));
        }
        if limit == 0 {
            return Err(DomainError::invalid_argument("limit must be at least 1"));
        }
        Ok(Self {
            page,
            limit: limit.min(Self::MAX_LIMIT),
        })
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 10 }
    }
}

/// One page of results plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.pagination.limit))
    }
}

/// Ledger query filter. Empty `types` means every type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub product_id: Option<ProductId>,
    pub types: Vec<TransactionType>,
    pub created_by: Option<UserId>,
    pub last_updated_by: Option<UserId>,
    /// Case-insensitive match on product name or description; an integer
    /// also matches the quantity exactly.
    pub search: Option<String>,
    pub range: DateRange,
}

impl TransactionFilter {
    /// In-process evaluation of the filter (the SQL backend pushes the same
    /// predicate down to the database).
    pub fn matches(&self, tx: &Transaction, product_name: Option<&str>) -> bool {
        if self.product_id.is_some_and(|id| id != tx.product_id) {
            return false;
        }
        if !self.types.is_empty() && !self.types.contains(&tx.kind) {
            return false;
        }
        if self.created_by.is_some_and(|id| id != tx.created_by) {
            return false;
        }
        if self.last_updated_by.is_some_and(|id| id != tx.last_updated_by) {
            return false;
        }
        if !self.range.contains(tx.created_at) {
            return false;
        }
        match self.search_term() {
            None => true,
            Some(term) => {
                let needle = term.to_lowercase();
                let hit = |s: Option<&str>| s.is_some_and(|s| s.to_lowercase().contains(&needle));
                hit(product_name)
                    || hit(tx.description.as_deref())
                    || term.parse::<i64>().is_ok_and(|n| n == tx.quantity.get())
            }
        }
    }

    pub fn search_term(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// Product listing filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub category_id: Option<CategoryId>,
    pub unit_id: Option<UnitId>,
    pub created_by: Option<UserId>,
    /// Case-insensitive match on name or description.
    pub search: Option<String>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        if self.category_id.is_some_and(|id| id != product.category_id) {
            return false;
        }
        if self.unit_id.is_some_and(|id| id != product.unit_id) {
            return false;
        }
        if self.created_by.is_some_and(|id| id != product.created_by) {
            return false;
        }
        match self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            None => true,
            Some(term) => {
                let needle = term.to_lowercase();
                product.name.to_lowercase().contains(&needle)
                    || product
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Products and their ledger.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Insert a new product (version 0). Fails with `Duplicate` on a taken name.
    async fn insert_product(&self, product: &Product) -> StoreResult<Product>;

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>>;

    async fn find_product_by_name(&self, name: &str) -> StoreResult<Option<Product>>;

    /// Products ordered by name.
    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>>;

    /// Persist product metadata (and, before any ledger row exists, seeded
    /// counters). Bumps the version.
    async fn update_product(
        &self,
        product: &Product,
        expected_version: ExpectedVersion,
    ) -> StoreResult<Product>;

    /// Remove a product. Fails with `Referenced` while ledger rows point at it.
    async fn delete_product(&self, id: ProductId) -> StoreResult<()>;

    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>>;

    /// Every ledger row for a product, in `sequence` order.
    async fn product_ledger(&self, product_id: ProductId) -> StoreResult<Vec<Transaction>>;

    async fn has_transactions(&self, product_id: ProductId) -> StoreResult<bool>;

    /// Filtered page ordered by `created_at` then `sequence`, newest first.
    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<Transaction>>;

    /// Apply a [`MovementWrite`] atomically.
    ///
    /// Fails with `NotFound` if the product (or amended/removed row) is
    /// missing and with `Conflict` if the product version moved.
    async fn commit_movement(&self, write: MovementWrite) -> StoreResult<CommittedMovement>;
}

/// Categories and units of measure.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_category(&self, category: &Category) -> StoreResult<()>;
    async fn update_category(&self, category: &Category) -> StoreResult<()>;
    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn delete_category(&self, id: CategoryId) -> StoreResult<()>;

    async fn insert_unit(&self, unit: &Unit) -> StoreResult<()>;
    async fn update_unit(&self, unit: &Unit) -> StoreResult<()>;
    async fn get_unit(&self, id: UnitId) -> StoreResult<Option<Unit>>;
    async fn list_units(&self) -> StoreResult<Vec<Unit>>;
    async fn delete_unit(&self, id: UnitId) -> StoreResult<()>;
}

/// Everything the services need from one backend.
pub trait Store: InventoryStore + CatalogStore {}

impl<T> Store for T where T: InventoryStore + CatalogStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use stockroom_stock::Quantity;

    fn sample_tx(kind: TransactionType, n: i64, description: Option<&str>) -> Transaction {
        Transaction::record(
            ProductId::new(),
            kind,
            Quantity::new(n).unwrap(),
            UserId::new(),
            description.map(str::to_string),
            Utc::now(),
        )
    }

    #[test]
    fn pagination_defaults_and_bounds() {
        let p = Pagination::new(None, None, 10).unwrap();
        assert_eq!((p.page, p.limit, p.offset()), (1, 10, 0));

        let p = Pagination::new(Some(3), Some(500), 10).unwrap();
        assert_eq!(p.limit, Pagination::MAX_LIMIT);
        assert_eq!(p.offset(), 200);

        assert!(Pagination::new(Some(0), None, 10).is_err());
        assert!(Pagination::new(None, Some(0), 10).is_err());
    }

    #[test]
    fn total_pages_rounds_up() {
        let page: Page<()> = Page {
            items: vec![],
            total: 21,
            pagination: Pagination { page: 1, limit: 10 },
        };
        assert_eq!(page.total_pages(), 3);
    }

    #[test]
    fn filter_matches_type_set_and_search() {
        let tx = sample_tx(TransactionType::MarketOut, 12, Some("Counter sale"));

        let mut f = TransactionFilter {
            types: vec![TransactionType::StoreIn, TransactionType::MarketOut],
            ..Default::default()
        };
        assert!(f.matches(&tx, Some("Rice 5kg")));

        f.types = vec![TransactionType::StoreIn];
        assert!(!f.matches(&tx, Some("Rice 5kg")));

        let by_name = TransactionFilter {
            search: Some("rice".to_string()),
            ..Default::default()
        };
        assert!(by_name.matches(&tx, Some("Rice 5kg")));

        let by_description = TransactionFilter {
            search: Some("COUNTER".to_string()),
            ..Default::default()
        };
        assert!(by_description.matches(&tx, None));

        let by_quantity = TransactionFilter {
            search: Some("12".to_string()),
            ..Default::default()
        };
        assert!(by_quantity.matches(&tx, None));

        let miss = TransactionFilter {
            search: Some("flour".to_string()),
            ..Default::default()
        };
        assert!(!miss.matches(&tx, Some("Rice 5kg")));
    }
}
