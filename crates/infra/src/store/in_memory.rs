use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use stockroom_core::{CategoryId, ExpectedVersion, ProductId, TransactionId, UnitId};
use stockroom_stock::{Category, Product, Transaction, Unit};

use super::{
    CatalogStore, CommittedMovement, InventoryStore, LedgerWrite, MovementWrite, Page,
    Pagination, ProductFilter, StoreError, StoreResult, TransactionFilter,
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    transactions: HashMap<TransactionId, Transaction>,
    categories: HashMap<CategoryId, Category>,
    units: HashMap<UnitId, Unit>,
    next_sequence: i64,
}

impl State {
    fn product_mut(&mut self, id: ProductId) -> StoreResult<&mut Product> {
        self.products
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("product {id}")))
    }

    fn name_taken(&self, name: &str, except: Option<ProductId>) -> bool {
        self.products
            .values()
            .any(|p| p.name == name && Some(p.id) != except)
    }
}

/// In-memory store.
///
/// Intended for tests/dev. One lock guards all tables, so a movement commit
/// is trivially atomic.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl InventoryStore for InMemoryStore {
    async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
        let mut state = self.write()?;
        if state.name_taken(&product.name, None) {
            return Err(StoreError::Duplicate(format!(
                "product name '{}'",
                product.name
            )));
        }
        let stored = Product {
            version: 0,
            ..product.clone()
        };
        state.products.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
        Ok(self.read()?.products.get(&id).cloned())
    }

    async fn find_product_by_name(&self, name: &str) -> StoreResult<Option<Product>> {
        Ok(self
            .read()?
            .products
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
        let state = self.read()?;
        let mut out: Vec<Product> = state
            .products
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn update_product(
        &self,
        product: &Product,
        expected_version: ExpectedVersion,
    ) -> StoreResult<Product> {
        let mut state = self.write()?;
        if state.name_taken(&product.name, Some(product.id)) {
            return Err(StoreError::Duplicate(format!(
                "product name '{}'",
                product.name
            )));
        }
        let current = state.product_mut(product.id)?;
        if !expected_version.matches(current.version) {
            return Err(StoreError::Conflict(format!(
                "product {}: expected {expected_version:?}, found {}",
                product.id, current.version
            )));
        }
        let next = Product {
            version: current.version + 1,
            ..product.clone()
        };
        *current = next.clone();
        Ok(next)
    }

    async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.products.contains_key(&id) {
            return Err(StoreError::NotFound(format!("product {id}")));
        }
        if state.transactions.values().any(|t| t.product_id == id) {
            return Err(StoreError::Referenced(format!(
                "product {id} has recorded transactions"
            )));
        }
        state.products.remove(&id);
        Ok(())
    }

    async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
        Ok(self.read()?.transactions.get(&id).cloned())
    }

    async fn product_ledger(&self, product_id: ProductId) -> StoreResult<Vec<Transaction>> {
        let state = self.read()?;
        let mut rows: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|t| t.product_id == product_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.sequence);
        Ok(rows)
    }

    async fn has_transactions(&self, product_id: ProductId) -> StoreResult<bool> {
        Ok(self
            .read()?
            .transactions
            .values()
            .any(|t| t.product_id == product_id))
    }

    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> StoreResult<Page<Transaction>> {
        let state = self.read()?;
        let mut rows: Vec<&Transaction> = state
            .transactions
            .values()
            .filter(|t| {
                let name = state.products.get(&t.product_id).map(|p| p.name.as_str());
                filter.matches(t, name)
            })
            .collect();
        rows.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.sequence.cmp(&a.sequence))
        });

        let total = rows.len() as u64;
        let items = rows
            .into_iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            total,
            pagination,
        })
    }

    async fn commit_movement(&self, write: MovementWrite) -> StoreResult<CommittedMovement> {
        let mut state = self.write()?;

        // Validate everything before touching any table.
        let current_version = state.product_mut(write.product_id)?.version;
        if !write.expected_version.matches(current_version) {
            return Err(StoreError::Conflict(format!(
                "product {}: expected {:?}, found {current_version}",
                write.product_id, write.expected_version
            )));
        }
        match &write.ledger {
            LedgerWrite::Amend(tx) => {
                if !state.transactions.contains_key(&tx.id) {
                    return Err(StoreError::NotFound(format!("transaction {}", tx.id)));
                }
            }
            LedgerWrite::Remove(id) => {
                if !state.transactions.contains_key(id) {
                    return Err(StoreError::NotFound(format!("transaction {id}")));
                }
            }
            LedgerWrite::Append(_) | LedgerWrite::Nothing => {}
        }

        let transaction = match write.ledger {
            LedgerWrite::Append(tx) => {
                state.next_sequence += 1;
                let stored = Transaction {
                    sequence: state.next_sequence,
                    ..tx
                };
                state.transactions.insert(stored.id, stored.clone());
                Some(stored)
            }
            LedgerWrite::Amend(tx) => {
                let stored = state
                    .transactions
                    .get_mut(&tx.id)
                    .ok_or_else(|| StoreError::NotFound(format!("transaction {}", tx.id)))?;
                stored.quantity = tx.quantity;
                stored.description = tx.description;
                stored.last_updated_by = tx.last_updated_by;
                stored.updated_at = tx.updated_at;
                Some(stored.clone())
            }
            LedgerWrite::Remove(id) => {
                state.transactions.remove(&id);
                None
            }
            LedgerWrite::Nothing => None,
        };

        let product = state.product_mut(write.product_id)?;
        product.counters = write.counters;
        product.updated_at = write.at;
        product.version += 1;

        Ok(CommittedMovement {
            product: product.clone(),
            transaction,
        })
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_category(&self, category: &Category) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.categories.values().any(|c| c.name == category.name) {
            return Err(StoreError::Duplicate(format!(
                "category name '{}'",
                category.name
            )));
        }
        state.categories.insert(category.id, category.clone());
        Ok(())
    }

    async fn update_category(&self, category: &Category) -> StoreResult<()> {
        let mut state = self.write()?;
        if state
            .categories
            .values()
            .any(|c| c.name == category.name && c.id != category.id)
        {
            return Err(StoreError::Duplicate(format!(
                "category name '{}'",
                category.name
            )));
        }
        let slot = state
            .categories
            .get_mut(&category.id)
            .ok_or_else(|| StoreError::NotFound(format!("category {}", category.id)))?;
        *slot = category.clone();
        Ok(())
    }

    async fn get_category(&self, id: CategoryId) -> StoreResult<Option<Category>> {
        Ok(self.read()?.categories.get(&id).cloned())
    }

    async fn list_categories(&self) -> StoreResult<Vec<Category>> {
        let mut out: Vec<Category> = self.read()?.categories.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn delete_category(&self, id: CategoryId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.categories.contains_key(&id) {
            return Err(StoreError::NotFound(format!("category {id}")));
        }
        if state.products.values().any(|p| p.category_id == id) {
            return Err(StoreError::Referenced(format!(
                "category {id} is used by products"
            )));
        }
        state.categories.remove(&id);
        Ok(())
    }

    async fn insert_unit(&self, unit: &Unit) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.units.values().any(|u| u.name == unit.name) {
            return Err(StoreError::Duplicate(format!("unit name '{}'", unit.name)));
        }
        state.units.insert(unit.id, unit.clone());
        Ok(())
    }

    async fn update_unit(&self, unit: &Unit) -> StoreResult<()> {
        let mut state = self.write()?;
        if state
            .units
            .values()
            .any(|u| u.name == unit.name && u.id != unit.id)
        {
            return Err(StoreError::Duplicate(format!("unit name '{}'", unit.name)));
        }
        let slot = state
            .units
            .get_mut(&unit.id)
            .ok_or_else(|| StoreError::NotFound(format!("unit {}", unit.id)))?;
        *slot = unit.clone();
        Ok(())
    }

    async fn get_unit(&self, id: UnitId) -> StoreResult<Option<Unit>> {
        Ok(self.read()?.units.get(&id).cloned())
    }

    async fn list_units(&self) -> StoreResult<Vec<Unit>> {
        let mut out: Vec<Unit> = self.read()?.units.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn delete_unit(&self, id: UnitId) -> StoreResult<()> {
        let mut state = self.write()?;
        if !state.units.contains_key(&id) {
            return Err(StoreError::NotFound(format!("unit {id}")));
        }
        if state.products.values().any(|p| p.unit_id == id) {
            return Err(StoreError::Referenced(format!("unit {id} is used by products")));
        }
        state.units.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use stockroom_core::UserId;
    use stockroom_stock::{Counters, NewProduct, Pricing, Quantity, TransactionType};

    fn product(name: &str) -> Product {
        Product::create(
            NewProduct {
                name: name.to_string(),
                description: None,
                category_id: CategoryId::new(),
                unit_id: UnitId::new(),
                quantity_in_store: 5,
                quantity_in_market: 0,
                quantity_in_stock: None,
                pricing: Pricing::default(),
                created_by: UserId::new(),
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn append(p: &Product, version: u64, counters: Counters) -> MovementWrite {
        let tx = Transaction::record(
            p.id,
            TransactionType::StoreIn,
            Quantity::new(1).unwrap(),
            UserId::new(),
            None,
            Utc::now(),
        );
        MovementWrite {
            product_id: p.id,
            expected_version: ExpectedVersion::Exact(version),
            counters,
            at: Utc::now(),
            ledger: LedgerWrite::Append(tx),
        }
    }

    #[tokio::test]
    async fn duplicate_product_names_are_rejected() {
        let store = InMemoryStore::new();
        store.insert_product(&product("Sugar")).await.unwrap();
        let err = store.insert_product(&product("Sugar")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn commit_assigns_sequence_and_bumps_version() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("Tea")).await.unwrap();

        let first = store
            .commit_movement(append(&p, 0, Counters { store: 6, market: 0 }))
            .await
            .unwrap();
        let second = store
            .commit_movement(append(&p, 1, Counters { store: 7, market: 0 }))
            .await
            .unwrap();

        assert_eq!(second.product.version, 2);
        assert_eq!(second.product.counters.store, 7);
        let s1 = first.transaction.unwrap().sequence;
        let s2 = second.transaction.unwrap().sequence;
        assert!(s2 > s1);

        let ledger = store.product_ledger(p.id).await.unwrap();
        assert_eq!(ledger.len(), 2);
        assert!(store.has_transactions(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn stale_version_leaves_state_untouched() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("Salt")).await.unwrap();
        store
            .commit_movement(append(&p, 0, Counters { store: 6, market: 0 }))
            .await
            .unwrap();

        let err = store
            .commit_movement(append(&p, 0, Counters { store: 99, market: 0 }))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let current = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(current.counters.store, 6);
        assert_eq!(store.product_ledger(p.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn removing_missing_row_fails_without_counter_change() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("Rice")).await.unwrap();
        let err = store
            .commit_movement(MovementWrite {
                product_id: p.id,
                expected_version: ExpectedVersion::Exact(0),
                counters: Counters::ZERO,
                at: Utc::now(),
                ledger: LedgerWrite::Remove(TransactionId::new()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let current = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(current.counters.store, 5);
        assert_eq!(current.version, 0);
    }

    #[tokio::test]
    async fn referenced_rows_cannot_be_deleted() {
        let store = InMemoryStore::new();
        let cat = Category::new("Dry goods", Utc::now()).unwrap();
        store.insert_category(&cat).await.unwrap();

        let mut p = product("Flour");
        p.category_id = cat.id;
        let p = store.insert_product(&p).await.unwrap();
        store
            .commit_movement(append(&p, 0, Counters { store: 6, market: 0 }))
            .await
            .unwrap();

        assert!(matches!(
            store.delete_category(cat.id).await,
            Err(StoreError::Referenced(_))
        ));
        assert!(matches!(
            store.delete_product(p.id).await,
            Err(StoreError::Referenced(_))
        ));
    }

    #[tokio::test]
    async fn query_orders_newest_first_and_paginates() {
        let store = InMemoryStore::new();
        let p = store.insert_product(&product("Beans")).await.unwrap();
        for v in 0..5u64 {
            store
                .commit_movement(append(&p, v, Counters { store: 6 + v as i64, market: 0 }))
                .await
                .unwrap();
        }

        let page = store
            .query_transactions(
                &TransactionFilter::default(),
                Pagination { page: 1, limit: 2 },
            )
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.total_pages(), 3);
        assert_eq!(page.items.len(), 2);
        assert!(page.items[0].sequence > page.items[1].sequence);

        let last = store
            .query_transactions(
                &TransactionFilter::default(),
                Pagination { page: 3, limit: 2 },
            )
            .await
            .unwrap();
        assert_eq!(last.items.len(), 1);
    }
}
