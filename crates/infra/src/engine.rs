//! Stock movement engine.
//!
//! Every operation follows the same cycle:
//!
//! ```text
//! read product (version v) → read ledger → decide (pure domain code)
//!   → commit MovementWrite { expected: Exact(v), counters, ledger op }
//! ```
//!
//! The store applies the counter write and the ledger write atomically and
//! rejects the commit if the product version moved, in which case the cycle
//! is repeated (bounded by `EngineConfig::max_conflict_retries`).

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use stockroom_core::{ExpectedVersion, ProductId, TransactionId, UserId};
use stockroom_stock::{
    AuditReport, Counters, DateRange, Direction, LedgerEdit, MovementClass, Product, Quantity,
    Transaction, TransactionType, apply_delta, audit, available_to_return, replay, revalidate,
};

use crate::error::{EngineError, EngineResult, ErrorKind};
use crate::retry::{AttemptError, with_conflict_retry};
use crate::store::{
    InventoryStore, LedgerWrite, MovementWrite, Page, Pagination, TransactionFilter,
};

/// Engine tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_conflict_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
        }
    }
}

/// Record a new movement.
#[derive(Debug, Clone)]
pub struct RecordMovement {
    pub product_id: ProductId,
    /// Wire name of the movement type (`storeIn`, `marketOut`, ...).
    pub kind: String,
    pub quantity: i64,
    pub actor: UserId,
    pub description: Option<String>,
}

/// Change the quantity (and optionally the description) of a movement.
#[derive(Debug, Clone)]
pub struct UpdateMovement {
    pub id: TransactionId,
    pub quantity: i64,
    pub actor: UserId,
    /// `None` keeps the current description.
    pub description: Option<String>,
}

/// Remove a movement and undo its effect.
#[derive(Debug, Clone, Copy)]
pub struct DeleteMovement {
    pub id: TransactionId,
    /// Who asked for the removal; only recorded in the trace.
    pub actor: Option<UserId>,
}

/// Product state after a movement together with the written ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementOutcome {
    pub product: Product,
    pub transaction: Transaction,
}

/// The movement engine. Cheap to clone.
#[derive(Debug)]
pub struct StockMovementEngine<S: ?Sized> {
    store: Arc<S>,
    config: EngineConfig,
}

impl<S: ?Sized> Clone for StockMovementEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            config: self.config,
        }
    }
}

impl<S> StockMovementEngine<S>
where
    S: InventoryStore + ?Sized,
{
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Validate and apply one movement.
    #[instrument(skip(self, cmd), fields(product_id = %cmd.product_id, kind = %cmd.kind, quantity = cmd.quantity), err)]
    pub async fn record_movement(&self, cmd: RecordMovement) -> EngineResult<MovementOutcome> {
        let kind: TransactionType = cmd.kind.parse()?;
        let quantity = Quantity::new(cmd.quantity)?;

        let outcome = with_conflict_retry("record_movement", self.config.max_conflict_retries, || {
            self.try_record(&cmd, kind, quantity)
        })
        .await?;

        tracing::info!(
            transaction_id = %outcome.transaction.id,
            store = outcome.product.counters.store,
            market = outcome.product.counters.market,
            "movement recorded"
        );
        Ok(outcome)
    }

    async fn try_record(
        &self,
        cmd: &RecordMovement,
        kind: TransactionType,
        quantity: Quantity,
    ) -> Result<MovementOutcome, AttemptError> {
        let product = self.load_product(cmd.product_id).await?;
        let counters = apply_delta(product.counters, kind, quantity, Direction::Apply)?;

        let now = Utc::now();
        let row = Transaction::record(
            product.id,
            kind,
            quantity,
            cmd.actor,
            cmd.description.clone(),
            now,
        );

        let committed = self
            .store
            .commit_movement(MovementWrite {
                product_id: product.id,
                expected_version: ExpectedVersion::Exact(product.version),
                counters,
                at: now,
                ledger: LedgerWrite::Append(row),
            })
            .await?;

        let transaction = committed.transaction.ok_or_else(missing_row)?;
        Ok(MovementOutcome {
            product: committed.product,
            transaction,
        })
    }

    /// Change a movement's quantity.
    ///
    /// The old effect is reversed and the same type re-applied with the new
    /// quantity. The whole product ledger is replayed with the change in
    /// place first, so an edit that would leave a later movement uncovered
    /// is rejected with `insufficient_stock`.
    #[instrument(skip(self, cmd), fields(transaction_id = %cmd.id, quantity = cmd.quantity), err)]
    pub async fn update_movement(&self, cmd: UpdateMovement) -> EngineResult<MovementOutcome> {
        let quantity = Quantity::new(cmd.quantity)?;

        let outcome = with_conflict_retry("update_movement", self.config.max_conflict_retries, || {
            self.try_update(&cmd, quantity)
        })
        .await?;

        tracing::info!(
            product_id = %outcome.product.id,
            store = outcome.product.counters.store,
            market = outcome.product.counters.market,
            "movement updated"
        );
        Ok(outcome)
    }

    async fn try_update(
        &self,
        cmd: &UpdateMovement,
        quantity: Quantity,
    ) -> Result<MovementOutcome, AttemptError> {
        let (product, ledger) = self.load_for_edit(cmd.id).await?;
        let current = find_row(&ledger, cmd.id)?;

        let replayed = revalidate(
            product.opening,
            &ledger,
            LedgerEdit::Amend {
                id: cmd.id,
                quantity,
            },
        )?;
        let reversed = apply_delta(
            product.counters,
            current.kind,
            current.quantity,
            Direction::Reverse,
        )?;
        let counters = apply_delta(reversed, current.kind, quantity, Direction::Apply)?;
        warn_on_drift(&product, counters, replayed);

        let now = Utc::now();
        let row = current.amended(quantity, cmd.actor, cmd.description.clone(), now);

        let committed = self
            .store
            .commit_movement(MovementWrite {
                product_id: product.id,
                expected_version: ExpectedVersion::Exact(product.version),
                counters,
                at: now,
                ledger: LedgerWrite::Amend(row),
            })
            .await?;

        let transaction = committed.transaction.ok_or_else(missing_row)?;
        Ok(MovementOutcome {
            product: committed.product,
            transaction,
        })
    }

    /// Delete a movement, reversing its effect in the same commit.
    #[instrument(skip(self, cmd), fields(transaction_id = %cmd.id, actor = ?cmd.actor), err)]
    pub async fn delete_movement(&self, cmd: DeleteMovement) -> EngineResult<Product> {
        let product = with_conflict_retry("delete_movement", self.config.max_conflict_retries, || {
            self.try_delete(cmd)
        })
        .await?;

        tracing::info!(
            product_id = %product.id,
            store = product.counters.store,
            market = product.counters.market,
            "movement deleted"
        );
        Ok(product)
    }

    async fn try_delete(&self, cmd: DeleteMovement) -> Result<Product, AttemptError> {
        let (product, ledger) = self.load_for_edit(cmd.id).await?;
        let current = find_row(&ledger, cmd.id)?;

        let replayed = revalidate(product.opening, &ledger, LedgerEdit::Remove { id: cmd.id })?;
        let counters = apply_delta(
            product.counters,
            current.kind,
            current.quantity,
            Direction::Reverse,
        )?;
        warn_on_drift(&product, counters, replayed);

        let committed = self
            .store
            .commit_movement(MovementWrite {
                product_id: product.id,
                expected_version: ExpectedVersion::Exact(product.version),
                counters,
                at: Utc::now(),
                ledger: LedgerWrite::Remove(cmd.id),
            })
            .await?;

        Ok(committed.product)
    }

    /// Filtered, paginated ledger query (newest first).
    #[instrument(skip(self, filter), fields(page = pagination.page, limit = pagination.limit), err)]
    pub async fn list_movements(
        &self,
        filter: &TransactionFilter,
        pagination: Pagination,
    ) -> EngineResult<Page<Transaction>> {
        Ok(self.store.query_transactions(filter, pagination).await?)
    }

    pub async fn get_movement(&self, id: TransactionId) -> EngineResult<Transaction> {
        self.store
            .get_transaction(id)
            .await?
            .ok_or_else(|| EngineError::not_found("transaction"))
    }

    /// Quantity of `class`'s outgoing movements in `range` not yet returned.
    #[instrument(skip(self), fields(product_id = %product_id, class = class.as_str()), err)]
    pub async fn available_quantity(
        &self,
        product_id: ProductId,
        class: MovementClass,
        range: DateRange,
    ) -> EngineResult<i64> {
        if self.store.get_product(product_id).await?.is_none() {
            return Err(EngineError::not_found("product"));
        }
        let ledger = self.store.product_ledger(product_id).await?;
        Ok(available_to_return(&ledger, class, range))
    }

    /// Compare a product's persisted counters with its replayed ledger.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn audit_product(&self, product_id: ProductId) -> EngineResult<AuditReport> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| EngineError::not_found("product"))?;
        let ledger = self.store.product_ledger(product_id).await?;

        let report = audit(&product, &ledger);
        if !report.is_consistent() {
            tracing::warn!(
                product_id = %product_id,
                persisted = ?report.persisted,
                replayed = ?report.replayed,
                "product counters disagree with ledger"
            );
        }
        Ok(report)
    }

    /// Rewrite a product's counters to its replayed ledger.
    ///
    /// Fails with `conflict` when the ledger itself cannot be replayed.
    #[instrument(skip(self), fields(product_id = %product_id), err)]
    pub async fn repair_product(&self, product_id: ProductId) -> EngineResult<Product> {
        with_conflict_retry("repair_product", self.config.max_conflict_retries, || {
            self.try_repair(product_id)
        })
        .await
    }

    async fn try_repair(&self, product_id: ProductId) -> Result<Product, AttemptError> {
        let product = self.load_product(product_id).await?;
        let ledger = self.store.product_ledger(product_id).await?;

        let replayed = replay(product.opening, &ledger).map_err(|f| {
            EngineError::conflict(format!(
                "ledger cannot be replayed: transaction {} ({} {}) at position {} fails: {}",
                f.transaction_id,
                f.kind,
                f.quantity.get(),
                f.index,
                f.error
            ))
        })?;

        if replayed == product.counters {
            return Ok(product);
        }

        tracing::warn!(
            product_id = %product_id,
            from = ?product.counters,
            to = ?replayed,
            "repairing product counters"
        );

        let committed = self
            .store
            .commit_movement(MovementWrite {
                product_id,
                expected_version: ExpectedVersion::Exact(product.version),
                counters: replayed,
                at: Utc::now(),
                ledger: LedgerWrite::Nothing,
            })
            .await?;
        Ok(committed.product)
    }

    async fn load_product(&self, id: ProductId) -> Result<Product, AttemptError> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| AttemptError::Failed(EngineError::not_found("product")))
    }

    /// Product (read first) and its ledger (read second) for the product that
    /// owns `transaction_id`.
    async fn load_for_edit(
        &self,
        transaction_id: TransactionId,
    ) -> Result<(Product, Vec<Transaction>), AttemptError> {
        let row = self
            .store
            .get_transaction(transaction_id)
            .await?
            .ok_or_else(|| AttemptError::Failed(EngineError::not_found("transaction")))?;
        let product = self.load_product(row.product_id).await?;
        let ledger = self.store.product_ledger(product.id).await?;
        Ok((product, ledger))
    }
}

fn find_row(ledger: &[Transaction], id: TransactionId) -> Result<&Transaction, AttemptError> {
    ledger
        .iter()
        .find(|t| t.id == id)
        .ok_or_else(|| AttemptError::Failed(EngineError::not_found("transaction")))
}

fn missing_row() -> AttemptError {
    AttemptError::Failed(EngineError::new(
        ErrorKind::Internal,
        "store did not return the written transaction",
    ))
}

fn warn_on_drift(product: &Product, incremental: Counters, replayed: Counters) {
    if incremental != replayed {
        tracing::warn!(
            product_id = %product.id,
            incremental = ?incremental,
            replayed = ?replayed,
            "product counters have drifted from the ledger; run a repair"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;
    use crate::store::{CommittedMovement, InMemoryStore, ProductFilter, StoreResult};
    use stockroom_core::{CategoryId, UnitId};
    use stockroom_stock::{NewProduct, Pricing};

    fn engine() -> (Arc<InMemoryStore>, StockMovementEngine<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let engine = StockMovementEngine::new(Arc::clone(&store), EngineConfig::default());
        (store, engine)
    }

    async fn seed(store: &InMemoryStore, name: &str, store_qty: i64, market_qty: i64) -> Product {
        let product = Product::create(
            NewProduct {
                name: name.to_string(),
                description: None,
                category_id: CategoryId::new(),
                unit_id: UnitId::new(),
                quantity_in_store: store_qty,
                quantity_in_market: market_qty,
                quantity_in_stock: None,
                pricing: Pricing::default(),
                created_by: UserId::new(),
            },
            Utc::now(),
        )
        .unwrap();
        store.insert_product(&product).await.unwrap()
    }

    fn record(product_id: ProductId, kind: &str, quantity: i64) -> RecordMovement {
        RecordMovement {
            product_id,
            kind: kind.to_string(),
            quantity,
            actor: UserId::new(),
            description: None,
        }
    }

    fn update(id: TransactionId, quantity: i64) -> UpdateMovement {
        UpdateMovement {
            id,
            quantity,
            actor: UserId::new(),
            description: None,
        }
    }

    async fn counters(store: &InMemoryStore, id: ProductId) -> Counters {
        store.get_product(id).await.unwrap().unwrap().counters
    }

    #[tokio::test]
    async fn record_applies_delta_and_bumps_version() {
        let (store, engine) = engine();
        let p = seed(&store, "Rice", 10, 0).await;
        let actor = UserId::new();

        let out = engine
            .record_movement(RecordMovement {
                actor,
                description: Some("to shelves".into()),
                ..record(p.id, "storeToMarket", 4)
            })
            .await
            .unwrap();

        assert_eq!(out.product.counters, Counters { store: 6, market: 4 });
        assert_eq!(out.product.quantity_in_stock(), 10);
        assert_eq!(out.product.version, p.version + 1);
        assert_eq!(out.transaction.created_by, actor);
        assert_eq!(out.transaction.last_updated_by, actor);
        assert_eq!(out.transaction.kind, TransactionType::StoreToMarket);
    }

    #[tokio::test]
    async fn insufficient_stock_leaves_no_trace() {
        let (store, engine) = engine();
        let p = seed(&store, "Oil", 2, 0).await;

        let err = engine.record_movement(record(p.id, "storeOut", 3)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientStock);
        assert_eq!(err.message, "Insufficient stock for this operation");

        let after = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(after.counters, p.counters);
        assert_eq!(after.version, p.version);
        assert!(!store.has_transactions(p.id).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_type_and_bad_quantity_are_rejected() {
        let (store, engine) = engine();
        let p = seed(&store, "Tea", 5, 5).await;

        let err = engine.record_movement(record(p.id, "bogus", 1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = engine.record_movement(record(p.id, "storeIn", 0)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);

        let err = engine.record_movement(record(ProductId::new(), "storeIn", 1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);

        assert_eq!(counters(&store, p.id).await, Counters { store: 5, market: 5 });
    }

    #[tokio::test]
    async fn out_of_order_edit_scenario() {
        let (store, engine) = engine();
        let p = seed(&store, "Sugar", 10, 0).await;

        let t1 = engine.record_movement(record(p.id, "storeToMarket", 4)).await.unwrap();
        assert_eq!(t1.product.counters, Counters { store: 6, market: 4 });

        let err = engine.record_movement(record(p.id, "marketOut", 6)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientStock);

        let t3 = engine.record_movement(record(p.id, "marketOut", 3)).await.unwrap();
        assert_eq!(t3.product.counters, Counters { store: 6, market: 1 });

        // Shrinking T1 to 2 would leave T3 (marketOut 3) uncovered.
        let err = engine.update_movement(update(t1.transaction.id, 2)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientStock);
        assert!(err.message.contains(&t3.transaction.id.to_string()));

        let after = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(after.counters, Counters { store: 6, market: 1 });
        let row = store.get_transaction(t1.transaction.id).await.unwrap().unwrap();
        assert_eq!(row.quantity.get(), 4);
    }

    #[tokio::test]
    async fn update_is_reversible() {
        let (store, engine) = engine();
        let p = seed(&store, "Flour", 10, 0).await;
        let t = engine.record_movement(record(p.id, "storeOut", 3)).await.unwrap();
        let before = t.product.counters;

        let changed = engine.update_movement(update(t.transaction.id, 7)).await.unwrap();
        assert_eq!(changed.product.counters, Counters { store: 3, market: 0 });
        assert_eq!(changed.transaction.quantity.get(), 7);

        let restored = engine.update_movement(update(t.transaction.id, 3)).await.unwrap();
        assert_eq!(restored.product.counters, before);
        assert!(engine.audit_product(p.id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn update_keeps_type_and_records_editor() {
        let (store, engine) = engine();
        let p = seed(&store, "Beans", 10, 0).await;
        let t = engine
            .record_movement(RecordMovement {
                description: Some("restock".into()),
                ..record(p.id, "storeIn", 2)
            })
            .await
            .unwrap();

        let editor = UserId::new();
        let out = engine
            .update_movement(UpdateMovement {
                actor: editor,
                ..update(t.transaction.id, 5)
            })
            .await
            .unwrap();
        assert_eq!(out.transaction.kind, TransactionType::StoreIn);
        assert_eq!(out.transaction.last_updated_by, editor);
        assert_eq!(out.transaction.created_by, t.transaction.created_by);
        assert_eq!(out.transaction.description.as_deref(), Some("restock"));
        assert_eq!(out.product.counters.store, 15);

        let err = engine.update_movement(update(TransactionId::new(), 1)).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_reverses_effect() {
        let (store, engine) = engine();
        let p = seed(&store, "Milk", 0, 0).await;
        let t = engine.record_movement(record(p.id, "storeIn", 8)).await.unwrap();

        let product = engine
            .delete_movement(DeleteMovement {
                id: t.transaction.id,
                actor: None,
            })
            .await
            .unwrap();
        assert_eq!(product.counters, Counters::ZERO);
        assert!(store.get_transaction(t.transaction.id).await.unwrap().is_none());

        let err = engine
            .delete_movement(DeleteMovement {
                id: t.transaction.id,
                actor: Some(UserId::new()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn delete_that_uncovers_a_later_row_is_rejected() {
        let (store, engine) = engine();
        let p = seed(&store, "Eggs", 0, 0).await;
        let back = engine.record_movement(record(p.id, "marketReturn", 5)).await.unwrap();
        engine.record_movement(record(p.id, "marketOut", 4)).await.unwrap();

        let err = engine
            .delete_movement(DeleteMovement {
                id: back.transaction.id,
                actor: Some(UserId::new()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientStock);
        assert_eq!(counters(&store, p.id).await, Counters { store: 0, market: 1 });
    }

    #[tokio::test]
    async fn ledger_replays_to_persisted_counters() {
        let (store, engine) = engine();
        let p = seed(&store, "Soap", 3, 2).await;
        for (kind, n) in [
            ("storeIn", 10),
            ("storeToMarket", 6),
            ("marketOut", 5),
            ("marketReturn", 1),
            ("marketToStore", 2),
            ("storeOut", 4),
        ] {
            engine.record_movement(record(p.id, kind, n)).await.unwrap();
        }
        let report = engine.audit_product(p.id).await.unwrap();
        assert!(report.is_consistent());
        assert_eq!(report.transaction_count, 6);
        assert_eq!(report.persisted, Counters { store: 11, market: 2 });
    }

    #[tokio::test]
    async fn repair_restores_drifted_counters() {
        let (store, engine) = engine();
        let p = seed(&store, "Salt", 5, 0).await;
        engine.record_movement(record(p.id, "storeIn", 5)).await.unwrap();

        // Simulate drift with a counters-only commit.
        let current = store.get_product(p.id).await.unwrap().unwrap();
        store
            .commit_movement(MovementWrite {
                product_id: p.id,
                expected_version: ExpectedVersion::Exact(current.version),
                counters: Counters { store: 1, market: 0 },
                at: Utc::now(),
                ledger: LedgerWrite::Nothing,
            })
            .await
            .unwrap();
        assert!(!engine.audit_product(p.id).await.unwrap().is_consistent());

        let repaired = engine.repair_product(p.id).await.unwrap();
        assert_eq!(repaired.counters, Counters { store: 10, market: 0 });
        assert!(engine.audit_product(p.id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn available_quantity_nets_returns() {
        let (store, engine) = engine();
        let p = seed(&store, "Juice", 0, 20).await;
        engine.record_movement(record(p.id, "marketOut", 7)).await.unwrap();
        engine.record_movement(record(p.id, "marketReturn", 2)).await.unwrap();
        engine.record_movement(record(p.id, "storeIn", 9)).await.unwrap();

        let sales = engine
            .available_quantity(p.id, MovementClass::SalesReturn, DateRange::default())
            .await
            .unwrap();
        assert_eq!(sales, 5);

        let purchases = engine
            .available_quantity(p.id, MovementClass::PurchaseReturn, DateRange::default())
            .await
            .unwrap();
        assert_eq!(purchases, 9);

        let err = engine
            .available_quantity(ProductId::new(), MovementClass::SalesReturn, DateRange::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_withdrawals_never_oversell() {
        let (store, engine) = engine();
        let p = seed(&store, "Candles", 5, 0).await;
        let product_id = p.id;

        let mut handles = Vec::new();
        for _ in 0..20 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.record_movement(record(product_id, "storeOut", 1)).await
            }));
        }

        let mut successes = 0i64;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => successes += 1,
                Err(e) => assert!(
                    matches!(e.kind, ErrorKind::InsufficientStock | ErrorKind::Conflict),
                    "unexpected error: {e}"
                ),
            }
        }

        assert!(successes <= 5);
        let after = counters(&store, p.id).await;
        assert_eq!(after.store, 5 - successes);
        assert!(engine.audit_product(p.id).await.unwrap().is_consistent());
    }

    /// Lets one competing storeOut land between the engine's read and its
    /// first commit, so that commit fails its version check.
    struct RacingStore {
        inner: InMemoryStore,
        raced: AtomicBool,
        engine_commits: AtomicU32,
    }

    impl RacingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryStore::new(),
                raced: AtomicBool::new(false),
                engine_commits: AtomicU32::new(0),
            }
        }

        async fn compete(&self, product_id: ProductId) -> StoreResult<()> {
            let Some(current) = self.inner.get_product(product_id).await? else {
                return Ok(());
            };
            let quantity = Quantity::new(1).unwrap();
            let counters = Counters {
                store: current.counters.store - 1,
                market: current.counters.market,
            };
            let now = Utc::now();
            let row = Transaction::record(
                product_id,
                TransactionType::StoreOut,
                quantity,
                UserId::new(),
                Some("competitor".into()),
                now,
            );
            self.inner
                .commit_movement(MovementWrite {
                    product_id,
                    expected_version: ExpectedVersion::Exact(current.version),
                    counters,
                    at: now,
                    ledger: LedgerWrite::Append(row),
                })
                .await?;
            Ok(())
        }
    }

    #[async_trait::async_trait]
    impl InventoryStore for RacingStore {
        async fn insert_product(&self, product: &Product) -> StoreResult<Product> {
            self.inner.insert_product(product).await
        }

        async fn get_product(&self, id: ProductId) -> StoreResult<Option<Product>> {
            self.inner.get_product(id).await
        }

        async fn find_product_by_name(&self, name: &str) -> StoreResult<Option<Product>> {
            self.inner.find_product_by_name(name).await
        }

        async fn list_products(&self, filter: &ProductFilter) -> StoreResult<Vec<Product>> {
            self.inner.list_products(filter).await
        }

        async fn update_product(
            &self,
            product: &Product,
            expected_version: ExpectedVersion,
        ) -> StoreResult<Product> {
            self.inner.update_product(product, expected_version).await
        }

        async fn delete_product(&self, id: ProductId) -> StoreResult<()> {
            self.inner.delete_product(id).await
        }

        async fn get_transaction(&self, id: TransactionId) -> StoreResult<Option<Transaction>> {
            self.inner.get_transaction(id).await
        }

        async fn product_ledger(&self, product_id: ProductId) -> StoreResult<Vec<Transaction>> {
            self.inner.product_ledger(product_id).await
        }

        async fn has_transactions(&self, product_id: ProductId) -> StoreResult<bool> {
            self.inner.has_transactions(product_id).await
        }

        async fn query_transactions(
            &self,
            filter: &TransactionFilter,
            pagination: Pagination,
        ) -> StoreResult<Page<Transaction>> {
            self.inner.query_transactions(filter, pagination).await
        }

        async fn commit_movement(&self, write: MovementWrite) -> StoreResult<CommittedMovement> {
            self.engine_commits.fetch_add(1, Ordering::SeqCst);
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.compete(write.product_id).await?;
            }
            self.inner.commit_movement(write).await
        }
    }

    fn racing_engine() -> (Arc<RacingStore>, StockMovementEngine<RacingStore>) {
        let store = Arc::new(RacingStore::new());
        let engine = StockMovementEngine::new(Arc::clone(&store), EngineConfig::default());
        (store, engine)
    }

    #[tokio::test]
    async fn stale_commit_rechecks_fresh_counters() {
        let (store, engine) = racing_engine();
        let p = seed(&store.inner, "Wicks", 1, 0).await;

        // The competitor takes the last unit; the retry must see store=0.
        let err = engine
            .record_movement(record(p.id, "storeOut", 1))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientStock);
        assert_eq!(store.engine_commits.load(Ordering::SeqCst), 1);

        let after = counters(&store.inner, p.id).await;
        assert_eq!(after, Counters { store: 0, market: 0 });
        let ledger = store.inner.product_ledger(p.id).await.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger[0].description.as_deref(), Some("competitor"));
    }

    #[tokio::test]
    async fn stale_commit_is_retried() {
        let (store, engine) = racing_engine();
        let p = seed(&store.inner, "Tapers", 5, 0).await;

        let out = engine
            .record_movement(record(p.id, "storeOut", 2))
            .await
            .unwrap();
        assert_eq!(out.product.counters, Counters { store: 2, market: 0 });
        assert_eq!(store.engine_commits.load(Ordering::SeqCst), 2);
        assert_eq!(store.inner.product_ledger(p.id).await.unwrap().len(), 2);
        assert!(engine.audit_product(p.id).await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn list_is_filtered_and_repeatable() {
        let (store, engine) = engine();
        let p = seed(&store, "Coffee", 10, 10).await;
        engine.record_movement(record(p.id, "storeOut", 1)).await.unwrap();
        engine.record_movement(record(p.id, "marketOut", 2)).await.unwrap();
        engine.record_movement(record(p.id, "marketOut", 3)).await.unwrap();

        let filter = TransactionFilter {
            product_id: Some(p.id),
            types: vec![TransactionType::MarketOut],
            ..Default::default()
        };
        let first = engine.list_movements(&filter, Pagination::default()).await.unwrap();
        let second = engine.list_movements(&filter, Pagination::default()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.total, 2);
        assert_eq!(first.items[0].quantity.get(), 3);
    }
}
