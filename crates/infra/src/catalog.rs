//! Product, category and unit management.
//!
//! Quantities on a product are only writable here while the product has no
//! ledger rows; after that the movement engine owns them.

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;

use stockroom_core::{CategoryId, ExpectedVersion, ProductId, UnitId};
use stockroom_stock::{Category, NewProduct, Product, ProductPatch, Unit};

use crate::error::{EngineError, EngineResult};
use crate::retry::{AttemptError, with_conflict_retry};
use crate::store::{ProductFilter, Store, StoreError};

const NAME_TAKEN: &str = "Name already taken";

pub struct CatalogService<S: ?Sized> {
    store: Arc<S>,
    max_conflict_retries: u32,
}

impl<S: ?Sized> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            max_conflict_retries: self.max_conflict_retries,
        }
    }
}

impl<S> CatalogService<S>
where
    S: Store + ?Sized,
{
    pub fn new(store: Arc<S>, max_conflict_retries: u32) -> Self {
        Self {
            store,
            max_conflict_retries,
        }
    }

    // ---- products ----

    #[instrument(skip(self, new), fields(name = %new.name), err)]
    pub async fn create_product(&self, new: NewProduct) -> EngineResult<Product> {
        self.ensure_category(new.category_id).await?;
        self.ensure_unit(new.unit_id).await?;

        let product = Product::create(new, Utc::now())?;
        if self.store.find_product_by_name(&product.name).await?.is_some() {
            return Err(EngineError::conflict(NAME_TAKEN));
        }

        let stored = self
            .store
            .insert_product(&product)
            .await
            .map_err(name_conflict)?;
        tracing::info!(product_id = %stored.id, "product created");
        Ok(stored)
    }

    pub async fn get_product(&self, id: ProductId) -> EngineResult<Product> {
        self.store
            .get_product(id)
            .await?
            .ok_or_else(|| EngineError::not_found("product"))
    }

    pub async fn list_products(&self, filter: &ProductFilter) -> EngineResult<Vec<Product>> {
        Ok(self.store.list_products(filter).await?)
    }

    #[instrument(skip(self, patch), fields(product_id = %id), err)]
    pub async fn update_product(&self, id: ProductId, patch: ProductPatch) -> EngineResult<Product> {
        if let Some(category_id) = patch.category_id {
            self.ensure_category(category_id).await?;
        }
        if let Some(unit_id) = patch.unit_id {
            self.ensure_unit(unit_id).await?;
        }

        with_conflict_retry("update_product", self.max_conflict_retries, || {
            self.try_update_product(id, &patch)
        })
        .await
    }

    async fn try_update_product(
        &self,
        id: ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, AttemptError> {
        let current = self
            .store
            .get_product(id)
            .await?
            .ok_or_else(|| EngineError::not_found("product"))?;

        let has_transactions = if patch.touches_quantities() {
            self.store.has_transactions(id).await?
        } else {
            false
        };
        let next = current.apply_patch(patch.clone(), has_transactions, Utc::now())?;

        if next.name != current.name {
            if let Some(other) = self.store.find_product_by_name(&next.name).await? {
                if other.id != id {
                    return Err(EngineError::conflict(NAME_TAKEN).into());
                }
            }
        }

        let stored = self
            .store
            .update_product(&next, ExpectedVersion::Exact(current.version))
            .await
            .map_err(|e| match e {
                StoreError::Conflict(msg) => AttemptError::Stale(msg),
                other => AttemptError::Failed(name_conflict(other)),
            })?;
        Ok(stored)
    }

    #[instrument(skip(self), fields(product_id = %id), err)]
    pub async fn delete_product(&self, id: ProductId) -> EngineResult<()> {
        if self.store.get_product(id).await?.is_none() {
            return Err(EngineError::not_found("product"));
        }
        if self.store.has_transactions(id).await? {
            return Err(EngineError::conflict(
                "product has recorded transactions and cannot be deleted",
            ));
        }
        self.store.delete_product(id).await?;
        tracing::info!(product_id = %id, "product deleted");
        Ok(())
    }

    // ---- categories ----

    pub async fn list_categories(&self) -> EngineResult<Vec<Category>> {
        Ok(self.store.list_categories().await?)
    }

    pub async fn get_category(&self, id: CategoryId) -> EngineResult<Category> {
        self.store
            .get_category(id)
            .await?
            .ok_or_else(|| EngineError::not_found("category"))
    }

    #[instrument(skip(self), err)]
    pub async fn create_category(&self, name: &str) -> EngineResult<Category> {
        let category = Category::new(name, Utc::now())?;
        self.store
            .insert_category(&category)
            .await
            .map_err(name_conflict)?;
        Ok(category)
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    pub async fn rename_category(&self, id: CategoryId, name: &str) -> EngineResult<Category> {
        let renamed = self.get_category(id).await?.renamed(name)?;
        self.store
            .update_category(&renamed)
            .await
            .map_err(name_conflict)?;
        Ok(renamed)
    }

    #[instrument(skip(self), fields(category_id = %id), err)]
    pub async fn delete_category(&self, id: CategoryId) -> EngineResult<()> {
        self.store.delete_category(id).await.map_err(in_use("category"))
    }

    // ---- units ----

    pub async fn list_units(&self) -> EngineResult<Vec<Unit>> {
        Ok(self.store.list_units().await?)
    }

    pub async fn get_unit(&self, id: UnitId) -> EngineResult<Unit> {
        self.store
            .get_unit(id)
            .await?
            .ok_or_else(|| EngineError::not_found("unit"))
    }

    #[instrument(skip(self), err)]
    pub async fn create_unit(&self, name: &str) -> EngineResult<Unit> {
        let unit = Unit::new(name, Utc::now())?;
        self.store.insert_unit(&unit).await.map_err(name_conflict)?;
        Ok(unit)
    }

    #[instrument(skip(self), fields(unit_id = %id), err)]
    pub async fn rename_unit(&self, id: UnitId, name: &str) -> EngineResult<Unit> {
        let renamed = self.get_unit(id).await?.renamed(name)?;
        self.store.update_unit(&renamed).await.map_err(name_conflict)?;
        Ok(renamed)
    }

    #[instrument(skip(self), fields(unit_id = %id), err)]
    pub async fn delete_unit(&self, id: UnitId) -> EngineResult<()> {
        self.store.delete_unit(id).await.map_err(in_use("unit"))
    }

    async fn ensure_category(&self, id: CategoryId) -> EngineResult<()> {
        match self.store.get_category(id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::not_found("category")),
        }
    }

    async fn ensure_unit(&self, id: UnitId) -> EngineResult<()> {
        match self.store.get_unit(id).await? {
            Some(_) => Ok(()),
            None => Err(EngineError::not_found("unit")),
        }
    }
}

fn name_conflict(err: StoreError) -> EngineError {
    match err {
        StoreError::Duplicate(_) => EngineError::conflict(NAME_TAKEN),
        other => other.into(),
    }
}

fn in_use(what: &'static str) -> impl Fn(StoreError) -> EngineError {
    move |err| match err {
        StoreError::Referenced(_) => {
            EngineError::conflict(format!("{what} is used by products and cannot be deleted"))
        }
        other => other.into(),
    }
}
