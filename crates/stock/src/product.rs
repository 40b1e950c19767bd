use chrono::{DateTime, Utc};

use stockroom_core::{CategoryId, DomainError, DomainResult, ProductId, UnitId, UserId};

use crate::catalog::{normalize_description, normalize_name};
use crate::movement::Counters;

/// Optional pricing metadata. Prices are in the smallest currency unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pricing {
    pub price: Option<i64>,
    pub wholesale_price: Option<i64>,
    /// Pieces per wholesale pack.
    pub pieces_no: Option<i32>,
}

impl Pricing {
    pub fn validate(&self) -> DomainResult<()> {
        if self.price.is_some_and(|p| p < 0) {
            return Err(DomainError::invalid_argument("price cannot be negative"));
        }
        if self.wholesale_price.is_some_and(|p| p < 0) {
            return Err(DomainError::invalid_argument(
                "wholesalePrice cannot be negative",
            ));
        }
        if self.pieces_no.is_some_and(|n| n < 1) {
            return Err(DomainError::invalid_argument("piecesNo must be at least 1"));
        }
        Ok(())
    }
}

/// Product record.
///
/// `counters` is a cached projection: it always equals `opening` with every
/// ledger row for this product replayed on top, in sequence order.
/// `quantityInStock` is not stored; it is `counters.stock()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    pub category_id: CategoryId,
    pub unit_id: UnitId,
    pub counters: Counters,
    pub opening: Counters,
    pub pricing: Pricing,
    pub created_by: UserId,
    pub last_updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every persisted change.
    pub version: u64,
}

/// Input for product creation.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub description: Option<String>,
    pub category_id: CategoryId,
    pub unit_id: UnitId,
    pub quantity_in_store: i64,
    pub quantity_in_market: i64,
    /// Optional; when present it must equal store + market.
    pub quantity_in_stock: Option<i64>,
    pub pricing: Pricing,
    pub created_by: UserId,
}

/// Partial product update. `None` leaves a field unchanged.
#[derive(Debug, Clone)]
pub struct ProductPatch {
    pub name: Option<String>,
    /// `Some("")` clears the description.
    pub description: Option<String>,
    pub category_id: Option<CategoryId>,
    pub unit_id: Option<UnitId>,
    pub quantity_in_store: Option<i64>,
    pub quantity_in_market: Option<i64>,
    pub quantity_in_stock: Option<i64>,
    pub price: Option<i64>,
    pub wholesale_price: Option<i64>,
    pub pieces_no: Option<i32>,
    pub updated_by: UserId,
}

impl ProductPatch {
    pub fn touches_quantities(&self) -> bool {
        self.quantity_in_store.is_some()
            || self.quantity_in_market.is_some()
            || self.quantity_in_stock.is_some()
    }
}

impl Product {
    pub fn create(new: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = normalize_name("product", &new.name)?;
        let counters = Counters::new(new.quantity_in_store, new.quantity_in_market)?;
        ensure_stock_matches(counters, new.quantity_in_stock)?;
        new.pricing.validate()?;

        Ok(Self {
            id: ProductId::new(),
            name,
            description: normalize_description(new.description),
            category_id: new.category_id,
            unit_id: new.unit_id,
            counters,
            opening: counters,
            pricing: new.pricing,
            created_by: new.created_by,
            last_updated_by: new.created_by,
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    pub fn quantity_in_stock(&self) -> i64 {
        self.counters.stock()
    }

    /// Apply a partial update.
    ///
    /// Quantities may only be edited directly while no transaction references
    /// the product; such an edit re-seeds the opening balance. Once the ledger
    /// has rows the engine is the only writer of the counters.
    pub fn apply_patch(
        &self,
        patch: ProductPatch,
        has_transactions: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let mut next = self.clone();

        if let Some(name) = &patch.name {
            next.name = normalize_name("product", name)?;
        }
        if let Some(description) = patch.description.clone() {
            next.description = normalize_description(Some(description));
        }
        if let Some(category_id) = patch.category_id {
            next.category_id = category_id;
        }
        if let Some(unit_id) = patch.unit_id {
            next.unit_id = unit_id;
        }

        if patch.touches_quantities() {
            if has_transactions {
                return Err(DomainError::conflict(
                    "quantities of a product with recorded transactions can only change through stock movements",
                ));
            }
            let counters = Counters::new(
                patch.quantity_in_store.unwrap_or(self.counters.store),
                patch.quantity_in_market.unwrap_or(self.counters.market),
            )?;
            ensure_stock_matches(counters, patch.quantity_in_stock)?;
            next.counters = counters;
            next.opening = counters;
        }

        if patch.price.is_some() {
            next.pricing.price = patch.price;
        }
        if patch.wholesale_price.is_some() {
            next.pricing.wholesale_price = patch.wholesale_price;
        }
        if patch.pieces_no.is_some() {
            next.pricing.pieces_no = patch.pieces_no;
        }
        next.pricing.validate()?;

        next.last_updated_by = patch.updated_by;
        next.updated_at = now;
        Ok(next)
    }
}

fn ensure_stock_matches(counters: Counters, stock: Option<i64>) -> DomainResult<()> {
    match stock {
        Some(s) if s != counters.stock() => Err(DomainError::invalid_argument(format!(
            "quantityInStock ({s}) must equal quantityInStore + quantityInMarket ({})",
            counters.stock()
        ))),
        _ => Ok(()),
    }
}
