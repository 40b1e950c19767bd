//! Movement types and the single delta function every counter change uses.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult};

/// Message surfaced to callers when a movement would oversell a bucket.
pub const INSUFFICIENT_STOCK: &str = "Insufficient stock for this operation";

/// The six recognized stock movements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionType {
    /// Purchase received into the store.
    StoreIn,
    /// Stock leaving the store (supplier return, write-off).
    StoreOut,
    /// Transfer from store to market.
    StoreToMarket,
    /// Transfer from market back to store.
    MarketToStore,
    /// Sale from the market.
    MarketOut,
    /// Customer return into the market.
    MarketReturn,
}

impl TransactionType {
    pub const ALL: [TransactionType; 6] = [
        TransactionType::StoreIn,
        TransactionType::StoreOut,
        TransactionType::StoreToMarket,
        TransactionType::MarketToStore,
        TransactionType::MarketOut,
        TransactionType::MarketReturn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::StoreIn => "storeIn",
            TransactionType::StoreOut => "storeOut",
            TransactionType::StoreToMarket => "storeToMarket",
            TransactionType::MarketToStore => "marketToStore",
            TransactionType::MarketOut => "marketOut",
            TransactionType::MarketReturn => "marketReturn",
        }
    }

    /// Unit deltas `(store, market)` for one piece moved.
    pub fn unit_deltas(&self) -> (i64, i64) {
        match self {
            TransactionType::StoreIn => (1, 0),
            TransactionType::StoreOut => (-1, 0),
            TransactionType::StoreToMarket => (-1, 1),
            TransactionType::MarketToStore => (1, -1),
            TransactionType::MarketOut => (0, -1),
            TransactionType::MarketReturn => (0, 1),
        }
    }
}

impl core::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::invalid_argument(format!("Invalid transaction type: {s}")))
    }
}

/// A strictly positive movement quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Quantity(i64);

impl Quantity {
    pub fn new(value: i64) -> DomainResult<Self> {
        if value <= 0 {
            return Err(DomainError::invalid_argument(
                "Quantity must be greater than zero",
            ));
        }
        Ok(Self(value))
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for Quantity {
    type Error = DomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Quantity::new(value)
    }
}

impl From<Quantity> for i64 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

/// The two live buckets of a product. Stock is always their sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counters {
    pub store: i64,
    pub market: i64,
}

impl Counters {
    pub const ZERO: Counters = Counters { store: 0, market: 0 };

    /// Build counters from caller input, rejecting negative buckets.
    pub fn new(store: i64, market: i64) -> DomainResult<Self> {
        if store < 0 {
            return Err(DomainError::invalid_argument(
                "quantityInStore cannot be negative",
            ));
        }
        if market < 0 {
            return Err(DomainError::invalid_argument(
                "quantityInMarket cannot be negative",
            ));
        }
        Ok(Self { store, market })
    }

    pub fn stock(&self) -> i64 {
        self.store + self.market
    }

    pub fn is_non_negative(&self) -> bool {
        self.store >= 0 && self.market >= 0
    }
}

/// Whether a delta is applied or undone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Reverse,
}

impl Direction {
    fn sign(self) -> i64 {
        match self {
            Direction::Apply => 1,
            Direction::Reverse => -1,
        }
    }
}

/// Apply (or undo) one movement to a pair of counters.
///
/// Both directions refuse to leave a bucket negative. For `Apply` that is
/// exactly the availability precondition of the type (`store >= qty` for
/// `storeOut`/`storeToMarket`, `market >= qty` for `marketOut`/`marketToStore`).
pub fn apply_delta(
    counters: Counters,
    kind: TransactionType,
    quantity: Quantity,
    direction: Direction,
) -> DomainResult<Counters> {
    let (ds, dm) = kind.unit_deltas();
    let step = direction.sign() * quantity.get();

    let store = ds
        .checked_mul(step)
        .and_then(|d| counters.store.checked_add(d))
        .ok_or_else(|| DomainError::invalid_argument("quantity overflow"))?;
    let market = dm
        .checked_mul(step)
        .and_then(|d| counters.market.checked_add(d))
        .ok_or_else(|| DomainError::invalid_argument("quantity overflow"))?;

    let next = Counters { store, market };
    if !next.is_non_negative() {
        return Err(DomainError::insufficient_stock(INSUFFICIENT_STOCK));
    }
    Ok(next)
}
