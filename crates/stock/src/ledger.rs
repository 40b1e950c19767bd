//! Ledger replay and the checks built on it.
//!
//! A product's counters are `opening` with every ledger row replayed in
//! sequence order. Editing or removing a row in the middle of the ledger can
//! invalidate a later withdrawal, so edits are validated by replaying the
//! whole ledger with the edit substituted.

use core::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_core::{DomainError, DomainResult, ProductId, TransactionId};

use crate::movement::{
    Counters, Direction, INSUFFICIENT_STOCK, Quantity, TransactionType, apply_delta,
};
use crate::product::Product;
use crate::transaction::Transaction;

/// The first ledger row that could not be replayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFailure {
    pub index: usize,
    pub transaction_id: TransactionId,
    pub kind: TransactionType,
    pub quantity: Quantity,
    pub counters_before: Counters,
    pub error: DomainError,
}

/// Replay ledger rows on top of an opening balance.
pub fn replay<'a, I>(opening: Counters, ledger: I) -> Result<Counters, ReplayFailure>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut counters = opening;
    for (index, tx) in ledger.into_iter().enumerate() {
        counters = apply_delta(counters, tx.kind, tx.quantity, Direction::Apply).map_err(
            |error| ReplayFailure {
                index,
                transaction_id: tx.id,
                kind: tx.kind,
                quantity: tx.quantity,
                counters_before: counters,
                error,
            },
        )?;
    }
    Ok(counters)
}

/// A change to an existing ledger row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEdit {
    Amend {
        id: TransactionId,
        quantity: Quantity,
    },
    Remove {
        id: TransactionId,
    },
}

impl LedgerEdit {
    pub fn target(&self) -> TransactionId {
        match self {
            LedgerEdit::Amend { id, .. } | LedgerEdit::Remove { id } => *id,
        }
    }
}

/// Replay `ledger` with `edit` substituted and return the resulting counters.
///
/// Fails with `InsufficientStock` if any row, including rows recorded after
/// the edited one, would oversell a bucket.
pub fn revalidate(
    opening: Counters,
    ledger: &[Transaction],
    edit: LedgerEdit,
) -> DomainResult<Counters> {
    let target = edit.target();
    if !ledger.iter().any(|tx| tx.id == target) {
        return Err(DomainError::not_found("transaction"));
    }

    let mut counters = opening;
    for tx in ledger {
        let quantity = match edit {
            LedgerEdit::Amend { id, quantity } if id == tx.id => quantity,
            LedgerEdit::Remove { id } if id == tx.id => continue,
            _ => tx.quantity,
        };

        counters = apply_delta(counters, tx.kind, quantity, Direction::Apply).map_err(|e| {
            match e {
                DomainError::InsufficientStock(_) if tx.id != target => {
                    DomainError::insufficient_stock(format!(
                        "{INSUFFICIENT_STOCK}: later transaction {} ({} {}) would no longer be covered",
                        tx.id,
                        tx.kind,
                        tx.quantity.get()
                    ))
                }
                other => other,
            }
        })?;
    }
    Ok(counters)
}

/// Inclusive `createdAt` window. Open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> DomainResult<Self> {
        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(DomainError::invalid_argument(
                    "startDate must not be after endDate",
                ));
            }
        }
        Ok(Self { start, end })
    }

    /// The whole UTC calendar day.
    pub fn day(date: NaiveDate) -> Self {
        let start = date.and_time(NaiveTime::MIN).and_utc();
        let end = start + Duration::days(1) - Duration::nanoseconds(1);
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
    }
}

/// Pairing of an outgoing movement with the movement that returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MovementClass {
    /// Sales (`marketOut`) against customer returns (`marketReturn`).
    SalesReturn,
    /// Purchases (`storeIn`) against supplier returns (`storeOut`).
    PurchaseReturn,
}

impl MovementClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementClass::SalesReturn => "salesReturn",
            MovementClass::PurchaseReturn => "purchaseReturn",
        }
    }

    pub fn out_type(&self) -> TransactionType {
        match self {
            MovementClass::SalesReturn => TransactionType::MarketOut,
            MovementClass::PurchaseReturn => TransactionType::StoreIn,
        }
    }

    pub fn return_type(&self) -> TransactionType {
        match self {
            MovementClass::SalesReturn => TransactionType::MarketReturn,
            MovementClass::PurchaseReturn => TransactionType::StoreOut,
        }
    }
}

impl FromStr for MovementClass {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "salesReturn" => Ok(MovementClass::SalesReturn),
            "purchaseReturn" => Ok(MovementClass::PurchaseReturn),
            other => Err(DomainError::invalid_argument(format!(
                "Invalid movement class: {other}"
            ))),
        }
    }
}

/// How much of `class`'s outgoing movements in `range` can still be returned.
///
/// Clamped at zero when returns exceed the outgoing total.
pub fn available_to_return(ledger: &[Transaction], class: MovementClass, range: DateRange) -> i64 {
    let (out, back) = ledger
        .iter()
        .filter(|tx| range.contains(tx.created_at))
        .fold((0i64, 0i64), |(out, back), tx| {
            if tx.kind == class.out_type() {
                (out.saturating_add(tx.quantity.get()), back)
            } else if tx.kind == class.return_type() {
                (out, back.saturating_add(tx.quantity.get()))
            } else {
                (out, back)
            }
        });
    (out - back).max(0)
}

/// Result of checking a product's cached counters against its ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditReport {
    pub product_id: ProductId,
    pub persisted: Counters,
    pub replayed: Option<Counters>,
    pub failure: Option<ReplayFailure>,
    pub transaction_count: usize,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.replayed == Some(self.persisted)
    }
}

/// Replay `ledger` (the product's rows in sequence order) and compare.
pub fn audit(product: &Product, ledger: &[Transaction]) -> AuditReport {
    let (replayed, failure) = match replay(product.opening, ledger) {
        Ok(c) => (Some(c), None),
        Err(f) => (None, Some(f)),
    };
    AuditReport {
        product_id: product.id,
        persisted: product.counters,
        replayed,
        failure,
        transaction_count: ledger.len(),
    }
}
