//! Stock domain module.
//!
//! Business rules for store/market stock movements, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage). Product counters
//! are a projection of `opening balance + ledger`; everything that changes
//! them goes through [`apply_delta`].

pub mod catalog;
pub mod ledger;
pub mod movement;
pub mod product;
pub mod transaction;

pub use catalog::{Category, Unit};
pub use ledger::{
    AuditReport, DateRange, LedgerEdit, MovementClass, ReplayFailure, available_to_return, audit,
    replay, revalidate,
};
pub use movement::{Counters, Direction, Quantity, TransactionType, apply_delta};
pub use product::{NewProduct, Pricing, Product, ProductPatch};
pub use transaction::Transaction;
