//! `stockroom-core`: foundation building blocks shared by every crate.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod version;

pub use error::{DomainError, DomainResult};
pub use id::{CategoryId, ProductId, TransactionId, UnitId, UserId};
pub use version::ExpectedVersion;
