//! Infrastructure layer: storage backends and the services built on them.
//!
//! - [`store`]: persistence traits with in-memory and Postgres backends
//! - [`engine`]: the stock movement engine
//! - [`catalog`]: product, category and unit management

pub mod catalog;
pub mod engine;
pub mod error;
mod retry;
pub mod store;

pub use catalog::CatalogService;
pub use engine::{
    DeleteMovement, EngineConfig, MovementOutcome, RecordMovement, StockMovementEngine,
    UpdateMovement,
};
pub use error::{EngineError, EngineResult, ErrorKind};
