//! Bounded optimistic-concurrency retry.
//!
//! Services read, decide, then commit with `ExpectedVersion::Exact`. When the
//! store reports a version conflict the whole read-decide-commit cycle is
//! run again, up to a configured number of retries.

use std::future::Future;

use stockroom_core::DomainError;

use crate::error::{EngineError, EngineResult};
use crate::store::StoreError;

/// Outcome of one failed attempt.
#[derive(Debug)]
pub(crate) enum AttemptError {
    /// The product moved underneath us; the attempt may be repeated.
    Stale(String),
    /// Final failure.
    Failed(EngineError),
}

impl From<StoreError> for AttemptError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => AttemptError::Stale(msg),
            other => AttemptError::Failed(other.into()),
        }
    }
}

impl From<DomainError> for AttemptError {
    fn from(value: DomainError) -> Self {
        AttemptError::Failed(value.into())
    }
}

impl From<EngineError> for AttemptError {
    fn from(value: EngineError) -> Self {
        AttemptError::Failed(value)
    }
}

/// Run `attempt` until it succeeds, fails for good, or `max_retries` stale
/// attempts have been repeated.
pub(crate) async fn with_conflict_retry<T, F, Fut>(
    operation: &'static str,
    max_retries: u32,
    mut attempt: F,
) -> EngineResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut retries = 0u32;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Failed(err)) => return Err(err),
            Err(AttemptError::Stale(reason)) if retries < max_retries => {
                retries += 1;
                tracing::debug!(operation, retries, %reason, "version conflict, retrying");
                tokio::task::yield_now().await;
            }
            Err(AttemptError::Stale(reason)) => {
                tracing::warn!(operation, retries, %reason, "giving up after repeated version conflicts");
                return Err(EngineError::conflict(format!(
                    "concurrent modification, please retry: {reason}"
                )));
            }
        }
    }
}
