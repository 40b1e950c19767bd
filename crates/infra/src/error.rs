//! Service-level error model shared by the movement engine and the catalog
//! service.

use thiserror::Error;

use stockroom_core::DomainError;

use crate::store::StoreError;

/// Stable, machine-readable error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    InsufficientStock,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientStock => "insufficient_stock",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Internal => "internal",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by engine and catalog operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn not_found(what: impl core::fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, format!("{what} not found"))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument(msg) | DomainError::InvalidId(msg) => {
                Self::new(ErrorKind::InvalidArgument, msg)
            }
            DomainError::NotFound(what) => Self::not_found(what),
            DomainError::InsufficientStock(msg) => Self::new(ErrorKind::InsufficientStock, msg),
            DomainError::Conflict(msg) => Self::new(ErrorKind::Conflict, msg),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound(what) => Self::not_found(what),
            StoreError::Duplicate(msg) | StoreError::Referenced(msg) | StoreError::Conflict(msg) => {
                Self::new(ErrorKind::Conflict, msg)
            }
            StoreError::Backend(detail) => {
                tracing::error!(error = %detail, "storage backend failure");
                Self::new(ErrorKind::Internal, "internal storage error")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_kinds() {
        let e: EngineError = DomainError::insufficient_stock("no").into();
        assert_eq!(e.kind, ErrorKind::InsufficientStock);
        assert_eq!(e.message, "no");

        let e: EngineError = DomainError::invalid_id("ProductId: bad").into();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);

        let e: EngineError = DomainError::not_found("transaction").into();
        assert_eq!(e.kind, ErrorKind::NotFound);
        assert_eq!(e.message, "transaction not found");
    }

    #[test]
    fn backend_detail_is_hidden() {
        let e: EngineError = StoreError::Backend("password=secret".to_string()).into();
        assert_eq!(e.kind, ErrorKind::Internal);
        assert!(!e.message.contains("secret"));
    }

    #[test]
    fn store_conflicts_collapse_to_conflict() {
        for err in [
            StoreError::Duplicate("name".into()),
            StoreError::Referenced("product".into()),
            StoreError::Conflict("version".into()),
        ] {
            assert!(EngineError::from(err).is_conflict());
        }
    }
}
