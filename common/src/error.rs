//! Error types for credit ledger operations.

use crate::{AccountId, EntryId};
use thiserror::Error;

/// Main error type for ledger operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// No or invalid caller identity.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Caller lacks the role, or the resource belongs to another agency.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed or missing input.
    #[error("Invalid input: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Business rule rejected the operation.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Account not found.
    #[error("Credit account not found: {0}")]
    AccountNotFound(AccountId),

    /// Entry not found.
    #[error("Credit entry not found: {0}")]
    EntryNotFound(EntryId),

    /// Transient storage conflict (serialization failure, deadlock). Safe to retry.
    #[error("Storage conflict: {0}")]
    StorageConflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error classes callers map to transport status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Authentication,
    Authorization,
    Validation,
    Conflict,
    NotFound,
    Transient,
    Internal,
}

impl LedgerError {
    /// Validation failure on a specific field.
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        LedgerError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        LedgerError::Conflict(message.into())
    }

    /// Get the error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Unauthenticated(_) => ErrorKind::Authentication,
            LedgerError::Forbidden(_) => ErrorKind::Authorization,
            LedgerError::Validation { .. } => ErrorKind::Validation,
            LedgerError::Conflict(_) => ErrorKind::Conflict,
            LedgerError::AccountNotFound(_) | LedgerError::EntryNotFound(_) => ErrorKind::NotFound,
            LedgerError::StorageConflict(_) => ErrorKind::Transient,
            LedgerError::Database(_) | LedgerError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::StorageConflict(_))
    }

    /// Field that caused the failure, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            LedgerError::Validation { field, .. } => field.as_deref(),
            _ => None,
        }
    }

    /// Get a stable error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::Unauthenticated(_) => "UNAUTHENTICATED",
            LedgerError::Forbidden(_) => "FORBIDDEN",
            LedgerError::Validation { .. } => "VALIDATION_FAILED",
            LedgerError::Conflict(_) => "CONFLICT",
            LedgerError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            LedgerError::EntryNotFound(_) => "ENTRY_NOT_FOUND",
            LedgerError::StorageConflict(_) => "STORAGE_CONFLICT",
            LedgerError::Database(_) => "DATABASE_ERROR",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_codes() {
        let err = LedgerError::validation("amount must be positive", "amount");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.field(), Some("amount"));
        assert_eq!(err.error_code(), "VALIDATION_FAILED");

        let err = LedgerError::AccountNotFound(AccountId::new());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.field(), None);
    }

    #[test]
    fn test_only_storage_conflicts_retry() {
        assert!(LedgerError::StorageConflict("40001".into()).is_retryable());
        assert!(!LedgerError::conflict("linked entry").is_retryable());
        assert!(!LedgerError::Database("connection reset".into()).is_retryable());
    }
}
