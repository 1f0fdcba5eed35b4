//! Error taxonomy shared by every entry point into the relationship state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BondError {
    /// Input rejected before any mutation was attempted.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// The store could not be reached (pool closed, timed out, I/O).
    #[error("relationship store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store was reachable but the transaction did not commit.
    #[error("relationship store transaction failed: {0}")]
    StoreTransactionFailed(String),
}

impl BondError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        BondError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Store failures never leave partial state behind, so the caller may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BondError::StoreUnavailable(_) | BondError::StoreTransactionFailed(_)
        )
    }

    /// Offending field for validation failures.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            BondError::Validation { field, .. } => Some(field),
            _ => None,
        }
    }
}

/// Reject empty or whitespace-only identifiers.
pub fn require_id(field: &'static str, value: &str) -> Result<(), BondError> {
    if value.trim().is_empty() {
        return Err(BondError::validation(field, "must not be empty"));
    }
    Ok(())
}
