//! Shared error taxonomy
//!
//! Every synchronous operation in the workspace surfaces one of these
//! kinds, with enough context (entity id, current vs. requested state) for
//! the caller to decide whether to retry, correct input, or escalate.
//! Integrity mismatches are NOT here: a failed hash comparison is a
//! recorded finding, never an error.

use thiserror::Error;

/// Result alias used across the workspace
pub type DomainResult<T> = Result<T, DomainError>;

/// The workspace-wide error taxonomy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Role or ownership check failed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Uniqueness or already-verified constraint violated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The requested edge is not in the allowed-transitions table
    #[error("Invalid transition {from} -> {to} for trade {trade_id}")]
    InvalidTransition {
        trade_id: String,
        from: String,
        to: String,
    },

    /// Malformed input (non-positive amount, bad currency code, ...)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The external storage collaborator failed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl DomainError {
    /// Build a NotFound for the given entity kind and id
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        DomainError::Forbidden(reason.into())
    }

    pub fn conflict(reason: impl Into<String>) -> Self {
        DomainError::Conflict(reason.into())
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        DomainError::InvalidArgument(reason.into())
    }
}
