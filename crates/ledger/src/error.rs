//! Ledger store errors

use thiserror::Error;

/// Errors from the ledger store
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An entry referenced a trade or document the store has never seen.
    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Entry must reference a trade or a document")]
    MissingSubject,
}
