//! ChainDocs integrity verifier
//!
//! Re-fetches stored document bytes, re-hashes them and compares against
//! the fingerprints the registry recorded. Mismatches and missing objects
//! raise alerts (SQLite-backed, with an acknowledge/resolve lifecycle) and
//! tamper findings land in the audit ledger.
//!
//! # Key Types
//! - `IntegrityVerifier`: the bounded-concurrency check runner
//! - `AlertStore`: persistent alerts with their status lifecycle
//! - `RunSummary` / `Finding`: the outcome of one check run

pub mod records;
pub mod store;
pub mod verifier;

pub use records::{
    truncated, Alert, AlertStatus, AlertType, Finding, FindingStatus, RunSummary, Severity,
};
pub use store::{AlertStore, StoreError};
pub use verifier::{IntegrityVerifier, VerifierConfig};
