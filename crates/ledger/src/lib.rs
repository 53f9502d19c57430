//! ChainDocs Ledger - Append-only audit trail
//!
//! This is the one resource every component writes to. All trade status
//! changes and document actions land here as immutable facts: "actor A
//! performed action K against subject S at time T with payload P."
//!
//! # Key Types
//! - `LedgerEntry`: one immutable fact
//! - `LedgerAction`: closed token set (trade status tokens + document actions)
//! - `LedgerStore`: the append-only store (JSONL file + in-memory index)
//!
//! The store exposes no update and no delete; "never mutate" is structural,
//! not a convention call sites must remember.

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{LedgerAction, LedgerEntry, NewEntry};
pub use error::LedgerError;
pub use store::{ActionStats, LedgerStore};
