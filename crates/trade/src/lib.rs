//! ChainDocs trade lifecycle state machine
//!
//! Owns `Trade` entities and the legal-transition table. Every accepted
//! transition writes exactly one ledger entry, atomically with the status
//! change: a caller never observes one without the other.
//!
//! # Key Types
//! - `TradeStatus`: the fixed lifecycle enum and its static transition table
//! - `Trade`: one buyer/seller transaction with its full timeline
//! - `TradeBook`: the engine holding trades under per-row locks

pub mod engine;
pub mod status;
pub mod trade;

pub use engine::TradeBook;
pub use status::TradeStatus;
pub use trade::Trade;
