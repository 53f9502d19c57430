//! ChainDocs risk scoring
//!
//! Derives a 0-100 risk score per trade from its lifecycle position, its
//! document coverage, its audit activity and its notional value. Purely a
//! read-only consumer of the other components; nothing here mutates state.

pub mod engine;
pub mod score;

pub use engine::RiskEngine;
pub use score::{score_trade, RiskAssessment, RiskLevel};
