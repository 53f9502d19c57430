//! The scoring function
//!
//! Weights are tuning, not contract: callers should treat the score as an
//! ordinal signal and rely on `RiskLevel` buckets for decisions.

use chaindocs_core::TradeId;
use chaindocs_trade::{Trade, TradeStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=29 => RiskLevel::Low,
            30..=59 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

/// One computed assessment, cached per trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub trade_id: TradeId,
    pub score: u8,
    pub level: RiskLevel,
    pub reasons: Vec<String>,
    pub computed_at: DateTime<Utc>,
}

/// Score one trade from its row, its audit activity and its document count.
///
/// Returns the clamped score plus one human-readable reason per factor
/// that contributed.
pub fn score_trade(
    trade: &Trade,
    ledger_entry_count: usize,
    document_count: usize,
) -> (u8, Vec<String>) {
    let mut score: u32 = 0;
    let mut reasons = Vec::new();

    if trade.status != TradeStatus::Completed {
        score += 10;
        reasons.push(format!("trade not completed (status {})", trade.status));
    }

    if document_count == 0 {
        score += 30;
        reasons.push("no documents uploaded".to_string());
    } else {
        let shortfall = 10u32.saturating_sub(document_count as u32);
        if shortfall > 0 {
            score += shortfall;
            reasons.push(format!("thin document coverage ({document_count} uploaded)"));
        }
    }

    if ledger_entry_count == 0 {
        score += 20;
        reasons.push("no recorded audit activity".to_string());
    }

    let high_value = Decimal::from(1_000_000_i64);
    let elevated_value = Decimal::from(100_000_i64);

    let amount = trade.amount.value();
    if amount > high_value {
        score += 25;
        reasons.push(format!("high value trade ({} {})", amount, trade.currency));
    } else if amount > elevated_value {
        score += 10;
        reasons.push(format!("elevated value trade ({} {})", amount, trade.currency));
    }

    (score.min(100) as u8, reasons)
}
