//! The Trade entity

use chaindocs_core::{Amount, Currency, TradeId, UserId};
use chaindocs_gate::TradeParties;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::status::TradeStatus;

/// One buyer/seller transaction moving through the fixed lifecycle.
///
/// Amount and currency are immutable after creation; the bank ref may be
/// set once and never reassigned. Trades are never deleted; cancelled
/// trades remain as terminal records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    /// Human-readable number, e.g. `TRD-20260829-1A2B3C4D`
    pub trade_number: String,
    pub buyer_id: UserId,
    pub seller_id: UserId,
    pub bank_id: Option<UserId>,
    pub amount: Amount,
    pub currency: Currency,
    pub description: String,
    pub status: TradeStatus,

    // Timeline
    pub initiated_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub documents_uploaded_at: Option<DateTime<Utc>>,
    pub bank_review_started_at: Option<DateTime<Utc>>,
    pub bank_approved_at: Option<DateTime<Utc>>,
    pub payment_released_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trade {
    /// Create a freshly initiated trade.
    pub fn new(
        buyer_id: UserId,
        seller_id: UserId,
        amount: Amount,
        currency: Currency,
        description: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TradeId::generate(),
            trade_number: generate_trade_number(now),
            buyer_id,
            seller_id,
            bank_id: None,
            amount,
            currency,
            description: description.into(),
            status: TradeStatus::Initiated,
            initiated_at: now,
            confirmed_at: None,
            documents_uploaded_at: None,
            bank_review_started_at: None,
            bank_approved_at: None,
            payment_released_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The parties view the gate checks against.
    pub fn parties(&self) -> TradeParties {
        TradeParties {
            buyer: self.buyer_id,
            seller: self.seller_id,
            bank: self.bank_id,
        }
    }

    /// Enter a new status, stamping the matching timeline field.
    pub(crate) fn enter(&mut self, status: TradeStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
        match status {
            TradeStatus::SellerConfirmed => self.confirmed_at = Some(now),
            TradeStatus::DocumentsUploaded => self.documents_uploaded_at = Some(now),
            TradeStatus::BankReviewing => self.bank_review_started_at = Some(now),
            TradeStatus::BankApproved => self.bank_approved_at = Some(now),
            TradeStatus::PaymentReleased => self.payment_released_at = Some(now),
            TradeStatus::Completed => self.completed_at = Some(now),
            TradeStatus::Initiated | TradeStatus::Disputed | TradeStatus::Cancelled => {}
        }
    }
}

/// `TRD-<utc date>-<8 hex chars>`
fn generate_trade_number(now: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_uppercase();
    format!("TRD-{}-{}", now.format("%Y%m%d"), suffix)
}
