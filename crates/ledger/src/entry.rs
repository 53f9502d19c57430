//! Ledger entry types

use chaindocs_core::{DocumentId, EntryId, Role, TradeId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumIter, EnumString};

/// The closed set of ledger action tokens.
///
/// Trade status tokens mirror the statuses of the trade lifecycle, so a
/// trade's status history can be replayed straight from its ledger
/// entries. Document actions cover the registry and the integrity
/// verifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerAction {
    // Trade status tokens
    Initiated,
    SellerConfirmed,
    DocumentsUploaded,
    BankReviewing,
    BankApproved,
    PaymentReleased,
    Completed,
    Disputed,
    Cancelled,

    // Document actions
    Issued,
    Updated,
    Verified,
    Viewed,
    IntegrityFailed,
}

impl LedgerAction {
    /// True for the tokens that record a trade status change
    pub fn is_trade_status_token(&self) -> bool {
        matches!(
            self,
            LedgerAction::Initiated
                | LedgerAction::SellerConfirmed
                | LedgerAction::DocumentsUploaded
                | LedgerAction::BankReviewing
                | LedgerAction::BankApproved
                | LedgerAction::PaymentReleased
                | LedgerAction::Completed
                | LedgerAction::Disputed
                | LedgerAction::Cancelled
        )
    }

    /// Advisory entries may use the log-and-continue fallback on append
    /// failure. State-transition and hash-change entries may not.
    pub fn is_advisory(&self) -> bool {
        matches!(self, LedgerAction::Viewed)
    }
}

/// An immutable ledger fact.
///
/// Once written, never updated or deleted. `sequence` is the store-wide
/// commit order and breaks timestamp ties on replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    /// Store-wide commit sequence, strictly increasing
    pub sequence: u64,
    pub document_id: Option<DocumentId>,
    pub trade_id: Option<TradeId>,
    pub action: LedgerAction,
    pub actor_id: UserId,
    pub actor_role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// An entry as submitted for appending; id, sequence and timestamp are
/// assigned by the store at commit time.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub document_id: Option<DocumentId>,
    pub trade_id: Option<TradeId>,
    pub action: LedgerAction,
    pub actor_id: UserId,
    pub actor_role: Role,
    pub metadata: Option<Value>,
}

impl NewEntry {
    /// Entry about a trade
    pub fn for_trade(trade_id: TradeId, action: LedgerAction, actor_id: UserId, role: Role) -> Self {
        Self {
            document_id: None,
            trade_id: Some(trade_id),
            action,
            actor_id,
            actor_role: role,
            metadata: None,
        }
    }

    /// Entry about a document
    pub fn for_document(
        document_id: DocumentId,
        action: LedgerAction,
        actor_id: UserId,
        role: Role,
    ) -> Self {
        Self {
            document_id: Some(document_id),
            trade_id: None,
            action,
            actor_id,
            actor_role: role,
            metadata: None,
        }
    }

    /// Attach structured metadata
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Also reference a trade (for document entries tied to a trade)
    pub fn with_trade(mut self, trade_id: TradeId) -> Self {
        self.trade_id = Some(trade_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_action_tokens_serialize_screaming_snake() {
        let json = serde_json::to_string(&LedgerAction::SellerConfirmed).unwrap();
        assert_eq!(json, "\"SELLER_CONFIRMED\"");
        let json = serde_json::to_string(&LedgerAction::IntegrityFailed).unwrap();
        assert_eq!(json, "\"INTEGRITY_FAILED\"");
    }

    #[test]
    fn test_action_parse_roundtrip() {
        use strum::IntoEnumIterator;
        for action in LedgerAction::iter() {
            let token = action.to_string();
            assert_eq!(LedgerAction::from_str(&token).unwrap(), action);
        }
    }

    #[test]
    fn test_trade_status_tokens() {
        assert!(LedgerAction::Initiated.is_trade_status_token());
        assert!(LedgerAction::Cancelled.is_trade_status_token());
        assert!(!LedgerAction::Issued.is_trade_status_token());
        assert!(!LedgerAction::IntegrityFailed.is_trade_status_token());
    }

    #[test]
    fn test_only_viewed_is_advisory() {
        use strum::IntoEnumIterator;
        for action in LedgerAction::iter() {
            assert_eq!(action.is_advisory(), action == LedgerAction::Viewed);
        }
    }
}
