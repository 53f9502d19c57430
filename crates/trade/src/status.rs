//! Trade lifecycle statuses and the allowed-transitions table
//!
//! The table is static data, not scattered conditionals: legality is one
//! slice lookup, and the role required for an edge is keyed by the target
//! status, exactly as callers reason about it ("who may confirm?").

use chaindocs_gate::TransitionRequirement;
use chaindocs_ledger::LedgerAction;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

/// The fixed trade lifecycle.
///
/// `Initiated` is the sole initial state. `Completed` and `Cancelled` are
/// terminal; `Cancelled` has no outgoing edges.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeStatus {
    Initiated,
    SellerConfirmed,
    DocumentsUploaded,
    BankReviewing,
    BankApproved,
    PaymentReleased,
    Completed,
    Disputed,
    Cancelled,
}

impl TradeStatus {
    /// Legal successor statuses for this status.
    pub fn successors(&self) -> &'static [TradeStatus] {
        use TradeStatus::*;
        match self {
            Initiated => &[SellerConfirmed, Cancelled],
            SellerConfirmed => &[DocumentsUploaded, Cancelled],
            DocumentsUploaded => &[BankReviewing, Cancelled],
            BankReviewing => &[BankApproved, Cancelled, Disputed],
            BankApproved => &[PaymentReleased, Cancelled],
            PaymentReleased => &[Completed],
            Disputed => &[Cancelled, Completed],
            Completed => &[],
            Cancelled => &[],
        }
    }

    /// Whether `target` is a legal successor of this status.
    pub fn allows(&self, target: TradeStatus) -> bool {
        self.successors().contains(&target)
    }

    /// Who may drive a trade INTO this status.
    ///
    /// Only meaningful for statuses that appear in some successor list;
    /// `Initiated` is never a target, the legality check fires first.
    pub fn requirement(&self) -> TransitionRequirement {
        use TradeStatus::*;
        match self {
            SellerConfirmed | DocumentsUploaded => TransitionRequirement::Seller,
            BankReviewing | BankApproved | PaymentReleased | Disputed => {
                TransitionRequirement::Bank
            }
            Completed => TransitionRequirement::BuyerOrSeller,
            Cancelled => TransitionRequirement::Participant,
            Initiated => TransitionRequirement::Participant,
        }
    }

    /// No outgoing edges.
    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    /// Inverse of `ledger_action`, for replaying status history from the
    /// ledger. `None` for document tokens.
    pub fn from_ledger_action(action: LedgerAction) -> Option<TradeStatus> {
        let status = match action {
            LedgerAction::Initiated => TradeStatus::Initiated,
            LedgerAction::SellerConfirmed => TradeStatus::SellerConfirmed,
            LedgerAction::DocumentsUploaded => TradeStatus::DocumentsUploaded,
            LedgerAction::BankReviewing => TradeStatus::BankReviewing,
            LedgerAction::BankApproved => TradeStatus::BankApproved,
            LedgerAction::PaymentReleased => TradeStatus::PaymentReleased,
            LedgerAction::Completed => TradeStatus::Completed,
            LedgerAction::Disputed => TradeStatus::Disputed,
            LedgerAction::Cancelled => TradeStatus::Cancelled,
            _ => return None,
        };
        Some(status)
    }

    /// The ledger token recorded when a trade enters this status.
    pub fn ledger_action(&self) -> LedgerAction {
        match self {
            TradeStatus::Initiated => LedgerAction::Initiated,
            TradeStatus::SellerConfirmed => LedgerAction::SellerConfirmed,
            TradeStatus::DocumentsUploaded => LedgerAction::DocumentsUploaded,
            TradeStatus::BankReviewing => LedgerAction::BankReviewing,
            TradeStatus::BankApproved => LedgerAction::BankApproved,
            TradeStatus::PaymentReleased => LedgerAction::PaymentReleased,
            TradeStatus::Completed => LedgerAction::Completed,
            TradeStatus::Disputed => LedgerAction::Disputed,
            TradeStatus::Cancelled => LedgerAction::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_token_roundtrip() {
        use std::str::FromStr;
        for status in TradeStatus::iter() {
            let token = status.to_string();
            assert_eq!(TradeStatus::from_str(&token).unwrap(), status);
        }
        assert_eq!(TradeStatus::SellerConfirmed.to_string(), "SELLER_CONFIRMED");
    }

    #[test]
    fn test_terminal_states() {
        assert!(TradeStatus::Completed.is_terminal());
        assert!(TradeStatus::Cancelled.is_terminal());
        for status in TradeStatus::iter() {
            if !matches!(status, TradeStatus::Completed | TradeStatus::Cancelled) {
                assert!(!status.is_terminal(), "{status} should not be terminal");
            }
        }
    }

    #[test]
    fn test_no_self_loops() {
        for status in TradeStatus::iter() {
            assert!(!status.allows(status), "{status} must not allow itself");
        }
    }

    #[test]
    fn test_initiated_never_a_target() {
        for status in TradeStatus::iter() {
            assert!(!status.allows(TradeStatus::Initiated));
        }
    }

    #[test]
    fn test_table_matches_lifecycle() {
        use TradeStatus::*;
        assert!(Initiated.allows(SellerConfirmed));
        assert!(Initiated.allows(Cancelled));
        assert!(!Initiated.allows(BankApproved));

        assert!(BankReviewing.allows(Disputed));
        assert!(PaymentReleased.allows(Completed));
        assert!(!PaymentReleased.allows(Cancelled));

        assert!(Disputed.allows(Completed));
        assert!(Disputed.allows(Cancelled));
    }

    #[test]
    fn test_every_reachable_status_has_a_requirement() {
        use chaindocs_gate::TransitionRequirement;
        assert_eq!(
            TradeStatus::SellerConfirmed.requirement(),
            TransitionRequirement::Seller
        );
        assert_eq!(TradeStatus::BankApproved.requirement(), TransitionRequirement::Bank);
        assert_eq!(
            TradeStatus::Completed.requirement(),
            TransitionRequirement::BuyerOrSeller
        );
        assert_eq!(
            TradeStatus::Cancelled.requirement(),
            TransitionRequirement::Participant
        );
    }

    #[test]
    fn test_status_tokens_map_to_ledger_actions() {
        for status in TradeStatus::iter() {
            assert!(status.ledger_action().is_trade_status_token());
            assert_eq!(status.ledger_action().to_string(), status.to_string());
        }
    }

    #[test]
    fn test_ledger_action_roundtrip() {
        for status in TradeStatus::iter() {
            assert_eq!(TradeStatus::from_ledger_action(status.ledger_action()), Some(status));
        }
        assert_eq!(TradeStatus::from_ledger_action(LedgerAction::Issued), None);
        assert_eq!(TradeStatus::from_ledger_action(LedgerAction::Viewed), None);
    }
}
