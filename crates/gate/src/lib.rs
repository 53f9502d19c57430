//! ChainDocs role gate
//!
//! Pure predicate functions mapping (role, action, entity-ownership) to
//! allow/deny. Every mutating component calls through here before touching
//! state; nothing in this crate reads or writes anything.
//!
//! Each predicate returns `Ok(())` or `DomainError::Forbidden` with a
//! reason the caller can surface verbatim.

use chaindocs_core::{DomainError, DomainResult, Identity, Role, UserId};

/// The parties of a trade, as the gate needs to see them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TradeParties {
    pub buyer: UserId,
    pub seller: UserId,
    pub bank: Option<UserId>,
}

impl TradeParties {
    pub fn participant(&self, user_id: UserId) -> bool {
        self.buyer == user_id || self.seller == user_id || self.bank == Some(user_id)
    }
}

/// Who may execute a given transition edge. The trade crate's transition
/// table maps each target status to one of these; the gate evaluates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionRequirement {
    /// The trade's seller
    Seller,
    /// Any bank-role user
    Bank,
    /// The trade's buyer or seller
    BuyerOrSeller,
    /// Any party of the trade
    Participant,
}

/// Auditors are read-only everywhere; this runs before any other check.
pub fn ensure_can_mutate(identity: &Identity) -> DomainResult<()> {
    if identity.role.is_read_only() {
        return Err(DomainError::forbidden(
            "auditor has read-only access and cannot modify anything",
        ));
    }
    Ok(())
}

/// Only corporate users create trades.
pub fn can_create_trade(identity: &Identity) -> DomainResult<()> {
    ensure_can_mutate(identity)?;
    if identity.role != Role::Corporate {
        return Err(DomainError::forbidden("only corporate users can create trades"));
    }
    Ok(())
}

/// Evaluate a transition edge's requirement against the caller.
pub fn can_transition(
    identity: &Identity,
    parties: &TradeParties,
    requirement: TransitionRequirement,
) -> DomainResult<()> {
    ensure_can_mutate(identity)?;

    let allowed = match requirement {
        TransitionRequirement::Seller => identity.user_id == parties.seller,
        TransitionRequirement::Bank => identity.role == Role::Bank,
        TransitionRequirement::BuyerOrSeller => {
            identity.user_id == parties.buyer || identity.user_id == parties.seller
        }
        TransitionRequirement::Participant => parties.participant(identity.user_id),
    };

    if allowed {
        Ok(())
    } else {
        Err(DomainError::forbidden(match requirement {
            TransitionRequirement::Seller => "only the seller can perform this action",
            TransitionRequirement::Bank => "only a bank can perform this action",
            TransitionRequirement::BuyerOrSeller => {
                "only the buyer or seller can perform this action"
            }
            TransitionRequirement::Participant => "only a party of this trade can perform this action",
        }))
    }
}

/// Only the trade's buyer assigns a bank.
pub fn can_assign_bank(identity: &Identity, parties: &TradeParties) -> DomainResult<()> {
    ensure_can_mutate(identity)?;
    if identity.user_id != parties.buyer {
        return Err(DomainError::forbidden(
            "only the buyer of this trade can assign a bank",
        ));
    }
    Ok(())
}

/// Uploading a document against a trade requires being its buyer or seller.
pub fn can_upload_for_trade(identity: &Identity, parties: &TradeParties) -> DomainResult<()> {
    ensure_can_mutate(identity)?;
    if identity.user_id == parties.buyer || identity.user_id == parties.seller {
        Ok(())
    } else {
        Err(DomainError::forbidden("not a party of this trade"))
    }
}

/// Updating a document's bytes requires ownership or admin.
pub fn can_update_document(identity: &Identity, owner: UserId) -> DomainResult<()> {
    ensure_can_mutate(identity)?;
    if identity.user_id == owner || identity.role == Role::Admin {
        Ok(())
    } else {
        Err(DomainError::forbidden("only the owner or an admin can update a document"))
    }
}

/// Marking a document verified is a bank (or admin) action.
pub fn can_mark_verified(identity: &Identity) -> DomainResult<()> {
    ensure_can_mutate(identity)?;
    if matches!(identity.role, Role::Bank | Role::Admin) {
        Ok(())
    } else {
        Err(DomainError::forbidden("only a bank or admin can verify documents"))
    }
}

/// Integrity runs and alert management are admin-only.
pub fn require_admin(identity: &Identity) -> DomainResult<()> {
    if identity.role == Role::Admin {
        Ok(())
    } else {
        Err(DomainError::forbidden("admin access required"))
    }
}

/// Whether the caller may read a given trade at all.
pub fn can_view_trade(identity: &Identity, parties: &TradeParties) -> DomainResult<()> {
    match identity.role {
        Role::Admin | Role::Auditor => Ok(()),
        _ if parties.participant(identity.user_id) => Ok(()),
        _ => Err(DomainError::forbidden("not authorized for this trade")),
    }
}

/// Ledger read scope for a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerScope {
    /// Admin and auditor see every entry
    All,
    /// Everyone else sees entries they acted in
    Own(UserId),
}

pub fn ledger_scope(identity: &Identity) -> LedgerScope {
    match identity.role {
        Role::Admin | Role::Auditor => LedgerScope::All,
        _ => LedgerScope::Own(identity.user_id),
    }
}
