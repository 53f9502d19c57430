//! TradeBook - the trade state machine engine
//!
//! Holds every trade behind its own row lock. A transition validates the
//! edge against the static table, checks the gate, mutates the row and
//! appends the ledger entry while still holding the row lock; if the
//! append fails the row is restored before the lock is released, so status
//! and ledger can never disagree.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chaindocs_core::{Amount, Currency, DomainError, DomainResult, Identity, Role, TradeId, UserId};
use chaindocs_gate as gate;
use chaindocs_ledger::{LedgerStore, NewEntry};
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::json;

use crate::status::TradeStatus;
use crate::trade::Trade;

/// The trade state machine engine.
///
/// Also keeps the user directory (id -> role) the surrounding system's
/// identity provider feeds it, so `assign_bank` can resolve bank users and
/// trade creation can validate the counterparty.
pub struct TradeBook {
    ledger: Arc<LedgerStore>,
    users: RwLock<HashMap<UserId, Role>>,
    trades: RwLock<HashMap<TradeId, Arc<Mutex<Trade>>>>,
}

impl TradeBook {
    pub fn new(ledger: Arc<LedgerStore>) -> Self {
        Self {
            ledger,
            users: RwLock::new(HashMap::new()),
            trades: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild a book from the ledger's trade entries.
    ///
    /// `INITIATED` entries carry the full trade shape in their metadata;
    /// later status tokens replay the timeline in sequence order. A trade
    /// entry that cannot be decoded fails the whole rebuild rather than
    /// silently dropping history.
    pub fn replay(ledger: Arc<LedgerStore>) -> DomainResult<Self> {
        let book = Self::new(Arc::clone(&ledger));
        {
            let mut trades = book.trades.write().unwrap();
            for entry in ledger.all_entries() {
                if !entry.action.is_trade_status_token() {
                    continue;
                }
                let trade_id = entry
                    .trade_id
                    .ok_or_else(|| corrupt(entry.sequence, "status entry without trade id"))?;

                if entry.action == chaindocs_ledger::LedgerAction::Initiated {
                    let trade = decode_initiated(trade_id, entry.as_ref())?;
                    trades.insert(trade_id, Arc::new(Mutex::new(trade)));
                    continue;
                }

                let status = TradeStatus::from_ledger_action(entry.action)
                    .ok_or_else(|| corrupt(entry.sequence, "unknown status token"))?;
                let row = trades
                    .get(&trade_id)
                    .ok_or_else(|| corrupt(entry.sequence, "status entry before creation"))?;
                let mut trade = row.lock().unwrap();
                if status == TradeStatus::BankReviewing {
                    if let Some(bank) = entry
                        .metadata
                        .as_ref()
                        .and_then(|m| m.get("assigned_bank"))
                        .and_then(|v| v.as_str())
                    {
                        trade.bank_id = Some(
                            bank.parse()
                                .map_err(|_| corrupt(entry.sequence, "bad bank id"))?,
                        );
                    }
                }
                trade.enter(status, entry.created_at);
            }
        }
        Ok(book)
    }

    /// Record a user known to the identity provider.
    pub fn register_user(&self, user_id: UserId, role: Role) {
        self.users.write().unwrap().insert(user_id, role);
    }

    /// Role of a registered user, if any.
    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        self.users.read().unwrap().get(&user_id).copied()
    }

    /// Create a trade in `INITIATED`, appending its first ledger entry.
    ///
    /// The caller is the buyer. Fails `Forbidden` unless the caller is
    /// corporate, `InvalidArgument` on a non-positive amount or malformed
    /// currency code, `NotFound`/`InvalidArgument` if the seller is not a
    /// registered corporate user.
    pub fn create_trade(
        &self,
        buyer: &Identity,
        seller_id: UserId,
        amount: Decimal,
        currency: &str,
        description: &str,
    ) -> DomainResult<Trade> {
        gate::can_create_trade(buyer)?;

        let amount =
            Amount::new(amount).map_err(|e| DomainError::invalid_argument(e.to_string()))?;
        let currency: Currency = currency
            .parse()
            .map_err(|e: chaindocs_core::CurrencyError| {
                DomainError::invalid_argument(e.to_string())
            })?;

        match self.role_of(seller_id) {
            None => return Err(DomainError::not_found("User", seller_id)),
            Some(Role::Corporate) => {}
            Some(_) => {
                return Err(DomainError::invalid_argument(
                    "seller must be a corporate user",
                ))
            }
        }

        let trade = Trade::new(buyer.user_id, seller_id, amount, currency, description);
        let trade_id = trade.id;

        self.ledger.register_trade(trade_id);
        self.trades
            .write()
            .unwrap()
            .insert(trade_id, Arc::new(Mutex::new(trade.clone())));

        // The creation entry carries the full trade shape so the book can
        // be rebuilt from the ledger alone.
        let entry = NewEntry::for_trade(
            trade_id,
            TradeStatus::Initiated.ledger_action(),
            buyer.user_id,
            buyer.role,
        )
        .with_metadata(json!({
            "trade_number": trade.trade_number,
            "buyer": trade.buyer_id.to_string(),
            "seller": trade.seller_id.to_string(),
            "amount": trade.amount.value().to_string(),
            "currency": trade.currency.to_string(),
            "description": trade.description,
        }));
        if let Err(e) = self.ledger.append(entry) {
            // No trade row without its audit record.
            self.trades.write().unwrap().remove(&trade_id);
            tracing::error!(trade = %trade_id, error = %e, "ledger append failed, trade creation aborted");
            return Err(DomainError::StorageUnavailable(e.to_string()));
        }

        tracing::info!(trade = %trade_id, number = %trade.trade_number, "trade created");
        Ok(trade)
    }

    /// Execute one transition of the lifecycle.
    ///
    /// Edge legality comes from the static table, the actor check from the
    /// gate. Status write, timestamp stamp and ledger append commit as one
    /// unit under the row lock.
    pub fn transition(
        &self,
        trade_id: TradeId,
        target: TradeStatus,
        actor: &Identity,
        notes: Option<&str>,
    ) -> DomainResult<Trade> {
        let row = self.row(trade_id)?;
        let mut trade = row.lock().unwrap();

        if !trade.status.allows(target) {
            return Err(DomainError::InvalidTransition {
                trade_id: trade_id.to_string(),
                from: trade.status.to_string(),
                to: target.to_string(),
            });
        }

        gate::can_transition(actor, &trade.parties(), target.requirement())?;

        let saved = trade.clone();
        trade.enter(target, Utc::now());

        let entry = NewEntry::for_trade(trade_id, target.ledger_action(), actor.user_id, actor.role)
            .with_metadata(json!({ "notes": notes }));

        if let Err(e) = self.ledger.append(entry) {
            *trade = saved;
            tracing::error!(trade = %trade_id, target = %target, error = %e, "ledger append failed, transition rolled back");
            return Err(DomainError::StorageUnavailable(e.to_string()));
        }

        tracing::info!(trade = %trade_id, from = %saved.status, to = %target, actor = %actor.user_id, "trade transitioned");
        Ok(trade.clone())
    }

    /// Assign a bank to the trade and move it into bank review.
    ///
    /// Buyer-only; the bank ref may be set exactly once.
    pub fn assign_bank(
        &self,
        trade_id: TradeId,
        bank_id: UserId,
        actor: &Identity,
    ) -> DomainResult<Trade> {
        let row = self.row(trade_id)?;
        let mut trade = row.lock().unwrap();

        gate::can_assign_bank(actor, &trade.parties())?;

        if trade.bank_id.is_some() {
            return Err(DomainError::conflict(format!(
                "bank already assigned to trade {trade_id}"
            )));
        }

        match self.role_of(bank_id) {
            Some(Role::Bank) => {}
            _ => return Err(DomainError::not_found("Bank user", bank_id)),
        }

        let saved = trade.clone();
        trade.bank_id = Some(bank_id);
        trade.enter(TradeStatus::BankReviewing, Utc::now());

        let entry = NewEntry::for_trade(
            trade_id,
            TradeStatus::BankReviewing.ledger_action(),
            actor.user_id,
            actor.role,
        )
        .with_metadata(json!({
            "assigned_bank": bank_id.to_string(),
            "assigned_by": actor.user_id.to_string(),
        }));

        if let Err(e) = self.ledger.append(entry) {
            *trade = saved;
            tracing::error!(trade = %trade_id, error = %e, "ledger append failed, bank assignment rolled back");
            return Err(DomainError::StorageUnavailable(e.to_string()));
        }

        tracing::info!(trade = %trade_id, bank = %bank_id, "bank assigned");
        Ok(trade.clone())
    }

    /// Auto-advance after a document upload.
    ///
    /// Side effect of the document registry, not a caller-invoked
    /// transition: the uploader may be buyer or seller (the registry's own
    /// gate already ran), so no per-edge role check applies here. Same
    /// atomicity and ledger guarantee as an explicit transition.
    pub fn advance_on_document_upload(
        &self,
        trade_id: TradeId,
        actor: &Identity,
    ) -> DomainResult<Trade> {
        let row = self.row(trade_id)?;
        let mut trade = row.lock().unwrap();

        if trade.status != TradeStatus::SellerConfirmed {
            return Err(DomainError::InvalidTransition {
                trade_id: trade_id.to_string(),
                from: trade.status.to_string(),
                to: TradeStatus::DocumentsUploaded.to_string(),
            });
        }

        let saved = trade.clone();
        trade.enter(TradeStatus::DocumentsUploaded, Utc::now());

        let entry = NewEntry::for_trade(
            trade_id,
            TradeStatus::DocumentsUploaded.ledger_action(),
            actor.user_id,
            actor.role,
        )
        .with_metadata(json!({ "auto": "document upload" }));

        if let Err(e) = self.ledger.append(entry) {
            *trade = saved;
            tracing::error!(trade = %trade_id, error = %e, "ledger append failed, auto-advance rolled back");
            return Err(DomainError::StorageUnavailable(e.to_string()));
        }

        Ok(trade.clone())
    }

    /// Fetch one trade, visibility-checked.
    pub fn get(&self, trade_id: TradeId, viewer: &Identity) -> DomainResult<Trade> {
        let row = self.row(trade_id)?;
        let trade = row.lock().unwrap();
        gate::can_view_trade(viewer, &trade.parties())?;
        Ok(trade.clone())
    }

    /// A snapshot without visibility checks, for sibling components
    /// (document registry, risk aggregator).
    pub fn snapshot(&self, trade_id: TradeId) -> DomainResult<Trade> {
        let row = self.row(trade_id)?;
        let trade = row.lock().unwrap();
        Ok(trade.clone())
    }

    /// Trades visible to the caller: admin and auditor see all, banks see
    /// their assignments, corporates their own trades.
    pub fn list_for(&self, viewer: &Identity) -> Vec<Trade> {
        let trades = self.trades.read().unwrap();
        let mut visible: Vec<Trade> = trades
            .values()
            .map(|row| row.lock().unwrap().clone())
            .filter(|t| match viewer.role {
                Role::Admin | Role::Auditor => true,
                Role::Bank => t.bank_id == Some(viewer.user_id),
                Role::Corporate => {
                    t.buyer_id == viewer.user_id || t.seller_id == viewer.user_id
                }
            })
            .collect();
        visible.sort_by_key(|t| t.created_at);
        visible
    }

    fn row(&self, trade_id: TradeId) -> DomainResult<Arc<Mutex<Trade>>> {
        self.trades
            .read()
            .unwrap()
            .get(&trade_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Trade", trade_id))
    }
}

fn corrupt(sequence: u64, what: &str) -> DomainError {
    DomainError::StorageUnavailable(format!("ledger entry {sequence} unusable: {what}"))
}

fn decode_initiated(
    trade_id: TradeId,
    entry: &chaindocs_ledger::LedgerEntry,
) -> DomainResult<Trade> {
    let meta = entry
        .metadata
        .as_ref()
        .ok_or_else(|| corrupt(entry.sequence, "creation entry without metadata"))?;

    let field = |key: &str| -> DomainResult<&str> {
        meta.get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| corrupt(entry.sequence, key))
    };

    let amount_raw: Decimal = field("amount")?
        .parse()
        .map_err(|_| corrupt(entry.sequence, "amount"))?;
    let amount = Amount::new(amount_raw).map_err(|_| corrupt(entry.sequence, "amount"))?;
    let currency: Currency = field("currency")?
        .parse()
        .map_err(|_| corrupt(entry.sequence, "currency"))?;

    Ok(Trade {
        id: trade_id,
        trade_number: field("trade_number")?.to_string(),
        buyer_id: field("buyer")?
            .parse()
            .map_err(|_| corrupt(entry.sequence, "buyer"))?,
        seller_id: field("seller")?
            .parse()
            .map_err(|_| corrupt(entry.sequence, "seller"))?,
        bank_id: None,
        amount,
        currency,
        description: field("description")?.to_string(),
        status: TradeStatus::Initiated,
        initiated_at: entry.created_at,
        confirmed_at: None,
        documents_uploaded_at: None,
        bank_review_started_at: None,
        bank_approved_at: None,
        payment_released_at: None,
        completed_at: None,
        created_at: entry.created_at,
        updated_at: entry.created_at,
    })
}
