//! Risk engine with per-trade cache

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chaindocs_core::{DomainResult, Identity, TradeId};
use chaindocs_ledger::LedgerStore;
use chaindocs_registry::DocumentRegistry;
use chaindocs_trade::TradeBook;
use chrono::Utc;

use crate::score::{score_trade, RiskAssessment, RiskLevel};

pub struct RiskEngine {
    book: Arc<TradeBook>,
    ledger: Arc<LedgerStore>,
    registry: Arc<DocumentRegistry>,
    cache: RwLock<HashMap<TradeId, RiskAssessment>>,
}

impl RiskEngine {
    pub fn new(
        book: Arc<TradeBook>,
        ledger: Arc<LedgerStore>,
        registry: Arc<DocumentRegistry>,
    ) -> Self {
        Self {
            book,
            ledger,
            registry,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Recompute the assessment for one trade and cache it.
    ///
    /// Visibility follows the trade: whoever may view the trade may see
    /// its risk.
    pub fn assess(&self, trade_id: TradeId, viewer: &Identity) -> DomainResult<RiskAssessment> {
        let trade = self.book.get(trade_id, viewer)?;
        let entry_count = self.ledger.history_for_trade(trade_id).len();
        let document_count = self.registry.count_for_trade(trade_id);

        let (score, reasons) = score_trade(&trade, entry_count, document_count);
        let assessment = RiskAssessment {
            trade_id,
            score,
            level: RiskLevel::from_score(score),
            reasons,
            computed_at: Utc::now(),
        };

        self.cache
            .write()
            .unwrap()
            .insert(trade_id, assessment.clone());
        tracing::debug!(trade = %trade_id, score, level = %assessment.level, "risk recomputed");
        Ok(assessment)
    }

    /// The cached assessment, computing one if the trade was never scored.
    pub fn latest(&self, trade_id: TradeId, viewer: &Identity) -> DomainResult<RiskAssessment> {
        // Gate first so a stale cache entry never leaks past visibility.
        self.book.get(trade_id, viewer)?;
        if let Some(found) = self.cache.read().unwrap().get(&trade_id) {
            return Ok(found.clone());
        }
        self.assess(trade_id, viewer)
    }
}
