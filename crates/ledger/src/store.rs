//! Append-only ledger store
//!
//! JSONL on disk, indexed in memory per subject. The only write operation
//! is `append`; replay at startup rebuilds the index in commit order.
//!
//! Concurrency: the write lock is held only for sequence assignment plus
//! the local file append; reads of per-subject history run under the
//! shared lock. Appends for different subjects never contend beyond that
//! short critical section.

use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chaindocs_core::{DocumentId, EntryId, TradeId};
use chrono::Utc;

use crate::entry::{LedgerAction, LedgerEntry, NewEntry};
use crate::error::LedgerError;

/// Read-side aggregation: entry counts by action token.
#[derive(Debug, Clone, Default)]
pub struct ActionStats {
    counts: HashMap<LedgerAction, u64>,
}

impl ActionStats {
    /// Count for one action token (0 if never recorded)
    pub fn count(&self, action: LedgerAction) -> u64 {
        self.counts.get(&action).copied().unwrap_or(0)
    }

    /// Total number of entries
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// All (action, count) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&LedgerAction, &u64)> {
        self.counts.iter()
    }
}

struct Inner {
    entries: Vec<Arc<LedgerEntry>>,
    by_trade: HashMap<TradeId, Vec<usize>>,
    by_document: HashMap<DocumentId, Vec<usize>>,
    known_trades: HashSet<TradeId>,
    known_documents: HashSet<DocumentId>,
    file: Option<File>,
}

/// Append-only ledger store.
///
/// Hands out `Arc<LedgerEntry>`; there is no update and no delete path.
pub struct LedgerStore {
    inner: RwLock<Inner>,
    path: PathBuf,
}

impl LedgerStore {
    /// Open (or create) a ledger file and replay its entries.
    ///
    /// Subjects referenced by replayed entries are re-registered
    /// automatically so history survives restarts.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut inner = Inner {
            entries: Vec::new(),
            by_trade: HashMap::new(),
            by_document: HashMap::new(),
            known_trades: HashSet::new(),
            known_documents: HashSet::new(),
            file: None,
        };

        if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let entry: LedgerEntry = serde_json::from_str(&line)?;
                Self::index(&mut inner, Arc::new(entry), true);
            }
            tracing::debug!(entries = inner.entries.len(), path = %path.display(), "ledger replayed");
        }

        inner.file = Some(OpenOptions::new().create(true).append(true).open(&path)?);

        Ok(Self {
            inner: RwLock::new(inner),
            path,
        })
    }

    /// Create an in-memory store (for tests and the registry's pre-checks)
    pub fn in_memory() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                by_trade: HashMap::new(),
                by_document: HashMap::new(),
                known_trades: HashSet::new(),
                known_documents: HashSet::new(),
                file: None,
            }),
            path: PathBuf::new(),
        }
    }

    /// Path of the backing file (empty for in-memory stores)
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make a trade a legal ledger subject.
    ///
    /// Engines call this when the entity row is created, before its first
    /// entry is appended.
    pub fn register_trade(&self, trade_id: TradeId) {
        self.inner.write().unwrap().known_trades.insert(trade_id);
    }

    /// Make a document a legal ledger subject.
    pub fn register_document(&self, document_id: DocumentId) {
        self.inner
            .write()
            .unwrap()
            .known_documents
            .insert(document_id);
    }

    /// Append one entry. The one and only write operation.
    ///
    /// Rejects entries with no subject, and entries whose subject was never
    /// registered. If the file write fails nothing is indexed, so a failed
    /// append leaves no partial state behind.
    pub fn append(&self, new: NewEntry) -> Result<Arc<LedgerEntry>, LedgerError> {
        if new.trade_id.is_none() && new.document_id.is_none() {
            return Err(LedgerError::MissingSubject);
        }

        let mut inner = self.inner.write().unwrap();

        if let Some(trade_id) = new.trade_id {
            if !inner.known_trades.contains(&trade_id) {
                return Err(LedgerError::UnknownSubject(trade_id.to_string()));
            }
        }
        if let Some(document_id) = new.document_id {
            if !inner.known_documents.contains(&document_id) {
                return Err(LedgerError::UnknownSubject(document_id.to_string()));
            }
        }

        let entry = Arc::new(LedgerEntry {
            id: EntryId::generate(),
            sequence: inner.entries.len() as u64 + 1,
            document_id: new.document_id,
            trade_id: new.trade_id,
            action: new.action,
            actor_id: new.actor_id,
            actor_role: new.actor_role,
            metadata: new.metadata,
            created_at: Utc::now(),
        });

        // Durability first: nothing is indexed unless the line hit the file.
        if let Some(ref mut file) = inner.file {
            let json = serde_json::to_string(entry.as_ref())?;
            writeln!(file, "{}", json)?;
            file.flush()?;
        }

        Self::index(&mut inner, Arc::clone(&entry), false);

        tracing::debug!(
            sequence = entry.sequence,
            action = %entry.action,
            actor = %entry.actor_id,
            "ledger entry appended"
        );

        Ok(entry)
    }

    fn index(inner: &mut Inner, entry: Arc<LedgerEntry>, register_subjects: bool) {
        let idx = inner.entries.len();
        if let Some(trade_id) = entry.trade_id {
            if register_subjects {
                inner.known_trades.insert(trade_id);
            }
            inner.by_trade.entry(trade_id).or_default().push(idx);
        }
        if let Some(document_id) = entry.document_id {
            if register_subjects {
                inner.known_documents.insert(document_id);
            }
            inner
                .by_document
                .entry(document_id)
                .or_default()
                .push(idx);
        }
        inner.entries.push(entry);
    }

    /// Entries about a trade, ascending by commit order
    pub fn history_for_trade(&self, trade_id: TradeId) -> Vec<Arc<LedgerEntry>> {
        let inner = self.inner.read().unwrap();
        inner
            .by_trade
            .get(&trade_id)
            .map(|indices| indices.iter().map(|&i| Arc::clone(&inner.entries[i])).collect())
            .unwrap_or_default()
    }

    /// Entries about a document, ascending by commit order
    pub fn history_for_document(&self, document_id: DocumentId) -> Vec<Arc<LedgerEntry>> {
        let inner = self.inner.read().unwrap();
        inner
            .by_document
            .get(&document_id)
            .map(|indices| indices.iter().map(|&i| Arc::clone(&inner.entries[i])).collect())
            .unwrap_or_default()
    }

    /// Whether a document has a VERIFIED entry (gates post-verification edits)
    pub fn document_is_verified(&self, document_id: DocumentId) -> bool {
        self.history_for_document(document_id)
            .iter()
            .any(|e| e.action == LedgerAction::Verified)
    }

    /// All entries in commit order
    pub fn all_entries(&self) -> Vec<Arc<LedgerEntry>> {
        self.inner.read().unwrap().entries.iter().cloned().collect()
    }

    /// Counts by action, reflecting entries committed before the call started
    pub fn stats(&self) -> ActionStats {
        let inner = self.inner.read().unwrap();
        let mut counts: HashMap<LedgerAction, u64> = HashMap::new();
        for entry in &inner.entries {
            *counts.entry(entry.action).or_insert(0) += 1;
        }
        ActionStats { counts }
    }

    /// Number of committed entries
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
