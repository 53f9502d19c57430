//! Document registration and update engine
//!
//! Every document is fingerprinted (SHA-256 of the uploaded bytes) before
//! anything is recorded. Storage writes happen first; only a successful
//! write produces a document row and its `ISSUED` ledger entry, so a
//! storage outage leaves no trace in the registry.
//!
//! Each document sits behind its own row lock. Registration re-validates
//! uniqueness under the table lock at insertion time, and updates
//! serialize per document, so the fingerprint chain in the ledger and the
//! frozen-after-verification rule hold under concurrent callers.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chaindocs_core::{DocumentId, DomainError, DomainResult, Identity, Role, TradeId};
use chaindocs_gate as gate;
use chaindocs_ledger::{LedgerAction, LedgerEntry, LedgerStore, NewEntry};
use chaindocs_trade::TradeBook;
use chrono::{DateTime, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::document::{Document, DocumentType, UpdateMode};
use crate::storage::{ObjectStore, StorageError};

/// SHA-256 of a byte slice, lowercase hex.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

struct DocumentRow {
    doc: Mutex<Document>,
    /// Serializes update storage writes per document; the row mutex alone
    /// cannot be held across them.
    updates: tokio::sync::Mutex<()>,
}

impl DocumentRow {
    fn new(doc: Document) -> Arc<Self> {
        Arc::new(Self {
            doc: Mutex::new(doc),
            updates: tokio::sync::Mutex::new(()),
        })
    }
}

/// The document registry.
pub struct DocumentRegistry {
    book: Arc<TradeBook>,
    ledger: Arc<LedgerStore>,
    storage: Arc<dyn ObjectStore>,
    documents: RwLock<HashMap<DocumentId, Arc<DocumentRow>>>,
}

impl DocumentRegistry {
    pub fn new(
        book: Arc<TradeBook>,
        ledger: Arc<LedgerStore>,
        storage: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            book,
            ledger,
            storage,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Rebuild a registry from the ledger's document entries.
    ///
    /// `ISSUED` entries carry the full document shape; `UPDATED` and
    /// `VERIFIED` entries replay the fingerprint and verification state in
    /// sequence order.
    pub fn replay(
        book: Arc<TradeBook>,
        ledger: Arc<LedgerStore>,
        storage: Arc<dyn ObjectStore>,
    ) -> DomainResult<Self> {
        let registry = Self::new(book, Arc::clone(&ledger), storage);
        {
            let mut documents = registry.documents.write().unwrap();
            for entry in ledger.all_entries() {
                let Some(id) = entry.document_id else { continue };
                match entry.action {
                    LedgerAction::Issued => {
                        let doc = decode_issued(id, entry.as_ref())?;
                        documents.insert(id, DocumentRow::new(doc));
                    }
                    LedgerAction::Updated => {
                        let meta = entry
                            .metadata
                            .as_ref()
                            .ok_or_else(|| corrupt(entry.sequence, "update without metadata"))?;
                        let row = documents
                            .get(&id)
                            .ok_or_else(|| corrupt(entry.sequence, "update before issue"))?;
                        let mut doc = row.doc.lock().unwrap();
                        doc.file_hash = meta
                            .get("hash_after")
                            .and_then(|v| v.as_str())
                            .ok_or_else(|| corrupt(entry.sequence, "hash_after"))?
                            .to_string();
                        doc.file_size = meta
                            .get("size_after")
                            .and_then(|v| v.as_u64())
                            .ok_or_else(|| corrupt(entry.sequence, "size_after"))?;
                        doc.updated_at = entry.created_at;
                    }
                    LedgerAction::Verified => {
                        let row = documents
                            .get(&id)
                            .ok_or_else(|| corrupt(entry.sequence, "verify before issue"))?;
                        let mut doc = row.doc.lock().unwrap();
                        doc.verified_at = Some(entry.created_at);
                        doc.verified_by = Some(entry.actor_id);
                    }
                    _ => {}
                }
            }
        }
        Ok(registry)
    }

    /// Register a new document, optionally against a trade.
    ///
    /// `doc_number` and content fingerprint are unique registry-wide;
    /// either colliding is a `Conflict`. On success a trade-bound upload
    /// auto-advances `SELLER_CONFIRMED -> DOCUMENTS_UPLOADED`; from any
    /// other status the upload succeeds without moving the trade.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_document(
        &self,
        actor: &Identity,
        trade_id: Option<TradeId>,
        doc_type: DocumentType,
        doc_number: &str,
        file_name: &str,
        bytes: &[u8],
        issued_at: Option<DateTime<Utc>>,
    ) -> DomainResult<Document> {
        match trade_id {
            Some(trade_id) => {
                let trade = self.book.snapshot(trade_id)?;
                gate::can_upload_for_trade(actor, &trade.parties())?;
            }
            None => gate::ensure_can_mutate(actor)?,
        }

        if doc_number.trim().is_empty() {
            return Err(DomainError::invalid_argument("document number is required"));
        }
        if bytes.is_empty() {
            return Err(DomainError::invalid_argument("uploaded file is empty"));
        }

        let file_hash = sha256_hex(bytes);
        // Fast rejection before any storage write. Not authoritative: the
        // insertion below re-validates under the table lock.
        {
            let documents = self.documents.read().unwrap();
            check_duplicates(&documents, doc_number, &file_hash)?;
        }

        let id = DocumentId::generate();
        let storage_key = match trade_id {
            Some(trade_id) => format!("trades/{trade_id}/documents/{id}"),
            None => format!("documents/{id}"),
        };

        self.storage
            .put(&storage_key, bytes)
            .await
            .map_err(|e| DomainError::StorageUnavailable(e.to_string()))?;

        let now = Utc::now();
        let document = Document {
            id,
            trade_id,
            doc_type,
            doc_number: doc_number.to_string(),
            file_name: file_name.to_string(),
            file_hash: file_hash.clone(),
            file_size: bytes.len() as u64,
            storage_key: storage_key.clone(),
            uploaded_by: actor.user_id,
            issued_at,
            verified_at: None,
            verified_by: None,
            created_at: now,
            updated_at: now,
        };

        // Carries the full document shape so the registry can be rebuilt
        // from the ledger alone.
        let mut entry =
            NewEntry::for_document(id, LedgerAction::Issued, actor.user_id, actor.role)
                .with_metadata(json!({
                    "doc_type": doc_type.to_string(),
                    "doc_number": doc_number,
                    "file_name": file_name,
                    "file_hash": file_hash,
                    "file_size": bytes.len() as u64,
                    "storage_key": storage_key,
                    "issued_at": issued_at.map(|t| t.to_rfc3339()),
                }));
        if let Some(trade_id) = trade_id {
            entry = entry.with_trade(trade_id);
        }

        self.ledger.register_document(id);
        let committed = {
            let mut documents = self.documents.write().unwrap();
            // A racing registration may have landed since the pre-check;
            // the check under the write lock decides.
            match check_duplicates(&documents, doc_number, &file_hash) {
                Err(conflict) => Err(conflict),
                Ok(()) => match self.ledger.append(entry) {
                    Ok(_) => {
                        documents.insert(id, DocumentRow::new(document.clone()));
                        Ok(())
                    }
                    Err(e) => {
                        tracing::error!(document = %id, error = %e, "ledger append failed, registration aborted");
                        Err(DomainError::StorageUnavailable(e.to_string()))
                    }
                },
            }
        };
        if let Err(e) = committed {
            self.discard(&document.storage_key).await;
            return Err(e);
        }

        // Best effort: the first upload moves the trade forward, later
        // uploads find the edge gone and that is fine. Registration has
        // already succeeded, so a failed advance is logged, not returned.
        if let Some(trade_id) = trade_id {
            match self.book.advance_on_document_upload(trade_id, actor) {
                Ok(_) => tracing::info!(trade = %trade_id, "trade advanced to documents_uploaded"),
                Err(DomainError::InvalidTransition { .. }) => {}
                Err(e) => {
                    tracing::warn!(trade = %trade_id, error = %e, "auto-advance after upload failed");
                }
            }
        }

        tracing::info!(document = %id, hash = %document.file_hash, "document registered");
        Ok(document)
    }

    /// Replace or extend a document's stored bytes.
    ///
    /// Owner or admin only. Once a document carries a `VERIFIED` ledger
    /// entry its bytes are frozen and any update is a `Conflict`. In
    /// `Append` mode the new bytes follow the stored ones after a newline.
    pub async fn update_document(
        &self,
        actor: &Identity,
        document_id: DocumentId,
        mode: UpdateMode,
        bytes: &[u8],
    ) -> DomainResult<Document> {
        let row = self.row(document_id)?;
        let _updating = row.updates.lock().await;

        let (storage_key, hash_before) = {
            let doc = row.doc.lock().unwrap();
            gate::can_update_document(actor, doc.uploaded_by)?;
            (doc.storage_key.clone(), doc.file_hash.clone())
        };

        if self.ledger.document_is_verified(document_id) {
            return Err(frozen(document_id));
        }
        if bytes.is_empty() {
            return Err(DomainError::invalid_argument("update payload is empty"));
        }

        // The current bytes serve append mode and the rollback below.
        let previous = self
            .storage
            .get(&storage_key)
            .await
            .map_err(|e| DomainError::StorageUnavailable(e.to_string()))?;
        let new_bytes = match mode {
            UpdateMode::Overwrite => bytes.to_vec(),
            UpdateMode::Append => {
                let mut joined = previous.clone();
                joined.push(b'\n');
                joined.extend_from_slice(bytes);
                joined
            }
        };

        self.storage
            .put(&storage_key, &new_bytes)
            .await
            .map_err(|e| DomainError::StorageUnavailable(e.to_string()))?;

        let hash_after = sha256_hex(&new_bytes);
        let entry =
            NewEntry::for_document(document_id, LedgerAction::Updated, actor.user_id, actor.role)
                .with_metadata(json!({
                    "mode": mode.to_string(),
                    "hash_before": hash_before,
                    "hash_after": hash_after,
                    "size_after": new_bytes.len() as u64,
                }));

        let committed: DomainResult<Document> = {
            let mut doc = row.doc.lock().unwrap();
            // Verification may have landed while the object was being
            // rewritten; frozen bytes win.
            if self.ledger.document_is_verified(document_id) {
                Err(frozen(document_id))
            } else {
                match self.ledger.append(entry) {
                    Ok(_) => {
                        doc.file_hash = hash_after;
                        doc.file_size = new_bytes.len() as u64;
                        doc.updated_at = Utc::now();
                        Ok(doc.clone())
                    }
                    Err(e) => Err(DomainError::StorageUnavailable(e.to_string())),
                }
            }
        };

        match committed {
            Ok(doc) => {
                tracing::info!(document = %document_id, mode = %mode, "document updated");
                Ok(doc)
            }
            Err(e) => {
                // Put the bytes the row still describes back in place.
                if let Err(restore) = self.storage.put(&storage_key, &previous).await {
                    tracing::warn!(
                        document = %document_id,
                        error = %restore,
                        "stored bytes left inconsistent after aborted update"
                    );
                }
                Err(e)
            }
        }
    }

    /// Mark a document verified, freezing its bytes.
    pub fn mark_verified(&self, actor: &Identity, document_id: DocumentId) -> DomainResult<Document> {
        gate::can_mark_verified(actor)?;

        let row = self.row(document_id)?;
        let mut doc = row.doc.lock().unwrap();

        if self.ledger.document_is_verified(document_id) {
            return Err(DomainError::conflict(format!(
                "document {document_id} is already verified"
            )));
        }

        let mut entry =
            NewEntry::for_document(document_id, LedgerAction::Verified, actor.user_id, actor.role)
                .with_metadata(json!({ "file_hash": doc.file_hash }));
        if let Some(trade_id) = doc.trade_id {
            entry = entry.with_trade(trade_id);
        }
        self.ledger
            .append(entry)
            .map_err(|e| DomainError::StorageUnavailable(e.to_string()))?;

        doc.verified_at = Some(Utc::now());
        doc.verified_by = Some(actor.user_id);

        tracing::info!(document = %document_id, by = %actor.user_id, "document verified");
        Ok(doc.clone())
    }

    /// Fetch a document record, visibility-checked.
    ///
    /// Trade-bound documents follow their trade's visibility; standalone
    /// documents are visible to the owner, admins and auditors.
    pub fn get(&self, actor: &Identity, document_id: DocumentId) -> DomainResult<Document> {
        let doc = self.record(document_id)?;
        self.check_visibility(actor, &doc)?;
        Ok(doc)
    }

    /// Fetch a document's bytes, recording the access.
    ///
    /// The `VIEWED` entry is advisory: if it cannot be appended the read
    /// still succeeds, logged as a warning.
    pub async fn download(&self, actor: &Identity, document_id: DocumentId) -> DomainResult<Vec<u8>> {
        let doc = self.get(actor, document_id)?;

        let bytes = self
            .storage
            .get(&doc.storage_key)
            .await
            .map_err(|e| match e {
                StorageError::NotFound(_) => DomainError::not_found("Document object", document_id),
                StorageError::Unavailable(msg) => DomainError::StorageUnavailable(msg),
            })?;

        let entry =
            NewEntry::for_document(document_id, LedgerAction::Viewed, actor.user_id, actor.role);
        if let Err(e) = self.ledger.append(entry) {
            tracing::warn!(document = %document_id, error = %e, "view entry not recorded");
        }

        Ok(bytes)
    }

    /// The registered document with this content fingerprint, if any.
    pub fn find_by_hash(&self, file_hash: &str) -> Option<Document> {
        let documents = self.documents.read().unwrap();
        documents.values().find_map(|row| {
            let doc = row.doc.lock().unwrap();
            doc.file_hash
                .eq_ignore_ascii_case(file_hash)
                .then(|| doc.clone())
        })
    }

    /// Client-side pre-check: does `bytes` hash to `claimed_hash`, and is
    /// that content already registered? Pure lookup, writes nothing to the
    /// ledger.
    pub fn verify_upload(&self, bytes: &[u8], claimed_hash: &str) -> (bool, Option<Document>) {
        let computed = sha256_hex(bytes);
        let verified = computed.eq_ignore_ascii_case(claimed_hash);
        (verified, self.find_by_hash(&computed))
    }

    /// All documents of a trade, ascending by creation time.
    pub fn list_for_trade(&self, actor: &Identity, trade_id: TradeId) -> DomainResult<Vec<Document>> {
        let trade = self.book.snapshot(trade_id)?;
        gate::can_view_trade(actor, &trade.parties())?;

        let mut docs: Vec<Document> = {
            let documents = self.documents.read().unwrap();
            documents
                .values()
                .filter_map(|row| {
                    let doc = row.doc.lock().unwrap();
                    (doc.trade_id == Some(trade_id)).then(|| doc.clone())
                })
                .collect()
        };
        docs.sort_by_key(|d| d.created_at);
        Ok(docs)
    }

    /// The audit history of one document.
    pub fn history(&self, actor: &Identity, document_id: DocumentId) -> DomainResult<Vec<Arc<LedgerEntry>>> {
        // Visibility follows the document itself.
        self.get(actor, document_id)?;
        Ok(self.ledger.history_for_document(document_id))
    }

    /// Snapshot of every document, for the integrity verifier.
    pub fn all_documents(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = {
            let documents = self.documents.read().unwrap();
            documents
                .values()
                .map(|row| row.doc.lock().unwrap().clone())
                .collect()
        };
        docs.sort_by_key(|d| d.created_at);
        docs
    }

    /// Count of documents registered against a trade.
    pub fn count_for_trade(&self, trade_id: TradeId) -> usize {
        let documents = self.documents.read().unwrap();
        documents
            .values()
            .filter(|row| row.doc.lock().unwrap().trade_id == Some(trade_id))
            .count()
    }

    pub(crate) fn record(&self, document_id: DocumentId) -> DomainResult<Document> {
        Ok(self.row(document_id)?.doc.lock().unwrap().clone())
    }

    fn row(&self, document_id: DocumentId) -> DomainResult<Arc<DocumentRow>> {
        self.documents
            .read()
            .unwrap()
            .get(&document_id)
            .cloned()
            .ok_or_else(|| DomainError::not_found("Document", document_id))
    }

    fn check_visibility(&self, actor: &Identity, doc: &Document) -> DomainResult<()> {
        match doc.trade_id {
            Some(trade_id) => {
                let trade = self.book.snapshot(trade_id)?;
                gate::can_view_trade(actor, &trade.parties())
            }
            None => {
                if doc.uploaded_by == actor.user_id
                    || matches!(actor.role, Role::Admin | Role::Auditor)
                {
                    Ok(())
                } else {
                    Err(DomainError::forbidden("not a party to this document"))
                }
            }
        }
    }

    async fn discard(&self, storage_key: &str) {
        if let Err(e) = self.storage.delete(storage_key).await {
            tracing::warn!(key = %storage_key, error = %e, "orphaned object left after aborted registration");
        }
    }
}

fn check_duplicates(
    documents: &HashMap<DocumentId, Arc<DocumentRow>>,
    doc_number: &str,
    file_hash: &str,
) -> DomainResult<()> {
    for row in documents.values() {
        let doc = row.doc.lock().unwrap();
        if doc.file_hash == file_hash {
            return Err(DomainError::conflict(format!(
                "identical content already registered as document {}",
                doc.id
            )));
        }
        if doc.doc_number == doc_number {
            return Err(DomainError::conflict(format!(
                "document number {doc_number} already registered as {}",
                doc.id
            )));
        }
    }
    Ok(())
}

fn frozen(document_id: DocumentId) -> DomainError {
    DomainError::conflict(format!(
        "document {document_id} is verified and can no longer be updated"
    ))
}

fn corrupt(sequence: u64, what: &str) -> DomainError {
    DomainError::StorageUnavailable(format!("ledger entry {sequence} unusable: {what}"))
}

fn decode_issued(id: DocumentId, entry: &LedgerEntry) -> DomainResult<Document> {
    let meta = entry
        .metadata
        .as_ref()
        .ok_or_else(|| corrupt(entry.sequence, "issue without metadata"))?;
    let field = |key: &str| -> DomainResult<&str> {
        meta.get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| corrupt(entry.sequence, key))
    };

    let issued_at = match meta.get("issued_at").and_then(|v| v.as_str()) {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|_| corrupt(entry.sequence, "issued_at"))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(Document {
        id,
        trade_id: entry.trade_id,
        doc_type: field("doc_type")?
            .parse()
            .map_err(|_| corrupt(entry.sequence, "doc_type"))?,
        doc_number: field("doc_number")?.to_string(),
        file_name: field("file_name")?.to_string(),
        file_hash: field("file_hash")?.to_string(),
        file_size: meta
            .get("file_size")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| corrupt(entry.sequence, "file_size"))?,
        storage_key: field("storage_key")?.to_string(),
        uploaded_by: entry.actor_id,
        issued_at,
        verified_at: None,
        verified_by: None,
        created_at: entry.created_at,
        updated_at: entry.created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryObjectStore;
    use async_trait::async_trait;
    use chaindocs_core::UserId;
    use chaindocs_trade::TradeStatus;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicBool, Ordering};

    const HELLO_SHA256: &str =
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    struct Fixture {
        registry: DocumentRegistry,
        book: Arc<TradeBook>,
        ledger: Arc<LedgerStore>,
        storage: Arc<MemoryObjectStore>,
        buyer: Identity,
        seller: Identity,
        bank: Identity,
        trade_id: TradeId,
    }

    fn fixture() -> Fixture {
        let ledger = Arc::new(LedgerStore::in_memory());
        let book = Arc::new(TradeBook::new(Arc::clone(&ledger)));
        let storage = Arc::new(MemoryObjectStore::new());
        let registry = DocumentRegistry::new(
            Arc::clone(&book),
            Arc::clone(&ledger),
            Arc::clone(&storage) as Arc<dyn ObjectStore>,
        );

        let buyer = Identity::new(UserId::generate(), Role::Corporate);
        let seller = Identity::new(UserId::generate(), Role::Corporate);
        let bank = Identity::new(UserId::generate(), Role::Bank);
        for id in [&buyer, &seller, &bank] {
            book.register_user(id.user_id, id.role);
        }

        let trade = book
            .create_trade(&buyer, seller.user_id, dec!(5000), "USD", "coffee beans")
            .unwrap();
        book.transition(trade.id, TradeStatus::SellerConfirmed, &seller, None)
            .unwrap();

        Fixture {
            registry,
            book,
            ledger,
            storage,
            buyer,
            seller,
            bank,
            trade_id: trade.id,
        }
    }

    async fn upload(f: &Fixture, doc_number: &str, bytes: &[u8]) -> Document {
        f.registry
            .register_document(
                &f.seller,
                Some(f.trade_id),
                DocumentType::Invoice,
                doc_number,
                "invoice.pdf",
                bytes,
                None,
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_register_fingerprints_and_advances() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"hello").await;

        assert_eq!(doc.file_hash, HELLO_SHA256);
        assert_eq!(doc.file_size, 5);

        // Fingerprint entry lands in the audit trail.
        let history = f.ledger.history_for_document(doc.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, LedgerAction::Issued);
        assert_eq!(
            history[0].metadata.as_ref().unwrap()["file_hash"],
            HELLO_SHA256
        );

        // First upload moves the trade.
        let trade = f.book.snapshot(f.trade_id).unwrap();
        assert_eq!(trade.status, TradeStatus::DocumentsUploaded);
    }

    #[tokio::test]
    async fn test_second_upload_does_not_retransition() {
        let f = fixture();
        upload(&f, "INV-001", b"first").await;
        upload(&f, "INV-002", b"second").await;

        let trade = f.book.snapshot(f.trade_id).unwrap();
        assert_eq!(trade.status, TradeStatus::DocumentsUploaded);

        let status_entries = f
            .ledger
            .history_for_trade(f.trade_id)
            .iter()
            .filter(|e| e.action == LedgerAction::DocumentsUploaded)
            .count();
        assert_eq!(status_entries, 1);
    }

    #[tokio::test]
    async fn test_standalone_document_without_trade() {
        let f = fixture();
        let issued = Utc::now();
        let doc = f
            .registry
            .register_document(
                &f.seller,
                None,
                DocumentType::Contract,
                "CON-1",
                "contract.pdf",
                b"terms",
                Some(issued),
            )
            .await
            .unwrap();

        assert_eq!(doc.trade_id, None);
        assert_eq!(doc.issued_at, Some(issued));
        assert!(doc.storage_key.starts_with("documents/"));

        // Owner and auditor can see it; an unrelated corporate cannot.
        assert!(f.registry.get(&f.seller, doc.id).is_ok());
        let auditor = Identity::new(UserId::generate(), Role::Auditor);
        assert!(f.registry.get(&auditor, doc.id).is_ok());
        assert!(matches!(
            f.registry.get(&f.buyer, doc.id),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_duplicate_content_rejected_across_trades() {
        let f = fixture();
        upload(&f, "INV-001", b"hello").await;

        // Same bytes on the same trade.
        let result = f
            .registry
            .register_document(
                &f.seller,
                Some(f.trade_id),
                DocumentType::PackingList,
                "PL-001",
                "list.pdf",
                b"hello",
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));

        // Same bytes with no trade at all; the fingerprint is unique
        // registry-wide.
        let result = f
            .registry
            .register_document(
                &f.seller,
                None,
                DocumentType::Other,
                "OTH-001",
                "copy.pdf",
                b"hello",
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_duplicate_doc_number_rejected() {
        let f = fixture();
        upload(&f, "INV-001", b"one").await;

        let result = f
            .registry
            .register_document(
                &f.seller,
                Some(f.trade_id),
                DocumentType::LetterOfCredit,
                "INV-001",
                "other.pdf",
                b"two",
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    /// Object store whose `put` holds every caller at a rendezvous until
    /// all expected writers have arrived, forcing registrations to pass
    /// the duplicate pre-check before either commits.
    struct RendezvousStore {
        inner: MemoryObjectStore,
        gate: tokio::sync::Barrier,
    }

    #[async_trait]
    impl ObjectStore for RendezvousStore {
        async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
            self.gate.wait().await;
            self.inner.put(key, bytes).await
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_identical_uploads_single_winner() {
        let ledger = Arc::new(LedgerStore::in_memory());
        let book = Arc::new(TradeBook::new(Arc::clone(&ledger)));
        let storage = Arc::new(RendezvousStore {
            inner: MemoryObjectStore::new(),
            gate: tokio::sync::Barrier::new(2),
        });
        let registry = Arc::new(DocumentRegistry::new(
            Arc::clone(&book),
            Arc::clone(&ledger),
            Arc::clone(&storage) as Arc<dyn ObjectStore>,
        ));

        let buyer = Identity::new(UserId::generate(), Role::Corporate);
        let seller = Identity::new(UserId::generate(), Role::Corporate);
        for id in [&buyer, &seller] {
            book.register_user(id.user_id, id.role);
        }
        let trade = book
            .create_trade(&buyer, seller.user_id, dec!(5000), "USD", "coffee beans")
            .unwrap();
        book.transition(trade.id, TradeStatus::SellerConfirmed, &seller, None)
            .unwrap();
        let trade_id = trade.id;

        let spawn_upload = |doc_number: &'static str| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                registry
                    .register_document(
                        &seller,
                        Some(trade_id),
                        DocumentType::Invoice,
                        doc_number,
                        "invoice.pdf",
                        b"same bytes",
                        None,
                    )
                    .await
            })
        };
        let first = spawn_upload("INV-A");
        let second = spawn_upload("INV-B");
        let outcomes = [first.await.unwrap(), second.await.unwrap()];

        // Both passed the pre-check; exactly one may commit.
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(DomainError::Conflict(_)))));
        assert_eq!(registry.all_documents().len(), 1);

        // One ISSUED entry, and the loser's object was rolled back.
        let issued = ledger
            .all_entries()
            .iter()
            .filter(|e| e.action == LedgerAction::Issued)
            .count();
        assert_eq!(issued, 1);
        let winner = registry.all_documents().remove(0);
        assert_eq!(storage.get(&winner.storage_key).await.unwrap(), b"same bytes");
    }

    #[tokio::test]
    async fn test_outsider_cannot_upload() {
        let f = fixture();
        let outsider = Identity::new(UserId::generate(), Role::Corporate);
        let result = f
            .registry
            .register_document(
                &outsider,
                Some(f.trade_id),
                DocumentType::Invoice,
                "INV-X",
                "x.pdf",
                b"x",
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden(_))));

        // Auditors cannot upload even standalone documents.
        let auditor = Identity::new(UserId::generate(), Role::Auditor);
        let result = f
            .registry
            .register_document(
                &auditor,
                None,
                DocumentType::Other,
                "OTH-1",
                "x.pdf",
                b"x",
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_storage_outage_leaves_no_trace() {
        let f = fixture();
        f.storage.set_offline(true);

        let before = f.ledger.len();
        let result = f
            .registry
            .register_document(
                &f.seller,
                Some(f.trade_id),
                DocumentType::Invoice,
                "INV-001",
                "invoice.pdf",
                b"hello",
                None,
            )
            .await;

        assert!(matches!(result, Err(DomainError::StorageUnavailable(_))));
        assert_eq!(f.ledger.len(), before);
        assert!(f.registry.all_documents().is_empty());
    }

    #[tokio::test]
    async fn test_update_overwrite() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"v1").await;

        let updated = f
            .registry
            .update_document(&f.seller, doc.id, UpdateMode::Overwrite, b"v2")
            .await
            .unwrap();

        assert_eq!(updated.file_hash, sha256_hex(b"v2"));
        assert_eq!(f.storage.get(&doc.storage_key).await.unwrap(), b"v2");

        let history = f.ledger.history_for_document(doc.id);
        let entry = history.last().unwrap();
        assert_eq!(entry.action, LedgerAction::Updated);
        let meta = entry.metadata.as_ref().unwrap();
        assert_eq!(meta["hash_before"], doc.file_hash);
        assert_eq!(meta["hash_after"], updated.file_hash);
    }

    #[tokio::test]
    async fn test_update_append_joins_with_newline() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"line one").await;

        let updated = f
            .registry
            .update_document(&f.seller, doc.id, UpdateMode::Append, b"line two")
            .await
            .unwrap();

        let stored = f.storage.get(&doc.storage_key).await.unwrap();
        assert_eq!(stored, b"line one\nline two");
        assert_eq!(updated.file_hash, sha256_hex(b"line one\nline two"));
    }

    #[tokio::test]
    async fn test_update_blocked_after_verification() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"final").await;
        f.registry.mark_verified(&f.bank, doc.id).unwrap();

        let result = f
            .registry
            .update_document(&f.seller, doc.id, UpdateMode::Overwrite, b"sneaky")
            .await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
        assert_eq!(f.storage.get(&doc.storage_key).await.unwrap(), b"final");
    }

    /// Object store that can hold `put` calls until released, so a test
    /// can slip another operation in while a write is in flight.
    struct HoldStore {
        inner: MemoryObjectStore,
        holding: AtomicBool,
        release: tokio::sync::Semaphore,
    }

    impl HoldStore {
        fn new() -> Self {
            Self {
                inner: MemoryObjectStore::new(),
                holding: AtomicBool::new(false),
                release: tokio::sync::Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl ObjectStore for HoldStore {
        async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), StorageError> {
            if self.holding.load(Ordering::SeqCst) {
                let _go = self.release.acquire().await.unwrap();
            }
            self.inner.put(key, bytes).await
        }

        async fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<(), StorageError> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_verification_during_update_freezes_bytes() {
        let ledger = Arc::new(LedgerStore::in_memory());
        let book = Arc::new(TradeBook::new(Arc::clone(&ledger)));
        let storage = Arc::new(HoldStore::new());
        let registry = Arc::new(DocumentRegistry::new(
            Arc::clone(&book),
            Arc::clone(&ledger),
            Arc::clone(&storage) as Arc<dyn ObjectStore>,
        ));

        let buyer = Identity::new(UserId::generate(), Role::Corporate);
        let seller = Identity::new(UserId::generate(), Role::Corporate);
        let bank = Identity::new(UserId::generate(), Role::Bank);
        for id in [&buyer, &seller, &bank] {
            book.register_user(id.user_id, id.role);
        }
        let trade = book
            .create_trade(&buyer, seller.user_id, dec!(5000), "USD", "coffee beans")
            .unwrap();
        book.transition(trade.id, TradeStatus::SellerConfirmed, &seller, None)
            .unwrap();

        let doc = registry
            .register_document(
                &seller,
                Some(trade.id),
                DocumentType::Invoice,
                "INV-001",
                "invoice.pdf",
                b"original",
                None,
            )
            .await
            .unwrap();

        // The update's storage write stalls while verification commits.
        storage.holding.store(true, Ordering::SeqCst);
        let update = tokio::spawn({
            let registry = Arc::clone(&registry);
            let doc_id = doc.id;
            async move {
                registry
                    .update_document(&seller, doc_id, UpdateMode::Overwrite, b"late edit")
                    .await
            }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        registry.mark_verified(&bank, doc.id).unwrap();
        storage.release.add_permits(1);

        let result = update.await.unwrap();
        assert!(matches!(result, Err(DomainError::Conflict(_))));

        // Frozen bytes survived and no UPDATED entry was recorded.
        assert_eq!(storage.get(&doc.storage_key).await.unwrap(), b"original");
        assert_eq!(registry.record(doc.id).unwrap().file_hash, doc.file_hash);
        assert!(!ledger
            .history_for_document(doc.id)
            .iter()
            .any(|e| e.action == LedgerAction::Updated));
    }

    #[tokio::test]
    async fn test_concurrent_updates_keep_hash_chain() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"base").await;

        let (r1, r2) = tokio::join!(
            f.registry
                .update_document(&f.seller, doc.id, UpdateMode::Overwrite, b"first change"),
            f.registry
                .update_document(&f.seller, doc.id, UpdateMode::Overwrite, b"second change"),
        );
        r1.unwrap();
        r2.unwrap();

        // Updates serialized: each entry's hash_before is the previous
        // entry's hash_after, starting from the registered fingerprint.
        let history = f.ledger.history_for_document(doc.id);
        let updates: Vec<_> = history
            .iter()
            .filter(|e| e.action == LedgerAction::Updated)
            .collect();
        assert_eq!(updates.len(), 2);
        let first = updates[0].metadata.as_ref().unwrap();
        let second = updates[1].metadata.as_ref().unwrap();
        assert_eq!(first["hash_before"], doc.file_hash);
        assert_eq!(second["hash_before"], first["hash_after"]);

        // The row and the stored bytes agree with the last entry.
        let current = f.registry.record(doc.id).unwrap();
        assert_eq!(second["hash_after"], current.file_hash);
        let stored = f.storage.get(&current.storage_key).await.unwrap();
        assert_eq!(sha256_hex(&stored), current.file_hash);
    }

    #[tokio::test]
    async fn test_update_requires_owner_or_admin() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"contents").await;

        let result = f
            .registry
            .update_document(&f.buyer, doc.id, UpdateMode::Overwrite, b"other")
            .await;
        assert!(matches!(result, Err(DomainError::Forbidden(_))));

        let admin = Identity::new(UserId::generate(), Role::Admin);
        assert!(f
            .registry
            .update_document(&admin, doc.id, UpdateMode::Overwrite, b"fixed")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_mark_verified() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"contents").await;

        let verified = f.registry.mark_verified(&f.bank, doc.id).unwrap();
        assert_eq!(verified.verified_by, Some(f.bank.user_id));
        assert!(verified.verified_at.is_some());
        assert!(f.ledger.document_is_verified(doc.id));

        // Re-verification is a conflict.
        assert!(matches!(
            f.registry.mark_verified(&f.bank, doc.id),
            Err(DomainError::Conflict(_))
        ));

        // Sellers cannot verify.
        let doc2 = upload(&f, "INV-002", b"more").await;
        assert!(matches!(
            f.registry.mark_verified(&f.seller, doc2.id),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_download_records_view() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"payload").await;

        let bytes = f.registry.download(&f.buyer, doc.id).await.unwrap();
        assert_eq!(bytes, b"payload");

        let history = f.ledger.history_for_document(doc.id);
        assert_eq!(history.last().unwrap().action, LedgerAction::Viewed);
        assert_eq!(history.last().unwrap().actor_id, f.buyer.user_id);
    }

    #[tokio::test]
    async fn test_verify_upload_and_find_by_hash() {
        let f = fixture();
        let doc = upload(&f, "INV-001", b"hello").await;

        // Matching bytes and claim, content already registered.
        let (verified, found) = f.registry.verify_upload(b"hello", HELLO_SHA256);
        assert!(verified);
        assert_eq!(found.unwrap().id, doc.id);

        // Claims are compared case-insensitively.
        let (verified, _) = f
            .registry
            .verify_upload(b"hello", &HELLO_SHA256.to_uppercase());
        assert!(verified);

        // Wrong claim, unknown content.
        let (verified, found) = f.registry.verify_upload(b"hello!", HELLO_SHA256);
        assert!(!verified);
        assert!(found.is_none());

        assert!(f.registry.find_by_hash("deadbeef").is_none());
    }

    #[tokio::test]
    async fn test_list_for_trade_visibility() {
        let f = fixture();
        upload(&f, "INV-001", b"a").await;
        upload(&f, "INV-002", b"b").await;

        assert_eq!(f.registry.list_for_trade(&f.buyer, f.trade_id).unwrap().len(), 2);

        let outsider = Identity::new(UserId::generate(), Role::Corporate);
        assert!(matches!(
            f.registry.list_for_trade(&outsider, f.trade_id),
            Err(DomainError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_replay_rebuilds_registry_from_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");

        let storage = Arc::new(MemoryObjectStore::new());
        let buyer = Identity::new(UserId::generate(), Role::Corporate);
        let seller = Identity::new(UserId::generate(), Role::Corporate);
        let bank = Identity::new(UserId::generate(), Role::Bank);

        let (trade_id, doc_id, final_hash) = {
            let ledger = Arc::new(LedgerStore::open(&path).unwrap());
            let book = Arc::new(TradeBook::new(Arc::clone(&ledger)));
            for id in [&buyer, &seller, &bank] {
                book.register_user(id.user_id, id.role);
            }
            let registry = DocumentRegistry::new(
                Arc::clone(&book),
                Arc::clone(&ledger),
                Arc::clone(&storage) as Arc<dyn ObjectStore>,
            );

            let trade = book
                .create_trade(&buyer, seller.user_id, dec!(9000), "SGD", "palm oil")
                .unwrap();
            book.transition(trade.id, TradeStatus::SellerConfirmed, &seller, None)
                .unwrap();
            let doc = registry
                .register_document(
                    &seller,
                    Some(trade.id),
                    DocumentType::BillOfLading,
                    "BL-77",
                    "bl.pdf",
                    b"first",
                    None,
                )
                .await
                .unwrap();
            let updated = registry
                .update_document(&seller, doc.id, UpdateMode::Append, b"second")
                .await
                .unwrap();
            registry.mark_verified(&bank, doc.id).unwrap();
            (trade.id, doc.id, updated.file_hash)
        };

        let ledger = Arc::new(LedgerStore::open(&path).unwrap());
        let book = Arc::new(TradeBook::replay(Arc::clone(&ledger)).unwrap());
        let registry = DocumentRegistry::replay(
            Arc::clone(&book),
            Arc::clone(&ledger),
            Arc::clone(&storage) as Arc<dyn ObjectStore>,
        )
        .unwrap();

        let doc = registry.get(&buyer, doc_id).unwrap();
        assert_eq!(doc.trade_id, Some(trade_id));
        assert_eq!(doc.doc_number, "BL-77");
        assert_eq!(doc.file_hash, final_hash);
        assert_eq!(doc.file_size, b"first\nsecond".len() as u64);
        assert_eq!(doc.uploaded_by, seller.user_id);
        assert_eq!(doc.verified_by, Some(bank.user_id));

        // Verification state survives, so updates stay blocked.
        let result = registry
            .update_document(&seller, doc_id, UpdateMode::Overwrite, b"late")
            .await;
        assert!(matches!(result, Err(DomainError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_empty_payloads_rejected() {
        let f = fixture();
        let result = f
            .registry
            .register_document(
                &f.seller,
                Some(f.trade_id),
                DocumentType::Invoice,
                "INV-001",
                "empty.pdf",
                b"",
                None,
            )
            .await;
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));

        let doc = upload(&f, "INV-002", b"content").await;
        let result = f
            .registry
            .update_document(&f.seller, doc.id, UpdateMode::Append, b"")
            .await;
        assert!(matches!(result, Err(DomainError::InvalidArgument(_))));
    }
}
