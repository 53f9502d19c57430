//! The integrity check runner
//!
//! Re-reads every registered document from object storage, re-hashes it
//! and compares against the registry's fingerprint. Checks fan out over a
//! bounded number of concurrent fetches, each under its own timeout, and
//! one document's failure never stops the rest of the run.

use std::sync::Arc;
use std::time::Duration;

use chaindocs_core::{AlertId, CheckId, DomainError, DomainResult, Identity};
use chaindocs_gate as gate;
use chaindocs_ledger::{LedgerAction, LedgerStore, NewEntry};
use chaindocs_registry::{sha256_hex, Document, DocumentRegistry, ObjectStore, StorageError};
use chrono::Utc;
use serde_json::json;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::records::{truncated, Alert, AlertStatus, AlertType, Finding, FindingStatus, RunSummary};
use crate::store::AlertStore;

#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// How many documents are fetched and hashed at once.
    pub max_concurrency: usize,
    /// Budget for fetching and hashing a single document.
    pub per_document_timeout: Duration,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            per_document_timeout: Duration::from_secs(10),
        }
    }
}

/// The integrity verifier. Admin-only entry point.
pub struct IntegrityVerifier {
    registry: Arc<DocumentRegistry>,
    storage: Arc<dyn ObjectStore>,
    ledger: Arc<LedgerStore>,
    alerts: Arc<AlertStore>,
    config: VerifierConfig,
}

impl IntegrityVerifier {
    pub fn new(
        registry: Arc<DocumentRegistry>,
        storage: Arc<dyn ObjectStore>,
        ledger: Arc<LedgerStore>,
        alerts: Arc<AlertStore>,
        config: VerifierConfig,
    ) -> Self {
        Self {
            registry,
            storage,
            ledger,
            alerts,
            config,
        }
    }

    /// Run a full integrity check over every registered document.
    ///
    /// Each mismatch or missing object raises a fresh critical alert, so
    /// repeated runs over an unresolved problem keep raising; the alert
    /// count is a measure of how long the problem has stood. A hash
    /// mismatch additionally lands an `INTEGRITY_FAILED` entry in the
    /// document's audit trail.
    pub async fn run(&self, actor: &Identity) -> DomainResult<RunSummary> {
        gate::require_admin(actor)?;

        let check_id = CheckId::generate();
        let started_at = Utc::now();
        let documents = self.registry.all_documents();
        let total = documents.len();
        tracing::info!(check = %check_id, total, "integrity check started");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut set = JoinSet::new();

        for (index, doc) in documents.into_iter().enumerate() {
            let storage = Arc::clone(&self.storage);
            let semaphore = Arc::clone(&semaphore);
            let budget = self.config.per_document_timeout;
            set.spawn(async move {
                // Closing the semaphore is not part of this design; a
                // failed acquire still yields a finding.
                let _permit = semaphore.acquire_owned().await;
                (index, check_document(storage, doc, budget).await)
            });
        }

        let mut findings: Vec<(usize, Finding)> = Vec::with_capacity(total);
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(pair) => findings.push(pair),
                Err(e) => {
                    tracing::error!(check = %check_id, error = %e, "check task panicked");
                }
            }
        }
        findings.sort_by_key(|(index, _)| *index);
        let findings: Vec<Finding> = findings.into_iter().map(|(_, f)| f).collect();

        let mut verified = 0;
        let mut modified = 0;
        let mut missing = 0;
        let mut access_error = 0;

        for finding in &findings {
            match finding.status {
                FindingStatus::Passed => {
                    verified += 1;
                    continue;
                }
                FindingStatus::Failed if finding.computed_hash.is_some() => {
                    modified += 1;
                    self.raise(check_id, finding, AlertType::FileModified)?;
                    self.record_tamper(check_id, actor, finding)?;
                }
                FindingStatus::Failed => {
                    missing += 1;
                    self.raise(check_id, finding, AlertType::FileMissing)?;
                }
                FindingStatus::Pending => {
                    access_error += 1;
                    self.raise(check_id, finding, AlertType::AccessError)?;
                }
            }
            tracing::warn!(
                check = %check_id,
                document = %finding.document_id,
                status = %finding.status,
                detail = %finding.detail,
                "integrity finding"
            );
        }

        let summary = RunSummary {
            check_id,
            started_at,
            finished_at: Utc::now(),
            total,
            verified,
            modified,
            missing,
            access_error,
            findings,
        };
        self.alerts
            .save_run(&summary)
            .map_err(|e| DomainError::StorageUnavailable(e.to_string()))?;

        tracing::info!(
            check = %check_id,
            verified, modified, missing, access_error,
            "integrity check finished"
        );
        Ok(summary)
    }

    fn raise(&self, check_id: CheckId, finding: &Finding, alert_type: AlertType) -> DomainResult<()> {
        let alert = Alert {
            id: AlertId::generate(),
            check_id,
            document_id: finding.document_id,
            trade_id: finding.trade_id,
            alert_type,
            severity: alert_type.severity(),
            message: finding.detail.clone(),
            status: AlertStatus::Active,
            created_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
        };
        self.alerts
            .save(&alert)
            .map_err(|e| DomainError::StorageUnavailable(e.to_string()))
    }

    fn record_tamper(
        &self,
        check_id: CheckId,
        actor: &Identity,
        finding: &Finding,
    ) -> DomainResult<()> {
        let mut entry = NewEntry::for_document(
            finding.document_id,
            LedgerAction::IntegrityFailed,
            actor.user_id,
            actor.role,
        )
        .with_metadata(json!({
            "check_id": check_id.to_string(),
            "hash_before": finding.expected_hash,
            "hash_after": finding.computed_hash,
        }));
        if let Some(trade_id) = finding.trade_id {
            entry = entry.with_trade(trade_id);
        }
        self.ledger
            .append(entry)
            .map_err(|e| DomainError::StorageUnavailable(e.to_string()))?;
        Ok(())
    }
}

async fn check_document(
    storage: Arc<dyn ObjectStore>,
    doc: Document,
    budget: Duration,
) -> Finding {
    let expected = doc.file_hash.clone();
    let fetched = timeout(budget, storage.get(&doc.storage_key)).await;

    let (status, computed_hash, detail) = match fetched {
        Ok(Ok(bytes)) => {
            let computed = sha256_hex(&bytes);
            if computed == expected {
                (FindingStatus::Passed, Some(computed), "hash verified".to_string())
            } else {
                let detail = format!(
                    "hash mismatch: expected {}, found {}",
                    truncated(&expected),
                    truncated(&computed)
                );
                (FindingStatus::Failed, Some(computed), detail)
            }
        }
        Ok(Err(StorageError::NotFound(_))) => (
            FindingStatus::Failed,
            None,
            format!("stored object missing for {}", doc.file_name),
        ),
        Ok(Err(StorageError::Unavailable(msg))) => (
            FindingStatus::Pending,
            None,
            format!("storage unreachable: {msg}"),
        ),
        Err(_) => (
            FindingStatus::Pending,
            None,
            format!("check timed out after {}ms", budget.as_millis()),
        ),
    };

    Finding {
        document_id: doc.id,
        trade_id: doc.trade_id,
        status,
        expected_hash: expected,
        computed_hash,
        detail,
    }
}
