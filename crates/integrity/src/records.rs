//! Alert and check-run records

use chaindocs_core::{AlertId, CheckId, DocumentId, TradeId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Shorten a hex fingerprint for human-facing messages.
pub fn truncated(hash: &str) -> String {
    if hash.len() <= 16 {
        hash.to_string()
    } else {
        format!("{}...", &hash[..16])
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// What kind of problem an alert reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    /// Stored bytes no longer match the recorded fingerprint.
    FileModified,
    /// The stored object is gone.
    FileMissing,
    /// The object store could not be read.
    AccessError,
}

impl AlertType {
    pub fn severity(&self) -> Severity {
        match self {
            AlertType::FileModified | AlertType::FileMissing => Severity::Critical,
            AlertType::AccessError => Severity::Medium,
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

/// One raised alert.
///
/// Alerts are never deduplicated: every check run that sees a problem
/// raises a fresh one, so the alert count reflects how long an issue has
/// been standing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertId,
    pub check_id: CheckId,
    pub document_id: DocumentId,
    pub trade_id: Option<TradeId>,
    pub alert_type: AlertType,
    pub severity: Severity,
    pub message: String,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub acknowledged_by: Option<UserId>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<UserId>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
}

/// Per-document outcome within a check run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingStatus {
    Passed,
    Failed,
    /// The outcome could not be determined this run, usually a storage
    /// read failure or timeout. A confirmed-missing object is `Failed`.
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub document_id: DocumentId,
    pub trade_id: Option<TradeId>,
    pub status: FindingStatus,
    pub expected_hash: String,
    /// `None` when the object was missing or unreadable.
    pub computed_hash: Option<String>,
    pub detail: String,
}

/// Aggregate outcome of one check run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub check_id: CheckId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub verified: usize,
    pub modified: usize,
    pub missing: usize,
    pub access_error: usize,
    pub findings: Vec<Finding>,
}

impl RunSummary {
    /// A run is clean when every document verified.
    pub fn is_clean(&self) -> bool {
        self.verified == self.total
    }
}
