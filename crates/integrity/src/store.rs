//! SQLite storage for alerts and check runs

use std::path::Path;
use std::str::FromStr;
use std::sync::Mutex;

use chaindocs_core::{AlertId, CheckId, DocumentId, TradeId, UserId};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use thiserror::Error;

use crate::records::{Alert, AlertStatus, AlertType, Finding, RunSummary, Severity};

/// Errors from the alert store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Alert not found: {0}")]
    NotFound(String),

    #[error("Invalid alert state: {0}")]
    InvalidState(String),
}

/// SQLite storage for alerts and check-run summaries.
///
/// The connection sits behind a mutex so the store can be shared across
/// the verifier and the command surface.
pub struct AlertStore {
    conn: Mutex<Connection>,
}

impl AlertStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS alerts (
                id TEXT PRIMARY KEY,
                check_id TEXT NOT NULL,
                document_id TEXT NOT NULL,
                trade_id TEXT,
                alert_type TEXT NOT NULL,
                severity TEXT NOT NULL,
                message TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                acknowledged_by TEXT,
                acknowledged_at TEXT,
                resolved_by TEXT,
                resolved_at TEXT,
                resolution_notes TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_alerts_status ON alerts(status)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_alerts_document ON alerts(document_id)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS check_runs (
                id TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                finished_at TEXT NOT NULL,
                total INTEGER NOT NULL,
                verified INTEGER NOT NULL,
                modified INTEGER NOT NULL,
                missing INTEGER NOT NULL,
                access_error INTEGER NOT NULL,
                findings_json TEXT NOT NULL
            )",
            [],
        )?;

        Ok(())
    }

    pub fn save(&self, alert: &Alert) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO alerts
             (id, check_id, document_id, trade_id, alert_type, severity, message, status,
              created_at, acknowledged_by, acknowledged_at, resolved_by, resolved_at,
              resolution_notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                alert.id.to_string(),
                alert.check_id.to_string(),
                alert.document_id.to_string(),
                alert.trade_id.map(|t| t.to_string()),
                alert.alert_type.to_string(),
                alert.severity.to_string(),
                alert.message,
                alert.status.to_string(),
                alert.created_at.to_rfc3339(),
                alert.acknowledged_by.map(|u| u.to_string()),
                alert.acknowledged_at.map(|t| t.to_rfc3339()),
                alert.resolved_by.map(|u| u.to_string()),
                alert.resolved_at.map(|t| t.to_rfc3339()),
                alert.resolution_notes,
            ],
        )?;
        Ok(())
    }

    pub fn get(&self, id: AlertId) -> Result<Alert, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, check_id, document_id, trade_id, alert_type, severity, message, status,
                    created_at, acknowledged_by, acknowledged_at, resolved_by, resolved_at,
                    resolution_notes
             FROM alerts WHERE id = ?1",
        )?;

        let row = stmt
            .query_row(params![id.to_string()], row_to_alert)
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(id.to_string()),
                other => StoreError::Database(other),
            })?;
        Ok(row)
    }

    pub fn list_by_status(&self, status: AlertStatus) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, check_id, document_id, trade_id, alert_type, severity, message, status,
                    created_at, acknowledged_by, acknowledged_at, resolved_by, resolved_at,
                    resolution_notes
             FROM alerts WHERE status = ?1 ORDER BY created_at DESC",
        )?;
        let alerts = stmt
            .query_map(params![status.to_string()], row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    pub fn list_all(&self) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, check_id, document_id, trade_id, alert_type, severity, message, status,
                    created_at, acknowledged_by, acknowledged_at, resolved_by, resolved_at,
                    resolution_notes
             FROM alerts ORDER BY created_at DESC",
        )?;
        let alerts = stmt
            .query_map([], row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    pub fn list_for_document(&self, document_id: DocumentId) -> Result<Vec<Alert>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, check_id, document_id, trade_id, alert_type, severity, message, status,
                    created_at, acknowledged_by, acknowledged_at, resolved_by, resolved_at,
                    resolution_notes
             FROM alerts WHERE document_id = ?1 ORDER BY created_at DESC",
        )?;
        let alerts = stmt
            .query_map(params![document_id.to_string()], row_to_alert)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(alerts)
    }

    /// Move an active alert to acknowledged.
    pub fn acknowledge(&self, id: AlertId, by: UserId) -> Result<Alert, StoreError> {
        let alert = self.get(id)?;
        if alert.status != AlertStatus::Active {
            return Err(StoreError::InvalidState(format!(
                "alert {id} is {} and cannot be acknowledged",
                alert.status
            )));
        }

        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE alerts SET status = ?1, acknowledged_by = ?2, acknowledged_at = ?3
             WHERE id = ?4",
            params![
                AlertStatus::Acknowledged.to_string(),
                by.to_string(),
                now.to_rfc3339(),
                id.to_string(),
            ],
        )?;
        drop(conn);
        self.get(id)
    }

    /// Move an active or acknowledged alert to resolved, recording what
    /// was done about it.
    pub fn resolve(
        &self,
        id: AlertId,
        by: UserId,
        notes: Option<&str>,
    ) -> Result<Alert, StoreError> {
        let alert = self.get(id)?;
        if alert.status == AlertStatus::Resolved {
            return Err(StoreError::InvalidState(format!(
                "alert {id} is already resolved"
            )));
        }

        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE alerts SET status = ?1, resolved_by = ?2, resolved_at = ?3,
                    resolution_notes = ?4
             WHERE id = ?5",
            params![
                AlertStatus::Resolved.to_string(),
                by.to_string(),
                now.to_rfc3339(),
                notes,
                id.to_string(),
            ],
        )?;
        drop(conn);
        self.get(id)
    }

    pub fn count_by_status(&self, status: AlertStatus) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alerts WHERE status = ?1",
            params![status.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn save_run(&self, run: &RunSummary) -> Result<(), StoreError> {
        let findings_json = serde_json::to_string(&run.findings)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO check_runs
             (id, started_at, finished_at, total, verified, modified, missing, access_error,
              findings_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                run.check_id.to_string(),
                run.started_at.to_rfc3339(),
                run.finished_at.to_rfc3339(),
                run.total as i64,
                run.verified as i64,
                run.modified as i64,
                run.missing as i64,
                run.access_error as i64,
                findings_json,
            ],
        )?;
        Ok(())
    }

    pub fn list_runs(&self) -> Result<Vec<RunSummary>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, started_at, finished_at, total, verified, modified, missing,
                    access_error, findings_json
             FROM check_runs ORDER BY started_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, i64>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        drop(stmt);
        drop(conn);

        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let findings: Vec<Finding> = serde_json::from_str(&row.8)?;
            runs.push(RunSummary {
                check_id: parse_id::<CheckId>(&row.0)?,
                started_at: parse_time(&row.1)?,
                finished_at: parse_time(&row.2)?,
                total: row.3 as usize,
                verified: row.4 as usize,
                modified: row.5 as usize,
                missing: row.6 as usize,
                access_error: row.7 as usize,
                findings,
            });
        }
        Ok(runs)
    }
}

fn row_to_alert(row: &rusqlite::Row<'_>) -> rusqlite::Result<Alert> {
    let id: String = row.get(0)?;
    let check_id: String = row.get(1)?;
    let document_id: String = row.get(2)?;
    let trade_id: Option<String> = row.get(3)?;
    let alert_type: String = row.get(4)?;
    let severity: String = row.get(5)?;
    let message: String = row.get(6)?;
    let status: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let acknowledged_by: Option<String> = row.get(9)?;
    let acknowledged_at: Option<String> = row.get(10)?;
    let resolved_by: Option<String> = row.get(11)?;
    let resolved_at: Option<String> = row.get(12)?;
    let resolution_notes: Option<String> = row.get(13)?;

    let col = |idx: usize, e: String| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    };

    Ok(Alert {
        id: AlertId::from_str(&id).map_err(|e| col(0, e.to_string()))?,
        check_id: CheckId::from_str(&check_id).map_err(|e| col(1, e.to_string()))?,
        document_id: DocumentId::from_str(&document_id).map_err(|e| col(2, e.to_string()))?,
        trade_id: trade_id
            .map(|s| TradeId::from_str(&s).map_err(|e| col(3, e.to_string())))
            .transpose()?,
        alert_type: AlertType::from_str(&alert_type).map_err(|e| col(4, e.to_string()))?,
        severity: Severity::from_str(&severity).map_err(|e| col(5, e.to_string()))?,
        message,
        status: AlertStatus::from_str(&status).map_err(|e| col(7, e.to_string()))?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map_err(|e| col(8, e.to_string()))?
            .with_timezone(&Utc),
        acknowledged_by: acknowledged_by
            .map(|s| UserId::from_str(&s).map_err(|e| col(9, e.to_string())))
            .transpose()?,
        acknowledged_at: acknowledged_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| col(10, e.to_string()))
            })
            .transpose()?,
        resolved_by: resolved_by
            .map(|s| UserId::from_str(&s).map_err(|e| col(11, e.to_string())))
            .transpose()?,
        resolved_at: resolved_at
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| col(12, e.to_string()))
            })
            .transpose()?,
        resolution_notes,
    })
}

fn parse_id<T: FromStr>(s: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    T::from_str(s).map_err(|e| StoreError::InvalidState(e.to_string()))
}

fn parse_time(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidState(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_alert(alert_type: AlertType) -> Alert {
        Alert {
            id: AlertId::generate(),
            check_id: CheckId::generate(),
            document_id: DocumentId::generate(),
            trade_id: Some(TradeId::generate()),
            alert_type,
            severity: alert_type.severity(),
            message: "hash mismatch".to_string(),
            status: AlertStatus::Active,
            created_at: Utc::now(),
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
        }
    }

    #[test]
    fn test_save_and_get() {
        let store = AlertStore::in_memory().unwrap();
        let alert = sample_alert(AlertType::FileModified);

        store.save(&alert).unwrap();
        let found = store.get(alert.id).unwrap();

        assert_eq!(found.id, alert.id);
        assert_eq!(found.alert_type, AlertType::FileModified);
        assert_eq!(found.severity, Severity::Critical);
        assert_eq!(found.status, AlertStatus::Active);
    }

    #[test]
    fn test_get_missing() {
        let store = AlertStore::in_memory().unwrap();
        assert!(matches!(
            store.get(AlertId::generate()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_acknowledge_then_resolve() {
        let store = AlertStore::in_memory().unwrap();
        let alert = sample_alert(AlertType::FileMissing);
        store.save(&alert).unwrap();
        let admin = UserId::generate();

        let acked = store.acknowledge(alert.id, admin).unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by, Some(admin));
        assert!(acked.acknowledged_at.is_some());

        // Double acknowledge is rejected.
        assert!(matches!(
            store.acknowledge(alert.id, admin),
            Err(StoreError::InvalidState(_))
        ));

        let resolved = store
            .resolve(alert.id, admin, Some("object restored from backup"))
            .unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_by, Some(admin));
        assert_eq!(
            resolved.resolution_notes.as_deref(),
            Some("object restored from backup")
        );

        assert!(matches!(
            store.resolve(alert.id, admin, None),
            Err(StoreError::InvalidState(_))
        ));
    }

    #[test]
    fn test_resolve_directly_from_active() {
        let store = AlertStore::in_memory().unwrap();
        let alert = sample_alert(AlertType::AccessError);
        store.save(&alert).unwrap();

        let resolved = store.resolve(alert.id, UserId::generate(), None).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolution_notes, None);
    }

    #[test]
    fn test_list_and_count_by_status() {
        let store = AlertStore::in_memory().unwrap();
        for _ in 0..3 {
            store.save(&sample_alert(AlertType::FileModified)).unwrap();
        }
        let extra = sample_alert(AlertType::AccessError);
        store.save(&extra).unwrap();
        store.resolve(extra.id, UserId::generate(), None).unwrap();

        assert_eq!(store.count_by_status(AlertStatus::Active).unwrap(), 3);
        assert_eq!(store.count_by_status(AlertStatus::Resolved).unwrap(), 1);
        assert_eq!(store.list_by_status(AlertStatus::Active).unwrap().len(), 3);
        assert_eq!(store.list_all().unwrap().len(), 4);
    }

    #[test]
    fn test_list_for_document() {
        let store = AlertStore::in_memory().unwrap();
        let alert = sample_alert(AlertType::FileModified);
        store.save(&alert).unwrap();
        store.save(&sample_alert(AlertType::FileModified)).unwrap();

        let found = store.list_for_document(alert.document_id).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, alert.id);
    }

    #[test]
    fn test_run_summaries_roundtrip() {
        let store = AlertStore::in_memory().unwrap();
        let run = RunSummary {
            check_id: CheckId::generate(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            total: 3,
            verified: 2,
            modified: 1,
            missing: 0,
            access_error: 0,
            findings: vec![],
        };
        store.save_run(&run).unwrap();

        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].check_id, run.check_id);
        assert_eq!(runs[0].modified, 1);
        assert!(!runs[0].is_clean());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alerts.db");

        let alert = sample_alert(AlertType::FileMissing);
        {
            let store = AlertStore::new(&path).unwrap();
            store.save(&alert).unwrap();
        }

        let store = AlertStore::new(&path).unwrap();
        let found = store.get(alert.id).unwrap();
        assert_eq!(found.alert_type, AlertType::FileMissing);
    }
}
