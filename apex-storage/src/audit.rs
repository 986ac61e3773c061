//! Audit trail persistence and anti-pattern candidate gathering.

use libsql::Connection;
use serde::{Deserialize, Serialize};

use apex_core::error::{Error, Result};
use apex_core::types::reflection::{AuditEvent, AuditKind};

use crate::{ApexStorage, storage_err, timestamp_from_epoch};

/// A pattern that accumulated failed uses inside the rolling window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AntiCandidate {
    /// The struggling pattern
    pub pattern_id: String,
    /// Its title
    pub title: String,
    /// Failed uses inside the window
    pub failure_count: u64,
}

/// Transaction-scoped audit event insert.
pub(crate) async fn store_audit_event_on(conn: &Connection, event: &AuditEvent) -> Result<()> {
    let details = serde_json::to_string(&event.details).map_err(Error::Serialization)?;
    conn.execute(
        "INSERT INTO audit_events (task_id, kind, pattern_id, details, created_at) \
         VALUES (?, ?, ?, ?, ?)",
        libsql::params![
            event.task_id.clone(),
            event.kind.as_str(),
            event.pattern_id.clone(),
            details,
            event.timestamp.timestamp(),
        ],
    )
    .await
    .map_err(|e| storage_err("store_audit_event", e))?;
    Ok(())
}

impl ApexStorage {
    /// Append one audit event.
    pub async fn store_audit_event(&self, event: &AuditEvent) -> Result<()> {
        let conn = self.connect()?;
        store_audit_event_on(&conn, event).await
    }

    /// Read a task's audit trail in time order.
    pub async fn get_audit_events(&self, task_id: &str) -> Result<Vec<AuditEvent>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT task_id, kind, pattern_id, details, created_at FROM audit_events \
                 WHERE task_id = ? ORDER BY created_at ASC, id ASC",
                libsql::params![task_id],
            )
            .await
            .map_err(|e| storage_err("get_audit_events", e))?;

        let mut events = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("get_audit_events", e))?
        {
            let task_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let kind: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let pattern_id: Option<String> = row.get(2).ok();
            let details_json: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
            let created_at: i64 = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
            events.push(AuditEvent {
                task_id,
                kind: AuditKind::parse(&kind)?,
                pattern_id,
                details: serde_json::from_str(&details_json)
                    .map_err(|e| Error::Internal(format!("corrupted audit details: {e}")))?,
                timestamp: timestamp_from_epoch(created_at),
            });
        }
        Ok(events)
    }

    /// Gather anti-pattern candidates: patterns whose `pattern_used` events
    /// inside the rolling window carry `success = false`, with their counts.
    pub async fn anti_candidates(&self, window_days: u32) -> Result<Vec<AntiCandidate>> {
        let conn = self.connect()?;
        let cutoff =
            chrono::Utc::now().timestamp() - i64::from(window_days) * 86_400;
        let mut rows = conn
            .query(
                "SELECT a.pattern_id, p.title, COUNT(*) AS failures \
                 FROM audit_events a JOIN patterns p ON p.id = a.pattern_id \
                 WHERE a.kind = 'pattern_used' \
                   AND a.created_at >= ? \
                   AND json_extract(a.details, '$.success') = 0 \
                 GROUP BY a.pattern_id, p.title \
                 ORDER BY failures DESC, a.pattern_id ASC",
                libsql::params![cutoff],
            )
            .await
            .map_err(|e| storage_err("anti_candidates", e))?;

        let mut candidates = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("anti_candidates", e))?
        {
            let pattern_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let title: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let failure_count: i64 = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            candidates.push(AntiCandidate {
                pattern_id,
                title,
                failure_count: failure_count.max(0) as u64,
            });
        }
        Ok(candidates)
    }
}
