//! Task, evidence, checkpoint, and handoff persistence.

use libsql::{Connection, Row};
use tracing::debug;
use uuid::Uuid;

use apex_core::error::{Error, Result};
use apex_core::types::task::{
    Checkpoint, EvidenceType, Phase, PhaseHandoff, Task, TaskBrief, TaskEvidence, TaskStatus,
    TaskType,
};

use crate::{ApexStorage, storage_err, timestamp_from_epoch};

/// Column list shared by every task SELECT.
const TASK_COLUMNS: &str = "id, identifier, title, intent, task_type, tags, status, phase, \
     confidence, files_touched, errors_encountered, in_flight, phase_handoffs, brief, \
     created_at, updated_at";

/// Filter for `find`-style task queries.
#[derive(Debug, Clone, Default)]
pub struct TaskQuery {
    /// Match the external identifier exactly
    pub identifier: Option<String>,
    /// Case-insensitive title substring
    pub title_contains: Option<String>,
    /// Restrict to one status
    pub status: Option<TaskStatus>,
    /// Restrict to one task type
    pub task_type: Option<TaskType>,
    /// Row cap
    pub limit: u64,
}

fn parse_json_column<T: serde::de::DeserializeOwned>(raw: &str, what: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| Error::Internal(format!("corrupted {what}: {e}")))
}

/// Migrate a legacy handoff mapping (`{"BUILDER": "note", ...}`) into the
/// ordered list form. Entries are ordered by phase rank; timestamps fall
/// back to the row's `updated_at`.
fn migrate_handoffs(raw: &str, updated_at: chrono::DateTime<chrono::Utc>) -> Result<Vec<PhaseHandoff>> {
    let value: serde_json::Value = parse_json_column(raw, "phase_handoffs")?;
    match value {
        serde_json::Value::Array(_) => {
            serde_json::from_value(value)
                .map_err(|e| Error::Internal(format!("corrupted phase_handoffs: {e}")))
        }
        serde_json::Value::Object(map) => {
            let mut entries: Vec<PhaseHandoff> = Vec::new();
            for (phase_name, handoff) in map {
                let Ok(phase) = Phase::parse(&phase_name) else {
                    continue;
                };
                entries.push(PhaseHandoff {
                    phase,
                    handoff: handoff.as_str().unwrap_or_default().to_string(),
                    timestamp: updated_at,
                });
            }
            entries.sort_by_key(|e| e.phase.rank());
            Ok(entries)
        }
        _ => Ok(Vec::new()),
    }
}

fn row_to_task(row: &Row) -> Result<Task> {
    let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
    let identifier: Option<String> = row.get(1).ok();
    let title: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
    let intent: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
    let task_type: String = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
    let tags_json: String = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
    let status: String = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;
    let phase: String = row.get(7).map_err(|e| Error::Storage(e.to_string()))?;
    let confidence: f64 = row.get(8).map_err(|e| Error::Storage(e.to_string()))?;
    let files_json: String = row.get(9).map_err(|e| Error::Storage(e.to_string()))?;
    let errors_json: String = row.get(10).map_err(|e| Error::Storage(e.to_string()))?;
    let in_flight_json: String = row.get(11).map_err(|e| Error::Storage(e.to_string()))?;
    let handoffs_json: String = row.get(12).map_err(|e| Error::Storage(e.to_string()))?;
    let brief_json: String = row.get(13).map_err(|e| Error::Storage(e.to_string()))?;
    let created_at: i64 = row.get(14).map_err(|e| Error::Storage(e.to_string()))?;
    let updated_at: i64 = row.get(15).map_err(|e| Error::Storage(e.to_string()))?;

    let updated = timestamp_from_epoch(updated_at);
    Ok(Task {
        id,
        identifier,
        title,
        intent,
        task_type: TaskType::parse(&task_type)
            .map_err(|_| Error::Internal(format!("corrupted task type: {task_type}")))?,
        tags: parse_json_column(&tags_json, "tags")?,
        status: TaskStatus::parse(&status)
            .map_err(|_| Error::Internal(format!("corrupted status: {status}")))?,
        phase: Phase::parse(&phase)
            .map_err(|_| Error::Internal(format!("corrupted phase: {phase}")))?,
        confidence,
        files_touched: parse_json_column(&files_json, "files_touched")?,
        errors_encountered: parse_json_column(&errors_json, "errors_encountered")?,
        in_flight: parse_json_column(&in_flight_json, "in_flight")?,
        phase_handoffs: migrate_handoffs(&handoffs_json, updated)?,
        brief: parse_json_column(&brief_json, "brief")?,
        created_at: timestamp_from_epoch(created_at),
        updated_at: updated,
    })
}

async fn persist_task(conn: &Connection, task: &Task) -> Result<()> {
    let tags = serde_json::to_string(&task.tags).map_err(Error::Serialization)?;
    let files = serde_json::to_string(&task.files_touched).map_err(Error::Serialization)?;
    let errors =
        serde_json::to_string(&task.errors_encountered).map_err(Error::Serialization)?;
    let in_flight = serde_json::to_string(&task.in_flight).map_err(Error::Serialization)?;
    let handoffs =
        serde_json::to_string(&task.phase_handoffs).map_err(Error::Serialization)?;
    let brief = serde_json::to_string(&task.brief).map_err(Error::Serialization)?;

    conn.execute(
        r#"
        INSERT OR REPLACE INTO tasks (
            id, identifier, title, intent, task_type, tags, status, phase,
            confidence, files_touched, errors_encountered, in_flight,
            phase_handoffs, brief, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, strftime('%s', 'now'))
        "#,
        libsql::params![
            task.id.clone(),
            task.identifier.clone(),
            task.title.clone(),
            task.intent.clone(),
            task.task_type.as_str(),
            tags,
            task.status.as_str(),
            task.phase.as_str(),
            task.confidence,
            files,
            errors,
            in_flight,
            handoffs,
            brief,
            task.created_at.timestamp(),
        ],
    )
    .await
    .map_err(|e| storage_err("persist_task", e))?;
    Ok(())
}

impl ApexStorage {
    /// Insert a new task.
    pub async fn insert_task(&self, task: &Task) -> Result<()> {
        debug!("Inserting task {}", task.id);
        let conn = self.connect()?;
        persist_task(&conn, task).await
    }

    /// Persist an updated task snapshot.
    pub async fn update_task(&self, task: &Task) -> Result<()> {
        let conn = self.connect()?;
        persist_task(&conn, task).await
    }

    /// Fetch one task by id, falling back to the external identifier.
    pub async fn get_task(&self, id_or_identifier: &str) -> Result<Option<Task>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = ? OR identifier = ? LIMIT 1"
        );
        let mut rows = conn
            .query(&sql, libsql::params![id_or_identifier, id_or_identifier])
            .await
            .map_err(|e| storage_err("get_task", e))?;
        match rows.next().await.map_err(|e| storage_err("get_task", e))? {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    /// Find tasks by query, most recently updated first.
    pub async fn find_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>> {
        let conn = self.connect()?;
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();
        if let Some(identifier) = query.identifier.as_deref() {
            clauses.push("identifier = ?");
            params.push(identifier.into());
        }
        if let Some(title) = query.title_contains.as_deref() {
            clauses.push("LOWER(title) LIKE ?");
            params.push(format!("%{}%", title.to_lowercase()).into());
        }
        if let Some(status) = query.status {
            clauses.push("status = ?");
            params.push(status.as_str().into());
        }
        if let Some(task_type) = query.task_type {
            clauses.push("task_type = ?");
            params.push(task_type.as_str().into());
        }
        let where_sql = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let limit = if query.limit == 0 { 20 } else { query.limit };
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM tasks{where_sql} ORDER BY updated_at DESC, id ASC LIMIT ?"
        );
        params.push((limit as i64).into());

        let mut rows = conn
            .query(&sql, params)
            .await
            .map_err(|e| storage_err("find_tasks", e))?;
        let mut tasks = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_err("find_tasks", e))? {
            tasks.push(row_to_task(&row)?);
        }
        Ok(tasks)
    }

    /// The most recently updated active task, if any.
    pub async fn current_task(&self) -> Result<Option<Task>> {
        let found = self
            .find_tasks(&TaskQuery {
                status: Some(TaskStatus::Active),
                limit: 1,
                ..Default::default()
            })
            .await?;
        Ok(found.into_iter().next())
    }

    /// Append a checkpoint line; optionally updates confidence.
    pub async fn append_checkpoint(
        &self,
        task_id: &str,
        checkpoint: Checkpoint,
    ) -> Result<Task> {
        let mut task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        if let Some(confidence) = checkpoint.confidence {
            task.confidence = confidence;
        }
        task.in_flight.push(checkpoint);
        self.update_task(&task).await?;
        Ok(task)
    }

    /// Append a phase handoff entry and move the task to the new phase.
    pub async fn append_handoff(
        &self,
        task_id: &str,
        to: Phase,
        handoff: PhaseHandoff,
    ) -> Result<Task> {
        let mut task = self
            .get_task(task_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {task_id}")))?;
        task.phase_handoffs.push(handoff);
        task.phase = to;
        self.update_task(&task).await?;
        Ok(task)
    }

    /// Append one evidence row.
    pub async fn insert_evidence(&self, evidence: &TaskEvidence) -> Result<()> {
        let conn = self.connect()?;
        let metadata = evidence
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(Error::Serialization)?;
        conn.execute(
            "INSERT INTO task_evidence (id, task_id, evidence_type, content, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            libsql::params![
                evidence.id.clone(),
                evidence.task_id.clone(),
                evidence.evidence_type.as_str(),
                evidence.content.clone(),
                metadata,
                evidence.timestamp.timestamp(),
            ],
        )
        .await
        .map_err(|e| storage_err("insert_evidence", e))?;
        Ok(())
    }

    /// Read a task's evidence log in timestamp order.
    pub async fn get_evidence(&self, task_id: &str, limit: u64) -> Result<Vec<TaskEvidence>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, task_id, evidence_type, content, metadata, created_at \
                 FROM task_evidence WHERE task_id = ? ORDER BY created_at ASC, id ASC LIMIT ?",
                libsql::params![task_id, limit as i64],
            )
            .await
            .map_err(|e| storage_err("get_evidence", e))?;

        let mut evidence = Vec::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_err("get_evidence", e))? {
            let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let task_id: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let evidence_type: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            let content: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
            let metadata_json: Option<String> = row.get(4).ok();
            let created_at: i64 = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
            evidence.push(TaskEvidence {
                id,
                task_id,
                evidence_type: EvidenceType::parse(&evidence_type).map_err(|_| {
                    Error::Internal(format!("corrupted evidence type: {evidence_type}"))
                })?,
                content,
                metadata: metadata_json
                    .map(|raw| serde_json::from_str(&raw))
                    .transpose()
                    .map_err(|e| Error::Internal(format!("corrupted evidence metadata: {e}")))?,
                timestamp: timestamp_from_epoch(created_at),
            });
        }
        Ok(evidence)
    }
}

/// Build a fresh task row with defaults and a generated id.
#[must_use]
pub fn new_task(
    title: String,
    intent: String,
    task_type: TaskType,
    identifier: Option<String>,
    tags: Vec<String>,
    brief: TaskBrief,
) -> Task {
    let now = chrono::Utc::now();
    Task {
        id: format!("T_{}", Uuid::new_v4().simple()),
        identifier,
        title,
        intent,
        task_type,
        tags,
        status: TaskStatus::Active,
        phase: Phase::Architect,
        confidence: 0.5,
        files_touched: Vec::new(),
        errors_encountered: Vec::new(),
        in_flight: Vec::new(),
        phase_handoffs: Vec::new(),
        brief,
        created_at: now,
        updated_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_legacy_handoff_mapping_migrates() {
        let raw = r#"{"BUILDER": "built the thing", "ARCHITECT": "designed it"}"#;
        let migrated = migrate_handoffs(raw, Utc::now()).unwrap();
        assert_eq!(migrated.len(), 2);
        // Ordered by phase rank, not map key order.
        assert_eq!(migrated[0].phase, Phase::Architect);
        assert_eq!(migrated[1].phase, Phase::Builder);
        assert_eq!(migrated[0].handoff, "designed it");
    }

    #[test]
    fn test_ordered_handoff_list_passes_through() {
        let raw = r#"[{"phase":"BUILDER","handoff":"done","timestamp":"2026-01-01T00:00:00Z"}]"#;
        let migrated = migrate_handoffs(raw, Utc::now()).unwrap();
        assert_eq!(migrated.len(), 1);
        assert_eq!(migrated[0].phase, Phase::Builder);
    }

    #[test]
    fn test_new_task_defaults() {
        let task = new_task(
            "t".to_string(),
            "i".to_string(),
            TaskType::Bug,
            None,
            vec![],
            apex_core::brief::basic_brief("i"),
        );
        assert!(task.id.starts_with("T_"));
        assert!(task.id.len() >= 8);
        assert_eq!(task.phase, Phase::Architect);
        assert_eq!(task.status, TaskStatus::Active);
    }
}
