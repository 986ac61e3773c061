//! Bulk fetch and insert for pattern metadata, triggers, and vocabulary.

use libsql::Connection;
use std::collections::HashMap;

use apex_core::error::{Error, Result};
use apex_core::types::pattern::{
    PatternMetadataRecord, PatternTrigger, PatternVocabTerm, TriggerType,
};

use crate::{ApexStorage, storage_err};

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn id_params(ids: &[String]) -> Vec<libsql::Value> {
    ids.iter().map(|id| id.clone().into()).collect()
}

impl ApexStorage {
    /// Bulk-fetch metadata records for a set of pattern ids.
    pub async fn get_metadata(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<PatternMetadataRecord>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.connect()?;
        let sql = format!(
            "SELECT pattern_id, key, value FROM pattern_metadata \
             WHERE pattern_id IN ({}) ORDER BY pattern_id, key",
            placeholders(ids.len())
        );
        let mut rows = conn
            .query(&sql, id_params(ids))
            .await
            .map_err(|e| storage_err("get_metadata", e))?;

        let mut result: HashMap<String, Vec<PatternMetadataRecord>> = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_err("get_metadata", e))? {
            let pattern_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let key: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let value_json: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            let value = serde_json::from_str(&value_json)
                .unwrap_or(serde_json::Value::String(value_json));
            result
                .entry(pattern_id.clone())
                .or_default()
                .push(PatternMetadataRecord {
                    pattern_id,
                    key,
                    value,
                });
        }
        Ok(result)
    }

    /// Bulk-fetch triggers for a set of pattern ids, highest priority first.
    pub async fn get_triggers(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<PatternTrigger>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.connect()?;
        let sql = format!(
            "SELECT pattern_id, trigger_type, trigger_value, priority \
             FROM pattern_triggers WHERE pattern_id IN ({}) \
             ORDER BY pattern_id, priority DESC",
            placeholders(ids.len())
        );
        let mut rows = conn
            .query(&sql, id_params(ids))
            .await
            .map_err(|e| storage_err("get_triggers", e))?;

        let mut result: HashMap<String, Vec<PatternTrigger>> = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_err("get_triggers", e))? {
            let pattern_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let trigger_type: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let trigger_value: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            let priority: i64 = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
            result
                .entry(pattern_id.clone())
                .or_default()
                .push(PatternTrigger {
                    pattern_id,
                    trigger_type: TriggerType::parse(&trigger_type).map_err(|_| {
                        Error::Internal(format!("corrupted trigger type: {trigger_type}"))
                    })?,
                    trigger_value,
                    priority,
                });
        }
        Ok(result)
    }

    /// Bulk-fetch vocabulary terms for a set of pattern ids.
    pub async fn get_vocab(
        &self,
        ids: &[String],
    ) -> Result<HashMap<String, Vec<PatternVocabTerm>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.connect()?;
        let sql = format!(
            "SELECT pattern_id, term, term_type, weight FROM pattern_vocab \
             WHERE pattern_id IN ({}) ORDER BY pattern_id, weight DESC",
            placeholders(ids.len())
        );
        let mut rows = conn
            .query(&sql, id_params(ids))
            .await
            .map_err(|e| storage_err("get_vocab", e))?;

        let mut result: HashMap<String, Vec<PatternVocabTerm>> = HashMap::new();
        while let Some(row) = rows.next().await.map_err(|e| storage_err("get_vocab", e))? {
            let pattern_id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
            let term: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
            let term_type: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
            let weight: f64 = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
            result
                .entry(pattern_id.clone())
                .or_default()
                .push(PatternVocabTerm {
                    pattern_id,
                    term,
                    term_type,
                    weight,
                });
        }
        Ok(result)
    }

    /// Upsert one metadata record.
    pub async fn put_metadata(&self, record: &PatternMetadataRecord) -> Result<()> {
        let conn = self.connect()?;
        put_metadata_on(&conn, record).await
    }

    /// Insert one trigger row.
    pub async fn put_trigger(&self, trigger: &PatternTrigger) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO pattern_triggers (pattern_id, trigger_type, trigger_value, priority) \
             VALUES (?, ?, ?, ?)",
            libsql::params![
                trigger.pattern_id.clone(),
                trigger.trigger_type.as_str(),
                trigger.trigger_value.clone(),
                trigger.priority,
            ],
        )
        .await
        .map_err(|e| storage_err("put_trigger", e))?;
        Ok(())
    }

    /// Insert one vocabulary term.
    pub async fn put_vocab_term(&self, term: &PatternVocabTerm) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO pattern_vocab (pattern_id, term, term_type, weight) \
             VALUES (?, ?, ?, ?)",
            libsql::params![
                term.pattern_id.clone(),
                term.term.clone(),
                term.term_type.clone(),
                term.weight,
            ],
        )
        .await
        .map_err(|e| storage_err("put_vocab_term", e))?;
        Ok(())
    }
}

/// Transaction-scoped metadata upsert.
pub(crate) async fn put_metadata_on(
    conn: &Connection,
    record: &PatternMetadataRecord,
) -> Result<()> {
    let value_json = serde_json::to_string(&record.value).map_err(Error::Serialization)?;
    conn.execute(
        "INSERT OR REPLACE INTO pattern_metadata (pattern_id, key, value) VALUES (?, ?, ?)",
        libsql::params![record.pattern_id.clone(), record.key.clone(), value_json],
    )
    .await
    .map_err(|e| storage_err("put_metadata", e))?;
    Ok(())
}
