//! Reflection persistence: content hashing and the single-transaction apply.

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use apex_core::error::{Error, Result};
use apex_core::types::pattern::{Pattern, PatternMetadataRecord};
use apex_core::types::reflection::{AuditEvent, Claims, Reflection};

use crate::audit::store_audit_event_on;
use crate::metadata::put_metadata_on;
use crate::patterns::{record_usage_on, update_trust_on, upsert_pattern_on};
use crate::{ApexStorage, storage_err};

/// One precomputed trust write inside a reflection apply.
///
/// `(alpha, beta)` are the new absolute parameters; the pipeline pre-reads
/// the old ones before the transaction opens.
#[derive(Debug, Clone)]
pub struct TrustWrite {
    /// Resolved pattern id (aliases already mapped)
    pub pattern_id: String,
    /// New alpha
    pub alpha: f64,
    /// New beta
    pub beta: f64,
    /// Derived trust score
    pub trust_score: f64,
    /// Whether to bump the usage counter
    pub record_usage: bool,
    /// Whether the usage counts as a success
    pub success: bool,
}

/// Everything a validated reflection writes, applied in one transaction.
#[derive(Debug, Clone)]
pub struct ReflectionApply {
    /// The reflection record itself
    pub reflection: Reflection,
    /// Trust parameter writes
    pub trust_writes: Vec<TrustWrite>,
    /// New and anti patterns to insert
    pub new_patterns: Vec<Pattern>,
    /// Metadata rows accompanying new patterns
    pub metadata: Vec<PatternMetadataRecord>,
    /// One `pattern_used` event per used pattern
    pub audit_events: Vec<AuditEvent>,
}

/// Content hash over `(task_id, claims)` used for idempotence.
///
/// Struct field order is fixed and `serde_json` object keys serialize
/// sorted, so equal claims always hash equal regardless of the JSON key
/// order they arrived in.
pub fn claims_content_hash(task_id: &str, claims: &Claims) -> Result<String> {
    let claims_json = serde_json::to_string(claims).map_err(Error::Serialization)?;
    let mut hasher = Sha256::new();
    hasher.update(task_id.as_bytes());
    hasher.update(b"\x1f");
    hasher.update(claims_json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

impl ApexStorage {
    /// Whether a reflection with this content hash was already applied.
    pub async fn reflection_seen(&self, task_id: &str, content_hash: &str) -> Result<bool> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT 1 FROM reflections WHERE task_id = ? AND content_hash = ?",
                libsql::params![task_id, content_hash],
            )
            .await
            .map_err(|e| storage_err("reflection_seen", e))?;
        Ok(rows
            .next()
            .await
            .map_err(|e| storage_err("reflection_seen", e))?
            .is_some())
    }

    /// Apply a validated reflection in one transaction.
    ///
    /// Stores the reflection record, writes trust parameters, inserts new
    /// and anti patterns with their metadata, and writes one audit event
    /// per used pattern. Returns `false` without side effects when the
    /// same `(task_id, content_hash)` was already applied. Any failure
    /// rolls the whole transaction back.
    pub async fn apply_reflection(&self, apply: &ReflectionApply) -> Result<bool> {
        let conn = self.connect()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| storage_err("apply_reflection begin", e))?;

        let reflection = &apply.reflection;

        // Idempotency gate inside the transaction: a concurrent duplicate
        // either sees our row or we see theirs.
        {
            let mut rows = tx
                .query(
                    "SELECT 1 FROM reflections WHERE task_id = ? AND content_hash = ?",
                    libsql::params![
                        reflection.task_id.clone(),
                        reflection.content_hash.clone()
                    ],
                )
                .await
                .map_err(|e| storage_err("apply_reflection dedup", e))?;
            if rows
                .next()
                .await
                .map_err(|e| storage_err("apply_reflection dedup", e))?
                .is_some()
            {
                debug!(
                    task_id = %reflection.task_id,
                    "duplicate reflection, returning without side effects"
                );
                return Ok(false);
            }
        }

        let claims_json =
            serde_json::to_string(&reflection.claims).map_err(Error::Serialization)?;
        let artifacts_json =
            serde_json::to_string(&reflection.artifacts).map_err(Error::Serialization)?;
        tx.execute(
            "INSERT INTO reflections (id, task_id, content_hash, outcome, claims, artifacts, received_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            libsql::params![
                reflection.id.clone(),
                reflection.task_id.clone(),
                reflection.content_hash.clone(),
                reflection.outcome.as_str(),
                claims_json,
                artifacts_json,
                reflection.received_at.timestamp(),
            ],
        )
        .await
        .map_err(|e| storage_err("apply_reflection insert", e))?;

        for write in &apply.trust_writes {
            update_trust_on(&tx, &write.pattern_id, write.alpha, write.beta, write.trust_score)
                .await?;
            if write.record_usage {
                record_usage_on(&tx, &write.pattern_id, write.success).await?;
            }
        }

        for pattern in &apply.new_patterns {
            upsert_pattern_on(&tx, pattern).await?;
        }
        for record in &apply.metadata {
            put_metadata_on(&tx, record).await?;
        }

        for event in &apply.audit_events {
            store_audit_event_on(&tx, event).await?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_err("apply_reflection commit", e))?;
        info!(
            task_id = %reflection.task_id,
            trust_writes = apply.trust_writes.len(),
            new_patterns = apply.new_patterns.len(),
            "reflection applied"
        );
        Ok(true)
    }

    /// Fetch a stored reflection by task and hash; used by tests.
    pub async fn get_reflection(
        &self,
        task_id: &str,
        content_hash: &str,
    ) -> Result<Option<Reflection>> {
        let conn = self.connect()?;
        let mut rows = conn
            .query(
                "SELECT id, task_id, content_hash, outcome, claims, artifacts, received_at \
                 FROM reflections WHERE task_id = ? AND content_hash = ?",
                libsql::params![task_id, content_hash],
            )
            .await
            .map_err(|e| storage_err("get_reflection", e))?;
        let Some(row) = rows
            .next()
            .await
            .map_err(|e| storage_err("get_reflection", e))?
        else {
            return Ok(None);
        };

        let id: String = row.get(0).map_err(|e| Error::Storage(e.to_string()))?;
        let task_id: String = row.get(1).map_err(|e| Error::Storage(e.to_string()))?;
        let content_hash: String = row.get(2).map_err(|e| Error::Storage(e.to_string()))?;
        let outcome: String = row.get(3).map_err(|e| Error::Storage(e.to_string()))?;
        let claims_json: String = row.get(4).map_err(|e| Error::Storage(e.to_string()))?;
        let artifacts_json: String = row.get(5).map_err(|e| Error::Storage(e.to_string()))?;
        let received_at: i64 = row.get(6).map_err(|e| Error::Storage(e.to_string()))?;

        Ok(Some(Reflection {
            id,
            task_id,
            content_hash,
            outcome: apex_core::types::reflection::ReflectionOutcome::parse(&outcome)
                .map_err(|_| Error::Internal(format!("corrupted outcome: {outcome}")))?,
            claims: serde_json::from_str(&claims_json)
                .map_err(|e| Error::Internal(format!("corrupted claims: {e}")))?,
            artifacts: serde_json::from_str(&artifacts_json)
                .map_err(|e| Error::Internal(format!("corrupted artifacts: {e}")))?,
            received_at: crate::timestamp_from_epoch(received_at),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apex_core::types::reflection::{PatternUsage, TrustUpdate};

    #[test]
    fn test_content_hash_stable_across_equivalent_claims() {
        let claims = Claims {
            patterns_used: vec![PatternUsage {
                pattern_id: "PAT:X".to_string(),
                evidence: vec![],
                notes: None,
            }],
            trust_updates: vec![TrustUpdate {
                pattern_id: "PAT:X".to_string(),
                outcome: "worked-perfectly".to_string(),
            }],
            ..Default::default()
        };
        let a = claims_content_hash("T1", &claims).unwrap();
        let b = claims_content_hash("T1", &claims.clone()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_distinguishes_tasks() {
        let claims = Claims::default();
        let a = claims_content_hash("T1", &claims).unwrap();
        let b = claims_content_hash("T2", &claims).unwrap();
        assert_ne!(a, b);
    }
}
