//! Integration tests for APEX storage.

use apex_core::types::pattern::{Pattern, PatternTrigger, PatternType, TriggerType};
use apex_core::types::reflection::{
    AuditEvent, AuditKind, Claims, PatternUsage, Reflection, ReflectionArtifacts,
    ReflectionOutcome, TrustUpdate,
};
use apex_core::types::task::{Checkpoint, EvidenceType, Phase, PhaseHandoff, TaskEvidence, TaskType};
use apex_storage::{
    ApexStorage, PatternFilter, PatternOrder, ReflectionApply, TrustWrite, claims_content_hash,
    new_task,
};
use chrono::Utc;

async fn create_test_storage() -> ApexStorage {
    let storage = ApexStorage::in_memory().await.unwrap();
    storage.initialize_schema().await.unwrap();
    storage
}

fn pattern(id: &str, pattern_type: PatternType, title: &str, tags: &[&str]) -> Pattern {
    let mut p = Pattern::new(
        id.to_string(),
        pattern_type,
        title.to_string(),
        format!("{title} summary"),
    );
    p.tags = tags.iter().map(|t| (*t).to_string()).collect();
    p
}

#[tokio::test]
async fn test_store_and_retrieve_pattern() {
    let storage = create_test_storage().await;
    let mut p = pattern("PAT:sqlite01", PatternType::Codebase, "sqlite sync fix", &["sqlite"]);
    p.alias = Some("sqlite-sync".to_string());

    storage.upsert_pattern(&p).await.unwrap();

    let by_id = storage.get_pattern("PAT:sqlite01").await.unwrap().unwrap();
    assert_eq!(by_id.id, p.id);
    assert_eq!(by_id.title, "sqlite sync fix");
    assert_eq!(by_id.tags, vec!["sqlite"]);

    let by_alias = storage.get_pattern("sqlite-sync").await.unwrap().unwrap();
    assert_eq!(by_alias.id, p.id);
}

#[tokio::test]
async fn test_alias_collision_resolves_to_id() {
    let storage = create_test_storage().await;
    let first = pattern("PAT:first001", PatternType::Lang, "first", &[]);
    storage.upsert_pattern(&first).await.unwrap();

    // A second pattern whose alias equals the first pattern's id.
    let mut second = pattern("PAT:second01", PatternType::Lang, "second", &[]);
    second.alias = Some("PAT:first001".to_string());
    storage.upsert_pattern(&second).await.unwrap();

    let resolved = storage.get_pattern("PAT:first001").await.unwrap().unwrap();
    assert_eq!(resolved.id, "PAT:first001");
}

#[tokio::test]
async fn test_list_patterns_with_filter_and_pagination() {
    let storage = create_test_storage().await;
    for i in 0..7 {
        let ty = if i % 2 == 0 {
            PatternType::Lang
        } else {
            PatternType::Test
        };
        let mut p = pattern(&format!("PAT:list{i:04}"), ty, &format!("pattern {i}"), &[]);
        p.trust_score = 0.1 * f64::from(i);
        storage.upsert_pattern(&p).await.unwrap();
    }

    let filter = PatternFilter {
        types: vec![PatternType::Lang],
        ..Default::default()
    };
    assert_eq!(storage.count_patterns(&filter).await.unwrap(), 4);

    let page = storage
        .list_patterns(&filter, PatternOrder::TrustScore, true, 2, 2)
        .await
        .unwrap();
    assert_eq!(page.len(), 2);

    let min_trust = PatternFilter {
        min_trust: Some(0.45),
        ..Default::default()
    };
    assert_eq!(storage.count_patterns(&min_trust).await.unwrap(), 2);
}

#[tokio::test]
async fn test_tag_filter_is_case_insensitive() {
    let storage = create_test_storage().await;
    let p = pattern("PAT:tagged01", PatternType::Lang, "tagged", &["sqlite", "async"]);
    storage.upsert_pattern(&p).await.unwrap();

    let filter = PatternFilter {
        tags: vec!["SQLite".to_string()],
        ..Default::default()
    };
    assert_eq!(storage.count_patterns(&filter).await.unwrap(), 1);

    let both = PatternFilter {
        tags: vec!["SQLITE".to_string(), "Async".to_string()],
        ..Default::default()
    };
    assert_eq!(storage.count_patterns(&both).await.unwrap(), 1);

    let missing = PatternFilter {
        tags: vec!["sqlite".to_string(), "redis".to_string()],
        ..Default::default()
    };
    assert_eq!(storage.count_patterns(&missing).await.unwrap(), 0);
}

#[tokio::test]
async fn test_fts_search_ranks_matches() {
    let storage = create_test_storage().await;
    storage
        .upsert_pattern(&pattern(
            "PAT:match001",
            PatternType::Failure,
            "sqlite database locked recovery",
            &["sqlite"],
        ))
        .await
        .unwrap();
    storage
        .upsert_pattern(&pattern(
            "PAT:other001",
            PatternType::Lang,
            "css flexbox centering",
            &["css"],
        ))
        .await
        .unwrap();

    let hits = storage
        .search_patterns("sqlite locked", &[], &[], 10)
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].pattern.id, "PAT:match001");
    assert!(hits[0].fts_rank.is_some());
    assert!(hits.iter().all(|h| h.pattern.id != "PAT:other001"));
}

#[tokio::test]
async fn test_empty_query_falls_back_to_facets() {
    let storage = create_test_storage().await;
    storage
        .upsert_pattern(&pattern("PAT:facet001", PatternType::Test, "a test pattern", &["jest"]))
        .await
        .unwrap();

    let hits = storage
        .search_patterns("   ", &[PatternType::Test], &[], 10)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].fts_rank.is_none());
}

#[tokio::test]
async fn test_fts_stays_in_sync_on_update() {
    let storage = create_test_storage().await;
    let mut p = pattern("PAT:sync0001", PatternType::Lang, "original title", &[]);
    storage.upsert_pattern(&p).await.unwrap();

    p.title = "renamed completely".to_string();
    storage.upsert_pattern(&p).await.unwrap();

    let stale = storage.search_patterns("original", &[], &[], 10).await.unwrap();
    assert!(stale.is_empty());
    let fresh = storage.search_patterns("renamed", &[], &[], 10).await.unwrap();
    assert_eq!(fresh.len(), 1);
}

#[tokio::test]
async fn test_quarantined_pattern_rejects_writes() {
    let storage = create_test_storage().await;
    let p = pattern("PAT:quar0001", PatternType::Anti, "quarantined", &[]);
    storage.upsert_pattern(&p).await.unwrap();
    storage.set_quarantined("PAT:quar0001", true).await.unwrap();

    let err = storage
        .update_trust("PAT:quar0001", 2.0, 1.0, 0.66)
        .await
        .unwrap_err();
    assert!(matches!(err, apex_core::Error::InvalidState(_)));

    // Clearing the flag is the one allowed write; afterwards trust updates
    // go through again.
    storage.set_quarantined("PAT:quar0001", false).await.unwrap();
    storage
        .update_trust("PAT:quar0001", 2.0, 1.0, 0.66)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_metadata_triggers_vocab_bulk_fetch() {
    let storage = create_test_storage().await;
    let p = pattern("PAT:meta0001", PatternType::Codebase, "with extras", &[]);
    storage.upsert_pattern(&p).await.unwrap();

    storage
        .put_metadata(&apex_core::types::pattern::PatternMetadataRecord {
            pattern_id: "PAT:meta0001".to_string(),
            key: "usage_guidance".to_string(),
            value: serde_json::json!("apply before opening the connection"),
        })
        .await
        .unwrap();
    storage
        .put_trigger(&PatternTrigger {
            pattern_id: "PAT:meta0001".to_string(),
            trigger_type: TriggerType::Error,
            trigger_value: "database is locked".to_string(),
            priority: 5,
        })
        .await
        .unwrap();
    storage
        .put_trigger(&PatternTrigger {
            pattern_id: "PAT:meta0001".to_string(),
            trigger_type: TriggerType::Keyword,
            trigger_value: "sqlite".to_string(),
            priority: 9,
        })
        .await
        .unwrap();

    let ids = vec!["PAT:meta0001".to_string()];
    let metadata = storage.get_metadata(&ids).await.unwrap();
    assert_eq!(metadata["PAT:meta0001"].len(), 1);

    let triggers = storage.get_triggers(&ids).await.unwrap();
    let fetched = &triggers["PAT:meta0001"];
    assert_eq!(fetched.len(), 2);
    // Ordered by descending priority.
    assert_eq!(fetched[0].priority, 9);
}

#[tokio::test]
async fn test_task_round_trip_and_phase() {
    let storage = create_test_storage().await;
    let task = new_task(
        "fix login".to_string(),
        "fix the login redirect bug".to_string(),
        TaskType::Bug,
        Some("JIRA-42".to_string()),
        vec!["auth".to_string()],
        apex_core::brief::basic_brief("fix the login redirect bug"),
    );
    storage.insert_task(&task).await.unwrap();

    let fetched = storage.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(fetched.phase, Phase::Architect);
    assert_eq!(fetched.brief.tl_dr, "fix the login redirect bug");

    let by_identifier = storage.get_task("JIRA-42").await.unwrap().unwrap();
    assert_eq!(by_identifier.id, task.id);

    let advanced = storage
        .append_handoff(
            &task.id,
            Phase::Builder,
            PhaseHandoff {
                phase: Phase::Architect,
                handoff: "design settled".to_string(),
                timestamp: Utc::now(),
            },
        )
        .await
        .unwrap();
    assert_eq!(advanced.phase, Phase::Builder);
    assert_eq!(advanced.phase_handoffs.len(), 1);
}

#[tokio::test]
async fn test_checkpoints_append_only() {
    let storage = create_test_storage().await;
    let task = new_task(
        "t".to_string(),
        "i".to_string(),
        TaskType::Feature,
        None,
        vec![],
        apex_core::brief::basic_brief("i"),
    );
    storage.insert_task(&task).await.unwrap();

    for i in 0..3 {
        storage
            .append_checkpoint(
                &task.id,
                Checkpoint {
                    message: format!("step {i}"),
                    confidence: Some(0.5 + 0.1 * f64::from(i)),
                    timestamp: Utc::now(),
                },
            )
            .await
            .unwrap();
    }

    let fetched = storage.get_task(&task.id).await.unwrap().unwrap();
    assert_eq!(fetched.in_flight.len(), 3);
    assert_eq!(fetched.in_flight[0].message, "step 0");
    assert!((fetched.confidence - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn test_evidence_ordered_by_timestamp() {
    let storage = create_test_storage().await;
    let task = new_task(
        "t".to_string(),
        "i".to_string(),
        TaskType::Test,
        None,
        vec![],
        apex_core::brief::basic_brief("i"),
    );
    storage.insert_task(&task).await.unwrap();

    let base = Utc::now();
    for (i, kind) in [EvidenceType::File, EvidenceType::Decision, EvidenceType::Learning]
        .into_iter()
        .enumerate()
    {
        storage
            .insert_evidence(&TaskEvidence {
                id: format!("EV_{i:08}"),
                task_id: task.id.clone(),
                evidence_type: kind,
                content: format!("evidence {i}"),
                metadata: None,
                timestamp: base + chrono::Duration::seconds(i as i64),
            })
            .await
            .unwrap();
    }

    let evidence = storage.get_evidence(&task.id, 100).await.unwrap();
    assert_eq!(evidence.len(), 3);
    assert_eq!(evidence[0].content, "evidence 0");
    assert_eq!(evidence[2].evidence_type, EvidenceType::Learning);
}

fn s1_apply(storage_pattern_id: &str, task_id: &str) -> ReflectionApply {
    let claims = Claims {
        patterns_used: vec![PatternUsage {
            pattern_id: storage_pattern_id.to_string(),
            evidence: vec![apex_core::types::reflection::Evidence::GitLines {
                file: "a.ts".to_string(),
                sha: "HEAD".to_string(),
                start: 1,
                end: 2,
            }],
            notes: None,
        }],
        trust_updates: vec![TrustUpdate {
            pattern_id: storage_pattern_id.to_string(),
            outcome: "worked-perfectly".to_string(),
        }],
        ..Default::default()
    };
    let content_hash = claims_content_hash(task_id, &claims).unwrap();
    ReflectionApply {
        reflection: Reflection {
            id: format!("R_{content_hash}"),
            task_id: task_id.to_string(),
            content_hash,
            outcome: ReflectionOutcome::Success,
            claims,
            artifacts: ReflectionArtifacts::default(),
            received_at: Utc::now(),
        },
        trust_writes: vec![TrustWrite {
            pattern_id: storage_pattern_id.to_string(),
            alpha: 2.0,
            beta: 1.0,
            trust_score: 2.0 / 3.0,
            record_usage: true,
            success: true,
        }],
        new_patterns: vec![],
        metadata: vec![],
        audit_events: vec![AuditEvent {
            task_id: task_id.to_string(),
            kind: AuditKind::PatternUsed,
            pattern_id: Some(storage_pattern_id.to_string()),
            details: serde_json::json!({"success": true}),
            timestamp: Utc::now(),
        }],
    }
}

#[tokio::test]
async fn test_reflection_apply_updates_trust_and_audits() {
    let storage = create_test_storage().await;
    storage
        .upsert_pattern(&pattern("PAT:X0000001", PatternType::Lang, "x", &[]))
        .await
        .unwrap();

    let apply = s1_apply("PAT:X0000001", "T1");
    let persisted = storage.apply_reflection(&apply).await.unwrap();
    assert!(persisted);

    let updated = storage.get_pattern("PAT:X0000001").await.unwrap().unwrap();
    assert_eq!(updated.alpha, 2.0);
    assert_eq!(updated.beta, 1.0);
    assert!((updated.trust_score - 0.6667).abs() < 1e-3);
    assert_eq!(updated.usage_count, 1);
    assert_eq!(updated.success_count, 1);

    let events = storage.get_audit_events("T1").await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AuditKind::PatternUsed);
}

#[tokio::test]
async fn test_reflection_apply_is_idempotent() {
    let storage = create_test_storage().await;
    storage
        .upsert_pattern(&pattern("PAT:X0000002", PatternType::Lang, "x", &[]))
        .await
        .unwrap();

    let apply = s1_apply("PAT:X0000002", "T2");
    assert!(storage.apply_reflection(&apply).await.unwrap());
    // Replay: no side effects, persisted = false.
    assert!(!storage.apply_reflection(&apply).await.unwrap());

    let after = storage.get_pattern("PAT:X0000002").await.unwrap().unwrap();
    assert_eq!(after.alpha, 2.0);
    assert_eq!(after.usage_count, 1);
    let events = storage.get_audit_events("T2").await.unwrap();
    assert_eq!(events.len(), 1);
}

#[tokio::test]
async fn test_reflection_rolls_back_on_failure() {
    let storage = create_test_storage().await;
    storage
        .upsert_pattern(&pattern("PAT:X0000003", PatternType::Lang, "x", &[]))
        .await
        .unwrap();

    let mut apply = s1_apply("PAT:X0000003", "T3");
    // A second trust write against a missing pattern fails the transaction.
    apply.trust_writes.push(TrustWrite {
        pattern_id: "PAT:missing0".to_string(),
        alpha: 2.0,
        beta: 1.0,
        trust_score: 0.66,
        record_usage: false,
        success: false,
    });
    assert!(storage.apply_reflection(&apply).await.is_err());

    // Nothing from the failed transaction is visible.
    let untouched = storage.get_pattern("PAT:X0000003").await.unwrap().unwrap();
    assert_eq!(untouched.alpha, 1.0);
    assert!(storage.get_audit_events("T3").await.unwrap().is_empty());
    assert!(
        !storage
            .reflection_seen("T3", &apply.reflection.content_hash)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn test_anti_candidates_window() {
    let storage = create_test_storage().await;
    storage
        .upsert_pattern(&pattern("PAT:shaky001", PatternType::Lang, "shaky approach", &[]))
        .await
        .unwrap();

    for i in 0..3 {
        storage
            .store_audit_event(&AuditEvent {
                task_id: format!("T{i}"),
                kind: AuditKind::PatternUsed,
                pattern_id: Some("PAT:shaky001".to_string()),
                details: serde_json::json!({"success": false}),
                timestamp: Utc::now(),
            })
            .await
            .unwrap();
    }
    storage
        .store_audit_event(&AuditEvent {
            task_id: "T9".to_string(),
            kind: AuditKind::PatternUsed,
            pattern_id: Some("PAT:shaky001".to_string()),
            details: serde_json::json!({"success": true}),
            timestamp: Utc::now(),
        })
        .await
        .unwrap();

    let candidates = storage.anti_candidates(30).await.unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].pattern_id, "PAT:shaky001");
    assert_eq!(candidates[0].failure_count, 3);
}

#[tokio::test]
async fn test_aggregate_stats() {
    let storage = create_test_storage().await;
    for i in 0..4 {
        let mut p = pattern(&format!("PAT:agg{i:05}"), PatternType::Lang, "p", &[]);
        p.trust_score = 0.5;
        storage.upsert_pattern(&p).await.unwrap();
    }
    let mut anti = pattern("PAT:agganti0", PatternType::Anti, "a", &[]);
    anti.trust_score = 0.9;
    storage.upsert_pattern(&anti).await.unwrap();

    let stats = storage.aggregate_stats(&PatternFilter::default()).await.unwrap();
    assert_eq!(stats.total, 5);
    assert_eq!(stats.by_type["LANG"], 4);
    assert_eq!(stats.by_type["ANTI"], 1);
    assert!((stats.avg_trust - 0.58).abs() < 1e-9);
}
