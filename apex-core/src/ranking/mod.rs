//! Multi-signal candidate ranking.
//!
//! Combines FTS relevance, facet matches, trigger matches, trust, locality,
//! and recency into a single bounded score per candidate, then orders the
//! list deterministically.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::Result;
use crate::signals::Signals;
use crate::trust::TrustModel;
use crate::types::pattern::{Pattern, PatternMetadataRecord, PatternTrigger, TriggerType};

pub mod similar;

/// Tag pairs used for the complementary bonus when a candidate carries no
/// `complementary_patterns` metadata. The metadata source is authoritative.
const FALLBACK_COMPLEMENTARY_TAGS: [(&str, &str); 2] =
    [("api", "error-handling"), ("test", "mock")];

/// Complementary interaction bonus.
const COMPLEMENTARY_BONUS: f64 = 0.03;

/// Session bias for a recently successful pattern.
const RECENT_PATTERN_BONUS: f64 = 0.05;

/// Session bias for a recently failed pattern.
const FAILED_PATTERN_PENALTY: f64 = 0.10;

/// Weights for the ranking signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankingWeights {
    /// FTS relevance weight
    pub fts: f64,
    /// Facet match weight (type, tag, framework, language)
    pub facet: f64,
    /// Trigger match weight
    pub trigger: f64,
    /// Trust score weight
    pub trust: f64,
    /// Path locality weight
    pub locality: f64,
    /// Recency weight
    pub recency: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self {
            fts: 0.25,
            facet: 0.20,
            trigger: 0.20,
            trust: 0.20,
            locality: 0.10,
            recency: 0.05,
        }
    }
}

impl RankingWeights {
    /// Validate that weights sum to approximately 1.0.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let sum =
            self.fts + self.facet + self.trigger + self.trust + self.locality + self.recency;
        if (sum - 1.0).abs() > 0.01 {
            return Err(format!("ranking weights should sum to 1.0, got {sum}"));
        }
        Ok(())
    }
}

/// A ranking candidate: a pattern plus its raw FTS rank (bm25; lower is
/// more relevant), when the candidate came from a text search.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The pattern under consideration
    pub pattern: Pattern,
    /// Raw bm25 rank from the FTS index
    pub fts_rank: Option<f64>,
}

/// Per-signal score components, kept for explain output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub fts: f64,
    pub facet: f64,
    pub trigger: f64,
    pub trust: f64,
    pub locality: f64,
    pub recency: f64,
    pub session_bias: f64,
    pub complementary: f64,
}

/// A scored candidate in final rank order.
#[derive(Debug, Clone)]
pub struct RankedPattern {
    /// The pattern
    pub pattern: Pattern,
    /// Combined score
    pub score: f64,
    /// Trust value used for tie-breaking
    pub trust_value: f64,
    /// Per-signal components
    pub breakdown: ScoreBreakdown,
}

/// The candidate ranker.
#[derive(Debug, Clone, Default)]
pub struct Ranker {
    weights: RankingWeights,
}

impl Ranker {
    /// Create a ranker with the given weights.
    #[must_use]
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    /// Rank candidates against extracted signals.
    ///
    /// `triggers` and `metadata` are bulk-fetched per candidate id. The
    /// output ordering is fully deterministic: score descending, then trust
    /// descending, then `updated_at` descending, then id ascending.
    pub fn rank(
        &self,
        candidates: Vec<Candidate>,
        signals: &Signals,
        triggers: &HashMap<String, Vec<PatternTrigger>>,
        metadata: &HashMap<String, Vec<PatternMetadataRecord>>,
        trust_model: &TrustModel,
        now: DateTime<Utc>,
    ) -> Result<Vec<RankedPattern>> {
        let candidate_ids: Vec<String> =
            candidates.iter().map(|c| c.pattern.id.clone()).collect();
        let candidate_tags: Vec<Vec<String>> =
            candidates.iter().map(|c| c.pattern.tags.clone()).collect();

        let mut ranked = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let pattern = candidate.pattern;
            let empty = Vec::new();
            let pattern_triggers = triggers.get(&pattern.id).unwrap_or(&empty);
            let empty_meta = Vec::new();
            let pattern_metadata = metadata.get(&pattern.id).unwrap_or(&empty_meta);

            let trust_score = trust_model.score_from_parameters(
                pattern.pattern_type,
                pattern.alpha,
                pattern.beta,
                pattern.updated_at,
                false,
            )?;

            let mut breakdown = ScoreBreakdown {
                fts: fts_score(candidate.fts_rank),
                facet: facet_score(&pattern, signals),
                trigger: trigger_score(pattern_triggers, signals),
                trust: (trust_score.value - 0.5 * (1.0 - trust_score.confidence))
                    .clamp(0.0, 1.0),
                locality: locality_score(&pattern, signals),
                recency: recency_score(pattern.updated_at, now),
                ..Default::default()
            };

            breakdown.session_bias = session_bias(&pattern, signals);
            breakdown.complementary = complementary_bonus(
                &pattern,
                pattern_metadata,
                &candidate_ids,
                &candidate_tags,
                signals,
            );

            let score = self.weights.fts * breakdown.fts
                + self.weights.facet * breakdown.facet
                + self.weights.trigger * breakdown.trigger
                + self.weights.trust * breakdown.trust
                + self.weights.locality * breakdown.locality
                + self.weights.recency * breakdown.recency
                + breakdown.session_bias
                + breakdown.complementary;

            ranked.push(RankedPattern {
                trust_value: trust_score.value,
                pattern,
                score,
                breakdown,
            });
        }

        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.trust_value
                        .partial_cmp(&a.trust_value)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.pattern.updated_at.cmp(&a.pattern.updated_at))
                .then_with(|| a.pattern.id.cmp(&b.pattern.id))
        });
        Ok(ranked)
    }
}

/// Normalize a bm25 rank into [0, 1]; lower bm25 is more relevant.
fn fts_score(fts_rank: Option<f64>) -> f64 {
    match fts_rank {
        // bm25 from SQLite FTS5 is negative for good matches; take the
        // magnitude as relevance mass.
        Some(rank) => {
            let relevance = (-rank).max(0.0);
            relevance / (1.0 + relevance)
        }
        None => 0.0,
    }
}

/// Fraction of applicable facets (type, tag, framework, language) matched.
fn facet_score(pattern: &Pattern, signals: &Signals) -> f64 {
    let mut applicable = 0u32;
    let mut matched = 0u32;

    if let Some(intent) = signals.task_intent.as_ref() {
        applicable += 1;
        if intent_matches_type(&intent.intent_type, pattern) {
            matched += 1;
        }
    }

    if !signals.languages.is_empty() {
        applicable += 1;
        if signals
            .languages
            .iter()
            .any(|language| has_tag(pattern, language))
        {
            matched += 1;
        }
    }

    if !signals.frameworks.is_empty() {
        applicable += 1;
        if signals
            .frameworks
            .iter()
            .any(|framework| has_tag(pattern, &framework.name))
        {
            matched += 1;
        }
    }

    // Tag facet: overlap between pattern tags and task tokens.
    if !pattern.tags.is_empty() {
        applicable += 1;
        let task_tokens: Vec<String> = signals
            .error_types
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        if pattern.tags.iter().any(|tag| {
            task_tokens
                .iter()
                .any(|token| token.contains(tag.as_str()) || tag.contains(token.as_str()))
        }) {
            matched += 1;
        }
    }

    if applicable == 0 {
        0.0
    } else {
        f64::from(matched) / f64::from(applicable)
    }
}

fn has_tag(pattern: &Pattern, value: &str) -> bool {
    let lower = value.to_ascii_lowercase();
    pattern.tags.iter().any(|tag| tag == &lower)
}

/// Map a task intent type onto the pattern types it prefers.
fn intent_matches_type(intent_type: &str, pattern: &Pattern) -> bool {
    use crate::types::pattern::PatternType as P;
    let preferred: &[P] = match intent_type.to_ascii_lowercase().as_str() {
        "bug" => &[P::Failure, P::Anti],
        "feature" => &[P::Codebase, P::Lang],
        "refactor" => &[P::Codebase, P::Migration],
        "test" => &[P::Test],
        "docs" => &[P::Policy],
        "perf" => &[P::Codebase, P::Lang],
        _ => return false,
    };
    preferred.contains(&pattern.pattern_type)
}

/// Trigger score: error triggers dominate when error context is present.
fn trigger_score(triggers: &[PatternTrigger], signals: &Signals) -> f64 {
    if triggers.is_empty() {
        return 0.0;
    }

    let has_error_signals = !signals.error_types.is_empty();
    let mut best = 0.0f64;

    let mut ordered: Vec<&PatternTrigger> = triggers.iter().collect();
    ordered.sort_by(|a, b| b.priority.cmp(&a.priority));

    for trigger in ordered {
        let value = trigger.trigger_value.to_ascii_lowercase();
        let matched = match trigger.trigger_type {
            TriggerType::Error => signals.error_types.iter().any(|error| {
                let error = error.to_ascii_lowercase();
                error.contains(&value) || value.contains(&error)
            }),
            TriggerType::Scenario | TriggerType::Keyword => {
                // Scenario and keyword triggers are matched against error
                // text too; the task-text match happens at retrieval time
                // through FTS, so here the signals carry the tokens.
                signals
                    .error_types
                    .iter()
                    .chain(signals.languages.iter())
                    .chain(signals.frameworks.iter().map(|f| &f.name))
                    .any(|token| token.to_ascii_lowercase().contains(&value))
            }
        };
        if !matched {
            continue;
        }
        let weight = match trigger.trigger_type {
            TriggerType::Error => 1.0,
            TriggerType::Scenario => {
                if has_error_signals {
                    0.3
                } else {
                    0.7
                }
            }
            TriggerType::Keyword => {
                if has_error_signals {
                    0.3
                } else {
                    0.5
                }
            }
        };
        best = best.max(weight);
    }
    best
}

/// Path locality: longest shared prefix between pattern snippet paths and
/// signal paths, in segments, saturating at three.
fn locality_score(pattern: &Pattern, signals: &Signals) -> f64 {
    if signals.paths.is_empty() {
        return 0.0;
    }
    let mut best = 0usize;
    for pattern_path in pattern.snippet_paths() {
        let pattern_segments: Vec<&str> =
            pattern_path.split('/').filter(|s| !s.is_empty()).collect();
        for signal_path in &signals.paths {
            let signal_segments: Vec<&str> =
                signal_path.split('/').filter(|s| !s.is_empty()).collect();
            let shared = pattern_segments
                .iter()
                .zip(signal_segments.iter())
                .take_while(|(a, b)| a == b)
                .count();
            best = best.max(shared);
        }
    }
    (best as f64 / 3.0).min(1.0)
}

/// Exponential recency decay with a 180-day scale.
fn recency_score(updated_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = ((now - updated_at).num_seconds() as f64 / 86_400.0).max(0.0);
    (-age_days / 180.0).exp()
}

/// Session history bias: seen-successfully earns a bonus, seen-failing a
/// penalty.
fn session_bias(pattern: &Pattern, signals: &Signals) -> f64 {
    let mentions = |list: &[String]| {
        list.iter().any(|entry| {
            entry == &pattern.id || pattern.alias.as_deref() == Some(entry.as_str())
        })
    };
    let mut bias = 0.0;
    if mentions(&signals.recent_patterns) {
        bias += RECENT_PATTERN_BONUS;
    }
    if mentions(&signals.failed_patterns) {
        bias -= FAILED_PATTERN_PENALTY;
    }
    bias
}

/// Complementary interaction bonus.
///
/// The `complementary_patterns` metadata entry is authoritative; candidates
/// without one fall back to the built-in tag-pair table.
fn complementary_bonus(
    pattern: &Pattern,
    metadata: &[PatternMetadataRecord],
    candidate_ids: &[String],
    candidate_tags: &[Vec<String>],
    signals: &Signals,
) -> f64 {
    if let Some(record) = metadata
        .iter()
        .find(|record| record.key == "complementary_patterns")
    {
        if let Some(listed) = record.value.as_array() {
            let complementary_present = listed
                .iter()
                .filter_map(|v| v.as_str())
                .any(|id| {
                    candidate_ids.iter().any(|c| c == id)
                        || signals.recent_patterns.iter().any(|r| r == id)
                });
            return if complementary_present {
                COMPLEMENTARY_BONUS
            } else {
                0.0
            };
        }
    }

    // Fallback: tag-pair table against the rest of the candidate set.
    for (a, b) in FALLBACK_COMPLEMENTARY_TAGS {
        let has_a = pattern.tags.iter().any(|t| t == a);
        let has_b = pattern.tags.iter().any(|t| t == b);
        let partner = if has_a {
            b
        } else if has_b {
            a
        } else {
            continue;
        };
        let partner_present = candidate_tags
            .iter()
            .zip(candidate_ids.iter())
            .any(|(tags, id)| id != &pattern.id && tags.iter().any(|t| t == partner));
        if partner_present {
            return COMPLEMENTARY_BONUS;
        }
    }
    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::pattern::PatternType;

    fn pattern(id: &str, tags: &[&str]) -> Pattern {
        let mut p = Pattern::new(
            id.to_string(),
            PatternType::Codebase,
            format!("{id} title"),
            format!("{id} summary"),
        );
        p.tags = tags.iter().map(|t| (*t).to_string()).collect();
        // Pin timestamps so tie-breaks fall through to the id.
        let fixed = DateTime::from_timestamp(1_750_000_000, 0).unwrap();
        p.created_at = fixed;
        p.updated_at = fixed;
        p
    }

    fn signals_with_errors() -> Signals {
        Signals {
            languages: vec!["typescript".to_string()],
            error_types: vec!["SqliteError".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_tagged_pattern_outranks_unrelated() {
        let ranker = Ranker::default();
        let candidates = vec![
            Candidate {
                pattern: pattern("PAT:unrelated", &["css"]),
                fts_rank: None,
            },
            Candidate {
                pattern: pattern("PAT:sqlite00", &["sqlite", "typescript"]),
                fts_rank: Some(-2.0),
            },
        ];
        let ranked = ranker
            .rank(
                candidates,
                &signals_with_errors(),
                &HashMap::new(),
                &HashMap::new(),
                &TrustModel::default(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(ranked[0].pattern.id, "PAT:sqlite00");
        assert!(ranked[0].score > ranked[1].score);
    }

    #[test]
    fn test_error_trigger_dominates() {
        let ranker = Ranker::default();
        let mut triggers = HashMap::new();
        triggers.insert(
            "PAT:locked00".to_string(),
            vec![PatternTrigger {
                pattern_id: "PAT:locked00".to_string(),
                trigger_type: TriggerType::Error,
                trigger_value: "database is locked".to_string(),
                priority: 10,
            }],
        );
        let signals = Signals {
            error_types: vec!["database is locked".to_string()],
            ..Default::default()
        };
        let ranked = ranker
            .rank(
                vec![
                    Candidate {
                        pattern: pattern("PAT:locked00", &[]),
                        fts_rank: None,
                    },
                    Candidate {
                        pattern: pattern("PAT:other000", &[]),
                        fts_rank: None,
                    },
                ],
                &signals,
                &triggers,
                &HashMap::new(),
                &TrustModel::default(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(ranked[0].pattern.id, "PAT:locked00");
        assert!((ranked[0].breakdown.trigger - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_failed_pattern_penalized() {
        let ranker = Ranker::default();
        let signals = Signals {
            failed_patterns: vec!["PAT:flaky000".to_string()],
            ..Default::default()
        };
        let ranked = ranker
            .rank(
                vec![
                    Candidate {
                        pattern: pattern("PAT:flaky000", &[]),
                        fts_rank: None,
                    },
                    Candidate {
                        pattern: pattern("PAT:steady00", &[]),
                        fts_rank: None,
                    },
                ],
                &signals,
                &HashMap::new(),
                &HashMap::new(),
                &TrustModel::default(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(ranked[0].pattern.id, "PAT:steady00");
        assert!(ranked[1].breakdown.session_bias < 0.0);
    }

    #[test]
    fn test_ordering_is_deterministic() {
        let ranker = Ranker::default();
        let make = || {
            vec![
                Candidate {
                    pattern: pattern("PAT:aaa00000", &[]),
                    fts_rank: None,
                },
                Candidate {
                    pattern: pattern("PAT:bbb00000", &[]),
                    fts_rank: None,
                },
                Candidate {
                    pattern: pattern("PAT:ccc00000", &[]),
                    fts_rank: None,
                },
            ]
        };
        let now = Utc::now();
        let signals = Signals::default();
        let first: Vec<String> = ranker
            .rank(
                make(),
                &signals,
                &HashMap::new(),
                &HashMap::new(),
                &TrustModel::default(),
                now,
            )
            .unwrap()
            .into_iter()
            .map(|r| r.pattern.id)
            .collect();
        let second: Vec<String> = ranker
            .rank(
                make(),
                &signals,
                &HashMap::new(),
                &HashMap::new(),
                &TrustModel::default(),
                now,
            )
            .unwrap()
            .into_iter()
            .map(|r| r.pattern.id)
            .collect();
        assert_eq!(first, second);
        // Equal scores fall back to lexicographic id order.
        assert_eq!(first, vec!["PAT:aaa00000", "PAT:bbb00000", "PAT:ccc00000"]);
    }

    #[test]
    fn test_complementary_metadata_is_authoritative() {
        let ranker = Ranker::default();
        let mut metadata = HashMap::new();
        metadata.insert(
            "PAT:api00000".to_string(),
            vec![PatternMetadataRecord {
                pattern_id: "PAT:api00000".to_string(),
                key: "complementary_patterns".to_string(),
                value: serde_json::json!(["PAT:errs0000"]),
            }],
        );
        let ranked = ranker
            .rank(
                vec![
                    Candidate {
                        pattern: pattern("PAT:api00000", &["api"]),
                        fts_rank: None,
                    },
                    Candidate {
                        pattern: pattern("PAT:errs0000", &["error-handling"]),
                        fts_rank: None,
                    },
                ],
                &Signals::default(),
                &HashMap::new(),
                &metadata,
                &TrustModel::default(),
                Utc::now(),
            )
            .unwrap();
        let api = ranked
            .iter()
            .find(|r| r.pattern.id == "PAT:api00000")
            .unwrap();
        assert!((api.breakdown.complementary - COMPLEMENTARY_BONUS).abs() < 1e-12);
    }
}
