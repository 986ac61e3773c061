//! Size-budgeted response pack assembly.
//!
//! Packs emit patterns in ranked order until the serialized size would
//! exceed the byte budget. A candidate that does not fit with its snippet
//! is retried without it; the first candidate that does not fit at all
//! ends the pack.

use serde::{Deserialize, Serialize};

use crate::ranking::RankedPattern;

/// Default pack budget in bytes.
pub const DEFAULT_MAX_SIZE: usize = 8_192;

/// Smallest accepted pack budget.
pub const MIN_MAX_SIZE: usize = 1_024;

/// Largest accepted pack budget.
pub const MAX_MAX_SIZE: usize = 65_536;

/// Default budget for task context packs.
pub const DEFAULT_CONTEXT_MAX_SIZE: usize = 28_672;

/// Maximum summary length carried in a pack entry.
const SUMMARY_LIMIT: usize = 200;

/// Compressed projection of a pattern inside a pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackEntry {
    /// Pattern id
    pub id: String,
    /// Pattern type
    #[serde(rename = "type")]
    pub pattern_type: String,
    /// Pattern title
    pub title: String,
    /// Summary, truncated to 200 chars
    pub summary: String,
    /// Trust value at pack time
    pub trust: f64,
    /// Pattern tags
    pub tags: Vec<String>,
    /// Ranking score
    pub score: f64,
    /// One code snippet, when it fits the budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// A size-bounded ranked pack of patterns.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternPack {
    /// Included entries, a prefix of the ranked order
    pub patterns: Vec<PackEntry>,
    /// Candidates considered before budget cutoff
    pub total_items_considered: usize,
    /// Entries included
    pub included: usize,
    /// Entries whose summary was truncated
    pub truncated_summary_count: usize,
    /// Serialized size of the included entries in bytes
    pub bytes_used: usize,
}

/// Builder enforcing the byte budget over ranked candidates.
#[derive(Debug, Clone)]
pub struct PackBuilder {
    max_size: usize,
}

impl PackBuilder {
    /// Create a builder, clamping the budget into the accepted range.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.clamp(MIN_MAX_SIZE, MAX_MAX_SIZE),
        }
    }

    /// The effective budget.
    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Assemble a pack from ranked candidates.
    ///
    /// The result is always a prefix of the ranked sequence; at least one
    /// candidate is included unless the input was empty.
    #[must_use]
    pub fn build(&self, ranked: &[RankedPattern]) -> PatternPack {
        let mut pack = PatternPack {
            total_items_considered: ranked.len(),
            ..Default::default()
        };
        let mut used = 0usize;

        for candidate in ranked {
            let (mut entry, truncated) = project(candidate);

            let mut cost = entry_size(&entry);
            if used + cost > self.max_size && entry.snippet.is_some() {
                // Retry without the snippet before giving up on this entry.
                entry.snippet = None;
                cost = entry_size(&entry);
            }
            if used + cost > self.max_size {
                // First entry must land even on a minimal budget.
                if pack.patterns.is_empty() {
                    used += cost;
                    if truncated {
                        pack.truncated_summary_count += 1;
                    }
                    pack.patterns.push(entry);
                }
                break;
            }

            used += cost;
            if truncated {
                pack.truncated_summary_count += 1;
            }
            pack.patterns.push(entry);
        }

        pack.included = pack.patterns.len();
        pack.bytes_used = used;
        pack
    }
}

impl Default for PackBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

/// Project a ranked pattern into its compressed pack form.
fn project(candidate: &RankedPattern) -> (PackEntry, bool) {
    let pattern = &candidate.pattern;
    let (summary, truncated) = truncate_summary(&pattern.summary);
    let entry = PackEntry {
        id: pattern.id.clone(),
        pattern_type: pattern.pattern_type.as_str().to_string(),
        title: pattern.title.clone(),
        summary,
        trust: pattern.trust_score,
        tags: pattern.tags.clone(),
        score: candidate.score,
        snippet: pattern.first_snippet().map(ToString::to_string),
    };
    (entry, truncated)
}

fn truncate_summary(summary: &str) -> (String, bool) {
    if summary.chars().count() <= SUMMARY_LIMIT {
        return (summary.to_string(), false);
    }
    let truncated: String = summary.chars().take(SUMMARY_LIMIT - 3).collect();
    (format!("{truncated}..."), true)
}

fn entry_size(entry: &PackEntry) -> usize {
    serde_json::to_string(entry).map_or(0, |s| s.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ranking::ScoreBreakdown;
    use crate::types::pattern::{Pattern, PatternType};

    fn ranked(id: &str, summary_len: usize, with_snippet: bool) -> RankedPattern {
        let mut pattern = Pattern::new(
            id.to_string(),
            PatternType::Lang,
            format!("{id} title"),
            "s".repeat(summary_len),
        );
        if with_snippet {
            pattern.json_canonical = serde_json::json!({
                "snippets": [{"file": "src/lib.rs", "code": "x".repeat(512)}]
            });
        }
        RankedPattern {
            pattern,
            score: 0.5,
            trust_value: 0.5,
            breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn test_budget_is_clamped() {
        assert_eq!(PackBuilder::new(10).max_size(), MIN_MAX_SIZE);
        assert_eq!(PackBuilder::new(1 << 30).max_size(), MAX_MAX_SIZE);
        assert_eq!(PackBuilder::new(8_192).max_size(), 8_192);
    }

    #[test]
    fn test_empty_candidates_empty_pack() {
        let pack = PackBuilder::default().build(&[]);
        assert_eq!(pack.included, 0);
        assert_eq!(pack.total_items_considered, 0);
    }

    #[test]
    fn test_at_least_one_included() {
        // A single huge candidate still lands in the pack.
        let candidates = vec![ranked("PAT:big00000", 5_000, true)];
        let pack = PackBuilder::new(MIN_MAX_SIZE).build(&candidates);
        assert_eq!(pack.included, 1);
    }

    #[test]
    fn test_summary_truncation_counted() {
        let candidates = vec![ranked("PAT:long0000", 400, false)];
        let pack = PackBuilder::default().build(&candidates);
        assert_eq!(pack.truncated_summary_count, 1);
        assert!(pack.patterns[0].summary.chars().count() <= 200);
        assert!(pack.patterns[0].summary.ends_with("..."));
    }

    #[test]
    fn test_snippet_dropped_before_stopping() {
        // Budget admits entries without snippets but not with them.
        let candidates: Vec<RankedPattern> =
            (0..8).map(|i| ranked(&format!("PAT:n{i}000000"), 50, true)).collect();
        let tight = PackBuilder::new(MIN_MAX_SIZE).build(&candidates);
        assert!(tight.included >= 2);
        assert!(tight.patterns.iter().skip(1).all(|e| e.snippet.is_none()));
    }

    #[test]
    fn test_pack_is_prefix_of_ranked_order() {
        let candidates: Vec<RankedPattern> =
            (0..10).map(|i| ranked(&format!("PAT:p{i}000000"), 100, false)).collect();
        let pack = PackBuilder::new(MIN_MAX_SIZE).build(&candidates);
        for (entry, candidate) in pack.patterns.iter().zip(candidates.iter()) {
            assert_eq!(entry.id, candidate.pattern.id);
        }
    }

    #[test]
    fn test_monotone_in_budget() {
        let candidates: Vec<RankedPattern> =
            (0..40).map(|i| ranked(&format!("PAT:m{i:02}00000"), 150, true)).collect();
        let small = PackBuilder::new(2_048).build(&candidates);
        let large = PackBuilder::new(4_096).build(&candidates);
        assert!(large.included >= small.included);
    }
}
