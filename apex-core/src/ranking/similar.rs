//! Task-to-task similarity scoring for `find_similar`.

use std::collections::HashSet;

use crate::types::task::Task;

/// Weights over the four similarity components.
const TAG_WEIGHT: f64 = 0.35;
const TITLE_WEIGHT: f64 = 0.30;
const FILE_WEIGHT: f64 = 0.20;
const TYPE_WEIGHT: f64 = 0.15;

/// A scored similar-task result.
#[derive(Debug, Clone)]
pub struct SimilarTask {
    /// The candidate task
    pub task: Task,
    /// Similarity in [0, 1]
    pub score: f64,
}

/// Score the similarity between two tasks over tags, title trigrams,
/// touched-file overlap, and task type.
#[must_use]
pub fn similarity(a: &Task, b: &Task) -> f64 {
    let tag_score = jaccard(
        &a.tags.iter().map(String::as_str).collect::<HashSet<_>>(),
        &b.tags.iter().map(String::as_str).collect::<HashSet<_>>(),
    );
    let title_score = trigram_similarity(&a.title, &b.title);
    let file_score = jaccard(
        &a.files_touched
            .iter()
            .map(String::as_str)
            .collect::<HashSet<_>>(),
        &b.files_touched
            .iter()
            .map(String::as_str)
            .collect::<HashSet<_>>(),
    );
    let type_score = if a.task_type == b.task_type { 1.0 } else { 0.0 };

    TAG_WEIGHT * tag_score
        + TITLE_WEIGHT * title_score
        + FILE_WEIGHT * file_score
        + TYPE_WEIGHT * type_score
}

/// Rank `candidates` by similarity to `reference`, most similar first,
/// excluding the reference itself. Ties break on task id for determinism.
#[must_use]
pub fn rank_similar(reference: &Task, candidates: Vec<Task>, limit: usize) -> Vec<SimilarTask> {
    let mut scored: Vec<SimilarTask> = candidates
        .into_iter()
        .filter(|candidate| candidate.id != reference.id)
        .map(|task| {
            let score = similarity(reference, &task);
            SimilarTask { task, score }
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.task.id.cmp(&b.task.id))
    });
    scored.truncate(limit);
    scored
}

fn jaccard(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

/// Character-trigram Jaccard over lowercased titles.
fn trigram_similarity(a: &str, b: &str) -> f64 {
    let a_trigrams = trigrams(a);
    let b_trigrams = trigrams(b);
    if a_trigrams.is_empty() && b_trigrams.is_empty() {
        return 0.0;
    }
    let intersection = a_trigrams.intersection(&b_trigrams).count() as f64;
    let union = a_trigrams.union(&b_trigrams).count() as f64;
    intersection / union
}

fn trigrams(text: &str) -> HashSet<String> {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    let mut set = HashSet::new();
    if chars.is_empty() {
        return set;
    }
    if chars.len() < 3 {
        set.insert(chars.iter().collect());
        return set;
    }
    for window in chars.windows(3) {
        set.insert(window.iter().collect());
    }
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::task::{Phase, TaskBrief, TaskStatus, TaskType};
    use chrono::Utc;

    fn task(id: &str, title: &str, task_type: TaskType, tags: &[&str], files: &[&str]) -> Task {
        Task {
            id: id.to_string(),
            identifier: None,
            title: title.to_string(),
            intent: title.to_string(),
            task_type,
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
            status: TaskStatus::Active,
            phase: Phase::Architect,
            confidence: 0.5,
            files_touched: files.iter().map(|f| (*f).to_string()).collect(),
            errors_encountered: vec![],
            in_flight: vec![],
            phase_handoffs: vec![],
            brief: TaskBrief {
                tl_dr: title.to_string(),
                objectives: vec![],
                plan: vec![],
                constraints: vec![],
                test_scaffold: String::new(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_identical_tasks_score_high() {
        let a = task(
            "T1",
            "fix sqlite lock",
            TaskType::Bug,
            &["sqlite"],
            &["src/db.rs"],
        );
        let b = task(
            "T2",
            "fix sqlite lock",
            TaskType::Bug,
            &["sqlite"],
            &["src/db.rs"],
        );
        assert!((similarity(&a, &b) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_tasks_score_low() {
        let a = task("T1", "fix sqlite lock", TaskType::Bug, &["sqlite"], &[]);
        let b = task("T2", "write docs page", TaskType::Docs, &["docs"], &[]);
        assert!(similarity(&a, &b) < 0.2);
    }

    #[test]
    fn test_rank_similar_excludes_self_and_truncates() {
        let reference = task("T1", "fix sqlite lock", TaskType::Bug, &["sqlite"], &[]);
        let candidates = vec![
            reference.clone(),
            task("T2", "fix sqlite deadlock", TaskType::Bug, &["sqlite"], &[]),
            task("T3", "docs cleanup", TaskType::Docs, &[], &[]),
            task("T4", "fix sqlite lock retry", TaskType::Bug, &["sqlite"], &[]),
        ];
        let ranked = rank_similar(&reference, candidates, 2);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|s| s.task.id != "T1"));
        assert!(ranked[0].score >= ranked[1].score);
    }
}
