//! Draft pattern mining over reflection commit artifacts.
//!
//! When a reflection arrives with `auto_mine` and commit subjects, the
//! miner synthesizes draft candidate patterns from conventional-commit
//! subjects. Drafts are tagged so curators can find and promote them.

use apex_core::types::pattern::{Pattern, PatternType};
use uuid::Uuid;

/// Minimum subject length worth mining.
const MIN_SUBJECT_LEN: usize = 12;

/// Map a conventional-commit prefix onto a pattern type.
fn type_for_prefix(prefix: &str) -> Option<PatternType> {
    match prefix {
        "fix" => Some(PatternType::Failure),
        "feat" | "refactor" | "perf" => Some(PatternType::Codebase),
        "test" => Some(PatternType::Test),
        _ => None,
    }
}

/// Mine draft patterns from commit subjects.
///
/// Subjects must be conventional (`fix: ...`, `feat(scope): ...`); anything
/// else is skipped. Duplicate subjects yield one draft.
#[must_use]
pub fn mine_commits(commits: &[String]) -> Vec<Pattern> {
    let mut drafts: Vec<Pattern> = Vec::new();
    for subject in commits {
        let subject = subject.trim();
        if subject.chars().count() < MIN_SUBJECT_LEN {
            continue;
        }
        let Some((raw_prefix, rest)) = subject.split_once(':') else {
            continue;
        };
        // Strip a conventional scope: `fix(db)` -> `fix`.
        let prefix = raw_prefix
            .split_once('(')
            .map_or(raw_prefix, |(p, _)| p)
            .trim()
            .to_ascii_lowercase();
        let Some(pattern_type) = type_for_prefix(&prefix) else {
            continue;
        };
        let title = rest.trim();
        if title.is_empty() {
            continue;
        }
        if drafts.iter().any(|d| d.title == title) {
            continue;
        }

        let mut draft = Pattern::new(
            format!("PAT:{}", Uuid::new_v4().simple()),
            pattern_type,
            title.to_string(),
            format!("Mined from commit: {subject}"),
        );
        draft.tags = vec!["draft".to_string(), "mined".to_string()];
        drafts.push(draft);
    }
    drafts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conventional_subjects_mined() {
        let commits = vec![
            "fix: retry sqlite busy errors with backoff".to_string(),
            "feat(auth): add refresh token rotation".to_string(),
            "chore: bump deps".to_string(),
            "random commit message without prefix".to_string(),
        ];
        let drafts = mine_commits(&commits);
        assert_eq!(drafts.len(), 2);
        assert_eq!(drafts[0].pattern_type, PatternType::Failure);
        assert_eq!(drafts[0].title, "retry sqlite busy errors with backoff");
        assert_eq!(drafts[1].pattern_type, PatternType::Codebase);
        assert!(drafts.iter().all(|d| d.tags.contains(&"draft".to_string())));
    }

    #[test]
    fn test_duplicates_and_short_subjects_skipped() {
        let commits = vec![
            "fix: one".to_string(),
            "fix: retry sqlite busy errors".to_string(),
            "fix: retry sqlite busy errors".to_string(),
        ];
        let drafts = mine_commits(&commits);
        assert_eq!(drafts.len(), 1);
    }
}
