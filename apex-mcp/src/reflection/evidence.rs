//! Evidence validation for reflection claims.

use regex::Regex;
use std::sync::LazyLock;

use apex_core::types::reflection::Evidence;

/// Full 40-hex commit SHA.
static SHA_RE: LazyLock<Regex> = LazyLock::new(|| {
    #[allow(clippy::unwrap_used)]
    let re = Regex::new(r"^[0-9a-fA-F]{40}$").unwrap();
    re
});

/// A reflection claim rejected during validation, returned as data so the
/// caller can correct and retry.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Rejection {
    /// JSON path of the offending claim
    pub path: String,
    /// Short machine code
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl Rejection {
    pub(crate) fn new(
        path: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// `HEAD` refers to the working tree; anything else must be 40-hex.
fn check_sha(sha: &str) -> bool {
    sha == "HEAD" || SHA_RE.is_match(sha)
}

/// Validate one evidence item, appending rejections in place.
pub fn validate_evidence(
    evidence: &Evidence,
    path: &str,
    allowed_repos: &[String],
    rejections: &mut Vec<Rejection>,
) {
    match evidence {
        Evidence::GitLines {
            file,
            sha,
            start,
            end,
        } => {
            if file.is_empty() {
                rejections.push(Rejection::new(
                    format!("{path}.file"),
                    "missing_field",
                    "git_lines evidence requires a file",
                ));
            }
            if !check_sha(sha) {
                rejections.push(Rejection::new(
                    format!("{path}.sha"),
                    "invalid_sha",
                    format!("sha must be HEAD or a 40-hex commit sha, got {sha:?}"),
                ));
            }
            if *start == 0 || start > end {
                rejections.push(Rejection::new(
                    format!("{path}.start"),
                    "invalid_range",
                    format!("line range must satisfy 1 <= start <= end, got {start}..{end}"),
                ));
            }
        }
        Evidence::Commit { sha } => {
            if !check_sha(sha) {
                rejections.push(Rejection::new(
                    format!("{path}.sha"),
                    "invalid_sha",
                    format!("sha must be HEAD or a 40-hex commit sha, got {sha:?}"),
                ));
            }
        }
        Evidence::Pr { number, repo } => {
            if *number == 0 {
                rejections.push(Rejection::new(
                    format!("{path}.number"),
                    "invalid_value",
                    "pr number must be positive",
                ));
            }
            if !allowed_repos.is_empty()
                && !allowed_repos.iter().any(|allowed| allowed == repo)
            {
                rejections.push(Rejection::new(
                    format!("{path}.repo"),
                    "repo_not_allowed",
                    format!("repo {repo:?} is not in the configured allowlist"),
                ));
            }
        }
        Evidence::CiRun { id, provider } => {
            if id.is_empty() {
                rejections.push(Rejection::new(
                    format!("{path}.id"),
                    "missing_field",
                    "ci_run evidence requires an id",
                ));
            }
            if provider.is_empty() {
                rejections.push(Rejection::new(
                    format!("{path}.provider"),
                    "missing_field",
                    "ci_run evidence requires a provider",
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(evidence: &Evidence, allowed: &[String]) -> Vec<Rejection> {
        let mut rejections = Vec::new();
        validate_evidence(evidence, "claims.patterns_used[0].evidence[0]", allowed, &mut rejections);
        rejections
    }

    #[test]
    fn test_head_sha_accepted() {
        let evidence = Evidence::GitLines {
            file: "a.ts".to_string(),
            sha: "HEAD".to_string(),
            start: 1,
            end: 2,
        };
        assert!(validate(&evidence, &[]).is_empty());
    }

    #[test]
    fn test_full_sha_accepted_short_rejected() {
        let good = Evidence::Commit {
            sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
        };
        assert!(validate(&good, &[]).is_empty());

        let bad = Evidence::Commit {
            sha: "abc123".to_string(),
        };
        let rejections = validate(&bad, &[]);
        assert_eq!(rejections.len(), 1);
        assert_eq!(rejections[0].code, "invalid_sha");
    }

    #[test]
    fn test_inverted_line_range_rejected() {
        let evidence = Evidence::GitLines {
            file: "a.ts".to_string(),
            sha: "HEAD".to_string(),
            start: 9,
            end: 3,
        };
        let rejections = validate(&evidence, &[]);
        assert_eq!(rejections[0].code, "invalid_range");
    }

    #[test]
    fn test_pr_repo_allowlist() {
        let evidence = Evidence::Pr {
            number: 12,
            repo: "github.com/acme/widgets".to_string(),
        };
        // Unrestricted when no allowlist is configured.
        assert!(validate(&evidence, &[]).is_empty());

        let allowed = vec!["github.com/acme/widgets".to_string()];
        assert!(validate(&evidence, &allowed).is_empty());

        let other = vec!["github.com/acme/other".to_string()];
        let rejections = validate(&evidence, &other);
        assert_eq!(rejections[0].code, "repo_not_allowed");
    }
}
