//! Deterministic task brief generation.
//!
//! Creating a task always produces a basic brief derived from the intent;
//! enrichment from pattern and history sources is a separate, optional
//! pass that must never block creation.

use crate::types::task::TaskBrief;

/// Maximum length of the `tl_dr` line.
const TL_DR_LIMIT: usize = 50;

/// Derive the basic brief from a task intent.
///
/// Deterministic: the same intent always yields the same brief.
#[must_use]
pub fn basic_brief(intent: &str) -> TaskBrief {
    TaskBrief {
        tl_dr: ellipsize(intent.trim(), TL_DR_LIMIT),
        objectives: Vec::new(),
        plan: Vec::new(),
        constraints: Vec::new(),
        test_scaffold: "// TODO: generate test scaffold".to_string(),
    }
}

/// Truncate to `limit` chars, appending an ellipsis when cut.
fn ellipsize(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let kept: String = text.chars().take(limit - 3).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_intent_kept_verbatim() {
        let brief = basic_brief("fix the login bug");
        assert_eq!(brief.tl_dr, "fix the login bug");
        assert!(brief.objectives.is_empty());
        assert!(brief.plan.is_empty());
        assert!(brief.constraints.is_empty());
    }

    #[test]
    fn test_long_intent_ellipsized() {
        let intent = "migrate the entire authentication subsystem from session cookies to JWTs";
        let brief = basic_brief(intent);
        assert!(brief.tl_dr.chars().count() <= 50);
        assert!(brief.tl_dr.ends_with("..."));
    }

    #[test]
    fn test_brief_is_deterministic() {
        assert_eq!(basic_brief("same intent"), basic_brief("same intent"));
    }
}
