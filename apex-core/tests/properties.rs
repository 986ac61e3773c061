//! Property tests for core invariants.

use apex_core::pack::PackBuilder;
use apex_core::ranking::{RankedPattern, ScoreBreakdown};
use apex_core::trust::TrustModel;
use apex_core::types::{Pattern, PatternType, TrustOutcome};
use apex_core::validation::{sanitize_tag, Page};
use chrono::Utc;
use proptest::prelude::*;

proptest! {
    /// After any sequence of non-negative deltas the parameters stay at or
    /// above the prior and the derived trust stays inside [0, 1].
    #[test]
    fn trust_parameters_stay_valid(
        deltas in prop::collection::vec((0u8..=4u8), 0..40)
    ) {
        let model = TrustModel::default();
        let mut alpha = 1.0f64;
        let mut beta = 1.0f64;
        for delta in deltas {
            let outcome = TrustOutcome::ALL[delta as usize];
            let (a, b) = model.update_with_outcome(alpha, beta, outcome).unwrap();
            alpha = a;
            beta = b;
        }
        prop_assert!(alpha >= 1.0);
        prop_assert!(beta >= 1.0);
        let score = model
            .score_from_parameters(PatternType::Lang, alpha, beta, Utc::now(), false)
            .unwrap();
        prop_assert!((0.0..=1.0).contains(&score.value));
        prop_assert!((score.value - alpha / (alpha + beta)).abs() < 1e-9);
    }

    /// Sanitizing a tag is idempotent and the output alphabet is closed.
    #[test]
    fn sanitize_tag_idempotent(tag in ".{0,40}") {
        if let Some(once) = sanitize_tag(&tag) {
            prop_assert_eq!(sanitize_tag(&once), Some(once.clone()));
            prop_assert!(once
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        }
    }

    /// Doubling the byte budget never shrinks the pack.
    #[test]
    fn pack_assembly_monotone_in_budget(
        budget in 1024usize..=32_768usize,
        count in 1usize..30usize,
        summary_len in 10usize..400usize,
    ) {
        let candidates: Vec<RankedPattern> = (0..count)
            .map(|i| {
                let pattern = Pattern::new(
                    format!("PAT:{i:08}"),
                    PatternType::Codebase,
                    format!("pattern {i}"),
                    "s".repeat(summary_len),
                );
                RankedPattern {
                    pattern,
                    score: 0.5,
                    trust_value: 0.5,
                    breakdown: ScoreBreakdown::default(),
                }
            })
            .collect();
        let small = PackBuilder::new(budget).build(&candidates);
        let large = PackBuilder::new(budget.saturating_mul(2)).build(&candidates);
        prop_assert!(large.included >= small.included);
    }

    /// Pagination totals are always consistent.
    #[test]
    fn pagination_is_consistent(
        page in 1u64..100u64,
        page_size in 1u64..=100u64,
        total in 0u64..10_000u64,
    ) {
        let block = Page::new(page, page_size, total);
        prop_assert_eq!(block.total_pages, total.div_ceil(block.page_size));
        if block.has_next {
            prop_assert!(block.page < block.total_pages);
        }
        if block.page >= block.total_pages {
            prop_assert!(!block.has_next);
        }
    }
}
