//! Beta-Bernoulli trust model with time decay and credible intervals.
//!
//! Each pattern carries `(alpha, beta)` parameters of a Beta distribution
//! over its success probability. Updates add outcome deltas; elapsed time
//! decays the parameters exponentially toward the prior so stale evidence
//! loses weight.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::error::{Error, Result};
use crate::types::pattern::PatternType;
use crate::types::reflection::TrustOutcome;

pub mod math;

use math::{beta_quantile, wilson_lower_bound};

/// Default half-life in days for decay toward the prior.
pub const DEFAULT_HALF_LIFE_DAYS: f64 = 90.0;

/// Decay is applied on the first touch after more than this many days.
const DECAY_THRESHOLD_DAYS: f64 = 1.0;

/// Prior `(alpha, beta)` for a pattern type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrustPrior {
    /// Prior success parameter
    pub alpha: f64,
    /// Prior failure parameter
    pub beta: f64,
}

impl Default for TrustPrior {
    fn default() -> Self {
        // Uniform prior.
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

/// Configuration for the trust model: per-type priors and half-lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Default prior when a type has no override
    pub default_prior: TrustPrior,
    /// Per-type prior overrides
    #[serde(default)]
    pub priors: HashMap<PatternType, TrustPrior>,
    /// Default decay half-life in days
    pub default_half_life_days: f64,
    /// Per-type half-life overrides
    #[serde(default)]
    pub half_lives: HashMap<PatternType, f64>,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            default_prior: TrustPrior::default(),
            priors: HashMap::new(),
            default_half_life_days: DEFAULT_HALF_LIFE_DAYS,
            half_lives: HashMap::new(),
        }
    }
}

impl TrustConfig {
    /// Prior for the given pattern type.
    #[must_use]
    pub fn prior_for(&self, pattern_type: PatternType) -> TrustPrior {
        self.priors
            .get(&pattern_type)
            .copied()
            .unwrap_or(self.default_prior)
    }

    /// Half-life for the given pattern type.
    #[must_use]
    pub fn half_life_for(&self, pattern_type: PatternType) -> f64 {
        self.half_lives
            .get(&pattern_type)
            .copied()
            .unwrap_or(self.default_half_life_days)
    }
}

/// A trust score snapshot derived from `(alpha, beta)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustScore {
    /// Posterior mean `alpha / (alpha + beta)`
    pub value: f64,
    /// `1 - width(credible interval)`
    pub confidence: f64,
    /// Effective sample count (prior excluded)
    pub samples: f64,
    /// 95% credible interval `[q_0.025, q_0.975]`
    pub interval: [f64; 2],
    /// Wilson score lower bound, kept for backward-compatible callers
    pub wilson_lower: f64,
    /// Current success parameter
    pub alpha: f64,
    /// Current failure parameter
    pub beta: f64,
    /// When the parameters were last updated
    pub last_updated: DateTime<Utc>,
    /// Whether time decay was applied on this touch
    pub decay_applied: bool,
}

/// The Beta-Bernoulli trust model.
///
/// Pure mathematics over `(alpha, beta)`; persistence lives in the storage
/// adapter.
#[derive(Debug, Clone, Default)]
pub struct TrustModel {
    config: TrustConfig,
}

impl TrustModel {
    /// Create a model with the given configuration.
    #[must_use]
    pub fn new(config: TrustConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// Validate `(alpha, beta)` parameters.
    fn check_parameters(alpha: f64, beta: f64) -> Result<()> {
        if !alpha.is_finite() || !beta.is_finite() {
            return Err(Error::InvalidState(format!(
                "non-finite trust parameters: alpha={alpha}, beta={beta}"
            )));
        }
        if alpha < 0.0 || beta < 0.0 {
            return Err(Error::InvalidState(format!(
                "negative trust parameters: alpha={alpha}, beta={beta}"
            )));
        }
        Ok(())
    }

    /// Compute a full trust score from raw success/failure counts.
    ///
    /// Counts are laid on top of the prior for the given type.
    pub fn calculate_trust(
        &self,
        pattern_type: PatternType,
        successes: f64,
        failures: f64,
    ) -> Result<TrustScore> {
        Self::check_parameters(successes, failures)?;
        let prior = self.config.prior_for(pattern_type);
        self.score_from_parameters(
            pattern_type,
            prior.alpha + successes,
            prior.beta + failures,
            Utc::now(),
            false,
        )
    }

    /// Build a `TrustScore` from current `(alpha, beta)`.
    pub fn score_from_parameters(
        &self,
        pattern_type: PatternType,
        alpha: f64,
        beta: f64,
        last_updated: DateTime<Utc>,
        decay_applied: bool,
    ) -> Result<TrustScore> {
        Self::check_parameters(alpha, beta)?;
        let prior = self.config.prior_for(pattern_type);
        let value = alpha / (alpha + beta);
        let lo = beta_quantile(alpha, beta, 0.025);
        let hi = beta_quantile(alpha, beta, 0.975);
        let confidence = (1.0 - (hi - lo)).clamp(0.0, 1.0);
        let samples = (alpha + beta - prior.alpha - prior.beta).max(0.0);
        let observed_successes = (alpha - prior.alpha).max(0.0);
        Ok(TrustScore {
            value,
            confidence,
            samples,
            interval: [lo, hi],
            wilson_lower: wilson_lower_bound(observed_successes, samples),
            alpha,
            beta,
            last_updated,
            decay_applied,
        })
    }

    /// Apply a single boolean outcome: success adds to alpha, failure to beta.
    pub fn update(&self, alpha: f64, beta: f64, outcome: bool) -> Result<(f64, f64)> {
        if outcome {
            self.update_with_delta(alpha, beta, 1.0, 0.0)
        } else {
            self.update_with_delta(alpha, beta, 0.0, 1.0)
        }
    }

    /// Apply an arbitrary non-negative `(delta_alpha, delta_beta)` pair.
    pub fn update_with_delta(
        &self,
        alpha: f64,
        beta: f64,
        delta_alpha: f64,
        delta_beta: f64,
    ) -> Result<(f64, f64)> {
        Self::check_parameters(alpha, beta)?;
        Self::check_parameters(delta_alpha, delta_beta)?;
        Ok((alpha + delta_alpha, beta + delta_beta))
    }

    /// Apply a natural-language outcome alias.
    pub fn update_with_outcome(
        &self,
        alpha: f64,
        beta: f64,
        outcome: TrustOutcome,
    ) -> Result<(f64, f64)> {
        let (da, db) = outcome.deltas();
        self.update_with_delta(alpha, beta, da, db)
    }

    /// Decay `(alpha, beta)` exponentially toward the prior.
    ///
    /// Applied on the first touch after more than one day has elapsed since
    /// `last_updated`. Returns the (possibly unchanged) parameters and
    /// whether decay was applied.
    pub fn apply_decay(
        &self,
        pattern_type: PatternType,
        alpha: f64,
        beta: f64,
        last_updated: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<(f64, f64, bool)> {
        Self::check_parameters(alpha, beta)?;
        let elapsed_days = (now - last_updated).num_seconds() as f64 / 86_400.0;
        if elapsed_days <= DECAY_THRESHOLD_DAYS {
            return Ok((alpha, beta, false));
        }
        let half_life = self.config.half_life_for(pattern_type);
        let factor = 2f64.powf(-elapsed_days / half_life);
        let prior = self.config.prior_for(pattern_type);
        let decayed_alpha = prior.alpha + (alpha - prior.alpha) * factor;
        let decayed_beta = prior.beta + (beta - prior.beta) * factor;
        debug!(
            elapsed_days,
            factor, "applying trust decay toward prior"
        );
        Ok((decayed_alpha, decayed_beta, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_fresh_pattern_one_success() {
        // One worked-perfectly on a uniform prior lands at 2/3.
        let model = TrustModel::default();
        let (alpha, beta) = model
            .update_with_outcome(1.0, 1.0, TrustOutcome::WorkedPerfectly)
            .unwrap();
        assert_eq!((alpha, beta), (2.0, 1.0));
        let score = model
            .score_from_parameters(PatternType::Lang, alpha, beta, Utc::now(), false)
            .unwrap();
        assert!((score.value - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(score.samples, 1.0);
    }

    #[test]
    fn test_outcome_aliases_preserve_mass() {
        // Every alias distributes exactly one unit of evidence.
        for outcome in TrustOutcome::ALL {
            let (da, db) = outcome.deltas();
            assert!((da + db - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_confidence_grows_with_samples() {
        let model = TrustModel::default();
        let few = model
            .score_from_parameters(PatternType::Lang, 3.0, 2.0, Utc::now(), false)
            .unwrap();
        let many = model
            .score_from_parameters(PatternType::Lang, 30.0, 20.0, Utc::now(), false)
            .unwrap();
        assert!(many.confidence > few.confidence);
        assert!(many.interval[1] - many.interval[0] < few.interval[1] - few.interval[0]);
    }

    #[test]
    fn test_decay_not_applied_within_a_day() {
        let model = TrustModel::default();
        let now = Utc::now();
        let (a, b, applied) = model
            .apply_decay(
                PatternType::Lang,
                10.0,
                2.0,
                now - Duration::hours(12),
                now,
            )
            .unwrap();
        assert!(!applied);
        assert_eq!((a, b), (10.0, 2.0));
    }

    #[test]
    fn test_decay_moves_toward_prior() {
        let model = TrustModel::default();
        let now = Utc::now();
        let (a, b, applied) = model
            .apply_decay(
                PatternType::Lang,
                10.0,
                2.0,
                now - Duration::days(90),
                now,
            )
            .unwrap();
        assert!(applied);
        // One half-life: evidence above the prior halves.
        assert!((a - 5.5).abs() < 0.05, "alpha decayed to {a}");
        assert!((b - 1.5).abs() < 0.05, "beta decayed to {b}");
        assert!(a > 1.0 && b > 1.0);
    }

    #[test]
    fn test_negative_parameters_rejected() {
        let model = TrustModel::default();
        assert!(model.update_with_delta(-1.0, 1.0, 0.0, 0.0).is_err());
        assert!(model.update_with_delta(1.0, 1.0, f64::NAN, 0.0).is_err());
        assert!(model
            .score_from_parameters(PatternType::Lang, f64::INFINITY, 1.0, Utc::now(), false)
            .is_err());
    }

    #[test]
    fn test_calculate_trust_layers_counts_on_prior() {
        let model = TrustModel::default();
        let score = model
            .calculate_trust(PatternType::Test, 4.0, 1.0)
            .unwrap();
        assert_eq!(score.alpha, 5.0);
        assert_eq!(score.beta, 2.0);
        assert_eq!(score.samples, 5.0);
        assert!((score.value - 5.0 / 7.0).abs() < 1e-9);
    }
}
