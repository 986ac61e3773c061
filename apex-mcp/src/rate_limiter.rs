//! Per-tool token-bucket rate limiting.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{trace, warn};

/// Token bucket for one tool.
#[derive(Debug)]
struct TokenBucket {
    /// Current number of tokens
    tokens: f64,
    /// Maximum burst size (the per-window request cap)
    capacity: u32,
    /// Tokens added per second
    refill_rate: f64,
    /// Last time tokens were refilled
    last_refill: Instant,
}

impl TokenBucket {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            tokens: f64::from(max_requests),
            capacity: max_requests,
            refill_rate: f64::from(max_requests) / window.as_secs_f64().max(0.001),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(f64::from(self.capacity));
        self.last_refill = now;
    }

    /// Try to consume one token. Returns false when rate limited.
    fn try_consume(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn remaining(&mut self) -> u32 {
        self.refill();
        self.tokens as u32
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Tokens remaining after this check
    pub remaining: u32,
    /// The tool's per-window cap
    pub limit: u32,
}

/// Per-tool rate limiter.
///
/// Tools not listed in the overrides use the default cap. The limiter is
/// owned by the server instance, never a process global.
pub struct RateLimiter {
    default_max: u32,
    window: Duration,
    overrides: HashMap<&'static str, u32>,
    buckets: RwLock<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    /// Create a limiter with the standard per-tool overrides.
    #[must_use]
    pub fn new(default_max: u32, window: Duration) -> Self {
        let mut overrides = HashMap::new();
        overrides.insert("apex_patterns_lookup", 100);
        overrides.insert("apex_patterns_overview", 50);
        Self {
            default_max,
            window,
            overrides,
            buckets: RwLock::new(HashMap::new()),
        }
    }

    /// The cap applied to a tool.
    #[must_use]
    pub fn limit_for(&self, tool: &str) -> u32 {
        self.overrides.get(tool).copied().unwrap_or(self.default_max)
    }

    /// Check and consume one request slot for a tool.
    pub fn check(&self, tool: &str) -> RateLimitDecision {
        let limit = self.limit_for(tool);
        let mut buckets = self.buckets.write();
        let bucket = buckets
            .entry(tool.to_string())
            .or_insert_with(|| TokenBucket::new(limit, self.window));

        let allowed = bucket.try_consume();
        let remaining = bucket.remaining();
        if allowed {
            trace!(tool, remaining, "rate limit check passed");
        } else {
            warn!(tool, limit, "rate limit exceeded");
        }
        RateLimitDecision {
            allowed,
            remaining,
            limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_apply() {
        let limiter = RateLimiter::new(100, Duration::from_secs(60));
        assert_eq!(limiter.limit_for("apex_patterns_lookup"), 100);
        assert_eq!(limiter.limit_for("apex_patterns_overview"), 50);
        assert_eq!(limiter.limit_for("apex_task_create"), 100);
    }

    #[test]
    fn test_bucket_exhausts_and_blocks() {
        let limiter = RateLimiter::new(3, Duration::from_secs(3600));
        for _ in 0..3 {
            assert!(limiter.check("apex_task_create").allowed);
        }
        let decision = limiter.check("apex_task_create");
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[test]
    fn test_buckets_are_per_tool() {
        let limiter = RateLimiter::new(1, Duration::from_secs(3600));
        assert!(limiter.check("apex_task_create").allowed);
        assert!(!limiter.check("apex_task_create").allowed);
        // A different tool has its own bucket.
        assert!(limiter.check("apex_task_find").allowed);
    }
}
