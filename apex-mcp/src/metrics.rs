//! Per-tool request metrics, owned by the server instance.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Aggregates for one tool.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolMetrics {
    /// Total requests
    pub requests: u64,
    /// Requests that returned an error
    pub errors: u64,
    /// Cache hits served
    pub cache_hits: u64,
    /// Total latency across requests, in ms
    pub total_latency_ms: u64,
    /// Slowest observed request, in ms
    pub max_latency_ms: u64,
}

impl ToolMetrics {
    /// Mean latency in ms.
    #[must_use]
    pub fn avg_latency_ms(&self) -> f64 {
        if self.requests == 0 {
            0.0
        } else {
            self.total_latency_ms as f64 / self.requests as f64
        }
    }
}

/// Metrics collector shared across tool handlers.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    per_tool: RwLock<HashMap<String, ToolMetrics>>,
}

impl MetricsCollector {
    /// Record one completed request.
    pub fn record(&self, tool: &str, latency_ms: u64, error: bool, cache_hit: bool) {
        let mut per_tool = self.per_tool.write();
        let metrics = per_tool.entry(tool.to_string()).or_default();
        metrics.requests += 1;
        if error {
            metrics.errors += 1;
        }
        if cache_hit {
            metrics.cache_hits += 1;
        }
        metrics.total_latency_ms += latency_ms;
        metrics.max_latency_ms = metrics.max_latency_ms.max(latency_ms);
    }

    /// Snapshot the current per-tool aggregates.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<String, ToolMetrics> {
        self.per_tool.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let collector = MetricsCollector::default();
        collector.record("apex_patterns_lookup", 12, false, false);
        collector.record("apex_patterns_lookup", 30, false, true);
        collector.record("apex_patterns_lookup", 8, true, false);

        let snapshot = collector.snapshot();
        let metrics = &snapshot["apex_patterns_lookup"];
        assert_eq!(metrics.requests, 3);
        assert_eq!(metrics.errors, 1);
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.max_latency_ms, 30);
        assert!((metrics.avg_latency_ms() - 50.0 / 3.0).abs() < 1e-9);
    }
}
