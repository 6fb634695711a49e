use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Observed performance of one gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Fraction of successful calls in `[0, 1]`; 1.0 before any call
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub total_requests: u64,
    pub failed_requests: u64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            success_rate: 1.0,
            avg_response_time_ms: 0.0,
            total_requests: 0,
            failed_requests: 0,
        }
    }
}

impl PerformanceMetrics {
    /// Score used by performance-based selection, higher is better
    pub fn score(&self) -> f64 {
        self.success_rate * 100.0 - self.avg_response_time_ms / 10.0
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: u64,
    failed: u64,
    total_ms: f64,
}

/// Per-gateway call outcome and latency counters
#[derive(Debug, Default)]
pub struct PerformanceTracker {
    counters: DashMap<String, Counters>,
}

impl PerformanceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, gateway: &str, success: bool, elapsed: Duration) {
        let mut entry = self.counters.entry(gateway.to_string()).or_default();
        entry.total += 1;
        if !success {
            entry.failed += 1;
        }
        entry.total_ms += elapsed.as_secs_f64() * 1000.0;
    }

    pub fn metrics(&self, gateway: &str) -> PerformanceMetrics {
        match self.counters.get(gateway) {
            Some(c) if c.total > 0 => PerformanceMetrics {
                success_rate: (c.total - c.failed) as f64 / c.total as f64,
                avg_response_time_ms: c.total_ms / c.total as f64,
                total_requests: c.total,
                failed_requests: c.failed,
            },
            _ => PerformanceMetrics::default(),
        }
    }

    pub fn remove(&self, gateway: &str) {
        self.counters.remove(gateway);
    }
}
