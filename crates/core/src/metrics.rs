//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Remote record store requests (count, latency)
//! - Cross-topic search and fan-out
//! - Partition cache loads

use std::time::Duration;

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Remote store
// =============================================================================

/// Remote store requests total by operation and result.
pub static REMOTE_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "topicshelf_remote_requests_total",
            "Total requests sent to the record store",
        ),
        &["operation", "result"], // result: "success", "failure"
    )
    .unwrap()
});

/// Remote store request duration in seconds.
pub static REMOTE_LATENCY: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "topicshelf_remote_request_duration_seconds",
            "Duration of record store requests",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["operation"],
    )
    .unwrap()
});

// =============================================================================
// Search and cache
// =============================================================================

/// Searches total by outcome.
pub static SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("topicshelf_searches_total", "Total cross-topic searches"),
        &["outcome"], // "found", "not_found", "failed"
    )
    .unwrap()
});

/// Topics fetched per fan-out.
pub static FANOUT_SIZE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "topicshelf_fanout_topics",
            "Number of topics fetched per fan-out",
        )
        .buckets(vec![0.0, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
        &[],
    )
    .unwrap()
});

/// Partition cache loads by kind.
pub static CACHE_LOADS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "topicshelf_cache_loads_total",
            "Total partition cache loads",
        ),
        &["kind"], // "single", "all"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Record one remote store request.
pub fn observe_remote(operation: &str, ok: bool, elapsed: Duration) {
    let result = if ok { "success" } else { "failure" };
    REMOTE_REQUESTS
        .with_label_values(&[operation, result])
        .inc();
    REMOTE_LATENCY
        .with_label_values(&[operation])
        .observe(elapsed.as_secs_f64());
}

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Remote store
        Box::new(REMOTE_REQUESTS.clone()),
        Box::new(REMOTE_LATENCY.clone()),
        // Search and cache
        Box::new(SEARCHES.clone()),
        Box::new(FANOUT_SIZE.clone()),
        Box::new(CACHE_LOADS.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_remote_counts() {
        let before = REMOTE_REQUESTS
            .with_label_values(&["metrics_test_op", "failure"])
            .get();
        observe_remote("metrics_test_op", false, Duration::from_millis(5));
        let after = REMOTE_REQUESTS
            .with_label_values(&["metrics_test_op", "failure"])
            .get();
        assert_eq!(after, before + 1);
    }

    #[test]
    fn test_all_metrics_registers() {
        let registry = prometheus::Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
    }
}
