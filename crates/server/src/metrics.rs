//! Prometheus metrics for observability.
//!
//! This module provides the HTTP request metrics of the server and registers
//! the core metrics (remote store, search, cache) alongside them.

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use regex_lite::Regex;

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "topicshelf_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("topicshelf_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "topicshelf_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // Core metrics (remote store, search, cache)
    for metric in topicshelf_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

static OWNER_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/owners/[^/]+").unwrap());
static TOPIC_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/topics/[^/]+").unwrap());
static SEQ_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/records/\d+(/|$)").unwrap());

/// Normalize a path for metric labels (replace owners, topics and sequence
/// numbers with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = OWNER_SEGMENT.replace_all(path, "/owners/{owner}");
    let result = TOPIC_SEGMENT.replace_all(&result, "/topics/{topic}");
    let result = SEQ_SEGMENT.replace_all(&result, "/records/{seq}$1");
    result.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_topics() {
        assert_eq!(
            normalize_path("/api/v1/owners/folder-1/topics"),
            "/api/v1/owners/{owner}/topics"
        );
    }

    #[test]
    fn test_normalize_path_records() {
        assert_eq!(
            normalize_path("/api/v1/owners/folder-1/topics/Deep%20Learning/records"),
            "/api/v1/owners/{owner}/topics/{topic}/records"
        );
        assert_eq!(
            normalize_path("/api/v1/owners/f/topics/ML/records/keys"),
            "/api/v1/owners/{owner}/topics/{topic}/records/keys"
        );
    }

    #[test]
    fn test_normalize_path_seq() {
        assert_eq!(
            normalize_path("/api/v1/owners/f/topics/ML/records/12"),
            "/api/v1/owners/{owner}/topics/{topic}/records/{seq}"
        );
    }

    #[test]
    fn test_normalize_path_untouched() {
        assert_eq!(normalize_path("/api/v1/health"), "/api/v1/health");
    }

    #[test]
    fn test_encode_includes_core_metrics() {
        topicshelf_core::metrics::SEARCHES
            .with_label_values(&["found"])
            .inc();
        let text = encode_metrics();
        assert!(text.contains("topicshelf_searches_total"));
    }
}
