//! Prometheus metrics.
//!
//! Registered into a dedicated registry and served by a second listener on
//! the metrics port, so scraping never competes with API traffic.

#![allow(dead_code)]

use axum::{http::StatusCode, response::IntoResponse};
use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::time::Duration;

/// Metric name prefix.
const PREFIX: &str = "encore";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_http_requests_total"), "Total number of HTTP requests"),
        &["method", "path", "status"]
    ).expect("Failed to create http_requests_total metric");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_http_request_duration_seconds"),
            "HTTP request duration in seconds"
        )
        .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.3, 0.5, 1.0, 2.0, 5.0]),
        &["method", "path"]
    ).expect("Failed to create http_request_duration_seconds metric");

    // Pipeline
    pub static ref PIPELINE_REQUESTS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_pipeline_requests_total"), "Pipeline runs by branch"),
        &["branch"]
    ).expect("Failed to create pipeline_requests_total metric");

    pub static ref CACHE_LOOKUPS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_cache_lookups_total"), "Recommendation cache lookups"),
        &["result"]
    ).expect("Failed to create cache_lookups_total metric");

    pub static ref SKIP_BURSTS_TOTAL: Counter = Counter::new(
        format!("{PREFIX}_skip_bursts_total"),
        "Skip bursts that triggered a refresh"
    ).expect("Failed to create skip_bursts_total metric");

    // Push channel
    pub static ref LIVE_SESSIONS: Gauge = Gauge::new(
        format!("{PREFIX}_live_sessions"),
        "Currently registered push sessions"
    ).expect("Failed to create live_sessions metric");

    pub static ref PUSH_EMITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_push_emits_total"), "Per-session push emits"),
        &["result"]
    ).expect("Failed to create push_emits_total metric");

    pub static ref PUSH_TRIGGERS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_push_triggers_total"), "Refresh triggers by reason"),
        &["reason"]
    ).expect("Failed to create push_triggers_total metric");

    pub static ref PIPELINE_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            format!("{PREFIX}_pipeline_duration_seconds"),
            "Cold-path pipeline duration in seconds"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.3, 0.5, 1.0, 2.0])
    ).expect("Failed to create pipeline_duration_seconds metric");
}

/// Register all metrics. Call once at startup.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(PIPELINE_REQUESTS_TOTAL.clone()),
        Box::new(CACHE_LOOKUPS_TOTAL.clone()),
        Box::new(SKIP_BURSTS_TOTAL.clone()),
        Box::new(LIVE_SESSIONS.clone()),
        Box::new(PUSH_EMITS_TOTAL.clone()),
        Box::new(PUSH_TRIGGERS_TOTAL.clone()),
        Box::new(PIPELINE_DURATION_SECONDS.clone()),
    ];
    for collector in collectors {
        // Duplicate registration only happens when tests build several
        // servers in one process; ignore it.
        let _ = REGISTRY.register(collector);
    }
}

pub fn record_http_request(method: &str, path: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration.as_secs_f64());
}

pub fn record_cache_lookup(hit: bool) {
    CACHE_LOOKUPS_TOTAL
        .with_label_values(&[if hit { "hit" } else { "miss" }])
        .inc();
}

pub fn record_pipeline_run(branch: &str, duration: Duration) {
    PIPELINE_REQUESTS_TOTAL.with_label_values(&[branch]).inc();
    PIPELINE_DURATION_SECONDS.observe(duration.as_secs_f64());
}

/// `GET /metrics` handler for the metrics listener.
pub async fn metrics_handler() -> impl IntoResponse {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new());
    }
    (
        StatusCode::OK,
        String::from_utf8(buffer).unwrap_or_default(),
    )
}
