//! Metrics and observability utilities
//!
//! Provides Prometheus metrics for provider fan-out, aggregation,
//! stream consumption and replay with standardized naming conventions.

use crate::errors::AppError;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all Versegate metrics
pub const METRICS_PREFIX: &str = "versegate";

/// Histogram buckets for upstream provider latency (in seconds)
pub const PROVIDER_BUCKETS: &[f64] = &[
    0.010, // 10ms
    0.025, // 25ms
    0.050, // 50ms
    0.100, // 100ms
    0.250, // 250ms
    0.500, // 500ms
    1.000, // 1s
    2.500, // 2.5s
    5.000, // 5s
    15.00, // provider timeout
];

/// Histogram buckets for request and aggregation latency (in seconds)
pub const REQUEST_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0,
];

/// Full metric name under the shared prefix
pub fn metric_name(suffix: &str) -> String {
    format!("{}_{}", METRICS_PREFIX, suffix)
}

/// Outcome label for a single provider call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Ok,
    Empty,
    Failed,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Ok => "ok",
            CallOutcome::Empty => "empty",
            CallOutcome::Failed => "failed",
        }
    }
}

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Provider metrics
    describe_counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Total upstream provider calls by kind and outcome"
    );

    describe_histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Upstream provider latency in seconds"
    );

    // Aggregation metrics
    describe_counter!(
        format!("{}_aggregations_total", METRICS_PREFIX),
        Unit::Count,
        "Total aggregated searches"
    );

    describe_histogram!(
        format!("{}_aggregation_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Aggregated search latency in seconds"
    );

    describe_counter!(
        format!("{}_aggregation_empty_kinds_total", METRICS_PREFIX),
        Unit::Count,
        "Requested kinds that produced no result"
    );

    // Stream metrics
    describe_counter!(
        format!("{}_stream_events_total", METRICS_PREFIX),
        Unit::Count,
        "Decoded stream events by type"
    );

    // Replay metrics
    describe_counter!(
        format!("{}_replayed_calls_total", METRICS_PREFIX),
        Unit::Count,
        "Replayed tool calls"
    );

    describe_counter!(
        format!("{}_replay_skipped_total", METRICS_PREFIX),
        Unit::Count,
        "Tool-call records skipped during replay"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record completion with the status the outcome will be answered with
    pub fn finish_with<T>(self, outcome: &Result<T, AppError>) {
        self.finish(outcome_status(outcome));
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// HTTP status a handler outcome is answered with
pub fn outcome_status<T>(outcome: &Result<T, AppError>) -> u16 {
    match outcome {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    }
}

/// Helper to record one upstream provider call
pub fn record_provider_call(kind: &str, outcome: CallOutcome, duration_secs: f64) {
    counter!(
        format!("{}_provider_calls_total", METRICS_PREFIX),
        "kind" => kind.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    histogram!(
        format!("{}_provider_duration_seconds", METRICS_PREFIX),
        "kind" => kind.to_string()
    )
    .record(duration_secs);
}

/// Helper to record an aggregated search
pub fn record_aggregation(duration_secs: f64, requested: usize, populated: usize) {
    counter!(format!("{}_aggregations_total", METRICS_PREFIX)).increment(1);

    histogram!(format!("{}_aggregation_duration_seconds", METRICS_PREFIX)).record(duration_secs);

    counter!(format!("{}_aggregation_empty_kinds_total", METRICS_PREFIX))
        .increment(requested.saturating_sub(populated) as u64);
}

/// Helper to record a decoded stream event
pub fn record_stream_event(event_type: &str) {
    counter!(
        format!("{}_stream_events_total", METRICS_PREFIX),
        "type" => event_type.to_string()
    )
    .increment(1);
}

/// Helper to record a replay pass
pub fn record_replay(replayed: usize, skipped: usize) {
    counter!(format!("{}_replayed_calls_total", METRICS_PREFIX)).increment(replayed as u64);
    counter!(format!("{}_replay_skipped_total", METRICS_PREFIX)).increment(skipped as u64);
}
