//! API client metrics
//!
//! Recorded through the `metrics` facade; the embedding application decides
//! whether to install an exporter. Without one these calls are no-ops.
//!
//! - `api_requests_total` (counter): labels `outcome`, `method`
//! - `api_request_duration_seconds` (histogram): label `outcome`
//! - `api_refresh_total` (counter): label `outcome`

/// Record a completed logical call (including any retry).
pub fn record_request(outcome: &str, method: &str, duration_secs: f64) {
    metrics::counter!("api_requests_total", "outcome" => outcome.to_string(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("api_request_duration_seconds", "outcome" => outcome.to_string())
        .record(duration_secs);
}

/// Record the outcome of one refresh cycle.
pub fn record_refresh(outcome: &str) {
    metrics::counter!("api_refresh_total", "outcome" => outcome.to_string()).increment(1);
}
