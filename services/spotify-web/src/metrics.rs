//! Prometheus metrics exposition
//!
//! Metrics recorded across the workspace:
//!
//! - `web_requests_total` (counter): labels `status`, `method`
//! - `web_request_duration_seconds` (histogram): label `status`
//! - `spotify_api_requests_total` (counter): labels `endpoint`, `status`
//! - `spotify_token_refresh_total` (counter): label `outcome`
//! - `playback_poll_ticks_total` (counter): label `outcome`

use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

const DURATION_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

fn builder() -> Result<PrometheusBuilder, BuildError> {
    PrometheusBuilder::new().set_buckets_for_metric(
        Matcher::Full("web_request_duration_seconds".to_string()),
        DURATION_BUCKETS,
    )
}

/// Install the Prometheus recorder and return a handle for rendering metrics.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    builder()?.install_recorder()
}

/// Record a completed page request with status code and HTTP method labels.
pub fn record_request(status: u16, method: &str, duration_secs: f64) {
    let status_str = status.to_string();
    metrics::counter!("web_requests_total", "status" => status_str.clone(), "method" => method.to_string())
        .increment(1);
    metrics::histogram!("web_request_duration_seconds", "status" => status_str)
        .record(duration_secs);
}

/// A handle backed by a recorder that is not installed globally.
#[cfg(test)]
pub fn test_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
