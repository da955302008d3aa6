//! Prometheus metrics.
//!
//! The pipeline records through the `metrics` facade; this module describes
//! those series and optionally installs a Prometheus recorder with an HTTP
//! scrape listener.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `collegium_requests_total` | Counter | `operation`, `status` |
//! | `collegium_request_duration_seconds` | Histogram | `operation` |
//! | `collegium_rate_limited_total` | Counter | - |
//! | `collegium_authz_denials_total` | Counter | `filter`, `status` |
//! | `collegium_errors_total` | Counter | `category` |

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{describe_counter, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tokio::task::JoinHandle;

/// Metric names emitted by the pipeline.
pub mod names {
    /// Completed or aborted requests.
    pub const REQUESTS_TOTAL: &str = "collegium_requests_total";
    /// End-to-end pipeline latency.
    pub const REQUEST_DURATION_SECONDS: &str = "collegium_request_duration_seconds";
    /// Requests rejected with 429.
    pub const RATE_LIMITED_TOTAL: &str = "collegium_rate_limited_total";
    /// Authorization short-circuits.
    pub const AUTHZ_DENIALS_TOTAL: &str = "collegium_authz_denials_total";
    /// Failures caught by the exception boundary.
    pub const ERRORS_TOTAL: &str = "collegium_errors_total";
}

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether the Prometheus recorder is installed.
    pub enabled: bool,

    /// Scrape listener address.
    pub addr: String,

    /// Buckets for the request duration histogram, in seconds.
    pub duration_buckets: Vec<f64>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
            duration_buckets: vec![
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
            ],
        }
    }
}

/// Handle to an installed Prometheus recorder.
///
/// Dropping it stops the scrape listener; the recorder itself stays
/// installed for the life of the process.
#[derive(Debug)]
pub struct MetricsRegistry {
    handle: PrometheusHandle,
    exporter: JoinHandle<()>,
}

impl MetricsRegistry {
    /// Renders all series in Prometheus text format.
    #[must_use]
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

impl Drop for MetricsRegistry {
    fn drop(&mut self) {
        self.exporter.abort();
    }
}

/// Registers help text and units for the pipeline's metrics.
///
/// Safe to call with or without a recorder installed.
pub fn describe_metrics() {
    describe_counter!(
        names::REQUESTS_TOTAL,
        "Requests that left the pipeline, by operation and status"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        Unit::Seconds,
        "Time spent in the pipeline per request"
    );
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Requests rejected by the rate limiter"
    );
    describe_counter!(
        names::AUTHZ_DENIALS_TOTAL,
        "Requests denied by an authorization filter"
    );
    describe_counter!(
        names::ERRORS_TOTAL,
        "Failures converted to error responses, by category"
    );
}

/// Installs the Prometheus recorder and spawns its scrape listener.
///
/// Must be called inside a Tokio runtime. Returns `Ok(None)` when disabled.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for a bad listener address and
/// `TelemetryError::MetricsInit` when a recorder is already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<Option<MetricsRegistry>> {
    if !config.enabled {
        return Ok(None);
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(names::REQUEST_DURATION_SECONDS.to_string()),
            &config.duration_buckets,
        )
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;

    let exporter = tokio::spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "metrics exporter stopped");
        }
    });

    describe_metrics();
    tracing::info!(%addr, "metrics exporter listening");

    Ok(Some(MetricsRegistry { handle, exporter }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
        assert!(config.duration_buckets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
        metrics::counter!(names::RATE_LIMITED_TOTAL).increment(1);
    }

    #[test]
    fn test_disabled_returns_none() {
        let registry = init_metrics(&MetricsConfig::default()).unwrap();
        assert!(registry.is_none());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "nowhere".to_string(),
            ..Default::default()
        };
        let err = init_metrics(&config).unwrap_err();
        assert!(matches!(err, TelemetryError::InvalidAddress(_)));
    }
}
