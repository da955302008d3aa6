//! Logging and metrics for Collegium services.
//!
//! - **Logging**: `tracing-subscriber` with JSON or pretty output and an
//!   `EnvFilter` that honors `RUST_LOG`.
//! - **Metrics**: descriptions for the pipeline's `metrics` series and an
//!   optional Prometheus scrape listener.
//!
//! Pipeline code logs with the standard field names `request_id`,
//! `operation_id`, `client_id`, `status_code`, `duration_ms`, and
//! `error_category`.
//!
//! # Example
//!
//! ```rust,ignore
//! use collegium_telemetry::{init_telemetry, TelemetryConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = TelemetryConfig::for_service("registrar", "production")
//!         .with_metrics_addr("0.0.0.0:9090");
//!
//!     let _telemetry = init_telemetry(&config).expect("telemetry");
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use logging::{build_filter, init_logging, LogConfig};
pub use self::metrics::{describe_metrics, init_metrics, MetricsConfig, MetricsRegistry};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Keeps telemetry alive; hold it for the life of the process.
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    metrics: Option<MetricsRegistry>,
}

impl TelemetryGuard {
    /// The Prometheus registry, when the exporter is enabled.
    #[must_use]
    pub fn metrics(&self) -> Option<&MetricsRegistry> {
        self.metrics.as_ref()
    }
}

/// Installs logging, then metrics.
///
/// # Errors
///
/// Returns the first subsystem failure.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<TelemetryGuard> {
    init_logging(&config.logging)?;
    let metrics = init_metrics(&config.metrics)?;
    if metrics.is_none() {
        describe_metrics();
    }
    tracing::debug!(environment = %config.environment, "telemetry initialized");
    Ok(TelemetryGuard { metrics })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_with_everything_disabled() {
        let config = TelemetryConfig {
            logging: LogConfig {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let guard = init_telemetry(&config).unwrap();
        assert!(guard.metrics().is_none());
    }
}
