//! Combined logging and metrics settings.

use crate::logging::LogConfig;
use crate::metrics::MetricsConfig;

/// What [`init_telemetry`](crate::init_telemetry) installs.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name; copied onto every log line.
    pub service_name: String,
    /// Deployment label such as `production`.
    pub environment: String,
    /// Prometheus exporter.
    pub metrics: MetricsConfig,
    /// Subscriber settings.
    pub logging: LogConfig,
}

impl TelemetryConfig {
    /// Defaults for `service`, running in `environment`.
    pub fn for_service(service: impl Into<String>, environment: impl Into<String>) -> Self {
        let service_name = service.into();
        Self {
            logging: LogConfig {
                service_name: service_name.clone(),
                ..LogConfig::default()
            },
            metrics: MetricsConfig::default(),
            environment: environment.into(),
            service_name,
        }
    }

    /// Replaces the logging section, keeping this config's service name.
    #[must_use]
    pub fn with_logging(mut self, logging: LogConfig) -> Self {
        self.logging = LogConfig {
            service_name: self.service_name.clone(),
            ..logging
        };
        self
    }

    /// Replaces the metrics section.
    #[must_use]
    pub fn with_metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }

    /// Turns the Prometheus listener on at `addr`.
    #[must_use]
    pub fn with_metrics_addr(self, addr: impl Into<String>) -> Self {
        let metrics = MetricsConfig {
            enabled: true,
            addr: addr.into(),
            ..self.metrics.clone()
        };
        self.with_metrics(metrics)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self::for_service("collegium", "development")
    }
}
