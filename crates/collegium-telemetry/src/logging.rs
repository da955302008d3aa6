//! Structured logging setup.
//!
//! JSON lines in production, pretty output in development. The filter comes
//! from `RUST_LOG` when set and from [`LogConfig::level`] otherwise.
//!
//! # Example
//!
//! ```rust,ignore
//! use collegium_telemetry::logging::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::development())?;
//! tracing::info!(request_id = %id, "request started");
//! ```

use crate::error::TelemetryError;
use crate::TelemetryResult;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Whether a subscriber is installed.
    pub enabled: bool,

    /// Fallback filter directive, e.g. `"info"` or `"collegium=debug,hyper=warn"`.
    pub level: String,

    /// JSON output when `true`, pretty output otherwise.
    pub json_format: bool,

    /// ANSI colors (pretty output only).
    pub ansi: bool,

    /// Include file and line number.
    pub file_line_info: bool,

    /// Include the event target (module path).
    pub include_target: bool,

    /// Service name logged once at startup.
    pub service_name: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            ansi: false,
            file_line_info: false,
            include_target: true,
            service_name: "collegium".to_string(),
        }
    }
}

impl LogConfig {
    /// Human-readable debug output.
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            json_format: false,
            ansi: true,
            file_line_info: true,
            ..Self::default()
        }
    }

    /// JSON output at info level.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }
}

/// Builds the event filter: `RUST_LOG` if present and valid, else `fallback`.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` if `fallback` is used and does not
/// parse.
pub fn build_filter(fallback: &str) -> TelemetryResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(fallback).map_err(|e| TelemetryError::InvalidFilter {
        directive: fallback.to_string(),
        reason: e.to_string(),
    })
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidFilter` for a bad level directive and
/// `TelemetryError::LoggingInit` when a global subscriber is already set.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_filter(&config.level)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_file(config.file_line_info)
        .with_line_number(config.file_line_info)
        .with_target(config.include_target);

    let layer = if config.json_format {
        fmt_layer
            .json()
            .flatten_event(true)
            .with_ansi(false)
            .with_filter(filter)
            .boxed()
    } else {
        fmt_layer
            .pretty()
            .with_ansi(config.ansi)
            .with_filter(filter)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        format = if config.json_format { "json" } else { "pretty" },
        "logging initialized"
    );

    Ok(())
}
