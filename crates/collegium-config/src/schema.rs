//! Configuration section types.
//!
//! Every section rejects unknown fields and fills omitted fields from the
//! `default_*` helpers below, so a partial file is always valid input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use collegium_core::LocationPolicy;

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Address the listener binds to.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Seconds to wait for in-flight connections after a shutdown signal.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Whether HTTP/1.1 keep-alive is enabled.
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// Read caller identity from the `x-user-id` / `x-user-roles` headers.
    ///
    /// Only enable behind a gateway that strips these headers from
    /// untrusted traffic.
    #[serde(default = "default_true")]
    pub trust_identity_headers: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            keep_alive: true,
            trust_identity_headers: true,
        }
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// How the rate limiter identifies a client.
///
/// Serialized as `"remote_addr"`, `"global"`, or `"header:<name>"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum RateLimitKey {
    /// The peer socket address (IP only).
    #[default]
    RemoteAddr,
    /// The value of a request header, e.g. an API key.
    Header(String),
    /// One shared budget for all callers.
    Global,
}

impl FromStr for RateLimitKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_lowercase().as_str() {
            "remote_addr" | "ip" => return Ok(Self::RemoteAddr),
            "global" => return Ok(Self::Global),
            _ => {}
        }
        match trimmed.split_once(':') {
            Some((kind, name)) if kind.eq_ignore_ascii_case("header") && !name.trim().is_empty() => {
                Ok(Self::Header(name.trim().to_string()))
            }
            _ => Err(format!(
                "unknown rate limit key '{s}' (expected remote_addr, global, or header:<name>)"
            )),
        }
    }
}

impl TryFrom<String> for RateLimitKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RateLimitKey> for String {
    fn from(key: RateLimitKey) -> Self {
        key.to_string()
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteAddr => f.write_str("remote_addr"),
            Self::Header(name) => write!(f, "header:{name}"),
            Self::Global => f.write_str("global"),
        }
    }
}

/// Fixed-window rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Whether the limiter stage is installed.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Requests admitted per client per window.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Client identification strategy.
    #[serde(default)]
    pub key: RateLimitKey,

    /// Paths that bypass the limiter entirely.
    #[serde(default = "default_exempt_paths")]
    pub exempt_paths: Vec<String>,

    /// Message returned with a 429.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: default_limit(),
            window_secs: default_window_secs(),
            key: RateLimitKey::default(),
            exempt_paths: default_exempt_paths(),
            message: None,
        }
    }
}

fn default_limit() -> u32 {
    100
}

fn default_window_secs() -> u64 {
    60
}

fn default_exempt_paths() -> Vec<String> {
    vec!["/health".to_string()]
}

/// Campus allow-list settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LocationsConfig {
    /// Allowed department locations, compared case-insensitively.
    #[serde(default = "default_locations")]
    pub allowed: Vec<String>,
}

impl LocationsConfig {
    /// Builds the normalized policy shared by the location checks.
    #[must_use]
    pub fn policy(&self) -> LocationPolicy {
        LocationPolicy::new(&self.allowed)
    }
}

impl Default for LocationsConfig {
    fn default() -> Self {
        Self {
            allowed: default_locations(),
        }
    }
}

fn default_locations() -> Vec<String> {
    collegium_core::DEFAULT_ALLOWED_LOCATIONS
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// Request payload checks applied by resource filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PayloadConfig {
    /// Largest accepted `Content-Length`.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Value the `API-Version` header must carry when present.
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for PayloadConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            api_version: default_api_version(),
        }
    }
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_api_version() -> String {
    "1.0".to_string()
}

/// Response caching hints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// `max-age` advertised by the cache-control decorator.
    #[serde(default = "default_max_age")]
    pub max_age_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age(),
        }
    }
}

fn default_max_age() -> u64 {
    60
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable multi-line output.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            _ => Err(format!("unknown log format '{s}' (expected json or pretty)")),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Whether a subscriber is installed at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Default filter directive; `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// ANSI colors in pretty output.
    #[serde(default)]
    pub ansi_enabled: bool,

    /// Include file and line in each event.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            ansi_enabled: false,
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether the exporter listener is started.
    #[serde(default)]
    pub enabled: bool,

    /// Address the exporter listens on.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Observability settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetryConfigSection {
    /// Service name attached to logs.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Deployment environment label.
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfigSection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "collegium".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}
