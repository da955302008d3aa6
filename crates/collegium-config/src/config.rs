//! Root configuration type and builder.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    CacheConfig, ConfigError, LocationsConfig, LogFormat, PayloadConfig, RateLimitConfig,
    ServerConfig, TelemetryConfigSection,
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Longest accepted `cache.max_age_secs`: one year.
const MAX_CACHE_AGE_SECS: u64 = 365 * 24 * 60 * 60;

/// Complete Collegium server configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to assemble one from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use collegium_config::CollegiumConfig;
///
/// let config = CollegiumConfig::default();
/// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
/// assert_eq!(config.rate_limit.limit, 100);
/// assert!(config.locations.policy().allows("fayoum"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct CollegiumConfig {
    /// Include exception details in error responses and headers.
    #[serde(default)]
    pub development: bool,

    /// Listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiter settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Campus allow-list.
    #[serde(default)]
    pub locations: LocationsConfig,

    /// Payload guard and API version checks.
    #[serde(default)]
    pub payload: PayloadConfig,

    /// Cache-control decoration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Logging and metrics.
    #[serde(default)]
    pub telemetry: TelemetryConfigSection,
}

impl CollegiumConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> CollegiumConfigBuilder {
        CollegiumConfigBuilder::new()
    }

    /// Parsed listener address.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when `server.http_addr` is not a
    /// socket address.
    pub fn http_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.http_addr.parse().map_err(|_| {
            ConfigError::invalid_value(
                "server.http_addr",
                format!("invalid socket address: {}", self.server.http_addr),
            )
        })
    }

    /// Grace period for draining connections on shutdown.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Rate limiter window.
    #[must_use]
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit.window_secs)
    }

    /// Validate cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.http_addr()?;

        if self.telemetry.metrics.enabled
            && self.telemetry.metrics.addr.parse::<SocketAddr>().is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        if self.rate_limit.enabled {
            if self.rate_limit.limit == 0 {
                return Err(ConfigError::invalid_value(
                    "rate_limit.limit",
                    "must be greater than zero",
                ));
            }
            if self.rate_limit.window_secs == 0 {
                return Err(ConfigError::invalid_value(
                    "rate_limit.window_secs",
                    "must be greater than zero",
                ));
            }
        }

        if self.locations.policy().allowed().is_empty() {
            return Err(ConfigError::invalid_value(
                "locations.allowed",
                "at least one location is required",
            ));
        }

        if self.payload.max_bytes == 0 {
            return Err(ConfigError::invalid_value(
                "payload.max_bytes",
                "must be greater than zero",
            ));
        }

        if self.cache.max_age_secs > MAX_CACHE_AGE_SECS {
            return Err(ConfigError::invalid_value(
                "cache.max_age_secs",
                format!("must be at most {MAX_CACHE_AGE_SECS} (one year)"),
            ));
        }

        if self.payload.api_version.trim().is_empty() {
            return Err(ConfigError::missing_field("payload.api_version"));
        }

        let level = self.telemetry.logging.level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::invalid_value(
                "telemetry.logging.level",
                format!("expected one of {}", LOG_LEVELS.join(", ")),
            ));
        }

        Ok(())
    }

    /// Local development preset: pretty debug logs, exception details exposed.
    ///
    /// ```
    /// use collegium_config::CollegiumConfig;
    ///
    /// let config = CollegiumConfig::development();
    /// assert!(config.development);
    /// assert_eq!(config.telemetry.logging.level, "debug");
    /// ```
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self {
            development: true,
            ..Self::default()
        };

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.ansi_enabled = true;
        config.telemetry.logging.include_location = true;
        config.telemetry.environment = "development".to_string();

        config
    }

    /// Production preset: JSON logs, metrics exporter on, details hidden.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.logging.ansi_enabled = false;
        config.telemetry.environment = "production".to_string();
        config.telemetry.metrics.enabled = true;

        config
    }
}

/// Builder for [`CollegiumConfig`].
#[derive(Debug, Default)]
pub struct CollegiumConfigBuilder {
    development: bool,
    server: Option<ServerConfig>,
    rate_limit: Option<RateLimitConfig>,
    locations: Option<LocationsConfig>,
    payload: Option<PayloadConfig>,
    cache: Option<CacheConfig>,
    telemetry: Option<TelemetryConfigSection>,
}

impl CollegiumConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle development mode.
    #[must_use]
    pub fn development(mut self, enabled: bool) -> Self {
        self.development = enabled;
        self
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the rate limit section.
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Replace the allowed locations.
    #[must_use]
    pub fn allowed_locations<I, S>(mut self, locations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.locations = Some(LocationsConfig {
            allowed: locations.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Set the payload section.
    #[must_use]
    pub fn payload(mut self, payload: PayloadConfig) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the cache section.
    #[must_use]
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the telemetry section.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetryConfigSection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Build the configuration; unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> CollegiumConfig {
        CollegiumConfig {
            development: self.development,
            server: self.server.unwrap_or_default(),
            rate_limit: self.rate_limit.unwrap_or_default(),
            locations: self.locations.unwrap_or_default(),
            payload: self.payload.unwrap_or_default(),
            cache: self.cache.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
        }
    }

    /// Build and validate.
    pub fn build_validated(self) -> Result<CollegiumConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RateLimitKey;

    #[test]
    fn test_default_config() {
        let config = CollegiumConfig::default();
        assert!(!config.development);
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.rate_limit.key, RateLimitKey::RemoteAddr);
        assert_eq!(config.cache.max_age_secs, 60);
        assert_eq!(config.telemetry.service_name, "collegium");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_sections() {
        let config = CollegiumConfig::builder()
            .development(true)
            .rate_limit(RateLimitConfig {
                limit: 5,
                ..Default::default()
            })
            .allowed_locations(["cairo"])
            .build();

        assert!(config.development);
        assert_eq!(config.rate_limit.limit, 5);
        assert!(config.locations.policy().allows("Cairo"));
        assert!(!config.locations.policy().allows("smart"));
        assert_eq!(config.payload.api_version, "1.0");
    }

    #[test]
    fn test_durations() {
        let config = CollegiumConfig::default();
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(30));
        assert_eq!(config.rate_limit_window(), Duration::from_secs(60));
    }

    #[test]
    fn test_validate_invalid_server_addr() {
        let config = CollegiumConfig::builder()
            .server(ServerConfig {
                http_addr: "not-an-address".to_string(),
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http_addr"));
    }

    #[test]
    fn test_validate_metrics_addr_only_when_enabled() {
        let mut config = CollegiumConfig::default();
        config.telemetry.metrics.addr = "invalid".to_string();
        assert!(config.validate().is_ok());

        config.telemetry.metrics.enabled = true;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.addr"));
    }

    #[test]
    fn test_validate_zero_window() {
        let config = CollegiumConfig::builder()
            .rate_limit(RateLimitConfig {
                window_secs: 0,
                ..Default::default()
            })
            .build();
        assert!(config.validate().unwrap_err().to_string().contains("window_secs"));

        let disabled = CollegiumConfig::builder()
            .rate_limit(RateLimitConfig {
                enabled: false,
                window_secs: 0,
                ..Default::default()
            })
            .build();
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn test_validate_empty_locations() {
        let result = CollegiumConfig::builder()
            .allowed_locations(["  ", ""])
            .build_validated();
        assert!(result.unwrap_err().to_string().contains("locations.allowed"));
    }

    #[test]
    fn test_validate_cache_max_age_bound() {
        let mut config = CollegiumConfig::default();
        config.cache.max_age_secs = MAX_CACHE_AGE_SECS;
        assert!(config.validate().is_ok());

        config.cache.max_age_secs = 1_000_000_000_000;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("cache.max_age_secs"));
    }

    #[test]
    fn test_validate_log_level() {
        let mut config = CollegiumConfig::default();
        config.telemetry.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());

        config.telemetry.logging.level = "WARN".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        let dev = CollegiumConfig::development();
        assert_eq!(dev.telemetry.logging.format, LogFormat::Pretty);
        assert!(dev.telemetry.logging.ansi_enabled);

        let prod = CollegiumConfig::production();
        assert!(!prod.development);
        assert_eq!(prod.telemetry.logging.format, LogFormat::Json);
        assert!(prod.telemetry.metrics.enabled);
        assert!(prod.validate().is_ok());
    }

    #[test]
    fn test_toml_roundtrip_sections() {
        let toml_str = toml::to_string_pretty(&CollegiumConfig::default()).unwrap();
        assert!(toml_str.contains("[rate_limit]"));
        assert!(toml_str.contains("[locations]"));
        assert!(toml_str.contains("[telemetry.logging]"));
    }

    #[test]
    fn test_unknown_top_level_field_rejected() {
        let result: Result<CollegiumConfig, _> = toml::from_str("debug = true");
        assert!(result.is_err());
    }
}
