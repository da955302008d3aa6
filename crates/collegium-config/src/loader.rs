//! Layered configuration loading.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::{CollegiumConfig, ConfigError};

/// Default prefix for environment overrides.
pub const DEFAULT_ENV_PREFIX: &str = "COLLEGIUM";

/// Builds a [`CollegiumConfig`] from layered sources.
///
/// Later layers override earlier ones:
/// 1. Built-in defaults (or a preset)
/// 2. A TOML or JSON file
/// 3. A `.env` file, loaded into the process environment
/// 4. `PREFIX__SECTION__KEY` environment variables
///
/// # Example
///
/// ```no_run
/// use collegium_config::ConfigLoader;
///
/// # fn main() -> Result<(), collegium_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_optional_file("collegium.toml")?
///     .with_dotenv()?
///     .with_env_prefix("COLLEGIUM")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: CollegiumConfig,
    env_prefix: Option<String>,
    source: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Start from [`CollegiumConfig::default`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: CollegiumConfig::default(),
            env_prefix: None,
            source: None,
        }
    }

    /// Start from the development preset.
    ///
    /// ```
    /// use collegium_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert!(config.development);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = CollegiumConfig::development();
        self
    }

    /// Start from the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = CollegiumConfig::production();
        self
    }

    /// Replace the configuration with the contents of a file.
    ///
    /// The format follows the extension (`.toml` or `.json`). Sections and
    /// fields missing from the file take their defaults.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        self.config = Self::parse_file(&content, path)?;
        self.source = Some(path.to_path_buf());
        debug!(path = %path.display(), "configuration file loaded");

        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is not an error.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Replace the configuration with inline content.
    ///
    /// ```
    /// use collegium_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string("[rate_limit]\nlimit = 10", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.rate_limit.limit, 10);
    /// assert_eq!(config.rate_limit.window_secs, 60);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        self.config = Self::parse(content, format)?;
        Ok(self)
    }

    /// Enable `PREFIX__SECTION__KEY` overrides.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load `.env` from the working directory into the process environment.
    ///
    /// A missing file is ignored; a malformed one is an error.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), ".env loaded"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Ok(self)
    }

    /// Load a specific `.env` file into the process environment.
    pub fn with_dotenv_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        dotenvy::from_path(path.as_ref())?;
        Ok(self)
    }

    /// The file the current configuration came from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Apply environment overrides and validate.
    ///
    /// ```
    /// use collegium_config::ConfigLoader;
    ///
    /// let config = ConfigLoader::new().load().unwrap();
    /// assert_eq!(config.server.http_addr, "0.0.0.0:8080");
    /// ```
    pub fn load(mut self) -> Result<CollegiumConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            let vars: Vec<(String, String)> = env::vars()
                .filter(|(k, _)| k.starts_with(&prefix))
                .collect();
            self.apply_env_vars(&prefix, vars)?;
        }

        self.config.validate()?;
        Ok(self.config)
    }

    /// Return the configuration without overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> CollegiumConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<CollegiumConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        Self::parse(content, extension)
    }

    fn parse(content: &str, format: &str) -> Result<CollegiumConfig, ConfigError> {
        match format.to_lowercase().as_str() {
            "toml" => Ok(toml::from_str(content)?),
            "json" => Ok(serde_json::from_str(content)?),
            other => Err(ConfigError::unsupported_format(other)),
        }
    }

    fn apply_env_vars<I>(&mut self, prefix: &str, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }
        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let Some(path) = key.strip_prefix(prefix).and_then(|k| k.strip_prefix("__")) else {
            return Ok(());
        };

        let parts: Vec<&str> = path.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["DEVELOPMENT"] => config.development = bool_var(key, value)?,

            ["SERVER", "HTTP_ADDR"] => config.server.http_addr = value.to_string(),
            ["SERVER", "SHUTDOWN_TIMEOUT_SECS"] => {
                config.server.shutdown_timeout_secs = int_var(key, value)?;
            }
            ["SERVER", "KEEP_ALIVE"] => config.server.keep_alive = bool_var(key, value)?,
            ["SERVER", "TRUST_IDENTITY_HEADERS"] => {
                config.server.trust_identity_headers = bool_var(key, value)?;
            }

            ["RATE_LIMIT", "ENABLED"] => config.rate_limit.enabled = bool_var(key, value)?,
            ["RATE_LIMIT", "LIMIT"] => config.rate_limit.limit = int_var(key, value)?,
            ["RATE_LIMIT", "WINDOW_SECS"] => config.rate_limit.window_secs = int_var(key, value)?,
            ["RATE_LIMIT", "KEY"] => {
                config.rate_limit.key = value
                    .parse()
                    .map_err(|reason: String| ConfigError::env_parse_error(key, reason))?;
            }
            ["RATE_LIMIT", "EXEMPT_PATHS"] => config.rate_limit.exempt_paths = list_var(value),
            ["RATE_LIMIT", "MESSAGE"] => {
                config.rate_limit.message = (!value.is_empty()).then(|| value.to_string());
            }

            ["LOCATIONS", "ALLOWED"] => config.locations.allowed = list_var(value),

            ["PAYLOAD", "MAX_BYTES"] => config.payload.max_bytes = int_var(key, value)?,
            ["PAYLOAD", "API_VERSION"] => config.payload.api_version = value.to_string(),

            ["CACHE", "MAX_AGE_SECS"] => config.cache.max_age_secs = int_var(key, value)?,

            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "ENVIRONMENT"] => config.telemetry.environment = value.to_string(),
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = value
                    .parse()
                    .map_err(|reason: String| ConfigError::env_parse_error(key, reason))?;
            }
            ["TELEMETRY", "LOGGING", "ANSI_ENABLED"] => {
                config.telemetry.logging.ansi_enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "INCLUDE_LOCATION"] => {
                config.telemetry.logging.include_location = bool_var(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ENABLED"] => {
                config.telemetry.metrics.enabled = bool_var(key, value)?;
            }
            ["TELEMETRY", "METRICS", "ADDR"] => config.telemetry.metrics.addr = value.to_string(),

            _ => debug!(var = key, "ignoring unrecognized configuration override"),
        }

        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn bool_var(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_parse_error(key, "expected boolean"))
}

fn int_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_parse_error(key, "expected integer"))
}

fn list_var(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
