//! Typed configuration for Collegium servers.
//!
//! Configuration is assembled in layers (defaults, then a TOML or JSON file,
//! then `.env`, then environment variables) and validated once at the end.
//! Every section rejects unknown fields, so a typo in a file is an error
//! rather than a silently ignored setting.
//!
//! # Example
//!
//! ```no_run
//! use collegium_config::ConfigLoader;
//!
//! # fn main() -> Result<(), collegium_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_optional_file("collegium.toml")?
//!     .with_dotenv()?
//!     .with_env_prefix("COLLEGIUM")
//!     .load()?;
//!
//! println!("listening on {}", config.server.http_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # File format
//!
//! ```toml
//! development = false
//!
//! [server]
//! http_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//!
//! [rate_limit]
//! enabled = true
//! limit = 100
//! window_secs = 60
//! key = "remote_addr"        # or "global", or "header:x-api-key"
//! exempt_paths = ["/health"]
//!
//! [locations]
//! allowed = ["smart", "fayoum"]
//!
//! [payload]
//! max_bytes = 10485760
//! api_version = "1.0"
//!
//! [cache]
//! max_age_secs = 60
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment overrides
//!
//! Variables follow `PREFIX__SECTION__KEY`, e.g.
//! `COLLEGIUM__RATE_LIMIT__LIMIT=50` or
//! `COLLEGIUM__LOCATIONS__ALLOWED=smart,fayoum,cairo`. List values are
//! comma-separated.

mod config;
mod error;
mod loader;
mod schema;

pub use config::{CollegiumConfig, CollegiumConfigBuilder};
pub use error::ConfigError;
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    CacheConfig, LocationsConfig, LogFormat, LoggingConfig, MetricsConfig, PayloadConfig,
    RateLimitConfig, RateLimitKey, ServerConfig, TelemetryConfigSection,
};
