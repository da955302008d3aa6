//! Application assembly.
//!
//! Turns a validated [`CollegiumConfig`] into the running pieces: the
//! telemetry settings, the shared rate limiter, the global pipeline, and a
//! [`Server`] with every route mounted.

use std::sync::Arc;
use std::time::Duration;

use collegium_config::{CollegiumConfig, LogFormat, RateLimitConfig, RateLimitKey};
use collegium_core::{
    Department, DepartmentStore, InMemoryRepository, LocationPolicy, Notifier,
};
use collegium_middleware::stages::rate_limit::{KeyExtractor, RateLimiter};
use collegium_middleware::Pipeline;
use collegium_server::{Server, ServerConfig};
use collegium_telemetry::{LogConfig, MetricsConfig, TelemetryConfig};

use crate::routes;

/// Default recipient of department notifications.
pub const DEFAULT_NOTIFY_TARGET: &str = "registrar@collegium.edu";

/// Shared services handed to route handlers and filters.
#[derive(Clone)]
pub struct AppState {
    /// Department storage.
    pub departments: Arc<InMemoryRepository<Department>>,
    /// The one location policy used by every location check.
    pub policy: Arc<LocationPolicy>,
    /// Delivery channel for department notifications.
    pub notifier: Arc<dyn Notifier>,
    /// Who gets told about department changes.
    pub notify_target: String,
}

impl AppState {
    /// Bundles the services.
    pub fn new(
        departments: InMemoryRepository<Department>,
        policy: LocationPolicy,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            departments: Arc::new(departments),
            policy: Arc::new(policy),
            notifier,
            notify_target: DEFAULT_NOTIFY_TARGET.to_string(),
        }
    }

    /// Redirects notifications to `target`.
    #[must_use]
    pub fn with_notify_target(mut self, target: impl Into<String>) -> Self {
        self.notify_target = target.into();
        self
    }

    /// The repository seen through the lookup seam the filters use.
    pub fn store(&self) -> Arc<dyn DepartmentStore> {
        self.departments.clone()
    }
}

/// Departments the demo server starts with.
pub fn sample_departments() -> Vec<Department> {
    vec![
        Department::new("Computer Science", "smart")
            .with_id(7)
            .with_manager("Dr. Hany")
            .with_pc_numbers(40),
        Department::new("Maritime Studies", "alexandria")
            .with_id(8)
            .with_manager("Dr. Salma"),
        Department::new("Agriculture", "fayoum")
            .with_id(9)
            .with_pc_numbers(12),
    ]
}

/// Maps the file/env logging and metrics sections onto telemetry settings.
pub fn telemetry_config(config: &CollegiumConfig) -> TelemetryConfig {
    let section = &config.telemetry;

    let logging = LogConfig {
        enabled: section.logging.enabled,
        level: section.logging.level.clone(),
        json_format: section.logging.format == LogFormat::Json,
        ansi: section.logging.ansi_enabled,
        file_line_info: section.logging.include_location,
        ..LogConfig::default()
    };

    let metrics = MetricsConfig {
        enabled: section.metrics.enabled,
        addr: section.metrics.addr.clone(),
        ..MetricsConfig::default()
    };

    TelemetryConfig::for_service(&section.service_name, &section.environment)
        .with_logging(logging)
        .with_metrics(metrics)
}

/// Listener settings for the server.
pub fn server_config(config: &CollegiumConfig) -> ServerConfig {
    ServerConfig::builder()
        .http_addr(config.server.http_addr.clone())
        .shutdown_timeout(config.shutdown_timeout())
        .keep_alive(config.server.keep_alive)
        .trust_identity_headers(config.server.trust_identity_headers)
        .development(config.development)
        .max_body_bytes(config.payload.max_bytes)
        .build()
}

/// Builds the limiter, or `None` when rate limiting is disabled.
pub fn rate_limiter(config: &RateLimitConfig) -> Option<Arc<RateLimiter>> {
    if !config.enabled {
        return None;
    }

    let key = match &config.key {
        RateLimitKey::RemoteAddr => KeyExtractor::RemoteAddr,
        RateLimitKey::Header(name) => KeyExtractor::Header(name.clone()),
        RateLimitKey::Global => KeyExtractor::Global,
    };
    let exempt = config.exempt_paths.clone();

    let mut builder = RateLimiter::builder()
        .limit(u64::from(config.limit))
        .window_secs(config.window_secs)
        .key(key)
        .skip(move |request| exempt.iter().any(|path| path == request.uri().path()));
    if let Some(message) = &config.message {
        builder = builder.message(message.clone());
    }
    Some(Arc::new(builder.build()))
}

/// Periodically drops limiter entries whose window has passed.
///
/// Must be called inside a Tokio runtime.
pub fn spawn_limiter_purge(
    limiter: Arc<RateLimiter>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired(tokio::time::Instant::now().into_std());
            if purged > 0 {
                tracing::debug!(purged, remaining = limiter.tracked_clients(), "purged rate limit windows");
            }
        }
    })
}

/// Builds the server with every route mounted.
pub fn build_server(
    config: &CollegiumConfig,
    state: &AppState,
    limiter: Option<Arc<RateLimiter>>,
) -> Server {
    Server::builder()
        .config(server_config(config))
        .pipeline(Pipeline::standard(limiter))
        .service_name(config.telemetry.service_name.clone())
        .service_version(crate::VERSION)
        .routes(routes::departments::routes(config, state))
        .routes(routes::headers::routes())
        .build()
}
