//! Liveness endpoint.

use std::time::{Duration, Instant};

use collegium_middleware::{handler_fn, Handler, Response, ResponseExt};
use http::StatusCode;
use serde::{Deserialize, Serialize};

/// Path the health route is mounted on.
pub const HEALTH_PATH: &str = "/health";

/// Body of the `/health` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthStatus {
    /// Always `"healthy"` while the process serves requests.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
    /// Seconds since the server was built.
    pub uptime_seconds: u64,
}

/// Produces [`HealthStatus`] snapshots.
///
/// ```rust
/// use collegium_server::HealthCheck;
///
/// let health = HealthCheck::new("collegium", "0.1.0");
/// assert_eq!(health.status().status, "healthy");
/// ```
#[derive(Debug, Clone)]
pub struct HealthCheck {
    service: String,
    version: String,
    start_time: Instant,
}

impl HealthCheck {
    /// Starts the uptime clock.
    #[must_use]
    pub fn new(service: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            version: version.into(),
            start_time: Instant::now(),
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            service: self.service.clone(),
            version: self.version.clone(),
            uptime_seconds: self.uptime().as_secs(),
        }
    }

    /// Time since construction.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// A handler answering `200` with the current status.
    #[must_use]
    pub fn handler(&self) -> impl Handler {
        let health = self.clone();
        handler_fn(move |_ctx, _request| {
            let status = health.status();
            async move { Ok(Response::json(StatusCode::OK, &status)) }
        })
    }
}
