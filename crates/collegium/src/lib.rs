//! # Collegium
//!
//! A composable request pipeline for university-management services, plus
//! the small HTTP application that exercises it.
//!
//! Every request passes the global middleware, then the filter chain its
//! route was registered with:
//!
//! ```text
//! RateLimit -> Logging -> ExceptionBoundary ->
//!   [ Resource -> binding -> Authorization -> Action -> Handler
//!     -> Action(after) -> Result -> Resource(after) ]
//! ```
//!
//! ## Crates
//!
//! - [`core`]: errors, caller identity, location policy, department model,
//!   repository and notification seams
//! - [`middleware`]: the pipeline, filter chain and the stock filters
//! - [`server`]: hyper-based hosting, routing and graceful shutdown
//! - [`config`]: layered configuration
//! - [`telemetry`]: logging and Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use collegium::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().with_development().load()?;
//!     let state = AppState::new(
//!         InMemoryRepository::seeded(sample_departments()),
//!         config.locations.policy(),
//!         Arc::new(TracingNotifier::new(Channel::Email)),
//!     );
//!
//!     let limiter = rate_limiter(&config.rate_limit);
//!     build_server(&config, &state, limiter).run().await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/collegium/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod app;
pub mod routes;

pub use collegium_config as config;
pub use collegium_core as core;
pub use collegium_middleware as middleware;
pub use collegium_server as server;
pub use collegium_telemetry as telemetry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common imports.
pub mod prelude {
    pub use crate::app::{
        build_server, rate_limiter, sample_departments, server_config, telemetry_config, AppState,
    };
    pub use collegium_config::{CollegiumConfig, ConfigLoader};
    pub use collegium_core::{
        roles, CallerIdentity, Channel, Department, DepartmentStore, InMemoryRepository,
        LocationPolicy, Notifier, PipelineError, Repository, TracingNotifier,
    };
    pub use collegium_middleware::{
        handler_fn, FilterChain, Handler, Pipeline, RequestContext, Response, ResponseChannel,
        ResponseExt,
    };
    pub use collegium_server::{Route, Server, ShutdownSignal};
}
