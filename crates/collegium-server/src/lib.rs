//! # Collegium Server
//!
//! HTTP/1.1 hosting for collegium services.
//!
//! - [`Server`] accepts connections on a Tokio listener and drives each one
//!   with hyper
//! - [`Router`] maps method and `{param}` path templates to handlers
//! - [`ShutdownSignal`] and [`ConnectionTracker`] implement graceful drain
//! - `/health` is always mounted and answers with a [`HealthStatus`]
//!
//! Every request runs through the configured
//! [`Pipeline`](collegium_middleware::Pipeline) before reaching its route.
//!
//! ## Example
//!
//! ```rust,no_run
//! use collegium_middleware::{handler_fn, Response, ResponseExt};
//! use collegium_server::{Route, Server, ServerConfig};
//! use http::{Method, StatusCode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let hello = handler_fn(|_ctx, _req| async {
//!         Ok(Response::json(StatusCode::OK, &"hello"))
//!     });
//!
//!     Server::builder()
//!         .config(ServerConfig::builder().http_addr("127.0.0.1:8080").build())
//!         .route(Route::new(Method::GET, "/hello", "hello", hello))
//!         .build()
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/collegium-server/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod health;
mod identity;
mod router;
mod server;
mod shutdown;

pub use config::{
    ServerConfig, ServerConfigBuilder, DEFAULT_HTTP_ADDR, DEFAULT_MAX_BODY_BYTES,
    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
};
pub use error::ServerError;
pub use health::{HealthCheck, HealthStatus, HEALTH_PATH};
pub use identity::{identity_from_headers, USER_ID_HEADER, USER_NAME_HEADER, USER_ROLES_HEADER};
pub use router::{Route, RouteMatch, Router};
pub use server::{Server, ServerBuilder};
pub use shutdown::{ConnectionToken, ConnectionTracker, ShutdownSignal};
