//! # Collegium Middleware
//!
//! The composable request pipeline.
//!
//! Global middleware wraps every request; a per-route [`FilterChain`] wraps
//! the handler:
//!
//! ```text
//! RateLimit -> Logging -> ExceptionBoundary ->
//!   [ Resource(before) -> binding -> Authorization -> Action(before)
//!     -> Handler -> Action(after) -> Result -> Resource(after) ]
//! ```
//!
//! Any "before" step may short-circuit with a response. Inner steps are then
//! skipped, but the "after" hooks of every step already entered still run,
//! innermost first.
//!
//! Once a response has started transmitting, headers are frozen:
//! [`HeaderWriter`] skips writes with a warning and the exception boundary
//! propagates failures instead of writing an error page.
//!
//! ## Example
//!
//! ```
//! use collegium_middleware::pipeline::{Pipeline, Stage};
//!
//! let stages = Stage::all();
//! assert_eq!(stages.len(), 9);
//! assert_eq!(stages[0].name(), "rate_limit");
//! assert_eq!(Pipeline::standard(None).stage_count(), 2);
//! ```

#![doc(html_root_url = "https://docs.rs/collegium-middleware/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod binding;
pub mod chain;
pub mod context;
pub mod filters;
pub mod handler;
pub mod middleware;
pub mod outcome;
pub mod pipeline;
pub mod response_state;
pub mod stages;
pub mod types;

pub use binding::BindingOptions;
pub use chain::{FilterChain, FilterChainBuilder};
pub use collegium_core::BoxFuture;
pub use context::{BoundBody, RequestContext};
pub use filters::{ActionFilter, AuthorizationFilter, ResourceFilter, ResultFilter};
pub use handler::{handler_fn, FnHandler, Handler};
pub use middleware::{FnMiddleware, Middleware, Next};
pub use outcome::PipelineResult;
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use response_state::{HeaderWrite, HeaderWriter, ResponseState, Transmission};
pub use types::{HandlerResult, Request, Response, ResponseChannel, ResponseExt};
