//! Outer middleware pipeline.
//!
//! Every request flows through the same outer layers, in this order:
//!
//! 1. **Rate limit** - reject excess traffic before anything else
//! 2. **Logging** - start and end lines, duration, request metrics
//! 3. **Exception boundary** - turn failures and panics into responses
//!
//! Inside the boundary sits the route's endpoint, normally a
//! [`FilterChain`](crate::FilterChain), which runs the per-route stages
//! listed by [`Stage`].

use crate::context::RequestContext;
use crate::handler::Handler;
use crate::middleware::{Middleware, Next};
use crate::stages::exception::ExceptionBoundary;
use crate::stages::logging::RequestLogging;
use crate::stages::rate_limit::{RateLimitMiddleware, RateLimiter};
use crate::types::{HandlerResult, Request};
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// An ordered stack of middleware wrapped around an endpoint.
///
/// # Example
///
/// ```
/// use collegium_middleware::pipeline::Pipeline;
/// use collegium_middleware::stages::rate_limit::RateLimiter;
/// use std::sync::Arc;
///
/// let pipeline = Pipeline::standard(Some(Arc::new(RateLimiter::default())));
/// assert_eq!(pipeline.stage_names(), vec!["rate_limit", "logging", "exception_boundary"]);
/// ```
#[derive(Clone)]
pub struct Pipeline {
    stages: Vec<BoxedMiddleware>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Rate limit (when a limiter is given), logging, exception boundary.
    #[must_use]
    pub fn standard(limiter: Option<Arc<RateLimiter>>) -> Self {
        let mut builder = Self::builder();
        if let Some(limiter) = limiter {
            builder = builder.add_stage(RateLimitMiddleware::new(limiter));
        }
        builder
            .add_stage(RequestLogging::new())
            .add_stage(ExceptionBoundary::new())
            .build()
    }

    /// Runs `request` through every stage and then `endpoint`.
    ///
    /// `Err` only escapes when a failure happened after the response had
    /// started; the caller must then abort the transport.
    pub async fn process(
        &self,
        ctx: &mut RequestContext,
        request: Request,
        endpoint: &dyn Handler,
    ) -> HandlerResult {
        let mut next = Next::endpoint(endpoint);
        for middleware in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next.run(ctx, request).await
    }

    /// Returns the names of all middleware stages in order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for constructing a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    stages: Vec<BoxedMiddleware>,
}

impl PipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a stage. Earlier stages wrap later ones.
    #[must_use]
    pub fn add_stage<M: Middleware>(mut self, middleware: M) -> Self {
        self.stages.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared stage.
    #[must_use]
    pub fn add_shared_stage(mut self, middleware: BoxedMiddleware) -> Self {
        self.stages.push(middleware);
        self
    }

    /// Builds the pipeline.
    #[must_use]
    pub fn build(self) -> Pipeline {
        Pipeline {
            stages: self.stages,
        }
    }
}

/// Every stage a request can pass through, outermost first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Per-client admission control.
    RateLimit = 1,
    /// Request logging and timing.
    Logging = 2,
    /// Failure and panic translation.
    ExceptionBoundary = 3,
    /// Resource filters.
    Resource = 4,
    /// Model binding.
    Binding = 5,
    /// Authorization filters.
    Authorization = 6,
    /// Action filters.
    Action = 7,
    /// The route handler.
    Handler = 8,
    /// Result decorators.
    Result = 9,
}

impl Stage {
    /// Returns `true` for the global middleware layers.
    #[must_use]
    pub const fn is_middleware(self) -> bool {
        (self as u8) <= 3
    }

    /// Returns `true` for stages configured per route.
    #[must_use]
    pub const fn is_route_level(self) -> bool {
        (self as u8) >= 4
    }

    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::RateLimit => "rate_limit",
            Self::Logging => "logging",
            Self::ExceptionBoundary => "exception_boundary",
            Self::Resource => "resource",
            Self::Binding => "binding",
            Self::Authorization => "authorization",
            Self::Action => "action",
            Self::Handler => "handler",
            Self::Result => "result",
        }
    }

    /// Returns all stages in order.
    #[must_use]
    pub const fn all() -> [Stage; 9] {
        [
            Self::RateLimit,
            Self::Logging,
            Self::ExceptionBoundary,
            Self::Resource,
            Self::Binding,
            Self::Authorization,
            Self::Action,
            Self::Handler,
            Self::Result,
        ]
    }
}
