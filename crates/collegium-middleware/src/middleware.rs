//! Core middleware trait and types.
//!
//! Middleware wraps the whole remaining pipeline: it sees the request on the
//! way in and the result on the way out. The outer layers (rate limiting,
//! request logging, exception boundary) are middleware; everything route
//! specific lives in a [`FilterChain`](crate::FilterChain).
//!
//! # Example
//!
//! ```
//! use collegium_middleware::{BoxFuture, HandlerResult, Middleware, Next, Request, RequestContext};
//!
//! struct Stamp;
//!
//! impl Middleware for Stamp {
//!     fn name(&self) -> &'static str {
//!         "stamp"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, HandlerResult> {
//!         Box::pin(async move {
//!             let mut response = next.run(ctx, request).await?;
//!             response.headers_mut().insert("x-stamp", "1".parse().unwrap());
//!             Ok(response)
//!         })
//!     }
//! }
//! ```

use crate::context::RequestContext;
use crate::handler::Handler;
use crate::types::{HandlerResult, Request};
use collegium_core::BoxFuture;
use std::future::Future;

/// The core middleware trait.
///
/// # Invariants
///
/// - Middleware calls `next.run()` at most once.
/// - Middleware that does not translate failures passes `Err` through
///   unchanged.
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    ///
    /// This name is used for logging, metrics, and debugging.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult>;
}

/// Callback to invoke the next middleware in the chain.
///
/// Consumed on use. Dropping it without calling `run` short-circuits
/// everything downstream.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    Endpoint(&'a dyn Handler),
}

impl<'a> Next<'a> {
    /// Creates a `Next` that invokes `middleware`, then `next`.
    pub fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the endpoint handler.
    pub fn endpoint(handler: &'a dyn Handler) -> Self {
        Self {
            inner: NextInner::Endpoint(handler),
        }
    }

    /// Invokes the next middleware or the endpoint.
    pub async fn run(self, ctx: &mut RequestContext, request: Request) -> HandlerResult {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Endpoint(handler) => handler.call(ctx, request).await,
        }
    }
}

/// A middleware that can be created from an async function.
///
/// The function inspects the context and request head and decides whether to
/// answer immediately (`Some`) or continue downstream (`None`). The future it
/// returns must be `'static`, so read what you need before the `async` block.
pub struct FnMiddleware<F> {
    name: &'static str,
    func: F,
}

impl<F> FnMiddleware<F> {
    /// Creates a new function-based middleware.
    pub fn new<Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(&mut RequestContext, &Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<HandlerResult>> + Send + 'static,
    {
        Self { name, func }
    }
}

impl<F, Fut> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestContext, &Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Option<HandlerResult>> + Send + 'static,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        let decision = (self.func)(ctx, &request);
        Box::pin(async move {
            match decision.await {
                Some(result) => result,
                None => next.run(ctx, request).await,
            }
        })
    }
}
