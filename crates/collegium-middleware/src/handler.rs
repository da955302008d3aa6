//! Handlers: the innermost unit the pipeline wraps.

use crate::context::RequestContext;
use crate::types::{HandlerResult, Request};
use collegium_core::BoxFuture;
use std::future::Future;
use std::sync::Arc;

/// An async request handler.
///
/// Handlers receive the request context (route parameters, bound arguments,
/// identity) and the request itself. Returning `Err` hands the failure to the
/// exception boundary.
///
/// [`FilterChain`](crate::FilterChain) also implements `Handler`, so a chain
/// of filters is itself a handler that can be nested or mounted on a route.
pub trait Handler: Send + Sync + 'static {
    /// Handles one request.
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
    ) -> BoxFuture<'a, HandlerResult>;
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
    ) -> BoxFuture<'a, HandlerResult> {
        (**self).call(ctx, request)
    }
}

/// A handler built from a closure.
///
/// The closure reads whatever it needs from the context synchronously and
/// returns a `'static` future.
pub struct FnHandler<F> {
    func: F,
}

impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(&mut RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin((self.func)(ctx, request))
    }
}

/// Wraps a closure as a [`Handler`].
///
/// # Example
///
/// ```
/// use collegium_middleware::{handler_fn, Response, ResponseExt};
/// use http::StatusCode;
///
/// let handler = handler_fn(|ctx, _request| {
///     let id = ctx.route_param("deptId").unwrap_or("none").to_string();
///     async move { Ok(Response::json(StatusCode::OK, &serde_json::json!({ "id": id }))) }
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(func: F) -> FnHandler<F>
where
    F: Fn(&mut RequestContext, Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    FnHandler { func }
}
