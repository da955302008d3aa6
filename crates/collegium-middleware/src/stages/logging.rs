//! Request logging and timing.
//!
//! Wraps everything inside the rate limiter. Emits one line when a request
//! starts and one when it finishes, together with the request metrics:
//!
//! - `collegium_requests_total` counter by operation and status
//! - `collegium_request_duration_seconds` histogram by operation
//!
//! A failure that escapes the exception boundary is logged here and passed
//! on unchanged.

use crate::context::RequestContext;
use crate::middleware::{Middleware, Next};
use crate::types::{HandlerResult, Request};
use collegium_core::BoxFuture;

/// Structured request logger.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestLogging;

impl RequestLogging {
    /// Creates the logger.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for RequestLogging {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            tracing::info!(
                request_id = %ctx.request_id(),
                method = %ctx.method(),
                path = ctx.path(),
                caller = %ctx.identity().log_id(),
                "request started"
            );

            let result = next.run(ctx, request).await;
            let elapsed = ctx.elapsed();
            let duration_ms = elapsed.as_millis() as u64;
            let operation = ctx.operation_label().to_string();

            metrics::histogram!(
                "collegium_request_duration_seconds",
                "operation" => operation.clone()
            )
            .record(elapsed.as_secs_f64());

            match &result {
                Ok(response) => {
                    metrics::counter!(
                        "collegium_requests_total",
                        "operation" => operation,
                        "status" => response.status().as_u16().to_string()
                    )
                    .increment(1);
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        path = ctx.path(),
                        status_code = response.status().as_u16(),
                        duration_ms,
                        "request completed"
                    );
                }
                Err(error) => {
                    metrics::counter!(
                        "collegium_requests_total",
                        "operation" => operation,
                        "status" => "aborted"
                    )
                    .increment(1);
                    tracing::error!(
                        request_id = %ctx.request_id(),
                        method = %ctx.method(),
                        path = ctx.path(),
                        error_category = %error.category(),
                        duration_ms,
                        "request aborted"
                    );
                }
            }

            result
        })
    }
}
