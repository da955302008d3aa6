//! Global exception boundary.
//!
//! Catches every `Err` and every panic raised downstream. While the response
//! has not started, the failure becomes one well-formed error response in the
//! route's channel. Once it has started, nothing can be written any more:
//! the failure is logged and propagated so the transport can abort the
//! connection.

use crate::context::RequestContext;
use crate::middleware::{Middleware, Next};
use crate::response_state::HeaderWriter;
use crate::types::{error_page, HandlerResult, Request, Response, ResponseChannel, ResponseExt};
use collegium_core::{BoxFuture, PipelineError};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;

/// Development-only header naming the error type.
pub const EXCEPTION_TYPE_HEADER: &str = "X-Exception-Type";

/// Development-only header carrying the flattened error message.
pub const EXCEPTION_MESSAGE_HEADER: &str = "X-Exception-Message";

/// Extracts a printable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Renders `error` for the context's channel.
///
/// Outside development mode only the category's safe message is exposed.
pub fn error_response(ctx: &RequestContext, error: &PipelineError) -> Response {
    let development = ctx.is_development();
    let status = error.status_code();

    let mut response = match ctx.channel() {
        ResponseChannel::Json => {
            let request_id = ctx.request_id().to_string();
            let envelope = error
                .to_envelope(Some(&request_id), development)
                .with_path(ctx.path())
                .with_timestamp(chrono::Utc::now().to_rfc3339());
            Response::json(status, &envelope)
        }
        ResponseChannel::Html => Response::html(
            status,
            error_page(error.category().title(), &error.public_message(development)),
        ),
    };

    if development {
        let state = ctx.response_state().clone();
        let mut headers = HeaderWriter::new(&mut response, &state, "exception_boundary");
        headers.try_set(EXCEPTION_TYPE_HEADER, error.kind());
        headers.try_set(EXCEPTION_MESSAGE_HEADER, &flatten(&error.detail()));
    }

    response
}

fn flatten(message: &str) -> String {
    message.replace(['\r', '\n'], " ")
}

/// Converts downstream failures into error responses.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExceptionBoundary;

impl ExceptionBoundary {
    /// Creates the boundary.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for ExceptionBoundary {
    fn name(&self) -> &'static str {
        "exception_boundary"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            let error = match AssertUnwindSafe(next.run(ctx, request)).catch_unwind().await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(error)) => error,
                Err(panic) => PipelineError::unclassified(format!(
                    "unhandled panic: {}",
                    panic_message(panic.as_ref())
                )),
            };

            let started = ctx.response_state().has_started();
            metrics::counter!(
                "collegium_errors_total",
                "category" => error.category().as_str()
            )
            .increment(1);
            tracing::error!(
                request_id = %ctx.request_id(),
                operation_id = ctx.operation_label(),
                error_category = %error.category(),
                error = %error.detail(),
                response_started = started,
                "unhandled failure"
            );

            if started {
                return Err(error);
            }
            Ok(error_response(ctx, &error))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use bytes::Bytes;
    use collegium_core::FieldErrors;
    use http::StatusCode;
    use http_body_util::{BodyExt, Full};

    fn request() -> Request {
        http::Request::builder()
            .uri("/departments/7")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic payload");
    }

    #[tokio::test]
    async fn test_json_channel_envelope() {
        let handler = handler_fn(|_ctx, _req| async { Err(PipelineError::not_found("no such row")) });
        let req = request();
        let mut ctx = RequestContext::from_request(&req, None);
        ctx.set_channel(ResponseChannel::Json);

        let response = ExceptionBoundary
            .process(&mut ctx, req, Next::endpoint(&handler))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(!response.headers().contains_key(EXCEPTION_TYPE_HEADER));

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
        assert_eq!(json["path"], "/departments/7");
        assert_eq!(json["request_id"], ctx.request_id().to_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_markup_channel_hides_details() {
        let handler = handler_fn(|_ctx, _req| async {
            Err(PipelineError::unclassified("db password is hunter2"))
        });
        let req = request();
        let mut ctx = RequestContext::from_request(&req, None);

        let response = ExceptionBoundary
            .process(&mut ctx, req, Next::endpoint(&handler))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let html = body_text(response).await;
        assert!(html.contains("<html>"));
        assert!(!html.contains("hunter2"));
    }

    #[tokio::test]
    async fn test_development_headers() {
        let handler = handler_fn(|_ctx, _req| async {
            let mut fields = FieldErrors::new();
            fields.add("location", "required");
            Err(PipelineError::bad_input_with_fields("line one\nline two", fields))
        });
        let req = request();
        let mut ctx = RequestContext::from_request(&req, None);
        ctx.set_development(true);
        ctx.set_channel(ResponseChannel::Json);

        let response = ExceptionBoundary
            .process(&mut ctx, req, Next::endpoint(&handler))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[EXCEPTION_TYPE_HEADER], "BadInput");
        assert_eq!(response.headers()[EXCEPTION_MESSAGE_HEADER], "line one line two");
    }

    #[tokio::test]
    async fn test_panic_becomes_500() {
        let handler = handler_fn(|_ctx, _req| {
            let explode = true;
            async move {
                if explode {
                    panic!("handler exploded");
                }
                Ok(Response::html(StatusCode::OK, "unreachable"))
            }
        });
        let req = request();
        let mut ctx = RequestContext::from_request(&req, None);

        let response = ExceptionBoundary
            .process(&mut ctx, req, Next::endpoint(&handler))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_started_response_propagates() {
        let handler = handler_fn(|ctx, _req| {
            ctx.response_state().mark_started();
            async { Err(PipelineError::unclassified("stream broke")) }
        });
        let req = request();
        let mut ctx = RequestContext::from_request(&req, None);

        let error = ExceptionBoundary
            .process(&mut ctx, req, Next::endpoint(&handler))
            .await
            .unwrap_err();
        assert_eq!(error.message(), "stream broke");
    }
}
