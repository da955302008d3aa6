//! Common types used throughout the middleware pipeline.

use bytes::Bytes;
use collegium_core::PipelineError;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use http_body_util::Full;
use serde::Serialize;

/// The HTTP request type used in the middleware pipeline.
///
/// This is a standard `http::Request` with a `Full<Bytes>` body.
pub type Request = http::Request<Full<Bytes>>;

/// The HTTP response type used in the middleware pipeline.
///
/// This is a standard `http::Response` with a `Full<Bytes>` body.
pub type Response = http::Response<Full<Bytes>>;

/// What a handler, filter chain, or middleware stage yields.
///
/// `Err` carries an unexpected failure towards the exception boundary.
pub type HandlerResult = Result<Response, PipelineError>;

const JSON: &str = "application/json";
const HTML: &str = "text/html; charset=utf-8";

/// How a route talks to its callers.
///
/// API-style routes get structured JSON error bodies; view-style routes get
/// a small markup page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ResponseChannel {
    /// Markup responses for browser-facing views.
    #[default]
    Html,
    /// Structured JSON responses for API clients.
    Json,
}

impl ResponseChannel {
    /// Guesses the channel from an `Accept` header value.
    #[must_use]
    pub fn from_accept(accept: Option<&str>) -> Self {
        match accept {
            Some(value) if value.contains(JSON) && !value.contains("text/html") => Self::Json,
            _ => Self::Html,
        }
    }
}

/// Extension trait for building responses.
pub trait ResponseExt {
    /// Creates a JSON response from any serializable value.
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Response;

    /// Creates an HTML response.
    fn html(status: StatusCode, markup: impl Into<String>) -> Response;

    /// Creates a JSON error response with the standard envelope.
    fn json_error(status: StatusCode, code: &str, message: &str) -> Response;
}

impl ResponseExt for Response {
    fn json<T: Serialize>(status: StatusCode, value: &T) -> Response {
        let body = serde_json::to_vec(value).unwrap_or_else(|_| b"null".to_vec());
        with_content_type(status, JSON, Bytes::from(body))
    }

    fn html(status: StatusCode, markup: impl Into<String>) -> Response {
        with_content_type(status, HTML, Bytes::from(markup.into()))
    }

    fn json_error(status: StatusCode, code: &str, message: &str) -> Response {
        let body = serde_json::json!({
            "error": {
                "code": code,
                "message": message
            }
        });
        Self::json(status, &body)
    }
}

fn with_content_type(status: StatusCode, content_type: &'static str, body: Bytes) -> Response {
    let mut response = http::Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Escapes text for safe inclusion in markup.
#[must_use]
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Renders the minimal fixed-shape error page used by the markup channel.
#[must_use]
pub fn error_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body><div class=\"error-details\"><h1>{title}</h1><p>{message}</p>\
         <p><a href=\"/\">Return to Home</a></p></div></body></html>",
        title = escape_html(title),
        message = escape_html(message),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_error_response() {
        let response = Response::json_error(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many requests",
        );
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), JSON);
    }

    #[test]
    fn test_html_response() {
        let response = Response::html(StatusCode::OK, "<p>ok</p>");
        assert_eq!(response.headers().get(CONTENT_TYPE).unwrap(), HTML);
    }

    #[test]
    fn test_channel_from_accept() {
        assert_eq!(
            ResponseChannel::from_accept(Some("application/json")),
            ResponseChannel::Json
        );
        assert_eq!(
            ResponseChannel::from_accept(Some("text/html,application/json;q=0.9")),
            ResponseChannel::Html
        );
        assert_eq!(ResponseChannel::from_accept(None), ResponseChannel::Html);
    }

    #[test]
    fn test_error_page_escapes() {
        let page = error_page("Error", "<script>alert(1)</script>");
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
        assert!(page.contains("Return to Home"));
    }
}
