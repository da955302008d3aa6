//! Model binding.
//!
//! Runs between the resource filters and the authorization filters. It reads
//! the request body once, parses JSON or form payloads, and fills the
//! context's argument bag from query parameters, route parameters, and the
//! body. The request is rebuilt with the same bytes for the handler.

use crate::context::{parse_query, BoundBody, RequestContext};
use crate::types::Request;
use bytes::Bytes;
use collegium_core::PipelineError;
use http::header::CONTENT_TYPE;
use http_body_util::{BodyExt, Full};
use serde_json::{Map, Value};

/// How a route's body is exposed to filters and the handler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingOptions {
    /// Store the whole body under this argument name instead of merging its
    /// top-level fields into the argument bag.
    pub body_argument: Option<String>,
}

impl BindingOptions {
    /// Binds the whole body as one named argument.
    #[must_use]
    pub fn body_as(name: impl Into<String>) -> Self {
        Self {
            body_argument: Some(name.into()),
        }
    }
}

/// Interprets a textual parameter: integers become numbers, anything else a
/// string.
#[must_use]
pub fn scalar(raw: &str) -> Value {
    raw.trim()
        .parse::<i64>()
        .map_or_else(|_| Value::String(raw.to_string()), Value::from)
}

/// Binds `request` into `ctx` and returns the request with its body intact.
///
/// Precedence in the argument bag: route parameters, then query parameters,
/// then body fields.
pub async fn bind(
    ctx: &mut RequestContext,
    request: Request,
    options: &BindingOptions,
) -> Result<Request, PipelineError> {
    let (parts, body) = request.into_parts();
    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(never) => match never {},
    };

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let bound = parse_body(&content_type, &bytes)?;

    let mut arguments = Map::new();
    for (name, value) in ctx.route_params() {
        arguments.insert(name.clone(), scalar(value));
    }
    for (name, value) in ctx.query_params() {
        arguments
            .entry(name.clone())
            .or_insert_with(|| scalar(value));
    }
    match (&options.body_argument, &bound) {
        (_, BoundBody::Empty) => {}
        (Some(name), BoundBody::Json(value)) => {
            arguments.insert(name.clone(), value.clone());
        }
        (Some(name), BoundBody::Form(fields)) => {
            let object = fields
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect();
            arguments.insert(name.clone(), Value::Object(object));
        }
        (None, BoundBody::Json(Value::Object(fields))) => {
            for (name, value) in fields {
                arguments.entry(name.clone()).or_insert_with(|| value.clone());
            }
        }
        (None, BoundBody::Json(_)) => {}
        (None, BoundBody::Form(fields)) => {
            for (name, value) in fields {
                arguments
                    .entry(name.clone())
                    .or_insert_with(|| scalar(value));
            }
        }
    }

    for (name, value) in arguments {
        ctx.arguments_mut().entry(name).or_insert(value);
    }
    ctx.set_body(bound);

    Ok(http::Request::from_parts(parts, Full::new(bytes)))
}

fn parse_body(content_type: &str, bytes: &Bytes) -> Result<BoundBody, PipelineError> {
    if bytes.is_empty() {
        return Ok(BoundBody::Empty);
    }

    if content_type.starts_with("application/json") || content_type.ends_with("+json") {
        return serde_json::from_slice(bytes)
            .map(BoundBody::Json)
            .map_err(|e| PipelineError::bad_input(format!("Malformed JSON body: {e}")));
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| PipelineError::bad_input("Form body is not valid UTF-8"))?;
        return Ok(BoundBody::Form(parse_query(text)));
    }

    Ok(BoundBody::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(uri: &str, content_type: &str, body: &'static str) -> Request {
        http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, content_type)
            .body(Full::new(Bytes::from_static(body.as_bytes())))
            .unwrap()
    }

    #[tokio::test]
    async fn test_json_body_merged_after_route_and_query() {
        let req = request(
            "/departments/7?deptId=8&page=2",
            "application/json",
            r#"{"deptId": 9, "name": "Physics"}"#,
        );
        let mut ctx = RequestContext::from_request(&req, None);
        ctx.set_route_param("deptId", "7");

        let req = bind(&mut ctx, req, &BindingOptions::default()).await.unwrap();

        assert_eq!(ctx.argument("deptId"), Some(&Value::from(7)));
        assert_eq!(ctx.argument("page"), Some(&Value::from(2)));
        assert_eq!(ctx.argument("name"), Some(&Value::from("Physics")));
        // handler still sees the original bytes
        let bytes = req.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(bytes.len(), 32);
    }

    #[tokio::test]
    async fn test_body_as_named_argument() {
        let req = request(
            "/departments",
            "application/json; charset=utf-8",
            r#"{"name": "Math", "location": "Smart"}"#,
        );
        let mut ctx = RequestContext::from_request(&req, None);

        bind(&mut ctx, req, &BindingOptions::body_as("department"))
            .await
            .unwrap();

        let department = ctx.argument("department").unwrap();
        assert_eq!(department["location"], "Smart");
        assert!(ctx.argument("name").is_none());
    }

    #[tokio::test]
    async fn test_form_body() {
        let req = request(
            "/departments",
            "application/x-www-form-urlencoded",
            "deptId=12&location=Fayoum",
        );
        let mut ctx = RequestContext::from_request(&req, None);
        bind(&mut ctx, req, &BindingOptions::default()).await.unwrap();

        assert_eq!(ctx.argument("deptId"), Some(&Value::from(12)));
        assert_eq!(ctx.body().field("location"), Some(Value::from("Fayoum")));
    }

    #[tokio::test]
    async fn test_malformed_json_is_bad_input() {
        let req = request("/departments", "application/json", "{not json");
        let mut ctx = RequestContext::from_request(&req, None);
        let error = bind(&mut ctx, req, &BindingOptions::default())
            .await
            .unwrap_err();
        assert_eq!(error.status_code(), http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_scalar() {
        assert_eq!(scalar("42"), Value::from(42));
        assert_eq!(scalar("smart"), Value::from("smart"));
    }
}
