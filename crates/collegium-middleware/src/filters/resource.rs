//! Resource filters: the outermost per-route layer.

use super::{millis, ResourceExecuted, ResourceFilter};
use crate::context::RequestContext;
use crate::outcome::PipelineResult;
use collegium_core::{BoxFuture, PipelineError};
use http::header::{CONTENT_LENGTH, IF_NONE_MATCH};
use http::StatusCode;
use serde_json::json;

/// Default request payload ceiling: 10 MiB.
pub const DEFAULT_MAX_PAYLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// Header carrying the time spent inside the resource filter.
pub const PROCESSING_TIME_HEADER: &str = "X-Resource-Processing-Time";

/// Header carrying the API version.
pub const API_VERSION_HEADER: &str = "API-Version";

/// Rejects oversized payloads before the body is bound.
///
/// `If-None-Match` is recorded as a hook point for conditional requests; no
/// cache lookup is performed.
#[derive(Debug, Clone)]
pub struct PayloadGuardFilter {
    max_bytes: u64,
}

impl PayloadGuardFilter {
    /// Creates a guard with an explicit byte ceiling.
    #[must_use]
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// The configured byte ceiling.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }
}

impl Default for PayloadGuardFilter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PAYLOAD_BYTES)
    }
}

impl ResourceFilter for PayloadGuardFilter {
    fn name(&self) -> &'static str {
        "payload_guard"
    }

    fn on_resource_executing<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let declared = ctx
                .header(CONTENT_LENGTH.as_str())
                .and_then(|value| value.trim().parse::<u64>().ok());

            if let Some(length) = declared {
                if length > self.max_bytes {
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        content_length = length,
                        max_bytes = self.max_bytes,
                        "request payload too large"
                    );
                    return PipelineResult::json(
                        StatusCode::BAD_REQUEST,
                        &json!({ "error": "Request payload too large" }),
                    );
                }
            }

            if let Some(etag) = ctx.header(IF_NONE_MATCH.as_str()) {
                tracing::debug!(request_id = %ctx.request_id(), etag, "conditional request");
            }

            PipelineResult::Continue
        })
    }

    fn on_resource_executed(
        &self,
        _ctx: &RequestContext,
        executed: &mut ResourceExecuted<'_>,
    ) -> Result<(), PipelineError> {
        let elapsed = millis(executed.elapsed());
        if let Some(mut headers) = executed.headers(self.name()) {
            headers.try_add(PROCESSING_TIME_HEADER, &elapsed);
        }
        Ok(())
    }
}

/// Requires a specific `API-Version` when the caller sends one.
///
/// Requests without the header pass. The version is echoed on every response
/// produced inside the filter.
#[derive(Debug, Clone)]
pub struct ApiVersionFilter {
    required: String,
}

impl ApiVersionFilter {
    /// Requires `version`.
    #[must_use]
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            required: version.into(),
        }
    }

    /// The required version string.
    #[must_use]
    pub fn required(&self) -> &str {
        &self.required
    }
}

impl Default for ApiVersionFilter {
    fn default() -> Self {
        Self::new("1.0")
    }
}

impl ResourceFilter for ApiVersionFilter {
    fn name(&self) -> &'static str {
        "api_version"
    }

    fn on_resource_executing<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            match ctx.header(API_VERSION_HEADER) {
                Some(provided) if provided.trim() != self.required => {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        provided_version = provided,
                        required_version = %self.required,
                        "unsupported API version"
                    );
                    PipelineResult::json(
                        StatusCode::BAD_REQUEST,
                        &json!({
                            "message": format!("API version {} is not supported", provided.trim()),
                            "providedVersion": provided.trim(),
                            "requiredVersion": self.required,
                        }),
                    )
                }
                _ => PipelineResult::Continue,
            }
        })
    }

    fn on_resource_executed(
        &self,
        _ctx: &RequestContext,
        executed: &mut ResourceExecuted<'_>,
    ) -> Result<(), PipelineError> {
        if let Some(mut headers) = executed.headers(self.name()) {
            headers.try_add(API_VERSION_HEADER, &self.required);
        }
        Ok(())
    }
}
