//! Error types for Collegium.
//!
//! [`PipelineError`] is the failure type that travels through the request
//! pipeline. Every variant belongs to exactly one [`ErrorCategory`], and the
//! category decides the HTTP status code and the safe message shown to callers
//! outside development mode.
//!
//! | Category | Status | Code |
//! |---|---|---|
//! | `Unauthorized` | 403 | `FORBIDDEN` |
//! | `NotFound` | 404 | `NOT_FOUND` |
//! | `BadInput` | 400 | `BAD_REQUEST` |
//! | `UpstreamFailure` | 500 | `UPSTREAM_FAILURE` |
//! | `Unclassified` | 500 | `INTERNAL_ERROR` |

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Result type alias using [`PipelineError`].
pub type CollegiumResult<T> = Result<T, PipelineError>;

/// Categories of failures recognised by the exception boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caller lacks a required role or resource attribute.
    Unauthorized,
    /// A referenced entity does not exist.
    NotFound,
    /// Malformed or out-of-policy request.
    BadInput,
    /// Persistence or collaborator failure.
    UpstreamFailure,
    /// Anything else.
    Unclassified,
}

impl ErrorCategory {
    /// Returns the default HTTP status code for this error category.
    #[must_use]
    pub const fn default_status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadInput => StatusCode::BAD_REQUEST,
            Self::UpstreamFailure | Self::Unclassified => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code used in JSON error bodies.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::BadInput => "BAD_REQUEST",
            Self::UpstreamFailure => "UPSTREAM_FAILURE",
            Self::Unclassified => "INTERNAL_ERROR",
        }
    }

    /// Message that is safe to show to any caller.
    #[must_use]
    pub const fn safe_message(&self) -> &'static str {
        match self {
            Self::Unauthorized => "You don't have permission to access this resource.",
            Self::NotFound => "The requested resource was not found.",
            Self::BadInput => "The request was invalid.",
            Self::UpstreamFailure => "A backing service failed while processing the request.",
            Self::Unclassified => "An unexpected error occurred. Please try again later.",
        }
    }

    /// Page title used by the markup error channel.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Unauthorized => "Access Denied",
            Self::NotFound => "Not Found",
            Self::BadInput => "Invalid Request",
            Self::UpstreamFailure | Self::Unclassified => "Error",
        }
    }

    /// Snake-case label for logs and metric labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::NotFound => "not_found",
            Self::BadInput => "bad_input",
            Self::UpstreamFailure => "upstream_failure",
            Self::Unclassified => "unclassified",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure raised somewhere in the request pipeline.
///
/// Filters resolve expected denials locally by short-circuiting with a
/// response. A `PipelineError` is for the unexpected path: handler failures,
/// failed lookups, binding errors. It is caught once by the exception
/// boundary.
///
/// # Example
///
/// ```
/// use collegium_core::{ErrorCategory, PipelineError};
///
/// let error = PipelineError::not_found_resource("Department", "7");
/// assert_eq!(error.category(), ErrorCategory::NotFound);
/// assert_eq!(error.status_code().as_u16(), 404);
/// ```
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Caller lacks a required role or resource attribute.
    #[error("Unauthorized: {message}")]
    Unauthorized {
        /// Human-readable error message.
        message: String,
        /// The operation that was denied.
        operation_id: Option<String>,
    },

    /// Referenced entity is absent.
    #[error("Not found: {message}")]
    NotFound {
        /// Human-readable error message.
        message: String,
        /// The type of resource that was not found.
        resource_type: Option<String>,
        /// The identifier of the resource.
        resource_id: Option<String>,
    },

    /// Malformed or out-of-policy request.
    #[error("Bad input: {message}")]
    BadInput {
        /// Human-readable error message.
        message: String,
        /// Field-specific errors.
        #[source]
        field_errors: Option<FieldErrors>,
    },

    /// Persistence or collaborator failure.
    #[error("Upstream failure: {message}")]
    UpstreamFailure {
        /// Human-readable error message.
        message: String,
        /// Name of the failing collaborator.
        service: Option<String>,
        /// The underlying error (never exposed outside development mode).
        #[source]
        source: Option<anyhow::Error>,
    },

    /// Anything else.
    #[error("Unclassified error: {message}")]
    Unclassified {
        /// Human-readable error message.
        message: String,
        /// The underlying error (never exposed outside development mode).
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl PipelineError {
    /// Creates an unauthorized error.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
            operation_id: None,
        }
    }

    /// Creates an unauthorized error tied to an operation.
    #[must_use]
    pub fn unauthorized_for_operation(
        message: impl Into<String>,
        operation_id: impl Into<String>,
    ) -> Self {
        Self::Unauthorized {
            message: message.into(),
            operation_id: Some(operation_id.into()),
        }
    }

    /// Creates a not found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            resource_type: None,
            resource_id: None,
        }
    }

    /// Creates a not found error with resource context.
    #[must_use]
    pub fn not_found_resource(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        let resource_type = resource_type.into();
        let resource_id = resource_id.into();
        Self::NotFound {
            message: format!("{resource_type} with ID '{resource_id}' not found"),
            resource_type: Some(resource_type),
            resource_id: Some(resource_id),
        }
    }

    /// Creates a bad input error.
    #[must_use]
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::BadInput {
            message: message.into(),
            field_errors: None,
        }
    }

    /// Creates a bad input error with field-specific errors.
    #[must_use]
    pub fn bad_input_with_fields(message: impl Into<String>, field_errors: FieldErrors) -> Self {
        Self::BadInput {
            message: message.into(),
            field_errors: Some(field_errors),
        }
    }

    /// Creates an upstream failure.
    #[must_use]
    pub fn upstream(message: impl Into<String>, service: Option<impl Into<String>>) -> Self {
        Self::UpstreamFailure {
            message: message.into(),
            service: service.map(Into::into),
            source: None,
        }
    }

    /// Creates an upstream failure wrapping the collaborator's error.
    pub fn upstream_with_source(
        message: impl Into<String>,
        service: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::UpstreamFailure {
            message: message.into(),
            service: Some(service.into()),
            source: Some(source.into()),
        }
    }

    /// Creates an unclassified error.
    #[must_use]
    pub fn unclassified(message: impl Into<String>) -> Self {
        Self::Unclassified {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an unclassified error with a source error.
    pub fn unclassified_with_source(
        message: impl Into<String>,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Unclassified {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Unauthorized { .. } => ErrorCategory::Unauthorized,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::BadInput { .. } => ErrorCategory::BadInput,
            Self::UpstreamFailure { .. } => ErrorCategory::UpstreamFailure,
            Self::Unclassified { .. } => ErrorCategory::Unclassified,
        }
    }

    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        self.category().default_status_code()
    }

    /// Returns the raw message without the category prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Unauthorized { message, .. }
            | Self::NotFound { message, .. }
            | Self::BadInput { message, .. }
            | Self::UpstreamFailure { message, .. }
            | Self::Unclassified { message, .. } => message,
        }
    }

    /// Short type name, used by the development diagnostic headers.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "Unauthorized",
            Self::NotFound { .. } => "NotFound",
            Self::BadInput { .. } => "BadInput",
            Self::UpstreamFailure { .. } => "UpstreamFailure",
            Self::Unclassified { .. } => "Unclassified",
        }
    }

    /// Full message including the source chain.
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::UpstreamFailure {
                message,
                source: Some(source),
                ..
            }
            | Self::Unclassified {
                message,
                source: Some(source),
            } => format!("{message}: {source:#}"),
            _ => self.message().to_string(),
        }
    }

    /// Message shown to the caller.
    ///
    /// Outside development mode only the category's safe message is used.
    #[must_use]
    pub fn public_message(&self, development: bool) -> String {
        if development {
            self.detail()
        } else {
            self.category().safe_message().to_string()
        }
    }

    /// Converts this error to a serializable error envelope.
    ///
    /// Field errors from [`BadInput`](Self::BadInput) are always public and
    /// land in `details` even when `development` is false, so their messages
    /// must be safe to show callers. Exception text from upstream and
    /// unclassified failures only appears in development mode.
    #[must_use]
    pub fn to_envelope(&self, request_id: Option<&str>, development: bool) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorDetail {
                code: self.category().code().to_string(),
                message: self.public_message(development),
                category: self.category(),
                details: self.error_details(development),
            },
            request_id: request_id.map(ToString::to_string),
            path: None,
            timestamp: None,
        }
    }

    fn error_details(&self, development: bool) -> Option<serde_json::Value> {
        match self {
            Self::BadInput {
                field_errors: Some(errors),
                ..
            } => serde_json::to_value(errors).ok(),
            Self::NotFound {
                resource_type: Some(rt),
                resource_id: Some(rid),
                ..
            } => Some(serde_json::json!({
                "resource_type": rt,
                "resource_id": rid
            })),
            Self::Unauthorized {
                operation_id: Some(op),
                ..
            } => Some(serde_json::json!({
                "operation_id": op
            })),
            Self::UpstreamFailure {
                service: Some(svc), ..
            } if development => Some(serde_json::json!({
                "service": svc,
                "exception": self.detail()
            })),
            Self::UpstreamFailure { .. } | Self::Unclassified { .. } if development => {
                Some(serde_json::json!({ "exception": self.detail() }))
            }
            _ => None,
        }
    }
}

/// Field-specific validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("Field validation errors")]
pub struct FieldErrors {
    /// Map of field name to list of error messages.
    pub fields: BTreeMap<String, Vec<String>>,
}

impl FieldErrors {
    /// Creates a new empty `FieldErrors`.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an error for a field.
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    /// Returns `true` if there are no field errors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the number of fields with errors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

/// Serializable error envelope for JSON responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// The error details.
    pub error: ErrorDetail,
    /// The request ID for correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Path of the failed request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// UTC timestamp of the failure (RFC 3339).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ErrorEnvelope {
    /// Sets the request path.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the failure timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }
}

/// Error detail within an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    /// Machine-readable error code.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
    /// Error category.
    pub category: ErrorCategory,
    /// Additional error details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
