//! Authorization filters.
//!
//! Each filter either allows (`Continue`) or denies with a short-circuit
//! response. A denial is an expected outcome, not an error; only a broken
//! collaborator yields `Failure`.

use super::AuthorizationFilter;
use crate::context::RequestContext;
use crate::outcome::PipelineResult;
use collegium_core::{
    normalize_location, BoxFuture, DepartmentStore, LocationPolicy, PipelineError,
};
use http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

/// Default name of the department id parameter.
pub const DEFAULT_DEPARTMENT_KEY: &str = "deptId";

/// Default URL suffix required by [`PathSuffixFilter::admin`].
pub const DEFAULT_REQUIRED_SUFFIX: &str = "/admin";

/// Reads a department id from a route parameter, then the query string, then
/// the bound body.
pub(crate) fn department_id(ctx: &RequestContext, key: &str) -> Option<i64> {
    if let Some(raw) = ctx.route_param(key) {
        return raw.trim().parse().ok();
    }
    if let Some(raw) = ctx.query_param(key) {
        return raw.trim().parse().ok();
    }
    ctx.body().field(key).as_ref().and_then(id_from_value)
}

pub(crate) fn id_from_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    }
}

fn forbidden(message: impl Into<String>) -> PipelineResult {
    PipelineResult::json(StatusCode::FORBIDDEN, &json!({ "message": message.into() }))
}

/// Allows callers holding at least one of the required roles.
///
/// # Example
///
/// ```
/// use collegium_core::roles;
/// use collegium_middleware::filters::authorization::RoleAuthorizationFilter;
///
/// let filter = RoleAuthorizationFilter::new([roles::ADMIN, roles::INSTRUCTOR]);
/// assert_eq!(filter.required().len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct RoleAuthorizationFilter {
    required: Vec<String>,
}

impl RoleAuthorizationFilter {
    /// Requires any of `roles`.
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            required: roles.into_iter().map(Into::into).collect(),
        }
    }

    /// The accepted roles.
    #[must_use]
    pub fn required(&self) -> &[String] {
        &self.required
    }
}

impl AuthorizationFilter for RoleAuthorizationFilter {
    fn name(&self) -> &'static str {
        "role"
    }

    fn authorize<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if ctx.identity().has_any_role(self.required.as_slice()) {
                return PipelineResult::Continue;
            }

            tracing::info!(
                request_id = %ctx.request_id(),
                caller = %ctx.identity().log_id(),
                required_roles = ?self.required,
                "role check failed"
            );
            forbidden(format!(
                "Access denied. Required role: {}",
                self.required.join(" or ")
            ))
        })
    }
}

/// Allows access only to departments located on an allowed campus.
pub struct DepartmentLocationFilter {
    store: Arc<dyn DepartmentStore>,
    policy: Arc<LocationPolicy>,
    key: String,
}

impl DepartmentLocationFilter {
    /// Creates the gate over `store`, reading the id from `deptId`.
    pub fn new(store: Arc<dyn DepartmentStore>, policy: Arc<LocationPolicy>) -> Self {
        Self {
            store,
            policy,
            key: DEFAULT_DEPARTMENT_KEY.to_string(),
        }
    }

    /// Reads the department id from a different parameter name.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    async fn evaluate(&self, ctx: &RequestContext) -> PipelineResult {
        let Some(id) = department_id(ctx, &self.key) else {
            return forbidden("Department ID is required");
        };

        let department = match self.store.find_department(id).await {
            Ok(Some(department)) => department,
            Ok(None) => {
                return PipelineResult::json(
                    StatusCode::NOT_FOUND,
                    &json!({ "message": "Department not found" }),
                );
            }
            Err(error) => {
                return PipelineResult::Failure(PipelineError::upstream_with_source(
                    "department lookup failed",
                    "department_store",
                    error,
                ));
            }
        };

        let location = normalize_location(department.location.as_deref().unwrap_or_default());
        if location.is_empty() {
            return forbidden("Department location is not set");
        }

        if !self.policy.allows(&location) {
            tracing::info!(
                request_id = %ctx.request_id(),
                department_id = id,
                attempted_location = %location,
                "department location not allowed"
            );
            return PipelineResult::json(
                StatusCode::FORBIDDEN,
                &json!({
                    "message": format!(
                        "Access denied. Location '{}' is not allowed. Allowed locations: {}",
                        location,
                        self.policy.describe()
                    ),
                    "attemptedLocation": location,
                    "allowedLocations": self.policy.allowed(),
                }),
            );
        }

        PipelineResult::Continue
    }
}

impl AuthorizationFilter for DepartmentLocationFilter {
    fn name(&self) -> &'static str {
        "department_location"
    }

    fn authorize<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, PipelineResult> {
        Box::pin(self.evaluate(ctx))
    }
}

/// Allows only paths ending with a literal suffix, compared case-insensitively.
#[derive(Debug, Clone)]
pub struct PathSuffixFilter {
    suffix: String,
}

impl PathSuffixFilter {
    /// Requires `suffix`.
    #[must_use]
    pub fn new(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
        }
    }

    /// Requires `/admin`.
    #[must_use]
    pub fn admin() -> Self {
        Self::new(DEFAULT_REQUIRED_SUFFIX)
    }
}

impl AuthorizationFilter for PathSuffixFilter {
    fn name(&self) -> &'static str {
        "path_suffix"
    }

    fn authorize<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let path = ctx.path();
            if path.to_lowercase().ends_with(&self.suffix.to_lowercase()) {
                return PipelineResult::Continue;
            }

            PipelineResult::json(
                StatusCode::FORBIDDEN,
                &json!({
                    "message": format!("Access denied. URL must end with '{}'", self.suffix),
                    "currentPath": path,
                    "requiredSuffix": self.suffix,
                }),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BoundBody;
    use crate::types::Response;
    use collegium_core::{roles, CallerIdentity, Department, InMemoryRepository, RepositoryError};
    use http_body_util::BodyExt;

    struct BrokenStore;

    impl DepartmentStore for BrokenStore {
        fn find_department(
            &self,
            _id: i64,
        ) -> BoxFuture<'_, Result<Option<Department>, RepositoryError>> {
            Box::pin(async { Err(RepositoryError::Unavailable("connection refused".into())) })
        }
    }

    fn store() -> Arc<dyn DepartmentStore> {
        Arc::new(InMemoryRepository::seeded([
            Department::new("Computer Science", "Smart").with_id(7),
            Department::new("History", "alexandria").with_id(8),
            Department::new("Archive", "   ").with_id(9),
        ]))
    }

    fn gate() -> DepartmentLocationFilter {
        DepartmentLocationFilter::new(store(), Arc::new(LocationPolicy::default()))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn short_circuit(result: PipelineResult) -> Response {
        match result {
            PipelineResult::ShortCircuit(response) => response,
            other => panic!("expected short-circuit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_role_filter() {
        let filter = RoleAuthorizationFilter::new([roles::ADMIN]);

        let mut ctx = RequestContext::new();
        ctx.set_identity(CallerIdentity::user("u-1").with_role("admin"));
        assert!(filter.authorize(&ctx).await.is_continue());

        ctx.set_identity(CallerIdentity::user("u-2").with_role(roles::STUDENT));
        assert_eq!(
            filter.authorize(&ctx).await.short_circuit_status(),
            Some(StatusCode::FORBIDDEN)
        );

        ctx.set_identity(CallerIdentity::Anonymous);
        assert!(!filter.authorize(&ctx).await.is_continue());
    }

    #[tokio::test]
    async fn test_location_allowed_from_route() {
        let mut ctx = RequestContext::new();
        ctx.set_route_param("deptId", "7");
        assert!(gate().authorize(&ctx).await.is_continue());
    }

    #[tokio::test]
    async fn test_location_denied_names_values() {
        let mut ctx = RequestContext::new();
        ctx.set_route_param("deptId", "8");

        let response = short_circuit(gate().authorize(&ctx).await);
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = body_json(response).await;
        assert_eq!(body["attemptedLocation"], "alexandria");
        assert_eq!(body["allowedLocations"], json!(["smart", "fayoum"]));
        let message = body["message"].as_str().unwrap();
        assert!(message.contains("alexandria"));
        assert!(message.contains("smart, fayoum"));
    }

    #[tokio::test]
    async fn test_location_missing_id_or_department() {
        let ctx = RequestContext::new();
        assert_eq!(
            gate().authorize(&ctx).await.short_circuit_status(),
            Some(StatusCode::FORBIDDEN)
        );

        let mut ctx = RequestContext::new();
        ctx.set_route_param("deptId", "abc");
        assert_eq!(
            gate().authorize(&ctx).await.short_circuit_status(),
            Some(StatusCode::FORBIDDEN)
        );

        let mut ctx = RequestContext::new();
        ctx.set_route_param("deptId", "404");
        let response = short_circuit(gate().authorize(&ctx).await);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["message"], "Department not found");
    }

    #[tokio::test]
    async fn test_location_blank_is_denied() {
        let mut ctx = RequestContext::new();
        ctx.set_route_param("deptId", "9");
        assert_eq!(
            gate().authorize(&ctx).await.short_circuit_status(),
            Some(StatusCode::FORBIDDEN)
        );
    }

    #[tokio::test]
    async fn test_location_id_from_body() {
        let mut ctx = RequestContext::new();
        ctx.set_body(BoundBody::Json(json!({ "deptId": "7" })));
        assert!(gate().authorize(&ctx).await.is_continue());
    }

    #[tokio::test]
    async fn test_location_store_failure() {
        let filter =
            DepartmentLocationFilter::new(Arc::new(BrokenStore), Arc::new(LocationPolicy::default()));
        let mut ctx = RequestContext::new();
        ctx.set_route_param("deptId", "7");

        match filter.authorize(&ctx).await {
            PipelineResult::Failure(error) => {
                assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_path_suffix() {
        let filter = PathSuffixFilter::admin();

        let request = http::Request::builder()
            .uri("/Reports/ADMIN")
            .body(http_body_util::Full::new(bytes::Bytes::new()))
            .unwrap();
        let ctx = RequestContext::from_request(&request, None);
        assert!(filter.authorize(&ctx).await.is_continue());

        let request = http::Request::builder()
            .uri("/reports")
            .body(http_body_util::Full::new(bytes::Bytes::new()))
            .unwrap();
        let ctx = RequestContext::from_request(&request, None);
        let response = short_circuit(filter.authorize(&ctx).await);
        let body = body_json(response).await;
        assert_eq!(body["currentPath"], "/reports");
        assert_eq!(body["requiredSuffix"], "/admin");
    }
}
