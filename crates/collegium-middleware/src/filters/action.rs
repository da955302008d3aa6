//! Action filters: hooks immediately around the handler.

use super::authorization::{id_from_value, DEFAULT_DEPARTMENT_KEY};
use super::{millis, ActionExecuted, ActionFilter};
use crate::context::RequestContext;
use crate::outcome::PipelineResult;
use collegium_core::{normalize_location, BoxFuture, DepartmentStore, LocationPolicy, PipelineError};
use http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;

/// Logs when the action starts and how long it took.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingActionFilter;

impl ActionFilter for TimingActionFilter {
    fn name(&self) -> &'static str {
        "timing"
    }

    fn on_action_executing<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            tracing::debug!(
                request_id = %ctx.request_id(),
                operation_id = ctx.operation_label(),
                "action executing"
            );
            PipelineResult::Continue
        })
    }

    fn on_action_executed(
        &self,
        ctx: &RequestContext,
        executed: &ActionExecuted<'_>,
    ) -> Result<(), PipelineError> {
        let elapsed = millis(executed.elapsed());
        match (executed.response(), executed.error()) {
            (Some(response), _) => tracing::info!(
                request_id = %ctx.request_id(),
                operation_id = ctx.operation_label(),
                status_code = response.status().as_u16(),
                short_circuited = executed.was_short_circuited(),
                elapsed = %elapsed,
                "action executed"
            ),
            (None, Some(error)) => tracing::info!(
                request_id = %ctx.request_id(),
                operation_id = ctx.operation_label(),
                error_category = %error.category(),
                elapsed = %elapsed,
                "action failed"
            ),
            (None, None) => {}
        }
        Ok(())
    }
}

/// Looks up the department named in the argument bag and logs whether its
/// location passes the policy.
///
/// Purely observational: a missing id, unknown department, or store failure
/// is logged and the action proceeds.
pub struct DepartmentLookupFilter {
    store: Arc<dyn DepartmentStore>,
    policy: Arc<LocationPolicy>,
    key: String,
}

impl DepartmentLookupFilter {
    /// Creates the filter reading the `deptId` argument.
    pub fn new(store: Arc<dyn DepartmentStore>, policy: Arc<LocationPolicy>) -> Self {
        Self {
            store,
            policy,
            key: DEFAULT_DEPARTMENT_KEY.to_string(),
        }
    }

    /// Reads the id from a different argument.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    async fn inspect(&self, ctx: &RequestContext) {
        let Some(id) = ctx.argument(&self.key).and_then(id_from_value) else {
            return;
        };

        match self.store.find_department(id).await {
            Ok(Some(department)) => {
                let location = normalize_location(department.location.as_deref().unwrap_or_default());
                tracing::info!(
                    request_id = %ctx.request_id(),
                    department_id = id,
                    location = %location,
                    allowed = self.policy.allows(&location),
                    "department looked up"
                );
            }
            Ok(None) => {
                tracing::info!(request_id = %ctx.request_id(), department_id = id, "department not found");
            }
            Err(error) => {
                tracing::warn!(
                    request_id = %ctx.request_id(),
                    department_id = id,
                    error = %error,
                    "department lookup failed"
                );
            }
        }
    }
}

impl ActionFilter for DepartmentLookupFilter {
    fn name(&self) -> &'static str {
        "department_lookup"
    }

    fn on_action_executing<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            self.inspect(ctx).await;
            PipelineResult::Continue
        })
    }
}

/// Validates a bound `department` argument before create and update handlers.
pub struct ValidateDepartmentFilter {
    policy: Arc<LocationPolicy>,
    argument: String,
}

impl ValidateDepartmentFilter {
    /// Validates the `department` argument against `policy`.
    pub fn new(policy: Arc<LocationPolicy>) -> Self {
        Self {
            policy,
            argument: "department".to_string(),
        }
    }

    /// Validates a differently named argument.
    #[must_use]
    pub fn with_argument(mut self, argument: impl Into<String>) -> Self {
        self.argument = argument.into();
        self
    }

    fn check(&self, department: &Value) -> Option<String> {
        let location = department
            .get("location")
            .and_then(Value::as_str)
            .map(normalize_location)
            .unwrap_or_default();

        if location.is_empty() {
            return Some("Department location is required".to_string());
        }
        if !self.policy.allows(&location) {
            return Some(format!(
                "Location '{}' is not allowed. Allowed locations: {}",
                location,
                self.policy.describe()
            ));
        }
        None
    }
}

impl ActionFilter for ValidateDepartmentFilter {
    fn name(&self) -> &'static str {
        "validate_department"
    }

    fn on_action_executing<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let Some(department) = ctx.argument(&self.argument).filter(|v| v.is_object()) else {
                return PipelineResult::Continue;
            };

            match self.check(department) {
                None => PipelineResult::Continue,
                Some(problem) => {
                    tracing::info!(
                        request_id = %ctx.request_id(),
                        problem = %problem,
                        "department rejected"
                    );
                    PipelineResult::json(
                        StatusCode::BAD_REQUEST,
                        &json!({ "errors": { "location": [problem] } }),
                    )
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{HandlerResult, Response, ResponseExt};
    use collegium_core::{Department, InMemoryRepository, RepositoryError};
    use http_body_util::BodyExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct CountingStore {
        calls: AtomicUsize,
    }

    impl DepartmentStore for CountingStore {
        fn find_department(
            &self,
            _id: i64,
        ) -> BoxFuture<'_, Result<Option<Department>, RepositoryError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Err(RepositoryError::Unavailable("down".into())) })
        }
    }

    #[tokio::test]
    async fn test_timing_filter_observes_outcomes() {
        let filter = TimingActionFilter;
        let mut ctx = RequestContext::new();
        assert!(filter.on_action_executing(&mut ctx).await.is_continue());

        let ok: HandlerResult = Ok(Response::html(StatusCode::OK, "ok"));
        let executed = ActionExecuted::new(&ok, false, Duration::from_millis(5));
        assert!(filter.on_action_executed(&ctx, &executed).is_ok());

        let failed: HandlerResult = Err(PipelineError::unclassified("boom"));
        let executed = ActionExecuted::new(&failed, false, Duration::from_millis(5));
        assert!(filter.on_action_executed(&ctx, &executed).is_ok());
    }

    #[tokio::test]
    async fn test_lookup_never_aborts() {
        let store = Arc::new(CountingStore::default());
        let filter = DepartmentLookupFilter::new(store.clone(), Arc::new(LocationPolicy::default()));

        let mut ctx = RequestContext::new();
        assert!(filter.on_action_executing(&mut ctx).await.is_continue());
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);

        ctx.set_argument("deptId", 7);
        assert!(filter.on_action_executing(&mut ctx).await.is_continue());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_lookup_with_known_department() {
        let repo = InMemoryRepository::seeded([Department::new("Math", "alexandria").with_id(3)]);
        let filter = DepartmentLookupFilter::new(Arc::new(repo), Arc::new(LocationPolicy::default()));

        let mut ctx = RequestContext::new();
        ctx.set_argument("deptId", "3");
        assert!(filter.on_action_executing(&mut ctx).await.is_continue());
    }

    #[tokio::test]
    async fn test_validate_department() {
        let filter = ValidateDepartmentFilter::new(Arc::new(LocationPolicy::default()));

        let mut ctx = RequestContext::new();
        assert!(filter.on_action_executing(&mut ctx).await.is_continue());

        ctx.set_argument("department", json!({ "name": "Math", "location": " Fayoum " }));
        assert!(filter.on_action_executing(&mut ctx).await.is_continue());

        ctx.set_argument("department", json!({ "name": "Math", "location": "  " }));
        let response = match filter.on_action_executing(&mut ctx).await {
            PipelineResult::ShortCircuit(response) => response,
            other => panic!("expected short-circuit, got {other:?}"),
        };
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["errors"]["location"][0], "Department location is required");

        ctx.set_argument("department", json!({ "name": "Math", "location": "Cairo" }));
        assert_eq!(
            filter.on_action_executing(&mut ctx).await.short_circuit_status(),
            Some(StatusCode::BAD_REQUEST)
        );
    }
}
