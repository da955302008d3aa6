//! End-to-end pipeline integration tests.
//!
//! Each test drives a request through the global middleware
//! (rate limit, logging, exception boundary) and a route's filter chain.

use bytes::Bytes;
use collegium_core::{
    roles, BoxFuture, CallerIdentity, Department, DepartmentStore, InMemoryRepository,
    LocationPolicy, PipelineError,
};
use collegium_middleware::filters::action::{TimingActionFilter, ValidateDepartmentFilter};
use collegium_middleware::filters::authorization::{
    DepartmentLocationFilter, PathSuffixFilter, RoleAuthorizationFilter,
};
use collegium_middleware::filters::resource::{PayloadGuardFilter, PROCESSING_TIME_HEADER};
use collegium_middleware::filters::result::{CacheControlDecorator, HeaderDecorator};
use collegium_middleware::filters::{ActionExecuted, ResourceExecuted};
use collegium_middleware::stages::rate_limit::RateLimiter;
use collegium_middleware::{
    handler_fn, ActionFilter, BindingOptions, FilterChain, Handler, Pipeline, PipelineResult, Request,
    RequestContext, ResourceFilter, Response, ResponseChannel, ResponseExt,
};
use http::StatusCode;
use http_body_util::{BodyExt, Full};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Journal = Arc<Mutex<Vec<String>>>;

/// Resource filter that records its hooks.
struct RecordingResource {
    name: &'static str,
    journal: Journal,
}

impl ResourceFilter for RecordingResource {
    fn name(&self) -> &'static str {
        self.name
    }

    fn on_resource_executing<'a>(
        &'a self,
        _ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult> {
        self.journal.lock().unwrap().push(format!("{}:before", self.name));
        Box::pin(async { PipelineResult::Continue })
    }

    fn on_resource_executed(
        &self,
        _ctx: &RequestContext,
        _executed: &mut ResourceExecuted<'_>,
    ) -> Result<(), PipelineError> {
        self.journal.lock().unwrap().push(format!("{}:after", self.name));
        Ok(())
    }
}

/// Action filter that records its hooks and can short-circuit.
struct RecordingAction {
    name: &'static str,
    journal: Journal,
    short_circuit: bool,
}

impl ActionFilter for RecordingAction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn on_action_executing<'a>(
        &'a self,
        _ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult> {
        self.journal.lock().unwrap().push(format!("{}:before", self.name));
        let short_circuit = self.short_circuit;
        Box::pin(async move {
            if short_circuit {
                PipelineResult::ShortCircuit(Response::html(StatusCode::ACCEPTED, "cached"))
            } else {
                PipelineResult::Continue
            }
        })
    }

    fn on_action_executed(
        &self,
        _ctx: &RequestContext,
        executed: &ActionExecuted<'_>,
    ) -> Result<(), PipelineError> {
        let outcome = if executed.error().is_some() { "err" } else { "ok" };
        self.journal
            .lock()
            .unwrap()
            .push(format!("{}:after:{outcome}", self.name));
        Ok(())
    }
}

fn request(method: &str, path: &str) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

fn json_request(method: &str, path: &str, body: &serde_json::Value) -> Request {
    http::Request::builder()
        .method(method)
        .uri(path)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

fn context(request: &Request, addr: &str) -> RequestContext {
    let addr: SocketAddr = addr.parse().unwrap();
    RequestContext::from_request(request, Some(addr))
}

fn departments() -> Arc<dyn DepartmentStore> {
    Arc::new(InMemoryRepository::seeded([
        Department::new("Computer Science", "smart").with_id(7),
        Department::new("History", "alexandria").with_id(8),
    ]))
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn ok_handler(calls: Arc<AtomicUsize>) -> impl Handler {
    handler_fn(move |_ctx: &mut RequestContext, _req: Request| {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(Response::html(StatusCode::OK, "ok")))
    })
}

// ============================================================================
// Rate limiting
// ============================================================================

#[tokio::test]
async fn test_hundred_and_first_request_is_rejected() {
    let pipeline = Pipeline::standard(Some(Arc::new(RateLimiter::default())));
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = ok_handler(Arc::clone(&calls));

    for i in 0..100 {
        let req = request("GET", "/departments");
        let mut ctx = context(&req, "203.0.113.5:4000");
        let response = pipeline.process(&mut ctx, req, &handler).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "request {i}");
    }

    let req = request("GET", "/departments");
    let mut ctx = context(&req, "203.0.113.5:4001");
    let response = pipeline.process(&mut ctx, req, &handler).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(calls.load(Ordering::SeqCst), 100);
    assert!(body_text(response)
        .await
        .contains("Too many requests. Please try again later."));
}

#[tokio::test(start_paused = true)]
async fn test_window_reset_after_expiry() {
    let limiter = Arc::new(RateLimiter::builder().limit(2).window_secs(60).build());
    let pipeline = Pipeline::standard(Some(limiter));
    let handler = ok_handler(Arc::new(AtomicUsize::new(0)));

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let req = request("GET", "/");
        let mut ctx = context(&req, "203.0.113.6:4000");
        statuses.push(pipeline.process(&mut ctx, req, &handler).await.unwrap().status());
    }
    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );

    tokio::time::advance(Duration::from_secs(61)).await;

    let req = request("GET", "/");
    let mut ctx = context(&req, "203.0.113.6:4000");
    let response = pipeline.process(&mut ctx, req, &handler).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_are_isolated() {
    let limiter = Arc::new(RateLimiter::builder().limit(10).build());
    let pipeline = Arc::new(Pipeline::standard(Some(Arc::clone(&limiter))));
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = Arc::new(ok_handler(Arc::clone(&calls)));

    let mut tasks = Vec::new();
    for client in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        let handler = Arc::clone(&handler);
        tasks.push(tokio::spawn(async move {
            let mut admitted = 0;
            for _ in 0..15 {
                let req = request("GET", "/departments");
                let mut ctx = context(&req, &format!("10.0.0.{client}:5000"));
                let response = pipeline.process(&mut ctx, req, handler.as_ref()).await.unwrap();
                if response.status() == StatusCode::OK {
                    admitted += 1;
                }
            }
            admitted
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap(), 10);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 80);
    assert_eq!(limiter.tracked_clients(), 8);
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_department_location_gate() {
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = FilterChain::builder()
        .authorization(DepartmentLocationFilter::new(
            departments(),
            Arc::new(LocationPolicy::default()),
        ))
        .handler(ok_handler(Arc::clone(&calls)));
    let pipeline = Pipeline::standard(None);

    let req = request("GET", "/departments/7");
    let mut ctx = context(&req, "192.0.2.1:1000");
    ctx.set_route_param("deptId", "7");
    let response = pipeline.process(&mut ctx, req, &chain).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let req = request("GET", "/departments/8");
    let mut ctx = context(&req, "192.0.2.1:1000");
    ctx.set_route_param("deptId", "8");
    let response = pipeline.process(&mut ctx, req, &chain).await.unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let body = body_json(response).await;
    assert_eq!(body["attemptedLocation"], "alexandria");
    assert!(body["message"].as_str().unwrap().contains("smart, fayoum"));
}

#[tokio::test]
async fn test_denial_skips_action_filters_and_handler() {
    let journal: Journal = Arc::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = FilterChain::builder()
        .resource(RecordingResource {
            name: "outer",
            journal: Arc::clone(&journal),
        })
        .authorization(RoleAuthorizationFilter::new([roles::ADMIN]))
        .action(RecordingAction {
            name: "action",
            journal: Arc::clone(&journal),
            short_circuit: false,
        })
        .handler(ok_handler(Arc::clone(&calls)));

    let req = request("GET", "/reports");
    let mut ctx = context(&req, "192.0.2.2:1000");
    ctx.set_identity(CallerIdentity::user("s-1").with_role(roles::STUDENT));

    let response = Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(*journal.lock().unwrap(), vec!["outer:before", "outer:after"]);
}

#[tokio::test]
async fn test_path_suffix_gate() {
    let chain = FilterChain::builder()
        .authorization(PathSuffixFilter::admin())
        .handler(ok_handler(Arc::new(AtomicUsize::new(0))));
    let pipeline = Pipeline::standard(None);

    let req = request("GET", "/departments/Admin");
    let mut ctx = context(&req, "192.0.2.3:1000");
    assert_eq!(
        pipeline.process(&mut ctx, req, &chain).await.unwrap().status(),
        StatusCode::OK
    );

    let req = request("GET", "/departments");
    let mut ctx = context(&req, "192.0.2.3:1000");
    assert_eq!(
        pipeline.process(&mut ctx, req, &chain).await.unwrap().status(),
        StatusCode::FORBIDDEN
    );
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn test_after_hooks_run_in_reverse_order() {
    let journal: Journal = Arc::default();
    let chain = FilterChain::builder()
        .resource(RecordingResource {
            name: "r1",
            journal: Arc::clone(&journal),
        })
        .resource(RecordingResource {
            name: "r2",
            journal: Arc::clone(&journal),
        })
        .action(RecordingAction {
            name: "a1",
            journal: Arc::clone(&journal),
            short_circuit: false,
        })
        .action(RecordingAction {
            name: "a2",
            journal: Arc::clone(&journal),
            short_circuit: false,
        })
        .handler(ok_handler(Arc::new(AtomicUsize::new(0))));

    let req = request("GET", "/");
    let mut ctx = context(&req, "192.0.2.4:1000");
    Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();

    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "r1:before",
            "r2:before",
            "a1:before",
            "a2:before",
            "a2:after:ok",
            "a1:after:ok",
            "r2:after",
            "r1:after",
        ]
    );
}

#[tokio::test]
async fn test_action_short_circuit_unwinds_entered_filters() {
    let journal: Journal = Arc::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let chain = FilterChain::builder()
        .action(RecordingAction {
            name: "a1",
            journal: Arc::clone(&journal),
            short_circuit: false,
        })
        .action(RecordingAction {
            name: "a2",
            journal: Arc::clone(&journal),
            short_circuit: true,
        })
        .action(RecordingAction {
            name: "a3",
            journal: Arc::clone(&journal),
            short_circuit: false,
        })
        .result(HeaderDecorator::default())
        .handler(ok_handler(Arc::clone(&calls)));

    let req = request("GET", "/");
    let mut ctx = context(&req, "192.0.2.5:1000");
    let response = Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()["x-action-result-key"], "ResultFilterApplied");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["a1:before", "a2:before", "a1:after:ok"]
    );
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_handler_failure_becomes_error_response() {
    let journal: Journal = Arc::default();
    let chain = FilterChain::builder()
        .action(RecordingAction {
            name: "a1",
            journal: Arc::clone(&journal),
            short_circuit: false,
        })
        .result(HeaderDecorator::default())
        .handler(handler_fn(|_ctx, _req| async {
            Err(PipelineError::upstream("mail relay down", Some("smtp")))
        }));

    let req = request("POST", "/notifications");
    let mut ctx = context(&req, "192.0.2.6:1000");
    ctx.set_channel(ResponseChannel::Json);
    let response = Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!response.headers().contains_key("x-action-result-key"));
    assert_eq!(*journal.lock().unwrap(), vec!["a1:before", "a1:after:err"]);

    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "UPSTREAM_FAILURE");
    assert!(!body["error"]["message"].as_str().unwrap().contains("relay"));
}

#[tokio::test]
async fn test_panicking_handler_is_contained() {
    let journal: Journal = Arc::default();
    let chain = FilterChain::builder()
        .resource(RecordingResource {
            name: "r1",
            journal: Arc::clone(&journal),
        })
        .handler(handler_fn(|_ctx, _req| {
            let explode = true;
            async move {
                if explode {
                    panic!("index out of bounds");
                }
                Ok(Response::html(StatusCode::OK, "unreachable"))
            }
        }));

    let req = request("GET", "/");
    let mut ctx = context(&req, "192.0.2.7:1000");
    let response = Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(*journal.lock().unwrap(), vec!["r1:before", "r1:after"]);
}

#[tokio::test]
async fn test_failure_after_start_propagates() {
    let chain = FilterChain::builder()
        .resource(PayloadGuardFilter::default())
        .handler(handler_fn(|ctx, _req| {
            ctx.response_state().mark_started();
            async { Err(PipelineError::unclassified("connection reset while streaming")) }
        }));

    let req = request("GET", "/reports/export");
    let mut ctx = context(&req, "192.0.2.8:1000");
    let error = Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap_err();

    assert_eq!(error.message(), "connection reset while streaming");
}

#[tokio::test]
async fn test_headers_skipped_after_start() {
    let chain = FilterChain::builder()
        .resource(PayloadGuardFilter::default())
        .result(HeaderDecorator::default())
        .result(CacheControlDecorator::new(60))
        .handler(handler_fn(|ctx, _req| {
            ctx.response_state().mark_started();
            async { Ok(Response::html(StatusCode::OK, "streamed")) }
        }));

    let req = request("GET", "/");
    let mut ctx = context(&req, "192.0.2.9:1000");
    let response = Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(!response.headers().contains_key("x-action-result-key"));
    assert!(!response.headers().contains_key("cache-control"));
    assert!(!response.headers().contains_key(PROCESSING_TIME_HEADER));
}

// ============================================================================
// Full route
// ============================================================================

#[tokio::test]
async fn test_full_route_decorates_response() {
    let policy = Arc::new(LocationPolicy::default());
    let chain = FilterChain::builder()
        .resource(PayloadGuardFilter::default())
        .authorization(RoleAuthorizationFilter::new([roles::ADMIN]))
        .authorization(DepartmentLocationFilter::new(departments(), Arc::clone(&policy)))
        .action(TimingActionFilter)
        .result(HeaderDecorator::default())
        .result(CacheControlDecorator::new(300))
        .handler(handler_fn(|ctx, _req| {
            let id = ctx.argument("deptId").cloned();
            async move { Ok(Response::json(StatusCode::OK, &serde_json::json!({ "id": id }))) }
        }));

    let req = request("GET", "/departments/7");
    let mut ctx = context(&req, "192.0.2.10:1000");
    ctx.set_route_param("deptId", "7");
    ctx.set_identity(CallerIdentity::user("a-1").with_role(roles::ADMIN));

    let limiter = Arc::new(RateLimiter::default());
    let response = Pipeline::standard(Some(limiter))
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["x-action-result-key"], "ResultFilterApplied");
    assert_eq!(headers["cache-control"], "public, max-age=300");
    assert!(headers.contains_key("expires"));
    assert!(headers.contains_key("x-response-time"));
    assert!(headers[PROCESSING_TIME_HEADER].to_str().unwrap().ends_with("ms"));
    assert_eq!(headers["x-ratelimit-remaining"], "99");

    assert_eq!(body_json(response).await["id"], 7);
}

#[tokio::test]
async fn test_body_validation_and_binding() {
    let policy = Arc::new(LocationPolicy::default());
    let chain = FilterChain::builder()
        .binding(BindingOptions::body_as("department"))
        .action(ValidateDepartmentFilter::new(policy))
        .handler(handler_fn(|ctx, _req| {
            let name = ctx
                .argument("department")
                .and_then(|d| d.get("name"))
                .cloned();
            async move { Ok(Response::json(StatusCode::CREATED, &name)) }
        }));
    let pipeline = Pipeline::standard(None);

    let body = serde_json::json!({ "name": "Physics", "location": "Alexandria" });
    let req = json_request("POST", "/departments", &body);
    let mut ctx = context(&req, "192.0.2.11:1000");
    let response = pipeline.process(&mut ctx, req, &chain).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let errors = body_json(response).await;
    assert!(errors["errors"]["location"][0]
        .as_str()
        .unwrap()
        .contains("smart, fayoum"));

    let body = serde_json::json!({ "name": "Physics", "location": "fayoum" });
    let req = json_request("POST", "/departments", &body);
    let mut ctx = context(&req, "192.0.2.11:1000");
    let response = pipeline.process(&mut ctx, req, &chain).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body_json(response).await, "Physics");
}

#[tokio::test]
async fn test_malformed_json_is_bad_input() {
    let chain = FilterChain::builder().handler(ok_handler(Arc::new(AtomicUsize::new(0))));

    let req = http::Request::builder()
        .method("POST")
        .uri("/departments")
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from_static(b"{not json")))
        .unwrap();
    let mut ctx = context(&req, "192.0.2.12:1000");
    ctx.set_channel(ResponseChannel::Json);

    let response = Pipeline::standard(None)
        .process(&mut ctx, req, &chain)
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["code"], "BAD_REQUEST");
}
