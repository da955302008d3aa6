//! The HTTP server.
//!
//! One task accepts connections; each connection runs on its own task with
//! hyper's HTTP/1 driver. Every request body is buffered up to
//! [`ServerConfig::max_body_bytes`] and the request is given a
//! [`RequestContext`], routed, and handed to the [`Pipeline`] together
//! with the matched route's handler.
//!
//! ```rust,no_run
//! use collegium_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::builder()
//!         .config(ServerConfig::builder().http_addr("127.0.0.1:8080").build())
//!         .build();
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use collegium_core::{BoxFuture, PipelineError};
use collegium_middleware::types::error_page;
use collegium_middleware::{
    Handler, HandlerResult, Pipeline, Request, RequestContext, Response, ResponseChannel,
    ResponseExt, ResponseState, Transmission,
};
use http::header::{HeaderValue, ALLOW, CONTENT_LENGTH};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulConnection;
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health::{HealthCheck, HEALTH_PATH};
use crate::identity::identity_from_headers;
use crate::router::{Route, Router};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// An HTTP server dispatching to registered routes.
pub struct Server {
    config: ServerConfig,
    router: Router,
    pipeline: Pipeline,
    health: HealthCheck,
}

impl Server {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Listener configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The route table, including `/health`.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The health check backing `/health`.
    #[must_use]
    pub fn health(&self) -> &HealthCheck {
        &self.health
    }

    /// Runs until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured address and runs until `shutdown` fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown).await
    }

    /// Binds the configured address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid or cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|source| ServerError::InvalidAddress {
                addr: self.config.http_addr().to_string(),
                source,
            })?;

        TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })
    }

    /// Serves connections from `listener` until `shutdown` fires, then waits
    /// up to the configured timeout for open connections to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener's local address cannot be read.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: ShutdownSignal,
    ) -> Result<(), ServerError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(
            addr = %local_addr,
            routes = self.router.route_count(),
            "server listening"
        );

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, remote_addr)) => {
                        let server = Arc::clone(&server);
                        let token = tracker.acquire();
                        let shutdown = shutdown.clone();

                        tokio::spawn(async move {
                            if let Err(e) = server.serve_connection(stream, remote_addr, shutdown).await {
                                tracing::debug!(remote = %remote_addr, error = %e, "connection ended with error");
                            }
                            drop(token);
                        });
                    }
                    Err(e) => tracing::error!(error = %e, "failed to accept connection"),
                },
                () = shutdown.recv() => {
                    tracing::info!("shutdown signalled, no longer accepting connections");
                    break;
                }
            }
        }
        drop(listener);

        let timeout = server.config.shutdown_timeout();
        tracing::info!(
            active = tracker.active_connections(),
            timeout_secs = timeout.as_secs_f64(),
            "draining connections"
        );

        tokio::select! {
            () = tracker.wait_idle() => tracing::info!("all connections closed"),
            () = tokio::time::sleep(timeout) => tracing::warn!(
                active = tracker.active_connections(),
                "drain timeout reached, abandoning open connections"
            ),
        }

        tracing::info!("server stopped");
        Ok(())
    }

    fn serve_connection(
        self: Arc<Self>,
        stream: TcpStream,
        remote_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> impl Future<Output = Result<(), hyper::Error>> + Send {
        let io = TokioIo::new(stream);
        let server = Arc::clone(&self);
        let service = service_fn(move |request: http::Request<Incoming>| {
            let server = Arc::clone(&server);
            async move { server.handle(request, remote_addr).await }
        });

        let mut builder = http1::Builder::new();
        builder.keep_alive(self.config.keep_alive());
        let conn = builder.serve_connection(io, service);
        drive_connection(conn, shutdown)
    }

    async fn handle(
        &self,
        request: http::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<Response, BoxError> {
        let (parts, body) = request.into_parts();
        let limit = self.config.max_body_bytes();

        let declared = parts
            .headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        if declared.is_some_and(|length| length > limit) {
            return Ok(payload_too_large(&parts, remote_addr, limit));
        }

        // Chunked bodies declare nothing up front; stop reading at the cap.
        let capped = Limited::new(body, usize::try_from(limit).unwrap_or(usize::MAX));
        let body = match capped.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(error) if error.is::<LengthLimitError>() => {
                return Ok(payload_too_large(&parts, remote_addr, limit));
            }
            Err(error) => return Err(error),
        };
        let request = http::Request::from_parts(parts, Full::new(body));

        self.dispatch(request, Some(remote_addr))
            .await
            .map_err(BoxError::from)
    }

    /// Routes one buffered request through the pipeline.
    ///
    /// `Err` means the response had already started when a failure
    /// occurred; the connection should be dropped.
    pub async fn dispatch(&self, request: Request, remote_addr: Option<SocketAddr>) -> HandlerResult {
        let mut ctx = RequestContext::from_request(&request, remote_addr);
        ctx.set_development(self.config.development());
        if self.config.trust_identity_headers() {
            ctx.set_identity(identity_from_headers(request.headers()));
        }

        let guard = TransmissionGuard(ctx.response_state().clone());
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let result = match self.router.match_route(&method, &path) {
            Some(found) => {
                for (name, value) in found.params() {
                    ctx.set_route_param(name.clone(), value.clone());
                }
                ctx.set_operation_id(found.name());
                if let Some(channel) = found.channel() {
                    ctx.set_channel(channel);
                }
                self.pipeline
                    .process(&mut ctx, request, &**found.handler())
                    .await
            }
            None => {
                let unmatched = Unmatched {
                    allowed: self.router.allowed_methods(&path),
                };
                self.pipeline.process(&mut ctx, request, &unmatched).await
            }
        };

        if result.is_ok() {
            guard.0.mark_completed();
        }
        result
    }
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("stages", &self.pipeline.stage_names())
            .finish_non_exhaustive()
    }
}

// Generic so the concrete hyper connection type never appears in a
// coroutine witness; works around rustc's higher-ranked `Send` inference
// failure ("implementation of `From` is not general enough").
async fn drive_connection<C>(conn: C, shutdown: ShutdownSignal) -> Result<(), C::Error>
where
    C: GracefulConnection,
{
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => result,
        () = shutdown.recv() => {
            // Finish the in-flight request, then close.
            conn.as_mut().graceful_shutdown();
            conn.await
        }
    }
}

/// Marks the response closed when the request future is dropped before
/// the response completed, e.g. on client disconnect.
struct TransmissionGuard(ResponseState);

impl Drop for TransmissionGuard {
    fn drop(&mut self) {
        if self.0.get() != Transmission::Completed {
            self.0.mark_closed();
        }
    }
}

/// Endpoint for requests no route matched: 405 when the path exists under
/// another method, otherwise a not-found error for the exception boundary.
struct Unmatched {
    allowed: Vec<Method>,
}

impl Handler for Unmatched {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        _request: Request,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if self.allowed.is_empty() {
                return Err(PipelineError::not_found(format!(
                    "No route matches {} {}",
                    ctx.method(),
                    ctx.path()
                )));
            }

            let message = format!("{} is not allowed on {}", ctx.method(), ctx.path());
            let mut response = match ctx.channel() {
                ResponseChannel::Json => Response::json_error(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "METHOD_NOT_ALLOWED",
                    &message,
                ),
                ResponseChannel::Html => Response::html(
                    StatusCode::METHOD_NOT_ALLOWED,
                    error_page("Method Not Allowed", &message),
                ),
            };

            let allow = self
                .allowed
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                response.headers_mut().insert(ALLOW, value);
            }
            Ok(response)
        })
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    config: ServerConfig,
    pipeline: Pipeline,
    routes: Vec<Route>,
    service_name: String,
    service_version: String,
}

impl ServerBuilder {
    /// Creates a builder with default config and the standard pipeline
    /// without a rate limiter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            pipeline: Pipeline::standard(None),
            routes: Vec::new(),
            service_name: "collegium".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Sets the listener configuration.
    #[must_use]
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the global pipeline.
    #[must_use]
    pub fn pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// Adds a route.
    #[must_use]
    pub fn route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }

    /// Adds several routes.
    #[must_use]
    pub fn routes(mut self, routes: impl IntoIterator<Item = Route>) -> Self {
        self.routes.extend(routes);
        self
    }

    /// Service name reported by `/health`.
    #[must_use]
    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    /// Service version reported by `/health`.
    #[must_use]
    pub fn service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Builds the server. `/health` is registered ahead of user routes.
    #[must_use]
    pub fn build(self) -> Server {
        let health = HealthCheck::new(self.service_name, self.service_version);

        let mut router = Router::new();
        router.add(
            Route::new(Method::GET, HEALTH_PATH, "health", health.handler())
                .channel(ResponseChannel::Json),
        );
        for route in self.routes {
            router.add(route);
        }

        Server {
            config: self.config,
            router,
            pipeline: self.pipeline,
            health,
        }
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn payload_too_large(parts: &http::request::Parts, remote_addr: SocketAddr, limit: u64) -> Response {
    tracing::warn!(
        remote = %remote_addr,
        method = %parts.method,
        path = parts.uri.path(),
        max_body_bytes = limit,
        "request body over limit, not read"
    );
    Response::json_error(
        StatusCode::PAYLOAD_TOO_LARGE,
        "PAYLOAD_TOO_LARGE",
        "Request payload too large",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use collegium_core::{roles, CallerIdentity};
    use collegium_middleware::handler_fn;
    use std::time::Duration;

    fn request(method: Method, uri: &str) -> Request {
        http::Request::builder()
            .method(method)
            .uri(uri)
            .header("accept", "application/json")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    fn echo_route() -> Route {
        Route::new(
            Method::GET,
            "/departments/{deptId}",
            "getDepartment",
            handler_fn(|ctx, _req| {
                let body = serde_json::json!({
                    "deptId": ctx.route_param("deptId"),
                    "operation": ctx.operation_id(),
                    "admin": ctx.identity().has_any_role(&[roles::ADMIN]),
                });
                async move { Ok(Response::json(StatusCode::OK, &body)) }
            }),
        )
    }

    async fn json(response: Response) -> serde_json::Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[test]
    fn test_builder_registers_health_first() {
        let server = Server::builder().route(echo_route()).build();
        let names: Vec<&str> = server.router().names().collect();
        assert_eq!(names, ["health", "getDepartment"]);
    }

    #[tokio::test]
    async fn test_dispatch_sets_route_params_and_operation() {
        let server = Server::builder().route(echo_route()).build();
        let mut req = request(Method::GET, "/departments/7");
        req.headers_mut().insert("x-user-id", "u-1".parse().unwrap());
        req.headers_mut().insert("x-user-roles", "Admin".parse().unwrap());

        let response = server.dispatch(req, None).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["deptId"], "7");
        assert_eq!(body["operation"], "getDepartment");
        assert_eq!(body["admin"], true);
    }

    #[tokio::test]
    async fn test_untrusted_identity_headers_are_ignored() {
        let server = Server::builder()
            .config(ServerConfig::builder().trust_identity_headers(false).build())
            .route(echo_route())
            .build();
        let mut req = request(Method::GET, "/departments/7");
        req.headers_mut().insert("x-user-id", "u-1".parse().unwrap());
        req.headers_mut().insert("x-user-roles", "Admin".parse().unwrap());

        let body = json(server.dispatch(req, None).await.unwrap()).await;
        assert_eq!(body["admin"], false);
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let server = Server::builder().route(echo_route()).build();
        let response = server
            .dispatch(request(Method::GET, "/courses"), None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method_is_405_with_allow() {
        let server = Server::builder().route(echo_route()).build();
        let response = server
            .dispatch(request(Method::PUT, "/departments/7"), None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET");
    }

    #[tokio::test]
    async fn test_health_route() {
        let server = Server::builder()
            .service_name("collegium-test")
            .service_version("9.9.9")
            .build();
        let response = server
            .dispatch(request(Method::GET, HEALTH_PATH), None)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["service"], "collegium-test");
        assert_eq!(body["version"], "9.9.9");
    }

    #[tokio::test]
    async fn test_anonymous_by_default() {
        let server = Server::builder()
            .route(Route::new(
                Method::GET,
                "/whoami",
                "whoami",
                handler_fn(|ctx, _req| {
                    let anonymous = matches!(ctx.identity(), CallerIdentity::Anonymous);
                    async move { Ok(Response::json(StatusCode::OK, &anonymous)) }
                }),
            ))
            .build();
        let body = json(server.dispatch(request(Method::GET, "/whoami"), None).await.unwrap()).await;
        assert_eq!(body, true);
    }

    #[tokio::test]
    async fn test_invalid_address() {
        let server = Server::builder()
            .config(ServerConfig::builder().http_addr("not-an-address").build())
            .build();
        let result = server.run_with_shutdown(ShutdownSignal::new()).await;
        assert!(matches!(result, Err(ServerError::InvalidAddress { .. })));
    }

    #[tokio::test]
    async fn test_run_and_shutdown() {
        let server = Server::builder()
            .config(
                ServerConfig::builder()
                    .http_addr("127.0.0.1:0")
                    .shutdown_timeout(Duration::from_millis(100))
                    .build(),
            )
            .build();

        let shutdown = ShutdownSignal::new();
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(5), server.run_with_shutdown(shutdown))
            .await
            .expect("server should stop");
        assert!(result.is_ok());
    }
}
