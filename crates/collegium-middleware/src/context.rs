//! Request context.
//!
//! The [`RequestContext`] carries per-request state through every middleware
//! stage, filter, and the handler. It is owned by one pipeline execution and
//! dropped when the response completes.

use crate::response_state::ResponseState;
use crate::types::{Request, ResponseChannel};
use collegium_core::{CallerIdentity, RequestId, REQUEST_ID_HEADER};
use http::{HeaderMap, Method};
use serde_json::{Map, Value};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Request body after model binding.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum BoundBody {
    /// No body, or a content type the binder does not understand.
    #[default]
    Empty,
    /// A JSON document.
    Json(Value),
    /// An `application/x-www-form-urlencoded` body.
    Form(HashMap<String, String>),
}

impl BoundBody {
    /// Returns a top-level field as a string-ish JSON value.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Self::Empty => None,
            Self::Json(Value::Object(fields)) => fields.get(name).cloned(),
            Self::Json(_) => None,
            Self::Form(fields) => fields.get(name).map(|v| Value::String(v.clone())),
        }
    }
}

/// Context that flows through the request pipeline.
///
/// # Example
///
/// ```
/// use collegium_middleware::RequestContext;
/// use collegium_core::{roles, CallerIdentity};
///
/// let mut ctx = RequestContext::new();
/// ctx.set_identity(CallerIdentity::user("u-1").with_role(roles::ADMIN));
/// ctx.set_route_param("deptId", "7");
///
/// assert!(ctx.identity().has_any_role(&[roles::ADMIN]));
/// assert_eq!(ctx.route_param("deptId"), Some("7"));
/// ```
#[derive(Debug)]
pub struct RequestContext {
    request_id: RequestId,
    identity: CallerIdentity,
    operation_id: Option<String>,
    method: Method,
    path: String,
    query: HashMap<String, String>,
    route_params: HashMap<String, String>,
    headers: HeaderMap,
    client_addr: Option<SocketAddr>,
    channel: ResponseChannel,
    development: bool,
    body: BoundBody,
    arguments: Map<String, Value>,
    response_state: ResponseState,
    started_at: Instant,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// Creates an empty context for `GET /` with a fresh request ID.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            identity: CallerIdentity::Anonymous,
            operation_id: None,
            method: Method::GET,
            path: "/".to_string(),
            query: HashMap::new(),
            route_params: HashMap::new(),
            headers: HeaderMap::new(),
            client_addr: None,
            channel: ResponseChannel::default(),
            development: false,
            body: BoundBody::Empty,
            arguments: Map::new(),
            response_state: ResponseState::new(),
            started_at: Instant::now(),
            extensions: HashMap::new(),
        }
    }

    /// Builds a context from the request head and the peer address.
    ///
    /// The request ID is taken from `x-request-id` when it holds a valid
    /// UUID. Query parameters are decoded; when a key repeats, the first
    /// value wins.
    #[must_use]
    pub fn from_request(request: &Request, client_addr: Option<SocketAddr>) -> Self {
        let headers = request.headers().clone();
        let request_id = RequestId::from_header_or_new(
            headers
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        let channel = ResponseChannel::from_accept(
            headers
                .get(http::header::ACCEPT)
                .and_then(|v| v.to_str().ok()),
        );

        Self {
            request_id,
            method: request.method().clone(),
            path: request.uri().path().to_string(),
            query: request.uri().query().map(parse_query).unwrap_or_default(),
            headers,
            client_addr,
            channel,
            ..Self::new()
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the caller identity.
    #[must_use]
    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    /// Sets the caller identity.
    pub fn set_identity(&mut self, identity: CallerIdentity) {
        self.identity = identity;
    }

    /// Returns the operation ID (route name), if resolved.
    #[must_use]
    pub fn operation_id(&self) -> Option<&str> {
        self.operation_id.as_deref()
    }

    /// Sets the operation ID. Called once routing has matched.
    pub fn set_operation_id(&mut self, operation_id: impl Into<String>) {
        self.operation_id = Some(operation_id.into());
    }

    /// Operation ID or `"unknown"`, for log fields.
    #[must_use]
    pub fn operation_label(&self) -> &str {
        self.operation_id.as_deref().unwrap_or("unknown")
    }

    /// Request method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns a header as UTF-8 text.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Peer address, when the transport knows it.
    #[must_use]
    pub fn client_addr(&self) -> Option<SocketAddr> {
        self.client_addr
    }

    /// Sets the peer address.
    pub fn set_client_addr(&mut self, addr: Option<SocketAddr>) {
        self.client_addr = addr;
    }

    /// Decoded query parameter.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// All decoded query parameters.
    #[must_use]
    pub fn query_params(&self) -> &HashMap<String, String> {
        &self.query
    }

    /// Route parameter captured by the router.
    #[must_use]
    pub fn route_param(&self, name: &str) -> Option<&str> {
        self.route_params.get(name).map(String::as_str)
    }

    /// All route parameters.
    #[must_use]
    pub fn route_params(&self) -> &HashMap<String, String> {
        &self.route_params
    }

    /// Sets a route parameter.
    pub fn set_route_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.route_params.insert(name.into(), value.into());
    }

    /// Error/markup channel of the matched route.
    #[must_use]
    pub fn channel(&self) -> ResponseChannel {
        self.channel
    }

    /// Sets the response channel.
    pub fn set_channel(&mut self, channel: ResponseChannel) {
        self.channel = channel;
    }

    /// Whether development diagnostics are enabled for this request.
    #[must_use]
    pub fn is_development(&self) -> bool {
        self.development
    }

    /// Enables or disables development diagnostics.
    pub fn set_development(&mut self, development: bool) {
        self.development = development;
    }

    /// Body produced by model binding.
    #[must_use]
    pub fn body(&self) -> &BoundBody {
        &self.body
    }

    /// Replaces the bound body.
    pub fn set_body(&mut self, body: BoundBody) {
        self.body = body;
    }

    /// Handler arguments collected by model binding.
    #[must_use]
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    /// Mutable access to the argument bag.
    pub fn arguments_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.arguments
    }

    /// Looks up one argument.
    #[must_use]
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }

    /// Stores one argument, replacing any previous value.
    pub fn set_argument(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.arguments.insert(name.into(), value.into());
    }

    /// Shared transmission state of this request's response.
    #[must_use]
    pub fn response_state(&self) -> &ResponseState {
        &self.response_state
    }

    /// Replaces the transmission state with one shared with the transport.
    pub fn set_response_state(&mut self, state: ResponseState) {
        self.response_state = state;
    }

    /// Returns when the request started processing.
    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Returns the elapsed time since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Stores a typed extension value.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast().ok())
            .map(|b| *b)
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Decodes a query string into a map. First occurrence of a key wins.
#[must_use]
pub fn parse_query(query: &str) -> HashMap<String, String> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_str(query).unwrap_or_default();
    let mut map = HashMap::with_capacity(pairs.len());
    for (key, value) in pairs {
        map.entry(key).or_insert(value);
    }
    map
}
