//! Request routing and path matching.
//!
//! Routes are registered explicitly with a method, a path template, a name
//! (the operation id used in logs and metrics), an optional response
//! channel, and the handler, usually a [`FilterChain`](collegium_middleware::FilterChain).
//!
//! Templates use `{param}` segments. Literal segments compare
//! case-insensitively; the first registered match wins.
//!
//! ```rust
//! use collegium_middleware::{handler_fn, Response, ResponseExt};
//! use collegium_server::{Route, Router};
//! use http::{Method, StatusCode};
//!
//! let ok = handler_fn(|_ctx, _req| async { Ok(Response::json(StatusCode::OK, &"ok")) });
//!
//! let mut router = Router::new();
//! router.add(Route::new(Method::GET, "/departments/{deptId}", "getDepartment", ok));
//!
//! let found = router.match_route(&Method::GET, "/departments/7").unwrap();
//! assert_eq!(found.name(), "getDepartment");
//! assert_eq!(found.param("deptId"), Some("7"));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use collegium_middleware::{Handler, ResponseChannel};
use http::Method;

#[derive(Debug, Clone, PartialEq, Eq)]
enum PathSegment {
    Literal(String),
    Param(String),
}

fn parse_segments(pattern: &str) -> Vec<PathSegment> {
    pattern
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(name) => PathSegment::Param(name.to_string()),
            None => PathSegment::Literal(s.to_string()),
        })
        .collect()
}

/// One registered endpoint.
#[derive(Clone)]
pub struct Route {
    method: Method,
    pattern: String,
    segments: Vec<PathSegment>,
    name: String,
    channel: Option<ResponseChannel>,
    handler: Arc<dyn Handler>,
}

impl Route {
    /// Creates a route; the channel follows the `Accept` header unless set.
    pub fn new(
        method: Method,
        pattern: impl Into<String>,
        name: impl Into<String>,
        handler: impl Handler,
    ) -> Self {
        Self::shared(method, pattern, name, Arc::new(handler))
    }

    /// Creates a route around an already shared handler.
    pub fn shared(
        method: Method,
        pattern: impl Into<String>,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Self {
        let pattern = pattern.into();
        Self {
            method,
            segments: parse_segments(&pattern),
            pattern,
            name: name.into(),
            channel: None,
            handler,
        }
    }

    /// Pins the response channel for this route.
    #[must_use]
    pub fn channel(mut self, channel: ResponseChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Route name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Path template as registered.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn match_path(&self, path: &str) -> Option<HashMap<String, String>> {
        let actual: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if actual.len() != self.segments.len() {
            return None;
        }

        let mut params = HashMap::new();
        for (segment, value) in self.segments.iter().zip(actual) {
            match segment {
                PathSegment::Literal(expected) => {
                    if !expected.eq_ignore_ascii_case(value) {
                        return None;
                    }
                }
                PathSegment::Param(name) => {
                    params.insert(name.clone(), value.to_string());
                }
            }
        }
        Some(params)
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("name", &self.name)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// A matched route with its extracted parameters.
#[derive(Debug)]
pub struct RouteMatch<'a> {
    route: &'a Route,
    params: HashMap<String, String>,
}

impl<'a> RouteMatch<'a> {
    /// Route name.
    #[must_use]
    pub fn name(&self) -> &'a str {
        &self.route.name
    }

    /// Channel pinned by the route, if any.
    #[must_use]
    pub fn channel(&self) -> Option<ResponseChannel> {
        self.route.channel
    }

    /// The route's handler.
    #[must_use]
    pub fn handler(&self) -> &'a Arc<dyn Handler> {
        &self.route.handler
    }

    /// One extracted parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// All extracted parameters.
    #[must_use]
    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }
}

/// Ordered route table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a route.
    pub fn add(&mut self, route: Route) -> &mut Self {
        self.routes.push(route);
        self
    }

    /// Number of routes.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Registered route names, in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.routes.iter().map(Route::name)
    }

    /// Finds the first route matching `method` and `path`.
    #[must_use]
    pub fn match_route(&self, method: &Method, path: &str) -> Option<RouteMatch<'_>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                route
                    .match_path(path)
                    .map(|params| RouteMatch { route, params })
            })
    }

    /// Methods registered for `path`, used to tell 404 from 405.
    #[must_use]
    pub fn allowed_methods(&self, path: &str) -> Vec<Method> {
        let mut methods: Vec<Method> = Vec::new();
        for route in &self.routes {
            if route.match_path(path).is_some() && !methods.contains(&route.method) {
                methods.push(route.method.clone());
            }
        }
        methods
    }
}
