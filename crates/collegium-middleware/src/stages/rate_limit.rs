//! Rate limiting.
//!
//! The outermost stage. Each client gets a fixed window: the first request
//! opens it, every request increments its counter, and once the counter
//! passes the limit the client is answered with `429 Too Many Requests`
//! until the window expires.
//!
//! The limiter is a service ([`RateLimiter`]) created once at startup and
//! shared with the middleware through an `Arc`. Counters live in a
//! [`DashMap`]; each client has its own lock, so different clients never
//! contend.
//!
//! ## Example
//!
//! ```
//! use collegium_middleware::stages::rate_limit::{Admission, RateLimiter};
//! use std::time::{Duration, Instant};
//!
//! let limiter = RateLimiter::builder().limit(2).window(Duration::from_secs(60)).build();
//! let now = Instant::now();
//!
//! assert!(limiter.admit("10.0.0.1", now).is_allowed());
//! assert!(limiter.admit("10.0.0.1", now).is_allowed());
//! assert!(matches!(limiter.admit("10.0.0.1", now), Admission::Rejected { .. }));
//! assert!(limiter.admit("10.0.0.2", now).is_allowed());
//! ```

use crate::context::RequestContext;
use crate::middleware::{Middleware, Next};
use crate::response_state::HeaderWriter;
use crate::types::{error_page, HandlerResult, Request, Response, ResponseChannel, ResponseExt};
use collegium_core::BoxFuture;
use dashmap::DashMap;
use http::{HeaderValue, StatusCode};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Rate limit header names.
pub mod headers {
    /// Maximum requests allowed in the window.
    pub const LIMIT: &str = "x-ratelimit-limit";
    /// Remaining requests in current window.
    pub const REMAINING: &str = "x-ratelimit-remaining";
    /// Seconds to wait before retrying (on 429).
    pub const RETRY_AFTER: &str = "retry-after";
}

/// Default number of requests admitted per window.
pub const DEFAULT_LIMIT: u64 = 100;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Bucket used when the client cannot be identified.
pub const UNKNOWN_CLIENT: &str = "unknown";

const REJECTION_MESSAGE: &str = "Too many requests. Please try again later.";

/// How to derive the client id from a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeyExtractor {
    /// The peer address (IP only).
    #[default]
    RemoteAddr,
    /// The first comma-separated value of a header, falling back to the peer
    /// address. Useful behind a proxy with `x-forwarded-for`.
    Header(String),
    /// One bucket shared by every client.
    Global,
}

/// Decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// The request may proceed.
    Allowed {
        /// Requests counted in the current window, this one included.
        count: u64,
        /// Requests left in the current window.
        remaining: u64,
        /// Time until the window expires.
        resets_in: Duration,
    },
    /// The client is over its limit.
    Rejected {
        /// Time until the window expires.
        retry_after: Duration,
    },
}

impl Admission {
    /// Returns `true` for [`Allowed`](Self::Allowed).
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

#[derive(Debug)]
struct ClientWindow {
    count: u64,
    window_start: Instant,
}

type SkipPredicate = Arc<dyn Fn(&Request) -> bool + Send + Sync>;

/// Per-client fixed-window request counter.
pub struct RateLimiter {
    limit: u64,
    window: Duration,
    key: KeyExtractor,
    skip: Option<SkipPredicate>,
    message: String,
    clients: DashMap<String, Arc<Mutex<ClientWindow>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("key", &self.key)
            .field("skip", &self.skip.is_some())
            .field("clients", &self.clients.len())
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl RateLimiter {
    /// Creates a new builder with default settings (100 requests per minute
    /// per remote address).
    #[must_use]
    pub fn builder() -> RateLimiterBuilder {
        RateLimiterBuilder::default()
    }

    /// Requests admitted per window.
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Window length.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of tracked clients.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    /// Counts one request from `client_id` at `now` and decides on it.
    ///
    /// The window resets when more than `window` has passed since it opened.
    /// Within a window the counter only grows.
    pub fn admit(&self, client_id: &str, now: Instant) -> Admission {
        let existing = self.clients.get(client_id).map(|record| Arc::clone(record.value()));
        let record = match existing {
            Some(record) => record,
            None => Arc::clone(
                self.clients
                    .entry(client_id.to_owned())
                    .or_insert_with(|| {
                        Arc::new(Mutex::new(ClientWindow {
                            count: 0,
                            window_start: now,
                        }))
                    })
                    .value(),
            ),
        };

        let mut window = record.lock();
        if now.saturating_duration_since(window.window_start) > self.window {
            window.count = 0;
            window.window_start = now;
        }
        window.count = window.count.saturating_add(1);

        let resets_in = self
            .window
            .saturating_sub(now.saturating_duration_since(window.window_start));

        if window.count > self.limit {
            Admission::Rejected {
                retry_after: resets_in,
            }
        } else {
            Admission::Allowed {
                count: window.count,
                remaining: self.limit - window.count,
                resets_in,
            }
        }
    }

    /// Drops every client whose window has expired at `now`. Returns the
    /// number of entries removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let before = self.clients.len();
        self.clients.retain(|_, record| {
            now.saturating_duration_since(record.lock().window_start) <= self.window
        });
        before.saturating_sub(self.clients.len())
    }

    /// Returns `true` when `request` bypasses the limiter.
    pub fn should_skip(&self, request: &Request) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(request))
    }

    /// Derives the client id for a request.
    pub fn client_id(&self, ctx: &RequestContext) -> String {
        let remote = || {
            ctx.client_addr()
                .map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
        };

        match &self.key {
            KeyExtractor::RemoteAddr => remote(),
            KeyExtractor::Header(name) => ctx
                .header(name)
                .and_then(|value| value.split(',').next())
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map_or_else(remote, str::to_string),
            KeyExtractor::Global => "global".to_string(),
        }
    }

    fn rejection(&self, channel: ResponseChannel, retry_after: Duration) -> Response {
        let mut response = match channel {
            ResponseChannel::Html => Response::html(
                StatusCode::TOO_MANY_REQUESTS,
                error_page("Too Many Requests", &self.message),
            ),
            ResponseChannel::Json => {
                Response::json_error(StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED", &self.message)
            }
        };

        let retry_after = retry_after.as_secs().max(1);
        let headers = response.headers_mut();
        headers.insert(headers::LIMIT, HeaderValue::from(self.limit));
        headers.insert(headers::REMAINING, HeaderValue::from(0_u64));
        headers.insert(headers::RETRY_AFTER, HeaderValue::from(retry_after));
        response
    }
}

/// Builder for [`RateLimiter`].
pub struct RateLimiterBuilder {
    limit: u64,
    window: Duration,
    key: KeyExtractor,
    skip: Option<SkipPredicate>,
    message: String,
}

impl Default for RateLimiterBuilder {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
            key: KeyExtractor::default(),
            skip: None,
            message: REJECTION_MESSAGE.to_string(),
        }
    }
}

impl RateLimiterBuilder {
    /// Sets the maximum number of requests per window.
    ///
    /// Default: 100 requests.
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Sets the window length.
    ///
    /// Default: 60 seconds.
    #[must_use]
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the window length in seconds.
    #[must_use]
    pub fn window_secs(self, seconds: u64) -> Self {
        self.window(Duration::from_secs(seconds))
    }

    /// Sets the key extraction strategy.
    #[must_use]
    pub fn key(mut self, key: KeyExtractor) -> Self {
        self.key = key;
        self
    }

    /// Uses a header value as the client id.
    #[must_use]
    pub fn per_header(self, header_name: impl Into<String>) -> Self {
        self.key(KeyExtractor::Header(header_name.into()))
    }

    /// Uses one bucket for all clients.
    #[must_use]
    pub fn global(self) -> Self {
        self.key(KeyExtractor::Global)
    }

    /// Sets a predicate to skip rate limiting for certain requests.
    ///
    /// # Example
    ///
    /// ```
    /// use collegium_middleware::stages::rate_limit::RateLimiter;
    ///
    /// let limiter = RateLimiter::builder()
    ///     .skip(|req| req.uri().path() == "/health")
    ///     .build();
    /// # let _ = limiter;
    /// ```
    #[must_use]
    pub fn skip<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        self.skip = Some(Arc::new(predicate));
        self
    }

    /// Sets the message returned when rate limited.
    #[must_use]
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Builds the limiter.
    #[must_use]
    pub fn build(self) -> RateLimiter {
        RateLimiter {
            limit: self.limit,
            window: self.window,
            key: self.key,
            skip: self.skip,
            message: self.message,
            clients: DashMap::new(),
        }
    }
}

/// Rejects clients over their limit before any other stage runs.
#[derive(Debug, Clone)]
pub struct RateLimitMiddleware {
    limiter: Arc<RateLimiter>,
}

impl RateLimitMiddleware {
    /// Wraps a shared limiter.
    #[must_use]
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }

    /// The shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }
}

impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(async move {
            if self.limiter.should_skip(&request) {
                return next.run(ctx, request).await;
            }

            let client_id = self.limiter.client_id(ctx);
            let now = tokio::time::Instant::now().into_std();

            match self.limiter.admit(&client_id, now) {
                Admission::Allowed { remaining, .. } => {
                    let mut response = next.run(ctx, request).await?;
                    let state = ctx.response_state().clone();
                    let mut headers = HeaderWriter::new(&mut response, &state, self.name());
                    headers.try_set(headers::LIMIT, &self.limiter.limit.to_string());
                    headers.try_set(headers::REMAINING, &remaining.to_string());
                    Ok(response)
                }
                Admission::Rejected { retry_after } => {
                    metrics::counter!("collegium_rate_limited_total").increment(1);
                    tracing::warn!(
                        request_id = %ctx.request_id(),
                        client_id = %client_id,
                        path = ctx.path(),
                        retry_after_secs = retry_after.as_secs(),
                        "rate limit exceeded"
                    );
                    Ok(self.limiter.rejection(ctx.channel(), retry_after))
                }
            }
        })
    }
}
