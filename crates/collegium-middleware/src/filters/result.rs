//! Result decorators.
//!
//! They run only when the action stage produced a response, write headers
//! with try-add semantics, and never fail.

use super::ResultFilter;
use crate::context::RequestContext;
use crate::response_state::HeaderWriter;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Header added by [`HeaderDecorator::default`].
pub const DEFAULT_RESULT_HEADER: (&str, &str) = ("X-Action-Result-Key", "ResultFilterApplied");

/// Last instant an HTTP date can express (9999-12-31T23:59:59Z).
const LATEST_HTTP_DATE_SECS: u64 = 253_402_300_799;

/// Timestamp header added by [`HeaderDecorator`].
pub const RESPONSE_TIME_HEADER: &str = "X-Response-Time";

/// Adds configured header pairs plus a UTC response timestamp.
#[derive(Debug, Clone)]
pub struct HeaderDecorator {
    headers: Vec<(String, String)>,
}

impl HeaderDecorator {
    /// Decorates with the given pairs.
    pub fn new<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        }
    }
}

impl Default for HeaderDecorator {
    fn default() -> Self {
        Self::new([DEFAULT_RESULT_HEADER])
    }
}

impl ResultFilter for HeaderDecorator {
    fn name(&self) -> &'static str {
        "header_decorator"
    }

    fn on_result_executing(&self, _ctx: &RequestContext, headers: &mut HeaderWriter<'_>) {
        for (name, value) in &self.headers {
            headers.try_add(name, value);
        }
        let now = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
        headers.try_add(RESPONSE_TIME_HEADER, &now);
    }
}

/// Marks the response as publicly cacheable for a fixed duration.
///
/// # Example
///
/// ```
/// use collegium_middleware::filters::result::CacheControlDecorator;
///
/// let decorator = CacheControlDecorator::new(60);
/// assert_eq!(decorator.cache_control(), "public, max-age=60");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CacheControlDecorator {
    max_age_secs: u64,
}

impl CacheControlDecorator {
    /// Caches for `max_age_secs` seconds.
    #[must_use]
    pub fn new(max_age_secs: u64) -> Self {
        Self { max_age_secs }
    }

    /// The `Cache-Control` value written.
    #[must_use]
    pub fn cache_control(&self) -> String {
        format!("public, max-age={}", self.max_age_secs)
    }
}

impl ResultFilter for CacheControlDecorator {
    fn name(&self) -> &'static str {
        "cache_control"
    }

    fn on_result_executing(&self, _ctx: &RequestContext, headers: &mut HeaderWriter<'_>) {
        headers.try_add(http::header::CACHE_CONTROL.as_str(), &self.cache_control());
        let latest = UNIX_EPOCH + Duration::from_secs(LATEST_HTTP_DATE_SECS);
        match SystemTime::now()
            .checked_add(Duration::from_secs(self.max_age_secs))
            .filter(|expires| *expires <= latest)
        {
            Some(expires) => {
                headers.try_add(http::header::EXPIRES.as_str(), &httpdate::fmt_http_date(expires));
            }
            None => tracing::warn!(
                max_age_secs = self.max_age_secs,
                "max-age past the last HTTP date, Expires not written"
            ),
        }
    }
}
