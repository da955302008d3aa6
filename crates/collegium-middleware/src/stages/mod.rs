//! Global middleware stages.
//!
//! 1. [`rate_limit`] - per-client fixed-window admission
//! 2. [`logging`] - request start/end lines and request metrics
//! 3. [`exception`] - failure and panic translation

pub mod exception;
pub mod logging;
pub mod rate_limit;

pub use exception::ExceptionBoundary;
pub use logging::RequestLogging;
pub use rate_limit::{Admission, KeyExtractor, RateLimitMiddleware, RateLimiter};
