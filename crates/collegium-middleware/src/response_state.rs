//! Response transmission state.
//!
//! Once the first byte of a response has been handed to the transport, its
//! status and headers are frozen. [`ResponseState`] records that fact and
//! [`HeaderWriter`] refuses (silently, with a warning) to touch headers
//! afterwards.

use crate::types::Response;
use http::header::{HeaderName, HeaderValue};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Where a response is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Transmission {
    /// Nothing has been written yet; headers may change.
    NotStarted = 0,
    /// Status and headers have been sent; the body may still be streaming.
    Started = 1,
    /// The response has been fully written.
    Completed = 2,
    /// The peer went away before the response completed.
    Closed = 3,
}

impl Transmission {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Started,
            2 => Self::Completed,
            _ => Self::Closed,
        }
    }
}

/// Shared, request-scoped transmission flag.
///
/// Cloning shares the same flag, so the transport and the pipeline observe
/// each other's updates.
///
/// # Example
///
/// ```
/// use collegium_middleware::response_state::{ResponseState, Transmission};
///
/// let state = ResponseState::new();
/// let transport = state.clone();
/// transport.mark_started();
/// assert!(state.has_started());
/// assert_eq!(state.get(), Transmission::Started);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ResponseState(Arc<AtomicU8>);

impl ResponseState {
    /// Creates a fresh state in [`Transmission::NotStarted`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current transmission state.
    #[must_use]
    pub fn get(&self) -> Transmission {
        Transmission::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Returns `true` once anything other than `NotStarted` is recorded.
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.get() != Transmission::NotStarted
    }

    /// Returns `true` when the transport is gone.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.get() == Transmission::Closed
    }

    /// Records that status and headers were handed to the transport.
    pub fn mark_started(&self) {
        let _ = self.0.compare_exchange(
            Transmission::NotStarted as u8,
            Transmission::Started as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Records a fully written response. Has no effect once closed.
    pub fn mark_completed(&self) {
        let _ = self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != Transmission::Closed as u8).then_some(Transmission::Completed as u8)
            });
    }

    /// Records that the peer disconnected.
    pub fn mark_closed(&self) {
        self.0.store(Transmission::Closed as u8, Ordering::Release);
    }
}

/// Outcome of a guarded header write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderWrite {
    /// The header was written.
    Added,
    /// A value was already present and was kept.
    AlreadyPresent,
    /// The response had started; nothing was written.
    Skipped,
    /// Name or value was not a legal header.
    Invalid,
}

/// Header access guarded by a [`ResponseState`].
///
/// Every write checks the state first. Nothing here returns an error or
/// panics.
pub struct HeaderWriter<'a> {
    response: &'a mut Response,
    state: &'a ResponseState,
    stage: &'static str,
}

impl<'a> HeaderWriter<'a> {
    /// Wraps `response` for the named stage (used in warning logs).
    pub fn new(response: &'a mut Response, state: &'a ResponseState, stage: &'static str) -> Self {
        Self {
            response,
            state,
            stage,
        }
    }

    /// Returns `true` if the response can still be modified.
    #[must_use]
    pub fn is_writable(&self) -> bool {
        !self.state.has_started()
    }

    /// Read-only view of the response.
    #[must_use]
    pub fn response(&self) -> &Response {
        &*self.response
    }

    /// Adds a header unless one with that name already exists.
    pub fn try_add(&mut self, name: &str, value: &str) -> HeaderWrite {
        self.write(name, value, false)
    }

    /// Sets a header, replacing any existing value.
    pub fn try_set(&mut self, name: &str, value: &str) -> HeaderWrite {
        self.write(name, value, true)
    }

    fn write(&mut self, name: &str, value: &str, overwrite: bool) -> HeaderWrite {
        if !self.is_writable() {
            tracing::warn!(
                stage = self.stage,
                header = name,
                "cannot add header because the response has already started"
            );
            return HeaderWrite::Skipped;
        }

        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) else {
            tracing::warn!(stage = self.stage, header = name, "invalid header rejected");
            return HeaderWrite::Invalid;
        };

        let headers = self.response.headers_mut();
        if !overwrite && headers.contains_key(&name) {
            return HeaderWrite::AlreadyPresent;
        }
        headers.insert(name, value);
        HeaderWrite::Added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResponseExt;
    use http::StatusCode;

    #[test]
    fn test_state_transitions() {
        let state = ResponseState::new();
        assert_eq!(state.get(), Transmission::NotStarted);
        state.mark_started();
        state.mark_completed();
        assert_eq!(state.get(), Transmission::Completed);
        // completed never regresses to started
        state.mark_started();
        assert_eq!(state.get(), Transmission::Completed);
    }

    #[test]
    fn test_closed_is_sticky() {
        let state = ResponseState::new();
        state.mark_closed();
        state.mark_completed();
        assert!(state.is_closed());
        assert!(state.has_started());
    }

    #[test]
    fn test_try_add_keeps_existing() {
        let state = ResponseState::new();
        let mut response = Response::html(StatusCode::OK, "ok");
        let mut writer = HeaderWriter::new(&mut response, &state, "test");

        assert_eq!(writer.try_add("x-one", "1"), HeaderWrite::Added);
        assert_eq!(writer.try_add("x-one", "2"), HeaderWrite::AlreadyPresent);
        assert_eq!(writer.try_set("x-one", "3"), HeaderWrite::Added);
        assert_eq!(response.headers().get("x-one").unwrap(), "3");
    }

    #[test]
    fn test_write_after_start_is_noop() {
        let state = ResponseState::new();
        let mut response = Response::html(StatusCode::OK, "ok");
        state.mark_started();

        let mut writer = HeaderWriter::new(&mut response, &state, "test");
        assert_eq!(writer.try_add("x-late", "1"), HeaderWrite::Skipped);
        assert_eq!(writer.try_set("x-late", "1"), HeaderWrite::Skipped);
        assert!(response.headers().get("x-late").is_none());
    }

    #[test]
    fn test_invalid_header() {
        let state = ResponseState::new();
        let mut response = Response::html(StatusCode::OK, "ok");
        let mut writer = HeaderWriter::new(&mut response, &state, "test");
        assert_eq!(writer.try_add("bad header", "1"), HeaderWrite::Invalid);
        assert_eq!(writer.try_add("x-ok", "line\nbreak"), HeaderWrite::Invalid);
    }
}
