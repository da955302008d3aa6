//! Route-level filters.
//!
//! Filters are attached to a route through a [`FilterChain`](crate::FilterChain)
//! and run inside the exception boundary in this order:
//!
//! ```text
//! Resource(before) -> binding -> Authorization -> Action(before) -> Handler
//!                                                                     |
//! Resource(after) <- Result decorators <- Action(after) <-------------+
//! ```
//!
//! "Before" hooks may short-circuit. "After" hooks run in reverse order for
//! every filter whose "before" hook returned `Continue`.

pub mod action;
pub mod authorization;
pub mod resource;
pub mod result;

use crate::context::RequestContext;
use crate::outcome::PipelineResult;
use crate::response_state::{HeaderWriter, ResponseState};
use crate::types::{HandlerResult, Response};
use collegium_core::{BoxFuture, PipelineError};
use std::time::Duration;

/// Runs first; may reject before the body is bound.
pub trait ResourceFilter: Send + Sync + 'static {
    /// Filter name for logs.
    fn name(&self) -> &'static str;

    /// Called before binding, authorization, and the handler.
    fn on_resource_executing<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult>;

    /// Called after everything inside this filter has finished.
    fn on_resource_executed(
        &self,
        _ctx: &RequestContext,
        _executed: &mut ResourceExecuted<'_>,
    ) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Decides whether the caller may reach the handler.
///
/// Denials are short-circuit responses, never errors.
pub trait AuthorizationFilter: Send + Sync + 'static {
    /// Filter name for logs.
    fn name(&self) -> &'static str;

    /// Returns `Continue` to allow, `ShortCircuit` to deny.
    fn authorize<'a>(&'a self, ctx: &'a RequestContext) -> BoxFuture<'a, PipelineResult>;
}

/// Wraps the handler invocation.
pub trait ActionFilter: Send + Sync + 'static {
    /// Filter name for logs.
    fn name(&self) -> &'static str;

    /// Called right before the handler.
    fn on_action_executing<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
    ) -> BoxFuture<'a, PipelineResult>;

    /// Observes the action outcome. Cannot change it.
    fn on_action_executed(
        &self,
        _ctx: &RequestContext,
        _executed: &ActionExecuted<'_>,
    ) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Mutates headers of a produced result. Never short-circuits or fails.
pub trait ResultFilter: Send + Sync + 'static {
    /// Filter name for logs.
    fn name(&self) -> &'static str;

    /// Called before the result is handed back for transmission.
    fn on_result_executing(&self, ctx: &RequestContext, headers: &mut HeaderWriter<'_>);

    /// Called after all result filters have run.
    fn on_result_executed(&self, _ctx: &RequestContext, _response: &Response) {}
}

/// What an action filter's "after" hook observes.
#[derive(Debug)]
pub struct ActionExecuted<'r> {
    outcome: Result<&'r Response, &'r PipelineError>,
    short_circuited: bool,
    elapsed: Duration,
}

impl<'r> ActionExecuted<'r> {
    pub(crate) fn new(outcome: &'r HandlerResult, short_circuited: bool, elapsed: Duration) -> Self {
        Self {
            outcome: outcome.as_ref(),
            short_circuited,
            elapsed,
        }
    }

    /// The response, when the action produced one.
    #[must_use]
    pub fn response(&self) -> Option<&'r Response> {
        self.outcome.ok()
    }

    /// The failure raised inside this filter, if any.
    #[must_use]
    pub fn error(&self) -> Option<&'r PipelineError> {
        self.outcome.err()
    }

    /// `true` when an inner action filter answered instead of the handler.
    #[must_use]
    pub fn was_short_circuited(&self) -> bool {
        self.short_circuited
    }

    /// Time since this filter's "before" hook started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}

/// What a resource filter's "after" hook observes.
pub struct ResourceExecuted<'r> {
    outcome: &'r mut HandlerResult,
    state: ResponseState,
    elapsed: Duration,
}

impl<'r> ResourceExecuted<'r> {
    pub(crate) fn new(outcome: &'r mut HandlerResult, state: ResponseState, elapsed: Duration) -> Self {
        Self {
            outcome,
            state,
            elapsed,
        }
    }

    /// The response, when one was produced.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        self.outcome.as_ref().ok()
    }

    /// The failure raised inside this filter, if any.
    #[must_use]
    pub fn error(&self) -> Option<&PipelineError> {
        self.outcome.as_ref().err()
    }

    /// Time since this filter's "before" hook started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Guarded header access; `None` when there is no response to modify.
    pub fn headers(&mut self, stage: &'static str) -> Option<HeaderWriter<'_>> {
        match &mut *self.outcome {
            Ok(response) => Some(HeaderWriter::new(response, &self.state, stage)),
            Err(_) => None,
        }
    }
}

/// Formats a duration as whole milliseconds, e.g. `"12ms"`.
pub(crate) fn millis(duration: Duration) -> String {
    format!("{}ms", duration.as_millis())
}
