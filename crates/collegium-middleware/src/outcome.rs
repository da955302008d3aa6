//! Tagged stage outcomes.

use crate::types::{Response, ResponseExt};
use collegium_core::PipelineError;
use http::StatusCode;
use serde::Serialize;

/// What a "before" stage decided.
///
/// Once a stage returns [`ShortCircuit`](Self::ShortCircuit) or
/// [`Failure`](Self::Failure), no later "before" stage and no handler runs.
/// "After" hooks of stages already entered still run, innermost first.
#[derive(Debug)]
pub enum PipelineResult {
    /// Proceed to the next stage.
    Continue,
    /// Stop here and send this response.
    ShortCircuit(Response),
    /// Propagate an unexpected failure to the exception boundary.
    Failure(PipelineError),
}

impl PipelineResult {
    /// Short-circuits with a JSON body.
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        Self::ShortCircuit(Response::json(status, body))
    }

    /// Returns `true` for [`Continue`](Self::Continue).
    #[must_use]
    pub const fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Status of the short-circuit response, if any.
    #[must_use]
    pub fn short_circuit_status(&self) -> Option<StatusCode> {
        match self {
            Self::ShortCircuit(response) => Some(response.status()),
            _ => None,
        }
    }
}

impl From<PipelineError> for PipelineResult {
    fn from(error: PipelineError) -> Self {
        Self::Failure(error)
    }
}
