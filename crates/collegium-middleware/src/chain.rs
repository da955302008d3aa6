//! Per-route filter composition.
//!
//! A [`FilterChain`] is built explicitly when a route is registered: the
//! filters that wrap a handler are listed in code, in order, next to the
//! handler they wrap.

use crate::binding::{self, BindingOptions};
use crate::context::RequestContext;
use crate::filters::{
    ActionExecuted, ActionFilter, AuthorizationFilter, ResourceExecuted, ResourceFilter,
    ResultFilter,
};
use crate::handler::Handler;
use crate::outcome::PipelineResult;
use crate::response_state::HeaderWriter;
use crate::stages::exception::panic_message;
use crate::types::{HandlerResult, Request};
use collegium_core::{BoxFuture, PipelineError};
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

/// A handler wrapped in resource, authorization, action, and result filters.
///
/// # Example
///
/// ```
/// use collegium_middleware::filters::authorization::PathSuffixFilter;
/// use collegium_middleware::filters::result::CacheControlDecorator;
/// use collegium_middleware::{handler_fn, FilterChain, Response, ResponseExt};
/// use http::StatusCode;
///
/// let chain = FilterChain::builder()
///     .authorization(PathSuffixFilter::admin())
///     .result(CacheControlDecorator::new(60))
///     .handler(handler_fn(|_ctx, _req| async {
///         Ok(Response::html(StatusCode::OK, "reports"))
///     }));
///
/// assert_eq!(chain.filter_names(), vec!["path_suffix", "cache_control"]);
/// ```
pub struct FilterChain {
    resource: Vec<Arc<dyn ResourceFilter>>,
    authorization: Vec<Arc<dyn AuthorizationFilter>>,
    action: Vec<Arc<dyn ActionFilter>>,
    result: Vec<Arc<dyn ResultFilter>>,
    binding: BindingOptions,
    handler: Arc<dyn Handler>,
}

impl FilterChain {
    /// Creates a new chain builder.
    #[must_use]
    pub fn builder() -> FilterChainBuilder {
        FilterChainBuilder::default()
    }

    /// Names of all filters, in execution order of their "before" hooks.
    #[must_use]
    pub fn filter_names(&self) -> Vec<&'static str> {
        self.resource
            .iter()
            .map(|f| f.name())
            .chain(self.authorization.iter().map(|f| f.name()))
            .chain(self.action.iter().map(|f| f.name()))
            .chain(self.result.iter().map(|f| f.name()))
            .collect()
    }

    /// Runs the chain.
    pub async fn execute(&self, ctx: &mut RequestContext, request: Request) -> HandlerResult {
        let mut entered: Vec<(usize, Instant)> = Vec::with_capacity(self.resource.len());
        let mut early: Option<HandlerResult> = None;

        for (index, filter) in self.resource.iter().enumerate() {
            let started = Instant::now();
            match filter.on_resource_executing(ctx).await {
                PipelineResult::Continue => entered.push((index, started)),
                PipelineResult::ShortCircuit(response) => {
                    log_short_circuit(ctx, "resource", filter.name(), &response);
                    early = Some(Ok(response));
                    break;
                }
                PipelineResult::Failure(error) => {
                    early = Some(Err(error));
                    break;
                }
            }
        }

        let mut outcome = match early {
            Some(outcome) => outcome,
            None => self.execute_inner(ctx, request).await,
        };

        for (index, started) in entered.into_iter().rev() {
            let filter = &self.resource[index];
            let state = ctx.response_state().clone();
            let mut executed = ResourceExecuted::new(&mut outcome, state, started.elapsed());
            if let Err(error) = filter.on_resource_executed(ctx, &mut executed) {
                outcome = merge_failure(outcome, error, filter.name());
            }
        }

        outcome
    }

    async fn execute_inner(&self, ctx: &mut RequestContext, request: Request) -> HandlerResult {
        let request = binding::bind(ctx, request, &self.binding).await?;

        for filter in &self.authorization {
            match filter.authorize(ctx).await {
                PipelineResult::Continue => {}
                PipelineResult::ShortCircuit(response) => {
                    metrics::counter!(
                        "collegium_authz_denials_total",
                        "filter" => filter.name(),
                        "status" => response.status().as_u16().to_string()
                    )
                    .increment(1);
                    log_short_circuit(ctx, "authorization", filter.name(), &response);
                    return Ok(response);
                }
                PipelineResult::Failure(error) => return Err(error),
            }
        }

        let mut entered: Vec<(usize, Instant)> = Vec::with_capacity(self.action.len());
        let mut early: Option<HandlerResult> = None;
        let mut short_circuited = false;

        for (index, filter) in self.action.iter().enumerate() {
            let started = Instant::now();
            match filter.on_action_executing(ctx).await {
                PipelineResult::Continue => entered.push((index, started)),
                PipelineResult::ShortCircuit(response) => {
                    log_short_circuit(ctx, "action", filter.name(), &response);
                    short_circuited = true;
                    early = Some(Ok(response));
                    break;
                }
                PipelineResult::Failure(error) => {
                    early = Some(Err(error));
                    break;
                }
            }
        }

        let mut outcome = match early {
            Some(outcome) => outcome,
            None => self.invoke_handler(ctx, request).await,
        };

        for (index, started) in entered.into_iter().rev() {
            let filter = &self.action[index];
            let executed = ActionExecuted::new(&outcome, short_circuited, started.elapsed());
            if let Err(error) = filter.on_action_executed(ctx, &executed) {
                outcome = merge_failure(outcome, error, filter.name());
            }
        }

        if let Ok(response) = &mut outcome {
            let state = ctx.response_state().clone();
            for filter in &self.result {
                let mut headers = HeaderWriter::new(response, &state, filter.name());
                filter.on_result_executing(ctx, &mut headers);
            }
            for filter in self.result.iter().rev() {
                filter.on_result_executed(ctx, response);
            }
        }

        outcome
    }

    async fn invoke_handler(&self, ctx: &mut RequestContext, request: Request) -> HandlerResult {
        match AssertUnwindSafe(self.handler.call(ctx, request))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(panic) => Err(PipelineError::unclassified(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }
}

impl Handler for FilterChain {
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
    ) -> BoxFuture<'a, HandlerResult> {
        Box::pin(self.execute(ctx, request))
    }
}

/// Keeps the first failure; a later one is only logged.
fn merge_failure(outcome: HandlerResult, error: PipelineError, filter: &'static str) -> HandlerResult {
    match outcome {
        Ok(_) => Err(error),
        Err(first) => {
            tracing::warn!(
                filter,
                error = %error,
                "after-hook failed while another failure was propagating"
            );
            Err(first)
        }
    }
}

fn log_short_circuit(
    ctx: &RequestContext,
    stage: &'static str,
    filter: &'static str,
    response: &crate::types::Response,
) {
    tracing::info!(
        request_id = %ctx.request_id(),
        operation_id = ctx.operation_label(),
        stage,
        filter,
        status_code = response.status().as_u16(),
        "request short-circuited"
    );
}

/// Builder for [`FilterChain`].
#[derive(Default)]
pub struct FilterChainBuilder {
    resource: Vec<Arc<dyn ResourceFilter>>,
    authorization: Vec<Arc<dyn AuthorizationFilter>>,
    action: Vec<Arc<dyn ActionFilter>>,
    result: Vec<Arc<dyn ResultFilter>>,
    binding: BindingOptions,
}

impl FilterChainBuilder {
    /// Appends a resource filter.
    #[must_use]
    pub fn resource<F: ResourceFilter>(mut self, filter: F) -> Self {
        self.resource.push(Arc::new(filter));
        self
    }

    /// Appends an authorization filter.
    #[must_use]
    pub fn authorization<F: AuthorizationFilter>(mut self, filter: F) -> Self {
        self.authorization.push(Arc::new(filter));
        self
    }

    /// Appends an action filter.
    #[must_use]
    pub fn action<F: ActionFilter>(mut self, filter: F) -> Self {
        self.action.push(Arc::new(filter));
        self
    }

    /// Appends a result filter.
    #[must_use]
    pub fn result<F: ResultFilter>(mut self, filter: F) -> Self {
        self.result.push(Arc::new(filter));
        self
    }

    /// Appends an already shared action filter.
    #[must_use]
    pub fn shared_action(mut self, filter: Arc<dyn ActionFilter>) -> Self {
        self.action.push(filter);
        self
    }

    /// Appends an already shared authorization filter.
    #[must_use]
    pub fn shared_authorization(mut self, filter: Arc<dyn AuthorizationFilter>) -> Self {
        self.authorization.push(filter);
        self
    }

    /// Sets model-binding options.
    #[must_use]
    pub fn binding(mut self, options: BindingOptions) -> Self {
        self.binding = options;
        self
    }

    /// Finishes the chain around `handler`.
    #[must_use]
    pub fn handler<H: Handler>(self, handler: H) -> FilterChain {
        self.shared_handler(Arc::new(handler))
    }

    /// Finishes the chain around an already shared handler.
    #[must_use]
    pub fn shared_handler(self, handler: Arc<dyn Handler>) -> FilterChain {
        FilterChain {
            resource: self.resource,
            authorization: self.authorization,
            action: self.action,
            result: self.result,
            binding: self.binding,
            handler,
        }
    }
}
