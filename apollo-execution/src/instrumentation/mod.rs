//! Hooks observing, and possibly vetoing, every phase of an execution.
//!
//! Each `begin_*` hook returns a context whose `on_completed` is called with the
//! outcome of the phase. Returning an error from `on_completed` vetoes the outcome:
//! a vetoed parse, validation, operation or execution fails the whole request, a
//! vetoed field fetch becomes an error of that field.
//!
//! Per-execution state is created once by [`Instrumentation::create_state`] and handed
//! back to every hook of that execution.

mod chained;
pub(crate) mod dataloader;

use std::any::Any;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::validation::Valid;
pub use chained::ChainedInstrumentation;
pub use dataloader::DataLoaderDispatcherInstrumentation;
pub use dataloader::FieldLevelTrackingApproach;
use serde_json_bytes::Value;

use crate::error::ExecutionError;
use crate::error::FieldError;
use crate::execution::ExecutionContext;
use crate::execution::ExecutionId;
use crate::execution::ExecutionResultNode;
use crate::execution::ExecutionStrategyParameters;
use crate::execution::FieldValueInfo;
use crate::execution::MergedField;
use crate::graphql::Request;
use crate::graphql::Response;

/// State an instrumentation keeps for the duration of one execution.
pub type InstrumentationState = Arc<dyn Any + Send + Sync>;

/// Observes the outcome of one phase.
pub trait InstrumentationContext<T: ?Sized, E: ?Sized = ExecutionError>: Send + Sync {
    /// Called when the work of the phase has been handed off, before it completes.
    fn on_dispatched(&self) {}

    /// Called with the outcome of the phase. An error vetoes it.
    fn on_completed(&self, _result: Result<&T, &E>) -> Result<(), ExecutionError> {
        Ok(())
    }
}

/// Observes one strategy call.
pub trait ExecutionStrategyInstrumentationContext:
    InstrumentationContext<ExecutionResultNode>
{
    /// Called once every field of the call is fetched, with the shape of each value,
    /// before any child selection set runs.
    fn on_field_values_info(&self, _infos: &[FieldValueInfo]) {}
}

/// A context that does nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopContext;

impl<T: ?Sized, E: ?Sized> InstrumentationContext<T, E> for NoopContext {}

impl ExecutionStrategyInstrumentationContext for NoopContext {}

/// A boxed context that does nothing, without allocating.
pub fn noop<T: ?Sized, E: ?Sized>() -> Box<dyn InstrumentationContext<T, E>> {
    Box::new(NoopContext)
}

pub(crate) fn noop_strategy() -> Box<dyn ExecutionStrategyInstrumentationContext> {
    Box::new(NoopContext)
}

/// Parameters of the hooks spanning the whole execution.
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct InstrumentationExecutionParameters<'a> {
    pub execution_id: &'a ExecutionId,
    pub schema: &'a Valid<Schema>,
    pub request: &'a Request,
}

/// Parameters of [`Instrumentation::begin_validation`].
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct InstrumentationValidationParameters<'a> {
    pub execution_id: &'a ExecutionId,
    pub schema: &'a Arc<Valid<Schema>>,
    pub request: &'a Request,
}

/// Parameters of [`Instrumentation::begin_execute_operation`].
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct InstrumentationExecuteOperationParameters<'a> {
    pub execution_context: &'a ExecutionContext,
}

/// Parameters of [`Instrumentation::begin_execution_strategy`].
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct InstrumentationExecutionStrategyParameters<'a> {
    pub execution_context: &'a ExecutionContext,
    pub parameters: &'a ExecutionStrategyParameters,
}

/// Parameters of the hooks about a single field.
#[derive(Clone, Copy)]
#[non_exhaustive]
pub struct InstrumentationFieldParameters<'a> {
    pub execution_context: &'a ExecutionContext,
    /// The parameters of the field, `path` pointing at the field.
    pub parameters: &'a ExecutionStrategyParameters,
    pub field: &'a MergedField,
}

/// Hooks into the phases of an execution.
///
/// Every hook does nothing by default.
pub trait Instrumentation: Send + Sync + 'static {
    fn create_state(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
    ) -> Option<InstrumentationState> {
        None
    }

    fn begin_execution(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Response>> {
        noop()
    }

    fn begin_parse(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<ast::Document>> {
        noop()
    }

    fn begin_validation(
        &self,
        _parameters: &InstrumentationValidationParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Valid<ExecutableDocument>>> {
        noop()
    }

    /// Called once the operation is selected, before any field is fetched.
    fn begin_execute_operation(
        &self,
        _parameters: &InstrumentationExecuteOperationParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Response>> {
        noop()
    }

    fn begin_execution_strategy(
        &self,
        _parameters: &InstrumentationExecutionStrategyParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        noop_strategy()
    }

    fn begin_field_fetch(
        &self,
        _parameters: &InstrumentationFieldParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Value, FieldError>> {
        noop()
    }

    /// Called for each event of a subscription, before the event is completed.
    fn begin_subscribed_field_event(
        &self,
        _parameters: &InstrumentationFieldParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        noop_strategy()
    }

    /// Rewrites the response of an execution, or of a subscription event.
    fn instrument_execution_result(
        &self,
        response: Response,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Response {
        response
    }
}

/// Finds the state of type `S` an instrumentation created.
pub(crate) fn state_of<S: Send + Sync + 'static>(state: Option<&InstrumentationState>) -> Option<&S> {
    state?.downcast_ref::<S>()
}
