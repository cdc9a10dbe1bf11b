//! Dispatching of data loaders during execution.

mod field_level_tracking;

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use apollo_compiler::executable::OperationType;
pub use field_level_tracking::FieldLevelTrackingApproach;
use serde_json_bytes::Value;

use super::ExecutionStrategyInstrumentationContext;
use super::Instrumentation;
use super::InstrumentationContext;
use super::InstrumentationExecuteOperationParameters;
use super::InstrumentationExecutionParameters;
use super::InstrumentationExecutionStrategyParameters;
use super::InstrumentationFieldParameters;
use super::InstrumentationState;
use super::noop;
use super::noop_strategy;
use super::state_of;
use crate::dataloader::DataLoaderRegistry;
use crate::error::FieldError;
use crate::graphql::Response;

/// Dispatches a [`DataLoaderRegistry`] while an operation executes.
///
/// Queries and subscription events dispatch once per level of the result tree, via
/// [`FieldLevelTrackingApproach`]. Mutations run their root fields one at a time,
/// so they dispatch after every field fetch instead. Without level tracking every
/// operation dispatches after every field fetch.
#[derive(Clone, Debug)]
pub struct DataLoaderDispatcherInstrumentation {
    registry: DataLoaderRegistry,
    level_tracking: bool,
}

struct DispatcherState {
    approach: FieldLevelTrackingApproach,
    level_tracking: AtomicBool,
}

impl DataLoaderDispatcherInstrumentation {
    pub fn new(registry: DataLoaderRegistry) -> Self {
        Self {
            registry,
            level_tracking: true,
        }
    }

    pub fn with_level_tracking(mut self, level_tracking: bool) -> Self {
        self.level_tracking = level_tracking;
        self
    }

    pub fn registry(&self) -> &DataLoaderRegistry {
        &self.registry
    }
}

impl Instrumentation for DataLoaderDispatcherInstrumentation {
    fn create_state(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
    ) -> Option<InstrumentationState> {
        Some(std::sync::Arc::new(DispatcherState {
            approach: FieldLevelTrackingApproach::new(self.registry.clone()),
            level_tracking: AtomicBool::new(self.level_tracking),
        }))
    }

    fn begin_execute_operation(
        &self,
        parameters: &InstrumentationExecuteOperationParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Response>> {
        if let Some(state) = state_of::<DispatcherState>(state) {
            let operation_type = parameters.execution_context.operation().operation_type;
            if operation_type == OperationType::Mutation {
                tracing::debug!("dispatching data loaders after every field of the mutation");
                state.level_tracking.store(false, Ordering::Release);
            }
        }
        noop()
    }

    fn begin_execution_strategy(
        &self,
        parameters: &InstrumentationExecutionStrategyParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        match state_of::<DispatcherState>(state) {
            Some(state) if state.level_tracking.load(Ordering::Acquire) => {
                state.approach.begin_execution_strategy(parameters.parameters)
            }
            _ => noop_strategy(),
        }
    }

    fn begin_field_fetch(
        &self,
        parameters: &InstrumentationFieldParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Value, FieldError>> {
        match state_of::<DispatcherState>(state) {
            Some(state) if state.level_tracking.load(Ordering::Acquire) => {
                state.approach.begin_field_fetch(parameters.parameters)
            }
            _ => Box::new(DispatchOnFetch {
                registry: self.registry.clone(),
            }),
        }
    }

    fn begin_subscribed_field_event(
        &self,
        parameters: &InstrumentationFieldParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        match state_of::<DispatcherState>(state) {
            Some(state) if state.level_tracking.load(Ordering::Acquire) => {
                // the event stands for the already fetched root field
                state
                    .approach
                    .begin_subscribed_field_event(parameters.parameters.path.level())
            }
            _ => noop_strategy(),
        }
    }
}

/// Dispatches as soon as a field has been fetched.
struct DispatchOnFetch {
    registry: DataLoaderRegistry,
}

impl InstrumentationContext<Value, FieldError> for DispatchOnFetch {
    fn on_dispatched(&self) {
        self.registry.dispatch_all();
    }
}
