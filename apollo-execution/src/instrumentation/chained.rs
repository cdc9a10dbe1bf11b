use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::ast;
use apollo_compiler::validation::Valid;
use serde_json_bytes::Value;

use super::ExecutionStrategyInstrumentationContext;
use super::Instrumentation;
use super::InstrumentationContext;
use super::InstrumentationExecuteOperationParameters;
use super::InstrumentationExecutionParameters;
use super::InstrumentationExecutionStrategyParameters;
use super::InstrumentationFieldParameters;
use super::InstrumentationState;
use super::InstrumentationValidationParameters;
use super::state_of;
use crate::error::ExecutionError;
use crate::error::FieldError;
use crate::execution::ExecutionResultNode;
use crate::execution::FieldValueInfo;
use crate::graphql::Response;

/// Runs several instrumentations as one.
///
/// Each instrumentation gets its own state. `begin_*` hooks run in installation
/// order, completions in reverse order. Every completion runs even after a veto, and
/// the first veto wins.
#[derive(Clone, Default)]
pub struct ChainedInstrumentation {
    instrumentations: Vec<Arc<dyn Instrumentation>>,
}

struct ChainedState(Vec<Option<InstrumentationState>>);

impl ChainedInstrumentation {
    pub fn new(instrumentations: Vec<Arc<dyn Instrumentation>>) -> Self {
        Self { instrumentations }
    }

    pub fn len(&self) -> usize {
        self.instrumentations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instrumentations.is_empty()
    }

    /// Pairs each instrumentation with the state it created.
    fn each<'a>(
        &'a self,
        state: Option<&'a InstrumentationState>,
    ) -> impl Iterator<Item = (&'a Arc<dyn Instrumentation>, Option<&'a InstrumentationState>)> + 'a
    {
        let states = state_of::<ChainedState>(state);
        self.instrumentations
            .iter()
            .enumerate()
            .map(move |(index, instrumentation)| {
                let state = states.and_then(|states| states.0.get(index)?.as_ref());
                (instrumentation, state)
            })
    }

    fn chain<T: ?Sized + 'static, E: ?Sized + 'static>(
        &self,
        state: Option<&InstrumentationState>,
        begin: impl Fn(
            &Arc<dyn Instrumentation>,
            Option<&InstrumentationState>,
        ) -> Box<dyn InstrumentationContext<T, E>>,
    ) -> Box<dyn InstrumentationContext<T, E>> {
        let contexts = self
            .each(state)
            .map(|(instrumentation, state)| begin(instrumentation, state))
            .collect();
        Box::new(ChainedContext { contexts })
    }

    fn chain_strategy(
        &self,
        state: Option<&InstrumentationState>,
        begin: impl Fn(
            &Arc<dyn Instrumentation>,
            Option<&InstrumentationState>,
        ) -> Box<dyn ExecutionStrategyInstrumentationContext>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        let contexts = self
            .each(state)
            .map(|(instrumentation, state)| begin(instrumentation, state))
            .collect();
        Box::new(ChainedStrategyContext { contexts })
    }
}

impl Instrumentation for ChainedInstrumentation {
    fn create_state(
        &self,
        parameters: &InstrumentationExecutionParameters<'_>,
    ) -> Option<InstrumentationState> {
        let states = self
            .instrumentations
            .iter()
            .map(|instrumentation| instrumentation.create_state(parameters))
            .collect();
        Some(Arc::new(ChainedState(states)))
    }

    fn begin_execution(
        &self,
        parameters: &InstrumentationExecutionParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Response>> {
        self.chain(state, |instrumentation, state| {
            instrumentation.begin_execution(parameters, state)
        })
    }

    fn begin_parse(
        &self,
        parameters: &InstrumentationExecutionParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<ast::Document>> {
        self.chain(state, |instrumentation, state| {
            instrumentation.begin_parse(parameters, state)
        })
    }

    fn begin_validation(
        &self,
        parameters: &InstrumentationValidationParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Valid<ExecutableDocument>>> {
        self.chain(state, |instrumentation, state| {
            instrumentation.begin_validation(parameters, state)
        })
    }

    fn begin_execute_operation(
        &self,
        parameters: &InstrumentationExecuteOperationParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Response>> {
        self.chain(state, |instrumentation, state| {
            instrumentation.begin_execute_operation(parameters, state)
        })
    }

    fn begin_execution_strategy(
        &self,
        parameters: &InstrumentationExecutionStrategyParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        self.chain_strategy(state, |instrumentation, state| {
            instrumentation.begin_execution_strategy(parameters, state)
        })
    }

    fn begin_field_fetch(
        &self,
        parameters: &InstrumentationFieldParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Value, FieldError>> {
        self.chain(state, |instrumentation, state| {
            instrumentation.begin_field_fetch(parameters, state)
        })
    }

    fn begin_subscribed_field_event(
        &self,
        parameters: &InstrumentationFieldParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        self.chain_strategy(state, |instrumentation, state| {
            instrumentation.begin_subscribed_field_event(parameters, state)
        })
    }

    fn instrument_execution_result(
        &self,
        response: Response,
        parameters: &InstrumentationExecutionParameters<'_>,
        state: Option<&InstrumentationState>,
    ) -> Response {
        self.each(state)
            .fold(response, |response, (instrumentation, state)| {
                instrumentation.instrument_execution_result(response, parameters, state)
            })
    }
}

struct ChainedContext<C: ?Sized> {
    contexts: Vec<Box<C>>,
}

impl<T: ?Sized + 'static, E: ?Sized + 'static> InstrumentationContext<T, E>
    for ChainedContext<dyn InstrumentationContext<T, E>>
{
    fn on_dispatched(&self) {
        for context in &self.contexts {
            context.on_dispatched();
        }
    }

    fn on_completed(&self, result: Result<&T, &E>) -> Result<(), ExecutionError> {
        self.contexts
            .iter()
            .rev()
            .fold(Ok(()), |outcome, context| outcome.and(context.on_completed(result)))
    }
}

struct ChainedStrategyContext {
    contexts: Vec<Box<dyn ExecutionStrategyInstrumentationContext>>,
}

impl InstrumentationContext<ExecutionResultNode> for ChainedStrategyContext {
    fn on_dispatched(&self) {
        for context in &self.contexts {
            context.on_dispatched();
        }
    }

    fn on_completed(
        &self,
        result: Result<&ExecutionResultNode, &ExecutionError>,
    ) -> Result<(), ExecutionError> {
        self.contexts
            .iter()
            .rev()
            .fold(Ok(()), |outcome, context| outcome.and(context.on_completed(result)))
    }
}

impl ExecutionStrategyInstrumentationContext for ChainedStrategyContext {
    fn on_field_values_info(&self, infos: &[FieldValueInfo]) {
        for context in &self.contexts {
            context.on_field_values_info(infos);
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::execution::ExecutionId;
    use crate::graphql::Request;

    struct Recording {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        veto: bool,
    }

    struct RecordingContext {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        veto: bool,
    }

    impl InstrumentationContext<Response> for RecordingContext {
        fn on_completed(&self, _result: Result<&Response, &ExecutionError>) -> Result<(), ExecutionError> {
            self.log.lock().push(format!("{} completed", self.name));
            if self.veto {
                Err(ExecutionError::Aborted {
                    reason: self.name.to_string(),
                })
            } else {
                Ok(())
            }
        }
    }

    impl Instrumentation for Recording {
        fn create_state(
            &self,
            _parameters: &InstrumentationExecutionParameters<'_>,
        ) -> Option<InstrumentationState> {
            Some(Arc::new(self.name))
        }

        fn begin_execution(
            &self,
            _parameters: &InstrumentationExecutionParameters<'_>,
            state: Option<&InstrumentationState>,
        ) -> Box<dyn InstrumentationContext<Response>> {
            let state = state_of::<&'static str>(state).copied().unwrap_or("missing");
            self.log.lock().push(format!("{} begin with {state}", self.name));
            Box::new(RecordingContext {
                name: self.name,
                log: self.log.clone(),
                veto: self.veto,
            })
        }

        fn instrument_execution_result(
            &self,
            mut response: Response,
            _parameters: &InstrumentationExecutionParameters<'_>,
            _state: Option<&InstrumentationState>,
        ) -> Response {
            response.extensions.insert(self.name, Value::Bool(true));
            response
        }
    }

    #[test]
    fn hooks_run_in_order_and_completions_in_reverse() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let recording = |name, veto| -> Arc<dyn Instrumentation> {
            Arc::new(Recording {
                name,
                log: log.clone(),
                veto,
            })
        };
        let chained =
            ChainedInstrumentation::new(vec![recording("first", true), recording("second", true)]);

        let schema = Valid::assume_valid(apollo_compiler::Schema::new());
        let request = Request::builder().query("{ a }").build();
        let execution_id = ExecutionId::from("test");
        let parameters = InstrumentationExecutionParameters {
            execution_id: &execution_id,
            schema: &schema,
            request: &request,
        };
        let state = chained.create_state(&parameters);
        let context = chained.begin_execution(&parameters, state.as_ref());
        let outcome = context.on_completed(Ok(&Response::default()));

        assert_eq!(
            outcome,
            Err(ExecutionError::Aborted {
                reason: "second".to_string()
            })
        );
        assert_eq!(
            *log.lock(),
            vec![
                "first begin with first",
                "second begin with second",
                "second completed",
                "first completed",
            ]
        );

        let response =
            chained.instrument_execution_result(Response::default(), &parameters, state.as_ref());
        assert_eq!(response.extensions.len(), 2);
    }
}
