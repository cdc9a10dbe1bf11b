use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::validation::Valid;
use apollo_execution::ExecutionError;
use apollo_execution::Executor;
use apollo_execution::FieldError;
use apollo_execution::Request;
use apollo_execution::Response;
use apollo_execution::execution::FieldValueInfo;
use apollo_execution::instrumentation::ExecutionStrategyInstrumentationContext;
use apollo_execution::instrumentation::Instrumentation;
use apollo_execution::instrumentation::InstrumentationContext;
use apollo_execution::instrumentation::InstrumentationExecuteOperationParameters;
use apollo_execution::instrumentation::InstrumentationExecutionParameters;
use apollo_execution::instrumentation::InstrumentationExecutionStrategyParameters;
use apollo_execution::instrumentation::InstrumentationFieldParameters;
use apollo_execution::instrumentation::InstrumentationState;
use apollo_execution::instrumentation::InstrumentationValidationParameters;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json_bytes::Value;
use serde_json_bytes::json;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Default)]
struct Recorder {
    log: Log,
    veto_fetch_of: Option<&'static str>,
    veto_execution: bool,
}

struct Phase {
    name: String,
    log: Log,
    veto: Option<ExecutionError>,
}

impl Phase {
    fn begin(log: &Log, name: String) -> Self {
        log.lock().push(format!("begin {name}"));
        Self {
            name,
            log: log.clone(),
            veto: None,
        }
    }

    fn vetoing(mut self, reason: &str) -> Self {
        self.veto = Some(ExecutionError::Aborted {
            reason: reason.to_string(),
        });
        self
    }
}

impl<T: ?Sized, E: ?Sized> InstrumentationContext<T, E> for Phase {
    fn on_dispatched(&self) {
        self.log.lock().push(format!("dispatched {}", self.name));
    }

    fn on_completed(&self, _result: Result<&T, &E>) -> Result<(), ExecutionError> {
        self.log.lock().push(format!("completed {}", self.name));
        match &self.veto {
            Some(veto) => Err(veto.clone()),
            None => Ok(()),
        }
    }
}

impl ExecutionStrategyInstrumentationContext for Phase {
    fn on_field_values_info(&self, infos: &[FieldValueInfo]) {
        self.log
            .lock()
            .push(format!("{} values of {}", infos.len(), self.name));
    }
}

impl Instrumentation for Recorder {
    fn create_state(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
    ) -> Option<InstrumentationState> {
        self.log.lock().push("state".to_string());
        None
    }

    fn begin_execution(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Response>> {
        let phase = Phase::begin(&self.log, "execution".to_string());
        if self.veto_execution {
            Box::new(phase.vetoing("too late"))
        } else {
            Box::new(phase)
        }
    }

    fn begin_parse(
        &self,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<ast::Document>> {
        Box::new(Phase::begin(&self.log, "parse".to_string()))
    }

    fn begin_validation(
        &self,
        _parameters: &InstrumentationValidationParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Valid<ExecutableDocument>>> {
        Box::new(Phase::begin(&self.log, "validation".to_string()))
    }

    fn begin_execute_operation(
        &self,
        _parameters: &InstrumentationExecuteOperationParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Response>> {
        Box::new(Phase::begin(&self.log, "operation".to_string()))
    }

    fn begin_execution_strategy(
        &self,
        parameters: &InstrumentationExecutionStrategyParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn ExecutionStrategyInstrumentationContext> {
        let name = format!("strategy '{}'", parameters.parameters.path);
        Box::new(Phase::begin(&self.log, name))
    }

    fn begin_field_fetch(
        &self,
        parameters: &InstrumentationFieldParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Value, FieldError>> {
        let path = parameters.parameters.path.to_string();
        let phase = Phase::begin(&self.log, format!("fetch {path}"));
        if self.veto_fetch_of == Some(path.as_str()) {
            Box::new(phase.vetoing("not allowed"))
        } else {
            Box::new(phase)
        }
    }

    fn instrument_execution_result(
        &self,
        mut response: Response,
        _parameters: &InstrumentationExecutionParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Response {
        response.extensions.insert("recorded", Value::Bool(true));
        response
    }
}

fn executor(recorder: Recorder) -> Executor {
    let schema = Schema::parse_and_validate(
        "type Query { a: A d: Int } type A { b: Int c: Int }",
        "schema.graphql",
    )
    .unwrap();
    let instrumentation: Arc<dyn Instrumentation> = Arc::new(recorder);
    Executor::builder()
        .schema(Arc::new(schema))
        .instrumentation(instrumentation)
        .build()
}

fn request(query: &str) -> Request {
    Request::builder()
        .query(query)
        .root_value(json!({ "a": { "b": 1, "c": 2 }, "d": 3 }))
        .build()
}

#[tokio::test]
async fn every_phase_is_observed_in_order() {
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let response = executor(recorder).execute(request("{ a { b } }")).await;

    assert_eq!(response.data, json!({ "a": { "b": 1 } }));
    assert_eq!(response.extensions.get("recorded"), Some(&Value::Bool(true)));
    assert_eq!(
        *log.lock(),
        vec![
            "state",
            "begin execution",
            "begin parse",
            "completed parse",
            "begin validation",
            "completed validation",
            "begin operation",
            "begin strategy ''",
            "begin fetch /a",
            "dispatched fetch /a",
            "completed fetch /a",
            "1 values of strategy ''",
            "begin strategy '/a'",
            "begin fetch /a/b",
            "dispatched fetch /a/b",
            "completed fetch /a/b",
            "1 values of strategy '/a'",
            "completed strategy '/a'",
            "completed strategy ''",
            "completed operation",
            "completed execution",
        ]
    );
}

#[tokio::test]
async fn a_vetoed_fetch_becomes_a_field_error() {
    let recorder = Recorder {
        veto_fetch_of: Some("/a/c"),
        ..Default::default()
    };
    let response = executor(recorder).execute(request("{ a { b c } d }")).await;

    assert_eq!(response.data, json!({ "a": { "b": 1, "c": null }, "d": 3 }));
    assert_eq!(response.errors.len(), 1);
    assert_eq!(response.errors[0].message, "execution aborted: not allowed");
    assert_eq!(response.errors[0].extension_code(), Some("EXECUTION_ABORTED"));
}

#[tokio::test]
async fn a_vetoed_execution_replaces_the_response() {
    let recorder = Recorder {
        veto_execution: true,
        ..Default::default()
    };
    let response = executor(recorder).execute(request("{ d }")).await;

    assert_eq!(response.data, Value::Null);
    assert_eq!(
        response.errors,
        ExecutionError::Aborted {
            reason: "too late".to_string()
        }
        .to_graphql_errors()
    );
}

#[tokio::test]
async fn syntax_errors_stop_after_parsing() {
    let recorder = Recorder::default();
    let log = recorder.log.clone();
    let response = executor(recorder).execute(request("{ a {")).await;

    assert_eq!(response.data, Value::Null);
    assert!(!response.errors.is_empty());
    assert_eq!(
        *log.lock(),
        vec![
            "state",
            "begin execution",
            "begin parse",
            "completed parse",
            "completed execution",
        ]
    );
}
