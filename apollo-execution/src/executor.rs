//! The entry point of the engine: parses, validates and executes requests.
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::executable::OperationType;
use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::Valid;
use futures::StreamExt;
use futures::stream;
use tracing::Instrument;

use crate::analysis::MaxQueryComplexityInstrumentation;
use crate::configuration::Configuration;
use crate::dataloader::DataLoaderRegistry;
use crate::error::ExecutionError;
use crate::execution::AsyncExecutionStrategy;
use crate::execution::AsyncSerialExecutionStrategy;
use crate::execution::ExecutionContext;
use crate::execution::ExecutionId;
use crate::execution::ExecutionIdProvider;
use crate::execution::ExecutionStrategy;
use crate::execution::SubscriptionExecutionStrategy;
use crate::execution::UuidExecutionIdProvider;
use crate::execution::get_operation;
use crate::execution::get_root_type;
use crate::execution::operation_kind;
use crate::graphql::Error;
use crate::graphql::ErrorClassification;
use crate::graphql::Request;
use crate::graphql::Response;
use crate::graphql::ResponseStream;
use crate::instrumentation::ChainedInstrumentation;
use crate::instrumentation::DataLoaderDispatcherInstrumentation;
use crate::instrumentation::Instrumentation;
use crate::instrumentation::InstrumentationExecuteOperationParameters;
use crate::instrumentation::InstrumentationExecutionParameters;
use crate::instrumentation::InstrumentationState;
use crate::instrumentation::InstrumentationValidationParameters;
use crate::resolver::Resolvers;

const QUERY_SOURCE: &str = "query.graphql";

/// The outcome of [`Executor::parse_and_validate`].
#[derive(Clone, Debug)]
pub enum ParseAndValidateResult {
    Valid(Arc<Valid<ExecutableDocument>>),
    InvalidSyntax(Vec<Error>),
    ValidationFailed(Vec<Error>),
}

impl ParseAndValidateResult {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Valid(_))
    }

    pub fn document(&self) -> Option<&Arc<Valid<ExecutableDocument>>> {
        match self {
            Self::Valid(document) => Some(document),
            _ => None,
        }
    }

    /// The syntax or validation errors, empty for a valid document.
    pub fn errors(&self) -> &[Error] {
        match self {
            Self::Valid(_) => &[],
            Self::InvalidSyntax(errors) | Self::ValidationFailed(errors) => errors,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum EntryPoint {
    Execute,
    Subscribe,
}

impl EntryPoint {
    fn name(self) -> &'static str {
        match self {
            EntryPoint::Execute => "execute",
            EntryPoint::Subscribe => "subscribe",
        }
    }

    fn supports(self, operation_type: OperationType) -> bool {
        (operation_type == OperationType::Subscription) == (self == EntryPoint::Subscribe)
    }
}

/// Executes GraphQL requests against a schema and its resolvers.
///
/// Queries resolve sibling fields concurrently, mutations resolve their root fields
/// one at a time, and subscriptions map each event of their source stream to a
/// response.
#[derive(Clone)]
pub struct Executor {
    schema: Arc<Valid<Schema>>,
    resolvers: Arc<Resolvers>,
    instrumentation: Arc<ChainedInstrumentation>,
    configuration: Arc<Configuration>,
    execution_id_provider: Arc<dyn ExecutionIdProvider>,
    query_strategy: Arc<dyn ExecutionStrategy>,
    mutation_strategy: Arc<dyn ExecutionStrategy>,
    subscription_strategy: SubscriptionExecutionStrategy,
}

#[buildstructor::buildstructor]
impl Executor {
    /// Creates an executor.
    ///
    /// Built-in instrumentations enabled by the configuration run before
    /// `instrumentations`: the complexity limit, then data loader dispatching when a
    /// registry is given.
    #[builder(visibility = "pub")]
    fn new(
        schema: Arc<Valid<Schema>>,
        resolvers: Option<Resolvers>,
        instrumentations: Vec<Arc<dyn Instrumentation>>,
        configuration: Option<Configuration>,
        data_loader_registry: Option<DataLoaderRegistry>,
        execution_id_provider: Option<Arc<dyn ExecutionIdProvider>>,
    ) -> Self {
        let configuration = configuration.unwrap_or_default();
        let mut chain: Vec<Arc<dyn Instrumentation>> = Vec::new();
        if let Some(max) = configuration.limits.max_complexity {
            let complexity = MaxQueryComplexityInstrumentation::new(max);
            let complexity = if configuration.limits.warn_only {
                complexity.warn_only()
            } else {
                complexity
            };
            chain.push(Arc::new(complexity));
        }
        if let Some(registry) = data_loader_registry {
            chain.push(Arc::new(
                DataLoaderDispatcherInstrumentation::new(registry)
                    .with_level_tracking(configuration.batching.enabled),
            ));
        }
        chain.extend(instrumentations);

        Self {
            schema,
            resolvers: Arc::new(resolvers.unwrap_or_default()),
            instrumentation: Arc::new(ChainedInstrumentation::new(chain)),
            configuration: Arc::new(configuration),
            execution_id_provider: execution_id_provider
                .unwrap_or_else(|| Arc::new(UuidExecutionIdProvider)),
            query_strategy: Arc::new(AsyncExecutionStrategy),
            mutation_strategy: Arc::new(AsyncSerialExecutionStrategy),
            subscription_strategy: SubscriptionExecutionStrategy,
        }
    }
}

impl Executor {
    pub fn schema(&self) -> &Arc<Valid<Schema>> {
        &self.schema
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    /// Executes a query or a mutation.
    ///
    /// Field errors are reported next to the data. Errors that prevent the operation
    /// from running, including subscriptions, produce a response without data.
    pub async fn execute(&self, request: Request) -> Response {
        let execution_id = self
            .execution_id_provider
            .provide(&request.query, request.operation_name.as_deref());
        let span = tracing::info_span!(
            "execution",
            execution_id = %execution_id,
            operation_name = request.operation_name.as_deref().unwrap_or_default(),
        );
        self.execute_request(execution_id, Arc::new(request))
            .instrument(span)
            .await
    }

    /// Executes a subscription, producing one response per event of its source stream.
    ///
    /// Dropping the returned stream unsubscribes from the source stream.
    pub async fn subscribe(&self, request: Request) -> ResponseStream {
        let execution_id = self
            .execution_id_provider
            .provide(&request.query, request.operation_name.as_deref());
        let span = tracing::info_span!(
            "subscription",
            execution_id = %execution_id,
            operation_name = request.operation_name.as_deref().unwrap_or_default(),
        );
        self.subscribe_request(execution_id, Arc::new(request))
            .instrument(span)
            .await
    }

    /// Parses and validates a document against the schema of this executor.
    pub fn parse_and_validate(&self, query: &str) -> ParseAndValidateResult {
        let document = match self.parse(query) {
            Ok(document) => document,
            Err(ExecutionError::InvalidSyntax(errors)) => {
                return ParseAndValidateResult::InvalidSyntax(errors);
            }
            Err(error) => return ParseAndValidateResult::InvalidSyntax(error.to_graphql_errors()),
        };
        match self.validate(&document) {
            Ok(document) => ParseAndValidateResult::Valid(Arc::new(document)),
            Err(error) => ParseAndValidateResult::ValidationFailed(error.to_graphql_errors()),
        }
    }

    async fn execute_request(&self, execution_id: ExecutionId, request: Arc<Request>) -> Response {
        let parameters = InstrumentationExecutionParameters {
            execution_id: &execution_id,
            schema: &self.schema,
            request: &request,
        };
        let state = self.instrumentation.create_state(&parameters);
        let execution = self
            .instrumentation
            .begin_execution(&parameters, state.as_ref());

        let response = match self.prepare(
            &execution_id,
            request.clone(),
            state.clone(),
            EntryPoint::Execute,
        ) {
            Ok(context) => self.execute_operation(context).await,
            Err(error) => {
                tracing::debug!(%error, "the operation could not be executed");
                error.to_response()
            }
        };

        let response =
            self.instrumentation
                .instrument_execution_result(response, &parameters, state.as_ref());
        match execution.on_completed(Ok(&response)) {
            Ok(()) => response,
            Err(veto) => {
                tracing::debug!(error = %veto, "instrumentation vetoed the execution");
                veto.to_response()
            }
        }
    }

    async fn execute_operation(&self, context: ExecutionContext) -> Response {
        let operation = self.instrumentation.begin_execute_operation(
            &InstrumentationExecuteOperationParameters {
                execution_context: &context,
            },
            context.instrumentation_state(),
        );
        let strategy = match context.operation().operation_type {
            OperationType::Mutation => &self.mutation_strategy,
            _ => &self.query_strategy,
        };
        let node = strategy.execute(&context, context.root_parameters()).await;
        let response = Response::builder()
            .data(node.to_data())
            .errors(node.collect_errors())
            .build();
        match operation.on_completed(Ok(&response)) {
            Ok(()) => response,
            Err(veto) => veto.to_response(),
        }
    }

    async fn subscribe_request(
        &self,
        execution_id: ExecutionId,
        request: Arc<Request>,
    ) -> ResponseStream {
        let parameters = InstrumentationExecutionParameters {
            execution_id: &execution_id,
            schema: &self.schema,
            request: &request,
        };
        let state = self.instrumentation.create_state(&parameters);
        let execution = self
            .instrumentation
            .begin_execution(&parameters, state.as_ref());

        let context = match self.prepare(
            &execution_id,
            request.clone(),
            state.clone(),
            EntryPoint::Subscribe,
        ) {
            Ok(context) => Arc::new(context),
            Err(error) => {
                tracing::debug!(%error, "the subscription could not be executed");
                let response = self.instrumentation.instrument_execution_result(
                    error.to_response(),
                    &parameters,
                    state.as_ref(),
                );
                let response = match execution.on_completed(Ok(&response)) {
                    Ok(()) => response,
                    Err(veto) => veto.to_response(),
                };
                return single(response);
            }
        };

        let operation = self.instrumentation.begin_execute_operation(
            &InstrumentationExecuteOperationParameters {
                execution_context: &context,
            },
            state.as_ref(),
        );
        let responses = self
            .subscription_strategy
            .execute(context.clone(), context.root_parameters())
            .await;

        // the execution is complete once the source stream is established
        let established = Response::default();
        let outcome = operation
            .on_completed(Ok(&established))
            .and(execution.on_completed(Ok(&established)));
        match outcome {
            Ok(()) => responses,
            Err(veto) => {
                tracing::debug!(error = %veto, "instrumentation vetoed the subscription");
                single(veto.to_response())
            }
        }
    }

    /// Runs every step before the first field fetch.
    fn prepare(
        &self,
        execution_id: &ExecutionId,
        request: Arc<Request>,
        state: Option<InstrumentationState>,
        entry_point: EntryPoint,
    ) -> Result<ExecutionContext, ExecutionError> {
        let parameters = InstrumentationExecutionParameters {
            execution_id,
            schema: &self.schema,
            request: &request,
        };
        let parse = self.instrumentation.begin_parse(&parameters, state.as_ref());
        let document = self.parse(&request.query);
        parse.on_completed(document.as_ref())?;
        let document = document?;

        let validation = self.instrumentation.begin_validation(
            &InstrumentationValidationParameters {
                execution_id,
                schema: &self.schema,
                request: &request,
            },
            state.as_ref(),
        );
        let document = self.validate(&document);
        validation.on_completed(document.as_ref())?;
        let document = Arc::new(document?);

        let operation = get_operation(&document, request.operation_name.as_deref())?.clone();
        if !entry_point.supports(operation.operation_type) {
            return Err(ExecutionError::OperationNotSupported {
                operation_type: operation_kind(operation.operation_type).to_string(),
                entry_point: entry_point.name(),
            });
        }
        let root_type = get_root_type(&self.schema, operation.operation_type)?;

        Ok(ExecutionContext {
            execution_id: execution_id.clone(),
            schema: self.schema.clone(),
            document,
            operation,
            root_type,
            variables: Arc::new(request.variables.clone()),
            request,
            resolvers: self.resolvers.clone(),
            instrumentation: self.instrumentation.clone(),
            instrumentation_state: state,
            query_strategy: self.query_strategy.clone(),
        })
    }

    fn parse(&self, query: &str) -> Result<ast::Document, ExecutionError> {
        ast::Document::parse(query, QUERY_SOURCE).map_err(|invalid| {
            ExecutionError::InvalidSyntax(compiler_errors(
                &invalid.errors,
                ErrorClassification::InvalidSyntax,
            ))
        })
    }

    fn validate(
        &self,
        document: &ast::Document,
    ) -> Result<Valid<ExecutableDocument>, ExecutionError> {
        document
            .to_executable_validate(&self.schema)
            .map_err(|invalid| {
                ExecutionError::Validation(compiler_errors(
                    &invalid.errors,
                    ErrorClassification::ValidationError,
                ))
            })
    }
}

fn compiler_errors(diagnostics: &DiagnosticList, classification: ErrorClassification) -> Vec<Error> {
    diagnostics
        .iter()
        .map(|diagnostic| Error::from_compiler_error(diagnostic.to_json(), classification))
        .collect()
}

fn single(response: Response) -> ResponseStream {
    stream::once(async move { response }).boxed()
}
