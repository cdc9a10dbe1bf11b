use std::sync::Arc;

use futures::StreamExt;
use futures::stream;
use serde_json_bytes::Value;

use super::ExecutionContext;
use super::ExecutionResultNode;
use super::ExecutionStrategyParameters;
use super::MergedField;
use super::strategy::FetchedValue;
use super::strategy::begin_strategy;
use super::strategy::complete_field;
use super::strategy::field_error;
use super::strategy::resolver_context;
use super::strategy::veto_response;
use crate::error::FieldError;
use crate::graphql::Error;
use crate::graphql::Response;
use crate::graphql::ResponseStream;
use crate::instrumentation::InstrumentationExecutionParameters;
use crate::instrumentation::InstrumentationFieldParameters;
use crate::resolver::EventStream;

/// Maps the source stream of a subscription root field to a stream of responses.
///
/// Each event is completed as if it were the fetched value of the root field, and
/// becomes one response shaped as `{ rootKey: completedValue }`. Dropping the
/// response stream drops the source stream.
#[derive(Clone, Copy, Debug, Default)]
pub struct SubscriptionExecutionStrategy;

impl SubscriptionExecutionStrategy {
    pub(crate) async fn execute(
        &self,
        context: Arc<ExecutionContext>,
        parameters: ExecutionStrategyParameters,
    ) -> ResponseStream {
        let strategy_context = begin_strategy(&context, &parameters);
        let Some((key, field)) = parameters.fields.first() else {
            return single(Response::default());
        };
        let field_parameters = parameters.for_field(key, field);
        let field = field.clone();

        let source = create_source_event_stream(&context, &field_parameters, &field).await;
        let (events, node) = match source {
            Ok(events) => (
                Some(events),
                ExecutionResultNode::object(
                    parameters.parent_info.clone(),
                    parameters.source.clone(),
                    Vec::new(),
                    Vec::new(),
                ),
            ),
            Err(error) => (
                None,
                ExecutionResultNode::object(
                    parameters.parent_info.clone(),
                    parameters.source.clone(),
                    Vec::new(),
                    vec![error],
                ),
            ),
        };
        if let Err(error) = strategy_context.on_completed(Ok(&node)) {
            return single(veto_response(&error));
        }
        let Some(events) = events else {
            return single(Response::from_errors(node.collect_errors()));
        };

        events
            .then(move |event| {
                let context = context.clone();
                let parameters = field_parameters.clone();
                let field = field.clone();
                async move { execute_subscription_event(&context, &parameters, field, event).await }
            })
            .boxed()
    }
}

fn single(response: Response) -> ResponseStream {
    stream::once(async move { response }).boxed()
}

/// Subscribes to the source stream of the root field.
async fn create_source_event_stream(
    context: &ExecutionContext,
    parameters: &ExecutionStrategyParameters,
    field: &MergedField,
) -> Result<EventStream, Error> {
    let fetch_context = context.instrumentation.begin_field_fetch(
        &InstrumentationFieldParameters {
            execution_context: context,
            parameters,
            field,
        },
        context.instrumentation_state.as_ref(),
    );
    let resolver = context
        .resolvers
        .subscription_resolver(&parameters.object_type, field.name());
    fetch_context.on_dispatched();
    let subscribed = match resolver {
        Some(resolver) => {
            resolver
                .subscribe(resolver_context(context, parameters, field))
                .await
        }
        None => Err(FieldError::new(format!(
            "no subscription resolver for {}.{}",
            parameters.object_type,
            field.name()
        ))),
    };
    // the stream itself is not a field value
    let no_value = Value::Null;
    let subscribed = match fetch_context.on_completed(subscribed.as_ref().map(|_| &no_value)) {
        Ok(()) => subscribed,
        Err(veto) => Err(FieldError::from(veto)),
    };
    subscribed.map_err(|error| {
        tracing::debug!(%error, "subscription failed");
        field_error(context, Some(field), &parameters.path, error)
    })
}

async fn execute_subscription_event(
    context: &ExecutionContext,
    parameters: &ExecutionStrategyParameters,
    field: MergedField,
    event: Result<Value, FieldError>,
) -> Response {
    let state = context.instrumentation_state.as_ref();
    let event_context = context.instrumentation.begin_subscribed_field_event(
        &InstrumentationFieldParameters {
            execution_context: context,
            parameters,
            field: &field,
        },
        state,
    );
    let fetched = match event {
        Ok(value) => FetchedValue {
            value,
            errors: Vec::new(),
        },
        Err(error) => FetchedValue {
            value: Value::Null,
            errors: vec![field_error(context, Some(&field), &parameters.path, error)],
        },
    };
    let completed = complete_field(context, parameters, field, fetched);
    event_context.on_field_values_info(std::slice::from_ref(&completed.info));
    let node = completed.node.await;

    let root = ExecutionResultNode::object(
        parameters.parent_info.clone(),
        context.root_value().clone(),
        vec![node],
        Vec::new(),
    );
    if let Err(error) = event_context.on_completed(Ok(&root)) {
        return veto_response(&error);
    }
    let response = Response::builder()
        .data(root.to_data())
        .errors(root.collect_errors())
        .build();
    context.instrumentation.instrument_execution_result(
        response,
        &InstrumentationExecutionParameters {
            execution_id: &context.execution_id,
            schema: &context.schema,
            request: &context.request,
        },
        state,
    )
}
