use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::Context;
use std::task::Poll;

use apollo_compiler::ast::Type;
use apollo_compiler::schema::ExtendedType;
use futures::future::BoxFuture;
use futures::future::join_all;
use pin_project_lite::pin_project;
use serde_json_bytes::Value;

use super::ExecutionContext;
use super::ExecutionResultNode;
use super::ExecutionStepInfo;
use super::ExecutionStrategyParameters;
use super::FieldValueInfo;
use super::MergedField;
use super::collect_fields;
use super::result_coercion::coerce_leaf_value;
use crate::error::ExecutionError;
use crate::error::FieldError;
use crate::error::NonNullableFieldWasNull;
use crate::graphql::Error;
use crate::graphql::ErrorClassification;
use crate::graphql::Location;
use crate::instrumentation::ExecutionStrategyInstrumentationContext;
use crate::instrumentation::InstrumentationExecutionStrategyParameters;
use crate::instrumentation::InstrumentationFieldParameters;
use crate::json_ext::ValueExt;
use crate::path::ResultPath;
use crate::resolver::ResolverContext;
use crate::resolver::default_resolve;
use crate::spec::TYPENAME;
use crate::spec::coerce_argument_values;
use crate::spec::is_abstract;

/// Executes the fields of a selection set.
pub trait ExecutionStrategy: Send + Sync + 'static {
    /// Resolves and completes every field of `parameters`, returning the object node
    /// described by `parameters.parent_info`.
    fn execute<'a>(
        &'a self,
        context: &'a ExecutionContext,
        parameters: ExecutionStrategyParameters,
    ) -> BoxFuture<'a, ExecutionResultNode>;
}

/// A value whose shape is known, and whose node completes once its children do.
pub(crate) struct CompletedValue<'a> {
    pub(crate) info: FieldValueInfo,
    pub(crate) node: BoxFuture<'a, ExecutionResultNode>,
}

impl<'a> CompletedValue<'a> {
    fn ready(info: FieldValueInfo, node: ExecutionResultNode) -> Self {
        Self {
            info,
            node: Box::pin(futures::future::ready(node)),
        }
    }
}

/// The outcome of a resolver, before completion.
pub(crate) struct FetchedValue {
    pub(crate) value: Value,
    pub(crate) errors: Vec<Error>,
}

pin_project! {
    /// Reports the fetch as dispatched once the resolver has been polled.
    ///
    /// Resolvers queue their batch loads when first polled, so from that point a
    /// dispatch can serve them.
    struct Dispatched<F, D> {
        #[pin]
        inner: F,
        on_dispatched: Option<D>,
    }
}

impl<F: Future, D: FnOnce()> Future for Dispatched<F, D> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let poll = this.inner.poll(cx);
        if let Some(on_dispatched) = this.on_dispatched.take() {
            on_dispatched();
        }
        poll
    }
}

pub(crate) fn begin_strategy(
    context: &ExecutionContext,
    parameters: &ExecutionStrategyParameters,
) -> Box<dyn ExecutionStrategyInstrumentationContext> {
    context.instrumentation.begin_execution_strategy(
        &InstrumentationExecutionStrategyParameters {
            execution_context: context,
            parameters,
        },
        context.instrumentation_state.as_ref(),
    )
}

/// Builds the object node of a strategy call and reports it to the instrumentation.
pub(crate) fn complete_strategy(
    context: &ExecutionContext,
    parameters: &ExecutionStrategyParameters,
    strategy_context: &dyn ExecutionStrategyInstrumentationContext,
    children: Vec<ExecutionResultNode>,
) -> ExecutionResultNode {
    let node = ExecutionResultNode::object(
        parameters.parent_info.clone(),
        parameters.source.clone(),
        children,
        Vec::new(),
    );
    match strategy_context.on_completed(Ok(&node)) {
        Ok(()) => node,
        Err(error) => {
            let error = field_error(
                context,
                parameters.current_field.as_ref(),
                &parameters.path,
                FieldError::from(error),
            );
            ExecutionResultNode::leaf(parameters.parent_info.clone(), Value::Null, vec![error])
        }
    }
}

/// Fetches a field then completes its value.
///
/// The returned future resolves as soon as the shape of the value is known, the
/// children of the value complete through [`CompletedValue::node`].
pub(crate) fn resolve_field_with_info<'a>(
    context: &'a ExecutionContext,
    parameters: ExecutionStrategyParameters,
    field: MergedField,
) -> BoxFuture<'a, CompletedValue<'a>> {
    Box::pin(async move {
        let fetched = fetch_field(context, &parameters, &field).await;
        complete_field(context, &parameters, field, fetched)
    })
}

async fn fetch_field(
    context: &ExecutionContext,
    parameters: &ExecutionStrategyParameters,
    field: &MergedField,
) -> FetchedValue {
    let ast_field = field.single_field();
    let fetch_context = context.instrumentation.begin_field_fetch(
        &InstrumentationFieldParameters {
            execution_context: context,
            parameters,
            field,
        },
        context.instrumentation_state.as_ref(),
    );
    let resolver_context = resolver_context(context, parameters, field);
    tracing::trace!(path = %parameters.path, "fetching field");

    let resolve = async {
        if ast_field.name.as_str() == TYPENAME {
            return Ok(Value::from(parameters.object_type.as_str()));
        }
        match context
            .resolvers
            .resolver(&parameters.object_type, &ast_field.name)
        {
            Some(resolver) => resolver.resolve(resolver_context).await,
            None => Ok(default_resolve(&resolver_context)),
        }
    };
    let resolved = Dispatched {
        inner: resolve,
        on_dispatched: Some(|| fetch_context.on_dispatched()),
    }
    .await;

    let resolved = match fetch_context.on_completed(resolved.as_ref()) {
        Ok(()) => resolved,
        Err(veto) => Err(FieldError::from(veto)),
    };
    match resolved {
        Ok(value) => FetchedValue {
            value,
            errors: Vec::new(),
        },
        Err(error) => {
            tracing::debug!(path = %parameters.path, %error, "field resolver failed");
            FetchedValue {
                value: Value::Null,
                errors: vec![field_error(
                    context,
                    Some(field),
                    &parameters.path,
                    error,
                )],
            }
        }
    }
}

pub(crate) fn resolver_context(
    context: &ExecutionContext,
    parameters: &ExecutionStrategyParameters,
    field: &MergedField,
) -> ResolverContext {
    let ast_field = field.single_field();
    ResolverContext {
        source: parameters.source.clone(),
        arguments: coerce_argument_values(
            &ast_field.definition.arguments,
            &ast_field.arguments,
            &context.variables,
        ),
        field_name: ast_field.name.clone(),
        parent_type: parameters.object_type.clone(),
        path: parameters.path.clone(),
        variables: context.variables.clone(),
        execution_id: context.execution_id.clone(),
    }
}

/// Completes the fetched value of a field against the field type.
pub(crate) fn complete_field<'a>(
    context: &'a ExecutionContext,
    parameters: &ExecutionStrategyParameters,
    field: MergedField,
    fetched: FetchedValue,
) -> CompletedValue<'a> {
    let step_info = Arc::new(ExecutionStepInfo {
        ty: field.single_field().definition.ty.clone(),
        path: parameters.path.clone(),
        parent_type: parameters.object_type.clone(),
        field: Some(field.clone()),
    });
    complete_value(context, field, step_info, fetched.value, fetched.errors)
}

/// <https://spec.graphql.org/October2021/#CompleteValue()>
fn complete_value<'a>(
    context: &'a ExecutionContext,
    field: MergedField,
    step_info: Arc<ExecutionStepInfo>,
    value: Value,
    mut errors: Vec<Error>,
) -> CompletedValue<'a> {
    if value.is_null() {
        // a fetch error already explains the null
        if step_info.ty.is_non_null() && errors.is_empty() {
            errors.push(non_null_error(context, &field, &step_info));
        }
        return CompletedValue::ready(
            FieldValueInfo::Null,
            ExecutionResultNode::leaf(step_info, Value::Null, errors),
        );
    }

    let type_name = match &step_info.ty {
        Type::List(item_type) | Type::NonNullList(item_type) => {
            let item_type = item_type.as_ref().clone();
            return complete_list(context, field, step_info, &item_type, value, errors);
        }
        Type::Named(name) | Type::NonNullNamed(name) => name.clone(),
    };
    match context.schema.types.get(&type_name) {
        Some(definition @ (ExtendedType::Scalar(_) | ExtendedType::Enum(_))) => {
            match coerce_leaf_value(definition, value) {
                Ok(value) => CompletedValue::ready(
                    FieldValueInfo::Leaf,
                    ExecutionResultNode::leaf(step_info, value, errors),
                ),
                Err(message) => {
                    completion_failure(context, &field, step_info, errors, FieldError::new(message))
                }
            }
        }
        Some(ExtendedType::Object(_) | ExtendedType::Interface(_) | ExtendedType::Union(_)) => {
            complete_object(context, field, step_info, &type_name, value, errors)
        }
        Some(ExtendedType::InputObject(_)) | None => completion_failure(
            context,
            &field,
            step_info,
            errors,
            FieldError::new(format!("Field with unexpected output type {type_name}")),
        ),
    }
}

fn complete_list<'a>(
    context: &'a ExecutionContext,
    field: MergedField,
    step_info: Arc<ExecutionStepInfo>,
    item_type: &Type,
    value: Value,
    errors: Vec<Error>,
) -> CompletedValue<'a> {
    let Value::Array(items) = &value else {
        let message = format!(
            "Expected an array for list type {} but resolver returned {}",
            step_info.ty,
            value.kind_name()
        );
        return completion_failure(context, &field, step_info, errors, FieldError::new(message));
    };

    let mut infos = Vec::with_capacity(items.len());
    let mut nodes = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let item_info = Arc::new(step_info.for_list_item(index, item_type));
        let completed = complete_value(context, field.clone(), item_info, item.clone(), Vec::new());
        infos.push(completed.info);
        nodes.push(completed.node);
    }
    CompletedValue {
        info: FieldValueInfo::List(infos),
        node: Box::pin(async move {
            let children = join_all(nodes).await;
            ExecutionResultNode::list(step_info, value, children, errors)
        }),
    }
}

fn complete_object<'a>(
    context: &'a ExecutionContext,
    field: MergedField,
    step_info: Arc<ExecutionStepInfo>,
    type_name: &apollo_compiler::Name,
    value: Value,
    errors: Vec<Error>,
) -> CompletedValue<'a> {
    if !value.is_object() {
        let message = format!(
            "Resolver returned {value}, expected an object for type {type_name}"
        );
        return completion_failure(context, &field, step_info, errors, FieldError::new(message));
    }
    let object_type = if is_abstract(&context.schema, type_name) {
        let resolved = context
            .resolvers
            .resolve_type(&value, type_name)
            .and_then(|name| context.schema.get_object(&name))
            .map(|object| object.name.clone())
            .filter(|object| context.schema.is_subtype(type_name, object));
        match resolved {
            Some(object_type) => object_type,
            None => {
                let message =
                    format!("Could not determine the object type of a value of type {type_name}");
                return completion_failure(
                    context,
                    &field,
                    step_info,
                    errors,
                    FieldError::new(message),
                );
            }
        }
    } else {
        type_name.clone()
    };

    let fields = collect_fields(
        context,
        &object_type,
        field.fields().iter().map(|field| &field.selection_set),
    );
    let parameters = ExecutionStrategyParameters {
        source: value,
        fields,
        path: step_info.path.clone(),
        parent_info: step_info,
        object_type,
        current_field: Some(field),
    };
    CompletedValue {
        info: FieldValueInfo::Object,
        node: Box::pin(async move {
            let node = context.query_strategy.execute(context, parameters).await;
            if errors.is_empty() {
                node
            } else {
                let mut all_errors = errors;
                all_errors.extend(node.errors().iter().cloned());
                node.with_new_errors(all_errors)
            }
        }),
    }
}

/// Completes a position as null with a field error.
fn completion_failure<'a>(
    context: &'a ExecutionContext,
    field: &MergedField,
    step_info: Arc<ExecutionStepInfo>,
    mut errors: Vec<Error>,
    error: FieldError,
) -> CompletedValue<'a> {
    tracing::debug!(path = %step_info.path, %error, "value completion failed");
    errors.push(field_error(context, Some(field), &step_info.path, error));
    CompletedValue::ready(
        FieldValueInfo::Null,
        ExecutionResultNode::leaf(step_info, Value::Null, errors),
    )
}

pub(crate) fn field_error(
    context: &ExecutionContext,
    field: Option<&MergedField>,
    path: &ResultPath,
    error: FieldError,
) -> Error {
    let location = field.and_then(|field| {
        Location::from_span(field.single_field().location(), &context.document.sources)
    });
    Error::builder()
        .message(error.message)
        .locations(location.into_iter().collect::<Vec<_>>())
        .path(path.clone())
        .extensions(error.extensions)
        .classification(ErrorClassification::DataFetchingException)
        .build()
}

fn non_null_error(
    context: &ExecutionContext,
    field: &MergedField,
    step_info: &ExecutionStepInfo,
) -> Error {
    let violation = NonNullableFieldWasNull {
        type_name: step_info.ty.to_string(),
        parent_type: step_info.parent_type.to_string(),
        path: step_info.path.clone(),
    };
    let location =
        Location::from_span(field.single_field().location(), &context.document.sources);
    Error::builder()
        .message(violation.to_string())
        .locations(location.into_iter().collect::<Vec<_>>())
        .path(step_info.path.clone())
        .classification(ErrorClassification::NullValueInNonNullableField)
        .build()
}

/// Turns an instrumentation veto into the error of a whole response.
pub(crate) fn veto_response(error: &ExecutionError) -> crate::graphql::Response {
    tracing::debug!(%error, "instrumentation vetoed the execution");
    error.to_response()
}
