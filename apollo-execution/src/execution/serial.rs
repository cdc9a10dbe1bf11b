use futures::future::BoxFuture;

use super::ExecutionContext;
use super::ExecutionResultNode;
use super::ExecutionStrategy;
use super::ExecutionStrategyParameters;
use super::strategy::begin_strategy;
use super::strategy::complete_strategy;
use super::strategy::resolve_field_with_info;

/// Resolves the fields of a selection set one after the other.
///
/// A field, including its whole subtree, completes before the next one is fetched.
/// Used for the root fields of mutations.
#[derive(Clone, Copy, Debug, Default)]
pub struct AsyncSerialExecutionStrategy;

impl ExecutionStrategy for AsyncSerialExecutionStrategy {
    fn execute<'a>(
        &'a self,
        context: &'a ExecutionContext,
        parameters: ExecutionStrategyParameters,
    ) -> BoxFuture<'a, ExecutionResultNode> {
        Box::pin(async move {
            let strategy_context = begin_strategy(context, &parameters);
            let mut infos = Vec::with_capacity(parameters.fields.len());
            let mut children = Vec::with_capacity(parameters.fields.len());
            for (key, field) in &parameters.fields {
                tracing::trace!(field = %key, "executing serial field");
                let completed =
                    resolve_field_with_info(context, parameters.for_field(key, field), field.clone())
                        .await;
                infos.push(completed.info);
                children.push(completed.node.await);
            }
            strategy_context.on_field_values_info(&infos);
            complete_strategy(context, &parameters, strategy_context.as_ref(), children)
        })
    }
}
