use futures::future::BoxFuture;
use futures::future::join_all;
use tracing::Instrument;

use super::ExecutionContext;
use super::ExecutionResultNode;
use super::ExecutionStrategy;
use super::ExecutionStrategyParameters;
use super::strategy::begin_strategy;
use super::strategy::complete_strategy;
use super::strategy::resolve_field_with_info;

/// Resolves the fields of a selection set concurrently.
///
/// Every field is fetched before any child selection set starts, and the
/// instrumentation is told the shape of every value in between. Queries and nested
/// selection sets run with this strategy.
#[derive(Clone, Copy, Debug, Default)]
pub struct AsyncExecutionStrategy;

impl ExecutionStrategy for AsyncExecutionStrategy {
    fn execute<'a>(
        &'a self,
        context: &'a ExecutionContext,
        parameters: ExecutionStrategyParameters,
    ) -> BoxFuture<'a, ExecutionResultNode> {
        let span = tracing::trace_span!("execute_fields", path = %parameters.path);
        Box::pin(
            async move {
                let strategy_context = begin_strategy(context, &parameters);
                let fields = parameters.fields.iter().map(|(key, field)| {
                    resolve_field_with_info(
                        context,
                        parameters.for_field(key, field),
                        field.clone(),
                    )
                });
                let (infos, nodes): (Vec<_>, Vec<_>) = join_all(fields)
                    .await
                    .into_iter()
                    .map(|completed| (completed.info, completed.node))
                    .unzip();
                strategy_context.on_field_values_info(&infos);

                let children = join_all(nodes).await;
                complete_strategy(context, &parameters, strategy_context.as_ref(), children)
            }
            .instrument(span),
        )
    }
}
