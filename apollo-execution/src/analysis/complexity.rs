use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;

use super::traverse::QueryTraverser;
use super::traverse::QueryVisitor;
use super::traverse::QueryVisitorFieldEnvironment;
use crate::error::ExecutionError;
use crate::instrumentation::Instrumentation;
use crate::instrumentation::InstrumentationContext;
use crate::instrumentation::InstrumentationState;
use crate::instrumentation::InstrumentationValidationParameters;
use crate::json_ext::Object;

/// Computes the complexity of a field from the complexity of its selection set.
pub trait FieldComplexityCalculator: Send + Sync + 'static {
    fn calculate(&self, environment: &QueryVisitorFieldEnvironment, child_complexity: u32) -> u32;
}

impl<F> FieldComplexityCalculator for F
where
    F: Fn(&QueryVisitorFieldEnvironment, u32) -> u32 + Send + Sync + 'static,
{
    fn calculate(&self, environment: &QueryVisitorFieldEnvironment, child_complexity: u32) -> u32 {
        self(environment, child_complexity)
    }
}

/// Every field costs one, plus the cost of its selection set.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultFieldComplexityCalculator;

impl FieldComplexityCalculator for DefaultFieldComplexityCalculator {
    fn calculate(&self, _environment: &QueryVisitorFieldEnvironment, child_complexity: u32) -> u32 {
        child_complexity.saturating_add(1)
    }
}

/// What is handed to the exceeded handler.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct QueryComplexityInfo {
    pub complexity: u32,
    pub max: u32,
    pub operation_name: Option<String>,
}

type ExceededHandler = Arc<dyn Fn(&QueryComplexityInfo) -> bool + Send + Sync>;

/// Rejects operations whose complexity is above a ceiling, before any field is fetched.
///
/// The complexity is computed once the document is validated. `__typename` fields
/// cost nothing, every other field costs what the calculator returns for it.
#[derive(Clone)]
pub struct MaxQueryComplexityInstrumentation {
    max: u32,
    calculator: Arc<dyn FieldComplexityCalculator>,
    exceeded: ExceededHandler,
}

impl MaxQueryComplexityInstrumentation {
    pub fn new(max: u32) -> Self {
        Self {
            max,
            calculator: Arc::new(DefaultFieldComplexityCalculator),
            exceeded: Arc::new(|_| true),
        }
    }

    pub fn with_calculator(mut self, calculator: impl FieldComplexityCalculator) -> Self {
        self.calculator = Arc::new(calculator);
        self
    }

    /// Decides what happens above the ceiling: `true` aborts the execution.
    pub fn with_exceeded_handler(
        mut self,
        handler: impl Fn(&QueryComplexityInfo) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.exceeded = Arc::new(handler);
        self
    }

    /// Logs a warning above the ceiling instead of aborting.
    pub fn warn_only(self) -> Self {
        self.with_exceeded_handler(|info| {
            tracing::warn!(
                complexity = info.complexity,
                max = info.max,
                operation_name = info.operation_name.as_deref().unwrap_or_default(),
                "maximum query complexity exceeded"
            );
            false
        })
    }

    pub fn max(&self) -> u32 {
        self.max
    }

    /// The complexity of the operation the traverser walks.
    pub fn compute_complexity(&self, traverser: &QueryTraverser<'_>) -> u32 {
        let mut visitor = ComplexityVisitor {
            calculator: self.calculator.as_ref(),
            values_by_parent: HashMap::new(),
        };
        traverser.visit_post_order(&mut visitor);
        visitor
            .values_by_parent
            .get(&None)
            .copied()
            .unwrap_or_default()
    }
}

impl fmt::Debug for MaxQueryComplexityInstrumentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MaxQueryComplexityInstrumentation")
            .field("max", &self.max)
            .finish_non_exhaustive()
    }
}

struct ComplexityVisitor<'a> {
    calculator: &'a dyn FieldComplexityCalculator,
    // Keyed by the id of the parent field, `None` for root fields.
    values_by_parent: HashMap<Option<usize>, u32>,
}

impl QueryVisitor for ComplexityVisitor<'_> {
    fn visit_field(&mut self, environment: &Arc<QueryVisitorFieldEnvironment>) {
        let child_complexity = self
            .values_by_parent
            .remove(&Some(environment.id))
            .unwrap_or_default();
        let complexity = if environment.is_typename() {
            0
        } else {
            self.calculator.calculate(environment, child_complexity)
        };
        let parent = environment.parent.as_ref().map(|parent| parent.id);
        let total = self.values_by_parent.entry(parent).or_default();
        *total = total.saturating_add(complexity);
    }
}

impl Instrumentation for MaxQueryComplexityInstrumentation {
    fn begin_validation(
        &self,
        parameters: &InstrumentationValidationParameters<'_>,
        _state: Option<&InstrumentationState>,
    ) -> Box<dyn InstrumentationContext<Valid<ExecutableDocument>>> {
        Box::new(ComplexityCheck {
            instrumentation: self.clone(),
            schema: parameters.schema.clone(),
            operation_name: parameters.request.operation_name.clone(),
            variables: parameters.request.variables.clone(),
        })
    }
}

struct ComplexityCheck {
    instrumentation: MaxQueryComplexityInstrumentation,
    schema: Arc<Valid<Schema>>,
    operation_name: Option<String>,
    variables: Object,
}

impl InstrumentationContext<Valid<ExecutableDocument>> for ComplexityCheck {
    fn on_completed(
        &self,
        result: Result<&Valid<ExecutableDocument>, &ExecutionError>,
    ) -> Result<(), ExecutionError> {
        let Ok(document) = result else {
            return Ok(());
        };
        // a missing operation is reported once the operation is selected
        let Ok(traverser) = QueryTraverser::new(
            &self.schema,
            document,
            self.operation_name.as_deref(),
            &self.variables,
        ) else {
            return Ok(());
        };
        let max = self.instrumentation.max;
        let complexity = self.instrumentation.compute_complexity(&traverser);
        tracing::debug!(complexity, max, "computed query complexity");
        if complexity <= max {
            return Ok(());
        }
        let info = QueryComplexityInfo {
            complexity,
            max,
            operation_name: self.operation_name.clone(),
        };
        if (self.instrumentation.exceeded)(&info) {
            Err(ExecutionError::MaxQueryComplexityExceeded { complexity, max })
        } else {
            Ok(())
        }
    }
}
