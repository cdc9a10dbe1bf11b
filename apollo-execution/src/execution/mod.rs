//! Execution of an operation against resolvers.
//!
//! Strategies walk merged selection sets top-down. Each field is fetched through its
//! resolver, then completed against its type, which recursively executes the
//! selection set of object values.

mod field_collector;
mod parallel;
mod result;
mod result_coercion;
mod serial;
mod strategy;
mod subscription;

use std::fmt;
use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::Type;
use apollo_compiler::executable;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::OperationType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
pub use parallel::AsyncExecutionStrategy;
pub use result::ExecutionResultNode;
pub use serial::AsyncSerialExecutionStrategy;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::Value;
pub use strategy::ExecutionStrategy;
pub use subscription::SubscriptionExecutionStrategy;

pub(crate) use self::field_collector::collect_fields;
pub(crate) use self::field_collector::collect_fields_in;
use crate::error::ExecutionError;
use crate::graphql::Request;
use crate::instrumentation::Instrumentation;
use crate::instrumentation::InstrumentationState;
use crate::json_ext::Object;
use crate::path::ResultPath;
use crate::resolver::Resolvers;

/// Identifies one execution in logs, resolvers and instrumentation.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(Arc<str>);

impl ExecutionId {
    /// A new random id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string().into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutionId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

impl From<String> for ExecutionId {
    fn from(id: String) -> Self {
        Self(id.into())
    }
}

/// Provides the id of each new execution.
pub trait ExecutionIdProvider: Send + Sync + 'static {
    fn provide(&self, query: &str, operation_name: Option<&str>) -> ExecutionId;
}

/// Provides random UUIDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidExecutionIdProvider;

impl ExecutionIdProvider for UuidExecutionIdProvider {
    fn provide(&self, _query: &str, _operation_name: Option<&str>) -> ExecutionId {
        ExecutionId::generate()
    }
}

/// The AST fields selected under one response key.
///
/// Validation guarantees they share a field name, arguments and definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergedField {
    fields: Vec<Node<executable::Field>>,
}

impl MergedField {
    pub(crate) fn new(field: Node<executable::Field>) -> Self {
        Self {
            fields: vec![field],
        }
    }

    pub(crate) fn push(&mut self, field: Node<executable::Field>) {
        self.fields.push(field);
    }

    /// The first field, which stands for all of them.
    pub fn single_field(&self) -> &Node<executable::Field> {
        // a merged field is never empty
        &self.fields[0]
    }

    pub fn fields(&self) -> &[Node<executable::Field>] {
        &self.fields
    }

    pub fn name(&self) -> &Name {
        &self.single_field().name
    }

    pub fn result_key(&self) -> &Name {
        self.single_field().response_key()
    }
}

/// Fields keyed by response key, in the order they were first selected.
pub type MergedSelectionSet = IndexMap<Name, MergedField>;

/// What is known about a position of the result while completing it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct ExecutionStepInfo {
    /// The type declared for this position, including list and non-null wrappers.
    pub ty: Type,
    pub path: ResultPath,
    /// The object type owning the field.
    pub parent_type: Name,
    /// The selected field, `None` for the operation root.
    pub field: Option<MergedField>,
}

impl ExecutionStepInfo {
    /// The info of the operation root, which is never null.
    pub(crate) fn root(root_type: Name) -> Self {
        Self {
            ty: Type::NonNullNamed(root_type.clone()),
            path: ResultPath::root(),
            parent_type: root_type,
            field: None,
        }
    }

    pub(crate) fn for_list_item(&self, index: usize, item_type: &Type) -> Self {
        Self {
            ty: item_type.clone(),
            path: self.path.segment(index),
            parent_type: self.parent_type.clone(),
            field: self.field.clone(),
        }
    }
}

/// The shape of a completed value, known before its children complete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValueInfo {
    Null,
    /// A scalar or an enum.
    Leaf,
    Object,
    List(Vec<FieldValueInfo>),
}

impl FieldValueInfo {
    /// How many selection sets completing this value will execute.
    pub fn object_count(&self) -> usize {
        match self {
            FieldValueInfo::Object => 1,
            FieldValueInfo::List(items) => items.iter().map(FieldValueInfo::object_count).sum(),
            FieldValueInfo::Null | FieldValueInfo::Leaf => 0,
        }
    }
}

/// The state of one execution, shared by every strategy call.
pub struct ExecutionContext {
    pub(crate) execution_id: ExecutionId,
    pub(crate) schema: Arc<Valid<Schema>>,
    pub(crate) document: Arc<Valid<ExecutableDocument>>,
    pub(crate) operation: Node<Operation>,
    pub(crate) root_type: Name,
    pub(crate) request: Arc<Request>,
    pub(crate) variables: Arc<Object>,
    pub(crate) resolvers: Arc<Resolvers>,
    pub(crate) instrumentation: Arc<dyn Instrumentation>,
    pub(crate) instrumentation_state: Option<InstrumentationState>,
    pub(crate) query_strategy: Arc<dyn ExecutionStrategy>,
}

impl ExecutionContext {
    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    pub fn document(&self) -> &Valid<ExecutableDocument> {
        &self.document
    }

    pub fn operation(&self) -> &Node<Operation> {
        &self.operation
    }

    pub fn root_type(&self) -> &Name {
        &self.root_type
    }

    pub fn variables(&self) -> &Object {
        &self.variables
    }

    pub fn root_value(&self) -> &Value {
        &self.request.root_value
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn instrumentation_state(&self) -> Option<&InstrumentationState> {
        self.instrumentation_state.as_ref()
    }

    /// The parameters of the root selection set.
    pub(crate) fn root_parameters(&self) -> ExecutionStrategyParameters {
        let fields = collect_fields(
            self,
            &self.root_type,
            std::iter::once(&self.operation.selection_set),
        );
        ExecutionStrategyParameters {
            source: self.request.root_value.clone(),
            fields,
            path: ResultPath::root(),
            parent_info: Arc::new(ExecutionStepInfo::root(self.root_type.clone())),
            object_type: self.root_type.clone(),
            current_field: None,
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("operation", &self.operation.name)
            .field("root_type", &self.root_type)
            .finish_non_exhaustive()
    }
}

/// The input of one strategy call.
///
/// Never mutated once handed to a strategy: derive new parameters with
/// [`transform`](Self::transform).
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct ExecutionStrategyParameters {
    /// The value the fields are resolved on.
    pub source: Value,
    pub fields: MergedSelectionSet,
    pub path: ResultPath,
    /// The info of the object owning `fields`.
    pub parent_info: Arc<ExecutionStepInfo>,
    /// The concrete object type of `source`.
    pub object_type: Name,
    /// The field being resolved, once a strategy descends into one.
    pub current_field: Option<MergedField>,
}

impl ExecutionStrategyParameters {
    /// A copy of these parameters with some values overridden.
    pub fn transform(&self, f: impl FnOnce(&mut Self)) -> Self {
        let mut parameters = self.clone();
        f(&mut parameters);
        parameters
    }

    pub(crate) fn for_field(&self, key: &Name, field: &MergedField) -> Self {
        self.transform(|parameters| {
            parameters.path = self.path.segment(key);
            parameters.current_field = Some(field.clone());
        })
    }
}

/// Selects the operation to execute.
pub(crate) fn get_operation<'a>(
    document: &'a ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<&'a Node<Operation>, ExecutionError> {
    let operations = &document.operations;
    match operation_name {
        Some(name) => operations
            .named
            .get(name)
            .ok_or_else(|| ExecutionError::UnknownOperation(name.to_string())),
        None => match (&operations.anonymous, operations.named.len()) {
            (Some(operation), 0) => Ok(operation),
            (None, 1) => operations
                .named
                .values()
                .next()
                .ok_or(ExecutionError::OperationNameRequired),
            _ => Err(ExecutionError::OperationNameRequired),
        },
    }
}

/// The object type an operation of type `operation_type` starts from.
pub(crate) fn get_root_type(
    schema: &Schema,
    operation_type: OperationType,
) -> Result<Name, ExecutionError> {
    schema
        .root_operation(operation_type)
        .cloned()
        .ok_or_else(|| ExecutionError::MissingRootType(operation_kind(operation_type).to_string()))
}

pub(crate) fn operation_kind(operation_type: OperationType) -> &'static str {
    match operation_type {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    }
}
