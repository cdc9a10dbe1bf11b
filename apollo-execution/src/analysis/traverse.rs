use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::executable;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::validation::Valid;

use crate::error::ExecutionError;
use crate::execution::get_operation;
use crate::json_ext::Object;
use crate::spec::TYPENAME;
use crate::spec::coerce_argument_values;
use crate::spec::should_include;

/// A field met while traversing an operation.
#[derive(Debug)]
#[non_exhaustive]
pub struct QueryVisitorFieldEnvironment {
    /// Unique within one traversal.
    pub id: usize,
    pub field: Node<executable::Field>,
    pub field_definition: Node<FieldDefinition>,
    /// The type of the selection set holding the field.
    pub parent_type: Name,
    /// The field arguments, coerced with the request variables.
    pub arguments: Object,
    /// The field whose selection set holds this one, `None` at the root.
    pub parent: Option<Arc<QueryVisitorFieldEnvironment>>,
}

impl QueryVisitorFieldEnvironment {
    pub fn is_typename(&self) -> bool {
        self.field.name.as_str() == TYPENAME
    }
}

/// Visits the fields of an operation.
pub trait QueryVisitor {
    fn visit_field(&mut self, environment: &Arc<QueryVisitorFieldEnvironment>);

    fn visit_fragment_spread(&mut self, _spread: &executable::FragmentSpread) {}

    fn visit_inline_fragment(&mut self, _inline: &executable::InlineFragment) {}
}

/// Walks the fields one operation selects.
///
/// Fragment spreads are walked in place, and `@skip`/`@include` are evaluated with
/// the request variables.
pub struct QueryTraverser<'a> {
    schema: &'a Valid<Schema>,
    document: &'a ExecutableDocument,
    operation: &'a Node<Operation>,
    variables: &'a Object,
}

impl<'a> QueryTraverser<'a> {
    pub fn new(
        schema: &'a Valid<Schema>,
        document: &'a ExecutableDocument,
        operation_name: Option<&str>,
        variables: &'a Object,
    ) -> Result<Self, ExecutionError> {
        Ok(Self {
            schema,
            document,
            operation: get_operation(document, operation_name)?,
            variables,
        })
    }

    pub fn operation(&self) -> &Node<Operation> {
        self.operation
    }

    /// Visits every field after all of its sub-fields.
    pub fn visit_post_order(&self, visitor: &mut impl QueryVisitor) {
        let mut next_id = 0;
        self.selection_set(visitor, &self.operation.selection_set, None, &mut next_id);
    }

    fn selection_set(
        &self,
        visitor: &mut impl QueryVisitor,
        selection_set: &SelectionSet,
        parent: Option<&Arc<QueryVisitorFieldEnvironment>>,
        next_id: &mut usize,
    ) {
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if !should_include(&field.directives, self.variables) {
                        continue;
                    }
                    let environment = Arc::new(QueryVisitorFieldEnvironment {
                        id: *next_id,
                        field: field.clone(),
                        field_definition: field.definition.clone(),
                        parent_type: selection_set.ty.clone(),
                        arguments: coerce_argument_values(
                            &field.definition.arguments,
                            &field.arguments,
                            self.variables,
                        ),
                        parent: parent.cloned(),
                    });
                    *next_id += 1;
                    self.selection_set(
                        visitor,
                        &field.selection_set,
                        Some(&environment),
                        next_id,
                    );
                    visitor.visit_field(&environment);
                }
                Selection::FragmentSpread(spread) => {
                    if !should_include(&spread.directives, self.variables) {
                        continue;
                    }
                    visitor.visit_fragment_spread(spread);
                    if let Some(fragment) = self.document.fragments.get(&spread.fragment_name) {
                        self.selection_set(visitor, &fragment.selection_set, parent, next_id);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if !should_include(&inline.directives, self.variables) {
                        continue;
                    }
                    visitor.visit_inline_fragment(inline);
                    self.selection_set(visitor, &inline.selection_set, parent, next_id);
                }
            }
        }
    }

    pub fn schema(&self) -> &Valid<Schema> {
        self.schema
    }
}
