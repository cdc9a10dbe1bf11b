use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::validation::Valid;

use super::FieldId;
use super::NormalizedField;
use super::NormalizedQueryTree;
use crate::error::ExecutionError;
use crate::execution::MergedField;
use crate::execution::collect_fields_in;
use crate::execution::get_operation;
use crate::execution::get_root_type;
use crate::json_ext::Object;
use crate::spec::coerce_argument_values;
use crate::spec::possible_types;

/// Builds [`NormalizedQueryTree`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct NormalizedQueryTreeFactory;

impl NormalizedQueryTreeFactory {
    /// Normalizes the operation named `operation_name`, or the only operation of the
    /// document.
    pub fn create(
        schema: &Valid<Schema>,
        document: &Valid<ExecutableDocument>,
        operation_name: Option<&str>,
        variables: &Object,
    ) -> Result<NormalizedQueryTree, ExecutionError> {
        let operation = get_operation(document, operation_name)?;
        let root_type = get_root_type(schema, operation.operation_type)?;

        let mut builder = TreeBuilder {
            schema,
            document,
            variables,
            tree: NormalizedQueryTree::default(),
        };
        let top_level = builder.normalize(&[root_type], &[&operation.selection_set], 1);
        builder.tree.top_level = top_level;
        tracing::trace!(fields = builder.tree.len(), "normalized operation");
        Ok(builder.tree)
    }
}

struct TreeBuilder<'a> {
    schema: &'a Schema,
    document: &'a ExecutableDocument,
    variables: &'a Object,
    tree: NormalizedQueryTree,
}

impl TreeBuilder<'_> {
    /// Normalizes the fields the selection sets select on each of `object_types`.
    fn normalize(
        &mut self,
        object_types: &[Name],
        selection_sets: &[&SelectionSet],
        level: usize,
    ) -> Vec<FieldId> {
        let mut ids = Vec::new();
        for object_type in object_types {
            let fields = collect_fields_in(
                self.schema,
                self.document,
                self.variables,
                object_type,
                selection_sets.iter().copied(),
            );
            for (result_key, merged) in fields {
                ids.push(self.normalize_field(object_type, result_key, merged, level));
            }
        }
        ids
    }

    fn normalize_field(
        &mut self,
        object_type: &Name,
        result_key: Name,
        merged: MergedField,
        level: usize,
    ) -> FieldId {
        let first = merged.single_field();
        let field_definition = self
            .schema
            .type_field(object_type, &first.name)
            .map(|definition| definition.node.clone())
            .unwrap_or_else(|_| first.definition.clone());
        let arguments =
            coerce_argument_values(&field_definition.arguments, &first.arguments, self.variables);

        let child_types = possible_types(self.schema, field_definition.ty.inner_named_type());
        let selection_sets: Vec<&SelectionSet> = merged
            .fields()
            .iter()
            .map(|field| &field.selection_set)
            .collect();
        let children = self.normalize(&child_types, &selection_sets, level + 1);

        let field = NormalizedField {
            object_type: object_type.clone(),
            name: first.name.clone(),
            field_definition,
            result_key,
            arguments,
            level,
            parent: None,
            children,
        };
        let id = self.tree.push(field, merged);
        self.tree.attach(id);
        id
    }
}
