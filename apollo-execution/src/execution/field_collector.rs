use std::collections::HashSet;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;

use super::ExecutionContext;
use super::MergedField;
use super::MergedSelectionSet;
use crate::json_ext::Object;
use crate::spec::does_type_condition_apply;
use crate::spec::should_include;

/// <https://spec.graphql.org/October2021/#CollectFields()>
///
/// Merges the fields that apply to an object of type `object_type`, across every
/// selection set of a merged field.
pub(crate) fn collect_fields<'a>(
    context: &'a ExecutionContext,
    object_type: &'a Name,
    selection_sets: impl IntoIterator<Item = &'a SelectionSet>,
) -> MergedSelectionSet {
    collect_fields_in(
        &context.schema,
        &context.document,
        &context.variables,
        object_type,
        selection_sets,
    )
}

/// [`collect_fields`] outside of an execution.
pub(crate) fn collect_fields_in<'a>(
    schema: &'a Schema,
    document: &'a ExecutableDocument,
    variables: &'a Object,
    object_type: &'a Name,
    selection_sets: impl IntoIterator<Item = &'a SelectionSet>,
) -> MergedSelectionSet {
    let mut collector = FieldCollector {
        schema,
        document,
        variables,
        object_type,
        visited_fragments: HashSet::new(),
        fields: MergedSelectionSet::new(),
    };
    for selection_set in selection_sets {
        collector.collect(selection_set);
    }
    collector.fields
}

struct FieldCollector<'a> {
    schema: &'a Schema,
    document: &'a ExecutableDocument,
    variables: &'a Object,
    object_type: &'a Name,
    visited_fragments: HashSet<&'a Name>,
    fields: MergedSelectionSet,
}

impl<'a> FieldCollector<'a> {
    fn collect(&mut self, selection_set: &'a SelectionSet) {
        let schema = self.schema;
        let variables = self.variables;
        for selection in &selection_set.selections {
            match selection {
                Selection::Field(field) => {
                    if !should_include(&field.directives, variables) {
                        continue;
                    }
                    match self.fields.get_mut(field.response_key()) {
                        Some(merged) => merged.push(field.clone()),
                        None => {
                            self.fields
                                .insert(field.response_key().clone(), MergedField::new(field.clone()));
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    if !should_include(&spread.directives, variables)
                        || !self.visited_fragments.insert(&spread.fragment_name)
                    {
                        continue;
                    }
                    let Some(fragment) = self.document.fragments.get(&spread.fragment_name) else {
                        continue;
                    };
                    if does_type_condition_apply(
                        schema,
                        Some(fragment.type_condition()),
                        self.object_type,
                    ) {
                        self.collect(&fragment.selection_set);
                    }
                }
                Selection::InlineFragment(inline) => {
                    if should_include(&inline.directives, variables)
                        && does_type_condition_apply(
                            schema,
                            inline.type_condition.as_ref(),
                            self.object_type,
                        )
                    {
                        self.collect(&inline.selection_set);
                    }
                }
            }
        }
    }
}
