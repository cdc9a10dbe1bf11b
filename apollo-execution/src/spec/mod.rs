//! Schema and document helpers shared by field collection, normalization and analysis.

mod arguments;
mod directives;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::schema::ExtendedType;
pub(crate) use arguments::coerce_argument_values;
pub(crate) use directives::should_include;

pub(crate) const TYPENAME: &str = "__typename";

/// Whether `name` is an interface or a union.
pub(crate) fn is_abstract(schema: &Schema, name: &str) -> bool {
    matches!(
        schema.types.get(name),
        Some(ExtendedType::Interface(_)) | Some(ExtendedType::Union(_))
    )
}

/// The object types a value of type `name` may have at runtime, in schema order.
pub(crate) fn possible_types(schema: &Schema, name: &Name) -> Vec<Name> {
    match schema.types.get(name) {
        Some(ExtendedType::Object(_)) => vec![name.clone()],
        Some(ExtendedType::Interface(_)) | Some(ExtendedType::Union(_)) => schema
            .types
            .iter()
            .filter(|(object, ty)| ty.is_object() && schema.is_subtype(name, object))
            .map(|(object, _)| object.clone())
            .collect(),
        _ => Vec::new(),
    }
}

/// Whether selections under a type condition apply to an object of type `object_type`.
///
/// A missing condition always applies.
pub(crate) fn does_type_condition_apply(
    schema: &Schema,
    condition: Option<&Name>,
    object_type: &str,
) -> bool {
    match condition {
        None => true,
        Some(condition) => {
            condition.as_str() == object_type || schema.is_subtype(condition, object_type)
        }
    }
}
