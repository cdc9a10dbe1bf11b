//! Operations with their field selections merged into one canonical tree.
//!
//! Fields selecting the same response key on the same object type are merged, and
//! selections on interfaces and unions are expanded into one field per possible
//! object type. See [`NormalizedQueryTreeFactory`].

mod factory;

use std::collections::HashMap;
use std::fmt;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable;
use apollo_compiler::schema::FieldDefinition;
pub use factory::NormalizedQueryTreeFactory;

use crate::execution::MergedField;
use crate::json_ext::Object;
use crate::spec::TYPENAME;

/// Addresses a field of a [`NormalizedQueryTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(usize);

/// A field of an object type, as in `Book.title`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldCoordinates {
    pub type_name: Name,
    pub field_name: Name,
}

impl FieldCoordinates {
    pub fn new(type_name: Name, field_name: Name) -> Self {
        Self {
            type_name,
            field_name,
        }
    }
}

impl fmt::Display for FieldCoordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// A field selected on exactly one object type.
#[derive(Clone, Debug)]
pub struct NormalizedField {
    object_type: Name,
    field_definition: Node<FieldDefinition>,
    result_key: Name,
    name: Name,
    arguments: Object,
    level: usize,
    parent: Option<FieldId>,
    children: Vec<FieldId>,
}

impl NormalizedField {
    pub fn object_type(&self) -> &Name {
        &self.object_type
    }

    pub fn field_definition(&self) -> &Node<FieldDefinition> {
        &self.field_definition
    }

    pub fn result_key(&self) -> &Name {
        &self.result_key
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    /// The arguments, coerced with the variables the tree was created with.
    pub fn arguments(&self) -> &Object {
        &self.arguments
    }

    /// 1 for the root fields of the operation.
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn parent(&self) -> Option<FieldId> {
        self.parent
    }

    pub fn children(&self) -> &[FieldId] {
        &self.children
    }

    pub fn coordinates(&self) -> FieldCoordinates {
        FieldCoordinates::new(self.object_type.clone(), self.name.clone())
    }

    pub fn is_introspection_field(&self) -> bool {
        self.name.starts_with("__")
    }

    pub fn is_typename(&self) -> bool {
        self.name.as_str() == TYPENAME
    }
}

// AST fields are identified by the address of their node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct AstFieldKey(usize);

impl AstFieldKey {
    fn of(field: &Node<executable::Field>) -> Self {
        Self(&**field as *const executable::Field as usize)
    }
}

/// The normalized fields of one operation.
#[derive(Clone, Debug, Default)]
pub struct NormalizedQueryTree {
    fields: Vec<NormalizedField>,
    merged_fields: Vec<MergedField>,
    top_level: Vec<FieldId>,
    by_ast_field: HashMap<AstFieldKey, Vec<FieldId>>,
    by_coordinates: HashMap<FieldCoordinates, Vec<FieldId>>,
}

impl NormalizedQueryTree {
    pub fn top_level_fields(&self) -> &[FieldId] {
        &self.top_level
    }

    pub fn get(&self, id: FieldId) -> &NormalizedField {
        &self.fields[id.0]
    }

    pub fn parent(&self, id: FieldId) -> Option<FieldId> {
        self.get(id).parent
    }

    pub fn children(&self, id: FieldId) -> &[FieldId] {
        &self.get(id).children
    }

    /// The selections merged into a normalized field.
    pub fn merged_field(&self, id: FieldId) -> &MergedField {
        &self.merged_fields[id.0]
    }

    /// The normalized fields an AST field of the operation contributed to, one per
    /// object type it was selected on.
    pub fn normalized_fields_for_ast_field(&self, field: &Node<executable::Field>) -> &[FieldId] {
        self.by_ast_field
            .get(&AstFieldKey::of(field))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn fields_by_coordinates(&self, coordinates: &FieldCoordinates) -> &[FieldId] {
        self.by_coordinates
            .get(coordinates)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every field, children before their parent.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &NormalizedField)> {
        self.fields
            .iter()
            .enumerate()
            .map(|(index, field)| (FieldId(index), field))
    }

    fn push(&mut self, field: NormalizedField, merged: MergedField) -> FieldId {
        let id = FieldId(self.fields.len());
        for ast_field in merged.fields() {
            self.by_ast_field
                .entry(AstFieldKey::of(ast_field))
                .or_default()
                .push(id);
        }
        self.by_coordinates
            .entry(field.coordinates())
            .or_default()
            .push(id);
        self.fields.push(field);
        self.merged_fields.push(merged);
        id
    }

    // Children are built before their parent exists.
    fn attach(&mut self, parent: FieldId) {
        let children = std::mem::take(&mut self.fields[parent.0].children);
        for child in &children {
            let previous = self.fields[child.0].parent.replace(parent);
            debug_assert!(previous.is_none(), "field {child:?} already has a parent");
        }
        self.fields[parent.0].children = children;
    }

    fn write_field(&self, f: &mut fmt::Formatter<'_>, id: FieldId) -> fmt::Result {
        let field = self.get(id);
        let indent = "  ".repeat(field.level.saturating_sub(1));
        writeln!(f, "{indent}{}: {}", field.result_key, field.coordinates())?;
        for child in &field.children {
            self.write_field(f, *child)?;
        }
        Ok(())
    }
}

impl fmt::Display for NormalizedQueryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in &self.top_level {
            self.write_field(f, *id)?;
        }
        Ok(())
    }
}
