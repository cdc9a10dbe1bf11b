use std::sync::Arc;

use serde_json_bytes::Value;

use super::ExecutionStepInfo;
use crate::error::NonNullableFieldWasNull;
use crate::graphql::Error;
use crate::json_ext::Object;

/// One completed position of the result tree.
///
/// Nodes are immutable: the `with_*` methods return updated copies. Whether a
/// non-null position ended up null is computed when a node is built, so a violation
/// bubbles up to the closest nullable ancestor as the tree is assembled.
#[derive(Clone, Debug, PartialEq)]
pub enum ExecutionResultNode {
    /// A scalar, an enum, or a null.
    Leaf(ResultNode),
    Object(ResultNode),
    List(ResultNode),
}

/// The data shared by every kind of [`ExecutionResultNode`].
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub struct ResultNode {
    pub step_info: Arc<ExecutionStepInfo>,
    /// The completed value for leaves, the fetched value for objects and lists.
    pub resolved_value: Value,
    pub children: Vec<ExecutionResultNode>,
    pub errors: Vec<Error>,
    non_nullable: Option<NonNullableFieldWasNull>,
}

impl ExecutionResultNode {
    pub fn leaf(step_info: Arc<ExecutionStepInfo>, value: Value, errors: Vec<Error>) -> Self {
        Self::Leaf(ResultNode::new(step_info, value, Vec::new(), errors)).checked()
    }

    pub fn object(
        step_info: Arc<ExecutionStepInfo>,
        resolved_value: Value,
        children: Vec<ExecutionResultNode>,
        errors: Vec<Error>,
    ) -> Self {
        Self::Object(ResultNode::new(step_info, resolved_value, children, errors)).checked()
    }

    pub fn list(
        step_info: Arc<ExecutionStepInfo>,
        resolved_value: Value,
        children: Vec<ExecutionResultNode>,
        errors: Vec<Error>,
    ) -> Self {
        Self::List(ResultNode::new(step_info, resolved_value, children, errors)).checked()
    }

    fn node(&self) -> &ResultNode {
        match self {
            Self::Leaf(node) | Self::Object(node) | Self::List(node) => node,
        }
    }

    fn node_mut(&mut self) -> &mut ResultNode {
        match self {
            Self::Leaf(node) | Self::Object(node) | Self::List(node) => node,
        }
    }

    pub fn step_info(&self) -> &Arc<ExecutionStepInfo> {
        &self.node().step_info
    }

    pub fn resolved_value(&self) -> &Value {
        &self.node().resolved_value
    }

    pub fn children(&self) -> &[ExecutionResultNode] {
        &self.node().children
    }

    /// The errors raised at this position, excluding those of children.
    pub fn errors(&self) -> &[Error] {
        &self.node().errors
    }

    /// The violation to propagate to the parent, when this position is non-null but
    /// ended up null.
    pub fn non_nullable_field_was_null(&self) -> Option<&NonNullableFieldWasNull> {
        self.node().non_nullable.as_ref()
    }

    /// Whether this position is null in the response.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Leaf(node) => node.resolved_value.is_null(),
            Self::Object(node) | Self::List(node) => node
                .children
                .iter()
                .any(|child| child.non_nullable_field_was_null().is_some()),
        }
    }

    pub fn with_new_children(mut self, children: Vec<ExecutionResultNode>) -> Self {
        if !matches!(self, Self::Leaf(_)) {
            self.node_mut().children = children;
        }
        self.checked()
    }

    pub fn with_new_resolved_value(mut self, resolved_value: Value) -> Self {
        self.node_mut().resolved_value = resolved_value;
        self.checked()
    }

    pub fn with_new_step_info(mut self, step_info: Arc<ExecutionStepInfo>) -> Self {
        self.node_mut().step_info = step_info;
        self.checked()
    }

    pub fn with_new_errors(mut self, errors: Vec<Error>) -> Self {
        self.node_mut().errors = errors;
        self
    }

    /// The value of this position in the response data.
    pub fn to_data(&self) -> Value {
        if self.is_null() {
            return Value::Null;
        }
        match self {
            Self::Leaf(node) => node.resolved_value.clone(),
            Self::Object(node) => {
                let mut object = Object::with_capacity(node.children.len());
                for child in &node.children {
                    if let Some(key) = child.step_info().path.segment_name() {
                        object.insert(key, child.to_data());
                    }
                }
                Value::Object(object)
            }
            Self::List(node) => Value::Array(node.children.iter().map(Self::to_data).collect()),
        }
    }

    /// Every error of this tree, parents before children and siblings in field order.
    pub fn collect_errors(&self) -> Vec<Error> {
        let mut errors = Vec::new();
        self.collect_errors_into(&mut errors);
        errors
    }

    fn collect_errors_into(&self, errors: &mut Vec<Error>) {
        errors.extend(self.errors().iter().cloned());
        for child in self.children() {
            child.collect_errors_into(errors);
        }
    }

    fn checked(mut self) -> Self {
        let node = self.node();
        let non_nullable = if node.step_info.ty.is_non_null() && self.is_null() {
            Some(NonNullableFieldWasNull {
                type_name: node.step_info.ty.to_string(),
                parent_type: node.step_info.parent_type.to_string(),
                path: node.step_info.path.clone(),
            })
        } else {
            None
        };
        self.node_mut().non_nullable = non_nullable;
        self
    }
}

impl ResultNode {
    fn new(
        step_info: Arc<ExecutionStepInfo>,
        resolved_value: Value,
        children: Vec<ExecutionResultNode>,
        errors: Vec<Error>,
    ) -> Self {
        Self {
            step_info,
            resolved_value,
            children,
            errors,
            non_nullable: None,
        }
    }
}
