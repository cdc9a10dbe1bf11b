use apollo_compiler::ast;
use apollo_compiler::executable::DirectiveList;

use crate::json_ext::Object;

/// Evaluates `@skip` and `@include` against the request variables.
pub(crate) fn should_include(directives: &DirectiveList, variables: &Object) -> bool {
    let condition = |directive: &str| {
        directives
            .get(directive)
            .and_then(|directive| {
                directive
                    .arguments
                    .iter()
                    .find(|argument| argument.name == "if")
            })
            .and_then(|argument| match &*argument.value {
                ast::Value::Boolean(value) => Some(*value),
                ast::Value::Variable(name) => {
                    variables.get(name.as_str()).and_then(|value| value.as_bool())
                }
                _ => None,
            })
    };
    let skipped = condition("skip").unwrap_or(false);
    let included = condition("include").unwrap_or(true);
    !skipped && included
}
