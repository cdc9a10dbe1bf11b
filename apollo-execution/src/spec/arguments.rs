use apollo_compiler::Node;
use apollo_compiler::ast;
use apollo_compiler::schema::InputValueDefinition;
use serde_json_bytes::Value;

use crate::json_ext::Object;

/// Converts a literal from the document to JSON, substituting variables.
///
/// A variable missing from `variables` converts to null.
fn value_to_json(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => Value::from(name.as_str()),
        ast::Value::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or_default(),
        ast::Value::String(string) => Value::from(string.as_str()),
        ast::Value::Boolean(boolean) => Value::Bool(*boolean),
        ast::Value::Int(int) => match int.as_str().parse::<i64>() {
            Ok(int) => Value::from(int),
            Err(_) => int
                .as_str()
                .parse::<f64>()
                .map(Value::from)
                .unwrap_or_default(),
        },
        ast::Value::Float(float) => float
            .as_str()
            .parse::<f64>()
            .map(Value::from)
            .unwrap_or_default(),
        ast::Value::List(items) => items
            .iter()
            .map(|item| value_to_json(item, variables))
            .collect::<Vec<_>>()
            .into(),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), value_to_json(value, variables)))
                .collect(),
        ),
    }
}

/// Resolves the arguments of a field against its definition.
///
/// Arguments are produced in definition order. A missing argument takes its default
/// value, and is left out when it has none. An argument given as an unset variable
/// is treated as missing.
pub(crate) fn coerce_argument_values(
    definitions: &[Node<InputValueDefinition>],
    arguments: &[Node<ast::Argument>],
    variables: &Object,
) -> Object {
    let mut coerced = Object::new();
    for definition in definitions {
        let provided = arguments
            .iter()
            .find(|argument| argument.name == definition.name)
            .filter(|argument| match &*argument.value {
                ast::Value::Variable(name) => variables.contains_key(name.as_str()),
                _ => true,
            });
        let value = match provided {
            Some(argument) => value_to_json(&argument.value, variables),
            None => match &definition.default_value {
                Some(default) => value_to_json(default, variables),
                None => continue,
            },
        };
        coerced.insert(definition.name.as_str(), value);
    }
    coerced
}
