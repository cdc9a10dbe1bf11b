use apollo_compiler::schema::ExtendedType;
use serde_json_bytes::Value;

/// <https://spec.graphql.org/October2021/#sec-Scalars.Result-Coercion-and-Serialization>
///
/// Returns the message of the field error when `value` does not fit the leaf type.
pub(super) fn coerce_leaf_value(definition: &ExtendedType, value: Value) -> Result<Value, String> {
    let type_name = definition.name();
    match definition {
        ExtendedType::Enum(enum_definition) => {
            // https://spec.graphql.org/October2021/#sec-Enums.Result-Coercion
            if value
                .as_str()
                .is_some_and(|value| enum_definition.values.contains_key(value))
            {
                Ok(value)
            } else {
                Err(format!("Resolver returned {value}, expected enum {type_name}"))
            }
        }
        ExtendedType::Scalar(_) => match type_name.as_str() {
            "Int" => {
                // Non-integer values are not coerced to integers
                match value.as_i64() {
                    Some(int) if i32::try_from(int).is_ok() => Ok(value),
                    Some(_) => Err(format!("Resolver returned {value} which overflows Int")),
                    None => Err(format!("Resolver returned {value}, expected Int")),
                }
            }
            "Float" => {
                if value.is_number() {
                    Ok(value)
                } else {
                    Err(format!("Resolver returned {value}, expected Float"))
                }
            }
            "String" => {
                if value.is_string() {
                    Ok(value)
                } else {
                    Err(format!("Resolver returned {value}, expected String"))
                }
            }
            "Boolean" => {
                if value.is_boolean() {
                    Ok(value)
                } else {
                    Err(format!("Resolver returned {value}, expected Boolean"))
                }
            }
            "ID" => match &value {
                Value::String(_) => Ok(value),
                // https://spec.graphql.org/October2021/#sec-ID.Result-Coercion
                Value::Number(number) if number.is_i64() || number.is_u64() => {
                    Ok(Value::from(number.to_string()))
                }
                _ => Err(format!("Resolver returned {value}, expected ID")),
            },
            // Custom scalars accept any JSON value, including arrays and objects
            _ => Ok(value),
        },
        _ => Err(format!(
            "Resolver returned {value}, expected an object of type {type_name}"
        )),
    }
}
