//! Error types of the execution engine.
use std::fmt;

use displaydoc::Display;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;
use thiserror::Error;

use crate::graphql::Error;
use crate::graphql::ErrorClassification;
use crate::graphql::ErrorExtension;
use crate::graphql::Response;
use crate::json_ext::Object;
use crate::path::ResultPath;

/// Error types for a whole execution.
///
/// Note that these are not returned to the client as-is, but are converted to
/// [`struct@Error`]s with [`ExecutionError::to_graphql_errors`].
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExecutionError {
    /// invalid syntax
    InvalidSyntax(Vec<Error>),

    /// validation error
    Validation(Vec<Error>),

    /// Unknown operation named "{0}"
    UnknownOperation(String),

    /// Must provide operation name if query contains multiple operations.
    OperationNameRequired,

    /// the schema does not define a root type for {0} operations
    MissingRootType(String),

    /// maximum query complexity exceeded {complexity} > {max}
    MaxQueryComplexityExceeded {
        /// The computed complexity.
        complexity: u32,
        /// The configured ceiling.
        max: u32,
    },

    /// execution aborted: {reason}
    Aborted {
        /// Why an instrumentation stopped the execution.
        reason: String,
    },

    /// {operation_type} operations are not supported by {entry_point}
    OperationNotSupported {
        /// The type of the selected operation.
        operation_type: String,
        /// The entry point that was called.
        entry_point: &'static str,
    },
}

impl ExecutionError {
    /// Convert the execution error to GraphQL errors.
    ///
    /// Syntax and validation failures carry the errors reported by the compiler, every
    /// other variant converts to a single error.
    pub fn to_graphql_errors(&self) -> Vec<Error> {
        match self {
            ExecutionError::InvalidSyntax(errors) | ExecutionError::Validation(errors) => {
                errors.clone()
            }
            _ => vec![
                Error::builder()
                    .message(self.to_string())
                    .extensions(self.custom_extension_details().unwrap_or_default())
                    .classification(self.classification())
                    .extension_code(self.extension_code())
                    .build(),
            ],
        }
    }

    /// Convert the error to an appropriate response.
    pub fn to_response(&self) -> Response {
        Response::from_errors(self.to_graphql_errors())
    }
}

impl ErrorExtension for ExecutionError {
    fn extension_code(&self) -> String {
        match self {
            ExecutionError::InvalidSyntax(_) => "GRAPHQL_PARSE_FAILED",
            ExecutionError::Validation(_) => "GRAPHQL_VALIDATION_FAILED",
            ExecutionError::UnknownOperation(_) => "GRAPHQL_UNKNOWN_OPERATION_NAME",
            ExecutionError::OperationNameRequired => "GRAPHQL_OPERATION_NAME_REQUIRED",
            ExecutionError::MissingRootType(_) => "MISSING_ROOT_TYPE",
            ExecutionError::MaxQueryComplexityExceeded { .. } => "MAX_QUERY_COMPLEXITY_EXCEEDED",
            ExecutionError::Aborted { .. } => "EXECUTION_ABORTED",
            ExecutionError::OperationNotSupported { .. } => "OPERATION_NOT_SUPPORTED",
        }
        .to_string()
    }

    fn classification(&self) -> ErrorClassification {
        match self {
            ExecutionError::InvalidSyntax(_) => ErrorClassification::InvalidSyntax,
            ExecutionError::Validation(_)
            | ExecutionError::UnknownOperation(_)
            | ExecutionError::OperationNameRequired => ErrorClassification::ValidationError,
            ExecutionError::OperationNotSupported { .. } | ExecutionError::MissingRootType(_) => {
                ErrorClassification::OperationNotSupported
            }
            ExecutionError::MaxQueryComplexityExceeded { .. } | ExecutionError::Aborted { .. } => {
                ErrorClassification::ExecutionAborted
            }
        }
    }

    fn custom_extension_details(&self) -> Option<Object> {
        match self {
            ExecutionError::MaxQueryComplexityExceeded { complexity, max } => {
                let mut details = Object::new();
                details.insert("complexity", Value::from(*complexity));
                details.insert("maxComplexity", Value::from(*max));
                Some(details)
            }
            _ => None,
        }
    }
}

/// A failure reported by a resolver, or raised while completing its value.
///
/// Turned into a GraphQL error located at the field and path it was raised for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// Extensions copied into the GraphQL error.
    pub extensions: Object,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Object::new(),
        }
    }

    /// Adds an extension entry to the resulting GraphQL error.
    pub fn with_extension(mut self, key: impl Into<ByteString>, value: impl Into<Value>) -> Self {
        let key: ByteString = key.into();
        self.extensions.insert(key, value.into());
        self
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        FieldError::new(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        FieldError::new(message)
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for FieldError {
    fn from(error: Box<dyn std::error::Error + Send + Sync>) -> Self {
        FieldError::new(error.to_string())
    }
}

impl From<ExecutionError> for FieldError {
    fn from(error: ExecutionError) -> Self {
        let mut field_error = FieldError::new(error.to_string());
        field_error
            .extensions
            .insert("code", error.extension_code().into());
        field_error
    }
}

// Carried upwards through result nodes until a nullable position absorbs it.
#[derive(Error, Display, Debug, Clone, PartialEq, Eq)]
/// Cannot return null for non-nullable type: '{type_name}' within parent '{parent_type}' ({path})
pub struct NonNullableFieldWasNull {
    /// The non-null type that was violated.
    pub type_name: String,
    /// The object type holding the field.
    pub parent_type: String,
    /// Where the null was found.
    pub path: ResultPath,
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn complexity_error_is_a_single_aborted_error() {
        let errors = ExecutionError::MaxQueryComplexityExceeded {
            complexity: 6,
            max: 5,
        }
        .to_graphql_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "maximum query complexity exceeded 6 > 5"
        );
        assert_eq!(
            errors[0].classification(),
            Some(ErrorClassification::ExecutionAborted)
        );
        assert_eq!(
            serde_json_bytes::to_value(&errors[0].extensions).unwrap(),
            json!({
                "complexity": 6,
                "maxComplexity": 5,
                "classification": "ExecutionAborted",
                "code": "MAX_QUERY_COMPLEXITY_EXCEEDED"
            })
        );
    }

    #[test]
    fn validation_errors_pass_through() {
        let inner = Error::builder()
            .message("bad field")
            .classification(ErrorClassification::ValidationError)
            .build();
        let error = ExecutionError::Validation(vec![inner.clone(), inner.clone()]);
        assert_eq!(error.to_graphql_errors(), vec![inner.clone(), inner]);
        assert!(error.to_response().data.is_null());
    }

    #[test]
    fn non_null_message() {
        let error = NonNullableFieldWasNull {
            type_name: "String!".to_string(),
            parent_type: "Query".to_string(),
            path: ResultPath::parse("/a").unwrap(),
        };
        assert_eq!(
            error.to_string(),
            "Cannot return null for non-nullable type: 'String!' within parent 'Query' (/a)"
        );
    }
}
