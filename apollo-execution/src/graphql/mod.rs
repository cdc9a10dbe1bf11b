//! Types related to GraphQL requests, responses, etc.

mod request;
mod response;

use std::hash::Hash;
use std::hash::Hasher;
use std::pin::Pin;

use apollo_compiler::parser::SourceMap;
use apollo_compiler::parser::SourceSpan;
use apollo_compiler::response::GraphQLError as CompilerError;
use apollo_compiler::response::ResponseDataPathSegment;
use futures::Stream;
pub use request::Request;
pub use response::Response;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::path::PathSegment;
use crate::path::ResultPath;

/// An asynchronous [`Stream`] of GraphQL [`Response`]s.
///
/// Subscriptions produce one response per event.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Response> + Send>>;

pub(crate) const CLASSIFICATION_KEY: &str = "classification";

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "camelCase")]
/// The error location
pub struct Location {
    /// The line number
    pub line: u32,
    /// The column number
    pub column: u32,
}

impl Location {
    /// The location of a node in the document its span points into.
    pub(crate) fn from_span(span: Option<SourceSpan>, sources: &SourceMap) -> Option<Self> {
        let line_column = span?.line_column(sources)?;
        Some(Location {
            line: line_column.line as u32,
            column: line_column.column as u32,
        })
    }
}

/// The broad category an [`Error`] belongs to.
///
/// Serialized under `extensions.classification`.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum ErrorClassification {
    /// The document could not be parsed.
    InvalidSyntax,
    /// The document violates the rules of the schema.
    ValidationError,
    /// A resolver failed or returned a value that does not fit its type.
    DataFetchingException,
    /// A non-null position resolved to null.
    NullValueInNonNullableField,
    /// The operation cannot run through the requested entry point.
    OperationNotSupported,
    /// Execution was stopped before any field was fetched.
    ExecutionAborted,
}

impl ErrorClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClassification::InvalidSyntax => "InvalidSyntax",
            ErrorClassification::ValidationError => "ValidationError",
            ErrorClassification::DataFetchingException => "DataFetchingException",
            ErrorClassification::NullValueInNonNullableField => "NullValueInNonNullableField",
            ErrorClassification::OperationNotSupported => "OperationNotSupported",
            ErrorClassification::ExecutionAborted => "ExecutionAborted",
        }
    }
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
///
/// Converted to (or from) JSON with serde. Two errors are equal when their message,
/// locations, path and extensions are equal; the hash covers the message, locations,
/// path and classification.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// If this is a field error, the path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<ResultPath>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.message(impl Into<`[`String`]`>)`
    ///   Required.
    ///
    /// * `.locations(impl Into<`[`Vec`]`<`[`Location`]`>>)` or `.location(`[`Location`]`)`
    ///   Optional.
    ///
    /// * `.path(impl Into<`[`ResultPath`]`>)`
    ///   Optional.
    ///
    /// * `.extensions(...)` or `.extension(impl Into<`[`ByteString`]`>, impl Into<`[`Value`]`>)`
    ///   Optional.
    ///
    /// * `.classification(`[`ErrorClassification`]`)`
    ///   Optional. Sets `classification` in the extension map unless already present.
    ///
    /// * `.extension_code(impl Into<`[`String`]`>)`
    ///   Optional. Sets `code` in the extension map unless already present.
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<ResultPath>,
        extensions: JsonMap<ByteString, Value>,
        classification: Option<ErrorClassification>,
        extension_code: Option<String>,
    ) -> Self {
        let mut extensions = extensions;
        if let Some(classification) = classification {
            extensions
                .entry(CLASSIFICATION_KEY)
                .or_insert_with(|| classification.as_str().into());
        }
        if let Some(code) = extension_code {
            extensions.entry("code").or_insert_with(|| code.into());
        }
        Self {
            message,
            locations,
            path,
            extensions,
        }
    }
}

impl Error {
    /// The classification recorded in the extensions, if any.
    pub fn classification(&self) -> Option<ErrorClassification> {
        self.extensions
            .get(CLASSIFICATION_KEY)
            .and_then(|value| serde_json_bytes::from_value(value.clone()).ok())
    }

    /// The `code` extension, if any.
    pub fn extension_code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(|code| code.as_str())
    }

    /// Converts a diagnostic reported by the compiler.
    pub(crate) fn from_compiler_error(
        error: CompilerError,
        classification: ErrorClassification,
    ) -> Self {
        let CompilerError {
            message,
            locations,
            path,
            extensions,
        } = error;
        let locations = locations
            .into_iter()
            .map(|location| Location {
                line: location.line as u32,
                column: location.column as u32,
            })
            .collect();
        let path = (!path.is_empty()).then(|| {
            path.into_iter()
                .map(|segment| match segment {
                    ResponseDataPathSegment::Field(name) => PathSegment::Key(name.to_string()),
                    ResponseDataPathSegment::ListIndex(i) => PathSegment::Index(i),
                })
                .collect::<ResultPath>()
        });
        Error::builder()
            .message(message)
            .locations(locations)
            .and_path(path)
            .extensions(extensions)
            .classification(classification)
            .build()
    }
}

impl Hash for Error {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.message.hash(state);
        self.locations.hash(state);
        self.path.hash(state);
        self.classification().hash(state);
    }
}

/// Trait used to get extension type from an error
pub(crate) trait ErrorExtension
where
    Self: Sized,
{
    fn extension_code(&self) -> String;

    fn classification(&self) -> ErrorClassification;

    fn custom_extension_details(&self) -> Option<Object> {
        None
    }
}
