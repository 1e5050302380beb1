//! Error types for template rendering.

use std::time::Duration;

/// A template that could not be parsed, with the byte offset of the offending action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template parse error at offset {offset}: {message}")]
pub struct ParseError {
    pub offset: usize,
    pub message: String,
}

impl ParseError {
    pub(crate) fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Failure while evaluating a parsed template against data.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("error calling {name}: {source}")]
    Function {
        name: String,
        #[source]
        source: crate::functions::FunctionError,
    },

    #[error("function {name} panicked: {message}")]
    FunctionPanicked { name: String, message: String },

    #[error("wrong number of args for {name}: want {want} got {got}")]
    Arity {
        name: String,
        want: usize,
        got: usize,
    },

    #[error("map has no entry for key {0:?}")]
    MissingKey(String),

    #[error("can't evaluate field {field} in type {kind}")]
    FieldOnNonDict { field: String, kind: &'static str },

    #[error("range can't iterate over {0}")]
    NotIterable(&'static str),

    #[error("can't give argument to non-function {0}")]
    NotAFunction(String),

    #[error("can't render value of type {0}")]
    Unprintable(&'static str),
}

/// Failure loading, decoding or embedding an image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("file is not a valid image: {0}")]
    NotAnImage(String),

    #[error("unknown image format: {0:?}")]
    UnknownFormat(String),

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// Errors surfaced by opening, rendering and saving a document.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no data supplied")]
    NoData,

    #[error("expected a record or dictionary, got {kind}")]
    NotARecord { kind: &'static str },

    #[error("function name {0:?} is not a valid identifier")]
    InvalidFunctionName(String),

    #[error("data serialization failed: {0}")]
    Serialize(String),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("template execution failed: {0}")]
    Exec(#[from] ExecError),

    #[error("table range normalization exceeded {limit:?}")]
    RangeTimeout { limit: Duration },

    #[error("tag merge task failed: {0}")]
    MergeTask(String),

    #[error("image error: {0}")]
    Image(#[from] ImageError),

    #[error("invalid document XML in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: roxmltree::Error,
    },

    #[error("part {0} not found in package")]
    MissingPart(String),

    #[error("malformed part {part}: {message}")]
    MalformedPart { part: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

pub type Result<T> = std::result::Result<T, Error>;
