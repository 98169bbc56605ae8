//! Error types
//!
//! `SchemaError` is raised while a schema is being built and is fatal to that
//! schema. `ResolveError` never escapes a resolution run: it is stored in the
//! resolved tree next to the data that could be extracted.

use thiserror::Error;

use crate::dom::XPathError;

/// Malformed schema, reported once at construction
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("invalid CSS selector `{expression}`: {message}")]
    InvalidCss { expression: String, message: String },

    #[error("invalid XPath expression `{expression}`: {source}")]
    InvalidXPath {
        expression: String,
        #[source]
        source: XPathError,
    },

    #[error("invalid tag name `{0}`")]
    InvalidTag(String),

    #[error("invalid schema definition: {0}")]
    Definition(String),
}

/// Local failure inside a resolved tree
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A required view's selector matched nothing in its context
    #[error("required selector {selector} matched nothing")]
    MissingRequired { selector: String },

    /// The caller required a child that resolved to nothing
    #[error("`{name}` is absent")]
    Absent { name: String },

    #[error("<{tag}> has no attribute `{attribute}`")]
    UnsupportedOperation { tag: String, attribute: String },
}
