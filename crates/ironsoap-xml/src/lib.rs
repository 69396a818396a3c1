use roxmltree::NodeType;

pub mod builder;
pub mod owned;
pub mod parser;
pub mod qname;

pub use owned::{OwnedElement, OwnedNode};
pub use qname::QualifiedName;

/// Namespace bound to the reserved `xml` prefix.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum XmlError {
    #[error("Invalid XML: {0}")]
    ParserError(#[from] crate::parser::Error),

    #[error("Invalid namespace: expected '{expected}', found '{found:?}'")]
    XmlInvalidNamespace {
        expected: String,
        found: Option<String>,
    },

    #[error("Invalid tag: expected '{expected}', found '{found:?}'")]
    XmlInvalidTag { expected: String, found: String },

    #[error("Invalid number of tags for {tag}: found {value}")]
    TagCountInvalid { tag: String, value: usize },

    #[error("Invalid XML: {0}")]
    InvalidXml(String),

    #[error("Unexpected tag: {0}")]
    UnexpectedTag(String),

    #[error("Invalid node type: expected '{expected:?}', found {found:?}")]
    InvalidNodeType { expected: NodeType, found: NodeType },

    #[error("Undeclared namespace prefix '{prefix}' in '{value}'")]
    UndeclaredPrefix { prefix: String, value: String },

    #[error("Nesting depth exceeds the limit of {limit} for {tag}")]
    DepthLimitExceeded { tag: String, limit: usize },
}
