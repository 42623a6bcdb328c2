/// An error loading or compiling a schema.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("cannot load schema {href}")]
    Load {
        href: String,
        #[source]
        source: std::io::Error,
    },
    #[error("schema {document} is not well-formed XML")]
    Xml {
        document: String,
        #[source]
        source: xot::ParseError,
    },
    #[error("{0} is not an XML Schema document")]
    NotASchema(String),
    #[error("unknown type {0}")]
    UnknownType(String),
    #[error("unknown element {0}")]
    UnknownElement(String),
    #[error("unknown attribute {0}")]
    UnknownAttribute(String),
    #[error("unknown group {0}")]
    UnknownGroup(String),
    #[error("unknown attribute group {0}")]
    UnknownAttributeGroup(String),
    #[error("unbound prefix in {0}")]
    UnboundPrefix(String),
    #[error("type {0} is derived from itself")]
    CircularDerivation(String),
    #[error("invalid value {value:?} for facet {facet}: {reason}")]
    BadFacet {
        facet: String,
        value: String,
        reason: String,
    },
    #[error("invalid pattern {pattern:?}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("malformed schema: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, SchemaError>;
