//! A subset of XML Schema 1.0 over [Xot](https://docs.rs/xot).
//!
//! A [`Schema`] is compiled from schema text, with `xs:include` and
//! `xs:import` loaded through a [`Resolver`]. Validating a document returns
//! every problem found rather than stopping at the first.
//!
//! Not supported: identity constraints, substitution groups, `xs:redefine`
//! and the uniqueness of `xs:ID` values.

mod compile;
mod error;
mod facets;
mod model;
mod validate;
mod xs;

use std::fmt;
use std::path::Path;

use xot::{Node, Xot};

pub use error::{Result, SchemaError};
pub use xsltpad_xpath::{FileResolver, NoResolver, Resolver};

use crate::model::Components;
use crate::validate::Validation;

/// A problem found while validating a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationMessage {
    pub message: String,
    /// 1-based, when the document was parsed with span information.
    pub line: Option<usize>,
    pub column: Option<usize>,
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "{} (line {}, column {})", self.message, line, column)
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

/// A compiled schema.
#[derive(Debug, Clone)]
pub struct Schema {
    components: Components,
}

impl Schema {
    /// Compile schema text. Includes and imports are resolved without a
    /// base location.
    pub fn parse(text: &str, resolver: &dyn Resolver) -> Result<Self> {
        Self::parse_with_uri(text, None, resolver)
    }

    /// Compile schema text that was loaded from `uri`.
    pub fn parse_with_uri(text: &str, uri: Option<&str>, resolver: &dyn Resolver) -> Result<Self> {
        Ok(Self {
            components: compile::compile(text, uri, resolver)?,
        })
    }

    /// Read and compile a schema file. Includes and imports are resolved
    /// relative to it.
    pub fn from_path(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| SchemaError::Load {
            href: path.display().to_string(),
            source,
        })?;
        let uri = path.to_string_lossy();
        Self::parse_with_uri(&text, Some(&uri), &FileResolver::for_file(path))
    }

    /// Validate a document or element. Messages carry no location.
    pub fn validate(&self, xot: &Xot, root: Node) -> Vec<ValidationMessage> {
        Validation::new(&self.components, xot, None).run(root)
    }

    /// Validate a document parsed from `text` with
    /// [`Xot::parse_with_span_info`], locating messages in `text`.
    pub fn validate_with_spans(
        &self,
        xot: &Xot,
        root: Node,
        text: &str,
        spans: &xot::SpanInfo,
    ) -> Vec<ValidationMessage> {
        Validation::new(&self.components, xot, Some((text, spans))).run(root)
    }

    /// Parse and validate document text.
    pub fn validate_str(
        &self,
        text: &str,
    ) -> std::result::Result<Vec<ValidationMessage>, xot::ParseError> {
        let mut xot = Xot::new();
        let (root, spans) = xot.parse_with_span_info(text)?;
        Ok(self.validate_with_spans(&xot, root, text, &spans))
    }
}
