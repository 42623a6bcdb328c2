use std::path::Path;

use xsltpad_xsd::{Schema, SchemaError};

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("the output cannot be validated")]
    Document(#[from] xot::ParseError),
}

/// Checks transform output against an XSD.
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// The last problem found in `xml`, if any.
    ///
    /// Nothing is validated without a schema or when `xml` is blank. The
    /// schema is read fresh on every call so edits to it are picked up.
    pub fn validate(&self, xml: &str, schema: Option<&Path>) -> Result<Option<String>, ValidationError> {
        let Some(schema) = schema else {
            return Ok(None);
        };
        if xml.trim().is_empty() {
            return Ok(None);
        }
        let schema = Schema::from_path(schema)?;
        let messages = schema.validate_str(xml)?;
        Ok(messages.last().map(|message| message.to_string()))
    }
}
