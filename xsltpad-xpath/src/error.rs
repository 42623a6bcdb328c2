use strum::EnumMessage;
use strum_macros::{Display, EnumMessage};

use crate::span::SourceSpan;

/// An error code with an optional source span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedError {
    /// The error code
    pub error: Error,
    /// The source span where the error occurred
    pub span: Option<SourceSpan>,
}

/// XPath/XSLT error code
///
/// These are taken from the XPath and XSLT specifications, which name
/// error conditions by code. XPath 1.0 itself has no codes, so the XPath 2.0
/// codes for the same conditions are used.
///
/// A few additional codes describe limits of this implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumMessage)]
pub enum Error {
    /// Stack overflow.
    ///
    /// Templates or functions recursed too deeply.
    StackOverflow,

    /// Unsupported feature.
    ///
    /// This XPath or XSLT feature is not supported.
    Unsupported,

    /// Parse error.
    ///
    /// It is a static error if an expression is not a valid instance of the
    /// XPath 1.0 grammar.
    XPST0003,
    /// Undefined variable.
    ///
    /// It is a static error if an expression refers to a variable name that
    /// is not in scope.
    XPST0008,
    /// Unknown function.
    ///
    /// It is a static error if the name and arity of a function call do not
    /// match a function in the function library.
    XPST0017,
    /// Undeclared namespace prefix.
    ///
    /// It is a static error if a QName uses a namespace prefix that has not
    /// been declared.
    XPST0081,
    /// Type error.
    ///
    /// A node-set was required, but the expression evaluated to a string,
    /// number or boolean.
    XPTY0004,
    /// Error retrieving resource.
    ///
    /// A document could not be retrieved or is not well-formed XML.
    FODC0002,

    /// Static error in the stylesheet.
    ///
    /// An element in the XSLT namespace is unknown, misplaced or lacks a
    /// required attribute.
    XTSE0010,
    /// Invalid attribute value.
    ///
    /// An attribute of an XSLT element has a value that is not allowed.
    XTSE0020,
    /// Missing xsl:version.
    ///
    /// A literal result element used as a stylesheet must have an
    /// xsl:version attribute.
    XTSE0150,
    /// Stylesheet module not retrieved.
    ///
    /// The resource named by xsl:include or xsl:import could not be
    /// retrieved or is not a stylesheet.
    XTSE0165,
    /// Recursive inclusion.
    ///
    /// A stylesheet module directly or indirectly includes or imports
    /// itself.
    XTSE0180,
    /// Invalid pattern.
    ///
    /// A match pattern is not a valid XSLT pattern.
    XTSE0340,
    /// Invalid attribute value template.
    ///
    /// Curly brackets in an attribute value template are not balanced.
    XTSE0350,
    /// Template without match or name.
    ///
    /// An xsl:template must have a match attribute, a name attribute, or
    /// both.
    XTSE0500,
    /// Invalid priority.
    ///
    /// The priority attribute of xsl:template must be a decimal number.
    XTSE0530,
    /// Duplicate parameter.
    ///
    /// Two parameters of the same template have the same name.
    XTSE0580,
    /// Duplicate global variable.
    ///
    /// The stylesheet declares two global variables or parameters with the
    /// same name and the same import precedence.
    XTSE0630,
    /// Unknown template.
    ///
    /// xsl:call-template names a template that does not exist.
    XTSE0650,
    /// Duplicate named template.
    ///
    /// The stylesheet contains two templates with the same name and the same
    /// import precedence.
    XTSE0660,
    /// Unknown attribute set.
    ///
    /// A use-attribute-sets attribute names an attribute set that does not
    /// exist.
    XTSE0710,

    /// Circularity.
    ///
    /// The value of a global variable depends on itself.
    XTDE0640,
    /// Invalid result tree.
    ///
    /// A node could not be added to the result tree at this position.
    XTDE0420,
    /// No current template rule.
    ///
    /// xsl:apply-imports was evaluated outside of a template rule, or
    /// inside xsl:for-each.
    XTDE0560,
    /// Invalid element name.
    ///
    /// The name computed by xsl:element is not a valid QName.
    XTDE0820,
    /// Undeclared prefix in element name.
    ///
    /// The name computed by xsl:element uses a prefix that is not declared.
    XTDE0830,
    /// Invalid attribute name.
    ///
    /// The name computed by xsl:attribute is not a valid QName, or is
    /// xmlns.
    XTDE0850,
    /// Undeclared prefix in attribute name.
    ///
    /// The name computed by xsl:attribute uses a prefix that is not declared.
    XTDE0860,
    /// Invalid processing instruction name.
    ///
    /// The name computed by xsl:processing-instruction is not a valid NCName
    /// or is xml.
    XTDE0890,
    /// Unknown key.
    ///
    /// The key() function names a key that is not declared.
    XTDE1260,
    /// Unknown decimal format.
    ///
    /// The format-number() function names a decimal format that is not
    /// declared.
    XTDE1280,
    /// Invalid picture string.
    ///
    /// The picture string passed to format-number() is not valid.
    XTDE1310,
    /// Terminated by xsl:message.
    ///
    /// An xsl:message instruction with terminate="yes" was evaluated.
    XTMM9000,
}

impl Error {
    pub fn with_span(self, span: SourceSpan) -> SpannedError {
        SpannedError {
            error: self,
            span: Some(span),
        }
    }

    pub fn code(&self) -> String {
        self.to_string()
    }

    pub fn message(&self) -> &str {
        self.documentation_pieces().0
    }

    pub fn note(&self) -> &str {
        self.documentation_pieces().1
    }

    fn documentation_pieces(&self) -> (&str, &str) {
        if let Some(documentation) = self.get_documentation() {
            let mut pieces = documentation.splitn(2, "\n\n");
            let first = pieces.next().unwrap_or("");
            let second = pieces.next().unwrap_or("");
            (first, second)
        } else {
            ("", "")
        }
    }
}

impl std::error::Error for Error {}

impl From<Error> for SpannedError {
    fn from(error: Error) -> Self {
        SpannedError { error, span: None }
    }
}

impl SpannedError {
    /// Attach a span if the error doesn't have one yet.
    pub fn or_span(mut self, span: SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }
}

impl std::fmt::Display for SpannedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.error.message())?;
        if let Some(span) = self.span {
            let span = span.range();
            write!(f, " ({}..{})", span.start, span.end)?;
        }
        Ok(())
    }
}

impl std::error::Error for SpannedError {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_and_note() {
        assert_eq!(Error::XPST0008.code(), "XPST0008");
        assert_eq!(Error::XPST0008.message(), "Undefined variable.");
        assert!(Error::XPST0008.note().starts_with("It is a static error"));
    }

    #[test]
    fn test_spanned_display() {
        let error = Error::XPST0003.with_span(SourceSpan::new(2, 5));
        insta::assert_snapshot!(error.to_string(), @"XPST0003: Parse error. (2..5)");
    }
}
