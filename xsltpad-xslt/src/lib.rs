//! XSLT 1.0 over [Xot](https://docs.rs/xot).
//!
//! A stylesheet is compiled once into a [`Stylesheet`], which can then be
//! applied to any number of source documents. Included and imported modules
//! and `document()` targets are loaded through a [`Resolver`].

mod ast;
mod avt;
mod compile;
mod error;
mod format_number;
mod interpret;
mod names;
mod number;
mod output;
mod priority;
mod whitespace;

pub use error::{Error, Result};
pub use interpret::MAX_DEPTH;
pub use output::{OutputMethod, OutputSettings};
pub use xsltpad_xpath::{FileResolver, Loaded, NoResolver, Resolver};

use crate::ast::Program;

/// A compiled stylesheet.
#[derive(Debug)]
pub struct Stylesheet {
    program: Program,
}

impl Stylesheet {
    /// Compile a stylesheet. `uri` is where the stylesheet text came from;
    /// relative `href`s in xsl:include, xsl:import and `document()` are
    /// resolved against it.
    pub fn compile(text: &str, uri: Option<&str>, resolver: &dyn Resolver) -> Result<Self> {
        Ok(Self {
            program: compile::compile(text, uri, resolver)?,
        })
    }

    /// Transform a source document. Parameters bind top-level xsl:param
    /// elements by local name, as strings; names the stylesheet doesn't
    /// declare are ignored.
    pub fn transform(
        &self,
        xml: &str,
        parameters: &[(String, String)],
        resolver: &dyn Resolver,
    ) -> Result<String> {
        interpret::run(&self.program, xml, parameters, resolver)
    }

    pub fn output_settings(&self) -> &OutputSettings {
        &self.program.output
    }
}

/// Compile and run a stylesheet in one go.
pub fn transform(
    xslt: &str,
    xml: &str,
    parameters: &[(String, String)],
    resolver: &dyn Resolver,
) -> Result<String> {
    Stylesheet::compile(xslt, None, resolver)?.transform(xml, parameters, resolver)
}
