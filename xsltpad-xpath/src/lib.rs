//! XPath 1.0 over [Xot](https://docs.rs/xot).
//!
//! Expressions are parsed into an owned AST with all prefixes resolved, and
//! evaluated against a [`Host`] that supplies the document arena, variables
//! and any extension functions. XSLT match patterns live here too, as they
//! share the XPath grammar.

mod ast;
mod context;
mod document_order;
mod error;
mod eval;
mod functions;
mod lexer;
mod name;
mod node;
mod parser;
mod pattern;
mod resolver;
mod span;
mod value;

pub use ast::{ArithmeticOperator, Axis, CompareOperator, Expr, NodeTest, PathExpr, PathStart, Step};
pub use context::{Context, DocumentHost, Host};
pub use document_order::{DocumentOrder, Order};
pub use error::{Error, Result, SpannedError};
pub use eval::{evaluate, evaluate_nodes};
pub use functions::{is_core_function, normalize_space, round};
pub use name::{ExpandedName, Namespaces, XML_NAMESPACE};
pub use node::{
    attribute_value, in_scope_namespaces, is_document, is_fragment, local_name, name_parts,
    namespace_uri, new_fragment, node_kind, qualified_name, root, string_value, NodeKind,
    FRAGMENT_NAMESPACE,
};
pub use parser::parse_expr;
pub use pattern::{parse_pattern, Anchor, Connector, PathPattern, Pattern, StepPattern};
pub use resolver::{FileResolver, Loaded, NoResolver, Resolver};
pub use span::SourceSpan;
pub use value::{number_to_string, string_to_number, Value};

/// A parsed expression together with its source text.
#[derive(Debug, Clone)]
pub struct XPath {
    source: String,
    expr: Expr,
}

impl XPath {
    pub fn parse(source: &str, namespaces: &Namespaces) -> std::result::Result<Self, SpannedError> {
        Ok(Self {
            source: source.to_string(),
            expr: parse_expr(source, namespaces)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn evaluate(&self, context: &Context, host: &mut dyn Host) -> Result<Value> {
        evaluate(&self.expr, context, host)
    }

    pub fn evaluate_string(&self, context: &Context, host: &mut dyn Host) -> Result<String> {
        let value = self.evaluate(context, host)?;
        Ok(value.to_xpath_string(host.xot()))
    }
}
