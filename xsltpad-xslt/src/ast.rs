//! The compiled form of a stylesheet.
//!
//! Nothing here refers to the stylesheet's Xot nodes, so a compiled
//! stylesheet can be run against any number of source documents.

use ahash::HashMap;
use rust_decimal::Decimal;
use xsltpad_xpath::{ExpandedName, Expr, Namespaces, NodeTest, Pattern, SourceSpan};

use crate::format_number::DecimalFormat;
use crate::output::OutputSettings;

/// An XPath expression and where it was written.
#[derive(Debug, Clone)]
pub(crate) struct Expression {
    pub(crate) expr: Expr,
    pub(crate) span: SourceSpan,
}

#[derive(Debug, Clone)]
pub(crate) enum AvtPart {
    Text(String),
    Expression(Expression),
}

/// An attribute value template.
#[derive(Debug, Clone)]
pub(crate) struct Avt {
    pub(crate) parts: Vec<AvtPart>,
}

pub(crate) type Body = Vec<Instruction>;

#[derive(Debug, Clone)]
pub(crate) enum BindingValue {
    Select(Expression),
    Content(Body),
    /// Neither select nor content: the empty string.
    Empty,
}

/// A variable, parameter or with-param.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub(crate) name: ExpandedName,
    pub(crate) value: BindingValue,
    pub(crate) span: SourceSpan,
}

#[derive(Debug, Clone)]
pub(crate) struct Sort {
    pub(crate) select: Expression,
    pub(crate) data_type: Option<Avt>,
    pub(crate) order: Option<Avt>,
    pub(crate) case_order: Option<Avt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumberLevel {
    Single,
    Multiple,
    Any,
}

#[derive(Debug, Clone)]
pub(crate) struct NumberInstruction {
    pub(crate) level: NumberLevel,
    pub(crate) count: Option<Pattern>,
    pub(crate) from: Option<Pattern>,
    pub(crate) value: Option<Expression>,
    pub(crate) format: Avt,
    pub(crate) grouping_separator: Option<Avt>,
    pub(crate) grouping_size: Option<Avt>,
    pub(crate) span: SourceSpan,
}

/// A QName computed at runtime, with what's needed to resolve it.
#[derive(Debug, Clone)]
pub(crate) struct ComputedName {
    pub(crate) name: Avt,
    pub(crate) namespace: Option<Avt>,
    pub(crate) namespaces: Namespaces,
    /// Applies to unprefixed element names only.
    pub(crate) default_namespace: String,
}

#[derive(Debug, Clone)]
pub(crate) struct LiteralAttribute {
    pub(crate) name: ExpandedName,
    pub(crate) prefix: String,
    pub(crate) value: Avt,
}

#[derive(Debug, Clone)]
pub(crate) struct LiteralElement {
    pub(crate) name: ExpandedName,
    pub(crate) prefix: String,
    /// Namespace declarations copied to the result, as (prefix, uri).
    pub(crate) namespaces: Vec<(String, String)>,
    pub(crate) attributes: Vec<LiteralAttribute>,
    pub(crate) use_attribute_sets: Vec<ExpandedName>,
    pub(crate) body: Body,
    pub(crate) span: SourceSpan,
}

#[derive(Debug, Clone)]
pub(crate) enum Instruction {
    ApplyTemplates {
        select: Option<Expression>,
        mode: Option<ExpandedName>,
        sorts: Vec<Sort>,
        params: Vec<Binding>,
        span: SourceSpan,
    },
    ApplyImports {
        span: SourceSpan,
    },
    CallTemplate {
        name: ExpandedName,
        params: Vec<Binding>,
        span: SourceSpan,
    },
    ForEach {
        select: Expression,
        sorts: Vec<Sort>,
        body: Body,
    },
    If {
        test: Expression,
        body: Body,
    },
    Choose {
        whens: Vec<(Expression, Body)>,
        otherwise: Body,
    },
    Variable(Binding),
    Message {
        body: Body,
        terminate: bool,
        span: SourceSpan,
    },
    ValueOf {
        select: Expression,
    },
    Text(String),
    Copy {
        use_attribute_sets: Vec<ExpandedName>,
        body: Body,
        span: SourceSpan,
    },
    CopyOf {
        select: Expression,
    },
    Number(Box<NumberInstruction>),
    Element {
        name: Box<ComputedName>,
        use_attribute_sets: Vec<ExpandedName>,
        body: Body,
        span: SourceSpan,
    },
    Attribute {
        name: Box<ComputedName>,
        body: Body,
        span: SourceSpan,
    },
    Comment {
        body: Body,
    },
    ProcessingInstruction {
        name: Avt,
        body: Body,
        span: SourceSpan,
    },
    LiteralElement(Box<LiteralElement>),
}

#[derive(Debug, Clone)]
pub(crate) struct Template {
    pub(crate) params: Vec<Binding>,
    pub(crate) body: Body,
    pub(crate) precedence: usize,
}

/// One alternative of a template's match pattern, with its priority.
#[derive(Debug, Clone)]
pub(crate) struct Rule {
    pub(crate) pattern: Pattern,
    pub(crate) mode: Option<ExpandedName>,
    pub(crate) priority: Decimal,
    pub(crate) precedence: usize,
    /// Declaration order, used to break ties.
    pub(crate) position: usize,
    pub(crate) template: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct Global {
    pub(crate) binding: Binding,
    pub(crate) is_param: bool,
    pub(crate) precedence: usize,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyDefinition {
    pub(crate) pattern: Pattern,
    pub(crate) use_: Expression,
}

#[derive(Debug, Clone)]
pub(crate) struct AttributeSet {
    pub(crate) use_attribute_sets: Vec<ExpandedName>,
    pub(crate) attributes: Body,
}

/// An xsl:strip-space or xsl:preserve-space name test.
#[derive(Debug, Clone)]
pub(crate) struct SpaceRule {
    pub(crate) test: NodeTest,
    pub(crate) strip: bool,
    pub(crate) precedence: usize,
    pub(crate) priority: Decimal,
}

#[derive(Debug, Default)]
pub(crate) struct Program {
    pub(crate) templates: Vec<Template>,
    /// Sorted best first: by import precedence, then priority, then
    /// declaration order.
    pub(crate) rules: Vec<Rule>,
    pub(crate) named_templates: HashMap<ExpandedName, usize>,
    pub(crate) globals: HashMap<ExpandedName, Global>,
    pub(crate) keys: HashMap<ExpandedName, Vec<KeyDefinition>>,
    pub(crate) attribute_sets: HashMap<ExpandedName, Vec<AttributeSet>>,
    pub(crate) decimal_formats: HashMap<Option<ExpandedName>, DecimalFormat>,
    pub(crate) space_rules: Vec<SpaceRule>,
    pub(crate) output: OutputSettings,
    /// Location and text of the principal module, for `document('')`.
    pub(crate) uri: Option<String>,
    pub(crate) text: String,
}
