//! XSLT 1.0 match patterns.
//!
//! Patterns reuse the XPath tokens and node tests but only allow the child
//! and attribute axes. They're matched right to left, from the candidate
//! node up through its ancestors.

use xot::Node;

use crate::ast::{Axis, Expr, NodeTest};
use crate::context::{Context, Host};
use crate::error::{Error, Result, SpannedError};
use crate::eval::{apply_predicates, axis_nodes, evaluate_nodes, matches_node_test};
use crate::lexer::Token;
use crate::name::{ExpandedName, Namespaces};
use crate::node::{node_kind, NodeKind};
use crate::parser::Parser;

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub alternatives: Vec<PathPattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    pub anchor: Anchor,
    pub steps: Vec<StepPattern>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Anchor {
    /// The first step may be anywhere.
    Relative,
    /// `/` or `//`
    Root,
    /// `id('...')` or `key('...', '...')`
    Function(Expr),
}

/// How a step connects to the step (or anchor) before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepPattern {
    pub connector: Connector,
    pub axis: Axis,
    pub node_test: NodeTest,
    pub predicates: Vec<Expr>,
}

pub fn parse_pattern(input: &str, namespaces: &Namespaces) -> std::result::Result<Pattern, SpannedError> {
    let mut parser = Parser::new(input, namespaces)?;
    let mut alternatives = Vec::new();
    loop {
        alternatives.push(path_pattern(&mut parser)?);
        if !parser.eat(&Token::Pipe) {
            break;
        }
    }
    parser.expect_end()?;
    Ok(Pattern { alternatives })
}

fn path_pattern(parser: &mut Parser) -> std::result::Result<PathPattern, SpannedError> {
    let mut steps = Vec::new();
    let anchor = if parser.eat(&Token::Slash) {
        if parser.at_step() {
            steps_pattern(parser, Connector::Child, &mut steps)?;
        }
        Anchor::Root
    } else if parser.eat(&Token::DoubleSlash) {
        steps_pattern(parser, Connector::Descendant, &mut steps)?;
        Anchor::Root
    } else if let Some(function) = anchor_function(parser)? {
        if parser.eat(&Token::Slash) {
            steps_pattern(parser, Connector::Child, &mut steps)?;
        } else if parser.eat(&Token::DoubleSlash) {
            steps_pattern(parser, Connector::Descendant, &mut steps)?;
        }
        Anchor::Function(function)
    } else {
        steps_pattern(parser, Connector::Child, &mut steps)?;
        Anchor::Relative
    };
    Ok(PathPattern { anchor, steps })
}

fn anchor_function(parser: &mut Parser) -> std::result::Result<Option<Expr>, SpannedError> {
    let name = match parser.peek() {
        Some(Token::NCName(name))
            if (*name == "id" || *name == "key")
                && parser.peek_second() == Some(&Token::LeftParen) =>
        {
            name.to_string()
        }
        _ => return Ok(None),
    };
    let span = parser.span();
    parser.next();
    parser.next();
    let arguments = parser.arguments()?;
    let arity = if name == "id" { 1 } else { 2 };
    if arguments.len() != arity || !arguments.iter().all(|a| matches!(a, Expr::Literal(_))) {
        return Err(Error::XPST0003.with_span(span));
    }
    Ok(Some(Expr::FunctionCall(ExpandedName::local(name), arguments)))
}

fn steps_pattern(
    parser: &mut Parser,
    first: Connector,
    steps: &mut Vec<StepPattern>,
) -> std::result::Result<(), SpannedError> {
    steps.push(step_pattern(parser, first)?);
    loop {
        if parser.eat(&Token::Slash) {
            steps.push(step_pattern(parser, Connector::Child)?);
        } else if parser.eat(&Token::DoubleSlash) {
            steps.push(step_pattern(parser, Connector::Descendant)?);
        } else {
            return Ok(());
        }
    }
}

fn step_pattern(
    parser: &mut Parser,
    connector: Connector,
) -> std::result::Result<StepPattern, SpannedError> {
    let axis = if parser.eat(&Token::At) {
        Axis::Attribute
    } else if parser.peek_second() == Some(&Token::DoubleColon) {
        let span = parser.span();
        let axis = match parser.next() {
            Some(Token::NCName("child")) => Axis::Child,
            Some(Token::NCName("attribute")) => Axis::Attribute,
            _ => return Err(Error::XPST0003.with_span(span)),
        };
        parser.next();
        axis
    } else {
        Axis::Child
    };
    let node_test = parser.node_test()?;
    let predicates = parser.predicates()?;
    Ok(StepPattern {
        connector,
        axis,
        node_test,
        predicates,
    })
}

impl Pattern {
    pub fn matches(&self, node: Node, host: &mut dyn Host) -> Result<bool> {
        for alternative in &self.alternatives {
            if alternative.matches(node, host)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl PathPattern {
    pub fn matches(&self, node: Node, host: &mut dyn Host) -> Result<bool> {
        if self.steps.is_empty() {
            return match &self.anchor {
                Anchor::Root => Ok(node_kind(host.xot(), node) == NodeKind::Root),
                Anchor::Function(expr) => {
                    Ok(evaluate_nodes(expr, &Context::new(node), host)?.contains(&node))
                }
                Anchor::Relative => Ok(false),
            };
        }
        self.matches_step(self.steps.len() - 1, node, host)
    }

    fn matches_step(&self, index: usize, node: Node, host: &mut dyn Host) -> Result<bool> {
        let step = &self.steps[index];
        if !step.matches(node, host)? {
            return Ok(false);
        }
        let xot = host.xot();
        let candidates: Vec<Node> = match step.connector {
            Connector::Child => xot.parent(node).into_iter().collect(),
            Connector::Descendant => xot.axis(xot::Axis::Ancestor, node).collect(),
        };
        if index == 0 {
            return match &self.anchor {
                Anchor::Relative => Ok(true),
                Anchor::Root => Ok(candidates
                    .iter()
                    .any(|candidate| node_kind(xot, *candidate) == NodeKind::Root)),
                Anchor::Function(expr) => {
                    let anchors = evaluate_nodes(expr, &Context::new(node), host)?;
                    Ok(candidates.iter().any(|candidate| anchors.contains(candidate)))
                }
            };
        }
        for candidate in candidates {
            if self.matches_step(index - 1, candidate, host)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl StepPattern {
    fn matches(&self, node: Node, host: &mut dyn Host) -> Result<bool> {
        let xot = host.xot();
        let kind = node_kind(xot, node);
        let on_axis = match self.axis {
            Axis::Attribute => kind == NodeKind::Attribute,
            _ => kind != NodeKind::Attribute && kind != NodeKind::Root,
        };
        if !on_axis || !matches_node_test(xot, &self.node_test, self.axis, node) {
            return Ok(false);
        }
        if self.predicates.is_empty() {
            return Ok(true);
        }
        let parent = match xot.parent(node) {
            Some(parent) => parent,
            None => return Ok(false),
        };
        let siblings: Vec<Node> = axis_nodes(host, self.axis, parent)
            .into_iter()
            .filter(|sibling| matches_node_test(host.xot(), &self.node_test, self.axis, *sibling))
            .collect();
        Ok(apply_predicates(&self.predicates, siblings, host)?.contains(&node))
    }
}
