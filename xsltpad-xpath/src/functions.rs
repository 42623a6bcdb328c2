//! The XPath 1.0 core function library.

use xot::Node;

use crate::context::{Context, Host};
use crate::error::{Error, Result};
use crate::eval::sort_nodes;
use crate::name::XML_NAMESPACE;
use crate::node::{self, NodeKind};
use crate::value::Value;

const CORE_FUNCTIONS: [&str; 27] = [
    "last",
    "position",
    "count",
    "id",
    "local-name",
    "namespace-uri",
    "name",
    "string",
    "concat",
    "starts-with",
    "contains",
    "substring-before",
    "substring-after",
    "substring",
    "string-length",
    "normalize-space",
    "translate",
    "boolean",
    "not",
    "true",
    "false",
    "lang",
    "number",
    "sum",
    "floor",
    "ceiling",
    "round",
];

pub fn is_core_function(name: &str) -> bool {
    CORE_FUNCTIONS.contains(&name)
}

pub(crate) fn call(
    name: &str,
    arguments: Vec<Value>,
    context: &Context,
    host: &mut dyn Host,
) -> Result<Value> {
    let mut arguments = Arguments::new(arguments);
    let value = match name {
        "last" => {
            arguments.arity(0, 0)?;
            Value::Number(context.size as f64)
        }
        "position" => {
            arguments.arity(0, 0)?;
            Value::Number(context.position as f64)
        }
        "count" => {
            arguments.arity(1, 1)?;
            Value::Number(arguments.nodes()?.len() as f64)
        }
        "id" => {
            arguments.arity(1, 1)?;
            let argument = arguments.take();
            id(argument, context, host)
        }
        "local-name" | "namespace-uri" | "name" => {
            arguments.arity(0, 1)?;
            let node = if arguments.is_empty() {
                Some(context.node)
            } else {
                arguments.nodes()?.first().copied()
            };
            let xot = host.xot();
            Value::String(match node {
                None => String::new(),
                Some(node) => match name {
                    "local-name" => node::local_name(xot, node).to_string(),
                    "namespace-uri" => node::namespace_uri(xot, node).to_string(),
                    _ => node::qualified_name(xot, node),
                },
            })
        }
        "string" => {
            arguments.arity(0, 1)?;
            Value::String(arguments.string_or_context(context, host))
        }
        "concat" => {
            arguments.arity(2, usize::MAX)?;
            let xot = host.xot();
            let mut result = String::new();
            for value in arguments.values.iter() {
                result.push_str(&value.to_xpath_string(xot));
            }
            Value::String(result)
        }
        "starts-with" | "contains" | "substring-before" | "substring-after" => {
            arguments.arity(2, 2)?;
            let haystack = arguments.string(host);
            let needle = arguments.string(host);
            match name {
                "starts-with" => Value::Boolean(haystack.starts_with(&needle)),
                "contains" => Value::Boolean(haystack.contains(&needle)),
                "substring-before" => Value::String(
                    haystack
                        .find(&needle)
                        .map(|index| haystack[..index].to_string())
                        .unwrap_or_default(),
                ),
                _ => Value::String(
                    haystack
                        .find(&needle)
                        .map(|index| haystack[index + needle.len()..].to_string())
                        .unwrap_or_default(),
                ),
            }
        }
        "substring" => {
            arguments.arity(2, 3)?;
            let s = arguments.string(host);
            let start = arguments.number(host);
            let length = if arguments.is_empty() {
                None
            } else {
                Some(arguments.number(host))
            };
            Value::String(substring(&s, start, length))
        }
        "string-length" => {
            arguments.arity(0, 1)?;
            let s = arguments.string_or_context(context, host);
            Value::Number(s.chars().count() as f64)
        }
        "normalize-space" => {
            arguments.arity(0, 1)?;
            let s = arguments.string_or_context(context, host);
            Value::String(normalize_space(&s))
        }
        "translate" => {
            arguments.arity(3, 3)?;
            let s = arguments.string(host);
            let from = arguments.string(host);
            let to = arguments.string(host);
            Value::String(translate(&s, &from, &to))
        }
        "boolean" => {
            arguments.arity(1, 1)?;
            Value::Boolean(arguments.take().to_boolean())
        }
        "not" => {
            arguments.arity(1, 1)?;
            Value::Boolean(!arguments.take().to_boolean())
        }
        "true" => {
            arguments.arity(0, 0)?;
            Value::Boolean(true)
        }
        "false" => {
            arguments.arity(0, 0)?;
            Value::Boolean(false)
        }
        "lang" => {
            arguments.arity(1, 1)?;
            let language = arguments.string(host);
            Value::Boolean(lang(&language, context.node, host))
        }
        "number" => {
            arguments.arity(0, 1)?;
            if arguments.is_empty() {
                Value::Number(
                    Value::NodeSet(vec![context.node]).to_number(host.xot()),
                )
            } else {
                Value::Number(arguments.number(host))
            }
        }
        "sum" => {
            arguments.arity(1, 1)?;
            let xot = host.xot();
            let sum = arguments
                .nodes()?
                .iter()
                .map(|node| Value::NodeSet(vec![*node]).to_number(xot))
                .sum::<f64>();
            Value::Number(sum)
        }
        "floor" => {
            arguments.arity(1, 1)?;
            Value::Number(arguments.number(host).floor())
        }
        "ceiling" => {
            arguments.arity(1, 1)?;
            Value::Number(arguments.number(host).ceil())
        }
        "round" => {
            arguments.arity(1, 1)?;
            Value::Number(round(arguments.number(host)))
        }
        _ => return Err(Error::XPST0017),
    };
    Ok(value)
}

/// Arguments consumed front to back.
struct Arguments {
    values: std::collections::VecDeque<Value>,
}

impl Arguments {
    fn new(values: Vec<Value>) -> Self {
        Self {
            values: values.into(),
        }
    }

    fn arity(&self, min: usize, max: usize) -> Result<()> {
        if self.values.len() < min || self.values.len() > max {
            Err(Error::XPST0017)
        } else {
            Ok(())
        }
    }

    fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn take(&mut self) -> Value {
        self.values.pop_front().unwrap_or(Value::NodeSet(Vec::new()))
    }

    fn nodes(&mut self) -> Result<Vec<Node>> {
        self.take().into_nodes()
    }

    fn string(&mut self, host: &dyn Host) -> String {
        self.take().to_xpath_string(host.xot())
    }

    fn number(&mut self, host: &dyn Host) -> f64 {
        self.take().to_number(host.xot())
    }

    fn string_or_context(&mut self, context: &Context, host: &dyn Host) -> String {
        if self.is_empty() {
            node::string_value(host.xot(), context.node)
        } else {
            self.string(host)
        }
    }
}

fn id(argument: Value, context: &Context, host: &mut dyn Host) -> Value {
    let xot = host.xot();
    let tokens: Vec<String> = match &argument {
        Value::NodeSet(nodes) => nodes
            .iter()
            .flat_map(|node| {
                node::string_value(xot, *node)
                    .split_whitespace()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .collect(),
        other => other
            .to_xpath_string(xot)
            .split_whitespace()
            .map(|s| s.to_string())
            .collect(),
    };
    let root = node::root(xot, context.node);
    // without a DTD there are no ID typed attributes; xml:id and plain id
    // attributes are used instead
    let mut nodes: Vec<Node> = xot
        .descendants(root)
        .filter(|node| node::node_kind(xot, *node) == NodeKind::Element)
        .filter(|node| {
            node::attribute_value(xot, *node, XML_NAMESPACE, "id")
                .or_else(|| node::attribute_value(xot, *node, "", "id"))
                .is_some_and(|id| tokens.iter().any(|token| token == id))
        })
        .collect();
    sort_nodes(host, &mut nodes);
    Value::NodeSet(nodes)
}

fn lang(language: &str, node: Node, host: &dyn Host) -> bool {
    let xot = host.xot();
    let mut current = Some(node);
    while let Some(node) = current {
        if let Some(value) = node::attribute_value(xot, node, XML_NAMESPACE, "lang") {
            let value = value.to_lowercase();
            let language = language.to_lowercase();
            return value == language
                || value
                    .strip_prefix(&language)
                    .is_some_and(|rest| rest.starts_with('-'));
        }
        current = xot.parent(node);
    }
    false
}

pub(crate) fn substring(s: &str, start: f64, length: Option<f64>) -> String {
    let first = round(start);
    let last = match length {
        Some(length) => first + round(length),
        None => f64::INFINITY,
    };
    s.chars()
        .enumerate()
        .filter(|(i, _)| {
            let position = (*i + 1) as f64;
            position >= first && position < last
        })
        .map(|(_, c)| c)
        .collect()
}

pub fn normalize_space(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn translate(s: &str, from: &str, to: &str) -> String {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    s.chars()
        .filter_map(|c| match from.iter().position(|f| *f == c) {
            Some(index) => to.get(index).copied(),
            None => Some(c),
        })
        .collect()
}

/// Round half up, keeping NaN, infinities and negative zero.
pub fn round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else if (-0.5..0.0).contains(&n) {
        -0.0
    } else {
        (n + 0.5).floor()
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("12345", 2.0, Some(3.0), "234")]
    #[case("12345", 1.5, Some(2.6), "234")]
    #[case("12345", 0.0, Some(3.0), "12")]
    #[case("12345", f64::NAN, Some(3.0), "")]
    #[case("12345", 1.0, Some(f64::NAN), "")]
    #[case("12345", -42.0, Some(f64::INFINITY), "12345")]
    #[case("12345", f64::NEG_INFINITY, Some(f64::INFINITY), "")]
    #[case("12345", 2.0, None, "2345")]
    fn test_substring(
        #[case] s: &str,
        #[case] start: f64,
        #[case] length: Option<f64>,
        #[case] expected: &str,
    ) {
        assert_eq!(substring(s, start, length), expected);
    }

    #[test]
    fn test_translate() {
        assert_eq!(translate("bar", "abc", "ABC"), "BAr");
        assert_eq!(translate("--aaa--", "abc-", "ABC"), "AAA");
    }

    #[test]
    fn test_round() {
        assert_eq!(round(2.5), 3.0);
        assert_eq!(round(-2.5), -2.0);
        assert!(round(-0.25).is_sign_negative());
    }

    #[test]
    fn test_normalize_space() {
        assert_eq!(normalize_space("  a \n b  "), "a b");
    }
}
