use xot::{Node, Xot};

use crate::error::{Error, Result};
use crate::node::string_value;

/// The result of evaluating an XPath 1.0 expression.
///
/// Node-sets are kept in document order without duplicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    NodeSet(Vec<Node>),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Value {
    pub fn to_boolean(&self) -> bool {
        match self {
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::String(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Boolean(b) => *b,
        }
    }

    pub fn to_number(&self, xot: &Xot) -> f64 {
        match self {
            Value::Number(n) => *n,
            Value::Boolean(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::String(s) => string_to_number(s),
            Value::NodeSet(_) => string_to_number(&self.to_xpath_string(xot)),
        }
    }

    /// The XPath `string()` conversion. For a node-set this is the
    /// string-value of its first node.
    pub fn to_xpath_string(&self, xot: &Xot) -> String {
        match self {
            Value::NodeSet(nodes) => nodes
                .first()
                .map(|node| string_value(xot, *node))
                .unwrap_or_default(),
            Value::String(s) => s.clone(),
            Value::Number(n) => number_to_string(*n),
            Value::Boolean(b) => b.to_string(),
        }
    }

    pub fn into_nodes(self) -> Result<Vec<Node>> {
        match self {
            Value::NodeSet(nodes) => Ok(nodes),
            _ => Err(Error::XPTY0004),
        }
    }

    pub fn is_node_set(&self) -> bool {
        matches!(self, Value::NodeSet(_))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<Vec<Node>> for Value {
    fn from(nodes: Vec<Node>) -> Self {
        Value::NodeSet(nodes)
    }
}

/// Convert a string to a number. XPath 1.0 only accepts an optional minus
/// sign followed by digits with an optional decimal point, surrounded by
/// whitespace; anything else is NaN.
pub fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'));
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let mut seen_digit = false;
    let mut seen_dot = false;
    for c in digits.chars() {
        match c {
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => return f64::NAN,
        }
    }
    if !seen_digit {
        return f64::NAN;
    }
    trimmed.parse().unwrap_or(f64::NAN)
}

/// Convert a number to a string. Integers have no decimal point, and no
/// exponent notation is ever used.
pub fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        }
    } else if n == 0.0 {
        "0".to_string()
    } else {
        // Display for f64 never uses an exponent and drops a zero fraction
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("1", 1.0)]
    #[case(" -2.5 ", -2.5)]
    #[case(".5", 0.5)]
    #[case("3.", 3.0)]
    fn test_string_to_number(#[case] input: &str, #[case] expected: f64) {
        assert_eq!(string_to_number(input), expected);
    }

    #[rstest]
    #[case("")]
    #[case("1e3")]
    #[case("+1")]
    #[case("inf")]
    #[case("NaN")]
    #[case("-")]
    #[case("1.2.3")]
    fn test_string_to_number_nan(#[case] input: &str) {
        assert!(string_to_number(input).is_nan());
    }

    #[rstest]
    #[case(1.0, "1")]
    #[case(-0.0, "0")]
    #[case(0.5, "0.5")]
    #[case(-12.25, "-12.25")]
    #[case(1e21, "1000000000000000000000")]
    #[case(f64::NAN, "NaN")]
    #[case(f64::NEG_INFINITY, "-Infinity")]
    fn test_number_to_string(#[case] input: f64, #[case] expected: &str) {
        assert_eq!(number_to_string(input), expected);
    }

    #[test]
    fn test_boolean_conversion() {
        assert!(!Value::Number(f64::NAN).to_boolean());
        assert!(!Value::String(String::new()).to_boolean());
        assert!(Value::String("false".to_string()).to_boolean());
        assert!(!Value::NodeSet(vec![]).to_boolean());
    }
}
