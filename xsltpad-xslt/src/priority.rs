// default priorities as in https://www.w3.org/TR/xslt#conflict
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use xsltpad_xpath::{Anchor, NodeTest, PathPattern, Pattern};

/// Split a pattern into its union alternatives, each with its default
/// priority. A template with a union pattern behaves like one template per
/// alternative.
pub(crate) fn default_priorities(pattern: &Pattern) -> Vec<(Pattern, Decimal)> {
    pattern
        .alternatives
        .iter()
        .map(|alternative| {
            (
                Pattern {
                    alternatives: vec![alternative.clone()],
                },
                default_priority_path(alternative),
            )
        })
        .collect()
}

fn default_priority_path(path: &PathPattern) -> Decimal {
    let default = dec!(0.5);
    if path.anchor != Anchor::Relative || path.steps.len() != 1 {
        return default;
    }
    let step = &path.steps[0];
    if !step.predicates.is_empty() {
        return default;
    }
    default_priority_node_test(&step.node_test)
}

pub(crate) fn default_priority_node_test(node_test: &NodeTest) -> Decimal {
    match node_test {
        NodeTest::Name(_) => dec!(0),
        NodeTest::ProcessingInstruction(Some(_)) => dec!(0),
        NodeTest::NamespaceWildcard(_) => dec!(-0.25),
        NodeTest::Wildcard
        | NodeTest::Node
        | NodeTest::Text
        | NodeTest::Comment
        | NodeTest::ProcessingInstruction(None) => dec!(-0.5),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use xsltpad_xpath::{parse_pattern, Namespaces};

    use super::*;

    fn one_default_priority(pattern: &str) -> Decimal {
        let namespaces = Namespaces::from_pairs([("ex", "http://example.com")]);
        let pattern = parse_pattern(pattern, &namespaces).unwrap();
        let priorities = default_priorities(&pattern);
        assert_eq!(priorities.len(), 1);
        priorities[0].1
    }

    #[rstest]
    #[case("foo", dec!(0))]
    #[case("@foo", dec!(0))]
    #[case("ex:foo", dec!(0))]
    #[case("processing-instruction('x')", dec!(0))]
    #[case("ex:*", dec!(-0.25))]
    #[case("@ex:*", dec!(-0.25))]
    #[case("*", dec!(-0.5))]
    #[case("@*", dec!(-0.5))]
    #[case("node()", dec!(-0.5))]
    #[case("text()", dec!(-0.5))]
    #[case("foo[1]", dec!(0.5))]
    #[case("a/b", dec!(0.5))]
    #[case("/", dec!(0.5))]
    #[case("/foo", dec!(0.5))]
    #[case("id('x')", dec!(0.5))]
    fn test_default_priority(#[case] pattern: &str, #[case] expected: Decimal) {
        assert_eq!(one_default_priority(pattern), expected);
    }

    #[test]
    fn test_union_is_multiple_patterns() {
        let pattern = parse_pattern("foo | bar/baz | *", &Namespaces::new()).unwrap();
        let priorities = default_priorities(&pattern)
            .into_iter()
            .map(|(_, priority)| priority)
            .collect::<Vec<_>>();
        assert_eq!(priorities, vec![dec!(0), dec!(0.5), dec!(-0.5)]);
    }
}
