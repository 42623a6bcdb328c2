use xot::{Node, NodeEdge, Value, Xot};
use xsltpad_xpath::NodeTest;

use crate::ast::SpaceRule;
use crate::names::XSL_NAMESPACE;

/// Remove what a stylesheet module ignores: comments, processing
/// instructions and whitespace-only text outside xsl:text and
/// `xml:space="preserve"`.
pub(crate) fn strip_stylesheet(xot: &mut Xot, node: Node) {
    // comments and processing instructions go first, so text around them
    // is merged before whitespace is looked at
    strip_comment_pi(xot, node);

    let mut to_remove = vec![];
    let mut xml_space_preserve = vec![];
    for edge in xot.traverse(node) {
        match edge {
            NodeEdge::Start(node) => match xot.value(node) {
                Value::Text(text) => {
                    if is_xml_whitespace(text.get())
                        && !is_preserved_in_stylesheet(xot, node, &xml_space_preserve)
                    {
                        to_remove.push(node);
                    }
                }
                Value::Element(_) => {
                    if let Some(preserve) = xml_space(xot, node) {
                        xml_space_preserve.push(preserve);
                    }
                }
                _ => {}
            },
            NodeEdge::End(node) => {
                if xot.is_element(node) && xml_space(xot, node).is_some() {
                    let _ = xml_space_preserve.pop();
                }
            }
        }
    }

    for node in to_remove {
        let _ = xot.remove(node);
    }
}

fn strip_comment_pi(xot: &mut Xot, node: Node) {
    let to_remove: Vec<Node> = xot
        .descendants(node)
        .filter(|node| {
            matches!(
                xot.value(*node),
                Value::Comment(..) | Value::ProcessingInstruction(..)
            )
        })
        .collect();
    for node in to_remove {
        let _ = xot.remove(node);
    }
}

fn is_preserved_in_stylesheet(xot: &Xot, node: Node, xml_space_preserve: &[bool]) -> bool {
    if let Some(parent) = xot.parent(node) {
        if let Some(element) = xot.element(parent) {
            let (local, namespace) = xot.name_ns_str(element.name());
            if namespace == XSL_NAMESPACE && local == "text" {
                return true;
            }
        }
    }
    xml_space_preserve.last().copied().unwrap_or(false)
}

/// `Some(true)` for `xml:space="preserve"`, `Some(false)` for "default".
fn xml_space(xot: &Xot, element: Node) -> Option<bool> {
    match xot.attributes(element).get(xot.xml_space_name())?.as_str() {
        "preserve" => Some(true),
        "default" => Some(false),
        _ => None,
    }
}

/// Apply xsl:strip-space and xsl:preserve-space to a source document.
pub(crate) fn strip_source(xot: &mut Xot, node: Node, rules: &[SpaceRule]) {
    if rules.is_empty() {
        return;
    }
    let mut to_remove = vec![];
    let mut xml_space_preserve = vec![];
    for edge in xot.traverse(node) {
        match edge {
            NodeEdge::Start(node) => match xot.value(node) {
                Value::Text(text) => {
                    if is_xml_whitespace(text.get())
                        && !xml_space_preserve.last().copied().unwrap_or(false)
                        && xot
                            .parent(node)
                            .is_some_and(|parent| is_stripped(xot, parent, rules))
                    {
                        to_remove.push(node);
                    }
                }
                Value::Element(_) => {
                    if let Some(preserve) = xml_space(xot, node) {
                        xml_space_preserve.push(preserve);
                    }
                }
                _ => {}
            },
            NodeEdge::End(node) => {
                if xot.is_element(node) && xml_space(xot, node).is_some() {
                    let _ = xml_space_preserve.pop();
                }
            }
        }
    }
    for node in to_remove {
        let _ = xot.remove(node);
    }
}

fn is_stripped(xot: &Xot, element: Node, rules: &[SpaceRule]) -> bool {
    let (namespace, local) = match xsltpad_xpath::name_parts(xot, element) {
        Some(parts) => parts,
        None => return false,
    };
    // the last of the best matching rules wins
    let mut best: Option<&SpaceRule> = None;
    for rule in rules {
        let matches = match &rule.test {
            NodeTest::Name(name) => name.matches(namespace, local),
            NodeTest::NamespaceWildcard(uri) => uri == namespace,
            NodeTest::Wildcard => true,
            _ => false,
        };
        if !matches {
            continue;
        }
        let better = match best {
            None => true,
            Some(best) => (rule.precedence, rule.priority) >= (best.precedence, best.priority),
        };
        if better {
            best = Some(rule);
        }
    }
    best.is_some_and(|rule| rule.strip)
}

fn is_xml_whitespace_char(c: char) -> bool {
    matches!(c, '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}')
}

pub(crate) fn is_xml_whitespace(s: &str) -> bool {
    s.chars().all(is_xml_whitespace_char)
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use xsltpad_xpath::ExpandedName;

    use super::*;

    #[test]
    fn test_remove_comments_and_processing_instructions() {
        let mut xot = Xot::new();
        let root = xot.parse(r#"<doc><!--comment--><p>A<?pi?>B</p></doc>"#).unwrap();
        strip_stylesheet(&mut xot, root);
        assert_eq!(xot.to_string(root).unwrap(), "<doc><p>AB</p></doc>");
    }

    #[test]
    fn test_whitespace_kept_inside_xsl_text() {
        let mut xot = Xot::new();
        let root = xot
            .parse(r#"<doc xmlns:xsl="http://www.w3.org/1999/XSL/Transform"> <xsl:text>   </xsl:text></doc>"#)
            .unwrap();
        strip_stylesheet(&mut xot, root);
        assert_eq!(
            xot.to_string(root).unwrap(),
            r#"<doc xmlns:xsl="http://www.w3.org/1999/XSL/Transform"><xsl:text>   </xsl:text></doc>"#
        );
    }

    #[test]
    fn test_whitespace_kept_inside_xml_space_preserve() {
        let mut xot = Xot::new();
        let root = xot
            .parse(r#"<doc><p xml:space="preserve">   </p><p>  </p></doc>"#)
            .unwrap();
        strip_stylesheet(&mut xot, root);
        assert_eq!(
            xot.to_string(root).unwrap(),
            r#"<doc><p xml:space="preserve">   </p><p/></doc>"#
        );
    }

    fn rule(test: NodeTest, strip: bool) -> SpaceRule {
        SpaceRule {
            test,
            strip,
            precedence: 0,
            priority: dec!(0),
        }
    }

    #[test]
    fn test_strip_source() {
        let mut xot = Xot::new();
        let root = xot.parse("<doc> <a> </a> <b> </b> </doc>").unwrap();
        let rules = [
            rule(NodeTest::Wildcard, true),
            rule(NodeTest::Name(ExpandedName::local("b")), false),
        ];
        strip_source(&mut xot, root, &rules);
        assert_eq!(xot.to_string(root).unwrap(), "<doc><a/><b> </b></doc>");
    }
}
