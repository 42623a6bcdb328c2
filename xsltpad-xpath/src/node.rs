//! Node classification and accessors over the Xot arena.
//!
//! Result tree fragments are kept under a container element in a reserved
//! namespace, which XPath sees as a root node.

use xot::{Node, Xot};

pub const FRAGMENT_NAMESPACE: &str = "urn:x-xsltpad:fragment";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
    Namespace,
}

/// Create an empty container for a result tree fragment.
pub fn new_fragment(xot: &mut Xot) -> Node {
    let namespace = xot.add_namespace(FRAGMENT_NAMESPACE);
    let name = xot.add_name_ns("fragment", namespace);
    xot.new_element(name)
}

pub fn is_fragment(xot: &Xot, node: Node) -> bool {
    match xot.element(node) {
        Some(element) => xot.name_ns_str(element.name()).1 == FRAGMENT_NAMESPACE,
        None => false,
    }
}

pub fn is_document(xot: &Xot, node: Node) -> bool {
    matches!(xot.value(node), xot::Value::Document)
}

pub fn node_kind(xot: &Xot, node: Node) -> NodeKind {
    if xot.is_element(node) {
        if is_fragment(xot, node) {
            NodeKind::Root
        } else {
            NodeKind::Element
        }
    } else if xot.is_text(node) {
        NodeKind::Text
    } else if xot.is_attribute_node(node) {
        NodeKind::Attribute
    } else if xot.is_comment(node) {
        NodeKind::Comment
    } else if xot.is_processing_instruction(node) {
        NodeKind::ProcessingInstruction
    } else if xot.is_namespace_node(node) {
        NodeKind::Namespace
    } else {
        NodeKind::Root
    }
}

/// The topmost ancestor of a node: a document node or a fragment container.
pub fn root(xot: &Xot, node: Node) -> Node {
    let mut current = node;
    while let Some(parent) = xot.parent(current) {
        current = parent;
    }
    current
}

/// The string-value of a node, as XPath 1.0 defines it.
pub fn string_value(xot: &Xot, node: Node) -> String {
    match xot.value(node) {
        xot::Value::Text(text) => text.get().to_string(),
        xot::Value::Attribute(attribute) => attribute.value().to_string(),
        xot::Value::Comment(comment) => comment.get().to_string(),
        xot::Value::ProcessingInstruction(pi) => pi.data().unwrap_or("").to_string(),
        xot::Value::Namespace(namespace) => xot.namespace_str(namespace.namespace()).to_string(),
        _ => {
            let mut result = String::new();
            for descendant in xot.descendants(node) {
                if let Some(text) = xot.text_str(descendant) {
                    result.push_str(text);
                }
            }
            result
        }
    }
}

/// Namespace URI and local name of an element, attribute or processing
/// instruction. Other nodes have no name.
pub fn name_parts(xot: &Xot, node: Node) -> Option<(&str, &str)> {
    let name = match xot.value(node) {
        xot::Value::Element(element) => element.name(),
        xot::Value::Attribute(attribute) => attribute.name(),
        xot::Value::ProcessingInstruction(pi) => pi.target(),
        xot::Value::Namespace(namespace) => return Some(("", xot.prefix_str(namespace.prefix()))),
        _ => return None,
    };
    let (local, namespace) = xot.name_ns_str(name);
    Some((namespace, local))
}

pub fn local_name(xot: &Xot, node: Node) -> &str {
    name_parts(xot, node).map(|(_, local)| local).unwrap_or("")
}

pub fn namespace_uri(xot: &Xot, node: Node) -> &str {
    match node_kind(xot, node) {
        NodeKind::Element | NodeKind::Attribute => {
            name_parts(xot, node).map(|(ns, _)| ns).unwrap_or("")
        }
        _ => "",
    }
}

/// The QName of a node as written, using a prefix in scope for its
/// namespace.
pub fn qualified_name(xot: &Xot, node: Node) -> String {
    let (namespace, local) = match name_parts(xot, node) {
        Some(parts) => parts,
        None => return String::new(),
    };
    if namespace.is_empty() {
        return local.to_string();
    }
    let context = match node_kind(xot, node) {
        NodeKind::Attribute => xot.parent(node).unwrap_or(node),
        _ => node,
    };
    let prefix = xot
        .namespace(namespace)
        .and_then(|namespace_id| xot.prefix_for_namespace(context, namespace_id))
        .map(|prefix| xot.prefix_str(prefix))
        .unwrap_or("");
    if prefix.is_empty() {
        local.to_string()
    } else {
        format!("{}:{}", prefix, local)
    }
}

/// The value of the attribute with the given expanded name.
pub fn attribute_value<'a>(
    xot: &'a Xot,
    element: Node,
    namespace: &str,
    local: &str,
) -> Option<&'a str> {
    for attribute in xot.axis(xot::Axis::Attribute, element) {
        if let xot::Value::Attribute(value) = xot.value(attribute) {
            let (attribute_local, attribute_namespace) = xot.name_ns_str(value.name());
            if attribute_local == local && attribute_namespace == namespace {
                return Some(value.value());
            }
        }
    }
    None
}

/// The namespace bindings in scope for a node, the default namespace
/// included under the empty prefix. Nearer declarations shadow outer ones.
pub fn in_scope_namespaces(xot: &Xot, node: Node) -> Vec<(String, String)> {
    let mut bindings: Vec<(String, String)> = Vec::new();
    for ancestor in xot.axis(xot::Axis::AncestorOrSelf, node) {
        if !xot.is_element(ancestor) {
            continue;
        }
        for (prefix, namespace) in xot.namespaces(ancestor).iter() {
            let prefix = xot.prefix_str(prefix);
            if bindings.iter().all(|(bound, _)| bound != prefix) {
                bindings.push((prefix.to_string(), xot.namespace_str(*namespace).to_string()));
            }
        }
    }
    bindings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_and_string_value() {
        let mut xot = Xot::new();
        let doc = xot
            .parse(r#"<a x="1">hello <b>world</b><!--c--></a>"#)
            .unwrap();
        let a = xot.document_element(doc).unwrap();
        assert_eq!(node_kind(&xot, doc), NodeKind::Root);
        assert_eq!(node_kind(&xot, a), NodeKind::Element);
        assert_eq!(string_value(&xot, doc), "hello world");
        assert_eq!(attribute_value(&xot, a, "", "x"), Some("1"));
        assert_eq!(root(&xot, a), doc);
    }

    #[test]
    fn test_fragment_is_root() {
        let mut xot = Xot::new();
        let fragment = new_fragment(&mut xot);
        let text = xot.new_text("x");
        xot.append(fragment, text).unwrap();
        assert_eq!(node_kind(&xot, fragment), NodeKind::Root);
        assert_eq!(root(&xot, text), fragment);
        assert_eq!(string_value(&xot, fragment), "x");
    }

    #[test]
    fn test_in_scope_namespaces() {
        let mut xot = Xot::new();
        let doc = xot
            .parse(r#"<a xmlns="urn:a" xmlns:p="urn:p"><b xmlns:p="urn:q"/></a>"#)
            .unwrap();
        let a = xot.document_element(doc).unwrap();
        let b = xot.first_child(a).unwrap();
        let mut bindings = in_scope_namespaces(&xot, b);
        bindings.sort();
        assert_eq!(
            bindings,
            vec![
                ("".to_string(), "urn:a".to_string()),
                ("p".to_string(), "urn:q".to_string())
            ]
        );
    }

    #[test]
    fn test_qualified_name() {
        let mut xot = Xot::new();
        let doc = xot
            .parse(r#"<ex:a xmlns:ex="http://example.com"/>"#)
            .unwrap();
        let a = xot.document_element(doc).unwrap();
        assert_eq!(qualified_name(&xot, a), "ex:a");
        assert_eq!(local_name(&xot, a), "a");
        assert_eq!(namespace_uri(&xot, a), "http://example.com");
    }
}
