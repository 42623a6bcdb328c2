//! `xsl:output` settings and serialization of the result tree.

use ahash::{HashMap, HashMapExt};
use xot::output::xml::Parameters;
use xot::output::Indentation;
use xot::{NameId, NamespaceId, Node, PrefixId, Xot};
use xsltpad_xpath::{ExpandedName, NodeKind, XML_NAMESPACE};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMethod {
    #[default]
    Xml,
    Html,
    Text,
}

/// The serialization settings of a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutputSettings {
    /// `None` when the stylesheet doesn't say; the method is then xml,
    /// or html if the result starts with an `html` element.
    pub method: Option<OutputMethod>,
    pub indent: bool,
    pub omit_xml_declaration: bool,
    pub encoding: Option<String>,
    pub standalone: Option<bool>,
    pub doctype_public: Option<String>,
    pub doctype_system: Option<String>,
    pub cdata_section_elements: Vec<ExpandedName>,
}

impl OutputSettings {
    /// Apply a later xsl:output element over an earlier one.
    pub(crate) fn merge(&mut self, other: OutputSettings, specified: &[&str]) {
        for attribute in specified {
            match *attribute {
                "method" => self.method = other.method,
                "indent" => self.indent = other.indent,
                "omit-xml-declaration" => self.omit_xml_declaration = other.omit_xml_declaration,
                "encoding" => self.encoding = other.encoding.clone(),
                "standalone" => self.standalone = other.standalone,
                "doctype-public" => self.doctype_public = other.doctype_public.clone(),
                "doctype-system" => self.doctype_system = other.doctype_system.clone(),
                _ => {}
            }
        }
        self.cdata_section_elements
            .extend(other.cdata_section_elements);
    }
}

/// Serialize the children of the result container.
pub(crate) fn serialize(
    xot: &mut Xot,
    result: Node,
    settings: &OutputSettings,
    hints: &PrefixHints,
) -> Result<String, xot::Error> {
    let method = settings.method.unwrap_or_else(|| {
        let first_element = xot.children(result).find(|child| xot.is_element(*child));
        match first_element {
            Some(element) if is_html_element(xot, element) => OutputMethod::Html,
            _ => OutputMethod::Xml,
        }
    });
    if method == OutputMethod::Text {
        return Ok(xsltpad_xpath::string_value(xot, result));
    }

    fix_namespaces(xot, result, hints);

    let mut output = String::new();
    if method == OutputMethod::Xml && !settings.omit_xml_declaration {
        output.push_str(&format!(
            "<?xml version=\"1.0\" encoding=\"{}\"",
            settings.encoding.as_deref().unwrap_or("UTF-8")
        ));
        if let Some(standalone) = settings.standalone {
            output.push_str(if standalone {
                " standalone=\"yes\""
            } else {
                " standalone=\"no\""
            });
        }
        output.push_str("?>");
        if settings.indent {
            output.push('\n');
        }
    }

    let cdata_section_elements: Vec<NameId> = settings
        .cdata_section_elements
        .iter()
        .map(|name| name_id(xot, name))
        .collect();
    let children: Vec<Node> = xot.children(result).collect();
    let mut doctype_written = false;
    for (i, child) in children.iter().enumerate() {
        if i > 0 && settings.indent {
            output.push('\n');
        }
        if let Some(text) = xot.text_str(*child) {
            output.push_str(&escape_text(text));
            continue;
        }
        if xot.is_element(*child) && !doctype_written {
            doctype_written = true;
            if let Some(doctype) = doctype(xot, *child, settings) {
                output.push_str(&doctype);
                if settings.indent {
                    output.push('\n');
                }
            }
        }
        let parameters = Parameters {
            indentation: settings.indent.then(Indentation::default),
            cdata_section_elements: cdata_section_elements.clone(),
            ..Default::default()
        };
        output.push_str(&xot.serialize_xml_string(parameters, *child)?);
    }
    if settings.indent && !children.is_empty() {
        output.push('\n');
    }
    Ok(output)
}

fn is_html_element(xot: &Xot, element: Node) -> bool {
    xsltpad_xpath::name_parts(xot, element)
        .is_some_and(|(namespace, local)| namespace.is_empty() && local.eq_ignore_ascii_case("html"))
}

fn doctype(xot: &Xot, element: Node, settings: &OutputSettings) -> Option<String> {
    let system = settings.doctype_system.as_ref()?;
    let name = xsltpad_xpath::qualified_name(xot, element);
    Some(match &settings.doctype_public {
        Some(public) => format!("<!DOCTYPE {} PUBLIC \"{}\" \"{}\">", name, public, system),
        None => format!("<!DOCTYPE {} SYSTEM \"{}\">", name, system),
    })
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn name_id(xot: &mut Xot, name: &ExpandedName) -> NameId {
    if name.namespace.is_empty() {
        xot.add_name(&name.local)
    } else {
        let namespace = xot.add_namespace(&name.namespace);
        xot.add_name_ns(&name.local, namespace)
    }
}

/// Preferred prefixes for namespaces, gathered while the result is built.
pub(crate) type PrefixHints = HashMap<String, String>;

/// Declare every namespace used by an element or attribute name in the
/// result, so that serialization never meets an unbound namespace.
///
/// Declarations are added to the topmost element that needs them; the
/// result container itself is never serialized, so nothing is inherited
/// from it.
pub(crate) fn fix_namespaces(xot: &mut Xot, result: Node, hints: &PrefixHints) {
    let children: Vec<Node> = xot.children(result).collect();
    for child in children {
        if xot.is_element(child) {
            fix_element(xot, child, &HashMap::new(), hints);
        }
    }
}

fn fix_element(
    xot: &mut Xot,
    element: Node,
    inherited: &HashMap<PrefixId, NamespaceId>,
    hints: &PrefixHints,
) {
    let mut scope = inherited.clone();
    let declared: Vec<(PrefixId, NamespaceId)> = xot
        .namespaces(element)
        .iter()
        .map(|(prefix, namespace)| (prefix, *namespace))
        .collect();
    for (prefix, namespace) in declared {
        scope.insert(prefix, namespace);
    }

    let empty_prefix = xot.add_prefix("");
    let no_namespace = xot.add_namespace("");

    // the element name
    if let Some(element_value) = xot.element(element) {
        let name = element_value.name();
        let namespace = xot.namespace_for_name(name);
        let in_scope = scope.iter().any(|(_, bound)| *bound == namespace);
        if namespace == no_namespace {
            let default = scope.get(&empty_prefix).copied().unwrap_or(no_namespace);
            if default != no_namespace {
                declare(xot, element, &mut scope, empty_prefix, no_namespace);
            }
        } else if !in_scope {
            let uri = xot.namespace_str(namespace).to_string();
            let prefix = match hints.get(&uri) {
                Some(prefix) => xot.add_prefix(prefix),
                None => empty_prefix,
            };
            let prefix = if scope.contains_key(&prefix) {
                fresh_prefix(xot, &scope)
            } else {
                prefix
            };
            declare(xot, element, &mut scope, prefix, namespace);
        }
    }

    // attribute names need a non-empty prefix
    let attribute_names: Vec<NameId> = xot
        .axis(xot::Axis::Attribute, element)
        .filter_map(|attribute| match xot.value(attribute) {
            xot::Value::Attribute(attribute) => Some(attribute.name()),
            _ => None,
        })
        .collect();
    for name in attribute_names {
        let namespace = xot.namespace_for_name(name);
        // the xml prefix is always bound
        if namespace == no_namespace || xot.namespace_str(namespace) == XML_NAMESPACE {
            continue;
        }
        let bound = scope
            .iter()
            .any(|(prefix, bound)| *bound == namespace && *prefix != empty_prefix);
        if bound {
            continue;
        }
        let uri = xot.namespace_str(namespace).to_string();
        let hinted = hints
            .get(&uri)
            .filter(|prefix| !prefix.is_empty())
            .map(|prefix| xot.add_prefix(prefix));
        let prefix = match hinted {
            Some(prefix) if !scope.contains_key(&prefix) => prefix,
            _ => fresh_prefix(xot, &scope),
        };
        declare(xot, element, &mut scope, prefix, namespace);
    }

    let children: Vec<Node> = xot
        .children(element)
        .filter(|child| xsltpad_xpath::node_kind(xot, *child) == NodeKind::Element)
        .collect();
    for child in children {
        fix_element(xot, child, &scope, hints);
    }
}

fn declare(
    xot: &mut Xot,
    element: Node,
    scope: &mut HashMap<PrefixId, NamespaceId>,
    prefix: PrefixId,
    namespace: NamespaceId,
) {
    xot.namespaces_mut(element).insert(prefix, namespace);
    scope.insert(prefix, namespace);
}

fn fresh_prefix(xot: &mut Xot, scope: &HashMap<PrefixId, NamespaceId>) -> PrefixId {
    let mut i = 0;
    loop {
        let prefix = xot.add_prefix(&format!("ns{}", i));
        if !scope.contains_key(&prefix) {
            return prefix;
        }
        i += 1;
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_snapshot;

    use super::*;

    fn result_with(xot: &mut Xot, build: impl FnOnce(&mut Xot, Node)) -> Node {
        let result = xsltpad_xpath::new_fragment(xot);
        build(xot, result);
        result
    }

    #[test]
    fn test_declares_missing_namespace() {
        let mut xot = Xot::new();
        let result = result_with(&mut xot, |xot, result| {
            let namespace = xot.add_namespace("urn:a");
            let name = xot.add_name_ns("a", namespace);
            let a = xot.new_element(name);
            let b = xot.new_element(name);
            xot.append(a, b).unwrap();
            xot.append(result, a).unwrap();
        });
        let output = serialize(
            &mut xot,
            result,
            &OutputSettings {
                omit_xml_declaration: true,
                ..Default::default()
            },
            &PrefixHints::new(),
        )
        .unwrap();
        assert_snapshot!(output, @r#"<a xmlns="urn:a"><a/></a>"#);
    }

    #[test]
    fn test_attribute_gets_prefix() {
        let mut xot = Xot::new();
        let mut hints = PrefixHints::new();
        hints.insert("urn:x".to_string(), "x".to_string());
        let result = result_with(&mut xot, |xot, result| {
            let name = xot.add_name("a");
            let a = xot.new_element(name);
            let namespace = xot.add_namespace("urn:x");
            let attribute = xot.add_name_ns("at", namespace);
            xot.attributes_mut(a).insert(attribute, "1".to_string());
            xot.append(result, a).unwrap();
        });
        fix_namespaces(&mut xot, result, &hints);
        let a = xot.first_child(result).unwrap();
        let output = xot.serialize_xml_string(Parameters::default(), a).unwrap();
        assert_snapshot!(output, @r#"<a xmlns:x="urn:x" x:at="1"/>"#);
    }

    #[test]
    fn test_text_method() {
        let mut xot = Xot::new();
        let result = result_with(&mut xot, |xot, result| {
            let name = xot.add_name("a");
            let a = xot.new_element(name);
            let text = xot.new_text("hello");
            xot.append(a, text).unwrap();
            xot.append(result, a).unwrap();
        });
        let output = serialize(
            &mut xot,
            result,
            &OutputSettings {
                method: Some(OutputMethod::Text),
                ..Default::default()
            },
            &PrefixHints::new(),
        )
        .unwrap();
        assert_eq!(output, "hello");
    }

    #[test]
    fn test_declaration_and_top_level_text() {
        let mut xot = Xot::new();
        let result = result_with(&mut xot, |xot, result| {
            let text = xot.new_text("a < b");
            xot.append(result, text).unwrap();
        });
        let output = serialize(
            &mut xot,
            result,
            &OutputSettings::default(),
            &PrefixHints::new(),
        )
        .unwrap();
        assert_snapshot!(output, @r#"<?xml version="1.0" encoding="UTF-8"?>a &lt; b"#);
    }
}
