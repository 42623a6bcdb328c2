use xot::output::xml::Parameters;
use xot::output::Indentation;
use xot::{Node, Xot};
use xsltpad_xpath::XML_NAMESPACE;

#[derive(Debug, thiserror::Error)]
pub enum PrettyPrintError {
    #[error("{0}")]
    Parse(#[from] xot::ParseError),
    #[error("{0}")]
    Serialize(#[from] xot::Error),
}

/// Re-indent an XML document.
///
/// Whitespace-only text is dropped first, except under
/// `xml:space="preserve"`, so printing an already printed document gives
/// the same text. The XML declaration and any doctype are not kept.
pub fn pretty_print(xml: &str) -> Result<String, PrettyPrintError> {
    let mut xot = Xot::new();
    let root = xot.parse(xml)?;
    strip_whitespace(&mut xot, root)?;
    let parameters = Parameters {
        indentation: Some(Indentation::default()),
        ..Default::default()
    };
    Ok(xot.serialize_xml_string(parameters, root)?)
}

fn strip_whitespace(xot: &mut Xot, root: Node) -> Result<(), xot::Error> {
    let blank: Vec<Node> = xot
        .descendants(root)
        .filter(|node| {
            xot.text_str(*node)
                .is_some_and(|text| text.trim().is_empty())
                && !preserves_space(xot, *node)
        })
        .collect();
    for node in blank {
        xot.remove(node)?;
    }
    Ok(())
}

fn preserves_space(xot: &Xot, node: Node) -> bool {
    xot.ancestors(node)
        .filter(|ancestor| xot.is_element(*ancestor))
        .find_map(|element| xsltpad_xpath::attribute_value(xot, element, XML_NAMESPACE, "space"))
        .is_some_and(|space| space == "preserve")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indents_nested_elements() {
        let printed = pretty_print("<?xml version=\"1.0\"?><a><b/><b>x</b></a>").unwrap();
        let lines: Vec<&str> = printed.lines().collect();
        assert_eq!(
            lines.iter().map(|line| line.trim()).collect::<Vec<_>>(),
            vec!["<a>", "<b/>", "<b>x</b>", "</a>"]
        );
        assert!(lines[1].starts_with(' '));
        assert!(!printed.contains("<?xml"));
    }

    #[test]
    fn test_idempotent() {
        let source = "<root>\n\n      <item   id='1'>one</item><item id=\"2\"><sub/>\n</item>\n</root>";
        let once = pretty_print(source).unwrap();
        let twice = pretty_print(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_preserved_space_is_kept() {
        let printed = pretty_print("<a><b xml:space=\"preserve\"> </b></a>").unwrap();
        assert!(printed.contains("> </b>"));
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(
            pretty_print("<a><b></a>"),
            Err(PrettyPrintError::Parse(_))
        ));
    }
}
