use xot::{Node, SpanInfo, SpanInfoKey, Xot};

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("{0}")]
    Parse(#[from] xot::ParseError),
    #[error("line {line}, column {column} is outside the document")]
    Position { line: usize, column: usize },
    #[error("no element at line {line}, column {column}")]
    NoElement { line: usize, column: usize },
}

/// The byte offset of a 1-based line and column, with columns counted in
/// chars. The column just past the end of a line is allowed.
pub fn offset_of(text: &str, line: usize, column: usize) -> Option<usize> {
    if line == 0 || column == 0 {
        return None;
    }
    let start = if line == 1 {
        0
    } else {
        text.match_indices('\n').nth(line - 2)?.0 + 1
    };
    let content = &text[start..];
    let content = &content[..content.find('\n').unwrap_or(content.len())];
    if column - 1 == content.chars().count() {
        return Some(start + content.len());
    }
    content
        .char_indices()
        .nth(column - 1)
        .map(|(index, _)| start + index)
}

/// The absolute path of the innermost element at a 1-based line and column,
/// as `/a/b[2]/c`.
///
/// With `include_indexes` an element gets a position among its same-named
/// siblings, but only if it has any.
pub fn locate(
    xml: &str,
    line: usize,
    column: usize,
    include_indexes: bool,
) -> Result<String, LocateError> {
    let mut xot = Xot::new();
    let (root, spans) = xot.parse_with_span_info(xml)?;
    let offset = offset_of(xml, line, column).ok_or(LocateError::Position { line, column })?;
    let element = xot
        .descendants(root)
        .filter(|node| xot.is_element(*node))
        .filter(|node| {
            extent(xml, &spans, *node).is_some_and(|(start, end)| start <= offset && offset < end)
        })
        .last()
        .ok_or(LocateError::NoElement { line, column })?;
    Ok(absolute_path(&xot, element, include_indexes))
}

// From the `<` of the start tag to just past the `>` of the end tag (or of
// the start tag of an empty element).
fn extent(xml: &str, spans: &SpanInfo, element: Node) -> Option<(usize, usize)> {
    let name = spans.get(SpanInfoKey::ElementStart(element))?.range();
    let name_start = floor_char_boundary(xml, name.start);
    let start = if xml[name_start..].starts_with('<') {
        name_start
    } else {
        xml[..name_start].rfind('<')?
    };
    let last = match spans.get(SpanInfoKey::ElementEnd(element)) {
        Some(end) => end.range().end,
        None => name.end,
    };
    let from = floor_char_boundary(xml, last.saturating_sub(1));
    let end = from + xml[from..].find('>')? + 1;
    Some((start, end))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn absolute_path(xot: &Xot, element: Node, include_indexes: bool) -> String {
    let mut segments = Vec::new();
    let mut current = Some(element);
    while let Some(node) = current {
        if !xot.is_element(node) {
            break;
        }
        let mut segment = xsltpad_xpath::local_name(xot, node).to_string();
        if include_indexes {
            if let Some(index) = sibling_index(xot, node) {
                segment.push_str(&format!("[{}]", index));
            }
        }
        segments.push(segment);
        current = xot.parent(node);
    }
    segments.reverse();
    format!("/{}", segments.join("/"))
}

// 1-based, or `None` when no sibling shares the element's name.
fn sibling_index(xot: &Xot, element: Node) -> Option<usize> {
    let name = xot.element(element)?.name();
    let parent = xot.parent(element)?;
    let mut index = None;
    let mut count = 0;
    for sibling in xot.children(parent) {
        if xot.element(sibling).is_some_and(|e| e.name() == name) {
            count += 1;
            if sibling == element {
                index = Some(count);
            }
        }
    }
    if count > 1 {
        index
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const NESTED: &str = "<root>\n  <item>\n    <name>a</name>\n  </item>\n  <item>\n    <name>b</name>\n    <note/>\n  </item>\n</root>";

    #[rstest]
    #[case(1, 2, "/root")]
    #[case(2, 4, "/root/item[1]")]
    #[case(3, 12, "/root/item[1]/name")]
    #[case(6, 11, "/root/item[2]/name")]
    #[case(7, 6, "/root/item[2]/note")]
    #[case(8, 3, "/root/item[2]")]
    #[case(9, 1, "/root")]
    fn test_locate_with_indexes(#[case] line: usize, #[case] column: usize, #[case] expected: &str) {
        assert_eq!(locate(NESTED, line, column, true).unwrap(), expected);
    }

    #[rstest]
    #[case("<商品><名称/><名称/></商品>", 11, "/商品/名称[2]")]
    #[case("<商品><名称/><名称/></商品>", 2, "/商品")]
    #[case("<é><b/><b/></é>", 5, "/é/b[1]")]
    fn test_locate_non_ascii_names(#[case] xml: &str, #[case] column: usize, #[case] expected: &str) {
        assert_eq!(locate(xml, 1, column, true).unwrap(), expected);
    }

    #[test]
    fn test_locate_without_indexes() {
        assert_eq!(locate(NESTED, 6, 11, false).unwrap(), "/root/item/name");
    }

    #[test]
    fn test_namespaced_elements_use_local_names() {
        let xml = r#"<p:a xmlns:p="urn:p"><p:b/></p:a>"#;
        assert_eq!(locate(xml, 1, 24, true).unwrap(), "/a/b");
    }

    #[test]
    fn test_offset_of() {
        let text = "ab\néx\n";
        assert_eq!(offset_of(text, 1, 1), Some(0));
        assert_eq!(offset_of(text, 1, 3), Some(2));
        assert_eq!(offset_of(text, 2, 2), Some(5));
        assert_eq!(offset_of(text, 3, 1), Some(7));
        assert_eq!(offset_of(text, 1, 5), None);
        assert_eq!(offset_of(text, 4, 1), None);
        assert_eq!(offset_of(text, 0, 1), None);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            locate("<a>", 1, 1, true),
            Err(LocateError::Parse(_))
        ));
        assert!(matches!(
            locate("<a/>", 5, 1, true),
            Err(LocateError::Position { .. })
        ));
        assert!(matches!(
            locate("<!-- c -->\n<a/>", 1, 3, true),
            Err(LocateError::NoElement { .. })
        ));
    }
}
