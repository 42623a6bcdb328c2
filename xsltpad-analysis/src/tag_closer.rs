use tracing::debug;

use crate::markup::{tokenize, Markup};

/// The name of the tag to close when `</` has just been typed.
///
/// `cursor` is a char offset just past the `/`. The answer is the nearest
/// start tag before the `</` that hasn't been closed yet, prefix included.
/// Nothing is suggested when the text before the cursor can't be scanned.
pub fn closing_tag(text: &str, cursor: usize) -> Option<String> {
    let end = match text.char_indices().nth(cursor) {
        Some((index, _)) => index,
        None if text.chars().count() == cursor => text.len(),
        None => return None,
    };
    let before = text[..end].strip_suffix("</")?;
    let tokens = match tokenize(before) {
        Ok(tokens) => tokens,
        Err(position) => {
            debug!(position, "no closing tag suggestion, cannot scan markup");
            return None;
        }
    };
    let mut open: Vec<&str> = Vec::new();
    for token in tokens {
        match token {
            Markup::StartTag(tag) if !tag.self_closing => open.push(tag.name),
            Markup::EndTag(name) => {
                // an end tag without a start tag is left alone
                if let Some(position) = open.iter().rposition(|open| *open == name) {
                    open.truncate(position);
                }
            }
            _ => {}
        }
    }
    open.last().map(|name| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("<foo><bar></bar></", Some("foo"))]
    #[case("<foo><bar></", Some("bar"))]
    #[case("<xsl:template match='/'><xsl:if test='a &lt; b'></", Some("xsl:if"))]
    #[case("<a><b/></", Some("a"))]
    #[case("<a><!-- <b> --></", Some("a"))]
    #[case("<a><![CDATA[<b>]]></", Some("a"))]
    #[case("<?xml version='1.0'?><a></", Some("a"))]
    #[case("<a></a></", None)]
    #[case("</", None)]
    #[case("<a><b></c></", Some("b"))]
    #[case("<a><b x='1></", None)]
    fn test_closing_tag_at_end(#[case] text: &str, #[case] expected: Option<&str>) {
        let cursor = text.chars().count();
        assert_eq!(closing_tag(text, cursor).as_deref(), expected);
    }

    #[test]
    fn test_requires_slash_after_angle() {
        assert_eq!(closing_tag("<a><", 4), None);
        assert_eq!(closing_tag("<a>/", 4), None);
    }

    #[test]
    fn test_cursor_in_middle() {
        let text = "<a><b></</b></a>";
        assert_eq!(closing_tag(text, 8).as_deref(), Some("b"));
    }

    #[test]
    fn test_cursor_counts_chars() {
        let text = "<é><ü></";
        assert_eq!(closing_tag(text, 8).as_deref(), Some("ü"));
    }

    #[test]
    fn test_cursor_out_of_range() {
        assert_eq!(closing_tag("<a></", 10), None);
    }
}
