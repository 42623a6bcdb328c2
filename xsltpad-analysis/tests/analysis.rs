use insta::assert_snapshot;
use xsltpad_analysis::{closing_tag, extract_parameters, locate, pretty_print};

#[test]
fn test_pretty_print_is_stable() {
    let source = r#"<?xml version="1.0" encoding="utf-8"?>
<catalog><book id="b1"><title>Rust</title>
        <price>10</price></book>   <book id="b2"/></catalog>"#;
    let once = pretty_print(source).unwrap();
    assert_eq!(pretty_print(&once).unwrap(), once);
}

#[test]
fn test_xpath_of_second_sibling() {
    let xml = "<a><b/><b/></a>";
    // column 9 is the name of the second `b`
    assert_eq!(locate(xml, 1, 9, true).unwrap(), "/a/b[2]");
    assert_eq!(locate(xml, 1, 9, false).unwrap(), "/a/b");
    assert_eq!(locate(xml, 1, 5, true).unwrap(), "/a/b[1]");
}

#[test]
fn test_close_tag_after_typing_slash() {
    let mut text = String::from("<foo><bar></bar><");
    text.push('/');
    let cursor = text.chars().count();
    assert_eq!(closing_tag(&text, cursor).as_deref(), Some("foo"));
}

#[test]
fn test_parameters_of_stylesheet() {
    let stylesheet = r#"<xsl:stylesheet version="1.0" xmlns:xsl="http://www.w3.org/1999/XSL/Transform">
  <xsl:param name="title"/>
  <xsl:param name="count" select="3"/>
  <xsl:template match="/"><xsl:value-of select="$title"/></xsl:template>
</xsl:stylesheet>"#;
    assert_eq!(extract_parameters(stylesheet), vec!["title", "count"]);
}

#[test]
fn test_locate_error_message() {
    let error = locate("<a/>", 3, 1, true).unwrap_err();
    assert_snapshot!(error.to_string(), @"line 3, column 1 is outside the document");
}
