use std::collections::HashMap;
use std::io;

use insta::assert_snapshot;
use rstest::rstest;
use xsltpad_xpath::{Error as XPathError, SpannedError};
use xsltpad_xslt::{transform, Error, Loaded, NoResolver, Resolver, Stylesheet};

const XSL: &str = r#"xmlns:xsl="http://www.w3.org/1999/XSL/Transform""#;

/// Resolves hrefs against an in-memory set of documents.
#[derive(Default)]
struct MapResolver {
    documents: HashMap<String, String>,
}

impl MapResolver {
    fn with(mut self, href: &str, text: &str) -> Self {
        self.documents.insert(href.to_string(), text.to_string());
        self
    }
}

impl Resolver for MapResolver {
    fn load(&self, href: &str, _base: Option<&str>) -> io::Result<Loaded> {
        match self.documents.get(href) {
            Some(text) => Ok(Loaded {
                uri: href.to_string(),
                text: text.clone(),
            }),
            None => Err(io::Error::new(io::ErrorKind::NotFound, href.to_string())),
        }
    }
}

fn stylesheet(body: &str) -> String {
    format!(
        r#"<xsl:stylesheet version="1.0" {}>{}</xsl:stylesheet>"#,
        XSL, body
    )
}

fn text_stylesheet(body: &str) -> String {
    stylesheet(&format!(r#"<xsl:output method="text"/>{}"#, body))
}

fn run(xslt: &str, xml: &str) -> String {
    transform(xslt, xml, &[], &NoResolver).unwrap()
}

fn run_error(xslt: &str, xml: &str) -> Error {
    transform(xslt, xml, &[], &NoResolver).unwrap_err()
}

fn code(error: &Error) -> Option<XPathError> {
    match error {
        Error::Spanned(SpannedError { error, .. }) => Some(*error),
        _ => None,
    }
}

#[test]
fn test_identity() {
    let xslt = stylesheet(
        r#"<xsl:output omit-xml-declaration="yes"/>
        <xsl:template match="@*|node()">
          <xsl:copy><xsl:apply-templates select="@*|node()"/></xsl:copy>
        </xsl:template>"#,
    );
    assert_snapshot!(
        run(&xslt, r#"<a x="1"><b>text</b><!--c--></a>"#),
        @r#"<a x="1"><b>text</b><!--c--></a>"#
    );
}

#[test]
fn test_xml_declaration_and_attribute() {
    let xslt = stylesheet(
        r#"<xsl:template match="/"><out><xsl:attribute name="n">1</xsl:attribute>x</out></xsl:template>"#,
    );
    assert_snapshot!(
        run(&xslt, "<doc/>"),
        @r#"<?xml version="1.0" encoding="UTF-8"?><out n="1">x</out>"#
    );
}

#[test]
fn test_parameter() {
    let xslt = Stylesheet::compile(
        &text_stylesheet(
            r#"<xsl:param name="answer" select="'none'"/>
            <xsl:template match="/"><xsl:value-of select="$answer"/></xsl:template>"#,
        ),
        None,
        &NoResolver,
    )
    .unwrap();
    let parameters = vec![("answer".to_string(), "42".to_string())];
    assert_eq!(
        xslt.transform("<doc/>", &parameters, &NoResolver).unwrap(),
        "42"
    );
    assert_eq!(xslt.transform("<doc/>", &[], &NoResolver).unwrap(), "none");
    // unknown parameters are ignored
    let unknown = vec![("other".to_string(), "1".to_string())];
    assert_eq!(
        xslt.transform("<doc/>", &unknown, &NoResolver).unwrap(),
        "none"
    );
}

#[test]
fn test_include_and_import() {
    let resolver = MapResolver::default()
        .with(
            "base.xsl",
            &stylesheet(r#"<xsl:template match="item"><xsl:value-of select="."/></xsl:template>"#),
        )
        .with(
            "part.xsl",
            &stylesheet(r#"<xsl:template name="part">!</xsl:template>"#),
        );
    let main = text_stylesheet(
        r#"<xsl:import href="base.xsl"/>
        <xsl:include href="part.xsl"/>
        <xsl:template match="item">[<xsl:apply-imports/>]</xsl:template>
        <xsl:template match="/">
          <xsl:apply-templates select="//item"/>
          <xsl:call-template name="part"/>
        </xsl:template>"#,
    );
    let xslt = Stylesheet::compile(&main, Some("main.xsl"), &resolver).unwrap();
    assert_eq!(
        xslt.transform("<list><item>a</item><item>b</item></list>", &[], &resolver)
            .unwrap(),
        "[a][b]!"
    );
}

#[test]
fn test_circular_include() {
    let main = stylesheet(r#"<xsl:include href="main.xsl"/>"#);
    let resolver = MapResolver::default().with("main.xsl", &main);
    let error = Stylesheet::compile(&main, Some("main.xsl"), &resolver).unwrap_err();
    assert_eq!(code(&error), Some(XPathError::XTSE0180));
}

#[test]
fn test_missing_include() {
    let main = stylesheet(r#"<xsl:include href="missing.xsl"/>"#);
    let error = Stylesheet::compile(&main, None, &MapResolver::default()).unwrap_err();
    assert!(matches!(error, Error::Load { ref href, .. } if href == "missing.xsl"));
}

#[test]
fn test_document() {
    let resolver = MapResolver::default().with("other.xml", r#"<doc title="Other"/>"#);
    let xslt = text_stylesheet(
        r#"<xsl:template match="/">
          <xsl:value-of select="document('other.xml')/doc/@title"/>
          <xsl:text>,</xsl:text>
          <xsl:value-of select="count(document('')//xsl:template)"/>
        </xsl:template>"#,
    );
    assert_eq!(
        transform(&xslt, "<doc/>", &[], &resolver).unwrap(),
        "Other,1"
    );
}

#[test]
fn test_key() {
    let xslt = text_stylesheet(
        r#"<xsl:key name="by-type" match="item" use="@type"/>
        <xsl:template match="/">
          <xsl:for-each select="key('by-type', 'fruit')"><xsl:value-of select="."/>,</xsl:for-each>
        </xsl:template>"#,
    );
    let xml = r#"<list><item type="fruit">apple</item><item type="veg">leek</item><item type="fruit">pear</item></list>"#;
    assert_eq!(run(&xslt, xml), "apple,pear,");
}

#[rstest]
#[case(r#"data-type="number" order="descending""#, "<r><n>2</n><n>10</n><n>1</n></r>", "10,2,1,")]
#[case(r#"data-type="number""#, "<r><n>2</n><n>10</n><n>1</n></r>", "1,2,10,")]
#[case("", "<r><n>2</n><n>10</n><n>1</n></r>", "1,10,2,")]
#[case("", "<r><n>b</n><n>B</n><n>a</n></r>", "a,B,b,")]
#[case(r#"case-order="lower-first""#, "<r><n>b</n><n>B</n><n>a</n></r>", "a,b,B,")]
fn test_sort(#[case] attributes: &str, #[case] xml: &str, #[case] expected: &str) {
    let xslt = text_stylesheet(&format!(
        r#"<xsl:template match="/">
          <xsl:for-each select="//n"><xsl:sort select="." {}/><xsl:value-of select="."/>,</xsl:for-each>
        </xsl:template>"#,
        attributes
    ));
    assert_eq!(run(&xslt, xml), expected);
}

#[test]
fn test_number_single() {
    let xslt = text_stylesheet(
        r#"<xsl:template match="/"><xsl:apply-templates select="//item"/></xsl:template>
        <xsl:template match="item"><xsl:number/>.<xsl:value-of select="."/>;</xsl:template>"#,
    );
    assert_eq!(
        run(&xslt, "<list><item>a</item><skip/><item>b</item></list>"),
        "1.a;2.b;"
    );
}

#[test]
fn test_number_multiple() {
    let xslt = text_stylesheet(
        r#"<xsl:template match="section">
          <xsl:number level="multiple" count="section" format="1.1"/>
          <xsl:text> </xsl:text>
          <xsl:apply-templates/>
        </xsl:template>"#,
    );
    assert_eq!(
        run(&xslt, "<doc><section><section/><section/></section></doc>"),
        "1 1.1 1.2 "
    );
}

#[test]
fn test_named_template_parameters() {
    let xslt = text_stylesheet(
        r#"<xsl:template name="greet"><xsl:param name="who" select="'world'"/>Hello <xsl:value-of select="$who"/>!</xsl:template>
        <xsl:template match="/">
          <xsl:call-template name="greet"/>
          <xsl:text>/</xsl:text>
          <xsl:call-template name="greet"><xsl:with-param name="who" select="'you'"/></xsl:call-template>
        </xsl:template>"#,
    );
    assert_eq!(run(&xslt, "<doc/>"), "Hello world!/Hello you!");
}

#[test]
fn test_result_tree_fragment_as_node_set() {
    let xslt = text_stylesheet(
        r#"<xsl:variable name="v"><a>1</a><a>2</a></xsl:variable>
        <xsl:template match="/"><xsl:value-of select="count($v/a)"/></xsl:template>"#,
    );
    assert_eq!(run(&xslt, "<doc/>"), "2");
}

#[test]
fn test_built_in_rules_in_mode() {
    let xslt = text_stylesheet(
        r#"<xsl:template match="/"><xsl:apply-templates mode="m"/></xsl:template>"#,
    );
    assert_eq!(run(&xslt, "<a>x<b>y</b></a>"), "xy");
}

#[test]
fn test_simplified_stylesheet() {
    let xslt = format!(
        r#"<html xsl:version="1.0" {}><body><xsl:value-of select="/doc/title"/></body></html>"#,
        XSL
    );
    assert_snapshot!(
        run(&xslt, "<doc><title>Hi</title></doc>"),
        @"<html><body>Hi</body></html>"
    );
}

#[test]
fn test_result_namespaces() {
    let xslt = stylesheet(
        r#"<xsl:output omit-xml-declaration="yes"/>
        <xsl:template match="/"><x:root xmlns:x="urn:x"><xsl:element name="x:child"/></x:root></xsl:template>"#,
    );
    assert_snapshot!(
        run(&xslt, "<doc/>"),
        @r#"<x:root xmlns:x="urn:x"><x:child/></x:root>"#
    );
}

#[test]
fn test_copy_of() {
    let xslt = stylesheet(
        r#"<xsl:output omit-xml-declaration="yes"/>
        <xsl:template match="/"><out><xsl:copy-of select="//b"/></out></xsl:template>"#,
    );
    assert_snapshot!(
        run(&xslt, r#"<a><b k="v">one</b><b>two</b></a>"#),
        @r#"<out><b k="v">one</b><b>two</b></out>"#
    );
}

#[test]
fn test_message_terminates() {
    let xslt = stylesheet(
        r#"<xsl:template match="/"><xsl:message terminate="yes">stop <xsl:value-of select="name(*)"/></xsl:message></xsl:template>"#,
    );
    let error = run_error(&xslt, "<root/>");
    assert!(matches!(error, Error::Terminated(ref message) if message == "stop root"));
}

#[test]
fn test_message_continues() {
    let xslt = text_stylesheet(
        r#"<xsl:template match="/"><xsl:message>note</xsl:message>done</xsl:template>"#,
    );
    assert_eq!(run(&xslt, "<root/>"), "done");
}

#[test]
fn test_circular_globals() {
    let xslt = stylesheet(
        r#"<xsl:variable name="a" select="$b"/>
        <xsl:variable name="b" select="$a"/>
        <xsl:template match="/"/>"#,
    );
    assert_eq!(
        code(&run_error(&xslt, "<doc/>")),
        Some(XPathError::XTDE0640)
    );
}

#[test]
fn test_unknown_named_template() {
    let xslt = stylesheet(r#"<xsl:template match="/"><xsl:call-template name="nope"/></xsl:template>"#);
    assert_eq!(
        code(&run_error(&xslt, "<doc/>")),
        Some(XPathError::XTSE0650)
    );
}

#[test]
fn test_source_not_well_formed() {
    let xslt = stylesheet(r#"<xsl:template match="/"/>"#);
    assert!(matches!(run_error(&xslt, "<doc>"), Error::Xml { .. }));
}

#[test]
fn test_runaway_recursion() {
    let xslt = stylesheet(
        r#"<xsl:template name="loop"><xsl:call-template name="loop"/></xsl:template>
        <xsl:template match="/"><xsl:call-template name="loop"/></xsl:template>"#,
    );
    // deep template recursion needs more than the default test stack
    let error = std::thread::Builder::new()
        .stack_size(256 * 1024 * 1024)
        .spawn(move || run_error(&xslt, "<doc/>"))
        .unwrap()
        .join()
        .unwrap();
    assert_eq!(code(&error), Some(XPathError::StackOverflow));
}

#[test]
fn test_format_number_and_system_property() {
    let xslt = text_stylesheet(
        r#"<xsl:template match="/">
          <xsl:value-of select="format-number(1234.5, '#,##0.00')"/>
          <xsl:text>|</xsl:text>
          <xsl:value-of select="system-property('xsl:version')"/>
          <xsl:text>|</xsl:text>
          <xsl:value-of select="function-available('key')"/>
        </xsl:template>"#,
    );
    assert_eq!(run(&xslt, "<doc/>"), "1,234.50|1|true");
}
