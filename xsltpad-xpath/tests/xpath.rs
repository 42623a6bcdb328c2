use insta::assert_snapshot;
use rstest::rstest;
use xot::Xot;
use xsltpad_xpath::{
    evaluate, parse_expr, Context, DocumentHost, Error, ExpandedName, Namespaces, Value, XPath,
};

const BOOKS: &str = r#"<library xmlns:ex="http://example.com/ns">
  <book id="b1" year="1999"><title>First</title><price>10</price></book>
  <book id="b2" year="2005"><title>Second</title><price>12.5</price></book>
  <ex:book id="b3" year="2011" xml:lang="en-GB"><title>Third</title><price>7</price></ex:book>
</library>"#;

fn run_xml(xml: &str, expr: &str) -> Result<String, Error> {
    let mut xot = Xot::new();
    let doc = xot.parse(xml).unwrap();
    let namespaces = Namespaces::from_pairs([("ex", "http://example.com/ns")]);
    let xpath = XPath::parse(expr, &namespaces).unwrap();
    let mut host = DocumentHost::new(&xot);
    xpath.evaluate_string(&Context::new(doc), &mut host)
}

fn run(expr: &str) -> String {
    run_xml(BOOKS, expr).unwrap()
}

#[rstest]
#[case("1 + 2 * 3", "7")]
#[case("7 mod 3", "1")]
#[case("-7 mod 3", "-1")]
#[case("1 div 0", "Infinity")]
#[case("0 div 0", "NaN")]
#[case("10 div 4", "2.5")]
#[case("-(2 - 5)", "3")]
#[case("'a' = 'a' and 1 < 2", "true")]
#[case("true() = 'x'", "true")]
#[case("number('  12  ')", "12")]
#[case("number('1e3')", "NaN")]
fn test_expressions(#[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(expr), expected);
}

#[rstest]
#[case("count(//book)", "2")]
#[case("count(//ex:book)", "1")]
#[case("count(/library/*)", "3")]
#[case("string(//book[2]/title)", "Second")]
#[case("string(//book[@year > 2000]/@id)", "b2")]
#[case("string((//title)[last()])", "Third")]
#[case("sum(//price)", "29.5")]
#[case("string(//title[. = 'Third']/../@id)", "b3")]
#[case("local-name(/library/*[3])", "book")]
#[case("name(/library/*[3])", "ex:book")]
#[case("namespace-uri(/library/*[3])", "http://example.com/ns")]
#[case("string(id('b2 b3')[1]/title)", "Second")]
#[case("count(id('b1 missing'))", "1")]
#[case("count(//title[lang('en')])", "1")]
#[case("string(//book[1]/following-sibling::*[1]/@id)", "b2")]
#[case("string(//price[. = 7]/preceding::title[1])", "Third")]
#[case("string(//title[1]/ancestor::*[last()]/*[1]/@year)", "1999")]
#[case("count(//book | //book[1])", "2")]
#[case("//book/price = 12.5", "true")]
#[case("//book/price != 10", "true")]
#[case("not(//nothing)", "true")]
fn test_paths(#[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(expr), expected);
}

#[rstest]
#[case("concat('a', 'b', 'c')", "abc")]
#[case("substring-before('2024-01-02', '-')", "2024")]
#[case("substring-after('2024-01-02', '-')", "01-02")]
#[case("string-length('héllo')", "5")]
#[case("normalize-space('  a   b ')", "a b")]
#[case("translate('hello', 'el', 'EL')", "hELLo")]
#[case("floor(-1.5)", "-2")]
#[case("ceiling(1.2)", "2")]
#[case("round(2.5)", "3")]
#[case("starts-with('xslt', 'xs')", "true")]
#[case("contains('xslt', 'sl')", "true")]
fn test_string_functions(#[case] expr: &str, #[case] expected: &str) {
    assert_eq!(run(expr), expected);
}

#[test]
fn test_variable() {
    let mut xot = Xot::new();
    let doc = xot.parse("<a/>").unwrap();
    let expr = parse_expr("$x * 2", &Namespaces::new()).unwrap();
    let mut host =
        DocumentHost::new(&xot).with_variable(ExpandedName::local("x"), Value::Number(21.0));
    let value = evaluate(&expr, &Context::new(doc), &mut host).unwrap();
    assert_eq!(value, Value::Number(42.0));
}

#[test]
fn test_unknown_variable() {
    assert_eq!(run_xml("<a/>", "$missing"), Err(Error::XPST0008));
}

#[test]
fn test_unknown_function() {
    assert_eq!(run_xml("<a/>", "frobnicate()"), Err(Error::XPST0017));
}

#[test]
fn test_wrong_arity() {
    assert_eq!(run_xml("<a/>", "concat('a')"), Err(Error::XPST0017));
}

#[test]
fn test_node_set_required() {
    assert_eq!(run_xml("<a/>", "count(1)"), Err(Error::XPTY0004));
}

#[test]
fn test_parse_error_display() {
    let error = parse_expr("1 +", &Namespaces::new()).unwrap_err();
    assert_snapshot!(error.to_string(), @"XPST0003: Parse error. (3..3)");
}

#[test]
fn test_reverse_axis_proximity() {
    let mut xot = Xot::new();
    let doc = xot.parse("<a><b/><c/><d/></a>").unwrap();
    let namespaces = Namespaces::new();
    let d = XPath::parse("/a/d", &namespaces).unwrap();
    let mut host = DocumentHost::new(&xot);
    let d = d
        .evaluate(&Context::new(doc), &mut host)
        .unwrap()
        .into_nodes()
        .unwrap()[0];
    let first = XPath::parse("name(preceding-sibling::*[1])", &namespaces).unwrap();
    assert_eq!(
        first.evaluate_string(&Context::new(d), &mut host).unwrap(),
        "c"
    );
}
