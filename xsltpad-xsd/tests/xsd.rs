use std::collections::HashMap;
use std::io;

use rstest::rstest;
use xsltpad_xpath::Loaded;
use xsltpad_xsd::{NoResolver, Resolver, Schema, SchemaError};

struct MapResolver(HashMap<&'static str, &'static str>);

impl Resolver for MapResolver {
    fn load(&self, href: &str, _base: Option<&str>) -> io::Result<Loaded> {
        match self.0.get(href) {
            Some(text) => Ok(Loaded {
                uri: href.to_string(),
                text: text.to_string(),
            }),
            None => Err(io::Error::new(io::ErrorKind::NotFound, href.to_string())),
        }
    }
}

const ORDER: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="customer" type="xs:string"/>
        <xs:element name="item" type="Item" maxOccurs="unbounded"/>
        <xs:element name="note" type="xs:string" minOccurs="0"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:positiveInteger" use="required"/>
      <xs:attribute name="status" type="Status" default="open"/>
    </xs:complexType>
  </xs:element>
  <xs:complexType name="Item">
    <xs:simpleContent>
      <xs:extension base="Sku">
        <xs:attribute name="qty" type="xs:int"/>
      </xs:extension>
    </xs:simpleContent>
  </xs:complexType>
  <xs:simpleType name="Sku">
    <xs:restriction base="xs:string">
      <xs:pattern value="[A-Z]{3}-\d{3}"/>
    </xs:restriction>
  </xs:simpleType>
  <xs:simpleType name="Status">
    <xs:restriction base="xs:token">
      <xs:enumeration value="open"/>
      <xs:enumeration value="closed"/>
    </xs:restriction>
  </xs:simpleType>
</xs:schema>"#;

fn messages(schema: &str, xml: &str) -> Vec<String> {
    Schema::parse(schema, &NoResolver)
        .unwrap()
        .validate_str(xml)
        .unwrap()
        .into_iter()
        .map(|message| message.message)
        .collect()
}

#[test]
fn test_valid_document() {
    let xml = r#"<order id="1" status="closed"><customer>Ann</customer><item qty="2">ABC-123</item><item>XYZ-999</item></order>"#;
    assert!(messages(ORDER, xml).is_empty());
}

#[test]
fn test_invalid_child() {
    let xml = r#"<order id="1"><customer>Ann</customer><note>x</note></order>"#;
    assert_eq!(
        messages(ORDER, xml),
        vec!["The element 'order' has invalid child element 'note'. List of possible elements expected: 'item'."]
    );
}

#[test]
fn test_incomplete_content() {
    let xml = r#"<order id="1"><customer>Ann</customer></order>"#;
    assert_eq!(
        messages(ORDER, xml),
        vec!["The element 'order' has incomplete content. List of possible elements expected: 'item'."]
    );
}

#[test]
fn test_text_in_element_only_content() {
    let xml = r#"<order id="1">hello<customer>Ann</customer><item>ABC-123</item></order>"#;
    assert_eq!(
        messages(ORDER, xml),
        vec!["The 'order' element cannot contain text."]
    );
}

#[test]
fn test_pattern_with_line_number() {
    let schema = Schema::parse(ORDER, &NoResolver).unwrap();
    let xml = "<order id=\"1\">\n  <customer>Ann</customer>\n  <item>abc</item>\n</order>";
    let messages = schema.validate_str(xml).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].message,
        r"The 'item' element is not a valid Sku: 'abc' does not match the pattern '[A-Z]{3}-\d{3}'."
    );
    assert_eq!(messages[0].line, Some(3));
    assert!(messages[0].column.is_some());
}

#[test]
fn test_validate_without_spans_has_no_location() {
    let schema = Schema::parse(ORDER, &NoResolver).unwrap();
    let mut xot = xot::Xot::new();
    let root = xot.parse(r#"<order id="1"><customer/></order>"#).unwrap();
    let messages = schema.validate(&xot, root);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].line, None);
    assert_eq!(messages[0].to_string(), messages[0].message);
}

#[rstest]
#[case(
    r#"<order><customer>A</customer><item>ABC-123</item></order>"#,
    &["The required attribute 'id' is missing from the 'order' element."]
)]
#[case(
    r#"<order id="0" status="pending" extra="1"><customer>A</customer><item>ABC-123</item></order>"#,
    &[
        "The 'id' attribute is invalid: '0' is out of range for positiveInteger.",
        "The 'status' attribute is invalid: 'pending' is not one of the allowed values 'open', 'closed'.",
        "The 'extra' attribute is not declared.",
    ]
)]
#[case(
    r#"<order id="7"><customer>A</customer><item qty="many">ABC-123</item></order>"#,
    &["The 'qty' attribute is invalid: 'many' is not a valid int."]
)]
#[case(
    r#"<order id=" 7 " status=" closed "><customer>A</customer><item>ABC-123</item></order>"#,
    &[]
)]
fn test_attributes(#[case] xml: &str, #[case] expected: &[&str]) {
    assert_eq!(messages(ORDER, xml), expected);
}

#[test]
fn test_undeclared_root() {
    assert_eq!(
        messages(ORDER, "<invoice/>"),
        vec!["The 'invoice' element is not declared."]
    );
}

#[test]
fn test_malformed_document() {
    let schema = Schema::parse(ORDER, &NoResolver).unwrap();
    assert!(schema.validate_str("<order>").is_err());
}

const NAMESPACED: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:t="urn:t" targetNamespace="urn:t" elementFormDefault="qualified">
  <xs:element name="list" type="t:List"/>
  <xs:complexType name="List">
    <xs:sequence>
      <xs:element name="entry" type="xs:int" maxOccurs="unbounded"/>
    </xs:sequence>
  </xs:complexType>
</xs:schema>"#;

#[test]
fn test_target_namespace() {
    assert!(messages(NAMESPACED, r#"<list xmlns="urn:t"><entry>1</entry></list>"#).is_empty());
    assert_eq!(
        messages(
            NAMESPACED,
            r#"<list xmlns="urn:t"><entry>1</entry><entry>x</entry></list>"#
        ),
        vec!["The 'entry' element is not a valid xs:int: 'x' is not a valid int."]
    );
}

#[test]
fn test_unqualified_child_of_qualified_schema() {
    assert_eq!(
        messages(
            NAMESPACED,
            r#"<t:list xmlns:t="urn:t"><entry>1</entry></t:list>"#
        ),
        vec!["The element 't:list' has invalid child element 'entry'. List of possible elements expected: 'entry'."]
    );
}

const DERIVED: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:complexType name="Base">
    <xs:sequence>
      <xs:element name="a" type="xs:string"/>
    </xs:sequence>
    <xs:attribute name="x" type="xs:string"/>
  </xs:complexType>
  <xs:complexType name="Derived">
    <xs:complexContent>
      <xs:extension base="Base">
        <xs:sequence>
          <xs:element name="b" type="xs:string"/>
        </xs:sequence>
      </xs:extension>
    </xs:complexContent>
  </xs:complexType>
  <xs:element name="r" type="Derived"/>
</xs:schema>"#;

#[test]
fn test_complex_content_extension() {
    assert!(messages(DERIVED, r#"<r x="1"><a/><b/></r>"#).is_empty());
    assert_eq!(
        messages(DERIVED, "<r><b/></r>"),
        vec!["The element 'r' has invalid child element 'b'. List of possible elements expected: 'a'."]
    );
}

#[test]
fn test_xsi_type() {
    let xsi = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;
    assert_eq!(
        messages(DERIVED, "<r><a/></r>"),
        vec!["The element 'r' has incomplete content. List of possible elements expected: 'b'."]
    );
    assert!(messages(DERIVED, &format!(r#"<r {xsi} xsi:type="Base"><a/></r>"#)).is_empty());
    assert_eq!(
        messages(DERIVED, &format!(r#"<r {xsi} xsi:type="Nope"><a/></r>"#)),
        vec!["The type 'Nope' given by xsi:type is not declared."]
    );
}

const CHOICE: &str = r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="r">
    <xs:complexType>
      <xs:sequence>
        <xs:choice>
          <xs:element name="a" type="xs:string"/>
          <xs:element name="b" type="xs:string"/>
        </xs:choice>
        <xs:any namespace="##other" processContents="skip" minOccurs="0"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"###;

#[rstest]
#[case(r#"<r><b/><x:y xmlns:x="urn:x"><anything/></x:y></r>"#, &[])]
#[case(
    "<r><c/></r>",
    &["The element 'r' has invalid child element 'c'. List of possible elements expected: 'a', 'b'."]
)]
#[case("<r><a/><z/></r>", &["The element 'r' has invalid child element 'z'."])]
fn test_choice_and_wildcard(#[case] xml: &str, #[case] expected: &[&str]) {
    assert_eq!(messages(CHOICE, xml), expected);
}

const LISTS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:simpleType name="Sizes">
    <xs:list itemType="xs:int"/>
  </xs:simpleType>
  <xs:simpleType name="Size">
    <xs:union memberTypes="xs:int">
      <xs:simpleType>
        <xs:restriction base="xs:token">
          <xs:enumeration value="auto"/>
        </xs:restriction>
      </xs:simpleType>
    </xs:union>
  </xs:simpleType>
  <xs:element name="r">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="sizes" type="Sizes"/>
        <xs:element name="size" type="Size" maxOccurs="unbounded"/>
        <xs:element name="v" type="xs:int" nillable="true" minOccurs="0"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[rstest]
#[case("<r><sizes>1 2 3</sizes><size>auto</size><size>4</size></r>", &[])]
#[case(
    "<r><sizes>1 2</sizes><size>big</size></r>",
    &["The 'size' element is not a valid Size: 'big' is not valid for any member type of the union."]
)]
#[case(
    "<r><sizes>1 x</sizes><size>1</size></r>",
    &["The 'sizes' element is not a valid Sizes: 'x' is not a valid int."]
)]
#[case(
    r#"<r xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><sizes/><size>1</size><v xsi:nil="true"/></r>"#,
    &[]
)]
#[case(
    "<r><sizes/><size>1</size><v/></r>",
    &["The 'v' element is not a valid xs:int: '' is not a valid int."]
)]
fn test_lists_unions_and_nil(#[case] xml: &str, #[case] expected: &[&str]) {
    assert_eq!(messages(LISTS, xml), expected);
}

fn modular_resolver() -> MapResolver {
    MapResolver(HashMap::from([
        (
            "common.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:simpleType name="Code">
                   <xs:restriction base="xs:string"><xs:length value="2"/></xs:restriction>
                 </xs:simpleType>
               </xs:schema>"#,
        ),
        (
            "a.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:a">
                 <xs:element name="extra" type="xs:boolean"/>
               </xs:schema>"#,
        ),
    ]))
}

const MAIN: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
    xmlns:a="urn:a" xmlns:m="urn:m" targetNamespace="urn:m" elementFormDefault="qualified">
  <xs:include schemaLocation="common.xsd"/>
  <xs:import namespace="urn:a" schemaLocation="a.xsd"/>
  <xs:element name="doc">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="code" type="m:Code"/>
        <xs:element ref="a:extra"/>
      </xs:sequence>
    </xs:complexType>
  </xs:element>
</xs:schema>"#;

#[test]
fn test_include_and_import() {
    let schema = Schema::parse(MAIN, &modular_resolver()).unwrap();
    let valid = r#"<doc xmlns="urn:m" xmlns:a="urn:a"><code>XY</code><a:extra>true</a:extra></doc>"#;
    assert!(schema.validate_str(valid).unwrap().is_empty());
    let invalid = r#"<doc xmlns="urn:m" xmlns:a="urn:a"><code>XYZ</code><a:extra>maybe</a:extra></doc>"#;
    let messages = schema
        .validate_str(invalid)
        .unwrap()
        .into_iter()
        .map(|message| message.message)
        .collect::<Vec<_>>();
    assert_eq!(
        messages,
        vec![
            "The 'code' element is not a valid Q{urn:m}Code: 'XYZ' has length 3, but the required length is 2.",
            "The 'a:extra' element is not a valid xs:boolean: 'maybe' is not a valid boolean.",
        ]
    );
}

#[test]
fn test_missing_include() {
    let error = Schema::parse(MAIN, &NoResolver).unwrap_err();
    assert!(matches!(error, SchemaError::Load { ref href, .. } if href == "common.xsd"));
}

#[test]
fn test_malformed_schema() {
    let error = Schema::parse("<xs:schema", &NoResolver).unwrap_err();
    assert!(matches!(error, SchemaError::Xml { .. }));
}

#[test]
fn test_from_path() {
    let dir = std::env::temp_dir().join(format!("xsltpad-xsd-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("types.xsd"),
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:simpleType name="Percent">
               <xs:restriction base="xs:decimal">
                 <xs:minInclusive value="0"/>
                 <xs:maxInclusive value="100"/>
                 <xs:fractionDigits value="1"/>
               </xs:restriction>
             </xs:simpleType>
           </xs:schema>"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("main.xsd"),
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
             <xs:include schemaLocation="types.xsd"/>
             <xs:element name="p" type="Percent"/>
           </xs:schema>"#,
    )
    .unwrap();
    let schema = Schema::from_path(&dir.join("main.xsd")).unwrap();
    assert!(schema.validate_str("<p>99.5</p>").unwrap().is_empty());
    let messages = schema.validate_str("<p>100.5</p>").unwrap();
    assert_eq!(
        messages[0].message,
        "The 'p' element is not a valid Percent: '100.5' must be at most 100."
    );
    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_from_missing_path() {
    let error = Schema::from_path(std::path::Path::new("/nonexistent/schema.xsd")).unwrap_err();
    insta::assert_snapshot!(error.to_string(), @"cannot load schema /nonexistent/schema.xsd");
}
