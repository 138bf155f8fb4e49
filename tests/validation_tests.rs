//! Instance validation integration tests
//!
//! Each test builds a schema from a string and validates instance strings
//! through the public API, checking the reported constraint codes.

use pretty_assertions::assert_eq;
use wxs::validators::facets::FacetKind;
use wxs::{ErrorCode, Schema, ValidationOptions, ValidationReport};

const XSI: &str = r#"xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance""#;

fn schema(xsd: &str) -> Schema {
    Schema::parse_str(xsd).expect("schema should build")
}

fn report(schema: &Schema, xml: &str) -> ValidationReport {
    schema.validate_str(xml).expect("validation should run")
}

fn codes(schema: &Schema, xml: &str) -> Vec<ErrorCode> {
    report(schema, xml).error_codes()
}

fn xsd(body: &str) -> String {
    format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
        body
    )
}

// ============================================================================
// Content models
// ============================================================================

#[test]
fn test_sequence_with_optional_element() {
    let s = schema(&xsd(
        r#"<xs:complexType name="T">
             <xs:sequence>
               <xs:element name="a" minOccurs="1" maxOccurs="1"/>
               <xs:element name="b" minOccurs="0"/>
             </xs:sequence>
           </xs:complexType>
           <xs:element name="T" type="T"/>"#,
    ));

    assert!(report(&s, "<T><a/></T>").is_valid());
    assert!(report(&s, "<T><a/><b/></T>").is_valid());

    let r = report(&s, "<T><b/></T>");
    assert_eq!(r.error_codes(), vec![ErrorCode::CvcComplexType2_4]);
    assert!(r.diagnostics[0].message.contains("Expected is one of ( a )"));

    let r = report(&s, "<T/>");
    assert_eq!(r.error_codes(), vec![ErrorCode::CvcComplexType2_4]);
    assert!(r.diagnostics[0].message.contains("Missing child element(s)"));
}

#[test]
fn test_text_in_element_only_content() {
    let s = schema(&xsd(
        r#"<xs:element name="r">
             <xs:complexType><xs:sequence><xs:element name="a"/></xs:sequence></xs:complexType>
           </xs:element>"#,
    ));
    assert!(report(&s, "<r>\n  <a/>\n</r>").is_valid());
    assert_eq!(codes(&s, "<r>text<a/>more</r>"), vec![ErrorCode::CvcComplexType2_3]);
}

#[test]
fn test_empty_and_simple_content_reject_children() {
    let s = schema(&xsd(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence>
                 <xs:element name="empty"><xs:complexType/></xs:element>
                 <xs:element name="num" type="xs:int"/>
               </xs:sequence>
             </xs:complexType>
           </xs:element>"#,
    ));
    assert_eq!(
        codes(&s, "<r><empty><x/></empty><num>1</num></r>"),
        vec![ErrorCode::CvcComplexType2_1]
    );
    assert_eq!(
        codes(&s, "<r><empty/><num><x/></num></r>"),
        vec![ErrorCode::CvcType3_1_2]
    );
}

// ============================================================================
// Simple values
// ============================================================================

#[test]
fn test_bounded_integer_values() {
    let s = schema(&xsd(
        r#"<xs:simpleType name="small">
             <xs:restriction base="xs:integer">
               <xs:minInclusive value="1"/>
               <xs:maxInclusive value="10"/>
             </xs:restriction>
           </xs:simpleType>
           <xs:element name="v" type="small"/>"#,
    ));
    assert!(report(&s, "<v>5</v>").is_valid());
    assert_eq!(
        codes(&s, "<v>11</v>"),
        vec![ErrorCode::CvcFacetValid(FacetKind::MaxInclusive)]
    );
    assert_eq!(codes(&s, "<v>abc</v>"), vec![ErrorCode::CvcDatatypeValid]);
}

#[test]
fn test_fixed_element_value_compares_values() {
    let s = schema(&xsd(r#"<xs:element name="v" type="xs:decimal" fixed="1.0"/>"#));
    assert!(report(&s, "<v>1</v>").is_valid());
    assert!(report(&s, "<v/>").is_valid());
    assert_eq!(codes(&s, "<v>2</v>"), vec![ErrorCode::CvcElt5_2_2]);
}

// ============================================================================
// Attributes
// ============================================================================

#[test]
fn test_prohibited_attribute_from_group() {
    let s = schema(&xsd(
        r#"<xs:attributeGroup name="AG">
             <xs:attribute name="x" type="xs:int" use="required"/>
           </xs:attributeGroup>
           <xs:complexType name="Base"><xs:attributeGroup ref="AG"/></xs:complexType>
           <xs:complexType name="R">
             <xs:complexContent>
               <xs:restriction base="Base"><xs:attribute name="x" use="prohibited"/></xs:restriction>
             </xs:complexContent>
           </xs:complexType>
           <xs:element name="e" type="R"/>"#,
    ));
    let r = report(&s, r#"<e x="1"/>"#);
    assert_eq!(r.error_codes(), vec![ErrorCode::CvcComplexType3_2_1]);
    assert!(r.diagnostics[0].message.contains("not allowed"));
    assert!(report(&s, "<e/>").is_valid());
}

#[test]
fn test_attribute_uses() {
    let s = schema(&xsd(
        r#"<xs:element name="e">
             <xs:complexType>
               <xs:attribute name="req" type="xs:int" use="required"/>
               <xs:attribute name="fix" type="xs:decimal" fixed="2.5"/>
             </xs:complexType>
           </xs:element>"#,
    ));
    assert!(report(&s, r#"<e req="1"/>"#).is_valid());
    assert!(report(&s, r#"<e req="1" fix="2.50"/>"#).is_valid());
    assert_eq!(codes(&s, "<e/>"), vec![ErrorCode::CvcComplexType4]);
    assert_eq!(codes(&s, r#"<e req="x"/>"#), vec![ErrorCode::CvcDatatypeValid]);
    assert_eq!(codes(&s, r#"<e req="1" fix="3"/>"#), vec![ErrorCode::CvcAu]);
}

#[test]
fn test_attribute_wildcard() {
    let s = schema(
        r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
             <xs:element name="e">
               <xs:complexType>
                 <xs:anyAttribute namespace="##other" processContents="skip"/>
               </xs:complexType>
             </xs:element>
           </xs:schema>"###,
    );
    assert!(report(&s, r#"<e xmlns="urn:t" xmlns:o="urn:o" o:any="1"/>"#).is_valid());
    assert_eq!(
        codes(&s, r#"<e xmlns="urn:t" plain="1"/>"#),
        vec![ErrorCode::CvcComplexType3_2_2]
    );
}

#[test]
fn test_simple_type_rejects_attributes() {
    let s = schema(&xsd(r#"<xs:element name="v" type="xs:int"/>"#));
    assert_eq!(codes(&s, r#"<v a="1">1</v>"#), vec![ErrorCode::CvcType3_1_1]);
    // schema-instance attributes are not instance attributes
    let xml = format!(r#"<v {} xsi:noNamespaceSchemaLocation="s.xsd">1</v>"#, XSI);
    assert!(report(&s, &xml).is_valid());
}

// ============================================================================
// Identity constraints
// ============================================================================

const PERSON: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="Person">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="Employee" maxOccurs="unbounded">
          <xs:complexType><xs:attribute name="id" type="xs:string"/></xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
    <xs:key name="employeeKey">
      <xs:selector xpath=".//Employee"/>
      <xs:field xpath="@id"/>
    </xs:key>
  </xs:element>
</xs:schema>"#;

#[test]
fn test_duplicate_key() {
    let s = schema(PERSON);
    let r = report(
        &s,
        "<Person>\n  <Employee id=\"1\"/>\n  <Employee id=\"1\"/>\n</Person>",
    );
    assert_eq!(r.error_codes(), vec![ErrorCode::CvcIdcKeyDuplicate]);
    let d = &r.diagnostics[0];
    assert_eq!(d.line, Some(3));
    assert!(d.message.contains("first occurrence at line 2"), "{}", d.message);

    assert!(report(&s, r#"<Person><Employee id="1"/><Employee id="2"/></Person>"#).is_valid());
    assert_eq!(
        codes(&s, r#"<Person><Employee id="1"/><Employee/></Person>"#),
        vec![ErrorCode::CvcIdcKeyMissing]
    );
}

const ROWS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="list">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="row" maxOccurs="unbounded">
          <xs:complexType>
            <xs:attribute name="a" type="xs:string"/>
            <xs:attribute name="b" type="xs:string"/>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
    <xs:unique name="pair">
      <xs:selector xpath="row"/>
      <xs:field xpath="@a"/>
      <xs:field xpath="@b"/>
    </xs:unique>
  </xs:element>
</xs:schema>"#;

#[test]
fn test_unique_over_two_fields() {
    let s = schema(ROWS);
    let r = report(&s, r#"<list><row a="1" b="A"/><row a="1" b="A"/></list>"#);
    assert_eq!(r.error_codes(), vec![ErrorCode::CvcIdcUnique]);
    assert!(r.diagnostics[0].message.contains("['1', 'A']"));

    assert!(report(&s, r#"<list><row a="1" b="A"/><row a="1" b="B"/></list>"#).is_valid());
    assert!(report(&s, r#"<list><row a="1" b="A"/><row a="2" b="A"/></list>"#).is_valid());
    // incomplete key-sequences do not take part in unique
    assert!(report(&s, r#"<list><row a="1"/><row a="1"/></list>"#).is_valid());
}

const ITEMS: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="list">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" maxOccurs="unbounded">
          <xs:complexType>
            <xs:sequence>
              <xs:element name="code" type="xs:integer"/>
              <xs:element name="note" minOccurs="0">
                <xs:complexType><xs:sequence><xs:element name="line"/></xs:sequence></xs:complexType>
              </xs:element>
            </xs:sequence>
          </xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
    <xs:unique name="codes">
      <xs:selector xpath="item"/>
      <xs:field xpath="code"/>
    </xs:unique>
    <xs:unique name="notes">
      <xs:selector xpath="item"/>
      <xs:field xpath="note"/>
    </xs:unique>
  </xs:element>
</xs:schema>"#;

#[test]
fn test_fields_on_element_content() {
    let s = schema(ITEMS);
    assert!(report(&s, "<list><item><code>1</code></item><item><code>2</code></item></list>").is_valid());
    // values compare in the value space of the element's type
    assert_eq!(
        codes(&s, "<list><item><code>1</code></item><item><code>01</code></item></list>"),
        vec![ErrorCode::CvcIdcUnique]
    );
    // a field selecting an element without simple content
    assert_eq!(
        codes(&s, "<list><item><code>1</code><note><line/></note></item></list>"),
        vec![ErrorCode::CvcIdcField]
    );
}

const COMPANY: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="company">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="dept" maxOccurs="unbounded">
          <xs:complexType><xs:attribute name="code" type="xs:string"/></xs:complexType>
        </xs:element>
        <xs:element name="ref" minOccurs="0" maxOccurs="unbounded">
          <xs:complexType><xs:attribute name="dept" type="xs:string"/></xs:complexType>
        </xs:element>
      </xs:sequence>
    </xs:complexType>
    <xs:key name="deptKey">
      <xs:selector xpath="dept"/>
      <xs:field xpath="@code"/>
    </xs:key>
    <xs:keyref name="deptRef" refer="deptKey">
      <xs:selector xpath="ref"/>
      <xs:field xpath="@dept"/>
    </xs:keyref>
  </xs:element>
</xs:schema>"#;

#[test]
fn test_keyref_resolution() {
    let s = schema(COMPANY);
    assert!(report(&s, r#"<company><dept code="A"/><dept code="B"/><ref dept="B"/></company>"#).is_valid());

    let r = report(&s, r#"<company><dept code="A"/><ref dept="X"/></company>"#);
    assert_eq!(r.error_codes(), vec![ErrorCode::CvcIdcKeyref]);
    assert!(r.diagnostics[0].message.contains("No match found"));
}

#[test]
fn test_keyref_sees_tables_bubbled_from_children() {
    let s = schema(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:element name="company">
            <xs:complexType>
              <xs:sequence>
                <xs:element name="dept" maxOccurs="unbounded">
                  <xs:complexType><xs:attribute name="code" type="xs:string"/></xs:complexType>
                  <xs:key name="deptKey">
                    <xs:selector xpath="."/>
                    <xs:field xpath="@code"/>
                  </xs:key>
                </xs:element>
                <xs:element name="ref" minOccurs="0" maxOccurs="unbounded">
                  <xs:complexType><xs:attribute name="dept" type="xs:string"/></xs:complexType>
                </xs:element>
              </xs:sequence>
            </xs:complexType>
            <xs:keyref name="deptRef" refer="deptKey">
              <xs:selector xpath="ref"/>
              <xs:field xpath="@dept"/>
            </xs:keyref>
          </xs:element>
        </xs:schema>"#,
    );
    assert!(report(&s, r#"<company><dept code="A"/><dept code="B"/><ref dept="A"/></company>"#).is_valid());
    assert_eq!(
        codes(&s, r#"<company><dept code="A"/><ref dept="C"/></company>"#),
        vec![ErrorCode::CvcIdcKeyref]
    );
}

#[test]
fn test_exposed_node_tables() {
    let s = schema(COMPANY);
    let options = ValidationOptions::new().with_exposed_idc_node_tables(true);
    let r = s
        .validate_str_with(r#"<company><dept code="A"/><dept code="B"/></company>"#, options)
        .unwrap();
    assert!(r.is_valid());
    let table = r
        .idc_tables
        .iter()
        .find(|t| t.name == "deptKey")
        .expect("key table exposed");
    assert_eq!(table.keys.len(), 2);
}

// ============================================================================
// xsi:type and xsi:nil
// ============================================================================

fn derivation_schema(element_block: &str, type_block: &str) -> Schema {
    schema(&xsd(&format!(
        r#"<xs:complexType name="Base" {type_block}>
             <xs:sequence><xs:element name="a" type="xs:string"/></xs:sequence>
           </xs:complexType>
           <xs:complexType name="Derived">
             <xs:complexContent>
               <xs:extension base="Base">
                 <xs:sequence><xs:element name="b" type="xs:int"/></xs:sequence>
                 <xs:attribute name="extra" type="xs:int" use="required"/>
               </xs:extension>
             </xs:complexContent>
           </xs:complexType>
           <xs:element name="item" type="Base" {element_block}/>"#
    )))
}

#[test]
fn test_xsi_type_selects_derived_rules() {
    let s = derivation_schema("", "");
    let derived = format!(r#"<item {} xsi:type="Derived" extra="1"><a>x</a><b>2</b></item>"#, XSI);
    assert!(report(&s, &derived).is_valid());

    assert_eq!(
        codes(&s, "<item><a>x</a><b>2</b></item>"),
        vec![ErrorCode::CvcComplexType2_4]
    );
    let missing = format!(r#"<item {} xsi:type="Derived"><a>x</a><b>2</b></item>"#, XSI);
    assert_eq!(codes(&s, &missing), vec![ErrorCode::CvcComplexType4]);
}

#[test]
fn test_xsi_type_blocked_extension() {
    let xml = format!(r#"<item {} xsi:type="Derived" extra="1"><a>x</a><b>2</b></item>"#, XSI);
    for s in [
        derivation_schema(r#"block="extension""#, ""),
        derivation_schema("", r#"block="extension""#),
    ] {
        let found = codes(&s, &xml);
        assert!(found.contains(&ErrorCode::CvcElt4_3), "{:?}", found);
    }
}

#[test]
fn test_xsi_type_errors() {
    let s = derivation_schema("", "");
    let unknown = format!(r#"<item {} xsi:type="Nope"><a>x</a></item>"#, XSI);
    assert_eq!(codes(&s, &unknown), vec![ErrorCode::CvcElt4_2]);
    let bad_prefix = format!(r#"<item {} xsi:type="p:Derived"><a>x</a></item>"#, XSI);
    assert_eq!(codes(&s, &bad_prefix), vec![ErrorCode::CvcElt4_1]);
}

#[test]
fn test_nil() {
    let s = schema(&xsd(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence>
                 <xs:element name="n" type="xs:int" nillable="true"/>
                 <xs:element name="m" type="xs:int" minOccurs="0"/>
               </xs:sequence>
             </xs:complexType>
           </xs:element>"#,
    ));
    let ok = format!(r#"<r {}><n xsi:nil="true"/></r>"#, XSI);
    assert!(report(&s, &ok).is_valid());
    let content = format!(r#"<r {}><n xsi:nil="true">5</n></r>"#, XSI);
    assert_eq!(codes(&s, &content), vec![ErrorCode::CvcElt3_2_1]);
    let not_nillable = format!(r#"<r {}><n>1</n><m xsi:nil="true"/></r>"#, XSI);
    assert_eq!(
        codes(&s, &not_nillable),
        vec![ErrorCode::CvcElt3_1, ErrorCode::CvcDatatypeValid]
    );
}

// ============================================================================
// Wildcards and substitution groups
// ============================================================================

#[test]
fn test_element_wildcards() {
    let s = schema(&xsd(
        r#"<xs:element name="known" type="xs:int"/>
           <xs:element name="strict"><xs:complexType><xs:sequence>
             <xs:any processContents="strict"/>
           </xs:sequence></xs:complexType></xs:element>
           <xs:element name="lax"><xs:complexType><xs:sequence>
             <xs:any processContents="lax"/>
           </xs:sequence></xs:complexType></xs:element>
           <xs:element name="skip"><xs:complexType><xs:sequence>
             <xs:any processContents="skip"/>
           </xs:sequence></xs:complexType></xs:element>"#,
    ));
    assert!(report(&s, "<strict><known>1</known></strict>").is_valid());
    assert_eq!(codes(&s, "<strict><unknown/></strict>"), vec![ErrorCode::CvcElt1]);
    assert!(report(&s, "<lax><unknown a='1'><x/></unknown></lax>").is_valid());
    assert_eq!(codes(&s, "<lax><known>x</known></lax>"), vec![ErrorCode::CvcDatatypeValid]);
    assert!(report(&s, "<skip><known>x</known></skip>").is_valid());
}

#[test]
fn test_substitution_group() {
    let s = schema(&xsd(
        r#"<xs:element name="shape" abstract="true"/>
           <xs:element name="circle" substitutionGroup="shape"/>
           <xs:element name="drawing">
             <xs:complexType><xs:sequence><xs:element ref="shape" maxOccurs="unbounded"/></xs:sequence></xs:complexType>
           </xs:element>"#,
    ));
    assert!(report(&s, "<drawing><circle/><circle/></drawing>").is_valid());
    assert_eq!(codes(&s, "<drawing><shape/></drawing>"), vec![ErrorCode::CvcComplexType2_4]);
    assert_eq!(codes(&s, "<shape/>"), vec![ErrorCode::CvcElt2]);
}

// ============================================================================
// IDs, continuation and reporting
// ============================================================================

#[test]
fn test_id_and_idref() {
    let s = schema(&xsd(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:sequence>
                 <xs:element name="n" maxOccurs="unbounded">
                   <xs:complexType>
                     <xs:attribute name="id" type="xs:ID"/>
                     <xs:attribute name="ref" type="xs:IDREF"/>
                   </xs:complexType>
                 </xs:element>
               </xs:sequence>
             </xs:complexType>
           </xs:element>"#,
    ));
    assert!(report(&s, r#"<r><n id="a"/><n id="b" ref="a"/></r>"#).is_valid());
    assert_eq!(codes(&s, r#"<r><n id="a"/><n id="a"/></r>"#), vec![ErrorCode::CvcId2]);
    assert_eq!(codes(&s, r#"<r><n id="a" ref="z"/></r>"#), vec![ErrorCode::CvcId1]);

    let unchecked = s
        .validate_str_with(
            r#"<r><n id="a"/><n id="a" ref="z"/></r>"#,
            ValidationOptions::new().with_check_ids(false),
        )
        .unwrap();
    assert!(unchecked.is_valid());
}

#[test]
fn test_independent_defects_are_all_reported() {
    let s = schema(&xsd(
        r#"<xs:element name="root">
             <xs:complexType>
               <xs:sequence>
                 <xs:element name="a" maxOccurs="unbounded">
                   <xs:complexType>
                     <xs:sequence><xs:element name="x"/><xs:element name="y"/></xs:sequence>
                     <xs:attribute name="id" type="xs:string" use="required"/>
                   </xs:complexType>
                 </xs:element>
               </xs:sequence>
             </xs:complexType>
           </xs:element>"#,
    ));
    let r = report(&s, r#"<root><a><x/><y/></a><a id="2"><y/><x/></a></root>"#);
    assert_eq!(
        r.error_codes(),
        vec![ErrorCode::CvcComplexType4, ErrorCode::CvcComplexType2_4]
    );
    assert_eq!(r.code(), 2);
    let paths: Vec<_> = r.diagnostics.iter().filter_map(|d| d.path.as_deref()).collect();
    assert_eq!(paths, vec!["/root/a", "/root/a[2]/y"]);
}

#[test]
fn test_undeclared_root() {
    let s = schema(&xsd(r#"<xs:element name="r"/>"#));
    let r = report(&s, "<other><child/></other>");
    assert_eq!(r.error_codes(), vec![ErrorCode::CvcElt1]);
}

#[test]
fn test_malformed_document_is_an_error() {
    let s = schema(&xsd(r#"<xs:element name="r"/>"#));
    let result = s.validate_str("<r><unclosed></r>");
    assert!(matches!(result, Err(wxs::Error::Parse(_))));
    assert!(wxs::code_of(&result) < 0);
}

#[test]
fn test_report_serializes_to_json() {
    let s = schema(&xsd(r#"<xs:element name="v" type="xs:int"/>"#));
    let r = report(&s, "<v>x</v>");
    let json = serde_json::to_value(&r).unwrap();
    assert_eq!(json["error_count"], 1);
    assert_eq!(json["diagnostics"][0]["code"], "cvc-datatype-valid.1");
    assert_eq!(json["diagnostics"][0]["line"], 1);
    assert_eq!(json["diagnostics"][0]["path"], "/v");
}

#[test]
fn test_document_and_stream_agree() {
    let s = schema(PERSON);
    let xml = r#"<Person><Employee id="1"/><Employee id="1"/><Bogus/></Person>"#;
    let streamed = report(&s, xml).error_codes();
    let document = wxs::documents::Document::from_string(xml).unwrap();
    let walked = s.validate_document(&document).unwrap().error_codes();
    assert_eq!(streamed, walked);
}
