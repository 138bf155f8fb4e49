//! Schema construction integration tests
//!
//! Builds schemas from strings and from files on disk and checks the
//! component constraints reported for broken ones.

use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;
use wxs::namespaces::QName;
use wxs::{Error, ErrorCode, Schema, SchemaParser};

fn xsd(body: &str) -> String {
    format!(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
        body
    )
}

/// The codes of a schema that fails to build
fn schema_errors(text: &str) -> Vec<ErrorCode> {
    match Schema::parse_str(text) {
        Err(Error::InvalidSchema { error_count, diagnostics }) => {
            assert!(error_count > 0);
            diagnostics
                .iter()
                .filter(|d| d.is_error())
                .map(|d| d.code)
                .collect()
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(_) => panic!("schema should be rejected"),
    }
}

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_facet_loosening_is_rejected() {
    let codes = schema_errors(&xsd(
        r#"<xs:simpleType name="small">
             <xs:restriction base="xs:integer"><xs:maxInclusive value="10"/></xs:restriction>
           </xs:simpleType>
           <xs:simpleType name="larger">
             <xs:restriction base="small"><xs:maxInclusive value="20"/></xs:restriction>
           </xs:simpleType>"#,
    ));
    assert_eq!(codes, vec![ErrorCode::StRestrictFacets]);

    // narrowing is fine
    assert!(Schema::parse_str(&xsd(
        r#"<xs:simpleType name="small">
             <xs:restriction base="xs:integer"><xs:maxInclusive value="10"/></xs:restriction>
           </xs:simpleType>
           <xs:simpleType name="smaller">
             <xs:restriction base="small"><xs:maxInclusive value="5"/></xs:restriction>
           </xs:simpleType>"#
    ))
    .is_ok());
}

#[test]
fn test_ambiguous_content_model() {
    let codes = schema_errors(&xsd(
        r#"<xs:element name="r">
             <xs:complexType>
               <xs:choice>
                 <xs:element name="a"/>
                 <xs:sequence><xs:element name="a"/><xs:element name="b"/></xs:sequence>
               </xs:choice>
             </xs:complexType>
           </xs:element>"#,
    ));
    assert_eq!(codes, vec![ErrorCode::CosNonambig]);
}

#[test]
fn test_blocked_head_type_still_admits_derived_member_declaration() {
    let schema = Schema::parse_str(&xsd(
        r#"<xs:complexType name="B" block="extension"/>
           <xs:complexType name="D">
             <xs:complexContent><xs:extension base="B"/></xs:complexContent>
           </xs:complexType>
           <xs:element name="head" type="B"/>
           <xs:element name="m" type="D" substitutionGroup="head"/>
           <xs:element name="list">
             <xs:complexType><xs:sequence><xs:element ref="head"/></xs:sequence></xs:complexType>
           </xs:element>"#,
    ))
    .expect("schema should build");
    assert!(schema.is_valid_str("<list><head/></list>"));
    // the block applies to substitution in instances
    assert!(!schema.is_valid_str("<list><m/></list>"));
}

#[test]
fn test_unresolved_reference() {
    let codes = schema_errors(&xsd(r#"<xs:element name="r" type="Missing"/>"#));
    assert_eq!(codes, vec![ErrorCode::SrcResolve]);
}

#[test]
fn test_diagnostics_carry_position() {
    let text = xsd("\n<xs:element name=\"r\" type=\"Missing\"/>");
    let Err(Error::InvalidSchema { diagnostics, .. }) = Schema::parse_str(&text) else {
        panic!("schema should be rejected");
    };
    assert_eq!(diagnostics[0].line, Some(2));
}

#[test]
fn test_global_components_are_registered() {
    let schema = Schema::parse_str(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                      xmlns:t="urn:t" targetNamespace="urn:t">
             <xs:element name="root" type="t:RootType"/>
             <xs:complexType name="RootType"/>
             <xs:attribute name="flag" type="xs:boolean"/>
             <xs:group name="g"><xs:sequence><xs:element name="x"/></xs:sequence></xs:group>
           </xs:schema>"#,
    )
    .unwrap();

    assert_eq!(schema.target_namespace(), Some("urn:t"));
    assert!(schema.element(&QName::namespaced("urn:t", "root")).is_some());
    assert!(schema.type_def(&QName::namespaced("urn:t", "RootType")).is_some());
    assert!(schema.attribute(&QName::namespaced("urn:t", "flag")).is_some());
    assert!(schema.group(&QName::namespaced("urn:t", "g")).is_some());
    assert!(schema.element(&QName::local("root")).is_none());

    let summary = schema.summary();
    assert_eq!(summary.elements.len(), 1);
    assert_eq!(summary.groups.len(), 1);
}

#[test]
fn test_include_from_file() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "types.xsd",
        &xsd(r#"<xs:simpleType name="code"><xs:restriction base="xs:string"><xs:length value="3"/></xs:restriction></xs:simpleType>"#),
    );
    let main = write(
        &dir,
        "main.xsd",
        &xsd(r#"<xs:include schemaLocation="types.xsd"/><xs:element name="c" type="code"/>"#),
    );

    let schema = Schema::parse_file(&main).unwrap();
    assert_eq!(schema.buckets().len(), 2);
    assert!(schema.is_valid_str("<c>abc</c>"));
    assert_eq!(
        schema.validate_str("<c>abcd</c>").unwrap().error_codes(),
        vec![ErrorCode::CvcFacetValid(wxs::validators::facets::FacetKind::Length)]
    );
}

#[test]
fn test_chameleon_include_adopts_namespace() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "part.xsd",
        &xsd(r#"<xs:complexType name="PartType"><xs:attribute name="n" type="xs:int"/></xs:complexType>
                <xs:element name="part" type="PartType"/>"#),
    );
    let main = write(
        &dir,
        "main.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
             <xs:include schemaLocation="part.xsd"/>
           </xs:schema>"#,
    );

    let schema = Schema::parse_file(&main).unwrap();
    assert!(schema.element(&QName::namespaced("urn:t", "part")).is_some());
    assert!(schema.element(&QName::local("part")).is_none());
    assert!(schema.is_valid_str(r#"<part xmlns="urn:t" n="1"/>"#));
}

#[test]
fn test_include_with_wrong_namespace() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "other.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:other"/>"#,
    );
    let main = write(
        &dir,
        "main.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
             <xs:include schemaLocation="other.xsd"/>
           </xs:schema>"#,
    );
    let Err(Error::InvalidSchema { diagnostics, .. }) = Schema::parse_file(&main) else {
        panic!("schema should be rejected");
    };
    assert_eq!(diagnostics[0].code, ErrorCode::SrcInclude);
}

#[test]
fn test_missing_include_and_import() {
    let dir = TempDir::new().unwrap();
    let include = write(&dir, "a.xsd", &xsd(r#"<xs:include schemaLocation="nowhere.xsd"/>"#));
    let Err(Error::InvalidSchema { diagnostics, .. }) = Schema::parse_file(&include) else {
        panic!("a missing include is an error");
    };
    assert_eq!(diagnostics[0].code, ErrorCode::SchemaLoad);

    // a missing import is only a warning
    let import = write(
        &dir,
        "b.xsd",
        &xsd(r#"<xs:import namespace="urn:x" schemaLocation="nowhere.xsd"/><xs:element name="r"/>"#),
    );
    let schema = Schema::parse_file(&import).unwrap();
    assert_eq!(schema.warnings().len(), 1);
    assert_eq!(schema.warnings()[0].code, ErrorCode::SchemaLoad);
}

#[test]
fn test_import_from_file() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "addr.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:addr"
                      elementFormDefault="qualified">
             <xs:element name="street" type="xs:string"/>
           </xs:schema>"#,
    );
    let main = write(
        &dir,
        "main.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:a="urn:addr">
             <xs:import namespace="urn:addr" schemaLocation="addr.xsd"/>
             <xs:element name="person">
               <xs:complexType><xs:sequence><xs:element ref="a:street"/></xs:sequence></xs:complexType>
             </xs:element>
           </xs:schema>"#,
    );
    let schema = Schema::parse_file(&main).unwrap();
    assert!(schema.is_valid_str(r#"<person><street xmlns="urn:addr">Main</street></person>"#));
    assert!(!schema.is_valid_str("<person><street>Main</street></person>"));
}

#[test]
fn test_reference_to_unimported_namespace() {
    let codes = schema_errors(
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns:o="urn:o">
             <xs:element name="r" type="o:T"/>
           </xs:schema>"#,
    );
    assert_eq!(codes, vec![ErrorCode::SrcResolveImport]);
}

#[test]
fn test_redefine_extends_type() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "base.xsd",
        &xsd(r#"<xs:complexType name="T"><xs:sequence><xs:element name="a"/></xs:sequence></xs:complexType>
                <xs:element name="r" type="T"/>"#),
    );
    let main = write(
        &dir,
        "main.xsd",
        &xsd(r#"<xs:redefine schemaLocation="base.xsd">
                  <xs:complexType name="T">
                    <xs:complexContent>
                      <xs:extension base="T"><xs:sequence><xs:element name="b"/></xs:sequence></xs:extension>
                    </xs:complexContent>
                  </xs:complexType>
                </xs:redefine>"#),
    );
    let schema = Schema::parse_file(&main).unwrap();
    assert!(schema.is_valid_str("<r><a/><b/></r>"));
    assert!(!schema.is_valid_str("<r><a/></r>"));
}

#[test]
fn test_document_limit() {
    let dir = TempDir::new().unwrap();
    write(&dir, "b.xsd", &xsd(r#"<xs:element name="b"/>"#));
    let main = write(&dir, "a.xsd", &xsd(r#"<xs:include schemaLocation="b.xsd"/>"#));
    let options = wxs::ParserOptions::new().with_limits(wxs::Limits::default().with_max_schema_documents(1));
    let result = SchemaParser::with_options(options).parse_file(&main);
    assert!(matches!(result, Err(Error::LimitExceeded(_))));
}
