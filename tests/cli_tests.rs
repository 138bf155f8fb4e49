//! CLI integration tests
//!
//! These tests run the built binary against schemas and documents written
//! to a temporary directory.

#![cfg(feature = "cli")]

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="order">
    <xs:complexType>
      <xs:sequence>
        <xs:element name="item" type="xs:string" maxOccurs="unbounded"/>
      </xs:sequence>
      <xs:attribute name="id" type="xs:int" use="required"/>
    </xs:complexType>
    <xs:unique name="items">
      <xs:selector xpath="item"/>
      <xs:field xpath="."/>
    </xs:unique>
  </xs:element>
  <xs:complexType name="Unused"/>
</xs:schema>"#;

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let fixture = Self {
            dir: TempDir::new().unwrap(),
        };
        fixture.write("order.xsd", SCHEMA);
        fixture
    }

    fn write(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }
}

fn wxs(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wxs"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run wxs")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_validate_valid_document() {
    let f = Fixture::new();
    f.write("ok.xml", r#"<order id="1"><item>a</item><item>b</item></order>"#);

    let output = wxs(&["validate", "-s", &f.path("order.xsd"), &f.path("ok.xml")]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("ok.xml validates"));
}

#[test]
fn test_validate_invalid_document() {
    let f = Fixture::new();
    f.write("bad.xml", "<order>\n  <item>a</item>\n  <item>a</item>\n</order>");

    let output = wxs(&["validate", "-s", &f.path("order.xsd"), &f.path("bad.xml")]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("bad.xml fails to validate"));
    let errors = stderr(&output);
    assert!(errors.contains("cvc-complex-type.4"), "stderr: {}", errors);
    assert!(errors.contains("cvc-identity-constraint"), "stderr: {}", errors);
}

#[test]
fn test_validate_json_output() {
    let f = Fixture::new();
    f.write("ok.xml", r#"<order id="1"><item>a</item></order>"#);
    f.write("bad.xml", r#"<order id="x"><item>a</item></order>"#);

    let output = wxs(&[
        "validate",
        "-s",
        &f.path("order.xsd"),
        "--format",
        "json",
        &f.path("ok.xml"),
        &f.path("bad.xml"),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let results: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    let results = results.as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["valid"], true);
    assert_eq!(results[0]["code"], 0);
    assert_eq!(results[1]["valid"], false);
    assert_eq!(results[1]["code"], 2);
    assert_eq!(results[1]["report"]["diagnostics"][0]["code"], "cvc-datatype-valid.1");
}

#[test]
fn test_validate_malformed_document() {
    let f = Fixture::new();
    f.write("broken.xml", "<order id=\"1\"><item></order>");

    let output = wxs(&[
        "validate",
        "-s",
        &f.path("order.xsd"),
        "--format",
        "json",
        &f.path("broken.xml"),
    ]);
    assert_eq!(output.status.code(), Some(1));
    let results: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(results[0]["valid"], false);
    assert!(results[0]["code"].as_i64().unwrap() < 0);
}

#[test]
fn test_validate_with_invalid_schema() {
    let f = Fixture::new();
    f.write(
        "broken.xsd",
        r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"><xs:element name="r" type="Nope"/></xs:schema>"#,
    );
    f.write("doc.xml", "<r/>");

    let output = wxs(&["validate", "-s", &f.path("broken.xsd"), &f.path("doc.xml")]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("src-resolve"));
}

#[test]
fn test_validate_requires_files() {
    let f = Fixture::new();
    let output = wxs(&["validate", "-s", &f.path("order.xsd")]);
    assert!(!output.status.success());
}

// ============================================================================
// Inspect Command Tests
// ============================================================================

#[test]
fn test_inspect_summary() {
    let f = Fixture::new();
    let output = wxs(&["inspect", &f.path("order.xsd")]);
    assert_eq!(output.status.code(), Some(0), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Global Elements: 1"));
    assert!(text.contains("Global Types: 1"));
    assert!(text.contains("Identity Constraints: 1"));
    assert!(text.contains("Unused (complex)"));
}

#[test]
fn test_inspect_element_json() {
    let f = Fixture::new();
    let output = wxs(&["inspect", &f.path("order.xsd"), "--element", "order", "--json"]);
    assert_eq!(output.status.code(), Some(0));
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["localName"], "order");
    assert_eq!(json["nillable"], false);
    assert_eq!(json["identityConstraints"][0], "unique items");
}

#[test]
fn test_inspect_unknown_element() {
    let f = Fixture::new();
    let output = wxs(&["inspect", &f.path("order.xsd"), "--element", "missing"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("not found"));
}
