//! XML Schema objects
//!
//! A [`Schema`] is the outcome of a successful construction run: the
//! component arena, the global maps and the schema-document buckets. It is
//! immutable and may be shared between any number of validation runs.
//!
//! ```ignore
//! let schema = Schema::parse_file("order.xsd")?;
//! let report = schema.validate_file("order.xml")?;
//! for diagnostic in &report.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use crate::documents::{Document, NodeId};
use crate::error::Result;
use crate::namespaces::QName;

use super::base::{
    AttributeGroupId, AttributeId, Components, ElementId, GroupDefId, IdcId, NotationId, TypeDef, TypeId,
};
use super::builders::{Bucket, BucketKind, SchemaParser};
use super::document_validation::{validate_pull, validate_tree, XmlPullReader};
use super::elements::ElementDecl;
use super::exceptions::Diagnostic;
use super::globals::GlobalMaps;
use super::validation::{ValidationContext, ValidationOptions, ValidationReport};

/// A constructed, fixed-up schema
#[derive(Debug)]
pub struct Schema {
    components: Components,
    globals: GlobalMaps,
    buckets: Vec<Bucket>,
    warnings: Vec<Diagnostic>,
    target_namespace: Option<String>,
}

impl Schema {
    pub(crate) fn from_parts(
        components: Components,
        globals: GlobalMaps,
        buckets: Vec<Bucket>,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        let target_namespace = buckets
            .iter()
            .find(|b| b.kind == BucketKind::Main)
            .and_then(|b| b.target_namespace.clone());
        Self {
            components,
            globals,
            buckets,
            warnings: diagnostics.into_iter().filter(|d| !d.is_error()).collect(),
            target_namespace,
        }
    }

    /// Build a schema from a string with default parser options
    pub fn parse_str(xsd: &str) -> Result<Self> {
        SchemaParser::new().parse_str(xsd, None)
    }

    /// Build a schema from a file with default parser options
    pub fn parse_file(path: impl AsRef<Path>) -> Result<Self> {
        SchemaParser::new().parse_file(path)
    }

    /// Target namespace of the main schema document
    pub fn target_namespace(&self) -> Option<&str> {
        self.target_namespace.as_deref()
    }

    /// The component arena
    pub fn components(&self) -> &Components {
        &self.components
    }

    /// Global component maps
    pub fn globals(&self) -> &GlobalMaps {
        &self.globals
    }

    /// Schema documents that contributed to this schema
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Warnings reported while building the schema
    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Lookup a global element declaration
    pub fn element(&self, name: &QName) -> Option<ElementId> {
        self.globals.lookup_element(name)
    }

    /// Lookup a global type definition (built-ins included)
    pub fn type_def(&self, name: &QName) -> Option<TypeId> {
        self.globals.lookup_type(name)
    }

    /// Lookup a global attribute declaration
    pub fn attribute(&self, name: &QName) -> Option<AttributeId> {
        self.globals.lookup_attribute(name)
    }

    /// Lookup an attribute group definition
    pub fn attribute_group(&self, name: &QName) -> Option<AttributeGroupId> {
        self.globals.lookup_attribute_group(name)
    }

    /// Lookup a model group definition
    pub fn group(&self, name: &QName) -> Option<GroupDefId> {
        self.globals.lookup_group(name)
    }

    /// Lookup a notation declaration
    pub fn notation(&self, name: &QName) -> Option<NotationId> {
        self.globals.lookup_notation(name)
    }

    /// Lookup an identity-constraint definition
    pub fn identity_constraint(&self, name: &QName) -> Option<IdcId> {
        self.globals.lookup_identity(name)
    }

    /// Global element declarations in definition order
    pub fn elements(&self) -> impl Iterator<Item = (&QName, &ElementDecl)> + '_ {
        self.globals
            .elements
            .iter()
            .map(move |(name, id)| (name, &self.components[*id]))
    }

    /// Global type definitions, built-ins excluded
    pub fn types(&self) -> impl Iterator<Item = (&QName, &TypeDef)> + '_ {
        self.globals
            .types
            .iter()
            .map(move |(name, id)| (name, &self.components[*id]))
            .filter(|(_, ty)| ty.builtin.is_none())
    }

    /// Global attribute declarations
    pub fn attributes(&self) -> impl Iterator<Item = (&QName, AttributeId)> + '_ {
        self.globals.attributes.iter().map(|(name, id)| (name, *id))
    }

    /// Attribute group definitions
    pub fn attribute_groups(&self) -> impl Iterator<Item = (&QName, AttributeGroupId)> + '_ {
        self.globals.attribute_groups.iter().map(|(name, id)| (name, *id))
    }

    /// Model group definitions
    pub fn groups(&self) -> impl Iterator<Item = (&QName, GroupDefId)> + '_ {
        self.globals.groups.iter().map(|(name, id)| (name, *id))
    }

    /// Notation declarations
    pub fn notations(&self) -> impl Iterator<Item = (&QName, NotationId)> + '_ {
        self.globals.notations.iter().map(|(name, id)| (name, *id))
    }

    /// Namespaces that own at least one global component, built-ins excluded
    pub fn namespaces(&self) -> BTreeSet<Option<&str>> {
        let mut namespaces = BTreeSet::new();
        namespaces.extend(self.elements().map(|(name, _)| name.ns()));
        namespaces.extend(self.types().map(|(name, _)| name.ns()));
        namespaces.extend(self.attributes().map(|(name, _)| name.ns()));
        namespaces.extend(self.attribute_groups().map(|(name, _)| name.ns()));
        namespaces.extend(self.groups().map(|(name, _)| name.ns()));
        namespaces
    }

    /// Global components of one namespace
    pub fn namespace_view<'a>(&'a self, namespace: Option<&'a str>) -> NamespaceView<'a> {
        NamespaceView::new(self, namespace)
    }

    /// Counts of the global components, for inspection tools
    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            target_namespace: self.target_namespace.clone(),
            documents: self.buckets.iter().filter_map(|b| b.location.clone()).collect(),
            elements: self.elements().map(|(name, _)| name.to_string()).collect(),
            types: self.types().map(|(name, _)| name.to_string()).collect(),
            attributes: self.attributes().map(|(name, _)| name.to_string()).collect(),
            attribute_groups: self.attribute_groups().map(|(name, _)| name.to_string()).collect(),
            groups: self.groups().map(|(name, _)| name.to_string()).collect(),
            notations: self.notations().map(|(name, _)| name.to_string()).collect(),
            identity_constraints: self.globals.identities.keys().map(|name| name.to_string()).collect(),
            warnings: self.warnings.len(),
        }
    }

    /// A streaming validation context over this schema
    pub fn validator(&self, options: ValidationOptions) -> ValidationContext<'_> {
        ValidationContext::new(self, options)
    }

    /// Validate an XML string with default options
    pub fn validate_str(&self, xml: &str) -> Result<ValidationReport> {
        self.validate_str_with(xml, ValidationOptions::default())
    }

    /// Validate an XML string, streaming it through a pull reader
    pub fn validate_str_with(&self, xml: &str, options: ValidationOptions) -> Result<ValidationReport> {
        options.limits.check_xml_size(xml.len())?;
        let mut context = self.validator(options);
        let mut reader = XmlPullReader::new(xml);
        validate_pull(&mut context, &mut reader)?;
        context.finish()
    }

    /// Validate an XML file with default options
    pub fn validate_file(&self, path: impl AsRef<Path>) -> Result<ValidationReport> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let options = ValidationOptions::default();
        options.limits.check_xml_size(text.len())?;
        let mut context = self.validator(options);
        let location = path.to_string_lossy().into_owned();
        context.set_location(location.clone());
        let mut reader = XmlPullReader::new(&text).with_location(location);
        validate_pull(&mut context, &mut reader)?;
        context.finish()
    }

    /// Whether an XML string is valid; malformed input is not
    pub fn is_valid_str(&self, xml: &str) -> bool {
        self.validate_str(xml).map(|r| r.is_valid()).unwrap_or(false)
    }

    /// Validate a parsed document without modifying it
    pub fn validate_document(&self, document: &Document) -> Result<ValidationReport> {
        let mut context = self.validator(ValidationOptions::default());
        if let Some(location) = document.base_uri() {
            context.set_location(location);
        }
        let Some(root) = document.root() else {
            return context.finish();
        };
        validate_tree(&mut context, document, root)?;
        context.finish()
    }

    /// Validate a parsed document; with `inject_defaults` the defaulted
    /// attributes and element values are written back into it
    pub fn validate_document_mut(
        &self,
        document: &mut Document,
        options: ValidationOptions,
    ) -> Result<ValidationReport> {
        let Some(root) = document.root() else {
            return self.validator(options).finish();
        };
        self.validate_subtree(document, root, options)
    }

    /// Validate the subtree rooted at `node` as if it were a document
    pub fn validate_subtree(
        &self,
        document: &mut Document,
        node: NodeId,
        options: ValidationOptions,
    ) -> Result<ValidationReport> {
        let inject = options.inject_defaults;
        let mut context = self.validator(options);
        if let Some(location) = document.base_uri() {
            context.set_location(location);
        }
        let injections = validate_tree(&mut context, document, node)?;
        if inject {
            injections.apply(document);
        }
        context.finish()
    }
}

/// Global components of a schema filtered by namespace
#[derive(Debug, Clone, Copy)]
pub struct NamespaceView<'a> {
    schema: &'a Schema,
    namespace: Option<&'a str>,
}

impl<'a> NamespaceView<'a> {
    /// Create a view on one namespace
    pub fn new(schema: &'a Schema, namespace: Option<&'a str>) -> Self {
        Self { schema, namespace }
    }

    /// Global elements of the namespace
    pub fn elements(&self) -> impl Iterator<Item = (&'a QName, &'a ElementDecl)> + 'a {
        let namespace = self.namespace;
        self.schema.elements().filter(move |(name, _)| name.ns() == namespace)
    }

    /// Global types of the namespace
    pub fn types(&self) -> impl Iterator<Item = (&'a QName, &'a TypeDef)> + 'a {
        let namespace = self.namespace;
        self.schema.types().filter(move |(name, _)| name.ns() == namespace)
    }

    /// Global attributes of the namespace
    pub fn attributes(&self) -> impl Iterator<Item = (&'a QName, AttributeId)> + 'a {
        let namespace = self.namespace;
        self.schema.attributes().filter(move |(name, _)| name.ns() == namespace)
    }

    /// Whether the namespace has no global component
    pub fn is_empty(&self) -> bool {
        self.elements().next().is_none() && self.types().next().is_none() && self.attributes().next().is_none()
    }
}

/// Names of the global components of a schema
#[derive(Debug, Clone, Serialize)]
pub struct SchemaSummary {
    /// Target namespace of the main document
    pub target_namespace: Option<String>,
    /// Locations of the schema documents
    pub documents: Vec<String>,
    /// Global elements
    pub elements: Vec<String>,
    /// Global types
    pub types: Vec<String>,
    /// Global attributes
    pub attributes: Vec<String>,
    /// Attribute groups
    pub attribute_groups: Vec<String>,
    /// Model groups
    pub groups: Vec<String>,
    /// Notations
    pub notations: Vec<String>,
    /// Identity constraints
    pub identity_constraints: Vec<String>,
    /// Number of construction warnings
    pub warnings: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ORDER: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            xmlns="urn:order" targetNamespace="urn:order" elementFormDefault="qualified">
        <xs:element name="order" type="OrderType"/>
        <xs:complexType name="OrderType">
            <xs:sequence>
                <xs:element name="item" type="xs:string" maxOccurs="unbounded"/>
            </xs:sequence>
            <xs:attribute name="id" type="xs:ID" use="required"/>
        </xs:complexType>
        <xs:attributeGroup name="common">
            <xs:attribute name="lang" type="xs:language"/>
        </xs:attributeGroup>
        <xs:notation name="png" public="image/png"/>
    </xs:schema>"#;

    #[test]
    fn test_lookups() {
        let schema = Schema::parse_str(ORDER).unwrap();
        assert_eq!(schema.target_namespace(), Some("urn:order"));
        let order = schema.element(&QName::namespaced("urn:order", "order")).unwrap();
        let ty = schema.components()[order].type_id().unwrap();
        assert_eq!(schema.type_def(&QName::namespaced("urn:order", "OrderType")), Some(ty));
        assert!(schema.type_def(&QName::xsd("string")).is_some());
        assert!(schema.attribute_group(&QName::namespaced("urn:order", "common")).is_some());
        assert!(schema.notation(&QName::namespaced("urn:order", "png")).is_some());
        assert!(schema.element(&QName::local("order")).is_none());
    }

    #[test]
    fn test_iterators_skip_builtins() {
        let schema = Schema::parse_str(ORDER).unwrap();
        let types: Vec<String> = schema.types().map(|(n, _)| n.to_string()).collect();
        assert_eq!(types, vec!["{urn:order}OrderType".to_string()]);
        let namespaces: Vec<_> = schema.namespaces().into_iter().collect();
        assert_eq!(namespaces, vec![Some("urn:order")]);
    }

    #[test]
    fn test_namespace_view() {
        let schema = Schema::parse_str(ORDER).unwrap();
        let view = schema.namespace_view(Some("urn:order"));
        assert_eq!(view.elements().count(), 1);
        assert!(!view.is_empty());
        assert!(schema.namespace_view(None).is_empty());
    }

    #[test]
    fn test_summary() {
        let schema = Schema::parse_str(ORDER).unwrap();
        let summary = schema.summary();
        assert_eq!(summary.elements, vec!["{urn:order}order".to_string()]);
        assert_eq!(summary.attribute_groups, vec!["{urn:order}common".to_string()]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["target_namespace"], "urn:order");
    }

    #[test]
    fn test_validate_entry_points() {
        let schema = Schema::parse_str(ORDER).unwrap();
        let valid = r#"<order xmlns="urn:order" id="o1"><item>pen</item></order>"#;
        let invalid = r#"<order xmlns="urn:order"><item>pen</item></order>"#;
        assert!(schema.is_valid_str(valid));
        assert!(!schema.is_valid_str(invalid));
        assert!(!schema.is_valid_str("<order"));

        let document = Document::from_string(invalid).unwrap();
        let report = schema.validate_document(&document).unwrap();
        assert_eq!(report.error_count, 1);
    }
}
