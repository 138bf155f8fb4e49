//! XSD Document Parsing
//!
//! This module turns one schema document into component shells. Every
//! `parse_*` method handles one XSD element kind: it checks the element's
//! attributes against an allow-list, reads and type-checks the attribute
//! values, allocates the component in the session arena and recurses into
//! the children following the schema-for-schemas grammar.
//!
//! References (`ref`, `type`, `base`, `itemType`, `memberTypes`,
//! `substitutionGroup`, `refer`) are stored as pending QNames and resolved
//! by the fixup engine. Structural problems are reported and the offending
//! attribute or child is skipped; parsing always continues with the next
//! sibling.

use std::sync::Arc;

use tracing::debug;

use crate::documents::{Document, NodeId};
use crate::error::{Error, Result};
use crate::names::{is_valid_ncname, is_valid_qname};
use crate::namespaces::{NamespaceContext, QName, XSD_NAMESPACE, XSI_NAMESPACE};
use crate::xpath::{IdcPath, IdentityXPathParser};

use super::attributes::{
    AttributeContainer, AttributeDecl, AttributeGroupDef, AttributeUse, ConstraintKind, Prohibition, UseMode,
    ValueConstraint,
};
use super::base::{
    AttributeGroupId, AttributeId, AttributeUseId, BucketId, ComponentRef, DerivationMethod, DerivationSet, ElementId, Form,
    GroupDefId, IdcId, ModelGroupId, NotationId, ParticleId, Ref, SourcePos, TypeDef, TypeId, TypeKind, WildcardId,
};
use super::builders::{BucketKind, ConstructionSession, RedefineKind, Redefinition, RelationKind};
use super::builtins::BuiltinType;
use super::complex_types::{ComplexTypeDef, ContentSource};
use super::elements::{ElementDecl, ElementScope};
use super::exceptions::ErrorCode;
use super::facets::{compile_pattern, Facet, FacetKind, WhiteSpace};
use super::globals::Notation;
use super::groups::{Compositor, ModelGroup, ModelGroupDef};
use super::identities::{IdcKind, IdentityConstraint};
use super::particles::{parse_occurs, Occurs, Particle, Term};
use super::simple_types::{SimpleTypeDef, Variety};
use super::wildcards::{NamespaceConstraint, ProcessContents, Wildcard};

/// XSD element local names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const ATTRIBUTE: &str = "attribute";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const GROUP: &str = "group";
    pub const SEQUENCE: &str = "sequence";
    pub const CHOICE: &str = "choice";
    pub const ALL: &str = "all";
    pub const ANNOTATION: &str = "annotation";
    pub const IMPORT: &str = "import";
    pub const INCLUDE: &str = "include";
    pub const REDEFINE: &str = "redefine";
    pub const RESTRICTION: &str = "restriction";
    pub const EXTENSION: &str = "extension";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const ANY: &str = "any";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const NOTATION: &str = "notation";
    pub const UNIQUE: &str = "unique";
    pub const KEY: &str = "key";
    pub const KEYREF: &str = "keyref";
    pub const SELECTOR: &str = "selector";
    pub const FIELD: &str = "field";
}

/// XSD attribute names
mod xsd_attrs {
    pub const ID: &str = "id";
    pub const NAME: &str = "name";
    pub const TYPE: &str = "type";
    pub const REF: &str = "ref";
    pub const TARGET_NAMESPACE: &str = "targetNamespace";
    pub const VERSION: &str = "version";
    pub const ELEMENT_FORM_DEFAULT: &str = "elementFormDefault";
    pub const ATTRIBUTE_FORM_DEFAULT: &str = "attributeFormDefault";
    pub const BLOCK_DEFAULT: &str = "blockDefault";
    pub const FINAL_DEFAULT: &str = "finalDefault";
    pub const NILLABLE: &str = "nillable";
    pub const DEFAULT: &str = "default";
    pub const FIXED: &str = "fixed";
    pub const FORM: &str = "form";
    pub const BLOCK: &str = "block";
    pub const FINAL: &str = "final";
    pub const BASE: &str = "base";
    pub const VALUE: &str = "value";
    pub const MIXED: &str = "mixed";
    pub const ABSTRACT: &str = "abstract";
    pub const SUBSTITUTION_GROUP: &str = "substitutionGroup";
    pub const NAMESPACE: &str = "namespace";
    pub const PROCESS_CONTENTS: &str = "processContents";
    pub const SCHEMA_LOCATION: &str = "schemaLocation";
    pub const ITEM_TYPE: &str = "itemType";
    pub const MEMBER_TYPES: &str = "memberTypes";
    pub const PUBLIC: &str = "public";
    pub const SYSTEM: &str = "system";
    pub const MIN_OCCURS: &str = "minOccurs";
    pub const MAX_OCCURS: &str = "maxOccurs";
    pub const USE: &str = "use";
    pub const REFER: &str = "refer";
    pub const XPATH: &str = "xpath";
}

use xsd_attrs::*;
use xsd_elements::*;

const SCHEMA_ATTRS: &[&str] = &[
    ID,
    TARGET_NAMESPACE,
    VERSION,
    ELEMENT_FORM_DEFAULT,
    ATTRIBUTE_FORM_DEFAULT,
    BLOCK_DEFAULT,
    FINAL_DEFAULT,
];
const GLOBAL_ELEMENT_ATTRS: &[&str] = &[
    ID,
    NAME,
    TYPE,
    SUBSTITUTION_GROUP,
    DEFAULT,
    FIXED,
    NILLABLE,
    ABSTRACT,
    FINAL,
    BLOCK,
];
const LOCAL_ELEMENT_ATTRS: &[&str] = &[
    ID, NAME, REF, TYPE, MIN_OCCURS, MAX_OCCURS, DEFAULT, FIXED, NILLABLE, BLOCK, FORM,
];
const GLOBAL_ATTRIBUTE_ATTRS: &[&str] = &[ID, NAME, TYPE, DEFAULT, FIXED];
const LOCAL_ATTRIBUTE_ATTRS: &[&str] = &[ID, NAME, REF, TYPE, USE, DEFAULT, FIXED, FORM];
const GLOBAL_COMPLEX_TYPE_ATTRS: &[&str] = &[ID, NAME, ABSTRACT, BLOCK, FINAL, MIXED];
const LOCAL_COMPLEX_TYPE_ATTRS: &[&str] = &[ID, MIXED];
const GLOBAL_SIMPLE_TYPE_ATTRS: &[&str] = &[ID, NAME, FINAL];
const ANY_ATTRS: &[&str] = &[ID, MIN_OCCURS, MAX_OCCURS, NAMESPACE, PROCESS_CONTENTS];
const ANY_ATTRIBUTE_ATTRS: &[&str] = &[ID, NAMESPACE, PROCESS_CONTENTS];

const EXTENSION_RESTRICTION: DerivationSet = DerivationSet {
    extension: true,
    restriction: true,
    substitution: false,
    list: false,
    union: false,
};
const ELEMENT_BLOCK: DerivationSet = DerivationSet {
    extension: true,
    restriction: true,
    substitution: true,
    list: false,
    union: false,
};
const SIMPLE_FINAL: DerivationSet = DerivationSet {
    extension: false,
    restriction: true,
    substitution: false,
    list: true,
    union: true,
};
const FINAL_DEFAULT_ALLOWED: DerivationSet = DerivationSet {
    extension: true,
    restriction: true,
    substitution: false,
    list: true,
    union: true,
};

/// An `<attribute>` child of a type or attribute group
enum LocalAttribute {
    Use(AttributeUseId),
    Prohibited(Prohibition),
}

/// Parse one schema document into its bucket.
///
/// Referenced documents are queued on the session, not parsed here.
pub fn parse_schema_document(session: &mut ConstructionSession, bucket: BucketId, doc: &Document) -> Result<()> {
    let root = doc
        .root()
        .ok_or_else(|| Error::Internal("schema document without a root element".to_string()))?;
    let b = session.bucket(bucket);
    let kind = b.kind;
    let mut cx = ParseContext {
        doc,
        bucket,
        file: b.location.as_deref().map(Arc::from),
        tns: b.target_namespace.clone(),
        chameleon: b.is_chameleon(),
        element_form: Form::Unqualified,
        attribute_form: Form::Unqualified,
        block_default: DerivationSet::empty(),
        final_default: DerivationSet::empty(),
        session,
    };

    if !doc
        .name(root)
        .map_or(false, |n| n.is(Some(XSD_NAMESPACE), SCHEMA))
    {
        cx.error(
            ErrorCode::ElemMissing,
            root,
            format!("the document element must be {{{}}}schema", XSD_NAMESPACE),
        );
        if kind == BucketKind::Main {
            cx.session.stop = true;
        }
        return Ok(());
    }

    let before = cx.session.components.len();
    cx.parse_schema(root)?;
    debug!(
        bucket = bucket.index(),
        components = cx.session.components.len() - before,
        chameleon = cx.chameleon,
        "schema document parsed"
    );
    Ok(())
}

/// Per-document parser state
struct ParseContext<'a> {
    session: &'a mut ConstructionSession,
    doc: &'a Document,
    bucket: BucketId,
    file: Option<Arc<str>>,
    /// Effective target namespace
    tns: Option<String>,
    chameleon: bool,
    element_form: Form,
    attribute_form: Form,
    block_default: DerivationSet,
    final_default: DerivationSet,
}

impl<'a> ParseContext<'a> {
    // ------------------------------------------------------------------
    // helpers
    // ------------------------------------------------------------------

    fn pos(&self, node: NodeId) -> SourcePos {
        SourcePos::new(self.file.clone(), self.doc.line(node), self.doc.column(node))
    }

    fn error(&mut self, code: ErrorCode, node: NodeId, message: impl Into<String>) {
        let pos = self.pos(node);
        self.session.error(code, &pos, message);
    }

    fn warning(&mut self, code: ErrorCode, node: NodeId, message: impl Into<String>) {
        let pos = self.pos(node);
        self.session.warning(code, &pos, message);
    }

    fn local_name(&self, node: NodeId) -> &'a str {
        let doc = self.doc;
        doc.name(node).map(|n| n.local_name.as_str()).unwrap_or("")
    }

    fn attr(&self, node: NodeId, name: &str) -> Option<&'a str> {
        let doc = self.doc;
        doc.attribute(node, None, name)
    }

    fn namespaces(&self, node: NodeId) -> NamespaceContext {
        self.doc
            .element(node)
            .map(|e| e.namespaces.clone())
            .unwrap_or_default()
    }

    /// Report attributes outside the allow-list and attributes in the XSD
    /// namespace; foreign-namespace attributes are always allowed
    fn check_attributes(&mut self, node: NodeId, allowed: &[&str]) {
        let doc = self.doc;
        let Some(element) = doc.element(node) else {
            return;
        };
        for attribute in &element.attributes {
            let ok = match attribute.name.ns() {
                None => allowed.contains(&attribute.name.local_name.as_str()),
                Some(ns) => ns != XSD_NAMESPACE,
            };
            if !ok {
                self.error(
                    ErrorCode::AttrNotAllowed,
                    node,
                    format!(
                        "the attribute '{}' is not allowed on <{}>",
                        attribute.name,
                        element.name.local_name
                    ),
                );
            }
        }
    }

    /// XSD children of an element, annotations removed. An annotation is
    /// only allowed as the first child.
    fn content(&mut self, node: NodeId) -> Vec<NodeId> {
        self.collect_content(node, false)
    }

    /// Children of `<schema>` and `<redefine>`, where annotations may appear
    /// anywhere
    fn top_level_content(&mut self, node: NodeId) -> Vec<NodeId> {
        self.collect_content(node, true)
    }

    fn collect_content(&mut self, node: NodeId, annotations_anywhere: bool) -> Vec<NodeId> {
        let doc = self.doc;
        let mut content = Vec::new();
        let mut annotated = false;
        for child in doc.child_elements(node) {
            let Some(name) = doc.name(child) else {
                continue;
            };
            if name.ns() != Some(XSD_NAMESPACE) {
                self.error(
                    ErrorCode::ElemNotAllowed,
                    child,
                    format!("the element {} is not allowed in <{}>", name, self.local_name(node)),
                );
                continue;
            }
            if name.local_name == ANNOTATION {
                if !annotations_anywhere && (annotated || !content.is_empty()) {
                    self.error(
                        ErrorCode::ElemNotAllowed,
                        child,
                        format!("<annotation> must be the first child of <{}>", self.local_name(node)),
                    );
                }
                annotated = true;
                continue;
            }
            content.push(child);
        }
        content
    }

    /// Report every element of `extra` as unexpected
    fn unexpected(&mut self, parent: NodeId, extra: &[NodeId]) {
        for &child in extra {
            let message = format!(
                "the element <{}> is not allowed here in <{}>",
                self.local_name(child),
                self.local_name(parent)
            );
            self.error(ErrorCode::ElemNotAllowed, child, message);
        }
    }

    fn expect_empty(&mut self, node: NodeId) {
        let children = self.content(node);
        self.unexpected(node, &children);
    }

    fn required_attr(&mut self, node: NodeId, name: &str) -> Option<&'a str> {
        let value = self.attr(node, name);
        if value.is_none() {
            let message = format!("the attribute '{}' is required on <{}>", name, self.local_name(node));
            self.error(ErrorCode::AttrMissing, node, message);
        }
        value
    }

    fn required_ncname(&mut self, node: NodeId, name: &str) -> Option<&'a str> {
        let value = self.required_attr(node, name)?.trim();
        if !is_valid_ncname(value) {
            self.error(
                ErrorCode::AttrInvalidValue,
                node,
                format!("'{}' is not a valid value for '{}': not an NCName", value, name),
            );
            return None;
        }
        Some(value)
    }

    /// Resolve a QName literal in the scope of `node`. Unprefixed names of
    /// a chameleon document move into the including namespace.
    fn resolve_qname(&mut self, node: NodeId, attr_name: &str, value: &str) -> Option<QName> {
        let value = value.trim();
        if !is_valid_qname(value) {
            self.error(
                ErrorCode::AttrInvalidValue,
                node,
                format!("'{}' is not a valid value for '{}': not a QName", value, attr_name),
            );
            return None;
        }
        let doc = self.doc;
        let element = doc.element(node)?;
        match element.namespaces.resolve(value) {
            Ok(mut qname) => {
                if qname.namespace.is_none() && self.chameleon {
                    qname.namespace = self.tns.clone();
                }
                Some(qname)
            }
            Err(e) => {
                self.error(
                    ErrorCode::AttrInvalidValue,
                    node,
                    format!("invalid value for '{}': {}", attr_name, e),
                );
                None
            }
        }
    }

    fn qname_attr(&mut self, node: NodeId, name: &str) -> Option<QName> {
        let value = self.attr(node, name)?;
        self.resolve_qname(node, name, value)
    }

    fn bool_attr(&mut self, node: NodeId, name: &str) -> Option<bool> {
        let value = self.attr(node, name)?;
        match value.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            other => {
                self.error(
                    ErrorCode::AttrInvalidValue,
                    node,
                    format!("'{}' is not a valid value for '{}': expected a boolean", other, name),
                );
                None
            }
        }
    }

    fn derivation_attr(&mut self, node: NodeId, name: &str, allowed: DerivationSet) -> Option<DerivationSet> {
        let value = self.attr(node, name)?;
        match DerivationSet::parse(value, allowed) {
            Ok(set) => Some(set),
            Err(message) => {
                self.error(
                    ErrorCode::AttrInvalidValue,
                    node,
                    format!("invalid value for '{}': {}", name, message),
                );
                None
            }
        }
    }

    fn form_attr(&mut self, node: NodeId) -> Option<Form> {
        let value = self.attr(node, FORM)?;
        let form = Form::parse(value);
        if form.is_none() {
            self.error(
                ErrorCode::AttrInvalidValue,
                node,
                format!("'{}' is not a valid value for 'form'", value),
            );
        }
        form
    }

    /// minOccurs/maxOccurs; `None` for a particle that cannot occur
    fn occurs(&mut self, node: NodeId) -> Option<Occurs> {
        let parsed = parse_occurs(self.attr(node, MIN_OCCURS), self.attr(node, MAX_OCCURS));
        for message in parsed.malformed {
            self.error(ErrorCode::AttrInvalidValue, node, message);
        }
        if parsed.inverted {
            self.error(
                ErrorCode::PPropsCorrect,
                node,
                "p-props-correct.2.1: maxOccurs must not be less than minOccurs",
            );
        }
        if parsed.occurs.is_empty() {
            return None;
        }
        Some(parsed.occurs)
    }

    fn value_constraint(&mut self, node: NodeId, code: ErrorCode) -> Option<ValueConstraint> {
        let default = self.attr(node, DEFAULT);
        let fixed = self.attr(node, FIXED);
        let (kind, lexical) = match (default, fixed) {
            (Some(_), Some(f)) => {
                self.error(code, node, "'default' and 'fixed' must not both be present");
                (ConstraintKind::Fixed, f)
            }
            (Some(d), None) => (ConstraintKind::Default, d),
            (None, Some(f)) => (ConstraintKind::Fixed, f),
            (None, None) => return None,
        };
        Some(ValueConstraint::new(kind, lexical, self.namespaces(node)))
    }

    fn add_particle(&mut self, occurs: Occurs, term: Term, pos: SourcePos) -> ParticleId {
        self.session.components.add_particle(Particle::new(occurs, term, pos))
    }

    // ------------------------------------------------------------------
    // schema and composition
    // ------------------------------------------------------------------

    fn parse_schema(&mut self, root: NodeId) -> Result<()> {
        self.check_attributes(root, SCHEMA_ATTRS);

        if self.attr(root, TARGET_NAMESPACE) == Some("") {
            self.error(
                ErrorCode::AttrInvalidValue,
                root,
                "the value of 'targetNamespace' must not be empty",
            );
        }
        if let Some(value) = self.attr(root, ELEMENT_FORM_DEFAULT) {
            match Form::parse(value) {
                Some(form) => self.element_form = form,
                None => self.error(
                    ErrorCode::AttrInvalidValue,
                    root,
                    format!("'{}' is not a valid value for 'elementFormDefault'", value),
                ),
            }
        }
        if let Some(value) = self.attr(root, ATTRIBUTE_FORM_DEFAULT) {
            match Form::parse(value) {
                Some(form) => self.attribute_form = form,
                None => self.error(
                    ErrorCode::AttrInvalidValue,
                    root,
                    format!("'{}' is not a valid value for 'attributeFormDefault'", value),
                ),
            }
        }
        if let Some(set) = self.derivation_attr(root, BLOCK_DEFAULT, ELEMENT_BLOCK) {
            self.block_default = set;
        }
        if let Some(set) = self.derivation_attr(root, FINAL_DEFAULT, FINAL_DEFAULT_ALLOWED) {
            self.final_default = set;
        }

        let mut definitions = false;
        for child in self.top_level_content(root) {
            if self.session.stop {
                break;
            }
            match self.local_name(child) {
                INCLUDE | IMPORT | REDEFINE if definitions => {
                    let message = format!(
                        "<{}> must come before the definitions of the schema",
                        self.local_name(child)
                    );
                    self.error(ErrorCode::ElemNotAllowed, child, message);
                }
                INCLUDE => self.parse_include(child)?,
                IMPORT => self.parse_import(child)?,
                REDEFINE => self.parse_redefine(child)?,
                SIMPLE_TYPE => {
                    definitions = true;
                    self.parse_simple_type(child, true);
                }
                COMPLEX_TYPE => {
                    definitions = true;
                    self.parse_complex_type(child, true);
                }
                ELEMENT => {
                    definitions = true;
                    self.parse_global_element(child);
                }
                ATTRIBUTE => {
                    definitions = true;
                    self.parse_global_attribute(child);
                }
                ATTRIBUTE_GROUP => {
                    definitions = true;
                    self.parse_attribute_group_def(child);
                }
                GROUP => {
                    definitions = true;
                    self.parse_group_def(child);
                }
                NOTATION => {
                    definitions = true;
                    self.parse_notation(child);
                }
                other => {
                    let message = format!("the element <{}> is not allowed in <schema>", other);
                    self.error(ErrorCode::ElemNotAllowed, child, message);
                }
            }
        }
        Ok(())
    }

    fn parse_include(&mut self, node: NodeId) -> Result<()> {
        self.check_attributes(node, &[ID, SCHEMA_LOCATION]);
        self.expect_empty(node);
        let Some(location) = self.required_attr(node, SCHEMA_LOCATION) else {
            return Ok(());
        };
        let pos = self.pos(node);
        self.session
            .request_document(RelationKind::Include, self.bucket, location, None, &pos)?;
        Ok(())
    }

    fn parse_import(&mut self, node: NodeId) -> Result<()> {
        self.check_attributes(node, &[ID, NAMESPACE, SCHEMA_LOCATION]);
        self.expect_empty(node);
        let namespace = self.attr(node, NAMESPACE).map(str::trim);
        if namespace == Some("") {
            self.error(
                ErrorCode::AttrInvalidValue,
                node,
                "the value of 'namespace' must not be empty",
            );
            return Ok(());
        }
        if namespace.is_some() && namespace == self.tns.as_deref() {
            self.error(
                ErrorCode::SrcImport,
                node,
                format!(
                    "src-import.1.1: the imported namespace '{}' must differ from the target namespace of the importing document",
                    namespace.unwrap_or("")
                ),
            );
            return Ok(());
        }
        if namespace.is_none() && self.tns.is_none() {
            self.error(
                ErrorCode::SrcImport,
                node,
                "src-import.1.2: a document without a target namespace must give 'namespace' on <import>",
            );
            return Ok(());
        }

        let pos = self.pos(node);
        let loaded = match self.attr(node, SCHEMA_LOCATION) {
            Some(location) => {
                self.session
                    .request_document(RelationKind::Import, self.bucket, location, namespace, &pos)?
            }
            None => None,
        };
        if loaded.is_none() && !self.session.bucket(self.bucket).imports(namespace) {
            self.session
                .add_import_without_location(self.bucket, namespace.map(str::to_string));
        }
        Ok(())
    }

    fn parse_redefine(&mut self, node: NodeId) -> Result<()> {
        self.check_attributes(node, &[ID, SCHEMA_LOCATION]);
        let target = match self.required_attr(node, SCHEMA_LOCATION) {
            Some(location) => {
                let pos = self.pos(node);
                self.session
                    .request_document(RelationKind::Redefine, self.bucket, location, None, &pos)?
            }
            None => None,
        };

        for child in self.top_level_content(node) {
            let Some(target) = target else {
                continue;
            };
            let pos = self.pos(child);
            let parsed = match self.local_name(child) {
                SIMPLE_TYPE => self
                    .parse_simple_type(child, true)
                    .map(|t| (RedefineKind::Type, ComponentRef::Type(t))),
                COMPLEX_TYPE => self
                    .parse_complex_type(child, true)
                    .map(|t| (RedefineKind::Type, ComponentRef::Type(t))),
                GROUP => self
                    .parse_group_def(child)
                    .map(|g| (RedefineKind::Group, ComponentRef::GroupDef(g))),
                ATTRIBUTE_GROUP => self
                    .parse_attribute_group_def(child)
                    .map(|g| (RedefineKind::AttributeGroup, ComponentRef::AttributeGroup(g))),
                other => {
                    let message = format!("the element <{}> is not allowed in <redefine>", other);
                    self.error(ErrorCode::ElemNotAllowed, child, message);
                    None
                }
            };
            let Some((kind, component)) = parsed else {
                continue;
            };
            let components = &self.session.components;
            let name = match component {
                ComponentRef::Type(t) => components[t].name.clone(),
                ComponentRef::GroupDef(g) => Some(components[g].name.clone()),
                ComponentRef::AttributeGroup(g) => Some(components[g].name.clone()),
                _ => None,
            };
            if let Some(name) = name {
                self.session.redefinitions.push(Redefinition {
                    kind,
                    component,
                    name,
                    target,
                    pos,
                });
            }
        }
        Ok(())
    }

    fn parse_notation(&mut self, node: NodeId) -> Option<NotationId> {
        self.check_attributes(node, &[ID, NAME, PUBLIC, SYSTEM]);
        self.expect_empty(node);
        let name = self.required_ncname(node, NAME)?;
        let public = self.attr(node, PUBLIC);
        let system = self.attr(node, SYSTEM);
        if public.is_none() && system.is_none() {
            self.error(
                ErrorCode::AttrMissing,
                node,
                "<notation> needs 'public' or 'system'",
            );
        }
        let mut notation = Notation::new(QName::new(self.tns.clone(), name));
        notation.public = public.map(str::to_string);
        notation.system = system.map(str::to_string);
        notation.pos = self.pos(node);
        notation.bucket = Some(self.bucket);
        let id = self.session.components.add_notation(notation);
        self.session.anchor(self.bucket, ComponentRef::Notation(id), true);
        Some(id)
    }

    // ------------------------------------------------------------------
    // element declarations
    // ------------------------------------------------------------------

    fn parse_global_element(&mut self, node: NodeId) -> Option<ElementId> {
        self.check_attributes(node, GLOBAL_ELEMENT_ATTRS);
        let name = self.required_ncname(node, NAME)?;
        let mut decl = ElementDecl::new(QName::new(self.tns.clone(), name), ElementScope::Global, self.pos(node));
        decl.substitution_head = self.qname_attr(node, SUBSTITUTION_GROUP).map(Ref::Pending);
        decl.is_abstract = self.bool_attr(node, ABSTRACT).unwrap_or(false);
        decl.final_ = self
            .derivation_attr(node, FINAL, EXTENSION_RESTRICTION)
            .unwrap_or_else(|| self.final_default.masked(EXTENSION_RESTRICTION));
        Some(self.fill_element(node, decl, true))
    }

    /// Local element particle, either a declaration or a reference
    fn parse_local_element(&mut self, node: NodeId) -> Option<ParticleId> {
        self.check_attributes(node, LOCAL_ELEMENT_ATTRS);
        let occurs = self.occurs(node)?;
        let pos = self.pos(node);

        if let Some(reference) = self.attr(node, REF) {
            for attr in [NAME, TYPE, NILLABLE, DEFAULT, FIXED, FORM, BLOCK] {
                if self.attr(node, attr).is_some() {
                    self.error(
                        ErrorCode::SrcElement,
                        node,
                        format!("src-element.2.2: '{}' is not allowed together with 'ref'", attr),
                    );
                }
            }
            let children = self.content(node);
            if !children.is_empty() {
                self.error(
                    ErrorCode::SrcElement,
                    node,
                    "src-element.2.2: an element reference must not have a type or identity constraints",
                );
            }
            let qname = self.resolve_qname(node, REF, reference)?;
            return Some(self.add_particle(occurs, Term::Element(Ref::Pending(qname)), pos));
        }

        if self.attr(node, NAME).is_none() {
            self.error(
                ErrorCode::SrcElement,
                node,
                "src-element.2.1: one of 'ref' or 'name' must be present",
            );
            return None;
        }
        let name = self.required_ncname(node, NAME)?;
        let form = self.form_attr(node).unwrap_or(self.element_form);
        let namespace = match form {
            Form::Qualified => self.tns.clone(),
            Form::Unqualified => None,
        };
        let decl = ElementDecl::new(QName::new(namespace, name), ElementScope::Local, pos.clone());
        let id = self.fill_element(node, decl, false);
        Some(self.add_particle(occurs, Term::Element(Ref::Resolved(id)), pos))
    }

    /// Properties shared by global and local declarations, then the
    /// children: an optional anonymous type and the identity constraints
    fn fill_element(&mut self, node: NodeId, mut decl: ElementDecl, global: bool) -> ElementId {
        decl.nillable = self.bool_attr(node, NILLABLE).unwrap_or(false);
        decl.block = self
            .derivation_attr(node, BLOCK, ELEMENT_BLOCK)
            .unwrap_or_else(|| self.block_default.masked(ELEMENT_BLOCK));
        decl.value_constraint = self.value_constraint(node, ErrorCode::SrcElement);
        decl.bucket = Some(self.bucket);
        let type_attr = self.qname_attr(node, TYPE);
        let has_type_attr = self.attr(node, TYPE).is_some();
        decl.type_def = type_attr.map(Ref::Pending);

        let id = self.session.components.add_element(decl);
        self.session.anchor(self.bucket, ComponentRef::Element(id), global);

        let mut seen_type = false;
        let mut seen_idc = false;
        for child in self.content(node) {
            match self.local_name(child) {
                SIMPLE_TYPE | COMPLEX_TYPE if !seen_type && !seen_idc => {
                    seen_type = true;
                    if has_type_attr {
                        self.error(
                            ErrorCode::SrcElement,
                            child,
                            "src-element.3: 'type' and an anonymous type definition must not both be present",
                        );
                        continue;
                    }
                    let anonymous = if self.local_name(child) == SIMPLE_TYPE {
                        self.parse_simple_type(child, false)
                    } else {
                        self.parse_complex_type(child, false)
                    };
                    if let Some(t) = anonymous {
                        self.session.components[id].type_def = Some(Ref::Resolved(t));
                    }
                }
                UNIQUE | KEY | KEYREF => {
                    seen_idc = true;
                    if let Some(c) = self.parse_idc(child, id) {
                        self.session.components[id].idcs.push(c);
                    }
                }
                _ => self.unexpected(node, &[child]),
            }
        }
        id
    }

    fn parse_idc(&mut self, node: NodeId, element: ElementId) -> Option<IdcId> {
        let kind = IdcKind::from_tag(self.local_name(node))?;
        let allowed: &[&str] = if kind == IdcKind::Keyref {
            &[ID, NAME, REFER]
        } else {
            &[ID, NAME]
        };
        self.check_attributes(node, allowed);
        let name = self.required_ncname(node, NAME)?;
        let refer = if kind == IdcKind::Keyref {
            let value = self.required_attr(node, REFER)?;
            Some(Ref::Pending(self.resolve_qname(node, REFER, value)?))
        } else {
            None
        };

        let children = self.content(node);
        let Some((&selector_node, field_nodes)) = children.split_first() else {
            self.error(
                ErrorCode::ElemMissing,
                node,
                format!("<{}> must contain a <selector> and at least one <field>", kind),
            );
            return None;
        };
        if self.local_name(selector_node) != SELECTOR {
            self.error(
                ErrorCode::ElemMissing,
                selector_node,
                format!("<{}> must start with <selector>", kind),
            );
            return None;
        }
        let selector = self.parse_xpath(selector_node, false)?;
        let mut fields = Vec::new();
        for &f in field_nodes {
            if self.local_name(f) != FIELD {
                self.unexpected(node, &[f]);
                continue;
            }
            if let Some(path) = self.parse_xpath(f, true) {
                fields.push(path);
            }
        }
        if fields.is_empty() {
            self.error(
                ErrorCode::ElemMissing,
                node,
                format!("<{}> must contain at least one valid <field>", kind),
            );
            return None;
        }

        let idc = IdentityConstraint {
            name: QName::new(self.tns.clone(), name),
            kind,
            selector,
            fields,
            refer,
            element: Some(element),
            pos: self.pos(node),
            bucket: Some(self.bucket),
        };
        let id = self.session.components.add_idc(idc);
        self.session.anchor(self.bucket, ComponentRef::Idc(id), false);
        Some(id)
    }

    fn parse_xpath(&mut self, node: NodeId, field: bool) -> Option<Arc<IdcPath>> {
        self.check_attributes(node, &[ID, XPATH]);
        self.expect_empty(node);
        let xpath = self.required_attr(node, XPATH)?;
        let parser = if field {
            IdentityXPathParser::for_field()
        } else {
            IdentityXPathParser::new()
        };
        match parser.parse(xpath, &self.namespaces(node)) {
            Ok(path) => Some(Arc::new(path)),
            Err(e) => {
                let code = if field {
                    ErrorCode::FieldXPath
                } else {
                    ErrorCode::SelectorXPath
                };
                self.error(code, node, format!("invalid XPath expression '{}': {}", xpath, e));
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // attribute declarations and groups
    // ------------------------------------------------------------------

    fn parse_global_attribute(&mut self, node: NodeId) -> Option<AttributeId> {
        self.check_attributes(node, GLOBAL_ATTRIBUTE_ATTRS);
        let name = self.required_ncname(node, NAME)?;
        let qname = QName::new(self.tns.clone(), name);
        if !self.attribute_name_allowed(node, &qname) {
            return None;
        }
        let value_constraint = self.value_constraint(node, ErrorCode::SrcAttribute);
        let type_def = self.attribute_type(node);
        let decl = AttributeDecl {
            name: qname,
            global: true,
            type_def,
            value_constraint,
            pos: self.pos(node),
            bucket: Some(self.bucket),
            invalid: false,
        };
        let id = self.session.components.add_attribute(decl);
        self.session.anchor(self.bucket, ComponentRef::Attribute(id), true);
        Some(id)
    }

    /// `xmlns` and the xsi namespace cannot be declared
    fn attribute_name_allowed(&mut self, node: NodeId, name: &QName) -> bool {
        if name.local_name == "xmlns" && name.namespace.is_none() {
            self.error(ErrorCode::SrcAttribute, node, "no-xmlns: an attribute must not be named 'xmlns'");
            return false;
        }
        if name.ns() == Some(XSI_NAMESPACE) {
            self.error(
                ErrorCode::SrcAttribute,
                node,
                format!("no-xsi: attributes in '{}' cannot be declared", XSI_NAMESPACE),
            );
            return false;
        }
        true
    }

    fn attribute_type(&mut self, node: NodeId) -> Ref<TypeId> {
        let type_attr = self.qname_attr(node, TYPE);
        let mut anonymous = None;
        for child in self.content(node) {
            if self.local_name(child) == SIMPLE_TYPE && anonymous.is_none() {
                anonymous = self.parse_simple_type(child, false);
            } else {
                self.unexpected(node, &[child]);
            }
        }
        match (type_attr, anonymous) {
            (Some(_), Some(t)) => {
                self.error(
                    ErrorCode::SrcAttribute,
                    node,
                    "src-attribute.4: 'type' and an anonymous type definition must not both be present",
                );
                Ref::Resolved(t)
            }
            (Some(qname), None) => Ref::Pending(qname),
            (None, Some(t)) => Ref::Resolved(t),
            (None, None) => Ref::Resolved(TypeId::builtin(BuiltinType::AnySimpleType)),
        }
    }

    fn parse_local_attribute(&mut self, node: NodeId) -> Option<LocalAttribute> {
        self.check_attributes(node, LOCAL_ATTRIBUTE_ATTRS);
        let pos = self.pos(node);
        let mode = match self.attr(node, USE) {
            Some(value) => UseMode::from_str(value).unwrap_or_else(|| {
                self.error(
                    ErrorCode::AttrInvalidValue,
                    node,
                    format!("'{}' is not a valid value for 'use'", value),
                );
                UseMode::Optional
            }),
            None => UseMode::Optional,
        };
        let mut constraint = self.value_constraint(node, ErrorCode::SrcAttribute);
        if mode != UseMode::Optional && self.attr(node, DEFAULT).is_some() {
            self.error(
                ErrorCode::SrcAttribute,
                node,
                "src-attribute.2: 'use' must be 'optional' when 'default' is present",
            );
        }

        let (decl, name) = if let Some(reference) = self.attr(node, REF) {
            for attr in [NAME, FORM, TYPE] {
                if self.attr(node, attr).is_some() {
                    self.error(
                        ErrorCode::SrcAttribute,
                        node,
                        format!("src-attribute.3.1: '{}' is not allowed together with 'ref'", attr),
                    );
                }
            }
            if !self.content(node).is_empty() {
                self.error(
                    ErrorCode::SrcAttribute,
                    node,
                    "src-attribute.3.2: an attribute reference must not have an anonymous type",
                );
            }
            let qname = self.resolve_qname(node, REF, reference)?;
            (Ref::Pending(qname.clone()), qname)
        } else {
            let name = self.required_ncname(node, NAME)?;
            let form = self.form_attr(node).unwrap_or(self.attribute_form);
            let namespace = match form {
                Form::Qualified => self.tns.clone(),
                Form::Unqualified => None,
            };
            let qname = QName::new(namespace, name);
            if !self.attribute_name_allowed(node, &qname) {
                return None;
            }
            if mode == UseMode::Prohibited {
                return Some(LocalAttribute::Prohibited(Prohibition { name: qname, pos }));
            }
            let type_def = self.attribute_type(node);
            let decl = AttributeDecl {
                name: qname.clone(),
                global: false,
                type_def,
                value_constraint: constraint.take(),
                pos: pos.clone(),
                bucket: Some(self.bucket),
                invalid: false,
            };
            let id = self.session.components.add_attribute(decl);
            self.session.anchor(self.bucket, ComponentRef::Attribute(id), false);
            (Ref::Resolved(id), qname)
        };

        if mode == UseMode::Prohibited {
            return Some(LocalAttribute::Prohibited(Prohibition { name, pos }));
        }
        let use_id = self.session.components.add_attribute_use(AttributeUse {
            decl,
            required: mode == UseMode::Required,
            value_constraint: constraint,
            pos,
        });
        self.session
            .record_local(self.bucket, ComponentRef::AttributeUse(use_id));
        Some(LocalAttribute::Use(use_id))
    }

    /// `(attribute | attributeGroup)*, anyAttribute?`
    fn parse_attribute_content(&mut self, parent: NodeId, children: &[NodeId]) -> AttributeContainer {
        let mut container = AttributeContainer::default();
        let mut closed = false;
        for &child in children {
            match self.local_name(child) {
                ATTRIBUTE if !closed => match self.parse_local_attribute(child) {
                    Some(LocalAttribute::Use(u)) => container.uses.push(u),
                    Some(LocalAttribute::Prohibited(p)) => container.prohibitions.push(p),
                    None => {}
                },
                ATTRIBUTE_GROUP if !closed => {
                    if let Some(name) = self.parse_attribute_group_ref(child) {
                        let pos = self.pos(child);
                        container.group_refs.push((Ref::Pending(name), pos));
                    }
                }
                ANY_ATTRIBUTE if !closed => {
                    closed = true;
                    container.wildcard = self.parse_any_attribute(child);
                }
                _ => self.unexpected(parent, &[child]),
            }
        }
        container
    }

    fn parse_attribute_group_ref(&mut self, node: NodeId) -> Option<QName> {
        self.check_attributes(node, &[ID, REF]);
        self.expect_empty(node);
        let value = self.required_attr(node, REF)?;
        self.resolve_qname(node, REF, value)
    }

    fn parse_attribute_group_def(&mut self, node: NodeId) -> Option<AttributeGroupId> {
        self.check_attributes(node, &[ID, NAME]);
        if self.attr(node, REF).is_some() {
            self.error(
                ErrorCode::SrcAttributeGroup,
                node,
                "a top-level <attributeGroup> must have 'name', not 'ref'",
            );
            return None;
        }
        let name = self.required_ncname(node, NAME)?;
        let children = self.content(node);
        let content = self.parse_attribute_content(node, &children);
        let mut def = AttributeGroupDef::new(QName::new(self.tns.clone(), name), content, self.pos(node));
        def.bucket = Some(self.bucket);
        let id = self.session.components.add_attribute_group(def);
        self.session.anchor(self.bucket, ComponentRef::AttributeGroup(id), true);
        Some(id)
    }

    fn parse_any_attribute(&mut self, node: NodeId) -> Option<WildcardId> {
        self.check_attributes(node, ANY_ATTRIBUTE_ATTRS);
        self.expect_empty(node);
        let wildcard = self.wildcard(node)?;
        let id = self.session.components.add_wildcard(wildcard);
        Some(id)
    }

    fn wildcard(&mut self, node: NodeId) -> Option<Wildcard> {
        let namespaces = match self.attr(node, NAMESPACE) {
            Some(value) => match NamespaceConstraint::from_namespace_attr(value, self.tns.as_deref()) {
                Ok(constraint) => constraint,
                Err(e) => {
                    self.error(ErrorCode::AttrInvalidValue, node, e.to_string());
                    return None;
                }
            },
            None => NamespaceConstraint::Any,
        };
        let process_contents = match self.attr(node, PROCESS_CONTENTS) {
            Some(value) => ProcessContents::from_str(value.trim()).unwrap_or_else(|| {
                self.error(
                    ErrorCode::AttrInvalidValue,
                    node,
                    format!("'{}' is not a valid value for 'processContents'", value),
                );
                ProcessContents::Strict
            }),
            None => ProcessContents::Strict,
        };
        let mut wildcard = Wildcard::new(namespaces, process_contents);
        wildcard.pos = self.pos(node);
        Some(wildcard)
    }

    // ------------------------------------------------------------------
    // model groups
    // ------------------------------------------------------------------

    fn parse_group_def(&mut self, node: NodeId) -> Option<GroupDefId> {
        self.check_attributes(node, &[ID, NAME]);
        let name = self.required_ncname(node, NAME)?;
        let children = self.content(node);
        let model_group = match children.split_first() {
            Some((&first, rest)) if Compositor::from_tag(self.local_name(first)).is_some() => {
                self.unexpected(node, rest);
                self.parse_model_group(first, true)
            }
            _ => {
                self.error(
                    ErrorCode::ElemMissing,
                    node,
                    "a model group definition must contain one of <all>, <choice> or <sequence>",
                );
                None
            }
        };
        let def = ModelGroupDef {
            name: QName::new(self.tns.clone(), name),
            model_group,
            pos: self.pos(node),
            bucket: Some(self.bucket),
            redefined: false,
        };
        let id = self.session.components.add_group_def(def);
        self.session.anchor(self.bucket, ComponentRef::GroupDef(id), true);
        Some(id)
    }

    fn parse_group_ref(&mut self, node: NodeId) -> Option<ParticleId> {
        self.check_attributes(node, &[ID, REF, MIN_OCCURS, MAX_OCCURS]);
        self.expect_empty(node);
        let occurs = self.occurs(node)?;
        let value = self.required_attr(node, REF)?;
        let qname = self.resolve_qname(node, REF, value)?;
        let pos = self.pos(node);
        Some(self.add_particle(occurs, Term::GroupRef(Ref::Pending(qname)), pos))
    }

    /// `<all>`, `<choice>` or `<sequence>` used as a particle
    fn parse_model_group_particle(&mut self, node: NodeId) -> Option<ParticleId> {
        let occurs = self.occurs(node)?;
        if self.local_name(node) == ALL && (occurs.min > 1 || occurs.max != Some(1)) {
            self.error(
                ErrorCode::CosAllLimited,
                node,
                "cos-all-limited.1.2: <all> must have minOccurs 0 or 1 and maxOccurs 1",
            );
        }
        let group = self.parse_model_group(node, false)?;
        let pos = self.pos(node);
        Some(self.add_particle(occurs, Term::Group(group), pos))
    }

    fn parse_model_group(&mut self, node: NodeId, in_definition: bool) -> Option<ModelGroupId> {
        let compositor = Compositor::from_tag(self.local_name(node))?;
        let allowed: &[&str] = if in_definition {
            &[ID]
        } else {
            &[ID, MIN_OCCURS, MAX_OCCURS]
        };
        self.check_attributes(node, allowed);
        let mut group = ModelGroup::new(compositor, self.pos(node));

        for child in self.content(node) {
            let particle = match (compositor, self.local_name(child)) {
                (_, ELEMENT) => {
                    let particle = self.parse_local_element(child);
                    if compositor == Compositor::All {
                        if let Some(p) = particle {
                            let occurs = self.session.components[p].occurs;
                            if occurs.max.map_or(true, |max| max > 1) {
                                self.error(
                                    ErrorCode::CosAllLimited,
                                    child,
                                    "cos-all-limited.2: particles of <all> must have maxOccurs 0 or 1",
                                );
                            }
                        }
                    }
                    particle
                }
                (Compositor::All, _) => {
                    self.unexpected(node, &[child]);
                    None
                }
                (_, GROUP) => self.parse_group_ref(child),
                (_, CHOICE) | (_, SEQUENCE) => self.parse_model_group_particle(child),
                (_, ANY) => self.parse_any(child),
                _ => {
                    self.unexpected(node, &[child]);
                    None
                }
            };
            if let Some(p) = particle {
                group.particles.push(p);
            }
        }
        Some(self.session.components.add_model_group(group))
    }

    fn parse_any(&mut self, node: NodeId) -> Option<ParticleId> {
        self.check_attributes(node, ANY_ATTRS);
        self.expect_empty(node);
        let occurs = self.occurs(node)?;
        let wildcard = self.wildcard(node)?;
        let pos = wildcard.pos.clone();
        let id = self.session.components.add_wildcard(wildcard);
        Some(self.add_particle(occurs, Term::Wildcard(id), pos))
    }

    // ------------------------------------------------------------------
    // complex types
    // ------------------------------------------------------------------

    fn parse_complex_type(&mut self, node: NodeId, global: bool) -> Option<TypeId> {
        self.check_attributes(
            node,
            if global {
                GLOBAL_COMPLEX_TYPE_ATTRS
            } else {
                LOCAL_COMPLEX_TYPE_ATTRS
            },
        );
        let name = if global {
            Some(QName::new(self.tns.clone(), self.required_ncname(node, NAME)?))
        } else {
            None
        };
        let final_ = self
            .derivation_attr(node, FINAL, EXTENSION_RESTRICTION)
            .unwrap_or_else(|| self.final_default.masked(EXTENSION_RESTRICTION));
        let block = self
            .derivation_attr(node, BLOCK, EXTENSION_RESTRICTION)
            .unwrap_or_else(|| self.block_default.masked(EXTENSION_RESTRICTION));
        let is_abstract = self.bool_attr(node, ABSTRACT).unwrap_or(false);
        let mixed = self.bool_attr(node, MIXED).unwrap_or(false);

        let id = self.session.components.add_type(TypeDef {
            name,
            target_namespace: self.tns.clone(),
            global,
            builtin: None,
            base: Some(Ref::Resolved(TypeId::builtin(BuiltinType::AnyType))),
            derivation: DerivationMethod::Restriction,
            final_,
            block,
            is_abstract,
            kind: TypeKind::Complex(ComplexTypeDef::default()),
            pos: self.pos(node),
            bucket: Some(self.bucket),
            invalid: false,
            redefined: false,
        });
        self.session.anchor(self.bucket, ComponentRef::Type(id), global);

        let mut body = ComplexTypeDef::new(ContentSource::Implicit);
        body.mixed = mixed;
        let children = self.content(node);
        match children.first().map(|c| self.local_name(*c)) {
            Some(SIMPLE_CONTENT) => {
                self.parse_simple_content(children[0], id, &mut body);
                self.unexpected(node, &children[1..]);
            }
            Some(COMPLEX_CONTENT) => {
                self.parse_complex_content(children[0], id, &mut body);
                self.unexpected(node, &children[1..]);
            }
            _ => self.parse_particle_and_attributes(node, &children, &mut body),
        }
        self.session.components[id].kind = TypeKind::Complex(body);
        Some(id)
    }

    /// `(group | all | choice | sequence)?, attribute content`
    fn parse_particle_and_attributes(&mut self, parent: NodeId, children: &[NodeId], body: &mut ComplexTypeDef) {
        let mut rest = children;
        if let Some((&first, tail)) = children.split_first() {
            match self.local_name(first) {
                GROUP => {
                    body.explicit_particle = self.parse_group_ref(first);
                    rest = tail;
                }
                ALL | CHOICE | SEQUENCE => {
                    body.explicit_particle = self.parse_model_group_particle(first);
                    rest = tail;
                }
                _ => {}
            }
        }
        body.attributes = self.parse_attribute_content(parent, rest);
    }

    /// `<restriction>` or `<extension>` below simpleContent/complexContent;
    /// records base and derivation method on the type
    fn derivation_child(&mut self, node: NodeId, type_id: TypeId) -> Option<(NodeId, DerivationMethod)> {
        let children = self.content(node);
        let Some((&child, rest)) = children.split_first() else {
            let message = format!("<{}> must contain <restriction> or <extension>", self.local_name(node));
            self.error(ErrorCode::ElemMissing, node, message);
            self.session.components[type_id].invalid = true;
            return None;
        };
        self.unexpected(node, rest);
        let method = match self.local_name(child) {
            RESTRICTION => DerivationMethod::Restriction,
            EXTENSION => DerivationMethod::Extension,
            _ => {
                self.unexpected(node, &[child]);
                self.session.components[type_id].invalid = true;
                return None;
            }
        };
        self.check_attributes(child, &[ID, BASE]);
        let base = match self.required_attr(child, BASE) {
            Some(value) => self.resolve_qname(child, BASE, value),
            None => None,
        };
        let ty = &mut self.session.components[type_id];
        ty.derivation = method;
        match base {
            Some(base) => ty.base = Some(Ref::Pending(base)),
            None => ty.invalid = true,
        }
        Some((child, method))
    }

    fn parse_simple_content(&mut self, node: NodeId, type_id: TypeId, body: &mut ComplexTypeDef) {
        self.check_attributes(node, &[ID]);
        body.content_source = ContentSource::SimpleContent;
        let Some((child, method)) = self.derivation_child(node, type_id) else {
            return;
        };
        let children = self.content(child);
        if method == DerivationMethod::Extension {
            body.attributes = self.parse_attribute_content(child, &children);
            return;
        }

        let mut rest = &children[..];
        let mut anonymous = None;
        if let Some((&first, tail)) = children.split_first() {
            if self.local_name(first) == SIMPLE_TYPE {
                anonymous = self.parse_simple_type(first, false);
                rest = tail;
            }
        }
        let (facets, consumed) = self.parse_facets(rest);
        if anonymous.is_some() || !facets.is_empty() {
            let restriction = self.session.components.add_type(TypeDef {
                name: None,
                target_namespace: self.tns.clone(),
                global: false,
                builtin: None,
                base: anonymous.map(Ref::Resolved),
                derivation: DerivationMethod::Restriction,
                final_: DerivationSet::empty(),
                block: DerivationSet::empty(),
                is_abstract: false,
                kind: TypeKind::Simple(SimpleTypeDef {
                    facets,
                    ..SimpleTypeDef::default()
                }),
                pos: self.pos(child),
                bucket: Some(self.bucket),
                invalid: false,
                redefined: false,
            });
            self.session.record_local(self.bucket, ComponentRef::Type(restriction));
            body.simple_restriction = Some(restriction);
        }
        body.attributes = self.parse_attribute_content(child, &rest[consumed..]);
    }

    fn parse_complex_content(&mut self, node: NodeId, type_id: TypeId, body: &mut ComplexTypeDef) {
        self.check_attributes(node, &[ID, MIXED]);
        body.content_source = ContentSource::ComplexContent;
        if let Some(mixed) = self.bool_attr(node, MIXED) {
            body.mixed = mixed;
        }
        let Some((child, _)) = self.derivation_child(node, type_id) else {
            return;
        };
        let children = self.content(child);
        self.parse_particle_and_attributes(child, &children, body);
    }

    // ------------------------------------------------------------------
    // simple types
    // ------------------------------------------------------------------

    fn parse_simple_type(&mut self, node: NodeId, global: bool) -> Option<TypeId> {
        self.check_attributes(node, if global { GLOBAL_SIMPLE_TYPE_ATTRS } else { &[ID] });
        let name = if global {
            Some(QName::new(self.tns.clone(), self.required_ncname(node, NAME)?))
        } else {
            None
        };
        let final_ = self
            .derivation_attr(node, FINAL, SIMPLE_FINAL)
            .unwrap_or_else(|| self.final_default.masked(SIMPLE_FINAL));

        let id = self.session.components.add_type(TypeDef {
            name,
            target_namespace: self.tns.clone(),
            global,
            builtin: None,
            base: None,
            derivation: DerivationMethod::Restriction,
            final_,
            block: DerivationSet::empty(),
            is_abstract: false,
            kind: TypeKind::Simple(SimpleTypeDef::default()),
            pos: self.pos(node),
            bucket: Some(self.bucket),
            invalid: false,
            redefined: false,
        });
        self.session.anchor(self.bucket, ComponentRef::Type(id), global);

        let children = self.content(node);
        let Some((&child, rest)) = children.split_first() else {
            self.error(
                ErrorCode::ElemMissing,
                node,
                "<simpleType> must contain one of <restriction>, <list> or <union>",
            );
            self.session.components[id].invalid = true;
            return Some(id);
        };
        self.unexpected(node, rest);

        match self.local_name(child) {
            RESTRICTION => self.parse_simple_restriction(child, id),
            LIST => self.parse_list(child, id),
            UNION => self.parse_union(child, id),
            _ => {
                self.unexpected(node, &[child]);
                self.session.components[id].invalid = true;
            }
        }
        Some(id)
    }

    fn parse_simple_restriction(&mut self, node: NodeId, id: TypeId) {
        self.check_attributes(node, &[ID, BASE]);
        let children = self.content(node);
        let mut rest = &children[..];
        let mut anonymous = None;
        if let Some((&first, tail)) = children.split_first() {
            if self.local_name(first) == SIMPLE_TYPE {
                anonymous = self.parse_simple_type(first, false);
                rest = tail;
            }
        }
        let base_attr = self.attr(node, BASE);
        let base = match (base_attr, anonymous) {
            (Some(_), Some(t)) => {
                self.error(
                    ErrorCode::SrcSimpleType,
                    node,
                    "src-simple-type.2: 'base' and an anonymous base type must not both be present",
                );
                Some(Ref::Resolved(t))
            }
            (Some(value), None) => self.resolve_qname(node, BASE, value).map(Ref::Pending),
            (None, Some(t)) => Some(Ref::Resolved(t)),
            (None, None) => {
                self.error(
                    ErrorCode::SrcSimpleType,
                    node,
                    "src-simple-type.2: one of 'base' or an anonymous base type must be present",
                );
                None
            }
        };
        let (facets, consumed) = self.parse_facets(rest);
        self.unexpected(node, &rest[consumed..]);

        let ty = &mut self.session.components[id];
        ty.derivation = DerivationMethod::Restriction;
        if base.is_none() {
            ty.invalid = true;
        }
        ty.base = base;
        if let Some(st) = ty.simple_mut() {
            st.facets = facets;
        }
    }

    fn parse_list(&mut self, node: NodeId, id: TypeId) {
        self.check_attributes(node, &[ID, ITEM_TYPE]);
        let item_attr = self.qname_attr(node, ITEM_TYPE);
        let has_attr = self.attr(node, ITEM_TYPE).is_some();
        let mut anonymous = None;
        for child in self.content(node) {
            if self.local_name(child) == SIMPLE_TYPE && anonymous.is_none() {
                anonymous = self.parse_simple_type(child, false);
            } else {
                self.unexpected(node, &[child]);
            }
        }
        // an unresolvable itemType was already reported by qname_attr
        let item = match (item_attr, anonymous) {
            (Some(_), Some(t)) => {
                self.error(
                    ErrorCode::SrcSimpleType,
                    node,
                    "src-simple-type.3: 'itemType' and an anonymous item type must not both be present",
                );
                Some(Ref::Resolved(t))
            }
            (None, Some(t)) if has_attr => {
                self.error(
                    ErrorCode::SrcSimpleType,
                    node,
                    "src-simple-type.3: 'itemType' and an anonymous item type must not both be present",
                );
                Some(Ref::Resolved(t))
            }
            (None, Some(t)) => Some(Ref::Resolved(t)),
            (Some(qname), None) => Some(Ref::Pending(qname)),
            (None, None) if has_attr => None,
            (None, None) => {
                self.error(
                    ErrorCode::SrcSimpleType,
                    node,
                    "src-simple-type.3: one of 'itemType' or an anonymous item type must be present",
                );
                None
            }
        };

        let ty = &mut self.session.components[id];
        ty.derivation = DerivationMethod::List;
        ty.base = Some(Ref::Resolved(TypeId::builtin(BuiltinType::AnySimpleType)));
        if item.is_none() {
            ty.invalid = true;
        }
        if let Some(st) = ty.simple_mut() {
            st.variety = Variety::List;
            st.item_type = item;
            st.white_space = WhiteSpace::Collapse;
        }
    }

    fn parse_union(&mut self, node: NodeId, id: TypeId) {
        self.check_attributes(node, &[ID, MEMBER_TYPES]);
        let mut members = Vec::new();
        if let Some(value) = self.attr(node, MEMBER_TYPES) {
            for token in value.split_whitespace() {
                if let Some(qname) = self.resolve_qname(node, MEMBER_TYPES, token) {
                    members.push(Ref::Pending(qname));
                }
            }
        }
        for child in self.content(node) {
            if self.local_name(child) == SIMPLE_TYPE {
                if let Some(t) = self.parse_simple_type(child, false) {
                    members.push(Ref::Resolved(t));
                }
            } else {
                self.unexpected(node, &[child]);
            }
        }
        if members.is_empty() {
            self.error(
                ErrorCode::SrcSimpleType,
                node,
                "src-simple-type.4: a union needs 'memberTypes' or anonymous member types",
            );
        }

        let ty = &mut self.session.components[id];
        ty.derivation = DerivationMethod::Union;
        ty.base = Some(Ref::Resolved(TypeId::builtin(BuiltinType::AnySimpleType)));
        if members.is_empty() {
            ty.invalid = true;
        }
        if let Some(st) = ty.simple_mut() {
            st.variety = Variety::Union;
            st.member_types = members;
        }
    }

    /// Leading facet elements of `children`; returns them and how many
    /// elements were consumed
    fn parse_facets(&mut self, children: &[NodeId]) -> (Vec<Facet>, usize) {
        let mut facets = Vec::new();
        let mut consumed = 0;
        for &child in children {
            let Some(kind) = FacetKind::from_name(self.local_name(child)) else {
                break;
            };
            consumed += 1;
            if let Some(facet) = self.parse_facet(child, kind) {
                facets.push(facet);
            }
        }
        (facets, consumed)
    }

    fn parse_facet(&mut self, node: NodeId, kind: FacetKind) -> Option<Facet> {
        let allowed: &[&str] = match kind {
            FacetKind::Pattern | FacetKind::Enumeration => &[ID, VALUE],
            _ => &[ID, VALUE, FIXED],
        };
        self.check_attributes(node, allowed);
        self.expect_empty(node);
        let value = self.required_attr(node, VALUE)?;

        let mut facet = Facet::new(kind, value);
        facet.pos = self.pos(node);
        facet.fixed = self.bool_attr(node, FIXED).unwrap_or(false);
        match kind {
            FacetKind::WhiteSpace => match WhiteSpace::from_str(value.trim()) {
                Ok(ws) => facet.white_space = Some(ws),
                Err(e) => {
                    self.error(ErrorCode::FacetValue, node, e.to_string());
                    return None;
                }
            },
            FacetKind::Pattern => match compile_pattern(value) {
                Ok(regex) => facet.pattern = Some(regex),
                Err(e) => {
                    self.error(
                        ErrorCode::FacetValue,
                        node,
                        format!("invalid pattern '{}': {}", value, e),
                    );
                    return None;
                }
            },
            k if k.is_count() => match value.trim().parse::<u64>() {
                Ok(count) => facet.count = Some(count),
                Err(_) => {
                    self.error(
                        ErrorCode::FacetValue,
                        node,
                        format!("the value '{}' of {} is not a non-negative integer", value, k),
                    );
                    return None;
                }
            },
            _ => facet.namespaces = self.namespaces(node),
        }
        if kind == FacetKind::TotalDigits && facet.count == Some(0) {
            self.warning(ErrorCode::FacetValue, node, "totalDigits must be positive");
            return None;
        }
        Some(facet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::Limits;
    use crate::loaders::Loader;
    use crate::validators::builders::ParserOptions;
    use crate::validators::exceptions::ErrorReporter;
    use std::io::Write;

    fn session_with(loader: Loader, xsd: &str, location: Option<&str>) -> ConstructionSession {
        let mut session = ConstructionSession::new(
            ParserOptions::new().with_limits(Limits::default()),
            loader,
            ErrorReporter::new(),
        );
        session
            .add_main(Document::parse(xsd, location).unwrap())
            .unwrap();
        while let Some(bucket) = session.next_queued() {
            let doc = session.buckets[bucket.index()].document.clone().unwrap();
            parse_schema_document(&mut session, bucket, &doc).unwrap();
        }
        session
    }

    fn parse(xsd: &str) -> ConstructionSession {
        session_with(Loader::new(), xsd, None)
    }

    fn codes(session: &ConstructionSession) -> Vec<ErrorCode> {
        session.reporter.diagnostics().iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_global_element_with_anonymous_type() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t"
                         elementFormDefault="qualified">
                <xs:element name="root">
                  <xs:complexType>
                    <xs:sequence>
                      <xs:element name="a" type="xs:string"/>
                      <xs:element name="b" minOccurs="0" maxOccurs="unbounded"/>
                    </xs:sequence>
                    <xs:attribute name="x" type="xs:int" use="required"/>
                  </xs:complexType>
                </xs:element>
              </xs:schema>"#,
        );
        assert!(codes(&session).is_empty());
        let c = &session.components;
        let root = c.element_ids().find(|e| c[*e].is_global()).unwrap();
        assert_eq!(c[root].name, QName::namespaced("urn:t", "root"));
        let ty = c[root].type_id().unwrap();
        let body = c[ty].complex().unwrap();
        assert_eq!(body.attributes.uses.len(), 1);
        let particle = body.explicit_particle.unwrap();
        let Term::Group(group) = c[particle].term else {
            panic!("expected a model group");
        };
        assert_eq!(c[group].particles.len(), 2);
        let b = c[group].particles[1];
        assert_eq!(c[b].occurs, Occurs::zero_or_more());
        let Term::Element(Ref::Resolved(b_decl)) = &c[b].term else {
            panic!("expected a local declaration");
        };
        assert_eq!(c[*b_decl].name, QName::namespaced("urn:t", "b"));
    }

    #[test]
    fn test_attribute_not_allowed() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:element name="a" foo="1" xs:bar="2" xmlns:o="urn:o" o:ok="3"/>
              </xs:schema>"#,
        );
        assert_eq!(
            codes(&session),
            vec![ErrorCode::AttrNotAllowed, ErrorCode::AttrNotAllowed]
        );
    }

    #[test]
    fn test_element_ref_with_name() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:element name="a"/>
                <xs:complexType name="T">
                  <xs:sequence><xs:element ref="a" name="b"/></xs:sequence>
                </xs:complexType>
              </xs:schema>"#,
        );
        assert_eq!(codes(&session), vec![ErrorCode::SrcElement]);
    }

    #[test]
    fn test_occurs_problems() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:complexType name="T">
                  <xs:sequence>
                    <xs:element name="gone" minOccurs="0" maxOccurs="0"/>
                    <xs:element name="bad" minOccurs="x"/>
                    <xs:element name="inverted" minOccurs="3" maxOccurs="2"/>
                  </xs:sequence>
                </xs:complexType>
              </xs:schema>"#,
        );
        assert_eq!(
            codes(&session),
            vec![ErrorCode::AttrInvalidValue, ErrorCode::PPropsCorrect]
        );
        let c = &session.components;
        let group = c.model_groups.last().unwrap();
        assert_eq!(group.particles.len(), 2);
    }

    #[test]
    fn test_simple_type_facets() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:simpleType name="code">
                  <xs:restriction base="xs:string">
                    <xs:pattern value="[A-Z]{3}"/>
                    <xs:length value="3" fixed="true"/>
                    <xs:whiteSpace value="collapse"/>
                    <xs:enumeration value="ABC"/>
                  </xs:restriction>
                </xs:simpleType>
                <xs:simpleType name="bad">
                  <xs:restriction base="xs:string">
                    <xs:length value="-1"/>
                  </xs:restriction>
                </xs:simpleType>
              </xs:schema>"#,
        );
        assert_eq!(codes(&session), vec![ErrorCode::FacetValue]);
        let c = &session.components;
        let code = c
            .type_ids()
            .find(|t| c[*t].name == Some(QName::local("code")))
            .unwrap();
        let st = c[code].simple().unwrap();
        assert_eq!(st.facets.len(), 4);
        assert!(st.facet(FacetKind::Pattern).unwrap().pattern.is_some());
        let length = st.facet(FacetKind::Length).unwrap();
        assert_eq!(length.count, Some(3));
        assert!(length.fixed);
        assert_eq!(
            st.facet(FacetKind::WhiteSpace).unwrap().white_space,
            Some(WhiteSpace::Collapse)
        );
        assert_eq!(c[code].base, Some(Ref::Pending(QName::xsd("string"))));
    }

    #[test]
    fn test_list_and_union_shapes() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:simpleType name="ints"><xs:list itemType="xs:int"/></xs:simpleType>
                <xs:simpleType name="either">
                  <xs:union memberTypes="xs:int xs:boolean">
                    <xs:simpleType><xs:restriction base="xs:string"/></xs:simpleType>
                  </xs:union>
                </xs:simpleType>
                <xs:simpleType name="empty"><xs:union/></xs:simpleType>
              </xs:schema>"#,
        );
        assert_eq!(codes(&session), vec![ErrorCode::SrcSimpleType]);
        let c = &session.components;
        let by_name = |n: &str| c.type_ids().find(|t| c[*t].name == Some(QName::local(n))).unwrap();
        let ints = c[by_name("ints")].simple().unwrap();
        assert_eq!(ints.variety, Variety::List);
        assert_eq!(ints.item_type, Some(Ref::Pending(QName::xsd("int"))));
        let either = c[by_name("either")].simple().unwrap();
        assert_eq!(either.member_types.len(), 3);
        assert!(c[by_name("empty")].invalid);
    }

    #[test]
    fn test_list_with_item_type_and_anonymous_item() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:simpleType name="both">
                  <xs:list itemType="xs:int">
                    <xs:simpleType><xs:restriction base="xs:string"/></xs:simpleType>
                  </xs:list>
                </xs:simpleType>
                <xs:simpleType name="neither"><xs:list/></xs:simpleType>
              </xs:schema>"#,
        );
        assert_eq!(
            codes(&session),
            vec![ErrorCode::SrcSimpleType, ErrorCode::SrcSimpleType]
        );
        let c = &session.components;
        let both = c.type_ids().find(|t| c[*t].name == Some(QName::local("both"))).unwrap();
        assert!(matches!(c[both].simple().unwrap().item_type, Some(Ref::Resolved(_))));
    }

    #[test]
    fn test_prohibited_attribute_and_wildcard() {
        let session = parse(
            r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
                <xs:attributeGroup name="AG">
                  <xs:attribute name="x" type="xs:int"/>
                  <xs:anyAttribute namespace="##other" processContents="lax"/>
                </xs:attributeGroup>
                <xs:complexType name="T">
                  <xs:attribute name="x" use="prohibited"/>
                  <xs:attributeGroup ref="AG"/>
                  <xs:anyAttribute/>
                  <xs:attribute name="late"/>
                </xs:complexType>
              </xs:schema>"###,
        );
        assert_eq!(codes(&session), vec![ErrorCode::ElemNotAllowed]);
        let c = &session.components;
        let t = c.type_ids().find(|t| c[*t].name.as_ref().map(|n| n.local_name.as_str()) == Some("T")).unwrap();
        let attrs = &c[t].complex().unwrap().attributes;
        assert_eq!(attrs.prohibitions.len(), 1);
        assert_eq!(attrs.prohibitions[0].name, QName::local("x"));
        assert_eq!(attrs.group_refs.len(), 1);
        assert!(attrs.wildcard.is_some());
        let ag = &c.attribute_groups[0];
        let wildcard = &c[ag.content.wildcard.unwrap()];
        assert_eq!(wildcard.process_contents, ProcessContents::Lax);
        assert_eq!(wildcard.namespaces, NamespaceConstraint::Not(Some("urn:t".to_string())));
    }

    #[test]
    fn test_identity_constraints() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:element name="people">
                  <xs:complexType><xs:sequence/></xs:complexType>
                  <xs:key name="pk">
                    <xs:selector xpath=".//person"/>
                    <xs:field xpath="@id"/>
                  </xs:key>
                  <xs:keyref name="fk" refer="pk">
                    <xs:selector xpath="ref"/>
                    <xs:field xpath="@to"/>
                  </xs:keyref>
                  <xs:unique name="broken">
                    <xs:selector xpath="@id"/>
                    <xs:field xpath="a"/>
                  </xs:unique>
                </xs:element>
              </xs:schema>"#,
        );
        assert_eq!(codes(&session), vec![ErrorCode::SelectorXPath]);
        let c = &session.components;
        assert_eq!(c.idcs.len(), 2);
        assert_eq!(c.idcs[1].refer, Some(Ref::Pending(QName::local("pk"))));
        assert_eq!(c.elements[0].idcs.len(), 2);
    }

    #[test]
    fn test_import_of_own_namespace() {
        let session = parse(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
                <xs:import namespace="urn:t"/>
                <xs:import namespace="urn:other"/>
              </xs:schema>"#,
        );
        assert_eq!(codes(&session), vec![ErrorCode::SrcImport]);
        assert!(session.buckets[0].imports(Some("urn:other")));
    }

    #[test]
    fn test_chameleon_include_from_memory() {
        let loader = Loader::new().with_source(
            "inc.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                <xs:complexType name="T"/>
                <xs:element name="e" type="T"/>
              </xs:schema>"#,
        );
        let session = session_with(
            loader,
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
                <xs:include schemaLocation="inc.xsd"/>
              </xs:schema>"#,
            Some("main.xsd"),
        );
        assert!(codes(&session).is_empty());
        assert_eq!(session.buckets.len(), 2);
        assert!(session.buckets[1].is_chameleon());
        let c = &session.components;
        let e = c.element_ids().next().unwrap();
        assert_eq!(c[e].name, QName::namespaced("urn:t", "e"));
        assert_eq!(
            c[e].type_def,
            Some(Ref::Pending(QName::namespaced("urn:t", "T")))
        );
    }

    #[test]
    fn test_include_with_other_namespace_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let inc = dir.path().join("inc.xsd");
        let mut file = std::fs::File::create(&inc).unwrap();
        write!(
            file,
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:other"/>"#
        )
        .unwrap();
        let main = dir.path().join("main.xsd");
        let session = session_with(
            Loader::new(),
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t">
                <xs:include schemaLocation="inc.xsd"/>
                <xs:include schemaLocation="missing.xsd"/>
              </xs:schema>"#,
            Some(main.to_str().unwrap()),
        );
        assert_eq!(
            codes(&session),
            vec![ErrorCode::SrcInclude, ErrorCode::SchemaLoad]
        );
        assert_eq!(session.buckets.len(), 1);
    }

    #[test]
    fn test_not_a_schema() {
        let session = parse("<root/>");
        assert_eq!(codes(&session), vec![ErrorCode::ElemMissing]);
        assert!(session.stop);
    }
}
