//! Schema construction
//!
//! This module provides the construction infrastructure: the buckets that
//! stand for individual schema documents, the [`ConstructionSession`]
//! shared by the document parser and the fixup engine, the installation of
//! the built-in type definitions, and [`SchemaParser`], the entry point
//! that drives a whole construction run.
//!
//! Documents are processed iteratively: `<import>`, `<include>` and
//! `<redefine>` only load the referenced document and queue a new bucket;
//! the queue is drained after the referencing document is done, so deep
//! include chains do not grow the call stack.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::documents::Document;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::loaders::Loader;
use crate::locations::resolve_location;
use crate::namespaces::{QName, XSD_NAMESPACE};

use super::attributes::AttributeContainer;
use super::base::{
    BucketId, ComponentRef, Components, DerivationSet, ParticleId, Ref, SourcePos, TypeDef, TypeId, TypeKind,
};
use super::builtins::BuiltinType;
use super::complex_types::{ComplexTypeDef, ContentSource, ContentType};
use super::exceptions::{Diagnostic, DiagnosticCallback, Domain, ErrorCode, ErrorReporter};
use super::fixup;
use super::globals::GlobalMaps;
use super::groups::{Compositor, ModelGroup};
use super::parsing;
use super::particles::{Occurs, Particle, Term};
use super::schemas::Schema;
use super::simple_types::{SimpleTypeDef, Variety};
use super::wildcards::{NamespaceConstraint, ProcessContents, Wildcard};

/// Options of a schema construction run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Keep the parsed schema documents in the buckets
    pub retain_documents: bool,
    /// Accept http(s) schema locations
    pub allow_remote: bool,
    /// Resource limits
    pub limits: Limits,
}

impl ParserOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the schema document trees after construction
    pub fn with_retain_documents(mut self, retain: bool) -> Self {
        self.retain_documents = retain;
        self
    }

    /// Accept remote schema locations
    pub fn with_allow_remote(mut self, allow: bool) -> Self {
        self.allow_remote = allow;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// How a document entered the construction graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BucketKind {
    /// The document construction started from
    Main,
    /// Target of an `<import>`
    Import,
    /// Target of an `<include>`
    Include,
    /// Target of a `<redefine>`
    Redefine,
}

impl fmt::Display for BucketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Main => write!(f, "main"),
            Self::Import => write!(f, "import"),
            Self::Include => write!(f, "include"),
            Self::Redefine => write!(f, "redefine"),
        }
    }
}

/// Kind of an edge of the construction graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    /// `<import>`
    Import,
    /// `<include>`
    Include,
    /// `<redefine>`
    Redefine,
}

impl RelationKind {
    fn bucket_kind(self) -> BucketKind {
        match self {
            Self::Import => BucketKind::Import,
            Self::Include => BucketKind::Include,
            Self::Redefine => BucketKind::Redefine,
        }
    }

    fn code(self) -> ErrorCode {
        match self {
            Self::Import => ErrorCode::SrcImport,
            Self::Include => ErrorCode::SrcInclude,
            Self::Redefine => ErrorCode::SrcRedefine,
        }
    }

    fn tag(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Include => "include",
            Self::Redefine => "redefine",
        }
    }
}

/// An edge of the construction graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Edge kind
    pub kind: RelationKind,
    /// Referenced document, `None` for an import without a usable location
    pub target: Option<BucketId>,
    /// Imported namespace (imports only)
    pub namespace: Option<String>,
}

/// One schema document
#[derive(Debug, Clone)]
pub struct Bucket {
    /// How the document was reached
    pub kind: BucketKind,
    /// Resolved location, the document identity
    pub location: Option<String>,
    /// `targetNamespace` written in the document
    pub original_namespace: Option<String>,
    /// Namespace its components get (differs for chameleon includes)
    pub target_namespace: Option<String>,
    /// The parsed document
    pub document: Option<Arc<Document>>,
    /// Top-level components declared here
    pub globals: Vec<ComponentRef>,
    /// Local components declared here
    pub locals: Vec<ComponentRef>,
    /// Outgoing import/include/redefine edges
    pub relations: Vec<Relation>,
}

impl Bucket {
    /// Whether a no-namespace document was pulled into a namespace
    pub fn is_chameleon(&self) -> bool {
        self.original_namespace.is_none() && self.target_namespace.is_some()
    }

    /// Whether this document imports `namespace`
    pub fn imports(&self, namespace: Option<&str>) -> bool {
        self.relations
            .iter()
            .any(|r| r.kind == RelationKind::Import && r.namespace.as_deref() == namespace)
    }
}

/// Kind of a component redefined by `<redefine>`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedefineKind {
    /// simpleType or complexType
    Type,
    /// group
    Group,
    /// attributeGroup
    AttributeGroup,
}

impl fmt::Display for RedefineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Group => write!(f, "group"),
            Self::AttributeGroup => write!(f, "attribute group"),
        }
    }
}

/// A component declared inside `<redefine>`, waiting to be spliced in
#[derive(Debug, Clone)]
pub struct Redefinition {
    /// What is redefined
    pub kind: RedefineKind,
    /// The redefining component
    pub component: ComponentRef,
    /// Name shared by the original and the redefinition
    pub name: QName,
    /// Document being redefined
    pub target: BucketId,
    /// Where the redefinition was written
    pub pos: SourcePos,
}

/// State of one construction run, shared by the parser and the fixup passes
#[derive(Debug)]
pub struct ConstructionSession {
    /// Options of this run
    pub options: ParserOptions,
    /// Component arena
    pub components: Components,
    /// Global component maps, filled by the registration pass
    pub globals: GlobalMaps,
    /// Schema documents in discovery order; the first one is the main document
    pub buckets: Vec<Bucket>,
    /// Components waiting for fixup, in parse order
    pub pending: Vec<ComponentRef>,
    /// `<redefine>` children
    pub redefinitions: Vec<Redefinition>,
    /// Diagnostic sink
    pub reporter: ErrorReporter,
    /// Set on a structural error that makes further parsing pointless
    pub stop: bool,
    loader: Loader,
    queue: VecDeque<BucketId>,
    /// (location, effective namespace) to bucket
    bucket_keys: HashMap<(String, Option<String>), BucketId>,
    /// Parsed documents by location, shared by chameleon copies
    documents: HashMap<String, Arc<Document>>,
    /// First location seen for every imported namespace
    imported_locations: HashMap<Option<String>, String>,
}

/// An error raised while building components
pub(crate) fn schema_error(code: ErrorCode, pos: &SourcePos, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(Domain::Parser, code, message)
        .with_file(pos.file.as_deref())
        .with_position(pos.line, pos.column)
}

/// A warning raised while building components
pub(crate) fn schema_warning(code: ErrorCode, pos: &SourcePos, message: impl Into<String>) -> Diagnostic {
    Diagnostic::warning(Domain::Parser, code, message)
        .with_file(pos.file.as_deref())
        .with_position(pos.line, pos.column)
}

impl ConstructionSession {
    /// New session with the built-in types installed
    pub fn new(options: ParserOptions, loader: Loader, reporter: ErrorReporter) -> Self {
        let mut components = Components::default();
        let mut globals = GlobalMaps::new();
        install_builtins(&mut components, &mut globals);
        Self {
            options,
            components,
            globals,
            buckets: Vec::new(),
            pending: Vec::new(),
            redefinitions: Vec::new(),
            reporter,
            stop: false,
            loader,
            queue: VecDeque::new(),
            bucket_keys: HashMap::new(),
            documents: HashMap::new(),
            imported_locations: HashMap::new(),
        }
    }

    /// Report a schema error
    pub fn error(&mut self, code: ErrorCode, pos: &SourcePos, message: impl Into<String>) {
        self.reporter.report(schema_error(code, pos, message));
    }

    /// Report a schema warning
    pub fn warning(&mut self, code: ErrorCode, pos: &SourcePos, message: impl Into<String>) {
        self.reporter.report(schema_warning(code, pos, message));
    }

    /// Record a parsed component in its bucket and the pending list
    pub fn anchor(&mut self, bucket: BucketId, component: ComponentRef, global: bool) {
        let b = &mut self.buckets[bucket.index()];
        if global {
            b.globals.push(component);
        } else {
            b.locals.push(component);
        }
        self.pending.push(component);
    }

    /// Record a local component that the fixup passes reach through its owner
    pub fn record_local(&mut self, bucket: BucketId, component: ComponentRef) {
        self.buckets[bucket.index()].locals.push(component);
    }

    /// Bucket by handle
    pub fn bucket(&self, id: BucketId) -> &Bucket {
        &self.buckets[id.index()]
    }

    /// Add the main document
    pub fn add_main(&mut self, document: Document) -> Result<BucketId> {
        let root = document
            .root()
            .ok_or_else(|| Error::Internal("schema document has no root element".to_string()))?;
        let namespace = document.attribute(root, None, "targetNamespace").map(str::to_string);
        let location = document.base_uri().map(str::to_string);
        let document = Arc::new(document);
        if let Some(location) = &location {
            self.documents.insert(location.clone(), document.clone());
        }
        let id = self.push_bucket(BucketKind::Main, location, namespace.clone(), namespace, document)?;
        Ok(id)
    }

    fn push_bucket(
        &mut self,
        kind: BucketKind,
        location: Option<String>,
        original_namespace: Option<String>,
        target_namespace: Option<String>,
        document: Arc<Document>,
    ) -> Result<BucketId> {
        self.options.limits.check_schema_documents(self.buckets.len() + 1)?;
        let id = BucketId(self.buckets.len() as u32);
        if let Some(location) = &location {
            self.bucket_keys
                .insert((location.clone(), target_namespace.clone()), id);
        }
        debug!(
            bucket = id.index(),
            %kind,
            location = location.as_deref().unwrap_or("(memory)"),
            "schema document queued"
        );
        self.buckets.push(Bucket {
            kind,
            location,
            original_namespace,
            target_namespace,
            document: Some(document),
            globals: Vec::new(),
            locals: Vec::new(),
            relations: Vec::new(),
        });
        self.queue.push_back(id);
        Ok(id)
    }

    /// Next document waiting to be parsed
    pub fn next_queued(&mut self) -> Option<BucketId> {
        self.queue.pop_front()
    }

    /// Record an import of a namespace without loading anything
    pub fn add_import_without_location(&mut self, from: BucketId, namespace: Option<String>) {
        self.buckets[from.index()].relations.push(Relation {
            kind: RelationKind::Import,
            target: None,
            namespace,
        });
    }

    /// Resolve, load and queue the document referenced by an
    /// `<import>`, `<include>` or `<redefine>`.
    ///
    /// Returns the bucket of the referenced document, which may be an
    /// existing one. Failures are reported; import failures are warnings.
    pub fn request_document(
        &mut self,
        kind: RelationKind,
        from: BucketId,
        location: &str,
        namespace: Option<&str>,
        pos: &SourcePos,
    ) -> Result<Option<BucketId>> {
        let base = self.buckets[from.index()].location.clone();
        let resolved = match resolve_location(base.as_deref(), location) {
            Ok(resolved) => resolved,
            Err(e) => {
                self.load_failure(kind, pos, format!("cannot resolve schema location '{}': {}", location, e));
                return Ok(None);
            }
        };

        if base.as_deref() == Some(resolved.as_str()) {
            self.error(
                kind.code(),
                pos,
                format!("the document '{}' cannot {} itself", resolved, kind.tag()),
            );
            return Ok(None);
        }

        let from_namespace = self.buckets[from.index()].target_namespace.clone();
        let effective = match kind {
            RelationKind::Import => namespace.map(str::to_string),
            RelationKind::Include | RelationKind::Redefine => from_namespace.clone(),
        };

        if kind == RelationKind::Import {
            if let Some(first) = self.imported_locations.get(&effective) {
                if *first != resolved {
                    self.warning(
                        ErrorCode::SrcImport,
                        pos,
                        format!(
                            "skipping import of '{}' for namespace '{}': already imported from '{}'",
                            resolved,
                            effective.as_deref().unwrap_or(""),
                            first
                        ),
                    );
                    self.add_import_without_location(from, effective);
                    return Ok(None);
                }
            }
        }

        if let Some(existing) = self.bucket_keys.get(&(resolved.clone(), effective.clone())).copied() {
            self.add_relation(from, kind, Some(existing), effective);
            return Ok(Some(existing));
        }

        let document = match self.load_document(&resolved) {
            Ok(document) => document,
            Err(e) if e.is_internal() => return Err(e),
            Err(Error::LimitExceeded(message)) => return Err(Error::LimitExceeded(message)),
            Err(e) => {
                self.load_failure(kind, pos, format!("failed to load '{}': {}", resolved, e));
                if kind == RelationKind::Import {
                    self.add_import_without_location(from, effective);
                }
                return Ok(None);
            }
        };

        let Some(root) = document.root() else {
            self.load_failure(kind, pos, format!("the document '{}' is empty", resolved));
            return Ok(None);
        };
        if !document
            .name(root)
            .map_or(false, |n| n.is(Some(XSD_NAMESPACE), "schema"))
        {
            self.load_failure(
                kind,
                pos,
                format!("the document '{}' is not a schema document", resolved),
            );
            return Ok(None);
        }
        let original = document.attribute(root, None, "targetNamespace").map(str::to_string);

        match kind {
            RelationKind::Import if original != effective => {
                self.error(
                    ErrorCode::SrcImport,
                    pos,
                    format!(
                        "the imported document '{}' has target namespace '{}', expected '{}'",
                        resolved,
                        original.as_deref().unwrap_or(""),
                        effective.as_deref().unwrap_or("")
                    ),
                );
                return Ok(None);
            }
            RelationKind::Include | RelationKind::Redefine if original.is_some() && original != from_namespace => {
                self.error(
                    kind.code(),
                    pos,
                    format!(
                        "the {}d document '{}' has target namespace '{}', expected '{}'",
                        kind.tag(),
                        resolved,
                        original.as_deref().unwrap_or(""),
                        from_namespace.as_deref().unwrap_or("")
                    ),
                );
                return Ok(None);
            }
            _ => {}
        }

        let id = self.push_bucket(kind.bucket_kind(), Some(resolved.clone()), original, effective.clone(), document)?;
        if kind == RelationKind::Import {
            self.imported_locations.insert(effective.clone(), resolved);
        }
        self.add_relation(from, kind, Some(id), effective);
        Ok(Some(id))
    }

    fn add_relation(&mut self, from: BucketId, kind: RelationKind, target: Option<BucketId>, namespace: Option<String>) {
        let namespace = if kind == RelationKind::Import { namespace } else { None };
        self.buckets[from.index()].relations.push(Relation {
            kind,
            target,
            namespace,
        });
    }

    fn load_failure(&mut self, kind: RelationKind, pos: &SourcePos, message: String) {
        if kind == RelationKind::Import {
            self.warning(ErrorCode::SchemaLoad, pos, message);
        } else {
            self.error(ErrorCode::SchemaLoad, pos, message);
        }
    }

    fn load_document(&mut self, location: &str) -> Result<Arc<Document>> {
        if let Some(document) = self.documents.get(location) {
            return Ok(document.clone());
        }
        let text = self.loader.load_str(location)?;
        let document = Arc::new(Document::parse(&text, Some(location))?);
        self.documents.insert(location.to_string(), document.clone());
        Ok(document)
    }

    /// Drop the document trees unless the options ask to keep them
    pub fn release_documents(&mut self) {
        self.documents.clear();
        if !self.options.retain_documents {
            for bucket in &mut self.buckets {
                bucket.document = None;
            }
        }
    }
}

/// Install the built-in type definitions at their fixed handles and
/// register them by name
pub fn install_builtins(components: &mut Components, globals: &mut GlobalMaps) {
    for builtin in BuiltinType::ALL {
        let id = TypeId::builtin(builtin);
        let base = builtin.base().map(TypeId::builtin).unwrap_or(id);
        let kind = if builtin == BuiltinType::AnyType {
            TypeKind::Complex(any_type_body(components))
        } else {
            let variety = match builtin {
                BuiltinType::AnySimpleType => Variety::Absent,
                b if b.list_item().is_some() => Variety::List,
                _ => Variety::Atomic,
            };
            TypeKind::Simple(SimpleTypeDef {
                variety,
                item_type: builtin.list_item().map(|item| Ref::Resolved(TypeId::builtin(item))),
                white_space: builtin.white_space(),
                primitive: (variety == Variety::Atomic).then_some(builtin),
                checked: true,
                ..SimpleTypeDef::default()
            })
        };
        let added = components.add_type(TypeDef {
            name: Some(builtin.qname()),
            target_namespace: Some(XSD_NAMESPACE.to_string()),
            global: true,
            builtin: Some(builtin),
            base: Some(Ref::Resolved(base)),
            derivation: builtin.derivation(),
            final_: DerivationSet::empty(),
            block: DerivationSet::empty(),
            is_abstract: false,
            kind,
            pos: SourcePos::default(),
            bucket: None,
            invalid: false,
            redefined: false,
        });
        debug_assert_eq!(added, id);
        globals.add_type(builtin.qname(), id);
    }
}

/// anyType: mixed content of any elements, any attributes, all lax
fn any_type_body(components: &mut Components) -> ComplexTypeDef {
    let wildcard = components.add_wildcard(Wildcard::new(NamespaceConstraint::Any, ProcessContents::Lax));
    let any = components.add_particle(Particle::new(
        Occurs::zero_or_more(),
        Term::Wildcard(wildcard),
        SourcePos::default(),
    ));
    let mut group = ModelGroup::new(Compositor::Sequence, SourcePos::default());
    group.particles.push(any);
    let group = components.add_model_group(group);
    let particle: ParticleId = components.add_particle(Particle::new(Occurs::once(), Term::Group(group), SourcePos::default()));
    let attribute_wildcard = components.add_wildcard(Wildcard::new(NamespaceConstraint::Any, ProcessContents::Lax));

    ComplexTypeDef {
        content_source: ContentSource::Implicit,
        mixed: true,
        explicit_particle: Some(particle),
        simple_restriction: None,
        attributes: AttributeContainer::default(),
        content_type: ContentType::Mixed,
        content_particle: Some(particle),
        simple_type: None,
        attribute_uses: Vec::new(),
        attribute_wildcard: Some(attribute_wildcard),
        content_model: None,
        resolved: true,
    }
}

/// Builds a [`Schema`] from schema documents
pub struct SchemaParser {
    options: ParserOptions,
    loader: Loader,
    reporter: ErrorReporter,
}

impl Default for SchemaParser {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SchemaParser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaParser").field("options", &self.options).finish()
    }
}

impl SchemaParser {
    /// Parser with default options
    pub fn new() -> Self {
        Self::with_options(ParserOptions::default())
    }

    /// Parser with the given options
    pub fn with_options(options: ParserOptions) -> Self {
        let loader = Loader::new()
            .with_limits(options.limits.clone())
            .with_allow_remote(options.allow_remote);
        Self {
            options,
            loader,
            reporter: ErrorReporter::new(),
        }
    }

    /// Register an in-memory schema document under a location
    pub fn with_source(mut self, location: impl Into<String>, content: impl Into<String>) -> Self {
        self.loader.add_source(location, content);
        self
    }

    /// Install the error callback
    pub fn set_error_handler(&mut self, handler: DiagnosticCallback) {
        self.reporter.set_error_handler(handler);
    }

    /// Install the warning callback
    pub fn set_warning_handler(&mut self, handler: DiagnosticCallback) {
        self.reporter.set_warning_handler(handler);
    }

    /// Install the structured callback, superseding the other two
    pub fn set_structured_handler(&mut self, handler: DiagnosticCallback) {
        self.reporter.set_structured_handler(handler);
    }

    /// Build from a schema document held in memory
    pub fn parse_str(self, xsd: &str, location: Option<&str>) -> Result<Schema> {
        self.options.limits.check_xml_size(xsd.len())?;
        let document = Document::parse(xsd, location)?;
        self.parse_document(document)
    }

    /// Build from a schema file
    pub fn parse_file(self, path: impl AsRef<Path>) -> Result<Schema> {
        let path = path.as_ref();
        let location = resolve_location(None, &path.to_string_lossy())?;
        let text = self.loader.load_str(&location)?;
        let document = Document::parse(&text, Some(&location))?;
        self.parse_document(document)
    }

    /// Build from an already parsed schema document
    pub fn parse_document(self, document: Document) -> Result<Schema> {
        let mut session = ConstructionSession::new(self.options, self.loader, self.reporter);
        session.add_main(document)?;

        while let Some(bucket) = session.next_queued() {
            if session.stop {
                break;
            }
            let Some(document) = session.buckets[bucket.index()].document.clone() else {
                continue;
            };
            parsing::parse_schema_document(&mut session, bucket, &document)?;
        }
        session
            .options
            .limits
            .check_schema_components(session.components.len())?;

        if !session.stop {
            fixup::run(&mut session)?;
        }
        session.release_documents();

        let (error_count, warning_count, diagnostics) = session.reporter.take();
        info!(
            documents = session.buckets.len(),
            components = session.components.len(),
            errors = error_count,
            warnings = warning_count,
            "schema construction finished"
        );
        if error_count > 0 {
            return Err(Error::InvalidSchema {
                error_count,
                diagnostics,
            });
        }
        Ok(Schema::from_parts(
            session.components,
            session.globals,
            session.buckets,
            diagnostics,
        ))
    }
}

/// Namespaces a bucket may refer to without an `<import>`
pub(crate) fn visible_namespaces(bucket: &Bucket) -> BTreeSet<Option<String>> {
    let mut visible: BTreeSet<Option<String>> = BTreeSet::new();
    visible.insert(bucket.target_namespace.clone());
    visible.insert(Some(XSD_NAMESPACE.to_string()));
    for r in &bucket.relations {
        if r.kind == RelationKind::Import {
            visible.insert(r.namespace.clone());
        }
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::base::TypeKind;

    #[test]
    fn test_builtins_installed() {
        let mut components = Components::default();
        let mut globals = GlobalMaps::new();
        install_builtins(&mut components, &mut globals);

        assert_eq!(globals.lookup_type(&QName::xsd("int")), Some(TypeId::builtin(BuiltinType::Int)));
        let any_type = &components[TypeId::builtin(BuiltinType::AnyType)];
        assert!(matches!(any_type.kind, TypeKind::Complex(_)));
        assert_eq!(any_type.base_id(), Some(TypeId::builtin(BuiltinType::AnyType)));

        let nmtokens = components[TypeId::builtin(BuiltinType::NmTokens)].simple().unwrap();
        assert_eq!(nmtokens.variety, Variety::List);
        assert_eq!(
            nmtokens.item_type.as_ref().and_then(|r| r.resolved()),
            Some(TypeId::builtin(BuiltinType::NmToken))
        );
    }

    #[test]
    fn test_parser_options_serde() {
        let options = ParserOptions::new().with_retain_documents(true);
        let json = serde_json::to_string(&options).unwrap();
        let back: ParserOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
        let partial: ParserOptions = serde_json::from_str(r#"{"allow_remote": true}"#).unwrap();
        assert!(partial.allow_remote);
        assert!(!partial.retain_documents);
    }

    #[test]
    fn test_bucket_imports() {
        let bucket = Bucket {
            kind: BucketKind::Include,
            location: None,
            original_namespace: None,
            target_namespace: Some("urn:t".to_string()),
            document: None,
            globals: Vec::new(),
            locals: Vec::new(),
            relations: vec![Relation {
                kind: RelationKind::Import,
                target: None,
                namespace: Some("urn:x".to_string()),
            }],
        };
        assert!(bucket.is_chameleon());
        assert!(bucket.imports(Some("urn:x")));
        assert!(!bucket.imports(None));
        let visible = visible_namespaces(&bucket);
        assert!(visible.contains(&Some("urn:t".to_string())));
        assert!(visible.contains(&Some(XSD_NAMESPACE.to_string())));
        assert!(!visible.contains(&None));
    }
}
