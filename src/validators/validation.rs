//! Instance validation engine
//!
//! [`ValidationContext`] is an explicit state machine driven by element
//! events: [`start_element`](ValidationContext::start_element),
//! [`characters`](ValidationContext::characters) and
//! [`end_element`](ValidationContext::end_element). Everything it needs
//! between two events lives in the context (one frame per open element,
//! the running content models, the identity-constraint tables), so it can
//! be fed from a tree walk, a SAX handler or a pull reader alike.
//!
//! Instance defects never stop a run. An element that its parent's content
//! model does not expect is reported and its subtree is skipped; siblings
//! and the rest of the document are still assessed. Only internal errors
//! and resource limits abort with an `Err`.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::automata::{ModelRun, ParticleLabel};
use crate::documents::Attribute;
use crate::error::{Error, Result};
use crate::limits::Limits;
use crate::namespaces::{NamespaceContext, QName, XSI_NAMESPACE};

use super::base::{Components, ElementId, TypeId, TypeKind, WildcardId};
use super::builtins::BuiltinType;
use super::complex_types::ContentType;
use super::exceptions::{Diagnostic, DiagnosticCallback, Domain, ErrorCode, ErrorReporter};
use super::helpers::boolean_to_rust;
use super::idc::{IdcEngine, IdcIssue, IdcNodeTable};
use super::schemas::Schema;
use super::simple_types::{id_role, validate_simple_value, IdRole, ValueIssue};
use super::values::{values_equal, XsdValue};
use super::wildcards::ProcessContents;

/// Options of a validation run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Add defaulted attributes and element values to the validated tree
    pub inject_defaults: bool,
    /// Bubble identity-constraint tables up to the root even when no
    /// keyref needs them
    pub build_idc_node_tables: bool,
    /// Return the root's identity-constraint tables in the report
    pub expose_idc_node_tables: bool,
    /// Check ID uniqueness and IDREF resolution
    pub check_ids: bool,
    /// Resource limits
    pub limits: Limits,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            inject_defaults: false,
            build_idc_node_tables: false,
            expose_idc_node_tables: false,
            check_ids: true,
            limits: Limits::default(),
        }
    }
}

impl ValidationOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable default value injection
    pub fn with_inject_defaults(mut self, inject: bool) -> Self {
        self.inject_defaults = inject;
        self
    }

    /// Always build identity-constraint node tables
    pub fn with_idc_node_tables(mut self, build: bool) -> Self {
        self.build_idc_node_tables = build;
        self
    }

    /// Expose the identity-constraint node tables of the root
    pub fn with_exposed_idc_node_tables(mut self, expose: bool) -> Self {
        self.expose_idc_node_tables = expose;
        self
    }

    /// Enable or disable ID/IDREF checking
    pub fn with_check_ids(mut self, check: bool) -> Self {
        self.check_ids = check;
        self
    }

    /// Set the limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }
}

/// Outcome of a validation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    /// Number of errors
    pub error_count: usize,
    /// Number of warnings
    pub warning_count: usize,
    /// Every diagnostic, in the order it was reported
    pub diagnostics: Vec<Diagnostic>,
    /// Identity-constraint tables of the root element, when requested
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub idc_tables: Vec<IdcNodeTable>,
}

impl ValidationReport {
    /// Whether the document is valid
    pub fn is_valid(&self) -> bool {
        self.error_count == 0
    }

    /// Integer outcome: 0 when valid, else the number of errors
    pub fn code(&self) -> i32 {
        i32::try_from(self.error_count).unwrap_or(i32::MAX)
    }

    /// Error diagnostics only
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Codes of the reported errors
    pub fn error_codes(&self) -> Vec<ErrorCode> {
        self.errors().map(|d| d.code).collect()
    }
}

/// Integer outcome of a run: 0 valid, positive error count, negative when
/// the run was aborted (-1 for internal errors)
pub fn code_of(result: &Result<ValidationReport>) -> i32 {
    match result {
        Ok(report) => report.code(),
        Err(e) => e.outcome_code(),
    }
}

/// Line and column of an event, zeros when unknown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// 1-based line
    pub line: u32,
    /// 1-based column
    pub column: u32,
}

impl Position {
    /// Position of an event
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// Callback recovering the position of the current event for sources that
/// do not provide one
pub type Locator = Box<dyn FnMut() -> Position + Send>;

/// What governs an element after its parent has been consulted
enum Governing {
    Decl(ElementId),
    /// No declaration; assessed against anyType
    Lax,
    Skip,
}

/// Result of matching a child against its parent
enum ChildMatch {
    Root,
    Decl(ElementId),
    Wildcard(WildcardId),
    Lax,
    Skip,
    Nilled,
    Unexpected(Vec<String>),
    NotAllowed(ErrorCode, &'static str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Content {
    SimpleType,
    SimpleContent,
    Empty,
    ElementOnly,
    Mixed,
}

impl Content {
    fn of(components: &Components, type_id: TypeId) -> Self {
        match &components[type_id].kind {
            TypeKind::Simple(_) => Content::SimpleType,
            TypeKind::Complex(ct) => match ct.content_type {
                ContentType::Empty => Content::Empty,
                ContentType::Simple => Content::SimpleContent,
                ContentType::ElementOnly => Content::ElementOnly,
                ContentType::Mixed => Content::Mixed,
            },
        }
    }

    fn keeps_text(self) -> bool {
        matches!(self, Content::SimpleType | Content::SimpleContent | Content::Mixed)
    }
}

/// State of one open element
#[derive(Debug)]
struct Frame<'s> {
    path: String,
    position: Position,
    decl: Option<ElementId>,
    type_id: Option<TypeId>,
    content: Content,
    skip: bool,
    nilled: bool,
    model: Option<ModelRun<'s>>,
    model_rejected: bool,
    text: String,
    text_reported: bool,
    has_elements: bool,
    namespaces: NamespaceContext,
    child_counts: HashMap<QName, usize>,
}

/// Streaming validation state for one instance document
pub struct ValidationContext<'s> {
    schema: &'s Schema,
    components: &'s Components,
    options: ValidationOptions,
    reporter: ErrorReporter,
    location: Option<String>,
    locator: Option<Locator>,
    stack: Vec<Frame<'s>>,
    idc: IdcEngine<'s>,
    ids: HashMap<String, u32>,
    idrefs: Vec<(String, Position, String)>,
    root_seen: bool,
}

impl fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("options", &self.options)
            .field("depth", &self.stack.len())
            .field("errors", &self.reporter.error_count())
            .finish()
    }
}

fn is_xsi_meta(name: &QName) -> bool {
    name.ns() == Some(XSI_NAMESPACE)
        && matches!(
            name.local_name.as_str(),
            "type" | "nil" | "schemaLocation" | "noNamespaceSchemaLocation"
        )
}

fn xsi_attribute<'a>(attributes: &'a [Attribute], local_name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|a| a.name.is(Some(XSI_NAMESPACE), local_name))
        .map(|a| a.value.as_str())
}

fn any_type() -> TypeId {
    TypeId::builtin(BuiltinType::AnyType)
}

impl<'s> ValidationContext<'s> {
    /// Start a run over `schema`
    pub fn new(schema: &'s Schema, options: ValidationOptions) -> Self {
        let components = schema.components();
        let idc = IdcEngine::new(
            components,
            options.build_idc_node_tables,
            options.expose_idc_node_tables,
        );
        Self {
            schema,
            components,
            options,
            reporter: ErrorReporter::new(),
            location: None,
            locator: None,
            stack: Vec::new(),
            idc,
            ids: HashMap::new(),
            idrefs: Vec::new(),
            root_seen: false,
        }
    }

    /// Options of this run
    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Document location used in diagnostics
    pub fn set_location(&mut self, location: impl Into<String>) {
        self.location = Some(location.into());
    }

    /// Install a locator for events that come without a position
    pub fn set_locator(&mut self, locator: Locator) {
        self.locator = Some(locator);
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

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Errors reported so far
    pub fn error_count(&self) -> usize {
        self.reporter.error_count()
    }

    fn report(&mut self, code: ErrorCode, position: Position, path: &str, message: impl Into<String>) {
        let diagnostic = Diagnostic::error(Domain::Validator, code, message)
            .with_file(self.location.clone())
            .with_position(position.line, position.column)
            .with_path(path);
        self.reporter.report(diagnostic);
    }

    fn report_idc(&mut self, issues: Vec<IdcIssue>, position: Position, path: &str) {
        for issue in issues {
            self.report(issue.code, position, path, issue.message);
        }
    }

    fn locate(&mut self, position: Position) -> Position {
        if position.line == 0 {
            if let Some(locator) = self.locator.as_mut() {
                return locator();
            }
        }
        position
    }

    fn child_path(&mut self, name: &QName) -> String {
        match self.stack.last_mut() {
            None => format!("/{}", name.local_name),
            Some(parent) => {
                let count = parent.child_counts.entry(name.clone()).or_insert(0);
                *count += 1;
                if *count > 1 {
                    format!("{}/{}[{}]", parent.path, name.local_name, count)
                } else {
                    format!("{}/{}", parent.path, name.local_name)
                }
            }
        }
    }

    /// An element starts. Returns the attributes the schema supplies by
    /// default, which the caller may add to its tree.
    pub fn start_element(
        &mut self,
        name: &QName,
        attributes: &[Attribute],
        namespaces: &NamespaceContext,
        position: Position,
    ) -> Result<Vec<Attribute>> {
        let depth = self.stack.len();
        self.options.limits.check_xml_depth(depth + 1)?;
        self.options.limits.check_attributes(attributes.len())?;
        if depth == 0 {
            if self.root_seen {
                return Err(Error::Internal("a second document element was started".into()));
            }
            self.root_seen = true;
        }
        let position = self.locate(position);
        let path = self.child_path(name);
        trace!(element = %name, depth, "start element");

        let governing = self.match_child(name, position, &path);
        let mut frame = Frame {
            path,
            position,
            decl: None,
            type_id: None,
            content: Content::Empty,
            skip: false,
            nilled: false,
            model: None,
            model_rejected: false,
            text: String::new(),
            text_reported: false,
            has_elements: false,
            namespaces: namespaces.clone(),
            child_counts: HashMap::new(),
        };

        let mut defaults = Vec::new();
        let mut typed: Vec<(QName, XsdValue)> = Vec::new();
        match governing {
            Governing::Skip => frame.skip = true,
            Governing::Decl(decl) => {
                frame.decl = Some(decl);
                self.assess_element(&mut frame, attributes, &mut typed, &mut defaults);
            }
            Governing::Lax => {
                self.assess_element(&mut frame, attributes, &mut typed, &mut defaults);
            }
        }
        if frame.skip {
            typed = attributes
                .iter()
                .map(|a| (a.name.clone(), XsdValue::String(a.value.clone())))
                .collect();
        }

        if self.idc.is_enabled() {
            let mut issues = Vec::new();
            self.idc
                .start_element(name, frame.decl, &typed, position.line, &mut issues);
            let path = frame.path.clone();
            self.report_idc(issues, position, &path);
        }
        self.stack.push(frame);
        Ok(defaults)
    }

    /// Consult the parent (or the global declarations for the root)
    fn match_child(&mut self, name: &QName, position: Position, path: &str) -> Governing {
        let components = self.components;
        let matched = match self.stack.last_mut() {
            None => ChildMatch::Root,
            Some(parent) => {
                parent.has_elements = true;
                if parent.skip {
                    ChildMatch::Skip
                } else if parent.nilled {
                    ChildMatch::Nilled
                } else if let Some(run) = parent.model.as_mut() {
                    match run.push(name) {
                        Ok(ParticleLabel::Element { decl, .. }) => ChildMatch::Decl(*decl),
                        Ok(ParticleLabel::Wildcard { wildcard, .. }) => ChildMatch::Wildcard(*wildcard),
                        Err(expected) => {
                            parent.model_rejected = true;
                            ChildMatch::Unexpected(expected)
                        }
                    }
                } else {
                    match parent.content {
                        Content::ElementOnly | Content::Mixed => ChildMatch::Lax,
                        Content::Empty => ChildMatch::NotAllowed(
                            ErrorCode::CvcComplexType2_1,
                            "Element content is not allowed, because the content type is empty",
                        ),
                        Content::SimpleContent => ChildMatch::NotAllowed(
                            ErrorCode::CvcComplexType2_2,
                            "Element content is not allowed, because the content type is a simple type definition",
                        ),
                        Content::SimpleType => ChildMatch::NotAllowed(
                            ErrorCode::CvcType3_1_2,
                            "Element children are not allowed, because the type definition is simple",
                        ),
                    }
                }
            }
        };

        match matched {
            ChildMatch::Root => match self.schema.element(name) {
                Some(decl) => Governing::Decl(decl),
                None => {
                    self.report(
                        ErrorCode::CvcElt1,
                        position,
                        path,
                        format!("No matching global declaration available for the validation root '{}'", name),
                    );
                    Governing::Skip
                }
            },
            ChildMatch::Decl(decl) => Governing::Decl(decl),
            ChildMatch::Wildcard(wildcard) => match components[wildcard].process_contents {
                ProcessContents::Skip => Governing::Skip,
                ProcessContents::Lax => match self.schema.element(name) {
                    Some(decl) => Governing::Decl(decl),
                    None => Governing::Lax,
                },
                ProcessContents::Strict => match self.schema.element(name) {
                    Some(decl) => Governing::Decl(decl),
                    None => {
                        self.report(
                            ErrorCode::CvcElt1,
                            position,
                            path,
                            format!(
                                "No matching global element declaration available for '{}', but demanded by the strict wildcard",
                                name
                            ),
                        );
                        Governing::Skip
                    }
                },
            },
            ChildMatch::Lax => Governing::Lax,
            ChildMatch::Skip => Governing::Skip,
            ChildMatch::Nilled => {
                self.report(
                    ErrorCode::CvcElt3_2_1,
                    position,
                    path,
                    "The element cannot have element children, because it is nilled",
                );
                Governing::Skip
            }
            ChildMatch::Unexpected(expected) => {
                let message = if expected.is_empty() {
                    format!("Element '{}': This element is not expected", name)
                } else {
                    format!(
                        "Element '{}': This element is not expected. Expected is one of ( {} )",
                        name,
                        expected.join(", ")
                    )
                };
                self.report(ErrorCode::CvcComplexType2_4, position, path, message);
                Governing::Skip
            }
            ChildMatch::NotAllowed(code, message) => {
                self.report(code, position, path, format!("Element '{}': {}", name, message));
                Governing::Skip
            }
        }
    }

    /// Declaration, xsi:type, xsi:nil and attribute assessment of a new frame
    fn assess_element(
        &mut self,
        frame: &mut Frame<'s>,
        attributes: &[Attribute],
        typed: &mut Vec<(QName, XsdValue)>,
        defaults: &mut Vec<Attribute>,
    ) {
        let components = self.components;
        let (position, path) = (frame.position, frame.path.clone());

        let mut type_id = any_type();
        if let Some(decl) = frame.decl {
            let element = &components[decl];
            if element.is_abstract {
                self.report(
                    ErrorCode::CvcElt2,
                    position,
                    &path,
                    format!("The element declaration '{}' is abstract", element.name),
                );
                frame.skip = true;
                return;
            }
            type_id = element.type_id().unwrap_or_else(any_type);
        }

        if let Some(value) = xsi_attribute(attributes, "type") {
            type_id = self.xsi_type(frame, value, type_id);
        }
        let ty = &components[type_id];
        if ty.is_abstract {
            self.report(
                ErrorCode::CvcType2,
                position,
                &path,
                format!("The type definition '{}' is abstract", ty.display_name()),
            );
            frame.skip = true;
            return;
        }
        frame.type_id = Some(type_id);
        frame.content = Content::of(components, type_id);

        if let Some(value) = xsi_attribute(attributes, "nil") {
            self.xsi_nil(frame, value);
        }

        self.assess_attributes(frame, type_id, attributes, typed, defaults);

        if !frame.nilled {
            if let Some(ct) = ty.complex() {
                if ct.content_type.has_particle() {
                    frame.model = ct.content_model.as_deref().map(|model| model.run());
                }
            }
        }
    }

    fn xsi_type(&mut self, frame: &Frame<'s>, value: &str, declared: TypeId) -> TypeId {
        let components = self.components;
        let (position, path) = (frame.position, frame.path.as_str());
        let name = match frame.namespaces.resolve(value.trim()) {
            Ok(name) => name,
            Err(_) => {
                self.report(
                    ErrorCode::CvcElt4_1,
                    position,
                    path,
                    format!("The value '{}' of xsi:type is not a valid QName", value),
                );
                return declared;
            }
        };
        let Some(actual) = self.schema.type_def(&name) else {
            self.report(
                ErrorCode::CvcElt4_2,
                position,
                path,
                format!("The QName value '{}' of xsi:type does not resolve to a type definition", name),
            );
            return declared;
        };
        let mut blocked = components[declared].block;
        if let Some(decl) = frame.decl {
            blocked = blocked.union_with(components[decl].block);
        }
        if components.is_derived_from(actual, declared, blocked) {
            trace!(xsi_type = %name, "type overridden");
            actual
        } else {
            self.report(
                ErrorCode::CvcElt4_3,
                position,
                path,
                format!(
                    "The type definition '{}' given by xsi:type is not validly derived from the type definition '{}'",
                    components[actual].display_name(),
                    components[declared].display_name()
                ),
            );
            declared
        }
    }

    fn xsi_nil(&mut self, frame: &mut Frame<'s>, value: &str) {
        let components = self.components;
        let (position, path) = (frame.position, frame.path.clone());
        let Some(decl) = frame.decl else {
            return;
        };
        let element = &components[decl];
        if !element.nillable {
            self.report(
                ErrorCode::CvcElt3_1,
                position,
                &path,
                format!("The element declaration '{}' is not nillable", element.name),
            );
            return;
        }
        match boolean_to_rust(value.trim()) {
            Ok(true) => {
                frame.nilled = true;
                if element.value_constraint.as_ref().map_or(false, |c| c.is_fixed()) {
                    self.report(
                        ErrorCode::CvcElt3_2_2,
                        position,
                        &path,
                        "The element cannot be nilled, because its declaration has a fixed value constraint",
                    );
                }
            }
            Ok(false) => {}
            Err(_) => self.report(
                ErrorCode::CvcDatatypeValid,
                position,
                &path,
                format!("'{}' is not a valid value of xsi:nil", value),
            ),
        }
    }

    fn assess_attributes(
        &mut self,
        frame: &Frame<'s>,
        type_id: TypeId,
        attributes: &[Attribute],
        typed: &mut Vec<(QName, XsdValue)>,
        defaults: &mut Vec<Attribute>,
    ) {
        let components = self.components;
        let (position, path) = (frame.position, frame.path.as_str());
        let ty = &components[type_id];
        let instance: Vec<&Attribute> = attributes.iter().filter(|a| !is_xsi_meta(&a.name)).collect();

        let Some(ct) = ty.complex() else {
            for attr in instance {
                self.report(
                    ErrorCode::CvcType3_1_1,
                    position,
                    path,
                    format!(
                        "The attribute '{}' is not allowed, because the type '{}' is simple",
                        attr.name,
                        ty.display_name()
                    ),
                );
            }
            return;
        };

        let mut used = vec![false; instance.len()];
        let mut use_has_id = false;
        for &use_id in &ct.attribute_uses {
            let au = &components[use_id];
            let Some(decl_id) = au.decl.resolved() else {
                continue;
            };
            let decl = &components[decl_id];
            let decl_type = decl
                .type_id()
                .unwrap_or(TypeId::builtin(BuiltinType::AnySimpleType));
            if id_role(components, decl_type) == Some(IdRole::Id) {
                use_has_id = true;
            }
            let constraint = au.effective_constraint(components);

            match instance.iter().position(|a| a.name == decl.name) {
                Some(i) => {
                    used[i] = true;
                    let attr = instance[i];
                    match validate_simple_value(components, decl_type, &attr.value, Some(&frame.namespaces)) {
                        Ok(value) => {
                            if let Some(fixed) = constraint.filter(|c| c.is_fixed()) {
                                let matches = match &fixed.value {
                                    Some(expected) => values_equal(expected, &value),
                                    None => fixed.lexical == attr.value,
                                };
                                if !matches {
                                    self.report(
                                        ErrorCode::CvcAu,
                                        position,
                                        path,
                                        format!(
                                            "The value '{}' of attribute '{}' does not match the fixed value constraint '{}'",
                                            attr.value, attr.name, fixed.lexical
                                        ),
                                    );
                                }
                            }
                            self.track_ids(decl_type, &value, position, path);
                            typed.push((attr.name.clone(), value));
                        }
                        Err(issue) => self.attribute_value_error(&attr.name, &attr.value, issue, position, path),
                    }
                }
                None if au.required => self.report(
                    ErrorCode::CvcComplexType4,
                    position,
                    path,
                    format!("The attribute '{}' is required but missing", decl.name),
                ),
                None => {
                    if let Some(c) = constraint {
                        defaults.push(Attribute {
                            name: decl.name.clone(),
                            value: c.lexical.clone(),
                            defaulted: true,
                        });
                        if let Some(value) = &c.value {
                            typed.push((decl.name.clone(), value.clone()));
                        }
                    }
                }
            }
        }

        let wildcard = ct.attribute_wildcard.map(|w| &components[w]);
        let mut wild_ids = 0usize;
        for (attr, _) in instance.iter().zip(&used).filter(|(_, used)| !**used) {
            let Some(wildcard) = wildcard else {
                self.report(
                    ErrorCode::CvcComplexType3_2_1,
                    position,
                    path,
                    format!("The attribute '{}' is not allowed", attr.name),
                );
                continue;
            };
            if !wildcard.allows(attr.name.ns()) {
                self.report(
                    ErrorCode::CvcComplexType3_2_2,
                    position,
                    path,
                    format!("The attribute '{}' is not allowed by the attribute wildcard", attr.name),
                );
                continue;
            }
            let decl = match wildcard.process_contents {
                ProcessContents::Skip => None,
                _ => self.schema.attribute(&attr.name),
            };
            match decl {
                Some(decl_id) => {
                    let decl = &components[decl_id];
                    let decl_type = decl
                        .type_id()
                        .unwrap_or(TypeId::builtin(BuiltinType::AnySimpleType));
                    match validate_simple_value(components, decl_type, &attr.value, Some(&frame.namespaces)) {
                        Ok(value) => {
                            if id_role(components, decl_type) == Some(IdRole::Id) {
                                wild_ids += 1;
                            }
                            if let Some(fixed) = decl.value_constraint.as_ref().filter(|c| c.is_fixed()) {
                                if !fixed.value.as_ref().map_or(true, |f| values_equal(f, &value)) {
                                    self.report(
                                        ErrorCode::CvcAu,
                                        position,
                                        path,
                                        format!(
                                            "The value '{}' of attribute '{}' does not match the fixed value constraint '{}'",
                                            attr.value, attr.name, fixed.lexical
                                        ),
                                    );
                                }
                            }
                            self.track_ids(decl_type, &value, position, path);
                            typed.push((attr.name.clone(), value));
                        }
                        Err(issue) => self.attribute_value_error(&attr.name, &attr.value, issue, position, path),
                    }
                }
                None if wildcard.process_contents == ProcessContents::Strict => self.report(
                    ErrorCode::CvcWildcard,
                    position,
                    path,
                    format!(
                        "No matching global attribute declaration available for '{}', but demanded by the strict wildcard",
                        attr.name
                    ),
                ),
                None => typed.push((attr.name.clone(), XsdValue::String(attr.value.clone()))),
            }
        }

        if wild_ids > 1 {
            self.report(
                ErrorCode::CvcComplexType5_1,
                position,
                path,
                "More than one attribute matched by the attribute wildcard is derived from xs:ID",
            );
        } else if wild_ids == 1 && use_has_id {
            self.report(
                ErrorCode::CvcComplexType5_2,
                position,
                path,
                "An attribute matched by the attribute wildcard is derived from xs:ID, and the type already declares an ID attribute",
            );
        }
    }

    fn attribute_value_error(&mut self, name: &QName, value: &str, issue: ValueIssue, position: Position, path: &str) {
        self.report(
            issue.code,
            position,
            path,
            format!("The value '{}' of attribute '{}' is not valid: {}", value, name, issue.message),
        );
    }

    fn track_ids(&mut self, type_id: TypeId, value: &XsdValue, position: Position, path: &str) {
        if !self.options.check_ids {
            return;
        }
        match id_role(self.components, type_id) {
            Some(IdRole::Id) => {
                if let XsdValue::String(id) = value {
                    match self.ids.get(id) {
                        Some(first) => {
                            let message = format!("Duplicate ID value '{}', first declared at line {}", id, first);
                            self.report(ErrorCode::CvcId2, position, path, message);
                        }
                        None => {
                            self.ids.insert(id.clone(), position.line);
                        }
                    }
                }
            }
            Some(IdRole::IdRef) => {
                if let XsdValue::String(idref) = value {
                    self.idrefs.push((idref.clone(), position, path.to_string()));
                }
            }
            Some(IdRole::IdRefs) => {
                if let XsdValue::List(items) = value {
                    for item in items {
                        if let XsdValue::String(idref) = item {
                            self.idrefs.push((idref.clone(), position, path.to_string()));
                        }
                    }
                }
            }
            None => {}
        }
    }

    /// Character data of the current element; chunks are concatenated
    pub fn characters(&mut self, text: &str) {
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        if frame.skip || frame.content.keeps_text() {
            frame.text.push_str(text);
        }
        if frame.skip || frame.text_reported || text.trim().is_empty() {
            return;
        }
        let issue = if frame.nilled {
            Some((
                ErrorCode::CvcElt3_2_1,
                "The element cannot have character children, because it is nilled",
            ))
        } else {
            match frame.content {
                Content::ElementOnly => Some((
                    ErrorCode::CvcComplexType2_3,
                    "Character content other than whitespace is not allowed, because the content type is element-only",
                )),
                Content::Empty => Some((
                    ErrorCode::CvcComplexType2_1,
                    "Character content is not allowed, because the content type is empty",
                )),
                _ => None,
            }
        };
        if let Some((code, message)) = issue {
            frame.text_reported = true;
            let (position, path) = (frame.position, frame.path.clone());
            self.report(code, position, &path, message);
        }
    }

    /// The current element ends. Returns the default value the schema
    /// supplies for an empty element, which the caller may add to its tree.
    pub fn end_element(&mut self) -> Result<Option<String>> {
        let Some(frame) = self.stack.pop() else {
            return Err(Error::Internal("end_element without an open element".into()));
        };
        trace!(path = %frame.path, "end element");

        let mut injected = None;
        let value = if frame.skip {
            (!frame.has_elements).then(|| XsdValue::String(frame.text.clone()))
        } else if frame.nilled {
            None
        } else {
            match frame.type_id {
                Some(type_id) => self.assess_content(&frame, type_id, &mut injected),
                None => None,
            }
        };

        if self.idc.is_enabled() {
            let mut issues = Vec::new();
            self.idc.end_element(value.as_ref(), &mut issues);
            self.report_idc(issues, frame.position, &frame.path);
        }
        Ok(injected)
    }

    fn assess_content(&mut self, frame: &Frame<'s>, type_id: TypeId, injected: &mut Option<String>) -> Option<XsdValue> {
        let components = self.components;
        let (position, path) = (frame.position, frame.path.as_str());
        let constraint = frame.decl.and_then(|d| components[d].value_constraint.as_ref());
        let empty = !frame.has_elements && frame.text.is_empty();

        let simple_type = match frame.content {
            Content::SimpleType => Some(type_id),
            Content::SimpleContent => Some(
                components[type_id]
                    .complex()
                    .and_then(|ct| ct.simple_type)
                    .unwrap_or(TypeId::builtin(BuiltinType::AnySimpleType)),
            ),
            Content::Empty => None,
            Content::ElementOnly | Content::Mixed => {
                if let Some(run) = &frame.model {
                    if !frame.model_rejected && !run.is_final() {
                        let expected = run.expected();
                        self.report(
                            ErrorCode::CvcComplexType2_4,
                            position,
                            path,
                            format!("Missing child element(s). Expected is one of ( {} )", expected.join(", ")),
                        );
                    }
                }
                if frame.content == Content::Mixed && !frame.has_elements {
                    match constraint {
                        Some(c) if empty => *injected = Some(c.lexical.clone()),
                        Some(c) if c.is_fixed() && frame.text != c.lexical => self.report(
                            ErrorCode::CvcElt5_2_2,
                            position,
                            path,
                            format!(
                                "The element content '{}' does not match the fixed value constraint '{}'",
                                frame.text, c.lexical
                            ),
                        ),
                        _ => {}
                    }
                }
                None
            }
        };

        let simple_type = simple_type?;
        if frame.has_elements {
            // already reported when the child started
            return None;
        }
        let (lexical, namespaces) = match constraint {
            Some(c) if empty => {
                *injected = Some(c.lexical.clone());
                (c.lexical.as_str(), &c.namespaces)
            }
            _ => (frame.text.as_str(), &frame.namespaces),
        };
        match validate_simple_value(components, simple_type, lexical, Some(namespaces)) {
            Ok(value) => {
                if let Some(fixed) = constraint.filter(|c| c.is_fixed() && !empty) {
                    let matches = match &fixed.value {
                        Some(expected) => values_equal(expected, &value),
                        None => fixed.lexical == lexical,
                    };
                    if !matches {
                        self.report(
                            ErrorCode::CvcElt5_2_2,
                            position,
                            path,
                            format!(
                                "The element content '{}' does not match the fixed value constraint '{}'",
                                lexical.trim(),
                                fixed.lexical
                            ),
                        );
                    }
                }
                self.track_ids(simple_type, &value, position, path);
                Some(value)
            }
            Err(issue) => {
                self.report(
                    issue.code,
                    position,
                    path,
                    format!("The value '{}' is not valid: {}", lexical.trim(), issue.message),
                );
                None
            }
        }
    }

    /// End of the document: resolve IDREFs and produce the report
    pub fn finish(mut self) -> Result<ValidationReport> {
        if !self.stack.is_empty() {
            return Err(Error::Internal(format!(
                "{} element(s) still open at the end of the document",
                self.stack.len()
            )));
        }
        if self.options.check_ids {
            for (idref, position, path) in std::mem::take(&mut self.idrefs) {
                if !self.ids.contains_key(&idref) {
                    self.report(
                        ErrorCode::CvcId1,
                        position,
                        &path,
                        format!("There is no ID/IDREF binding for IDREF '{}'", idref),
                    );
                }
            }
        }
        let idc_tables = self.idc.take_exposed();
        let (error_count, warning_count, diagnostics) = self.reporter.take();
        debug!(errors = error_count, warnings = warning_count, "validation finished");
        Ok(ValidationReport {
            error_count,
            warning_count,
            diagnostics,
            idc_tables,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    const SCHEMA: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
        <xs:element name="root">
            <xs:complexType>
                <xs:sequence>
                    <xs:element name="a" type="xs:int"/>
                    <xs:element name="b" type="xs:string" minOccurs="0" default="dflt"/>
                </xs:sequence>
                <xs:attribute name="version" type="xs:decimal" default="1.0"/>
            </xs:complexType>
        </xs:element>
    </xs:schema>"#;

    fn start(ctx: &mut ValidationContext<'_>, name: &str, line: u32) -> Vec<Attribute> {
        ctx.start_element(&QName::local(name), &[], &NamespaceContext::new(), Position::new(line, 1))
            .unwrap()
    }

    #[test]
    fn test_options_serde() {
        let options = ValidationOptions::new().with_inject_defaults(true);
        let json = serde_json::to_string(&options).unwrap();
        let back: ValidationOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
        let partial: ValidationOptions = serde_json::from_str(r#"{"check_ids": false}"#).unwrap();
        assert!(!partial.check_ids);
        assert!(ValidationOptions::default().check_ids);
    }

    #[test]
    fn test_outcome_codes() {
        let report = ValidationReport {
            error_count: 3,
            ..ValidationReport::default()
        };
        assert_eq!(report.code(), 3);
        assert!(!report.is_valid());
        assert_eq!(code_of(&Ok(ValidationReport::default())), 0);
        assert_eq!(code_of(&Err(Error::Internal("x".into()))), -1);
    }

    #[test]
    fn test_event_driven_run() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let mut ctx = schema.validator(ValidationOptions::default());
        let defaults = start(&mut ctx, "root", 1);
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].value, "1.0");
        assert!(defaults[0].defaulted);

        start(&mut ctx, "a", 2);
        ctx.characters("4");
        ctx.characters("2");
        assert_eq!(ctx.end_element().unwrap(), None);
        start(&mut ctx, "b", 3);
        assert_eq!(ctx.end_element().unwrap(), Some("dflt".to_string()));
        assert_eq!(ctx.depth(), 1);
        ctx.end_element().unwrap();

        let report = ctx.finish().unwrap();
        assert!(report.is_valid(), "{:?}", report.diagnostics);
    }

    #[test]
    fn test_errors_carry_position_and_path() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let mut ctx = schema.validator(ValidationOptions::default());
        ctx.set_location("doc.xml");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        ctx.set_error_handler(Box::new(move |d| sink.lock().unwrap().push(d.code)));

        start(&mut ctx, "root", 1);
        start(&mut ctx, "a", 2);
        ctx.characters("forty-two");
        ctx.end_element().unwrap();
        ctx.end_element().unwrap();
        let report = ctx.finish().unwrap();

        assert_eq!(report.error_codes(), vec![ErrorCode::CvcDatatypeValid]);
        let d = &report.diagnostics[0];
        assert_eq!(d.file.as_deref(), Some("doc.xml"));
        assert_eq!(d.line, Some(2));
        assert_eq!(d.path.as_deref(), Some("/root/a"));
        assert_eq!(*seen.lock().unwrap(), vec![ErrorCode::CvcDatatypeValid]);
    }

    #[test]
    fn test_locator_fills_missing_positions() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let mut ctx = schema.validator(ValidationOptions::default());
        ctx.set_locator(Box::new(|| Position::new(9, 3)));
        ctx.start_element(&QName::local("other"), &[], &NamespaceContext::new(), Position::default())
            .unwrap();
        ctx.end_element().unwrap();
        let report = ctx.finish().unwrap();
        assert_eq!(report.error_codes(), vec![ErrorCode::CvcElt1]);
        assert_eq!(report.diagnostics[0].line, Some(9));
    }

    #[test]
    fn test_misuse_is_internal() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let mut ctx = schema.validator(ValidationOptions::default());
        assert!(ctx.end_element().unwrap_err().is_internal());

        let mut ctx = schema.validator(ValidationOptions::default());
        start(&mut ctx, "root", 1);
        assert!(ctx.finish().unwrap_err().is_internal());
    }

    #[test]
    fn test_depth_limit() {
        let schema = Schema::parse_str(SCHEMA).unwrap();
        let options = ValidationOptions::new().with_limits(Limits::default().with_max_xml_depth(1));
        let mut ctx = schema.validator(options);
        start(&mut ctx, "root", 1);
        let err = ctx
            .start_element(&QName::local("a"), &[], &NamespaceContext::new(), Position::default())
            .unwrap_err();
        assert!(matches!(err, Error::LimitExceeded(_)));
    }
}
