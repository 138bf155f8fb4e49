//! Diagnostics for schema construction and instance validation
//!
//! Component and instance defects never abort an operation. They are turned
//! into [`Diagnostic`] records, dispatched to the caller's sinks as they
//! occur, counted, and collected for the final report.

use serde::Serialize;
use std::fmt;

use super::facets::FacetKind;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Recoverable oddity, does not affect the outcome
    Warning,
    /// Schema or instance defect
    Error,
}

/// Which engine produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    /// Schema parsing and fixup
    Parser,
    /// Instance validation
    Validator,
}

/// Error codes, rendered as the name of the violated constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorCode {
    // schema document structure
    AttrNotAllowed,
    AttrMissing,
    AttrInvalidValue,
    ElemNotAllowed,
    ElemMissing,
    SchemaLoad,
    SrcImport,
    SrcInclude,
    SrcRedefine,
    SrcElement,
    SrcAttribute,
    SrcAttributeGroup,
    SrcCt,
    SrcSimpleType,
    SrcResolve,
    SrcResolveImport,
    SchPropsCorrect,
    PPropsCorrect,
    SelectorXPath,
    FieldXPath,
    // component constraints
    CtPropsCorrect,
    CosCtExtends,
    DerivationOkRestriction,
    StPropsCorrect,
    CosStRestricts,
    CosApplicableFacets,
    StRestrictFacets,
    FacetValue,
    MgPropsCorrect,
    AgPropsCorrect,
    CosAllLimited,
    EPropsCorrect,
    APropsCorrect,
    AuPropsCorrect,
    CosValidDefault,
    CosNonambig,
    CPropsCorrect,
    CosAwUnion,
    CosAwIntersect,
    PointlessProhibition,
    // instance validation
    CvcElt1,
    CvcElt2,
    CvcElt3_1,
    CvcElt3_2_1,
    CvcElt3_2_2,
    CvcElt4_1,
    CvcElt4_2,
    CvcElt4_3,
    CvcElt5_2_2,
    CvcType2,
    CvcType3_1_1,
    CvcType3_1_2,
    CvcComplexType2_1,
    CvcComplexType2_2,
    CvcComplexType2_3,
    CvcComplexType2_4,
    CvcComplexType3_2_1,
    CvcComplexType3_2_2,
    CvcComplexType4,
    CvcComplexType5_1,
    CvcComplexType5_2,
    CvcAttribute3,
    CvcAu,
    CvcDatatypeValid,
    CvcFacetValid(FacetKind),
    CvcWildcard,
    CvcIdcField,
    CvcIdcUnique,
    CvcIdcKeyMissing,
    CvcIdcKeyDuplicate,
    CvcIdcKeyref,
    CvcId1,
    CvcId2,
    Internal,
}

impl ErrorCode {
    /// Constraint name
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            AttrNotAllowed => "s4s-att-not-allowed",
            AttrMissing => "s4s-att-must-appear",
            AttrInvalidValue => "s4s-att-invalid-value",
            ElemNotAllowed => "s4s-elt-not-allowed",
            ElemMissing => "s4s-elt-must-match",
            SchemaLoad => "schema-load",
            SrcImport => "src-import",
            SrcInclude => "src-include",
            SrcRedefine => "src-redefine",
            SrcElement => "src-element",
            SrcAttribute => "src-attribute",
            SrcAttributeGroup => "src-attribute_group",
            SrcCt => "src-ct",
            SrcSimpleType => "src-simple-type",
            SrcResolve => "src-resolve",
            SrcResolveImport => "src-resolve.4.2",
            SchPropsCorrect => "sch-props-correct.2",
            PPropsCorrect => "p-props-correct",
            SelectorXPath => "c-selector-xpath",
            FieldXPath => "c-fields-xpaths",
            CtPropsCorrect => "ct-props-correct",
            CosCtExtends => "cos-ct-extends",
            DerivationOkRestriction => "derivation-ok-restriction",
            StPropsCorrect => "st-props-correct",
            CosStRestricts => "cos-st-restricts",
            CosApplicableFacets => "cos-applicable-facets",
            StRestrictFacets => "st-restrict-facets",
            FacetValue => "facet-value",
            MgPropsCorrect => "mg-props-correct.2",
            AgPropsCorrect => "ag-props-correct",
            CosAllLimited => "cos-all-limited",
            EPropsCorrect => "e-props-correct",
            APropsCorrect => "a-props-correct",
            AuPropsCorrect => "au-props-correct",
            CosValidDefault => "cos-valid-default",
            CosNonambig => "cos-nonambig",
            CPropsCorrect => "c-props-correct",
            CosAwUnion => "cos-aw-union",
            CosAwIntersect => "cos-aw-intersect",
            PointlessProhibition => "attr-pointless-prohibition",
            CvcElt1 => "cvc-elt.1",
            CvcElt2 => "cvc-elt.2",
            CvcElt3_1 => "cvc-elt.3.1",
            CvcElt3_2_1 => "cvc-elt.3.2.1",
            CvcElt3_2_2 => "cvc-elt.3.2.2",
            CvcElt4_1 => "cvc-elt.4.1",
            CvcElt4_2 => "cvc-elt.4.2",
            CvcElt4_3 => "cvc-elt.4.3",
            CvcElt5_2_2 => "cvc-elt.5.2.2",
            CvcType2 => "cvc-type.2",
            CvcType3_1_1 => "cvc-type.3.1.1",
            CvcType3_1_2 => "cvc-type.3.1.2",
            CvcComplexType2_1 => "cvc-complex-type.2.1",
            CvcComplexType2_2 => "cvc-complex-type.2.2",
            CvcComplexType2_3 => "cvc-complex-type.2.3",
            CvcComplexType2_4 => "cvc-complex-type.2.4",
            CvcComplexType3_2_1 => "cvc-complex-type.3.2.1",
            CvcComplexType3_2_2 => "cvc-complex-type.3.2.2",
            CvcComplexType4 => "cvc-complex-type.4",
            CvcComplexType5_1 => "cvc-complex-type.5.1",
            CvcComplexType5_2 => "cvc-complex-type.5.2",
            CvcAttribute3 => "cvc-attribute.3",
            CvcAu => "cvc-au",
            CvcDatatypeValid => "cvc-datatype-valid.1",
            CvcFacetValid(kind) => kind.validity_constraint(),
            CvcWildcard => "cvc-wildcard",
            CvcIdcField => "cvc-identity-constraint.3",
            CvcIdcUnique => "cvc-identity-constraint.4.1",
            CvcIdcKeyMissing => "cvc-identity-constraint.4.2.1",
            CvcIdcKeyDuplicate => "cvc-identity-constraint.4.2.2",
            CvcIdcKeyref => "cvc-identity-constraint.4.3",
            CvcId1 => "cvc-id.1",
            CvcId2 => "cvc-id.2",
            Internal => "internal-error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// One reported defect
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Severity
    pub level: Level,
    /// Producing engine
    pub domain: Domain,
    /// Constraint code
    pub code: ErrorCode,
    /// Formatted message
    pub message: String,
    /// Document location (file or URI)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    /// 1-based line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// 1-based column
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Location path of the offending node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic
    pub fn error(domain: Domain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            level: Level::Error,
            domain,
            code,
            message: message.into(),
            file: None,
            line: None,
            column: None,
            path: None,
        }
    }

    /// Create a warning diagnostic
    pub fn warning(domain: Domain, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            level: Level::Warning,
            ..Self::error(domain, code, message)
        }
    }

    /// Set the file
    pub fn with_file(mut self, file: Option<impl Into<String>>) -> Self {
        self.file = file.map(Into::into);
        self
    }

    /// Set line and column; zeros mean unknown
    pub fn with_position(mut self, line: u32, column: u32) -> Self {
        self.line = (line > 0).then_some(line);
        self.column = (column > 0).then_some(column);
        self
    }

    /// Set the node path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Whether this is an error (not a warning)
    pub fn is_error(&self) -> bool {
        self.level == Level::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref file) = self.file {
            write!(f, "{}:", file)?;
            if let Some(line) = self.line {
                write!(f, "{}:", line)?;
            }
            write!(f, " ")?;
        } else if let Some(line) = self.line {
            write!(f, "line {}: ", line)?;
        }
        let kind = match self.level {
            Level::Warning => "warning",
            Level::Error => "error",
        };
        if let Some(ref path) = self.path {
            write!(f, "{} [{}] {}: {}", kind, self.code, path, self.message)
        } else {
            write!(f, "{} [{}] {}", kind, self.code, self.message)
        }
    }
}

/// Callback receiving diagnostics as they are reported
pub type DiagnosticCallback = Box<dyn FnMut(&Diagnostic) + Send>;

/// Error and warning sinks plus the running counters
#[derive(Default)]
pub struct ErrorReporter {
    error_fn: Option<DiagnosticCallback>,
    warning_fn: Option<DiagnosticCallback>,
    structured_fn: Option<DiagnosticCallback>,
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
    warning_count: usize,
}

impl fmt::Debug for ErrorReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorReporter")
            .field("error_count", &self.error_count)
            .field("warning_count", &self.warning_count)
            .finish()
    }
}

impl ErrorReporter {
    /// Create a reporter without callbacks
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the error callback
    pub fn set_error_handler(&mut self, handler: DiagnosticCallback) {
        self.error_fn = Some(handler);
    }

    /// Install the warning callback
    pub fn set_warning_handler(&mut self, handler: DiagnosticCallback) {
        self.warning_fn = Some(handler);
    }

    /// Install the structured callback; it supersedes the other two
    pub fn set_structured_handler(&mut self, handler: DiagnosticCallback) {
        self.structured_fn = Some(handler);
    }

    /// Report a diagnostic
    pub fn report(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            Level::Error => {
                self.error_count += 1;
                tracing::debug!(code = %diagnostic.code, "{}", diagnostic.message);
            }
            Level::Warning => {
                self.warning_count += 1;
                tracing::warn!(code = %diagnostic.code, "{}", diagnostic.message);
            }
        }
        if let Some(handler) = self.structured_fn.as_mut() {
            handler(&diagnostic);
        } else {
            let slot = match diagnostic.level {
                Level::Error => self.error_fn.as_mut(),
                Level::Warning => self.warning_fn.as_mut(),
            };
            if let Some(handler) = slot {
                handler(&diagnostic);
            }
        }
        self.diagnostics.push(diagnostic);
    }

    /// Number of errors reported so far
    pub fn error_count(&self) -> usize {
        self.error_count
    }

    /// Number of warnings reported so far
    pub fn warning_count(&self) -> usize {
        self.warning_count
    }

    /// Diagnostics reported so far
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Take the collected diagnostics and reset the counters
    pub fn take(&mut self) -> (usize, usize, Vec<Diagnostic>) {
        let out = (
            self.error_count,
            self.warning_count,
            std::mem::take(&mut self.diagnostics),
        );
        self.error_count = 0;
        self.warning_count = 0;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_code_names() {
        assert_eq!(ErrorCode::CvcElt1.to_string(), "cvc-elt.1");
        assert_eq!(ErrorCode::SrcResolve.as_str(), "src-resolve");
        assert_eq!(
            ErrorCode::CvcFacetValid(FacetKind::MaxInclusive).as_str(),
            "cvc-maxInclusive-valid"
        );
    }

    #[test]
    fn test_display() {
        let d = Diagnostic::error(Domain::Validator, ErrorCode::CvcElt1, "No matching global declaration")
            .with_file(Some("doc.xml"))
            .with_position(4, 2)
            .with_path("/root");
        assert_eq!(
            d.to_string(),
            "doc.xml:4: error [cvc-elt.1] /root: No matching global declaration"
        );
    }

    #[test]
    fn test_reporter_dispatch() {
        let errors = Arc::new(Mutex::new(Vec::new()));
        let warnings = Arc::new(Mutex::new(Vec::new()));
        let mut reporter = ErrorReporter::new();
        let e = errors.clone();
        reporter.set_error_handler(Box::new(move |d| e.lock().unwrap().push(d.code)));
        let w = warnings.clone();
        reporter.set_warning_handler(Box::new(move |d| w.lock().unwrap().push(d.code)));

        reporter.report(Diagnostic::error(Domain::Parser, ErrorCode::SrcResolve, "x"));
        reporter.report(Diagnostic::warning(Domain::Parser, ErrorCode::SrcImport, "y"));

        assert_eq!(reporter.error_count(), 1);
        assert_eq!(reporter.warning_count(), 1);
        assert_eq!(*errors.lock().unwrap(), vec![ErrorCode::SrcResolve]);
        assert_eq!(*warnings.lock().unwrap(), vec![ErrorCode::SrcImport]);
    }

    #[test]
    fn test_structured_supersedes() {
        let seen = Arc::new(Mutex::new(0));
        let legacy = Arc::new(Mutex::new(0));
        let mut reporter = ErrorReporter::new();
        let l = legacy.clone();
        reporter.set_error_handler(Box::new(move |_| *l.lock().unwrap() += 1));
        let s = seen.clone();
        reporter.set_structured_handler(Box::new(move |_| *s.lock().unwrap() += 1));
        reporter.report(Diagnostic::error(Domain::Validator, ErrorCode::CvcElt1, "x"));
        assert_eq!(*seen.lock().unwrap(), 1);
        assert_eq!(*legacy.lock().unwrap(), 0);
        let (errors, warnings, list) = reporter.take();
        assert_eq!((errors, warnings, list.len()), (1, 0, 1));
        assert_eq!(reporter.error_count(), 0);
    }

    #[test]
    fn test_serialize() {
        let d = Diagnostic::error(Domain::Validator, ErrorCode::CvcAu, "fixed");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["code"], "cvc-au");
        assert_eq!(json["level"], "error");
        assert!(json.get("line").is_none());
    }
}
