//! XSD Simple Type definitions
//!
//! This module implements XSD simple type definitions including:
//! - Atomic types (built-in and derived)
//! - List types (whitespace-separated lists)
//! - Union types (value matching any member type)
//!
//! Values are validated by walking the derivation steps: every restriction
//! step normalizes the literal with its whiteSpace value, hands it to its
//! base type, then checks its own facets on the returned value.
//!
//! See: https://www.w3.org/TR/xmlschema-2/

use crate::namespaces::NamespaceContext;

use super::base::{Components, DerivationMethod, Ref, TypeId};
use super::builtins::BuiltinType;
use super::exceptions::ErrorCode;
use super::facets::{check_enumerations, check_patterns, Facet, FacetKind, WhiteSpace};
use super::values::{parse_value, XsdValue};

// =============================================================================
// Simple Type Variety
// =============================================================================

/// Variety of a simple type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Variety {
    /// Not computed yet, or anySimpleType
    #[default]
    Absent,
    /// Atomic type (single value)
    Atomic,
    /// List type (whitespace-separated values)
    List,
    /// Union type (value matches one of several types)
    Union,
}

impl std::fmt::Display for Variety {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Atomic => write!(f, "atomic"),
            Self::List => write!(f, "list"),
            Self::Union => write!(f, "union"),
        }
    }
}

/// Body of a simple type definition
#[derive(Debug, Clone, Default)]
pub struct SimpleTypeDef {
    /// {variety}
    pub variety: Variety,
    /// {item type definition} for `<list>`
    pub item_type: Option<Ref<TypeId>>,
    /// {member type definitions} for `<union>`
    pub member_types: Vec<Ref<TypeId>>,
    /// Facets written on this restriction step
    pub facets: Vec<Facet>,
    /// Effective whiteSpace
    pub white_space: WhiteSpace,
    /// Nearest built-in ancestor of an atomic type
    pub primitive: Option<BuiltinType>,
    /// Constraint checks and facet derivation have run
    pub checked: bool,
}

impl SimpleTypeDef {
    /// Own facets of a kind
    pub fn facets_of(&self, kind: FacetKind) -> impl Iterator<Item = &Facet> {
        self.facets.iter().filter(move |f| f.kind == kind)
    }

    /// The single own facet of a kind
    pub fn facet(&self, kind: FacetKind) -> Option<&Facet> {
        self.facets.iter().find(|f| f.kind == kind)
    }
}

/// Why a literal is not valid for a simple type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueIssue {
    /// Violated constraint
    pub code: ErrorCode,
    /// Description
    pub message: String,
}

impl ValueIssue {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValueIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Validate a literal against a simple type definition
pub fn validate_simple_value(
    components: &Components,
    type_id: TypeId,
    lexical: &str,
    namespaces: Option<&NamespaceContext>,
) -> Result<XsdValue, ValueIssue> {
    validate_step(components, type_id, lexical, namespaces, 0)
}

fn validate_step(
    components: &Components,
    type_id: TypeId,
    lexical: &str,
    namespaces: Option<&NamespaceContext>,
    depth: usize,
) -> Result<XsdValue, ValueIssue> {
    // circular definitions are reported during fixup
    if depth > components.types.len() {
        return Err(ValueIssue::new(
            ErrorCode::CvcDatatypeValid,
            "the type definition is circular",
        ));
    }
    let ty = &components[type_id];
    if let Some(builtin) = ty.builtin {
        return parse_value(builtin, lexical, namespaces)
            .map_err(|e| ValueIssue::new(ErrorCode::CvcDatatypeValid, error_text(e)));
    }
    let Some(st) = ty.simple() else {
        return Err(ValueIssue::new(
            ErrorCode::CvcDatatypeValid,
            format!("{} is not a simple type", ty.display_name()),
        ));
    };
    let unusable = || {
        ValueIssue::new(
            ErrorCode::CvcDatatypeValid,
            format!("the type definition {} is not usable", ty.display_name()),
        )
    };

    match ty.derivation {
        DerivationMethod::List => {
            let item = st.item_type.as_ref().and_then(|r| r.resolved()).ok_or_else(unusable)?;
            let items = WhiteSpace::Collapse
                .normalize(lexical)
                .split(' ')
                .filter(|s| !s.is_empty())
                .map(|token| validate_step(components, item, token, namespaces, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(XsdValue::List(items))
        }
        DerivationMethod::Union => {
            for member in st.member_types.iter().filter_map(|r| r.resolved()) {
                if let Ok(value) = validate_step(components, member, lexical, namespaces, depth + 1) {
                    return Ok(value);
                }
            }
            Err(ValueIssue::new(
                ErrorCode::CvcDatatypeValid,
                format!(
                    "'{}' is not valid for any member type of {}",
                    lexical.trim(),
                    ty.display_name()
                ),
            ))
        }
        DerivationMethod::Restriction | DerivationMethod::Extension => {
            let base = ty.base_id().ok_or_else(unusable)?;
            let normalized = st.white_space.normalize(lexical);
            let value = validate_step(components, base, &normalized, namespaces, depth + 1)?;
            check_step_facets(st, &normalized, &value)?;
            Ok(value)
        }
    }
}

/// Check the facets of one restriction step
fn check_step_facets(st: &SimpleTypeDef, normalized: &str, value: &XsdValue) -> Result<(), ValueIssue> {
    check_patterns(st.facets_of(FacetKind::Pattern), normalized)
        .map_err(|m| ValueIssue::new(ErrorCode::CvcFacetValid(FacetKind::Pattern), m))?;
    check_enumerations(st.facets_of(FacetKind::Enumeration), value)
        .map_err(|m| ValueIssue::new(ErrorCode::CvcFacetValid(FacetKind::Enumeration), m))?;
    for facet in &st.facets {
        facet
            .check(value)
            .map_err(|m| ValueIssue::new(ErrorCode::CvcFacetValid(facet.kind), m))?;
    }
    Ok(())
}

fn error_text(error: crate::error::Error) -> String {
    match error {
        crate::error::Error::Value(message) => message,
        other => other.to_string(),
    }
}

/// Nearest built-in type on the base chain of a type
pub fn builtin_ancestor(components: &Components, type_id: TypeId) -> Option<BuiltinType> {
    components
        .base_chain(type_id)
        .find_map(|t| components[t].builtin)
}

/// ID-related role of a simple type, for ID/IDREF checking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdRole {
    /// xs:ID
    Id,
    /// xs:IDREF
    IdRef,
    /// a list of IDREFs
    IdRefs,
}

/// Whether values of a type are IDs or ID references
pub fn id_role(components: &Components, type_id: TypeId) -> Option<IdRole> {
    for t in components.base_chain(type_id) {
        let ty = &components[t];
        if let Some(b) = ty.builtin {
            return if b.is_id() {
                Some(IdRole::Id)
            } else if b == BuiltinType::IdRefs {
                Some(IdRole::IdRefs)
            } else if b.is_idref() {
                Some(IdRole::IdRef)
            } else {
                None
            };
        }
        match ty.derivation {
            DerivationMethod::List => {
                let item = ty.simple()?.item_type.as_ref()?.resolved()?;
                return match id_role(components, item) {
                    Some(IdRole::IdRef) => Some(IdRole::IdRefs),
                    _ => None,
                };
            }
            DerivationMethod::Union => return None,
            _ => {}
        }
    }
    None
}
