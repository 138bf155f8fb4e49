//! XSD attribute components
//!
//! This module implements attribute declarations, attribute uses and
//! attribute group definitions. Complex types and attribute groups share
//! the [`AttributeContainer`] shape for what was written in the schema;
//! the effective attribute-use set is computed during fixup.

use crate::namespaces::{NamespaceContext, QName};

use super::base::{AttributeGroupId, AttributeId, AttributeUseId, BucketId, Components, Ref, SourcePos, TypeId, WildcardId};
use super::values::XsdValue;

/// Attribute use mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UseMode {
    /// Attribute is optional (default)
    #[default]
    Optional,
    /// Attribute is required
    Required,
    /// Attribute is prohibited
    Prohibited,
}

impl UseMode {
    /// Parse from string value
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim() {
            "optional" => Some(UseMode::Optional),
            "required" => Some(UseMode::Required),
            "prohibited" => Some(UseMode::Prohibited),
            _ => None,
        }
    }

    /// Get the use as a string
    pub fn as_str(&self) -> &'static str {
        match self {
            UseMode::Optional => "optional",
            UseMode::Required => "required",
            UseMode::Prohibited => "prohibited",
        }
    }
}

impl std::fmt::Display for UseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of a value constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    /// `default="…"`
    Default,
    /// `fixed="…"`
    Fixed,
}

/// Default or fixed value of an element or attribute
#[derive(Debug, Clone)]
pub struct ValueConstraint {
    /// Default or fixed
    pub kind: ConstraintKind,
    /// The value as written
    pub lexical: String,
    /// Value in the declared type's value space, computed during fixup
    pub value: Option<XsdValue>,
    /// In-scope namespaces where the value was written (QName values)
    pub namespaces: NamespaceContext,
}

impl ValueConstraint {
    /// Unparsed constraint
    pub fn new(kind: ConstraintKind, lexical: impl Into<String>, namespaces: NamespaceContext) -> Self {
        Self {
            kind,
            lexical: lexical.into(),
            value: None,
            namespaces,
        }
    }

    /// Whether this is a fixed value
    pub fn is_fixed(&self) -> bool {
        self.kind == ConstraintKind::Fixed
    }
}

/// An attribute declaration
#[derive(Debug, Clone)]
pub struct AttributeDecl {
    /// {name} and {target namespace}
    pub name: QName,
    /// Top-level declaration
    pub global: bool,
    /// {type definition}; anonymous types are resolved at parse time
    pub type_def: Ref<TypeId>,
    /// {value constraint}
    pub value_constraint: Option<ValueConstraint>,
    /// Where the declaration was written
    pub pos: SourcePos,
    /// Defining document
    pub bucket: Option<BucketId>,
    /// Marked by a component constraint violation
    pub invalid: bool,
}

impl AttributeDecl {
    /// Resolved type definition
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_def.resolved()
    }
}

/// An attribute use: a declaration plus how it is used by a type
#[derive(Debug, Clone)]
pub struct AttributeUse {
    /// {attribute declaration}
    pub decl: Ref<AttributeId>,
    /// {required}
    pub required: bool,
    /// {value constraint} of the use, overriding the declaration's
    pub value_constraint: Option<ValueConstraint>,
    /// Where the use was written
    pub pos: SourcePos,
}

impl AttributeUse {
    /// Value constraint in effect: the use's own, else the declaration's
    pub fn effective_constraint<'a>(&'a self, components: &'a Components) -> Option<&'a ValueConstraint> {
        self.value_constraint.as_ref().or_else(|| {
            self.decl
                .resolved()
                .and_then(|d| components[d].value_constraint.as_ref())
        })
    }
}

/// An `<attribute use="prohibited">` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prohibition {
    /// Name of the prohibited attribute
    pub name: QName,
    /// Where the prohibition was written
    pub pos: SourcePos,
}

/// Attribute-related content of a complex type or attribute group, as
/// written in the schema document
#[derive(Debug, Clone, Default)]
pub struct AttributeContainer {
    /// Directly declared uses
    pub uses: Vec<AttributeUseId>,
    /// `<attributeGroup ref="…">` references
    pub group_refs: Vec<(Ref<AttributeGroupId>, SourcePos)>,
    /// Prohibited attributes
    pub prohibitions: Vec<Prohibition>,
    /// Local `<anyAttribute>`
    pub wildcard: Option<WildcardId>,
}

/// A named attribute group definition
#[derive(Debug, Clone)]
pub struct AttributeGroupDef {
    /// {name}
    pub name: QName,
    /// Content as written
    pub content: AttributeContainer,
    /// {attribute uses} after inlining referenced groups
    pub attribute_uses: Vec<AttributeUseId>,
    /// {attribute wildcard} after intersecting referenced groups' wildcards
    pub wildcard: Option<WildcardId>,
    /// Expansion has been performed
    pub expanded: bool,
    /// Where the definition was written
    pub pos: SourcePos,
    /// Defining document
    pub bucket: Option<BucketId>,
    /// Replaced by a `<redefine>`
    pub redefined: bool,
}

impl AttributeGroupDef {
    /// Unexpanded group
    pub fn new(name: QName, content: AttributeContainer, pos: SourcePos) -> Self {
        Self {
            name,
            content,
            attribute_uses: Vec::new(),
            wildcard: None,
            expanded: false,
            pos,
            bucket: None,
            redefined: false,
        }
    }
}

/// Name of the attribute an attribute use stands for
pub fn use_name(components: &Components, use_id: AttributeUseId) -> Option<&QName> {
    match &components[use_id].decl {
        Ref::Resolved(d) => Some(&components[*d].name),
        Ref::Pending(name) | Ref::Missing(name) => Some(name),
    }
}

/// Find the use of a named attribute in a use list
pub fn find_use(components: &Components, uses: &[AttributeUseId], name: &QName) -> Option<AttributeUseId> {
    uses.iter()
        .copied()
        .find(|u| use_name(components, *u) == Some(name))
}
