//! Component model foundation
//!
//! Schema components live in one arena ([`Components`]) and refer to each
//! other through typed integer handles. A reference written in a schema
//! document (`type="…"`, `ref="…"`, `base="…"`) starts life as a
//! [`Ref::Pending`] QName and is replaced by [`Ref::Resolved`] during fixup,
//! or by [`Ref::Missing`] when no such component exists.

use crate::namespaces::QName;
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

use super::attributes::{AttributeDecl, AttributeGroupDef, AttributeUse};
use super::builtins::BuiltinType;
use super::complex_types::ComplexTypeDef;
use super::elements::ElementDecl;
use super::globals::Notation;
use super::groups::{ModelGroup, ModelGroupDef};
use super::identities::IdentityConstraint;
use super::particles::Particle;
use super::simple_types::{SimpleTypeDef, Variety};
use super::wildcards::Wildcard;

macro_rules! component_id {
    ($($name:ident => $doc:literal),* $(,)?) => {
        $(
            #[doc = $doc]
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub(crate) u32);

            impl $name {
                /// Position in the arena
                pub fn index(self) -> usize {
                    self.0 as usize
                }
            }
        )*
    };
}

component_id! {
    TypeId => "Handle of a simple or complex type definition",
    ElementId => "Handle of an element declaration",
    AttributeId => "Handle of an attribute declaration",
    AttributeUseId => "Handle of an attribute use",
    AttributeGroupId => "Handle of an attribute group definition",
    GroupDefId => "Handle of a named model group definition",
    ModelGroupId => "Handle of a model group (sequence, choice, all)",
    ParticleId => "Handle of a particle",
    WildcardId => "Handle of an element or attribute wildcard",
    IdcId => "Handle of an identity-constraint definition",
    NotationId => "Handle of a notation declaration",
    BucketId => "Handle of a schema document bucket",
}

impl TypeId {
    /// Handle of a built-in type; built-ins occupy the first arena slots
    /// in [`BuiltinType::ALL`] order
    pub fn builtin(builtin: BuiltinType) -> TypeId {
        TypeId(builtin as u32)
    }
}

/// Where a component was written
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePos {
    /// Schema document location
    pub file: Option<Arc<str>>,
    /// 1-based line, 0 if unknown
    pub line: u32,
    /// 1-based column, 0 if unknown
    pub column: u32,
}

impl SourcePos {
    /// Position inside a document
    pub fn new(file: Option<Arc<str>>, line: u32, column: u32) -> Self {
        Self { file, line, column }
    }
}

/// A reference to a global component by QName
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ref<I> {
    /// Parsed but not yet looked up
    Pending(QName),
    /// Points at a component
    Resolved(I),
    /// Lookup failed; the error has been reported
    Missing(QName),
}

impl<I: Copy> Ref<I> {
    /// The target, if resolved
    pub fn resolved(&self) -> Option<I> {
        match self {
            Ref::Resolved(id) => Some(*id),
            _ => None,
        }
    }

    /// The referenced name, unless the reference was created resolved
    pub fn name(&self) -> Option<&QName> {
        match self {
            Ref::Pending(name) | Ref::Missing(name) => Some(name),
            Ref::Resolved(_) => None,
        }
    }

    /// Whether lookup has not happened yet
    pub fn is_pending(&self) -> bool {
        matches!(self, Ref::Pending(_))
    }
}

/// Any component handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ComponentRef {
    Type(TypeId),
    Element(ElementId),
    Attribute(AttributeId),
    AttributeUse(AttributeUseId),
    AttributeGroup(AttributeGroupId),
    GroupDef(GroupDefId),
    ModelGroup(ModelGroupId),
    Particle(ParticleId),
    Wildcard(WildcardId),
    Idc(IdcId),
    Notation(NotationId),
}

/// Derivation method of a type definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DerivationMethod {
    /// `<restriction>`
    Restriction,
    /// `<extension>`
    Extension,
    /// `<list>`
    List,
    /// `<union>`
    Union,
}

impl fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DerivationMethod::Restriction => "restriction",
            DerivationMethod::Extension => "extension",
            DerivationMethod::List => "list",
            DerivationMethod::Union => "union",
        })
    }
}

/// Set of derivation methods, as written in `block`, `final`,
/// `blockDefault` and `finalDefault`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DerivationSet {
    /// Extension derivation
    pub extension: bool,
    /// Restriction derivation
    pub restriction: bool,
    /// Substitution (element `block` only)
    pub substitution: bool,
    /// List derivation (simple types)
    pub list: bool,
    /// Union derivation (simple types)
    pub union: bool,
}

impl DerivationSet {
    /// Empty set
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create with all flags set
    pub fn all() -> Self {
        Self {
            extension: true,
            restriction: true,
            substitution: true,
            list: true,
            union: true,
        }
    }

    /// Keep only the flags present in `allowed`
    pub fn masked(self, allowed: DerivationSet) -> Self {
        Self {
            extension: self.extension && allowed.extension,
            restriction: self.restriction && allowed.restriction,
            substitution: self.substitution && allowed.substitution,
            list: self.list && allowed.list,
            union: self.union && allowed.union,
        }
    }

    /// Parse an attribute value; tokens outside `allowed` are an error
    pub fn parse(value: &str, allowed: DerivationSet) -> Result<Self, String> {
        let value = value.trim();
        if value == "#all" {
            return Ok(allowed);
        }

        let mut result = Self::default();
        for token in value.split_whitespace() {
            let (flag, ok) = match token {
                "extension" => (&mut result.extension, allowed.extension),
                "restriction" => (&mut result.restriction, allowed.restriction),
                "substitution" => (&mut result.substitution, allowed.substitution),
                "list" => (&mut result.list, allowed.list),
                "union" => (&mut result.union, allowed.union),
                _ => return Err(format!("unknown derivation method '{}'", token)),
            };
            if !ok {
                return Err(format!("'{}' is not allowed here", token));
            }
            *flag = true;
        }
        Ok(result)
    }

    /// Set containing a single method
    pub fn of(method: DerivationMethod) -> Self {
        let mut set = Self::default();
        set.insert(method);
        set
    }

    /// Add a method
    pub fn insert(&mut self, method: DerivationMethod) {
        match method {
            DerivationMethod::Restriction => self.restriction = true,
            DerivationMethod::Extension => self.extension = true,
            DerivationMethod::List => self.list = true,
            DerivationMethod::Union => self.union = true,
        }
    }

    /// Whether a method is in the set
    pub fn contains(&self, method: DerivationMethod) -> bool {
        match method {
            DerivationMethod::Restriction => self.restriction,
            DerivationMethod::Extension => self.extension,
            DerivationMethod::List => self.list,
            DerivationMethod::Union => self.union,
        }
    }

    /// Union of two sets
    pub fn union_with(self, other: DerivationSet) -> Self {
        Self {
            extension: self.extension || other.extension,
            restriction: self.restriction || other.restriction,
            substitution: self.substitution || other.substitution,
            list: self.list || other.list,
            union: self.union || other.union,
        }
    }

    /// Whether the derivation methods of two sets overlap
    pub fn intersects(&self, other: &DerivationSet) -> bool {
        (self.extension && other.extension)
            || (self.restriction && other.restriction)
            || (self.list && other.list)
            || (self.union && other.union)
    }

    /// Whether no flag is set
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Element/attribute form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Form {
    /// Local names take the target namespace
    Qualified,
    /// Local names are in no namespace
    #[default]
    Unqualified,
}

impl Form {
    /// Parse `qualified` / `unqualified`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "qualified" => Some(Form::Qualified),
            "unqualified" => Some(Form::Unqualified),
            _ => None,
        }
    }
}

/// Simple or complex body of a type definition
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Simple type definition
    Simple(SimpleTypeDef),
    /// Complex type definition
    Complex(ComplexTypeDef),
}

/// A type definition
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// Name, `None` for anonymous types
    pub name: Option<QName>,
    /// Target namespace of the defining document
    pub target_namespace: Option<String>,
    /// Top-level definition
    pub global: bool,
    /// Built-in type this definition stands for
    pub builtin: Option<BuiltinType>,
    /// {base type definition}
    pub base: Option<Ref<TypeId>>,
    /// {derivation method}
    pub derivation: DerivationMethod,
    /// {final}
    pub final_: DerivationSet,
    /// {prohibited substitutions} (complex types)
    pub block: DerivationSet,
    /// {abstract} (complex types)
    pub is_abstract: bool,
    /// Simple or complex body
    pub kind: TypeKind,
    /// Source location
    pub pos: SourcePos,
    /// Defining document
    pub bucket: Option<BucketId>,
    /// Marked by a component constraint violation
    pub invalid: bool,
    /// Replaced by a `<redefine>` (no longer registered by name)
    pub redefined: bool,
}

impl TypeDef {
    /// Whether this is a simple type definition
    pub fn is_simple(&self) -> bool {
        matches!(self.kind, TypeKind::Simple(_))
    }

    /// Whether this is a complex type definition
    pub fn is_complex(&self) -> bool {
        matches!(self.kind, TypeKind::Complex(_))
    }

    /// Simple body
    pub fn simple(&self) -> Option<&SimpleTypeDef> {
        match &self.kind {
            TypeKind::Simple(s) => Some(s),
            TypeKind::Complex(_) => None,
        }
    }

    /// Mutable simple body
    pub fn simple_mut(&mut self) -> Option<&mut SimpleTypeDef> {
        match &mut self.kind {
            TypeKind::Simple(s) => Some(s),
            TypeKind::Complex(_) => None,
        }
    }

    /// Complex body
    pub fn complex(&self) -> Option<&ComplexTypeDef> {
        match &self.kind {
            TypeKind::Complex(c) => Some(c),
            TypeKind::Simple(_) => None,
        }
    }

    /// Mutable complex body
    pub fn complex_mut(&mut self) -> Option<&mut ComplexTypeDef> {
        match &mut self.kind {
            TypeKind::Complex(c) => Some(c),
            TypeKind::Simple(_) => None,
        }
    }

    /// Resolved base type
    pub fn base_id(&self) -> Option<TypeId> {
        self.base.as_ref().and_then(|b| b.resolved())
    }

    /// Name for diagnostics
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) => name.to_string(),
            None => "(anonymous)".to_string(),
        }
    }
}

/// Arena of every component of one schema
#[derive(Debug, Clone, Default)]
#[allow(missing_docs)]
pub struct Components {
    pub types: Vec<TypeDef>,
    pub elements: Vec<ElementDecl>,
    pub attributes: Vec<AttributeDecl>,
    pub attribute_uses: Vec<AttributeUse>,
    pub attribute_groups: Vec<AttributeGroupDef>,
    pub group_defs: Vec<ModelGroupDef>,
    pub model_groups: Vec<ModelGroup>,
    pub particles: Vec<Particle>,
    pub wildcards: Vec<Wildcard>,
    pub idcs: Vec<IdentityConstraint>,
    pub notations: Vec<Notation>,
}

macro_rules! arena_access {
    ($($id:ident => $field:ident : $ty:ty, $add:ident);* $(;)?) => {
        impl Components {
            $(
                /// Allocate a component and return its handle
                pub fn $add(&mut self, item: $ty) -> $id {
                    let id = $id(self.$field.len() as u32);
                    self.$field.push(item);
                    id
                }
            )*

            /// Total number of components
            pub fn len(&self) -> usize {
                0 $(+ self.$field.len())*
            }

            /// Whether the arena is empty
            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }
        }

        $(
            impl Index<$id> for Components {
                type Output = $ty;
                fn index(&self, id: $id) -> &$ty {
                    &self.$field[id.index()]
                }
            }

            impl IndexMut<$id> for Components {
                fn index_mut(&mut self, id: $id) -> &mut $ty {
                    &mut self.$field[id.index()]
                }
            }
        )*
    };
}

arena_access! {
    TypeId => types: TypeDef, add_type;
    ElementId => elements: ElementDecl, add_element;
    AttributeId => attributes: AttributeDecl, add_attribute;
    AttributeUseId => attribute_uses: AttributeUse, add_attribute_use;
    AttributeGroupId => attribute_groups: AttributeGroupDef, add_attribute_group;
    GroupDefId => group_defs: ModelGroupDef, add_group_def;
    ModelGroupId => model_groups: ModelGroup, add_model_group;
    ParticleId => particles: Particle, add_particle;
    WildcardId => wildcards: Wildcard, add_wildcard;
    IdcId => idcs: IdentityConstraint, add_idc;
    NotationId => notations: Notation, add_notation;
}

impl Components {
    /// Iterate type handles
    pub fn type_ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len() as u32).map(TypeId)
    }

    /// Iterate element handles
    pub fn element_ids(&self) -> impl Iterator<Item = ElementId> {
        (0..self.elements.len() as u32).map(ElementId)
    }

    /// Iterate attribute declaration handles
    pub fn attribute_ids(&self) -> impl Iterator<Item = AttributeId> {
        (0..self.attributes.len() as u32).map(AttributeId)
    }

    /// Iterate attribute use handles
    pub fn attribute_use_ids(&self) -> impl Iterator<Item = AttributeUseId> {
        (0..self.attribute_uses.len() as u32).map(AttributeUseId)
    }

    /// Iterate attribute group handles
    pub fn attribute_group_ids(&self) -> impl Iterator<Item = AttributeGroupId> {
        (0..self.attribute_groups.len() as u32).map(AttributeGroupId)
    }

    /// Iterate model group definition handles
    pub fn group_def_ids(&self) -> impl Iterator<Item = GroupDefId> {
        (0..self.group_defs.len() as u32).map(GroupDefId)
    }

    /// Iterate particle handles
    pub fn particle_ids(&self) -> impl Iterator<Item = ParticleId> {
        (0..self.particles.len() as u32).map(ParticleId)
    }

    /// Iterate identity-constraint handles
    pub fn idc_ids(&self) -> impl Iterator<Item = IdcId> {
        (0..self.idcs.len() as u32).map(IdcId)
    }

    /// Derivation methods used on the way from `derived` up to `base`, and
    /// the {prohibited substitutions} of the types met on the way (`base`
    /// included, `derived` excluded). `None` when `base` is not an ancestor.
    pub fn derivation_from(&self, derived: TypeId, base: TypeId) -> Option<(DerivationSet, DerivationSet)> {
        let mut methods = DerivationSet::empty();
        let mut prohibited = DerivationSet::empty();
        for t in self.base_chain(derived) {
            if t != derived {
                prohibited = prohibited.union_with(self[t].block);
            }
            if t == base {
                return Some((methods, prohibited));
            }
            methods.insert(match self[t].derivation {
                DerivationMethod::Extension => DerivationMethod::Extension,
                _ => DerivationMethod::Restriction,
            });
        }
        None
    }

    /// Whether `derived` may stand in for `base` at instance level: no method
    /// in `blocked` and none prohibited by the {prohibited substitutions} of
    /// the types on the way. A union's members count as derived from it.
    pub fn is_derived_from(&self, derived: TypeId, base: TypeId, blocked: DerivationSet) -> bool {
        self.derived_within(derived, base, blocked, true, 0)
    }

    /// Whether `derived` is validly derived from `base` without using a
    /// method in `excluded`. {prohibited substitutions} are not consulted;
    /// they only govern substitution in instances.
    pub fn is_validly_derived(&self, derived: TypeId, base: TypeId, excluded: DerivationSet) -> bool {
        self.derived_within(derived, base, excluded, false, 0)
    }

    fn derived_within(
        &self,
        derived: TypeId,
        base: TypeId,
        blocked: DerivationSet,
        honor_block: bool,
        depth: usize,
    ) -> bool {
        if derived == base {
            return true;
        }
        if depth > self.types.len() {
            return false;
        }
        if let Some((methods, prohibited)) = self.derivation_from(derived, base) {
            let blocked = if honor_block { blocked.union_with(prohibited) } else { blocked };
            return !methods.intersects(&blocked);
        }
        match self[base].simple() {
            Some(st) if st.variety == Variety::Union => st
                .member_types
                .iter()
                .filter_map(|m| m.resolved())
                .any(|m| m != base && self.derived_within(derived, m, blocked, honor_block, depth + 1)),
            _ => false,
        }
    }

    /// Walk the base chain of a type, starting with the type itself
    pub fn base_chain(&self, start: TypeId) -> BaseChain<'_> {
        BaseChain {
            components: self,
            next: Some(start),
            steps: 0,
        }
    }
}

/// Iterator over a type's base chain; stops at cycles longer than the arena
pub struct BaseChain<'a> {
    components: &'a Components,
    next: Option<TypeId>,
    steps: usize,
}

impl Iterator for BaseChain<'_> {
    type Item = TypeId;

    fn next(&mut self) -> Option<TypeId> {
        let current = self.next?;
        self.steps += 1;
        if self.steps > self.components.types.len() {
            return None;
        }
        let ty = &self.components[current];
        // anyType is its own base
        self.next = ty.base_id().filter(|b| *b != current);
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_set_parse() {
        let allowed = DerivationSet {
            extension: true,
            restriction: true,
            ..DerivationSet::default()
        };
        let set = DerivationSet::parse("extension", allowed).unwrap();
        assert!(set.extension && !set.restriction);

        let all = DerivationSet::parse("#all", allowed).unwrap();
        assert_eq!(all, allowed);

        assert!(DerivationSet::parse("list", allowed).is_err());
        assert!(DerivationSet::parse("bogus", allowed).is_err());
        assert!(DerivationSet::parse("", allowed).unwrap().is_empty());
    }

    #[test]
    fn test_derivation_set_algebra() {
        let ext = DerivationSet::of(DerivationMethod::Extension);
        let res = DerivationSet::of(DerivationMethod::Restriction);
        assert!(!ext.intersects(&res));
        let both = ext.union_with(res);
        assert!(both.intersects(&ext));
        assert!(both.contains(DerivationMethod::Restriction));
        assert!(!both.contains(DerivationMethod::List));
        let masked = DerivationSet::all().masked(ext);
        assert_eq!(masked, ext);
    }

    #[test]
    fn test_ref_accessors() {
        let pending: Ref<TypeId> = Ref::Pending(QName::local("t"));
        assert!(pending.is_pending());
        assert_eq!(pending.resolved(), None);
        assert_eq!(pending.name(), Some(&QName::local("t")));
        let resolved = Ref::Resolved(TypeId(3));
        assert_eq!(resolved.resolved(), Some(TypeId(3)));
        assert_eq!(resolved.name(), None);
    }

    #[test]
    fn test_builtin_ids_follow_declaration_order() {
        for (i, b) in BuiltinType::ALL.iter().enumerate() {
            assert_eq!(TypeId::builtin(*b).index(), i);
        }
    }

    #[test]
    fn test_form_parse() {
        assert_eq!(Form::parse("qualified"), Some(Form::Qualified));
        assert_eq!(Form::parse(" unqualified "), Some(Form::Unqualified));
        assert_eq!(Form::parse("other"), None);
    }
}
