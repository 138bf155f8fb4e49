//! XSD Element declarations
//!
//! This module implements element declarations for XSD schemas.
//! Elements are the primary building blocks of XML documents.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cElement_Declarations

use crate::namespaces::QName;

use super::attributes::ValueConstraint;
use super::base::{BucketId, Components, DerivationSet, ElementId, IdcId, Ref, SourcePos, TypeId};

/// The scope of an element declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ElementScope {
    /// Global element declaration
    #[default]
    Global,
    /// Local element declaration (within a complex type or group)
    Local,
}

impl std::fmt::Display for ElementScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Local => write!(f, "local"),
        }
    }
}

/// XSD Element declaration
#[derive(Debug, Clone)]
pub struct ElementDecl {
    /// Element name (with its target namespace)
    pub name: QName,

    /// Element scope (global or local)
    pub scope: ElementScope,

    /// {type definition}. `None` until fixup when no `type` attribute and
    /// no anonymous type were given: the type then comes from the
    /// substitution group head, or is anyType.
    pub type_def: Option<Ref<TypeId>>,

    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,

    /// Whether this element is nillable
    pub nillable: bool,

    /// Whether this element is abstract
    pub is_abstract: bool,

    /// {disallowed substitutions}
    pub block: DerivationSet,

    /// {substitution group exclusions}
    pub final_: DerivationSet,

    /// {substitution group affiliation}
    pub substitution_head: Option<Ref<ElementId>>,

    /// Elements that may substitute for this one (transitively), computed
    /// during fixup; blocked and abstract members are left out
    pub substitution_members: Vec<ElementId>,

    /// {identity-constraint definitions}
    pub idcs: Vec<IdcId>,

    /// Where the declaration was written
    pub pos: SourcePos,

    /// Defining document
    pub bucket: Option<BucketId>,

    /// Marked by a component constraint violation
    pub invalid: bool,
}

impl ElementDecl {
    /// Create a declaration with no type yet
    pub fn new(name: QName, scope: ElementScope, pos: SourcePos) -> Self {
        Self {
            name,
            scope,
            type_def: None,
            value_constraint: None,
            nillable: false,
            is_abstract: false,
            block: DerivationSet::empty(),
            final_: DerivationSet::empty(),
            substitution_head: None,
            substitution_members: Vec::new(),
            idcs: Vec::new(),
            pos,
            bucket: None,
            invalid: false,
        }
    }

    /// Whether this is a top-level declaration
    pub fn is_global(&self) -> bool {
        self.scope == ElementScope::Global
    }

    /// Resolved type definition
    pub fn type_id(&self) -> Option<TypeId> {
        self.type_def.as_ref().and_then(|t| t.resolved())
    }

    /// Resolved substitution group head
    pub fn head_id(&self) -> Option<ElementId> {
        self.substitution_head.as_ref().and_then(|h| h.resolved())
    }
}

/// Iterate the substitution group heads above an element, nearest first.
/// Stops on cycles.
pub fn head_chain(components: &Components, start: ElementId) -> Vec<ElementId> {
    let mut chain = Vec::new();
    let mut current = components[start].head_id();
    while let Some(head) = current {
        if head == start || chain.contains(&head) {
            break;
        }
        chain.push(head);
        current = components[head].head_id();
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decl(c: &mut Components, name: &str) -> ElementId {
        c.add_element(ElementDecl::new(
            QName::local(name),
            ElementScope::Global,
            SourcePos::default(),
        ))
    }

    #[test]
    fn test_new_element_defaults() {
        let e = ElementDecl::new(QName::local("a"), ElementScope::Local, SourcePos::default());
        assert!(!e.is_global());
        assert!(!e.nillable);
        assert_eq!(e.type_id(), None);
        assert_eq!(ElementScope::Local.to_string(), "local");
    }

    #[test]
    fn test_head_chain() {
        let mut c = Components::default();
        let a = decl(&mut c, "a");
        let b = decl(&mut c, "b");
        let d = decl(&mut c, "d");
        c[b].substitution_head = Some(Ref::Resolved(a));
        c[d].substitution_head = Some(Ref::Resolved(b));
        assert_eq!(head_chain(&c, d), vec![b, a]);
        assert!(head_chain(&c, a).is_empty());
    }

    #[test]
    fn test_head_chain_stops_on_cycle() {
        let mut c = Components::default();
        let a = decl(&mut c, "a");
        let b = decl(&mut c, "b");
        c[a].substitution_head = Some(Ref::Resolved(b));
        c[b].substitution_head = Some(Ref::Resolved(a));
        assert_eq!(head_chain(&c, a), vec![b]);
    }
}
