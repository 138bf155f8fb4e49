//! Global XSD declarations management
//!
//! This module provides the maps of global components (types, elements,
//! attributes, groups, notations, identity constraints) keyed by expanded
//! name, and the notation declaration component.

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::namespaces::QName;

use super::base::{
    AttributeGroupId, AttributeId, BucketId, ElementId, GroupDefId, IdcId, NotationId, SourcePos, TypeId,
};

/// Type map - maps QNames to global types
pub type TypeMap = IndexMap<QName, TypeId>;
/// Notation map - maps QNames to notation declarations
pub type NotationMap = IndexMap<QName, NotationId>;
/// Attribute map - maps QNames to global attribute declarations
pub type AttributeMap = IndexMap<QName, AttributeId>;
/// Attribute group map - maps QNames to attribute group definitions
pub type AttributeGroupMap = IndexMap<QName, AttributeGroupId>;
/// Element map - maps QNames to global element declarations
pub type ElementMap = IndexMap<QName, ElementId>;
/// Group map - maps QNames to model group definitions
pub type GroupMap = IndexMap<QName, GroupDefId>;
/// Identity map - maps QNames to identity constraints
pub type IdentityMap = IndexMap<QName, IdcId>;

/// XSD Notation declaration
#[derive(Debug, Clone)]
pub struct Notation {
    /// Notation name
    pub name: QName,
    /// Public identifier
    pub public: Option<String>,
    /// System identifier
    pub system: Option<String>,
    /// Where the declaration was written
    pub pos: SourcePos,
    /// Defining document
    pub bucket: Option<BucketId>,
}

impl Notation {
    /// Create a new notation
    pub fn new(name: QName) -> Self {
        Self {
            name,
            public: None,
            system: None,
            pos: SourcePos::default(),
            bucket: None,
        }
    }

    /// Set the public identifier
    pub fn with_public(mut self, public: impl Into<String>) -> Self {
        self.public = Some(public.into());
        self
    }

    /// Set the system identifier
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Collection of global maps for XSD components
#[derive(Debug, Clone, Default)]
pub struct GlobalMaps {
    /// Global type definitions (simple and complex)
    pub types: TypeMap,
    /// Notation declarations
    pub notations: NotationMap,
    /// Global attribute declarations
    pub attributes: AttributeMap,
    /// Attribute group definitions
    pub attribute_groups: AttributeGroupMap,
    /// Global element declarations
    pub elements: ElementMap,
    /// Model group definitions
    pub groups: GroupMap,
    /// Identity constraints (symbol space shared by all elements)
    pub identities: IdentityMap,
}

/// Insert unless the name is taken; returns the component already
/// registered under that name
fn insert_unique<I: Copy + PartialEq>(map: &mut IndexMap<QName, I>, name: QName, id: I) -> Option<I> {
    match map.entry(name) {
        Entry::Occupied(e) if *e.get() != id => Some(*e.get()),
        Entry::Occupied(_) => None,
        Entry::Vacant(e) => {
            e.insert(id);
            None
        }
    }
}

impl GlobalMaps {
    /// Create empty global maps
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if all maps are empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of global components
    pub fn len(&self) -> usize {
        self.types.len()
            + self.notations.len()
            + self.attributes.len()
            + self.attribute_groups.len()
            + self.elements.len()
            + self.groups.len()
            + self.identities.len()
    }

    /// Register a type; returns the previous holder of the name
    pub fn add_type(&mut self, name: QName, id: TypeId) -> Option<TypeId> {
        insert_unique(&mut self.types, name, id)
    }

    /// Register an element
    pub fn add_element(&mut self, name: QName, id: ElementId) -> Option<ElementId> {
        insert_unique(&mut self.elements, name, id)
    }

    /// Register an attribute
    pub fn add_attribute(&mut self, name: QName, id: AttributeId) -> Option<AttributeId> {
        insert_unique(&mut self.attributes, name, id)
    }

    /// Register an attribute group
    pub fn add_attribute_group(&mut self, name: QName, id: AttributeGroupId) -> Option<AttributeGroupId> {
        insert_unique(&mut self.attribute_groups, name, id)
    }

    /// Register a model group definition
    pub fn add_group(&mut self, name: QName, id: GroupDefId) -> Option<GroupDefId> {
        insert_unique(&mut self.groups, name, id)
    }

    /// Register a notation
    pub fn add_notation(&mut self, name: QName, id: NotationId) -> Option<NotationId> {
        insert_unique(&mut self.notations, name, id)
    }

    /// Register an identity constraint
    pub fn add_identity(&mut self, name: QName, id: IdcId) -> Option<IdcId> {
        insert_unique(&mut self.identities, name, id)
    }

    /// Lookup a type by name
    pub fn lookup_type(&self, name: &QName) -> Option<TypeId> {
        self.types.get(name).copied()
    }

    /// Lookup an element by name
    pub fn lookup_element(&self, name: &QName) -> Option<ElementId> {
        self.elements.get(name).copied()
    }

    /// Lookup an attribute by name
    pub fn lookup_attribute(&self, name: &QName) -> Option<AttributeId> {
        self.attributes.get(name).copied()
    }

    /// Lookup an attribute group by name
    pub fn lookup_attribute_group(&self, name: &QName) -> Option<AttributeGroupId> {
        self.attribute_groups.get(name).copied()
    }

    /// Lookup a model group definition by name
    pub fn lookup_group(&self, name: &QName) -> Option<GroupDefId> {
        self.groups.get(name).copied()
    }

    /// Lookup a notation by name
    pub fn lookup_notation(&self, name: &QName) -> Option<NotationId> {
        self.notations.get(name).copied()
    }

    /// Lookup an identity constraint by name
    pub fn lookup_identity(&self, name: &QName) -> Option<IdcId> {
        self.identities.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notation_builder() {
        let n = Notation::new(QName::local("png")).with_public("image/png");
        assert_eq!(n.public.as_deref(), Some("image/png"));
        assert!(n.system.is_none());
    }

    #[test]
    fn test_duplicate_registration() {
        let mut maps = GlobalMaps::new();
        assert!(maps.is_empty());
        let name = QName::namespaced("urn:a", "T");
        assert_eq!(maps.add_type(name.clone(), TypeId(50)), None);
        // registering the same component twice is harmless
        assert_eq!(maps.add_type(name.clone(), TypeId(50)), None);
        assert_eq!(maps.add_type(name.clone(), TypeId(51)), Some(TypeId(50)));
        assert_eq!(maps.lookup_type(&name), Some(TypeId(50)));
        assert_eq!(maps.len(), 1);
    }

    #[test]
    fn test_symbol_spaces_are_separate() {
        let mut maps = GlobalMaps::new();
        let name = QName::local("x");
        assert_eq!(maps.add_type(name.clone(), TypeId(0)), None);
        assert_eq!(maps.add_element(name.clone(), ElementId(0)), None);
        assert_eq!(maps.add_attribute(name.clone(), AttributeId(0)), None);
        assert_eq!(maps.lookup_element(&name), Some(ElementId(0)));
        assert_eq!(maps.lookup_group(&name), None);
    }
}
