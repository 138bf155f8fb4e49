//! XSD Identity Constraints
//!
//! This module implements identity-constraint definitions for XML Schema:
//! - xs:unique - Ensures values are unique within scope
//! - xs:key - Like unique, but all field values must be present
//! - xs:keyref - References a key/unique constraint (foreign key)
//!
//! The runtime bookkeeping (matchers, key sequences, node tables) lives in
//! [`super::idc`].

use std::fmt;
use std::sync::Arc;

use crate::namespaces::QName;
use crate::xpath::IdcPath;

use super::base::{BucketId, ElementId, IdcId, Ref, SourcePos};

/// Kind of identity constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdcKind {
    /// xs:unique
    Unique,
    /// xs:key
    Key,
    /// xs:keyref
    Keyref,
}

impl IdcKind {
    /// Parse from element local name
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "unique" => Some(Self::Unique),
            "key" => Some(Self::Key),
            "keyref" => Some(Self::Keyref),
            _ => None,
        }
    }
}

impl fmt::Display for IdcKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::Key => write!(f, "key"),
            Self::Keyref => write!(f, "keyref"),
        }
    }
}

/// An identity-constraint definition
#[derive(Debug, Clone)]
pub struct IdentityConstraint {
    /// {name}
    pub name: QName,
    /// {identity-constraint category}
    pub kind: IdcKind,
    /// {selector}
    pub selector: Arc<IdcPath>,
    /// {fields}
    pub fields: Vec<Arc<IdcPath>>,
    /// {referenced key} (keyref only)
    pub refer: Option<Ref<IdcId>>,
    /// Declaration owning this constraint
    pub element: Option<ElementId>,
    /// Where the constraint was written
    pub pos: SourcePos,
    /// Defining document
    pub bucket: Option<BucketId>,
}

impl IdentityConstraint {
    /// Resolved referenced key or unique constraint
    pub fn refer_id(&self) -> Option<IdcId> {
        self.refer.as_ref().and_then(|r| r.resolved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idc_kind_from_tag() {
        assert_eq!(IdcKind::from_tag("key"), Some(IdcKind::Key));
        assert_eq!(IdcKind::from_tag("keyref"), Some(IdcKind::Keyref));
        assert_eq!(IdcKind::from_tag("selector"), None);
        assert_eq!(IdcKind::Unique.to_string(), "unique");
    }
}
