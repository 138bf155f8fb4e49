//! XSD Wildcard components
//!
//! This module implements wildcards for XSD element and attribute content:
//! - xs:any - allows any element from specified namespaces
//! - xs:anyAttribute - allows any attribute from specified namespaces
//!
//! The namespace constraint algebra (union, intersection, subset) follows
//! the XML Schema 1.0 rules cos-aw-union, cos-aw-intersect and
//! cos-ns-subset.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Wildcards

use crate::error::ParseError;
use std::collections::BTreeSet;
use std::fmt;

use super::base::SourcePos;

/// Process contents mode for wildcards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProcessContents {
    /// Validate strictly - element/attribute must be declared
    #[default]
    Strict,
    /// Validate if declaration found, otherwise accept
    Lax,
    /// Skip validation entirely
    Skip,
}

impl ProcessContents {
    /// Parse from string value
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "strict" => Some(Self::Strict),
            "lax" => Some(Self::Lax),
            "skip" => Some(Self::Skip),
            _ => None,
        }
    }

    /// Check if this is a valid restriction of another process contents
    pub fn is_restriction_of(&self, other: &Self) -> bool {
        match (self, other) {
            (a, b) if a == b => true,
            // strict restricts everything
            (Self::Strict, _) => true,
            (Self::Lax, Self::Skip) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ProcessContents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lax => write!(f, "lax"),
            Self::Skip => write!(f, "skip"),
        }
    }
}

/// Namespace constraint of a wildcard.
///
/// `None` inside a set or negation stands for "absent" (no namespace).
/// A negation never admits absent names.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NamespaceConstraint {
    /// ##any
    #[default]
    Any,
    /// A finite set of namespace names
    Set(BTreeSet<Option<String>>),
    /// Not this namespace (and not absent)
    Not(Option<String>),
}

impl NamespaceConstraint {
    /// Create from the `namespace` attribute of `<any>` / `<anyAttribute>`
    pub fn from_namespace_attr(
        value: &str,
        target_namespace: Option<&str>,
    ) -> Result<Self, ParseError> {
        let value = value.trim();

        match value {
            "##any" => Ok(Self::Any),
            "##other" => Ok(Self::Not(target_namespace.map(String::from))),
            _ => {
                let mut namespaces = BTreeSet::new();
                for ns in value.split_whitespace() {
                    match ns {
                        "##local" => {
                            namespaces.insert(None);
                        }
                        "##targetNamespace" => {
                            namespaces.insert(target_namespace.map(String::from));
                        }
                        s if s.starts_with("##") => {
                            return Err(ParseError::new(format!(
                                "wrong value '{}' in 'namespace' attribute",
                                s
                            )));
                        }
                        uri => {
                            namespaces.insert(Some(uri.to_string()));
                        }
                    }
                }
                Ok(Self::Set(namespaces))
            }
        }
    }

    /// Whether a namespace name satisfies the constraint
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Set(set) => set.contains(&namespace.map(String::from)),
            Self::Not(excluded) => namespace.is_some() && namespace != excluded.as_deref(),
        }
    }

    /// Union of two constraints, `None` when not expressible
    pub fn union(&self, other: &Self) -> Option<Self> {
        use NamespaceConstraint::*;
        if self == other {
            return Some(self.clone());
        }
        match (self, other) {
            (Any, _) | (_, Any) => Some(Any),
            (Set(a), Set(b)) => Some(Set(a.union(b).cloned().collect())),
            // two different negations
            (Not(_), Not(_)) => Some(Not(None)),
            (Not(excluded), Set(set)) | (Set(set), Not(excluded)) => {
                let has_absent = set.contains(&None);
                match excluded {
                    Some(_) => {
                        let has_excluded = set.contains(excluded);
                        match (has_excluded, has_absent) {
                            (true, true) => Some(Any),
                            (true, false) => Some(Not(None)),
                            (false, true) => None,
                            (false, false) => Some(Not(excluded.clone())),
                        }
                    }
                    None if has_absent => Some(Any),
                    None => Some(Not(None)),
                }
            }
        }
    }

    /// Intersection of two constraints, `None` when not expressible
    pub fn intersection(&self, other: &Self) -> Option<Self> {
        use NamespaceConstraint::*;
        if self == other {
            return Some(self.clone());
        }
        match (self, other) {
            (Any, x) | (x, Any) => Some(x.clone()),
            (Not(excluded), Set(set)) | (Set(set), Not(excluded)) => Some(Set(
                set.iter()
                    .filter(|ns| ns.is_some() && *ns != excluded)
                    .cloned()
                    .collect(),
            )),
            (Set(a), Set(b)) => Some(Set(a.intersection(b).cloned().collect())),
            (Not(a), Not(b)) => match (a, b) {
                (None, x) | (x, None) => Some(Not(x.clone())),
                _ => None,
            },
        }
    }

    /// Whether every namespace allowed by `self` is allowed by `other`
    pub fn is_subset(&self, other: &Self) -> bool {
        use NamespaceConstraint::*;
        match (self, other) {
            (_, Any) => true,
            (Any, _) => false,
            (Not(a), Not(b)) => a == b || b.is_none(),
            (Not(_), Set(_)) => false,
            (Set(set), Not(excluded)) => set.iter().all(|ns| ns.is_some() && ns != excluded),
            (Set(a), Set(b)) => a.is_subset(b),
        }
    }

    /// Whether no namespace at all is allowed
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Set(set) if set.is_empty())
    }
}

impl fmt::Display for NamespaceConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "##any"),
            Self::Not(Some(ns)) => write!(f, "not '{}'", ns),
            Self::Not(None) => write!(f, "not absent"),
            Self::Set(set) => {
                let names: Vec<String> = set
                    .iter()
                    .map(|ns| match ns {
                        Some(ns) => ns.clone(),
                        None => "##local".to_string(),
                    })
                    .collect();
                write!(f, "{}", names.join(" "))
            }
        }
    }
}

/// A wildcard component
#[derive(Debug, Clone, Default)]
pub struct Wildcard {
    /// {namespace constraint}
    pub namespaces: NamespaceConstraint,
    /// {process contents}
    pub process_contents: ProcessContents,
    /// Where the wildcard was written
    pub pos: SourcePos,
}

impl Wildcard {
    /// Wildcard with the given constraint
    pub fn new(namespaces: NamespaceConstraint, process_contents: ProcessContents) -> Self {
        Self {
            namespaces,
            process_contents,
            pos: SourcePos::default(),
        }
    }

    /// Whether a name in `namespace` matches
    pub fn allows(&self, namespace: Option<&str>) -> bool {
        self.namespaces.allows(namespace)
    }

    /// Wildcard subset: namespaces are a subset and processing is not weaker
    pub fn is_restriction_of(&self, base: &Wildcard) -> bool {
        self.namespaces.is_subset(&base.namespaces)
            && self.process_contents.is_restriction_of(&base.process_contents)
    }

    /// Attribute wildcard union; keeps this wildcard's processContents
    pub fn union(&self, other: &Wildcard) -> Option<Wildcard> {
        Some(Wildcard {
            namespaces: self.namespaces.union(&other.namespaces)?,
            process_contents: self.process_contents,
            pos: self.pos.clone(),
        })
    }

    /// Attribute wildcard intersection; keeps this wildcard's processContents
    pub fn intersection(&self, other: &Wildcard) -> Option<Wildcard> {
        Some(Wildcard {
            namespaces: self.namespaces.intersection(&other.namespaces)?,
            process_contents: self.process_contents,
            pos: self.pos.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn set(items: &[Option<&str>]) -> NamespaceConstraint {
        NamespaceConstraint::Set(items.iter().map(|s| s.map(String::from)).collect())
    }

    fn not(ns: Option<&str>) -> NamespaceConstraint {
        NamespaceConstraint::Not(ns.map(String::from))
    }

    #[test]
    fn test_process_contents() {
        assert_eq!(ProcessContents::from_str("lax"), Some(ProcessContents::Lax));
        assert!(ProcessContents::Strict.is_restriction_of(&ProcessContents::Skip));
        assert!(!ProcessContents::Skip.is_restriction_of(&ProcessContents::Lax));
    }

    #[test]
    fn test_namespace_attr() {
        let tns = Some("urn:t");
        assert_eq!(
            NamespaceConstraint::from_namespace_attr("##any", tns).unwrap(),
            NamespaceConstraint::Any
        );
        assert_eq!(
            NamespaceConstraint::from_namespace_attr("##other", tns).unwrap(),
            not(Some("urn:t"))
        );
        assert_eq!(
            NamespaceConstraint::from_namespace_attr("##local ##targetNamespace urn:x", tns)
                .unwrap(),
            set(&[None, Some("urn:t"), Some("urn:x")])
        );
        assert!(NamespaceConstraint::from_namespace_attr("##bogus", tns).is_err());
    }

    #[test]
    fn test_allows() {
        let other = not(Some("urn:t"));
        assert!(other.allows(Some("urn:x")));
        assert!(!other.allows(Some("urn:t")));
        assert!(!other.allows(None));
        assert!(set(&[None]).allows(None));
        assert!(!set(&[None]).allows(Some("urn:x")));
    }

    #[test]
    fn test_union_rules() {
        let a = not(Some("urn:a"));
        assert_eq!(a.union(&set(&[Some("urn:a"), None])), Some(NamespaceConstraint::Any));
        assert_eq!(a.union(&set(&[Some("urn:a")])), Some(not(None)));
        assert_eq!(a.union(&set(&[None])), None);
        assert_eq!(a.union(&set(&[Some("urn:b")])), Some(a.clone()));
        assert_eq!(a.union(&not(Some("urn:b"))), Some(not(None)));
        assert_eq!(not(None).union(&set(&[None])), Some(NamespaceConstraint::Any));
    }

    #[test]
    fn test_intersection_rules() {
        let a = not(Some("urn:a"));
        assert_eq!(
            a.intersection(&set(&[Some("urn:a"), Some("urn:b"), None])),
            Some(set(&[Some("urn:b")]))
        );
        assert_eq!(a.intersection(&not(None)), Some(a.clone()));
        assert_eq!(a.intersection(&not(Some("urn:b"))), None);
        assert_eq!(
            set(&[Some("urn:a")]).intersection(&set(&[Some("urn:b")])),
            Some(set(&[]))
        );
        assert!(set(&[]).is_empty());
    }

    #[test]
    fn test_subset() {
        assert!(set(&[Some("urn:a")]).is_subset(&NamespaceConstraint::Any));
        assert!(set(&[Some("urn:b")]).is_subset(&not(Some("urn:a"))));
        assert!(!set(&[None]).is_subset(&not(Some("urn:a"))));
        assert!(!NamespaceConstraint::Any.is_subset(&not(None)));
        assert!(not(Some("urn:a")).is_subset(&not(None)));

        let base = Wildcard::new(NamespaceConstraint::Any, ProcessContents::Lax);
        let derived = Wildcard::new(set(&[Some("urn:a")]), ProcessContents::Strict);
        assert!(derived.is_restriction_of(&base));
        assert!(!base.is_restriction_of(&derived));
        let weaker = Wildcard::new(set(&[Some("urn:a")]), ProcessContents::Skip);
        assert!(!weaker.is_restriction_of(&base));
    }

    fn namespace() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("urn:a".to_string())),
            Just(Some("urn:b".to_string())),
            Just(Some("urn:c".to_string())),
        ]
    }

    fn constraint() -> impl Strategy<Value = NamespaceConstraint> {
        prop_oneof![
            Just(NamespaceConstraint::Any),
            proptest::collection::btree_set(namespace(), 0..4).prop_map(NamespaceConstraint::Set),
            namespace().prop_map(NamespaceConstraint::Not),
        ]
    }

    proptest! {
        #[test]
        fn prop_any_is_identity_for_intersection(x in constraint()) {
            prop_assert_eq!(NamespaceConstraint::Any.intersection(&x), Some(x.clone()));
            prop_assert_eq!(x.intersection(&NamespaceConstraint::Any), Some(x));
        }

        #[test]
        fn prop_any_absorbs_union(x in constraint()) {
            prop_assert_eq!(NamespaceConstraint::Any.union(&x), Some(NamespaceConstraint::Any));
        }

        #[test]
        fn prop_operations_commute(x in constraint(), y in constraint()) {
            prop_assert_eq!(x.union(&y), y.union(&x));
            prop_assert_eq!(x.intersection(&y), y.intersection(&x));
        }

        #[test]
        fn prop_results_are_sound(x in constraint(), y in constraint(), ns in namespace()) {
            let ns = ns.as_deref();
            if let Some(u) = x.union(&y) {
                prop_assert_eq!(u.allows(ns), x.allows(ns) || y.allows(ns));
            }
            if let Some(i) = x.intersection(&y) {
                prop_assert_eq!(i.allows(ns), x.allows(ns) && y.allows(ns));
            }
        }

        #[test]
        fn prop_disjoint_sets_intersect_empty(
            a in proptest::collection::btree_set(Just(Some("urn:a".to_string())), 0..2),
            b in proptest::collection::btree_set(Just(Some("urn:b".to_string())), 0..2),
        ) {
            let i = NamespaceConstraint::Set(a).intersection(&NamespaceConstraint::Set(b));
            prop_assert!(i.map_or(false, |c| c.is_empty()));
        }

        #[test]
        fn prop_different_negations_not_expressible(a in namespace(), b in namespace()) {
            prop_assume!(a.is_some() && b.is_some() && a != b);
            let x = NamespaceConstraint::Not(a);
            let y = NamespaceConstraint::Not(b);
            prop_assert_eq!(x.intersection(&y), None);
        }

        #[test]
        fn prop_intersection_is_subset(x in constraint(), y in constraint()) {
            if let Some(i) = x.intersection(&y) {
                prop_assert!(i.is_subset(&x) || i.is_empty());
            }
        }
    }
}
