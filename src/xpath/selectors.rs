//! Streaming evaluation of identity-constraint paths
//!
//! A [`PathMatcher`] is created on the context node of a selector or field
//! expression and then fed the element events below it in document order.
//! It keeps, per open element, the set of step positions each alternative
//! has reached, so matching never needs access to the tree.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::namespaces::QName;

use super::parsers::IdcPath;

/// Streaming matcher for one compiled path, anchored at a context node
#[derive(Debug, Clone)]
pub struct PathMatcher {
    path: Arc<IdcPath>,
    /// Per open element (context node first): reached positions per alternative
    stack: Vec<Vec<BTreeSet<usize>>>,
}

impl PathMatcher {
    /// Anchor a matcher at the current element
    pub fn new(path: Arc<IdcPath>) -> Self {
        let initial = path.alternatives.iter().map(|_| BTreeSet::from([0])).collect();
        Self {
            path,
            stack: vec![initial],
        }
    }

    /// The compiled path
    pub fn path(&self) -> &IdcPath {
        &self.path
    }

    /// Depth below the context node (0 at the context node)
    pub fn depth(&self) -> usize {
        self.stack.len().saturating_sub(1)
    }

    /// Whether the path selects the context node itself (`.`)
    pub fn matches_context(&self) -> bool {
        self.path.alternatives.iter().any(|a| a.selects_context())
    }

    /// Enter a child element; returns whether the path selects it
    pub fn push_element(&mut self, name: &QName) -> bool {
        let Some(top) = self.stack.last() else {
            return false;
        };
        let mut matched = false;
        let mut next = Vec::with_capacity(top.len());
        for (alt, reached) in self.path.alternatives.iter().zip(top) {
            let mut positions = BTreeSet::new();
            for &i in reached {
                if i < alt.steps.len() && alt.steps[i].matches(name) {
                    positions.insert(i + 1);
                }
            }
            if alt.descendant {
                positions.insert(0);
            }
            if alt.attribute.is_none() && !alt.steps.is_empty() && positions.contains(&alt.steps.len()) {
                matched = true;
            }
            next.push(positions);
        }
        self.stack.push(next);
        matched
    }

    /// Whether the path selects an attribute of the current element
    pub fn matches_attribute(&self, name: &QName) -> bool {
        let Some(top) = self.stack.last() else {
            return false;
        };
        self.path
            .alternatives
            .iter()
            .zip(top)
            .any(|(alt, reached)| match &alt.attribute {
                Some(test) => reached.contains(&alt.steps.len()) && test.matches(name),
                None => false,
            })
    }

    /// Leave the current element
    pub fn pop_element(&mut self) {
        if self.stack.len() > 1 {
            self.stack.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespaces::NamespaceContext;
    use crate::xpath::IdentityXPathParser;

    fn selector(expr: &str) -> PathMatcher {
        let path = IdentityXPathParser::new()
            .parse(expr, &NamespaceContext::new())
            .unwrap();
        PathMatcher::new(Arc::new(path))
    }

    fn field(expr: &str) -> PathMatcher {
        let path = IdentityXPathParser::for_field()
            .parse(expr, &NamespaceContext::new())
            .unwrap();
        PathMatcher::new(Arc::new(path))
    }

    #[test]
    fn test_child_path() {
        let mut m = selector("a/b");
        assert!(!m.push_element(&QName::local("a")));
        assert!(m.push_element(&QName::local("b")));
        m.pop_element();
        assert!(!m.push_element(&QName::local("c")));
        m.pop_element();
        m.pop_element();
        // b directly below the context does not match
        assert!(!m.push_element(&QName::local("b")));
    }

    #[test]
    fn test_descendant_path() {
        let mut m = selector(".//Employee");
        assert!(!m.push_element(&QName::local("Dept")));
        assert!(m.push_element(&QName::local("Employee")));
        assert!(m.push_element(&QName::local("Employee")));
        assert_eq!(m.depth(), 3);
    }

    #[test]
    fn test_attribute_field() {
        let mut m = field("@id");
        assert!(m.matches_attribute(&QName::local("id")));
        assert!(!m.matches_attribute(&QName::local("name")));
        m.push_element(&QName::local("child"));
        assert!(!m.matches_attribute(&QName::local("id")));

        let mut m = field("info/@lang");
        assert!(!m.matches_attribute(&QName::local("lang")));
        m.push_element(&QName::local("info"));
        assert!(m.matches_attribute(&QName::local("lang")));
    }

    #[test]
    fn test_self_and_union() {
        assert!(field(".").matches_context());
        let mut m = selector("a | b/c");
        assert!(m.push_element(&QName::local("a")));
        m.pop_element();
        assert!(!m.push_element(&QName::local("b")));
        assert!(m.push_element(&QName::local("c")));
    }
}
