//! XSD Model Group components
//!
//! This module implements model groups for XSD content models:
//! - xs:sequence - ordered content
//! - xs:choice - alternative content
//! - xs:all - unordered content (elements only, each at most once)
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Model_Groups

use crate::namespaces::QName;

use super::base::{BucketId, Components, ModelGroupId, ParticleId, SourcePos};
use super::particles::Term;

/// Model group compositor type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compositor {
    /// Ordered sequence of particles
    #[default]
    Sequence,
    /// One of multiple alternatives
    Choice,
    /// Unordered set of element particles
    All,
}

impl Compositor {
    /// Parse from element local name
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "sequence" => Some(Self::Sequence),
            "choice" => Some(Self::Choice),
            "all" => Some(Self::All),
            _ => None,
        }
    }
}

impl std::fmt::Display for Compositor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Choice => write!(f, "choice"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A model group component
#[derive(Debug, Clone, Default)]
pub struct ModelGroup {
    /// {compositor}
    pub compositor: Compositor,
    /// {particles}
    pub particles: Vec<ParticleId>,
    /// Where the group was written
    pub pos: SourcePos,
}

impl ModelGroup {
    /// Empty group
    pub fn new(compositor: Compositor, pos: SourcePos) -> Self {
        Self {
            compositor,
            particles: Vec::new(),
            pos,
        }
    }
}

/// A named model group definition (`<group name="…">`)
#[derive(Debug, Clone)]
pub struct ModelGroupDef {
    /// {name}
    pub name: QName,
    /// {model group}; `None` when the definition had no valid content
    pub model_group: Option<ModelGroupId>,
    /// Where the definition was written
    pub pos: SourcePos,
    /// Defining document
    pub bucket: Option<BucketId>,
    /// Replaced by a `<redefine>`
    pub redefined: bool,
}

/// Visit every particle reachable from a model group, depth first.
///
/// Named group references are followed only when `follow_refs` is set;
/// `visit` returns false to stop descending below a particle.
pub fn walk_particles(
    components: &Components,
    group: ModelGroupId,
    follow_refs: bool,
    visit: &mut dyn FnMut(ParticleId) -> bool,
) {
    let mut stack = vec![group];
    let mut seen = std::collections::HashSet::new();
    while let Some(g) = stack.pop() {
        if !seen.insert(g) {
            continue;
        }
        for pid in components[g].particles.iter().rev() {
            if !visit(*pid) {
                continue;
            }
            match &components[*pid].term {
                Term::Group(inner) => stack.push(*inner),
                Term::GroupRef(r) if follow_refs => {
                    if let Some(inner) = r.resolved().and_then(|d| components[d].model_group) {
                        stack.push(inner);
                    }
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::base::Ref;
    use crate::validators::particles::{Occurs, Particle};

    #[test]
    fn test_compositor_from_tag() {
        assert_eq!(Compositor::from_tag("sequence"), Some(Compositor::Sequence));
        assert_eq!(Compositor::from_tag("all"), Some(Compositor::All));
        assert_eq!(Compositor::from_tag("group"), None);
        assert_eq!(Compositor::Choice.to_string(), "choice");
    }

    #[test]
    fn test_walk_particles() {
        let mut c = Components::default();
        let inner = c.add_model_group(ModelGroup::new(Compositor::Choice, SourcePos::default()));
        let outer = c.add_model_group(ModelGroup::new(Compositor::Sequence, SourcePos::default()));
        let a = c.add_particle(Particle::new(
            Occurs::once(),
            Term::Element(Ref::Pending(QName::local("a"))),
            SourcePos::default(),
        ));
        let g = c.add_particle(Particle::new(Occurs::once(), Term::Group(inner), SourcePos::default()));
        let b = c.add_particle(Particle::new(
            Occurs::once(),
            Term::Element(Ref::Pending(QName::local("b"))),
            SourcePos::default(),
        ));
        c[inner].particles.push(b);
        c[outer].particles.extend([a, g]);

        let mut visited = Vec::new();
        walk_particles(&c, outer, false, &mut |p| {
            visited.push(p);
            true
        });
        assert_eq!(visited.len(), 3);
        assert!(visited.contains(&b));
    }
}
