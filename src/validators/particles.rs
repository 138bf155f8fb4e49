//! XSD Particle Schema Components
//!
//! This module implements the particle model for XSD elements, groups, and wildcards.
//! Particles define occurrence constraints (minOccurs, maxOccurs) for schema components.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cParticles

use std::fmt;

use super::base::{Components, ElementId, GroupDefId, ModelGroupId, Ref, SourcePos, WildcardId};
use super::groups::Compositor;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max_occurs means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// Check if this particle can be empty (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle is empty (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if particle has maxOccurs == 1
    pub fn is_single(&self) -> bool {
        self.max == Some(1)
    }

    /// Check if maxOccurs is unbounded
    pub fn is_unbounded(&self) -> bool {
        self.max.is_none()
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "{{{}, {}}}", self.min, max),
            None => write!(f, "{{{}, unbounded}}", self.min),
        }
    }
}

/// Outcome of reading minOccurs/maxOccurs: the bounds to use plus the
/// problems found in the literals
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedOccurs {
    /// Bounds after recovery
    pub occurs: Occurs,
    /// Malformed literals (reported as s4s errors)
    pub malformed: Vec<String>,
    /// maxOccurs < minOccurs (reported as p-props-correct.2.1)
    pub inverted: bool,
}

/// Parse minOccurs/maxOccurs from XML attribute values.
///
/// A malformed literal falls back to the default of 1 for that bound, and
/// an inverted pair is repaired by raising maxOccurs to minOccurs, so the
/// particle can still be built after the problem is reported.
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> ParsedOccurs {
    let mut occurs = Occurs::once();
    let mut malformed = Vec::new();

    if let Some(min_str) = min_occurs {
        match min_str.trim().parse::<u32>() {
            Ok(min) => occurs.min = min,
            Err(_) => malformed.push(format!(
                "minOccurs value '{}' is not a valid non-negative integer",
                min_str
            )),
        }
    }

    if let Some(max_str) = max_occurs {
        let max_str = max_str.trim();
        if max_str == "unbounded" {
            occurs.max = None;
        } else {
            match max_str.parse::<u32>() {
                Ok(max) => occurs.max = Some(max),
                Err(_) => malformed.push(format!(
                    "maxOccurs value '{}' must be a non-negative integer or 'unbounded'",
                    max_str
                )),
            }
        }
    }

    let inverted = matches!(occurs.max, Some(max) if occurs.min > max);
    if inverted {
        occurs.max = Some(occurs.min);
    }

    ParsedOccurs {
        occurs,
        malformed,
        inverted,
    }
}

/// The term of a particle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Term {
    /// Element declaration (local, or a `ref` to a global one)
    Element(Ref<ElementId>),
    /// Element wildcard
    Wildcard(WildcardId),
    /// Model group
    Group(ModelGroupId),
    /// Reference to a named model group; replaced by its model group during fixup
    GroupRef(Ref<GroupDefId>),
}

/// A particle component
#[derive(Debug, Clone)]
pub struct Particle {
    /// {min occurs} / {max occurs}
    pub occurs: Occurs,
    /// {term}
    pub term: Term,
    /// Where the particle was written
    pub pos: SourcePos,
}

impl Particle {
    /// New particle
    pub fn new(occurs: Occurs, term: Term, pos: SourcePos) -> Self {
        Self { occurs, term, pos }
    }
}

/// Whether a particle can match the empty sequence
pub fn is_particle_emptiable(components: &Components, particle: &Particle) -> bool {
    if particle.occurs.is_emptiable() {
        return true;
    }
    match &particle.term {
        Term::Group(group) => is_group_emptiable(components, *group, 0),
        Term::GroupRef(r) => match r.resolved() {
            Some(def) => components[def]
                .model_group
                .map_or(true, |g| is_group_emptiable(components, g, 0)),
            None => false,
        },
        Term::Element(_) | Term::Wildcard(_) => false,
    }
}

fn is_group_emptiable(components: &Components, group: ModelGroupId, depth: usize) -> bool {
    // circular groups are reported elsewhere
    if depth > components.model_groups.len() {
        return false;
    }
    let group = &components[group];
    let mut nested = group.particles.iter().map(|p| {
        let particle = &components[*p];
        particle.occurs.is_emptiable()
            || match &particle.term {
                Term::Group(g) => is_group_emptiable(components, *g, depth + 1),
                Term::GroupRef(r) => r
                    .resolved()
                    .and_then(|def| components[def].model_group)
                    .map_or(false, |g| is_group_emptiable(components, g, depth + 1)),
                _ => false,
            }
    });
    match group.compositor {
        Compositor::Choice => group.particles.is_empty() || nested.any(|e| e),
        Compositor::Sequence | Compositor::All => nested.all(|e| e),
    }
}
