//! XSD Complex Type Definitions
//!
//! This module implements the body of complex type definitions. Complex
//! types can have empty content, simple content, element-only content or
//! mixed content with both text and elements.
//!
//! The parser fills in the fields describing what was written
//! (`content_source`, `mixed`, `explicit_particle`, `attributes`); the
//! complex-type fixup pass computes the {content type}, the effective
//! attribute uses and wildcard, and finally compiles the content model.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Complex_Type_Definitions

use std::fmt;
use std::sync::Arc;

use crate::automata::ContentModel;

use super::attributes::AttributeContainer;
use super::base::{AttributeUseId, Components, ParticleId, TypeId, WildcardId};
use super::particles::is_particle_emptiable;

/// {content type} variety of a complex type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    /// No character or element content
    #[default]
    Empty,
    /// Character content validated by a simple type
    Simple,
    /// Element content only; whitespace text is allowed
    ElementOnly,
    /// Elements interleaved with text
    Mixed,
}

impl ContentType {
    /// Whether the content is driven by a particle
    pub fn has_particle(&self) -> bool {
        matches!(self, Self::ElementOnly | Self::Mixed)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "empty"),
            Self::Simple => write!(f, "simple"),
            Self::ElementOnly => write!(f, "element-only"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// How the content of a complex type was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentSource {
    /// Particle or attributes directly below `<complexType>`
    /// (an implicit restriction of anyType)
    #[default]
    Implicit,
    /// `<simpleContent>`
    SimpleContent,
    /// `<complexContent>`
    ComplexContent,
}

/// Body of a complex type definition
#[derive(Debug, Clone, Default)]
pub struct ComplexTypeDef {
    /// Where the content was declared
    pub content_source: ContentSource,
    /// Effective `mixed` flag as written
    pub mixed: bool,
    /// The particle written in this definition (before extension wrapping)
    pub explicit_particle: Option<ParticleId>,
    /// Facets and anonymous base of a `<simpleContent><restriction>`
    pub simple_restriction: Option<TypeId>,
    /// Attribute uses, group references and prohibitions as written
    pub attributes: AttributeContainer,

    /// {content type}
    pub content_type: ContentType,
    /// Particle of element-only and mixed content
    pub content_particle: Option<ParticleId>,
    /// Simple type of simple content
    pub simple_type: Option<TypeId>,
    /// {attribute uses}, inherited ones included
    pub attribute_uses: Vec<AttributeUseId>,
    /// {attribute wildcard}
    pub attribute_wildcard: Option<WildcardId>,
    /// Compiled content model
    pub content_model: Option<Arc<ContentModel>>,
    /// Set once the complex fixup has run on this type
    pub resolved: bool,
}

impl ComplexTypeDef {
    /// New body for the given content source
    pub fn new(content_source: ContentSource) -> Self {
        Self {
            content_source,
            ..Self::default()
        }
    }

    /// Whether character content is allowed
    pub fn allows_text(&self) -> bool {
        matches!(self.content_type, ContentType::Simple | ContentType::Mixed)
    }

    /// Whether the content particle accepts the empty sequence
    pub fn is_emptiable(&self, components: &Components) -> bool {
        match self.content_particle {
            Some(p) => is_particle_emptiable(components, &components[p]),
            None => true,
        }
    }

    /// Mixed content whose particle is emptiable, the only complex content
    /// a value constraint may apply to
    pub fn is_emptiable_mixed(&self, components: &Components) -> bool {
        self.content_type == ContentType::Mixed && self.is_emptiable(components)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_display() {
        assert_eq!(ContentType::ElementOnly.to_string(), "element-only");
        assert!(ContentType::Mixed.has_particle());
        assert!(!ContentType::Simple.has_particle());
    }

    #[test]
    fn test_empty_body() {
        let components = Components::default();
        let body = ComplexTypeDef::new(ContentSource::ComplexContent);
        assert_eq!(body.content_type, ContentType::Empty);
        assert!(body.is_emptiable(&components));
        assert!(!body.is_emptiable_mixed(&components));
        assert!(!body.allows_text());
    }
}
