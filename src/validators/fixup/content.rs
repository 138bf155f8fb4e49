//! Content model compilation
//!
//! The last pass: every complex type with element-only or mixed content
//! gets its particle compiled into an automaton and checked for Unique
//! Particle Attribution. It runs after substitution groups are complete
//! because element transitions also accept the members of a head.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::trace;

use crate::automata::{compile_content_model, ContentModel, ModelError};
use crate::error::{Error, Result};

use super::super::base::ParticleId;
use super::super::builders::ConstructionSession;
use super::super::exceptions::ErrorCode;

pub(super) fn compile_content_models(session: &mut ConstructionSession) -> Result<()> {
    let max_states = session.options.limits.max_automaton_states;
    let mut compiled: HashMap<ParticleId, Option<Arc<ContentModel>>> = HashMap::new();

    for id in session.components.type_ids().collect::<Vec<_>>() {
        let ty = &session.components[id];
        let Some(ct) = ty.complex() else {
            continue;
        };
        if !ct.content_type.has_particle() || ct.content_model.is_some() {
            continue;
        }
        let Some(particle) = ct.content_particle else {
            continue;
        };
        let (name, pos) = (ty.display_name(), ty.pos.clone());

        let model = match compiled.get(&particle) {
            Some(model) => model.clone(),
            None => {
                let model = match compile_content_model(&session.components, particle, max_states) {
                    Ok(model) => {
                        trace!(type_name = %name, states = model.state_count(), "content model compiled");
                        Some(Arc::new(model))
                    }
                    Err(ModelError::Ambiguous(ambiguity)) => {
                        session.error(
                            ErrorCode::CosNonambig,
                            &pos,
                            format!("cos-nonambig: the content model of {} is not deterministic: {}", name, ambiguity),
                        );
                        None
                    }
                    Err(e @ ModelError::TooLarge { .. }) => {
                        return Err(Error::LimitExceeded(format!("content model of {}: {}", name, e)));
                    }
                };
                compiled.insert(particle, model.clone());
                model
            }
        };

        let ty = &mut session.components[id];
        if model.is_none() {
            ty.invalid = true;
        }
        if let Some(ct) = ty.complex_mut() {
            ct.content_model = model;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::namespaces::QName;
    use crate::validators::exceptions::ErrorCode;
    use crate::validators::fixup::tests_support::{codes, construct};

    #[test]
    fn test_models_compiled() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:complexType name="T">
                   <xs:sequence>
                     <xs:element name="a"/>
                     <xs:element name="b" minOccurs="0"/>
                   </xs:sequence>
                 </xs:complexType>
               </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        let id = session.globals.lookup_type(&QName::local("T")).unwrap();
        let model = session.components[id].complex().unwrap().content_model.clone().unwrap();
        let mut run = model.run();
        assert!(run.push(&QName::local("a")).is_ok());
        assert!(run.is_final());
    }

    #[test]
    fn test_ambiguous_model_reported() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:complexType name="T">
                   <xs:choice>
                     <xs:sequence><xs:element name="a"/><xs:element name="b"/></xs:sequence>
                     <xs:sequence><xs:element name="a"/><xs:element name="c"/></xs:sequence>
                   </xs:choice>
                 </xs:complexType>
               </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::CosNonambig]);
        let id = session.globals.lookup_type(&QName::local("T")).unwrap();
        assert!(session.components[id].invalid);
    }

    #[test]
    fn test_substitution_members_compete() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="head"/>
                 <xs:element name="member" substitutionGroup="head"/>
                 <xs:complexType name="T">
                   <xs:sequence>
                     <xs:element ref="head" minOccurs="0"/>
                     <xs:element ref="member"/>
                   </xs:sequence>
                 </xs:complexType>
               </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::CosNonambig]);
    }
}
