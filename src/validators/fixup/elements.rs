//! Declaration checks and substitution groups
//!
//! Element declarations without a type take the type of their
//! substitution group head, or anyType. Default and fixed values are
//! checked against the declared type and kept in parsed form for
//! validation.

use crate::error::Result;

use super::super::attributes::ValueConstraint;
use super::super::base::{DerivationSet, ElementId, Ref, SourcePos, TypeId};
use super::super::builders::ConstructionSession;
use super::super::builtins::BuiltinType;
use super::super::complex_types::ContentType;
use super::super::elements::head_chain;
use super::super::exceptions::ErrorCode;
use super::super::identities::IdcKind;
use super::super::simple_types::{id_role, validate_simple_value, IdRole};
use super::super::values::{values_equal, XsdValue};

pub(super) fn check_declarations(session: &mut ConstructionSession) -> Result<()> {
    let elements: Vec<ElementId> = session.components.element_ids().collect();
    for &id in &elements {
        assign_default_type(session, id);
    }
    for &id in &elements {
        check_element(session, id);
    }
    check_attribute_declarations(session);
    check_attribute_uses(session);
    check_keyrefs(session);
    Ok(())
}

fn assign_default_type(session: &mut ConstructionSession, id: ElementId) {
    if session.components[id].type_def.is_some() {
        return;
    }
    let inherited = head_chain(&session.components, id)
        .into_iter()
        .find_map(|h| session.components[h].type_def.clone());
    session.components[id].type_def =
        Some(inherited.unwrap_or(Ref::Resolved(TypeId::builtin(BuiltinType::AnyType))));
}

/// Outcome of checking a value constraint against a type
enum ConstraintCheck {
    Valid(Option<XsdValue>),
    Invalid(String),
    Unusable(String),
}

fn check_constraint(session: &ConstructionSession, ty: TypeId, constraint: &ValueConstraint) -> ConstraintCheck {
    let components = &session.components;
    let type_def = &components[ty];
    let simple = match type_def.complex() {
        None => Some(ty),
        Some(ct) if ct.content_type == ContentType::Simple => {
            Some(ct.simple_type.unwrap_or(TypeId::builtin(BuiltinType::AnySimpleType)))
        }
        Some(ct) if ct.is_emptiable_mixed(components) => None,
        Some(_) => {
            return ConstraintCheck::Unusable(format!(
                "the type {} has neither simple content nor emptiable mixed content",
                type_def.display_name()
            ))
        }
    };
    let Some(simple) = simple else {
        return ConstraintCheck::Valid(None);
    };
    if id_role(components, simple) == Some(IdRole::Id) {
        return ConstraintCheck::Unusable("a value constraint is not allowed on an ID type".to_string());
    }
    match validate_simple_value(components, simple, &constraint.lexical, Some(&constraint.namespaces)) {
        Ok(value) => ConstraintCheck::Valid(Some(value)),
        Err(issue) => ConstraintCheck::Invalid(issue.message),
    }
}

fn check_element(session: &mut ConstructionSession, id: ElementId) {
    let element = &session.components[id];
    if element.invalid {
        return;
    }
    let pos = element.pos.clone();
    let name = element.name.clone();
    let ty = element.type_id();

    if let (Some(ty), Some(constraint)) = (ty, element.value_constraint.clone()) {
        match check_constraint(session, ty, &constraint) {
            ConstraintCheck::Valid(value) => {
                if let Some(c) = session.components[id].value_constraint.as_mut() {
                    c.value = value;
                }
            }
            ConstraintCheck::Invalid(message) => {
                session.error(
                    ErrorCode::EPropsCorrect,
                    &pos,
                    format!(
                        "e-props-correct.2: the value constraint '{}' of '{}' is not valid: {}",
                        constraint.lexical, name, message
                    ),
                );
                session.components[id].invalid = true;
            }
            ConstraintCheck::Unusable(message) => {
                session.error(
                    ErrorCode::CosValidDefault,
                    &pos,
                    format!("cos-valid-default.2: '{}' cannot have a value constraint: {}", name, message),
                );
                session.components[id].invalid = true;
            }
        }
    }

    let Some(head) = session.components[id].head_id() else {
        return;
    };
    let head_decl = &session.components[head];
    let (Some(ty), Some(head_ty)) = (ty, head_decl.type_id()) else {
        return;
    };
    let head_name = head_decl.name.clone();
    let exclusions = DerivationSet {
        extension: head_decl.final_.extension,
        restriction: head_decl.final_.restriction,
        ..DerivationSet::empty()
    };
    if !session.components.is_validly_derived(ty, head_ty, exclusions) {
        session.error(
            ErrorCode::EPropsCorrect,
            &pos,
            format!(
                "e-props-correct.4: the type of '{}' is not validly derived from the type of its substitution group head '{}'",
                name, head_name
            ),
        );
        session.components[id].invalid = true;
    }
}

fn check_attribute_declarations(session: &mut ConstructionSession) {
    for id in session.components.attribute_ids().collect::<Vec<_>>() {
        let decl = &session.components[id];
        if decl.invalid {
            continue;
        }
        let Some(ty) = decl.type_id() else {
            continue;
        };
        let (pos, name) = (decl.pos.clone(), decl.name.clone());
        if !session.components[ty].is_simple() {
            let type_name = session.components[ty].display_name();
            session.error(
                ErrorCode::APropsCorrect,
                &pos,
                format!("the type {} of attribute '{}' is not a simple type", type_name, name),
            );
            session.components[id].invalid = true;
            continue;
        }
        let Some(constraint) = session.components[id].value_constraint.clone() else {
            continue;
        };
        let problem = match check_constraint(session, ty, &constraint) {
            ConstraintCheck::Valid(value) => {
                if let Some(c) = session.components[id].value_constraint.as_mut() {
                    c.value = value;
                }
                None
            }
            ConstraintCheck::Invalid(message) => Some(format!(
                "a-props-correct.2: the value constraint '{}' of attribute '{}' is not valid: {}",
                constraint.lexical, name, message
            )),
            ConstraintCheck::Unusable(message) => Some(format!("a-props-correct.3: attribute '{}': {}", name, message)),
        };
        if let Some(message) = problem {
            session.error(ErrorCode::APropsCorrect, &pos, message);
            session.components[id].invalid = true;
        }
    }
}

fn check_attribute_uses(session: &mut ConstructionSession) {
    for id in session.components.attribute_use_ids().collect::<Vec<_>>() {
        let attribute_use = &session.components[id];
        let Some(constraint) = attribute_use.value_constraint.clone() else {
            continue;
        };
        let Some(decl) = attribute_use.decl.resolved() else {
            continue;
        };
        let pos: SourcePos = attribute_use.pos.clone();
        let decl = &session.components[decl];
        let name = decl.name.clone();
        let decl_type = decl.type_id();
        let fixed = decl.value_constraint.clone().filter(|c| c.is_fixed());
        if let Some(fixed) = fixed {
            let same = constraint.is_fixed()
                && match (&fixed.value, decl_type) {
                    (Some(expected), Some(ty)) => {
                        check_value(session, ty, &constraint).map_or(false, |v| values_equal(&v, expected))
                    }
                    _ => fixed.lexical == constraint.lexical,
                };
            if !same {
                let message = format!(
                    "au-props-correct.2: the attribute '{}' is declared with the fixed value '{}'",
                    name, fixed.lexical
                );
                session.error(ErrorCode::AuPropsCorrect, &pos, message);
                continue;
            }
        }
        let Some(ty) = decl_type else {
            continue;
        };
        match check_constraint(session, ty, &constraint) {
            ConstraintCheck::Valid(value) => {
                if let Some(c) = session.components[id].value_constraint.as_mut() {
                    c.value = value;
                }
            }
            ConstraintCheck::Invalid(message) | ConstraintCheck::Unusable(message) => {
                session.error(
                    ErrorCode::AuPropsCorrect,
                    &pos,
                    format!(
                        "au-props-correct.1: the value constraint '{}' of attribute '{}' is not valid: {}",
                        constraint.lexical, name, message
                    ),
                );
            }
        }
    }
}

fn check_value(session: &ConstructionSession, ty: TypeId, constraint: &ValueConstraint) -> Option<XsdValue> {
    match check_constraint(session, ty, constraint) {
        ConstraintCheck::Valid(value) => value,
        _ => None,
    }
}

fn check_keyrefs(session: &mut ConstructionSession) {
    for id in session.components.idc_ids().collect::<Vec<_>>() {
        let idc = &session.components[id];
        if idc.kind != IdcKind::Keyref {
            continue;
        }
        let Some(refer) = idc.refer_id() else {
            continue;
        };
        let target = &session.components[refer];
        let target_name = target.name.clone();
        let problem = if target.kind == IdcKind::Keyref {
            Some(format!(
                "c-props-correct.1: the keyref '{}' refers to '{}', which is not a key or unique constraint",
                idc.name, target_name
            ))
        } else if target.fields.len() != idc.fields.len() {
            Some(format!(
                "c-props-correct.2: the keyref '{}' has {} fields but '{}' has {}",
                idc.name,
                idc.fields.len(),
                target_name,
                target.fields.len()
            ))
        } else {
            None
        };
        if let Some(message) = problem {
            let pos = idc.pos.clone();
            session.components.idcs[id.index()].refer = Some(Ref::Missing(target_name));
            session.error(ErrorCode::CPropsCorrect, &pos, message);
        }
    }
}

/// Fill {substitution group members} of every head, transitively.
/// Abstract members and members whose substitution the head blocks are left
/// out.
pub(super) fn build_substitution_groups(session: &mut ConstructionSession) -> Result<()> {
    for id in session.components.element_ids().collect::<Vec<_>>() {
        let member = &session.components[id];
        if member.invalid || member.is_abstract || member.head_id().is_none() {
            continue;
        }
        let Some(member_ty) = member.type_id() else {
            continue;
        };
        for head in head_chain(&session.components, id) {
            let head_decl = &session.components[head];
            if head_decl.block.substitution {
                continue;
            }
            let blocked = DerivationSet {
                extension: head_decl.block.extension,
                restriction: head_decl.block.restriction,
                ..DerivationSet::empty()
            };
            let allowed = head_decl
                .type_id()
                .map_or(true, |head_ty| session.components.is_derived_from(member_ty, head_ty, blocked));
            if allowed {
                session.components[head].substitution_members.push(id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::namespaces::QName;
    use crate::validators::base::TypeId;
    use crate::validators::builtins::BuiltinType;
    use crate::validators::exceptions::ErrorCode;
    use crate::validators::fixup::tests_support::{codes, construct};

    fn schema(body: &str) -> String {
        format!(r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#, body)
    }

    #[test]
    fn test_type_from_head_or_any_type() {
        let session = construct(
            &schema(
                r#"<xs:element name="head" type="xs:int"/>
                   <xs:element name="member" substitutionGroup="head"/>
                   <xs:element name="free"/>"#,
            ),
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        let member = session.globals.lookup_element(&QName::local("member")).unwrap();
        assert_eq!(session.components[member].type_id(), Some(TypeId::builtin(BuiltinType::Int)));
        let free = session.globals.lookup_element(&QName::local("free")).unwrap();
        assert_eq!(session.components[free].type_id(), Some(TypeId::builtin(BuiltinType::AnyType)));
        let head = session.globals.lookup_element(&QName::local("head")).unwrap();
        assert_eq!(session.components[head].substitution_members, vec![member]);
    }

    #[test]
    fn test_invalid_default() {
        let session = construct(
            &schema(r#"<xs:element name="e" type="xs:int" default="abc"/>"#),
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::EPropsCorrect]);
    }

    #[test]
    fn test_default_needs_simple_or_mixed_content() {
        let session = construct(
            &schema(
                r#"<xs:complexType name="T"><xs:sequence><xs:element name="a"/></xs:sequence></xs:complexType>
                   <xs:complexType name="M" mixed="true"><xs:sequence><xs:element name="a" minOccurs="0"/></xs:sequence></xs:complexType>
                   <xs:element name="e" type="T" default="x"/>
                   <xs:element name="m" type="M" default="x"/>"#,
            ),
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::CosValidDefault]);
    }

    #[test]
    fn test_member_type_must_derive_from_head() {
        let session = construct(
            &schema(
                r#"<xs:element name="head" type="xs:int"/>
                   <xs:element name="member" type="xs:string" substitutionGroup="head"/>"#,
            ),
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::EPropsCorrect]);
        let head = session.globals.lookup_element(&QName::local("head")).unwrap();
        assert!(session.components[head].substitution_members.is_empty());
    }

    #[test]
    fn test_blocked_and_abstract_members() {
        let session = construct(
            &schema(
                r#"<xs:element name="head" type="xs:decimal" block="restriction"/>
                   <xs:element name="a" type="xs:integer" substitutionGroup="head"/>
                   <xs:element name="b" type="xs:decimal" substitutionGroup="head" abstract="true"/>
                   <xs:element name="c" type="xs:decimal" substitutionGroup="b"/>"#,
            ),
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        let head = session.globals.lookup_element(&QName::local("head")).unwrap();
        let c = session.globals.lookup_element(&QName::local("c")).unwrap();
        assert_eq!(session.components[head].substitution_members, vec![c]);
    }

    #[test]
    fn test_type_block_does_not_invalidate_member() {
        let types = r#"<xs:complexType name="B" block="extension">
                         <xs:sequence><xs:element name="a"/></xs:sequence>
                       </xs:complexType>
                       <xs:complexType name="D">
                         <xs:complexContent>
                           <xs:extension base="B"><xs:sequence><xs:element name="b"/></xs:sequence></xs:extension>
                         </xs:complexContent>
                       </xs:complexType>"#;
        let session = construct(
            &schema(&format!(
                r#"{}<xs:element name="head" type="B"/>
                      <xs:element name="m" type="D" substitutionGroup="head"/>"#,
                types
            )),
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        // the block still keeps the member out of instance substitution
        let head = session.globals.lookup_element(&QName::local("head")).unwrap();
        assert!(session.components[head].substitution_members.is_empty());

        let session = construct(
            &schema(&format!(
                r#"{}<xs:element name="head" type="B" final="extension"/>
                      <xs:element name="m" type="D" substitutionGroup="head"/>"#,
                types
            )),
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::EPropsCorrect]);
    }

    #[test]
    fn test_fixed_attribute_use_must_match_declaration() {
        let session = construct(
            &schema(
                r#"<xs:attribute name="version" type="xs:decimal" fixed="1.0"/>
                   <xs:complexType name="A"><xs:attribute ref="version" fixed="1.00"/></xs:complexType>
                   <xs:complexType name="B"><xs:attribute ref="version" fixed="2"/></xs:complexType>"#,
            ),
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::AuPropsCorrect]);
    }

    #[test]
    fn test_id_attribute_with_default() {
        let session = construct(
            &schema(r#"<xs:attribute name="id" type="xs:ID" default="x"/>"#),
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::APropsCorrect]);
    }

    #[test]
    fn test_keyref_field_count() {
        let session = construct(
            &schema(
                r#"<xs:element name="root">
                     <xs:complexType><xs:sequence><xs:element name="item" maxOccurs="unbounded"/></xs:sequence></xs:complexType>
                     <xs:key name="k"><xs:selector xpath="item"/><xs:field xpath="@a"/><xs:field xpath="@b"/></xs:key>
                     <xs:keyref name="r" refer="k"><xs:selector xpath="item"/><xs:field xpath="@c"/></xs:keyref>
                   </xs:element>"#,
            ),
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::CPropsCorrect]);
    }
}
