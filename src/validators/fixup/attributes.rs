//! Attribute group expansion
//!
//! Attribute group references are inlined depth first. The attribute
//! wildcard of the container is intersected with the wildcard of every
//! referenced group; prohibitions remove uses pulled in from groups.

use crate::error::Result;

use super::super::attributes::{use_name, AttributeContainer, Prohibition};
use super::super::base::{AttributeGroupId, AttributeUseId, Ref, SourcePos, WildcardId};
use super::super::builders::ConstructionSession;
use super::super::exceptions::ErrorCode;
use super::super::simple_types::{id_role, IdRole};

/// Attribute uses and wildcard of a container after group expansion
#[derive(Debug, Clone, Default)]
pub(crate) struct ExpandedAttributes {
    /// Direct uses first, then the uses of referenced groups
    pub uses: Vec<AttributeUseId>,
    /// Complete wildcard
    pub wildcard: Option<WildcardId>,
    /// Prohibitions that removed nothing
    pub unmatched: Vec<Prohibition>,
}

/// Expand the group references of a container.
///
/// With `apply_prohibitions` unset, prohibitions are reported as pointless
/// and ignored.
pub(crate) fn expand_container(
    session: &mut ConstructionSession,
    container: &AttributeContainer,
    duplicate_code: ErrorCode,
    apply_prohibitions: bool,
) -> ExpandedAttributes {
    let mut uses = container.uses.clone();
    let direct = uses.len();
    let mut group_wildcards = Vec::new();

    for (group, pos) in &container.group_refs {
        let Ref::Resolved(group) = group else {
            continue;
        };
        expand_group(session, *group);
        let def = &session.components[*group];
        for u in &def.attribute_uses {
            if !uses.contains(u) {
                uses.push(*u);
            }
        }
        if let Some(w) = def.wildcard {
            group_wildcards.push((w, pos.clone()));
        }
    }

    let wildcard = complete_wildcard(session, container.wildcard, &group_wildcards);
    report_duplicates(session, &mut uses, duplicate_code);

    let mut unmatched = Vec::new();
    for prohibition in &container.prohibitions {
        if !apply_prohibitions {
            pointless(session, prohibition, "prohibitions have no effect in an attribute group");
            continue;
        }
        let position = uses
            .iter()
            .position(|u| use_name(&session.components, *u) == Some(&prohibition.name));
        match position {
            Some(i) if i < direct => pointless(
                session,
                prohibition,
                "the attribute is declared by the same definition",
            ),
            Some(i) => {
                uses.remove(i);
            }
            None => unmatched.push(prohibition.clone()),
        }
    }

    ExpandedAttributes {
        uses,
        wildcard,
        unmatched,
    }
}

pub(super) fn pointless(session: &mut ConstructionSession, prohibition: &Prohibition, why: &str) {
    session.warning(
        ErrorCode::PointlessProhibition,
        &prohibition.pos,
        format!(
            "skipping pointless prohibition of attribute '{}': {}",
            prohibition.name, why
        ),
    );
}

/// Local wildcard intersected with every group wildcard.
///
/// processContents comes from the local wildcard, else from the first
/// group wildcard. An intersection that cannot be expressed is reported
/// and leaves no wildcard.
fn complete_wildcard(
    session: &mut ConstructionSession,
    local: Option<WildcardId>,
    groups: &[(WildcardId, SourcePos)],
) -> Option<WildcardId> {
    let mut current = local;
    let mut changed = false;
    for (w, pos) in groups {
        let Some(c) = current else {
            current = Some(*w);
            continue;
        };
        if c == *w {
            continue;
        }
        match session.components[c].intersection(&session.components[*w]) {
            Some(intersection) => {
                current = Some(session.components.add_wildcard(intersection));
                changed = true;
            }
            None => {
                session.error(
                    ErrorCode::CosAwIntersect,
                    pos,
                    "the intersection of the attribute wildcards is not expressible",
                );
                return None;
            }
        }
    }
    if changed {
        tracing::trace!(wildcard = ?current, "attribute wildcard intersected");
    }
    current
}

/// Two different uses of one attribute name
fn report_duplicates(session: &mut ConstructionSession, uses: &mut Vec<AttributeUseId>, code: ErrorCode) {
    let mut kept: Vec<AttributeUseId> = Vec::with_capacity(uses.len());
    for u in uses.drain(..) {
        let name = use_name(&session.components, u).cloned();
        let clash = kept
            .iter()
            .any(|k| use_name(&session.components, *k) == name.as_ref());
        if clash {
            let pos = session.components[u].pos.clone();
            let rule = if code == ErrorCode::AgPropsCorrect {
                "ag-props-correct.2"
            } else {
                "ct-props-correct.4"
            };
            session.error(
                code,
                &pos,
                format!(
                    "{}: duplicate attribute use '{}'",
                    rule,
                    name.map(|n| n.to_string()).unwrap_or_default()
                ),
            );
        } else {
            kept.push(u);
        }
    }
    *uses = kept;
}

/// Report more than one use with an ID type
pub(super) fn check_single_id(session: &mut ConstructionSession, uses: &[AttributeUseId], code: ErrorCode, pos: &SourcePos) {
    let ids: Vec<String> = uses
        .iter()
        .filter_map(|u| {
            let decl = session.components[*u].decl.resolved()?;
            let ty = session.components[decl].type_id()?;
            (id_role(&session.components, ty) == Some(IdRole::Id)).then(|| session.components[decl].name.to_string())
        })
        .collect();
    if ids.len() > 1 {
        let rule = if code == ErrorCode::AgPropsCorrect {
            "ag-props-correct.3"
        } else {
            "ct-props-correct.5"
        };
        session.error(
            code,
            pos,
            format!("{}: more than one attribute use has type ID ({})", rule, ids.join(", ")),
        );
    }
}

fn expand_group(session: &mut ConstructionSession, group: AttributeGroupId) {
    if session.components[group].expanded {
        return;
    }
    // cycles were cut by the circularity pass
    session.components[group].expanded = true;
    let content = session.components[group].content.clone();
    let expanded = expand_container(session, &content, ErrorCode::AgPropsCorrect, false);
    let pos = session.components[group].pos.clone();
    check_single_id(session, &expanded.uses, ErrorCode::AgPropsCorrect, &pos);
    let def = &mut session.components[group];
    def.attribute_uses = expanded.uses;
    def.wildcard = expanded.wildcard;
}

pub(super) fn expand_attribute_groups(session: &mut ConstructionSession) -> Result<()> {
    for group in session.components.attribute_group_ids().collect::<Vec<_>>() {
        expand_group(session, group);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::namespaces::QName;
    use crate::validators::attributes::use_name;
    use crate::validators::exceptions::ErrorCode;
    use crate::validators::fixup::tests_support::{codes, construct, warning_codes};
    use crate::validators::wildcards::NamespaceConstraint;

    #[test]
    fn test_nested_groups_expand() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:attributeGroup name="Inner">
                <xs:attribute name="a" type="xs:string"/>
                <xs:anyAttribute namespace="urn:x urn:y"/>
              </xs:attributeGroup>
              <xs:attributeGroup name="Outer">
                <xs:attribute name="b" type="xs:int"/>
                <xs:attributeGroup ref="Inner"/>
                <xs:anyAttribute namespace="urn:y urn:z"/>
              </xs:attributeGroup>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        let outer = session.globals.lookup_attribute_group(&QName::local("Outer")).unwrap();
        let def = &session.components[outer];
        let names: Vec<String> = def
            .attribute_uses
            .iter()
            .map(|u| use_name(&session.components, *u).unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["b".to_string(), "a".to_string()]);
        let wildcard = &session.components[def.wildcard.unwrap()];
        assert_eq!(
            wildcard.namespaces,
            NamespaceConstraint::Set([Some("urn:y".to_string())].into_iter().collect())
        );
    }

    #[test]
    fn test_duplicate_attribute_in_groups() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:attributeGroup name="A"><xs:attribute name="x"/></xs:attributeGroup>
              <xs:attributeGroup name="B">
                <xs:attribute name="x"/>
                <xs:attributeGroup ref="A"/>
              </xs:attributeGroup>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::AgPropsCorrect]);
    }

    #[test]
    fn test_two_id_attributes() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:attributeGroup name="A">
                <xs:attribute name="x" type="xs:ID"/>
                <xs:attribute name="y" type="xs:ID"/>
              </xs:attributeGroup>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::AgPropsCorrect]);
    }

    #[test]
    fn test_equal_negations_intersect() {
        let session = construct(
            r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t" xmlns:t="urn:t">
              <xs:attributeGroup name="A"><xs:anyAttribute namespace="##other"/></xs:attributeGroup>
              <xs:complexType name="T">
                <xs:attributeGroup ref="t:A"/>
                <xs:anyAttribute namespace="##other" processContents="lax"/>
              </xs:complexType>
            </xs:schema>"###,
            &[],
        );
        assert_eq!(codes(&session), vec![]);
    }

    #[test]
    fn test_inexpressible_intersection() {
        let other = r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:o">
              <xs:attributeGroup name="A"><xs:anyAttribute namespace="##other"/></xs:attributeGroup>
            </xs:schema>"###;
        let session = construct(
            r###"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:t" xmlns:o="urn:o">
              <xs:import namespace="urn:o" schemaLocation="other.xsd"/>
              <xs:complexType name="T">
                <xs:attributeGroup ref="o:A"/>
                <xs:anyAttribute namespace="##other"/>
              </xs:complexType>
            </xs:schema>"###,
            &[("other.xsd", other)],
        );
        assert_eq!(codes(&session), vec![ErrorCode::CosAwIntersect]);
    }

    #[test]
    fn test_prohibition_in_group_is_pointless() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:attributeGroup name="A">
                <xs:attribute name="x" use="prohibited"/>
              </xs:attributeGroup>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        assert_eq!(warning_codes(&session), vec![ErrorCode::PointlessProhibition]);
    }
}
