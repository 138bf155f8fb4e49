//! Circular definitions
//!
//! Type derivations (base, list item and union members), model group
//! definitions, attribute groups and substitution groups must not refer
//! back to themselves. Components on a cycle are reported and their
//! offending edges are cut so every later pass works on an acyclic graph.

use crate::error::Result;
use crate::namespaces::QName;

use super::super::base::{GroupDefId, Ref, TypeId};
use super::super::builders::ConstructionSession;
use super::super::builtins::BuiltinType;
use super::super::exceptions::ErrorCode;
use super::super::groups::walk_particles;
use super::super::particles::Term;
use super::on_cycle;

pub(super) fn check_circularity(session: &mut ConstructionSession) -> Result<()> {
    check_types(session);
    check_groups(session);
    check_attribute_groups(session);
    check_substitution_groups(session);
    Ok(())
}

fn type_successors(session: &ConstructionSession, index: usize) -> Vec<usize> {
    let ty = &session.components.types[index];
    if ty.builtin.is_some() {
        return Vec::new();
    }
    let mut next: Vec<usize> = ty.base_id().map(TypeId::index).into_iter().collect();
    if let Some(st) = ty.simple() {
        next.extend(st.item_type.as_ref().and_then(|r| r.resolved()).map(TypeId::index));
        next.extend(st.member_types.iter().filter_map(|r| r.resolved()).map(TypeId::index));
    }
    next
}

fn check_types(session: &mut ConstructionSession) {
    let snapshot = &*session;
    let cyclic = on_cycle(snapshot.components.types.len(), |i| type_successors(snapshot, i));
    for (index, _) in cyclic.iter().enumerate().filter(|(_, c)| **c) {
        let id = TypeId(index as u32);
        let ty = &session.components[id];
        let pos = ty.pos.clone();
        let (code, rule, root) = if ty.is_simple() {
            (ErrorCode::StPropsCorrect, "st-props-correct.2", BuiltinType::AnySimpleType)
        } else {
            (ErrorCode::CtPropsCorrect, "ct-props-correct.3", BuiltinType::AnyType)
        };
        let message = format!("{}: the type definition {} is circular", rule, ty.display_name());
        session.error(code, &pos, message);

        let ty = &mut session.components[id];
        ty.invalid = true;
        ty.base = Some(Ref::Resolved(TypeId::builtin(root)));
        if let Some(st) = ty.simple_mut() {
            if st.item_type.as_ref().and_then(|r| r.resolved()).map_or(false, |t| cyclic[t.index()]) {
                st.item_type = None;
            }
            st.member_types
                .retain(|r| r.resolved().map_or(true, |t| !cyclic[t.index()]));
        }
    }
}

/// Definitions referenced from the model group of a definition
fn referenced_groups(session: &ConstructionSession, def: GroupDefId) -> Vec<usize> {
    let mut refs = Vec::new();
    if let Some(group) = session.components[def].model_group {
        walk_particles(&session.components, group, false, &mut |p| {
            if let Term::GroupRef(r) = &session.components[p].term {
                refs.extend(r.resolved().map(GroupDefId::index));
            }
            true
        });
    }
    refs
}

fn check_groups(session: &mut ConstructionSession) {
    let snapshot = &*session;
    let cyclic = on_cycle(snapshot.components.group_defs.len(), |i| {
        referenced_groups(snapshot, GroupDefId(i as u32))
    });
    for (index, _) in cyclic.iter().enumerate().filter(|(_, c)| **c) {
        let def = &mut session.components.group_defs[index];
        def.model_group = None;
        let (pos, name) = (def.pos.clone(), def.name.clone());
        session.error(
            ErrorCode::MgPropsCorrect,
            &pos,
            format!("the model group definition '{}' refers to itself", name),
        );
    }
}

fn check_attribute_groups(session: &mut ConstructionSession) {
    let groups = &session.components.attribute_groups;
    let cyclic = on_cycle(groups.len(), |i| {
        groups[i]
            .content
            .group_refs
            .iter()
            .filter_map(|(r, _)| r.resolved())
            .map(|g| g.index())
            .collect()
    });
    for (index, _) in cyclic.iter().enumerate().filter(|(_, c)| **c) {
        let group = &mut session.components.attribute_groups[index];
        for (r, _) in group.content.group_refs.iter_mut() {
            if let Some(target) = r.resolved().filter(|t| cyclic[t.index()]) {
                *r = Ref::Missing(QName::local(format!("#{}", target.index())));
            }
        }
        let (pos, name) = (group.pos.clone(), group.name.clone());
        session.error(
            ErrorCode::SrcAttributeGroup,
            &pos,
            format!("src-attribute_group.3: the attribute group '{}' refers to itself", name),
        );
    }
}

fn check_substitution_groups(session: &mut ConstructionSession) {
    let elements = &session.components.elements;
    let cyclic = on_cycle(elements.len(), |i| {
        elements[i].head_id().map(|h| h.index()).into_iter().collect()
    });
    for (index, _) in cyclic.iter().enumerate().filter(|(_, c)| **c) {
        let element = &mut session.components.elements[index];
        if let Some(head) = element.substitution_head.take() {
            let name = head.name().cloned().unwrap_or_else(|| element.name.clone());
            element.substitution_head = Some(Ref::Missing(name));
        }
        element.invalid = true;
        let (pos, name) = (element.pos.clone(), element.name.clone());
        session.error(
            ErrorCode::EPropsCorrect,
            &pos,
            format!("e-props-correct.6: the substitution group of '{}' is circular", name),
        );
    }
}
