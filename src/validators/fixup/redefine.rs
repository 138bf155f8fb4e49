//! `<redefine>` pre-pass
//!
//! Every redefining component is linked to the component it replaces. The
//! original is looked up in the redefined document and the documents it
//! includes or redefines itself. The original keeps its handle but is
//! flagged so the registration pass leaves it out of the global maps; the
//! self-reference of the redefinition is resolved to it directly.

use std::collections::HashSet;

use crate::error::Result;
use crate::namespaces::QName;

use super::super::base::{BucketId, ComponentRef, Ref};
use super::super::builders::{ConstructionSession, Redefinition, RedefineKind, RelationKind};
use super::super::exceptions::ErrorCode;
use super::super::groups::walk_particles;
use super::super::particles::Term;

pub(super) fn apply_redefinitions(session: &mut ConstructionSession) -> Result<()> {
    let redefinitions = std::mem::take(&mut session.redefinitions);
    for redefinition in &redefinitions {
        let Some(original) = find_original(session, redefinition) else {
            session.error(
                ErrorCode::SrcRedefine,
                &redefinition.pos,
                format!(
                    "src-redefine.{}: the redefined document has no {} named '{}'",
                    match redefinition.kind {
                        RedefineKind::Type => 5,
                        RedefineKind::Group => 6,
                        RedefineKind::AttributeGroup => 7,
                    },
                    redefinition.kind,
                    redefinition.name
                ),
            );
            continue;
        };
        match (redefinition.component, original) {
            (ComponentRef::Type(new), ComponentRef::Type(old)) => {
                let own_base = matches!(
                    &session.components[new].base,
                    Some(Ref::Pending(name)) if *name == redefinition.name
                );
                if own_base {
                    session.components[new].base = Some(Ref::Resolved(old));
                } else {
                    session.error(
                        ErrorCode::SrcRedefine,
                        &redefinition.pos,
                        format!(
                            "src-redefine.5: the redefinition of '{}' must be derived from the type it redefines",
                            redefinition.name
                        ),
                    );
                    session.components[new].invalid = true;
                }
                session.components[old].redefined = true;
            }
            (ComponentRef::GroupDef(new), ComponentRef::GroupDef(old)) => {
                let mut self_refs = Vec::new();
                if let Some(group) = session.components[new].model_group {
                    let components = &session.components;
                    walk_particles(components, group, false, &mut |p| {
                        if let Term::GroupRef(Ref::Pending(name)) = &components[p].term {
                            if *name == redefinition.name {
                                self_refs.push(p);
                            }
                        }
                        true
                    });
                }
                if self_refs.len() > 1 {
                    session.error(
                        ErrorCode::SrcRedefine,
                        &redefinition.pos,
                        format!(
                            "src-redefine.6.1.1: the redefinition of group '{}' refers to itself more than once",
                            redefinition.name
                        ),
                    );
                }
                for p in self_refs {
                    let occurs = session.components[p].occurs;
                    if occurs.min != 1 || occurs.max != Some(1) {
                        let pos = session.components[p].pos.clone();
                        session.error(
                            ErrorCode::SrcRedefine,
                            &pos,
                            "src-redefine.6.1.2: the self-reference of a redefined group must have minOccurs and maxOccurs 1",
                        );
                    }
                    session.components[p].term = Term::GroupRef(Ref::Resolved(old));
                }
                session.components[old].redefined = true;
            }
            (ComponentRef::AttributeGroup(new), ComponentRef::AttributeGroup(old)) => {
                let name = &redefinition.name;
                let refs = &mut session.components[new].content.group_refs;
                let count = refs
                    .iter()
                    .filter(|(r, _)| matches!(r, Ref::Pending(n) if n == name))
                    .count();
                for (r, _) in refs.iter_mut() {
                    if matches!(r, Ref::Pending(n) if n == name) {
                        *r = Ref::Resolved(old);
                    }
                }
                if count > 1 {
                    session.error(
                        ErrorCode::SrcRedefine,
                        &redefinition.pos,
                        format!(
                            "src-redefine.7.1: the redefinition of attribute group '{}' refers to itself more than once",
                            redefinition.name
                        ),
                    );
                }
                session.components[old].redefined = true;
            }
            _ => {}
        }
    }
    session.redefinitions = redefinitions;
    Ok(())
}

/// Global of the same kind and name in the redefined document or the
/// documents it includes
fn find_original(session: &ConstructionSession, redefinition: &Redefinition) -> Option<ComponentRef> {
    let mut visited = HashSet::new();
    let mut stack = vec![redefinition.target];
    while let Some(bucket) = stack.pop() {
        if !visited.insert(bucket) {
            continue;
        }
        let b = session.bucket(bucket);
        let found = b
            .globals
            .iter()
            .copied()
            .find(|c| *c != redefinition.component && is_named(session, *c, redefinition.kind, &redefinition.name));
        if found.is_some() {
            return found;
        }
        stack.extend(
            b.relations
                .iter()
                .filter(|r| matches!(r.kind, RelationKind::Include | RelationKind::Redefine))
                .filter_map(|r| r.target)
                .filter(|t: &BucketId| !visited.contains(t)),
        );
    }
    None
}

fn is_named(session: &ConstructionSession, component: ComponentRef, kind: RedefineKind, name: &QName) -> bool {
    let c = &session.components;
    match (kind, component) {
        (RedefineKind::Type, ComponentRef::Type(t)) => c[t].name.as_ref() == Some(name) && !c[t].redefined,
        (RedefineKind::Group, ComponentRef::GroupDef(g)) => c[g].name == *name && !c[g].redefined,
        (RedefineKind::AttributeGroup, ComponentRef::AttributeGroup(g)) => {
            c[g].name == *name && !c[g].redefined
        }
        _ => false,
    }
}
