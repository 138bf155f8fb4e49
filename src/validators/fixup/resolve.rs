//! Registration and reference resolution
//!
//! Globals of every document go into the schema-wide maps first; then
//! every pending QName reference is looked up, document by document, with
//! the import visibility rule of the referencing document applied.

use std::collections::{BTreeSet, HashSet};

use crate::error::Result;
use crate::namespaces::QName;

use super::super::base::{BucketId, ComponentRef, ModelGroupId, ParticleId, Ref, SourcePos, TypeKind};
use super::super::builders::{visible_namespaces, ConstructionSession};
use super::super::exceptions::ErrorCode;
use super::super::globals::GlobalMaps;
use super::super::groups::{walk_particles, Compositor};
use super::super::particles::Term;

/// Register every global component under its expanded name
pub(super) fn register_globals(session: &mut ConstructionSession) -> Result<()> {
    for b in 0..session.buckets.len() {
        let globals = session.buckets[b].globals.clone();
        for component in globals {
            register(session, component);
        }
    }
    let idcs: Vec<_> = session
        .pending
        .iter()
        .filter_map(|c| match c {
            ComponentRef::Idc(i) => Some(*i),
            _ => None,
        })
        .collect();
    for id in idcs {
        let name = session.components[id].name.clone();
        if let Some(existing) = session.globals.add_identity(name.clone(), id) {
            let pos = session.components[id].pos.clone();
            let first = session.components[existing].pos.clone();
            duplicate(session, "identity constraint", &name, &pos, &first);
        }
    }
    Ok(())
}

fn register(session: &mut ConstructionSession, component: ComponentRef) {
    let c = &session.components;
    let (what, name, pos, existing) = match component {
        ComponentRef::Type(t) => {
            let ty = &c[t];
            let Some(name) = ty.name.clone() else {
                return;
            };
            if ty.redefined {
                return;
            }
            let pos = ty.pos.clone();
            let existing = session.globals.add_type(name.clone(), t).map(|e| c[e].pos.clone());
            ("type definition", name, pos, existing)
        }
        ComponentRef::Element(e) => {
            let name = c[e].name.clone();
            let pos = c[e].pos.clone();
            let existing = session.globals.add_element(name.clone(), e).map(|x| c[x].pos.clone());
            ("element declaration", name, pos, existing)
        }
        ComponentRef::Attribute(a) => {
            let name = c[a].name.clone();
            let pos = c[a].pos.clone();
            let existing = session
                .globals
                .add_attribute(name.clone(), a)
                .map(|x| c[x].pos.clone());
            ("attribute declaration", name, pos, existing)
        }
        ComponentRef::AttributeGroup(g) => {
            if c[g].redefined {
                return;
            }
            let name = c[g].name.clone();
            let pos = c[g].pos.clone();
            let existing = session
                .globals
                .add_attribute_group(name.clone(), g)
                .map(|x| c[x].pos.clone());
            ("attribute group", name, pos, existing)
        }
        ComponentRef::GroupDef(g) => {
            if c[g].redefined {
                return;
            }
            let name = c[g].name.clone();
            let pos = c[g].pos.clone();
            let existing = session.globals.add_group(name.clone(), g).map(|x| c[x].pos.clone());
            ("model group definition", name, pos, existing)
        }
        ComponentRef::Notation(n) => {
            let name = c[n].name.clone();
            let pos = c[n].pos.clone();
            let existing = session
                .globals
                .add_notation(name.clone(), n)
                .map(|x| c[x].pos.clone());
            ("notation declaration", name, pos, existing)
        }
        _ => return,
    };
    if let Some(first) = existing {
        duplicate(session, what, &name, &pos, &first);
    }
}

fn duplicate(session: &mut ConstructionSession, what: &str, name: &QName, pos: &SourcePos, first: &SourcePos) {
    let location = match (&first.file, first.line) {
        (Some(file), line) if line > 0 => format!(" (first defined at {}:{})", file, line),
        (None, line) if line > 0 => format!(" (first defined at line {})", line),
        _ => String::new(),
    };
    session.error(
        ErrorCode::SchPropsCorrect,
        pos,
        format!("a global {} '{}' is already defined{}", what, name, location),
    );
}

/// Per-document lookup context
struct Scope {
    visible: BTreeSet<Option<String>>,
}

impl Scope {
    fn new(session: &ConstructionSession, bucket: BucketId) -> Self {
        Self {
            visible: visible_namespaces(session.bucket(bucket)),
        }
    }

    /// New value for a pending reference; `None` leaves the slot untouched
    fn lookup<I: Copy>(
        &self,
        session: &mut ConstructionSession,
        reference: &Ref<I>,
        what: &str,
        pos: &SourcePos,
        find: impl Fn(&GlobalMaps, &QName) -> Option<I>,
    ) -> Option<Ref<I>> {
        let Ref::Pending(name) = reference else {
            return None;
        };
        if !self.visible.contains(&name.namespace) {
            session.error(
                ErrorCode::SrcResolveImport,
                pos,
                format!(
                    "the {} '{}' cannot be referenced: namespace '{}' is not imported by this document",
                    what,
                    name,
                    name.ns().unwrap_or("")
                ),
            );
            return Some(Ref::Missing(name.clone()));
        }
        match find(&session.globals, name) {
            Some(id) => Some(Ref::Resolved(id)),
            None => {
                session.error(
                    ErrorCode::SrcResolve,
                    pos,
                    format!("the QName '{}' does not resolve to a(n) {}", name, what),
                );
                Some(Ref::Missing(name.clone()))
            }
        }
    }
}

/// Replace every pending reference by a handle, or by a missing marker
pub(super) fn resolve_references(session: &mut ConstructionSession) -> Result<()> {
    for b in 0..session.buckets.len() {
        let bucket = BucketId(b as u32);
        let scope = Scope::new(session, bucket);
        let owned: Vec<ComponentRef> = {
            let bk = session.bucket(bucket);
            bk.globals.iter().chain(bk.locals.iter()).copied().collect()
        };
        for component in owned {
            resolve_component(session, &scope, component);
        }
    }
    Ok(())
}

fn resolve_component(session: &mut ConstructionSession, scope: &Scope, component: ComponentRef) {
    match component {
        ComponentRef::Type(t) => {
            let pos = session.components[t].pos.clone();
            if let Some(base) = session.components[t].base.clone() {
                if let Some(r) = scope.lookup(session, &base, "type definition", &pos, GlobalMaps::lookup_type) {
                    session.components[t].base = Some(r);
                }
            }
            let (item, members, group_refs, particle) = match &session.components[t].kind {
                TypeKind::Simple(st) => (st.item_type.clone(), st.member_types.clone(), Vec::new(), None),
                TypeKind::Complex(ct) => (None, Vec::new(), ct.attributes.group_refs.clone(), ct.explicit_particle),
            };
            if let Some(item) = item {
                if let Some(r) = scope.lookup(session, &item, "type definition", &pos, GlobalMaps::lookup_type) {
                    if let Some(st) = session.components[t].simple_mut() {
                        st.item_type = Some(r);
                    }
                }
            }
            for (i, member) in members.iter().enumerate() {
                if let Some(r) = scope.lookup(session, member, "type definition", &pos, GlobalMaps::lookup_type) {
                    if let Some(st) = session.components[t].simple_mut() {
                        st.member_types[i] = r;
                    }
                }
            }
            for (i, (group, group_pos)) in group_refs.iter().enumerate() {
                if let Some(r) =
                    scope.lookup(session, group, "attribute group", group_pos, GlobalMaps::lookup_attribute_group)
                {
                    if let Some(ct) = session.components[t].complex_mut() {
                        ct.attributes.group_refs[i].0 = r;
                    }
                }
            }
            if let Some(p) = particle {
                resolve_particle_tree(session, scope, p);
            }
        }
        ComponentRef::Element(e) => {
            let pos = session.components[e].pos.clone();
            if let Some(type_def) = session.components[e].type_def.clone() {
                if let Some(r) = scope.lookup(session, &type_def, "type definition", &pos, GlobalMaps::lookup_type) {
                    session.components[e].type_def = Some(r);
                }
            }
            if let Some(head) = session.components[e].substitution_head.clone() {
                if let Some(r) =
                    scope.lookup(session, &head, "element declaration", &pos, GlobalMaps::lookup_element)
                {
                    session.components[e].substitution_head = Some(r);
                }
            }
        }
        ComponentRef::Attribute(a) => {
            let pos = session.components[a].pos.clone();
            let type_def = session.components[a].type_def.clone();
            if let Some(r) = scope.lookup(session, &type_def, "type definition", &pos, GlobalMaps::lookup_type) {
                session.components[a].type_def = r;
            }
        }
        ComponentRef::AttributeUse(u) => {
            let pos = session.components[u].pos.clone();
            let decl = session.components[u].decl.clone();
            if let Some(r) =
                scope.lookup(session, &decl, "attribute declaration", &pos, GlobalMaps::lookup_attribute)
            {
                session.components[u].decl = r;
            }
        }
        ComponentRef::AttributeGroup(g) => {
            let group_refs = session.components[g].content.group_refs.clone();
            for (i, (group, group_pos)) in group_refs.iter().enumerate() {
                if let Some(r) =
                    scope.lookup(session, group, "attribute group", group_pos, GlobalMaps::lookup_attribute_group)
                {
                    session.components[g].content.group_refs[i].0 = r;
                }
            }
        }
        ComponentRef::GroupDef(g) => {
            if let Some(group) = session.components[g].model_group {
                for p in group_particles(session, group) {
                    resolve_particle(session, scope, p);
                }
            }
        }
        ComponentRef::Idc(i) => {
            let pos = session.components[i].pos.clone();
            if let Some(refer) = session.components[i].refer.clone() {
                if let Some(r) =
                    scope.lookup(session, &refer, "identity constraint", &pos, GlobalMaps::lookup_identity)
                {
                    session.components[i].refer = Some(r);
                }
            }
        }
        ComponentRef::ModelGroup(_)
        | ComponentRef::Particle(_)
        | ComponentRef::Wildcard(_)
        | ComponentRef::Notation(_) => {}
    }
}

fn group_particles(session: &ConstructionSession, group: ModelGroupId) -> Vec<ParticleId> {
    let mut particles = Vec::new();
    walk_particles(&session.components, group, false, &mut |p| {
        particles.push(p);
        true
    });
    particles
}

fn resolve_particle_tree(session: &mut ConstructionSession, scope: &Scope, root: ParticleId) {
    resolve_particle(session, scope, root);
    if let Term::Group(group) = session.components[root].term {
        for p in group_particles(session, group) {
            resolve_particle(session, scope, p);
        }
    }
}

fn resolve_particle(session: &mut ConstructionSession, scope: &Scope, p: ParticleId) {
    let pos = session.components[p].pos.clone();
    match session.components[p].term.clone() {
        Term::Element(r) => {
            if let Some(r) = scope.lookup(session, &r, "element declaration", &pos, GlobalMaps::lookup_element) {
                session.components[p].term = Term::Element(r);
            }
        }
        Term::GroupRef(r) => {
            if let Some(r) = scope.lookup(session, &r, "model group definition", &pos, GlobalMaps::lookup_group) {
                session.components[p].term = Term::GroupRef(r);
            }
        }
        Term::Wildcard(_) | Term::Group(_) => {}
    }
}

/// Replace resolved group references by the referenced model group and
/// enforce where `<all>` may appear
pub(super) fn substitute_group_refs(session: &mut ConstructionSession) -> Result<()> {
    let nested: HashSet<ParticleId> = session
        .components
        .model_groups
        .iter()
        .flat_map(|g| g.particles.iter().copied())
        .collect();

    for p in session.components.particle_ids().collect::<Vec<_>>() {
        let Term::GroupRef(Ref::Resolved(def)) = session.components[p].term else {
            continue;
        };
        let Some(group) = session.components[def].model_group else {
            continue;
        };
        if session.components[group].compositor == Compositor::All {
            let occurs = session.components[p].occurs;
            let pos = session.components[p].pos.clone();
            if nested.contains(&p) {
                session.error(
                    ErrorCode::CosAllLimited,
                    &pos,
                    format!(
                        "cos-all-limited.1.2: the group '{}' has an <all> model group and cannot be used inside another model group",
                        session.components[def].name
                    ),
                );
            } else if occurs.min > 1 || occurs.max != Some(1) {
                session.error(
                    ErrorCode::CosAllLimited,
                    &pos,
                    "cos-all-limited.1.2: a reference to an <all> group must have minOccurs 0 or 1 and maxOccurs 1",
                );
            }
        }
        session.components[p].term = Term::Group(group);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::namespaces::QName;
    use crate::validators::base::Ref;
    use crate::validators::exceptions::ErrorCode;
    use crate::validators::fixup::tests_support::{codes, construct};
    use crate::validators::particles::Term;

    #[test]
    fn test_references_resolve() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                targetNamespace="urn:t" xmlns:t="urn:t">
              <xs:element name="root" type="t:T"/>
              <xs:complexType name="T">
                <xs:sequence><xs:element ref="t:leaf"/></xs:sequence>
              </xs:complexType>
              <xs:element name="leaf" type="xs:string"/>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        let root = session.globals.lookup_element(&QName::namespaced("urn:t", "root")).unwrap();
        let t = session.globals.lookup_type(&QName::namespaced("urn:t", "T")).unwrap();
        assert_eq!(session.components[root].type_id(), Some(t));
    }

    #[test]
    fn test_unresolved_reference() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:element name="root" type="Missing"/>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::SrcResolve]);
        let root = session.globals.lookup_element(&QName::local("root")).unwrap();
        assert!(matches!(session.components[root].type_def, Some(Ref::Missing(_))));
    }

    #[test]
    fn test_reference_needs_import() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                targetNamespace="urn:t" xmlns:o="urn:other">
              <xs:element name="root" type="o:T"/>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::SrcResolveImport]);
    }

    #[test]
    fn test_import_makes_namespace_visible() {
        let other = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" targetNamespace="urn:other">
              <xs:simpleType name="T"><xs:restriction base="xs:string"/></xs:simpleType>
            </xs:schema>"#;
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                targetNamespace="urn:t" xmlns:o="urn:other">
              <xs:import namespace="urn:other" schemaLocation="other.xsd"/>
              <xs:element name="root" type="o:T"/>
            </xs:schema>"#,
            &[("other.xsd", other)],
        );
        assert_eq!(codes(&session), vec![]);
    }

    #[test]
    fn test_duplicate_globals() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:element name="a" type="xs:string"/>
              <xs:element name="a" type="xs:int"/>
              <xs:simpleType name="a"><xs:restriction base="xs:string"/></xs:simpleType>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::SchPropsCorrect]);
    }

    #[test]
    fn test_group_refs_are_substituted() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:group name="G">
                <xs:sequence><xs:element name="a"/></xs:sequence>
              </xs:group>
              <xs:complexType name="T">
                <xs:sequence><xs:group ref="G" maxOccurs="2"/></xs:sequence>
              </xs:complexType>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![]);
        assert!(session
            .components
            .particles
            .iter()
            .all(|p| !matches!(p.term, Term::GroupRef(_))));
    }

    #[test]
    fn test_all_group_nested_through_reference() {
        let session = construct(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:group name="G">
                <xs:all><xs:element name="a"/></xs:all>
              </xs:group>
              <xs:complexType name="Ok"><xs:group ref="G"/></xs:complexType>
              <xs:complexType name="Bad">
                <xs:sequence><xs:group ref="G"/></xs:sequence>
              </xs:complexType>
            </xs:schema>"#,
            &[],
        );
        assert_eq!(codes(&session), vec![ErrorCode::CosAllLimited]);
    }
}
