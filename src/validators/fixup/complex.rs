//! Complex type fixup
//!
//! Computes the {content type}, {attribute uses} and {attribute wildcard}
//! of every complex type, base types first, and checks the extension and
//! restriction constraints between a type and its base.

use crate::error::Result;

use super::super::attributes::{find_use, use_name, AttributeUse, Prohibition};
use super::super::base::{
    AttributeUseId, DerivationMethod, DerivationSet, ParticleId, Ref, SourcePos, TypeId, WildcardId,
};
use super::super::builders::ConstructionSession;
use super::super::builtins::BuiltinType;
use super::super::complex_types::{ContentSource, ContentType};
use super::super::exceptions::ErrorCode;
use super::super::groups::{Compositor, ModelGroup};
use super::super::particles::{is_particle_emptiable, Occurs, Particle, Term};
use super::attributes::{check_single_id, expand_container, pointless};
use super::simple::fixup_simple_type;

pub(super) fn fixup_complex_types(session: &mut ConstructionSession) -> Result<()> {
    for id in session.components.type_ids().collect::<Vec<_>>() {
        fixup_complex_type(session, id);
    }
    Ok(())
}

/// What a type derives from, captured before the derived type is changed
struct BaseInfo {
    id: TypeId,
    name: String,
    simple: bool,
    any_type: bool,
    final_: DerivationSet,
    content_type: ContentType,
    particle: Option<ParticleId>,
    simple_type: Option<TypeId>,
    attribute_uses: Vec<AttributeUseId>,
    attribute_wildcard: Option<WildcardId>,
    invalid: bool,
}

fn base_info(session: &ConstructionSession, base: TypeId) -> BaseInfo {
    let ty = &session.components[base];
    let mut info = BaseInfo {
        id: base,
        name: ty.display_name(),
        simple: ty.is_simple(),
        any_type: ty.builtin == Some(BuiltinType::AnyType),
        final_: ty.final_,
        content_type: ContentType::Simple,
        particle: None,
        simple_type: None,
        attribute_uses: Vec::new(),
        attribute_wildcard: None,
        invalid: ty.invalid,
    };
    if let Some(ct) = ty.complex() {
        info.content_type = ct.content_type;
        info.particle = ct.content_particle;
        info.simple_type = ct.simple_type;
        info.attribute_uses = ct.attribute_uses.clone();
        info.attribute_wildcard = ct.attribute_wildcard;
    }
    info
}

fn fixup_complex_type(session: &mut ConstructionSession, id: TypeId) {
    let ty = &session.components[id];
    match ty.complex() {
        Some(ct) if !ct.resolved => {}
        _ => return,
    }
    let base = ty.base_id().filter(|b| *b != id);
    let derivation = ty.derivation;
    let mut ok = !ty.invalid;
    if let Some(ct) = session.components[id].complex_mut() {
        ct.resolved = true;
    }
    if let Some(base) = base {
        fixup_complex_type(session, base);
    }

    let Some(base) = base.map(|b| base_info(session, b)) else {
        own_content_only(session, id);
        fixup_attributes(session, id, None, derivation);
        session.components[id].invalid = true;
        return;
    };
    if !ok || base.invalid {
        own_content_only(session, id);
        fixup_attributes(session, id, None, derivation);
        session.components[id].invalid = true;
        return;
    }

    let pos = session.components[id].pos.clone();
    let name = session.components[id].display_name();
    match derivation {
        DerivationMethod::Extension if base.final_.extension => {
            session.error(
                ErrorCode::CosCtExtends,
                &pos,
                format!("cos-ct-extends.1.1: the base type {} of {} does not allow extension", base.name, name),
            );
            ok = false;
        }
        DerivationMethod::Restriction if base.final_.restriction => {
            session.error(
                ErrorCode::DerivationOkRestriction,
                &pos,
                format!(
                    "derivation-ok-restriction.1: the base type {} of {} does not allow restriction",
                    base.name, name
                ),
            );
            ok = false;
        }
        _ => {}
    }

    let source = session.components[id]
        .complex()
        .map(|ct| ct.content_source)
        .unwrap_or_default();
    ok &= match source {
        ContentSource::SimpleContent => simple_content(session, id, &base, derivation, &pos),
        _ => complex_content(session, id, &base, derivation, &pos),
    };
    ok &= fixup_attributes(session, id, Some(&base), derivation);
    if !ok {
        session.components[id].invalid = true;
    }
}

/// Content of a particle as it counts for the content type: `None` when it
/// cannot match anything but the empty sequence
fn effective_particle(session: &ConstructionSession, particle: Option<ParticleId>) -> Option<ParticleId> {
    let id = particle?;
    let p = &session.components[id];
    if p.occurs.max == Some(0) {
        return None;
    }
    match &p.term {
        Term::Group(g) => {
            let group = &session.components[*g];
            let empty = group.particles.is_empty() && (group.compositor != Compositor::Choice || p.occurs.min == 0);
            (!empty).then_some(id)
        }
        Term::GroupRef(r) => r.resolved().and(Some(id)),
        _ => Some(id),
    }
}

/// Particle matching only the empty sequence, used for mixed empty content
fn empty_sequence(session: &mut ConstructionSession, pos: &SourcePos) -> ParticleId {
    let group = session
        .components
        .add_model_group(ModelGroup::new(Compositor::Sequence, pos.clone()));
    session
        .components
        .add_particle(Particle::new(Occurs::once(), Term::Group(group), pos.clone()))
}

fn is_all(session: &ConstructionSession, particle: ParticleId) -> bool {
    match session.components[particle].term {
        Term::Group(g) => session.components[g].compositor == Compositor::All,
        _ => false,
    }
}

fn set_content(session: &mut ConstructionSession, id: TypeId, content_type: ContentType, particle: Option<ParticleId>) {
    if let Some(ct) = session.components[id].complex_mut() {
        ct.content_type = content_type;
        ct.content_particle = particle;
    }
}

/// Content from the type's own particle and mixed flag
fn own_content(session: &mut ConstructionSession, id: TypeId, pos: &SourcePos) {
    let Some((explicit, mixed)) = session.components[id]
        .complex()
        .map(|ct| (ct.explicit_particle, ct.mixed))
    else {
        return;
    };
    match (effective_particle(session, explicit), mixed) {
        (Some(p), true) => set_content(session, id, ContentType::Mixed, Some(p)),
        (Some(p), false) => set_content(session, id, ContentType::ElementOnly, Some(p)),
        (None, true) => {
            let empty = empty_sequence(session, pos);
            set_content(session, id, ContentType::Mixed, Some(empty));
        }
        (None, false) => set_content(session, id, ContentType::Empty, None),
    }
}

fn own_content_only(session: &mut ConstructionSession, id: TypeId) {
    let pos = session.components[id].pos.clone();
    let simple = session.components[id]
        .complex()
        .map_or(false, |ct| ct.content_source == ContentSource::SimpleContent);
    if simple {
        set_content(session, id, ContentType::Simple, None);
    } else {
        own_content(session, id, &pos);
    }
}

fn complex_content(
    session: &mut ConstructionSession,
    id: TypeId,
    base: &BaseInfo,
    derivation: DerivationMethod,
    pos: &SourcePos,
) -> bool {
    if base.simple {
        session.error(
            ErrorCode::SrcCt,
            pos,
            format!("src-ct.1: the base type {} of complex content is a simple type", base.name),
        );
        own_content(session, id, pos);
        return false;
    }
    let Some((explicit, mixed)) = session.components[id]
        .complex()
        .map(|ct| (ct.explicit_particle, ct.mixed))
    else {
        return false;
    };
    let own = effective_particle(session, explicit);

    if derivation == DerivationMethod::Extension && !base.any_type {
        return extend_content(session, id, base, own, mixed, pos);
    }
    own_content(session, id, pos);
    if derivation == DerivationMethod::Extension || base.any_type {
        return true;
    }

    // restriction of a complex type other than anyType
    let content_type = session.components[id]
        .complex()
        .map(|ct| ct.content_type)
        .unwrap_or_default();
    let problem = match (content_type, base.content_type) {
        (_, ContentType::Simple) if content_type != ContentType::Empty => Some(format!(
            "derivation-ok-restriction.5.1: the base type {} has simple content",
            base.name
        )),
        (ContentType::Mixed, ContentType::ElementOnly | ContentType::Empty) => Some(format!(
            "derivation-ok-restriction.5.4.1.2: mixed content cannot restrict the {} content of {}",
            base.content_type, base.name
        )),
        (ContentType::ElementOnly, ContentType::Empty) => Some(format!(
            "derivation-ok-restriction.5.4.1.2: element content cannot restrict the empty content of {}",
            base.name
        )),
        (ContentType::Empty, ContentType::ElementOnly | ContentType::Mixed)
            if !base
                .particle
                .map_or(true, |p| is_particle_emptiable(&session.components, &session.components[p])) =>
        {
            Some(format!(
                "derivation-ok-restriction.5.2: empty content requires the content of {} to be emptiable",
                base.name
            ))
        }
        _ => None,
    };
    match problem {
        Some(message) => {
            session.error(ErrorCode::DerivationOkRestriction, pos, message);
            false
        }
        None => true,
    }
}

fn extend_content(
    session: &mut ConstructionSession,
    id: TypeId,
    base: &BaseInfo,
    own: Option<ParticleId>,
    mixed: bool,
    pos: &SourcePos,
) -> bool {
    match (base.content_type, own) {
        (ContentType::Simple, None) => {
            if let Some(ct) = session.components[id].complex_mut() {
                ct.content_type = ContentType::Simple;
                ct.simple_type = base.simple_type;
            }
            true
        }
        (ContentType::Simple, Some(_)) => {
            session.error(
                ErrorCode::CosCtExtends,
                pos,
                format!(
                    "cos-ct-extends.1.4: the base type {} has simple content and cannot be extended with elements",
                    base.name
                ),
            );
            own_content(session, id, pos);
            false
        }
        (ContentType::Empty, _) => {
            own_content(session, id, pos);
            true
        }
        (base_type, None) => {
            if mixed && base_type == ContentType::ElementOnly {
                session.error(
                    ErrorCode::CosCtExtends,
                    pos,
                    format!(
                        "cos-ct-extends.1.4.3.2.2.1: mixed content cannot extend the element-only content of {}",
                        base.name
                    ),
                );
                set_content(session, id, base_type, base.particle);
                return false;
            }
            set_content(session, id, base_type, base.particle);
            true
        }
        (base_type, Some(own)) => {
            let mut ok = true;
            let base_mixed = base_type == ContentType::Mixed;
            if mixed != base_mixed {
                session.error(
                    ErrorCode::CosCtExtends,
                    pos,
                    format!(
                        "cos-ct-extends.1.4.3.2.2.1: the content of {} and of its extension must both be mixed or both element-only",
                        base.name
                    ),
                );
                ok = false;
            }
            let Some(base_particle) = base.particle else {
                own_content(session, id, pos);
                return ok;
            };
            if is_all(session, base_particle) || is_all(session, own) {
                session.error(
                    ErrorCode::CosAllLimited,
                    pos,
                    "cos-all-limited.1.2: an 'all' model group cannot be combined with other particles by extension",
                );
                ok = false;
            }
            let mut group = ModelGroup::new(Compositor::Sequence, pos.clone());
            group.particles = vec![base_particle, own];
            let group = session.components.add_model_group(group);
            let wrapper = session
                .components
                .add_particle(Particle::new(Occurs::once(), Term::Group(group), pos.clone()));
            let content_type = if mixed {
                ContentType::Mixed
            } else {
                ContentType::ElementOnly
            };
            set_content(session, id, content_type, Some(wrapper));
            ok
        }
    }
}

fn simple_content(
    session: &mut ConstructionSession,
    id: TypeId,
    base: &BaseInfo,
    derivation: DerivationMethod,
    pos: &SourcePos,
) -> bool {
    set_content(session, id, ContentType::Simple, None);
    let set_simple_type = |session: &mut ConstructionSession, st: Option<TypeId>| {
        if let Some(ct) = session.components[id].complex_mut() {
            ct.simple_type = st;
        }
    };

    if derivation == DerivationMethod::Extension {
        let content = if base.simple {
            Some(base.id)
        } else if base.content_type == ContentType::Simple {
            base.simple_type
        } else {
            session.error(
                ErrorCode::SrcCt,
                pos,
                format!(
                    "src-ct.2: the base type {} of a simple content extension must be a simple type or have simple content",
                    base.name
                ),
            );
            return false;
        };
        set_simple_type(session, content);
        return true;
    }

    let mixed_emptiable = base.content_type == ContentType::Mixed
        && base
            .particle
            .map_or(true, |p| is_particle_emptiable(&session.components, &session.components[p]));
    if base.simple || !(base.content_type == ContentType::Simple || mixed_emptiable) {
        session.error(
            ErrorCode::SrcCt,
            pos,
            format!(
                "src-ct.2: the base type {} of a simple content restriction must have simple or emptiable mixed content",
                base.name
            ),
        );
        return false;
    }

    let restriction = session.components[id].complex().and_then(|ct| ct.simple_restriction);
    let Some(restriction) = restriction else {
        if base.simple_type.is_none() {
            session.error(
                ErrorCode::SrcCt,
                pos,
                format!("src-ct.2: restricting the mixed content of {} needs a simple type", base.name),
            );
            return false;
        }
        set_simple_type(session, base.simple_type);
        return true;
    };

    match (session.components[restriction].base_id(), base.simple_type) {
        (None, Some(content)) => {
            session.components[restriction].base = Some(Ref::Resolved(content));
            fixup_simple_type(session, restriction);
        }
        (None, None) => {
            session.error(
                ErrorCode::SrcCt,
                pos,
                format!("src-ct.2: restricting the mixed content of {} needs a simple type", base.name),
            );
            return false;
        }
        (Some(anonymous), Some(content)) => {
            if !session
                .components
                .is_validly_derived(anonymous, content, DerivationSet::empty())
            {
                let content_name = session.components[content].display_name();
                session.error(
                    ErrorCode::DerivationOkRestriction,
                    pos,
                    format!(
                        "derivation-ok-restriction.5.1.2: the simple type is not derived from the content type {}",
                        content_name
                    ),
                );
                return false;
            }
        }
        (Some(_), None) => {}
    }
    set_simple_type(session, Some(restriction));
    !session.components[restriction].invalid
}

fn decl_type(session: &ConstructionSession, attribute_use: &AttributeUse) -> Option<TypeId> {
    let decl = attribute_use.decl.resolved()?;
    session.components[decl].type_id()
}

/// Compute {attribute uses} and {attribute wildcard}
fn fixup_attributes(
    session: &mut ConstructionSession,
    id: TypeId,
    base: Option<&BaseInfo>,
    derivation: DerivationMethod,
) -> bool {
    let Some(container) = session.components[id].complex().map(|ct| ct.attributes.clone()) else {
        return false;
    };
    let pos = session.components[id].pos.clone();
    let own = expand_container(session, &container, ErrorCode::CtPropsCorrect, true);
    let mut ok = true;

    // anyType contributes nothing: its restrictions start from scratch and
    // its extensions keep only their own attributes
    let inherited = base.filter(|b| !b.any_type && !b.simple);
    let (uses, wildcard) = match (inherited, derivation) {
        (None, _) => {
            for prohibition in &own.unmatched {
                pointless(session, prohibition, "the base type has no such attribute");
            }
            (own.uses, own.wildcard)
        }
        (Some(base), DerivationMethod::Extension) => {
            for prohibition in &own.unmatched {
                pointless(session, prohibition, "prohibitions have no effect in an extension");
            }
            let mut uses = base.attribute_uses.clone();
            for u in own.uses {
                let name = use_name(&session.components, u).cloned();
                let clash = name
                    .as_ref()
                    .and_then(|n| find_use(&session.components, &base.attribute_uses, n));
                match clash {
                    Some(_) => {
                        let upos = session.components[u].pos.clone();
                        session.error(
                            ErrorCode::CtPropsCorrect,
                            &upos,
                            format!(
                                "ct-props-correct.4: the attribute '{}' is already declared by the base type {}",
                                name.map(|n| n.to_string()).unwrap_or_default(),
                                base.name
                            ),
                        );
                        ok = false;
                    }
                    None => uses.push(u),
                }
            }
            let wildcard = match (own.wildcard, base.attribute_wildcard) {
                (Some(a), Some(b)) if a != b => match session.components[a].union(&session.components[b]) {
                    Some(union) => Some(session.components.add_wildcard(union)),
                    None => {
                        session.error(
                            ErrorCode::CosAwUnion,
                            &pos,
                            "cos-aw-union: the union of the attribute wildcards is not expressible",
                        );
                        ok = false;
                        None
                    }
                },
                (a, b) => a.or(b),
            };
            (uses, wildcard)
        }
        (Some(base), _) => {
            let (uses, restricted) = restrict_attributes(session, base, own.uses, &own.unmatched);
            ok &= restricted;
            if let Some(w) = own.wildcard {
                let allowed = base
                    .attribute_wildcard
                    .map_or(false, |b| session.components[w].is_restriction_of(&session.components[b]));
                if !allowed {
                    let wpos = session.components[w].pos.clone();
                    session.error(
                        ErrorCode::DerivationOkRestriction,
                        &wpos,
                        format!(
                            "derivation-ok-restriction.4: the attribute wildcard is not a subset of the wildcard of {}",
                            base.name
                        ),
                    );
                    ok = false;
                }
            }
            (uses, own.wildcard)
        }
    };

    check_single_id(session, &uses, ErrorCode::CtPropsCorrect, &pos);
    if let Some(ct) = session.components[id].complex_mut() {
        ct.attribute_uses = uses;
        ct.attribute_wildcard = wildcard;
    }
    ok
}

/// Own uses checked against the base uses, plus the base uses that are
/// neither overridden nor prohibited. Prohibiting a required base use is
/// accepted.
fn restrict_attributes(
    session: &mut ConstructionSession,
    base: &BaseInfo,
    own: Vec<AttributeUseId>,
    prohibitions: &[Prohibition],
) -> (Vec<AttributeUseId>, bool) {
    let mut ok = true;
    let mut problems: Vec<(SourcePos, String)> = Vec::new();

    for &u in &own {
        let Some(name) = use_name(&session.components, u).cloned() else {
            continue;
        };
        let derived = &session.components[u];
        match find_use(&session.components, &base.attribute_uses, &name) {
            Some(b) => {
                let base_use = &session.components[b];
                if base_use.required && !derived.required {
                    problems.push((
                        derived.pos.clone(),
                        format!("derivation-ok-restriction.3: the attribute '{}' must stay required", name),
                    ));
                }
                if let (Some(dt), Some(bt)) = (decl_type(session, derived), decl_type(session, base_use)) {
                    if !session.components.is_validly_derived(dt, bt, DerivationSet::empty()) {
                        problems.push((
                            derived.pos.clone(),
                            format!(
                                "derivation-ok-restriction.2.1.2: the type of attribute '{}' is not derived from its type in {}",
                                name, base.name
                            ),
                        ));
                    }
                }
                if let Some(fixed) = base_use.effective_constraint(&session.components).filter(|c| c.is_fixed()) {
                    let kept = derived
                        .effective_constraint(&session.components)
                        .map_or(false, |c| c.is_fixed() && c.lexical.trim() == fixed.lexical.trim());
                    if !kept {
                        problems.push((
                            derived.pos.clone(),
                            format!(
                                "derivation-ok-restriction.2.1.3: the attribute '{}' must keep the fixed value '{}'",
                                name, fixed.lexical
                            ),
                        ));
                    }
                }
            }
            None => {
                let allowed = base
                    .attribute_wildcard
                    .map_or(false, |w| session.components[w].allows(name.ns()));
                if !allowed {
                    problems.push((
                        derived.pos.clone(),
                        format!(
                            "derivation-ok-restriction.2.2: the attribute '{}' is neither declared nor allowed by a wildcard in {}",
                            name, base.name
                        ),
                    ));
                }
            }
        }
    }

    let mut uses = own;
    let mut used = vec![false; prohibitions.len()];
    for &b in &base.attribute_uses {
        let Some(name) = use_name(&session.components, b) else {
            continue;
        };
        if find_use(&session.components, &uses, name).is_some() {
            continue;
        }
        if let Some(i) = prohibitions.iter().position(|p| &p.name == name) {
            used[i] = true;
            continue;
        }
        uses.push(b);
    }
    for (prohibition, used) in prohibitions.iter().zip(used) {
        if !used {
            pointless(session, prohibition, "the base type has no such attribute");
        }
    }
    for (pos, message) in problems {
        session.error(ErrorCode::DerivationOkRestriction, &pos, message);
        ok = false;
    }
    (uses, ok)
}
