//! Simple type derivation checks
//!
//! Each simple type is completed after its base, item and member types:
//! it inherits variety, primitive and whiteSpace from its base, the
//! restriction rules for facets are enforced, and facet values are checked
//! against the base's value space.

use std::collections::BTreeSet;

use crate::error::Result;

use super::super::base::{DerivationMethod, TypeId};
use super::super::builders::ConstructionSession;
use super::super::builtins::{BuiltinType, LIST_FACETS, UNION_FACETS};
use super::super::exceptions::ErrorCode;
use super::super::facets::{Facet, FacetKind, WhiteSpace};
use super::super::simple_types::{validate_simple_value, Variety};
use super::super::values::{compare_values, ValueOrder};

pub(super) fn fixup_simple_types(session: &mut ConstructionSession) -> Result<()> {
    for id in session.components.type_ids().collect::<Vec<_>>() {
        if session.components[id].is_simple() {
            fixup_simple_type(session, id);
        }
    }
    Ok(())
}

/// Complete one simple type; its dependencies are completed first.
///
/// A restriction without a base is left alone: it is the simple content
/// placeholder of a complex type, which gets its base later.
pub(super) fn fixup_simple_type(session: &mut ConstructionSession, id: TypeId) {
    let ty = &session.components[id];
    let Some(st) = ty.simple() else {
        return;
    };
    if st.checked {
        return;
    }
    if ty.base.is_none() && !ty.invalid {
        return;
    }
    let derivation = ty.derivation;
    let invalid = ty.invalid;
    if let Some(st) = session.components[id].simple_mut() {
        st.checked = true;
    }
    if invalid {
        return;
    }

    let ok = match derivation {
        DerivationMethod::List => fixup_list(session, id),
        DerivationMethod::Union => fixup_union(session, id),
        _ => fixup_restriction(session, id),
    };
    if !ok {
        session.components[id].invalid = true;
    }
}

fn type_error(session: &mut ConstructionSession, id: TypeId, code: ErrorCode, message: String) {
    let pos = session.components[id].pos.clone();
    session.error(code, &pos, message);
}

fn fixup_list(session: &mut ConstructionSession, id: TypeId) -> bool {
    let item = session.components[id]
        .simple()
        .and_then(|st| st.item_type.as_ref())
        .and_then(|r| r.resolved());
    let Some(item) = item else {
        return false;
    };
    fixup_simple_type(session, item);

    let item_ty = &session.components[item];
    let name = item_ty.display_name();
    let problem = match item_ty.simple() {
        None => Some(format!("cos-st-restricts.2.1: the item type {} is not a simple type", name)),
        Some(_) if item_ty.invalid => return false,
        Some(st) if st.variety == Variety::List => Some(format!(
            "cos-st-restricts.2.1: the item type {} is itself a list type",
            name
        )),
        Some(st) if st.variety == Variety::Absent => Some(format!(
            "cos-st-restricts.2.1: the item type {} is not atomic or a union",
            name
        )),
        Some(_) if item_ty.final_.list => Some(format!(
            "cos-st-restricts.2.1: the item type {} does not allow derivation by list",
            name
        )),
        Some(_) => None,
    };
    if let Some(message) = problem {
        type_error(session, id, ErrorCode::CosStRestricts, message);
        return false;
    }
    if let Some(st) = session.components[id].simple_mut() {
        st.variety = Variety::List;
        st.white_space = WhiteSpace::Collapse;
    }
    true
}

fn fixup_union(session: &mut ConstructionSession, id: TypeId) -> bool {
    let members: Vec<TypeId> = session.components[id]
        .simple()
        .map(|st| st.member_types.iter().filter_map(|r| r.resolved()).collect())
        .unwrap_or_default();
    let mut ok = !members.is_empty();
    for member in members {
        fixup_simple_type(session, member);
        let member_ty = &session.components[member];
        let name = member_ty.display_name();
        let member_invalid = member_ty.invalid;
        let problem = if !member_ty.is_simple() {
            Some(format!("cos-st-restricts.3.1: the member type {} is not a simple type", name))
        } else if member_ty.final_.union {
            Some(format!(
                "cos-st-restricts.3.1: the member type {} does not allow derivation by union",
                name
            ))
        } else {
            None
        };
        if let Some(message) = problem {
            type_error(session, id, ErrorCode::CosStRestricts, message);
            ok = false;
        } else if member_invalid {
            ok = false;
        }
    }
    if let Some(st) = session.components[id].simple_mut() {
        st.variety = Variety::Union;
    }
    ok
}

fn fixup_restriction(session: &mut ConstructionSession, id: TypeId) -> bool {
    let Some(base) = session.components[id].base_id() else {
        // unresolved base, already reported
        return false;
    };
    fixup_simple_type(session, base);

    let base_ty = &session.components[base];
    let base_name = base_ty.display_name();
    let base_builtin = base_ty.builtin;
    let base_invalid = base_ty.invalid;
    let base_final = base_ty.final_;
    let Some((variety, primitive, base_white_space)) =
        base_ty.simple().map(|st| (st.variety, st.primitive, st.white_space))
    else {
        type_error(
            session,
            id,
            ErrorCode::StPropsCorrect,
            format!("st-props-correct.1: the base type {} is not a simple type", base_name),
        );
        return false;
    };
    if base_builtin == Some(BuiltinType::AnySimpleType) {
        type_error(
            session,
            id,
            ErrorCode::StPropsCorrect,
            "st-props-correct.1: a simple type must not restrict anySimpleType directly".to_string(),
        );
        return false;
    }
    if base_invalid {
        return false;
    }
    if base_final.restriction {
        type_error(
            session,
            id,
            ErrorCode::StPropsCorrect,
            format!(
                "st-props-correct.3: the base type {} does not allow derivation by restriction",
                base_name
            ),
        );
        return false;
    }

    let admitted: &[FacetKind] = match variety {
        Variety::List => LIST_FACETS,
        Variety::Union => UNION_FACETS,
        _ => primitive.map(|p| p.admitted_facets()).unwrap_or(&[]),
    };

    let mut facets = session.components[id]
        .simple_mut()
        .map(|st| std::mem::take(&mut st.facets))
        .unwrap_or_default();
    let mut ok = true;
    facets.retain(|facet| {
        if admitted.contains(&facet.kind) {
            return true;
        }
        session.error(
            ErrorCode::CosApplicableFacets,
            &facet.pos,
            format!("cos-applicable-facets: the facet '{}' is not allowed on {}", facet.kind, base_name),
        );
        ok = false;
        false
    });
    // bounds are read in the nearest built-in type first, so that loosening a
    // user-defined bound is reported as such
    let value_space = match variety {
        Variety::Atomic => primitive.map(TypeId::builtin).unwrap_or(base),
        _ => base,
    };
    parse_facet_values(session, value_space, base, &mut facets);

    let mut white_space = base_white_space;
    if let Some(facet) = facets.iter().find(|f| f.kind == FacetKind::WhiteSpace) {
        if let Some(ws) = facet.white_space {
            if ws < base_white_space {
                session.error(
                    ErrorCode::StRestrictFacets,
                    &facet.pos,
                    format!(
                        "whiteSpace '{}' is weaker than the base type's '{}'",
                        ws.as_str(),
                        base_white_space.as_str()
                    ),
                );
                ok = false;
            } else {
                white_space = ws;
            }
        }
    }
    let loosened = check_restricted_facets(session, base, &facets);
    ok &= loosened.is_empty();
    ok &= check_bounds_in_base(session, base, &mut facets, &loosened);

    if let Some(st) = session.components[id].simple_mut() {
        st.variety = variety;
        st.primitive = primitive;
        st.white_space = white_space;
        st.facets = facets;
    }
    ok
}

/// Parse bound values in `value_space` and enumeration values in `base`;
/// facets with an invalid value are reported and dropped
fn parse_facet_values(session: &mut ConstructionSession, value_space: TypeId, base: TypeId, facets: &mut Vec<Facet>) {
    let mut i = 0;
    while i < facets.len() {
        let facet = &facets[i];
        let parse_in = match facet.kind {
            FacetKind::Enumeration => base,
            k if k.is_bound() => value_space,
            _ => {
                i += 1;
                continue;
            }
        };
        match validate_simple_value(&session.components, parse_in, &facet.lexical, Some(&facet.namespaces)) {
            Ok(value) => {
                facets[i].value = Some(value);
                i += 1;
            }
            Err(issue) => {
                let facet = facets.remove(i);
                session.error(
                    ErrorCode::FacetValue,
                    &facet.pos,
                    format!(
                        "the value '{}' of the {} facet is not valid for the base type: {}",
                        facet.lexical, facet.kind, issue
                    ),
                );
            }
        }
    }
}

/// Bound values must also be valid in the base type itself; bounds already
/// reported as loosened are not reported twice
fn check_bounds_in_base(
    session: &mut ConstructionSession,
    base: TypeId,
    facets: &mut Vec<Facet>,
    loosened: &BTreeSet<FacetKind>,
) -> bool {
    let mut ok = true;
    let mut i = 0;
    while i < facets.len() {
        let facet = &facets[i];
        if !facet.kind.is_bound() || loosened.contains(&facet.kind) {
            i += 1;
            continue;
        }
        match validate_simple_value(&session.components, base, &facet.lexical, Some(&facet.namespaces)) {
            Ok(_) => i += 1,
            Err(issue) => {
                let facet = facets.remove(i);
                session.error(
                    ErrorCode::FacetValue,
                    &facet.pos,
                    format!(
                        "the value '{}' of the {} facet is not valid for the base type: {}",
                        facet.lexical, facet.kind, issue
                    ),
                );
                ok = false;
            }
        }
    }
    ok
}

/// Nearest facet of `kind` on the restriction chain starting at `start`
fn inherited_facet(session: &ConstructionSession, start: TypeId, kind: FacetKind) -> Option<Facet> {
    for t in session.components.base_chain(start) {
        let ty = &session.components[t];
        if ty.builtin.is_some() || ty.derivation != DerivationMethod::Restriction {
            return None;
        }
        if let Some(facet) = ty.simple().and_then(|st| st.facet(kind)) {
            return Some(facet.clone());
        }
    }
    None
}

/// Order of two bound facets; `None` when either has no value or they
/// cannot be compared
fn bound_order(a: &Facet, b: &Facet) -> Option<ValueOrder> {
    match compare_values(a.value.as_ref()?, b.value.as_ref()?) {
        ValueOrder::Incomparable => None,
        order => Some(order),
    }
}

/// Check that the facets restrict those of the base and agree with the
/// other facets in effect. Returns the kinds that were reported.
fn check_restricted_facets(session: &mut ConstructionSession, base: TypeId, facets: &[Facet]) -> BTreeSet<FacetKind> {
    use FacetKind::*;

    let own = |kind: FacetKind| facets.iter().find(|f| f.kind == kind);
    let mut problems: Vec<(Facet, String)> = Vec::new();

    for (a, b) in [(MaxInclusive, MaxExclusive), (MinInclusive, MinExclusive)] {
        if let (Some(_), Some(f)) = (own(a), own(b)) {
            problems.push((f.clone(), format!("{} and {} must not both be specified", a, b)));
        }
    }
    if let Some(f) = own(Length) {
        if own(MinLength).is_some() || own(MaxLength).is_some() {
            problems.push((f.clone(), "length must not be combined with minLength or maxLength".into()));
        }
    }

    // effective facets: own if present, else inherited
    let effective = |kind: FacetKind| own(kind).cloned().or_else(|| inherited_facet(session, base, kind));

    if let (Some(min), Some(max)) = (effective(MinLength), effective(MaxLength)) {
        if min.count > max.count && (own(MinLength).is_some() || own(MaxLength).is_some()) {
            problems.push((min, "minLength is greater than maxLength".into()));
        }
    }
    if let (Some(fraction), Some(total)) = (effective(FractionDigits), effective(TotalDigits)) {
        if fraction.count > total.count && (own(FractionDigits).is_some() || own(TotalDigits).is_some()) {
            problems.push((fraction, "fractionDigits is greater than totalDigits".into()));
        }
    }
    for (lower, upper, strict) in [
        (MinInclusive, MaxInclusive, false),
        (MinInclusive, MaxExclusive, true),
        (MinExclusive, MaxInclusive, true),
        (MinExclusive, MaxExclusive, true),
    ] {
        if own(lower).is_none() && own(upper).is_none() {
            continue;
        }
        let (Some(l), Some(u)) = (effective(lower), effective(upper)) else {
            continue;
        };
        let bad = match bound_order(&l, &u) {
            Some(ValueOrder::Greater) => true,
            Some(ValueOrder::Equal) => strict,
            _ => false,
        };
        if bad {
            let relation = if strict { "less than" } else { "less than or equal to" };
            problems.push((l, format!("{} must be {} {}", lower, relation, upper)));
        }
    }

    for facet in facets {
        let kind = facet.kind;
        if matches!(kind, Pattern | Enumeration) {
            continue;
        }
        let Some(inherited) = inherited_facet(session, base, kind) else {
            continue;
        };
        if inherited.fixed && inherited.lexical.trim() != facet.lexical.trim() {
            let differs = if kind.is_count() {
                inherited.count != facet.count
            } else if kind.is_bound() {
                bound_order(&inherited, facet) != Some(ValueOrder::Equal)
            } else {
                inherited.white_space != facet.white_space
            };
            if differs {
                problems.push((facet.clone(), format!("the base type fixes {} to '{}'", kind, inherited.lexical)));
                continue;
            }
        }
        let widened = match kind {
            Length => facet.count != inherited.count,
            MinLength => facet.count < inherited.count,
            MaxLength | TotalDigits | FractionDigits => facet.count > inherited.count,
            MaxInclusive | MaxExclusive => bound_order(facet, &inherited) == Some(ValueOrder::Greater),
            MinInclusive | MinExclusive => bound_order(facet, &inherited) == Some(ValueOrder::Less),
            _ => false,
        };
        if widened {
            problems.push((
                facet.clone(),
                format!("{} '{}' is not a restriction of the base value '{}'", kind, facet.lexical, inherited.lexical),
            ));
        }
    }
    // a bound must stay inside the bound of the other kind on the same side
    for (own_kind, base_kind, allowed) in [
        (MaxInclusive, MaxExclusive, &[ValueOrder::Less][..]),
        (MinInclusive, MinExclusive, &[ValueOrder::Greater][..]),
        (MaxExclusive, MaxInclusive, &[ValueOrder::Less, ValueOrder::Equal][..]),
        (MinExclusive, MinInclusive, &[ValueOrder::Greater, ValueOrder::Equal][..]),
    ] {
        if let (Some(f), Some(b)) = (own(own_kind), inherited_facet(session, base, base_kind)) {
            if let Some(order) = bound_order(f, &b) {
                if !allowed.contains(&order) {
                    problems.push((f.clone(), format!("{} must lie within the base {} '{}'", own_kind, base_kind, b.lexical)));
                }
            }
        }
    }

    let reported = problems.iter().map(|(f, _)| f.kind).collect();
    for (facet, message) in problems {
        session.error(ErrorCode::StRestrictFacets, &facet.pos, format!("st-restrict-facets: {}", message));
    }
    reported
}
