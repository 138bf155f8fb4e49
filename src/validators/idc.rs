//! Identity-constraint evaluation
//!
//! The IDC engine runs alongside the validation engine and receives the same
//! element events in document order. Entering an element whose declaration
//! owns identity constraints starts one selector matcher per constraint.
//! Every node the selector picks becomes a target with one field matcher per
//! field; field matches capture typed values into the target's key-sequence.
//! When a target element closes its key-sequence is complete and is added
//! to the node table of the constraint at the scope element.
//!
//! Closing a scope element resolves the keyrefs declared there and then
//! merges (bubbles) its key and unique tables into the parent element, but
//! only while an enclosing keyref may still need them.

use serde::Serialize;

use crate::namespaces::QName;
use crate::xpath::PathMatcher;

use super::base::{Components, ElementId, IdcId};
use super::exceptions::ErrorCode;
use super::identities::IdcKind;
use super::values::{canonical, values_equal, XsdValue};

/// A problem found by the IDC engine, reported by the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IdcIssue {
    pub code: ErrorCode,
    pub message: String,
}

impl IdcIssue {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct KeyEntry {
    key: Vec<XsdValue>,
    line: u32,
}

#[derive(Debug, Clone, Default)]
struct NodeTable {
    entries: Vec<KeyEntry>,
    duplicates: Vec<KeyEntry>,
}

impl NodeTable {
    fn find(&self, key: &[XsdValue]) -> Option<usize> {
        self.entries.iter().position(|e| same_key(&e.key, key))
    }

    fn in_duplicates(&self, key: &[XsdValue]) -> bool {
        self.duplicates.iter().any(|e| same_key(&e.key, key))
    }

    /// Merge a child table; entries colliding at the merge boundary are
    /// both moved aside
    fn merge(&mut self, child: NodeTable) {
        for entry in child.entries {
            if let Some(i) = self.find(&entry.key) {
                let existing = self.entries.remove(i);
                self.duplicates.push(existing);
                self.duplicates.push(entry);
            } else if self.in_duplicates(&entry.key) {
                self.duplicates.push(entry);
            } else {
                self.entries.push(entry);
            }
        }
        self.duplicates.extend(child.duplicates);
    }
}

fn same_key(a: &[XsdValue], b: &[XsdValue]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
}

fn format_key(key: &[XsdValue]) -> String {
    let parts: Vec<String> = key.iter().map(|v| format!("'{}'", canonical(v))).collect();
    format!("[{}]", parts.join(", "))
}

#[derive(Debug)]
struct SelectorState {
    idc: IdcId,
    scope: usize,
    matcher: PathMatcher,
}

#[derive(Debug)]
struct Target {
    idc: IdcId,
    scope: usize,
    depth: usize,
    values: Vec<Option<XsdValue>>,
    broken: bool,
    line: u32,
}

#[derive(Debug)]
struct FieldState {
    target: usize,
    field: usize,
    anchor: usize,
    matcher: PathMatcher,
}

#[derive(Debug, Default)]
struct Scope {
    tables: Vec<(IdcId, NodeTable)>,
    /// (target, field) pairs waiting for this element's value
    captures: Vec<(usize, usize)>,
}

impl Scope {
    fn table_mut(&mut self, idc: IdcId) -> &mut NodeTable {
        let i = match self.tables.iter().position(|(id, _)| *id == idc) {
            Some(i) => i,
            None => {
                self.tables.push((idc, NodeTable::default()));
                self.tables.len() - 1
            }
        };
        &mut self.tables[i].1
    }

    fn table(&self, idc: IdcId) -> Option<&NodeTable> {
        self.tables.iter().find(|(id, _)| *id == idc).map(|(_, t)| t)
    }
}

/// Node table of one constraint after validation, in canonical form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdcNodeTable {
    /// Constraint name
    pub name: String,
    /// `unique`, `key` or `keyref`
    pub kind: String,
    /// Key-sequences in the table
    pub keys: Vec<Vec<String>>,
    /// Key-sequences removed because they occurred more than once
    pub duplicates: Vec<Vec<String>>,
}

/// Per-document identity-constraint state
#[derive(Debug)]
pub(crate) struct IdcEngine<'s> {
    components: &'s Components,
    build_all: bool,
    expose: bool,
    selectors: Vec<SelectorState>,
    targets: Vec<Target>,
    fields: Vec<FieldState>,
    scopes: Vec<Scope>,
    /// Referenced key and the depth of every active keyref scope
    keyref_scopes: Vec<(IdcId, usize)>,
    exposed: Vec<IdcNodeTable>,
}

impl<'s> IdcEngine<'s> {
    pub fn new(components: &'s Components, build_all: bool, expose: bool) -> Self {
        Self {
            components,
            build_all: build_all || expose,
            expose,
            selectors: Vec::new(),
            targets: Vec::new(),
            fields: Vec::new(),
            scopes: Vec::new(),
            keyref_scopes: Vec::new(),
            exposed: Vec::new(),
        }
    }

    /// Whether the schema has any identity constraint at all
    pub fn is_enabled(&self) -> bool {
        !self.components.idcs.is_empty()
    }

    /// An element starts one level below the current one; `attributes`
    /// carry typed values
    pub fn start_element(
        &mut self,
        name: &QName,
        decl: Option<ElementId>,
        attributes: &[(QName, XsdValue)],
        line: u32,
        issues: &mut Vec<IdcIssue>,
    ) {
        let depth = self.scopes.len();
        self.scopes.push(Scope::default());

        // existing field matchers first: their targets are ancestors
        for i in 0..self.fields.len() {
            let state = &mut self.fields[i];
            if state.matcher.push_element(name) {
                self.scopes[depth].captures.push((state.target, state.field));
            }
            let (target, field) = (state.target, state.field);
            for (attr_name, value) in attributes {
                if self.fields[i].matcher.matches_attribute(attr_name) {
                    self.capture(target, field, value.clone(), issues);
                }
            }
        }

        let mut new_targets = Vec::new();
        for state in &mut self.selectors {
            if state.matcher.push_element(name) {
                new_targets.push((state.idc, state.scope));
            }
        }

        let components = self.components;
        if let Some(decl) = decl {
            for &idc in &components[decl].idcs {
                let constraint = &components[idc];
                let matcher = PathMatcher::new(constraint.selector.clone());
                if matcher.matches_context() {
                    new_targets.push((idc, depth));
                }
                if constraint.kind == IdcKind::Keyref {
                    if let Some(refer) = constraint.refer_id() {
                        self.keyref_scopes.push((refer, depth));
                    }
                }
                self.selectors.push(SelectorState {
                    idc,
                    scope: depth,
                    matcher,
                });
            }
        }

        for (idc, scope) in new_targets {
            self.add_target(idc, scope, depth, attributes, line, issues);
        }
    }

    fn add_target(
        &mut self,
        idc: IdcId,
        scope: usize,
        depth: usize,
        attributes: &[(QName, XsdValue)],
        line: u32,
        issues: &mut Vec<IdcIssue>,
    ) {
        let components = self.components;
        let constraint = &components[idc];
        let target = self.targets.len();
        self.targets.push(Target {
            idc,
            scope,
            depth,
            values: vec![None; constraint.fields.len()],
            broken: false,
            line,
        });
        for (field, path) in constraint.fields.iter().enumerate() {
            let matcher = PathMatcher::new(path.clone());
            if matcher.matches_context() {
                self.scopes[depth].captures.push((target, field));
            }
            for (attr_name, value) in attributes {
                if matcher.matches_attribute(attr_name) {
                    self.capture(target, field, value.clone(), issues);
                }
            }
            self.fields.push(FieldState {
                target,
                field,
                anchor: depth,
                matcher,
            });
        }
    }

    fn capture(&mut self, target: usize, field: usize, value: XsdValue, issues: &mut Vec<IdcIssue>) {
        let t = &mut self.targets[target];
        if t.broken {
            return;
        }
        if t.values[field].is_some() {
            let constraint = &self.components.idcs[t.idc.index()];
            issues.push(IdcIssue::new(
                ErrorCode::CvcIdcField,
                format!(
                    "The field '{}' of identity-constraint '{}' evaluates to more than one node",
                    constraint.fields[field].source, constraint.name
                ),
            ));
            t.broken = true;
            return;
        }
        t.values[field] = Some(value);
    }

    /// The current element ends; `value` is its typed simple content
    pub fn end_element(&mut self, value: Option<&XsdValue>, issues: &mut Vec<IdcIssue>) {
        let Some(depth) = self.scopes.len().checked_sub(1) else {
            return;
        };
        let captures = std::mem::take(&mut self.scopes[depth].captures);
        for (target, field) in captures {
            match value {
                Some(v) => self.capture(target, field, v.clone(), issues),
                None => {
                    let t = &mut self.targets[target];
                    if !t.broken {
                        let constraint = &self.components.idcs[t.idc.index()];
                        issues.push(IdcIssue::new(
                            ErrorCode::CvcIdcField,
                            format!(
                                "The field '{}' of identity-constraint '{}' evaluates to an element without a simple value",
                                constraint.fields[field].source, constraint.name
                            ),
                        ));
                        t.broken = true;
                    }
                }
            }
        }

        self.fields.retain(|f| f.anchor != depth);
        for state in &mut self.fields {
            state.matcher.pop_element();
        }
        while self.targets.last().map_or(false, |t| t.depth == depth) {
            if let Some(target) = self.targets.pop() {
                self.finish_target(target, issues);
            }
        }
        self.selectors.retain(|s| s.scope != depth);
        for state in &mut self.selectors {
            state.matcher.pop_element();
        }

        self.resolve_keyrefs(issues);
        self.keyref_scopes.retain(|(_, d)| *d != depth);

        let Some(scope) = self.scopes.pop() else {
            return;
        };
        if depth == 0 {
            if self.expose {
                self.exposed = scope
                    .tables
                    .iter()
                    .map(|(idc, table)| self.export(*idc, table))
                    .collect();
            }
            return;
        }
        for (idc, table) in scope.tables {
            if self.components.idcs[idc.index()].kind == IdcKind::Keyref {
                continue;
            }
            let needed = self.build_all || self.keyref_scopes.iter().any(|(r, d)| *r == idc && *d < depth);
            if needed {
                if let Some(parent) = self.scopes.last_mut() {
                    parent.table_mut(idc).merge(table);
                }
            }
        }
    }

    fn finish_target(&mut self, target: Target, issues: &mut Vec<IdcIssue>) {
        if target.broken {
            return;
        }
        let constraint = &self.components.idcs[target.idc.index()];
        if target.values.iter().any(|v| v.is_none()) {
            if constraint.kind == IdcKind::Key {
                issues.push(IdcIssue::new(
                    ErrorCode::CvcIdcKeyMissing,
                    format!(
                        "Not all fields of key identity-constraint '{}' evaluate to a node",
                        constraint.name
                    ),
                ));
            }
            return;
        }
        let key: Vec<XsdValue> = target.values.into_iter().flatten().collect();
        let kind = constraint.kind;
        let name = constraint.name.clone();
        let table = self.scopes[target.scope].table_mut(target.idc);
        if kind != IdcKind::Keyref {
            if let Some(i) = table.find(&key) {
                let code = if kind == IdcKind::Key {
                    ErrorCode::CvcIdcKeyDuplicate
                } else {
                    ErrorCode::CvcIdcUnique
                };
                let first = table.entries[i].line;
                let mut message = format!(
                    "Duplicate key-sequence {} in {} identity-constraint '{}'",
                    format_key(&key),
                    kind,
                    name
                );
                if first > 0 {
                    message.push_str(&format!(", first occurrence at line {}", first));
                }
                issues.push(IdcIssue::new(code, message));
                return;
            }
        }
        table.entries.push(KeyEntry {
            key,
            line: target.line,
        });
    }

    fn resolve_keyrefs(&self, issues: &mut Vec<IdcIssue>) {
        let Some(scope) = self.scopes.last() else {
            return;
        };
        for (idc, table) in &scope.tables {
            let constraint = &self.components.idcs[idc.index()];
            if constraint.kind != IdcKind::Keyref {
                continue;
            }
            let Some(refer) = constraint.refer_id() else {
                continue;
            };
            let referenced = scope.table(refer);
            for entry in &table.entries {
                let found = referenced.map_or(false, |t| t.find(&entry.key).is_some());
                if found {
                    continue;
                }
                let ambiguous = referenced.map_or(false, |t| t.in_duplicates(&entry.key));
                let message = if ambiguous {
                    format!(
                        "More than one match found for key-sequence {} of keyref '{}'",
                        format_key(&entry.key),
                        constraint.name
                    )
                } else {
                    format!(
                        "No match found for key-sequence {} of keyref '{}'",
                        format_key(&entry.key),
                        constraint.name
                    )
                };
                issues.push(IdcIssue::new(ErrorCode::CvcIdcKeyref, message));
            }
        }
    }

    fn export(&self, idc: IdcId, table: &NodeTable) -> IdcNodeTable {
        let constraint = &self.components.idcs[idc.index()];
        let keys = |entries: &[KeyEntry]| -> Vec<Vec<String>> {
            entries
                .iter()
                .map(|e| e.key.iter().map(canonical).collect())
                .collect()
        };
        IdcNodeTable {
            name: constraint.name.to_string(),
            kind: constraint.kind.to_string(),
            keys: keys(&table.entries),
            duplicates: keys(&table.duplicates),
        }
    }

    /// Tables of the validation root, when exposure was requested
    pub fn take_exposed(&mut self) -> Vec<IdcNodeTable> {
        std::mem::take(&mut self.exposed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn entry(values: &[&str]) -> KeyEntry {
        KeyEntry {
            key: values.iter().map(|v| XsdValue::String(v.to_string())).collect(),
            line: 0,
        }
    }

    #[test]
    fn test_merge_moves_both_duplicates_aside() {
        let mut parent = NodeTable {
            entries: vec![entry(&["1"]), entry(&["2"])],
            duplicates: Vec::new(),
        };
        let child = NodeTable {
            entries: vec![entry(&["2"]), entry(&["3"])],
            duplicates: Vec::new(),
        };
        parent.merge(child);
        assert_eq!(parent.entries.len(), 2);
        assert_eq!(parent.duplicates.len(), 2);
        assert!(parent.in_duplicates(&entry(&["2"]).key));
        assert!(parent.find(&entry(&["3"]).key).is_some());
    }

    #[test]
    fn test_keys_compare_by_value() {
        let a = vec![XsdValue::Decimal(Decimal::new(10, 1))];
        let b = vec![XsdValue::Decimal(Decimal::new(1, 0))];
        assert!(same_key(&a, &b));
        assert!(!same_key(&a, &[]));
        assert_eq!(format_key(&entry(&["1", "A"]).key), "['1', 'A']");
    }
}
