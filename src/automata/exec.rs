//! Incremental execution of content models
//!
//! An [`Execution`] simulates the automaton on a set of configurations
//! (state plus counter values). The set is closed over epsilon edges after
//! every step, so the caller only ever pushes child names and asks whether
//! the current position is final.

use std::collections::HashSet;

use crate::namespaces::QName;

use super::{AllGroup, Automaton, Label, ParticleLabel, StateId};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Config {
    state: StateId,
    counters: Vec<u32>,
}

/// Running automaton
#[derive(Debug, Clone)]
pub struct Execution<'a, L> {
    automaton: &'a Automaton<L>,
    configs: Vec<Config>,
}

impl<'a, L: Label> Execution<'a, L> {
    pub(super) fn new(automaton: &'a Automaton<L>) -> Self {
        let initial = Config {
            state: automaton.start,
            counters: vec![0; automaton.counters.len()],
        };
        let configs = closure(automaton, vec![initial]);
        Self { automaton, configs }
    }

    /// Consume one symbol; on rejection the execution is unchanged and the
    /// labels that would have been accepted are returned
    pub fn push(&mut self, symbol: &L::Symbol) -> Result<&'a L, Vec<String>> {
        let automaton = self.automaton;
        let mut matched: Option<&'a L> = None;
        let mut next = Vec::new();
        for config in &self.configs {
            for t in &automaton.states[config.state.0].transitions {
                if t.label.matches(symbol) {
                    matched.get_or_insert(&t.label);
                    next.push(Config {
                        state: t.target,
                        counters: config.counters.clone(),
                    });
                }
            }
        }
        match matched {
            Some(label) => {
                self.configs = closure(automaton, next);
                Ok(label)
            }
            None => Err(self.expected()),
        }
    }

    /// Whether the input so far is a complete sequence
    pub fn is_final(&self) -> bool {
        self.configs.iter().any(|c| c.state == self.automaton.accept)
    }

    /// Labels acceptable at this point, without duplicates
    pub fn expected(&self) -> Vec<String> {
        let mut expected: Vec<String> = Vec::new();
        for config in &self.configs {
            for t in &self.automaton.states[config.state.0].transitions {
                let text = t.label.describe();
                if !expected.contains(&text) {
                    expected.push(text);
                }
            }
        }
        expected
    }
}

/// Epsilon closure honoring counter guards and actions
fn closure<L: Label>(automaton: &Automaton<L>, start: Vec<Config>) -> Vec<Config> {
    let mut seen: HashSet<Config> = HashSet::new();
    let mut result = Vec::new();
    let mut stack = start;

    while let Some(config) = stack.pop() {
        if !seen.insert(config.clone()) {
            continue;
        }
        for eps in &automaton.states[config.state.0].epsilons {
            if let Some(guard) = eps.guard {
                let c = guard.counter().0;
                if !automaton.counters[c].admits(guard, config.counters[c]) {
                    continue;
                }
            }
            let mut counters = config.counters.clone();
            match eps.action {
                Some(super::CounterAction::Reset(c)) => counters[c.0] = 0,
                Some(super::CounterAction::Increment(c)) => {
                    counters[c.0] = automaton.counters[c.0].saturate(counters[c.0].saturating_add(1));
                }
                None => {}
            }
            stack.push(Config {
                state: eps.target,
                counters,
            });
        }
        result.push(config);
    }
    result
}

/// Running `<all>` group
#[derive(Debug, Clone)]
pub struct AllRun<'a, L> {
    group: &'a AllGroup<L>,
    seen: Vec<bool>,
}

impl<'a, L: Label> AllRun<'a, L> {
    pub(super) fn new(group: &'a AllGroup<L>) -> Self {
        Self {
            group,
            seen: vec![false; group.members.len()],
        }
    }

    /// Consume one symbol; a member may occur once
    pub fn push(&mut self, symbol: &L::Symbol) -> Result<&'a L, Vec<String>> {
        for (i, member) in self.group.members.iter().enumerate() {
            if let Some(label) = member.labels.iter().find(|l| l.matches(symbol)) {
                if self.seen[i] {
                    break;
                }
                self.seen[i] = true;
                return Ok(label);
            }
        }
        Err(self.expected())
    }

    /// Nothing seen in an emptiable group, or every required member seen
    pub fn is_final(&self) -> bool {
        if self.group.emptiable && !self.seen.iter().any(|s| *s) {
            return true;
        }
        self.group
            .members
            .iter()
            .zip(&self.seen)
            .all(|(m, seen)| *seen || !m.required)
    }

    /// Labels of members not seen yet
    pub fn expected(&self) -> Vec<String> {
        self.group
            .members
            .iter()
            .zip(&self.seen)
            .filter(|(_, seen)| !**seen)
            .flat_map(|(m, _)| m.labels.iter().map(|l| l.describe()))
            .collect()
    }
}

/// Running content model of one element
#[derive(Debug, Clone)]
pub enum ModelRun<'a> {
    /// Automaton
    Regular(Execution<'a, ParticleLabel>),
    /// `<all>` group
    All(AllRun<'a, ParticleLabel>),
}

impl<'a> ModelRun<'a> {
    /// Consume a child element name
    pub fn push(&mut self, name: &QName) -> Result<&'a ParticleLabel, Vec<String>> {
        match self {
            Self::Regular(run) => run.push(name),
            Self::All(run) => run.push(name),
        }
    }

    /// Whether the children so far form complete content
    pub fn is_final(&self) -> bool {
        match self {
            Self::Regular(run) => run.is_final(),
            Self::All(run) => run.is_final(),
        }
    }

    /// Names acceptable next
    pub fn expected(&self) -> Vec<String> {
        match self {
            Self::Regular(run) => run.expected(),
            Self::All(run) => run.expected(),
        }
    }
}
