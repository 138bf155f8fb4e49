//! Content model automata
//!
//! Particles of complex types are compiled into a counted
//! nondeterministic automaton: states joined by epsilon edges that may
//! reset or increment an occurrence counter, or be guarded by one, and by
//! labeled transitions consuming one child element. Bounded repetition is
//! expressed with counters instead of unrolling, so `maxOccurs="5000"`
//! costs four states.
//!
//! After construction the automaton is checked for Unique Particle
//! Attribution: from any state, two transitions of different particles
//! may not accept the same element unless a counter guard keeps them apart.
//!
//! `<all>` groups are not expressed as automata but as an [`AllGroup`],
//! which tracks the members seen so far.

mod builder;
mod exec;

pub use builder::{compile_content_model, ModelBuilder, ModelError};
pub use exec::{AllRun, Execution, ModelRun};

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use crate::namespaces::QName;
use crate::validators::base::{ElementId, WildcardId};
use crate::validators::wildcards::NamespaceConstraint;

/// A transition label
pub trait Label: Clone + fmt::Debug {
    /// What the automaton consumes
    type Symbol: ?Sized;

    /// Whether this label accepts a symbol
    fn matches(&self, symbol: &Self::Symbol) -> bool;

    /// Whether some symbol is accepted by both labels
    fn overlaps(&self, other: &Self) -> bool;

    /// Text used in "expected" lists
    fn describe(&self) -> String;
}

/// State handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(usize);

/// Counter handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CounterId(usize);

/// Counter update performed when an epsilon edge is taken
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterAction {
    /// Set to zero
    Reset(CounterId),
    /// Add one
    Increment(CounterId),
}

impl CounterAction {
    fn counter(&self) -> CounterId {
        match self {
            Self::Reset(c) | Self::Increment(c) => *c,
        }
    }
}

/// Condition on a counter for an epsilon edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Guard {
    /// Counter below its maximum: another round is allowed
    Below(CounterId),
    /// Counter at least its minimum: the loop may be left
    AtLeast(CounterId),
}

impl Guard {
    fn counter(&self) -> CounterId {
        match self {
            Self::Below(c) | Self::AtLeast(c) => *c,
        }
    }
}

/// Occurrence bounds tracked by a counter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counter {
    /// Rounds needed before leaving
    pub min: u32,
    /// Rounds allowed, `None` for unbounded
    pub max: Option<u32>,
}

impl Counter {
    /// Clamp a value; above `min` an unbounded counter has nothing left to tell
    fn saturate(&self, value: u32) -> u32 {
        match self.max {
            Some(max) => value.min(max),
            None => value.min(self.min),
        }
    }

    fn admits(&self, guard: Guard, value: u32) -> bool {
        match guard {
            Guard::Below(_) => self.max.map_or(true, |max| value < max),
            Guard::AtLeast(_) => value >= self.min,
        }
    }
}

#[derive(Debug, Clone)]
struct Epsilon {
    target: StateId,
    action: Option<CounterAction>,
    guard: Option<Guard>,
}

#[derive(Debug, Clone)]
struct Transition<L> {
    target: StateId,
    label: L,
    /// Particle the transition was built from
    edge: usize,
}

#[derive(Debug, Clone)]
struct State<L> {
    epsilons: Vec<Epsilon>,
    transitions: Vec<Transition<L>>,
}

impl<L> Default for State<L> {
    fn default() -> Self {
        Self {
            epsilons: Vec::new(),
            transitions: Vec::new(),
        }
    }
}

/// Two particles competing for the same element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ambiguity {
    /// First competing label
    pub first: String,
    /// Second competing label
    pub second: String,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.second {
            write!(f, "two particles may both match element '{}'", self.first)
        } else {
            write!(f, "particles '{}' and '{}' may match the same element", self.first, self.second)
        }
    }
}

/// Counted nondeterministic automaton
#[derive(Debug, Clone)]
pub struct Automaton<L> {
    states: Vec<State<L>>,
    counters: Vec<Counter>,
    start: StateId,
    accept: StateId,
    edges: usize,
}

impl<L: Label> Default for Automaton<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: Label> Automaton<L> {
    /// Automaton with a start state that is also accepting
    pub fn new() -> Self {
        Self {
            states: vec![State::default()],
            counters: Vec::new(),
            start: StateId(0),
            accept: StateId(0),
            edges: 0,
        }
    }

    /// Initial state
    pub fn start(&self) -> StateId {
        self.start
    }

    /// Final state
    pub fn accept(&self) -> StateId {
        self.accept
    }

    /// Mark the final state
    pub fn set_accept(&mut self, state: StateId) {
        self.accept = state;
    }

    /// Number of states
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Number of counters
    pub fn counter_count(&self) -> usize {
        self.counters.len()
    }

    /// Add a state
    pub fn add_state(&mut self) -> StateId {
        self.states.push(State::default());
        StateId(self.states.len() - 1)
    }

    /// Add an occurrence counter
    pub fn add_counter(&mut self, min: u32, max: Option<u32>) -> CounterId {
        self.counters.push(Counter { min, max });
        CounterId(self.counters.len() - 1)
    }

    /// Plain epsilon edge
    pub fn add_epsilon(&mut self, from: StateId, to: StateId) {
        self.add_counted_epsilon(from, to, None, None);
    }

    /// Epsilon edge with a counter action and/or guard; the guard is
    /// evaluated before the action
    pub fn add_counted_epsilon(
        &mut self,
        from: StateId,
        to: StateId,
        action: Option<CounterAction>,
        guard: Option<Guard>,
    ) {
        self.states[from.0].epsilons.push(Epsilon {
            target: to,
            action,
            guard,
        });
    }

    /// Start a new particle edge id
    pub fn new_edge(&mut self) -> usize {
        self.edges += 1;
        self.edges
    }

    /// Labeled transition belonging to `edge`
    pub fn add_transition(&mut self, from: StateId, to: StateId, label: L, edge: usize) {
        self.states[from.0].transitions.push(Transition {
            target: to,
            label,
            edge,
        });
    }

    /// Check Unique Particle Attribution
    pub fn check_determinism(&self) -> Result<(), Ambiguity> {
        let mut sources: Vec<StateId> = vec![self.start];
        for state in &self.states {
            sources.extend(state.transitions.iter().map(|t| t.target));
        }
        sources.sort();
        sources.dedup();

        for source in sources {
            let reachable = self.guarded_closure(source);
            for (i, (a, guards_a)) in reachable.iter().enumerate() {
                for (b, guards_b) in &reachable[i + 1..] {
                    if a.edge == b.edge || !a.label.overlaps(&b.label) {
                        continue;
                    }
                    if self.exclusive(guards_a, guards_b) {
                        continue;
                    }
                    return Err(Ambiguity {
                        first: a.label.describe(),
                        second: b.label.describe(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Transitions reachable over epsilon edges, with the guards that were
    /// passed since the counter was last touched
    fn guarded_closure(&self, source: StateId) -> Vec<(&Transition<L>, BTreeSet<Guard>)> {
        let mut seen: HashSet<(StateId, Vec<Guard>)> = HashSet::new();
        let mut found: Vec<(&Transition<L>, BTreeSet<Guard>)> = Vec::new();
        let mut stack = vec![(source, BTreeSet::new())];

        while let Some((state, guards)) = stack.pop() {
            if !seen.insert((state, guards.iter().copied().collect())) {
                continue;
            }
            for t in &self.states[state.0].transitions {
                if !found.iter().any(|(f, g)| std::ptr::eq(*f, t) && *g == guards) {
                    found.push((t, guards.clone()));
                }
            }
            for eps in &self.states[state.0].epsilons {
                let mut next = guards.clone();
                if let Some(guard) = eps.guard {
                    next.insert(guard);
                }
                if let Some(action) = eps.action {
                    let counter = action.counter();
                    next.retain(|g| g.counter() != counter);
                }
                stack.push((eps.target, next));
            }
        }
        found
    }

    /// Whether two guard sets can never hold for the same counter values
    fn exclusive(&self, a: &BTreeSet<Guard>, b: &BTreeSet<Guard>) -> bool {
        a.iter().any(|ga| {
            let (loop_side, exit_side) = match ga {
                Guard::Below(c) => (*c, Guard::AtLeast(*c)),
                Guard::AtLeast(c) => (*c, Guard::Below(*c)),
            };
            let counter = self.counters[loop_side.0];
            b.contains(&exit_side) && counter.max == Some(counter.min)
        })
    }

    /// Start executing
    pub fn run(&self) -> Execution<'_, L> {
        Execution::new(self)
    }
}

/// One member of an `<all>` group
#[derive(Debug, Clone)]
pub struct AllMember<L> {
    /// Labels accepted for this member (element plus substitutes)
    pub labels: Vec<L>,
    /// minOccurs="1"
    pub required: bool,
}

/// Content model of an `<all>` group: each member at most once, in any order
#[derive(Debug, Clone)]
pub struct AllGroup<L> {
    members: Vec<AllMember<L>>,
    emptiable: bool,
}

impl<L: Label> AllGroup<L> {
    /// Empty group; `emptiable` when the group particle has minOccurs="0"
    pub fn new(emptiable: bool) -> Self {
        Self {
            members: Vec::new(),
            emptiable,
        }
    }

    /// Add a member
    pub fn add_member(&mut self, labels: Vec<L>, required: bool) {
        self.members.push(AllMember { labels, required });
    }

    /// Members in declaration order
    pub fn members(&self) -> &[AllMember<L>] {
        &self.members
    }

    /// Whether the group may be skipped entirely
    pub fn is_emptiable(&self) -> bool {
        self.emptiable || self.members.iter().all(|m| !m.required)
    }

    /// Two members may not accept the same element
    pub fn check_determinism(&self) -> Result<(), Ambiguity> {
        for (i, a) in self.members.iter().enumerate() {
            for b in &self.members[i + 1..] {
                for la in &a.labels {
                    if let Some(lb) = b.labels.iter().find(|lb| la.overlaps(lb)) {
                        return Err(Ambiguity {
                            first: la.describe(),
                            second: lb.describe(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    /// Start executing
    pub fn run(&self) -> AllRun<'_, L> {
        AllRun::new(self)
    }
}

/// Transition label of compiled particles
#[derive(Debug, Clone, PartialEq)]
pub enum ParticleLabel {
    /// An element declaration, or a member of its substitution group
    Element {
        /// Expanded name to match
        name: QName,
        /// Declaration governing the child
        decl: ElementId,
    },
    /// An element wildcard
    Wildcard {
        /// {namespace constraint}
        namespaces: NamespaceConstraint,
        /// The wildcard component
        wildcard: WildcardId,
    },
}

impl Label for ParticleLabel {
    type Symbol = QName;

    fn matches(&self, symbol: &QName) -> bool {
        match self {
            Self::Element { name, .. } => name == symbol,
            Self::Wildcard { namespaces, .. } => namespaces.allows(symbol.ns()),
        }
    }

    fn overlaps(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Element { name: a, .. }, Self::Element { name: b, .. }) => a == b,
            (Self::Element { name, .. }, Self::Wildcard { namespaces, .. })
            | (Self::Wildcard { namespaces, .. }, Self::Element { name, .. }) => namespaces.allows(name.ns()),
            (Self::Wildcard { namespaces: a, .. }, Self::Wildcard { namespaces: b, .. }) => {
                // an inexpressible intersection is never empty
                a.intersection(b).map_or(true, |c| !c.is_empty())
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Element { name, .. } => name.to_string(),
            Self::Wildcard { namespaces, .. } => format!("{{{}}}*", namespaces),
        }
    }
}

/// Compiled content model of a complex type
#[derive(Debug, Clone)]
pub enum ContentModel {
    /// Sequences and choices
    Regular(Automaton<ParticleLabel>),
    /// A top-level `<all>` group
    All(AllGroup<ParticleLabel>),
}

impl ContentModel {
    /// Start matching children
    pub fn run(&self) -> ModelRun<'_> {
        match self {
            Self::Regular(automaton) => ModelRun::Regular(automaton.run()),
            Self::All(group) => ModelRun::All(group.run()),
        }
    }

    /// Size for diagnostics and limits
    pub fn state_count(&self) -> usize {
        match self {
            Self::Regular(automaton) => automaton.state_count(),
            Self::All(group) => group.members().len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Labels over single characters; `'*'` accepts anything
    #[derive(Debug, Clone, PartialEq)]
    pub(crate) struct Ch(pub char);

    impl Label for Ch {
        type Symbol = char;

        fn matches(&self, symbol: &char) -> bool {
            self.0 == '*' || self.0 == *symbol
        }

        fn overlaps(&self, other: &Self) -> bool {
            self.0 == '*' || other.0 == '*' || self.0 == other.0
        }

        fn describe(&self) -> String {
            self.0.to_string()
        }
    }

    fn accepts(automaton: &Automaton<Ch>, input: &str) -> bool {
        let mut run = automaton.run();
        input.chars().all(|c| run.push(&c).is_ok()) && run.is_final()
    }

    /// `start -Reset-> s1 -x-> s2 -Inc-> s3`, looping on Below, leaving on AtLeast
    fn counted(automaton: &mut Automaton<Ch>, from: StateId, label: char, min: u32, max: Option<u32>) -> StateId {
        let c = automaton.add_counter(min, max);
        let s1 = automaton.add_state();
        let s2 = automaton.add_state();
        let s3 = automaton.add_state();
        let s4 = automaton.add_state();
        let edge = automaton.new_edge();
        automaton.add_counted_epsilon(from, s1, Some(CounterAction::Reset(c)), None);
        automaton.add_transition(s1, s2, Ch(label), edge);
        automaton.add_counted_epsilon(s2, s3, Some(CounterAction::Increment(c)), None);
        automaton.add_counted_epsilon(s3, s1, None, Some(Guard::Below(c)));
        automaton.add_counted_epsilon(s3, s4, None, Some(Guard::AtLeast(c)));
        if min == 0 {
            automaton.add_epsilon(from, s4);
        }
        s4
    }

    fn single(automaton: &mut Automaton<Ch>, from: StateId, label: char) -> StateId {
        let to = automaton.add_state();
        let edge = automaton.new_edge();
        automaton.add_transition(from, to, Ch(label), edge);
        to
    }

    #[test]
    fn test_counted_repetition() {
        let mut a = Automaton::new();
        let start = a.start();
        let end = counted(&mut a, start, 'a', 2, Some(3));
        a.set_accept(end);
        assert!(a.check_determinism().is_ok());
        assert!(!accepts(&a, "a"));
        assert!(accepts(&a, "aa"));
        assert!(accepts(&a, "aaa"));
        assert!(!accepts(&a, "aaaa"));
        assert_eq!(a.state_count(), 5);
    }

    #[test]
    fn test_unbounded_counter_saturates() {
        let mut a = Automaton::new();
        let start = a.start();
        let end = counted(&mut a, start, 'a', 3, None);
        a.set_accept(end);
        assert!(!accepts(&a, "aa"));
        assert!(accepts(&a, &"a".repeat(50)));
    }

    #[test]
    fn test_counter_guards_separate_particles() {
        // a{2} a is deterministic, a{2,3} a is not
        let mut a = Automaton::new();
        let start = a.start();
        let mid = counted(&mut a, start, 'a', 2, Some(2));
        let end = single(&mut a, mid, 'a');
        a.set_accept(end);
        assert!(a.check_determinism().is_ok());
        assert!(accepts(&a, "aaa"));
        assert!(!accepts(&a, "aa"));

        let mut b = Automaton::new();
        let start = b.start();
        let mid = counted(&mut b, start, 'a', 2, Some(3));
        let end = single(&mut b, mid, 'a');
        b.set_accept(end);
        assert!(b.check_determinism().is_err());
    }

    #[test]
    fn test_choice_with_shared_prefix_is_ambiguous() {
        // (a,b)|(a,c)
        let mut m = Automaton::new();
        let start = m.start();
        let end = m.add_state();
        for second in ['b', 'c'] {
            let mid = single(&mut m, start, 'a');
            let last = single(&mut m, mid, second);
            m.add_epsilon(last, end);
        }
        m.set_accept(end);
        let err = m.check_determinism().unwrap_err();
        assert_eq!(err.first, "a");
        assert_eq!(err.second, "a");
        assert!(accepts(&m, "ab"));
        assert!(accepts(&m, "ac"));
    }

    #[test]
    fn test_all_group() {
        let mut g = AllGroup::new(false);
        g.add_member(vec![Ch('a')], true);
        g.add_member(vec![Ch('b')], false);
        assert!(g.check_determinism().is_ok());
        assert!(!g.is_emptiable());

        let mut run = g.run();
        assert!(run.push(&'b').is_ok());
        assert!(!run.is_final());
        assert_eq!(run.expected(), vec!["a".to_string()]);
        assert!(run.push(&'a').is_ok());
        assert!(run.is_final());
        assert!(run.push(&'a').is_err());

        let mut dup = AllGroup::new(true);
        dup.add_member(vec![Ch('a')], true);
        dup.add_member(vec![Ch('*')], false);
        assert!(dup.check_determinism().is_err());
        assert!(dup.run().is_final());
    }
}
