//! Translation of particles into content models
//!
//! Each particle becomes a fragment between two states. Occurrence bounds
//! pick the fragment shape: `{1,1}` is the bare term, `{0,1}` adds a bypass,
//! `{0,*}` and `{1,*}` loop back, and anything else uses a counter. An
//! element term fans out to the non-abstract members of its substitution
//! group.

use thiserror::Error;
use tracing::trace;

use crate::validators::base::{Components, ElementId, ParticleId};
use crate::validators::groups::Compositor;
use crate::validators::particles::{Occurs, Term};

use super::{AllGroup, Ambiguity, Automaton, ContentModel, CounterAction, Guard, ParticleLabel, StateId};

/// Content model compilation failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// Unique Particle Attribution violated
    #[error("content model is not deterministic: {0}")]
    Ambiguous(Ambiguity),
    /// The automaton grew past the configured limit
    #[error("content model needs {states} states, limit is {limit}")]
    TooLarge {
        /// States built
        states: usize,
        /// Configured maximum
        limit: usize,
    },
}

/// Builds the automaton of one particle tree
pub struct ModelBuilder<'a> {
    components: &'a Components,
    automaton: Automaton<ParticleLabel>,
    max_states: usize,
    depth: usize,
}

impl<'a> ModelBuilder<'a> {
    /// Builder reading particles from `components`
    pub fn new(components: &'a Components, max_states: usize) -> Self {
        Self {
            components,
            automaton: Automaton::new(),
            max_states,
            depth: 0,
        }
    }

    /// Compile a particle without the determinism check
    pub fn build(mut self, particle: ParticleId) -> Result<ContentModel, ModelError> {
        if let Some(all) = self.all_group(particle) {
            return Ok(ContentModel::All(all));
        }
        let start = self.automaton.start();
        let end = self.particle(particle, start)?;
        self.automaton.set_accept(end);
        trace!(
            states = self.automaton.state_count(),
            counters = self.automaton.counter_count(),
            "content model built"
        );
        Ok(ContentModel::Regular(self.automaton))
    }

    /// A particle whose term is an `<all>` group
    fn all_group(&self, particle: ParticleId) -> Option<AllGroup<ParticleLabel>> {
        let p = &self.components[particle];
        let Term::Group(group) = &p.term else {
            return None;
        };
        let group = &self.components[*group];
        if group.compositor != Compositor::All {
            return None;
        }
        let mut all = AllGroup::new(p.occurs.min == 0);
        for member in &group.particles {
            let member = &self.components[*member];
            if member.occurs.is_empty() {
                continue;
            }
            if let Term::Element(decl) = &member.term {
                if let Some(decl) = decl.resolved() {
                    all.add_member(self.element_labels(decl), member.occurs.min > 0);
                }
            }
        }
        Some(all)
    }

    fn state(&mut self) -> Result<StateId, ModelError> {
        if self.automaton.state_count() >= self.max_states {
            return Err(ModelError::TooLarge {
                states: self.automaton.state_count() + 1,
                limit: self.max_states,
            });
        }
        Ok(self.automaton.add_state())
    }

    /// Fragment for a particle starting at `from`; returns its end state
    fn particle(&mut self, particle: ParticleId, from: StateId) -> Result<StateId, ModelError> {
        let p = &self.components[particle];
        let Occurs { min, max } = p.occurs;
        let term = p.term.clone();

        match (min, max) {
            (_, Some(0)) => Ok(from),
            (1, Some(1)) => self.term(&term, from),
            (0, Some(1)) => {
                let to = self.term(&term, from)?;
                self.automaton.add_epsilon(from, to);
                Ok(to)
            }
            (0 | 1, None) => {
                let s1 = self.state()?;
                self.automaton.add_epsilon(from, s1);
                let s2 = self.term(&term, s1)?;
                self.automaton.add_epsilon(s2, s1);
                let s3 = self.state()?;
                self.automaton.add_epsilon(s2, s3);
                if min == 0 {
                    self.automaton.add_epsilon(from, s3);
                }
                Ok(s3)
            }
            _ => {
                let counter = self.automaton.add_counter(min, max);
                let s1 = self.state()?;
                self.automaton
                    .add_counted_epsilon(from, s1, Some(CounterAction::Reset(counter)), None);
                let s2 = self.term(&term, s1)?;
                let s3 = self.state()?;
                self.automaton
                    .add_counted_epsilon(s2, s3, Some(CounterAction::Increment(counter)), None);
                self.automaton
                    .add_counted_epsilon(s3, s1, None, Some(Guard::Below(counter)));
                let s4 = self.state()?;
                self.automaton
                    .add_counted_epsilon(s3, s4, None, Some(Guard::AtLeast(counter)));
                if min == 0 {
                    self.automaton.add_epsilon(from, s4);
                }
                Ok(s4)
            }
        }
    }

    fn term(&mut self, term: &Term, from: StateId) -> Result<StateId, ModelError> {
        match term {
            Term::Element(decl) => {
                let to = self.state()?;
                // an unresolved declaration leaves the fragment unmatchable
                if let Some(decl) = decl.resolved() {
                    for label in self.element_labels(decl) {
                        let edge = self.automaton.new_edge();
                        self.automaton.add_transition(from, to, label, edge);
                    }
                }
                Ok(to)
            }
            Term::Wildcard(wildcard) => {
                let to = self.state()?;
                let edge = self.automaton.new_edge();
                let label = ParticleLabel::Wildcard {
                    namespaces: self.components[*wildcard].namespaces.clone(),
                    wildcard: *wildcard,
                };
                self.automaton.add_transition(from, to, label, edge);
                Ok(to)
            }
            Term::Group(group) => {
                // circular groups are rejected before compilation
                if self.depth > self.components.model_groups.len() {
                    return Ok(from);
                }
                self.depth += 1;
                let group = &self.components[*group];
                let compositor = group.compositor;
                let particles = group.particles.clone();
                let end = match compositor {
                    Compositor::Choice => self.choice(&particles, from),
                    // <all> nested below a sequence is a cos-all-limited error;
                    // read it as a sequence
                    Compositor::Sequence | Compositor::All => {
                        let mut current = from;
                        for p in particles {
                            current = self.particle(p, current)?;
                        }
                        Ok(current)
                    }
                };
                self.depth -= 1;
                end
            }
            Term::GroupRef(group) => match group.resolved().and_then(|g| self.components[g].model_group) {
                Some(g) => self.term(&Term::Group(g), from),
                None => Ok(from),
            },
        }
    }

    fn choice(&mut self, particles: &[ParticleId], from: StateId) -> Result<StateId, ModelError> {
        let to = self.state()?;
        if particles.is_empty() {
            self.automaton.add_epsilon(from, to);
        }
        for p in particles {
            let branch = self.state()?;
            self.automaton.add_epsilon(from, branch);
            let end = self.particle(*p, branch)?;
            self.automaton.add_epsilon(end, to);
        }
        Ok(to)
    }

    /// The declaration itself unless abstract, plus its substitutable members
    fn element_labels(&self, decl: ElementId) -> Vec<ParticleLabel> {
        let d = &self.components[decl];
        let mut labels = Vec::new();
        if !d.is_abstract {
            labels.push(ParticleLabel::Element {
                name: d.name.clone(),
                decl,
            });
        }
        for member in &d.substitution_members {
            let m = &self.components[*member];
            if m.is_abstract || labels.iter().any(|l| matches!(l, ParticleLabel::Element { name, .. } if *name == m.name)) {
                continue;
            }
            labels.push(ParticleLabel::Element {
                name: m.name.clone(),
                decl: *member,
            });
        }
        labels
    }
}

/// Compile and check the content model of a particle
pub fn compile_content_model(
    components: &Components,
    particle: ParticleId,
    max_states: usize,
) -> Result<ContentModel, ModelError> {
    let model = ModelBuilder::new(components, max_states).build(particle)?;
    match &model {
        ContentModel::Regular(automaton) => automaton.check_determinism(),
        ContentModel::All(group) => group.check_determinism(),
    }
    .map_err(ModelError::Ambiguous)?;
    Ok(model)
}
