//! Problem definition and builder.

use std::collections::BTreeSet;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::error::{PlanningError, Result};
use crate::formula::Formula;
use crate::operator::{Action, Axiom};
use crate::predicate::{Fact, Literal};
use crate::stream::Stream;
use crate::types::Object;

/// An action or an axiom, as supplied by the problem author.
#[derive(Debug, Clone)]
pub enum Operator {
    Action(Action),
    Axiom(Axiom),
}

impl From<Action> for Operator {
    fn from(action: Action) -> Self {
        Operator::Action(action)
    }
}

impl From<Axiom> for Operator {
    fn from(axiom: Axiom) -> Self {
        Operator::Axiom(axiom)
    }
}

/// A complete STRIPStream problem. Immutable once built.
#[derive(Debug, Clone)]
pub struct Problem {
    pub initial: Vec<Fact>,
    pub goal: Vec<Literal>,
    pub actions: Vec<Action>,
    pub axioms: Vec<Axiom>,
    pub streams: Vec<Stream>,
    pub constants: Vec<Object>,
}

impl Problem {
    /// Create a new ProblemBuilder.
    pub fn builder() -> ProblemBuilder {
        ProblemBuilder::new()
    }

    /// Predicates changed by some action effect.
    pub fn fluent_predicates(&self) -> BTreeSet<String> {
        self.actions
            .iter()
            .flat_map(|a| a.effect_literals())
            .map(|l| l.atom.name().to_string())
            .collect()
    }

    /// Predicates inferred by axioms.
    pub fn derived_predicates(&self) -> BTreeSet<String> {
        self.axioms.iter().map(|a| a.predicate().to_string()).collect()
    }

    /// Predicates that only come from the initial state and streams.
    pub fn static_predicates(&self) -> BTreeSet<String> {
        let fluent = self.fluent_predicates();
        let derived = self.derived_predicates();
        self.initial
            .iter()
            .map(|f| f.predicate.clone())
            .chain(
                self.streams
                    .iter()
                    .flat_map(|s| s.effect_predicates())
                    .map(str::to_string),
            )
            .chain(
                self.actions
                    .iter()
                    .flat_map(|a| a.precondition.predicates()),
            )
            .chain(self.axioms.iter().flat_map(|a| a.condition.predicates()))
            .filter(|p| !fluent.contains(p) && !derived.contains(p))
            .collect()
    }

    /// Objects named by constants, the initial state and the goal.
    pub fn initial_objects(&self) -> BTreeSet<Object> {
        let goal_objects = self
            .goal
            .iter()
            .flat_map(|l| l.atom.args.iter())
            .filter_map(|t| match t {
                crate::types::Term::Object(object) => Some(object.clone()),
                crate::types::Term::Param(_) => None,
            });
        self.constants
            .iter()
            .cloned()
            .chain(self.initial.iter().flat_map(|f| f.args.iter().cloned()))
            .chain(goal_objects)
            .collect()
    }

    /// The goal as a single conjunction.
    pub fn goal_formula(&self) -> Formula {
        Formula::and(self.goal.iter().cloned())
    }

    /// Calculate a hash of the problem content (for diagnostics).
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.to_string().as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Initial:")?;
        for fact in &self.initial {
            writeln!(f, "  {}", fact)?;
        }
        writeln!(f, "Goal:")?;
        for literal in &self.goal {
            writeln!(f, "  {}", literal)?;
        }
        writeln!(f, "Actions:")?;
        for action in &self.actions {
            writeln!(f, "  {}", action.to_string().replace('\n', "\n  "))?;
        }
        writeln!(f, "Axioms:")?;
        for axiom in &self.axioms {
            writeln!(f, "  {}", axiom)?;
        }
        writeln!(f, "Streams:")?;
        for stream in &self.streams {
            writeln!(f, "  {}", stream)?;
        }
        write!(f, "Constants:")?;
        for object in &self.constants {
            write!(f, " {}:{}", object, object.ty)?;
        }
        Ok(())
    }
}

/// Builder for creating Problems with a fluent API.
#[derive(Debug, Default)]
pub struct ProblemBuilder {
    initial: Vec<Fact>,
    goal: Vec<Literal>,
    actions: Vec<Action>,
    axioms: Vec<Axiom>,
    streams: Vec<Stream>,
    constants: Vec<Object>,
}

impl ProblemBuilder {
    /// Create a new ProblemBuilder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an initial fact.
    pub fn initial(mut self, fact: Fact) -> Self {
        self.initial.push(fact);
        self
    }

    /// Add several initial facts.
    pub fn initials(mut self, facts: impl IntoIterator<Item = Fact>) -> Self {
        self.initial.extend(facts);
        self
    }

    /// Add a goal literal.
    pub fn goal(mut self, literal: impl Into<Literal>) -> Self {
        self.goal.push(literal.into());
        self
    }

    /// Add an action.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Add an axiom.
    pub fn axiom(mut self, axiom: Axiom) -> Self {
        self.axioms.push(axiom);
        self
    }

    /// Add actions and axioms.
    pub fn operators(mut self, operators: impl IntoIterator<Item = Operator>) -> Self {
        for operator in operators {
            match operator {
                Operator::Action(action) => self.actions.push(action),
                Operator::Axiom(axiom) => self.axioms.push(axiom),
            }
        }
        self
    }

    /// Add a stream.
    pub fn stream(mut self, stream: Stream) -> Self {
        self.streams.push(stream);
        self
    }

    /// Add an extra object.
    pub fn constant(mut self, object: Object) -> Self {
        self.constants.push(object);
        self
    }

    /// Build and validate the Problem.
    pub fn build(self) -> Result<Problem> {
        for literal in &self.goal {
            if !literal.atom.is_ground() {
                return Err(PlanningError::NonGroundAtom(format!("goal {}", literal)));
            }
        }

        let derived: BTreeSet<&str> = self.axioms.iter().map(Axiom::predicate).collect();
        let mut fluent = BTreeSet::new();
        for action in &self.actions {
            for literal in action.effect_literals() {
                if derived.contains(literal.atom.name()) {
                    return Err(PlanningError::DerivedEffect {
                        action: action.name.clone(),
                        predicate: literal.atom.name().to_string(),
                    });
                }
                fluent.insert(literal.atom.name());
            }
        }

        for fact in &self.initial {
            if derived.contains(fact.predicate.as_str()) {
                return Err(PlanningError::MalformedFormula(format!(
                    "derived fact {} cannot be asserted initially",
                    fact
                )));
            }
        }

        for stream in &self.streams {
            if let Some(name) = stream
                .effect_predicates()
                .into_iter()
                .find(|p| fluent.contains(p) || derived.contains(p))
            {
                return Err(PlanningError::MalformedStream {
                    stream: stream.name.clone(),
                    message: format!("certifies non-static predicate '{}'", name),
                });
            }
        }

        let mut names = BTreeSet::new();
        for action in &self.actions {
            if !names.insert(action.name.as_str()) {
                return Err(PlanningError::MalformedFormula(format!(
                    "action '{}' declared twice",
                    action.name
                )));
            }
        }

        Ok(Problem {
            initial: self.initial,
            goal: self.goal,
            actions: self.actions,
            axioms: self.axioms,
            streams: self.streams,
            constants: self.constants,
        })
    }
}
