//! Actions and axioms.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};
use crate::formula::Formula;
use crate::predicate::{Atom, Fact, Literal};
use crate::types::{Binding, Param, Term};

/// A set of fluent facts describing one search state.
pub type State = BTreeSet<Fact>;

/// A parameterized precondition → effect rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    pub parameters: Vec<Param>,
    pub precondition: Formula,
    pub effect: Formula,
    /// The effect flattened into literals.
    effects: Vec<Literal>,
}

impl Action {
    /// Declare an action.
    ///
    /// The effect must be a conjunction of literals and may only mention
    /// the action's own parameters.
    pub fn new(
        name: impl Into<String>,
        parameters: impl IntoIterator<Item = Param>,
        precondition: impl Into<Formula>,
        effect: impl Into<Formula>,
    ) -> Result<Self> {
        let name = name.into();
        let parameters: Vec<Param> = parameters.into_iter().collect();
        let precondition = precondition.into();
        let effect = effect.into();

        let effects = effect.as_literals().map_err(|err| match err {
            PlanningError::MalformedFormula(message) => {
                PlanningError::MalformedFormula(format!("action '{}': {}", name, message))
            }
            other => other,
        })?;

        let declared: BTreeSet<&str> = parameters.iter().map(|p| p.name.as_str()).collect();
        let undeclared = precondition
            .free_params()
            .into_iter()
            .chain(effect.free_params())
            .find(|p| !declared.contains(p.name.as_str()));
        if let Some(param) = undeclared {
            return Err(PlanningError::UnboundParameter(format!(
                "{} in action '{}'",
                param.name, name
            )));
        }

        Ok(Self {
            name,
            parameters,
            precondition,
            effect,
            effects,
        })
    }

    /// Effect literals in declaration order.
    pub fn effect_literals(&self) -> &[Literal] {
        &self.effects
    }

    /// Ground the effect under a binding of the action's parameters.
    pub fn ground_effect(&self, binding: &Binding) -> Result<GroundEffect> {
        let mut effect = GroundEffect::default();
        for literal in &self.effects {
            let fact = literal.atom.ground(binding)?;
            if literal.positive {
                effect.add.push(fact);
            } else {
                effect.del.push(fact);
            }
        }
        Ok(effect)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params: Vec<String> = self
            .parameters
            .iter()
            .map(|p| format!("{}: {}", p, p.ty))
            .collect();
        writeln!(f, "{}({})", self.name, params.join(", "))?;
        writeln!(f, "    pre: {}", self.precondition)?;
        write!(f, "    eff: {}", self.effect)
    }
}

/// The facts an instantiated action adds and deletes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundEffect {
    pub add: Vec<Fact>,
    pub del: Vec<Fact>,
}

impl GroundEffect {
    /// Apply to a state: deletions first, then additions.
    pub fn apply(&self, state: &State) -> State {
        let mut next = state.clone();
        for fact in &self.del {
            next.remove(fact);
        }
        for fact in &self.add {
            next.insert(fact.clone());
        }
        next
    }
}

/// A derived-predicate inference rule: `condition ⇒ effect`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Axiom {
    pub effect: Atom,
    pub condition: Formula,
}

impl Axiom {
    /// Declare an axiom.
    ///
    /// Parameters free in the condition must appear in the effect.
    pub fn new(effect: Atom, condition: impl Into<Formula>) -> Result<Self> {
        let condition = condition.into();
        let head: BTreeSet<&str> = effect.params().map(|p| p.name.as_str()).collect();
        if let Some(param) = condition
            .free_params()
            .into_iter()
            .find(|p| !head.contains(p.name.as_str()))
        {
            return Err(PlanningError::UnboundParameter(format!(
                "{} in axiom for '{}'",
                param.name,
                effect.name()
            )));
        }
        Ok(Self { effect, condition })
    }

    /// Name of the derived predicate.
    pub fn predicate(&self) -> &str {
        self.effect.name()
    }

    /// Parameters of the axiom head.
    pub fn parameters(&self) -> Vec<Param> {
        let mut seen = BTreeSet::new();
        self.effect
            .params()
            .filter(|p| seen.insert(p.name.clone()))
            .cloned()
            .collect()
    }

    /// Match the head against a fact, yielding a binding on success.
    pub fn unify(&self, fact: &Fact) -> Option<Binding> {
        if fact.predicate != self.effect.name() || fact.args.len() != self.effect.args.len() {
            return None;
        }
        let mut binding = Binding::new();
        for (term, object) in self.effect.args.iter().zip(&fact.args) {
            match term {
                Term::Object(expected) if expected != object => return None,
                Term::Object(_) => {}
                Term::Param(param) => match binding.get(&param.name) {
                    Some(bound) if bound != object => return None,
                    Some(_) => {}
                    None => {
                        binding.insert(param.name.clone(), object.clone());
                    }
                },
            }
        }
        Some(binding)
    }
}

impl fmt::Display for Axiom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.effect, self.condition)
    }
}
