//! Logical formula layer.
//!
//! Formulas are a single tagged enum with one case per connective. The
//! evaluator in [`crate::eval`] walks this tree recursively.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};
use crate::predicate::{Atom, Literal};
use crate::types::{Binding, Param, Term};

/// A first-order formula over atoms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Formula {
    /// The empty conjunction.
    True,
    Atom(Atom),
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Exists(Vec<Param>, Box<Formula>),
    ForAll(Vec<Param>, Box<Formula>),
    Equal(Term, Term),
}

impl Formula {
    /// Conjunction of the given formulas.
    pub fn and<F: Into<Formula>>(parts: impl IntoIterator<Item = F>) -> Self {
        Formula::And(parts.into_iter().map(Into::into).collect())
    }

    /// Disjunction of the given formulas.
    pub fn or<F: Into<Formula>>(parts: impl IntoIterator<Item = F>) -> Self {
        Formula::Or(parts.into_iter().map(Into::into).collect())
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: impl Into<Formula>) -> Self {
        Formula::Not(Box::new(inner.into()))
    }

    /// Existential quantification.
    pub fn exists(params: impl IntoIterator<Item = Param>, body: impl Into<Formula>) -> Self {
        Formula::Exists(params.into_iter().collect(), Box::new(body.into()))
    }

    /// Universal quantification.
    pub fn forall(params: impl IntoIterator<Item = Param>, body: impl Into<Formula>) -> Self {
        Formula::ForAll(params.into_iter().collect(), Box::new(body.into()))
    }

    /// Equality between two terms.
    pub fn equal(left: impl Into<Term>, right: impl Into<Term>) -> Self {
        Formula::Equal(left.into(), right.into())
    }

    /// Substitute bound parameters.
    ///
    /// Quantified variables shadow outer bindings of the same name.
    pub fn substitute(&self, binding: &Binding) -> Formula {
        match self {
            Formula::True => Formula::True,
            Formula::Atom(atom) => Formula::Atom(atom.substitute(binding)),
            Formula::Not(inner) => Formula::Not(Box::new(inner.substitute(binding))),
            Formula::And(parts) => {
                Formula::And(parts.iter().map(|p| p.substitute(binding)).collect())
            }
            Formula::Or(parts) => Formula::Or(parts.iter().map(|p| p.substitute(binding)).collect()),
            Formula::Exists(params, body) => {
                Formula::Exists(params.clone(), Box::new(body.substitute(&shadow(binding, params))))
            }
            Formula::ForAll(params, body) => {
                Formula::ForAll(params.clone(), Box::new(body.substitute(&shadow(binding, params))))
            }
            Formula::Equal(left, right) => {
                Formula::Equal(left.substitute(binding), right.substitute(binding))
            }
        }
    }

    /// Names of all predicates mentioned.
    pub fn predicates(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.collect_predicates(&mut names);
        names
    }

    fn collect_predicates(&self, names: &mut BTreeSet<String>) {
        match self {
            Formula::True | Formula::Equal(..) => {}
            Formula::Atom(atom) => {
                names.insert(atom.name().to_string());
            }
            Formula::Not(inner) => inner.collect_predicates(names),
            Formula::And(parts) | Formula::Or(parts) => {
                for part in parts {
                    part.collect_predicates(names);
                }
            }
            Formula::Exists(_, body) | Formula::ForAll(_, body) => body.collect_predicates(names),
        }
    }

    /// Parameters occurring free.
    pub fn free_params(&self) -> BTreeSet<Param> {
        match self {
            Formula::True => BTreeSet::new(),
            Formula::Atom(atom) => atom.params().cloned().collect(),
            Formula::Not(inner) => inner.free_params(),
            Formula::And(parts) | Formula::Or(parts) => {
                parts.iter().flat_map(Formula::free_params).collect()
            }
            Formula::Exists(params, body) | Formula::ForAll(params, body) => body
                .free_params()
                .into_iter()
                .filter(|p| !params.iter().any(|q| q.name == p.name))
                .collect(),
            Formula::Equal(left, right) => [left, right]
                .into_iter()
                .filter_map(|t| match t {
                    Term::Param(param) => Some(param.clone()),
                    Term::Object(_) => None,
                })
                .collect(),
        }
    }

    /// Types ranged over by quantifiers.
    pub fn quantified_params(&self) -> Vec<&Param> {
        match self {
            Formula::True | Formula::Atom(_) | Formula::Equal(..) => Vec::new(),
            Formula::Not(inner) => inner.quantified_params(),
            Formula::And(parts) | Formula::Or(parts) => {
                parts.iter().flat_map(Formula::quantified_params).collect()
            }
            Formula::Exists(params, body) | Formula::ForAll(params, body) => {
                let mut all: Vec<&Param> = params.iter().collect();
                all.extend(body.quantified_params());
                all
            }
        }
    }

    /// Flatten an effect formula into literals.
    ///
    /// Only conjunctions of atoms and negated atoms are accepted.
    pub fn as_literals(&self) -> Result<Vec<Literal>> {
        let mut literals = Vec::new();
        self.collect_literals(&mut literals)?;
        Ok(literals)
    }

    fn collect_literals(&self, out: &mut Vec<Literal>) -> Result<()> {
        match self {
            Formula::True => Ok(()),
            Formula::Atom(atom) => {
                out.push(Literal::pos(atom.clone()));
                Ok(())
            }
            Formula::Not(inner) => match inner.as_ref() {
                Formula::Atom(atom) => {
                    out.push(Literal::neg(atom.clone()));
                    Ok(())
                }
                other => Err(PlanningError::MalformedFormula(format!(
                    "only atoms may be negated in an effect, found Not({})",
                    other
                ))),
            },
            Formula::And(parts) => parts.iter().try_for_each(|p| p.collect_literals(out)),
            other => Err(PlanningError::MalformedFormula(format!(
                "effects must be conjunctions of literals, found {}",
                other
            ))),
        }
    }
}

fn shadow(binding: &Binding, params: &[Param]) -> Binding {
    let mut inner = binding.clone();
    for param in params {
        inner.remove(&param.name);
    }
    inner
}

impl From<Atom> for Formula {
    fn from(atom: Atom) -> Self {
        Formula::Atom(atom)
    }
}

impl From<Literal> for Formula {
    fn from(literal: Literal) -> Self {
        if literal.positive {
            Formula::Atom(literal.atom)
        } else {
            Formula::not(literal.atom)
        }
    }
}

fn join(parts: &[Formula]) -> String {
    parts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_params(params: &[Param]) -> String {
    params
        .iter()
        .map(|p| format!("{}: {}", p, p.ty))
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::True => f.write_str("True"),
            Formula::Atom(atom) => atom.fmt(f),
            Formula::Not(inner) => write!(f, "Not({})", inner),
            Formula::And(parts) => write!(f, "And({})", join(parts)),
            Formula::Or(parts) => write!(f, "Or({})", join(parts)),
            Formula::Exists(params, body) => {
                write!(f, "Exists([{}], {})", join_params(params), body)
            }
            Formula::ForAll(params, body) => {
                write!(f, "ForAll([{}], {})", join_params(params), body)
            }
            Formula::Equal(left, right) => write!(f, "Equal({}, {})", left, right),
        }
    }
}
