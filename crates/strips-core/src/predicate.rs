//! Predicates, atoms, ground facts and literals.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};
use crate::types::{format_tuple, Binding, Object, Param, Term, Type};

/// A named relation schema with a fixed, typed signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Predicate {
    /// Predicate name, unique within a problem.
    pub name: String,
    /// Ordered argument types.
    pub arg_types: Vec<Type>,
}

impl Predicate {
    /// Declare a predicate.
    pub fn new(name: impl Into<String>, arg_types: impl IntoIterator<Item = Type>) -> Self {
        Self {
            name: name.into(),
            arg_types: arg_types.into_iter().collect(),
        }
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        self.arg_types.len()
    }

    /// Apply the predicate to terms, checking arity and types.
    pub fn atom<T: Into<Term>>(&self, terms: impl IntoIterator<Item = T>) -> Result<Atom> {
        let args: Vec<Term> = terms.into_iter().map(Into::into).collect();
        self.check_signature(args.iter().map(Term::ty), || {
            format!(
                "{}({})",
                self.name,
                args.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        })?;
        Ok(Atom {
            predicate: self.clone(),
            args,
        })
    }

    /// Apply the predicate to objects, producing a ground fact.
    pub fn fact(&self, objects: impl IntoIterator<Item = Object>) -> Result<Fact> {
        let args: Vec<Object> = objects.into_iter().collect();
        self.check_signature(args.iter().map(|o| &o.ty), || {
            format!("{}({})", self.name, format_tuple(&args))
        })?;
        Ok(Fact {
            predicate: self.name.clone(),
            args,
        })
    }

    fn check_signature<'a>(
        &self,
        types: impl ExactSizeIterator<Item = &'a Type>,
        describe: impl Fn() -> String,
    ) -> Result<()> {
        if types.len() != self.arity() {
            return Err(PlanningError::ArityMismatch {
                context: describe(),
                expected: self.arity(),
                found: types.len(),
            });
        }
        for (expected, found) in self.arg_types.iter().zip(types) {
            if expected != found {
                return Err(PlanningError::TypeMismatch {
                    context: describe(),
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A predicate applied to terms, possibly lifted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Atom {
    pub predicate: Predicate,
    pub args: Vec<Term>,
}

impl Atom {
    /// Name of the predicate.
    pub fn name(&self) -> &str {
        &self.predicate.name
    }

    /// Returns true if no argument is a parameter.
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(|t| matches!(t, Term::Object(_)))
    }

    /// Parameters mentioned by this atom.
    pub fn params(&self) -> impl Iterator<Item = &Param> {
        self.args.iter().filter_map(|t| match t {
            Term::Param(param) => Some(param),
            Term::Object(_) => None,
        })
    }

    /// Ground the atom under a binding.
    pub fn ground(&self, binding: &Binding) -> Result<Fact> {
        let args = self
            .args
            .iter()
            .map(|t| t.resolve(binding))
            .collect::<Result<Vec<_>>>()?;
        Ok(Fact {
            predicate: self.predicate.name.clone(),
            args,
        })
    }

    /// Ground an atom that must not mention parameters.
    pub fn to_fact(&self) -> Result<Fact> {
        if !self.is_ground() {
            return Err(PlanningError::NonGroundAtom(self.to_string()));
        }
        self.ground(&Binding::new())
    }

    /// Substitute bound parameters.
    pub fn substitute(&self, binding: &Binding) -> Atom {
        Atom {
            predicate: self.predicate.clone(),
            args: self.args.iter().map(|t| t.substitute(binding)).collect(),
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args: Vec<String> = self.args.iter().map(ToString::to_string).collect();
        write!(f, "{}({})", self.predicate.name, args.join(", "))
    }
}

impl From<Fact> for Atom {
    fn from(fact: Fact) -> Self {
        let arg_types = fact.args.iter().map(|o| o.ty.clone()).collect();
        Atom {
            predicate: Predicate {
                name: fact.predicate,
                arg_types,
            },
            args: fact.args.into_iter().map(Term::Object).collect(),
        }
    }
}

/// A ground atom. Equality is structural on (predicate, arguments).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fact {
    pub predicate: String,
    pub args: Vec<Object>,
}

impl Fact {
    /// Returns true if any argument is an optimistic placeholder.
    pub fn is_optimistic(&self) -> bool {
        self.args.iter().any(Object::is_optimistic)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.predicate, format_tuple(&self.args))
    }
}

/// An atom or its negation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Literal {
    pub atom: Atom,
    pub positive: bool,
}

impl Literal {
    /// A positive literal.
    pub fn pos(atom: Atom) -> Self {
        Self {
            atom,
            positive: true,
        }
    }

    /// A negated literal.
    pub fn neg(atom: Atom) -> Self {
        Self {
            atom,
            positive: false,
        }
    }
}

impl From<Atom> for Literal {
    fn from(atom: Atom) -> Self {
        Literal::pos(atom)
    }
}

impl From<Fact> for Literal {
    fn from(fact: Fact) -> Self {
        Literal::pos(fact.into())
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.positive {
            self.atom.fmt(f)
        } else {
            write!(f, "not {}", self.atom)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::bind;

    #[test]
    fn test_atom_signature_checked() {
        let block = Type::new("BLOCK");
        let pose = Type::new("POSE");
        let at_pose = Predicate::new("AtPose", [block.clone(), pose.clone()]);

        assert!(at_pose.atom([block.param("B"), pose.param("P")]).is_ok());

        let err = at_pose
            .atom([pose.param("P"), block.param("B")])
            .unwrap_err();
        assert!(matches!(err, PlanningError::TypeMismatch { .. }));
        assert!(err.to_string().contains("AtPose(?P, ?B)"));

        let err = at_pose.fact([block.object("block0")]).unwrap_err();
        assert!(matches!(
            err,
            PlanningError::ArityMismatch {
                expected: 2,
                found: 1,
                ..
            }
        ));
    }

    #[test]
    fn test_ground_atom() {
        let block = Type::new("BLOCK");
        let holding = Predicate::new("Holding", [block.clone()]);
        let b = block.param("B");
        let atom = holding.atom([&b]).unwrap();
        assert!(!atom.is_ground());
        assert!(atom.to_fact().is_err());

        let fact = atom.ground(&bind(&[b], &[block.object("block1")])).unwrap();
        assert_eq!(fact.to_string(), "Holding(block1)");
        assert_eq!(fact, holding.fact([block.object("block1")]).unwrap());
    }
}
