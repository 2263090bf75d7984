//! Domain model: types, objects, parameters and terms.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanningError, Result};

/// An opaque sort tag such as `BLOCK` or `POSE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Type(String);

impl Type {
    /// Create a new type tag.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The name of this type.
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Create an object of this type.
    pub fn object(&self, value: impl Into<Value>) -> Object {
        Object::new(self.clone(), value)
    }

    /// Create a parameter of this type.
    pub fn param(&self, name: impl Into<String>) -> Param {
        Param::new(name, self.clone())
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The payload carried by an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    /// An integer value (poses, configurations, indices).
    Int(i64),
    /// A symbolic name (blocks, robots).
    Name(String),
    /// Stand-in for a generator output that has not been pulled yet.
    Optimistic(u64),
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Name(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Name(value)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Name(name) => f.write_str(name),
            Value::Optimistic(id) => write!(f, "#o{}", id),
        }
    }
}

/// A typed value in the planning universe.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Object {
    /// The sort of this object.
    pub ty: Type,
    /// The value it carries.
    pub value: Value,
}

impl Object {
    /// Create a new object.
    pub fn new(ty: Type, value: impl Into<Value>) -> Self {
        Self {
            ty,
            value: value.into(),
        }
    }

    /// Create an optimistic placeholder of the given type.
    pub fn optimistic(ty: Type, id: u64) -> Self {
        Self {
            ty,
            value: Value::Optimistic(id),
        }
    }

    /// Returns true if this object is an optimistic placeholder.
    pub fn is_optimistic(&self) -> bool {
        matches!(self.value, Value::Optimistic(_))
    }

    /// The integer payload, if any.
    pub fn as_int(&self) -> Option<i64> {
        match self.value {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

/// A typed free variable of an action, axiom, quantifier or stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Param {
    /// Variable name, unique within its scope.
    pub name: String,
    /// Declared type.
    pub ty: Type,
}

impl Param {
    /// Create a new parameter.
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.name)
    }
}

/// An argument position: either a parameter or a concrete object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Term {
    Param(Param),
    Object(Object),
}

impl Term {
    /// The type of this term.
    pub fn ty(&self) -> &Type {
        match self {
            Term::Param(param) => &param.ty,
            Term::Object(object) => &object.ty,
        }
    }

    /// Resolve the term to an object under a binding.
    pub fn resolve(&self, binding: &Binding) -> Result<Object> {
        match self {
            Term::Object(object) => Ok(object.clone()),
            Term::Param(param) => binding
                .get(&param.name)
                .cloned()
                .ok_or_else(|| PlanningError::UnboundParameter(param.name.clone())),
        }
    }

    /// Replace a bound parameter by its object, leaving others untouched.
    pub fn substitute(&self, binding: &Binding) -> Term {
        match self {
            Term::Param(param) => match binding.get(&param.name) {
                Some(object) => Term::Object(object.clone()),
                None => self.clone(),
            },
            Term::Object(_) => self.clone(),
        }
    }
}

impl From<Param> for Term {
    fn from(param: Param) -> Self {
        Term::Param(param)
    }
}

impl From<&Param> for Term {
    fn from(param: &Param) -> Self {
        Term::Param(param.clone())
    }
}

impl From<Object> for Term {
    fn from(object: Object) -> Self {
        Term::Object(object)
    }
}

impl From<&Object> for Term {
    fn from(object: &Object) -> Self {
        Term::Object(object.clone())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Param(param) => param.fmt(f),
            Term::Object(object) => object.fmt(f),
        }
    }
}

/// Assignment of objects to parameter names.
pub type Binding = BTreeMap<String, Object>;

/// Build a binding from parallel parameter and object lists.
pub fn bind(params: &[Param], objects: &[Object]) -> Binding {
    params
        .iter()
        .zip(objects)
        .map(|(param, object)| (param.name.clone(), object.clone()))
        .collect()
}

/// Render a tuple of objects as `a, b, c`.
pub fn format_tuple(objects: &[Object]) -> String {
    objects
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
