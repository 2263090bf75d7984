//! # STRIPStream Core
//!
//! Problem-authoring layer for planning with conditional streams.
//!
//! This crate provides the fundamental building blocks:
//! - [`Type`], [`Object`], [`Param`] - the typed domain model
//! - [`Predicate`], [`Atom`], [`Fact`] - relations and ground facts
//! - [`Formula`] - the logical formula layer and its [`Evaluator`]
//! - [`Action`], [`Axiom`] - operators
//! - [`Stream`] - conditional generator and test streams
//! - [`Problem`] - the aggregate handed to a planner
//! - [`Plan`] - the planner's answer
//! - [`PlanningError`] - error types

pub mod error;
pub mod eval;
pub mod formula;
pub mod operator;
pub mod plan;
pub mod predicate;
pub mod problem;
pub mod stream;
pub mod types;

// Re-exports for convenience
pub use error::{InfeasibleReason, PlanningError, Result};
pub use eval::{Evaluator, Support, SupportSink, World};
pub use formula::Formula;
pub use operator::{Action, Axiom, GroundEffect, State};
pub use plan::{DisplayMap, Plan, PlanStep};
pub use predicate::{Atom, Fact, Literal, Predicate};
pub use problem::{Operator, Problem, ProblemBuilder};
pub use stream::{Stream, StreamBuilder, StreamKind};
pub use types::{bind, format_tuple, Binding, Object, Param, Term, Type, Value};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{InfeasibleReason, PlanningError, Result};
    pub use crate::formula::Formula;
    pub use crate::operator::{Action, Axiom};
    pub use crate::plan::{Plan, PlanStep};
    pub use crate::predicate::{Atom, Fact, Literal, Predicate};
    pub use crate::problem::{Operator, Problem, ProblemBuilder};
    pub use crate::stream::Stream;
    pub use crate::types::{Object, Param, Term, Type};
}
