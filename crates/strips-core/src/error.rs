//! Error types for STRIPStream problems and planning.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a solve ended without a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfeasibleReason {
    /// A positive goal literal uses a predicate nothing can ever make true.
    UnreachableGoal,
    /// The level counter passed the caller-supplied bound.
    LevelBoundExceeded,
    /// Every relevant generator ran dry while search kept failing.
    StreamsExhausted,
    /// The wall-clock budget ran out.
    TimeBudgetExceeded,
    /// The caller cancelled the solve.
    Cancelled,
}

impl std::fmt::Display for InfeasibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            InfeasibleReason::UnreachableGoal => "goal references an unreachable predicate",
            InfeasibleReason::LevelBoundExceeded => "level bound exceeded",
            InfeasibleReason::StreamsExhausted => "all relevant streams exhausted",
            InfeasibleReason::TimeBudgetExceeded => "time budget exceeded",
            InfeasibleReason::Cancelled => "cancelled",
        };
        f.write_str(text)
    }
}

/// Main error type for problem construction and planning.
#[derive(Error, Debug, Clone)]
pub enum PlanningError {
    /// A term's type does not match the predicate or stream signature.
    #[error("Type mismatch in {context}: expected {expected}, got {found}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
    },

    /// Wrong number of arguments for a predicate or stream.
    #[error("Arity mismatch in {context}: expected {expected}, got {found}")]
    ArityMismatch {
        context: String,
        expected: usize,
        found: usize,
    },

    /// A formula is used where its shape is not allowed.
    #[error("Malformed formula: {0}")]
    MalformedFormula(String),

    /// A stream declaration is inconsistent.
    #[error("Malformed stream '{stream}': {message}")]
    MalformedStream { stream: String, message: String },

    /// An action asserts or deletes a derived predicate.
    #[error("Action '{action}' has derived predicate '{predicate}' in its effect")]
    DerivedEffect { action: String, predicate: String },

    /// An atom that must be ground still mentions a parameter.
    #[error("Atom is not ground: {0}")]
    NonGroundAtom(String),

    /// A parameter was referenced without a binding.
    #[error("Unbound parameter '{0}'")]
    UnboundParameter(String),

    /// A derived predicate depends on itself through axioms.
    #[error("Axiom cycle through derived predicate '{predicate}': {}", chain.join(" -> "))]
    AxiomCycle { predicate: String, chain: Vec<String> },

    /// A generator has no further outputs for an input tuple.
    #[error("Stream '{stream}' exhausted for inputs ({inputs})")]
    StreamExhausted { stream: String, inputs: String },

    /// A test stream answered differently for the same inputs.
    #[error("Test stream '{stream}' is non-deterministic for inputs ({inputs})")]
    NonDeterministicStream { stream: String, inputs: String },

    /// No plan exists within the given bounds.
    #[error("Problem is infeasible: {reason}")]
    Infeasible { reason: InfeasibleReason },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlanningError {
    /// Returns true if this error must abort a solve.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            PlanningError::StreamExhausted { .. } | PlanningError::Infeasible { .. }
        )
    }

    /// Returns true if this error was raised while building a problem.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            PlanningError::TypeMismatch { .. }
                | PlanningError::ArityMismatch { .. }
                | PlanningError::MalformedFormula(_)
                | PlanningError::MalformedStream { .. }
                | PlanningError::DerivedEffect { .. }
                | PlanningError::NonGroundAtom(_)
        )
    }
}

/// Convenience Result type for planning operations.
pub type Result<T> = std::result::Result<T, PlanningError>;

impl From<serde_json::Error> for PlanningError {
    fn from(err: serde_json::Error) -> Self {
        PlanningError::SerializationError(err.to_string())
    }
}
