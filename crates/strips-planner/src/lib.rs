//! # STRIPStream Planner
//!
//! Incremental planning over conditional streams: bounded A* search over
//! a finite grounding, interleaved with just-in-time stream evaluation.

pub mod astar;
pub mod extract;
pub mod ground;
pub mod incremental;
pub mod planner;
pub mod streams;

#[cfg(test)]
mod fixtures;

pub use astar::{AStarSearch, Heuristic, SearchLimits, SearchOracle, SearchOutcome, SearchStatus};
pub use extract::{extract_plan, validate_plan, TraceEntry};
pub use ground::{Domain, GroundAction, GroundTask};
pub use incremental::{solve, IncrementalPlanner};
pub use planner::{
    duration_millis, CancellationToken, Diagnostics, Planner, PlannerConfig, SolveOutcome,
    SolveReport,
};
