//! Planner trait, configuration and solve reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strips_core::{InfeasibleReason, Plan, PlanningError, Problem, Result};
use strips_state::{CursorSummary, LevelSummary};
use uuid::Uuid;

use crate::astar::Heuristic;

/// Configuration for the incremental planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Highest level explored before giving up.
    pub max_level: usize,

    /// Optimistic refinement rounds allowed within one level.
    pub max_refinements: usize,

    /// Eager evaluation rounds allowed before each search attempt.
    pub max_eager_rounds: usize,

    /// Maximum number of states expanded by one search call.
    pub max_states_explored: usize,

    /// Wall-clock budget for the whole solve, in milliseconds.
    pub search_time_budget_ms: Option<u64>,

    /// Consecutive repeated generator outputs tolerated before a cursor
    /// is treated as exhausted.
    pub max_duplicate_skips: usize,

    /// Evaluate every test twice on first use and reject differing answers.
    pub verify_test_determinism: bool,

    /// Heuristic used by the built-in A* search.
    pub heuristic: Heuristic,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_level: 20,
            max_refinements: 16,
            max_eager_rounds: 8,
            max_states_explored: 200_000,
            search_time_budget_ms: None,
            max_duplicate_skips: 64,
            verify_test_determinism: true,
            heuristic: Heuristic::Blind,
        }
    }
}

impl PlannerConfig {
    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The time budget as a duration.
    pub fn time_budget(&self) -> Option<Duration> {
        self.search_time_budget_ms.map(Duration::from_millis)
    }
}

/// Whole milliseconds in a duration, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Cooperative cancellation flag shared with a running solve.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters and summaries collected during a solve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    /// Unique ID of this solve.
    pub run_id: Uuid,

    /// Content hash of the solved problem.
    pub problem_hash: String,

    /// Number of levels entered.
    pub levels_explored: usize,

    /// Stream calls committed (generator pulls and test evaluations).
    pub stream_calls: usize,

    /// Optimistic refinement rounds across all levels.
    pub refinements: usize,

    /// Calls made to the search oracle.
    pub search_calls: usize,

    /// States expanded across all search calls.
    pub states_explored: usize,

    /// Universe summary at the end of every level.
    pub levels: Vec<LevelSummary>,

    /// Final state of every generator cursor.
    pub cursors: Vec<CursorSummary>,

    /// When the solve started.
    pub started_at: DateTime<Utc>,

    /// When the solve finished.
    pub finished_at: Option<DateTime<Utc>>,

    /// Total solve time in milliseconds.
    pub elapsed_ms: u64,
}

impl Diagnostics {
    /// Fresh diagnostics for a problem.
    pub fn new(problem: &Problem) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            problem_hash: problem.content_hash(),
            levels_explored: 0,
            stream_calls: 0,
            refinements: 0,
            search_calls: 0,
            states_explored: 0,
            levels: Vec::new(),
            cursors: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
            elapsed_ms: 0,
        }
    }
}

/// How a solve ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SolveOutcome {
    /// A validated plan.
    Solved { plan: Plan },
    /// No plan within the given bounds.
    Infeasible { reason: InfeasibleReason },
}

/// Result of a solve with its diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveReport {
    pub outcome: SolveOutcome,
    pub diagnostics: Diagnostics,
}

impl SolveReport {
    /// Returns true if a plan was found.
    pub fn is_solved(&self) -> bool {
        matches!(self.outcome, SolveOutcome::Solved { .. })
    }

    /// The plan, if one was found.
    pub fn plan(&self) -> Option<&Plan> {
        match &self.outcome {
            SolveOutcome::Solved { plan } => Some(plan),
            SolveOutcome::Infeasible { .. } => None,
        }
    }

    /// The infeasibility reason, if no plan was found.
    pub fn infeasible_reason(&self) -> Option<InfeasibleReason> {
        match &self.outcome {
            SolveOutcome::Solved { .. } => None,
            SolveOutcome::Infeasible { reason } => Some(*reason),
        }
    }

    /// The plan, or [`PlanningError::Infeasible`].
    pub fn into_plan(self) -> Result<Plan> {
        match self.outcome {
            SolveOutcome::Solved { plan } => Ok(plan),
            SolveOutcome::Infeasible { reason } => Err(PlanningError::Infeasible { reason }),
        }
    }
}

/// Trait for planning engines.
pub trait Planner: Send + Sync {
    /// Solve a problem.
    fn solve(&self, problem: &Problem) -> Result<SolveReport>;

    /// Get the planner configuration.
    fn config(&self) -> &PlannerConfig;

    /// Update the planner configuration.
    fn set_config(&mut self, config: PlannerConfig);
}
