//! A* search over a ground task.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use strips_core::{Result, State};
use tracing::{debug, info, warn};

use crate::ground::GroundTask;
use crate::planner::CancellationToken;

/// How often the deadline and cancellation token are polled.
const POLL_INTERVAL: usize = 256;

/// Heuristic used by [`AStarSearch`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    /// h = 0: uniform-cost search, returns shortest plans.
    #[default]
    Blind,
    /// Number of unsatisfied goal literals. Faster, not admissible.
    GoalCount,
}

/// Bounds applied to a single search call.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    pub max_states_explored: usize,
    pub deadline: Option<Instant>,
    pub cancel: CancellationToken,
}

/// How a search call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchStatus {
    /// Indices into the task's actions, in execution order.
    Found(Vec<usize>),
    /// The reachable state space holds no goal state.
    Exhausted,
    /// `max_states_explored` was hit.
    StateLimit,
    /// The deadline passed.
    TimedOut,
    /// The cancellation token was triggered.
    Cancelled,
}

/// Result of a search call.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub status: SearchStatus,
    pub states_explored: usize,
}

/// A search procedure over ground tasks.
///
/// Implementations must be sound (every returned plan is applicable and
/// reaches the goal) and complete relative to the task when no limit is hit.
pub trait SearchOracle: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Search for a plan from the task's initial state.
    fn search(&self, task: &GroundTask<'_>, limits: &SearchLimits) -> Result<SearchOutcome>;
}

/// Node in the A* search tree.
struct SearchNode {
    state: State,
    /// Actions taken to reach this state.
    steps: Vec<usize>,
    /// g(n): plan length so far.
    g_cost: usize,
    /// f(n) = g(n) + h(n).
    f_cost: usize,
    /// Insertion counter, breaks ties first-in first-out.
    order: u64,
}

impl PartialEq for SearchNode {
    fn eq(&self, other: &Self) -> bool {
        self.order == other.order
    }
}

impl Eq for SearchNode {}

impl Ord for SearchNode {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (lower f_cost = higher priority)
        other
            .f_cost
            .cmp(&self.f_cost)
            .then_with(|| other.order.cmp(&self.order))
    }
}

impl PartialOrd for SearchNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A* search with unit action costs.
#[derive(Debug, Clone, Default)]
pub struct AStarSearch {
    heuristic: Heuristic,
}

impl AStarSearch {
    /// Create a search with the given heuristic.
    pub fn new(heuristic: Heuristic) -> Self {
        Self { heuristic }
    }

    /// The heuristic in use.
    pub fn heuristic(&self) -> Heuristic {
        self.heuristic
    }

    fn estimate(&self, task: &GroundTask<'_>, state: &State) -> Result<usize> {
        match self.heuristic {
            Heuristic::Blind => Ok(0),
            Heuristic::GoalCount => task.unsatisfied_goals(state),
        }
    }
}

impl SearchOracle for AStarSearch {
    fn name(&self) -> &str {
        "astar"
    }

    fn search(&self, task: &GroundTask<'_>, limits: &SearchLimits) -> Result<SearchOutcome> {
        let start_time = Instant::now();
        debug!(
            "Starting A* over {} ground actions ({:?} heuristic)",
            task.actions.len(),
            self.heuristic
        );

        let mut open_set: BinaryHeap<SearchNode> = BinaryHeap::new();
        let mut closed_set: HashSet<State> = HashSet::new();
        let mut states_explored = 0;
        let mut order = 0u64;

        let h_cost = self.estimate(task, &task.initial)?;
        open_set.push(SearchNode {
            state: task.initial.clone(),
            steps: Vec::new(),
            g_cost: 0,
            f_cost: h_cost,
            order,
        });

        let outcome = |status, states_explored| {
            Ok(SearchOutcome {
                status,
                states_explored,
            })
        };

        while let Some(current) = open_set.pop() {
            // Skip if already visited
            if !closed_set.insert(current.state.clone()) {
                continue;
            }
            states_explored += 1;

            if states_explored % POLL_INTERVAL == 0 {
                if limits.cancel.is_cancelled() {
                    return outcome(SearchStatus::Cancelled, states_explored);
                }
                if limits.deadline.is_some_and(|d| Instant::now() >= d) {
                    warn!("A* ran past the deadline after {} states", states_explored);
                    return outcome(SearchStatus::TimedOut, states_explored);
                }
            }
            if states_explored > limits.max_states_explored {
                warn!(
                    "A* exceeded max states explored limit ({})",
                    limits.max_states_explored
                );
                return outcome(SearchStatus::StateLimit, states_explored);
            }

            if task.is_goal(&current.state)? {
                info!(
                    "A* found plan with {} steps, explored {} states in {}ms",
                    current.steps.len(),
                    states_explored,
                    start_time.elapsed().as_millis()
                );
                return outcome(SearchStatus::Found(current.steps), states_explored);
            }

            // Expand neighbors (try each applicable action)
            for (index, action) in task.actions.iter().enumerate() {
                if !task.applicable(action, &current.state)? {
                    continue;
                }
                let new_state = action.effect.apply(&current.state);
                if closed_set.contains(&new_state) {
                    continue;
                }

                let mut new_steps = current.steps.clone();
                new_steps.push(index);

                let g_cost = current.g_cost + 1;
                let h_cost = self.estimate(task, &new_state)?;
                order += 1;
                open_set.push(SearchNode {
                    state: new_state,
                    steps: new_steps,
                    g_cost,
                    f_cost: g_cost + h_cost,
                    order,
                });
            }
        }

        debug!("A* exhausted the state space after {} states", states_explored);
        outcome(SearchStatus::Exhausted, states_explored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::walker;
    use crate::ground::{initial_state, Domain};
    use strips_core::{Evaluator, Problem, World};

    fn committed(problem: &Problem) -> Domain {
        let mut domain = Domain::new();
        for fact in &problem.initial {
            if fact.predicate == "Adjacent" {
                domain.add_fact(fact.clone());
            } else {
                for object in &fact.args {
                    domain.add_object(object.clone());
                }
            }
        }
        domain
    }

    fn limits() -> SearchLimits {
        SearchLimits {
            max_states_explored: 1_000,
            deadline: None,
            cancel: CancellationToken::new(),
        }
    }

    fn names(task: &GroundTask<'_>, steps: &[usize]) -> Vec<String> {
        steps.iter().map(|i| task.actions[*i].to_string()).collect()
    }

    #[test]
    fn test_astar_finds_shortest_plan() {
        let (problem, _) = walker();
        let evaluator = Evaluator::new(&problem.axioms).unwrap();
        let domain = committed(&problem);
        let statics = problem.static_predicates();
        let task = GroundTask::new(&problem, &evaluator, &statics, &domain, initial_state(&problem))
            .unwrap();

        for heuristic in [Heuristic::Blind, Heuristic::GoalCount] {
            let outcome = AStarSearch::new(heuristic).search(&task, &limits()).unwrap();
            let SearchStatus::Found(steps) = outcome.status else {
                panic!("expected a plan, got {:?}", outcome.status);
            };
            assert_eq!(names(&task, &steps), vec!["step(0, 2)", "step(2, 3)"]);
        }
    }

    #[test]
    fn test_astar_exhausts_unreachable_goal() {
        let (problem, pos) = walker();
        let evaluator = Evaluator::new(&problem.axioms).unwrap();
        let mut domain = committed(&problem);
        domain.add_object(pos.object(9));
        let statics = problem.static_predicates();
        let mut task =
            GroundTask::new(&problem, &evaluator, &statics, &domain, initial_state(&problem))
                .unwrap();
        task.actions.retain(|a| a.to_string() != "step(2, 3)");

        let outcome = AStarSearch::default().search(&task, &limits()).unwrap();
        assert_eq!(outcome.status, SearchStatus::Exhausted);
        assert_eq!(outcome.states_explored, 3);
        assert_eq!(domain.objects(&pos).len(), 5);
    }

    #[test]
    fn test_astar_respects_state_limit() {
        let (problem, _) = walker();
        let evaluator = Evaluator::new(&problem.axioms).unwrap();
        let domain = committed(&problem);
        let statics = problem.static_predicates();
        let task = GroundTask::new(&problem, &evaluator, &statics, &domain, initial_state(&problem))
            .unwrap();

        let mut limits = limits();
        limits.max_states_explored = 1;
        let outcome = AStarSearch::default().search(&task, &limits).unwrap();
        assert_eq!(outcome.status, SearchStatus::StateLimit);
    }
}
