//! The incremental planner.
//!
//! Planning proceeds in levels. At every level eager streams are run, the
//! actions are grounded over the committed universe and searched. When
//! that fails, the search is repeated over an optimistic domain in which
//! every live stream instance is assumed to deliver; a plan found there
//! tells exactly which stream calls to make before trying again. When the
//! optimistic search fails as well, every relevant lazy generator is
//! pulled once more and the next level begins.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use chrono::Utc;
use strips_core::{Evaluator, InfeasibleReason, Plan, PlanningError, Problem, Result, State};
use strips_state::{FactSource, LevelSummary, Universe};
use tracing::{debug, info, warn};

use crate::astar::{AStarSearch, SearchLimits, SearchOracle, SearchStatus};
use crate::extract::{extract_plan, replay, validate_plan};
use crate::ground::{initial_state, Domain, GroundAction, GroundTask};
use crate::planner::{
    duration_millis, CancellationToken, Diagnostics, Planner, PlannerConfig, SolveOutcome,
    SolveReport,
};
use crate::streams::StreamEvaluator;

/// Incremental planner over conditional streams.
pub struct IncrementalPlanner {
    config: PlannerConfig,
    oracle: Box<dyn SearchOracle>,
    cancel: CancellationToken,
}

impl IncrementalPlanner {
    /// Create a planner with default configuration.
    pub fn new() -> Self {
        Self::with_config(PlannerConfig::default())
    }

    /// Create a planner with custom configuration and the built-in A*.
    pub fn with_config(config: PlannerConfig) -> Self {
        let oracle = Box::new(AStarSearch::new(config.heuristic));
        Self {
            config,
            oracle,
            cancel: CancellationToken::new(),
        }
    }

    /// Replace the search oracle.
    pub fn with_oracle(mut self, oracle: Box<dyn SearchOracle>) -> Self {
        self.oracle = oracle;
        self
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that cancels solves run by this planner.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Solve a problem.
    ///
    /// Infeasibility is a normal outcome reported in the [`SolveReport`];
    /// errors are modeling errors or misbehaving streams.
    pub fn solve(&self, problem: &Problem) -> Result<SolveReport> {
        let started = Instant::now();
        let mut diagnostics = Diagnostics::new(problem);
        info!(
            "Starting solve {} (problem {})",
            diagnostics.run_id, diagnostics.problem_hash
        );

        let evaluator = Evaluator::new(&problem.axioms)?;
        let outcome = match unreachable_goal(problem) {
            Some(goal) => {
                warn!("Goal {} can never be reached", goal);
                SolveOutcome::Infeasible {
                    reason: InfeasibleReason::UnreachableGoal,
                }
            }
            None => {
                let mut run = Run::new(self, problem, evaluator, started)?;
                let outcome = run.levels(&mut diagnostics);
                diagnostics.stream_calls = run.streams.calls();
                diagnostics.cursors = run.streams.cursor_summaries();
                outcome?
            }
        };

        diagnostics.finished_at = Some(Utc::now());
        diagnostics.elapsed_ms = duration_millis(started.elapsed());
        match &outcome {
            SolveOutcome::Solved { plan } => info!(
                "Solved with {} steps after {} levels, {} stream calls in {}ms",
                plan.len(),
                diagnostics.levels_explored,
                diagnostics.stream_calls,
                diagnostics.elapsed_ms
            ),
            SolveOutcome::Infeasible { reason } => info!(
                "Infeasible ({}) after {} levels, {} stream calls in {}ms",
                reason, diagnostics.levels_explored, diagnostics.stream_calls, diagnostics.elapsed_ms
            ),
        }
        Ok(SolveReport {
            outcome,
            diagnostics,
        })
    }
}

impl Default for IncrementalPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Planner for IncrementalPlanner {
    fn solve(&self, problem: &Problem) -> Result<SolveReport> {
        IncrementalPlanner::solve(self, problem)
    }

    fn config(&self) -> &PlannerConfig {
        &self.config
    }

    fn set_config(&mut self, config: PlannerConfig) {
        self.oracle = Box::new(AStarSearch::new(config.heuristic));
        self.config = config;
    }
}

/// Solve with the default configuration, a level bound and an optional
/// time budget.
pub fn solve(
    problem: &Problem,
    max_level: usize,
    search_time_budget: Option<Duration>,
) -> Result<SolveReport> {
    let config = PlannerConfig {
        max_level,
        search_time_budget_ms: search_time_budget.map(duration_millis),
        ..PlannerConfig::default()
    };
    IncrementalPlanner::with_config(config).solve(problem)
}

/// First positive goal literal whose predicate nothing can make true.
fn unreachable_goal(problem: &Problem) -> Option<String> {
    let mut producible: BTreeSet<String> = problem
        .initial
        .iter()
        .map(|fact| fact.predicate.clone())
        .collect();
    producible.extend(
        problem
            .actions
            .iter()
            .flat_map(|a| a.effect_literals())
            .filter(|l| l.positive)
            .map(|l| l.atom.name().to_string()),
    );
    producible.extend(
        problem
            .streams
            .iter()
            .flat_map(|s| s.effect_predicates())
            .map(str::to_string),
    );
    producible.extend(problem.derived_predicates());

    problem
        .goal
        .iter()
        .find(|l| l.positive && !producible.contains(l.atom.name()))
        .map(ToString::to_string)
}

/// Result of one search call as seen by the level loop.
enum Search {
    Plan(Vec<GroundAction>),
    NoPlan,
    Interrupted(InfeasibleReason),
}

/// Mutable state of one solve.
struct Run<'a> {
    problem: &'a Problem,
    config: &'a PlannerConfig,
    oracle: &'a dyn SearchOracle,
    cancel: &'a CancellationToken,
    evaluator: Evaluator,
    statics: BTreeSet<String>,
    initial: State,
    universe: Universe,
    streams: StreamEvaluator<'a>,
    deadline: Option<Instant>,
}

impl<'a> Run<'a> {
    fn new(
        planner: &'a IncrementalPlanner,
        problem: &'a Problem,
        evaluator: Evaluator,
        started: Instant,
    ) -> Result<Self> {
        let config = &planner.config;
        let initial = initial_state(problem);

        let mut universe = Universe::new();
        for object in problem.initial_objects() {
            universe.add_object(object)?;
        }
        for fact in &problem.initial {
            if !initial.contains(fact) {
                universe.add_fact(fact.clone(), FactSource::Initial)?;
            }
        }

        Ok(Self {
            problem,
            config,
            oracle: planner.oracle.as_ref(),
            cancel: &planner.cancel,
            evaluator,
            statics: problem.static_predicates(),
            initial,
            universe,
            streams: StreamEvaluator::new(problem, config),
            deadline: config
                .time_budget()
                .and_then(|budget| started.checked_add(budget)),
        })
    }

    fn interrupted(&self) -> Option<InfeasibleReason> {
        if self.cancel.is_cancelled() {
            return Some(InfeasibleReason::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Some(InfeasibleReason::TimeBudgetExceeded);
        }
        None
    }

    /// The outer loop over levels.
    fn levels(&mut self, diagnostics: &mut Diagnostics) -> Result<SolveOutcome> {
        let mut level = 0;
        loop {
            if let Some(reason) = self.interrupted() {
                warn!("Stopping at level {}: {}", level, reason);
                return Ok(SolveOutcome::Infeasible { reason });
            }
            if level > self.config.max_level {
                warn!("Level bound {} exceeded", self.config.max_level);
                return Ok(SolveOutcome::Infeasible {
                    reason: InfeasibleReason::LevelBoundExceeded,
                });
            }

            self.universe.advance_to(level);
            if level > 0 && !self.streams.widen(&mut self.universe, level)? {
                info!("All relevant streams exhausted at level {}", level);
                return Ok(SolveOutcome::Infeasible {
                    reason: InfeasibleReason::StreamsExhausted,
                });
            }
            diagnostics.levels_explored = level + 1;
            info!(
                "Level {}: {} objects, {} facts",
                level,
                self.universe.object_count(),
                self.universe.fact_count()
            );

            let calls_before = self.streams.calls();
            let refinements_before = diagnostics.refinements;
            let outcome = self.level(level, diagnostics)?;
            diagnostics.levels.push(LevelSummary {
                level,
                refinements: diagnostics.refinements - refinements_before,
                stream_calls: self.streams.calls() - calls_before,
                universe: self.universe.snapshot(),
            });
            if let Some(outcome) = outcome {
                return Ok(outcome);
            }
            level += 1;
        }
    }

    /// One level: eager streams, committed search, optimistic refinement.
    fn level(
        &mut self,
        level: usize,
        diagnostics: &mut Diagnostics,
    ) -> Result<Option<SolveOutcome>> {
        let mut refinements = 0;
        loop {
            if let Some(reason) = self.interrupted() {
                return Ok(Some(SolveOutcome::Infeasible { reason }));
            }

            self.streams.eager_phase(&mut self.universe, level)?;
            let committed = Domain::from_universe(&self.universe);
            match self.search(&committed, diagnostics)? {
                Search::Plan(actions) => {
                    let plan = self.finish(&committed, &actions)?;
                    return Ok(Some(SolveOutcome::Solved { plan }));
                }
                Search::Interrupted(reason) => {
                    return Ok(Some(SolveOutcome::Infeasible { reason }))
                }
                Search::NoPlan => {}
            }

            if refinements >= self.config.max_refinements {
                debug!("Refinement cap reached at level {}", level);
                return Ok(None);
            }

            let optimistic = self.streams.optimistic(&self.universe)?;
            let actions = match self.search(&optimistic.domain, diagnostics)? {
                Search::Plan(actions) => actions,
                Search::Interrupted(reason) => {
                    return Ok(Some(SolveOutcome::Infeasible { reason }))
                }
                Search::NoPlan => {
                    debug!("Optimistic search failed at level {}", level);
                    return Ok(None);
                }
            };

            let replayed = replay(
                self.problem,
                &self.evaluator,
                &optimistic.domain,
                &self.initial,
                &actions,
            )?;
            let required = optimistic.required(
                replayed.support.facts.iter().chain(&replayed.support.derived),
                &actions,
            );
            debug!(
                "Optimistic plan of {} steps needs {} stream calls",
                actions.len(),
                required.len()
            );
            let calls = self
                .streams
                .commit(&mut self.universe, &required, level)?;
            refinements += 1;
            diagnostics.refinements += 1;
            if calls == 0 {
                warn!("Optimistic plan needs no callable stream, widening");
                return Ok(None);
            }
        }
    }

    /// Ground over a domain and call the search oracle.
    fn search(&self, domain: &Domain, diagnostics: &mut Diagnostics) -> Result<Search> {
        let task = GroundTask::new(
            self.problem,
            &self.evaluator,
            &self.statics,
            domain,
            self.initial.clone(),
        )?;
        let limits = SearchLimits {
            max_states_explored: self.config.max_states_explored,
            deadline: self.deadline,
            cancel: self.cancel.clone(),
        };
        let outcome = self.oracle.search(&task, &limits)?;
        diagnostics.search_calls += 1;
        diagnostics.states_explored += outcome.states_explored;
        debug!(
            "{} explored {} states: {:?}",
            self.oracle.name(),
            outcome.states_explored,
            outcome.status
        );

        Ok(match outcome.status {
            SearchStatus::Found(steps) => Search::Plan(
                steps
                    .into_iter()
                    .map(|index| task.actions[index].clone())
                    .collect(),
            ),
            SearchStatus::Exhausted | SearchStatus::StateLimit => Search::NoPlan,
            SearchStatus::TimedOut => Search::Interrupted(InfeasibleReason::TimeBudgetExceeded),
            SearchStatus::Cancelled => Search::Interrupted(InfeasibleReason::Cancelled),
        })
    }

    /// Turn a committed search result into a validated plan.
    fn finish(&self, domain: &Domain, actions: &[GroundAction]) -> Result<Plan> {
        let replayed = replay(self.problem, &self.evaluator, domain, &self.initial, actions)?;
        let plan = extract_plan(&replayed.trace);
        if !validate_plan(self.problem, &self.universe, &plan)? {
            return Err(PlanningError::Internal(format!(
                "plan failed validation:\n{}",
                plan
            )));
        }
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::astar::SearchOutcome;
    use crate::fixtures::{checked, lazy_walker, picky_reach, reach, walker, watched_walker};
    use strips_core::{Action, Axiom, Predicate, Type};

    /// Reports no plan on every other call, starting with the first.
    struct Alternating {
        inner: AStarSearch,
        calls: AtomicUsize,
    }

    impl SearchOracle for Alternating {
        fn name(&self) -> &str {
            "alternating"
        }

        fn search(&self, task: &GroundTask<'_>, limits: &SearchLimits) -> Result<SearchOutcome> {
            if self.calls.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                return Ok(SearchOutcome {
                    status: SearchStatus::Exhausted,
                    states_explored: 0,
                });
            }
            self.inner.search(task, limits)
        }
    }

    #[test]
    fn test_static_problem_solves_at_level_zero() {
        let (problem, _) = walker();
        let report = IncrementalPlanner::new().solve(&problem).unwrap();
        let plan = report.plan().unwrap();
        assert_eq!(plan.to_string(), "  1. step(0, 2)\n  2. step(2, 3)");
        assert_eq!(report.diagnostics.levels_explored, 1);
        assert_eq!(report.diagnostics.stream_calls, 0);
        assert_eq!(report.diagnostics.search_calls, 1);
    }

    #[test]
    fn test_widening_reaches_goal() {
        let (problem, pos) = lazy_walker(None);
        let report = solve(&problem, 10, None).unwrap();
        let plan = report.plan().unwrap();
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.steps[2].args, vec![pos.object(2), pos.object(3)]);
        assert_eq!(report.diagnostics.levels_explored, 4);
        assert_eq!(report.diagnostics.refinements, 0);
    }

    #[test]
    fn test_universe_grows_monotonically() {
        let (problem, _) = lazy_walker(None);
        let report = solve(&problem, 10, None).unwrap();
        let levels = &report.diagnostics.levels;
        assert_eq!(levels.len(), 4);
        for pair in levels.windows(2) {
            assert!(pair[1].universe.covers(&pair[0].universe));
            assert!(pair[1].level == pair[0].level + 1);
        }
        assert!(levels[3].universe.objects > levels[0].universe.objects);
    }

    #[test]
    fn test_refinement_commits_needed_streams() {
        let (problem, pos, conf) = reach();
        let report = IncrementalPlanner::new().solve(&problem).unwrap();
        assert_eq!(report.diagnostics.levels_explored, 1);
        assert_eq!(report.diagnostics.refinements, 1);
        assert_eq!(report.diagnostics.stream_calls, 1);
        let plan = report.into_plan().unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].args, vec![pos.object(5), conf.object(50)]);
    }

    #[test]
    fn test_level_bound_is_infeasible() {
        let (problem, _) = lazy_walker(None);
        let report = solve(&problem, 1, None).unwrap();
        assert_eq!(
            report.infeasible_reason(),
            Some(InfeasibleReason::LevelBoundExceeded)
        );
        assert_eq!(report.diagnostics.levels_explored, 2);
    }

    #[test]
    fn test_exhausted_streams_are_infeasible() {
        let (problem, _) = lazy_walker(Some(1));
        let report = solve(&problem, 50, None).unwrap();
        assert_eq!(
            report.infeasible_reason(),
            Some(InfeasibleReason::StreamsExhausted)
        );
        assert!(report.diagnostics.cursors.iter().all(|c| c.exhausted));
    }

    #[test]
    fn test_pending_lazy_tests_do_not_keep_widening() {
        let report = solve(&watched_walker(Some(1)), 50, None).unwrap();
        assert_eq!(
            report.infeasible_reason(),
            Some(InfeasibleReason::StreamsExhausted)
        );
        assert_eq!(report.diagnostics.levels_explored, 2);

        let (plain, _) = lazy_walker(Some(1));
        let baseline = solve(&plain, 50, None).unwrap();
        assert_eq!(
            baseline.diagnostics.levels_explored,
            report.diagnostics.levels_explored
        );
    }

    #[test]
    fn test_refinement_cap_moves_to_next_level() {
        let config = PlannerConfig {
            max_level: 1,
            max_refinements: 3,
            ..PlannerConfig::default()
        };
        let report = IncrementalPlanner::with_config(config)
            .solve(&picky_reach())
            .unwrap();
        assert_eq!(
            report.infeasible_reason(),
            Some(InfeasibleReason::LevelBoundExceeded)
        );

        let levels = &report.diagnostics.levels;
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[1].level, 1);
        assert!(levels.iter().all(|l| l.refinements == 3));
        assert!(levels.iter().all(|l| l.stream_calls >= 3));
        assert_eq!(report.diagnostics.refinements, 6);
    }

    #[test]
    fn test_commit_without_calls_widens() {
        let (problem, _) = walker();
        let planner = IncrementalPlanner::new().with_oracle(Box::new(Alternating {
            inner: AStarSearch::default(),
            calls: AtomicUsize::new(0),
        }));
        let report = planner.solve(&problem).unwrap();

        // The optimistic plan needs no stream, so the level ends at once.
        assert_eq!(
            report.infeasible_reason(),
            Some(InfeasibleReason::StreamsExhausted)
        );
        assert_eq!(report.diagnostics.search_calls, 2);
        assert_eq!(report.diagnostics.refinements, 1);
        assert_eq!(report.diagnostics.levels[0].stream_calls, 0);
    }

    #[test]
    fn test_unbounded_time_budget() {
        let (problem, _) = walker();
        let report = solve(&problem, 5, Some(Duration::MAX)).unwrap();
        assert!(report.is_solved());
    }

    #[test]
    fn test_unreachable_goal() {
        let pos = Type::new("POS");
        let lost = Predicate::new("Lost", [pos.clone()]);
        let problem = Problem::builder()
            .goal(lost.fact([pos.object(0)]).unwrap())
            .build()
            .unwrap();
        let report = IncrementalPlanner::new().solve(&problem).unwrap();
        assert_eq!(
            report.infeasible_reason(),
            Some(InfeasibleReason::UnreachableGoal)
        );
        assert_eq!(report.diagnostics.search_calls, 0);
    }

    #[test]
    fn test_cancelled_before_start() {
        let (problem, _) = lazy_walker(None);
        let planner = IncrementalPlanner::new();
        planner.cancellation_token().cancel();
        let report = planner.solve(&problem).unwrap();
        assert_eq!(report.infeasible_reason(), Some(InfeasibleReason::Cancelled));
    }

    #[test]
    fn test_zero_time_budget() {
        let (problem, _) = lazy_walker(None);
        let report = solve(&problem, 10, Some(Duration::ZERO)).unwrap();
        assert_eq!(
            report.infeasible_reason(),
            Some(InfeasibleReason::TimeBudgetExceeded)
        );
    }

    #[test]
    fn test_non_deterministic_test_aborts() {
        let err = IncrementalPlanner::new().solve(&checked(true)).unwrap_err();
        assert!(matches!(err, PlanningError::NonDeterministicStream { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_eager_test_enables_plan() {
        let report = IncrementalPlanner::new().solve(&checked(false)).unwrap();
        assert_eq!(report.plan().unwrap().count("visit"), 1);
        assert_eq!(report.diagnostics.refinements, 0);
    }

    #[test]
    fn test_axiom_cycle_is_fatal() {
        let block = Type::new("BLOCK");
        let a = Predicate::new("A", [block.clone()]);
        let b = Predicate::new("B", [block.clone()]);
        let seen = Predicate::new("Seen", [block.clone()]);
        let x = block.param("X");
        let look = Action::new(
            "look",
            vec![x.clone()],
            a.atom([&x]).unwrap(),
            seen.atom([&x]).unwrap(),
        )
        .unwrap();
        let problem = Problem::builder()
            .goal(a.fact([block.object("x")]).unwrap())
            .action(look)
            .axiom(Axiom::new(a.atom([&x]).unwrap(), b.atom([&x]).unwrap()).unwrap())
            .axiom(Axiom::new(b.atom([&x]).unwrap(), a.atom([&x]).unwrap()).unwrap())
            .build()
            .unwrap();
        let err = IncrementalPlanner::new().solve(&problem).unwrap_err();
        assert!(matches!(err, PlanningError::AxiomCycle { .. }));
    }
}
