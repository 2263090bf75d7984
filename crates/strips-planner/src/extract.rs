//! Plan replay, extraction and validation.

use serde::{Deserialize, Serialize};
use strips_core::{
    bind, Binding, Evaluator, Fact, Object, Plan, PlanStep, PlanningError, Problem, Result,
    State, Support, World,
};
use tracing::debug;

use crate::ground::{GroundAction, StateWorld};

/// One entry of the planner's internal execution trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEntry {
    /// An executed action.
    Action { action: String, args: Vec<Object> },
    /// A derived fact inferred while checking the next action or the goal.
    Axiom { fact: Fact },
}

/// Result of replaying a plan against a domain.
#[derive(Debug, Clone)]
pub struct Replay {
    pub trace: Vec<TraceEntry>,
    /// Every fact the preconditions and the goal relied on.
    pub support: Support,
    pub final_state: State,
}

/// Replay ground actions from `initial`, recording support and axiom
/// firings.
///
/// Fails with [`PlanningError::Internal`] if a step is not applicable or
/// the goal does not hold at the end.
pub fn replay(
    problem: &Problem,
    evaluator: &Evaluator,
    statics: &dyn World,
    initial: &State,
    actions: &[GroundAction],
) -> Result<Replay> {
    let mut support = Support::default();
    let mut trace = Vec::new();
    let mut state = initial.clone();

    for (index, action) in actions.iter().enumerate() {
        let world = StateWorld::new(statics, &state);
        let derived_before = support.derived.len();
        let lifted = &problem.actions[action.action];
        if !evaluator.holds_with_support(&lifted.precondition, &action.binding, &world, &mut support)? {
            return Err(PlanningError::Internal(format!(
                "step {} ({}) is not applicable during replay",
                index + 1,
                action
            )));
        }
        trace.extend(
            support.derived[derived_before..]
                .iter()
                .map(|fact| TraceEntry::Axiom { fact: fact.clone() }),
        );
        trace.push(TraceEntry::Action {
            action: action.name.clone(),
            args: action.args.clone(),
        });
        state = action.effect.apply(&state);
    }

    let world = StateWorld::new(statics, &state);
    let derived_before = support.derived.len();
    if !evaluator.holds_with_support(&problem.goal_formula(), &Binding::new(), &world, &mut support)? {
        return Err(PlanningError::Internal(
            "goal does not hold after replay".to_string(),
        ));
    }
    trace.extend(
        support.derived[derived_before..]
            .iter()
            .map(|fact| TraceEntry::Axiom { fact: fact.clone() }),
    );

    Ok(Replay {
        trace,
        support,
        final_state: state,
    })
}

/// Keep the executed actions of a trace, in order.
pub fn extract_plan(trace: &[TraceEntry]) -> Plan {
    Plan::new(
        trace
            .iter()
            .filter_map(|entry| match entry {
                TraceEntry::Action { action, args } => Some(PlanStep::new(action, args.clone())),
                TraceEntry::Axiom { .. } => None,
            })
            .collect(),
    )
}

/// Simulate a plan from the problem's initial state.
///
/// `statics` supplies the static facts and object domains, usually the
/// universe the plan was found in. Returns whether every step is
/// applicable and the goal holds at the end.
pub fn validate_plan(problem: &Problem, statics: &dyn World, plan: &Plan) -> Result<bool> {
    let evaluator = Evaluator::new(&problem.axioms)?;
    let mut state: State = problem.initial.iter().cloned().collect();

    for (index, step) in plan.steps.iter().enumerate() {
        let Some(action) = problem.actions.iter().find(|a| a.name == step.action) else {
            debug!("Step {} uses unknown action '{}'", index + 1, step.action);
            return Ok(false);
        };
        let well_typed = action.parameters.len() == step.args.len()
            && action
                .parameters
                .iter()
                .zip(&step.args)
                .all(|(param, object)| param.ty == object.ty);
        if !well_typed {
            debug!("Step {} ({}) does not match the action signature", index + 1, step);
            return Ok(false);
        }
        let binding = bind(&action.parameters, &step.args);
        let world = StateWorld::new(statics, &state);
        if !evaluator.holds(&action.precondition, &binding, &world)? {
            debug!("Step {} ({}) is not applicable", index + 1, step);
            return Ok(false);
        }
        state = action.ground_effect(&binding)?.apply(&state);
    }

    let world = StateWorld::new(statics, &state);
    evaluator.holds(&problem.goal_formula(), &Binding::new(), &world)
}
