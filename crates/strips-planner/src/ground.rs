//! Grounding of actions against a finite object domain.

use std::collections::{BTreeMap, BTreeSet};

use strips_core::{
    Binding, Evaluator, Fact, Formula, GroundEffect, Object, Param, Problem, Result, State, Type,
    World,
};
use strips_state::Universe;
use tracing::debug;

/// Static facts and typed objects a grounding is built over.
#[derive(Debug, Clone, Default)]
pub struct Domain {
    facts: BTreeSet<Fact>,
    objects: BTreeMap<Type, Vec<Object>>,
    known: BTreeSet<Object>,
}

impl Domain {
    /// Create an empty domain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the committed objects and facts of a universe.
    pub fn from_universe(universe: &Universe) -> Self {
        let mut domain = Self::new();
        for ty in universe.types() {
            for object in universe.objects_of(ty) {
                domain.add_object(object.clone());
            }
        }
        domain.facts = universe.facts().cloned().collect();
        domain
    }

    /// Add an object. Returns true if it was new.
    pub fn add_object(&mut self, object: Object) -> bool {
        if !self.known.insert(object.clone()) {
            return false;
        }
        self.objects.entry(object.ty.clone()).or_default().push(object);
        true
    }

    /// Add a static fact and its arguments. Returns true if the fact was new.
    pub fn add_fact(&mut self, fact: Fact) -> bool {
        for object in &fact.args {
            self.add_object(object.clone());
        }
        self.facts.insert(fact)
    }

    /// Number of static facts.
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Number of objects.
    pub fn object_count(&self) -> usize {
        self.known.len()
    }
}

impl World for Domain {
    fn contains(&self, fact: &Fact) -> bool {
        self.facts.contains(fact)
    }

    fn objects(&self, ty: &Type) -> &[Object] {
        self.objects.get(ty).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A search state seen together with the static facts around it.
pub struct StateWorld<'a> {
    statics: &'a dyn World,
    state: &'a State,
}

impl<'a> StateWorld<'a> {
    pub fn new(statics: &'a dyn World, state: &'a State) -> Self {
        Self { statics, state }
    }
}

impl World for StateWorld<'_> {
    fn contains(&self, fact: &Fact) -> bool {
        self.state.contains(fact) || self.statics.contains(fact)
    }

    fn objects(&self, ty: &Type) -> &[Object] {
        self.statics.objects(ty)
    }
}

/// An action instantiated with concrete objects.
#[derive(Debug, Clone)]
pub struct GroundAction {
    /// Index of the lifted action in the problem.
    pub action: usize,
    pub name: String,
    pub args: Vec<Object>,
    pub binding: Binding,
    pub effect: GroundEffect,
}

impl std::fmt::Display for GroundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, strips_core::format_tuple(&self.args))
    }
}

/// The fluent part of a problem's initial state.
pub fn initial_state(problem: &Problem) -> State {
    let fluent = problem.fluent_predicates();
    problem
        .initial
        .iter()
        .filter(|fact| fluent.contains(&fact.predicate))
        .cloned()
        .collect()
}

/// Instantiate every action over the domain's objects.
///
/// Static preconditions are decided here. Instances whose static part is
/// false are dropped; everything else is left to the search.
pub fn ground_actions(
    problem: &Problem,
    evaluator: &Evaluator,
    statics: &BTreeSet<String>,
    domain: &Domain,
) -> Result<Vec<GroundAction>> {
    let decided = |predicate: &str| statics.contains(predicate);
    let mut grounded = Vec::new();
    for (index, action) in problem.actions.iter().enumerate() {
        let mut kept = 0;
        for_each_assignment(&action.parameters, domain, &mut |args| {
            let binding = strips_core::bind(&action.parameters, args);
            if evaluator.partial_holds(&action.precondition, &binding, domain, &decided)?
                == Some(false)
            {
                return Ok(());
            }
            grounded.push(GroundAction {
                action: index,
                name: action.name.clone(),
                args: args.to_vec(),
                effect: action.ground_effect(&binding)?,
                binding,
            });
            kept += 1;
            Ok(())
        })?;
        debug!("Grounded {} instances of '{}'", kept, action.name);
    }
    Ok(grounded)
}

/// Call `f` with every tuple of domain objects matching the parameter types.
pub(crate) fn for_each_assignment(
    params: &[Param],
    world: &dyn World,
    f: &mut dyn FnMut(&[Object]) -> Result<()>,
) -> Result<()> {
    fn extend(
        params: &[Param],
        world: &dyn World,
        prefix: &mut Vec<Object>,
        f: &mut dyn FnMut(&[Object]) -> Result<()>,
    ) -> Result<()> {
        let Some(param) = params.get(prefix.len()) else {
            return f(prefix);
        };
        for object in world.objects(&param.ty) {
            prefix.push(object.clone());
            extend(params, world, prefix, f)?;
            prefix.pop();
        }
        Ok(())
    }
    extend(params, world, &mut Vec::with_capacity(params.len()), f)
}

/// A finite STRIPS-like instance handed to the search oracle.
pub struct GroundTask<'a> {
    pub actions: Vec<GroundAction>,
    pub initial: State,
    goal: Formula,
    goal_literals: Vec<Formula>,
    problem: &'a Problem,
    evaluator: &'a Evaluator,
    domain: &'a Domain,
}

impl<'a> GroundTask<'a> {
    /// Ground a problem over a domain.
    pub fn new(
        problem: &'a Problem,
        evaluator: &'a Evaluator,
        statics: &BTreeSet<String>,
        domain: &'a Domain,
        initial: State,
    ) -> Result<Self> {
        let actions = ground_actions(problem, evaluator, statics, domain)?;
        debug!(
            "Ground task: {} actions over {} objects and {} static facts",
            actions.len(),
            domain.object_count(),
            domain.fact_count()
        );
        Ok(Self {
            actions,
            initial,
            goal: problem.goal_formula(),
            goal_literals: problem.goal.iter().cloned().map(Formula::from).collect(),
            problem,
            evaluator,
            domain,
        })
    }

    /// The domain this task was grounded over.
    pub fn domain(&self) -> &Domain {
        self.domain
    }

    /// Returns true if the action's precondition holds in the state.
    pub fn applicable(&self, action: &GroundAction, state: &State) -> Result<bool> {
        let world = StateWorld::new(self.domain, state);
        let lifted = &self.problem.actions[action.action];
        self.evaluator
            .holds(&lifted.precondition, &action.binding, &world)
    }

    /// Returns true if the goal holds in the state.
    pub fn is_goal(&self, state: &State) -> Result<bool> {
        let world = StateWorld::new(self.domain, state);
        self.evaluator.holds(&self.goal, &Binding::new(), &world)
    }

    /// Number of goal literals not yet satisfied in the state.
    pub fn unsatisfied_goals(&self, state: &State) -> Result<usize> {
        let world = StateWorld::new(self.domain, state);
        let mut missing = 0;
        for literal in &self.goal_literals {
            if !self.evaluator.holds(literal, &Binding::new(), &world)? {
                missing += 1;
            }
        }
        Ok(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::walker;
    use strips_core::Predicate;

    fn committed(problem: &Problem) -> Domain {
        let mut domain = Domain::new();
        let fluent = problem.fluent_predicates();
        for fact in &problem.initial {
            if fluent.contains(&fact.predicate) {
                for object in &fact.args {
                    domain.add_object(object.clone());
                }
            } else {
                domain.add_fact(fact.clone());
            }
        }
        domain
    }

    #[test]
    fn test_static_preconditions_prune() {
        let (problem, _) = walker();
        let evaluator = Evaluator::new(&problem.axioms).unwrap();
        let domain = committed(&problem);
        let statics = problem.static_predicates();

        let actions = ground_actions(&problem, &evaluator, &statics, &domain).unwrap();
        let names: Vec<String> = actions.iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["step(0, 1)", "step(0, 2)", "step(1, 2)", "step(2, 3)"]);
    }

    #[test]
    fn test_initial_state_keeps_fluents() {
        let (problem, pos) = walker();
        let state = initial_state(&problem);
        assert_eq!(state.len(), 1);
        assert!(state.iter().all(|f| f.predicate == "At" && f.args == vec![pos.object(0)]));
    }

    #[test]
    fn test_task_goal_and_applicability() {
        let (problem, pos) = walker();
        let evaluator = Evaluator::new(&problem.axioms).unwrap();
        let domain = committed(&problem);
        let statics = problem.static_predicates();
        let task = GroundTask::new(&problem, &evaluator, &statics, &domain, initial_state(&problem))
            .unwrap();

        assert!(!task.is_goal(&task.initial).unwrap());
        assert_eq!(task.unsatisfied_goals(&task.initial).unwrap(), 1);

        let first = &task.actions[0];
        assert!(task.applicable(first, &task.initial).unwrap());
        let last = &task.actions[3];
        assert!(!task.applicable(last, &task.initial).unwrap());

        let at = Predicate::new("At", [pos.clone()]);
        let mut goal_state = State::new();
        goal_state.insert(at.fact([pos.object(3)]).unwrap());
        assert!(task.is_goal(&goal_state).unwrap());
    }
}
