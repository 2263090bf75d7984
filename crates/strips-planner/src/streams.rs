//! Stream evaluation: eager rounds, optimistic hypotheses, commits and
//! widening.
//!
//! Generators are pulled through a [`CursorArena`] so every input tuple
//! resumes where it stopped; tests go through a [`TestMemo`].

use std::collections::{BTreeMap, BTreeSet};

use strips_core::stream::StreamKind;
use strips_core::{format_tuple, Fact, Object, Problem, Result, Stream, Type, World};
use strips_state::{CursorArena, CursorSummary, FactSource, InstanceKey, Pull, TestMemo, Universe};
use tracing::{debug, trace};

use crate::ground::{for_each_assignment, Domain, GroundAction};
use crate::planner::PlannerConfig;

/// Streams whose outputs could unlock new ground actions.
///
/// A stream is relevant if it certifies a predicate some condition or
/// the goal reads, or if it produces objects of a type that an action
/// parameter, a quantifier or another stream's input ranges over.
pub fn relevant_streams(problem: &Problem) -> Vec<bool> {
    let mut predicates: BTreeSet<String> = BTreeSet::new();
    let mut types: BTreeSet<Type> = BTreeSet::new();
    for action in &problem.actions {
        predicates.extend(action.precondition.predicates());
        types.extend(action.parameters.iter().map(|p| p.ty.clone()));
        types.extend(action.precondition.quantified_params().into_iter().map(|p| p.ty.clone()));
    }
    for axiom in &problem.axioms {
        predicates.extend(axiom.condition.predicates());
        types.extend(axiom.condition.quantified_params().into_iter().map(|p| p.ty.clone()));
    }
    predicates.extend(problem.goal.iter().map(|l| l.atom.name().to_string()));
    for stream in &problem.streams {
        predicates.extend(stream.conditions.iter().map(|a| a.name().to_string()));
        types.extend(stream.inputs.iter().map(|p| p.ty.clone()));
    }

    problem
        .streams
        .iter()
        .map(|stream| {
            stream
                .effect_predicates()
                .iter()
                .any(|p| predicates.contains(*p))
                || stream.outputs.iter().any(|p| types.contains(&p.ty))
        })
        .collect()
}

/// Hypotheses made for one optimistic search.
#[derive(Debug, Default)]
pub struct Optimistic {
    /// Committed universe plus placeholders and hypothesized facts.
    pub domain: Domain,
    placeholders: BTreeMap<Object, InstanceKey>,
    hypothesized: BTreeMap<Fact, InstanceKey>,
}

impl Optimistic {
    /// Number of placeholder objects.
    pub fn placeholder_count(&self) -> usize {
        self.placeholders.len()
    }

    /// Number of hypothesized facts.
    pub fn hypothesis_count(&self) -> usize {
        self.hypothesized.len()
    }

    /// Stream instances a plan relies on.
    ///
    /// `facts` is everything the plan's replay consulted. Every
    /// hypothesized fact among them names its instance, and every
    /// placeholder in those facts or in the plan's arguments names the
    /// generator behind it.
    pub fn required<'a>(
        &self,
        facts: impl IntoIterator<Item = &'a Fact>,
        plan: &[GroundAction],
    ) -> BTreeSet<InstanceKey> {
        let mut required = BTreeSet::new();
        let mut objects: Vec<&Object> = plan.iter().flat_map(|a| a.args.iter()).collect();
        for fact in facts {
            if let Some(key) = self.hypothesized.get(fact) {
                required.insert(key.clone());
            }
            objects.extend(fact.args.iter());
        }
        for object in objects {
            if let Some(key) = self.placeholders.get(object) {
                required.insert(key.clone());
            }
        }
        required
    }
}

/// Drives every stream call made during a solve.
pub struct StreamEvaluator<'a> {
    problem: &'a Problem,
    relevant: Vec<bool>,
    cursors: CursorArena,
    tests: TestMemo,
    calls: usize,
    next_placeholder: u64,
    max_eager_rounds: usize,
    max_duplicate_skips: usize,
    verify_tests: bool,
}

impl<'a> StreamEvaluator<'a> {
    pub fn new(problem: &'a Problem, config: &PlannerConfig) -> Self {
        Self {
            problem,
            relevant: relevant_streams(problem),
            cursors: CursorArena::new(),
            tests: TestMemo::new(),
            calls: 0,
            next_placeholder: 0,
            max_eager_rounds: config.max_eager_rounds,
            max_duplicate_skips: config.max_duplicate_skips,
            verify_tests: config.verify_test_determinism,
        }
    }

    /// Stream calls committed so far.
    pub fn calls(&self) -> usize {
        self.calls
    }

    /// Diagnostics view of the generator cursors.
    pub fn cursor_summaries(&self) -> Vec<CursorSummary> {
        self.cursors.summaries(&self.problem.streams)
    }

    /// Input tuples of a stream whose conditions hold in `world`.
    fn instances(
        &self,
        stream: &Stream,
        world: &dyn World,
        real_only: bool,
    ) -> Result<Vec<Vec<Object>>> {
        let mut instances = Vec::new();
        for_each_assignment(&stream.inputs, world, &mut |inputs| {
            if real_only && inputs.iter().any(Object::is_optimistic) {
                return Ok(());
            }
            let conditions = stream.domain_facts(inputs)?;
            if conditions.iter().all(|fact| world.contains(fact)) {
                instances.push(inputs.to_vec());
            }
            Ok(())
        })?;
        Ok(instances)
    }

    /// Record a stream's results in the universe. Returns how many
    /// objects and facts were new.
    fn fold(
        universe: &mut Universe,
        stream: &Stream,
        inputs: &[Object],
        outputs: &[Object],
    ) -> Result<usize> {
        let mut added = 0;
        for object in outputs {
            added += usize::from(universe.add_object(object.clone())?);
        }
        for fact in stream.certified(inputs, outputs)? {
            let source = FactSource::Stream {
                stream: stream.name.clone(),
                inputs: inputs.to_vec(),
            };
            added += usize::from(universe.add_fact(fact, source)?);
        }
        Ok(added)
    }

    /// Make one committed call of a stream instance.
    ///
    /// Generators advance their cursor by one; tests are evaluated unless
    /// already memoized. Returns the number of new objects and facts.
    fn call(&mut self, universe: &mut Universe, key: &InstanceKey, level: usize) -> Result<usize> {
        let problem = self.problem;
        let stream = &problem.streams[key.stream];
        match &stream.kind {
            StreamKind::Generator(_) => {
                if self.cursors.is_exhausted(key) {
                    return Ok(0);
                }
                self.calls += 1;
                match self
                    .cursors
                    .pull(key, stream, level, self.max_duplicate_skips)?
                {
                    Pull::Output(outputs) => {
                        trace!(
                            "{}({}) -> ({})",
                            stream.name,
                            format_tuple(&key.inputs),
                            format_tuple(&outputs)
                        );
                        Self::fold(universe, stream, &key.inputs, &outputs)
                    }
                    Pull::Exhausted => Ok(0),
                }
            }
            StreamKind::Test(_) => {
                if self.tests.get(key).is_some() {
                    return Ok(0);
                }
                self.calls += 1;
                if self.tests.evaluate(key, stream, self.verify_tests)? {
                    Self::fold(universe, stream, &key.inputs, &[])
                } else {
                    Ok(0)
                }
            }
        }
    }

    /// Evaluate eager streams until nothing new appears.
    ///
    /// Tests run once per instance; generators are pulled once per
    /// instance per level.
    pub fn eager_phase(&mut self, universe: &mut Universe, level: usize) -> Result<usize> {
        let problem = self.problem;
        let mut total = 0;
        for round in 0..self.max_eager_rounds {
            let mut added = 0;
            for (index, stream) in problem.streams.iter().enumerate() {
                if !stream.eager {
                    continue;
                }
                for inputs in self.instances(stream, universe, true)? {
                    let key = InstanceKey::new(index, inputs);
                    let fresh = if stream.is_test() {
                        self.tests.get(&key).is_none()
                    } else {
                        !self.cursors.pulled_at(&key, level) && !self.cursors.is_exhausted(&key)
                    };
                    if fresh {
                        added += self.call(universe, &key, level)?;
                    }
                }
            }
            debug!("Eager round {} at level {} added {}", round, level, added);
            total += added;
            if added == 0 {
                break;
            }
        }
        Ok(total)
    }

    fn placeholder(&mut self, ty: &Type) -> Object {
        let object = Object::optimistic(ty.clone(), self.next_placeholder);
        self.next_placeholder += 1;
        object
    }

    /// Build the optimistic domain for the current universe.
    ///
    /// Every live generator instance with real inputs contributes
    /// placeholders for its next output. Every unevaluated test instance,
    /// placeholders allowed, contributes its effects.
    pub fn optimistic(&mut self, universe: &Universe) -> Result<Optimistic> {
        let problem = self.problem;
        let mut optimistic = Optimistic {
            domain: Domain::from_universe(universe),
            ..Optimistic::default()
        };

        for (index, stream) in problem.streams.iter().enumerate() {
            if stream.is_test() {
                continue;
            }
            for inputs in self.instances(stream, universe, true)? {
                let key = InstanceKey::new(index, inputs);
                if self.cursors.is_exhausted(&key) {
                    continue;
                }
                let outputs: Vec<Object> = stream
                    .outputs
                    .iter()
                    .map(|param| self.placeholder(&param.ty))
                    .collect();
                for object in &outputs {
                    optimistic.domain.add_object(object.clone());
                    optimistic.placeholders.insert(object.clone(), key.clone());
                }
                for fact in stream.certified(&key.inputs, &outputs)? {
                    if optimistic.domain.add_fact(fact.clone()) {
                        optimistic.hypothesized.insert(fact, key.clone());
                    }
                }
            }
        }

        for (index, stream) in problem.streams.iter().enumerate() {
            if !stream.is_test() {
                continue;
            }
            for inputs in self.instances(stream, &optimistic.domain, false)? {
                let key = InstanceKey::new(index, inputs);
                if self.tests.get(&key).is_some() {
                    continue;
                }
                for fact in stream.certified(&key.inputs, &[])? {
                    if optimistic.domain.add_fact(fact.clone()) {
                        optimistic.hypothesized.insert(fact, key.clone());
                    }
                }
            }
        }

        debug!(
            "Optimistic domain: {} placeholders, {} hypothesized facts",
            optimistic.placeholder_count(),
            optimistic.hypothesis_count()
        );
        Ok(optimistic)
    }

    /// Commit the stream instances an optimistic plan relied on.
    ///
    /// Instances with placeholder inputs cannot be called yet and are
    /// skipped. Returns the number of calls made.
    pub fn commit(
        &mut self,
        universe: &mut Universe,
        required: &BTreeSet<InstanceKey>,
        level: usize,
    ) -> Result<usize> {
        let before = self.calls;
        for key in required {
            if key.inputs.iter().any(Object::is_optimistic) {
                continue;
            }
            let added = self.call(universe, key, level)?;
            debug!(
                "Committed {}({}): {} new",
                self.problem.streams[key.stream].name,
                format_tuple(&key.inputs),
                added
            );
        }
        Ok(self.calls - before)
    }

    /// Pull one more output from every relevant lazy generator instance
    /// and settle every relevant test instance over real objects.
    ///
    /// Returns false when nothing is left that could change the universe:
    /// every generator is exhausted and no test added a fact.
    pub fn widen(&mut self, universe: &mut Universe, level: usize) -> Result<bool> {
        let problem = self.problem;
        let mut alive = false;
        for (index, stream) in problem.streams.iter().enumerate() {
            if !self.relevant[index] {
                continue;
            }
            for inputs in self.instances(stream, universe, true)? {
                let key = InstanceKey::new(index, inputs);
                match &stream.kind {
                    StreamKind::Test(_) => {
                        // Unevaluated tests were already hypothesized.
                        alive |= self.call(universe, &key, level)? > 0;
                    }
                    StreamKind::Generator(_) if stream.eager => {
                        alive |= !self.cursors.is_exhausted(&key)
                    }
                    StreamKind::Generator(_) => {
                        if self.cursors.is_exhausted(&key) {
                            continue;
                        }
                        self.call(universe, &key, level)?;
                        alive |= !self.cursors.is_exhausted(&key);
                    }
                }
            }
        }
        debug!("Widened to level {} (streams alive: {})", level, alive);
        Ok(alive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{checked, lazy_walker, reach};
    use strips_core::PlanningError;

    fn seeded(problem: &Problem) -> Universe {
        let mut universe = Universe::new();
        for object in problem.initial_objects() {
            universe.add_object(object).unwrap();
        }
        universe
    }

    #[test]
    fn test_relevance() {
        let (problem, _) = lazy_walker(None);
        assert_eq!(relevant_streams(&problem), vec![true]);
    }

    #[test]
    fn test_eager_tests_are_memoized() {
        let problem = checked(false);
        let mut universe = seeded(&problem);
        let mut streams = StreamEvaluator::new(&problem, &PlannerConfig::default());

        assert_eq!(streams.eager_phase(&mut universe, 0).unwrap(), 1);
        assert_eq!(streams.calls(), 1);
        assert_eq!(streams.eager_phase(&mut universe, 0).unwrap(), 0);
        assert_eq!(streams.calls(), 1);
        assert_eq!(universe.fact_count(), 1);
    }

    #[test]
    fn test_flipping_test_is_fatal() {
        let problem = checked(true);
        let mut universe = seeded(&problem);
        let mut streams = StreamEvaluator::new(&problem, &PlannerConfig::default());
        let err = streams.eager_phase(&mut universe, 0).unwrap_err();
        assert!(matches!(err, PlanningError::NonDeterministicStream { .. }));
    }

    #[test]
    fn test_optimistic_commit_realizes_placeholders() {
        let (problem, pos, conf) = reach();
        let mut universe = seeded(&problem);
        let mut streams = StreamEvaluator::new(&problem, &PlannerConfig::default());

        let optimistic = streams.optimistic(&universe).unwrap();
        assert_eq!(optimistic.placeholder_count(), 1);
        assert_eq!(optimistic.hypothesis_count(), 1);
        assert_eq!(optimistic.domain.objects(&conf).len(), 1);
        assert!(optimistic.domain.objects(&conf)[0].is_optimistic());

        let required = optimistic.required(std::iter::empty(), &[]);
        assert!(required.is_empty());

        let placeholder = optimistic.domain.objects(&conf)[0].clone();
        let plan = vec![GroundAction {
            action: 0,
            name: "go".to_string(),
            args: vec![pos.object(5), placeholder],
            binding: Default::default(),
            effect: Default::default(),
        }];
        let required = optimistic.required(std::iter::empty(), &plan);
        assert_eq!(required.len(), 1);

        assert_eq!(streams.commit(&mut universe, &required, 0).unwrap(), 1);
        assert!(universe.contains_object(&conf.object(50)));
        assert_eq!(universe.fact_count(), 1);

        // The only output was consumed, so nothing is hypothesized again.
        streams.commit(&mut universe, &required, 0).unwrap();
        let again = streams.optimistic(&universe).unwrap();
        assert_eq!(again.placeholder_count(), 0);
    }

    #[test]
    fn test_widen_until_exhausted() {
        let (problem, pos) = lazy_walker(Some(1));
        let mut universe = seeded(&problem);
        let mut streams = StreamEvaluator::new(&problem, &PlannerConfig::default());

        assert!(streams.widen(&mut universe, 1).unwrap());
        assert!(universe.contains_object(&pos.object(1)));
        assert!(!streams.widen(&mut universe, 2).unwrap());

        let summaries = streams.cursor_summaries();
        assert!(summaries.iter().all(|s| s.exhausted));
        assert!(summaries.iter().all(|s| s.yielded <= 1));
    }
}
