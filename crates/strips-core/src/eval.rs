//! Formula evaluation against a world, with axioms derived on demand.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{PlanningError, Result};
use crate::formula::Formula;
use crate::operator::Axiom;
use crate::predicate::{Atom, Fact};
use crate::types::{Binding, Object, Param, Type};

/// What a formula is evaluated against: base facts and typed object domains.
pub trait World {
    /// Returns true if the base (static or fluent) fact is known true.
    fn contains(&self, fact: &Fact) -> bool;

    /// Objects of a type, used as quantifier domains.
    fn objects(&self, ty: &Type) -> &[Object];
}

/// Rollback point inside a [`SupportSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SupportMark(usize, usize);

/// Receives the facts a satisfied formula relied on.
pub trait SupportSink {
    fn mark(&self) -> SupportMark;
    fn rollback(&mut self, mark: SupportMark);
    fn base(&mut self, fact: &Fact);
    fn derived(&mut self, fact: &Fact);
}

impl SupportSink for () {
    fn mark(&self) -> SupportMark {
        SupportMark::default()
    }
    fn rollback(&mut self, _mark: SupportMark) {}
    fn base(&mut self, _fact: &Fact) {}
    fn derived(&mut self, _fact: &Fact) {}
}

/// Collected support of one evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Support {
    /// Base facts consulted and found true.
    pub facts: Vec<Fact>,
    /// Derived facts inferred through axioms.
    pub derived: Vec<Fact>,
}

impl SupportSink for Support {
    fn mark(&self) -> SupportMark {
        SupportMark(self.facts.len(), self.derived.len())
    }

    fn rollback(&mut self, mark: SupportMark) {
        self.facts.truncate(mark.0);
        self.derived.truncate(mark.1);
    }

    fn base(&mut self, fact: &Fact) {
        self.facts.push(fact.clone());
    }

    fn derived(&mut self, fact: &Fact) {
        self.derived.push(fact.clone());
    }
}

/// Evaluates formulas, inferring derived predicates through axioms.
///
/// Derived facts are never cached across calls, so every state sees a
/// fresh derivation.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    axioms: BTreeMap<String, Vec<Axiom>>,
}

impl Evaluator {
    /// Index the axioms and reject cyclic derived predicates.
    pub fn new(axioms: &[Axiom]) -> Result<Self> {
        let mut index: BTreeMap<String, Vec<Axiom>> = BTreeMap::new();
        for axiom in axioms {
            index
                .entry(axiom.predicate().to_string())
                .or_default()
                .push(axiom.clone());
        }
        let evaluator = Self { axioms: index };
        evaluator.check_acyclic()?;
        Ok(evaluator)
    }

    /// Returns true if the predicate is inferred by axioms.
    pub fn is_derived(&self, predicate: &str) -> bool {
        self.axioms.contains_key(predicate)
    }

    /// Names of all derived predicates.
    pub fn derived_predicates(&self) -> impl Iterator<Item = &str> {
        self.axioms.keys().map(String::as_str)
    }

    /// Axioms for a derived predicate.
    pub fn axioms_for(&self, predicate: &str) -> &[Axiom] {
        self.axioms.get(predicate).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Derived predicates each derived predicate depends on.
    fn dependencies(&self) -> BTreeMap<&str, BTreeSet<String>> {
        self.axioms
            .iter()
            .map(|(name, axioms)| {
                let deps = axioms
                    .iter()
                    .flat_map(|a| a.condition.predicates())
                    .filter(|p| self.is_derived(p))
                    .collect();
                (name.as_str(), deps)
            })
            .collect()
    }

    fn check_acyclic(&self) -> Result<()> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Visiting,
            Done,
        }

        fn visit<'a>(
            node: &'a str,
            graph: &'a BTreeMap<&'a str, BTreeSet<String>>,
            marks: &mut BTreeMap<&'a str, Mark>,
            path: &mut Vec<&'a str>,
        ) -> Result<()> {
            match marks.get(node) {
                Some(Mark::Done) => return Ok(()),
                Some(Mark::Visiting) => {
                    let start = path.iter().position(|p| *p == node).unwrap_or(0);
                    let mut chain: Vec<String> =
                        path[start..].iter().map(|p| p.to_string()).collect();
                    chain.push(node.to_string());
                    return Err(PlanningError::AxiomCycle {
                        predicate: node.to_string(),
                        chain,
                    });
                }
                None => {}
            }
            marks.insert(node, Mark::Visiting);
            path.push(node);
            if let Some(deps) = graph.get(node) {
                for dep in deps {
                    visit(dep.as_str(), graph, marks, path)?;
                }
            }
            path.pop();
            marks.insert(node, Mark::Done);
            Ok(())
        }

        let graph = self.dependencies();
        let mut marks = BTreeMap::new();
        for node in graph.keys() {
            visit(*node, &graph, &mut marks, &mut Vec::new())?;
        }
        Ok(())
    }

    /// Evaluate a formula under a binding.
    pub fn holds(&self, formula: &Formula, binding: &Binding, world: &dyn World) -> Result<bool> {
        self.eval(formula, binding, world, &mut ())
    }

    /// Evaluate a formula, recording the facts it relied on.
    pub fn holds_with_support(
        &self,
        formula: &Formula,
        binding: &Binding,
        world: &dyn World,
        sink: &mut dyn SupportSink,
    ) -> Result<bool> {
        self.eval(formula, binding, world, sink)
    }

    /// Evaluate a single ground fact, deriving it if needed.
    pub fn fact_holds(
        &self,
        fact: &Fact,
        world: &dyn World,
        sink: &mut dyn SupportSink,
    ) -> Result<bool> {
        let axioms = match self.axioms.get(&fact.predicate) {
            Some(axioms) => axioms,
            None => {
                let found = world.contains(fact);
                if found {
                    sink.base(fact);
                }
                return Ok(found);
            }
        };
        for axiom in axioms {
            let Some(binding) = axiom.unify(fact) else {
                continue;
            };
            let mark = sink.mark();
            if self.eval(&axiom.condition, &binding, world, sink)? {
                sink.derived(fact);
                return Ok(true);
            }
            sink.rollback(mark);
        }
        Ok(false)
    }

    fn eval(
        &self,
        formula: &Formula,
        binding: &Binding,
        world: &dyn World,
        sink: &mut dyn SupportSink,
    ) -> Result<bool> {
        match formula {
            Formula::True => Ok(true),
            Formula::Atom(atom) => self.atom_holds(atom, binding, world, sink),
            Formula::Not(inner) => {
                let mark = sink.mark();
                let value = self.eval(inner, binding, world, sink)?;
                sink.rollback(mark);
                Ok(!value)
            }
            Formula::And(parts) => {
                let mark = sink.mark();
                for part in parts {
                    if !self.eval(part, binding, world, sink)? {
                        sink.rollback(mark);
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Formula::Or(parts) => {
                for part in parts {
                    let mark = sink.mark();
                    if self.eval(part, binding, world, sink)? {
                        return Ok(true);
                    }
                    sink.rollback(mark);
                }
                Ok(false)
            }
            Formula::Exists(params, body) => {
                let mut found = false;
                for_each_binding(params, binding, world, &mut |inner| {
                    let mark = sink.mark();
                    if self.eval(body, inner, world, sink)? {
                        found = true;
                        return Ok(false);
                    }
                    sink.rollback(mark);
                    Ok(true)
                })?;
                Ok(found)
            }
            Formula::ForAll(params, body) => {
                let mark = sink.mark();
                let mut all = true;
                for_each_binding(params, binding, world, &mut |inner| {
                    if !self.eval(body, inner, world, sink)? {
                        all = false;
                        return Ok(false);
                    }
                    Ok(true)
                })?;
                if !all {
                    sink.rollback(mark);
                }
                Ok(all)
            }
            Formula::Equal(left, right) => Ok(left.resolve(binding)? == right.resolve(binding)?),
        }
    }

    fn atom_holds(
        &self,
        atom: &Atom,
        binding: &Binding,
        world: &dyn World,
        sink: &mut dyn SupportSink,
    ) -> Result<bool> {
        let fact = atom.ground(binding)?;
        self.fact_holds(&fact, world, sink)
    }

    /// Three-valued evaluation used while grounding.
    ///
    /// Atoms whose predicate `decided` rejects evaluate to unknown (`None`);
    /// connectives follow Kleene logic.
    pub fn partial_holds(
        &self,
        formula: &Formula,
        binding: &Binding,
        world: &dyn World,
        decided: &dyn Fn(&str) -> bool,
    ) -> Result<Option<bool>> {
        match formula {
            Formula::True => Ok(Some(true)),
            Formula::Atom(atom) => {
                if !decided(atom.name()) || self.is_derived(atom.name()) {
                    return Ok(None);
                }
                Ok(Some(world.contains(&atom.ground(binding)?)))
            }
            Formula::Not(inner) => {
                Ok(self.partial_holds(inner, binding, world, decided)?.map(|v| !v))
            }
            Formula::And(parts) => {
                let mut result = Some(true);
                for part in parts {
                    match self.partial_holds(part, binding, world, decided)? {
                        Some(false) => return Ok(Some(false)),
                        Some(true) => {}
                        None => result = None,
                    }
                }
                Ok(result)
            }
            Formula::Or(parts) => {
                let mut result = Some(false);
                for part in parts {
                    match self.partial_holds(part, binding, world, decided)? {
                        Some(true) => return Ok(Some(true)),
                        Some(false) => {}
                        None => result = None,
                    }
                }
                Ok(result)
            }
            Formula::Exists(params, body) | Formula::ForAll(params, body) => {
                let existential = matches!(formula, Formula::Exists(..));
                let mut result = Some(!existential);
                for_each_binding(params, binding, world, &mut |inner| {
                    match self.partial_holds(body, inner, world, decided)? {
                        Some(value) if value == existential => {
                            result = Some(existential);
                            return Ok(false);
                        }
                        Some(_) => {}
                        None => result = None,
                    }
                    Ok(true)
                })?;
                Ok(result)
            }
            Formula::Equal(left, right) => {
                Ok(Some(left.resolve(binding)? == right.resolve(binding)?))
            }
        }
    }
}

/// Visit every extension of `binding` over the parameters' domains.
///
/// The visitor returns `Ok(false)` to stop early.
fn for_each_binding(
    params: &[Param],
    binding: &Binding,
    world: &dyn World,
    visit: &mut dyn FnMut(&Binding) -> Result<bool>,
) -> Result<bool> {
    let Some((first, rest)) = params.split_first() else {
        return visit(binding);
    };
    for object in world.objects(&first.ty) {
        let mut inner = binding.clone();
        inner.insert(first.name.clone(), object.clone());
        if !for_each_binding(rest, &inner, world, visit)? {
            return Ok(false);
        }
    }
    Ok(true)
}
