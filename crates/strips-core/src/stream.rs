//! Conditional stream declarations.
//!
//! A stream is either a generator, producing a lazy (possibly infinite)
//! sequence of output tuples for bound inputs, or a test, a pure boolean
//! function of bound inputs. Streams are evaluated by the planner; this
//! module only declares them.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::error::{PlanningError, Result};
use crate::predicate::{Atom, Fact};
use crate::types::{bind, format_tuple, Binding, Object, Param};

/// Lazy sequence of output tuples.
pub type OutputIter = Box<dyn Iterator<Item = Vec<Object>> + Send>;

/// Opens a fresh output sequence for an input tuple.
pub type GeneratorFn = dyn Fn(&[Object]) -> OutputIter + Send + Sync;

/// Decides a test for an input tuple.
pub type TestFn = dyn Fn(&[Object]) -> bool + Send + Sync;

/// How a stream produces its facts.
#[derive(Clone)]
pub enum StreamKind {
    Generator(Arc<GeneratorFn>),
    Test(Arc<TestFn>),
}

impl fmt::Debug for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Generator(_) => f.write_str("Generator"),
            StreamKind::Test(_) => f.write_str("Test"),
        }
    }
}

/// A declared conditional stream.
#[derive(Debug, Clone)]
pub struct Stream {
    pub name: String,
    pub inputs: Vec<Param>,
    pub outputs: Vec<Param>,
    /// Atoms over the inputs that must already hold.
    pub conditions: Vec<Atom>,
    /// Atoms asserted for every produced tuple.
    pub effects: Vec<Atom>,
    pub kind: StreamKind,
    /// Evaluate for all reachable inputs before each search attempt.
    pub eager: bool,
}

impl Stream {
    /// Create a new StreamBuilder.
    pub fn builder(name: impl Into<String>) -> StreamBuilder {
        StreamBuilder::new(name)
    }

    /// Returns true for test streams.
    pub fn is_test(&self) -> bool {
        matches!(self.kind, StreamKind::Test(_))
    }

    /// Names of the predicates this stream certifies.
    pub fn effect_predicates(&self) -> BTreeSet<&str> {
        self.effects.iter().map(Atom::name).collect()
    }

    /// Binding of the input parameters.
    pub fn bind_inputs(&self, inputs: &[Object]) -> Binding {
        bind(&self.inputs, inputs)
    }

    /// Check a produced tuple against the declared outputs.
    pub fn check_outputs(&self, inputs: &[Object], outputs: &[Object]) -> Result<()> {
        let context = || format!("stream '{}' on ({})", self.name, format_tuple(inputs));
        if outputs.len() != self.outputs.len() {
            return Err(PlanningError::ArityMismatch {
                context: context(),
                expected: self.outputs.len(),
                found: outputs.len(),
            });
        }
        for (param, object) in self.outputs.iter().zip(outputs) {
            if param.ty != object.ty {
                return Err(PlanningError::TypeMismatch {
                    context: format!("{} output {}", context(), param),
                    expected: param.ty.to_string(),
                    found: object.ty.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Ground the effects for an input tuple and its outputs.
    pub fn certified(&self, inputs: &[Object], outputs: &[Object]) -> Result<Vec<Fact>> {
        let mut binding = self.bind_inputs(inputs);
        binding.extend(bind(&self.outputs, outputs));
        self.effects.iter().map(|atom| atom.ground(&binding)).collect()
    }

    /// Ground the conditions for an input tuple.
    pub fn domain_facts(&self, inputs: &[Object]) -> Result<Vec<Fact>> {
        let binding = self.bind_inputs(inputs);
        self.conditions.iter().map(|atom| atom.ground(&binding)).collect()
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let list = |params: &[Param]| {
            params
                .iter()
                .map(|p| format!("{}: {}", p, p.ty))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let atoms = |atoms: &[Atom]| {
            atoms
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        };
        write!(
            f,
            "{} {}[{}] -> [{}] if [{}] certifies [{}]{}",
            if self.is_test() { "test" } else { "gen" },
            self.name,
            list(&self.inputs),
            list(&self.outputs),
            atoms(&self.conditions),
            atoms(&self.effects),
            if self.eager { " (eager)" } else { "" }
        )
    }
}

/// Builder for creating Streams with a fluent API.
#[derive(Debug)]
pub struct StreamBuilder {
    name: String,
    inputs: Vec<Param>,
    outputs: Vec<Param>,
    conditions: Vec<Atom>,
    effects: Vec<Atom>,
    kind: Option<StreamKind>,
    eager: bool,
}

impl StreamBuilder {
    /// Create a new StreamBuilder.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            conditions: Vec::new(),
            effects: Vec::new(),
            kind: None,
            eager: false,
        }
    }

    /// Add an input parameter.
    pub fn input(mut self, param: Param) -> Self {
        self.inputs.push(param);
        self
    }

    /// Add several input parameters.
    pub fn inputs(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.inputs.extend(params);
        self
    }

    /// Add an output parameter.
    pub fn output(mut self, param: Param) -> Self {
        self.outputs.push(param);
        self
    }

    /// Add a condition atom.
    pub fn condition(mut self, atom: Atom) -> Self {
        self.conditions.push(atom);
        self
    }

    /// Add an effect atom.
    pub fn effect(mut self, atom: Atom) -> Self {
        self.effects.push(atom);
        self
    }

    /// Mark the stream as eager.
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Use a generator function.
    pub fn generator<F, I>(mut self, generate: F) -> Self
    where
        F: Fn(&[Object]) -> I + Send + Sync + 'static,
        I: IntoIterator<Item = Vec<Object>>,
        I::IntoIter: Send + 'static,
    {
        let open = move |inputs: &[Object]| -> OutputIter { Box::new(generate(inputs).into_iter()) };
        self.kind = Some(StreamKind::Generator(Arc::new(open)));
        self
    }

    /// Use a test function.
    pub fn test<F>(mut self, test: F) -> Self
    where
        F: Fn(&[Object]) -> bool + Send + Sync + 'static,
    {
        self.kind = Some(StreamKind::Test(Arc::new(test)));
        self
    }

    /// Build the Stream.
    pub fn build(self) -> Result<Stream> {
        let malformed = |message: String| PlanningError::MalformedStream {
            stream: self.name.clone(),
            message,
        };

        let kind = self
            .kind
            .clone()
            .ok_or_else(|| malformed("a generator or test function is required".to_string()))?;

        if matches!(kind, StreamKind::Test(_)) && !self.outputs.is_empty() {
            return Err(malformed("test streams cannot declare outputs".to_string()));
        }

        let mut seen = BTreeSet::new();
        for param in self.inputs.iter().chain(&self.outputs) {
            if !seen.insert(param.name.as_str()) {
                return Err(malformed(format!("parameter {} declared twice", param)));
            }
        }

        let inputs: BTreeSet<&str> = self.inputs.iter().map(|p| p.name.as_str()).collect();
        for atom in &self.conditions {
            if let Some(param) = atom.params().find(|p| !inputs.contains(p.name.as_str())) {
                return Err(malformed(format!(
                    "condition {} mentions {} which is not an input",
                    atom, param
                )));
            }
        }
        for atom in &self.effects {
            if let Some(param) = atom.params().find(|p| !seen.contains(p.name.as_str())) {
                return Err(malformed(format!(
                    "effect {} mentions undeclared {}",
                    atom, param
                )));
            }
        }

        Ok(Stream {
            name: self.name,
            inputs: self.inputs,
            outputs: self.outputs,
            conditions: self.conditions,
            effects: self.effects,
            kind,
            eager: self.eager,
        })
    }
}
