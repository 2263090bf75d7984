//! Plans and their human-readable rendering.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{format_tuple, Object};

/// One fully instantiated action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Action name.
    pub action: String,
    /// Objects bound to the action's parameters, in order.
    pub args: Vec<Object>,
}

impl PlanStep {
    /// Create a new step.
    pub fn new(action: impl Into<String>, args: Vec<Object>) -> Self {
        Self {
            action: action.into(),
            args,
        }
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.action, format_tuple(&self.args))
    }
}

/// Maps objects to the text shown for them.
pub type DisplayMap = HashMap<Object, String>;

/// An ordered sequence of grounded actions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<PlanStep>,
}

impl Plan {
    /// Create a plan from steps.
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the plan has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Number of steps using the given action.
    pub fn count(&self, action: &str) -> usize {
        self.steps.iter().filter(|s| s.action == action).count()
    }

    /// Render as `(action_name, bound args…)` rows.
    ///
    /// Objects missing from `names` are shown with their own `Display`.
    pub fn render(&self, names: &DisplayMap) -> Vec<(String, Vec<String>)> {
        self.steps
            .iter()
            .map(|step| {
                let args = step
                    .args
                    .iter()
                    .map(|o| names.get(o).cloned().unwrap_or_else(|| o.to_string()))
                    .collect();
                (step.action.clone(), args)
            })
            .collect()
    }

    /// Serialize the plan as pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, step) in self.steps.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{:>3}. {}", index + 1, step)?;
        }
        Ok(())
    }
}
