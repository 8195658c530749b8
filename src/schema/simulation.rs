/// Simulation records: what a path replay reports back to its caller.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use super::value::{Value, VariableState};

/// Why a path cannot be replayed. Steps are 1-based.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("step {step}: passage '{title}' does not exist")]
    UnknownPassage { step: usize, title: String },
    #[error("step {step}→{next}: '{from}' has no direct link to '{to}'. available links: {available:?}")]
    NotLinked {
        step: usize,
        next: usize,
        from: String,
        to: String,
        available: Vec<String>,
    },
}

/// How one variable moved across one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableChange {
    pub name: String,
    pub previous: Option<Value>,
    pub current: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<f64>,
}

impl VariableChange {
    /// `delta` is present only when both sides are numbers.
    pub fn between(name: &str, previous: Option<&Value>, current: &Value) -> Self {
        let delta = match (previous, current) {
            (Some(Value::Number(before)), Value::Number(after)) => Some(after - before),
            _ => None,
        };
        Self {
            name: name.to_string(),
            previous: previous.cloned(),
            current: current.clone(),
            delta,
        }
    }

    pub fn is_changed(&self) -> bool {
        self.previous.as_ref() != Some(&self.current)
    }
}

/// Outcome of processing one passage of a path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub passage_title: String,
    #[serde(rename = "passage_index")]
    pub index: usize,
    pub changes: BTreeMap<String, VariableChange>,
    pub warnings: Vec<String>,
    pub available_links: Vec<String>,
}

/// Outcome of a whole path replay.
///
/// On validation failure `steps` is empty and `errors` says why.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SimulationResult {
    pub success: bool,
    pub path: Vec<String>,
    pub steps: Vec<StepResult>,
    pub final_state: VariableState,
    pub errors: Vec<String>,
    pub total_warnings: usize,
}

impl SimulationResult {
    pub fn rejected(path: Vec<String>, errors: &[PathError]) -> Self {
        Self {
            success: false,
            path,
            errors: errors.iter().map(ToString::to_string).collect(),
            ..Self::default()
        }
    }
}
