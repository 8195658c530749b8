/// Simulator configuration, loadable from RON.
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::schema::value::VariableState;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Knobs for path simulation and suggestion.
///
/// Every field has a default, so a config file only names what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    /// Format used when a story names none, or one that is not registered.
    pub default_format: String,
    /// Variables (matched case-insensitively) that get health warnings.
    pub vital_variables: Vec<String>,
    /// A vital variable at or below this warns.
    pub critical_threshold: f64,
    /// Most paths `suggested_paths` returns.
    pub suggestion_limit: usize,
    /// Most queue entries `suggested_paths` expands.
    pub max_expansions: usize,
    /// State every simulation starts from.
    pub initial_state: VariableState,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_format: "harlowe".to_string(),
            vital_variables: vec!["vita".to_string(), "health".to_string(), "hp".to_string()],
            critical_threshold: 20.0,
            suggestion_limit: 10,
            max_expansions: 10_000,
            initial_state: VariableState::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn load_from_ron(path: &Path) -> Result<SimulatorConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<SimulatorConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }

    pub fn is_vital(&self, name: &str) -> bool {
        self.vital_variables
            .iter()
            .any(|vital| vital.eq_ignore_ascii_case(name))
    }
}
