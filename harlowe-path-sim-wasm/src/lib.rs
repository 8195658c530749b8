//! WASM bindings for harlowe-path-sim: path replay for browser-based story editors.

use wasm_bindgen::prelude::*;

use harlowe_path_sim::core::conditional::ConditionalProcessor;
use harlowe_path_sim::core::config::SimulatorConfig;
use harlowe_path_sim::core::format::{Evaluator, FormatRegistry};
use harlowe_path_sim::core::simulator::PathSimulator;
use harlowe_path_sim::schema::story::{Passage, Story};
use harlowe_path_sim::schema::value::VariableState;

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(serde::Deserialize)]
struct StoryInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    format: String,
    #[serde(default)]
    start: Option<String>,
    passages: Vec<Passage>,
}

#[derive(serde::Serialize)]
struct ValidationReport {
    valid: bool,
    errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------
fn parse_state(state_json: &str) -> Result<VariableState, JsError> {
    if state_json.trim().is_empty() {
        return Ok(VariableState::new());
    }
    serde_json::from_str(state_json).map_err(|e| JsError::new(&format!("Invalid state JSON: {e}")))
}

fn parse_path(path_json: &str) -> Result<Vec<String>, JsError> {
    serde_json::from_str(path_json).map_err(|e| JsError::new(&format!("Invalid path JSON: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsError> {
    serde_json::to_string(value).map_err(|e| JsError::new(&format!("Serialization error: {e}")))
}

// ---------------------------------------------------------------------------
// StorySession: one loaded story plus its simulator settings
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StorySession {
    story: Story,
    registry: FormatRegistry,
    config: SimulatorConfig,
}

#[wasm_bindgen]
impl StorySession {
    /// Load a story from JSON: `{ title, format, start, passages: [{ title, tags, content }] }`.
    #[wasm_bindgen(constructor)]
    pub fn new(story_json: &str) -> Result<StorySession, JsError> {
        let input: StoryInput = serde_json::from_str(story_json)
            .map_err(|e| JsError::new(&format!("Invalid story JSON: {e}")))?;

        let mut story = Story::new(input.title, input.format);
        story.start = input.start;
        for passage in input.passages {
            story.add_passage(passage);
        }

        Ok(StorySession {
            story,
            registry: FormatRegistry::with_defaults(),
            config: SimulatorConfig::default(),
        })
    }

    /// Replace the simulator config with one given as JSON. Missing fields keep their defaults.
    pub fn configure(&mut self, config_json: &str) -> Result<(), JsError> {
        self.config = serde_json::from_str(config_json)
            .map_err(|e| JsError::new(&format!("Invalid config JSON: {e}")))?;
        Ok(())
    }

    /// Return `{ valid, errors }` for a JSON array of passage titles.
    pub fn validate_path(&self, path_json: &str) -> Result<String, JsError> {
        let path = parse_path(path_json)?;
        let errors: Vec<String> = self
            .simulator()?
            .validate_path(&path)
            .iter()
            .map(ToString::to_string)
            .collect();
        to_json(&ValidationReport {
            valid: errors.is_empty(),
            errors,
        })
    }

    /// Replay a JSON array of passage titles and return the simulation result.
    pub fn simulate_path(&self, path_json: &str) -> Result<String, JsError> {
        let path = parse_path(path_json)?;
        to_json(&self.simulator()?.simulate_path(&path))
    }

    /// Return a JSON array of suggested paths out of `start`.
    pub fn suggest_paths(&self, start: &str, max_depth: usize) -> Result<String, JsError> {
        to_json(&self.simulator()?.suggested_paths(start, max_depth))
    }

    /// Simulate a seeded random walk out of `start`.
    pub fn random_walk(&self, start: &str, max_steps: usize, seed: u64) -> Result<String, JsError> {
        let sim = self.simulator()?;
        let walk = sim.random_walk(start, max_steps, seed);
        to_json(&sim.simulate_path(&walk))
    }

    /// Return a JSON array of link targets out of `title`.
    pub fn links(&self, title: &str) -> Result<String, JsError> {
        to_json(&self.simulator()?.links_from(title))
    }

    /// Return a JSON array of passage titles, sorted.
    pub fn titles(&self) -> String {
        serde_json::to_string(&self.story.titles()).unwrap_or_else(|_| "[]".to_string())
    }
}

// Private helpers
impl StorySession {
    fn simulator(&self) -> Result<PathSimulator<'_>, JsError> {
        PathSimulator::builder(&self.story)
            .registry(&self.registry)
            .config(self.config.clone())
            .build()
            .map_err(|e| JsError::new(&format!("Simulator error: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Stateless helpers
// ---------------------------------------------------------------------------

/// Evaluate a Harlowe expression against a JSON state and return the value as JSON.
#[wasm_bindgen]
pub fn evaluate(expression: &str, state_json: &str) -> Result<String, JsError> {
    let registry = FormatRegistry::with_defaults();
    let format = registry
        .get("harlowe")
        .ok_or_else(|| JsError::new("Harlowe format is not registered"))?;
    let evaluator = format.create_evaluator(parse_state(state_json)?);
    let value = evaluator
        .evaluate_expression(expression)
        .map_err(|e| JsError::new(&format!("Evaluation error: {e}")))?;
    to_json(&value)
}

/// Resolve an `(if:)` chain against a JSON state and return
/// `{ condition_met, active_hook, hook_type }`.
#[wasm_bindgen]
pub fn resolve_chain(chain: &str, state_json: &str) -> Result<String, JsError> {
    let registry = FormatRegistry::with_defaults();
    let format = registry
        .get("harlowe")
        .ok_or_else(|| JsError::new("Harlowe format is not registered"))?;
    let evaluator = format.create_evaluator(parse_state(state_json)?);
    let result = ConditionalProcessor::new(evaluator.as_ref())
        .process_chain(chain)
        .map_err(|e| JsError::new(&format!("Chain error: {e}")))?;
    to_json(&result)
}

/// Return a JSON array of registered story format names.
#[wasm_bindgen]
pub fn formats() -> String {
    serde_json::to_string(&FormatRegistry::with_defaults().available_formats())
        .unwrap_or_else(|_| "[]".to_string())
}
