/// Path simulator: validates a path against the link graph, replays it
/// passage by passage and reports how the variables evolved.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::config::{ConfigError, SimulatorConfig};
use crate::core::format::{FormatError, FormatRegistry, StoryFormat};
use crate::schema::simulation::{PathError, SimulationResult, StepResult, VariableChange};
use crate::schema::story::Story;
use crate::schema::value::{format_number, Value, VariableState};

#[derive(Debug, Error)]
pub enum SimulatorError {
    #[error("unknown story format '{name}'. registered formats: {available:?}")]
    UnknownFormat { name: String, available: Vec<String> },
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

/// Replays paths through one story.
///
/// Each call to [`PathSimulator::simulate_path`] starts from the configured
/// initial state with fresh visit counts; nothing carries over between calls.
pub struct PathSimulator<'s> {
    story: &'s Story,
    format: Box<dyn StoryFormat>,
    config: SimulatorConfig,
}

/// Builder for constructing a `PathSimulator`.
pub struct PathSimulatorBuilder<'s, 'r> {
    story: &'s Story,
    registry: Option<&'r FormatRegistry>,
    config: Option<SimulatorConfig>,
    config_path: Option<PathBuf>,
    /// Directly provided format (for testing without a registry).
    format: Option<Box<dyn StoryFormat>>,
}

impl<'s> PathSimulator<'s> {
    pub fn builder<'r>(story: &'s Story) -> PathSimulatorBuilder<'s, 'r> {
        PathSimulatorBuilder {
            story,
            registry: None,
            config: None,
            config_path: None,
            format: None,
        }
    }

    /// A simulator with the default config and the story's own format.
    pub fn new(story: &'s Story, registry: &FormatRegistry) -> Result<Self, SimulatorError> {
        Self::builder(story).registry(registry).build()
    }

    pub fn story(&self) -> &Story {
        self.story
    }

    pub fn format(&self) -> &dyn StoryFormat {
        self.format.as_ref()
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Outbound link targets of a passage; empty for unknown titles.
    pub fn links_from(&self, title: &str) -> Vec<String> {
        self.story
            .passage(title)
            .map(|p| self.format.parse_links(&p.content))
            .unwrap_or_default()
    }

    /// Every reason `path` cannot be replayed; empty when it can.
    ///
    /// Unknown titles are reported first, then each consecutive pair whose
    /// first passage does not link to the second.
    pub fn validate_path<S: AsRef<str>>(&self, path: &[S]) -> Vec<PathError> {
        let mut errors: Vec<PathError> = path
            .iter()
            .enumerate()
            .filter(|(_, title)| !self.story.contains(title.as_ref()))
            .map(|(i, title)| PathError::UnknownPassage {
                step: i + 1,
                title: title.as_ref().to_string(),
            })
            .collect();

        for (i, pair) in path.windows(2).enumerate() {
            let (from, to) = (pair[0].as_ref(), pair[1].as_ref());
            if !self.story.contains(from) {
                continue;
            }
            let links = self.links_from(from);
            if !links.iter().any(|link| link == to) {
                errors.push(PathError::NotLinked {
                    step: i + 1,
                    next: i + 2,
                    from: from.to_string(),
                    to: to.to_string(),
                    available: links,
                });
            }
        }

        errors
    }

    /// Replay `path` from the initial state.
    ///
    /// Never fails: an invalid path yields `success == false` with the
    /// validation errors, and macro failures become step warnings.
    pub fn simulate_path<S: AsRef<str>>(&self, path: &[S]) -> SimulationResult {
        let titles: Vec<String> = path.iter().map(|t| t.as_ref().to_string()).collect();
        let errors = self.validate_path(&titles);
        if !errors.is_empty() {
            log::info!("path rejected with {} error(s)", errors.len());
            return SimulationResult::rejected(titles, &errors);
        }

        let mut state = self.config.initial_state.clone();
        let mut visited: FxHashMap<String, u32> = FxHashMap::default();
        let mut history: Vec<String> = Vec::with_capacity(titles.len());
        let mut steps = Vec::with_capacity(titles.len());

        for (i, title) in titles.iter().enumerate() {
            let Some(passage) = self.story.passage(title) else {
                continue;
            };
            *visited.entry(title.clone()).or_insert(0) += 1;
            history.push(title.clone());

            let before = state.clone();
            let mut evaluator = self.format.create_evaluator(state);
            evaluator.set_visited_passages(visited.clone());
            evaluator.set_history(history.clone());
            evaluator.set_current_passage(title);

            let mut warnings = Vec::new();
            if let Err(err) = self
                .format
                .process_passage_content(&passage.content, evaluator.as_mut())
            {
                log::warn!("passage '{title}': {err}");
                match &err {
                    FormatError::Macros(failures) => warnings.extend(
                        failures
                            .iter()
                            .map(|failure| format!("processing error: {failure}")),
                    ),
                    other => warnings.push(format!("processing error: {other}")),
                }
            }
            state = evaluator.take_state();

            let changes: BTreeMap<String, VariableChange> = state
                .iter()
                .map(|(name, current)| {
                    (
                        name.clone(),
                        VariableChange::between(name, before.get(name), current),
                    )
                })
                .collect();
            warnings.extend(self.vital_warnings(&state));

            log::debug!(
                "step {}: '{title}' changed {} variable(s), {} warning(s)",
                i + 1,
                changes.values().filter(|c| c.is_changed()).count(),
                warnings.len()
            );

            steps.push(StepResult {
                passage_title: title.clone(),
                index: i + 1,
                changes,
                warnings,
                available_links: self.links_from(title),
            });
        }

        let total_warnings = steps.iter().map(|s| s.warnings.len()).sum();
        SimulationResult {
            success: true,
            path: titles,
            steps,
            final_state: state,
            errors: Vec::new(),
            total_warnings,
        }
    }

    fn vital_warnings(&self, state: &VariableState) -> Vec<String> {
        state
            .iter()
            .filter(|(name, _)| self.config.is_vital(name))
            .filter_map(|(name, value)| match value {
                Value::Number(n) if *n <= 0.0 => {
                    Some(format!("{name} is at 0 or negative ({})", format_number(*n)))
                }
                Value::Number(n) if *n <= self.config.critical_threshold => Some(format!(
                    "{name} is below critical threshold ({} <= {})",
                    format_number(*n),
                    format_number(self.config.critical_threshold)
                )),
                _ => None,
            })
            .collect()
    }

    /// Breadth-first candidate paths from `start`.
    ///
    /// A path is collected once it has followed `max_depth` links or reached
    /// a passage with no links. The search stops at `suggestion_limit`
    /// paths or `max_expansions` queue entries, whichever comes first.
    pub fn suggested_paths(&self, start: &str, max_depth: usize) -> Vec<Vec<String>> {
        let mut paths = Vec::new();
        let mut queue: VecDeque<Vec<String>> = VecDeque::from([vec![start.to_string()]]);
        let mut expansions = 0;

        while let Some(path) = queue.pop_front() {
            if paths.len() >= self.config.suggestion_limit || expansions >= self.config.max_expansions {
                break;
            }
            expansions += 1;

            if path.len() > max_depth {
                paths.push(path);
                continue;
            }
            let Some(last) = path.last() else {
                continue;
            };
            let Some(passage) = self.story.passage(last) else {
                continue;
            };
            let links = self.format.parse_links(&passage.content);
            if links.is_empty() {
                paths.push(path);
                continue;
            }
            for link in links {
                let mut next = path.clone();
                next.push(link);
                queue.push_back(next);
            }
        }

        paths
    }

    /// A seeded random walk of at most `max_steps` links from `start`.
    ///
    /// Links to missing passages are never taken. Empty if `start` does
    /// not exist.
    pub fn random_walk(&self, start: &str, max_steps: usize, seed: u64) -> Vec<String> {
        if !self.story.contains(start) {
            return Vec::new();
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut path = vec![start.to_string()];
        for _ in 0..max_steps {
            let Some(current) = path.last() else {
                break;
            };
            let links: Vec<String> = self
                .links_from(current)
                .into_iter()
                .filter(|link| self.story.contains(link))
                .collect();
            match links.choose(&mut rng) {
                Some(next) => path.push(next.clone()),
                None => break,
            }
        }
        path
    }
}

impl<'s, 'r> PathSimulatorBuilder<'s, 'r> {
    pub fn registry(mut self, registry: &'r FormatRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: SimulatorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the config from a RON file when building.
    pub fn config_file(mut self, path: &Path) -> Self {
        self.config_path = Some(path.to_path_buf());
        self
    }

    /// Provide the format directly (for testing without a registry).
    pub fn with_format(mut self, format: Box<dyn StoryFormat>) -> Self {
        self.format = Some(format);
        self
    }

    pub fn build(self) -> Result<PathSimulator<'s>, SimulatorError> {
        let config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => SimulatorConfig::load_from_ron(path)?,
            (None, None) => SimulatorConfig::default(),
        };
        let format = match self.format {
            Some(format) => format,
            None => {
                let defaults;
                let registry = match self.registry {
                    Some(registry) => registry,
                    None => {
                        defaults = FormatRegistry::with_defaults();
                        &defaults
                    }
                };
                resolve_format(self.story, registry, &config)?
            }
        };
        Ok(PathSimulator {
            story: self.story,
            format,
            config,
        })
    }
}

/// The story's declared format, else the configured default.
fn resolve_format(
    story: &Story,
    registry: &FormatRegistry,
    config: &SimulatorConfig,
) -> Result<Box<dyn StoryFormat>, SimulatorError> {
    if !story.format.is_empty() {
        if let Some(format) = registry.get(&story.format) {
            return Ok(format);
        }
        log::warn!(
            "story format '{}' is not registered; using '{}'",
            story.format,
            config.default_format
        );
    }
    registry
        .get(&config.default_format)
        .ok_or_else(|| SimulatorError::UnknownFormat {
            name: config.default_format.clone(),
            available: registry.available_formats(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::story::Passage;

    fn story() -> Story {
        Story::new("Test", "harlowe")
            .with_passage(Passage::new("A", "(set: $hp to 100)[[B]]"))
            .with_passage(Passage::new("B", "(set: $hp to it - 85)[[C]] [[A]]"))
            .with_passage(Passage::new("C", "(set: $hp to it - 20)The end."))
    }

    #[test]
    fn validate_reports_unknown_and_unlinked() {
        let story = story();
        let sim = PathSimulator::builder(&story).build().unwrap();
        assert!(sim.validate_path(&["A", "B", "C"]).is_empty());

        let errors = sim.validate_path(&["A", "C"]);
        assert_eq!(errors.len(), 1);
        assert!(matches!(&errors[0], PathError::NotLinked { from, to, available, .. }
            if from == "A" && to == "C" && available == &vec!["B".to_string()]));

        let errors = sim.validate_path(&["A", "Z"]);
        assert!(matches!(&errors[0], PathError::UnknownPassage { step: 2, title } if title == "Z"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn simulate_records_changes_and_warnings() {
        let story = story();
        let sim = PathSimulator::builder(&story).build().unwrap();
        let result = sim.simulate_path(&["A", "B", "C"]);
        assert!(result.success);
        assert_eq!(result.steps.len(), 3);

        let first = &result.steps[0].changes["hp"];
        assert_eq!(first.previous, None);
        assert_eq!(first.delta, None);

        assert_eq!(result.steps[1].changes["hp"].delta, Some(-85.0));
        assert_eq!(
            result.steps[1].warnings,
            vec!["hp is below critical threshold (15 <= 20)"]
        );
        assert_eq!(result.steps[2].warnings, vec!["hp is at 0 or negative (-5)"]);
        assert_eq!(result.total_warnings, 2);
        assert_eq!(result.final_state["hp"], Value::from(-5));
        assert_eq!(result.steps[1].available_links, vec!["C", "A"]);
        assert_eq!(result.steps[2].index, 3);
    }

    #[test]
    fn rejected_path_runs_nothing() {
        let story = story();
        let sim = PathSimulator::builder(&story).build().unwrap();
        let result = sim.simulate_path(&["A", "C"]);
        assert!(!result.success);
        assert!(result.steps.is_empty());
        assert!(result.final_state.is_empty());
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn runs_are_independent() {
        let story = story();
        let sim = PathSimulator::builder(&story).build().unwrap();
        let first = sim.simulate_path(&["A", "B"]);
        let second = sim.simulate_path(&["A", "B"]);
        assert_eq!(first, second);
    }

    #[test]
    fn suggestions_stop_at_depth_and_dead_ends() {
        let story = story();
        let sim = PathSimulator::builder(&story).build().unwrap();
        let paths = sim.suggested_paths("A", 2);
        assert_eq!(
            paths,
            vec![
                vec!["A".to_string(), "B".into(), "C".into()],
                vec!["A".to_string(), "B".into(), "A".into()],
            ]
        );
        assert_eq!(sim.suggested_paths("C", 5), vec![vec!["C".to_string()]]);
        assert!(sim.suggested_paths("Nowhere", 3).is_empty());
    }

    #[test]
    fn suggestion_limit_caps_cycles() {
        let story = story();
        let config = SimulatorConfig {
            suggestion_limit: 3,
            ..SimulatorConfig::default()
        };
        let sim = PathSimulator::builder(&story).config(config).build().unwrap();
        // Every trip round the A-B cycle ends in one more path through C.
        assert_eq!(sim.suggested_paths("A", 50).len(), 3);

        let config = SimulatorConfig {
            max_expansions: 4,
            ..SimulatorConfig::default()
        };
        let sim = PathSimulator::builder(&story).config(config).build().unwrap();
        assert_eq!(sim.suggested_paths("A", 50), vec![vec!["A".to_string(), "B".into(), "C".into()]]);
    }

    #[test]
    fn random_walk_is_seeded_and_follows_links() {
        let story = story();
        let sim = PathSimulator::builder(&story).build().unwrap();
        let walk = sim.random_walk("A", 8, 42);
        assert_eq!(walk, sim.random_walk("A", 8, 42));
        assert_eq!(walk[0], "A");
        assert!(sim.validate_path(&walk).is_empty());
        assert!(sim.random_walk("Nowhere", 3, 1).is_empty());
    }

    #[test]
    fn unknown_story_format_falls_back_to_default() {
        let story = Story::new("S", "SugarCube").with_passage(Passage::new("A", ""));
        let sim = PathSimulator::builder(&story).build().unwrap();
        assert_eq!(sim.format().name(), "harlowe");

        let config = SimulatorConfig {
            default_format: "chapbook".to_string(),
            ..SimulatorConfig::default()
        };
        let err = PathSimulator::builder(&story).config(config).build().err().unwrap();
        assert!(matches!(err, SimulatorError::UnknownFormat { ref name, .. } if name == "chapbook"));
    }
}
