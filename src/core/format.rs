/// Story format abstraction: the evaluator and format traits plus a registry
/// of format factories keyed by name.
use rustc_hash::FxHashMap;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};
use thiserror::Error;

use super::conditional::ChainError;
use super::evaluator::EvalError;
use super::harlowe::HarloweFormat;
use super::literal::LiteralsResult;
use crate::schema::value::{Value, VariableState};

/// Evaluates expressions for one story format against a variable state.
pub trait Evaluator: Send {
    fn state(&self) -> &VariableState;
    fn set_state(&mut self, state: VariableState);
    /// Moves the state out, leaving the evaluator empty.
    fn take_state(&mut self) -> VariableState;
    fn evaluate_expression(&self, expression: &str) -> Result<Value, EvalError>;
    fn evaluate_condition(&self, condition: &str) -> Result<bool, EvalError>;
    fn set_visited_passages(&mut self, visited: FxHashMap<String, u32>);
    fn set_history(&mut self, history: Vec<String>);
    fn set_current_passage(&mut self, title: &str);
    /// Lets a format recover its own concrete evaluator.
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// A story format: how passage text is executed and inspected.
pub trait StoryFormat: Send + Sync {
    fn name(&self) -> &str;

    fn create_evaluator(&self, state: VariableState) -> Box<dyn Evaluator>;

    /// Run every state-changing macro in `content` against `evaluator`.
    fn process_passage_content(
        &self,
        content: &str,
        evaluator: &mut dyn Evaluator,
    ) -> Result<(), FormatError>;

    /// Link targets in order of appearance.
    fn parse_links(&self, content: &str) -> Vec<String>;

    /// Variables the passage assigns, with their statically known values.
    fn parse_variables(&self, content: &str) -> VariableState;

    /// Prose with all code removed.
    fn strip_code(&self, content: &str) -> String;

    fn extract_literals(&self, content: &str) -> LiteralsResult;
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormatError {
    #[error("evaluator was not created by the {expected} format")]
    ForeignEvaluator { expected: &'static str },
    #[error("{}", join_errors(.0))]
    Macros(Vec<MacroError>),
}

impl FormatError {
    /// The individual macro failures, if any.
    pub fn macro_errors(&self) -> &[MacroError] {
        match self {
            FormatError::Macros(errors) => errors,
            FormatError::ForeignEvaluator { .. } => &[],
        }
    }
}

fn join_errors(errors: &[MacroError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MacroError {
    #[error("({macro_name}:) is malformed: {reason}")]
    Malformed {
        macro_name: String,
        reason: String,
    },
    #[error("({macro_name}:) failed in '{snippet}': {source}")]
    Failed {
        macro_name: String,
        snippet: String,
        source: EvalError,
    },
    #[error(transparent)]
    Chain(#[from] ChainError),
}

impl MacroError {
    /// Errors in the shape of the code, as opposed to its runtime values.
    pub fn is_structural(&self) -> bool {
        match self {
            MacroError::Malformed { .. } => true,
            MacroError::Failed { .. } => false,
            MacroError::Chain(err) => err.is_structural(),
        }
    }
}

type FormatFactory = Box<dyn Fn() -> Box<dyn StoryFormat> + Send + Sync>;

/// Thread-safe name -> format factory table.
///
/// Names are matched case-insensitively.
pub struct FormatRegistry {
    factories: RwLock<HashMap<String, FormatFactory>>,
}

impl FormatRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// A registry with every built-in format.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register("harlowe", || Box::new(HarloweFormat));
        registry
    }

    /// Register a format factory, replacing any previous one of that name.
    pub fn register<F>(&self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn StoryFormat> + Send + Sync + 'static,
    {
        let mut factories = self.factories.write().unwrap_or_else(PoisonError::into_inner);
        if factories
            .insert(name.to_lowercase(), Box::new(factory))
            .is_some()
        {
            log::debug!("format '{name}' re-registered");
        }
    }

    /// A fresh instance of the named format.
    pub fn get(&self, name: &str) -> Option<Box<dyn StoryFormat>> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.get(&name.to_lowercase()).map(|factory| factory())
    }

    pub fn is_registered(&self, name: &str) -> bool {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        factories.contains_key(&name.to_lowercase())
    }

    /// Registered names, sorted.
    pub fn available_formats(&self) -> Vec<String> {
        let factories = self.factories.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = factories.keys().cloned().collect();
        names.sort_unstable();
        names
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for FormatRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FormatRegistry")
            .field("formats", &self.available_formats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn defaults_include_harlowe() {
        let registry = FormatRegistry::with_defaults();
        assert!(registry.is_registered("harlowe"));
        assert_eq!(registry.available_formats(), vec!["harlowe"]);
        assert_eq!(registry.get("harlowe").unwrap().name(), "harlowe");
    }

    #[test]
    fn lookup_ignores_case() {
        let registry = FormatRegistry::with_defaults();
        assert!(registry.get("Harlowe").is_some());
        assert!(registry.is_registered("HARLOWE"));
        assert!(registry.get("sugarcube").is_none());
    }

    #[test]
    fn empty_registry_has_nothing() {
        let registry = FormatRegistry::new();
        assert!(registry.available_formats().is_empty());
        assert!(registry.get("harlowe").is_none());
    }

    #[test]
    fn registering_under_an_alias() {
        let registry = FormatRegistry::new();
        registry.register("Harlowe3", || Box::new(HarloweFormat));
        registry.register("custom", || Box::new(HarloweFormat));
        assert_eq!(registry.available_formats(), vec!["custom", "harlowe3"]);
    }

    #[test]
    fn concurrent_reads_and_writes() {
        let registry = Arc::new(FormatRegistry::with_defaults());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    registry.register(&format!("alias{i}"), || Box::new(HarloweFormat));
                    registry.get("harlowe").is_some()
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(registry.available_formats().len(), 5);
    }

    #[test]
    fn macro_errors_join_into_one_message() {
        let err = FormatError::Macros(vec![
            MacroError::Malformed {
                macro_name: "set".into(),
                reason: "missing 'to'".into(),
            },
            MacroError::Failed {
                macro_name: "set".into(),
                snippet: "$x to $y's z".into(),
                source: EvalError::UndefinedVariable("y".into()),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "(set:) is malformed: missing 'to'; (set:) failed in '$x to $y's z': variable $y does not exist"
        );
        assert!(err.macro_errors()[0].is_structural());
        assert!(!err.macro_errors()[1].is_structural());
    }
}
