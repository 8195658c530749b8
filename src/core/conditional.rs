/// Conditional chains: `(if:)`/`(unless:)` followed by any number of
/// `(else-if:)` nodes and an optional `(else:)`, resolved to at most one
/// active hook.
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::evaluator::EvalError;
use super::format::Evaluator;
use super::scan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookKind {
    If,
    ElseIf,
    Else,
    Unless,
}

impl HookKind {
    /// The chain node a macro name opens, if any.
    pub fn from_macro(name: &str) -> Option<Self> {
        match name {
            "if" => Some(Self::If),
            "else-if" | "elseif" => Some(Self::ElseIf),
            "else" => Some(Self::Else),
            "unless" => Some(Self::Unless),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::ElseIf => "else-if",
            Self::Else => "else",
            Self::Unless => "unless",
        }
    }

    fn starts_chain(self) -> bool {
        matches!(self, Self::If | Self::Unless)
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChainError {
    #[error("not a conditional chain: {0}")]
    NotAChain(String),
    #[error("({kind}:) must follow an (if:) or (unless:) chain")]
    OrphanBranch { kind: HookKind },
    #[error("({kind}:) has no hook; it must be followed directly by [...]")]
    MissingHook { kind: HookKind },
    #[error("({kind}:) needs a condition")]
    MissingCondition { kind: HookKind },
    #[error("(else:) takes no condition, found '{0}'")]
    ElseWithCondition(String),
    #[error("({kind}:) is never closed")]
    UnterminatedMacro { kind: HookKind },
    #[error("the hook of ({kind}:) is never closed")]
    UnterminatedHook { kind: HookKind },
    #[error("({kind}: {condition}) could not be evaluated: {source}")]
    Condition {
        kind: HookKind,
        condition: String,
        source: EvalError,
    },
}

impl ChainError {
    /// True for malformed chains, false for condition failures.
    pub fn is_structural(&self) -> bool {
        !matches!(self, ChainError::Condition { .. })
    }
}

/// The outcome of resolving one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalResult {
    pub condition_met: bool,
    /// Hook text of the active node; empty when no node is active.
    pub active_hook: String,
    /// Kind of the active node, or of the last node when none is active.
    pub hook_type: HookKind,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainNode {
    pub kind: HookKind,
    /// `None` only for `else`.
    pub condition: Option<String>,
    pub hook: String,
}

/// A parsed chain and how many bytes of the source it spans.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalChain {
    pub nodes: Vec<ChainNode>,
    /// Byte offset one past the last hook's `]`.
    pub len: usize,
}

impl ConditionalChain {
    /// Parse the chain at the start of `text` (leading whitespace allowed).
    ///
    /// Whitespace may separate nodes. The chain ends after an `else`, at a
    /// new `if`/`unless`, or at the first text that is not a chain node.
    pub fn parse(text: &str) -> Result<Self, ChainError> {
        let bytes = text.as_bytes();
        let mut nodes: Vec<ChainNode> = Vec::new();
        let mut pos = skip_whitespace(text, 0);
        let mut len = 0;

        loop {
            let kind = scan::macro_name_at(text, pos).and_then(|(name, _)| HookKind::from_macro(&name));
            let Some(kind) = kind else {
                if nodes.is_empty() {
                    return Err(ChainError::NotAChain(snippet(&text[pos..])));
                }
                break;
            };
            if nodes.is_empty() && !kind.starts_chain() {
                return Err(ChainError::OrphanBranch { kind });
            }
            if !nodes.is_empty() && kind.starts_chain() {
                break;
            }

            let span = scan::macro_at(text, pos).ok_or(ChainError::UnterminatedMacro { kind })?;
            let condition = span.body.trim();
            let condition = match kind {
                HookKind::Else if !condition.is_empty() => {
                    return Err(ChainError::ElseWithCondition(condition.to_string()));
                }
                HookKind::Else => None,
                _ if condition.is_empty() => return Err(ChainError::MissingCondition { kind }),
                _ => Some(condition.to_string()),
            };

            if bytes.get(span.end) != Some(&b'[') {
                return Err(ChainError::MissingHook { kind });
            }
            let hook_end =
                scan::find_hook_end(text, span.end).ok_or(ChainError::UnterminatedHook { kind })?;
            nodes.push(ChainNode {
                kind,
                condition,
                hook: text[span.end + 1..hook_end].to_string(),
            });
            len = hook_end + 1;

            if kind == HookKind::Else {
                break;
            }
            pos = skip_whitespace(text, len);
        }

        Ok(Self { nodes, len })
    }

    /// Index of the active node: the first whose own test holds.
    ///
    /// `unless` inverts the leading test only.
    pub fn active_index(&self, evaluator: &dyn Evaluator) -> Result<Option<usize>, ChainError> {
        for (index, node) in self.nodes.iter().enumerate() {
            let holds = match (&node.kind, &node.condition) {
                (HookKind::Else, _) | (_, None) => true,
                (kind, Some(condition)) => {
                    let value = evaluator.evaluate_condition(condition).map_err(|source| {
                        ChainError::Condition {
                            kind: *kind,
                            condition: condition.clone(),
                            source,
                        }
                    })?;
                    if *kind == HookKind::Unless {
                        !value
                    } else {
                        value
                    }
                }
            };
            if holds {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    pub fn resolve(&self, evaluator: &dyn Evaluator) -> Result<ConditionalResult, ChainError> {
        let result = match self.active_index(evaluator)? {
            Some(index) => {
                let node = &self.nodes[index];
                ConditionalResult {
                    condition_met: true,
                    active_hook: node.hook.clone(),
                    hook_type: node.kind,
                }
            }
            None => ConditionalResult {
                condition_met: false,
                active_hook: String::new(),
                hook_type: self.nodes.last().map_or(HookKind::If, |n| n.kind),
            },
        };
        Ok(result)
    }
}

fn skip_whitespace(text: &str, from: usize) -> usize {
    let rest = &text[from..];
    from + (rest.len() - rest.trim_start().len())
}

fn snippet(text: &str) -> String {
    text.chars().take(40).collect()
}

/// Resolves chains against one evaluator.
pub struct ConditionalProcessor<'e> {
    evaluator: &'e dyn Evaluator,
}

impl<'e> ConditionalProcessor<'e> {
    pub fn new(evaluator: &'e dyn Evaluator) -> Self {
        Self { evaluator }
    }

    /// Parse and resolve the chain at the start of `text`.
    pub fn process_chain(&self, text: &str) -> Result<ConditionalResult, ChainError> {
        ConditionalChain::parse(text)?.resolve(self.evaluator)
    }

    pub fn evaluate_condition(&self, condition: &str) -> Result<bool, EvalError> {
        self.evaluator.evaluate_condition(condition)
    }
}
