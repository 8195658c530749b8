/// Collection literals: `(a:)`, `(dm:)` and `(ds:)` bodies turned into values.
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

use super::evaluator::HarloweEvaluator;
use super::format::Evaluator;
use super::scan;
use crate::schema::value::Value;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LiteralError {
    #[error("not a collection literal: {0}")]
    NotALiteral(String),
    #[error("unterminated literal: {0}")]
    Unterminated(String),
    #[error("(dm:) needs key/value pairs but got an odd number of elements ({0})")]
    OddElements(usize),
    #[error("unexpected text after literal: {0}")]
    TrailingText(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiteralKind {
    Array,
    Datamap,
    Dataset,
}

impl LiteralKind {
    pub fn from_macro(name: &str) -> Option<Self> {
        match name {
            "a" | "array" => Some(Self::Array),
            "dm" | "datamap" => Some(Self::Datamap),
            "ds" | "dataset" => Some(Self::Dataset),
            _ => None,
        }
    }
}

/// A literal found in passage text, with what it evaluates to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiteralInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passage: Option<String>,
    pub raw: String,
    pub parsed: Value,
}

/// Every literal in a block of text, grouped by kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LiteralsResult {
    pub arrays: Vec<LiteralInfo>,
    pub datamaps: Vec<LiteralInfo>,
    pub datasets: Vec<LiteralInfo>,
}

impl LiteralsResult {
    pub fn len(&self) -> usize {
        self.arrays.len() + self.datamaps.len() + self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stamps every entry with the passage it came from.
    pub fn in_passage(mut self, title: &str) -> Self {
        for info in self
            .arrays
            .iter_mut()
            .chain(self.datamaps.iter_mut())
            .chain(self.datasets.iter_mut())
        {
            info.passage = Some(title.to_string());
        }
        self
    }
}

/// Parse a literal with no variables in scope.
pub fn parse_literal(text: &str) -> Result<Value, LiteralError> {
    parse_literal_with(text, &HarloweEvaluator::default())
}

/// Parse a literal, evaluating its elements with `evaluator`.
///
/// An element that does not evaluate is kept as its raw trimmed text.
pub fn parse_literal_with(text: &str, evaluator: &dyn Evaluator) -> Result<Value, LiteralError> {
    let text = text.trim();
    let kind = scan::macro_name_at(text, 0)
        .and_then(|(name, _)| LiteralKind::from_macro(&name))
        .ok_or_else(|| LiteralError::NotALiteral(text.to_string()))?;
    let span =
        scan::macro_at(text, 0).ok_or_else(|| LiteralError::Unterminated(text.to_string()))?;
    if span.end != text.len() {
        return Err(LiteralError::TrailingText(text[span.end..].to_string()));
    }

    let elements = scan::smart_split(span.body);
    match kind {
        LiteralKind::Array => Ok(Value::Array(
            elements
                .iter()
                .map(|e| element_value(e, evaluator))
                .collect(),
        )),
        LiteralKind::Dataset => Ok(Value::dataset_from(
            elements.iter().map(|e| element_value(e, evaluator)),
        )),
        LiteralKind::Datamap => {
            if elements.len() % 2 != 0 {
                return Err(LiteralError::OddElements(elements.len()));
            }
            let mut map = BTreeMap::new();
            for pair in elements.chunks(2) {
                let key = pair[0].trim_matches(|c| c == '"' || c == '\'');
                map.insert(key.to_string(), element_value(pair[1], evaluator));
            }
            Ok(Value::Datamap(map))
        }
    }
}

fn element_value(element: &str, evaluator: &dyn Evaluator) -> Value {
    evaluator.evaluate_expression(element).unwrap_or_else(|err| {
        log::debug!("literal element '{element}' kept as text: {err}");
        Value::String(element.to_string())
    })
}

/// Finds every literal in `content`, nested ones included.
///
/// Literals that fail to parse are skipped.
pub fn extract_all(content: &str) -> LiteralsResult {
    let evaluator = HarloweEvaluator::default();
    let mut result = LiteralsResult::default();
    let mut from = 0;

    while let Some((start, name)) = scan::next_macro_opener(content, from) {
        from = start + 1;
        let Some(kind) = LiteralKind::from_macro(&name) else {
            continue;
        };
        let Some(span) = scan::macro_at(content, start) else {
            continue;
        };
        let raw = span.raw(content);
        match parse_literal_with(raw, &evaluator) {
            Ok(parsed) => {
                let info = LiteralInfo {
                    passage: None,
                    raw: raw.to_string(),
                    parsed,
                };
                match kind {
                    LiteralKind::Array => result.arrays.push(info),
                    LiteralKind::Datamap => result.datamaps.push(info),
                    LiteralKind::Dataset => result.datasets.push(info),
                }
            }
            Err(err) => log::debug!("skipping literal {raw}: {err}"),
        }
    }

    result
}
