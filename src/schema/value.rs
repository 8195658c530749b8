/// Value model: the dynamic values Harlowe expressions produce and variables hold.
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Variable name (without the `$` sigil) to value.
pub type VariableState = BTreeMap<String, Value>;

/// A dynamically typed Harlowe value.
///
/// Datamaps are ordered by key so that rendering, and therefore dataset
/// identity, is deterministic. A dataset keeps its members in first-seen
/// order and never holds two members with the same [`Value::to_literal`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Array(Vec<Value>),
    Datamap(BTreeMap<String, Value>),
    Dataset(Vec<Value>),
    Empty,
}

/// Names accepted on the right of `is a` / `matches`.
pub const TYPE_NAMES: [&str; 7] = [
    "number", "string", "boolean", "array", "datamap", "dataset", "empty",
];

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Array(_) => "array",
            Self::Datamap(_) => "datamap",
            Self::Dataset(_) => "dataset",
            Self::Empty => "empty",
        }
    }

    /// Condition truth for a value.
    ///
    /// Datasets and empty values are never truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Array(items) => !items.is_empty(),
            Self::Datamap(map) => !map.is_empty(),
            Self::Dataset(_) | Self::Empty => false,
        }
    }

    /// Numeric view of the value. Strings that parse as numbers count.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Text used when this value is a datamap key (`of`, `contains`).
    pub fn as_key(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Source-text rendering that evaluates back to an equal value.
    pub fn to_literal(&self) -> String {
        match self {
            Self::Number(n) => format_number(*n),
            Self::String(s) => quote(s),
            Self::Boolean(b) => b.to_string(),
            Self::Array(items) => render_macro("a", items.iter().map(Value::to_literal)),
            Self::Dataset(items) => render_macro("ds", items.iter().map(Value::to_literal)),
            Self::Datamap(map) => render_macro(
                "dm",
                map.iter()
                    .flat_map(|(k, v)| [quote(k), v.to_literal()]),
            ),
            Self::Empty => "empty".to_string(),
        }
    }

    /// Generic equality: numeric first (numeric strings included), then
    /// same-type comparison, then rendered text.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        match (self, other) {
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            _ => self.to_literal() == other.to_literal(),
        }
    }

    /// Builds a dataset, dropping members whose rendering was already seen.
    pub fn dataset_from(items: impl IntoIterator<Item = Value>) -> Self {
        let mut seen = FxHashSet::default();
        let members = items
            .into_iter()
            .filter(|v| seen.insert(v.to_literal()))
            .collect();
        Self::Dataset(members)
    }
}

/// Right-biased union of two datamaps.
pub fn merge_datamaps(
    left: &BTreeMap<String, Value>,
    right: &BTreeMap<String, Value>,
) -> BTreeMap<String, Value> {
    let mut merged = left.clone();
    for (key, value) in right {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Integral numbers print without a decimal part.
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn render_macro(name: &str, parts: impl Iterator<Item = String>) -> String {
    let body: Vec<String> = parts.collect();
    if body.is_empty() {
        format!("({name}:)")
    } else {
        format!("({name}: {})", body.join(", "))
    }
}

/// Printed form, as story text would show it.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", format_number(*n)),
            Self::String(s) => write!(f, "{s}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Array(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
            Self::Datamap(_) | Self::Dataset(_) => write!(f, "{}", self.to_literal()),
            Self::Empty => Ok(()),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}
