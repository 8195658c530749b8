/// Harlowe expression evaluator: values, operators and state-writing helpers.
use rustc_hash::FxHashMap;
use std::any::Any;
use std::collections::BTreeMap;
use thiserror::Error;

use super::expr::{self, BinaryOp, Expr, ParseError, Segment};
use super::format::Evaluator;
use super::lexer::{self, LexError};
use super::literal::{self, LiteralError, LiteralKind};
use crate::schema::value::{merge_datamaps, Value, VariableState};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error: {0}")]
    Syntax(#[from] ParseError),
    #[error("variable ${0} does not exist")]
    UndefinedVariable(String),
    #[error("property '{segment}' does not exist")]
    MissingProperty { segment: String },
    #[error("cannot read '{segment}' from a {found}, only from a datamap")]
    NotADatamap { segment: String, found: &'static str },
    #[error("'{segment}' needs an array, found a {found}")]
    NotAnArray { segment: String, found: &'static str },
    #[error("'{segment}' is out of bounds for an array of {len} elements")]
    IndexOutOfBounds { segment: String, len: usize },
    #[error("key '{key}' not found in datamap. available keys: {available:?}")]
    MissingKey { key: String, available: Vec<String> },
    #[error("cannot use '{op}' with a {left} and a {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },
    #[error("cannot compare non-numeric values with '{op}'")]
    NonNumericComparison { op: &'static str },
    #[error("unrecognized expression: {0}")]
    Unrecognized(String),
    #[error("unknown macro ({0}:)")]
    UnknownMacro(String),
    #[error("cannot set a property of ${name}: it does not exist; declare it first with (set: ${name} to (dm:))")]
    UndeclaredBase { name: String },
    #[error("'{0}' is not a variable or property path")]
    InvalidTarget(String),
    #[error(transparent)]
    Literal(#[from] LiteralError),
}

impl From<LexError> for EvalError {
    fn from(err: LexError) -> Self {
        EvalError::Syntax(ParseError::Lex(err))
    }
}

/// What the simulator tells the evaluator about the walk so far.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    pub visited_counts: FxHashMap<String, u32>,
    pub history: Vec<String>,
    pub current_passage: String,
}

/// Evaluates Harlowe expressions against the variable state it owns.
#[derive(Debug, Clone, Default)]
pub struct HarloweEvaluator {
    state: VariableState,
    context: EvaluationContext,
}

impl HarloweEvaluator {
    pub fn new(state: VariableState) -> Self {
        Self {
            state,
            context: EvaluationContext::default(),
        }
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    pub fn into_state(self) -> VariableState {
        self.state
    }

    /// Evaluate an expression to a value.
    pub fn evaluate(&self, expression: &str) -> Result<Value, EvalError> {
        let tree = expr::parse(expression)?;
        self.eval(&tree)
    }

    /// Evaluate an expression and take its truthiness.
    pub fn condition(&self, expression: &str) -> Result<bool, EvalError> {
        Ok(self.evaluate(expression)?.is_truthy())
    }

    pub fn visit_count(&self, title: &str) -> u32 {
        self.context.visited_counts.get(title).copied().unwrap_or(0)
    }

    fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::String(s.clone())),
            Expr::Bool(b) => Ok(Value::Boolean(*b)),
            Expr::TypeName(name) => Ok(Value::String(name.clone())),
            // Unset variables read as 0.
            Expr::Variable(name) => Ok(self.state.get(name).cloned().unwrap_or(Value::Number(0.0))),
            Expr::Visits => Ok(Value::Number(f64::from(
                self.visit_count(&self.context.current_passage),
            ))),
            Expr::It => Err(EvalError::Unrecognized("it".to_string())),
            Expr::Word(word) => Err(EvalError::Unrecognized(word.clone())),
            Expr::Macro { name, body, raw } => self.eval_macro(name, body, raw),
            Expr::Property { base, segments } => self.eval_property(base, segments),
            Expr::Not(inner) => Ok(Value::Boolean(!self.eval(inner)?.is_truthy())),
            Expr::Neg(inner) => {
                let value = self.eval(inner)?;
                match value.as_number() {
                    Some(n) => Ok(Value::Number(-n)),
                    None => Err(EvalError::TypeMismatch {
                        op: "-",
                        left: "number",
                        right: value.type_name(),
                    }),
                }
            }
            Expr::And(operands) => {
                for operand in operands {
                    if !self.eval(operand)?.is_truthy() {
                        return Ok(Value::Boolean(false));
                    }
                }
                Ok(Value::Boolean(true))
            }
            Expr::Or(operands) => {
                for operand in operands {
                    if self.eval(operand)?.is_truthy() {
                        return Ok(Value::Boolean(true));
                    }
                }
                Ok(Value::Boolean(false))
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                apply_binary(*op, left, right)
            }
        }
    }

    fn eval_macro(&self, name: &str, body: &str, raw: &str) -> Result<Value, EvalError> {
        if LiteralKind::from_macro(name).is_some() {
            return Ok(literal::parse_literal_with(raw, self)?);
        }
        match name {
            "visited" => {
                let title = self.evaluate(body)?.as_key();
                Ok(Value::Number(f64::from(self.visit_count(&title))))
            }
            "history" => Ok(Value::Array(
                self.context
                    .history
                    .iter()
                    .map(|t| Value::String(t.clone()))
                    .collect(),
            )),
            other => Err(EvalError::UnknownMacro(other.to_string())),
        }
    }

    fn eval_property(&self, base: &Expr, segments: &[Segment]) -> Result<Value, EvalError> {
        let mut current = match base {
            Expr::Variable(name) => self
                .state
                .get(name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone()))?,
            other => self.eval(other)?,
        };
        for segment in segments {
            current = read_segment(current, segment)?;
        }
        Ok(current)
    }

    /// Write `value` through a possessive path such as `$hero's bag's lamp`.
    ///
    /// Missing intermediate datamaps are created; the base variable is not.
    pub fn set_property(&mut self, path: &str, value: Value) -> Result<(), EvalError> {
        let (base, keys) = parse_target(path)?;
        if keys.is_empty() {
            return Err(EvalError::InvalidTarget(path.to_string()));
        }
        self.write_path(&base, &keys, value)
    }

    /// `(put: value into target)`.
    pub fn put(&mut self, value: Value, target: &str) -> Result<(), EvalError> {
        let (base, keys) = parse_target(target)?;
        if keys.is_empty() {
            self.state.insert(base, value);
            Ok(())
        } else {
            self.write_path(&base, &keys, value)
        }
    }

    /// `(move: source into target)`: the source is left holding 0.
    pub fn move_into(&mut self, source: &str, target: &str) -> Result<(), EvalError> {
        let (name, keys) = parse_target(source)?;
        if !keys.is_empty() {
            return Err(EvalError::InvalidTarget(source.to_string()));
        }
        let value = self
            .state
            .get(&name)
            .cloned()
            .ok_or_else(|| EvalError::UndefinedVariable(name.clone()))?;
        self.put(value, target)?;
        self.state.insert(name, Value::Number(0.0));
        Ok(())
    }

    /// Replace the word `it` in `expression` with the literal form of
    /// `target`'s current value.
    pub fn replace_it_keyword(&self, expression: &str, target: &str) -> Result<String, EvalError> {
        if !lexer::contains_word(expression, "it")? {
            return Ok(expression.to_string());
        }
        let (name, keys) = parse_target(target)?;
        let current = if keys.is_empty() {
            self.state
                .get(&name)
                .cloned()
                .ok_or_else(|| EvalError::UndefinedVariable(name.clone()))?
        } else {
            self.evaluate(target)?
        };
        Ok(lexer::replace_word(expression, "it", &current.to_literal())?)
    }

    fn write_path(&mut self, base: &str, keys: &[String], value: Value) -> Result<(), EvalError> {
        let root = self
            .state
            .get_mut(base)
            .ok_or_else(|| EvalError::UndeclaredBase {
                name: base.to_string(),
            })?;
        match root {
            Value::Datamap(map) => write_through(map, keys, value),
            other => Err(EvalError::NotADatamap {
                segment: format!("${base}"),
                found: other.type_name(),
            }),
        }
    }
}

impl Evaluator for HarloweEvaluator {
    fn state(&self) -> &VariableState {
        &self.state
    }

    fn set_state(&mut self, state: VariableState) {
        self.state = state;
    }

    fn take_state(&mut self) -> VariableState {
        std::mem::take(&mut self.state)
    }

    fn evaluate_expression(&self, expression: &str) -> Result<Value, EvalError> {
        self.evaluate(expression)
    }

    fn evaluate_condition(&self, condition: &str) -> Result<bool, EvalError> {
        self.condition(condition)
    }

    fn set_visited_passages(&mut self, visited: FxHashMap<String, u32>) {
        self.context.visited_counts = visited;
    }

    fn set_history(&mut self, history: Vec<String>) {
        self.context.history = history;
    }

    fn set_current_passage(&mut self, title: &str) {
        self.context.current_passage = title.to_string();
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Splits an assignment target into its variable and property keys.
fn parse_target(target: &str) -> Result<(String, Vec<String>), EvalError> {
    match expr::parse(target)? {
        Expr::Variable(name) => Ok((name, Vec::new())),
        Expr::Property { base, segments } => match *base {
            Expr::Variable(name) => Ok((name, segments.iter().map(ToString::to_string).collect())),
            _ => Err(EvalError::InvalidTarget(target.to_string())),
        },
        _ => Err(EvalError::InvalidTarget(target.to_string())),
    }
}

fn write_through(
    map: &mut BTreeMap<String, Value>,
    keys: &[String],
    value: Value,
) -> Result<(), EvalError> {
    match keys {
        [] => Ok(()),
        [last] => {
            map.insert(last.clone(), value);
            Ok(())
        }
        [head, rest @ ..] => {
            let next = map
                .entry(head.clone())
                .or_insert_with(|| Value::Datamap(BTreeMap::new()));
            match next {
                Value::Datamap(inner) => write_through(inner, rest, value),
                other => Err(EvalError::NotADatamap {
                    segment: head.clone(),
                    found: other.type_name(),
                }),
            }
        }
    }
}

fn read_segment(current: Value, segment: &Segment) -> Result<Value, EvalError> {
    match (segment, current) {
        (Segment::Length, Value::Array(items)) => Ok(Value::Number(items.len() as f64)),
        (Segment::Nth(n), Value::Array(items)) => {
            let len = items.len();
            n.checked_sub(1)
                .and_then(|index| items.into_iter().nth(index))
                .ok_or_else(|| EvalError::IndexOutOfBounds {
                    segment: segment.to_string(),
                    len,
                })
        }
        (Segment::Last, Value::Array(items)) => {
            let len = items.len();
            items.into_iter().last().ok_or(EvalError::IndexOutOfBounds {
                segment: "last".to_string(),
                len,
            })
        }
        (Segment::Length | Segment::Nth(_) | Segment::Last, other) => Err(EvalError::NotAnArray {
            segment: segment.to_string(),
            found: other.type_name(),
        }),
        (Segment::Key(key), Value::Datamap(mut map)) => {
            map.remove(key).ok_or_else(|| EvalError::MissingProperty {
                segment: key.clone(),
            })
        }
        (Segment::Key(key), other) => Err(EvalError::NotADatamap {
            segment: key.clone(),
            found: other.type_name(),
        }),
    }
}

fn apply_binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOp::Add => return add(left, right),
        BinaryOp::Sub => match (left.as_number(), right.as_number()) {
            (Some(a), Some(b)) => Value::Number(a - b),
            _ => return Err(mismatch(op, &left, &right)),
        },
        BinaryOp::Of => return reverse_lookup(&left, right),
        BinaryOp::Ge | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Lt => {
            let (Some(a), Some(b)) = (left.as_number(), right.as_number()) else {
                return Err(EvalError::NonNumericComparison { op: op.symbol() });
            };
            Value::Boolean(match op {
                BinaryOp::Ge => a >= b,
                BinaryOp::Le => a <= b,
                BinaryOp::Gt => a > b,
                _ => a < b,
            })
        }
        BinaryOp::Is => Value::Boolean(left.loosely_equals(&right)),
        BinaryOp::IsNot => Value::Boolean(!left.loosely_equals(&right)),
        BinaryOp::Contains => Value::Boolean(contains(&left, &right)?),
        BinaryOp::DoesNotContain => Value::Boolean(!contains(&left, &right)?),
        BinaryOp::IsIn => Value::Boolean(contains(&right, &left)?),
        BinaryOp::IsA => Value::Boolean(left.type_name() == type_name_of(&right)),
        BinaryOp::IsNotA => Value::Boolean(left.type_name() != type_name_of(&right)),
        BinaryOp::Matches => Value::Boolean(matches_value(&left, &right)),
        BinaryOp::DoesNotMatch => Value::Boolean(!matches_value(&left, &right)),
    };
    Ok(value)
}

fn mismatch(op: BinaryOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeMismatch {
        op: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// `+` picks its meaning from the left operand.
fn add(left: Value, right: Value) -> Result<Value, EvalError> {
    match (left, right) {
        (Value::Datamap(a), Value::Datamap(b)) => Ok(Value::Datamap(merge_datamaps(&a, &b))),
        (Value::Array(mut a), Value::Array(b)) => {
            a.extend(b);
            Ok(Value::Array(a))
        }
        (Value::Dataset(a), Value::Dataset(b)) => Ok(Value::dataset_from(a.into_iter().chain(b))),
        (left @ (Value::Datamap(_) | Value::Array(_) | Value::Dataset(_)), right) => {
            Err(mismatch(BinaryOp::Add, &left, &right))
        }
        (left, right) => {
            if let (Some(a), Some(b)) = (left.as_number(), right.as_number()) {
                return Ok(Value::Number(a + b));
            }
            match (left, right) {
                (Value::String(a), Value::String(b)) => Ok(Value::String(a + &b)),
                (left, right) => Err(mismatch(BinaryOp::Add, &left, &right)),
            }
        }
    }
}

/// `key of map`.
fn reverse_lookup(key: &Value, map: Value) -> Result<Value, EvalError> {
    match map {
        Value::Datamap(mut entries) => {
            let key = key.as_key();
            match entries.remove(&key) {
                Some(value) => Ok(value),
                None => Err(EvalError::MissingKey {
                    key,
                    available: entries.into_keys().collect(),
                }),
            }
        }
        other => Err(mismatch(BinaryOp::Of, key, &other)),
    }
}

/// Membership; the answer is always a plain bool.
fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::Array(items) | Value::Dataset(items) => {
            Ok(items.iter().any(|member| member.loosely_equals(item)))
        }
        Value::String(text) => Ok(text.contains(item.as_key().as_str())),
        Value::Datamap(map) => Ok(map.contains_key(&item.as_key())),
        other => Err(mismatch(BinaryOp::Contains, other, item)),
    }
}

fn type_name_of(value: &Value) -> &str {
    match value {
        Value::String(name) => name.as_str(),
        other => other.type_name(),
    }
}

/// A string on the right names a type; anything else is compared by value.
fn matches_value(left: &Value, right: &Value) -> bool {
    match right {
        Value::String(name) => left.type_name() == name.as_str(),
        other => left.loosely_equals(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluator(vars: &[(&str, Value)]) -> HarloweEvaluator {
        HarloweEvaluator::new(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn dm(pairs: &[(&str, Value)]) -> Value {
        Value::Datamap(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn strings(items: &[&str]) -> Value {
        Value::Array(items.iter().map(|s| Value::from(*s)).collect())
    }

    #[test]
    fn scalars_and_variables() {
        let ev = evaluator(&[("gold", Value::from(12))]);
        assert_eq!(ev.evaluate("$gold").unwrap(), Value::from(12));
        assert_eq!(ev.evaluate("$missing").unwrap(), Value::from(0));
        assert_eq!(ev.evaluate("\"hi\"").unwrap(), Value::from("hi"));
        assert_eq!(ev.evaluate("2.5").unwrap(), Value::from(2.5));
        assert_eq!(ev.evaluate("true").unwrap(), Value::from(true));
    }

    #[test]
    fn arithmetic_and_concatenation() {
        let ev = evaluator(&[("gold", Value::from(12)), ("name", Value::from("Ada"))]);
        assert_eq!(ev.evaluate("$gold + 3").unwrap(), Value::from(15));
        assert_eq!(ev.evaluate("$gold - 20").unwrap(), Value::from(-8));
        assert_eq!(ev.evaluate("$gold + 1 + 1").unwrap(), Value::from(14));
        assert_eq!(ev.evaluate("$name + \" Lovelace\"").unwrap(), Value::from("Ada Lovelace"));
        assert_eq!(ev.evaluate("\"5\" + 3").unwrap(), Value::from(8));
        assert!(matches!(
            ev.evaluate("$name - 1"),
            Err(EvalError::TypeMismatch { op: "-", .. })
        ));
        assert!(matches!(
            ev.evaluate("true + 1"),
            Err(EvalError::TypeMismatch { op: "+", left: "boolean", .. })
        ));
    }

    #[test]
    fn collection_addition() {
        let ev = evaluator(&[("bag", strings(&["rope"]))]);
        assert_eq!(
            ev.evaluate("$bag + (a: \"lamp\")").unwrap(),
            strings(&["rope", "lamp"])
        );
        assert_eq!(
            ev.evaluate("(dm: \"a\", 1, \"b\", 2) + (dm: \"b\", 3)").unwrap(),
            dm(&[("a", Value::from(1)), ("b", Value::from(3))])
        );
        assert!(matches!(
            ev.evaluate("$bag + 1"),
            Err(EvalError::TypeMismatch { left: "array", right: "number", .. })
        ));
    }

    #[test]
    fn comparisons_coerce_numeric_strings() {
        let ev = evaluator(&[("vita", Value::from(75)), ("s", Value::from("80"))]);
        for (expr, expected) in [
            ("$vita > 50", true),
            ("$vita < 50", false),
            ("$vita >= 75", true),
            ("$vita <= 74", false),
            ("$s > $vita", true),
            ("$vita is 75", true),
            ("$vita == \"75\"", true),
        ] {
            assert_eq!(ev.condition(expr).unwrap(), expected, "{expr}");
        }
        assert!(matches!(
            ev.evaluate("\"abc\" > 1"),
            Err(EvalError::NonNumericComparison { op: ">" })
        ));
    }

    #[test]
    fn property_paths() {
        let hero = dm(&[
            ("name", Value::from("Ada")),
            ("bag", strings(&["rope", "lamp", "key"])),
            ("stats", dm(&[("str", Value::from(3))])),
        ]);
        let ev = evaluator(&[("hero", hero)]);
        assert_eq!(ev.evaluate("$hero's name").unwrap(), Value::from("Ada"));
        assert_eq!(ev.evaluate("$hero's stats's str").unwrap(), Value::from(3));
        assert_eq!(ev.evaluate("$hero's bag's length").unwrap(), Value::from(3));
        assert_eq!(ev.evaluate("$hero's bag's 1st").unwrap(), Value::from("rope"));
        assert_eq!(ev.evaluate("$hero's bag's last").unwrap(), Value::from("key"));
        assert_eq!(ev.evaluate("$hero's bag's 2").unwrap(), Value::from("lamp"));
        assert_eq!(ev.evaluate("$hero's bag's 2nd + \"!\"").unwrap(), Value::from("lamp!"));
    }

    #[test]
    fn property_errors() {
        let ev = evaluator(&[
            ("list", strings(&["a", "b"])),
            ("map", dm(&[("k", Value::from(1))])),
        ]);
        assert_eq!(
            ev.evaluate("$nobody's name"),
            Err(EvalError::UndefinedVariable("nobody".into()))
        );
        assert_eq!(
            ev.evaluate("$map's missing"),
            Err(EvalError::MissingProperty {
                segment: "missing".into()
            })
        );
        assert!(matches!(
            ev.evaluate("$list's 3rd"),
            Err(EvalError::IndexOutOfBounds { len: 2, .. })
        ));
        assert!(matches!(
            ev.evaluate("$list's 0"),
            Err(EvalError::IndexOutOfBounds { .. })
        ));
        assert!(matches!(
            ev.evaluate("$map's length"),
            Err(EvalError::NotAnArray { found: "datamap", .. })
        ));
        assert!(matches!(
            ev.evaluate("$list's name"),
            Err(EvalError::NotADatamap { found: "array", .. })
        ));
    }

    #[test]
    fn reverse_lookup_with_of() {
        let ev = evaluator(&[(
            "prices",
            dm(&[("sword", Value::from(30)), ("shield", Value::from(20))]),
        )]);
        assert_eq!(ev.evaluate("\"sword\" of $prices").unwrap(), Value::from(30));
        assert_eq!(
            ev.evaluate("\"axe\" of $prices"),
            Err(EvalError::MissingKey {
                key: "axe".into(),
                available: vec!["shield".into(), "sword".into()],
            })
        );
        assert!(matches!(
            ev.evaluate("1 of 2"),
            Err(EvalError::TypeMismatch { op: "of", .. })
        ));
    }

    #[test]
    fn membership_operators() {
        let ev = evaluator(&[
            ("inventory", strings(&["spada", "scudo"])),
            ("seen", Value::dataset_from(vec![Value::from("hall")])),
            ("motto", Value::from("carpe diem")),
            ("map", dm(&[("door", Value::from(true))])),
        ]);
        for (expr, expected) in [
            ("$inventory contains \"spada\"", true),
            ("$inventory contains \"arco\"", false),
            ("$inventory does not contain \"arco\"", true),
            ("\"scudo\" is in $inventory", true),
            ("$seen contains \"hall\"", true),
            ("$motto contains \"diem\"", true),
            ("$map contains \"door\"", true),
        ] {
            assert_eq!(ev.condition(expr).unwrap(), expected, "{expr}");
        }
        assert!(matches!(
            ev.evaluate("5 contains 1"),
            Err(EvalError::TypeMismatch { op: "contains", .. })
        ));
    }

    #[test]
    fn type_tests_and_matches() {
        let ev = evaluator(&[("n", Value::from(3)), ("bag", strings(&[]))]);
        for (expr, expected) in [
            ("$n is a number", true),
            ("$n is a \"number\"", true),
            ("$bag is an array", true),
            ("$bag is not an array", false),
            ("$n is a $bag", false),
            ("$n matches number", true),
            ("$n matches 3", true),
            ("$n does not match string", true),
            ("\"abc\" matches \"abc\"", false),
        ] {
            assert_eq!(ev.condition(expr).unwrap(), expected, "{expr}");
        }
    }

    #[test]
    fn logic_operators() {
        let ev = evaluator(&[("a", Value::from(true)), ("b", Value::from(false))]);
        for (expr, expected) in [
            ("$a and $b", false),
            ("$a or $b", true),
            ("not $b", true),
            ("not $a and $b", true),
            ("$a and not $b", true),
            ("$b or $b or $a", true),
        ] {
            assert_eq!(ev.condition(expr).unwrap(), expected, "{expr}");
        }
        // Short circuit: the undefined property on the right is never read.
        assert!(!ev.condition("$b and $nobody's x").unwrap());
        assert!(ev.condition("$a or $nobody's x").unwrap());
    }

    #[test]
    fn visits_and_history() {
        let mut ev = evaluator(&[]);
        ev.set_visited_passages(FxHashMap::from_iter([
            ("Hall".to_string(), 2),
            ("Gate".to_string(), 1),
        ]));
        ev.set_history(vec!["Gate".into(), "Hall".into(), "Hall".into()]);
        ev.set_current_passage("Hall");
        assert_eq!(ev.evaluate("visits").unwrap(), Value::from(2));
        assert_eq!(ev.evaluate("(visited: \"Gate\")").unwrap(), Value::from(1));
        assert_eq!(ev.evaluate("(visited: \"Cellar\")").unwrap(), Value::from(0));
        assert_eq!(ev.evaluate("(history:)").unwrap(), strings(&["Gate", "Hall", "Hall"]));
        assert!(ev.condition("(history:) contains \"Gate\"").unwrap());
    }

    #[test]
    fn unrecognized_expressions() {
        let ev = evaluator(&[]);
        assert_eq!(ev.evaluate("sword"), Err(EvalError::Unrecognized("sword".into())));
        assert_eq!(ev.evaluate("(print: 1)"), Err(EvalError::UnknownMacro("print".into())));
        assert!(matches!(ev.evaluate("$a +"), Err(EvalError::Syntax(_))));
    }

    #[test]
    fn set_property_creates_intermediate_maps() {
        let mut ev = evaluator(&[("hero", dm(&[]))]);
        ev.set_property("$hero's stats's str", Value::from(4)).unwrap();
        assert_eq!(ev.evaluate("$hero's stats's str").unwrap(), Value::from(4));
    }

    #[test]
    fn set_property_refuses_undeclared_base() {
        let mut ev = evaluator(&[]);
        let err = ev.set_property("$hero's name", Value::from("Ada")).unwrap_err();
        assert_eq!(err, EvalError::UndeclaredBase { name: "hero".into() });
        assert!(err.to_string().contains("(set: $hero to (dm:))"));
    }

    #[test]
    fn set_property_refuses_non_datamap_intermediate() {
        let mut ev = evaluator(&[("hero", dm(&[("name", Value::from("Ada"))]))]);
        assert_eq!(
            ev.set_property("$hero's name's first", Value::from("A")),
            Err(EvalError::NotADatamap {
                segment: "name".into(),
                found: "string"
            })
        );
        let mut ev = evaluator(&[("n", Value::from(1))]);
        assert!(matches!(
            ev.set_property("$n's x", Value::from(1)),
            Err(EvalError::NotADatamap { ref segment, .. }) if segment == "$n"
        ));
    }

    #[test]
    fn put_and_move() {
        let mut ev = evaluator(&[("purse", Value::from(10)), ("hero", dm(&[]))]);
        ev.put(Value::from(5), "$coins").unwrap();
        assert_eq!(ev.state()["coins"], Value::from(5));

        ev.put(Value::from("lamp"), "$hero's light").unwrap();
        assert_eq!(ev.evaluate("$hero's light").unwrap(), Value::from("lamp"));

        ev.move_into("$purse", "$hero's gold").unwrap();
        assert_eq!(ev.evaluate("$hero's gold").unwrap(), Value::from(10));
        assert_eq!(ev.state()["purse"], Value::from(0));

        assert_eq!(
            ev.move_into("$ghost", "$x"),
            Err(EvalError::UndefinedVariable("ghost".into()))
        );
        assert!(matches!(ev.put(Value::from(1), "5"), Err(EvalError::InvalidTarget(_))));
    }

    #[test]
    fn it_keyword_substitution() {
        let ev = evaluator(&[
            ("gold", Value::from(10)),
            ("name", Value::from("Ada")),
            ("hero", dm(&[("hp", Value::from(7))])),
        ]);
        assert_eq!(ev.replace_it_keyword("it + 10", "$gold").unwrap(), "10 + 10");
        assert_eq!(
            ev.replace_it_keyword("it + \" the bold\"", "$name").unwrap(),
            "\"Ada\" + \" the bold\""
        );
        assert_eq!(ev.replace_it_keyword("it - 2", "$hero's hp").unwrap(), "7 - 2");
        assert_eq!(ev.replace_it_keyword("$item + 1", "$gold").unwrap(), "$item + 1");
        assert_eq!(
            ev.replace_it_keyword("it + 1", "$ghost"),
            Err(EvalError::UndefinedVariable("ghost".into()))
        );
    }

    #[test]
    fn state_moves_in_and_out() {
        let mut ev = evaluator(&[("x", Value::from(1))]);
        let state = ev.take_state();
        assert_eq!(state.len(), 1);
        assert!(ev.state().is_empty());
        ev.set_state(state);
        assert_eq!(ev.evaluate("$x").unwrap(), Value::from(1));
    }
}
