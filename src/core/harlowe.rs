/// The Harlowe story format: macro execution, link extraction and preview text.
use super::conditional::{ChainError, ConditionalChain, HookKind};
use super::evaluator::{EvalError, HarloweEvaluator};
use super::format::{Evaluator, FormatError, MacroError, StoryFormat};
use super::lexer;
use super::literal::{self, LiteralsResult};
use super::scan;
use crate::schema::value::VariableState;

#[derive(Debug, Clone, Copy, Default)]
pub struct HarloweFormat;

/// How hooks of conditional chains are treated during a walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Evaluate conditions and enter only the active hook.
    Simulate,
    /// Enter every hook without evaluating anything.
    Static,
}

impl HarloweFormat {
    pub const NAME: &'static str = "harlowe";

    /// Apply every state-changing macro in `content`, in source order.
    pub fn process(&self, content: &str, evaluator: &mut HarloweEvaluator) -> Result<(), FormatError> {
        let mut errors = Vec::new();
        walk(content, evaluator, Mode::Simulate, &mut errors);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(FormatError::Macros(errors))
        }
    }

    /// Malformed macros and chains in `content`, found without running it.
    pub fn check_structure(&self, content: &str) -> Vec<MacroError> {
        let mut evaluator = HarloweEvaluator::default();
        let mut errors = Vec::new();
        walk(content, &mut evaluator, Mode::Static, &mut errors);
        errors.retain(MacroError::is_structural);
        errors
    }
}

impl StoryFormat for HarloweFormat {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn create_evaluator(&self, state: VariableState) -> Box<dyn Evaluator> {
        Box::new(HarloweEvaluator::new(state))
    }

    fn process_passage_content(
        &self,
        content: &str,
        evaluator: &mut dyn Evaluator,
    ) -> Result<(), FormatError> {
        let evaluator = evaluator
            .as_any_mut()
            .downcast_mut::<HarloweEvaluator>()
            .ok_or(FormatError::ForeignEvaluator {
                expected: Self::NAME,
            })?;
        self.process(content, evaluator)
    }

    fn parse_links(&self, content: &str) -> Vec<String> {
        let mut links = Vec::new();
        let mut rest = content;
        while let Some(open) = rest.find("[[") {
            let after = &rest[open + 2..];
            let Some(close) = after.find("]]") else {
                break;
            };
            let target = link_target(&after[..close]);
            if !target.is_empty() {
                links.push(target.to_string());
            }
            rest = &after[close + 2..];
        }
        links
    }

    fn parse_variables(&self, content: &str) -> VariableState {
        let mut evaluator = HarloweEvaluator::default();
        let mut errors = Vec::new();
        walk(content, &mut evaluator, Mode::Static, &mut errors);
        if !errors.is_empty() {
            log::debug!("static variable scan skipped {} macro(s)", errors.len());
        }
        evaluator.into_state()
    }

    fn strip_code(&self, content: &str) -> String {
        let bytes = content.as_bytes();
        let mut out = String::with_capacity(content.len());
        let mut i = 0;
        while i < content.len() {
            if content[i..].starts_with("[[") {
                if let Some(close) = content[i + 2..].find("]]") {
                    out.push_str(link_text(&content[i + 2..i + 2 + close]));
                    i += close + 4;
                    continue;
                }
            }
            match bytes[i] {
                b'(' => {
                    if let Some(span) = scan::macro_at(content, i) {
                        out.push(' ');
                        i = span.end;
                        continue;
                    }
                }
                b'<' if is_tag_start(bytes, i) => {
                    if let Some(close) = content[i..].find('>') {
                        out.push(' ');
                        i += close + 1;
                        continue;
                    }
                }
                b'[' | b']' => {
                    i += 1;
                    continue;
                }
                _ => {}
            }
            let Some(c) = content[i..].chars().next() else {
                break;
            };
            out.push(c);
            i += c.len_utf8();
        }
        scan::collapse_whitespace(&out)
    }

    fn extract_literals(&self, content: &str) -> LiteralsResult {
        literal::extract_all(content)
    }
}

fn walk(text: &str, evaluator: &mut HarloweEvaluator, mode: Mode, errors: &mut Vec<MacroError>) {
    let mut pos = 0;
    while let Some((start, name)) = scan::next_macro_opener(text, pos) {
        match name.as_str() {
            "set" | "put" | "move" => {
                let Some(span) = scan::macro_at(text, start) else {
                    errors.push(MacroError::Malformed {
                        macro_name: name.clone(),
                        reason: "macro is never closed".to_string(),
                    });
                    pos = start + 1;
                    continue;
                };
                log::debug!("({name}:{})", span.body);
                match name.as_str() {
                    "set" => apply_set(span.body, evaluator, errors),
                    "put" => apply_put(span.body, evaluator, errors),
                    _ => apply_move(span.body, evaluator, errors),
                }
                pos = span.end;
            }
            "if" | "unless" => match ConditionalChain::parse(&text[start..]) {
                Ok(chain) => {
                    match mode {
                        Mode::Simulate => match chain.active_index(&*evaluator) {
                            Ok(Some(index)) => walk(&chain.nodes[index].hook, evaluator, mode, errors),
                            Ok(None) => {}
                            Err(err) => errors.push(err.into()),
                        },
                        Mode::Static => {
                            for node in &chain.nodes {
                                walk(&node.hook, evaluator, mode, errors);
                            }
                        }
                    }
                    pos = start + chain.len;
                }
                Err(err) => {
                    errors.push(err.into());
                    pos = skip_broken_chain(text, start);
                }
            },
            "else" | "else-if" | "elseif" => {
                let kind = HookKind::from_macro(&name).unwrap_or(HookKind::Else);
                errors.push(ChainError::OrphanBranch { kind }.into());
                pos = skip_macro_and_hook(text, start);
            }
            _ => pos = start + 1,
        }
    }
}

/// End of the macro at `start` and of the hook attached to it, if any.
fn skip_macro_and_hook(text: &str, start: usize) -> usize {
    match scan::macro_at(text, start) {
        Some(span) if text[span.end..].starts_with('[') => {
            scan::find_hook_end(text, span.end).map_or(span.end, |end| end + 1)
        }
        Some(span) => span.end,
        None => start + 1,
    }
}

/// Skips a chain that failed to parse, with any branches trailing it.
fn skip_broken_chain(text: &str, start: usize) -> usize {
    let mut pos = skip_macro_and_hook(text, start);
    loop {
        let rest = &text[pos..];
        let next = pos + (rest.len() - rest.trim_start().len());
        match scan::macro_name_at(text, next).and_then(|(name, _)| HookKind::from_macro(&name)) {
            Some(HookKind::ElseIf | HookKind::Else) => pos = skip_macro_and_hook(text, next),
            _ => return pos,
        }
    }
}

fn failed(macro_name: &str, snippet: &str, source: EvalError) -> MacroError {
    MacroError::Failed {
        macro_name: macro_name.to_string(),
        snippet: snippet.to_string(),
        source,
    }
}

/// `(set: $a to 1, $b's c to it + 1)`
fn apply_set(body: &str, evaluator: &mut HarloweEvaluator, errors: &mut Vec<MacroError>) {
    for assignment in scan::smart_split(body) {
        let (target, expression) = match lexer::split_at_word(assignment, "to") {
            Ok(Some((target, expression))) if target.starts_with('$') && !expression.is_empty() => {
                (target, expression)
            }
            Ok(_) => {
                errors.push(MacroError::Malformed {
                    macro_name: "set".to_string(),
                    reason: format!("expected '$variable to value', found '{assignment}'"),
                });
                continue;
            }
            Err(err) => {
                errors.push(failed("set", assignment, err.into()));
                continue;
            }
        };
        let outcome = evaluator
            .replace_it_keyword(expression, target)
            .and_then(|expression| evaluator.evaluate(&expression))
            .and_then(|value| evaluator.put(value, target));
        if let Err(err) = outcome {
            errors.push(failed("set", assignment, err));
        }
    }
}

/// `(put: value into $target)`
fn apply_put(body: &str, evaluator: &mut HarloweEvaluator, errors: &mut Vec<MacroError>) {
    let Some((expression, target)) = split_into(body, "put", errors) else {
        return;
    };
    let outcome = evaluator
        .evaluate(expression)
        .and_then(|value| evaluator.put(value, target));
    if let Err(err) = outcome {
        errors.push(failed("put", body.trim(), err));
    }
}

/// `(move: $source into $target)`
fn apply_move(body: &str, evaluator: &mut HarloweEvaluator, errors: &mut Vec<MacroError>) {
    let Some((source, target)) = split_into(body, "move", errors) else {
        return;
    };
    if let Err(err) = evaluator.move_into(source, target) {
        errors.push(failed("move", body.trim(), err));
    }
}

fn split_into<'a>(
    body: &'a str,
    macro_name: &str,
    errors: &mut Vec<MacroError>,
) -> Option<(&'a str, &'a str)> {
    match lexer::split_at_word(body, "into") {
        Ok(Some((value, target))) if !value.is_empty() && target.starts_with('$') => {
            Some((value, target))
        }
        Ok(_) => {
            errors.push(MacroError::Malformed {
                macro_name: macro_name.to_string(),
                reason: format!("expected 'value into $variable', found '{}'", body.trim()),
            });
            None
        }
        Err(err) => {
            errors.push(failed(macro_name, body.trim(), err.into()));
            None
        }
    }
}

/// `Text->Target`, `Target<-Text`, `Text|Target` or plain `Target`.
fn link_target(inner: &str) -> &str {
    if let Some(i) = inner.rfind("->") {
        inner[i + 2..].trim()
    } else if let Some(i) = inner.find("<-") {
        inner[..i].trim()
    } else if let Some(i) = inner.find('|') {
        inner[i + 1..].trim()
    } else {
        inner.trim()
    }
}

fn link_text(inner: &str) -> &str {
    if let Some(i) = inner.rfind("->") {
        inner[..i].trim()
    } else if let Some(i) = inner.find("<-") {
        inner[i + 2..].trim()
    } else if let Some(i) = inner.find('|') {
        inner[..i].trim()
    } else {
        inner.trim()
    }
}

fn is_tag_start(bytes: &[u8], i: usize) -> bool {
    bytes
        .get(i + 1)
        .is_some_and(|b| b.is_ascii_alphabetic() || *b == b'/' || *b == b'!')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::value::Value;
    use rustc_hash::FxHashMap;
    use std::any::Any;

    fn run(content: &str, vars: &[(&str, Value)]) -> (VariableState, Result<(), FormatError>) {
        let mut ev = HarloweEvaluator::new(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        );
        let outcome = HarloweFormat.process(content, &mut ev);
        (ev.into_state(), outcome)
    }

    #[test]
    fn set_put_and_move_in_source_order() {
        let content = "You wake. (set: $gold to 5)(set: $gold to it + 10)\
                       (put: (a: \"rope\") into $bag)(set: $purse to 3)(move: $purse into $stash)";
        let (state, outcome) = run(content, &[]);
        outcome.unwrap();
        assert_eq!(state["gold"], Value::from(15));
        assert_eq!(state["bag"], Value::Array(vec![Value::from("rope")]));
        assert_eq!(state["stash"], Value::from(3));
        assert_eq!(state["purse"], Value::from(0));
    }

    #[test]
    fn set_with_several_assignments_and_paths() {
        let content = "(set: $hero to (dm: \"name\", \"Ada\"))\
                       (set: $hero's hp to 10, $hero's bag's lamp to true, $lvl to 2)";
        let (state, outcome) = run(content, &[]);
        outcome.unwrap();
        let Value::Datamap(hero) = &state["hero"] else {
            panic!("hero should be a datamap");
        };
        assert_eq!(hero["hp"], Value::from(10));
        assert_eq!(hero["name"], Value::from("Ada"));
        assert!(matches!(&hero["bag"], Value::Datamap(bag) if bag["lamp"] == Value::from(true)));
        assert_eq!(state["lvl"], Value::from(2));
    }

    #[test]
    fn only_the_active_hook_runs() {
        let content = "(if: $vita > 80)[(set: $mood to \"great\")]\
                       (else-if: $vita > 50)[(set: $mood to \"fine\")]\
                       (else:)[(set: $mood to \"bad\")(set: $vita to it - 5)]";
        let (state, _) = run(content, &[("vita", Value::from(60))]);
        assert_eq!(state["mood"], Value::from("fine"));
        assert_eq!(state["vita"], Value::from(60));

        let (state, _) = run(content, &[("vita", Value::from(10))]);
        assert_eq!(state["mood"], Value::from("bad"));
        assert_eq!(state["vita"], Value::from(5));
    }

    #[test]
    fn nested_chains_and_unless() {
        let content = "(unless: $door)[(set: $tries to it + 1)(if: $tries > 2)[(set: $door to true)]]";
        let (state, _) = run(content, &[("door", Value::from(false)), ("tries", Value::from(2))]);
        assert_eq!(state["tries"], Value::from(3));
        assert_eq!(state["door"], Value::from(true));
    }

    #[test]
    fn failures_are_collected_and_processing_continues() {
        let content = "(set: $a to 1)(set: $ghost's hp to 5)(set: nonsense)\
                       (else:)[(set: $never to 1)](set: $b to $a + 1)";
        let (state, outcome) = run(content, &[]);
        assert_eq!(state["a"], Value::from(1));
        assert_eq!(state["b"], Value::from(2));
        assert!(!state.contains_key("never"));

        let err = outcome.unwrap_err();
        let errors = err.macro_errors();
        assert_eq!(errors.len(), 3);
        assert!(matches!(
            &errors[0],
            MacroError::Failed { source: EvalError::UndeclaredBase { name }, .. } if name == "ghost"
        ));
        assert!(matches!(&errors[1], MacroError::Malformed { macro_name, .. } if macro_name == "set"));
        assert_eq!(
            errors[2],
            MacroError::Chain(ChainError::OrphanBranch {
                kind: HookKind::Else
            })
        );
    }

    #[test]
    fn condition_failure_skips_the_chain() {
        let (state, outcome) = run("(if: $m's x)[(set: $y to 1)](set: $z to 2)", &[]);
        assert!(!state.contains_key("y"));
        assert_eq!(state["z"], Value::from(2));
        assert!(matches!(
            outcome.unwrap_err().macro_errors(),
            [MacroError::Chain(ChainError::Condition { .. })]
        ));
    }

    #[test]
    fn links_in_every_form() {
        let content = "[[Hall]] [[Go north->North Gate]] [[Cellar<-Climb down]] \
                       [[Back|Start]] [[a->b->Tower]] [[ ]] [[unclosed";
        assert_eq!(
            HarloweFormat.parse_links(content),
            vec!["Hall", "North Gate", "Cellar", "Start", "Tower"]
        );
    }

    #[test]
    fn strip_code_keeps_prose_and_link_text() {
        let content = "(set: $x to (a: 1, 2))<b>Welcome</b>, traveller.\n\n\
                       (if: $x)[You have  things.] [[Go on->Hall]] [[Rest]]";
        assert_eq!(
            HarloweFormat.strip_code(content),
            "Welcome , traveller. You have things. Go on Rest"
        );
    }

    #[test]
    fn static_scan_enters_every_hook() {
        let content = "(set: $hp to 10)(if: $hp < 0)[(set: $dead to true)](else:)[(set: $alive to true)]";
        let vars = HarloweFormat.parse_variables(content);
        assert_eq!(vars["hp"], Value::from(10));
        assert_eq!(vars["dead"], Value::from(true));
        assert_eq!(vars["alive"], Value::from(true));
    }

    #[test]
    fn structure_check_ignores_runtime_failures() {
        let content = "(set: $x to $y's z)(set: broken)(if: $a)[fine](else-if:)[empty]\
                       (else-if: $b)[orphan](if: $c)";
        let errors = HarloweFormat.check_structure(content);
        assert_eq!(errors.len(), 3, "{errors:?}");
        assert!(errors.iter().all(MacroError::is_structural));
        assert!(matches!(
            errors[1],
            MacroError::Chain(ChainError::MissingCondition { kind: HookKind::ElseIf })
        ));
    }

    struct ForeignEvaluator(VariableState);

    impl Evaluator for ForeignEvaluator {
        fn state(&self) -> &VariableState {
            &self.0
        }
        fn set_state(&mut self, state: VariableState) {
            self.0 = state;
        }
        fn take_state(&mut self) -> VariableState {
            std::mem::take(&mut self.0)
        }
        fn evaluate_expression(&self, _: &str) -> Result<Value, EvalError> {
            Ok(Value::Empty)
        }
        fn evaluate_condition(&self, _: &str) -> Result<bool, EvalError> {
            Ok(false)
        }
        fn set_visited_passages(&mut self, _: FxHashMap<String, u32>) {}
        fn set_history(&mut self, _: Vec<String>) {}
        fn set_current_passage(&mut self, _: &str) {}
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn rejects_evaluators_from_other_formats() {
        let mut foreign = ForeignEvaluator(VariableState::new());
        assert_eq!(
            HarloweFormat.process_passage_content("(set: $x to 1)", &mut foreign),
            Err(FormatError::ForeignEvaluator { expected: "harlowe" })
        );

        let mut own = HarloweFormat.create_evaluator(VariableState::new());
        HarloweFormat
            .process_passage_content("(set: $x to 1)", own.as_mut())
            .unwrap();
        assert_eq!(own.state()["x"], Value::from(1));
    }
}
