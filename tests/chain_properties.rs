/// Property tests for chain resolution, truthiness and datamap merging.
use harlowe_path_sim::core::conditional::{ConditionalChain, HookKind};
use harlowe_path_sim::core::evaluator::HarloweEvaluator;
use harlowe_path_sim::core::lexer::tokenize;
use harlowe_path_sim::schema::value::{merge_datamaps, Value, VariableState};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn chain_source(conditions: &[bool], with_else: bool) -> (String, VariableState) {
    let mut source = String::new();
    let mut state = VariableState::new();
    for (i, holds) in conditions.iter().enumerate() {
        let keyword = if i == 0 { "if" } else { "else-if" };
        source.push_str(&format!("({keyword}: $c{i})[hook {i}]"));
        state.insert(format!("c{i}"), Value::from(*holds));
    }
    if with_else {
        source.push_str("(else:)[fallback]");
    }
    (source, state)
}

fn small_map() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map("[a-e]", (-100i32..100).prop_map(Value::from), 0..5)
}

proptest! {
    #[test]
    fn first_true_node_is_the_only_active_one(
        conditions in prop::collection::vec(any::<bool>(), 1..40),
        with_else in any::<bool>(),
    ) {
        let (source, state) = chain_source(&conditions, with_else);
        let chain = ConditionalChain::parse(&source).unwrap();
        prop_assert_eq!(chain.len, source.len());

        let evaluator = HarloweEvaluator::new(state);
        let result = chain.resolve(&evaluator).unwrap();
        match conditions.iter().position(|holds| *holds) {
            Some(first) => {
                prop_assert!(result.condition_met);
                prop_assert_eq!(result.active_hook, format!("hook {first}"));
                let expected = if first == 0 { HookKind::If } else { HookKind::ElseIf };
                prop_assert_eq!(result.hook_type, expected);
            }
            None if with_else => {
                prop_assert!(result.condition_met);
                prop_assert_eq!(result.active_hook, "fallback");
                prop_assert_eq!(result.hook_type, HookKind::Else);
            }
            None => {
                prop_assert!(!result.condition_met);
                prop_assert_eq!(result.active_hook, "");
            }
        }
    }

    #[test]
    fn numbers_are_true_unless_zero(n in -1000i32..1000) {
        let evaluator = HarloweEvaluator::new([("n".to_string(), Value::from(n))].into());
        prop_assert_eq!(evaluator.condition("$n").unwrap(), n != 0);
    }

    #[test]
    fn strings_are_true_unless_empty(s in "\\PC{0,8}") {
        let evaluator = HarloweEvaluator::new([("s".to_string(), Value::from(s.as_str()))].into());
        prop_assert_eq!(evaluator.condition("$s").unwrap(), !s.is_empty());
    }

    #[test]
    fn arrays_are_true_unless_empty(items in prop::collection::vec(0i32..10, 0..4)) {
        let array = Value::Array(items.iter().copied().map(Value::from).collect());
        let evaluator = HarloweEvaluator::new([("a".to_string(), array)].into());
        prop_assert_eq!(evaluator.condition("$a").unwrap(), !items.is_empty());
    }

    #[test]
    fn merge_keeps_every_key_and_prefers_the_right(left in small_map(), right in small_map()) {
        let merged = merge_datamaps(&left, &right);
        for (key, value) in &left {
            prop_assert!(merged.contains_key(key));
            if !right.contains_key(key) {
                prop_assert_eq!(&merged[key], value);
            }
        }
        for (key, value) in &right {
            prop_assert_eq!(&merged[key], value);
        }
        prop_assert!(merged.keys().all(|k| left.contains_key(k) || right.contains_key(k)));

        let evaluator = HarloweEvaluator::new(
            [
                ("l".to_string(), Value::Datamap(left.clone())),
                ("r".to_string(), Value::Datamap(right.clone())),
            ]
            .into(),
        );
        prop_assert_eq!(evaluator.evaluate("$l + $r").unwrap(), Value::Datamap(merged));
    }

    #[test]
    fn tokenize_never_panics(input in any::<String>()) {
        let _ = tokenize(&input);
    }

    #[test]
    fn apostrophes_between_letters_never_panic(a in "[\\p{L}\\p{M} ]{0,4}", b in "[\\p{L}\\p{M} ]{0,4}") {
        let evaluator = HarloweEvaluator::default();
        let _ = evaluator.evaluate(&format!("{a}'{b}"));
        let _ = evaluator.evaluate(&format!("$x's {b}"));
    }
}
