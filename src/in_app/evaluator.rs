//! Decides whether a message's trigger tree currently holds.

use super::dynamic::DynamicTriggerScheduler;
use super::models::{as_number, Trigger, TriggerOperator, TriggerTree};
use super::trigger_store::TriggerStore;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

pub struct TriggerEvaluator {
    dynamic: Arc<DynamicTriggerScheduler>,
    evaluation: Mutex<()>,
}

impl TriggerEvaluator {
    pub fn new(dynamic: Arc<DynamicTriggerScheduler>) -> Self {
        Self {
            dynamic,
            evaluation: Mutex::new(()),
        }
    }

    /// True when any AND-group of `tree`, the trigger tree of message
    /// `message_id`, is fully satisfied. An empty tree is satisfied.
    ///
    /// Within a group static triggers are checked first, in order, and the
    /// group is abandoned on the first failure. Dynamic triggers are checked
    /// only once every static trigger passed, since checking them may
    /// schedule a timer.
    pub fn evaluate(&self, message_id: &str, tree: &TriggerTree, store: &TriggerStore) -> bool {
        let _evaluation = self
            .evaluation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if tree.is_empty() {
            return true;
        }

        'groups: for group in tree.and_groups() {
            let mut deferred = Vec::new();
            for trigger in group {
                if trigger.kind.is_dynamic() {
                    deferred.push(trigger);
                } else if !static_trigger_holds(trigger, store) {
                    trace!("Trigger {} failed, abandoning group", trigger.id);
                    continue 'groups;
                }
            }
            if deferred
                .iter()
                .all(|t| self.dynamic.should_fire(message_id, t)) {
                return true;
            }
        }
        false
    }
}

fn static_trigger_holds(trigger: &Trigger, store: &TriggerStore) -> bool {
    let Some(current) = store.get(&trigger.property) else {
        return trigger.operator == TriggerOperator::NotExists;
    };
    match trigger.operator {
        TriggerOperator::Exists => true,
        TriggerOperator::NotExists => false,
        operator => match &trigger.value {
            Some(expected) => value_matches(operator, &current, expected),
            None => false,
        },
    }
}

fn value_matches(operator: TriggerOperator, current: &Value, expected: &Value) -> bool {
    if operator == TriggerOperator::Contains {
        return contains(current, expected);
    }
    if let (Some(current), Some(expected)) = (as_number(current), as_number(expected)) {
        return operator.compare_numbers(current, expected);
    }
    let equal = match (current, expected) {
        (Value::String(a), Value::String(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        _ => return false,
    };
    match operator {
        TriggerOperator::Equal => equal,
        TriggerOperator::NotEqual => !equal,
        _ => false,
    }
}

fn contains(current: &Value, expected: &Value) -> bool {
    match current {
        Value::Array(items) => items
            .iter()
            .any(|item| value_matches(TriggerOperator::Equal, item, expected)),
        Value::String(haystack) => match expected {
            Value::String(needle) => haystack.contains(needle.as_str()),
            Value::Number(n) => haystack.contains(&n.to_string()),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::in_app::models::TriggerKind;
    use crate::in_app::task_scheduler::ManualTaskScheduler;
    use serde_json::json;

    fn evaluator() -> (Arc<ManualClock>, Arc<ManualTaskScheduler>, TriggerEvaluator) {
        let clock = Arc::new(ManualClock::new(0));
        let tasks = Arc::new(ManualTaskScheduler::default());
        let dynamic = Arc::new(DynamicTriggerScheduler::new(clock.clone(), tasks.clone()));
        (clock, tasks, TriggerEvaluator::new(dynamic))
    }

    fn custom(id: &str, property: &str, operator: TriggerOperator, value: Value) -> Trigger {
        Trigger::custom(id, property, operator, Some(value))
    }

    fn holds(trigger: Trigger, store: &TriggerStore) -> bool {
        let (_, _, evaluator) = evaluator();
        evaluator.evaluate("m", &TriggerTree::new(vec![vec![trigger]]), store)
    }

    #[test]
    fn test_empty_tree_is_satisfied() {
        let (_, _, evaluator) = evaluator();
        assert!(evaluator.evaluate("m", &TriggerTree::default(), &TriggerStore::default()));
    }

    #[test]
    fn test_missing_value() {
        let store = TriggerStore::default();
        assert!(holds(
            Trigger::custom("t", "p", TriggerOperator::NotExists, None),
            &store
        ));
        assert!(!holds(
            Trigger::custom("t", "p", TriggerOperator::Exists, None),
            &store
        ));
        assert!(!holds(custom("t", "p", TriggerOperator::NotEqual, json!(1)), &store));
    }

    #[test]
    fn test_exists_ignores_value() {
        let store = TriggerStore::default();
        store.set("p", json!("anything"));
        assert!(holds(Trigger::custom("t", "p", TriggerOperator::Exists, None), &store));
        assert!(!holds(
            Trigger::custom("t", "p", TriggerOperator::NotExists, None),
            &store
        ));
    }

    #[test]
    fn test_numeric_comparisons() {
        let store = TriggerStore::default();
        store.set("level", json!(5));
        store.set("score", json!("10.1"));

        assert!(holds(custom("t", "level", TriggerOperator::GreaterThan, json!(4)), &store));
        assert!(!holds(custom("t", "level", TriggerOperator::LessThan, json!(5)), &store));
        assert!(holds(custom("t", "level", TriggerOperator::Equal, json!(5.2)), &store));
        assert!(holds(custom("t", "level", TriggerOperator::LessThanOrEqual, json!(4.8)), &store));
        assert!(holds(custom("t", "score", TriggerOperator::GreaterThanOrEqual, json!(10)), &store));
        assert!(holds(custom("t", "score", TriggerOperator::NotEqual, json!("11")), &store));
    }

    #[test]
    fn test_string_and_bool_equality() {
        let store = TriggerStore::default();
        store.set("tier", json!("gold"));
        store.set("beta", json!(true));

        assert!(holds(custom("t", "tier", TriggerOperator::Equal, json!("gold")), &store));
        assert!(holds(custom("t", "tier", TriggerOperator::NotEqual, json!("silver")), &store));
        assert!(!holds(custom("t", "tier", TriggerOperator::GreaterThan, json!("a")), &store));
        assert!(holds(custom("t", "beta", TriggerOperator::Equal, json!(true)), &store));
    }

    #[test]
    fn test_unrecognized_types_fail() {
        let store = TriggerStore::default();
        store.set("obj", json!({"a": 1}));
        assert!(!holds(custom("t", "obj", TriggerOperator::Equal, json!({"a": 1})), &store));
        assert!(!holds(custom("t", "obj", TriggerOperator::NotEqual, json!(3)), &store));
        assert!(!holds(custom("t", "obj", TriggerOperator::Contains, json!("a")), &store));
    }

    #[test]
    fn test_contains() {
        let store = TriggerStore::default();
        store.set("tags", json!(["news", 42]));
        store.set("title", json!("weekly digest"));

        assert!(holds(custom("t", "tags", TriggerOperator::Contains, json!("news")), &store));
        assert!(holds(custom("t", "tags", TriggerOperator::Contains, json!(42)), &store));
        assert!(!holds(custom("t", "tags", TriggerOperator::Contains, json!("sports")), &store));
        assert!(holds(custom("t", "title", TriggerOperator::Contains, json!("digest")), &store));
    }

    #[test]
    fn test_or_of_and_short_circuit() {
        let (_, _, evaluator) = evaluator();
        let store = TriggerStore::default();
        let tree = TriggerTree::new(vec![
            vec![Trigger::custom("a", "a", TriggerOperator::NotExists, None)],
            vec![
                custom("b", "b", TriggerOperator::Equal, json!(1)),
                custom("c", "c", TriggerOperator::Equal, json!(2)),
            ],
        ]);
        assert!(evaluator.evaluate("m", &tree, &store));

        store.set("a", json!(1));
        assert!(!evaluator.evaluate("m", &tree, &store));
        store.set("b", json!(1));
        store.set("c", json!(2));
        assert!(evaluator.evaluate("m", &tree, &store));
    }

    #[test]
    fn test_dynamic_deferred_until_statics_pass() {
        let (clock, tasks, evaluator) = evaluator();
        let store = TriggerStore::default();
        let tree = TriggerTree::new(vec![vec![
            Trigger::dynamic("later", TriggerKind::SessionTime, TriggerOperator::GreaterThan, 60.0),
            custom("s", "ready", TriggerOperator::Equal, json!(true)),
        ]]);

        assert!(!evaluator.evaluate("m", &tree, &store));
        assert_eq!(tasks.scheduled_count(), 0);

        store.set("ready", json!(true));
        assert!(!evaluator.evaluate("m", &tree, &store));
        assert_eq!(tasks.pending_keys(), vec!["m/later".to_string()]);

        clock.set_millis(61_000);
        assert!(evaluator.evaluate("m", &tree, &store));
    }
}
