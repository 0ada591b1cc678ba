//! In-app message and trigger models.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Absolute tolerance for numeric equality and the inclusive boundaries.
pub const NUMERIC_TOLERANCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Compared against a value in the trigger store.
    #[default]
    Custom,
    /// Seconds since the session started.
    SessionTime,
    /// Seconds since the last in-app message was dismissed.
    TimeSinceLastInApp,
}

impl TriggerKind {
    /// Time-based kinds whose truth changes without any store update.
    pub fn is_dynamic(&self) -> bool {
        !matches!(self, TriggerKind::Custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerOperator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "==")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<=")]
    LessThanOrEqual,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "exists")]
    Exists,
    #[serde(rename = "not_exists")]
    NotExists,
    #[serde(rename = "in")]
    Contains,
}

impl TriggerOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            TriggerOperator::GreaterThan => ">",
            TriggerOperator::LessThan => "<",
            TriggerOperator::Equal => "==",
            TriggerOperator::NotEqual => "!=",
            TriggerOperator::LessThanOrEqual => "<=",
            TriggerOperator::GreaterThanOrEqual => ">=",
            TriggerOperator::Exists => "exists",
            TriggerOperator::NotExists => "not_exists",
            TriggerOperator::Contains => "in",
        }
    }

    /// `current <op> required` with [`NUMERIC_TOLERANCE`] applied to equality.
    /// Operators that do not order numbers never match.
    pub fn compare_numbers(&self, current: f64, required: f64) -> bool {
        let close = (current - required).abs() < NUMERIC_TOLERANCE;
        match self {
            TriggerOperator::GreaterThan => current > required,
            TriggerOperator::LessThan => current < required,
            TriggerOperator::Equal => close,
            TriggerOperator::NotEqual => !close,
            TriggerOperator::LessThanOrEqual => current < required || close,
            TriggerOperator::GreaterThanOrEqual => current > required || close,
            TriggerOperator::Exists | TriggerOperator::NotExists | TriggerOperator::Contains => {
                false
            }
        }
    }
}

impl std::fmt::Display for TriggerOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Numeric view of a trigger value. Numeric strings count as numbers.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: String,
    #[serde(default)]
    pub kind: TriggerKind,
    /// Trigger store key, unused by dynamic kinds.
    #[serde(default)]
    pub property: String,
    pub operator: TriggerOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Trigger {
    pub fn custom(id: &str, property: &str, operator: TriggerOperator, value: Option<Value>) -> Self {
        Self {
            id: id.to_string(),
            kind: TriggerKind::Custom,
            property: property.to_string(),
            operator,
            value,
        }
    }

    pub fn dynamic(id: &str, kind: TriggerKind, operator: TriggerOperator, seconds: f64) -> Self {
        Self {
            id: id.to_string(),
            kind,
            property: String::new(),
            operator,
            value: Some(Value::from(seconds)),
        }
    }
}

/// OR of AND-groups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerTree(pub Vec<Vec<Trigger>>);

impl TriggerTree {
    pub fn new(and_groups: Vec<Vec<Trigger>>) -> Self {
        Self(and_groups)
    }

    pub fn and_groups(&self) -> &[Vec<Trigger>] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn references_property(&self, key: &str) -> bool {
        self.triggers()
            .any(|t| t.kind == TriggerKind::Custom && t.property == key)
    }

    pub fn has_dynamic_triggers(&self) -> bool {
        self.triggers().any(|t| t.kind.is_dynamic())
    }

    fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.0.iter().flatten()
    }
}

/// Redisplay settings delivered with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisplayConfig {
    pub limit: u32,
    /// Seconds.
    pub delay: i64,
}

/// Per-message display count and timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedisplayStats {
    pub display_quantity: u32,
    pub display_limit: u32,
    pub display_delay_seconds: i64,
    /// Epoch seconds, -1 when never displayed.
    pub last_display_time_seconds: i64,
    pub redisplay_enabled: bool,
}

impl Default for RedisplayStats {
    fn default() -> Self {
        Self {
            display_quantity: 0,
            display_limit: 1,
            display_delay_seconds: 0,
            last_display_time_seconds: -1,
            redisplay_enabled: false,
        }
    }
}

impl RedisplayStats {
    pub fn from_config(config: Option<RedisplayConfig>) -> Self {
        match config {
            Some(config) => Self {
                display_limit: config.limit,
                display_delay_seconds: config.delay,
                redisplay_enabled: true,
                ..Default::default()
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InAppMessage {
    pub id: String,
    #[serde(default)]
    pub triggers: TriggerTree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redisplay: Option<RedisplayConfig>,
    /// Opaque content handed to the presenter.
    #[serde(default)]
    pub content: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_trigger_json_format() {
        let tree: TriggerTree = serde_json::from_value(json!([
            [
                {"id": "t1", "property": "level", "operator": ">=", "value": 3},
                {"id": "t2", "kind": "session_time", "operator": ">", "value": 30}
            ],
            [
                {"id": "t3", "property": "vip", "operator": "exists"}
            ]
        ]))
        .unwrap();

        assert_eq!(tree.and_groups().len(), 2);
        let first = &tree.and_groups()[0][0];
        assert_eq!(first.kind, TriggerKind::Custom);
        assert_eq!(first.operator, TriggerOperator::GreaterThanOrEqual);
        assert_eq!(tree.and_groups()[0][1].kind, TriggerKind::SessionTime);
        assert!(tree.and_groups()[1][0].value.is_none());
        assert!(tree.references_property("vip"));
        assert!(!tree.references_property("other"));
        assert!(tree.has_dynamic_triggers());
    }

    #[test]
    fn test_unknown_operator_is_rejected() {
        let result: Result<Trigger, _> =
            serde_json::from_value(json!({"id": "t", "property": "p", "operator": "~"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_compare_numbers_tolerance() {
        use TriggerOperator::*;
        assert!(Equal.compare_numbers(10.2, 10.0));
        assert!(!Equal.compare_numbers(10.3, 10.0));
        assert!(NotEqual.compare_numbers(10.3, 10.0));
        assert!(LessThanOrEqual.compare_numbers(10.25, 10.0));
        assert!(!LessThan.compare_numbers(10.0, 10.0));
        assert!(GreaterThanOrEqual.compare_numbers(9.8, 10.0));
        assert!(!GreaterThan.compare_numbers(9.8, 10.0));
        assert!(!Contains.compare_numbers(1.0, 1.0));
    }

    #[test]
    fn test_as_number() {
        assert_eq!(as_number(&json!(3)), Some(3.0));
        assert_eq!(as_number(&json!(2.5)), Some(2.5));
        assert_eq!(as_number(&json!(" 7 ")), Some(7.0));
        assert_eq!(as_number(&json!("seven")), None);
        assert_eq!(as_number(&json!(true)), None);
        assert_eq!(as_number(&json!([1])), None);
    }

    #[test]
    fn test_message_defaults() {
        let message: InAppMessage = serde_json::from_value(json!({"id": "m1"})).unwrap();
        assert!(message.triggers.is_empty());
        assert!(message.redisplay.is_none());

        let stats = RedisplayStats::from_config(message.redisplay);
        assert_eq!(stats.display_limit, 1);
        assert_eq!(stats.last_display_time_seconds, -1);
        assert!(!stats.redisplay_enabled);

        let stats = RedisplayStats::from_config(Some(RedisplayConfig { limit: 5, delay: 60 }));
        assert_eq!(stats.display_limit, 5);
        assert!(stats.redisplay_enabled);
    }
}
