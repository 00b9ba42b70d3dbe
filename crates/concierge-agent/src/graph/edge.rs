use std::fmt;

use serde::{Deserialize, Serialize};

use super::state::State;

/// A transition between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id, or [`END`](super::END).
    pub to: String,
    /// Condition that must hold, against the post-step state, to take this edge.
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Condition for traversing an edge.
///
/// Every variant is total: a missing or mistyped field simply evaluates to
/// `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EdgeCondition {
    /// Always traverse this edge.
    #[default]
    Always,
    /// The field is present, non-null and non-empty.
    IsSet { key: String },
    /// The field is a string equal to `value`.
    Equals { key: String, value: String },
    /// The field is a string different from `value`.
    NotEquals { key: String, value: String },
    /// The field is a string containing `value`.
    Contains { key: String, value: String },
    /// A textual expression: `key == "v"`, `key != "v"` or `key contains "v"`.
    Conditional { expr: String },
}

impl EdgeCondition {
    pub fn evaluate(&self, state: &State) -> bool {
        match self {
            EdgeCondition::Always => true,
            EdgeCondition::IsSet { key } => state.is_set(key),
            EdgeCondition::Equals { key, value } => {
                state.get_str(key).is_some_and(|s| s == value)
            }
            EdgeCondition::NotEquals { key, value } => {
                state.get_str(key).is_some_and(|s| s != value)
            }
            EdgeCondition::Contains { key, value } => {
                state.get_str(key).is_some_and(|s| s.contains(value.as_str()))
            }
            EdgeCondition::Conditional { expr } => evaluate_condition(expr, state),
        }
    }
}

impl fmt::Display for EdgeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeCondition::Always => Ok(()),
            EdgeCondition::IsSet { key } => write!(f, "{} set", key),
            EdgeCondition::Equals { key, value } => write!(f, "{} == {}", key, value),
            EdgeCondition::NotEquals { key, value } => write!(f, "{} != {}", key, value),
            EdgeCondition::Contains { key, value } => write!(f, "{} contains {}", key, value),
            EdgeCondition::Conditional { expr } => f.write_str(&expr.replace('"', "")),
        }
    }
}

impl Edge {
    /// Create an unconditional edge.
    pub fn always(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::Always)
    }

    /// Take this edge only when `key` is set.
    pub fn when_set(from: impl Into<String>, to: impl Into<String>, key: impl Into<String>) -> Self {
        Self::new(from, to, EdgeCondition::IsSet { key: key.into() })
    }

    /// Take this edge only when `key == value`.
    pub fn when_eq(
        from: impl Into<String>,
        to: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self::new(
            from,
            to,
            EdgeCondition::Equals {
                key: key.into(),
                value: value.into(),
            },
        )
    }

    /// Create an edge from a textual condition.
    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        expr: impl Into<String>,
    ) -> Self {
        Self::new(from, to, EdgeCondition::Conditional { expr: expr.into() })
    }

    pub fn new(from: impl Into<String>, to: impl Into<String>, condition: EdgeCondition) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            condition,
        }
    }
}

/// Evaluate a simple conditional expression against the state.
///
/// Supported expressions:
/// - `key == "value"` exact match
/// - `key != "value"` not equal (the key must be set)
/// - `key contains "substr"` substring match
///
/// Returns `false` for unparseable expressions.
pub fn evaluate_condition(expr: &str, state: &State) -> bool {
    let expr = expr.trim();

    if let Some((key, substr)) = parse_operator(expr, " contains ") {
        return state.get_str(key).is_some_and(|s| s.contains(substr));
    }
    if let Some((key, value)) = parse_operator(expr, "!=") {
        return state.get_str(key).is_some_and(|s| s != value);
    }
    if let Some((key, value)) = parse_operator(expr, "==") {
        return state.get_str(key).is_some_and(|s| s == value);
    }
    false
}

/// Parse `key OP "value"`, returning (key, value).
fn parse_operator<'a>(expr: &'a str, op: &str) -> Option<(&'a str, &'a str)> {
    let (key, val) = expr.split_once(op)?;
    let key = key.trim();
    if key.is_empty() || key.contains(char::is_whitespace) {
        return None;
    }
    Some((key, val.trim().trim_matches('"')))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> State {
        State::new()
            .with("route", "dispatch")
            .with("output", "The file was created successfully.")
            .with("empty", "")
    }

    #[test]
    fn test_structured_conditions() {
        let s = state();
        assert!(EdgeCondition::IsSet { key: "route".into() }.evaluate(&s));
        assert!(!EdgeCondition::IsSet { key: "empty".into() }.evaluate(&s));
        assert!(!EdgeCondition::IsSet { key: "missing".into() }.evaluate(&s));
        assert!(EdgeCondition::Equals {
            key: "route".into(),
            value: "dispatch".into()
        }
        .evaluate(&s));
        assert!(!EdgeCondition::NotEquals {
            key: "missing".into(),
            value: "x".into()
        }
        .evaluate(&s));
    }

    #[test]
    fn test_condition_expressions() {
        let s = state();
        assert!(evaluate_condition(r#"route == "dispatch""#, &s));
        assert!(!evaluate_condition(r#"route == "unavailable""#, &s));
        assert!(evaluate_condition(r#"route != "unavailable""#, &s));
        assert!(evaluate_condition(r#"output contains "created""#, &s));
        assert!(!evaluate_condition(r#"output contains "deleted""#, &s));
    }

    #[test]
    fn test_condition_missing_key_or_garbage() {
        let s = state();
        assert!(!evaluate_condition(r#"missing == "value""#, &s));
        assert!(!evaluate_condition(r#"empty == """#, &s));
        assert!(!evaluate_condition("this is not valid", &s));
    }

    #[test]
    fn test_edge_serialization() {
        let edge = Edge::when_set("extract", "geocode", "location");
        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["condition"]["type"], "is_set");
        let parsed: Edge = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.condition, edge.condition);
    }

    #[test]
    fn test_display_labels() {
        assert_eq!(EdgeCondition::IsSet { key: "location".into() }.to_string(), "location set");
        assert_eq!(EdgeCondition::Always.to_string(), "");
    }
}
