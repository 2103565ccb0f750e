//! Shared rule-operator evaluation — one closed operator set with a single
//! exhaustive comparison function, used by both the audience evaluator and
//! the automation condition matcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, FlowResult};

/// The fixed operator vocabulary of the declarative rule contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Contains,
    StartsWith,
    EndsWith,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    IsSet,
    NotSet,
}

pub const VALID_OPERATORS: &[&str] = &[
    "eq",
    "neq",
    "contains",
    "starts_with",
    "ends_with",
    "gt",
    "lt",
    "gte",
    "lte",
    "in",
    "not_in",
    "is_set",
    "not_set",
];

impl Operator {
    /// Parses an operator token, failing with a descriptive validation
    /// error — this runs at rule-creation time, never during evaluation.
    pub fn parse(token: &str) -> FlowResult<Self> {
        match token {
            "eq" => Ok(Operator::Eq),
            "neq" => Ok(Operator::Neq),
            "contains" => Ok(Operator::Contains),
            "starts_with" => Ok(Operator::StartsWith),
            "ends_with" => Ok(Operator::EndsWith),
            "gt" => Ok(Operator::Gt),
            "lt" => Ok(Operator::Lt),
            "gte" => Ok(Operator::Gte),
            "lte" => Ok(Operator::Lte),
            "in" => Ok(Operator::In),
            "not_in" => Ok(Operator::NotIn),
            "is_set" => Ok(Operator::IsSet),
            "not_set" => Ok(Operator::NotSet),
            other => Err(FlowError::Validation(format!(
                "Invalid operator: {other}. Valid: {}",
                VALID_OPERATORS.join(", ")
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Contains => "contains",
            Operator::StartsWith => "starts_with",
            Operator::EndsWith => "ends_with",
            Operator::Gt => "gt",
            Operator::Lt => "lt",
            Operator::Gte => "gte",
            Operator::Lte => "lte",
            Operator::In => "in",
            Operator::NotIn => "not_in",
            Operator::IsSet => "is_set",
            Operator::NotSet => "not_set",
        }
    }
}

/// Evaluates `actual <operator> expected`. `actual` is `None` when the field
/// is absent from the record being matched.
///
/// String comparisons are case-insensitive; ordering operators compare
/// numerically and fail closed on non-numeric operands.
pub fn compare(actual: Option<&Value>, operator: Operator, expected: &Value) -> bool {
    match operator {
        Operator::IsSet => is_set(actual),
        Operator::NotSet => !is_set(actual),
        _ => {
            let Some(actual) = actual else {
                return matches!(operator, Operator::Neq | Operator::NotIn);
            };
            match operator {
                Operator::Eq => value_eq(actual, expected),
                Operator::Neq => !value_eq(actual, expected),
                Operator::Contains => str_pair(actual, expected)
                    .map(|(a, e)| a.contains(&e))
                    .unwrap_or(false),
                Operator::StartsWith => str_pair(actual, expected)
                    .map(|(a, e)| a.starts_with(&e))
                    .unwrap_or(false),
                Operator::EndsWith => str_pair(actual, expected)
                    .map(|(a, e)| a.ends_with(&e))
                    .unwrap_or(false),
                Operator::Gt => {
                    numeric_cmp(actual, expected) == Some(std::cmp::Ordering::Greater)
                }
                Operator::Lt => numeric_cmp(actual, expected) == Some(std::cmp::Ordering::Less),
                Operator::Gte => matches!(
                    numeric_cmp(actual, expected),
                    Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)
                ),
                Operator::Lte => matches!(
                    numeric_cmp(actual, expected),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                ),
                Operator::In => expected
                    .as_array()
                    .map(|list| list.iter().any(|v| value_eq(actual, v)))
                    .unwrap_or(false),
                Operator::NotIn => expected
                    .as_array()
                    .map(|list| !list.iter().any(|v| value_eq(actual, v)))
                    .unwrap_or(true),
                Operator::IsSet | Operator::NotSet => unreachable!("handled above"),
            }
        }
    }
}

fn is_set(actual: Option<&Value>) -> bool {
    match actual {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a.as_str(), b.as_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => a == b,
    }
}

fn str_pair(a: &Value, b: &Value) -> Option<(String, String)> {
    Some((a.as_str()?.to_lowercase(), b.as_str()?.to_lowercase()))
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    let a_num = as_f64(a)?;
    let b_num = as_f64(b)?;
    a_num.partial_cmp(&b_num)
}

/// Numbers compare as-is; numeric strings are coerced so `"5" gt 3` holds,
/// matching how rule payloads arrive from JSON form fields. RFC 3339
/// timestamps coerce to epoch seconds so date fields order chronologically.
fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok().or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp() as f64)
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_accepts_fixed_vocabulary() {
        for token in VALID_OPERATORS {
            assert!(Operator::parse(token).is_ok(), "{token} should parse");
        }
    }

    #[test]
    fn parse_rejects_unknown_operator() {
        let err = Operator::parse("like").unwrap_err();
        assert!(err.to_string().contains("Invalid operator: like"));
    }

    #[test]
    fn eq_is_case_insensitive_for_strings() {
        assert!(compare(Some(&json!("US")), Operator::Eq, &json!("us")));
        assert!(!compare(Some(&json!("US")), Operator::Eq, &json!("uk")));
        assert!(compare(Some(&json!(5)), Operator::Eq, &json!(5)));
    }

    #[test]
    fn string_operators() {
        let actual = json!("alice@example.com");
        assert!(compare(Some(&actual), Operator::Contains, &json!("@example")));
        assert!(compare(Some(&actual), Operator::StartsWith, &json!("alice")));
        assert!(compare(Some(&actual), Operator::EndsWith, &json!(".com")));
        assert!(!compare(Some(&actual), Operator::StartsWith, &json!("bob")));
    }

    #[test]
    fn ordering_operators_are_numeric() {
        assert!(compare(Some(&json!(10)), Operator::Gt, &json!(5)));
        assert!(compare(Some(&json!("10")), Operator::Gte, &json!(10)));
        assert!(compare(Some(&json!(3)), Operator::Lte, &json!(3.0)));
        // Non-numeric operands fail closed.
        assert!(!compare(Some(&json!("abc")), Operator::Gt, &json!(1)));
    }

    #[test]
    fn rfc3339_timestamps_order_chronologically() {
        let actual = json!("2026-03-01T00:00:00Z");
        assert!(compare(Some(&actual), Operator::Gt, &json!("2026-01-01T00:00:00Z")));
        assert!(compare(Some(&actual), Operator::Lt, &json!("2026-06-01T00:00:00Z")));
    }

    #[test]
    fn membership_operators() {
        let list = json!(["us", "ca", "mx"]);
        assert!(compare(Some(&json!("US")), Operator::In, &list));
        assert!(!compare(Some(&json!("fr")), Operator::In, &list));
        assert!(compare(Some(&json!("fr")), Operator::NotIn, &list));
    }

    #[test]
    fn set_operators_treat_empty_string_as_unset() {
        assert!(compare(Some(&json!("x")), Operator::IsSet, &Value::Null));
        assert!(!compare(Some(&json!("")), Operator::IsSet, &Value::Null));
        assert!(compare(None, Operator::NotSet, &Value::Null));
        assert!(compare(Some(&Value::Null), Operator::NotSet, &Value::Null));
    }

    #[test]
    fn missing_field_only_matches_negative_operators() {
        assert!(!compare(None, Operator::Eq, &json!("x")));
        assert!(compare(None, Operator::Neq, &json!("x")));
        assert!(compare(None, Operator::NotIn, &json!(["x"])));
        assert!(!compare(None, Operator::Contains, &json!("x")));
    }
}
