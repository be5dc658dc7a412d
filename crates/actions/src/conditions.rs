//! Declarative condition evaluation.
//!
//! A condition map looks like
//!
//! ```json
//! { "data.status": "paid", "data.total": { "operator": "greaterThan", "value": 100 } }
//! ```
//!
//! Every entry must hold for the map to pass. An entry whose value is an
//! object carrying an `operator` key uses that operator; anything else is
//! compared with [`Operator::Equals`].
//!
//! A malformed entry (missing, non-string or unknown operator, invalid
//! regex) never blocks: it is logged as a warning and counts as passing, so a misconfigured
//! trigger keeps firing instead of silently dropping events.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::ConditionError;
use crate::interpolate::resolve_path;

/// The closed set of comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    /// Substring for strings, membership for arrays.
    Contains,
    /// Regular-expression match against the string form of the field.
    Matches,
    /// Field is present and not null.
    Exists,
}

impl Operator {
    /// Parse the wire name (`"greaterThan"`, …).
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "equals" => Some(Self::Equals),
            "notEquals" => Some(Self::NotEquals),
            "greaterThan" => Some(Self::GreaterThan),
            "lessThan" => Some(Self::LessThan),
            "contains" => Some(Self::Contains),
            "matches" => Some(Self::Matches),
            "exists" => Some(Self::Exists),
            _ => None,
        }
    }
}

/// Evaluate every entry of `conditions` against `context` (logical AND).
///
/// An empty map passes.
pub fn evaluate(conditions: &Map<String, Value>, context: &Map<String, Value>) -> bool {
    conditions.iter().all(|(path, expected)| {
        match evaluate_entry(path, expected, context) {
            Ok(passed) => passed,
            Err(e) => {
                warn!("{e}; treating condition as passing");
                true
            }
        }
    })
}

/// Evaluate a single `path → expected` entry.
///
/// Returns `Err` only for malformed entries; the caller decides how to
/// degrade.
pub fn evaluate_entry(
    path: &str,
    expected: &Value,
    context: &Map<String, Value>,
) -> Result<bool, ConditionError> {
    let actual = resolve_path(context, path);

    let (operator, operand) = match expected.as_object() {
        Some(spec) if spec.contains_key("operator") => {
            let name = spec["operator"].as_str().ok_or_else(|| {
                ConditionError::MalformedOperator { path: path.to_owned() }
            })?;
            let operator = Operator::parse(name).ok_or_else(|| ConditionError::UnknownOperator {
                path: path.to_owned(),
                operator: name.to_owned(),
            })?;
            (operator, spec.get("value").unwrap_or(&Value::Null))
        }
        Some(spec) if spec.contains_key("value") => {
            return Err(ConditionError::MissingOperator { path: path.to_owned() });
        }
        _ => (Operator::Equals, expected),
    };

    apply(operator, path, actual, operand)
}

fn apply(
    operator: Operator,
    path: &str,
    actual: Option<&Value>,
    operand: &Value,
) -> Result<bool, ConditionError> {
    let actual = actual.unwrap_or(&Value::Null);

    let passed = match operator {
        Operator::Equals => loose_eq(actual, operand),
        Operator::NotEquals => !loose_eq(actual, operand),
        Operator::GreaterThan => compare(actual, operand).is_some_and(|o| o.is_gt()),
        Operator::LessThan => compare(actual, operand).is_some_and(|o| o.is_lt()),
        Operator::Contains => match actual {
            Value::String(s) => s.contains(&display(operand)),
            Value::Array(items) => items.iter().any(|item| loose_eq(item, operand)),
            _ => false,
        },
        Operator::Matches => {
            let pattern = display(operand);
            let re = Regex::new(&pattern).map_err(|e| ConditionError::InvalidPattern {
                path: path.to_owned(),
                reason: e.to_string(),
            })?;
            !actual.is_null() && re.is_match(&display(actual))
        }
        Operator::Exists => {
            // `{ "operator": "exists", "value": false }` asserts absence.
            let want = operand.as_bool().unwrap_or(true);
            !actual.is_null() == want
        }
    };

    Ok(passed)
}

/// Strict JSON equality, except that numbers compare by value (`1 == 1.0`).
fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Numeric ordering when both sides look like numbers, otherwise string
/// ordering when both are strings.
fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
