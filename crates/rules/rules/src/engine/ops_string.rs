use regex::Regex;

use crate::engine::value::Value;
use crate::error::RuleError;

fn fold_case(s: &str, insensitive: bool) -> String {
    if insensitive {
        s.to_lowercase()
    } else {
        s.to_owned()
    }
}

/// Substring test on strings, membership test on lists. Null never contains
/// anything.
pub(crate) fn eval_contains(
    haystack: &Value,
    needle: &Value,
    insensitive: bool,
) -> Result<bool, RuleError> {
    match (haystack, needle) {
        (Value::Null, _) => Ok(false),
        (Value::String(s), Value::String(sub)) => {
            Ok(fold_case(s, insensitive).contains(&fold_case(sub, insensitive)))
        }
        (Value::List(items), Value::String(sub)) if insensitive => Ok(items
            .iter()
            .filter_map(Value::as_str)
            .any(|item| item.to_lowercase() == sub.to_lowercase())),
        (Value::List(_), _) => haystack.contains_value(needle),
        _ => Err(RuleError::TypeError(format!(
            "contains: unsupported types {} and {}",
            haystack.type_name(),
            needle.type_name()
        ))),
    }
}

/// String prefix test.
pub(crate) fn eval_starts_with(
    value: &Value,
    prefix: &Value,
    insensitive: bool,
) -> Result<bool, RuleError> {
    match (value, prefix) {
        (Value::Null, _) => Ok(false),
        (Value::String(s), Value::String(p)) => {
            Ok(fold_case(s, insensitive).starts_with(&fold_case(p, insensitive)))
        }
        _ => Err(RuleError::TypeError(format!(
            "starts_with: unsupported types {} and {}",
            value.type_name(),
            prefix.type_name()
        ))),
    }
}

/// String suffix test.
pub(crate) fn eval_ends_with(
    value: &Value,
    suffix: &Value,
    insensitive: bool,
) -> Result<bool, RuleError> {
    match (value, suffix) {
        (Value::Null, _) => Ok(false),
        (Value::String(s), Value::String(p)) => {
            Ok(fold_case(s, insensitive).ends_with(&fold_case(p, insensitive)))
        }
        _ => Err(RuleError::TypeError(format!(
            "ends_with: unsupported types {} and {}",
            value.type_name(),
            suffix.type_name()
        ))),
    }
}

/// Regex search. The pattern is unanchored.
pub(crate) fn eval_matches(value: &Value, pattern: &Value) -> Result<bool, RuleError> {
    match (value, pattern) {
        (Value::Null, Value::String(pattern)) => {
            Regex::new(pattern).map_err(|e| RuleError::InvalidRegex(e.to_string()))?;
            Ok(false)
        }
        (Value::String(s), Value::String(pattern)) => {
            let re = Regex::new(pattern).map_err(|e| RuleError::InvalidRegex(e.to_string()))?;
            Ok(re.is_match(s))
        }
        _ => Err(RuleError::TypeError(format!(
            "matches: unsupported types {} and {}",
            value.type_name(),
            pattern.type_name()
        ))),
    }
}

/// Length in characters. Null has length zero.
pub(crate) fn eval_string_length(value: &Value) -> Result<Value, RuleError> {
    match value {
        Value::Null => Ok(Value::Int(0)),
        Value::String(s) => Ok(Value::Int(i64::try_from(s.chars().count()).unwrap_or(i64::MAX))),
        other => Err(RuleError::TypeError(format!(
            "length: expected string, got {}",
            other.type_name()
        ))),
    }
}
