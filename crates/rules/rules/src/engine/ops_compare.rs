use crate::engine::value::Value;
use crate::error::RuleError;

/// Inclusive range check. A null value or bound is never in range.
pub(crate) fn eval_between(value: &Value, low: &Value, high: &Value) -> Result<bool, RuleError> {
    Ok(value.greater_than_or_equal_to(low)? && value.less_than_or_equal_to(high)?)
}

/// Membership test: `needle in haystack`.
pub(crate) fn eval_in(needle: &Value, haystack: &Value) -> Result<bool, RuleError> {
    match haystack {
        Value::List(_) | Value::Map(_) | Value::String(_) | Value::Null => {
            haystack.contains_value(needle)
        }
        _ => Err(RuleError::TypeError(format!(
            "in: right-hand side must be list, map, or string, got {}",
            haystack.type_name()
        ))),
    }
}
