use crate::engine::value::Value;
use crate::error::RuleError;

/// `value` is strictly later than `bound`. A null value is never after.
pub(crate) fn eval_after(value: &Value, bound: &Value) -> Result<bool, RuleError> {
    if value.is_null() {
        return Ok(false);
    }
    Ok(value.as_datetime()? > bound.as_datetime()?)
}

/// `value` is strictly earlier than `bound`.
pub(crate) fn eval_before(value: &Value, bound: &Value) -> Result<bool, RuleError> {
    if value.is_null() {
        return Ok(false);
    }
    Ok(value.as_datetime()? < bound.as_datetime()?)
}

/// Inclusive date range check.
pub(crate) fn eval_between_dates(value: &Value, from: &Value, to: &Value) -> Result<bool, RuleError> {
    if value.is_null() {
        return Ok(false);
    }
    let at = value.as_datetime()?;
    Ok(from.as_datetime()? <= at && at <= to.as_datetime()?)
}
