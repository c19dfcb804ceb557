use crate::engine::value::Value;

/// Ints and floats are numeric; numeric-looking strings are not.
pub(crate) fn eval_is_numeric(value: &Value) -> bool {
    matches!(value, Value::Int(_) | Value::Float(_))
}

/// Null, the empty string, and empty collections are empty.
pub(crate) fn eval_is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::List(items) => items.is_empty(),
        Value::Map(m) => m.is_empty(),
        _ => false,
    }
}
