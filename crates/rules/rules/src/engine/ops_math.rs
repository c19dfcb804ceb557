use crate::engine::value::Value;
use crate::error::RuleError;

/// Add two values (supports int, float, and string concatenation).
pub(crate) fn eval_add(left: &Value, right: &Value) -> Result<Value, RuleError> {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{a}{b}"))),
        _ => eval_arithmetic(left, right, i64::wrapping_add, |a, b| a + b, "add"),
    }
}

/// Multiply two numeric values.
pub(crate) fn eval_multiply(left: &Value, right: &Value) -> Result<Value, RuleError> {
    eval_arithmetic(left, right, i64::wrapping_mul, |a, b| a * b, "multiply")
}

/// Generic arithmetic on two numeric values.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn eval_arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> i64,
    float_op: fn(f64, f64) -> f64,
    op_name: &str,
) -> Result<Value, RuleError> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(*a, *b))),
        (Value::Float(a), Value::Float(b)) => Ok(Value::Float(float_op(*a, *b))),
        (Value::Int(a), Value::Float(b)) => Ok(Value::Float(float_op(*a as f64, *b))),
        (Value::Float(a), Value::Int(b)) => Ok(Value::Float(float_op(*a, *b as f64))),
        _ => Err(RuleError::TypeError(format!(
            "cannot {op_name} {} and {}",
            left.type_name(),
            right.type_name()
        ))),
    }
}

/// Division with zero-check.
pub(crate) fn eval_div(left: &Value, right: &Value) -> Result<Value, RuleError> {
    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(0)) => {
            Err(RuleError::Evaluation("division by zero".into()))
        }
        (Value::Int(_) | Value::Float(_), Value::Float(f)) if *f == 0.0 => {
            Err(RuleError::Evaluation("division by zero".into()))
        }
        _ => eval_arithmetic(left, right, i64::wrapping_div, |a, b| a / b, "divide"),
    }
}

/// Modulo with zero-check.
pub(crate) fn eval_mod(left: &Value, right: &Value) -> Result<Value, RuleError> {
    match (left, right) {
        (Value::Int(_) | Value::Float(_), Value::Int(0)) => {
            Err(RuleError::Evaluation("modulo by zero".into()))
        }
        (Value::Int(_) | Value::Float(_), Value::Float(f)) if *f == 0.0 => {
            Err(RuleError::Evaluation("modulo by zero".into()))
        }
        _ => eval_arithmetic(left, right, i64::wrapping_rem, |a, b| a % b, "modulo"),
    }
}

/// Exponentiation. Integer results stay integers while they fit.
#[allow(clippy::cast_precision_loss)]
pub(crate) fn eval_pow(base: &Value, exponent: &Value) -> Result<Value, RuleError> {
    if let (Value::Int(b), Value::Int(e)) = (base, exponent)
        && let Ok(e) = u32::try_from(*e)
        && let Some(result) = b.checked_pow(e)
    {
        return Ok(Value::Int(result));
    }
    let as_float = |v: &Value| match v {
        Value::Int(n) => Some(*n as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    };
    match (as_float(base), as_float(exponent)) {
        (Some(b), Some(e)) => Ok(Value::Float(b.powf(e))),
        _ => Err(RuleError::TypeError(format!(
            "cannot raise {} to {}",
            base.type_name(),
            exponent.type_name()
        ))),
    }
}

/// Arithmetic negation.
pub(crate) fn eval_negate(value: &Value) -> Result<Value, RuleError> {
    match value {
        Value::Int(n) => Ok(Value::Int(n.wrapping_neg())),
        Value::Float(f) => Ok(Value::Float(-f)),
        _ => Err(RuleError::TypeError(format!(
            "cannot negate {}",
            value.type_name()
        ))),
    }
}

/// Round toward negative infinity.
pub(crate) fn eval_floor(value: &Value) -> Result<Value, RuleError> {
    round_with(value, f64::floor, "floor")
}

/// Round toward positive infinity.
pub(crate) fn eval_ceil(value: &Value) -> Result<Value, RuleError> {
    round_with(value, f64::ceil, "ceil")
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn round_with(value: &Value, round: fn(f64) -> f64, op_name: &str) -> Result<Value, RuleError> {
    match value {
        Value::Int(n) => Ok(Value::Int(*n)),
        Value::Float(f) => {
            let rounded = round(*f);
            if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
                Ok(Value::Int(rounded as i64))
            } else {
                Ok(Value::Float(rounded))
            }
        }
        _ => Err(RuleError::TypeError(format!(
            "cannot {op_name} {}",
            value.type_name()
        ))),
    }
}
