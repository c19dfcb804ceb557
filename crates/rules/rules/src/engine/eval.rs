use crate::engine::context::Context;
use crate::engine::ops_compare::{eval_between, eval_in};
use crate::engine::ops_date::{eval_after, eval_before, eval_between_dates};
use crate::engine::ops_math::{
    eval_add, eval_arithmetic, eval_ceil, eval_div, eval_floor, eval_mod, eval_multiply,
    eval_negate, eval_pow,
};
use crate::engine::ops_string::{
    eval_contains, eval_ends_with, eval_matches, eval_starts_with, eval_string_length,
};
use crate::engine::ops_type::{eval_is_empty, eval_is_numeric};
use crate::engine::value::Value;
use crate::error::RuleError;
use crate::ir::operand::Operand;
use crate::ir::operator::{Operator, OperatorKind};

/// Resolve an operator against the fact store.
///
/// Propositions yield `Value::Bool`; mathematical operators and
/// `StringLength` yield the computed value.
pub(crate) fn prepare(op: &Operator, ctx: &Context) -> Result<Value, RuleError> {
    let operands = op.operands()?;
    let kind = op.kind();

    match kind {
        OperatorKind::And => {
            for operand in operands {
                if !operand.evaluate(ctx)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        OperatorKind::Or => {
            for operand in operands {
                if operand.evaluate(ctx)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        OperatorKind::Xor => {
            let mut truthy = 0usize;
            for operand in operands {
                if operand.evaluate(ctx)? {
                    truthy += 1;
                }
            }
            Ok(Value::Bool(truthy == 1))
        }
        OperatorKind::Nand => {
            for operand in operands {
                if !operand.evaluate(ctx)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        OperatorKind::Nor => {
            for operand in operands {
                if operand.evaluate(ctx)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }
        OperatorKind::Not => {
            let [inner] = operands else {
                return Err(arity(kind, operands));
            };
            Ok(Value::Bool(!inner.evaluate(ctx)?))
        }

        // Comparison
        OperatorKind::EqualTo => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(lhs.equal_to(&rhs)))
        }
        OperatorKind::NotEqualTo => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(!lhs.equal_to(&rhs)))
        }
        OperatorKind::SameAs => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(lhs.same_as(&rhs)))
        }
        OperatorKind::NotSameAs => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(!lhs.same_as(&rhs)))
        }
        OperatorKind::GreaterThan => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            lhs.greater_than(&rhs).map(Value::Bool)
        }
        OperatorKind::GreaterThanOrEqualTo => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            lhs.greater_than_or_equal_to(&rhs).map(Value::Bool)
        }
        OperatorKind::LessThan => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            lhs.less_than(&rhs).map(Value::Bool)
        }
        OperatorKind::LessThanOrEqualTo => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            lhs.less_than_or_equal_to(&rhs).map(Value::Bool)
        }
        OperatorKind::Between => {
            let [value, low, high] = resolve(kind, operands, ctx)?;
            eval_between(&value, &low, &high).map(Value::Bool)
        }
        OperatorKind::In => {
            let [needle, haystack] = resolve(kind, operands, ctx)?;
            eval_in(&needle, &haystack).map(Value::Bool)
        }
        OperatorKind::NotIn => {
            let [needle, haystack] = resolve(kind, operands, ctx)?;
            eval_in(&needle, &haystack).map(|found| Value::Bool(!found))
        }

        // String
        OperatorKind::Contains => {
            let [haystack, needle] = resolve(kind, operands, ctx)?;
            eval_contains(&haystack, &needle, false).map(Value::Bool)
        }
        OperatorKind::ContainsInsensitive => {
            let [haystack, needle] = resolve(kind, operands, ctx)?;
            eval_contains(&haystack, &needle, true).map(Value::Bool)
        }
        OperatorKind::DoesNotContain => {
            let [haystack, needle] = resolve(kind, operands, ctx)?;
            eval_contains(&haystack, &needle, false).map(|found| Value::Bool(!found))
        }
        OperatorKind::DoesNotContainInsensitive => {
            let [haystack, needle] = resolve(kind, operands, ctx)?;
            eval_contains(&haystack, &needle, true).map(|found| Value::Bool(!found))
        }
        OperatorKind::StartsWith => {
            let [value, prefix] = resolve(kind, operands, ctx)?;
            eval_starts_with(&value, &prefix, false).map(Value::Bool)
        }
        OperatorKind::StartsWithInsensitive => {
            let [value, prefix] = resolve(kind, operands, ctx)?;
            eval_starts_with(&value, &prefix, true).map(Value::Bool)
        }
        OperatorKind::EndsWith => {
            let [value, suffix] = resolve(kind, operands, ctx)?;
            eval_ends_with(&value, &suffix, false).map(Value::Bool)
        }
        OperatorKind::EndsWithInsensitive => {
            let [value, suffix] = resolve(kind, operands, ctx)?;
            eval_ends_with(&value, &suffix, true).map(Value::Bool)
        }
        OperatorKind::Matches => {
            let [value, pattern] = resolve(kind, operands, ctx)?;
            eval_matches(&value, &pattern).map(Value::Bool)
        }
        OperatorKind::DoesNotMatch => {
            let [value, pattern] = resolve(kind, operands, ctx)?;
            eval_matches(&value, &pattern).map(|found| Value::Bool(!found))
        }
        OperatorKind::StringLength => {
            let [value] = resolve(kind, operands, ctx)?;
            eval_string_length(&value)
        }

        // Type
        OperatorKind::IsNull => {
            let [value] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(value.is_null()))
        }
        OperatorKind::IsArray => {
            let [value] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(matches!(value, Value::List(_))))
        }
        OperatorKind::IsBoolean => {
            let [value] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(matches!(value, Value::Bool(_))))
        }
        OperatorKind::IsNumeric => {
            let [value] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(eval_is_numeric(&value)))
        }
        OperatorKind::IsString => {
            let [value] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(matches!(value, Value::String(_))))
        }
        OperatorKind::IsEmpty => {
            let [value] = resolve(kind, operands, ctx)?;
            Ok(Value::Bool(eval_is_empty(&value)))
        }

        // Date
        OperatorKind::After => {
            let [value, bound] = resolve(kind, operands, ctx)?;
            eval_after(&value, &bound).map(Value::Bool)
        }
        OperatorKind::Before => {
            let [value, bound] = resolve(kind, operands, ctx)?;
            eval_before(&value, &bound).map(Value::Bool)
        }
        OperatorKind::IsBetweenDates => {
            let [value, from, to] = resolve(kind, operands, ctx)?;
            eval_between_dates(&value, &from, &to).map(Value::Bool)
        }

        // Mathematical
        OperatorKind::Add => {
            let values = resolve_all(operands, ctx)?;
            fold(&values, eval_add)
        }
        OperatorKind::Multiply => {
            let values = resolve_all(operands, ctx)?;
            fold(&values, eval_multiply)
        }
        OperatorKind::Subtract => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            eval_arithmetic(&lhs, &rhs, i64::wrapping_sub, |a, b| a - b, "subtract")
        }
        OperatorKind::Divide => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            eval_div(&lhs, &rhs)
        }
        OperatorKind::Modulo => {
            let [lhs, rhs] = resolve(kind, operands, ctx)?;
            eval_mod(&lhs, &rhs)
        }
        OperatorKind::Exponentiate => {
            let [base, exponent] = resolve(kind, operands, ctx)?;
            eval_pow(&base, &exponent)
        }
        OperatorKind::Negate => {
            let [value] = resolve(kind, operands, ctx)?;
            eval_negate(&value)
        }
        OperatorKind::Floor => {
            let [value] = resolve(kind, operands, ctx)?;
            eval_floor(&value)
        }
        OperatorKind::Ceil => {
            let [value] = resolve(kind, operands, ctx)?;
            eval_ceil(&value)
        }
    }
}

/// Resolve exactly `N` operands to values.
fn resolve<const N: usize>(
    kind: OperatorKind,
    operands: &[Operand],
    ctx: &Context,
) -> Result<[Value; N], RuleError> {
    let values = resolve_all(operands, ctx)?;
    let actual = values.len();
    values.try_into().map_err(|_| RuleError::Cardinality {
        operator: kind.name(),
        expected: format!("exactly {N}"),
        actual,
    })
}

fn resolve_all(operands: &[Operand], ctx: &Context) -> Result<Vec<Value>, RuleError> {
    operands.iter().map(|o| o.prepare_value(ctx)).collect()
}

fn fold(
    values: &[Value],
    step: fn(&Value, &Value) -> Result<Value, RuleError>,
) -> Result<Value, RuleError> {
    let mut iter = values.iter();
    let mut acc = iter.next().cloned().unwrap_or(Value::Null);
    for value in iter {
        acc = step(&acc, value)?;
    }
    Ok(acc)
}

fn arity(kind: OperatorKind, operands: &[Operand]) -> RuleError {
    RuleError::Cardinality {
        operator: kind.name(),
        expected: "exactly 1".to_owned(),
        actual: operands.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operand::{FieldResolver, Operand};

    fn field(path: &str) -> Operand {
        FieldResolver::new().resolve(path).unwrap()
    }

    fn lit(v: impl Into<Value>) -> Operand {
        Operand::literal(v)
    }

    fn check(kind: OperatorKind, operands: Vec<Operand>, ctx: &Context) -> bool {
        Operator::new(kind, operands).evaluate(ctx).unwrap()
    }

    fn ctx() -> Context {
        Context::from_json(serde_json::json!({
            "age": 25,
            "country": "US",
            "name": "Ada Lovelace",
            "tags": ["admin", "ops"],
            "empty": "",
            "missing": null,
            "score": 7.5,
            "joined": "2024-03-15",
            "d": {"baz": {"qux": 3}},
        }))
    }

    #[test]
    fn logical_operators() {
        let ctx = ctx();
        let t = || lit(true);
        let f = || lit(false);
        assert!(check(OperatorKind::And, vec![t(), t()], &ctx));
        assert!(!check(OperatorKind::And, vec![t(), f()], &ctx));
        assert!(check(OperatorKind::Or, vec![f(), t()], &ctx));
        assert!(!check(OperatorKind::Or, vec![f(), f()], &ctx));
        assert!(check(OperatorKind::Not, vec![f()], &ctx));
        assert!(check(OperatorKind::Xor, vec![f(), t(), f()], &ctx));
        assert!(!check(OperatorKind::Xor, vec![t(), t()], &ctx));
        assert!(check(OperatorKind::Nand, vec![t(), f()], &ctx));
        assert!(!check(OperatorKind::Nand, vec![t(), t()], &ctx));
        assert!(check(OperatorKind::Nor, vec![f(), f()], &ctx));
        assert!(!check(OperatorKind::Nor, vec![f(), t()], &ctx));
    }

    #[test]
    fn and_short_circuits() {
        // The second operand would fail with a type error if evaluated.
        let bad = Operator::binary(OperatorKind::GreaterThan, lit(true), lit(1));
        let op = Operator::new(OperatorKind::And, vec![lit(false), bad.clone().into()]);
        assert!(!op.evaluate(&ctx()).unwrap());
        let op = Operator::new(OperatorKind::Or, vec![lit(true), bad.into()]);
        assert!(op.evaluate(&ctx()).unwrap());
    }

    #[test]
    fn comparisons() {
        let ctx = ctx();
        assert!(check(OperatorKind::GreaterThanOrEqualTo, vec![field("age"), lit(18)], &ctx));
        assert!(!check(OperatorKind::LessThan, vec![field("age"), lit(18)], &ctx));
        assert!(check(OperatorKind::EqualTo, vec![field("country"), lit("US")], &ctx));
        assert!(check(OperatorKind::NotEqualTo, vec![field("country"), lit("CA")], &ctx));
        assert!(check(OperatorKind::EqualTo, vec![field("d.baz.qux"), lit(3)], &ctx));
        assert!(check(OperatorKind::EqualTo, vec![field("age"), lit(25.0)], &ctx));
        assert!(!check(OperatorKind::SameAs, vec![field("age"), lit(25.0)], &ctx));
        assert!(check(OperatorKind::NotSameAs, vec![field("age"), lit(25.0)], &ctx));
        assert!(!check(OperatorKind::GreaterThan, vec![field("missing"), lit(1)], &ctx));
    }

    #[test]
    fn between_is_inclusive() {
        let ctx = ctx();
        assert!(check(OperatorKind::Between, vec![field("age"), lit(18), lit(65)], &ctx));
        assert!(check(OperatorKind::Between, vec![field("age"), lit(25), lit(25)], &ctx));
        assert!(!check(OperatorKind::Between, vec![field("age"), lit(30), lit(65)], &ctx));
    }

    #[test]
    fn membership() {
        let ctx = ctx();
        let list = || lit(vec!["US", "CA"]);
        assert!(check(OperatorKind::In, vec![field("country"), list()], &ctx));
        assert!(!check(OperatorKind::NotIn, vec![field("country"), list()], &ctx));
        assert!(check(OperatorKind::Contains, vec![field("tags"), lit("ops")], &ctx));
    }

    #[test]
    fn string_operators() {
        let ctx = ctx();
        assert!(check(OperatorKind::Contains, vec![field("name"), lit("Love")], &ctx));
        assert!(!check(OperatorKind::Contains, vec![field("name"), lit("love")], &ctx));
        assert!(check(OperatorKind::ContainsInsensitive, vec![field("name"), lit("love")], &ctx));
        assert!(check(OperatorKind::DoesNotContain, vec![field("name"), lit("xyz")], &ctx));
        assert!(check(OperatorKind::StartsWith, vec![field("name"), lit("Ada")], &ctx));
        assert!(check(OperatorKind::StartsWithInsensitive, vec![field("name"), lit("ADA")], &ctx));
        assert!(check(OperatorKind::EndsWith, vec![field("name"), lit("lace")], &ctx));
        assert!(check(OperatorKind::EndsWithInsensitive, vec![field("name"), lit("LACE")], &ctx));
        assert!(check(OperatorKind::Matches, vec![field("name"), lit("^A.*e$")], &ctx));
        assert!(check(OperatorKind::DoesNotMatch, vec![field("name"), lit("^\\d+$")], &ctx));
        assert!(!check(OperatorKind::StartsWith, vec![field("missing"), lit("a")], &ctx));
    }

    #[test]
    fn string_length_feeds_comparison() {
        let ctx = ctx();
        let len = Operator::unary(OperatorKind::StringLength, field("name"));
        assert_eq!(len.prepare_value(&ctx).unwrap(), Value::Int(12));
        assert!(check(OperatorKind::GreaterThan, vec![len.into(), lit(10)], &ctx));
    }

    #[test]
    fn type_operators() {
        let ctx = ctx();
        assert!(check(OperatorKind::IsNull, vec![field("missing")], &ctx));
        assert!(check(OperatorKind::IsNull, vec![field("nope")], &ctx));
        assert!(check(OperatorKind::IsArray, vec![field("tags")], &ctx));
        assert!(check(OperatorKind::IsNumeric, vec![field("score")], &ctx));
        assert!(check(OperatorKind::IsString, vec![field("name")], &ctx));
        assert!(!check(OperatorKind::IsBoolean, vec![field("name")], &ctx));
        assert!(check(OperatorKind::IsEmpty, vec![field("empty")], &ctx));
        assert!(!check(OperatorKind::IsEmpty, vec![field("tags")], &ctx));
    }

    #[test]
    fn date_operators() {
        let ctx = ctx();
        assert!(check(OperatorKind::After, vec![field("joined"), lit("2024-01-01")], &ctx));
        assert!(check(OperatorKind::Before, vec![field("joined"), lit("2025-01-01")], &ctx));
        assert!(check(
            OperatorKind::IsBetweenDates,
            vec![field("joined"), lit("2024-03-01"), lit("2024-03-31")],
            &ctx
        ));
        let bad = Operator::binary(OperatorKind::After, field("name"), lit("2024-01-01"));
        assert!(matches!(bad.evaluate(&ctx), Err(RuleError::InvalidDate(_))));
    }

    #[test]
    fn math_operators() {
        let ctx = ctx();
        let value = |kind, operands| Operator::new(kind, operands).prepare_value(&ctx).unwrap();
        assert_eq!(value(OperatorKind::Add, vec![field("age"), lit(5), lit(1)]), Value::Int(31));
        assert_eq!(value(OperatorKind::Subtract, vec![field("age"), lit(5)]), Value::Int(20));
        assert_eq!(value(OperatorKind::Multiply, vec![lit(2), lit(2.5)]), Value::Float(5.0));
        assert_eq!(value(OperatorKind::Divide, vec![lit(9), lit(2)]), Value::Int(4));
        assert_eq!(value(OperatorKind::Modulo, vec![lit(9), lit(2)]), Value::Int(1));
        assert_eq!(value(OperatorKind::Exponentiate, vec![lit(2), lit(10)]), Value::Int(1024));
        assert_eq!(value(OperatorKind::Negate, vec![field("age")]), Value::Int(-25));
        assert_eq!(value(OperatorKind::Floor, vec![field("score")]), Value::Int(7));
        assert_eq!(value(OperatorKind::Ceil, vec![field("score")]), Value::Int(8));

        let div = Operator::binary(OperatorKind::Divide, lit(1), lit(0));
        assert!(matches!(div.prepare_value(&ctx), Err(RuleError::Evaluation(_))));
    }

    #[test]
    fn invalid_regex_is_reported() {
        let op = Operator::binary(OperatorKind::Matches, field("name"), lit("("));
        assert!(matches!(op.evaluate(&ctx()), Err(RuleError::InvalidRegex(_))));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let op = Operator::binary(OperatorKind::GreaterThan, field("tags"), lit(1));
        assert!(matches!(op.evaluate(&ctx()), Err(RuleError::TypeError(_))));
    }
}
