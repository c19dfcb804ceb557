use serde_json::Value as Json;
use tracing::debug;

use verity_rules::{
    Compiler, FieldResolver, Operand, Operator, OperatorKind, Proposition, RuleError, Value,
};

use crate::ast::Filter;

/// Compiles GraphQL filter ASTs into the IR.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphqlCompiler;

impl GraphqlCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for GraphqlCompiler {
    type Ast = Filter;

    fn compile(&self, ast: &Filter) -> Result<Proposition, RuleError> {
        let mut lowering = Lowering {
            resolver: FieldResolver::new(),
        };
        let root = lowering.filter(ast)?;
        debug!(grammar = "graphql", fields = lowering.resolver.len(), root = %root.kind(), "compiled rule");
        Proposition::try_from(root)
    }
}

struct Lowering {
    resolver: FieldResolver,
}

impl Lowering {
    fn filter(&mut self, filter: &Filter) -> Result<Operator, RuleError> {
        match filter {
            Filter::Object(items) | Filter::And(items) => self.logical(OperatorKind::And, items),
            Filter::Or(items) => self.logical(OperatorKind::Or, items),
            Filter::Not(inner) => self.negated(inner),
            Filter::Equals { field, value } => Ok(Operator::binary(
                OperatorKind::EqualTo,
                self.resolver.resolve(field)?,
                literal(value),
            )),
            Filter::Condition { field, op, value } => self.condition(field, op, value),
        }
    }

    /// `NOT` and field-level `not`, using the negated operator where one
    /// exists.
    fn negated(&mut self, inner: &Filter) -> Result<Operator, RuleError> {
        let negated_kind = match inner {
            Filter::Object(items) | Filter::And(items) => {
                return self.logical(OperatorKind::Nand, items);
            }
            Filter::Or(items) => return self.logical(OperatorKind::Nor, items),
            Filter::Equals { field, value } => {
                return Ok(Operator::binary(
                    OperatorKind::NotEqualTo,
                    self.resolver.resolve(field)?,
                    literal(value),
                ));
            }
            Filter::Condition { op, .. } => match op.as_str() {
                "eq" => Some("ne"),
                "in" => Some("nin"),
                "contains" => Some("notContains"),
                "containsInsensitive" => Some("notContainsInsensitive"),
                "matches" => Some("notMatches"),
                _ => None,
            },
            Filter::Not(_) => None,
        };
        match (negated_kind, inner) {
            (Some(op), Filter::Condition { field, value, .. }) => self.condition(field, op, value),
            _ => Ok(Operator::unary(OperatorKind::Not, self.filter(inner)?)),
        }
    }

    fn logical(&mut self, kind: OperatorKind, items: &[Filter]) -> Result<Operator, RuleError> {
        let operands = items
            .iter()
            .map(|item| self.filter(item).map(Operand::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Operator::new(kind, operands))
    }

    fn condition(&mut self, field: &str, op: &str, value: &Json) -> Result<Operator, RuleError> {
        let subject = self.resolver.resolve(field)?;
        let binary = |kind| Ok(Operator::binary(kind, subject.clone(), literal(value)));
        match op {
            "eq" => binary(OperatorKind::EqualTo),
            "ne" => binary(OperatorKind::NotEqualTo),
            "gt" => binary(OperatorKind::GreaterThan),
            "gte" => binary(OperatorKind::GreaterThanOrEqualTo),
            "lt" => binary(OperatorKind::LessThan),
            "lte" => binary(OperatorKind::LessThanOrEqualTo),
            "in" | "nin" => {
                if !value.is_array() {
                    return Err(shape(field, op, "an array"));
                }
                binary(if op == "in" {
                    OperatorKind::In
                } else {
                    OperatorKind::NotIn
                })
            }
            "between" | "betweenDates" => {
                let Some([low, high]) = value.as_array().map(Vec::as_slice) else {
                    return Err(shape(field, op, "a two-element array"));
                };
                let kind = if op == "between" {
                    OperatorKind::Between
                } else {
                    OperatorKind::IsBetweenDates
                };
                Ok(Operator::new(kind, vec![subject, literal(low), literal(high)]))
            }
            "contains" => binary(OperatorKind::Contains),
            "notContains" => binary(OperatorKind::DoesNotContain),
            "containsInsensitive" => binary(OperatorKind::ContainsInsensitive),
            "notContainsInsensitive" => binary(OperatorKind::DoesNotContainInsensitive),
            "startsWith" => binary(OperatorKind::StartsWith),
            "startsWithInsensitive" => binary(OperatorKind::StartsWithInsensitive),
            "endsWith" => binary(OperatorKind::EndsWith),
            "endsWithInsensitive" => binary(OperatorKind::EndsWithInsensitive),
            "matches" | "notMatches" => {
                if !value.is_string() {
                    return Err(shape(field, op, "a string"));
                }
                binary(if op == "matches" {
                    OperatorKind::Matches
                } else {
                    OperatorKind::DoesNotMatch
                })
            }
            "isNull" | "exists" | "isEmpty" => {
                let Some(flag) = value.as_bool() else {
                    return Err(shape(field, op, "a boolean"));
                };
                let positive = if op == "isEmpty" {
                    Operator::unary(OperatorKind::IsEmpty, subject)
                } else {
                    Operator::binary(OperatorKind::EqualTo, subject, Operand::literal(Value::Null))
                };
                // `exists: true` is the negation of the null check.
                let holds = if op == "exists" { !flag } else { flag };
                Ok(if holds {
                    positive
                } else {
                    Operator::unary(OperatorKind::Not, positive)
                })
            }
            "type" => {
                let kind = match value.as_str() {
                    Some("string") => OperatorKind::IsString,
                    Some("number") => OperatorKind::IsNumeric,
                    Some("boolean") => OperatorKind::IsBoolean,
                    Some("array") => OperatorKind::IsArray,
                    _ => {
                        return Err(RuleError::UnsupportedConstruct(format!(
                            "unknown type {value} for '{field}'"
                        )));
                    }
                };
                Ok(Operator::unary(kind, subject))
            }
            "after" => binary(OperatorKind::After),
            "before" => binary(OperatorKind::Before),
            _ => Err(RuleError::UnsupportedConstruct(format!(
                "unknown operator '{op}' on '{field}'"
            ))),
        }
    }
}

fn literal(value: &Json) -> Operand {
    Operand::literal(Value::from_json(value.clone()))
}

fn shape(field: &str, op: &str, expected: &str) -> RuleError {
    RuleError::UnsupportedConstruct(format!("'{op}' on '{field}' expects {expected}"))
}
