use serde_json::Value as Json;
use tracing::debug;

use verity_rules::{
    Compiler, FieldResolver, Operand, Operator, OperatorKind, Proposition, RuleError, Value,
};

use crate::ast::Filter;
use crate::parser::is_date_literal;

/// Compiles Mongo query ASTs into the IR.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoCompiler;

impl MongoCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for MongoCompiler {
    type Ast = Filter;

    fn compile(&self, ast: &Filter) -> Result<Proposition, RuleError> {
        let mut lowering = Lowering {
            resolver: FieldResolver::new(),
        };
        let root = lowering.filter(ast)?;
        debug!(grammar = "mongo", fields = lowering.resolver.len(), root = %root.kind(), "compiled rule");
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
            Filter::Nor(items) => self.logical(OperatorKind::Nor, items),
            Filter::Not(inner) => self.negated(inner),
            Filter::Equals { field, value } => Ok(Operator::binary(
                OperatorKind::EqualTo,
                self.resolver.resolve(field)?,
                literal(value)?,
            )),
            Filter::Condition { field, op, value } => self.condition(field, op, value),
            Filter::Regex {
                field,
                pattern,
                options,
            } => self.regex(OperatorKind::Matches, field, pattern, options.as_ref()),
            Filter::Unknown { op, .. } => Err(RuleError::UnsupportedConstruct(format!(
                "unknown query operator '{op}'"
            ))),
        }
    }

    /// `$not`, using the negated operator where one exists.
    fn negated(&mut self, inner: &Filter) -> Result<Operator, RuleError> {
        match inner {
            Filter::Object(items) | Filter::And(items) => self.logical(OperatorKind::Nand, items),
            Filter::Or(items) => self.logical(OperatorKind::Nor, items),
            Filter::Equals { field, value } => Ok(Operator::binary(
                OperatorKind::NotEqualTo,
                self.resolver.resolve(field)?,
                literal(value)?,
            )),
            Filter::Condition { field, op, value } if op == "$eq" => {
                self.condition(field, "$ne", value)
            }
            Filter::Condition { field, op, value } if op == "$in" => {
                self.condition(field, "$nin", value)
            }
            Filter::Regex {
                field,
                pattern,
                options,
            } => self.regex(OperatorKind::DoesNotMatch, field, pattern, options.as_ref()),
            other => Ok(Operator::unary(OperatorKind::Not, self.filter(other)?)),
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
        let kind = match op {
            "$eq" => OperatorKind::EqualTo,
            "$ne" => OperatorKind::NotEqualTo,
            "$gt" => OperatorKind::GreaterThan,
            "$gte" => OperatorKind::GreaterThanOrEqualTo,
            "$lt" => OperatorKind::LessThan,
            "$lte" => OperatorKind::LessThanOrEqualTo,
            "$in" | "$nin" => {
                if !value.is_array() {
                    return Err(shape(field, op, "an array"));
                }
                if op == "$in" {
                    OperatorKind::In
                } else {
                    OperatorKind::NotIn
                }
            }
            "$exists" => {
                let Some(exists) = value.as_bool() else {
                    return Err(shape(field, op, "a boolean"));
                };
                let missing = Operator::binary(
                    OperatorKind::EqualTo,
                    subject,
                    Operand::literal(Value::Null),
                );
                return Ok(if exists {
                    Operator::unary(OperatorKind::Not, missing)
                } else {
                    missing
                });
            }
            "$type" => {
                let kind = match value.as_str() {
                    Some("string") => OperatorKind::IsString,
                    Some("number" | "double" | "int" | "long" | "decimal") => {
                        OperatorKind::IsNumeric
                    }
                    Some("bool") => OperatorKind::IsBoolean,
                    Some("array") => OperatorKind::IsArray,
                    Some("null") => OperatorKind::IsNull,
                    _ => {
                        return Err(RuleError::UnsupportedConstruct(format!(
                            "unknown $type {value} for '{field}'"
                        )));
                    }
                };
                return Ok(Operator::unary(kind, subject));
            }
            _ => {
                return Err(RuleError::UnsupportedConstruct(format!(
                    "unknown operator '{op}' on '{field}'"
                )));
            }
        };
        Ok(Operator::binary(kind, subject, literal(value)?))
    }

    fn regex(
        &mut self,
        kind: OperatorKind,
        field: &str,
        pattern: &Json,
        options: Option<&Json>,
    ) -> Result<Operator, RuleError> {
        let Some(pattern) = pattern.as_str() else {
            return Err(shape(field, "$regex", "a string"));
        };
        let flags = match options {
            None => "",
            Some(Json::String(flags)) if flags.chars().all(|c| "imsx".contains(c)) => flags,
            Some(other) => {
                return Err(RuleError::UnsupportedConstruct(format!(
                    "unsupported $options {other} on '{field}'"
                )));
            }
        };
        let pattern = if flags.is_empty() {
            pattern.to_owned()
        } else {
            format!("(?{flags}){pattern}")
        };
        Ok(Operator::binary(
            kind,
            self.resolver.resolve(field)?,
            Operand::literal(pattern),
        ))
    }
}

/// A JSON literal, reading `{"$date": "..."}` as a date.
fn literal(value: &Json) -> Result<Operand, RuleError> {
    Ok(Operand::literal(literal_value(value)?))
}

fn literal_value(value: &Json) -> Result<Value, RuleError> {
    match value {
        Json::Object(entries) if is_date_literal(entries) => {
            let text = Value::from_json(entries["$date"].clone());
            Ok(Value::DateTime(text.as_datetime()?))
        }
        Json::Array(items) => Ok(Value::List(
            items.iter().map(literal_value).collect::<Result<_, _>>()?,
        )),
        other => Ok(Value::from_json(other.clone())),
    }
}

fn shape(field: &str, op: &str, expected: &str) -> RuleError {
    RuleError::UnsupportedConstruct(format!("'{op}' on '{field}' expects {expected}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::MongoParser;
    use verity_rules::{Context, Parser};

    fn compile(input: &str) -> Proposition {
        let ast = MongoParser::new().parse(input).unwrap();
        MongoCompiler.compile(&ast).unwrap()
    }

    fn eval(input: &str, facts: serde_json::Value) -> bool {
        compile(input).evaluate(&Context::from_json(facts)).unwrap()
    }

    #[test]
    fn adult_in_country() {
        let rule = r#"{"age": {"$gte": 18}, "country": "US"}"#;
        assert!(!eval(rule, serde_json::json!({"age": 16, "country": "US"})));
        assert!(eval(rule, serde_json::json!({"age": 30, "country": "US"})));
    }

    #[test]
    fn implicit_and_matches_explicit() {
        let implicit = compile(r#"{"age": {"$gte": 18}, "country": "US"}"#);
        let explicit = compile(r#"{"$and": [{"age": {"$gte": 18}}, {"country": "US"}]}"#);
        assert_eq!(implicit.operator(), explicit.operator());
    }

    #[test]
    fn operators_evaluate() {
        let facts = serde_json::json!({
            "name": "Ada Lovelace",
            "tags": "admin",
            "score": 7.5,
            "user": {"plan": "pro"},
            "deleted": null,
        });
        assert!(eval(r#"{"name": {"$regex": "^ada", "$options": "i"}}"#, facts.clone()));
        assert!(eval(r#"{"name": {"$not": {"$regex": "^Bob"}}}"#, facts.clone()));
        assert!(eval(r#"{"user.plan": {"$in": ["pro", "team"]}, "tags": {"$nin": ["banned"]}}"#, facts.clone()));
        assert!(eval(r#"{"deleted": {"$exists": false}, "name": {"$exists": true}}"#, facts.clone()));
        assert!(eval(r#"{"score": {"$type": "double", "$gt": 7, "$lte": 7.5}}"#, facts.clone()));
        assert!(eval(r#"{"$nor": [{"score": {"$lt": 5}}, {"user": {"plan": "free"}}]}"#, facts.clone()));
        assert!(!eval(r#"{"$not": {"name": {"$type": "string"}, "score": {"$ne": 0}}}"#, facts));
    }

    #[test]
    fn negation_idioms() {
        let kind = |input: &str| compile(input).operator().kind();
        assert_eq!(kind(r#"{"$not": {"$and": [{"a": 1}, {"b": 2}]}}"#), OperatorKind::Nand);
        assert_eq!(kind(r#"{"$not": {"$or": [{"a": 1}, {"b": 2}]}}"#), OperatorKind::Nor);
        assert_eq!(kind(r#"{"a": {"$not": {"$eq": 1}}}"#), OperatorKind::NotEqualTo);
        assert_eq!(kind(r#"{"a": {"$not": {"$in": [1]}}}"#), OperatorKind::NotIn);
        assert_eq!(kind(r#"{"a": {"$not": {"$regex": "x"}}}"#), OperatorKind::DoesNotMatch);
        assert_eq!(kind(r#"{"a": {"$not": {"$gt": 1}}}"#), OperatorKind::Not);
    }

    #[test]
    fn exists_false_equals_null_match() {
        let missing = compile(r#"{"mail": {"$exists": false}}"#);
        let null = compile(r#"{"mail": null}"#);
        assert_eq!(missing.operator(), null.operator());
    }

    #[test]
    fn dates() {
        let rule = compile(r#"{"at": {"$gt": {"$date": "2024-01-01T00:00:00Z"}}}"#);
        let bound = &rule.operator().operands().unwrap()[1];
        assert!(matches!(bound.as_literal(), Some(Value::DateTime(_))));

        let facts = serde_json::json!({"at": "2024-06-01T00:00:00Z"});
        assert!(rule.evaluate(&Context::from_json(facts)).unwrap());
    }

    #[test]
    fn unknown_operators_and_shapes() {
        for input in [
            r#"{"a": {"$elemMatch": {"b": 1}}}"#,
            r#"{"$where": "this.a > 1"}"#,
            r#"{"$not": {"$text": {"$search": "ada"}}}"#,
            r#"{"a": {"$in": 1}}"#,
            r#"{"a": {"$exists": 1}}"#,
            r#"{"a": {"$type": "objectId"}}"#,
            r#"{"a": {"$regex": "x", "$options": "g"}}"#,
        ] {
            let ast = MongoParser::new().parse(input).unwrap();
            assert!(
                matches!(MongoCompiler.compile(&ast), Err(RuleError::UnsupportedConstruct(_))),
                "{input}"
            );
        }
    }
}
