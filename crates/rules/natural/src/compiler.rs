use tracing::debug;

use verity_rules::{
    Compiler, FieldResolver, Operand, Operator, OperatorKind, Proposition, RuleError, Value,
};

use crate::ast::{Comparison, Condition, Expr, Predicate, Subject, Term, TextOp};

/// Compiles natural-language ASTs into the IR.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalCompiler;

impl NaturalCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for NaturalCompiler {
    type Ast = Expr;

    fn compile(&self, ast: &Expr) -> Result<Proposition, RuleError> {
        let mut lowering = Lowering {
            resolver: FieldResolver::new(),
        };
        let root = lowering.expr(ast)?;
        debug!(grammar = "natural", fields = lowering.resolver.len(), root = %root.kind(), "compiled rule");
        Proposition::try_from(root)
    }
}

struct Lowering {
    resolver: FieldResolver,
}

impl Lowering {
    fn expr(&mut self, expr: &Expr) -> Result<Operator, RuleError> {
        match expr {
            Expr::Or(children) => self.logical(OperatorKind::Or, children),
            Expr::And(children) => self.logical(OperatorKind::And, children),
            Expr::Not(inner) => Ok(not(self.expr(inner)?)),
            Expr::Condition(condition) => self.condition(condition),
        }
    }

    fn logical(&mut self, kind: OperatorKind, children: &[Expr]) -> Result<Operator, RuleError> {
        let operands = children
            .iter()
            .map(|child| self.expr(child).map(Operand::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Operator::new(kind, operands))
    }

    fn term(&mut self, term: &Term) -> Result<Operand, RuleError> {
        match term {
            Term::Field(path) => self.resolver.resolve(path),
            Term::Literal(value) => Ok(Operand::literal(value.clone())),
        }
    }

    fn subject(&mut self, subject: &Subject) -> Result<Operand, RuleError> {
        match subject {
            Subject::Field(path) => self.resolver.resolve(path),
            Subject::Length(path) => Ok(Operator::unary(
                OperatorKind::StringLength,
                self.resolver.resolve(path)?,
            )
            .into()),
        }
    }

    fn condition(&mut self, condition: &Condition) -> Result<Operator, RuleError> {
        let subject = self.subject(&condition.subject)?;

        let op = match &condition.predicate {
            Predicate::Compare(cmp, term) => {
                let kind = match cmp {
                    Comparison::Equal => OperatorKind::EqualTo,
                    Comparison::NotEqual => OperatorKind::NotEqualTo,
                    Comparison::Greater => OperatorKind::GreaterThan,
                    Comparison::GreaterOrEqual => OperatorKind::GreaterThanOrEqualTo,
                    Comparison::Less => OperatorKind::LessThan,
                    Comparison::LessOrEqual => OperatorKind::LessThanOrEqualTo,
                    Comparison::Identical => OperatorKind::SameAs,
                    Comparison::NotIdentical => OperatorKind::NotSameAs,
                };
                Operator::binary(kind, subject, self.term(term)?)
            }
            Predicate::Between { negated, low, high } => {
                let low = self.term(low)?;
                let high = self.term(high)?;
                negate_if(*negated, Operator::new(OperatorKind::Between, vec![subject, low, high]))
            }
            Predicate::BetweenDates { negated, from, to } => {
                let from = self.term(from)?;
                let to = self.term(to)?;
                negate_if(
                    *negated,
                    Operator::new(OperatorKind::IsBetweenDates, vec![subject, from, to]),
                )
            }
            Predicate::OneOf { negated, values } => {
                let kind = if *negated {
                    OperatorKind::NotIn
                } else {
                    OperatorKind::In
                };
                Operator::binary(kind, subject, Operand::literal(Value::List(values.clone())))
            }
            Predicate::Text {
                op,
                negated,
                pattern,
                ignore_case,
            } => self.text(subject, *op, *negated, pattern, *ignore_case)?,
            Predicate::Exists { negated } => {
                let is_null = Operator::binary(OperatorKind::EqualTo, subject, Operand::literal(Value::Null));
                negate_if(!*negated, is_null)
            }
            Predicate::Null { negated } => negate_if(*negated, Operator::unary(OperatorKind::IsNull, subject)),
            Predicate::Empty { negated } => negate_if(*negated, Operator::unary(OperatorKind::IsEmpty, subject)),
            Predicate::Type { negated, name } => {
                let kind = match name.as_str() {
                    "string" | "text" => OperatorKind::IsString,
                    "number" | "numeric" => OperatorKind::IsNumeric,
                    "boolean" | "bool" => OperatorKind::IsBoolean,
                    "list" | "array" => OperatorKind::IsArray,
                    other => {
                        return Err(RuleError::UnsupportedConstruct(format!(
                            "unknown type name '{other}'"
                        )));
                    }
                };
                negate_if(*negated, Operator::unary(kind, subject))
            }
            Predicate::After(term) => Operator::binary(OperatorKind::After, subject, self.term(term)?),
            Predicate::Before(term) => Operator::binary(OperatorKind::Before, subject, self.term(term)?),
        };
        Ok(op)
    }

    fn text(
        &mut self,
        subject: Operand,
        op: TextOp,
        negated: bool,
        pattern: &Term,
        ignore_case: bool,
    ) -> Result<Operator, RuleError> {
        let pattern = self.term(pattern)?;
        let op = match (op, negated, ignore_case) {
            (TextOp::Contains, false, false) => Operator::binary(OperatorKind::Contains, subject, pattern),
            (TextOp::Contains, false, true) => {
                Operator::binary(OperatorKind::ContainsInsensitive, subject, pattern)
            }
            (TextOp::Contains, true, false) => {
                Operator::binary(OperatorKind::DoesNotContain, subject, pattern)
            }
            (TextOp::Contains, true, true) => {
                Operator::binary(OperatorKind::DoesNotContainInsensitive, subject, pattern)
            }
            (TextOp::StartsWith, negated, insensitive) => {
                let kind = if insensitive {
                    OperatorKind::StartsWithInsensitive
                } else {
                    OperatorKind::StartsWith
                };
                negate_if(negated, Operator::binary(kind, subject, pattern))
            }
            (TextOp::EndsWith, negated, insensitive) => {
                let kind = if insensitive {
                    OperatorKind::EndsWithInsensitive
                } else {
                    OperatorKind::EndsWith
                };
                negate_if(negated, Operator::binary(kind, subject, pattern))
            }
            (TextOp::Matches, negated, insensitive) => {
                let pattern = if insensitive {
                    case_insensitive_pattern(pattern)?
                } else {
                    pattern
                };
                let kind = if negated {
                    OperatorKind::DoesNotMatch
                } else {
                    OperatorKind::Matches
                };
                Operator::binary(kind, subject, pattern)
            }
        };
        Ok(op)
    }
}

/// Prefix a literal regex with the case-insensitive flag.
fn case_insensitive_pattern(pattern: Operand) -> Result<Operand, RuleError> {
    match pattern.as_literal().and_then(Value::as_str) {
        Some(text) => Ok(Operand::literal(format!("(?i){text}"))),
        None => Err(RuleError::UnsupportedConstruct(
            "'ignoring case' needs a literal pattern for 'matches'".to_owned(),
        )),
    }
}

fn not(op: Operator) -> Operator {
    Operator::unary(OperatorKind::Not, op)
}

fn negate_if(negated: bool, op: Operator) -> Operator {
    if negated { not(op) } else { op }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::NaturalParser;
    use verity_rules::{Context, Parser};

    fn compile(input: &str) -> Proposition {
        let ast = NaturalParser::new().parse(input).unwrap();
        NaturalCompiler.compile(&ast).unwrap()
    }

    fn eval(input: &str, facts: serde_json::Value) -> bool {
        compile(input).evaluate(&Context::from_json(facts)).unwrap()
    }

    fn field(path: &str) -> Operand {
        FieldResolver::new().resolve(path).unwrap()
    }

    #[test]
    fn compound_rule_shape() {
        let rule = compile(r#"age is greater than or equal to 18 and country equals "US""#);
        let expected = Operator::new(
            OperatorKind::And,
            vec![
                Operator::binary(OperatorKind::GreaterThanOrEqualTo, field("age"), Operand::literal(18)).into(),
                Operator::binary(OperatorKind::EqualTo, field("country"), Operand::literal("US")).into(),
            ],
        );
        assert_eq!(rule.operator(), &expected);
    }

    #[test]
    fn compound_rule_evaluates() {
        let rule = r#"age is greater than or equal to 18 and country equals "US""#;
        assert!(eval(rule, serde_json::json!({"age": 25, "country": "US"})));
        assert!(!eval(rule, serde_json::json!({"age": 17, "country": "US"})));
    }

    #[test]
    fn negation_idioms_use_negated_kinds() {
        let rule = compile(r#"country is not one of "US", "CA""#);
        assert_eq!(rule.operator().kind(), OperatorKind::NotIn);

        let rule = compile(r#"name does not contain "x""#);
        assert_eq!(rule.operator().kind(), OperatorKind::DoesNotContain);

        let rule = compile("age is not between 1 and 5");
        assert_eq!(rule.operator().kind(), OperatorKind::Not);
        let inner = rule.operator().operands().unwrap()[0].as_operator().unwrap();
        assert_eq!(inner.kind(), OperatorKind::Between);
    }

    #[test]
    fn exists_and_null_share_shape() {
        let missing = compile("nickname does not exist");
        let expected = Operator::binary(OperatorKind::EqualTo, field("nickname"), Operand::literal(Value::Null));
        assert_eq!(missing.operator(), &expected);

        let present = compile("nickname exists");
        assert_eq!(present.operator(), &not(expected));
    }

    #[test]
    fn string_operators() {
        let facts = serde_json::json!({"email": "Ada@Example.com", "name": "Ada Lovelace"});
        assert!(eval(r#"email ends with "@example.com" ignoring case"#, facts.clone()));
        assert!(!eval(r#"email ends with "@example.com""#, facts.clone()));
        assert!(eval(r#"name matches "^ada" ignoring case"#, facts.clone()));
        assert!(eval(r#"name does not start with "Bob""#, facts.clone()));
        assert!(eval("length of name is 12", facts));
    }

    #[test]
    fn type_tests() {
        let facts = serde_json::json!({"tags": ["a"], "age": 3, "name": "x", "ok": true});
        assert!(eval("tags is a list", facts.clone()));
        assert!(eval("age is a number", facts.clone()));
        assert!(eval("name is not a number", facts.clone()));
        assert!(eval("ok is a boolean", facts));

        let ast = NaturalParser::new().parse("age is a unicorn").unwrap();
        assert!(matches!(
            NaturalCompiler.compile(&ast),
            Err(RuleError::UnsupportedConstruct(_))
        ));
    }

    #[test]
    fn date_operators() {
        let facts = serde_json::json!({"joined": "2024-03-01T00:00:00Z"});
        assert!(eval(r#"joined is after "2024-01-01T00:00:00Z""#, facts.clone()));
        assert!(eval(
            r#"joined is between dates "2024-01-01T00:00:00Z" and "2024-12-31T00:00:00Z""#,
            facts.clone()
        ));
        assert!(!eval(r#"joined is before "2024-01-01T00:00:00Z""#, facts));
    }

    #[test]
    fn identity_equality() {
        let rule = compile("a is identical to b");
        assert_eq!(rule.operator().kind(), OperatorKind::SameAs);
        assert!(eval("a is identical to 1", serde_json::json!({"a": 1})));
        assert!(!eval("a is identical to 1.0", serde_json::json!({"a": 1})));
    }

    #[test]
    fn repeated_fields_share_root() {
        let rule = compile("a is at least 1 and a is at most 5");
        let ops = rule.operator().operands().unwrap();
        let lhs = |i: usize| ops[i].as_operator().unwrap().operands().unwrap()[0].clone();
        match (lhs(0), lhs(1)) {
            (Operand::Variable(x), Operand::Variable(y)) => assert!(std::sync::Arc::ptr_eq(&x, &y)),
            other => panic!("expected variables, got {other:?}"),
        }
    }
}
