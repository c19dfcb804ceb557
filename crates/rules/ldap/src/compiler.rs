use tracing::debug;

use verity_rules::{
    Compiler, FieldResolver, Operand, Operator, OperatorKind, Proposition, RuleError, Value,
};

use crate::ast::{Filter, MatchOp};

/// Compiles LDAP filters into the IR.
///
/// Unescaped assertion values that read as integers, floats or
/// `TRUE`/`FALSE` become typed literals; everything else is a string.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapCompiler;

impl LdapCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for LdapCompiler {
    type Ast = Filter;

    fn compile(&self, ast: &Filter) -> Result<Proposition, RuleError> {
        let mut lowering = Lowering {
            resolver: FieldResolver::new(),
        };
        let root = lowering.filter(ast)?;
        debug!(grammar = "ldap", fields = lowering.resolver.len(), root = %root.kind(), "compiled rule");
        Proposition::try_from(root)
    }
}

/// Type an assertion value the way the compiler reads it.
pub(crate) fn assertion_value(raw: &str, escaped: bool) -> Value {
    if escaped {
        return Value::String(raw.to_owned());
    }
    if raw.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if raw.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(n) = raw.parse::<i64>() {
        return Value::Int(n);
    }
    let numeric = raw.bytes().any(|b| b.is_ascii_digit())
        && raw
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'.' | b'-' | b'+' | b'e' | b'E'));
    if numeric && let Ok(f) = raw.parse::<f64>() {
        return Value::Float(f);
    }
    Value::String(raw.to_owned())
}

struct Lowering {
    resolver: FieldResolver,
}

impl Lowering {
    fn filter(&mut self, filter: &Filter) -> Result<Operator, RuleError> {
        match filter {
            Filter::And(items) => self.logical(OperatorKind::And, items),
            Filter::Or(items) => self.logical(OperatorKind::Or, items),
            Filter::Not(inner) => self.negated(inner),
            Filter::Item {
                attribute,
                op,
                value,
                escaped,
            } => {
                let kind = match op {
                    MatchOp::Equal => OperatorKind::EqualTo,
                    MatchOp::GreaterOrEqual => OperatorKind::GreaterThanOrEqualTo,
                    MatchOp::LessOrEqual => OperatorKind::LessThanOrEqualTo,
                    MatchOp::Greater => OperatorKind::GreaterThan,
                    MatchOp::Less => OperatorKind::LessThan,
                    MatchOp::Approx => {
                        return Err(RuleError::UnsupportedConstruct(format!(
                            "approximate match '{attribute}~={value}'"
                        )));
                    }
                };
                Ok(Operator::binary(
                    kind,
                    self.resolver.resolve(attribute)?,
                    Operand::literal(assertion_value(value, *escaped)),
                ))
            }
            Filter::Present(attribute) => Ok(Operator::unary(
                OperatorKind::Not,
                self.is_absent(attribute)?,
            )),
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            } => {
                let field = self.resolver.resolve(attribute)?;
                let op = match (initial, any.as_slice(), last) {
                    (Some(text), [], None) => {
                        Operator::binary(OperatorKind::StartsWith, field, Operand::literal(text.as_str()))
                    }
                    (None, [], Some(text)) => {
                        Operator::binary(OperatorKind::EndsWith, field, Operand::literal(text.as_str()))
                    }
                    (None, [text], None) => {
                        Operator::binary(OperatorKind::Contains, field, Operand::literal(text.as_str()))
                    }
                    // `(x=**)` asserts presence only.
                    (None, [], None) => Operator::unary(
                        OperatorKind::Not,
                        Operator::binary(OperatorKind::EqualTo, field, Operand::literal(Value::Null)),
                    ),
                    _ => Operator::binary(
                        OperatorKind::Matches,
                        field,
                        Operand::literal(substring_regex(initial.as_deref(), any, last.as_deref())),
                    ),
                };
                Ok(op)
            }
        }
    }

    /// `(!...)`, using the negated operator where one exists.
    fn negated(&mut self, inner: &Filter) -> Result<Operator, RuleError> {
        match inner {
            Filter::And(items) => self.logical(OperatorKind::Nand, items),
            Filter::Or(items) => self.logical(OperatorKind::Nor, items),
            Filter::Item {
                attribute,
                op: MatchOp::Equal,
                value,
                escaped,
            } => Ok(Operator::binary(
                OperatorKind::NotEqualTo,
                self.resolver.resolve(attribute)?,
                Operand::literal(assertion_value(value, *escaped)),
            )),
            Filter::Present(attribute) => self.is_absent(attribute),
            Filter::Substring {
                attribute,
                initial: None,
                any,
                last: None,
            } if any.len() == 1 => Ok(Operator::binary(
                OperatorKind::DoesNotContain,
                self.resolver.resolve(attribute)?,
                Operand::literal(any[0].as_str()),
            )),
            other => Ok(Operator::unary(OperatorKind::Not, self.filter(other)?)),
        }
    }

    fn is_absent(&mut self, attribute: &str) -> Result<Operator, RuleError> {
        Ok(Operator::binary(
            OperatorKind::EqualTo,
            self.resolver.resolve(attribute)?,
            Operand::literal(Value::Null),
        ))
    }

    fn logical(&mut self, kind: OperatorKind, items: &[Filter]) -> Result<Operator, RuleError> {
        let operands = items
            .iter()
            .map(|item| self.filter(item).map(Operand::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Operator::new(kind, operands))
    }
}

fn substring_regex(initial: Option<&str>, any: &[String], last: Option<&str>) -> String {
    let mut regex = String::from("^");
    regex.push_str(&regex::escape(initial.unwrap_or_default()));
    for text in any {
        regex.push_str(".*");
        regex.push_str(&regex::escape(text));
    }
    regex.push_str(".*");
    regex.push_str(&regex::escape(last.unwrap_or_default()));
    regex.push('$');
    regex
}
