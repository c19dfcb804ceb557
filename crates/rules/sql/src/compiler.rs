use tracing::debug;

use verity_rules::{
    Compiler, FieldResolver, Operand, Operator, OperatorKind, Proposition, RuleError, Value,
};

use crate::ast::{ArithOp, CompareOp, Expr, Scalar};

/// Compiles SQL ASTs into the IR.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCompiler;

impl SqlCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl Compiler for SqlCompiler {
    type Ast = Expr;

    fn compile(&self, ast: &Expr) -> Result<Proposition, RuleError> {
        let mut lowering = Lowering {
            resolver: FieldResolver::new(),
        };
        let root = lowering.expr(ast)?;
        debug!(grammar = "sql", fields = lowering.resolver.len(), root = %root.kind(), "compiled rule");
        Proposition::try_from(root)
    }
}

struct Lowering {
    resolver: FieldResolver,
}

impl Lowering {
    fn expr(&mut self, expr: &Expr) -> Result<Operator, RuleError> {
        match expr {
            Expr::Or(items) => self.logical(OperatorKind::Or, items),
            Expr::Xor(items) => self.logical(OperatorKind::Xor, items),
            Expr::And(items) => self.logical(OperatorKind::And, items),
            Expr::Not(inner) => Ok(not(self.expr(inner)?)),
            Expr::Compare(op, lhs, rhs) => {
                let kind = match op {
                    CompareOp::Eq => OperatorKind::EqualTo,
                    CompareOp::NotEq => OperatorKind::NotEqualTo,
                    CompareOp::Lt => OperatorKind::LessThan,
                    CompareOp::LtEq => OperatorKind::LessThanOrEqualTo,
                    CompareOp::Gt => OperatorKind::GreaterThan,
                    CompareOp::GtEq => OperatorKind::GreaterThanOrEqualTo,
                };
                Ok(Operator::binary(kind, self.scalar(lhs)?, self.scalar(rhs)?))
            }
            Expr::Between {
                negated,
                scalar,
                low,
                high,
            } => {
                let operands = vec![self.scalar(scalar)?, self.scalar(low)?, self.scalar(high)?];
                Ok(negate_if(*negated, Operator::new(OperatorKind::Between, operands)))
            }
            Expr::InList {
                negated,
                scalar,
                values,
            } => {
                let kind = if *negated {
                    OperatorKind::NotIn
                } else {
                    OperatorKind::In
                };
                Ok(Operator::binary(
                    kind,
                    self.scalar(scalar)?,
                    Operand::literal(Value::List(values.clone())),
                ))
            }
            Expr::IsNull { negated, scalar } => Ok(negate_if(
                *negated,
                Operator::unary(OperatorKind::IsNull, self.scalar(scalar)?),
            )),
            Expr::Like {
                negated,
                insensitive,
                scalar,
                pattern,
            } => {
                let subject = self.scalar(scalar)?;
                Ok(like(subject, pattern, *negated, *insensitive))
            }
            Expr::Regexp {
                negated,
                scalar,
                pattern,
            } => {
                let kind = if *negated {
                    OperatorKind::DoesNotMatch
                } else {
                    OperatorKind::Matches
                };
                Ok(Operator::binary(
                    kind,
                    self.scalar(scalar)?,
                    Operand::literal(pattern.as_str()),
                ))
            }
        }
    }

    fn logical(&mut self, kind: OperatorKind, items: &[Expr]) -> Result<Operator, RuleError> {
        let operands = items
            .iter()
            .map(|item| self.expr(item).map(Operand::from))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Operator::new(kind, operands))
    }

    fn scalar(&mut self, scalar: &Scalar) -> Result<Operand, RuleError> {
        match scalar {
            Scalar::Field(path) => self.resolver.resolve(path),
            Scalar::Literal(value) => Ok(Operand::literal(value.clone())),
            Scalar::Neg(inner) => {
                let operand = self.scalar(inner)?;
                let folded = match operand.as_literal() {
                    Some(Value::Int(n)) => n.checked_neg().map(Value::Int),
                    Some(Value::Float(f)) => Some(Value::Float(-f)),
                    _ => None,
                };
                Ok(match folded {
                    Some(value) => Operand::literal(value),
                    None => Operator::unary(OperatorKind::Negate, operand).into(),
                })
            }
            Scalar::Arith(op, lhs, rhs) => {
                let kind = match op {
                    ArithOp::Add => OperatorKind::Add,
                    ArithOp::Sub => OperatorKind::Subtract,
                    ArithOp::Mul => OperatorKind::Multiply,
                    ArithOp::Div => OperatorKind::Divide,
                    ArithOp::Mod => OperatorKind::Modulo,
                };
                let left = self.scalar(lhs)?;
                let right = self.scalar(rhs)?;
                // `a + b + c` folds into one variadic node.
                if let Some(inner) = left.as_operator()
                    && inner.kind() == kind
                    && matches!(kind, OperatorKind::Add | OperatorKind::Multiply)
                {
                    let mut folded = inner.clone();
                    folded.add_operand(right);
                    return Ok(folded.into());
                }
                Ok(Operator::binary(kind, left, right).into())
            }
            Scalar::Call { name, args } => {
                let kind = match name.to_ascii_uppercase().as_str() {
                    "LENGTH" | "CHAR_LENGTH" => OperatorKind::StringLength,
                    "FLOOR" => OperatorKind::Floor,
                    "CEIL" | "CEILING" => OperatorKind::Ceil,
                    "POWER" | "POW" => OperatorKind::Exponentiate,
                    _ => {
                        return Err(RuleError::UnsupportedConstruct(format!(
                            "unknown function '{name}'"
                        )));
                    }
                };
                kind.check_arity(args.len())?;
                let operands = args
                    .iter()
                    .map(|arg| self.scalar(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Operator::new(kind, operands).into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// LIKE patterns
// ---------------------------------------------------------------------------

#[derive(Debug, PartialEq)]
enum LikePart {
    Text(String),
    /// `%`
    Any,
    /// `_`
    One,
}

/// Split a `LIKE` pattern into text runs and wildcards. `\%`, `\_` and
/// `\\` stand for the literal character.
fn like_parts(pattern: &str) -> Vec<LikePart> {
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => text.push(chars.next().unwrap_or('\\')),
            '%' | '_' => {
                if !text.is_empty() {
                    parts.push(LikePart::Text(std::mem::take(&mut text)));
                }
                parts.push(if c == '%' { LikePart::Any } else { LikePart::One });
            }
            c => text.push(c),
        }
    }
    if !text.is_empty() {
        parts.push(LikePart::Text(text));
    }
    parts
}

fn like(subject: Operand, pattern: &str, negated: bool, insensitive: bool) -> Operator {
    use LikePart::{Any, Text};

    let pick = |sensitive: OperatorKind, insensitive_kind: OperatorKind| {
        if insensitive { insensitive_kind } else { sensitive }
    };

    let parts = like_parts(pattern);
    let op = match parts.as_slice() {
        [Text(s)] if !insensitive => {
            let kind = if negated {
                OperatorKind::NotEqualTo
            } else {
                OperatorKind::EqualTo
            };
            return Operator::binary(kind, subject, Operand::literal(s.as_str()));
        }
        [Text(s), Any] => Operator::binary(
            pick(OperatorKind::StartsWith, OperatorKind::StartsWithInsensitive),
            subject,
            Operand::literal(s.as_str()),
        ),
        [Any, Text(s)] => Operator::binary(
            pick(OperatorKind::EndsWith, OperatorKind::EndsWithInsensitive),
            subject,
            Operand::literal(s.as_str()),
        ),
        [Any, Text(s), Any] => {
            let kind = match (negated, insensitive) {
                (false, false) => OperatorKind::Contains,
                (false, true) => OperatorKind::ContainsInsensitive,
                (true, false) => OperatorKind::DoesNotContain,
                (true, true) => OperatorKind::DoesNotContainInsensitive,
            };
            return Operator::binary(kind, subject, Operand::literal(s.as_str()));
        }
        _ => {
            let kind = if negated {
                OperatorKind::DoesNotMatch
            } else {
                OperatorKind::Matches
            };
            return Operator::binary(kind, subject, Operand::literal(like_regex(&parts, insensitive)));
        }
    };
    negate_if(negated, op)
}

fn like_regex(parts: &[LikePart], insensitive: bool) -> String {
    let mut regex = String::from(if insensitive { "(?i)^" } else { "^" });
    for part in parts {
        match part {
            LikePart::Text(s) => regex.push_str(&regex::escape(s)),
            LikePart::Any => regex.push_str(".*"),
            LikePart::One => regex.push('.'),
        }
    }
    regex.push('$');
    regex
}

fn not(op: Operator) -> Operator {
    Operator::unary(OperatorKind::Not, op)
}

fn negate_if(negated: bool, op: Operator) -> Operator {
    if negated { not(op) } else { op }
}
