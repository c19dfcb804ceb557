use tracing::debug;

use verity_rules::text::format_float;
use verity_rules::{Operand, Operator, OperatorKind, Proposition, RuleError, Serializer, Value};

use crate::parser::KEYWORDS;

/// Renders IR trees as SQL `WHERE` conditions.
///
/// Conjunctions always use explicit `AND`. `Nand` and `Nor` become
/// `NOT (... AND ...)` and `NOT (... OR ...)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlSerializer;

impl SqlSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for SqlSerializer {
    fn serialize(&self, condition: &Proposition) -> Result<String, RuleError> {
        let text = condition_text(condition.operator())?.text;
        debug!(grammar = "sql", len = text.len(), "serialized rule");
        Ok(text)
    }
}

/// Binding strength of a rendered condition, loosest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    Or,
    Xor,
    And,
    Not,
    Predicate,
}

struct Rendered {
    text: String,
    level: Level,
}

impl Rendered {
    fn new(text: String, level: Level) -> Self {
        Self { text, level }
    }

    fn predicate(text: String) -> Self {
        Self::new(text, Level::Predicate)
    }

    /// Wrap in parentheses unless this binds tighter than `parent`.
    fn within(self, parent: Level) -> String {
        if self.level > parent {
            self.text
        } else {
            format!("({})", self.text)
        }
    }
}

fn condition_text(op: &Operator) -> Result<Rendered, RuleError> {
    let operands = op.operands()?;
    let rendered = match op.kind() {
        OperatorKind::Or => Rendered::new(join(operands, Level::Or, " OR ")?, Level::Or),
        OperatorKind::Xor => Rendered::new(join(operands, Level::Xor, " XOR ")?, Level::Xor),
        OperatorKind::And => Rendered::new(join(operands, Level::And, " AND ")?, Level::And),
        OperatorKind::Nand => Rendered::new(
            format!("NOT ({})", join(operands, Level::And, " AND ")?),
            Level::Not,
        ),
        OperatorKind::Nor => Rendered::new(
            format!("NOT ({})", join(operands, Level::Or, " OR ")?),
            Level::Not,
        ),
        OperatorKind::Not => not_text(nested(&operands[0])?)?,
        kind => Rendered::predicate(predicate(kind, operands)?),
    };
    Ok(rendered)
}

fn join(operands: &[Operand], level: Level, separator: &str) -> Result<String, RuleError> {
    let parts = operands
        .iter()
        .map(|operand| Ok(condition_text(nested(operand)?)?.within(level)))
        .collect::<Result<Vec<_>, RuleError>>()?;
    Ok(parts.join(separator))
}

fn nested(operand: &Operand) -> Result<&Operator, RuleError> {
    operand.as_operator().ok_or_else(|| {
        RuleError::StructuralMismatch(format!("expected a condition, found '{operand}'"))
    })
}

fn is_null_literal(operand: &Operand) -> bool {
    operand.as_literal().is_some_and(Value::is_null)
}

fn not_text(inner: &Operator) -> Result<Rendered, RuleError> {
    let operands = inner.operands()?;
    let idiom = match inner.kind() {
        OperatorKind::IsNull => Some(format!("{} IS NOT NULL", subject(&operands[0])?)),
        OperatorKind::EqualTo if is_null_literal(&operands[1]) => {
            Some(format!("{} IS NOT NULL", subject(&operands[0])?))
        }
        OperatorKind::Between => Some(format!(
            "{} NOT BETWEEN {} AND {}",
            subject(&operands[0])?,
            scalar(&operands[1])?.text,
            scalar(&operands[2])?.text
        )),
        OperatorKind::StartsWith
        | OperatorKind::StartsWithInsensitive
        | OperatorKind::EndsWith
        | OperatorKind::EndsWithInsensitive => Some(like(inner.kind(), operands, true)?),
        _ => None,
    };
    if let Some(text) = idiom {
        return Ok(Rendered::predicate(text));
    }
    let text = condition_text(inner)?.within(Level::Not);
    Ok(Rendered::new(format!("NOT {text}"), Level::Not))
}

fn predicate(kind: OperatorKind, operands: &[Operand]) -> Result<String, RuleError> {
    let compare = |symbol: &str| -> Result<String, RuleError> {
        Ok(format!(
            "{} {symbol} {}",
            subject(&operands[0])?,
            scalar(&operands[1])?.text
        ))
    };

    match kind {
        OperatorKind::EqualTo if is_null_literal(&operands[1]) => {
            Ok(format!("{} IS NULL", subject(&operands[0])?))
        }
        OperatorKind::NotEqualTo if is_null_literal(&operands[1]) => {
            Ok(format!("{} IS NOT NULL", subject(&operands[0])?))
        }
        OperatorKind::EqualTo => compare("="),
        OperatorKind::NotEqualTo => compare("!="),
        OperatorKind::GreaterThan => compare(">"),
        OperatorKind::GreaterThanOrEqualTo => compare(">="),
        OperatorKind::LessThan => compare("<"),
        OperatorKind::LessThanOrEqualTo => compare("<="),
        OperatorKind::Between => Ok(format!(
            "{} BETWEEN {} AND {}",
            subject(&operands[0])?,
            scalar(&operands[1])?.text,
            scalar(&operands[2])?.text
        )),
        OperatorKind::In | OperatorKind::NotIn => {
            let Some(Value::List(items)) = operands[1].as_literal() else {
                return Err(RuleError::StructuralMismatch(format!(
                    "IN needs a literal list, found '{}'",
                    operands[1]
                )));
            };
            if items.is_empty() {
                return Err(RuleError::StructuralMismatch(
                    "IN needs at least one value".to_owned(),
                ));
            }
            let values = items.iter().map(literal).collect::<Result<Vec<_>, _>>()?;
            let keyword = if kind == OperatorKind::In { "IN" } else { "NOT IN" };
            Ok(format!("{} {keyword} ({})", subject(&operands[0])?, values.join(", ")))
        }
        OperatorKind::IsNull => Ok(format!("{} IS NULL", subject(&operands[0])?)),
        OperatorKind::Contains
        | OperatorKind::ContainsInsensitive
        | OperatorKind::StartsWith
        | OperatorKind::StartsWithInsensitive
        | OperatorKind::EndsWith
        | OperatorKind::EndsWithInsensitive => like(kind, operands, false),
        OperatorKind::DoesNotContain | OperatorKind::DoesNotContainInsensitive => {
            like(kind, operands, true)
        }
        OperatorKind::Matches => regexp(operands, "REGEXP"),
        OperatorKind::DoesNotMatch => regexp(operands, "NOT REGEXP"),
        other => Err(RuleError::UnsupportedOperator(format!(
            "{other} has no SQL form"
        ))),
    }
}

/// Render a string operator as `LIKE` or `ILIKE` with wildcards.
fn like(kind: OperatorKind, operands: &[Operand], negated: bool) -> Result<String, RuleError> {
    let Some(text) = operands[1].as_literal().and_then(Value::as_str) else {
        return Err(RuleError::StructuralMismatch(format!(
            "LIKE needs a literal string pattern, found '{}'",
            operands[1]
        )));
    };
    let escaped = escape_like(text);
    let (pattern, insensitive) = match kind {
        OperatorKind::StartsWith => (format!("{escaped}%"), false),
        OperatorKind::StartsWithInsensitive => (format!("{escaped}%"), true),
        OperatorKind::EndsWith => (format!("%{escaped}"), false),
        OperatorKind::EndsWithInsensitive => (format!("%{escaped}"), true),
        OperatorKind::ContainsInsensitive | OperatorKind::DoesNotContainInsensitive => {
            (format!("%{escaped}%"), true)
        }
        _ => (format!("%{escaped}%"), false),
    };
    let keyword = match (negated, insensitive) {
        (false, false) => "LIKE",
        (false, true) => "ILIKE",
        (true, false) => "NOT LIKE",
        (true, true) => "NOT ILIKE",
    };
    Ok(format!("{} {keyword} {}", subject(&operands[0])?, quote(&pattern)))
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn regexp(operands: &[Operand], keyword: &str) -> Result<String, RuleError> {
    let Some(pattern) = operands[1].as_literal().and_then(Value::as_str) else {
        return Err(RuleError::StructuralMismatch(format!(
            "{keyword} needs a literal pattern, found '{}'",
            operands[1]
        )));
    };
    Ok(format!("{} {keyword} {}", subject(&operands[0])?, quote(pattern)))
}

// ---------------------------------------------------------------------------
// Operands
// ---------------------------------------------------------------------------

/// Binding strength of a rendered operand expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Prec {
    Additive,
    Multiplicative,
    Unary,
    Primary,
}

struct Term {
    text: String,
    prec: Prec,
}

impl Term {
    fn wrap_below(self, prec: Prec) -> String {
        if self.prec < prec {
            format!("({})", self.text)
        } else {
            self.text
        }
    }
}

/// The left side of a predicate: anything but a bare literal.
fn subject(operand: &Operand) -> Result<String, RuleError> {
    if operand.as_literal().is_some() {
        return Err(RuleError::StructuralMismatch(format!(
            "expected a field or expression on the left, found '{operand}'"
        )));
    }
    Ok(scalar(operand)?.text)
}

fn scalar(operand: &Operand) -> Result<Term, RuleError> {
    if let Some(value) = operand.as_literal() {
        let text = literal(value)?;
        let prec = if text.starts_with('-') {
            Prec::Unary
        } else {
            Prec::Primary
        };
        return Ok(Term { text, prec });
    }
    if let Some(path) = operand.field_path() {
        return Ok(Term {
            text: identifier(&path),
            prec: Prec::Primary,
        });
    }
    let Some(op) = operand.as_operator() else {
        return Err(RuleError::StructuralMismatch(format!(
            "unexpected operand '{operand}'"
        )));
    };

    let operands = op.operands()?;
    let (text, prec) = match op.kind() {
        OperatorKind::Add => (chain(operands, " + ", Prec::Additive)?, Prec::Additive),
        OperatorKind::Multiply => (
            chain(operands, " * ", Prec::Multiplicative)?,
            Prec::Multiplicative,
        ),
        OperatorKind::Subtract => (chain(operands, " - ", Prec::Additive)?, Prec::Additive),
        OperatorKind::Divide => (
            chain(operands, " / ", Prec::Multiplicative)?,
            Prec::Multiplicative,
        ),
        OperatorKind::Modulo => (
            chain(operands, " % ", Prec::Multiplicative)?,
            Prec::Multiplicative,
        ),
        OperatorKind::Negate => {
            let inner = scalar(&operands[0])?;
            let text = if inner.prec < Prec::Unary || inner.text.starts_with('-') {
                format!("-({})", inner.text)
            } else {
                format!("-{}", inner.text)
            };
            (text, Prec::Unary)
        }
        OperatorKind::StringLength => (call("LENGTH", operands)?, Prec::Primary),
        OperatorKind::Floor => (call("FLOOR", operands)?, Prec::Primary),
        OperatorKind::Ceil => (call("CEIL", operands)?, Prec::Primary),
        OperatorKind::Exponentiate => (call("POWER", operands)?, Prec::Primary),
        other => {
            return Err(RuleError::StructuralMismatch(format!(
                "{other} cannot be used as a value"
            )));
        }
    };
    Ok(Term { text, prec })
}

/// Left-associative chain: the first operand may share the level, the
/// rest must bind tighter.
fn chain(operands: &[Operand], separator: &str, prec: Prec) -> Result<String, RuleError> {
    let mut parts = Vec::with_capacity(operands.len());
    for (i, operand) in operands.iter().enumerate() {
        let term = scalar(operand)?;
        let text = if i == 0 || term.prec > prec {
            term.wrap_below(prec)
        } else {
            format!("({})", term.text)
        };
        parts.push(text);
    }
    Ok(parts.join(separator))
}

fn call(name: &str, operands: &[Operand]) -> Result<String, RuleError> {
    let args = operands
        .iter()
        .map(|operand| scalar(operand).map(|t| t.text))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{name}({})", args.join(", ")))
}

fn identifier(path: &str) -> String {
    let bare = path.starts_with(|c: char| c.is_alphabetic() || c == '_')
        && path.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(path));
    if bare {
        path.to_owned()
    } else {
        verity_rules::text::quote(path, '"')
    }
}

fn literal(value: &Value) -> Result<String, RuleError> {
    match value {
        Value::Null => Ok("NULL".to_owned()),
        Value::Bool(true) => Ok("TRUE".to_owned()),
        Value::Bool(false) => Ok("FALSE".to_owned()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(f) if f.is_finite() => Ok(format_float(*f)),
        Value::String(s) => Ok(quote(s)),
        Value::DateTime(dt) => Ok(quote(&dt.to_rfc3339())),
        other => Err(RuleError::StructuralMismatch(format!(
            "{} literal has no SQL form",
            other.type_name()
        ))),
    }
}

/// Single-quote a string, doubling embedded quotes.
fn quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}
