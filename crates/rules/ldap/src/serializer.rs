use std::fmt::Write as _;

use tracing::debug;

use verity_rules::text::format_float;
use verity_rules::{Operand, Operator, OperatorKind, Proposition, RuleError, Serializer, Value};

use crate::compiler::assertion_value;

/// Renders IR trees as LDAP filters.
///
/// Every conjunction is written as an explicit `(&...)`. Strings that
/// would read back as numbers or booleans get their first character
/// hex-escaped.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapSerializer;

impl LdapSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for LdapSerializer {
    fn serialize(&self, condition: &Proposition) -> Result<String, RuleError> {
        let text = filter(condition.operator())?;
        debug!(grammar = "ldap", len = text.len(), "serialized rule");
        Ok(text)
    }
}

fn filter(op: &Operator) -> Result<String, RuleError> {
    let operands = op.operands()?;
    match op.kind() {
        OperatorKind::And => Ok(format!("(&{})", list(operands)?)),
        OperatorKind::Or => Ok(format!("(|{})", list(operands)?)),
        OperatorKind::Nand => Ok(format!("(!(&{}))", list(operands)?)),
        OperatorKind::Nor => Ok(format!("(!(|{}))", list(operands)?)),
        OperatorKind::Not => {
            let inner = nested(&operands[0])?;
            let inner_operands = inner.operands()?;
            match inner.kind() {
                OperatorKind::IsNull => present(&inner_operands[0]),
                OperatorKind::EqualTo if is_null_literal(&inner_operands[1]) => {
                    present(&inner_operands[0])
                }
                _ => Ok(format!("(!{})", filter(inner)?)),
            }
        }
        OperatorKind::IsNull => Ok(format!("(!{})", present(&operands[0])?)),
        OperatorKind::EqualTo if is_null_literal(&operands[1]) => {
            Ok(format!("(!{})", present(&operands[0])?))
        }
        OperatorKind::NotEqualTo if is_null_literal(&operands[1]) => present(&operands[0]),
        OperatorKind::EqualTo => item(operands, "="),
        OperatorKind::NotEqualTo => Ok(format!("(!{})", item(operands, "=")?)),
        OperatorKind::GreaterThan => item(operands, ">"),
        OperatorKind::GreaterThanOrEqualTo => item(operands, ">="),
        OperatorKind::LessThan => item(operands, "<"),
        OperatorKind::LessThanOrEqualTo => item(operands, "<="),
        OperatorKind::Between => {
            let name = attribute(&operands[0])?;
            Ok(format!(
                "(&({name}>={})({name}<={}))",
                value(&operands[1])?,
                value(&operands[2])?
            ))
        }
        kind @ (OperatorKind::In | OperatorKind::NotIn) => {
            let name = attribute(&operands[0])?;
            let Some(Value::List(items)) = operands[1].as_literal() else {
                return Err(RuleError::StructuralMismatch(format!(
                    "{kind} needs a literal list, found '{}'",
                    operands[1]
                )));
            };
            if items.is_empty() {
                return Err(RuleError::StructuralMismatch(format!(
                    "{kind} needs at least one value"
                )));
            }
            let mut text = String::from("(|");
            for item in items {
                let _ = write!(text, "({name}={})", literal(item)?);
            }
            text.push(')');
            Ok(if kind == OperatorKind::In {
                text
            } else {
                format!("(!{text})")
            })
        }
        OperatorKind::StartsWith => substring(operands, |v| format!("{v}*")),
        OperatorKind::EndsWith => substring(operands, |v| format!("*{v}")),
        OperatorKind::Contains => substring(operands, |v| format!("*{v}*")),
        OperatorKind::DoesNotContain => {
            Ok(format!("(!{})", substring(operands, |v| format!("*{v}*"))?))
        }
        OperatorKind::Matches => pattern(operands),
        OperatorKind::DoesNotMatch => Ok(format!("(!{})", pattern(operands)?)),
        other => Err(RuleError::UnsupportedOperator(format!(
            "{other} has no LDAP filter form"
        ))),
    }
}

fn list(operands: &[Operand]) -> Result<String, RuleError> {
    operands
        .iter()
        .map(|operand| filter(nested(operand)?))
        .collect()
}

fn nested(operand: &Operand) -> Result<&Operator, RuleError> {
    operand.as_operator().ok_or_else(|| {
        RuleError::StructuralMismatch(format!("expected a filter, found '{operand}'"))
    })
}

fn is_null_literal(operand: &Operand) -> bool {
    operand.as_literal().is_some_and(Value::is_null)
}

fn present(subject: &Operand) -> Result<String, RuleError> {
    Ok(format!("({}=*)", attribute(subject)?))
}

fn item(operands: &[Operand], symbol: &str) -> Result<String, RuleError> {
    Ok(format!(
        "({}{symbol}{})",
        attribute(&operands[0])?,
        value(&operands[1])?
    ))
}

fn substring(operands: &[Operand], shape: impl Fn(&str) -> String) -> Result<String, RuleError> {
    let Some(text) = operands[1].as_literal().and_then(Value::as_str) else {
        return Err(RuleError::StructuralMismatch(format!(
            "substring filters need a literal string, found '{}'",
            operands[1]
        )));
    };
    if text.is_empty() {
        return Err(RuleError::StructuralMismatch(
            "substring filters need a non-empty string".to_owned(),
        ));
    }
    Ok(format!(
        "({}={})",
        attribute(&operands[0])?,
        shape(&escape(text))
    ))
}

/// Write an anchored regex of the form `^a.*b.*c$` back as `a*b*c`.
fn pattern(operands: &[Operand]) -> Result<String, RuleError> {
    let Some(regex) = operands[1].as_literal().and_then(Value::as_str) else {
        return Err(RuleError::StructuralMismatch(format!(
            "pattern needs a literal string, found '{}'",
            operands[1]
        )));
    };
    let segments = regex
        .strip_prefix('^')
        .and_then(|r| r.strip_suffix('$'))
        .and_then(wildcard_segments)
        .filter(|segments| segments.len() >= 2)
        .ok_or_else(|| {
            RuleError::UnsupportedOperator(format!(
                "regex '{regex}' has no LDAP substring form"
            ))
        })?;
    let value = segments
        .iter()
        .map(|segment| escape(segment))
        .collect::<Vec<_>>()
        .join("*");
    Ok(format!("({}={value})", attribute(&operands[0])?))
}

/// Split a regex body on `.*`, unescaping literal text between the
/// wildcards. `None` if any other regex syntax occurs.
fn wildcard_segments(body: &str) -> Option<Vec<String>> {
    let mut segments = vec![String::new()];
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                let escaped = chars.next()?;
                if !escaped.is_ascii_punctuation() {
                    return None;
                }
                segments.last_mut()?.push(escaped);
            }
            '.' if chars.peek() == Some(&'*') => {
                chars.next();
                segments.push(String::new());
            }
            '.' | '+' | '*' | '?' | '(' | ')' | '|' | '[' | ']' | '{' | '}' | '^' | '$' => {
                return None;
            }
            c => segments.last_mut()?.push(c),
        }
    }
    Some(segments)
}

fn attribute(operand: &Operand) -> Result<String, RuleError> {
    let Some(path) = operand.field_path() else {
        return Err(RuleError::StructuralMismatch(format!(
            "expected an attribute, found '{operand}'"
        )));
    };
    let valid = path.starts_with(|c: char| c.is_alphabetic() || c == '_')
        && path
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if !valid {
        return Err(RuleError::StructuralMismatch(format!(
            "'{path}' is not a valid attribute name"
        )));
    }
    Ok(path)
}

fn value(operand: &Operand) -> Result<String, RuleError> {
    match operand.as_literal() {
        Some(v) => literal(v),
        None => Err(RuleError::StructuralMismatch(format!(
            "assertion values must be literals, found '{operand}'"
        ))),
    }
}

fn literal(value: &Value) -> Result<String, RuleError> {
    match value {
        Value::Bool(true) => Ok("TRUE".to_owned()),
        Value::Bool(false) => Ok("FALSE".to_owned()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(f) if f.is_finite() => Ok(format_float(*f)),
        Value::String(s) if s.is_empty() => Err(RuleError::StructuralMismatch(
            "empty strings have no LDAP form".to_owned(),
        )),
        Value::String(s) => {
            let escaped = escape(s);
            if matches!(assertion_value(s, false), Value::String(_)) {
                return Ok(escaped);
            }
            // Escape the first character so the value stays a string.
            let mut chars = escaped.chars();
            let first = chars.next().map(hex_escape).unwrap_or_default();
            Ok(format!("{first}{}", chars.as_str()))
        }
        other => Err(RuleError::StructuralMismatch(format!(
            "{} values have no LDAP form",
            other.type_name()
        ))),
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '*' | '(' | ')' | '\\' | '\0') {
            out.push_str(&hex_escape(c));
        } else {
            out.push(c);
        }
    }
    out
}

fn hex_escape(c: char) -> String {
    let mut buf = [0; 4];
    c.encode_utf8(&mut buf)
        .bytes()
        .fold(String::new(), |mut out, b| {
            let _ = write!(out, "\\{b:02x}");
            out
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::LdapCompiler;
    use crate::parser::LdapParser;
    use verity_rules::{Compiler, FieldResolver, Parser};

    fn round_trip(input: &str) -> String {
        let ast = LdapParser::new().parse(input).unwrap();
        let rule = LdapCompiler.compile(&ast).unwrap();
        LdapSerializer.serialize(&rule).unwrap()
    }

    fn field(path: &str) -> Operand {
        FieldResolver::new().resolve(path).unwrap()
    }

    #[test]
    fn canonical_forms_round_trip() {
        for input in [
            "(&(age>=18)(country=US))",
            "(|(a=1)(b<=2.5))",
            "(!(&(a=1)(b=2)))",
            "(!(|(a=1)(b=2)))",
            "(!(a=1))",
            "(!(a>=1))",
            "(mail=*)",
            "(!(mail=*))",
            "(cn=Ada*)",
            "(cn=*lace)",
            "(cn=*Love*)",
            "(!(cn=*Love*))",
            "(cn=Ad*ce)",
            "(cn=A*Love*e)",
            r"(cn=a\2ab\28c\29)",
            r"(zip=\3012)",
            "(active=TRUE)",
            "(&(score>5)(score<8))",
            "(user.name=Ada Lovelace)",
        ] {
            assert_eq!(round_trip(input), input);
        }
    }

    #[test]
    fn implicit_conjunction_becomes_explicit() {
        assert_eq!(round_trip("(a=1)(b=2)"), "(&(a=1)(b=2))");
        assert_eq!(round_trip("a=1"), "(a=1)");
    }

    #[test]
    fn sets_and_ranges() {
        let rule = Proposition::try_from(Operator::new(
            OperatorKind::And,
            vec![
                Operator::binary(
                    OperatorKind::In,
                    field("country"),
                    Operand::literal(Value::List(vec!["US".into(), "CA".into()])),
                )
                .into(),
                Operator::new(
                    OperatorKind::Between,
                    vec![field("age"), Operand::literal(18), Operand::literal(65)],
                )
                .into(),
                Operator::unary(OperatorKind::IsNull, field("deleted")).into(),
            ],
        ))
        .unwrap();
        assert_eq!(
            LdapSerializer.serialize(&rule).unwrap(),
            "(&(|(country=US)(country=CA))(&(age>=18)(age<=65))(!(deleted=*)))"
        );
    }

    #[test]
    fn unsupported_shapes() {
        let xor = Proposition::try_from(Operator::new(
            OperatorKind::Xor,
            vec![
                Operator::binary(OperatorKind::EqualTo, field("a"), Operand::literal(1)).into(),
                Operator::binary(OperatorKind::EqualTo, field("b"), Operand::literal(2)).into(),
            ],
        ))
        .unwrap();
        assert!(matches!(
            LdapSerializer.serialize(&xor),
            Err(RuleError::UnsupportedOperator(_))
        ));

        let regex = Proposition::try_from(Operator::binary(
            OperatorKind::Matches,
            field("a"),
            Operand::literal(r"^\d+$"),
        ))
        .unwrap();
        assert!(matches!(
            LdapSerializer.serialize(&regex),
            Err(RuleError::UnsupportedOperator(_))
        ));

        let field_to_field = Proposition::try_from(Operator::binary(
            OperatorKind::GreaterThan,
            field("spent"),
            field("budget"),
        ))
        .unwrap();
        assert!(matches!(
            LdapSerializer.serialize(&field_to_field),
            Err(RuleError::StructuralMismatch(_))
        ));

        let literal_subject = Proposition::try_from(Operator::binary(
            OperatorKind::EqualTo,
            Operand::literal(1),
            field("a"),
        ))
        .unwrap();
        assert!(matches!(
            LdapSerializer.serialize(&literal_subject),
            Err(RuleError::StructuralMismatch(_))
        ));
    }

    #[test]
    fn special_characters_are_escaped() {
        let rule = Proposition::try_from(Operator::binary(
            OperatorKind::Contains,
            field("path"),
            Operand::literal(r"a\b*"),
        ))
        .unwrap();
        assert_eq!(LdapSerializer.serialize(&rule).unwrap(), r"(path=*a\5cb\2a*)");
    }
}
