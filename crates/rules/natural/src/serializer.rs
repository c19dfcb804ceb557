use tracing::debug;

use verity_rules::text::{format_float, quote};
use verity_rules::{Operand, Operator, OperatorKind, Proposition, RuleError, Serializer, Value};

/// Renders IR trees as natural-language rule text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalSerializer;

impl NaturalSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for NaturalSerializer {
    fn serialize(&self, condition: &Proposition) -> Result<String, RuleError> {
        let text = render(condition.operator())?;
        debug!(grammar = "natural", len = text.len(), "serialized rule");
        Ok(text)
    }
}

/// Words the lexer would read as something other than a field name.
const RESERVED: &[&str] = &["and", "or", "not", "true", "false", "null"];

fn render(op: &Operator) -> Result<String, RuleError> {
    let operands = op.operands()?;
    match op.kind() {
        OperatorKind::And => join(operands, " and ", |kind| {
            matches!(kind, OperatorKind::And | OperatorKind::Or)
        }),
        OperatorKind::Or => join(operands, " or ", |kind| kind == OperatorKind::Or),
        OperatorKind::Not => render_not(&operands[0]),
        kind => condition(kind, operands),
    }
}

fn join(
    operands: &[Operand],
    separator: &str,
    needs_group: impl Fn(OperatorKind) -> bool,
) -> Result<String, RuleError> {
    let parts = operands
        .iter()
        .map(|operand| {
            let child = nested(operand)?;
            let text = render(child)?;
            Ok(if needs_group(child.kind()) {
                format!("({text})")
            } else {
                text
            })
        })
        .collect::<Result<Vec<_>, RuleError>>()?;
    Ok(parts.join(separator))
}

fn nested(operand: &Operand) -> Result<&Operator, RuleError> {
    operand.as_operator().ok_or_else(|| {
        RuleError::StructuralMismatch(format!("expected a condition, found '{operand}'"))
    })
}

fn render_not(operand: &Operand) -> Result<String, RuleError> {
    let inner = nested(operand)?;
    let operands = inner.operands()?;
    let idiom = match inner.kind() {
        OperatorKind::EqualTo if operands[1].as_literal().is_some_and(Value::is_null) => {
            Some(format!("{} exists", subject(&operands[0])?))
        }
        OperatorKind::Between => Some(format!(
            "{} is not between {} and {}",
            subject(&operands[0])?,
            term(&operands[1])?,
            term(&operands[2])?
        )),
        OperatorKind::IsBetweenDates => Some(format!(
            "{} is not between dates {} and {}",
            subject(&operands[0])?,
            term(&operands[1])?,
            term(&operands[2])?
        )),
        OperatorKind::StartsWith | OperatorKind::StartsWithInsensitive => {
            Some(text_phrase(operands, "does not start with", inner.kind() == OperatorKind::StartsWithInsensitive)?)
        }
        OperatorKind::EndsWith | OperatorKind::EndsWithInsensitive => {
            Some(text_phrase(operands, "does not end with", inner.kind() == OperatorKind::EndsWithInsensitive)?)
        }
        OperatorKind::IsNull => Some(format!("{} is not null", subject(&operands[0])?)),
        OperatorKind::IsEmpty => Some(format!("{} is not empty", subject(&operands[0])?)),
        kind @ (OperatorKind::IsString
        | OperatorKind::IsNumeric
        | OperatorKind::IsBoolean
        | OperatorKind::IsArray) => Some(format!(
            "{} is not {}",
            subject(&operands[0])?,
            type_phrase(kind)
        )),
        _ => None,
    };
    if let Some(text) = idiom {
        return Ok(text);
    }

    let text = render(inner)?;
    Ok(match inner.kind() {
        OperatorKind::And | OperatorKind::Or | OperatorKind::Not => format!("not ({text})"),
        _ => format!("not {text}"),
    })
}

fn condition(kind: OperatorKind, operands: &[Operand]) -> Result<String, RuleError> {
    let binary = |phrase: &str| -> Result<String, RuleError> {
        Ok(format!("{} {phrase} {}", subject(&operands[0])?, term(&operands[1])?))
    };

    match kind {
        OperatorKind::EqualTo if operands[1].as_literal().is_some_and(Value::is_null) => {
            Ok(format!("{} does not exist", subject(&operands[0])?))
        }
        OperatorKind::EqualTo => binary("equals"),
        OperatorKind::NotEqualTo => binary("does not equal"),
        OperatorKind::GreaterThan => binary("is greater than"),
        OperatorKind::GreaterThanOrEqualTo => binary("is greater than or equal to"),
        OperatorKind::LessThan => binary("is less than"),
        OperatorKind::LessThanOrEqualTo => binary("is less than or equal to"),
        OperatorKind::SameAs => binary("is identical to"),
        OperatorKind::NotSameAs => binary("is not identical to"),
        OperatorKind::Between => Ok(format!(
            "{} is between {} and {}",
            subject(&operands[0])?,
            term(&operands[1])?,
            term(&operands[2])?
        )),
        OperatorKind::IsBetweenDates => Ok(format!(
            "{} is between dates {} and {}",
            subject(&operands[0])?,
            term(&operands[1])?,
            term(&operands[2])?
        )),
        OperatorKind::In => one_of(operands, "is one of"),
        OperatorKind::NotIn => one_of(operands, "is not one of"),
        OperatorKind::Contains => text_phrase(operands, "contains", false),
        OperatorKind::ContainsInsensitive => text_phrase(operands, "contains", true),
        OperatorKind::DoesNotContain => text_phrase(operands, "does not contain", false),
        OperatorKind::DoesNotContainInsensitive => text_phrase(operands, "does not contain", true),
        OperatorKind::StartsWith => text_phrase(operands, "starts with", false),
        OperatorKind::StartsWithInsensitive => text_phrase(operands, "starts with", true),
        OperatorKind::EndsWith => text_phrase(operands, "ends with", false),
        OperatorKind::EndsWithInsensitive => text_phrase(operands, "ends with", true),
        OperatorKind::Matches => regex_phrase(operands, "matches"),
        OperatorKind::DoesNotMatch => regex_phrase(operands, "does not match"),
        OperatorKind::IsNull => Ok(format!("{} is null", subject(&operands[0])?)),
        OperatorKind::IsEmpty => Ok(format!("{} is empty", subject(&operands[0])?)),
        OperatorKind::IsString
        | OperatorKind::IsNumeric
        | OperatorKind::IsBoolean
        | OperatorKind::IsArray => Ok(format!("{} is {}", subject(&operands[0])?, type_phrase(kind))),
        OperatorKind::After => binary("is after"),
        OperatorKind::Before => binary("is before"),
        other => Err(RuleError::UnsupportedOperator(format!(
            "{other} has no natural-language form"
        ))),
    }
}

fn type_phrase(kind: OperatorKind) -> &'static str {
    match kind {
        OperatorKind::IsString => "a string",
        OperatorKind::IsNumeric => "a number",
        OperatorKind::IsBoolean => "a boolean",
        _ => "a list",
    }
}

fn text_phrase(operands: &[Operand], phrase: &str, ignore_case: bool) -> Result<String, RuleError> {
    let suffix = if ignore_case { " ignoring case" } else { "" };
    Ok(format!(
        "{} {phrase} {}{suffix}",
        subject(&operands[0])?,
        term(&operands[1])?
    ))
}

fn regex_phrase(operands: &[Operand], phrase: &str) -> Result<String, RuleError> {
    let pattern = operands[1].as_literal().and_then(Value::as_str);
    match pattern.and_then(|p| p.strip_prefix("(?i)")) {
        Some(rest) => Ok(format!(
            "{} {phrase} {} ignoring case",
            subject(&operands[0])?,
            quote(rest, '"')
        )),
        None => text_phrase(operands, phrase, false),
    }
}

fn one_of(operands: &[Operand], phrase: &str) -> Result<String, RuleError> {
    let Some(Value::List(items)) = operands[1].as_literal() else {
        return Err(RuleError::StructuralMismatch(format!(
            "'{phrase}' needs a literal list, found '{}'",
            operands[1]
        )));
    };
    if items.is_empty() {
        return Err(RuleError::StructuralMismatch(format!(
            "'{phrase}' needs at least one value"
        )));
    }
    let values = items.iter().map(literal).collect::<Result<Vec<_>, _>>()?;
    Ok(format!("{} {phrase} {}", subject(&operands[0])?, values.join(", ")))
}

fn subject(operand: &Operand) -> Result<String, RuleError> {
    if let Some(op) = operand.as_operator() {
        return match op.kind() {
            OperatorKind::StringLength => Ok(format!("length of {}", field(&op.operands()?[0])?)),
            kind => Err(RuleError::UnsupportedOperator(format!(
                "{kind} cannot be the subject of a natural-language condition"
            ))),
        };
    }
    field(operand)
}

fn field(operand: &Operand) -> Result<String, RuleError> {
    let Some(path) = operand.field_path() else {
        return Err(RuleError::StructuralMismatch(format!(
            "expected a field reference, found '{operand}'"
        )));
    };
    let readable = path.starts_with(|c: char| c.is_alphabetic() || c == '_')
        && path.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
        && !RESERVED.iter().any(|w| path.eq_ignore_ascii_case(w));
    if readable {
        Ok(path)
    } else {
        Err(RuleError::StructuralMismatch(format!(
            "field '{path}' cannot be written as a bare word"
        )))
    }
}

fn term(operand: &Operand) -> Result<String, RuleError> {
    match operand.as_literal() {
        Some(value) => literal(value),
        None if operand.as_operator().is_some() => Err(RuleError::UnsupportedOperator(format!(
            "'{operand}' cannot be written as a natural-language value"
        ))),
        None => field(operand),
    }
}

fn literal(value: &Value) -> Result<String, RuleError> {
    match value {
        Value::Null => Ok("null".to_owned()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(f) if f.is_finite() => Ok(format_float(*f)),
        Value::String(s) => Ok(quote(s, '"')),
        Value::DateTime(dt) => Ok(quote(&dt.to_rfc3339(), '"')),
        other => Err(RuleError::StructuralMismatch(format!(
            "{} literal has no natural-language form",
            other.type_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::NaturalCompiler;
    use crate::parser::NaturalParser;
    use verity_rules::{Compiler, FieldResolver, Parser};

    fn round_trip(input: &str) -> String {
        let ast = NaturalParser::new().parse(input).unwrap();
        let ir = NaturalCompiler.compile(&ast).unwrap();
        NaturalSerializer.serialize(&ir).unwrap()
    }

    #[test]
    fn idiom_word_fields_read_back() {
        let mut resolver = FieldResolver::new();
        let rule = Proposition::try_from(Operator::new(
            OperatorKind::And,
            vec![
                Operator::binary(
                    OperatorKind::EqualTo,
                    resolver.resolve("between").unwrap(),
                    Operand::literal(1),
                )
                .into(),
                Operator::binary(
                    OperatorKind::EqualTo,
                    resolver.resolve("y").unwrap(),
                    Operand::literal(2),
                )
                .into(),
            ],
        ))
        .unwrap();

        let text = NaturalSerializer.serialize(&rule).unwrap();
        assert_eq!(text, "between equals 1 and y equals 2");
        let ast = NaturalParser::new().parse(&text).unwrap();
        assert_eq!(NaturalCompiler.compile(&ast).unwrap(), rule);
        assert_eq!(round_trip("age is between either and 5"), "age is between either and 5");
    }

    #[test]
    fn canonical_forms_are_stable() {
        for input in [
            r#"age is greater than or equal to 18 and country equals "US""#,
            "age is between 18 and 65",
            "age is not between 18 and 65",
            r#"country is one of "US", "CA" or age is less than 5"#,
            r#"country is not one of "US", "CA""#,
            r#"name contains "ada" ignoring case"#,
            r#"name does not start with "Bob""#,
            r#"email matches "^[a-z]+@\w+\.com$" ignoring case"#,
            "nickname exists",
            "nickname does not exist",
            "tags is not empty and score is a number",
            "length of name is less than or equal to 10",
            "(a equals 1 or b equals 2) and c equals 3",
            "a equals 1 or b equals 2 and c equals 3",
            "not (a equals 1 or b equals 2)",
            "not a equals 1",
            "x is identical to 1.0",
            r#"joined is between dates "2024-01-01" and "2024-12-31""#,
            "spent is greater than budget",
        ] {
            assert_eq!(round_trip(input), input);
        }
    }

    #[test]
    fn aliases_normalize() {
        assert_eq!(round_trip("age is at least 18"), "age is greater than or equal to 18");
        assert_eq!(round_trip(r#"a is "x", b is not 2"#), r#"a equals "x" and b does not equal 2"#);
        assert_eq!(round_trip("c is either 1 or 2"), "c is one of 1, 2");
        assert_eq!(round_trip("c is neither 1 nor 2"), "c is not one of 1, 2");
    }

    #[test]
    fn unsupported_kinds() {
        let mut resolver = FieldResolver::new();
        let xor = Operator::new(
            OperatorKind::Xor,
            vec![
                Operator::unary(OperatorKind::IsNull, resolver.resolve("a").unwrap()).into(),
                Operator::unary(OperatorKind::IsNull, resolver.resolve("b").unwrap()).into(),
            ],
        );
        let err = NaturalSerializer
            .serialize(&Proposition::try_from(xor).unwrap())
            .unwrap_err();
        assert!(matches!(err, RuleError::UnsupportedOperator(_)));
    }

    #[test]
    fn literal_subject_is_a_mismatch() {
        let op = Operator::binary(OperatorKind::EqualTo, Operand::literal(1), Operand::literal(1));
        let err = NaturalSerializer
            .serialize(&Proposition::try_from(op).unwrap())
            .unwrap_err();
        assert!(matches!(err, RuleError::StructuralMismatch(_)));
    }

    #[test]
    fn wrong_arity_is_reported() {
        let mut resolver = FieldResolver::new();
        let op = Operator::new(OperatorKind::EqualTo, vec![resolver.resolve("a").unwrap()]);
        let err = NaturalSerializer
            .serialize(&Proposition::try_from(op).unwrap())
            .unwrap_err();
        assert!(matches!(err, RuleError::Cardinality { .. }));
    }
}
