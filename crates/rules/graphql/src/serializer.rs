use serde_json::{Map, Value as Json};
use tracing::debug;

use verity_rules::document::{FieldCondition, json_literal, merge_conditions};
use verity_rules::{Operand, Operator, OperatorKind, Proposition, RuleError, Serializer, Value};

use crate::parser::LOGICAL_KEYS;

/// Renders IR trees as compact GraphQL filter JSON.
///
/// A conjunction of single-field conditions is written as one object,
/// merging operator maps on the same field. Anything else falls back to
/// `AND`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphqlSerializer;

impl GraphqlSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for GraphqlSerializer {
    fn serialize(&self, condition: &Proposition) -> Result<String, RuleError> {
        let text = Json::Object(render(condition.operator())?.into_document()).to_string();
        debug!(grammar = "graphql", len = text.len(), "serialized rule");
        Ok(text)
    }
}

enum Rendered {
    /// A condition on one field, mergeable into an enclosing object.
    Field(FieldCondition),
    /// A whole filter object.
    Document(Map<String, Json>),
}

impl Rendered {
    fn into_document(self) -> Map<String, Json> {
        match self {
            Self::Field(condition) => condition.into_document(),
            Self::Document(document) => document,
        }
    }
}

fn keyed(key: &str, value: Json) -> Rendered {
    Rendered::Document(keyed_map(key, value))
}

fn render(op: &Operator) -> Result<Rendered, RuleError> {
    let operands = op.operands()?;
    match op.kind() {
        OperatorKind::And => {
            let parts = operands
                .iter()
                .map(|operand| render(nested(operand)?))
                .collect::<Result<Vec<_>, _>>()?;
            if parts.iter().all(|part| matches!(part, Rendered::Field(_))) {
                let fields = parts
                    .into_iter()
                    .filter_map(|part| match part {
                        Rendered::Field(condition) => Some(condition),
                        Rendered::Document(_) => None,
                    })
                    .collect::<Vec<_>>();
                if let Some(merged) = merge_conditions(fields.clone(), "eq") {
                    return Ok(Rendered::Document(merged));
                }
                return Ok(keyed("AND", documents(fields.into_iter().map(Rendered::Field))));
            }
            Ok(keyed("AND", documents(parts.into_iter())))
        }
        OperatorKind::Or => Ok(keyed("OR", list(operands)?)),
        OperatorKind::Nand => Ok(keyed("NOT", Json::Object(keyed_map("AND", list(operands)?)))),
        OperatorKind::Nor => Ok(keyed("NOT", Json::Object(keyed_map("OR", list(operands)?)))),
        OperatorKind::Not => not(nested(&operands[0])?),
        kind @ (OperatorKind::Xor
        | OperatorKind::SameAs
        | OperatorKind::NotSameAs
        | OperatorKind::StringLength
        | OperatorKind::Add
        | OperatorKind::Subtract
        | OperatorKind::Multiply
        | OperatorKind::Divide
        | OperatorKind::Modulo
        | OperatorKind::Exponentiate
        | OperatorKind::Negate
        | OperatorKind::Floor
        | OperatorKind::Ceil) => Err(unsupported(kind)),
        kind => predicate(kind, operands).map(Rendered::Field),
    }
}

fn unsupported(kind: OperatorKind) -> RuleError {
    RuleError::UnsupportedOperator(format!("{kind} has no GraphQL filter form"))
}

fn keyed_map(key: &str, value: Json) -> Map<String, Json> {
    let mut document = Map::new();
    document.insert(key.to_owned(), value);
    document
}

fn list(operands: &[Operand]) -> Result<Json, RuleError> {
    let parts = operands
        .iter()
        .map(|operand| render(nested(operand)?))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(documents(parts.into_iter()))
}

fn documents(parts: impl Iterator<Item = Rendered>) -> Json {
    Json::Array(parts.map(|part| Json::Object(part.into_document())).collect())
}

fn nested(operand: &Operand) -> Result<&Operator, RuleError> {
    operand.as_operator().ok_or_else(|| {
        RuleError::StructuralMismatch(format!("expected a condition, found '{operand}'"))
    })
}

fn is_null_literal(operand: &Operand) -> bool {
    operand.as_literal().is_some_and(Value::is_null)
}

fn not(inner: &Operator) -> Result<Rendered, RuleError> {
    let operands = inner.operands()?;
    match inner.kind() {
        OperatorKind::IsNull => {
            return Ok(Rendered::Field(FieldCondition::op(
                field(&operands[0])?,
                "exists",
                Json::Bool(true),
            )));
        }
        OperatorKind::EqualTo if is_null_literal(&operands[1]) => {
            return Ok(Rendered::Field(FieldCondition::op(
                field(&operands[0])?,
                "exists",
                Json::Bool(true),
            )));
        }
        OperatorKind::IsEmpty => {
            return Ok(Rendered::Field(FieldCondition::op(
                field(&operands[0])?,
                "isEmpty",
                Json::Bool(false),
            )));
        }
        _ => {}
    }
    Ok(match render(inner)? {
        Rendered::Field(condition) => Rendered::Field(FieldCondition::op(
            condition.field,
            "not",
            Json::Object(condition.body.into_ops("eq")),
        )),
        Rendered::Document(document) => keyed("NOT", Json::Object(document)),
    })
}

fn predicate(kind: OperatorKind, operands: &[Operand]) -> Result<FieldCondition, RuleError> {
    let name = field(&operands[0])?;
    let op = |key: &str| -> Result<FieldCondition, RuleError> {
        Ok(FieldCondition::op(name.clone(), key, value(&operands[1])?))
    };
    let flag = |key: &str, set: bool| Ok(FieldCondition::op(name.clone(), key, Json::Bool(set)));
    let type_is = |type_name: &str| {
        Ok(FieldCondition::op(
            name.clone(),
            "type",
            Json::String(type_name.to_owned()),
        ))
    };

    match kind {
        OperatorKind::EqualTo if is_null_literal(&operands[1]) => flag("isNull", true),
        OperatorKind::NotEqualTo if is_null_literal(&operands[1]) => flag("exists", true),
        OperatorKind::EqualTo => {
            let literal = value(&operands[1])?;
            // A bare object would read back as a nested field path.
            if literal.is_object() {
                op("eq")
            } else {
                Ok(FieldCondition::value(name.clone(), literal))
            }
        }
        OperatorKind::NotEqualTo => op("ne"),
        OperatorKind::GreaterThan => op("gt"),
        OperatorKind::GreaterThanOrEqualTo => op("gte"),
        OperatorKind::LessThan => op("lt"),
        OperatorKind::LessThanOrEqualTo => op("lte"),
        OperatorKind::In | OperatorKind::NotIn => {
            let Some(Value::List(_)) = operands[1].as_literal() else {
                return Err(RuleError::StructuralMismatch(format!(
                    "{kind} needs a literal list, found '{}'",
                    operands[1]
                )));
            };
            op(if kind == OperatorKind::In { "in" } else { "nin" })
        }
        OperatorKind::Between | OperatorKind::IsBetweenDates => {
            let key = if kind == OperatorKind::Between {
                "between"
            } else {
                "betweenDates"
            };
            Ok(FieldCondition::op(
                name.clone(),
                key,
                Json::Array(vec![value(&operands[1])?, value(&operands[2])?]),
            ))
        }
        OperatorKind::Contains => op("contains"),
        OperatorKind::DoesNotContain => op("notContains"),
        OperatorKind::ContainsInsensitive => op("containsInsensitive"),
        OperatorKind::DoesNotContainInsensitive => op("notContainsInsensitive"),
        OperatorKind::StartsWith => op("startsWith"),
        OperatorKind::StartsWithInsensitive => op("startsWithInsensitive"),
        OperatorKind::EndsWith => op("endsWith"),
        OperatorKind::EndsWithInsensitive => op("endsWithInsensitive"),
        OperatorKind::Matches => op("matches"),
        OperatorKind::DoesNotMatch => op("notMatches"),
        OperatorKind::IsNull => flag("isNull", true),
        OperatorKind::IsEmpty => flag("isEmpty", true),
        OperatorKind::IsString => type_is("string"),
        OperatorKind::IsNumeric => type_is("number"),
        OperatorKind::IsBoolean => type_is("boolean"),
        OperatorKind::IsArray => type_is("array"),
        OperatorKind::After => op("after"),
        OperatorKind::Before => op("before"),
        other => Err(unsupported(other)),
    }
}

/// The subject of a condition, which must be a field that cannot be
/// mistaken for a logical key.
fn field(operand: &Operand) -> Result<String, RuleError> {
    let Some(path) = operand.field_path() else {
        return Err(RuleError::StructuralMismatch(format!(
            "expected a field on the left, found '{operand}'"
        )));
    };
    if LOGICAL_KEYS.contains(&path.as_str()) {
        return Err(RuleError::StructuralMismatch(format!(
            "field '{path}' collides with a logical key"
        )));
    }
    Ok(path)
}

fn value(operand: &Operand) -> Result<Json, RuleError> {
    match operand.as_literal() {
        Some(literal) => json_literal(literal),
        None => Err(RuleError::StructuralMismatch(format!(
            "values must be literals, found '{operand}'"
        ))),
    }
}
