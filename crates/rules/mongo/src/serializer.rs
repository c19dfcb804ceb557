use serde_json::{Map, Value as Json};
use tracing::debug;

use verity_rules::document::{FieldBody, FieldCondition, json_literal, merge_conditions};
use verity_rules::{Operand, Operator, OperatorKind, Proposition, RuleError, Serializer, Value};

/// Renders IR trees as compact Mongo query JSON.
///
/// String predicates become `$regex` conditions, dates become
/// `{"$date": ...}` literals, and conjunctions of single-field conditions
/// are merged into one document where no operator collides.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoSerializer;

impl MongoSerializer {
    pub fn new() -> Self {
        Self
    }
}

impl Serializer for MongoSerializer {
    fn serialize(&self, condition: &Proposition) -> Result<String, RuleError> {
        let text = Json::Object(render(condition.operator())?.into_document()).to_string();
        debug!(grammar = "mongo", len = text.len(), "serialized rule");
        Ok(text)
    }
}

enum Rendered {
    Field(FieldCondition),
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

fn keyed(key: &str, value: Json) -> Map<String, Json> {
    let mut document = Map::new();
    document.insert(key.to_owned(), value);
    document
}

fn render(op: &Operator) -> Result<Rendered, RuleError> {
    let operands = op.operands()?;
    match op.kind() {
        OperatorKind::And => {
            let parts = parts(operands)?;
            let fields = parts
                .iter()
                .map(|part| match part {
                    Rendered::Field(condition) => Some(condition.clone()),
                    Rendered::Document(_) => None,
                })
                .collect::<Option<Vec<_>>>();
            if let Some(merged) = fields.and_then(|fields| merge_conditions(fields, "$eq")) {
                return Ok(Rendered::Document(merged));
            }
            Ok(Rendered::Document(keyed("$and", documents(parts))))
        }
        OperatorKind::Or => Ok(Rendered::Document(keyed("$or", documents(parts(operands)?)))),
        OperatorKind::Nor => Ok(Rendered::Document(keyed("$nor", documents(parts(operands)?)))),
        OperatorKind::Nand => Ok(Rendered::Document(keyed(
            "$not",
            Json::Object(keyed("$and", documents(parts(operands)?))),
        ))),
        OperatorKind::Not => not(nested(&operands[0])?),
        kind @ (OperatorKind::Xor
        | OperatorKind::SameAs
        | OperatorKind::NotSameAs
        | OperatorKind::StringLength
        | OperatorKind::IsEmpty
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
    RuleError::UnsupportedOperator(format!("{kind} has no Mongo query form"))
}

fn parts(operands: &[Operand]) -> Result<Vec<Rendered>, RuleError> {
    operands
        .iter()
        .map(|operand| render(nested(operand)?))
        .collect()
}

fn documents(parts: Vec<Rendered>) -> Json {
    Json::Array(
        parts
            .into_iter()
            .map(|part| Json::Object(part.into_document()))
            .collect(),
    )
}

fn nested(operand: &Operand) -> Result<&Operator, RuleError> {
    operand.as_operator().ok_or_else(|| {
        RuleError::StructuralMismatch(format!("expected a condition, found '{operand}'"))
    })
}

fn is_null_literal(operand: &Operand) -> bool {
    operand.as_literal().is_some_and(Value::is_null)
}

fn exists(operand: &Operand) -> Result<Rendered, RuleError> {
    Ok(Rendered::Field(FieldCondition::op(
        field(operand)?,
        "$exists",
        Json::Bool(true),
    )))
}

fn not(inner: &Operator) -> Result<Rendered, RuleError> {
    let operands = inner.operands()?;
    match inner.kind() {
        OperatorKind::IsNull => return exists(&operands[0]),
        OperatorKind::EqualTo if is_null_literal(&operands[1]) => return exists(&operands[0]),
        _ => {}
    }
    Ok(match render(inner)? {
        Rendered::Field(condition) => Rendered::Field(FieldCondition::op(
            condition.field,
            "$not",
            Json::Object(condition.body.into_ops("$eq")),
        )),
        Rendered::Document(document) => Rendered::Document(keyed("$not", Json::Object(document))),
    })
}

fn predicate(kind: OperatorKind, operands: &[Operand]) -> Result<FieldCondition, RuleError> {
    let name = field(&operands[0])?;
    let op = |key: &str| -> Result<FieldCondition, RuleError> {
        Ok(FieldCondition::op(name.clone(), key, value(&operands[1])?))
    };
    let regex_op = |pattern: String, options: &str| -> FieldCondition {
        let mut ops = Map::new();
        ops.insert("$regex".to_owned(), Json::String(pattern));
        if !options.is_empty() {
            ops.insert("$options".to_owned(), Json::String(options.to_owned()));
        }
        FieldCondition {
            field: name.clone(),
            body: FieldBody::Ops(ops),
        }
    };
    let escaped = || text(&operands[1]).map(|needle| regex::escape(&needle));
    let type_is = |type_name: &str| {
        Ok(FieldCondition::op(
            name.clone(),
            "$type",
            Json::String(type_name.to_owned()),
        ))
    };

    match kind {
        OperatorKind::IsNull => Ok(FieldCondition::value(name.clone(), Json::Null)),
        OperatorKind::EqualTo if is_null_literal(&operands[1]) => {
            Ok(FieldCondition::value(name.clone(), Json::Null))
        }
        OperatorKind::NotEqualTo if is_null_literal(&operands[1]) => {
            Ok(FieldCondition::op(name.clone(), "$exists", Json::Bool(true)))
        }
        OperatorKind::EqualTo => {
            let literal = value(&operands[1])?;
            // Plain objects would read back as nested field paths.
            if literal.as_object().is_some_and(|entries| !is_date(entries)) {
                op("$eq")
            } else {
                Ok(FieldCondition::value(name.clone(), literal))
            }
        }
        OperatorKind::NotEqualTo => op("$ne"),
        OperatorKind::GreaterThan | OperatorKind::After => op("$gt"),
        OperatorKind::GreaterThanOrEqualTo => op("$gte"),
        OperatorKind::LessThan | OperatorKind::Before => op("$lt"),
        OperatorKind::LessThanOrEqualTo => op("$lte"),
        OperatorKind::In | OperatorKind::NotIn => {
            let Some(Value::List(_)) = operands[1].as_literal() else {
                return Err(RuleError::StructuralMismatch(format!(
                    "{kind} needs a literal list, found '{}'",
                    operands[1]
                )));
            };
            op(if kind == OperatorKind::In { "$in" } else { "$nin" })
        }
        OperatorKind::Between | OperatorKind::IsBetweenDates => {
            let mut ops = Map::new();
            ops.insert("$gte".to_owned(), value(&operands[1])?);
            ops.insert("$lte".to_owned(), value(&operands[2])?);
            Ok(FieldCondition {
                field: name.clone(),
                body: FieldBody::Ops(ops),
            })
        }
        OperatorKind::StartsWith => Ok(regex_op(format!("^{}", escaped()?), "")),
        OperatorKind::StartsWithInsensitive => Ok(regex_op(format!("^{}", escaped()?), "i")),
        OperatorKind::EndsWith => Ok(regex_op(format!("{}$", escaped()?), "")),
        OperatorKind::EndsWithInsensitive => Ok(regex_op(format!("{}$", escaped()?), "i")),
        OperatorKind::Contains => Ok(regex_op(escaped()?, "")),
        OperatorKind::ContainsInsensitive => Ok(regex_op(escaped()?, "i")),
        OperatorKind::DoesNotContain | OperatorKind::DoesNotContainInsensitive => {
            let options = if kind == OperatorKind::DoesNotContain { "" } else { "i" };
            let inner = regex_op(escaped()?, options);
            Ok(FieldCondition::op(
                name.clone(),
                "$not",
                Json::Object(inner.body.into_ops("$eq")),
            ))
        }
        OperatorKind::Matches | OperatorKind::DoesNotMatch => {
            let pattern = text(&operands[1])?;
            let (options, pattern) = split_flags(&pattern);
            let condition = regex_op(pattern.to_owned(), options);
            if kind == OperatorKind::Matches {
                Ok(condition)
            } else {
                Ok(FieldCondition::op(
                    name.clone(),
                    "$not",
                    Json::Object(condition.body.into_ops("$eq")),
                ))
            }
        }
        OperatorKind::IsString => type_is("string"),
        OperatorKind::IsNumeric => type_is("number"),
        OperatorKind::IsBoolean => type_is("bool"),
        OperatorKind::IsArray => type_is("array"),
        other => Err(unsupported(other)),
    }
}

/// Splits a leading `(?flags)` group into `$options`.
fn split_flags(pattern: &str) -> (&str, &str) {
    if let Some(rest) = pattern.strip_prefix("(?")
        && let Some(end) = rest.find(')')
        && end > 0
        && rest[..end].chars().all(|c| "imsx".contains(c))
    {
        return (&rest[..end], &rest[end + 1..]);
    }
    ("", pattern)
}

fn is_date(entries: &Map<String, Json>) -> bool {
    entries.len() == 1 && entries.contains_key("$date")
}

fn field(operand: &Operand) -> Result<String, RuleError> {
    let Some(path) = operand.field_path() else {
        return Err(RuleError::StructuralMismatch(format!(
            "expected a field on the left, found '{operand}'"
        )));
    };
    if path.starts_with('$') {
        return Err(RuleError::StructuralMismatch(format!(
            "field '{path}' would read as an operator"
        )));
    }
    Ok(path)
}

fn text(operand: &Operand) -> Result<String, RuleError> {
    match operand.as_literal() {
        Some(Value::String(text)) => Ok(text.clone()),
        _ => Err(RuleError::StructuralMismatch(format!(
            "expected a string literal, found '{operand}'"
        ))),
    }
}

fn value(operand: &Operand) -> Result<Json, RuleError> {
    match operand.as_literal() {
        Some(literal) => mongo_literal(literal),
        None => Err(RuleError::StructuralMismatch(format!(
            "values must be literals, found '{operand}'"
        ))),
    }
}

fn mongo_literal(literal: &Value) -> Result<Json, RuleError> {
    match literal {
        Value::DateTime(at) => Ok(Json::Object(keyed("$date", Json::String(at.to_rfc3339())))),
        Value::List(items) => items
            .iter()
            .map(mongo_literal)
            .collect::<Result<Vec<_>, _>>()
            .map(Json::Array),
        other => json_literal(other),
    }
}
