//! Decoding and rendering helpers shared by the document-query grammars.

use serde_json::{Map, Value as Json};

use crate::config::ParseLimits;
use crate::engine::value::Value;
use crate::error::RuleError;
use crate::text::char_offset;

/// Decode a document-query input.
///
/// Strict JSON is tried first and its failures are reported as
/// [`RuleError::JsonDecode`]. Input that does not look like JSON (for
/// example `{age: {gte: 18}}` with bare keys) is read as a YAML flow
/// mapping instead, and its failures are syntax errors.
pub fn decode(input: &str, limits: &ParseLimits) -> Result<Json, RuleError> {
    limits.check_len(input)?;
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RuleError::syntax("empty document", input, Some(0)));
    }

    let document = match serde_json::from_str::<Json>(trimmed) {
        Ok(document) => document,
        Err(e) if looks_like_json(trimmed) => return Err(RuleError::JsonDecode(e.to_string())),
        Err(_) => serde_yaml_ng::from_str::<Json>(input).map_err(|e| {
            let position = e
                .location()
                .map(|location| char_offset(input, location.index()));
            RuleError::syntax(e.to_string(), input, position)
        })?,
    };
    check_depth(&document, limits, input)?;
    Ok(document)
}

/// Whether the text is meant as strict JSON: an object whose first key is
/// quoted, or anything that does not start with `{`.
fn looks_like_json(text: &str) -> bool {
    match text.strip_prefix('{') {
        Some(rest) => rest.trim_start().starts_with(['"', '}']),
        None => true,
    }
}

/// Fail when `document` nests deeper than the limit allows.
pub fn check_depth(document: &Json, limits: &ParseLimits, input: &str) -> Result<(), RuleError> {
    let depth = nesting(document);
    if depth > limits.max_depth {
        return Err(RuleError::syntax(
            format!("nesting depth exceeds limit of {}", limits.max_depth),
            input,
            None,
        ));
    }
    Ok(())
}

fn nesting(document: &Json) -> usize {
    match document {
        Json::Array(items) => 1 + items.iter().map(nesting).max().unwrap_or(0),
        Json::Object(entries) => 1 + entries.values().map(nesting).max().unwrap_or(0),
        _ => 0,
    }
}

/// Join a field key onto the path of its enclosing object.
pub fn join_path(prefix: Option<&str>, key: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}.{key}"),
        None => key.to_owned(),
    }
}

/// The JSON form of a literal operand.
pub fn json_literal(value: &Value) -> Result<Json, RuleError> {
    value.to_json().ok_or_else(|| {
        RuleError::StructuralMismatch(format!(
            "{} values have no document form",
            value.type_name()
        ))
    })
}

/// What a field maps to in a rendered document.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldBody {
    /// Shorthand equality: `{"field": value}`.
    Value(Json),
    /// An operator map: `{"field": {"op": value, ...}}`.
    Ops(Map<String, Json>),
}

/// One single-field condition rendered for an object.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldCondition {
    pub field: String,
    pub body: FieldBody,
}

impl FieldCondition {
    /// Shorthand equality.
    pub fn value(field: impl Into<String>, value: Json) -> Self {
        Self {
            field: field.into(),
            body: FieldBody::Value(value),
        }
    }

    /// A single operator entry.
    pub fn op(field: impl Into<String>, op: &str, value: Json) -> Self {
        let mut ops = Map::new();
        ops.insert(op.to_owned(), value);
        Self {
            field: field.into(),
            body: FieldBody::Ops(ops),
        }
    }

    /// `{"field": body}` as a standalone document.
    pub fn into_document(self) -> Map<String, Json> {
        let mut document = Map::new();
        document.insert(self.field, self.body.into_json());
        document
    }
}

impl FieldBody {
    pub fn into_json(self) -> Json {
        match self {
            Self::Value(value) => value,
            Self::Ops(ops) => Json::Object(ops),
        }
    }

    /// The operator-map form, spelling shorthand equality as `eq_key`.
    pub fn into_ops(self, eq_key: &str) -> Map<String, Json> {
        match self {
            Self::Ops(ops) => ops,
            Self::Value(value) => {
                let mut ops = Map::new();
                ops.insert(eq_key.to_owned(), value);
                ops
            }
        }
    }
}

/// Merge conditions into one implicitly conjoined object, combining
/// operator maps on the same field. `eq_key` spells shorthand equality
/// when it has to join an operator map.
///
/// Returns `None` when two conditions collide on the same field and
/// operator, in which case the caller falls back to an explicit
/// conjunction.
pub fn merge_conditions(conditions: Vec<FieldCondition>, eq_key: &str) -> Option<Map<String, Json>> {
    let mut merged: Vec<(String, FieldBody)> = Vec::new();
    for condition in conditions {
        let Some(index) = merged.iter().position(|(field, _)| *field == condition.field) else {
            merged.push((condition.field, condition.body));
            continue;
        };
        let (_, body) = &mut merged[index];
        let mut ops = std::mem::replace(body, FieldBody::Ops(Map::new())).into_ops(eq_key);
        for (op, value) in condition.body.into_ops(eq_key) {
            if ops.contains_key(&op) {
                return None;
            }
            ops.insert(op, value);
        }
        *body = FieldBody::Ops(ops);
    }
    Some(
        merged
            .into_iter()
            .map(|(field, body)| (field, body.into_json()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_and_relaxed_objects() {
        let limits = ParseLimits::default();
        let strict = decode(r#"{"age": {"gte": 18}, "country": "US"}"#, &limits).unwrap();
        let relaxed = decode(r#"{age: {gte: 18}, country: "US"}"#, &limits).unwrap();
        assert_eq!(strict, relaxed);
        assert_eq!(
            serde_json::to_string(&relaxed).unwrap(),
            r#"{"age":{"gte":18},"country":"US"}"#
        );
    }

    #[test]
    fn malformed_json_is_a_decode_error() {
        let limits = ParseLimits::default();
        assert!(matches!(
            decode(r#"{"age": }"#, &limits),
            Err(RuleError::JsonDecode(_))
        ));
        assert!(matches!(
            decode(r#"{age: [1, 2}"#, &limits),
            Err(RuleError::Syntax { .. })
        ));
        assert!(matches!(decode("  ", &limits), Err(RuleError::Syntax { .. })));
    }

    #[test]
    fn depth_limit() {
        let limits = ParseLimits {
            max_depth: 2,
            ..ParseLimits::default()
        };
        assert!(decode(r#"{"a": {"gt": 1}}"#, &limits).is_ok());
        assert!(decode(r#"{"a": {"b": {"gt": 1}}}"#, &limits).is_err());
    }

    #[test]
    fn merging_fields() {
        let merged = merge_conditions(
            vec![
                FieldCondition::op("age", "gte", json!(18)),
                FieldCondition::value("country", json!("US")),
                FieldCondition::op("age", "lt", json!(65)),
            ],
            "eq",
        )
        .unwrap();
        assert_eq!(
            Json::Object(merged),
            json!({"age": {"gte": 18, "lt": 65}, "country": "US"})
        );

        let merged = merge_conditions(
            vec![
                FieldCondition::value("a", json!(1)),
                FieldCondition::op("a", "ne", json!(2)),
            ],
            "eq",
        )
        .unwrap();
        assert_eq!(Json::Object(merged), json!({"a": {"eq": 1, "ne": 2}}));

        assert!(
            merge_conditions(
                vec![
                    FieldCondition::op("a", "gt", json!(1)),
                    FieldCondition::op("a", "gt", json!(2)),
                ],
                "eq",
            )
            .is_none()
        );
    }
}
