use serde_json::{Map, Value as Json};

use verity_rules::document::{self, join_path};
use verity_rules::{ParseLimits, Parser, RuleError};

use crate::ast::Filter;

/// Keys that combine whole filters.
pub(crate) const LOGICAL_KEYS: &[&str] = &["AND", "OR", "NOT"];

/// Keys that mark an object as an operator map rather than a deeper
/// field path.
pub(crate) const OPERATOR_KEYS: &[&str] = &[
    "eq",
    "ne",
    "gt",
    "gte",
    "lt",
    "lte",
    "in",
    "nin",
    "between",
    "contains",
    "notContains",
    "containsInsensitive",
    "notContainsInsensitive",
    "startsWith",
    "startsWithInsensitive",
    "endsWith",
    "endsWithInsensitive",
    "matches",
    "notMatches",
    "isNull",
    "exists",
    "isEmpty",
    "type",
    "after",
    "before",
    "betweenDates",
    "not",
];

/// Parser for GraphQL-style filter objects.
///
/// Accepts strict JSON or relaxed object notation with bare keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphqlParser {
    limits: ParseLimits,
}

impl GraphqlParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ParseLimits) -> Self {
        Self { limits }
    }

    /// Parse an already decoded filter document.
    pub fn parse_value(&self, document: &Json) -> Result<Filter, RuleError> {
        document::check_depth(document, &self.limits, "")?;
        match document {
            Json::Object(entries) => filter(entries, None),
            other => Err(malformed(format!(
                "expected a filter object, found {}",
                kind_of(other)
            ))),
        }
    }
}

impl Parser for GraphqlParser {
    type Ast = Filter;

    fn parse(&self, input: &str) -> Result<Filter, RuleError> {
        let document = document::decode(input, &self.limits)?;
        self.parse_value(&document)
    }
}

fn malformed(message: String) -> RuleError {
    RuleError::syntax(message, "", None)
}

fn kind_of(value: &Json) -> &'static str {
    match value {
        Json::Null => "null",
        Json::Bool(_) => "a boolean",
        Json::Number(_) => "a number",
        Json::String(_) => "a string",
        Json::Array(_) => "an array",
        Json::Object(_) => "an object",
    }
}

fn is_operator_map(entries: &Map<String, Json>) -> bool {
    entries.keys().any(|key| OPERATOR_KEYS.contains(&key.as_str()))
}

/// One filter object. Keys below `prefix` are fields of that path.
fn filter(entries: &Map<String, Json>, prefix: Option<&str>) -> Result<Filter, RuleError> {
    if entries.is_empty() {
        return Err(malformed(match prefix {
            Some(path) => format!("empty filter object at '{path}'"),
            None => "empty filter object".to_owned(),
        }));
    }
    let mut items = entries
        .iter()
        .map(|(key, value)| match key.as_str() {
            "AND" => Ok(Filter::And(filter_list(key, value, prefix)?)),
            "OR" => Ok(Filter::Or(filter_list(key, value, prefix)?)),
            "NOT" => match value {
                Json::Object(inner) => Ok(Filter::Not(Box::new(filter(inner, prefix)?))),
                other => Err(malformed(format!(
                    "NOT expects an object, found {}",
                    kind_of(other)
                ))),
            },
            _ => field(&join_path(prefix, key), value),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if items.len() == 1 {
        items.remove(0)
    } else {
        Filter::Object(items)
    })
}

fn filter_list(key: &str, value: &Json, prefix: Option<&str>) -> Result<Vec<Filter>, RuleError> {
    let Json::Array(items) = value else {
        return Err(malformed(format!(
            "{key} expects an array, found {}",
            kind_of(value)
        )));
    };
    if items.is_empty() {
        return Err(malformed(format!("{key} expects at least one filter")));
    }
    items
        .iter()
        .map(|item| match item {
            Json::Object(entries) => filter(entries, prefix),
            other => Err(malformed(format!(
                "{key} items must be objects, found {}",
                kind_of(other)
            ))),
        })
        .collect()
}

fn field(path: &str, value: &Json) -> Result<Filter, RuleError> {
    match value {
        Json::Object(entries) if is_operator_map(entries) => operator_map(path, entries),
        Json::Object(entries) => filter(entries, Some(path)),
        other => Ok(Filter::Equals {
            field: path.to_owned(),
            value: other.clone(),
        }),
    }
}

fn operator_map(path: &str, entries: &Map<String, Json>) -> Result<Filter, RuleError> {
    let mut items = entries
        .iter()
        .map(|(op, value)| match (op.as_str(), value) {
            ("not", Json::Object(inner)) if is_operator_map(inner) => {
                Ok(Filter::Not(Box::new(operator_map(path, inner)?)))
            }
            ("not", Json::Object(_)) => Err(malformed(format!(
                "'not' on '{path}' expects an operator map"
            ))),
            ("not", other) => Ok(Filter::Not(Box::new(Filter::Equals {
                field: path.to_owned(),
                value: other.clone(),
            }))),
            (op, value) => Ok(Filter::Condition {
                field: path.to_owned(),
                op: op.to_owned(),
                value: value.clone(),
            }),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(if items.len() == 1 {
        items.remove(0)
    } else {
        Filter::Object(items)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(input: &str) -> Filter {
        GraphqlParser::new().parse(input).unwrap()
    }

    fn condition(field: &str, op: &str, value: Json) -> Filter {
        Filter::Condition {
            field: field.into(),
            op: op.into(),
            value,
        }
    }

    fn equals(field: &str, value: Json) -> Filter {
        Filter::Equals {
            field: field.into(),
            value,
        }
    }

    #[test]
    fn implicit_conjunction() {
        assert_eq!(
            parse(r#"{age: {gte: 18}, country: "US"}"#),
            Filter::Object(vec![
                condition("age", "gte", json!(18)),
                equals("country", json!("US")),
            ])
        );
    }

    #[test]
    fn explicit_logic() {
        assert_eq!(
            parse(r#"{"OR": [{"a": 1}, {"NOT": {"b": {"lt": 2}}}]}"#),
            Filter::Or(vec![
                equals("a", json!(1)),
                Filter::Not(Box::new(condition("b", "lt", json!(2)))),
            ])
        );
    }

    #[test]
    fn nested_paths_flatten() {
        assert_eq!(
            parse(r#"{"user": {"profile": {"age": {"gte": 18}}, "name": "Ada"}}"#),
            Filter::Object(vec![
                condition("user.profile.age", "gte", json!(18)),
                equals("user.name", json!("Ada")),
            ])
        );
        assert_eq!(
            parse(r#"{"user": {"OR": [{"age": 1}, {"age": 2}]}}"#),
            Filter::Or(vec![equals("user.age", json!(1)), equals("user.age", json!(2))])
        );
        assert_eq!(
            parse(r#"{"user.age": {"gte": 18}}"#),
            condition("user.age", "gte", json!(18))
        );
    }

    #[test]
    fn operator_maps() {
        assert_eq!(
            parse(r#"{"age": {"gte": 18, "lt": 65}}"#),
            Filter::Object(vec![
                condition("age", "gte", json!(18)),
                condition("age", "lt", json!(65)),
            ])
        );
        assert_eq!(
            parse(r#"{"age": {"not": {"gt": 5}}}"#),
            Filter::Not(Box::new(condition("age", "gt", json!(5))))
        );
        assert_eq!(
            parse(r#"{"age": {"not": 5}}"#),
            Filter::Not(Box::new(equals("age", json!(5))))
        );
        // Any operator key marks the map, so unknown names reach the compiler.
        assert_eq!(
            parse(r#"{"age": {"gte": 1, "almost": 2}}"#),
            Filter::Object(vec![
                condition("age", "gte", json!(1)),
                condition("age", "almost", json!(2)),
            ])
        );
    }

    #[test]
    fn structural_errors() {
        let parser = GraphqlParser::new();
        for input in [
            "{}",
            r#"{"AND": {"a": 1}}"#,
            r#"{"OR": []}"#,
            r#"{"OR": [1]}"#,
            r#"{"NOT": [1]}"#,
            r#"{"a": {}}"#,
            "[1, 2]",
        ] {
            assert!(
                matches!(parser.parse(input), Err(RuleError::Syntax { .. })),
                "{input}"
            );
        }
        assert!(matches!(
            parser.parse(r#"{"a": 1,}"#),
            Err(RuleError::JsonDecode(_))
        ));
    }

    #[test]
    fn decoded_values_are_accepted() {
        let filter = GraphqlParser::new()
            .parse_value(&json!({"age": {"gte": 18}}))
            .unwrap();
        assert_eq!(filter, condition("age", "gte", json!(18)));
    }

    #[test]
    fn depth_limit() {
        let parser = GraphqlParser::with_limits(ParseLimits {
            max_depth: 3,
            ..ParseLimits::default()
        });
        assert!(parser.parse(r#"{"a": {"b": {"gt": 1}}}"#).is_ok());
        assert!(parser.parse(r#"{"a": {"b": {"c": {"gt": 1}}}}"#).is_err());
    }
}
