use serde_json::{Map, Value as Json};

use verity_rules::document::{self, join_path};
use verity_rules::{ParseLimits, Parser, RuleError};

use crate::ast::Filter;

/// Parser for Mongo-style query documents.
///
/// Any `$`-prefixed key marks an object as an operator map; other nested
/// objects are deeper field paths.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoParser {
    limits: ParseLimits,
}

impl MongoParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ParseLimits) -> Self {
        Self { limits }
    }

    /// Parse an already decoded query document.
    pub fn parse_value(&self, document: &Json) -> Result<Filter, RuleError> {
        document::check_depth(document, &self.limits, "")?;
        match document {
            Json::Object(entries) => query(entries, None),
            _ => Err(malformed("expected a query document".to_owned())),
        }
    }
}

impl Parser for MongoParser {
    type Ast = Filter;

    fn parse(&self, input: &str) -> Result<Filter, RuleError> {
        let document = document::decode(input, &self.limits)?;
        self.parse_value(&document)
    }
}

fn malformed(message: String) -> RuleError {
    RuleError::syntax(message, "", None)
}

fn is_operator_map(entries: &Map<String, Json>) -> bool {
    entries.keys().any(|key| key.starts_with('$'))
}

/// `{"$date": "..."}` is a literal, not an operator map.
pub(crate) fn is_date_literal(entries: &Map<String, Json>) -> bool {
    entries.len() == 1 && entries.get("$date").is_some_and(Json::is_string)
}

fn single_or_object(mut items: Vec<Filter>) -> Filter {
    if items.len() == 1 {
        items.remove(0)
    } else {
        Filter::Object(items)
    }
}

fn query(entries: &Map<String, Json>, prefix: Option<&str>) -> Result<Filter, RuleError> {
    if entries.is_empty() {
        return Err(malformed("empty query document".to_owned()));
    }
    let items = entries
        .iter()
        .map(|(key, value)| match key.as_str() {
            "$and" => Ok(Filter::And(query_list(key, value, prefix)?)),
            "$or" => Ok(Filter::Or(query_list(key, value, prefix)?)),
            "$nor" => Ok(Filter::Nor(query_list(key, value, prefix)?)),
            "$not" => match value {
                Json::Object(inner) => Ok(Filter::Not(Box::new(query(inner, prefix)?))),
                _ => Err(malformed("$not expects a document".to_owned())),
            },
            other if other.starts_with('$') => Ok(Filter::Unknown {
                op: other.to_owned(),
                value: value.clone(),
            }),
            _ => field(&join_path(prefix, key), value),
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(single_or_object(items))
}

fn query_list(key: &str, value: &Json, prefix: Option<&str>) -> Result<Vec<Filter>, RuleError> {
    let Json::Array(items) = value else {
        return Err(malformed(format!("{key} expects an array")));
    };
    if items.is_empty() {
        return Err(malformed(format!("{key} expects at least one document")));
    }
    items
        .iter()
        .map(|item| match item {
            Json::Object(entries) => query(entries, prefix),
            _ => Err(malformed(format!("{key} items must be documents"))),
        })
        .collect()
}

fn field(path: &str, value: &Json) -> Result<Filter, RuleError> {
    match value {
        Json::Object(entries) if is_date_literal(entries) => Ok(Filter::Equals {
            field: path.to_owned(),
            value: value.clone(),
        }),
        Json::Object(entries) if is_operator_map(entries) => operator_map(path, entries),
        Json::Object(entries) => query(entries, Some(path)),
        other => Ok(Filter::Equals {
            field: path.to_owned(),
            value: other.clone(),
        }),
    }
}

fn operator_map(path: &str, entries: &Map<String, Json>) -> Result<Filter, RuleError> {
    let options = entries.get("$options");
    if options.is_some() && !entries.contains_key("$regex") {
        return Err(malformed(format!("$options on '{path}' needs $regex")));
    }
    let mut items = Vec::with_capacity(entries.len());
    for (op, value) in entries {
        match op.as_str() {
            "$options" => {}
            "$regex" => items.push(Filter::Regex {
                field: path.to_owned(),
                pattern: value.clone(),
                options: options.cloned(),
            }),
            "$not" => match value {
                Json::Object(inner) if is_operator_map(inner) && !is_date_literal(inner) => {
                    items.push(Filter::Not(Box::new(operator_map(path, inner)?)));
                }
                _ => {
                    return Err(malformed(format!(
                        "$not on '{path}' expects an operator document"
                    )));
                }
            },
            _ => items.push(Filter::Condition {
                field: path.to_owned(),
                op: op.clone(),
                value: value.clone(),
            }),
        }
    }
    Ok(single_or_object(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(input: &str) -> Filter {
        MongoParser::new().parse(input).unwrap()
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
            parse(r#"{age: {$gte: 18}, country: "US"}"#),
            Filter::Object(vec![
                condition("age", "$gte", json!(18)),
                equals("country", json!("US")),
            ])
        );
    }

    #[test]
    fn logical_operators() {
        assert_eq!(
            parse(r#"{"$nor": [{"a": 1}, {"$or": [{"b": 2}, {"c": {"$lt": 3}}]}]}"#),
            Filter::Nor(vec![
                equals("a", json!(1)),
                Filter::Or(vec![equals("b", json!(2)), condition("c", "$lt", json!(3))]),
            ])
        );
        assert_eq!(
            parse(r#"{"a": {"$not": {"$gt": 5}}}"#),
            Filter::Not(Box::new(condition("a", "$gt", json!(5))))
        );
    }

    #[test]
    fn regex_with_options() {
        assert_eq!(
            parse(r#"{"name": {"$regex": "^ada", "$options": "i"}}"#),
            Filter::Regex {
                field: "name".into(),
                pattern: json!("^ada"),
                options: Some(json!("i")),
            }
        );
    }

    #[test]
    fn paths_and_dates() {
        assert_eq!(
            parse(r#"{"user": {"age": {"$gte": 18}}, "user.plan": "pro"}"#),
            Filter::Object(vec![
                condition("user.age", "$gte", json!(18)),
                equals("user.plan", json!("pro")),
            ])
        );
        assert_eq!(
            parse(r#"{"at": {"$date": "2024-01-01T00:00:00Z"}}"#),
            equals("at", json!({"$date": "2024-01-01T00:00:00Z"}))
        );
    }

    #[test]
    fn unknown_top_level_operators_are_kept() {
        assert_eq!(
            parse(r#"{"$where": "this.a > 1", "b": 2}"#),
            Filter::Object(vec![
                Filter::Unknown {
                    op: "$where".into(),
                    value: json!("this.a > 1"),
                },
                equals("b", json!(2)),
            ])
        );
    }

    #[test]
    fn structural_errors() {
        let parser = MongoParser::new();
        for input in [
            "{}",
            r#"{"$and": {"a": 1}}"#,
            r#"{"$or": []}"#,
            r#"{"a": {"$options": "i"}}"#,
            r#"{"a": {"$not": 5}}"#,
            r#""a""#,
        ] {
            assert!(
                matches!(parser.parse(input), Err(RuleError::Syntax { .. })),
                "{input}"
            );
        }
        assert!(matches!(
            parser.parse(r#"{"a": {"$gt": 1}"#),
            Err(RuleError::JsonDecode(_))
        ));
    }
}
