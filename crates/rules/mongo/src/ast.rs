use serde_json::Value as Json;

/// A parsed Mongo-style query document with flattened field paths.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The entries of one document, implicitly conjoined.
    Object(Vec<Filter>),
    /// `{$and: [...]}`
    And(Vec<Filter>),
    /// `{$or: [...]}`
    Or(Vec<Filter>),
    /// `{$nor: [...]}`
    Nor(Vec<Filter>),
    /// `{$not: {...}}`, at document or field level.
    Not(Box<Filter>),
    /// `{field: value}`
    Equals { field: String, value: Json },
    /// `{field: {$op: value}}`; `op` keeps its `$`.
    Condition {
        field: String,
        op: String,
        value: Json,
    },
    /// `{field: {$regex: pattern, $options: flags}}`
    Regex {
        field: String,
        pattern: Json,
        options: Option<Json>,
    },
    /// A top-level `$` key with no query form, such as `$where`.
    Unknown { op: String, value: Json },
}
