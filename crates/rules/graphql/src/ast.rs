use serde_json::Value as Json;

/// A parsed GraphQL-style filter object.
///
/// Field paths are already flattened: `{user: {age: {gte: 18}}}` yields a
/// condition on `user.age`.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The entries of one object, implicitly conjoined.
    Object(Vec<Filter>),
    /// `{AND: [...]}`
    And(Vec<Filter>),
    /// `{OR: [...]}`
    Or(Vec<Filter>),
    /// `{NOT: {...}}`, or field-level `{field: {not: {...}}}`.
    Not(Box<Filter>),
    /// `{field: value}`
    Equals { field: String, value: Json },
    /// One entry of an operator map: `{field: {op: value}}`.
    Condition {
        field: String,
        op: String,
        value: Json,
    },
}
