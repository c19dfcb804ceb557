use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::engine::context::{Context, FactFn};
use crate::error::RuleError;

/// A runtime object whose members can be reached through a field path.
///
/// Each method returns `None` when the object does not expose a member of
/// that name through that access style, letting property resolution fall
/// through to the next style.
pub trait FactObject: Send + Sync + fmt::Debug {
    /// Invoke a zero-argument member called `name`.
    fn invoke(&self, _name: &str) -> Option<Result<Value, RuleError>> {
        None
    }

    /// Read a public field called `name`.
    fn field(&self, _name: &str) -> Option<Value> {
        None
    }

    /// Look up `key` through indexed or associative access.
    fn index(&self, _key: &str) -> Option<Value> {
        None
    }
}

/// A callable fact handed back as-is from a protected fact definition.
#[derive(Clone)]
pub struct Callable(pub(crate) FactFn);

impl Callable {
    /// Invoke the callable with the given fact store.
    pub fn call(&self, ctx: &Context) -> Result<Value, RuleError> {
        (self.0)(ctx)
    }

    /// Whether two callables are the same closure instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Callable(..)")
    }
}

/// Runtime value produced by resolving operands against a [`Context`].
#[derive(Debug, Clone)]
pub enum Value {
    /// The null value.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list of values.
    List(Vec<Value>),
    /// A string-keyed map of values.
    Map(BTreeMap<String, Value>),
    /// A point in time.
    DateTime(DateTime<Utc>),
    /// An application object with duck-typed member access.
    Object(Arc<dyn FactObject>),
    /// A callable returned un-invoked from a protected fact.
    Callable(Callable),
}

/// The ways a value's members can be reached, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Zero-argument member invocation.
    Invocable,
    /// Public field read.
    FieldAccessible,
    /// Indexed or associative lookup.
    Indexable,
    /// No member access at all.
    Plain,
}

impl Value {
    /// Convert a `serde_json::Value` into a runtime `Value`.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::Null
                }
            }
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(arr) => {
                Self::List(arr.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(obj) => Self::Map(
                obj.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert back into JSON. Objects, callables, and non-finite floats have
    /// no JSON form and yield `None`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(n) => serde_json::Value::from(*n),
            Self::Float(f) => serde_json::Value::Number(serde_json::Number::from_f64(*f)?),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(
                items.iter().map(Self::to_json).collect::<Option<Vec<_>>>()?,
            ),
            Self::Map(m) => serde_json::Value::Object(
                m.iter()
                    .map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect::<Option<serde_json::Map<_, _>>>()?,
            ),
            Self::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Object(_) | Self::Callable(_) => return None,
        })
    }

    /// Returns `true` if this value is considered truthy.
    ///
    /// - `Null` is falsy.
    /// - `Bool` is its own truthiness.
    /// - `Int(0)` and `Float(0.0)` are falsy.
    /// - Empty strings, lists, and maps are falsy.
    /// - Dates, objects, and callables are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::List(v) => !v.is_empty(),
            Self::Map(m) => !m.is_empty(),
            Self::DateTime(_) | Self::Object(_) | Self::Callable(_) => true,
        }
    }

    /// Returns a string representation of the value type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::DateTime(_) => "datetime",
            Self::Object(_) => "object",
            Self::Callable(_) => "callable",
        }
    }

    /// Whether this value is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The access styles this value supports, in the order they are tried.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Self::Object(_) => &[
                Capability::Invocable,
                Capability::FieldAccessible,
                Capability::Indexable,
            ],
            Self::Map(_) | Self::List(_) => &[Capability::Indexable],
            _ => &[Capability::Plain],
        }
    }

    /// Resolve the member `name` by trying each capability in priority order.
    ///
    /// Returns `Ok(None)` when no access style produced a value, so callers
    /// can tell "absent" apart from a member that is present but null.
    pub fn property(&self, name: &str) -> Result<Option<Self>, RuleError> {
        for capability in self.capabilities() {
            let found = match (capability, self) {
                (Capability::Invocable, Self::Object(obj)) => obj.invoke(name).transpose()?,
                (Capability::FieldAccessible, Self::Object(obj)) => obj.field(name),
                (Capability::Indexable, Self::Object(obj)) => obj.index(name),
                (Capability::Indexable, Self::Map(m)) => m.get(name).cloned(),
                (Capability::Indexable, Self::List(items)) => {
                    name.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
                }
                _ => None,
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// Value-level equality with int/float coercion.
    #[allow(clippy::cast_precision_loss)]
    pub fn equal_to(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => (a - b).abs() < f64::EPSILON,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => {
                (*a as f64 - b).abs() < f64::EPSILON
            }
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equal_to(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.equal_to(other)))
            }
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::DateTime(a), Self::String(s)) | (Self::String(s), Self::DateTime(a)) => {
                parse_date(s).is_ok_and(|d| d == *a)
            }
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Identity-level equality: same type and same value, with no coercion.
    /// Objects and callables must be the same instance.
    pub fn same_as(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (Self::Map(a), Self::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|other| v.same_as(other)))
            }
            (Self::DateTime(a), Self::DateTime(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => Arc::ptr_eq(a, b),
            (Self::Callable(a), Self::Callable(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Ordered comparison. `Ok(None)` when either side is null.
    #[allow(clippy::cast_precision_loss)]
    pub fn compare(&self, other: &Self) -> Result<Option<Ordering>, RuleError> {
        let ordering = match (self, other) {
            (Self::Null, _) | (_, Self::Null) => return Ok(None),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Self::Int(a), Self::Float(b)) => {
                (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (Self::Float(a), Self::Int(b)) => {
                a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal)
            }
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::DateTime(_), _) | (_, Self::DateTime(_)) => {
                self.as_datetime()?.cmp(&other.as_datetime()?)
            }
            _ => {
                return Err(RuleError::TypeError(format!(
                    "cannot compare {} and {}",
                    self.type_name(),
                    other.type_name()
                )));
            }
        };
        Ok(Some(ordering))
    }

    /// `self > other`.
    pub fn greater_than(&self, other: &Self) -> Result<bool, RuleError> {
        Ok(self.compare(other)? == Some(Ordering::Greater))
    }

    /// `self >= other`.
    pub fn greater_than_or_equal_to(&self, other: &Self) -> Result<bool, RuleError> {
        Ok(matches!(
            self.compare(other)?,
            Some(Ordering::Greater | Ordering::Equal)
        ))
    }

    /// `self < other`.
    pub fn less_than(&self, other: &Self) -> Result<bool, RuleError> {
        Ok(self.compare(other)? == Some(Ordering::Less))
    }

    /// `self <= other`.
    pub fn less_than_or_equal_to(&self, other: &Self) -> Result<bool, RuleError> {
        Ok(matches!(
            self.compare(other)?,
            Some(Ordering::Less | Ordering::Equal)
        ))
    }

    /// Membership test: whether `needle` occurs in this list, map key set,
    /// or string.
    pub fn contains_value(&self, needle: &Self) -> Result<bool, RuleError> {
        match (self, needle) {
            (Self::List(items), _) => Ok(items.iter().any(|item| item.equal_to(needle))),
            (Self::Map(m), Self::String(key)) => Ok(m.contains_key(key)),
            (Self::String(haystack), Self::String(sub)) => Ok(haystack.contains(sub.as_str())),
            (Self::Null, _) => Ok(false),
            _ => Err(RuleError::TypeError(format!(
                "cannot check {} membership in {}",
                needle.type_name(),
                self.type_name()
            ))),
        }
    }

    /// Borrow the string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Interpret the value as a timestamp.
    ///
    /// Accepts native dates, RFC 3339 strings, `YYYY-MM-DD` and
    /// `YYYY-MM-DD HH:MM:SS` strings (UTC), and integer Unix seconds.
    pub fn as_datetime(&self) -> Result<DateTime<Utc>, RuleError> {
        match self {
            Self::DateTime(dt) => Ok(*dt),
            Self::String(s) => parse_date(s),
            Self::Int(secs) => Utc
                .timestamp_opt(*secs, 0)
                .single()
                .ok_or_else(|| RuleError::InvalidDate(secs.to_string())),
            other => Err(RuleError::InvalidDate(format!(
                "cannot interpret {} as a date",
                other.type_name()
            ))),
        }
    }
}

fn parse_date(text: &str) -> Result<DateTime<Utc>, RuleError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
        && let Some(naive) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(naive.and_utc());
    }
    Err(RuleError::InvalidDate(text.to_owned()))
}

/// Renders values in a JSON-like notation for debugging output.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
            Self::DateTime(dt) => write!(f, "{:?}", dt.to_rfc3339()),
            Self::Object(_) => f.write_str("<object>"),
            Self::Callable(_) => f.write_str("<callable>"),
        }
    }
}

impl PartialEq for Value {
    /// Structural equality used for comparing IR trees; identity semantics
    /// for objects and callables.
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(dt: DateTime<Utc>) -> Self {
        Self::DateTime(dt)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        Self::from_json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Hybrid;

    impl FactObject for Hybrid {
        fn invoke(&self, name: &str) -> Option<Result<Value, RuleError>> {
            (name == "shared").then(|| Ok(Value::from("method")))
        }

        fn field(&self, name: &str) -> Option<Value> {
            matches!(name, "shared" | "prop").then(|| Value::from("field"))
        }

        fn index(&self, key: &str) -> Option<Value> {
            matches!(key, "shared" | "prop" | "slot").then(|| Value::from("index"))
        }
    }

    #[test]
    fn property_resolution_priority() {
        let obj = Value::Object(Arc::new(Hybrid));
        assert_eq!(obj.property("shared").unwrap(), Some(Value::from("method")));
        assert_eq!(obj.property("prop").unwrap(), Some(Value::from("field")));
        assert_eq!(obj.property("slot").unwrap(), Some(Value::from("index")));
        assert_eq!(obj.property("missing").unwrap(), None);
    }

    #[test]
    fn property_on_map_and_list() {
        let map = Value::from_json(serde_json::json!({"a": {"b": 1}, "n": null}));
        assert!(matches!(map.property("a").unwrap(), Some(Value::Map(_))));
        assert_eq!(map.property("n").unwrap(), Some(Value::Null));
        assert_eq!(map.property("zzz").unwrap(), None);

        let list = Value::from(vec![10, 20]);
        assert_eq!(list.property("1").unwrap(), Some(Value::Int(20)));
        assert_eq!(list.property("5").unwrap(), None);

        assert_eq!(Value::Int(3).property("x").unwrap(), None);
    }

    #[test]
    fn equality_coerces_numbers_but_identity_does_not() {
        assert!(Value::Int(1).equal_to(&Value::Float(1.0)));
        assert!(!Value::Int(1).same_as(&Value::Float(1.0)));
        assert!(Value::from("a").same_as(&Value::from("a")));
        assert!(!Value::Null.equal_to(&Value::Bool(false)));
    }

    #[test]
    fn objects_compare_by_identity() {
        let a: Arc<dyn FactObject> = Arc::new(Hybrid);
        let b: Arc<dyn FactObject> = Arc::new(Hybrid);
        assert!(Value::Object(a.clone()).same_as(&Value::Object(a.clone())));
        assert!(!Value::Object(a).same_as(&Value::Object(b)));
    }

    #[test]
    fn ordering_helpers() {
        assert!(Value::Int(5).greater_than(&Value::Float(4.5)).unwrap());
        assert!(Value::Int(5).greater_than_or_equal_to(&Value::Int(5)).unwrap());
        assert!(Value::from("a").less_than(&Value::from("b")).unwrap());
        assert!(!Value::Null.less_than(&Value::Int(1)).unwrap());
        assert!(Value::Bool(true).greater_than(&Value::Int(1)).is_err());
    }

    #[test]
    fn dates_compare_against_strings() {
        let dt = Value::from("2024-06-01").as_datetime().unwrap();
        let v = Value::DateTime(dt);
        assert!(v.greater_than(&Value::from("2024-01-01")).unwrap());
        assert!(v.equal_to(&Value::from("2024-06-01T00:00:00Z")));
        assert!(Value::from("not a date").as_datetime().is_err());
    }

    #[test]
    fn membership() {
        let list = Value::from(vec!["a", "b"]);
        assert!(list.contains_value(&Value::from("a")).unwrap());
        assert!(!list.contains_value(&Value::from("c")).unwrap());
        assert!(Value::from("hello").contains_value(&Value::from("ell")).unwrap());
        assert!(Value::Int(1).contains_value(&Value::Int(1)).is_err());
    }

    #[test]
    fn json_roundtrip() {
        let json = serde_json::json!({"a": [1, 2.5, "x", null, true]});
        assert_eq!(Value::from_json(json.clone()).to_json(), Some(json));
        assert_eq!(Value::Object(Arc::new(Hybrid)).to_json(), None);
    }

    #[test]
    fn display_is_json_like() {
        let v = Value::from_json(serde_json::json!({"a": [1, 2.0, "x"], "b": null}));
        assert_eq!(v.to_string(), r#"{"a": [1, 2.0, "x"], "b": null}"#);
    }

    #[test]
    fn truthiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
    }
}
