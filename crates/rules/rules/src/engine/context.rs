use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::engine::value::{Callable, Value};
use crate::error::RuleError;

/// A fact factory. It receives the fact store so facts can be defined in
/// terms of other facts.
pub type FactFn = Arc<dyn Fn(&Context) -> Result<Value, RuleError> + Send + Sync>;

/// One entry in the fact store.
#[derive(Clone)]
pub enum Fact {
    /// A literal value, returned as-is.
    Value(Value),
    /// A factory invoked on every lookup.
    Factory(FactFn),
    /// A factory invoked on first lookup; its result is memoized and the key
    /// is frozen afterwards.
    Shared(FactFn),
    /// A callable that is never invoked; lookups return it as a value.
    Protected(FactFn),
}

impl Fact {
    /// A factory fact re-evaluated on every lookup.
    pub fn factory<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<Value, RuleError> + Send + Sync + 'static,
    {
        Self::Factory(Arc::new(f))
    }

    /// A memoized factory fact.
    pub fn shared<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<Value, RuleError> + Send + Sync + 'static,
    {
        Self::Shared(Arc::new(f))
    }

    /// A callable stored and returned without being invoked.
    pub fn protected<F>(f: F) -> Self
    where
        F: Fn(&Context) -> Result<Value, RuleError> + Send + Sync + 'static,
    {
        Self::Protected(Arc::new(f))
    }
}

impl fmt::Debug for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
            Self::Shared(_) => f.write_str("Shared(..)"),
            Self::Protected(_) => f.write_str("Protected(..)"),
        }
    }
}

impl<T: Into<Value>> From<T> for Fact {
    fn from(value: T) -> Self {
        Self::Value(value.into())
    }
}

#[derive(Debug)]
struct Entry {
    fact: Fact,
    /// Memoized result of a `Shared` fact. Once set, the key is frozen.
    resolved: Option<Value>,
}

/// The fact store a rule is evaluated against.
///
/// Keys keep their insertion order. A store is meant to be built fresh for
/// each evaluation: resolving a shared fact writes the memoized value back
/// into the store, so one instance must not be used from several threads.
#[derive(Debug, Default)]
pub struct Context {
    order: RefCell<Vec<String>>,
    entries: RefCell<HashMap<String, Entry>>,
    /// Keys whose factories are currently running.
    resolving: RefCell<HashSet<String>>,
}

impl Context {
    /// Create an empty fact store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a fact store with one literal fact per top-level key of a JSON
    /// object. Non-object JSON yields an empty store.
    pub fn from_json(json: serde_json::Value) -> Self {
        let ctx = Self::new();
        if let serde_json::Value::Object(obj) = json {
            for (key, value) in obj {
                ctx.insert(key, Fact::Value(Value::from_json(value)));
            }
        }
        ctx
    }

    /// Builder-style [`set`](Self::set) for freshly created stores.
    #[must_use]
    pub fn with(self, key: impl Into<String>, fact: impl Into<Fact>) -> Self {
        self.insert(key.into(), fact.into());
        self
    }

    /// Define or redefine `key`.
    ///
    /// Fails with [`RuleError::FrozenFact`] when `key` holds a shared fact
    /// that has already been resolved.
    pub fn set(&self, key: impl Into<String>, fact: impl Into<Fact>) -> Result<(), RuleError> {
        let key = key.into();
        if self
            .entries
            .borrow()
            .get(&key)
            .is_some_and(|entry| entry.resolved.is_some())
        {
            return Err(RuleError::FrozenFact(key));
        }
        self.insert(key, fact.into());
        Ok(())
    }

    fn insert(&self, key: String, fact: Fact) {
        let mut entries = self.entries.borrow_mut();
        if !entries.contains_key(&key) {
            self.order.borrow_mut().push(key.clone());
        }
        entries.insert(
            key,
            Entry {
                fact,
                resolved: None,
            },
        );
    }

    /// Whether `key` is defined.
    pub fn has(&self, key: &str) -> bool {
        self.entries.borrow().contains_key(key)
    }

    /// Resolve `key` to a value.
    ///
    /// Factories are invoked with this store; shared facts are memoized on
    /// first resolution; protected facts come back as [`Value::Callable`].
    pub fn get(&self, key: &str) -> Result<Value, RuleError> {
        let fact = {
            let entries = self.entries.borrow();
            let entry = entries
                .get(key)
                .ok_or_else(|| RuleError::UndefinedFact(key.to_owned()))?;
            if let Some(ref value) = entry.resolved {
                return Ok(value.clone());
            }
            entry.fact.clone()
        };

        match fact {
            Fact::Value(value) => Ok(value),
            Fact::Protected(f) => Ok(Value::Callable(Callable(f))),
            Fact::Factory(f) => self.invoke(key, &f),
            Fact::Shared(f) => {
                let value = self.invoke(key, &f)?;
                if let Some(entry) = self.entries.borrow_mut().get_mut(key) {
                    entry.resolved = Some(value.clone());
                }
                debug!(fact = %key, "memoized shared fact");
                Ok(value)
            }
        }
    }

    /// Run a factory while guarding against re-entrant resolution of `key`.
    fn invoke(&self, key: &str, f: &FactFn) -> Result<Value, RuleError> {
        if !self.resolving.borrow_mut().insert(key.to_owned()) {
            return Err(RuleError::CyclicFact(key.to_owned()));
        }
        let result = f(self);
        self.resolving.borrow_mut().remove(key);
        result
    }

    /// The un-invoked definition stored under `key`.
    pub fn raw(&self, key: &str) -> Result<Fact, RuleError> {
        self.entries
            .borrow()
            .get(key)
            .map(|entry| entry.fact.clone())
            .ok_or_else(|| RuleError::UndefinedFact(key.to_owned()))
    }

    /// Remove `key`, returning its definition if it was present.
    pub fn remove(&self, key: &str) -> Option<Fact> {
        let removed = self.entries.borrow_mut().remove(key)?;
        self.order.borrow_mut().retain(|k| k != key);
        Some(removed.fact)
    }

    /// Defined keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.order.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::engine::value::FactObject;

    #[test]
    fn literal_facts() {
        let ctx = Context::new().with("age", 25).with("name", "ada");
        assert_eq!(ctx.get("age").unwrap(), Value::Int(25));
        assert_eq!(ctx.get("name").unwrap(), Value::from("ada"));
        assert!(ctx.has("age"));
        assert!(!ctx.has("missing"));
    }

    #[test]
    fn undefined_fact_fails() {
        let ctx = Context::new();
        assert_eq!(
            ctx.get("nope").unwrap_err(),
            RuleError::UndefinedFact("nope".into())
        );
        assert!(matches!(ctx.raw("nope"), Err(RuleError::UndefinedFact(_))));
    }

    #[test]
    fn factory_runs_on_every_lookup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = Context::new().with(
            "tick",
            Fact::factory(move |_| {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Int(i64::try_from(n).unwrap_or(i64::MAX)))
            }),
        );
        assert_eq!(ctx.get("tick").unwrap(), Value::Int(0));
        assert_eq!(ctx.get("tick").unwrap(), Value::Int(1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        ctx.set("tick", 9).unwrap();
        assert_eq!(ctx.get("tick").unwrap(), Value::Int(9));
    }

    #[derive(Debug)]
    struct Session;

    impl FactObject for Session {}

    #[test]
    fn shared_fact_is_memoized_and_frozen() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let ctx = Context::new().with(
            "session",
            Fact::shared(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Value::Object(Arc::new(Session)))
            }),
        );

        // Not resolved yet, so redefining is still allowed.
        assert!(ctx.raw("session").is_ok());

        let first = ctx.get("session").unwrap();
        let second = ctx.get("session").unwrap();
        match (&first, &second) {
            (Value::Object(a), Value::Object(b)) => assert!(Arc::ptr_eq(a, b)),
            other => panic!("expected objects, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(
            ctx.set("session", 1).unwrap_err(),
            RuleError::FrozenFact("session".into())
        );
    }

    #[test]
    fn protected_fact_is_not_invoked() {
        let ctx = Context::new().with("fn", Fact::protected(|_| Ok(Value::Int(42))));
        match ctx.get("fn").unwrap() {
            Value::Callable(callable) => assert_eq!(callable.call(&ctx).unwrap(), Value::Int(42)),
            other => panic!("expected callable, got {other:?}"),
        }
    }

    #[test]
    fn factories_can_read_other_facts() {
        let ctx = Context::new().with("base", 20).with(
            "double",
            Fact::factory(|ctx| match ctx.get("base")? {
                Value::Int(n) => Ok(Value::Int(n * 2)),
                other => Err(RuleError::TypeError(other.type_name().into())),
            }),
        );
        assert_eq!(ctx.get("double").unwrap(), Value::Int(40));
    }

    #[test]
    fn cyclic_fact_fails_fast() {
        let ctx = Context::new()
            .with("a", Fact::shared(|ctx| ctx.get("b")))
            .with("b", Fact::shared(|ctx| ctx.get("a")));
        assert_eq!(ctx.get("a").unwrap_err(), RuleError::CyclicFact("a".into()));
        // The failed resolution must not freeze either key.
        assert!(ctx.set("a", 1).is_ok());
    }

    #[test]
    fn keys_keep_insertion_order() {
        let ctx = Context::new().with("z", 1).with("a", 2).with("m", 3);
        assert_eq!(ctx.keys(), vec!["z", "a", "m"]);
        ctx.set("z", 5).unwrap();
        assert_eq!(ctx.keys(), vec!["z", "a", "m"]);
        assert!(ctx.remove("a").is_some());
        assert!(ctx.remove("a").is_none());
        assert_eq!(ctx.keys(), vec!["z", "m"]);
    }

    #[test]
    fn from_json_object() {
        let ctx = Context::from_json(serde_json::json!({"age": 30, "d": {"x": 1}}));
        assert_eq!(ctx.keys(), vec!["age", "d"]);
        assert!(matches!(ctx.get("d").unwrap(), Value::Map(_)));
    }
}
