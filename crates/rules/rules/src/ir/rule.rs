use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::engine::context::Context;
use crate::error::RuleError;
use crate::ir::operator::Proposition;

/// Callback run by [`Rule::execute`] when the condition holds.
pub type RuleAction = Arc<dyn Fn(&Context) + Send + Sync>;

/// Where a rule was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleSource {
    /// Compiled by a grammar frontend.
    Grammar {
        /// The frontend's name (e.g. `"sql"`).
        grammar: String,
        /// The file path, if loaded from disk.
        file: Option<String>,
    },
    /// Constructed in code.
    Inline,
}

/// A top-level gate: one boolean condition plus an optional action.
///
/// Rules are immutable once built and can be evaluated repeatedly, from
/// several threads, against independent fact stores.
#[derive(Clone)]
pub struct Rule {
    /// A human-readable name for the rule.
    pub name: String,
    /// Priority for ordering. Lower values are evaluated first.
    pub priority: i32,
    /// Optional description of what this rule does.
    pub description: Option<String>,
    /// Whether the rule is active.
    pub enabled: bool,
    /// The condition that must hold for the rule to fire.
    pub condition: Proposition,
    /// Where this rule was built from.
    pub source: RuleSource,
    /// Arbitrary key-value metadata.
    pub metadata: HashMap<String, String>,
    action: Option<RuleAction>,
}

impl Rule {
    /// Create an unnamed, enabled rule with priority 0 and no action.
    pub fn new(condition: Proposition) -> Self {
        Self {
            name: String::new(),
            priority: 0,
            description: None,
            enabled: true,
            condition,
            source: RuleSource::Inline,
            metadata: HashMap::new(),
            action: None,
        }
    }

    /// Set the name of this rule.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the priority of this rule.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Set the description of this rule.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the enabled state of this rule.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set the source of this rule.
    #[must_use]
    pub fn with_source(mut self, source: RuleSource) -> Self {
        self.source = source;
        self
    }

    /// Set the metadata for this rule.
    #[must_use]
    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Bind the action run when the condition holds.
    #[must_use]
    pub fn with_action<F>(mut self, action: F) -> Self
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        self.action = Some(Arc::new(action));
        self
    }

    /// Whether an action is bound.
    pub fn has_action(&self) -> bool {
        self.action.is_some()
    }

    /// Evaluate the condition against a fact store.
    pub fn evaluate(&self, ctx: &Context) -> Result<bool, RuleError> {
        self.condition.evaluate(ctx)
    }

    /// Evaluate the condition and, only if it holds, run the action.
    ///
    /// Returns whether the condition held.
    #[instrument(skip_all, fields(rule = %self.name))]
    pub fn execute(&self, ctx: &Context) -> Result<bool, RuleError> {
        let matched = self.evaluate(ctx)?;
        if matched && let Some(ref action) = self.action {
            debug!("rule matched, running action");
            action(ctx);
        }
        Ok(matched)
    }

    /// Render the condition as `Kind(operand, ...)` pseudo-code.
    pub fn to_source(&self) -> String {
        self.condition.to_string()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("description", &self.description)
            .field("enabled", &self.enabled)
            .field("condition", &self.condition)
            .field("source", &self.source)
            .field("metadata", &self.metadata)
            .field("action", &self.action.as_ref().map(|_| ".."))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::ir::operand::{FieldResolver, Operand};
    use crate::ir::operator::{Operator, OperatorKind};

    fn adult() -> Proposition {
        let age = FieldResolver::new().resolve("age").unwrap();
        Proposition::try_from(Operator::binary(
            OperatorKind::GreaterThanOrEqualTo,
            age,
            Operand::literal(18),
        ))
        .unwrap()
    }

    #[test]
    fn rule_construction() {
        let rule = Rule::new(adult())
            .with_name("adults-only")
            .with_priority(10)
            .with_description("Require age 18+");

        assert_eq!(rule.name, "adults-only");
        assert_eq!(rule.priority, 10);
        assert_eq!(rule.description.as_deref(), Some("Require age 18+"));
        assert!(rule.enabled);
        assert!(!rule.has_action());
        assert_eq!(rule.source, RuleSource::Inline);
    }

    #[test]
    fn execute_runs_action_only_on_match() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let rule = Rule::new(adult()).with_action(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!rule.execute(&Context::new().with("age", 12)).unwrap());
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(rule.execute(&Context::new().with("age", 30)).unwrap());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn execute_without_action_only_evaluates() {
        let rule = Rule::new(adult());
        assert!(rule.execute(&Context::new().with("age", 30)).unwrap());
    }

    #[test]
    fn rule_is_reusable_across_contexts() {
        let rule = Rule::new(adult());
        assert!(rule.evaluate(&Context::new().with("age", 25)).unwrap());
        assert!(!rule.evaluate(&Context::new().with("age", 17)).unwrap());
        assert!(rule.evaluate(&Context::new().with("age", 18)).unwrap());
    }

    #[test]
    fn to_source_renders_condition() {
        assert_eq!(
            Rule::new(adult()).to_source(),
            "GreaterThanOrEqualTo(age, 18)"
        );
    }

    #[test]
    fn source_serde_roundtrip() {
        let source = RuleSource::Grammar {
            grammar: "sql".into(),
            file: Some("rules/adults.sql".into()),
        };
        let json = serde_json::to_string(&source).unwrap();
        let back: RuleSource = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);
    }
}
