use std::path::Path;

use tracing::{debug, instrument};

use crate::engine::context::Context;
use crate::error::RuleError;
use crate::frontend::RuleFrontend;
use crate::ir::rule::Rule;

/// An ordered collection of rules evaluated against one fact store.
///
/// Rules are evaluated in priority order (lower priority number first).
/// Disabled rules are skipped.
#[derive(Debug, Default, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Create a rule set with the given rules.
    ///
    /// Rules are automatically sorted by priority (lower number = higher priority).
    pub fn new(mut rules: Vec<Rule>) -> Self {
        rules.sort_by_key(|r| r.priority);
        Self { rules }
    }

    /// Return a reference to the sorted rules.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Look up a rule by name.
    pub fn rule_by_name(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }

    /// Add a rule and re-sort.
    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
        self.rules.sort_by_key(|r| r.priority);
    }

    /// Add multiple rules and re-sort by priority.
    pub fn add_rules(&mut self, rules: Vec<Rule>) {
        self.rules.extend(rules);
        self.rules.sort_by_key(|r| r.priority);
    }

    /// Return a list of all rule names.
    pub fn list_rules(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name.as_str()).collect()
    }

    /// Enable a rule by name. Returns true if the rule was found.
    pub fn enable_rule(&mut self, name: &str) -> bool {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.name == name) {
            rule.enabled = true;
            true
        } else {
            false
        }
    }

    /// Disable a rule by name. Returns true if the rule was found.
    pub fn disable_rule(&mut self, name: &str) -> bool {
        if let Some(rule) = self.rules.iter_mut().find(|r| r.name == name) {
            rule.enabled = false;
            true
        } else {
            false
        }
    }

    /// Return the name of the first enabled rule whose condition holds.
    ///
    /// Actions are not run.
    #[instrument(skip_all, fields(rules_count = self.rules.len()))]
    pub fn evaluate(&self, ctx: &Context) -> Result<Option<&str>, RuleError> {
        for rule in &self.rules {
            if !rule.enabled {
                debug!(rule = %rule.name, "skipping disabled rule");
                continue;
            }
            if rule.evaluate(ctx)? {
                debug!(rule = %rule.name, "rule matched");
                return Ok(Some(&rule.name));
            }
        }

        debug!("no rules matched");
        Ok(None)
    }

    /// Execute every enabled rule in priority order, running the action of
    /// each one that matches. Returns the names of the matched rules.
    #[instrument(skip_all, fields(rules_count = self.rules.len()))]
    pub fn execute_all(&self, ctx: &Context) -> Result<Vec<String>, RuleError> {
        let mut matched = Vec::new();
        for rule in self.rules.iter().filter(|r| r.enabled) {
            if rule.execute(ctx)? {
                matched.push(rule.name.clone());
            }
        }
        debug!(matched = matched.len(), "executed rule set");
        Ok(matched)
    }

    /// Load rules from a directory using the provided frontends.
    ///
    /// Walks the directory for files matching frontend extensions,
    /// parses each one, and adds the resulting rules. Returns the
    /// total number of rules loaded.
    pub fn load_directory(
        &mut self,
        path: &Path,
        frontends: &[&dyn RuleFrontend],
    ) -> Result<usize, RuleError> {
        let mut loaded = 0;
        let entries = std::fs::read_dir(path).map_err(|e| {
            RuleError::Io(format!("cannot read directory {}: {e}", path.display()))
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| RuleError::Io(format!("directory entry error: {e}")))?;
            let file_path = entry.path();

            if !file_path.is_file() {
                continue;
            }

            let extension = file_path
                .extension()
                .and_then(|ext| ext.to_str())
                .unwrap_or("");

            if let Some(frontend) = frontends
                .iter()
                .find(|f| f.extensions().contains(&extension))
            {
                let rules = frontend.parse_file(&file_path)?;
                debug!(file = %file_path.display(), grammar = frontend.name(), count = rules.len(), "loaded rules");
                loaded += rules.len();
                self.rules.extend(rules);
            }
        }

        self.rules.sort_by_key(|r| r.priority);
        Ok(loaded)
    }
}
