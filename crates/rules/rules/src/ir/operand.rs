use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::context::Context;
use crate::engine::value::Value;
use crate::error::RuleError;
use crate::ir::operator::Operator;

/// A named reference into the fact store, or an anonymous literal.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    name: Option<String>,
    /// Returned when the fact store does not define `name`, and always
    /// returned by anonymous variables.
    default: Value,
}

impl Variable {
    /// A variable bound to fact `name`, resolving to null when undefined.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            default: Value::Null,
        }
    }

    /// An anonymous variable that always resolves to `value`.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self {
            name: None,
            default: value.into(),
        }
    }

    /// Set the value returned when the fact is undefined.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// The fact name, or `None` for literals.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The default (or, for anonymous variables, bound) value.
    pub fn default_value(&self) -> &Value {
        &self.default
    }

    /// Resolve against the fact store.
    pub fn prepare_value(&self, ctx: &Context) -> Result<Value, RuleError> {
        match self.name {
            Some(ref name) if ctx.has(name) => ctx.get(name),
            _ => Ok(self.default.clone()),
        }
    }
}

/// A field access one level below a parent variable or property.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableProperty {
    parent: Operand,
    name: String,
    default: Value,
}

impl VariableProperty {
    /// Access `name` on the runtime value of `parent`.
    pub fn new(parent: Operand, name: impl Into<String>) -> Self {
        Self {
            parent,
            name: name.into(),
            default: Value::Null,
        }
    }

    /// Set the value returned when no access strategy finds the member.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = default.into();
        self
    }

    /// The parent reference.
    pub fn parent(&self) -> &Operand {
        &self.parent
    }

    /// The property name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolve the parent, then the member: invocation, field read,
    /// indexed lookup, and finally the default.
    pub fn prepare_value(&self, ctx: &Context) -> Result<Value, RuleError> {
        let parent = self.parent.prepare_value(ctx)?;
        Ok(parent
            .property(&self.name)?
            .unwrap_or_else(|| self.default.clone()))
    }
}

/// One operand of an [`Operator`].
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// A fact reference or literal.
    Variable(Arc<Variable>),
    /// A field access below another operand.
    Property(Arc<VariableProperty>),
    /// A nested operator.
    Operator(Arc<Operator>),
}

impl Operand {
    /// An anonymous literal operand.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Variable(Arc::new(Variable::literal(value)))
    }

    /// Resolve to a runtime value. Propositions yield `Value::Bool`.
    pub fn prepare_value(&self, ctx: &Context) -> Result<Value, RuleError> {
        match self {
            Self::Variable(var) => var.prepare_value(ctx),
            Self::Property(prop) => prop.prepare_value(ctx),
            Self::Operator(op) => op.prepare_value(ctx),
        }
    }

    /// Evaluate as a boolean: propositions are evaluated, anything else is
    /// resolved and tested for truthiness.
    pub fn evaluate(&self, ctx: &Context) -> Result<bool, RuleError> {
        match self {
            Self::Operator(op) if op.kind().is_proposition() => op.evaluate(ctx),
            other => Ok(other.prepare_value(ctx)?.is_truthy()),
        }
    }

    /// The dotted field path for named variables and property chains over
    /// them; `None` for literals and operators.
    pub fn field_path(&self) -> Option<String> {
        match self {
            Self::Variable(var) => var.name().map(ToOwned::to_owned),
            Self::Property(prop) => prop
                .parent()
                .field_path()
                .map(|parent| format!("{parent}.{}", prop.name())),
            Self::Operator(_) => None,
        }
    }

    /// The bound value of an anonymous variable.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Variable(var) if var.name().is_none() => Some(var.default_value()),
            _ => None,
        }
    }

    /// The nested operator, if this operand is one.
    pub fn as_operator(&self) -> Option<&Operator> {
        match self {
            Self::Operator(op) => Some(op),
            _ => None,
        }
    }
}

impl From<Operator> for Operand {
    fn from(op: Operator) -> Self {
        Self::Operator(Arc::new(op))
    }
}

impl From<Variable> for Operand {
    fn from(var: Variable) -> Self {
        Self::Variable(Arc::new(var))
    }
}

impl From<VariableProperty> for Operand {
    fn from(prop: VariableProperty) -> Self {
        Self::Property(Arc::new(prop))
    }
}

/// Turns dotted field paths into operand chains.
///
/// Root variables are cached by name so repeated references to the same
/// field share one `Arc<Variable>`. Each compilation owns its own resolver,
/// so cached variables never leak between compilations.
#[derive(Debug, Default)]
pub struct FieldResolver {
    roots: HashMap<String, Arc<Variable>>,
}

impl FieldResolver {
    /// Create a resolver with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct root fields resolved so far.
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Whether no field has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Resolve `path` (e.g. `user.address.city`) into an operand.
    pub fn resolve(&mut self, path: &str) -> Result<Operand, RuleError> {
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        if root.is_empty() {
            return Err(RuleError::UnsupportedConstruct(format!(
                "empty field path: '{path}'"
            )));
        }

        let variable = Arc::clone(
            self.roots
                .entry(root.to_owned())
                .or_insert_with(|| Arc::new(Variable::named(root))),
        );
        let mut operand = Operand::Variable(variable);
        for segment in segments {
            if segment.is_empty() {
                return Err(RuleError::UnsupportedConstruct(format!(
                    "empty segment in field path: '{path}'"
                )));
            }
            operand = VariableProperty::new(operand, segment).into();
        }
        Ok(operand)
    }
}
