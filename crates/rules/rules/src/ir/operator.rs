use std::fmt;

use crate::engine::context::Context;
use crate::engine::eval;
use crate::engine::value::Value;
use crate::error::RuleError;
use crate::ir::operand::Operand;

/// Arity class of an operator kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// Exactly one operand.
    Unary,
    /// Exactly two operands.
    Binary,
    /// One or more operands.
    Multiple,
}

/// Every operator the IR can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    // Logical
    And,
    Or,
    Not,
    Xor,
    Nand,
    Nor,

    // Comparison
    EqualTo,
    NotEqualTo,
    GreaterThan,
    GreaterThanOrEqualTo,
    LessThan,
    LessThanOrEqualTo,
    SameAs,
    NotSameAs,
    Between,
    In,
    NotIn,

    // String
    Contains,
    ContainsInsensitive,
    DoesNotContain,
    DoesNotContainInsensitive,
    StartsWith,
    StartsWithInsensitive,
    EndsWith,
    EndsWithInsensitive,
    Matches,
    DoesNotMatch,
    StringLength,

    // Type
    IsNull,
    IsArray,
    IsBoolean,
    IsNumeric,
    IsString,
    IsEmpty,

    // Date
    After,
    Before,
    IsBetweenDates,

    // Mathematical
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Exponentiate,
    Negate,
    Floor,
    Ceil,
}

impl OperatorKind {
    /// The operator's name as used in error messages and debug output.
    pub const fn name(self) -> &'static str {
        match self {
            Self::And => "And",
            Self::Or => "Or",
            Self::Not => "Not",
            Self::Xor => "Xor",
            Self::Nand => "Nand",
            Self::Nor => "Nor",
            Self::EqualTo => "EqualTo",
            Self::NotEqualTo => "NotEqualTo",
            Self::GreaterThan => "GreaterThan",
            Self::GreaterThanOrEqualTo => "GreaterThanOrEqualTo",
            Self::LessThan => "LessThan",
            Self::LessThanOrEqualTo => "LessThanOrEqualTo",
            Self::SameAs => "SameAs",
            Self::NotSameAs => "NotSameAs",
            Self::Between => "Between",
            Self::In => "In",
            Self::NotIn => "NotIn",
            Self::Contains => "Contains",
            Self::ContainsInsensitive => "ContainsInsensitive",
            Self::DoesNotContain => "DoesNotContain",
            Self::DoesNotContainInsensitive => "DoesNotContainInsensitive",
            Self::StartsWith => "StartsWith",
            Self::StartsWithInsensitive => "StartsWithInsensitive",
            Self::EndsWith => "EndsWith",
            Self::EndsWithInsensitive => "EndsWithInsensitive",
            Self::Matches => "Matches",
            Self::DoesNotMatch => "DoesNotMatch",
            Self::StringLength => "StringLength",
            Self::IsNull => "IsNull",
            Self::IsArray => "IsArray",
            Self::IsBoolean => "IsBoolean",
            Self::IsNumeric => "IsNumeric",
            Self::IsString => "IsString",
            Self::IsEmpty => "IsEmpty",
            Self::After => "After",
            Self::Before => "Before",
            Self::IsBetweenDates => "IsBetweenDates",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::Modulo => "Modulo",
            Self::Exponentiate => "Exponentiate",
            Self::Negate => "Negate",
            Self::Floor => "Floor",
            Self::Ceil => "Ceil",
        }
    }

    /// The declared arity of this kind.
    pub const fn cardinality(self) -> Cardinality {
        match self {
            Self::Not
            | Self::StringLength
            | Self::IsNull
            | Self::IsArray
            | Self::IsBoolean
            | Self::IsNumeric
            | Self::IsString
            | Self::IsEmpty
            | Self::Negate
            | Self::Floor
            | Self::Ceil => Cardinality::Unary,

            Self::EqualTo
            | Self::NotEqualTo
            | Self::GreaterThan
            | Self::GreaterThanOrEqualTo
            | Self::LessThan
            | Self::LessThanOrEqualTo
            | Self::SameAs
            | Self::NotSameAs
            | Self::In
            | Self::NotIn
            | Self::Contains
            | Self::ContainsInsensitive
            | Self::DoesNotContain
            | Self::DoesNotContainInsensitive
            | Self::StartsWith
            | Self::StartsWithInsensitive
            | Self::EndsWith
            | Self::EndsWithInsensitive
            | Self::Matches
            | Self::DoesNotMatch
            | Self::After
            | Self::Before
            | Self::Subtract
            | Self::Divide
            | Self::Modulo
            | Self::Exponentiate => Cardinality::Binary,

            Self::And
            | Self::Or
            | Self::Xor
            | Self::Nand
            | Self::Nor
            | Self::Between
            | Self::IsBetweenDates
            | Self::Add
            | Self::Multiply => Cardinality::Multiple,
        }
    }

    /// An exact operand count required on top of a `Multiple` cardinality.
    pub const fn fixed_arity(self) -> Option<usize> {
        match self {
            Self::Between | Self::IsBetweenDates => Some(3),
            _ => None,
        }
    }

    /// Whether this kind evaluates to a boolean gate. Mathematical operators
    /// and `StringLength` produce values instead.
    pub const fn is_proposition(self) -> bool {
        !matches!(
            self,
            Self::StringLength
                | Self::Add
                | Self::Subtract
                | Self::Multiply
                | Self::Divide
                | Self::Modulo
                | Self::Exponentiate
                | Self::Negate
                | Self::Floor
                | Self::Ceil
        )
    }

    /// Check an operand count against this kind's arity.
    pub fn check_arity(self, actual: usize) -> Result<(), RuleError> {
        let expected = match (self.cardinality(), self.fixed_arity()) {
            (_, Some(n)) if actual != n => format!("exactly {n}"),
            (Cardinality::Unary, _) if actual != 1 => "exactly 1".to_owned(),
            (Cardinality::Binary, _) if actual != 2 => "exactly 2".to_owned(),
            (Cardinality::Multiple, _) if actual == 0 => "at least 1".to_owned(),
            _ => return Ok(()),
        };
        Err(RuleError::Cardinality {
            operator: self.name(),
            expected,
            actual,
        })
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An IR node: an operator kind applied to an ordered operand list.
///
/// Operand counts are not checked at construction. They are checked when the
/// operands are read through [`operands`](Self::operands), which every
/// evaluation and serialization path goes through.
#[derive(Debug, Clone, PartialEq)]
pub struct Operator {
    kind: OperatorKind,
    operands: Vec<Operand>,
}

impl Operator {
    /// Create an operator with the given operands.
    pub fn new(kind: OperatorKind, operands: Vec<Operand>) -> Self {
        Self { kind, operands }
    }

    /// Shorthand for a one-operand operator.
    pub fn unary(kind: OperatorKind, operand: impl Into<Operand>) -> Self {
        Self::new(kind, vec![operand.into()])
    }

    /// Shorthand for a two-operand operator.
    pub fn binary(kind: OperatorKind, lhs: impl Into<Operand>, rhs: impl Into<Operand>) -> Self {
        Self::new(kind, vec![lhs.into(), rhs.into()])
    }

    /// The operator kind.
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    /// Append an operand.
    pub fn add_operand(&mut self, operand: impl Into<Operand>) {
        self.operands.push(operand.into());
    }

    /// The operands, after checking their count against the kind's arity.
    pub fn operands(&self) -> Result<&[Operand], RuleError> {
        self.kind.check_arity(self.operands.len())?;
        Ok(&self.operands)
    }

    /// Evaluate as a boolean gate.
    pub fn evaluate(&self, ctx: &Context) -> Result<bool, RuleError> {
        Ok(eval::prepare(self, ctx)?.is_truthy())
    }

    /// Resolve to a runtime value; propositions yield `Value::Bool`.
    pub fn prepare_value(&self, ctx: &Context) -> Result<Value, RuleError> {
        eval::prepare(self, ctx)
    }
}

/// Renders the tree as `Kind(operand, ...)` pseudo-code.
impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.kind)?;
        for (i, operand) in self.operands.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{operand}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operator(op) => write!(f, "{op}"),
            other => match (other.field_path(), other.as_literal()) {
                (Some(path), _) => f.write_str(&path),
                (None, Some(value)) => write!(f, "{value}"),
                (None, None) => f.write_str("?"),
            },
        }
    }
}

/// An operator known to evaluate to a boolean.
///
/// Rules and compilers hand these around so the root of a rule can never be
/// a value-producing operator.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposition(Operator);

impl Proposition {
    /// Evaluate the proposition against a fact store.
    pub fn evaluate(&self, ctx: &Context) -> Result<bool, RuleError> {
        self.0.evaluate(ctx)
    }

    /// The underlying operator.
    pub fn operator(&self) -> &Operator {
        &self.0
    }

    /// Unwrap into the underlying operator.
    pub fn into_inner(self) -> Operator {
        self.0
    }
}

impl TryFrom<Operator> for Proposition {
    type Error = RuleError;

    fn try_from(op: Operator) -> Result<Self, Self::Error> {
        if op.kind().is_proposition() {
            Ok(Self(op))
        } else {
            Err(RuleError::TypeError(format!(
                "{} produces a value, not a boolean",
                op.kind()
            )))
        }
    }
}

impl fmt::Display for Proposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operand::Variable;

    fn field(name: &str) -> Operand {
        Variable::named(name).into()
    }

    #[test]
    fn unary_arity_enforced_on_read() {
        let op = Operator::new(OperatorKind::Not, vec![]);
        let err = op.operands().unwrap_err();
        assert_eq!(
            err,
            RuleError::Cardinality {
                operator: "Not",
                expected: "exactly 1".into(),
                actual: 0,
            }
        );

        let op = Operator::new(
            OperatorKind::Not,
            vec![Operand::literal(true), Operand::literal(false)],
        );
        assert!(matches!(
            op.operands(),
            Err(RuleError::Cardinality { actual: 2, .. })
        ));
    }

    #[test]
    fn binary_arity_enforced_on_read() {
        let mut op = Operator::new(OperatorKind::EqualTo, vec![field("a")]);
        assert!(op.operands().is_err());
        op.add_operand(Operand::literal(1));
        assert_eq!(op.operands().unwrap().len(), 2);
        op.add_operand(Operand::literal(2));
        assert!(matches!(
            op.operands(),
            Err(RuleError::Cardinality { actual: 3, .. })
        ));
    }

    #[test]
    fn multiple_requires_at_least_one() {
        let op = Operator::new(OperatorKind::And, vec![]);
        assert!(matches!(
            op.operands(),
            Err(RuleError::Cardinality { actual: 0, .. })
        ));
        let op = Operator::new(OperatorKind::Or, vec![Operand::literal(true)]);
        assert_eq!(op.operands().unwrap().len(), 1);
    }

    #[test]
    fn between_requires_three() {
        let op = Operator::new(
            OperatorKind::Between,
            vec![field("age"), Operand::literal(18)],
        );
        let err = op.operands().unwrap_err();
        assert_eq!(err.to_string(), "Between expects exactly 3 operand(s), got 2");
    }

    #[test]
    fn evaluation_surfaces_cardinality_errors() {
        let op = Operator::new(OperatorKind::GreaterThan, vec![field("age")]);
        let ctx = Context::new().with("age", 3);
        assert!(matches!(
            op.evaluate(&ctx),
            Err(RuleError::Cardinality { .. })
        ));
    }

    #[test]
    fn proposition_rejects_value_operators() {
        let add = Operator::new(
            OperatorKind::Add,
            vec![Operand::literal(1), Operand::literal(2)],
        );
        assert!(Proposition::try_from(add).is_err());

        let eq = Operator::binary(OperatorKind::EqualTo, field("a"), Operand::literal(1));
        assert!(Proposition::try_from(eq).is_ok());
    }

    #[test]
    fn display_renders_pseudo_code() {
        let op = Operator::new(
            OperatorKind::And,
            vec![
                Operator::binary(
                    OperatorKind::GreaterThanOrEqualTo,
                    field("age"),
                    Operand::literal(18),
                )
                .into(),
                Operator::binary(OperatorKind::EqualTo, field("country"), Operand::literal("US"))
                    .into(),
            ],
        );
        assert_eq!(
            op.to_string(),
            r#"And(GreaterThanOrEqualTo(age, 18), EqualTo(country, "US"))"#
        );
    }
}
