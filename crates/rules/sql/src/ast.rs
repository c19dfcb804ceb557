use verity_rules::Value;

/// A parsed `WHERE` condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Vec<Expr>),
    Xor(Vec<Expr>),
    /// Explicit `AND` or juxtaposed conditions.
    And(Vec<Expr>),
    Not(Box<Expr>),
    /// `lhs <op> rhs`
    Compare(CompareOp, Scalar, Scalar),
    /// `x [NOT] BETWEEN low AND high`
    Between {
        negated: bool,
        scalar: Scalar,
        low: Scalar,
        high: Scalar,
    },
    /// `x [NOT] IN (v, ...)`
    InList {
        negated: bool,
        scalar: Scalar,
        values: Vec<Value>,
    },
    /// `x IS [NOT] NULL`
    IsNull { negated: bool, scalar: Scalar },
    /// `x [NOT] LIKE 'p%'` or `ILIKE`
    Like {
        negated: bool,
        insensitive: bool,
        scalar: Scalar,
        pattern: String,
    },
    /// `x [NOT] REGEXP 'pattern'`
    Regexp {
        negated: bool,
        scalar: Scalar,
        pattern: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// A value-producing operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// A column name, possibly dotted.
    Field(String),
    Literal(Value),
    /// Unary minus.
    Neg(Box<Scalar>),
    Arith(ArithOp, Box<Scalar>, Box<Scalar>),
    /// A function call; the name is checked by the compiler.
    Call { name: String, args: Vec<Scalar> },
}
