use verity_rules::Value;

/// A parsed natural-language rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `a or b or ...`
    Or(Vec<Expr>),
    /// `a and b`, or `a, b`
    And(Vec<Expr>),
    /// `not a`
    Not(Box<Expr>),
    /// A single field condition.
    Condition(Condition),
}

/// `subject predicate`, e.g. `age is at least 18`.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// What is being tested.
    pub subject: Subject,
    /// How it is tested.
    pub predicate: Predicate,
}

/// The left-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    /// A dotted field path.
    Field(String),
    /// `length of <field>`
    Length(String),
}

/// A right-hand operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// A bare word naming another field.
    Field(String),
    /// A quoted string, number, `true`, `false` or `null`.
    Literal(Value),
}

/// Ordering and equality phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// `equals`, `is equal to`, `is`
    Equal,
    /// `does not equal`, `is not equal to`, `is not`
    NotEqual,
    /// `is greater than`
    Greater,
    /// `is greater than or equal to`, `is at least`
    GreaterOrEqual,
    /// `is less than`
    Less,
    /// `is less than or equal to`, `is at most`
    LessOrEqual,
    /// `is identical to`
    Identical,
    /// `is not identical to`
    NotIdentical,
}

/// String-matching phrases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextOp {
    /// `contains`
    Contains,
    /// `starts with`
    StartsWith,
    /// `ends with`
    EndsWith,
    /// `matches`
    Matches,
}

/// What a condition asserts about its subject.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// A comparison against one operand.
    Compare(Comparison, Term),
    /// `is [not] between <low> and <high>`
    Between {
        negated: bool,
        low: Term,
        high: Term,
    },
    /// `is [not] one of a, b, c`, `is either a or b`, `is neither a nor b`
    OneOf { negated: bool, values: Vec<Value> },
    /// `contains`, `starts with`, ... optionally `ignoring case`
    Text {
        op: TextOp,
        negated: bool,
        pattern: Term,
        ignore_case: bool,
    },
    /// `exists`, `does not exist`
    Exists { negated: bool },
    /// `is [not] null`
    Null { negated: bool },
    /// `is [not] empty`
    Empty { negated: bool },
    /// `is [not] a <type>`; the type name is checked by the compiler.
    Type { negated: bool, name: String },
    /// `is after <date>`
    After(Term),
    /// `is before <date>`
    Before(Term),
    /// `is [not] between dates <from> and <to>`
    BetweenDates {
        negated: bool,
        from: Term,
        to: Term,
    },
}
