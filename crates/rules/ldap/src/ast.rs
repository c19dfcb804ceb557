/// A parsed LDAP search filter.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `(&(a)(b))`, or juxtaposed top-level filters `(a)(b)`.
    And(Vec<Filter>),
    /// `(|(a)(b))`
    Or(Vec<Filter>),
    /// `(!(a))`
    Not(Box<Filter>),
    /// `(attr<op>value)`
    Item {
        attribute: String,
        op: MatchOp,
        /// Unescaped assertion value.
        value: String,
        /// Whether the value contained `\XX` escapes. Escaped values are
        /// never read as numbers or booleans.
        escaped: bool,
    },
    /// `(attr=*)`
    Present(String),
    /// `(attr=init*any*final)`; empty segments are omitted.
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        last: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOp {
    /// `=`
    Equal,
    /// `~=`
    Approx,
    /// `>=`
    GreaterOrEqual,
    /// `<=`
    LessOrEqual,
    /// `>`
    Greater,
    /// `<`
    Less,
}
