//! Recursive descent parser for SQL `WHERE` conditions.
//!
//! Token recognition uses `nom`; precedence is climbed by hand.
//! Loosest first: `OR`, `XOR`, `AND` (or juxtaposition), `NOT`, then a
//! single predicate. Operand expressions follow the usual arithmetic
//! precedence.

use nom::{
    IResult,
    bytes::complete::{tag, tag_no_case, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{opt, recognize},
    error::{Error, ErrorKind},
    multi::{separated_list0, separated_list1},
    sequence::{delimited, pair, tuple},
};

use verity_rules::text::{char_offset, read_quoted};
use verity_rules::{ParseLimits, Parser, RuleError, Value};

use crate::ast::{ArithOp, CompareOp, Expr, Scalar};

/// Words that cannot be used as bare column names.
pub(crate) const KEYWORDS: &[&str] = &[
    "AND", "OR", "XOR", "NOT", "IN", "BETWEEN", "IS", "NULL", "LIKE", "ILIKE", "REGEXP", "TRUE",
    "FALSE",
];

/// Parser for SQL `WHERE`-style conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlParser {
    limits: ParseLimits,
}

impl SqlParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ParseLimits) -> Self {
        Self { limits }
    }
}

impl Parser for SqlParser {
    type Ast = Expr;

    fn parse(&self, input: &str) -> Result<Expr, RuleError> {
        self.limits.check_len(input)?;
        if input.trim().is_empty() {
            return Err(RuleError::syntax("empty condition", input, Some(0)));
        }

        let grammar = Grammar {
            max_depth: self.limits.max_depth,
        };
        let (rest, expr) = grammar
            .or_expr(input, 1)
            .map_err(|e| syntax_error(input, e, self.limits.max_depth))?;

        let rest = rest.trim_start();
        if !rest.is_empty() {
            return Err(RuleError::syntax(
                format!("unexpected '{}'", snippet(rest)),
                input,
                Some(char_offset(input, input.len() - rest.len())),
            ));
        }
        Ok(expr)
    }
}

fn syntax_error(input: &str, err: nom::Err<Error<&str>>, max_depth: usize) -> RuleError {
    let e = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => return RuleError::syntax("incomplete input", input, None),
    };
    let rest = e.input.trim_start();
    let offset = char_offset(input, input.len() - rest.len());
    let message = match e.code {
        ErrorKind::TooLarge => format!("nesting depth exceeds limit of {max_depth}"),
        ErrorKind::Char if rest.starts_with(['\'', '"']) => "unterminated string literal".to_owned(),
        _ if rest.is_empty() => "unexpected end of input".to_owned(),
        _ => format!("unexpected '{}'", snippet(rest)),
    };
    RuleError::syntax(message, input, Some(offset))
}

/// The first word or symbol of `rest`, for error messages.
fn snippet(rest: &str) -> &str {
    let end = rest
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_whitespace() || !is_ident_char(*c))
        .map_or(rest.len(), |(i, _)| i);
    &rest[..end]
}

// ---------------------------------------------------------------------------
// Token helpers
// ---------------------------------------------------------------------------

fn ws<'a, F, O>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn fail<T>(input: &str, kind: ErrorKind) -> IResult<&str, T> {
    Err(nom::Err::Error(Error::new(input, kind)))
}

/// A case-insensitive keyword not followed by an identifier character.
fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    move |input: &'a str| {
        let (rest, matched) = tag_no_case(word)(input)?;
        if rest.starts_with(is_ident_char) {
            return fail(input, ErrorKind::Tag);
        }
        Ok((rest, matched))
    }
}

fn is_keyword(word: &str) -> bool {
    KEYWORDS.iter().any(|k| k.eq_ignore_ascii_case(word))
}

fn bare_identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| is_ident_char(c) || c == '.'),
    ))(input)
}

/// A column name: a bare dotted identifier or a double-quoted one.
fn identifier(input: &str) -> IResult<&str, String> {
    if input.starts_with('"') {
        let (name, used) = read_quoted(input)
            .ok_or_else(|| nom::Err::Failure(Error::new(input, ErrorKind::Char)))?;
        return Ok((&input[used..], name));
    }
    let (rest, name) = bare_identifier(input)?;
    if is_keyword(name) {
        return fail(input, ErrorKind::Tag);
    }
    Ok((rest, name.to_owned()))
}

/// A single-quoted string; `''` stands for one quote.
fn string_literal(input: &str) -> IResult<&str, String> {
    let (mut rest, _) = char('\'')(input)?;
    let mut value = String::new();
    loop {
        let Some(end) = rest.find('\'') else {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::Char)));
        };
        value.push_str(&rest[..end]);
        rest = &rest[end + 1..];
        match rest.strip_prefix('\'') {
            Some(after) => {
                value.push('\'');
                rest = after;
            }
            None => return Ok((rest, value)),
        }
    }
}

fn number(input: &str) -> IResult<&str, Value> {
    let (rest, text) = recognize(tuple((digit1, opt(pair(char('.'), digit1)))))(input)?;
    if rest.starts_with(is_ident_char) {
        return fail(input, ErrorKind::Digit);
    }
    let value = if text.contains('.') {
        text.parse()
            .map(Value::Float)
            .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Float)))?
    } else {
        text.parse()
            .map(Value::Int)
            .map_err(|_| nom::Err::Error(Error::new(input, ErrorKind::Digit)))?
    };
    Ok((rest, value))
}

/// `TRUE`, `FALSE`, `NULL`, a string or an unsigned number.
fn literal(input: &str) -> IResult<&str, Value> {
    if let Ok((rest, _)) = keyword("TRUE")(input) {
        return Ok((rest, Value::Bool(true)));
    }
    if let Ok((rest, _)) = keyword("FALSE")(input) {
        return Ok((rest, Value::Bool(false)));
    }
    if let Ok((rest, _)) = keyword("NULL")(input) {
        return Ok((rest, Value::Null));
    }
    if input.starts_with('\'') {
        let (rest, s) = string_literal(input)?;
        return Ok((rest, Value::String(s)));
    }
    number(input)
}

/// A literal with an optional leading minus, as used in `IN` lists.
fn signed_literal(input: &str) -> IResult<&str, Value> {
    let (rest, minus) = opt(ws(char('-')))(input)?;
    let (rest, value) = literal(rest)?;
    match (minus, value) {
        (None, value) => Ok((rest, value)),
        (Some(_), Value::Int(n)) => Ok((rest, Value::Int(-n))),
        (Some(_), Value::Float(f)) => Ok((rest, Value::Float(-f))),
        (Some(_), _) => fail(input, ErrorKind::Digit),
    }
}

fn compare_op(input: &str) -> IResult<&str, CompareOp> {
    for (symbol, op) in [
        ("<=", CompareOp::LtEq),
        (">=", CompareOp::GtEq),
        ("<>", CompareOp::NotEq),
        ("!=", CompareOp::NotEq),
        ("==", CompareOp::Eq),
        ("=", CompareOp::Eq),
        ("<", CompareOp::Lt),
        (">", CompareOp::Gt),
    ] {
        if let Ok((rest, _)) = tag::<_, _, Error<&str>>(symbol)(input) {
            return Ok((rest, op));
        }
    }
    fail(input, ErrorKind::Tag)
}

fn collapse(mut items: Vec<Expr>, wrap: fn(Vec<Expr>) -> Expr) -> Expr {
    if items.len() == 1 {
        items.remove(0)
    } else {
        wrap(items)
    }
}

// ---------------------------------------------------------------------------
// Conditions
// ---------------------------------------------------------------------------

struct Grammar {
    max_depth: usize,
}

impl Grammar {
    fn enter<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, ()> {
        if depth > self.max_depth {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }
        Ok((input, ()))
    }

    fn or_expr<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Expr> {
        let (mut input, first) = self.xor_expr(input, depth)?;
        let mut items = vec![first];
        while let Ok((rest, _)) = ws(keyword("OR"))(input) {
            let (rest, next) = self.xor_expr(rest, depth)?;
            items.push(next);
            input = rest;
        }
        Ok((input, collapse(items, Expr::Or)))
    }

    fn xor_expr<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Expr> {
        let (mut input, first) = self.and_expr(input, depth)?;
        let mut items = vec![first];
        while let Ok((rest, _)) = ws(keyword("XOR"))(input) {
            let (rest, next) = self.and_expr(rest, depth)?;
            items.push(next);
            input = rest;
        }
        Ok((input, collapse(items, Expr::Xor)))
    }

    fn and_expr<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Expr> {
        let (mut input, first) = self.not_expr(input, depth)?;
        let mut items = vec![first];
        loop {
            if let Ok((rest, _)) = ws(keyword("AND"))(input) {
                let (rest, next) = self.not_expr(rest, depth)?;
                items.push(next);
                input = rest;
                continue;
            }
            // Juxtaposed conditions are an implicit AND.
            let (peek, _) = multispace0(input)?;
            let ends_level = peek.is_empty()
                || peek.starts_with(')')
                || keyword("OR")(peek).is_ok()
                || keyword("XOR")(peek).is_ok();
            if ends_level {
                break;
            }
            let (rest, next) = self.not_expr(peek, depth)?;
            items.push(next);
            input = rest;
        }
        Ok((input, collapse(items, Expr::And)))
    }

    fn not_expr<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Expr> {
        let (input, _) = multispace0(input)?;
        if let Ok((rest, _)) = keyword("NOT")(input) {
            self.enter(input, depth + 1)?;
            let (rest, inner) = self.not_expr(rest, depth + 1)?;
            return Ok((rest, Expr::Not(Box::new(inner))));
        }
        self.predicate(input, depth)
    }

    fn predicate<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Expr> {
        if !input.starts_with('(') {
            return self.comparison(input, depth);
        }
        // `(` opens either a condition group or an arithmetic group.
        let group_err = match self.group(input, depth) {
            Ok(found) => return Ok(found),
            Err(nom::Err::Error(e)) => e,
            Err(other) => return Err(other),
        };
        match self.comparison(input, depth) {
            Ok(found) => Ok(found),
            Err(nom::Err::Error(e)) if e.input.len() > group_err.input.len() => {
                Err(nom::Err::Error(group_err))
            }
            Err(other) => Err(other),
        }
    }

    fn group<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Expr> {
        self.enter(input, depth + 1)?;
        let (rest, _) = char('(')(input)?;
        let (rest, expr) = self.or_expr(rest, depth + 1)?;
        let (rest, _) = ws(char(')'))(rest)?;
        Ok((rest, expr))
    }

    fn comparison<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Expr> {
        let (rest, scalar) = self.additive(input, depth)?;
        let (rest, _) = multispace0(rest)?;

        let (after_not, negated) = match keyword("NOT")(rest) {
            Ok((after, _)) => (multispace0(after)?.0, true),
            Err(_) => (rest, false),
        };

        if let Ok((r, _)) = keyword("BETWEEN")(after_not) {
            let (r, low) = self.additive(r, depth)?;
            let (r, _) = ws(keyword("AND"))(r)?;
            let (r, high) = self.additive(r, depth)?;
            return Ok((
                r,
                Expr::Between {
                    negated,
                    scalar,
                    low,
                    high,
                },
            ));
        }
        if let Ok((r, _)) = keyword("IN")(after_not) {
            let (r, values) = delimited(
                ws(char('(')),
                separated_list1(ws(char(',')), signed_literal),
                ws(char(')')),
            )(r)?;
            return Ok((
                r,
                Expr::InList {
                    negated,
                    scalar,
                    values,
                },
            ));
        }
        for (word, insensitive) in [("LIKE", false), ("ILIKE", true)] {
            if let Ok((r, _)) = keyword(word)(after_not) {
                let (r, pattern) = ws(string_literal)(r)?;
                return Ok((
                    r,
                    Expr::Like {
                        negated,
                        insensitive,
                        scalar,
                        pattern,
                    },
                ));
            }
        }
        if let Ok((r, _)) = keyword("REGEXP")(after_not) {
            let (r, pattern) = ws(string_literal)(r)?;
            return Ok((
                r,
                Expr::Regexp {
                    negated,
                    scalar,
                    pattern,
                },
            ));
        }
        if negated {
            return fail(after_not, ErrorKind::Tag);
        }

        if let Ok((r, _)) = keyword("IS")(rest) {
            let (r, _) = multispace0(r)?;
            let (r, not) = opt(pair(keyword("NOT"), multispace0))(r)?;
            let (r, _) = keyword("NULL")(r)?;
            return Ok((
                r,
                Expr::IsNull {
                    negated: not.is_some(),
                    scalar,
                },
            ));
        }

        let (r, op) = compare_op(rest)?;
        let (r, rhs) = self.additive(r, depth)?;
        Ok((r, Expr::Compare(op, scalar, rhs)))
    }

    // -----------------------------------------------------------------------
    // Operand expressions
    // -----------------------------------------------------------------------

    fn additive<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Scalar> {
        let (mut input, mut left) = self.multiplicative(input, depth)?;
        loop {
            let (next, _) = multispace0(input)?;
            let op = match next.chars().next() {
                Some('+') => ArithOp::Add,
                Some('-') => ArithOp::Sub,
                _ => break,
            };
            let (rest, right) = self.multiplicative(&next[1..], depth)?;
            left = Scalar::Arith(op, Box::new(left), Box::new(right));
            input = rest;
        }
        Ok((input, left))
    }

    fn multiplicative<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Scalar> {
        let (mut input, mut left) = self.unary(input, depth)?;
        loop {
            let (next, _) = multispace0(input)?;
            let op = match next.chars().next() {
                Some('*') => ArithOp::Mul,
                Some('/') => ArithOp::Div,
                Some('%') => ArithOp::Mod,
                _ => break,
            };
            let (rest, right) = self.unary(&next[1..], depth)?;
            left = Scalar::Arith(op, Box::new(left), Box::new(right));
            input = rest;
        }
        Ok((input, left))
    }

    fn unary<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Scalar> {
        let (input, _) = multispace0(input)?;
        if let Some(rest) = input.strip_prefix('-') {
            self.enter(input, depth + 1)?;
            let (rest, operand) = self.unary(rest, depth + 1)?;
            return Ok((rest, Scalar::Neg(Box::new(operand))));
        }
        self.primary(input, depth)
    }

    fn primary<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Scalar> {
        if input.starts_with('(') {
            self.enter(input, depth + 1)?;
            let (rest, _) = char('(')(input)?;
            let (rest, inner) = self.additive(rest, depth + 1)?;
            let (rest, _) = ws(char(')'))(rest)?;
            return Ok((rest, inner));
        }
        if let Ok((rest, value)) = literal(input) {
            return Ok((rest, Scalar::Literal(value)));
        }
        if input.starts_with('\'') {
            // Surface the unterminated-string failure.
            string_literal(input)?;
        }

        let (rest, name) = identifier(input)?;
        let (after, _) = multispace0(rest)?;
        if after.starts_with('(') && !name.contains('.') {
            self.enter(input, depth + 1)?;
            let (r, args) = delimited(
                char('('),
                separated_list0(ws(char(',')), |i: &'a str| self.additive(i, depth + 1)),
                ws(char(')')),
            )(after)?;
            return Ok((r, Scalar::Call { name, args }));
        }
        Ok((rest, Scalar::Field(name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &str) -> Expr {
        SqlParser::new().parse(input).unwrap()
    }

    fn field(name: &str) -> Scalar {
        Scalar::Field(name.into())
    }

    fn lit(v: impl Into<Value>) -> Scalar {
        Scalar::Literal(v.into())
    }

    #[test]
    fn compound_condition() {
        assert_eq!(
            parse("age >= 18 AND country = 'US'"),
            Expr::And(vec![
                Expr::Compare(CompareOp::GtEq, field("age"), lit(18)),
                Expr::Compare(CompareOp::Eq, field("country"), lit("US")),
            ])
        );
    }

    #[test]
    fn between_consumes_its_and() {
        assert_eq!(
            parse("age BETWEEN 18 AND 65 and active = true"),
            Expr::And(vec![
                Expr::Between {
                    negated: false,
                    scalar: field("age"),
                    low: lit(18),
                    high: lit(65),
                },
                Expr::Compare(CompareOp::Eq, field("active"), lit(true)),
            ])
        );
    }

    #[test]
    fn precedence_or_xor_and() {
        let ast = parse("a = 1 OR b = 2 XOR c = 3 AND d = 4");
        let Expr::Or(parts) = ast else {
            panic!("expected Or, got {ast:?}");
        };
        let Expr::Xor(ref xor) = parts[1] else {
            panic!("expected Xor, got {:?}", parts[1]);
        };
        assert!(matches!(xor[1], Expr::And(_)));
    }

    #[test]
    fn juxtaposition_is_and() {
        assert_eq!(
            parse("a = 1 b = 2"),
            Expr::And(vec![
                Expr::Compare(CompareOp::Eq, field("a"), lit(1)),
                Expr::Compare(CompareOp::Eq, field("b"), lit(2)),
            ])
        );
    }

    #[test]
    fn not_and_groups() {
        assert_eq!(
            parse("NOT (a = 1 OR b <> 2)"),
            Expr::Not(Box::new(Expr::Or(vec![
                Expr::Compare(CompareOp::Eq, field("a"), lit(1)),
                Expr::Compare(CompareOp::NotEq, field("b"), lit(2)),
            ])))
        );
    }

    #[test]
    fn suffix_predicates() {
        assert_eq!(
            parse("country NOT IN ('US', 'CA')"),
            Expr::InList {
                negated: true,
                scalar: field("country"),
                values: vec![Value::from("US"), Value::from("CA")],
            }
        );
        assert_eq!(
            parse("x IS NOT NULL"),
            Expr::IsNull {
                negated: true,
                scalar: field("x"),
            }
        );
        assert_eq!(
            parse("name ILIKE 'ad%'"),
            Expr::Like {
                negated: false,
                insensitive: true,
                scalar: field("name"),
                pattern: "ad%".into(),
            }
        );
        assert_eq!(
            parse(r"email NOT REGEXP '^\w+@x\.com$'"),
            Expr::Regexp {
                negated: true,
                scalar: field("email"),
                pattern: r"^\w+@x\.com$".into(),
            }
        );
    }

    #[test]
    fn arithmetic_and_functions() {
        assert_eq!(
            parse("price * qty - 5 > LENGTH(name)"),
            Expr::Compare(
                CompareOp::Gt,
                Scalar::Arith(
                    ArithOp::Sub,
                    Box::new(Scalar::Arith(
                        ArithOp::Mul,
                        Box::new(field("price")),
                        Box::new(field("qty"))
                    )),
                    Box::new(lit(5)),
                ),
                Scalar::Call {
                    name: "LENGTH".into(),
                    args: vec![field("name")],
                },
            )
        );
    }

    #[test]
    fn parenthesized_arithmetic_before_comparison() {
        assert_eq!(
            parse("(a + 1) * 2 = b"),
            Expr::Compare(
                CompareOp::Eq,
                Scalar::Arith(
                    ArithOp::Mul,
                    Box::new(Scalar::Arith(ArithOp::Add, Box::new(field("a")), Box::new(lit(1)))),
                    Box::new(lit(2)),
                ),
                field("b"),
            )
        );
    }

    #[test]
    fn strings_and_quoted_identifiers() {
        assert_eq!(
            parse(r#""first name" = 'O''Brien'"#),
            Expr::Compare(CompareOp::Eq, field("first name"), lit("O'Brien"))
        );
        assert_eq!(
            parse("x > -2.5"),
            Expr::Compare(CompareOp::Gt, field("x"), Scalar::Neg(Box::new(lit(2.5))))
        );
    }

    #[test]
    fn syntax_errors() {
        let parser = SqlParser::new();

        let err = parser.parse("age >= ").unwrap_err();
        assert_eq!(err.position(), Some(7));

        let err = parser.parse("name = 'Ada").unwrap_err();
        assert_eq!(err.position(), Some(7));
        assert!(err.to_string().contains("unterminated"));

        let err = parser.parse("(a = 1").unwrap_err();
        assert_eq!(err.position(), Some(6));

        let err = parser.parse("a = 1)").unwrap_err();
        assert_eq!(err.position(), Some(5));

        assert!(parser.parse("a ~ 1").is_err());
        assert!(parser.parse("AND = 1").is_err());
        assert!(parser.parse("").is_err());
    }

    #[test]
    fn depth_limit() {
        let parser = SqlParser::with_limits(ParseLimits {
            max_depth: 3,
            ..ParseLimits::default()
        });
        assert!(parser.parse("((a = 1))").is_ok());
        let err = parser.parse("((((a = 1))))").unwrap_err();
        assert!(err.to_string().contains("depth"));
    }
}
