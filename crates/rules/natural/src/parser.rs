//! Precedence parser for English-like rule text.
//!
//! Precedence, loosest first: `or`, then `and` (or a comma), then `not`,
//! then a single condition. Parenthesized groups are opaque to splitting.
//! Connectives that belong to an idiom (`between A and B`, `either A or B`,
//! `one of A, B or C`, `greater than or equal to`) are marked before any
//! splitting so they are never mistaken for logical connectives.

use verity_rules::text::{split_top_level, strip_outer_group};
use verity_rules::{ParseLimits, Parser, RuleError, Value};

use crate::ast::{Comparison, Condition, Expr, Predicate, Subject, Term, TextOp};
use crate::lexer::{Token, TokenKind, tokenize};

/// Parser for the natural-language grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalParser {
    limits: ParseLimits,
}

impl NaturalParser {
    /// A parser with default limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// A parser with custom limits.
    pub fn with_limits(limits: ParseLimits) -> Self {
        Self { limits }
    }
}

impl Parser for NaturalParser {
    type Ast = Expr;

    fn parse(&self, input: &str) -> Result<Expr, RuleError> {
        self.limits.check_len(input)?;
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(RuleError::syntax("empty rule", input, Some(0)));
        }
        check_balanced(input, &tokens)?;
        let state = State {
            input,
            limits: self.limits,
            end: input.chars().count(),
        };
        state.expr(&tokens, 1)
    }
}

fn check_balanced(input: &str, tokens: &[Token]) -> Result<(), RuleError> {
    let mut open = Vec::new();
    for token in tokens {
        match token.kind {
            TokenKind::LParen => open.push(token.offset),
            TokenKind::RParen => {
                if open.pop().is_none() {
                    return Err(RuleError::syntax(
                        "unmatched ')'",
                        input,
                        Some(token.offset),
                    ));
                }
            }
            _ => {}
        }
    }
    match open.pop() {
        Some(offset) => Err(RuleError::syntax("unclosed '('", input, Some(offset))),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Idiom phrases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Phrase {
    Compare(Comparison),
    Between { negated: bool },
    BetweenDates { negated: bool },
    OneOf { negated: bool },
    Either,
    Neither,
    Text { op: TextOp, negated: bool },
    Exists { negated: bool },
    Null { negated: bool },
    Empty { negated: bool },
    Type { negated: bool },
    After,
    Before,
}

/// Every recognized phrase. The longest phrase matching the input wins.
const PHRASES: &[(&[&str], Phrase)] = &[
    (&["is", "greater", "than", "or", "equal", "to"], Phrase::Compare(Comparison::GreaterOrEqual)),
    (&["is", "less", "than", "or", "equal", "to"], Phrase::Compare(Comparison::LessOrEqual)),
    (&["is", "greater", "than"], Phrase::Compare(Comparison::Greater)),
    (&["is", "less", "than"], Phrase::Compare(Comparison::Less)),
    (&["is", "at", "least"], Phrase::Compare(Comparison::GreaterOrEqual)),
    (&["is", "at", "most"], Phrase::Compare(Comparison::LessOrEqual)),
    (&["is", "not", "equal", "to"], Phrase::Compare(Comparison::NotEqual)),
    (&["is", "equal", "to"], Phrase::Compare(Comparison::Equal)),
    (&["does", "not", "equal"], Phrase::Compare(Comparison::NotEqual)),
    (&["equals"], Phrase::Compare(Comparison::Equal)),
    (&["is", "not", "identical", "to"], Phrase::Compare(Comparison::NotIdentical)),
    (&["is", "identical", "to"], Phrase::Compare(Comparison::Identical)),
    (&["is", "not", "between", "dates"], Phrase::BetweenDates { negated: true }),
    (&["is", "between", "dates"], Phrase::BetweenDates { negated: false }),
    (&["is", "not", "between"], Phrase::Between { negated: true }),
    (&["is", "between"], Phrase::Between { negated: false }),
    (&["is", "not", "one", "of"], Phrase::OneOf { negated: true }),
    (&["is", "one", "of"], Phrase::OneOf { negated: false }),
    (&["is", "either"], Phrase::Either),
    (&["is", "neither"], Phrase::Neither),
    (&["does", "not", "contain"], Phrase::Text { op: TextOp::Contains, negated: true }),
    (&["contains"], Phrase::Text { op: TextOp::Contains, negated: false }),
    (&["does", "not", "start", "with"], Phrase::Text { op: TextOp::StartsWith, negated: true }),
    (&["starts", "with"], Phrase::Text { op: TextOp::StartsWith, negated: false }),
    (&["does", "not", "end", "with"], Phrase::Text { op: TextOp::EndsWith, negated: true }),
    (&["ends", "with"], Phrase::Text { op: TextOp::EndsWith, negated: false }),
    (&["does", "not", "match"], Phrase::Text { op: TextOp::Matches, negated: true }),
    (&["matches"], Phrase::Text { op: TextOp::Matches, negated: false }),
    (&["does", "not", "exist"], Phrase::Exists { negated: true }),
    (&["exists"], Phrase::Exists { negated: false }),
    (&["is", "not", "null"], Phrase::Null { negated: true }),
    (&["is", "null"], Phrase::Null { negated: false }),
    (&["is", "not", "empty"], Phrase::Empty { negated: true }),
    (&["is", "empty"], Phrase::Empty { negated: false }),
    (&["is", "not", "a"], Phrase::Type { negated: true }),
    (&["is", "not", "an"], Phrase::Type { negated: true }),
    (&["is", "a"], Phrase::Type { negated: false }),
    (&["is", "an"], Phrase::Type { negated: false }),
    (&["is", "after"], Phrase::After),
    (&["is", "before"], Phrase::Before),
    (&["is", "not"], Phrase::Compare(Comparison::NotEqual)),
    (&["is"], Phrase::Compare(Comparison::Equal)),
];

fn match_phrase(tokens: &[Token]) -> Option<(Phrase, usize)> {
    PHRASES
        .iter()
        .filter(|(words, _)| {
            words.len() <= tokens.len()
                && words.iter().zip(tokens).all(|(w, t)| t.is_word(w))
        })
        .max_by_key(|(words, _)| words.len())
        .map(|(words, phrase)| (*phrase, words.len()))
}

/// Mark connective tokens at depth zero that belong to an idiom.
///
/// Idiom words only count in phrase position, right after `is` or
/// `is not`, so fields named `between` or `either` stay plain fields.
fn protected_connectives(tokens: &[Token]) -> Vec<bool> {
    let mut protected = vec![false; tokens.len()];
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            _ => {}
        }
        if depth > 0 {
            continue;
        }
        let next_is = |offset: usize, word: &str| tokens.get(i + offset).is_some_and(|t| t.is_word(word));
        let prev_is = |offset: usize, word: &str| {
            i.checked_sub(offset)
                .and_then(|j| tokens.get(j))
                .is_some_and(|t| t.is_word(word))
        };
        let after_is = prev_is(1, "is") || (prev_is(1, "not") && prev_is(2, "is"));

        if token.is_word("between") && after_is {
            if let Some(j) = next_top_level(tokens, i + 1, "and") {
                protected[j] = true;
            }
        } else if token.is_word("either") && prev_is(1, "is") {
            if let Some(j) = next_top_level(tokens, i + 1, "or") {
                protected[j] = true;
            }
        } else if token.is_word("or") && prev_is(1, "than") && next_is(1, "equal") && next_is(2, "to") {
            protected[i] = true;
        } else if token.is_word("one") && next_is(1, "of") && after_is {
            let mut j = i + 2;
            while tokens.get(j).is_some_and(Token::is_literal) {
                let separates = tokens.get(j + 1).is_some_and(|t| {
                    t.kind == TokenKind::Comma || t.is_word("or") || t.is_word("and")
                });
                if separates && tokens.get(j + 2).is_some_and(Token::is_literal) {
                    protected[j + 1] = true;
                    j += 2;
                } else {
                    break;
                }
            }
        }
    }
    protected
}

fn next_top_level(tokens: &[Token], from: usize, word: &str) -> Option<usize> {
    let mut depth = 0usize;
    for (j, token) in tokens.iter().enumerate().skip(from) {
        match token.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.checked_sub(1)?,
            _ if depth == 0 && token.is_word(word) => return Some(j),
            _ => {}
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Expression parsing
// ---------------------------------------------------------------------------

struct State<'a> {
    input: &'a str,
    limits: ParseLimits,
    /// Character length of the input, reported for errors at the end.
    end: usize,
}

impl State<'_> {
    fn error(&self, message: impl Into<String>, position: usize) -> RuleError {
        RuleError::syntax(message, self.input, Some(position))
    }

    fn expr(&self, tokens: &[Token], depth: usize) -> Result<Expr, RuleError> {
        self.limits
            .check_depth(depth, self.input, tokens.first().map(|t| t.offset))?;
        let tokens = strip_outer_group(tokens, Token::nesting);
        if tokens.is_empty() {
            return Err(self.error("expected a condition", self.end));
        }

        let protected = protected_connectives(tokens);
        let free = |i: usize| !protected[i];

        let parts = split_top_level(tokens, Token::nesting, |i, t| t.is_word("or") && free(i));
        if parts.len() > 1 {
            return Ok(Expr::Or(self.children(tokens, &parts, depth)?));
        }

        let parts = split_top_level(tokens, Token::nesting, |i, t| {
            (t.is_word("and") || t.kind == TokenKind::Comma) && free(i)
        });
        if parts.len() > 1 {
            return Ok(Expr::And(self.children(tokens, &parts, depth)?));
        }

        if tokens[0].is_word("not") {
            let inner = self.expr(&tokens[1..], depth + 1)?;
            return Ok(Expr::Not(Box::new(inner)));
        }

        self.condition(tokens).map(Expr::Condition)
    }

    /// Parse each split segment, reporting empty segments at their separator.
    fn children(
        &self,
        tokens: &[Token],
        parts: &[&[Token]],
        depth: usize,
    ) -> Result<Vec<Expr>, RuleError> {
        let mut cursor = 0;
        let mut children = Vec::with_capacity(parts.len());
        for part in parts {
            if part.is_empty() {
                // Point at the separator next to the gap.
                let at = tokens
                    .get(cursor)
                    .or_else(|| tokens.last())
                    .map_or(self.end, |t| t.offset);
                return Err(self.error("expected a condition around connective", at));
            }
            children.push(self.expr(part, depth + 1)?);
            cursor += part.len() + 1;
        }
        Ok(children)
    }

    fn condition(&self, tokens: &[Token]) -> Result<Condition, RuleError> {
        let mut cursor = Cursor {
            state: self,
            tokens,
            pos: 0,
        };
        let subject = cursor.subject()?;

        let rest = &tokens[cursor.pos..];
        let Some((phrase, len)) = match_phrase(rest) else {
            return Err(self.error(
                format!("expected a comparison phrase, found '{}'", describe(rest.first())),
                cursor.offset(),
            ));
        };
        cursor.pos += len;

        let predicate = match phrase {
            Phrase::Compare(cmp) => Predicate::Compare(cmp, cursor.term()?),
            Phrase::Between { negated } => {
                let (low, high) = cursor.range()?;
                Predicate::Between { negated, low, high }
            }
            Phrase::BetweenDates { negated } => {
                let (from, to) = cursor.range()?;
                Predicate::BetweenDates { negated, from, to }
            }
            Phrase::OneOf { negated } => Predicate::OneOf {
                negated,
                values: cursor.literal_list()?,
            },
            Phrase::Either => Predicate::OneOf {
                negated: false,
                values: cursor.literal_pair("or")?,
            },
            Phrase::Neither => Predicate::OneOf {
                negated: true,
                values: cursor.literal_pair("nor")?,
            },
            Phrase::Text { op, negated } => {
                let pattern = cursor.term()?;
                let ignore_case = cursor.eat_words(&["ignoring", "case"]);
                Predicate::Text {
                    op,
                    negated,
                    pattern,
                    ignore_case,
                }
            }
            Phrase::Exists { negated } => Predicate::Exists { negated },
            Phrase::Null { negated } => Predicate::Null { negated },
            Phrase::Empty { negated } => Predicate::Empty { negated },
            Phrase::Type { negated } => Predicate::Type {
                negated,
                name: cursor.type_name()?,
            },
            Phrase::After => Predicate::After(cursor.term()?),
            Phrase::Before => Predicate::Before(cursor.term()?),
        };

        if let Some(extra) = tokens.get(cursor.pos) {
            return Err(self.error(
                format!("unexpected '{}' after condition", extra.describe()),
                extra.offset,
            ));
        }
        Ok(Condition { subject, predicate })
    }
}

fn describe(token: Option<&Token>) -> String {
    token.map_or_else(|| "end of input".to_owned(), Token::describe)
}

/// Reads the operands of a single condition.
struct Cursor<'s, 't> {
    state: &'s State<'s>,
    tokens: &'t [Token],
    pos: usize,
}

impl Cursor<'_, '_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.state.end, |t| t.offset)
    }

    fn unexpected(&self, expected: &str) -> RuleError {
        self.state.error(
            format!("expected {expected}, found '{}'", describe(self.peek())),
            self.offset(),
        )
    }

    fn eat_words(&mut self, words: &[&str]) -> bool {
        let matches = words
            .iter()
            .enumerate()
            .all(|(i, w)| self.tokens.get(self.pos + i).is_some_and(|t| t.is_word(w)));
        if matches {
            self.pos += words.len();
        }
        matches
    }

    fn expect_word(&mut self, word: &str) -> Result<(), RuleError> {
        if self.eat_words(&[word]) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("'{word}'")))
        }
    }

    fn field_name(&mut self) -> Result<String, RuleError> {
        match self.peek() {
            Some(token @ Token { kind: TokenKind::Word(name), .. }) if !token.is_literal() => {
                let name = name.clone();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("a field name")),
        }
    }

    fn subject(&mut self) -> Result<Subject, RuleError> {
        if self.eat_words(&["length", "of"]) {
            return self.field_name().map(Subject::Length);
        }
        self.field_name().map(Subject::Field)
    }

    fn literal(&mut self) -> Result<Value, RuleError> {
        let value = match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Str(s)) => Value::String(s.clone()),
            Some(TokenKind::Int(n)) => Value::Int(*n),
            Some(TokenKind::Float(f)) => Value::Float(*f),
            Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case("true") => Value::Bool(true),
            Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case("false") => Value::Bool(false),
            Some(TokenKind::Word(w)) if w.eq_ignore_ascii_case("null") => Value::Null,
            _ => return Err(self.unexpected("a literal value")),
        };
        self.pos += 1;
        Ok(value)
    }

    fn term(&mut self) -> Result<Term, RuleError> {
        match self.peek() {
            Some(t) if t.is_literal() => self.literal().map(Term::Literal),
            Some(Token {
                kind: TokenKind::Word(_),
                ..
            }) => self.field_name().map(Term::Field),
            _ => Err(self.unexpected("a value or field name")),
        }
    }

    fn range(&mut self) -> Result<(Term, Term), RuleError> {
        let low = self.term()?;
        self.expect_word("and")?;
        let high = self.term()?;
        Ok((low, high))
    }

    fn literal_list(&mut self) -> Result<Vec<Value>, RuleError> {
        let mut values = vec![self.literal()?];
        loop {
            let separated = self.peek().is_some_and(|t| {
                t.kind == TokenKind::Comma || t.is_word("or") || t.is_word("and")
            });
            if !separated {
                break;
            }
            self.pos += 1;
            values.push(self.literal()?);
        }
        Ok(values)
    }

    fn literal_pair(&mut self, connective: &str) -> Result<Vec<Value>, RuleError> {
        let first = self.literal()?;
        self.expect_word(connective)?;
        Ok(vec![first, self.literal()?])
    }

    fn type_name(&mut self) -> Result<String, RuleError> {
        match self.peek().map(|t| &t.kind) {
            Some(TokenKind::Word(name)) => {
                let name = name.to_lowercase();
                self.pos += 1;
                Ok(name)
            }
            _ => Err(self.unexpected("a type name")),
        }
    }
}
