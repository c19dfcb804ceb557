//! Parser for RFC 4515-style search filters.

use nom::{
    IResult,
    bytes::complete::{is_not, take_while1},
    character::complete::{char, multispace0},
    error::{Error, ErrorKind},
    sequence::delimited,
};

use verity_rules::text::char_offset;
use verity_rules::{ParseLimits, Parser, RuleError};

use crate::ast::{Filter, MatchOp};

/// Parser for LDAP filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapParser {
    limits: ParseLimits,
}

impl LdapParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: ParseLimits) -> Self {
        Self { limits }
    }
}

impl Parser for LdapParser {
    type Ast = Filter;

    fn parse(&self, input: &str) -> Result<Filter, RuleError> {
        self.limits.check_len(input)?;
        let trimmed = input.trim_start();
        if trimmed.trim_end().is_empty() {
            return Err(RuleError::syntax("empty filter", input, Some(0)));
        }
        let grammar = Grammar {
            max_depth: self.limits.max_depth,
        };
        let to_error = |e| syntax_error(input, e, self.limits.max_depth);

        // A bare `attr=value` without parentheses is one item.
        if !trimmed.starts_with('(') {
            let (rest, filter) = item(trimmed).map_err(to_error)?;
            return finish(input, rest, filter);
        }

        let (mut rest, first) = grammar.filter(trimmed, 1).map_err(to_error)?;
        let mut filters = vec![first];
        while rest.starts_with('(') {
            let (next, filter) = grammar.filter(rest, 1).map_err(to_error)?;
            filters.push(filter);
            rest = next;
        }
        let filter = if filters.len() == 1 {
            filters.remove(0)
        } else {
            Filter::And(filters)
        };
        finish(input, rest, filter)
    }
}

fn finish(input: &str, rest: &str, filter: Filter) -> Result<Filter, RuleError> {
    let rest = rest.trim_start();
    match rest.chars().next() {
        None => Ok(filter),
        Some(c) => Err(RuleError::syntax(
            format!("unexpected '{c}' after filter"),
            input,
            Some(char_offset(input, input.len() - rest.len())),
        )),
    }
}

fn syntax_error(input: &str, err: nom::Err<Error<&str>>, max_depth: usize) -> RuleError {
    let e = match err {
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
        nom::Err::Incomplete(_) => return RuleError::syntax("incomplete filter", input, None),
    };
    let offset = char_offset(input, byte_offset(input, e.input));
    let message = match (e.code, e.input.chars().next()) {
        (ErrorKind::TooLarge, _) => format!("nesting depth exceeds limit of {max_depth}"),
        (ErrorKind::Escaped, _) => "invalid escape; expected '\\' and two hex digits".to_owned(),
        (_, None) => "unexpected end of filter".to_owned(),
        (_, Some(c)) => format!("unexpected '{c}'"),
    };
    RuleError::syntax(message, input, Some(offset))
}

/// Where `slice` starts inside `input`. Error slices are not always
/// suffixes: escape errors point into a value that stops at `)`.
fn byte_offset(input: &str, slice: &str) -> usize {
    (slice.as_ptr() as usize)
        .checked_sub(input.as_ptr() as usize)
        .filter(|&offset| offset <= input.len())
        .unwrap_or_else(|| input.len().saturating_sub(slice.len()))
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

struct Grammar {
    max_depth: usize,
}

impl Grammar {
    fn filter<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Filter> {
        if depth > self.max_depth {
            return Err(nom::Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }
        let (rest, _) = char('(')(input)?;
        let (rest, _) = multispace0(rest)?;
        let (rest, filter) = match rest.chars().next() {
            Some('&') => {
                let (rest, list) = self.filter_list(&rest[1..], depth)?;
                (rest, Filter::And(list))
            }
            Some('|') => {
                let (rest, list) = self.filter_list(&rest[1..], depth)?;
                (rest, Filter::Or(list))
            }
            Some('!') => {
                let (rest, _) = multispace0(&rest[1..])?;
                let (rest, inner) = self.filter(rest, depth + 1)?;
                (rest, Filter::Not(Box::new(inner)))
            }
            _ => item(rest)?,
        };
        let (rest, _) = delimited(multispace0, char(')'), multispace0)(rest)?;
        Ok((rest, filter))
    }

    /// One or more parenthesized filters.
    fn filter_list<'a>(&self, input: &'a str, depth: usize) -> IResult<&'a str, Vec<Filter>> {
        let (mut rest, _) = multispace0(input)?;
        let mut list = Vec::new();
        while rest.starts_with('(') || list.is_empty() {
            let (next, filter) = self.filter(rest, depth + 1)?;
            list.push(filter);
            rest = multispace0(next)?.0;
        }
        Ok((rest, list))
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

fn attribute(input: &str) -> IResult<&str, &str> {
    let (rest, name) =
        take_while1(|c: char| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))(input)?;
    if !name.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return Err(nom::Err::Error(Error::new(input, ErrorKind::Alpha)));
    }
    Ok((rest, name))
}

fn match_op(input: &str) -> IResult<&str, MatchOp> {
    for (symbol, op) in [
        (">=", MatchOp::GreaterOrEqual),
        ("<=", MatchOp::LessOrEqual),
        ("~=", MatchOp::Approx),
        ("=", MatchOp::Equal),
        (">", MatchOp::Greater),
        ("<", MatchOp::Less),
    ] {
        if let Some(rest) = input.strip_prefix(symbol) {
            return Ok((rest, op));
        }
    }
    Err(nom::Err::Error(Error::new(input, ErrorKind::Tag)))
}

/// `attr<op>value`, without the surrounding parentheses.
fn item(input: &str) -> IResult<&str, Filter> {
    let (rest, name) = attribute(input)?;
    let (rest, op) = match_op(rest)?;
    let (after, raw) = match is_not::<_, _, Error<&str>>("()")(rest) {
        Ok(found) => found,
        Err(_) => (rest, ""),
    };
    let attribute = name.to_owned();

    if op == MatchOp::Equal && raw == "*" {
        return Ok((after, Filter::Present(attribute)));
    }

    if op == MatchOp::Equal && raw.contains('*') {
        let segments = raw
            .split('*')
            .map(|part| unescape(part).map(|(value, _)| value))
            .collect::<Result<Vec<_>, _>>()?;
        let last_index = segments.len() - 1;
        let mut initial = None;
        let mut last = None;
        let mut any = Vec::new();
        for (i, segment) in segments.into_iter().enumerate() {
            if segment.is_empty() {
                continue;
            }
            match i {
                0 => initial = Some(segment),
                i if i == last_index => last = Some(segment),
                _ => any.push(segment),
            }
        }
        return Ok((
            after,
            Filter::Substring {
                attribute,
                initial,
                any,
                last,
            },
        ));
    }

    let (value, escaped) = unescape(raw)?;
    Ok((
        after,
        Filter::Item {
            attribute,
            op,
            value,
            escaped,
        },
    ))
}

/// Decode `\XX` hex escapes. Returns the value and whether any escape
/// was present.
fn unescape(raw: &str) -> Result<(String, bool), nom::Err<Error<&str>>> {
    fn invalid(at: &str) -> nom::Err<Error<&str>> {
        nom::Err::Failure(Error::new(at, ErrorKind::Escaped))
    }

    if !raw.contains('\\') {
        return Ok((raw.to_owned(), false));
    }
    let mut bytes = Vec::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(i) = rest.find('\\') {
        bytes.extend_from_slice(&rest.as_bytes()[..i]);
        let escape = &rest[i..];
        let hex = escape
            .get(1..3)
            .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
            .ok_or_else(|| invalid(escape))?;
        let byte = u8::from_str_radix(hex, 16).map_err(|_| invalid(escape))?;
        bytes.push(byte);
        rest = &escape[3..];
    }
    bytes.extend_from_slice(rest.as_bytes());
    String::from_utf8(bytes)
        .map(|value| (value, true))
        .map_err(|_| invalid(raw))
}
