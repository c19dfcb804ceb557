//! Tokenizer for the natural-language grammar.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{opt, recognize},
    sequence::{pair, tuple},
};

use verity_rules::RuleError;
use verity_rules::text::{Nesting, char_offset, read_quoted};

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// A bare word: keyword or field path.
    Word(String),
    /// A quoted string literal, unescaped.
    Str(String),
    /// An integer literal.
    Int(i64),
    /// A float literal.
    Float(f64),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `,`
    Comma,
}

/// A token plus its character offset in the input.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    /// What was read.
    pub kind: TokenKind,
    /// Character offset of the token's first character.
    pub offset: usize,
}

impl Token {
    /// Whether this is the bare word `word`, ignoring ASCII case.
    pub fn is_word(&self, word: &str) -> bool {
        matches!(self.kind, TokenKind::Word(ref w) if w.eq_ignore_ascii_case(word))
    }

    /// Whether this token is a literal value rather than a field reference.
    pub fn is_literal(&self) -> bool {
        match self.kind {
            TokenKind::Str(_) | TokenKind::Int(_) | TokenKind::Float(_) => true,
            TokenKind::Word(_) => self.is_word("true") || self.is_word("false") || self.is_word("null"),
            _ => false,
        }
    }

    /// Grouping role of the token.
    pub fn nesting(&self) -> Nesting {
        match self.kind {
            TokenKind::LParen => Nesting::Open,
            TokenKind::RParen => Nesting::Close,
            _ => Nesting::Flat,
        }
    }

    /// The token as it would be written, for error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Word(ref w) => w.clone(),
            TokenKind::Str(ref s) => format!("{s:?}"),
            TokenKind::Int(n) => n.to_string(),
            TokenKind::Float(f) => f.to_string(),
            TokenKind::LParen => "(".to_owned(),
            TokenKind::RParen => ")".to_owned(),
            TokenKind::Comma => ",".to_owned(),
        }
    }
}

/// Split `input` into tokens.
pub fn tokenize(input: &str) -> Result<Vec<Token>, RuleError> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_start();
    while !rest.is_empty() {
        let offset = char_offset(input, input.len() - rest.len());
        let (next, kind) = token(rest).map_err(|_| lex_error(input, rest, offset))?;
        tokens.push(Token { kind, offset });
        rest = next.trim_start();
    }
    Ok(tokens)
}

fn lex_error(input: &str, rest: &str, offset: usize) -> RuleError {
    let message = match rest.chars().next() {
        Some('"' | '\'') => "unterminated string literal".to_owned(),
        Some(c) => format!("unexpected character '{c}'"),
        None => "unexpected end of input".to_owned(),
    };
    RuleError::syntax(message, input, Some(offset))
}

// ---------------------------------------------------------------------------
// Token recognizers
// ---------------------------------------------------------------------------

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((punctuation, number, string_literal, word))(input)
}

fn punctuation(input: &str) -> IResult<&str, TokenKind> {
    let (rest, c) = alt((char('('), char(')'), char(',')))(input)?;
    let kind = match c {
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        _ => TokenKind::Comma,
    };
    Ok((rest, kind))
}

fn number(input: &str) -> IResult<&str, TokenKind> {
    let (rest, text) = recognize(tuple((
        opt(char('-')),
        digit1,
        opt(pair(char('.'), digit1)),
    )))(input)?;

    // `18abc` is not a number followed by a word.
    if rest.starts_with(|c: char| c.is_alphabetic() || c == '_') {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Digit,
        )));
    }

    let kind = if text.contains('.') {
        text.parse().map(TokenKind::Float).map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Float))
        })?
    } else {
        text.parse().map(TokenKind::Int).map_err(|_| {
            nom::Err::Error(nom::error::Error::new(input, nom::error::ErrorKind::Digit))
        })?
    };
    Ok((rest, kind))
}

fn string_literal(input: &str) -> IResult<&str, TokenKind> {
    if !input.starts_with(['"', '\'']) {
        return Err(nom::Err::Error(nom::error::Error::new(
            input,
            nom::error::ErrorKind::Char,
        )));
    }
    let (value, used) = read_quoted(input).ok_or_else(|| {
        nom::Err::Failure(nom::error::Error::new(input, nom::error::ErrorKind::Char))
    })?;
    Ok((&input[used..], TokenKind::Str(value)))
}

fn word(input: &str) -> IResult<&str, TokenKind> {
    let (rest, text) = recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '.'),
    ))(input)?;
    Ok((rest, TokenKind::Word(text.to_owned())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        tokenize(input).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn words_numbers_strings() {
        assert_eq!(
            kinds(r#"user.age is at least 18 and name equals "Ada""#),
            vec![
                TokenKind::Word("user.age".into()),
                TokenKind::Word("is".into()),
                TokenKind::Word("at".into()),
                TokenKind::Word("least".into()),
                TokenKind::Int(18),
                TokenKind::Word("and".into()),
                TokenKind::Word("name".into()),
                TokenKind::Word("equals".into()),
                TokenKind::Str("Ada".into()),
            ]
        );
    }

    #[test]
    fn punctuation_and_floats() {
        assert_eq!(
            kinds("(x, -2.5)"),
            vec![
                TokenKind::LParen,
                TokenKind::Word("x".into()),
                TokenKind::Comma,
                TokenKind::Float(-2.5),
                TokenKind::RParen,
            ]
        );
    }

    #[test]
    fn single_quotes_and_escapes() {
        assert_eq!(kinds(r"'it\'s'"), vec![TokenKind::Str("it's".into())]);
        assert_eq!(kinds(r#""\d+""#), vec![TokenKind::Str(r"\d+".into())]);
    }

    #[test]
    fn offsets_are_characters() {
        let tokens = tokenize(r#"näme equals "x""#).unwrap();
        assert_eq!(tokens[1].offset, 5);
        assert_eq!(tokens[2].offset, 12);
    }

    #[test]
    fn unterminated_string() {
        let err = tokenize(r#"name equals "Ada"#).unwrap_err();
        assert_eq!(err.position(), Some(12));
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn unexpected_character() {
        let err = tokenize("age >= 18").unwrap_err();
        assert_eq!(err.position(), Some(4));
    }

    #[test]
    fn literal_words() {
        let tokens = tokenize("TRUE null field").unwrap();
        assert!(tokens[0].is_literal());
        assert!(tokens[1].is_literal());
        assert!(!tokens[2].is_literal());
    }
}
