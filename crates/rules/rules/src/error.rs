use thiserror::Error;

/// Number of characters shown on each side of a syntax error position.
const CONTEXT_RADIUS: usize = 20;

/// Errors that can occur while parsing, compiling, serializing, or evaluating rules.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    /// Malformed surface syntax.
    #[error("syntax error: {message}{}", .position.map(|p| format!(" at offset {p}")).unwrap_or_default())]
    Syntax {
        /// Human-readable description of the problem.
        message: String,
        /// Character offset into the input, when it can be determined.
        position: Option<usize>,
        /// Up to 20 characters of input on each side of `position`.
        context: Option<String>,
    },

    /// A document-query input was not valid JSON.
    #[error("JSON decode error: {0}")]
    JsonDecode(String),

    /// A recognized syntax shape uses an operator the compiler does not know.
    #[error("unsupported construct: {0}")]
    UnsupportedConstruct(String),

    /// An operator was read with the wrong number of operands.
    #[error("{operator} expects {expected} operand(s), got {actual}")]
    Cardinality {
        /// Name of the operator kind.
        operator: &'static str,
        /// Description of the accepted operand count (e.g. `"exactly 2"`).
        expected: String,
        /// The number of operands actually present.
        actual: usize,
    },

    /// A fact key was looked up but never defined.
    #[error("undefined fact: {0}")]
    UndefinedFact(String),

    /// A shared fact that has already been resolved cannot be redefined.
    #[error("cannot overwrite frozen fact: {0}")]
    FrozenFact(String),

    /// A fact factory resolved its own key while running.
    #[error("cyclic fact definition: {0}")]
    CyclicFact(String),

    /// The target grammar has no rendering for this operator kind.
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// An operand did not have the shape the rendering rule expects.
    #[error("structural mismatch: {0}")]
    StructuralMismatch(String),

    /// A type mismatch occurred during evaluation.
    #[error("type error: {0}")]
    TypeError(String),

    /// A general evaluation error that does not fit other categories.
    #[error("evaluation error: {0}")]
    Evaluation(String),

    /// An invalid regular expression was supplied to a match operation.
    #[error("invalid regex: {0}")]
    InvalidRegex(String),

    /// A value could not be interpreted as a date.
    #[error("invalid date: {0}")]
    InvalidDate(String),

    /// A rule file or directory could not be read.
    #[error("I/O error: {0}")]
    Io(String),

    /// Parse limits could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),
}

impl RuleError {
    /// Build a [`RuleError::Syntax`] for `input`, capturing a context window
    /// around `position` when one is given.
    pub fn syntax(message: impl Into<String>, input: &str, position: Option<usize>) -> Self {
        Self::Syntax {
            message: message.into(),
            position,
            context: position.map(|p| error_context(input, p)),
        }
    }

    /// The character offset of a syntax error, if this is one and it is known.
    pub fn position(&self) -> Option<usize> {
        match self {
            Self::Syntax { position, .. } => *position,
            _ => None,
        }
    }

    /// The context snippet of a syntax error, if available.
    pub fn context(&self) -> Option<&str> {
        match self {
            Self::Syntax { context, .. } => context.as_deref(),
            _ => None,
        }
    }
}

/// Extract up to [`CONTEXT_RADIUS`] characters on each side of `position`.
///
/// `position` is a character offset; values past the end are clamped.
pub fn error_context(input: &str, position: usize) -> String {
    let chars: Vec<char> = input.chars().collect();
    let position = position.min(chars.len());
    let start = position.saturating_sub(CONTEXT_RADIUS);
    let end = (position + CONTEXT_RADIUS).min(chars.len());
    chars[start..end].iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = RuleError::TypeError("expected bool, got int".into());
        assert_eq!(err.to_string(), "type error: expected bool, got int");

        let err = RuleError::UndefinedFact("foo".into());
        assert_eq!(err.to_string(), "undefined fact: foo");

        let err = RuleError::FrozenFact("bar".into());
        assert_eq!(err.to_string(), "cannot overwrite frozen fact: bar");

        let err = RuleError::Cardinality {
            operator: "Not",
            expected: "exactly 1".into(),
            actual: 2,
        };
        assert_eq!(err.to_string(), "Not expects exactly 1 operand(s), got 2");

        let err = RuleError::UnsupportedOperator("Xor".into());
        assert_eq!(err.to_string(), "unsupported operator: Xor");

        let err = RuleError::InvalidRegex("unclosed group".into());
        assert_eq!(err.to_string(), "invalid regex: unclosed group");
    }

    #[test]
    fn syntax_error_with_position() {
        let err = RuleError::syntax("unexpected token", "age >>= 18", Some(5));
        assert_eq!(err.to_string(), "syntax error: unexpected token at offset 5");
        assert_eq!(err.position(), Some(5));
        assert_eq!(err.context(), Some("age >>= 18"));
    }

    #[test]
    fn syntax_error_without_position() {
        let err = RuleError::syntax("empty input", "", None);
        assert_eq!(err.to_string(), "syntax error: empty input");
        assert!(err.context().is_none());
    }

    #[test]
    fn context_window_is_clamped() {
        let input = "a".repeat(30) + "X" + &"b".repeat(30);
        let ctx = error_context(&input, 30);
        assert_eq!(ctx.chars().count(), 40);
        assert!(ctx.starts_with('a'));
        assert_eq!(ctx.chars().nth(20), Some('X'));

        assert_eq!(error_context("short", 100), "short");
    }
}
