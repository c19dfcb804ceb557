use std::path::Path;

use serde::Serialize;

use crate::error::RuleError;
use crate::ir::operator::Proposition;
use crate::ir::rule::{Rule, RuleSource};

/// Turns surface syntax into a grammar-specific AST.
pub trait Parser {
    /// The AST produced by this parser.
    type Ast;

    /// Parse `input`, failing with [`RuleError::Syntax`] on malformed input.
    fn parse(&self, input: &str) -> Result<Self::Ast, RuleError>;
}

/// Turns a grammar-specific AST into an IR tree.
pub trait Compiler {
    /// The AST consumed by this compiler.
    type Ast;

    /// Compile `ast`, failing with [`RuleError::UnsupportedConstruct`] on
    /// operator names the grammar does not know.
    fn compile(&self, ast: &Self::Ast) -> Result<Proposition, RuleError>;
}

/// Turns an IR tree back into surface syntax.
pub trait Serializer {
    /// Render `condition`. Fails with [`RuleError::UnsupportedOperator`] for
    /// kinds the grammar cannot express and [`RuleError::StructuralMismatch`]
    /// for operands of an unexpected shape.
    fn serialize(&self, condition: &Proposition) -> Result<String, RuleError>;
}

/// One problem reported by a [`Validator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    /// Human-readable description.
    pub message: String,
    /// Character offset into the input, when known.
    pub position: Option<usize>,
    /// Input snippet around `position`.
    pub context: Option<String>,
}

impl From<RuleError> for ValidationError {
    fn from(err: RuleError) -> Self {
        match err {
            RuleError::Syntax {
                message,
                position,
                context,
            } => Self {
                message,
                position,
                context,
            },
            other => Self {
                message: other.to_string(),
                position: None,
                context: None,
            },
        }
    }
}

/// Structured outcome of [`Validator::validate_with_errors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// Whether the input parsed.
    pub valid: bool,
    /// Empty on success, at least one entry on failure.
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    /// A passing result.
    pub fn success() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    /// A failing result. An empty `errors` list gets a generic entry so a
    /// failure always carries at least one error.
    pub fn failure(mut errors: Vec<ValidationError>) -> Self {
        if errors.is_empty() {
            errors.push(ValidationError {
                message: "validation failed".to_owned(),
                position: None,
                context: None,
            });
        }
        Self {
            valid: false,
            errors,
        }
    }
}

/// Parse-only checker. It never compiles, so it reports syntax errors but
/// not unsupported operator names.
#[derive(Debug, Clone, Default)]
pub struct Validator<P> {
    parser: P,
}

impl<P: Parser> Validator<P> {
    /// Wrap a parser.
    pub fn new(parser: P) -> Self {
        Self { parser }
    }

    /// Whether `input` parses.
    pub fn validate(&self, input: &str) -> bool {
        self.parser.parse(input).is_ok()
    }

    /// Parse `input` and package any failure.
    pub fn validate_with_errors(&self, input: &str) -> ValidationResult {
        match self.parser.parse(input) {
            Ok(_) => ValidationResult::success(),
            Err(err) => ValidationResult::failure(vec![err.into()]),
        }
    }
}

/// Trait for grammar frontends bundling parse, compile and serialize.
pub trait RuleFrontend: Send + Sync {
    /// Short grammar name (e.g. `"sql"`), recorded in [`RuleSource`].
    fn name(&self) -> &'static str;

    /// Return the file extensions this frontend supports (e.g., `["sql"]`).
    fn extensions(&self) -> &[&str];

    /// Parse and compile `input` into a rule.
    fn build(&self, input: &str) -> Result<Rule, RuleError>;

    /// Render a rule's condition back into this grammar.
    fn to_source(&self, rule: &Rule) -> Result<String, RuleError>;

    /// Parse rules from file content. Each file holds one rule.
    fn parse(&self, content: &str) -> Result<Vec<Rule>, RuleError> {
        Ok(vec![self.build(content.trim())?])
    }

    /// Parse rules from a file path.
    ///
    /// The default implementation reads the file, delegates to
    /// [`parse`](Self::parse), and names each rule after the file stem.
    fn parse_file(&self, path: &Path) -> Result<Vec<Rule>, RuleError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RuleError::Io(format!("cannot read {}: {e}", path.display())))?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_owned();
        let source = RuleSource::Grammar {
            grammar: self.name().to_owned(),
            file: Some(path.display().to_string()),
        };
        Ok(self
            .parse(&content)?
            .into_iter()
            .map(|rule| {
                let rule = rule.with_source(source.clone());
                if rule.name.is_empty() {
                    rule.with_name(stem.clone())
                } else {
                    rule
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::operand::Operand;
    use crate::ir::operator::{Operator, OperatorKind};

    /// Accepts only the literal words `true` and `false`.
    struct BoolParser;

    impl Parser for BoolParser {
        type Ast = bool;

        fn parse(&self, input: &str) -> Result<bool, RuleError> {
            match input.trim() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(RuleError::syntax("expected a boolean", input, Some(0))),
            }
        }
    }

    struct BoolFrontend;

    impl RuleFrontend for BoolFrontend {
        fn name(&self) -> &'static str {
            "bool"
        }

        fn extensions(&self) -> &[&str] {
            &["bool"]
        }

        fn build(&self, input: &str) -> Result<Rule, RuleError> {
            let value = BoolParser.parse(input)?;
            let op = Operator::binary(OperatorKind::EqualTo, Operand::literal(value), Operand::literal(true));
            Ok(Rule::new(Proposition::try_from(op)?))
        }

        fn to_source(&self, rule: &Rule) -> Result<String, RuleError> {
            Ok(rule.to_source())
        }
    }

    #[test]
    fn validator_reports_syntax_errors() {
        let validator = Validator::new(BoolParser);
        assert!(validator.validate("true"));
        assert!(!validator.validate("maybe"));

        let result = validator.validate_with_errors("maybe");
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].message, "expected a boolean");
        assert_eq!(result.errors[0].position, Some(0));
        assert_eq!(result.errors[0].context.as_deref(), Some("maybe"));

        assert_eq!(validator.validate_with_errors("false"), ValidationResult::success());
    }

    #[test]
    fn failure_always_has_an_error() {
        let result = ValidationResult::failure(vec![]);
        assert!(!result.valid);
        assert_eq!(result.errors.len(), 1);
    }

    #[test]
    fn validation_result_serializes() {
        let json = serde_json::to_value(ValidationResult::success()).unwrap();
        assert_eq!(json, serde_json::json!({"valid": true, "errors": []}));
    }

    #[test]
    fn frontend_parse_nonexistent_file() {
        let result = BoolFrontend.parse_file(Path::new("/nonexistent/path.bool"));
        assert!(matches!(result, Err(RuleError::Io(_))));
    }

    #[test]
    fn frontend_parse_file_names_rule_after_stem() {
        let dir = std::env::temp_dir().join(format!("verity-frontend-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("always.bool");
        std::fs::write(&path, "true\n").unwrap();

        let rules = BoolFrontend.parse_file(&path).unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "always");
        assert!(matches!(
            rules[0].source,
            RuleSource::Grammar { ref grammar, .. } if grammar == "bool"
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
