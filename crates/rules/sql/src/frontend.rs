//! SQL rule frontend. Each `.sql` file holds one `WHERE` condition.

use verity_rules::{
    Compiler, Parser, Rule, RuleError, RuleFrontend, RuleSource, Serializer, Validator,
};

use crate::compiler::SqlCompiler;
use crate::parser::SqlParser;
use crate::serializer::SqlSerializer;

/// A [`RuleFrontend`] for SQL `WHERE` conditions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlFrontend {
    parser: SqlParser,
}

impl SqlFrontend {
    pub fn new(parser: SqlParser) -> Self {
        Self { parser }
    }

    pub fn validator(&self) -> Validator<SqlParser> {
        Validator::new(self.parser)
    }
}

impl RuleFrontend for SqlFrontend {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn extensions(&self) -> &[&str] {
        &["sql"]
    }

    fn build(&self, input: &str) -> Result<Rule, RuleError> {
        // A leading `WHERE` is accepted and ignored.
        let trimmed = input.trim_start();
        let condition_text = match trimmed.get(..5) {
            Some(head) if head.eq_ignore_ascii_case("where") && trimmed[5..].starts_with(char::is_whitespace) => {
                &trimmed[5..]
            }
            _ => input,
        };
        let ast = self.parser.parse(condition_text)?;
        let condition = SqlCompiler.compile(&ast)?;
        Ok(Rule::new(condition).with_source(RuleSource::Grammar {
            grammar: self.name().to_owned(),
            file: None,
        }))
    }

    fn to_source(&self, rule: &Rule) -> Result<String, RuleError> {
        SqlSerializer.serialize(&rule.condition)
    }
}
