//! Mongo query frontend. Each `.mongo` or `.mql` file holds one query
//! document.

use verity_rules::{
    Compiler, Parser, Rule, RuleError, RuleFrontend, RuleSource, Serializer, Validator,
};

use crate::ast::Filter;
use crate::compiler::MongoCompiler;
use crate::parser::MongoParser;
use crate::serializer::MongoSerializer;

/// A [`RuleFrontend`] for Mongo-style query documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoFrontend {
    parser: MongoParser,
}

impl MongoFrontend {
    pub fn new(parser: MongoParser) -> Self {
        Self { parser }
    }

    pub fn validator(&self) -> Validator<MongoParser> {
        Validator::new(self.parser)
    }

    /// Build a rule from an already decoded query document.
    pub fn build_value(&self, document: &serde_json::Value) -> Result<Rule, RuleError> {
        let ast = self.parser.parse_value(document)?;
        self.finish(&ast)
    }

    fn finish(&self, ast: &Filter) -> Result<Rule, RuleError> {
        let condition = MongoCompiler.compile(ast)?;
        Ok(Rule::new(condition).with_source(RuleSource::Grammar {
            grammar: self.name().to_owned(),
            file: None,
        }))
    }
}

impl RuleFrontend for MongoFrontend {
    fn name(&self) -> &'static str {
        "mongo"
    }

    fn extensions(&self) -> &[&str] {
        &["mongo", "mql"]
    }

    fn build(&self, input: &str) -> Result<Rule, RuleError> {
        let ast = self.parser.parse(input)?;
        self.finish(&ast)
    }

    fn to_source(&self, rule: &Rule) -> Result<String, RuleError> {
        MongoSerializer.serialize(&rule.condition)
    }
}
