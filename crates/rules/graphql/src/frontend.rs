//! GraphQL filter frontend. Each `.gqlfilter` or `.gqlf` file
//! holds one filter object.

use verity_rules::{
    Compiler, Parser, Rule, RuleError, RuleFrontend, RuleSource, Serializer, Validator,
};

use crate::compiler::GraphqlCompiler;
use crate::parser::GraphqlParser;
use crate::serializer::GraphqlSerializer;

/// A [`RuleFrontend`] for GraphQL-style filter objects.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphqlFrontend {
    parser: GraphqlParser,
}

impl GraphqlFrontend {
    pub fn new(parser: GraphqlParser) -> Self {
        Self { parser }
    }

    pub fn validator(&self) -> Validator<GraphqlParser> {
        Validator::new(self.parser)
    }

    /// Build a rule from an already decoded filter document.
    pub fn build_value(&self, document: &serde_json::Value) -> Result<Rule, RuleError> {
        let ast = self.parser.parse_value(document)?;
        self.finish(&ast)
    }

    fn finish(&self, ast: &crate::ast::Filter) -> Result<Rule, RuleError> {
        let condition = GraphqlCompiler.compile(ast)?;
        Ok(Rule::new(condition).with_source(RuleSource::Grammar {
            grammar: self.name().to_owned(),
            file: None,
        }))
    }
}

impl RuleFrontend for GraphqlFrontend {
    fn name(&self) -> &'static str {
        "graphql"
    }

    fn extensions(&self) -> &[&str] {
        &["gqlfilter", "gqlf"]
    }

    fn build(&self, input: &str) -> Result<Rule, RuleError> {
        let ast = self.parser.parse(input)?;
        self.finish(&ast)
    }

    fn to_source(&self, rule: &Rule) -> Result<String, RuleError> {
        GraphqlSerializer.serialize(&rule.condition)
    }
}
