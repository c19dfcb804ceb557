//! Natural-language rule frontend. Each `.rule` file holds one rule.

use verity_rules::{
    Compiler, Parser, Rule, RuleError, RuleFrontend, RuleSource, Serializer, Validator,
};

use crate::compiler::NaturalCompiler;
use crate::parser::NaturalParser;
use crate::serializer::NaturalSerializer;

/// A [`RuleFrontend`] for English-like rule text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NaturalFrontend {
    parser: NaturalParser,
}

impl NaturalFrontend {
    pub fn new(parser: NaturalParser) -> Self {
        Self { parser }
    }

    /// A parse-only validator sharing this frontend's limits.
    pub fn validator(&self) -> Validator<NaturalParser> {
        Validator::new(self.parser)
    }
}

impl RuleFrontend for NaturalFrontend {
    fn name(&self) -> &'static str {
        "natural"
    }

    fn extensions(&self) -> &[&str] {
        &["rule"]
    }

    fn build(&self, input: &str) -> Result<Rule, RuleError> {
        let ast = self.parser.parse(input)?;
        let condition = NaturalCompiler.compile(&ast)?;
        Ok(Rule::new(condition).with_source(RuleSource::Grammar {
            grammar: self.name().to_owned(),
            file: None,
        }))
    }

    fn to_source(&self, rule: &Rule) -> Result<String, RuleError> {
        NaturalSerializer.serialize(&rule.condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_rules::{Context, ParseLimits};

    #[test]
    fn build_and_render() {
        let frontend = NaturalFrontend::default();
        let rule = frontend
            .build(r#"age is at least 21 and country is one of "US", "CA""#)
            .unwrap();

        let ctx = Context::from_json(serde_json::json!({"age": 30, "country": "CA"}));
        assert!(rule.evaluate(&ctx).unwrap());
        assert_eq!(
            frontend.to_source(&rule).unwrap(),
            r#"age is greater than or equal to 21 and country is one of "US", "CA""#
        );
    }

    #[test]
    fn validator_reports_position_without_compiling() {
        let validator = NaturalFrontend::default().validator();
        assert!(validator.validate("age is a unicorn"));

        let result = validator.validate_with_errors("age is greater than");
        assert!(!result.valid);
        assert_eq!(result.errors[0].position, Some(19));
        assert!(result.errors[0].context.is_some());
    }

    #[test]
    fn limits_apply_to_build() {
        let frontend = NaturalFrontend::new(NaturalParser::with_limits(ParseLimits {
            max_input_len: 8,
            ..ParseLimits::default()
        }));
        assert!(matches!(
            frontend.build("age is at least 21"),
            Err(RuleError::Syntax { .. })
        ));
    }

    #[test]
    fn claims_only_rule_files() {
        assert_eq!(NaturalFrontend::default().extensions(), &["rule"]);
    }

    #[test]
    fn parse_file_names_rule() {
        let dir = std::env::temp_dir().join(format!("verity-natural-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("adults.rule");
        std::fs::write(&path, "age is at least 18\n").unwrap();

        let rules = NaturalFrontend::default().parse_file(&path).unwrap();
        assert_eq!(rules[0].name, "adults");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
