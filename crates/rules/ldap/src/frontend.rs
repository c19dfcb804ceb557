//! LDAP rule frontend. Each `.ldap` or `.filter` file holds one filter.

use verity_rules::{
    Compiler, Parser, Rule, RuleError, RuleFrontend, RuleSource, Serializer, Validator,
};

use crate::compiler::LdapCompiler;
use crate::parser::LdapParser;
use crate::serializer::LdapSerializer;

/// A [`RuleFrontend`] for LDAP search filters.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapFrontend {
    parser: LdapParser,
}

impl LdapFrontend {
    pub fn new(parser: LdapParser) -> Self {
        Self { parser }
    }

    pub fn validator(&self) -> Validator<LdapParser> {
        Validator::new(self.parser)
    }
}

impl RuleFrontend for LdapFrontend {
    fn name(&self) -> &'static str {
        "ldap"
    }

    fn extensions(&self) -> &[&str] {
        &["ldap", "filter"]
    }

    fn build(&self, input: &str) -> Result<Rule, RuleError> {
        let ast = self.parser.parse(input)?;
        let condition = LdapCompiler.compile(&ast)?;
        Ok(Rule::new(condition).with_source(RuleSource::Grammar {
            grammar: self.name().to_owned(),
            file: None,
        }))
    }

    fn to_source(&self, rule: &Rule) -> Result<String, RuleError> {
        LdapSerializer.serialize(&rule.condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use verity_rules::Context;

    #[test]
    fn build_evaluate_render() {
        let frontend = LdapFrontend::default();
        let rule = frontend.build("(&(age>=18)(country=US))").unwrap();

        let ctx = Context::from_json(serde_json::json!({"age": 25, "country": "CA"}));
        assert!(!rule.evaluate(&ctx).unwrap());
        assert_eq!(frontend.to_source(&rule).unwrap(), "(&(age>=18)(country=US))");
    }

    #[test]
    fn validator_skips_compilation() {
        let validator = LdapFrontend::default().validator();
        assert!(validator.validate("(cn~=ada)"));

        let result = validator.validate_with_errors("(&(age>=18)(country=US)");
        assert!(!result.valid);
        assert_eq!(result.errors[0].position, Some(23));
    }

    #[test]
    fn parse_file_names_rule() {
        let dir = std::env::temp_dir().join(format!("verity-ldap-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("staff.filter");
        std::fs::write(&path, "(&(department=*)(!(status=left)))\n").unwrap();

        let rules = LdapFrontend::default().parse_file(&path).unwrap();
        assert_eq!(rules[0].name, "staff");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
