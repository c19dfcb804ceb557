use serde::Deserialize;

use crate::error::RuleError;

fn default_max_depth() -> usize {
    64
}

fn default_max_input_len() -> usize {
    65_536
}

/// Resource limits every parser enforces.
///
/// Loaded from a TOML table:
///
/// ```toml
/// max_depth = 32
/// max_input_len = 4096
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ParseLimits {
    /// Maximum nesting depth of groups or sub-documents.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Maximum input length in bytes.
    #[serde(default = "default_max_input_len")]
    pub max_input_len: usize,
}

impl Default for ParseLimits {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_input_len: default_max_input_len(),
        }
    }
}

impl ParseLimits {
    /// Parse limits from TOML. Missing keys take their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, RuleError> {
        toml::from_str(text).map_err(|e| RuleError::Config(e.to_string()))
    }

    /// Fail when `input` is longer than allowed.
    pub fn check_len(&self, input: &str) -> Result<(), RuleError> {
        if input.len() > self.max_input_len {
            return Err(RuleError::syntax(
                format!(
                    "input of {} bytes exceeds limit of {}",
                    input.len(),
                    self.max_input_len
                ),
                input,
                None,
            ));
        }
        Ok(())
    }

    /// Fail when `depth` exceeds the nesting limit. `position` is the
    /// character offset where the too-deep group starts, if known.
    pub fn check_depth(
        &self,
        depth: usize,
        input: &str,
        position: Option<usize>,
    ) -> Result<(), RuleError> {
        if depth > self.max_depth {
            return Err(RuleError::syntax(
                format!("nesting depth exceeds limit of {}", self.max_depth),
                input,
                position,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let limits = ParseLimits::default();
        assert_eq!(limits.max_depth, 64);
        assert_eq!(limits.max_input_len, 65_536);
    }

    #[test]
    fn from_toml_partial() {
        let limits = ParseLimits::from_toml_str("max_depth = 8").unwrap();
        assert_eq!(limits.max_depth, 8);
        assert_eq!(limits.max_input_len, 65_536);
    }

    #[test]
    fn from_toml_invalid() {
        let err = ParseLimits::from_toml_str("max_depth = \"deep\"").unwrap_err();
        assert!(matches!(err, RuleError::Config(_)));
    }

    #[test]
    fn limits_are_enforced() {
        let limits = ParseLimits {
            max_depth: 2,
            max_input_len: 4,
        };
        assert!(limits.check_len("abcd").is_ok());
        assert!(matches!(limits.check_len("abcde"), Err(RuleError::Syntax { .. })));
        assert!(limits.check_depth(2, "", None).is_ok());
        assert!(limits.check_depth(3, "((()))", Some(2)).is_err());
    }
}
