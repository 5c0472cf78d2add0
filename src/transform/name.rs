//! Entry name derivation.

use std::fmt;
use std::sync::Arc;
use regex::Regex;
use crate::utils::{ConfigError, NameTransformError};

/// Signature of a caller-supplied name transformer.
pub type NameFn = dyn Fn(&str) -> anyhow::Result<String> + Send + Sync;

/// Maps a file's base name (extension included) to its entry name.
#[derive(Clone, Default)]
pub enum NameTransformer {
    /// Returns the base name unchanged
    #[default]
    Identity,
    /// Concatenates every capture group of the first match
    Pattern(Regex),
    /// Arbitrary mapping; failures propagate unchanged
    Custom(Arc<NameFn>),
}

impl NameTransformer {
    /// Compiles `pattern` into a [`NameTransformer::Pattern`].
    pub fn pattern(pattern: &str) -> Result<Self, ConfigError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|source| ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    pub fn apply(&self, name: &str) -> Result<String, NameTransformError> {
        match self {
            Self::Identity => Ok(name.to_string()),
            Self::Pattern(regex) => {
                let captures = regex.captures(name).ok_or_else(|| NameTransformError::NoMatch {
                    pattern: regex.as_str().to_string(),
                    input: name.to_string(),
                })?;
                // Groups that did not participate contribute nothing
                Ok(captures
                    .iter()
                    .skip(1)
                    .map(|group| group.map_or("", |m| m.as_str()))
                    .collect())
            }
            Self::Custom(f) => f(name).map_err(NameTransformError::Custom),
        }
    }
}

impl fmt::Debug for NameTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_returns_input() {
        for name in ["degree53.png", "", "no-extension", "über.svg"] {
            assert_eq!(NameTransformer::Identity.apply(name).unwrap(), name);
        }
    }

    #[test]
    fn pattern_strips_extension() {
        let transformer = NameTransformer::pattern(r"(.*?)\.[^.]+").unwrap();
        assert_eq!(transformer.apply("degree53.png").unwrap(), "degree53");
        assert_eq!(transformer.apply("archive.tar.gz").unwrap(), "archive");
    }

    #[test]
    fn pattern_concatenates_groups_in_order() {
        let transformer = NameTransformer::pattern(r"^icon-(\w+)-(\d+)(x)?\.png$").unwrap();
        assert_eq!(transformer.apply("icon-home-32.png").unwrap(), "home32");
        assert_eq!(transformer.apply("icon-home-32x.png").unwrap(), "home32x");
    }

    #[test]
    fn pattern_without_match_names_pattern_and_input() {
        let transformer = NameTransformer::pattern(r"(.*?)\.[^.]+").unwrap();
        let err = transformer.apply("README").unwrap_err();
        match err {
            NameTransformError::NoMatch { pattern, input } => {
                assert_eq!(pattern, r"(.*?)\.[^.]+");
                assert_eq!(input, "README");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = NameTransformer::pattern("(unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { .. }));
    }

    #[test]
    fn custom_function_and_its_failures() {
        let constant = NameTransformer::custom(|_| Ok("hello world".to_string()));
        assert_eq!(constant.apply("degree53.png").unwrap(), "hello world");

        let failing = NameTransformer::custom(|name| anyhow::bail!("rejected {name}"));
        assert_eq!(failing.apply("a.png").unwrap_err().to_string(), "rejected a.png");
    }
}
