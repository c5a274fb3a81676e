//! Placeholder token grammar
//!
//! `${{source:key}}` where source is `vault`, `env` or `value`. A bare
//! `${{key}}` means `vault:key`. Only the first colon splits, so
//! `${{value:https://x}}` keeps its URL intact.

use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// Where a placeholder's value comes from
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    /// Looked up in the credential vault
    Vault,
    /// Read from the environment
    Env,
    /// The key text itself, for non-secret literals
    Value,
    /// Anything else; fails on resolution
    Unknown(String),
}

impl Source {
    pub fn parse(s: &str) -> Self {
        match s {
            "vault" => Self::Vault,
            "env" => Self::Env,
            "value" => Self::Value,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Vault => "vault",
            Self::Env => "env",
            Self::Value => "value",
            Self::Unknown(s) => s.as_str(),
        }
    }
}

/// A parsed `source:key` reference
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Placeholder {
    pub source: Source,
    pub key: String,
}

impl Placeholder {
    /// Parse the text between the delimiters
    pub fn parse(reference: &str) -> Self {
        match reference.split_once(':') {
            Some((source, key)) => Self {
                source: Source::parse(source.trim()),
                key: key.trim().to_string(),
            },
            None => Self {
                source: Source::Vault,
                key: reference.trim().to_string(),
            },
        }
    }

    /// How a missing requirement is reported: vault keys bare, everything
    /// else qualified with its source
    pub fn requirement(&self) -> String {
        match self.source {
            Source::Vault => self.key.clone(),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source.as_str(), self.key)
    }
}

/// `${{ ... }}`, capturing everything up to the first `}`
pub(crate) fn pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{\{([^}]+)\}\}").unwrap())
}

/// Whether `s` contains at least one placeholder
pub fn has_placeholders(s: &str) -> bool {
    pattern().is_match(s)
}

/// Every placeholder in `s`, in order of appearance
pub fn scan(s: &str) -> impl Iterator<Item = Placeholder> + '_ {
    pattern()
        .captures_iter(s)
        .map(|caps| Placeholder::parse(&caps[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sources() {
        assert_eq!(
            Placeholder::parse("vault:gmail_email"),
            Placeholder { source: Source::Vault, key: "gmail_email".into() }
        );
        assert_eq!(Placeholder::parse("env:API_KEY").source, Source::Env);
        assert_eq!(Placeholder::parse("value:true").source, Source::Value);
        assert_eq!(
            Placeholder::parse("secret:x").source,
            Source::Unknown("secret".into())
        );
    }

    #[test]
    fn test_shorthand_defaults_to_vault() {
        let p = Placeholder::parse(" gmail_email ");
        assert_eq!(p.source, Source::Vault);
        assert_eq!(p.key, "gmail_email");
    }

    #[test]
    fn test_splits_on_first_colon_only() {
        let p = Placeholder::parse("value:https://example.com:8443/x");
        assert_eq!(p.source, Source::Value);
        assert_eq!(p.key, "https://example.com:8443/x");
    }

    #[test]
    fn test_trims_both_halves() {
        let p = Placeholder::parse(" env : HOME ");
        assert_eq!(p.source, Source::Env);
        assert_eq!(p.key, "HOME");
    }

    #[test]
    fn test_display_and_requirement() {
        assert_eq!(Placeholder::parse("foo").to_string(), "vault:foo");
        assert_eq!(Placeholder::parse("foo").requirement(), "foo");
        assert_eq!(Placeholder::parse("env:BAR").requirement(), "env:BAR");
    }

    #[test]
    fn test_has_placeholders() {
        assert!(has_placeholders("${{x}}"));
        assert!(has_placeholders("prefix ${{env:A}} suffix"));
        assert!(!has_placeholders("plain"));
        assert!(!has_placeholders("${x}"));
        assert!(!has_placeholders("{{x}}"));
        assert!(!has_placeholders("${{}}"));
    }

    #[test]
    fn test_scan_in_order() {
        let found: Vec<String> = scan("${{value:a}}-${{env:B}}-${{c}}")
            .map(|p| p.to_string())
            .collect();
        assert_eq!(found, vec!["value:a", "env:B", "vault:c"]);
    }
}
