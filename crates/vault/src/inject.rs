//! Credentials into a child process environment
//!
//! Builds the variable map only. Spawning is left to the caller so nothing
//! here touches the current process environment.

use crate::error::{Result, VaultError};
use crate::placeholder::CredentialSource;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use zeroize::Zeroize;

/// Environment variable name for a credential: `api/openai` -> `API_OPENAI`
pub fn env_name(credential: &str) -> String {
    credential
        .chars()
        .map(|c| match c {
            '/' | '-' | '.' | ' ' => '_',
            c => c.to_ascii_uppercase(),
        })
        .collect()
}

/// `VAR=credential`, or a bare credential name using its derived variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    pub var: String,
    pub credential: String,
}

impl Mapping {
    pub fn new(var: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            credential: credential.into(),
        }
    }

    pub fn derived(credential: &str) -> Self {
        Self::new(env_name(credential), credential)
    }
}

impl FromStr for Mapping {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self> {
        let mapping = match s.split_once('=') {
            Some((var, credential)) => Mapping::new(var.trim(), credential.trim()),
            None => Mapping::derived(s.trim()),
        };

        if mapping.var.is_empty() || mapping.credential.is_empty() {
            return Err(VaultError::Validation(format!(
                "invalid mapping '{}': expected VAR=credential",
                s
            )));
        }
        if mapping.var.contains(['=', '\0']) {
            return Err(VaultError::Validation(format!(
                "invalid environment variable name '{}'",
                mapping.var
            )));
        }
        Ok(mapping)
    }
}

impl fmt::Display for Mapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.var, self.credential)
    }
}

/// Result of loading a set of mappings
#[derive(Default)]
pub struct Injection {
    /// Variables ready for the child, by name
    pub vars: BTreeMap<String, String>,
    /// Mappings that could not be loaded, with the reason
    pub failed: Vec<(Mapping, VaultError)>,
}

impl Injection {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl Drop for Injection {
    fn drop(&mut self) {
        for value in self.vars.values_mut() {
            value.zeroize();
        }
    }
}

/// Look up every mapping in `source`. A failed lookup is recorded and the
/// rest still load.
pub fn collect_env(source: &dyn CredentialSource, mappings: &[Mapping]) -> Injection {
    let mut injection = Injection::default();
    for mapping in mappings {
        match source.get_credential(&mapping.credential) {
            Ok(value) => {
                if let Some(mut old) = injection.vars.insert(mapping.var.clone(), value) {
                    old.zeroize();
                }
            }
            Err(e) => injection.failed.push((mapping.clone(), e)),
        }
    }
    injection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Credentials;

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("api/openai"), "API_OPENAI");
        assert_eq!(env_name("db/postgres-main"), "DB_POSTGRES_MAIN");
        assert_eq!(env_name("gmail_password"), "GMAIL_PASSWORD");
    }

    #[test]
    fn test_parse_mapping() {
        let m: Mapping = "OPENAI_API_KEY=api/openai".parse().unwrap();
        assert_eq!(m, Mapping::new("OPENAI_API_KEY", "api/openai"));

        let m: Mapping = "api/openai".parse().unwrap();
        assert_eq!(m, Mapping::new("API_OPENAI", "api/openai"));

        // Only the first '=' splits
        let m: Mapping = "X=a=b".parse().unwrap();
        assert_eq!(m.credential, "a=b");

        assert!("=api/openai".parse::<Mapping>().is_err());
        assert!("VAR=".parse::<Mapping>().is_err());
        assert!("".parse::<Mapping>().is_err());
    }

    #[test]
    fn test_collect_env_reports_failures() {
        let mut credentials = Credentials::new();
        credentials.insert("api/openai", "sk-123");

        let injection = collect_env(
            &credentials,
            &[
                Mapping::new("OPENAI_API_KEY", "api/openai"),
                Mapping::new("MISSING", "api/none"),
            ],
        );

        assert!(!injection.is_complete());
        assert_eq!(injection.vars.get("OPENAI_API_KEY").map(String::as_str), Some("sk-123"));
        assert_eq!(injection.failed.len(), 1);
        assert_eq!(injection.failed[0].0.var, "MISSING");
        assert!(matches!(injection.failed[0].1, VaultError::CredentialNotFound(_)));
    }

    #[test]
    fn test_collect_env_later_mapping_wins() {
        let mut credentials = Credentials::new();
        credentials.insert("a", "1");
        credentials.insert("b", "2");

        let injection = collect_env(&credentials, &[Mapping::new("X", "a"), Mapping::new("X", "b")]);
        assert!(injection.is_complete());
        assert_eq!(injection.vars.len(), 1);
        assert_eq!(injection.vars["X"], "2");
    }
}
