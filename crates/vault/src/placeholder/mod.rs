//! Placeholder resolution for configuration trees
//!
//! Configuration files reference secrets as `${{vault:name}}`,
//! `${{env:NAME}}` or `${{value:literal}}` inside string values. The
//! resolver walks a JSON tree and either reports what is missing or returns
//! a copy with every placeholder substituted.

mod resolver;
pub mod token;

pub use resolver::{extract_placeholders, resolve_placeholders, Resolver};
pub use token::{has_placeholders, Placeholder, Source};

use crate::error::{Result, VaultError};
use crate::store::{Credentials, Vault};
use tracing::debug;

/// Anything vault placeholders can be looked up in
pub trait CredentialSource {
    fn get_credential(&self, name: &str) -> Result<String>;

    fn has_credential(&self, name: &str) -> bool;

    /// Names from `names` that are not present, in input order
    fn missing_credentials(&self, names: &[&str]) -> Vec<String> {
        names
            .iter()
            .filter(|name| !self.has_credential(name))
            .map(|name| name.to_string())
            .collect()
    }
}

impl CredentialSource for Vault {
    fn get_credential(&self, name: &str) -> Result<String> {
        Vault::get_credential(self, name)
    }

    fn has_credential(&self, name: &str) -> bool {
        Vault::has_credential(self, name)
    }

    // One unlock for the whole batch instead of one per name
    fn missing_credentials(&self, names: &[&str]) -> Vec<String> {
        if names.is_empty() {
            return Vec::new();
        }
        match self.unlock() {
            Ok(credentials) => credentials.missing_credentials(names),
            Err(e) => {
                debug!(error = %e, "vault unavailable, treating all credentials as missing");
                names.iter().map(|name| name.to_string()).collect()
            }
        }
    }
}

impl CredentialSource for Credentials {
    fn get_credential(&self, name: &str) -> Result<String> {
        self.get(name)
            .map(str::to_string)
            .ok_or_else(|| VaultError::CredentialNotFound(name.to_string()))
    }

    fn has_credential(&self, name: &str) -> bool {
        self.contains(name)
    }
}
