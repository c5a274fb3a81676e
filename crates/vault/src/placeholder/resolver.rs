use super::token::{self, Placeholder, Source};
use super::CredentialSource;
use crate::error::ResolveError;
use keyward_core::EnvSource;
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::debug;

/// Walks configuration trees against a credential source and an environment
pub struct Resolver<'a> {
    credentials: &'a dyn CredentialSource,
    env: &'a dyn EnvSource,
}

impl<'a> Resolver<'a> {
    pub fn new(credentials: &'a dyn CredentialSource, env: &'a dyn EnvSource) -> Self {
        Self { credentials, env }
    }

    /// Resolve a single placeholder to its value
    pub fn resolve_placeholder(&self, placeholder: &Placeholder) -> Result<String, ResolveError> {
        match &placeholder.source {
            Source::Vault => Ok(self.credentials.get_credential(&placeholder.key)?),
            Source::Env => self
                .env
                .var(&placeholder.key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ResolveError::EnvVarMissing(placeholder.key.clone())),
            Source::Value => Ok(placeholder.key.clone()),
            Source::Unknown(source) => Err(ResolveError::UnknownSource(source.clone())),
        }
    }

    /// Substitute every placeholder in `s`. Substituted text is not scanned
    /// again, so a secret that happens to contain `${{...}}` stays literal.
    pub fn resolve_str(&self, s: &str) -> Result<String, ResolveError> {
        let mut out = String::with_capacity(s.len());
        let mut last = 0;
        for caps in token::pattern().captures_iter(s) {
            let (Some(whole), Some(reference)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            out.push_str(&s[last..whole.start()]);
            out.push_str(&self.resolve_placeholder(&Placeholder::parse(reference.as_str()))?);
            last = whole.end();
        }
        out.push_str(&s[last..]);
        Ok(out)
    }

    /// Copy of `tree` with every placeholder substituted. Any failure fails
    /// the whole call.
    pub fn resolve(&self, tree: &Value) -> Result<Value, ResolveError> {
        match tree {
            Value::String(s) if token::has_placeholders(s) => Ok(Value::String(self.resolve_str(s)?)),
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) => {
                let mut resolved = serde_json::Map::with_capacity(map.len());
                for (key, value) in map {
                    resolved.insert(key.clone(), self.resolve(value)?);
                }
                Ok(Value::Object(resolved))
            }
            other => Ok(other.clone()),
        }
    }

    /// Requirements of `tree` that cannot currently be satisfied, sorted.
    ///
    /// Vault keys are reported bare, everything else as `source:key`. Nothing
    /// is decrypted beyond a presence check.
    pub fn validate_credentials(&self, tree: &Value) -> Vec<String> {
        let placeholders = extract_placeholders(tree);

        let vault_keys: Vec<&str> = placeholders
            .iter()
            .filter(|p| p.source == Source::Vault)
            .map(|p| p.key.as_str())
            .collect();
        let mut missing: BTreeSet<String> =
            self.credentials.missing_credentials(&vault_keys).into_iter().collect();

        for placeholder in &placeholders {
            let satisfied = match &placeholder.source {
                Source::Vault | Source::Value => true,
                Source::Env => self.env.is_set(&placeholder.key),
                Source::Unknown(_) => false,
            };
            if !satisfied {
                missing.insert(placeholder.requirement());
            }
        }

        debug!(required = placeholders.len(), missing = missing.len(), "validated placeholders");
        missing.into_iter().collect()
    }
}

/// Every distinct placeholder referenced anywhere in `tree`
pub fn extract_placeholders(tree: &Value) -> BTreeSet<Placeholder> {
    let mut found = BTreeSet::new();
    collect(tree, &mut found);
    found
}

fn collect(tree: &Value, found: &mut BTreeSet<Placeholder>) {
    match tree {
        Value::String(s) => found.extend(token::scan(s)),
        Value::Array(items) => items.iter().for_each(|item| collect(item, found)),
        Value::Object(map) => map.values().for_each(|value| collect(value, found)),
        _ => {}
    }
}

/// Resolve `tree` in one call
pub fn resolve_placeholders(
    tree: &Value,
    credentials: &dyn CredentialSource,
    env: &dyn EnvSource,
) -> Result<Value, ResolveError> {
    Resolver::new(credentials, env).resolve(tree)
}
