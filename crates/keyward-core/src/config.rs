//! Configuration management for Keyward tools
//!
//! Configuration lives in `~/.config/keyward/config.json`. Every field has a
//! default, so a missing file (or a partial one) is always valid. The
//! `KEYWARD_CONFIG` environment variable points at an alternative file.

use crate::env::EnvSource;
use crate::paths::Paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "KEYWARD_CONFIG";

/// Global Keyward configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Override for the password-derived vault blob
    #[serde(default)]
    pub vault_file: Option<PathBuf>,

    /// Override for the legacy service/username store
    #[serde(default)]
    pub legacy_file: Option<PathBuf>,

    /// Keychain service holding the vault master password
    #[serde(default = "default_keychain_service")]
    pub keychain_service: String,

    /// Keychain service holding the legacy store's generated key
    #[serde(default = "default_legacy_keychain_service")]
    pub legacy_keychain_service: String,

    /// Keychain account for the legacy key; defaults to the service name
    #[serde(default)]
    pub legacy_keychain_account: Option<String>,

    /// Environment variable consulted when the keychain has no password
    #[serde(default = "default_master_password_env")]
    pub master_password_env: String,

    /// Minimum master password length accepted by `init`
    #[serde(default = "default_min_password_length")]
    pub min_password_length: usize,
}

fn default_keychain_service() -> String {
    "keyward-vault-master".to_string()
}

fn default_legacy_keychain_service() -> String {
    "keyward-master-key".to_string()
}

fn default_master_password_env() -> String {
    "VAULT_MASTER_PASSWORD".to_string()
}

fn default_min_password_length() -> usize {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            vault_file: None,
            legacy_file: None,
            keychain_service: default_keychain_service(),
            legacy_keychain_service: default_legacy_keychain_service(),
            legacy_keychain_account: None,
            master_password_env: default_master_password_env(),
            min_password_length: default_min_password_length(),
        }
    }
}

impl Config {
    /// Load config from the location selected by `KEYWARD_CONFIG` or the default path
    pub fn load(paths: &Paths, env: &dyn EnvSource) -> Result<Self> {
        let path = env
            .var(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| paths.config_file());
        Self::load_from(&path)
    }

    /// Load config from file
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {:?}", path))?;
            let config = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolved vault blob path
    pub fn vault_path(&self, paths: &Paths) -> PathBuf {
        self.vault_file.clone().unwrap_or_else(|| paths.vault_file())
    }

    /// Account the legacy key is stored under
    pub fn legacy_account(&self) -> &str {
        self.legacy_keychain_account
            .as_deref()
            .unwrap_or(&self.legacy_keychain_service)
    }

    /// Resolved legacy store path
    pub fn legacy_path(&self, paths: &Paths) -> PathBuf {
        self.legacy_file
            .clone()
            .unwrap_or_else(|| paths.legacy_file())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnv;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nope.json")).unwrap();
        assert_eq!(config.keychain_service, "keyward-vault-master");
        assert_eq!(config.master_password_env, "VAULT_MASTER_PASSWORD");
        assert_eq!(config.min_password_length, 8);
        assert!(config.vault_file.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"keychain_service": "custom"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.keychain_service, "custom");
        assert_eq!(config.legacy_keychain_service, "keyward-master-key");
    }

    #[test]
    fn test_env_override() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("elsewhere.json");
        let content = serde_json::json!({ "vault_file": dir.path().join("v.enc") });
        std::fs::write(&path, content.to_string()).unwrap();

        let env = MapEnv::from_pairs([(CONFIG_ENV, path.to_string_lossy().to_string())]);
        let paths = Paths::with_root(dir.path());
        let loaded = Config::load(&paths, &env).unwrap();
        assert_eq!(loaded.vault_path(&paths), dir.path().join("v.enc"));
        assert_eq!(loaded.legacy_path(&paths), paths.legacy_file());
    }

    #[test]
    fn test_legacy_account_defaults_to_service() {
        let mut config = Config::default();
        assert_eq!(config.legacy_account(), "keyward-master-key");

        config.legacy_keychain_account = Some("me".to_string());
        assert_eq!(config.legacy_account(), "me");
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
