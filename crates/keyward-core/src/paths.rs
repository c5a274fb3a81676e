//! Standard paths used by Keyward tools

use std::path::PathBuf;

/// Standard Keyward paths
pub struct Paths {
    /// Config directory (~/.config/keyward), also home of the vault files
    pub config: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

impl Paths {
    pub fn new() -> Self {
        let config = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("keyward");

        Self { config }
    }

    /// Rooted at an arbitrary directory (tests, portable installs)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: root.join("config"),
        }
    }

    /// Default location of the config file
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.json")
    }

    /// Password-derived vault blob
    pub fn vault_file(&self) -> PathBuf {
        self.config.join("vault.enc")
    }

    /// Legacy service/username store
    pub fn legacy_file(&self) -> PathBuf {
        self.config.join("passwords.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_root() {
        let paths = Paths::with_root("/tmp/kw");
        assert_eq!(paths.config, PathBuf::from("/tmp/kw/config"));
        assert_eq!(paths.vault_file(), PathBuf::from("/tmp/kw/config/vault.enc"));
        assert_eq!(
            paths.legacy_file(),
            PathBuf::from("/tmp/kw/config/passwords.json")
        );
    }

    #[test]
    fn test_default_paths_end_in_keyward() {
        let paths = Paths::new();
        assert!(paths.config.ends_with("keyward"));
    }
}
