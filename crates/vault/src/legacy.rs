//! Legacy service/username password store
//!
//! Older installs kept credentials as a plain JSON list of entries, each with
//! its password encrypted under a generated 256-bit key held in the keychain.
//! The store stays readable and writable so existing data can be migrated
//! into the password vault with `vault migrate`.

use crate::crypto::{self, SealedField};
use crate::error::{Result, VaultError};
use crate::keys::{KeyProvider, MasterKey};
use crate::store::{write_private, Vault};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LegacyFile {
    #[serde(default)]
    entries: Vec<LegacyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyEntry {
    service: String,
    username: String,
    #[serde(rename = "encrypted_password")]
    encrypted_password: String,
    iv: String,
    auth_tag: String,
    created_at: DateTime<Utc>,
    last_modified: DateTime<Utc>,
}

impl LegacyEntry {
    fn matches(&self, service: &str, username: &str) -> bool {
        self.service == service && self.username == username
    }

    fn sealed(&self) -> SealedField {
        SealedField {
            ciphertext: self.encrypted_password.clone(),
            iv: self.iv.clone(),
            tag: self.auth_tag.clone(),
        }
    }

    fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            service: self.service.clone(),
            username: self.username.clone(),
            created_at: self.created_at,
            last_modified: self.last_modified,
        }
    }
}

/// Public view of an entry. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub service: String,
    pub username: String,
    pub created_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl EntryMetadata {
    /// Name the entry takes in the password vault
    pub fn vault_name(&self) -> String {
        format!("{}/{}", self.service, self.username)
    }
}

/// The legacy store
pub struct LegacyStore {
    path: PathBuf,
    keys: KeyProvider,
}

impl LegacyStore {
    pub fn new(path: impl Into<PathBuf>, keys: KeyProvider) -> Self {
        Self {
            path: path.into(),
            keys,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Ensure the store key exists
    pub fn init(&self) -> Result<MasterKey> {
        self.keys.get_or_create_key()
    }

    fn load(&self) -> Result<LegacyFile> {
        if !self.exists() {
            return Ok(LegacyFile::default());
        }
        let content = fs::read(&self.path)?;
        serde_json::from_slice(&content).map_err(|_| VaultError::Decryption)
    }

    fn save(&self, file: &LegacyFile) -> Result<()> {
        let content = serde_json::to_string_pretty(file)
            .map_err(|e| VaultError::Encryption(e.to_string()))?;
        write_private(&self.path, content.as_bytes())
    }

    fn require(field: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(VaultError::Validation(format!("{} is required", field)));
        }
        Ok(())
    }

    /// Add or replace the password for `(service, username)`
    pub fn add_or_update(&self, service: &str, username: &str, password: &str) -> Result<EntryMetadata> {
        Self::require("service", service)?;
        Self::require("username", username)?;
        Self::require("password", password)?;

        let key = self.keys.get_or_create_key()?;
        let mut file = self.load()?;
        let sealed = crypto::seal_field(password, key.as_bytes())?;
        let now = Utc::now();

        let existing = file.entries.iter().position(|e| e.matches(service, username));
        let entry = LegacyEntry {
            service: service.to_string(),
            username: username.to_string(),
            encrypted_password: sealed.ciphertext,
            iv: sealed.iv,
            auth_tag: sealed.tag,
            created_at: existing.map_or(now, |i| file.entries[i].created_at),
            last_modified: now,
        };
        let metadata = entry.metadata();

        match existing {
            Some(i) => file.entries[i] = entry,
            None => file.entries.push(entry),
        }
        self.save(&file)?;

        debug!(service, username, "legacy entry stored");
        Ok(metadata)
    }

    /// Decrypt the password for `(service, username)`
    pub fn get(&self, service: &str, username: &str) -> Result<String> {
        Self::require("service", service)?;
        Self::require("username", username)?;

        let key = self.keys.find_key()?;
        let file = self.load()?;
        let entry = file
            .entries
            .iter()
            .find(|e| e.matches(service, username))
            .ok_or_else(|| not_found(service, username))?;
        crypto::open_field(&entry.sealed(), key.as_bytes())
    }

    /// Metadata for every entry; nothing is decrypted
    pub fn list(&self) -> Result<Vec<EntryMetadata>> {
        Ok(self.load()?.entries.iter().map(LegacyEntry::metadata).collect())
    }

    /// Remove the entry for `(service, username)`
    pub fn delete(&self, service: &str, username: &str) -> Result<()> {
        Self::require("service", service)?;
        Self::require("username", username)?;

        let mut file = self.load()?;
        let before = file.entries.len();
        file.entries.retain(|e| !e.matches(service, username));
        if file.entries.len() == before {
            return Err(not_found(service, username));
        }
        self.save(&file)
    }

    /// Drop every entry
    pub fn clear(&self) -> Result<()> {
        self.save(&LegacyFile::default())
    }

    /// Copy every entry into `vault` as `service/username`, in one vault write.
    /// Returns the names imported. Fails with `NoKeyAvailable` rather than
    /// generating a key when the store key is missing.
    pub fn migrate_into(&self, vault: &Vault) -> Result<Vec<String>> {
        let file = self.load()?;
        if file.entries.is_empty() {
            return Ok(Vec::new());
        }

        let key = self.keys.find_key()?;
        let mut plain = Vec::with_capacity(file.entries.len());
        for entry in &file.entries {
            let password = crypto::open_field(&entry.sealed(), key.as_bytes())?;
            plain.push((entry.metadata().vault_name(), zeroize::Zeroizing::new(password)));
        }

        let names = vault.update(|credentials| {
            let mut names = Vec::with_capacity(plain.len());
            for (name, password) in &plain {
                credentials.insert(name.as_str(), password.trim());
                names.push(name.clone());
            }
            Ok(names)
        })?;

        debug!(count = names.len(), "legacy entries migrated");
        Ok(names)
    }
}

fn not_found(service: &str, username: &str) -> VaultError {
    VaultError::NotFound {
        service: service.to_string(),
        username: username.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyStore, MemoryKeyStore};
    use keyward_core::MapEnv;
    use tempfile::TempDir;

    fn provider(store: MemoryKeyStore) -> KeyProvider {
        KeyProvider::new(Box::new(store), Box::new(MapEnv::new()), "UNUSED")
    }

    fn temp_store() -> (LegacyStore, MemoryKeyStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let keystore = MemoryKeyStore::new();
        let store = LegacyStore::new(dir.path().join("passwords.json"), provider(keystore.clone()));
        (store, keystore, dir)
    }

    #[test]
    fn test_init_is_idempotent() {
        let (store, keystore, _dir) = temp_store();
        let a = store.init().unwrap();
        let b = store.init().unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
        assert!(keystore.has());
    }

    #[test]
    fn test_add_get() {
        let (store, _ks, _dir) = temp_store();
        let meta = store.add_or_update("github", "octocat", "pass\"word'1").unwrap();
        assert_eq!(meta.service, "github");
        assert_eq!(meta.username, "octocat");
        assert_eq!(store.get("github", "octocat").unwrap(), "pass\"word'1");
    }

    #[test]
    fn test_update_preserves_created_at() {
        let (store, _ks, _dir) = temp_store();
        let first = store.add_or_update("svc", "user", "one").unwrap();
        let second = store.add_or_update("svc", "user", "two").unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert!(second.last_modified >= first.last_modified);
        assert_eq!(store.list().unwrap().len(), 1);
        assert_eq!(store.get("svc", "user").unwrap(), "two");
    }

    #[test]
    fn test_required_fields() {
        let (store, _ks, _dir) = temp_store();
        assert!(matches!(store.add_or_update("", "u", "p"), Err(VaultError::Validation(_))));
        assert!(matches!(store.add_or_update("s", "", "p"), Err(VaultError::Validation(_))));
        assert!(matches!(store.add_or_update("s", "u", ""), Err(VaultError::Validation(_))));
    }

    #[test]
    fn test_missing_entry() {
        let (store, _ks, _dir) = temp_store();
        assert!(matches!(store.get("svc", "nobody"), Err(VaultError::NotFound { .. })));
        assert!(matches!(store.delete("svc", "nobody"), Err(VaultError::NotFound { .. })));
    }

    #[test]
    fn test_list_has_no_secret_material() {
        let (store, _ks, _dir) = temp_store();
        store.add_or_update("a", "u1", "p1").unwrap();
        store.add_or_update("b", "u2", "p2").unwrap();

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 2);
        let json = serde_json::to_string(&listed).unwrap();
        assert!(!json.contains("encrypted_password"));
        assert!(!json.contains("authTag"));
    }

    #[test]
    fn test_file_format() {
        let (store, _ks, _dir) = temp_store();
        store.add_or_update("svc", "user", "hunter22").unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(!raw.contains("hunter22"));
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let entry = &value["entries"][0];
        for field in ["service", "username", "encrypted_password", "iv", "authTag", "createdAt", "lastModified"] {
            assert!(entry.get(field).is_some(), "missing {}", field);
        }
    }

    #[test]
    fn test_malformed_file_is_decryption_error() {
        let (store, _ks, _dir) = temp_store();
        fs::write(store.path(), [0xff, 0xfe, 0x00, 0x80]).unwrap();

        assert!(matches!(store.list(), Err(VaultError::Decryption)));
    }

    #[test]
    fn test_delete_and_clear() {
        let (store, _ks, _dir) = temp_store();
        store.add_or_update("a", "u", "p").unwrap();
        store.add_or_update("b", "u", "p").unwrap();

        store.delete("a", "u").unwrap();
        assert_eq!(store.list().unwrap().len(), 1);

        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
        assert!(store.exists());
    }

    #[test]
    fn test_wrong_key_fails_closed() {
        let (store, _ks, dir) = temp_store();
        store.add_or_update("svc", "user", "secret").unwrap();

        let other = LegacyStore::new(dir.path().join("passwords.json"), provider(MemoryKeyStore::new()));
        other.init().unwrap();
        assert!(matches!(other.get("svc", "user"), Err(VaultError::Decryption)));
    }

    #[test]
    fn test_get_without_key_does_not_create_one() {
        let (store, _ks, dir) = temp_store();
        store.add_or_update("svc", "user", "secret").unwrap();

        let empty = MemoryKeyStore::new();
        let other = LegacyStore::new(dir.path().join("passwords.json"), provider(empty.clone()));
        assert!(matches!(other.get("svc", "user"), Err(VaultError::NoKeyAvailable { .. })));
        assert!(!empty.has());
    }

    #[test]
    fn test_migrate_without_key_leaves_store_empty() {
        let (store, _ks, dir) = temp_store();
        store.add_or_update("github", "octocat", "gh-pass").unwrap();

        let vault_keys = KeyProvider::new(
            Box::new(MemoryKeyStore::with_secret("master")),
            Box::new(MapEnv::new()),
            "UNUSED",
        );
        let vault = Vault::new(dir.path().join("vault.enc"), vault_keys).with_iterations(10);
        vault.create(&MasterKey::from_passphrase("master")).unwrap();

        let empty = MemoryKeyStore::new();
        let orphaned = LegacyStore::new(store.path(), provider(empty.clone()));
        assert!(matches!(orphaned.migrate_into(&vault), Err(VaultError::NoKeyAvailable { .. })));
        assert!(!empty.has());
        assert!(vault.list_credentials().unwrap().is_empty());
    }

    #[test]
    fn test_migrate_into_vault() {
        let (store, _ks, dir) = temp_store();
        store.add_or_update("github", "octocat", "gh-pass").unwrap();
        store.add_or_update("gmail", "me", "mail-pass").unwrap();

        let vault_keys = KeyProvider::new(
            Box::new(MemoryKeyStore::with_secret("master")),
            Box::new(MapEnv::new()),
            "UNUSED",
        );
        let vault = Vault::new(dir.path().join("vault.enc"), vault_keys).with_iterations(10);
        vault.create(&MasterKey::from_passphrase("master")).unwrap();

        let names = store.migrate_into(&vault).unwrap();
        assert_eq!(names, vec!["github/octocat".to_string(), "gmail/me".to_string()]);
        assert_eq!(vault.get_credential("github/octocat").unwrap(), "gh-pass");
        assert_eq!(vault.get_credential("gmail/me").unwrap(), "mail-pass");
    }
}
