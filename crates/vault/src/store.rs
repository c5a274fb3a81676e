//! Password vault - one encrypted blob holding every credential
//!
//! The blob is `base64(salt || iv || tag || AES-256-GCM(json))` where the
//! JSON is a flat `name -> value` object. Every mutation decrypts the whole
//! map, changes it, and writes a freshly salted blob back.
//!
//! There is no locking. Two processes saving at the same time each write a
//! complete blob, and the last rename wins.

use crate::crypto::{self, PBKDF2_ITERATIONS};
use crate::error::{Result, VaultError};
use crate::keys::{KeyProvider, MasterKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use zeroize::{Zeroize, Zeroizing};

/// Decrypted credential map. Values are wiped when dropped.
#[derive(Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if let Some(mut old) = self.0.insert(name.into(), value.into()) {
            old.zeroize();
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        match self.0.remove(name) {
            Some(mut old) => {
                old.zeroize();
                true
            }
            None => false,
        }
    }

    /// Credential names in sorted order
    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_json(&self) -> Result<Zeroizing<Vec<u8>>> {
        serde_json::to_vec(self)
            .map(Zeroizing::new)
            .map_err(|e| VaultError::Encryption(e.to_string()))
    }

    fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|_| VaultError::Decryption)
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        for value in self.0.values_mut() {
            value.zeroize();
        }
    }
}

/// The password vault
pub struct Vault {
    path: PathBuf,
    keys: KeyProvider,
    iterations: u32,
}

impl Vault {
    pub fn new(path: impl Into<PathBuf>, keys: KeyProvider) -> Self {
        Self {
            path: path.into(),
            keys,
            iterations: PBKDF2_ITERATIONS,
        }
    }

    /// Override the PBKDF2 round count. Blobs only open with the count they
    /// were written with, so this is for tests and benchmarks.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> &KeyProvider {
        &self.keys
    }

    /// Check if the vault file exists
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write an empty vault sealed with `key`, replacing any existing one
    pub fn create(&self, key: &MasterKey) -> Result<()> {
        self.save(&Credentials::new(), key)?;
        debug!(path = ?self.path, "vault created");
        Ok(())
    }

    /// Decrypt the vault with an already obtained key
    pub fn load(&self, key: &MasterKey) -> Result<Credentials> {
        if !self.exists() {
            return Err(VaultError::NotInitialized);
        }
        let raw = fs::read(&self.path)?;
        let blob = Zeroizing::new(String::from_utf8(raw).map_err(|_| VaultError::Decryption)?);
        let plain = crypto::open(&blob, key.as_bytes(), self.iterations)?;
        Credentials::from_json(&plain)
    }

    /// Encrypt and atomically replace the vault file
    pub fn save(&self, credentials: &Credentials, key: &MasterKey) -> Result<()> {
        let plain = credentials.to_json()?;
        let blob = crypto::seal(&plain, key.as_bytes(), self.iterations)?;
        write_private(&self.path, blob.as_bytes())
    }

    /// Fetch the key once and decrypt everything
    pub fn unlock(&self) -> Result<Credentials> {
        let key = self.keys.get_key()?;
        self.load(&key)
    }

    /// Read-modify-write under a single key fetch
    pub fn update<R>(&self, f: impl FnOnce(&mut Credentials) -> Result<R>) -> Result<R> {
        let key = self.keys.get_key()?;
        let mut credentials = self.load(&key)?;
        let out = f(&mut credentials)?;
        self.save(&credentials, &key)?;
        Ok(out)
    }

    /// Get a credential value
    pub fn get_credential(&self, name: &str) -> Result<String> {
        let credentials = self.unlock()?;
        credentials
            .get(name)
            .map(str::to_string)
            .ok_or_else(|| VaultError::CredentialNotFound(name.to_string()))
    }

    /// Whether a credential exists. Every failure, including a missing key
    /// or a cancelled challenge, reads as `false`.
    pub fn has_credential(&self, name: &str) -> bool {
        match self.unlock() {
            Ok(credentials) => credentials.contains(name),
            Err(e) => {
                debug!(error = %e, "credential probe failed");
                false
            }
        }
    }

    /// Store a credential. The value is trimmed.
    pub fn set_credential(&self, name: &str, value: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(VaultError::Validation("credential name cannot be empty".to_string()));
        }
        let value = value.trim();
        if value.is_empty() {
            return Err(VaultError::Validation("empty value not allowed".to_string()));
        }

        self.update(|credentials| {
            credentials.insert(name, value);
            Ok(())
        })?;
        debug!(name, "credential stored");
        Ok(())
    }

    /// Delete a credential
    pub fn delete_credential(&self, name: &str) -> Result<()> {
        self.update(|credentials| {
            if credentials.remove(name) {
                Ok(())
            } else {
                Err(VaultError::CredentialNotFound(name.to_string()))
            }
        })?;
        debug!(name, "credential deleted");
        Ok(())
    }

    /// All credential names, sorted
    pub fn list_credentials(&self) -> Result<Vec<String>> {
        Ok(self.unlock()?.names())
    }

    /// Hand a credential to `f` without returning it
    pub fn use_credential<T>(&self, name: &str, f: impl FnOnce(&str) -> T) -> Result<T> {
        let value = Zeroizing::new(self.get_credential(name)?);
        Ok(f(value.as_str()))
    }
}

/// Create `dir` if needed, owner-only when we are the ones creating it
fn ensure_private_dir(dir: &Path) -> std::io::Result<()> {
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}

/// Write `contents` to `path` through a sibling temp file and a rename, so
/// readers only ever see a complete file. The result is mode 0600.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    write_private_inner(path, contents).map_err(VaultError::Persistence)
}

fn write_private_inner(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        ensure_private_dir(parent)?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    let tmp_path = PathBuf::from(tmp_name);

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let result = (|| {
        let mut file = options.open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        drop(file);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
        }

        fs::rename(&tmp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}
