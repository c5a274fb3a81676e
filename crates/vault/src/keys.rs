//! Master key sources
//!
//! The master key lives in the OS secret store (macOS Keychain, Windows
//! Credential Manager, Linux kernel keyring). Reading it may raise an
//! interactive challenge such as Touch ID. When the store has nothing, the
//! provider falls back to an explicitly supplied key, then to an environment
//! variable, then (for interactive front-ends) to a hidden prompt.

use crate::crypto::{self, KEY_LEN};
use crate::error::{Result, VaultError};
use crate::prompt::SecretInput;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use keyward_core::EnvSource;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Key material for one vault operation. Zeroized on drop.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<Vec<u8>>);

impl MasterKey {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(bytes.into()))
    }

    pub fn from_passphrase(passphrase: impl Into<String>) -> Self {
        Self(Zeroizing::new(passphrase.into().into_bytes()))
    }

    /// Fresh random 256-bit key
    pub fn generate() -> Self {
        Self::from_bytes(crypto::generate_key().to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Encoding used when the key is kept in a text-only secret store
    fn to_base64(&self) -> Zeroizing<String> {
        Zeroizing::new(BASE64.encode(self.as_bytes()))
    }

    fn from_base64(encoded: &str) -> Result<Self> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| VaultError::Keychain("stored key is not valid base64".to_string()))?;
        if bytes.len() != KEY_LEN {
            return Err(VaultError::Keychain(format!(
                "stored key has {} bytes, expected {}",
                bytes.len(),
                KEY_LEN
            )));
        }
        Ok(Self::from_bytes(bytes))
    }

    /// Passphrase text, when the key is a password
    fn to_text(&self) -> Zeroizing<String> {
        Zeroizing::new(String::from_utf8_lossy(self.as_bytes()).into_owned())
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED; {}])", self.len())
    }
}

/// An OS-level secret store holding a single text secret
pub trait KeyStore: Send + Sync {
    /// Backend name for diagnostics
    fn name(&self) -> &str;

    /// Read the secret. May block on an interactive challenge.
    fn get(&self) -> Result<Option<Zeroizing<String>>>;

    /// Create or overwrite the secret
    fn set(&self, secret: &str) -> Result<()>;

    /// Whether a secret exists. Must not raise the interactive challenge
    /// on backends that can check existence without reading.
    fn has(&self) -> bool;
}

/// In-memory store for tests and ephemeral sessions
#[derive(Clone, Default)]
pub struct MemoryKeyStore {
    secret: Arc<Mutex<Option<Zeroizing<String>>>>,
    cancel: bool,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(secret: &str) -> Self {
        let store = Self::new();
        *store.slot() = Some(Zeroizing::new(secret.to_string()));
        store
    }

    /// A store that holds a secret but whose challenge is always cancelled
    pub fn cancelling() -> Self {
        let mut store = Self::with_secret("unreachable");
        store.cancel = true;
        store
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<Zeroizing<String>>> {
        self.secret.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyStore for MemoryKeyStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn get(&self) -> Result<Option<Zeroizing<String>>> {
        if self.cancel {
            return Err(VaultError::AuthCancelled);
        }
        Ok(self.slot().clone())
    }

    fn set(&self, secret: &str) -> Result<()> {
        *self.slot() = Some(Zeroizing::new(secret.to_string()));
        Ok(())
    }

    fn has(&self) -> bool {
        self.slot().is_some()
    }
}

/// macOS Keychain through the `security` utility.
///
/// Secrets go over stdin, never on the command line. `find-generic-password`
/// without `-w` checks existence without unlocking the item, so `has` never
/// triggers Touch ID.
#[cfg(target_os = "macos")]
pub struct KeychainStore {
    service: String,
    account: String,
}

#[cfg(target_os = "macos")]
impl KeychainStore {
    /// Exit status of `security` when the user dismisses the prompt
    const USER_CANCELLED: i32 = 128;

    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn security(&self, args: &[&str]) -> std::process::Command {
        let mut cmd = std::process::Command::new("security");
        cmd.args(args)
            .arg("-a")
            .arg(&self.account)
            .arg("-s")
            .arg(&self.service);
        cmd
    }
}

#[cfg(target_os = "macos")]
impl KeyStore for KeychainStore {
    fn name(&self) -> &str {
        "macOS Keychain"
    }

    fn get(&self) -> Result<Option<Zeroizing<String>>> {
        use std::process::Stdio;

        let output = self
            .security(&["find-generic-password"])
            .arg("-w")
            .stdin(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()?;

        if output.status.success() {
            let text = Zeroizing::new(String::from_utf8_lossy(&output.stdout).into_owned());
            let trimmed = text.trim_end_matches(['\r', '\n']);
            return Ok(Some(Zeroizing::new(trimmed.to_string())));
        }

        match output.status.code() {
            Some(Self::USER_CANCELLED) => Err(VaultError::AuthCancelled),
            _ if !self.has() => Ok(None),
            _ => Err(VaultError::Keychain(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            )),
        }
    }

    fn set(&self, secret: &str) -> Result<()> {
        use std::io::Write;
        use std::process::Stdio;

        // -U updates in place; -w as the last argument reads the secret from stdin
        let mut child = self
            .security(&["add-generic-password", "-U"])
            .arg("-w")
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VaultError::KeyProvision(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            // security asks twice (password + retype) when reading from a pipe
            writeln!(stdin, "{}", secret)
                .and_then(|_| writeln!(stdin, "{}", secret))
                .map_err(|e| VaultError::KeyProvision(e.to_string()))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| VaultError::KeyProvision(e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(VaultError::KeyProvision(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ))
        }
    }

    fn has(&self) -> bool {
        self.security(&["find-generic-password"])
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }
}

/// Native credential store through the `keyring` crate
#[cfg(not(target_os = "macos"))]
pub struct KeyringStore {
    service: String,
    account: String,
}

#[cfg(not(target_os = "macos"))]
impl KeyringStore {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| VaultError::Keychain(e.to_string()))
    }
}

#[cfg(not(target_os = "macos"))]
impl KeyStore for KeyringStore {
    fn name(&self) -> &str {
        "system keyring"
    }

    fn get(&self) -> Result<Option<Zeroizing<String>>> {
        match self.entry()?.get_password() {
            Ok(secret) => Ok(Some(Zeroizing::new(secret))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::NoStorageAccess(_)) => Err(VaultError::AuthCancelled),
            Err(e) => Err(VaultError::Keychain(e.to_string())),
        }
    }

    fn set(&self, secret: &str) -> Result<()> {
        self.entry()
            .map_err(|e| VaultError::KeyProvision(e.to_string()))?
            .set_password(secret)
            .map_err(|e| VaultError::KeyProvision(e.to_string()))
    }

    fn has(&self) -> bool {
        // keyutils and the Windows credential manager read without a challenge
        matches!(self.get(), Ok(Some(_)))
    }
}

/// The secret store for the current platform, under the current user's account
pub fn platform_store(service: &str) -> Box<dyn KeyStore> {
    let account = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| service.to_string());
    platform_store_for(service, &account)
}

/// The secret store for the current platform with an explicit account
pub fn platform_store_for(service: &str, account: &str) -> Box<dyn KeyStore> {
    #[cfg(target_os = "macos")]
    {
        Box::new(KeychainStore::new(service, account))
    }

    #[cfg(not(target_os = "macos"))]
    {
        Box::new(KeyringStore::new(service, account))
    }
}

type StatusHook = Box<dyn Fn(&str) + Send + Sync>;

/// Produces the master key from an ordered chain of sources
pub struct KeyProvider {
    store: Box<dyn KeyStore>,
    explicit: Option<MasterKey>,
    env: Box<dyn EnvSource>,
    env_var: String,
    prompt: Option<Box<dyn SecretInput>>,
    status: Option<StatusHook>,
}

impl KeyProvider {
    pub fn new(store: Box<dyn KeyStore>, env: Box<dyn EnvSource>, env_var: impl Into<String>) -> Self {
        Self {
            store,
            explicit: None,
            env,
            env_var: env_var.into(),
            prompt: None,
            status: None,
        }
    }

    /// Key supplied by the caller, tried after the secret store
    pub fn with_key(mut self, key: MasterKey) -> Self {
        self.explicit = Some(key);
        self
    }

    /// Last-resort interactive source
    pub fn with_prompt(mut self, prompt: Box<dyn SecretInput>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Called with a human-readable message before any potentially blocking challenge
    pub fn with_status(mut self, hook: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.status = Some(Box::new(hook));
        self
    }

    fn notify(&self, message: &str) {
        if let Some(hook) = &self.status {
            hook(message);
        }
    }

    /// Whether the secret store holds a key. Never prompts.
    pub fn has_key(&self) -> bool {
        self.store.has()
    }

    /// Upsert into the secret store
    pub fn set_key(&self, key: &MasterKey) -> Result<()> {
        self.store.set(&key.to_text())?;
        debug!(store = self.store.name(), "master key stored");
        Ok(())
    }

    /// Password for the password-derived vault
    pub fn get_key(&self) -> Result<MasterKey> {
        let mut cancelled = false;

        if self.store.has() {
            self.notify(&format!("Authenticating via {}...", self.store.name()));
            match self.store.get() {
                Ok(Some(secret)) => {
                    self.notify("Authenticated");
                    return Ok(MasterKey::from_passphrase(secret.as_str()));
                }
                Ok(None) => {}
                Err(VaultError::AuthCancelled) => {
                    self.notify("Authentication cancelled");
                    cancelled = true;
                }
                Err(e) => {
                    warn!(store = self.store.name(), error = %e, "secret store read failed");
                    self.notify(&format!("{} failed: {}", self.store.name(), e));
                }
            }
        }

        if let Some(key) = &self.explicit {
            return Ok(key.clone());
        }

        if let Some(value) = self.env.var(&self.env_var).filter(|v| !v.is_empty()) {
            debug!(var = %self.env_var, "master password taken from environment");
            return Ok(MasterKey::from_passphrase(value));
        }

        if let Some(prompt) = &self.prompt {
            let password = Zeroizing::new(prompt.prompt_hidden("Enter master password: ")?);
            if !password.is_empty() {
                return Ok(MasterKey::from_passphrase(password.as_str()));
            }
        }

        if cancelled {
            Err(VaultError::AuthCancelled)
        } else {
            Err(VaultError::NoKeyAvailable {
                env_var: self.env_var.clone(),
            })
        }
    }

    /// Existing legacy store key. Never generates one.
    pub fn find_key(&self) -> Result<MasterKey> {
        match self.store.get()? {
            Some(encoded) => MasterKey::from_base64(&encoded),
            None => Err(VaultError::NoKeyAvailable {
                env_var: self.env_var.clone(),
            }),
        }
    }

    /// Generated 256-bit key for the legacy store, created on first use
    pub fn get_or_create_key(&self) -> Result<MasterKey> {
        if let Some(encoded) = self.store.get()? {
            return MasterKey::from_base64(&encoded);
        }

        let key = MasterKey::generate();
        self.store.set(&key.to_base64()).map_err(|e| match e {
            VaultError::KeyProvision(_) => e,
            other => VaultError::KeyProvision(other.to_string()),
        })?;
        debug!(store = self.store.name(), "generated new legacy store key");
        Ok(key)
    }
}
