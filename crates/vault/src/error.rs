//! Vault error types

use thiserror::Error;

/// Vault-specific errors
///
/// `Decryption` deliberately carries no detail: a wrong password, a flipped
/// byte and a truncated file must all look the same to the caller.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Credential not found for {service}/{username}")]
    NotFound { service: String, username: String },

    #[error("Credential \"{0}\" not found in vault")]
    CredentialNotFound(String),

    #[error("Decryption failed (wrong master password or corrupted vault)")]
    Decryption,

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Failed to store key in keychain: {0}")]
    KeyProvision(String),

    #[error("Master password not available. Set {env_var}, use the keychain, or provide it explicitly")]
    NoKeyAvailable { env_var: String },

    #[error("Authentication cancelled")]
    AuthCancelled,

    #[error("Keychain error: {0}")]
    Keychain(String),

    #[error("Vault not initialized - run 'vault init' first")]
    NotInitialized,

    #[error("Failed to persist vault: {0}")]
    Persistence(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// Placeholder resolution errors
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Unknown placeholder source: {0}")]
    UnknownSource(String),

    #[error(transparent)]
    Vault(#[from] VaultError),
}
