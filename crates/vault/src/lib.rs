//! vault - Local credential vault for Keyward
//!
//! "Configuration files should say what they need, never what it is."
//!
//! Credentials live in a single AES-256-GCM blob keyed by a master
//! password. The password itself sits in the OS secret store, so day to day
//! use costs one Touch ID or keyring unlock instead of typing it. Config
//! files reference credentials with `${{vault:name}}` placeholders that are
//! checked and filled in just before use.
//!
//! An older service/username store keyed by a generated key is still
//! readable so its entries can be migrated.

pub mod crypto;
pub mod error;
pub mod inject;
pub mod keys;
pub mod legacy;
pub mod placeholder;
pub mod prompt;
pub mod store;

pub use error::{ResolveError, Result, VaultError};
pub use inject::{collect_env, Mapping};
pub use keys::{platform_store, platform_store_for, KeyProvider, KeyStore, MasterKey, MemoryKeyStore};
pub use legacy::{EntryMetadata, LegacyStore};
pub use placeholder::{
    extract_placeholders, has_placeholders, resolve_placeholders, CredentialSource, Placeholder,
    Resolver, Source,
};
pub use prompt::{SecretInput, TerminalInput};
pub use store::{Credentials, Vault};
