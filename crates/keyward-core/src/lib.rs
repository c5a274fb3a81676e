//! Keyward Core - Shared functionality for Keyward tools
//!
//! Paths, configuration and the environment abstraction used by the vault
//! and the placeholder resolver.

pub mod config;
pub mod env;
pub mod paths;

pub use config::Config;
pub use env::{EnvSource, MapEnv, ProcessEnv};
pub use paths::Paths;
