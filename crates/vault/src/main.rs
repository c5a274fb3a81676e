//! vault - Local credential vault for Keyward
//!
//! Encrypted storage for the credentials automation configs depend on.
//! The master password is kept in the OS secret store.
//!
//! Commands:
//! - init: Create the vault and store the master password
//! - set <NAME> [VALUE]: Store a credential (prompts if no value)
//! - get <NAME>: Print a credential
//! - list: List credential names
//! - delete <NAME>: Delete a credential
//! - check <CONFIG>: Report placeholders a config needs that are missing
//! - inject <CMD>: Run a command with credentials in its environment
//! - migrate: Import entries from the legacy service/username store

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use keyward_core::{Config, Paths, ProcessEnv};
use serde_json::Value;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitCode};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use vault::placeholder::Source;
use vault::{
    collect_env, extract_placeholders, platform_store, platform_store_for, KeyProvider, KeyStore,
    LegacyStore, Mapping, MasterKey, Resolver, SecretInput, TerminalInput, Vault, VaultError,
};
use zeroize::Zeroizing;

#[derive(Parser)]
#[command(name = "vault")]
#[command(about = "Local credential vault for Keyward - encrypted storage plus placeholder checks for automation configs")]
#[command(version)]
#[command(after_help = r#"PLACEHOLDERS:
    Config files reference credentials inside string values:
    - ${{vault:gmail_password}}   Credential from this vault
    - ${{gmail_password}}         Same, vault is the default source
    - ${{env:API_BASE}}           Environment variable
    - ${{value:imap}}             Literal text

SECURITY:
    - Credentials are encrypted with AES-256-GCM
    - Key derived from the master password with PBKDF2-HMAC-SHA512 (100k rounds)
    - Master password kept in the OS secret store (Keychain / keyring)
    - Fallback: VAULT_MASTER_PASSWORD, then an interactive prompt
    - Vault file is owner-only (0600); values are never logged"#)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the vault and store the master password in the secret store
    Init {
        /// Overwrite an existing vault without asking
        #[arg(long)]
        force: bool,
    },

    /// Store a credential (prompts securely if value not provided)
    Set {
        /// Credential name (e.g., gmail_password, api/openai)
        name: String,
        /// Credential value (omit for secure hidden prompt)
        value: Option<String>,
    },

    /// Retrieve and print a credential value
    Get {
        /// Don't print trailing newline (useful for piping)
        #[arg(short = 'n')]
        no_newline: bool,
        /// Credential name
        name: String,
    },

    /// List stored credential names (values hidden)
    List {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Delete a credential permanently
    #[command(alias = "del")]
    Delete {
        /// Credential name to delete
        name: String,
    },

    /// Check that every placeholder in a JSON config can be resolved
    Check {
        /// Config file to scan
        config: PathBuf,
        /// Only check this top-level entry
        #[arg(long)]
        entry: Option<String>,
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Run a command with credentials injected as environment variables
    Inject {
        /// ENV=credential mapping; repeatable. Without any, every credential
        /// is injected under its derived name (api/openai -> API_OPENAI)
        #[arg(short = 'm', long = "map", value_name = "ENV=CREDENTIAL")]
        mappings: Vec<Mapping>,
        /// Command to run
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Import entries from the legacy service/username store as service/username
    Migrate {
        /// Clear the legacy store after a successful import
        #[arg(long)]
        remove: bool,
    },
}

/// Resolved configuration shared by every command
struct App {
    paths: Paths,
    config: Config,
}

impl App {
    fn load() -> Result<Self> {
        let paths = Paths::new();
        let config = Config::load(&paths, &ProcessEnv)?;
        Ok(Self { paths, config })
    }

    fn key_provider(&self, store: Box<dyn KeyStore>) -> KeyProvider {
        KeyProvider::new(
            store,
            Box::new(ProcessEnv),
            self.config.master_password_env.clone(),
        )
        .with_prompt(Box::new(TerminalInput))
        .with_status(|message| eprintln!("{}", message))
    }

    fn vault(&self) -> Vault {
        Vault::new(
            self.config.vault_path(&self.paths),
            self.key_provider(platform_store(&self.config.keychain_service)),
        )
    }

    fn legacy(&self) -> LegacyStore {
        LegacyStore::new(
            self.config.legacy_path(&self.paths),
            self.key_provider(platform_store_for(
                &self.config.legacy_keychain_service,
                self.config.legacy_account(),
            )),
        )
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(status) => return ExitCode::from(status),
    };

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Parse arguments. Usage errors exit 1 like every other failure; help and
/// version output exit 0.
fn parse_args<I, T>(args: I) -> std::result::Result<Cli, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args).map_err(|e| {
        let _ = e.print();
        if e.exit_code() == 0 {
            0
        } else {
            1
        }
    })
}

fn run(cli: Cli) -> Result<ExitCode> {
    let app = App::load()?;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&app, force),
        Some(Commands::Set { name, value }) => cmd_set(&app, &name, value),
        Some(Commands::Get { no_newline, name }) => cmd_get(&app, &name, no_newline),
        Some(Commands::List { json }) => cmd_list(&app, json),
        Some(Commands::Delete { name }) => cmd_delete(&app, &name),
        Some(Commands::Check { config, entry, json }) => cmd_check(&app, &config, entry.as_deref(), json),
        Some(Commands::Inject { mappings, command }) => cmd_inject(&app, &mappings, &command),
        Some(Commands::Migrate { remove }) => cmd_migrate(&app, remove),
        None => {
            // Default to listing credentials
            cmd_list(&app, false)
        }
    }
}

/// Create the vault
fn cmd_init(app: &App, force: bool) -> Result<ExitCode> {
    let vault = app.vault();
    let input = TerminalInput;

    if vault.exists() && !force {
        eprintln!("warning: Vault already exists at {}", vault.path().display());
        let answer = input.prompt_visible("Overwrite it? Every stored credential will be lost [y/N]: ")?;
        if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
            eprintln!("Aborted; existing vault left untouched");
            return Ok(ExitCode::FAILURE);
        }
    }

    let password = Zeroizing::new(input.prompt_hidden("New master password: ")?);
    let min = app.config.min_password_length;
    if password.chars().count() < min {
        bail!("Master password must be at least {} characters", min);
    }
    let confirm = Zeroizing::new(input.prompt_hidden("Confirm master password: ")?);
    if *password != *confirm {
        bail!("Passwords do not match");
    }

    let key = MasterKey::from_passphrase(password.as_str());
    match vault.keys().set_key(&key) {
        Ok(()) => eprintln!("info: Master password stored in the secret store"),
        Err(e) => {
            eprintln!("warning: Could not store master password: {}", e);
            eprintln!(
                "  Set {} or enter the password when prompted",
                app.config.master_password_env
            );
        }
    }

    vault.create(&key)?;

    eprintln!("success: Vault initialized at {}", vault.path().display());
    eprintln!("Store credentials with: vault set <name>");

    Ok(ExitCode::SUCCESS)
}

/// Store a credential
fn cmd_set(app: &App, name: &str, value: Option<String>) -> Result<ExitCode> {
    let value = match value {
        Some(v) => Zeroizing::new(v),
        None => {
            let entered = TerminalInput
                .prompt_hidden(&format!("Enter value for {}: ", name))
                .context("Failed to read credential value")?;
            Zeroizing::new(entered)
        }
    };

    if value.trim().is_empty() {
        bail!("Empty value not allowed");
    }

    app.vault().set_credential(name, &value)?;

    eprintln!("success: Credential stored: {}", name);

    Ok(ExitCode::SUCCESS)
}

/// Print a credential, raw, on stdout
fn cmd_get(app: &App, name: &str, no_newline: bool) -> Result<ExitCode> {
    let value = Zeroizing::new(app.vault().get_credential(name)?);

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(value.as_bytes())?;
    if !no_newline && stdout.is_terminal() {
        stdout.write_all(b"\n")?;
    }
    stdout.flush()?;

    Ok(ExitCode::SUCCESS)
}

/// List credential names
fn cmd_list(app: &App, json: bool) -> Result<ExitCode> {
    let names = app.vault().list_credentials()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&names)?);
        return Ok(ExitCode::SUCCESS);
    }

    if names.is_empty() {
        println!("No credentials stored. Add one with: vault set <name>");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Stored Credentials ({})", names.len());
    println!();

    for name in &names {
        println!("  {}", name);
    }

    Ok(ExitCode::SUCCESS)
}

/// Delete a credential
fn cmd_delete(app: &App, name: &str) -> Result<ExitCode> {
    app.vault().delete_credential(name)?;
    eprintln!("success: Credential deleted: {}", name);
    Ok(ExitCode::SUCCESS)
}

/// Load a config file, optionally narrowed to one top-level entry
fn load_config_tree(path: &Path, entry: Option<&str>) -> Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let tree: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {} as JSON", path.display()))?;

    match entry {
        Some(name) => match tree.get(name) {
            Some(value) => Ok(value.clone()),
            None => bail!("Entry '{}' not found in {}", name, path.display()),
        },
        None => Ok(tree),
    }
}

/// Pre-flight check of a config file
fn cmd_check(app: &App, path: &Path, entry: Option<&str>, json: bool) -> Result<ExitCode> {
    let tree = load_config_tree(path, entry)?;
    let required: Vec<String> = extract_placeholders(&tree).iter().map(|p| p.to_string()).collect();

    let vault = app.vault();
    let missing = Resolver::new(&vault, &ProcessEnv).validate_credentials(&tree);
    debug!(required = required.len(), missing = missing.len(), "config checked");

    if json {
        let report = serde_json::json!({
            "required": required,
            "missing": missing,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if required.is_empty() {
        println!("No placeholders found");
    } else {
        println!("Required ({})", required.len());
        for placeholder in &required {
            println!("  {}", placeholder);
        }

        if missing.is_empty() {
            println!();
            println!("success: All placeholders can be resolved");
        } else {
            println!();
            println!("Missing ({})", missing.len());
            for requirement in &missing {
                println!("  {}", requirement);
            }
            println!();
            println!("Add them with:");
            for requirement in &missing {
                match requirement.split_once(':') {
                    Some((source, key)) if Source::parse(source) == Source::Env => {
                        println!("  export {}=...", key)
                    }
                    Some(_) => {}
                    None => println!("  vault set {}", requirement),
                }
            }
        }
    }

    Ok(if missing.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Run a command with credentials in its environment
fn cmd_inject(app: &App, mappings: &[Mapping], command: &[String]) -> Result<ExitCode> {
    let Some((program, args)) = command.split_first() else {
        bail!("Command required. Usage: vault inject [-m ENV=credential]... -- <command>");
    };

    let injection = {
        let credentials = app.vault().unlock()?;
        if mappings.is_empty() {
            let all: Vec<Mapping> = credentials.names().iter().map(|n| Mapping::derived(n)).collect();
            collect_env(&credentials, &all)
        } else {
            collect_env(&credentials, mappings)
        }
    };

    if !injection.is_complete() {
        for (mapping, e) in &injection.failed {
            eprintln!("error: {}: {}", mapping, e);
        }
        bail!("{} mapping(s) could not be loaded", injection.failed.len());
    }
    debug!(count = injection.vars.len(), program = %program, "injecting credentials");

    let mut cmd = Command::new(program);
    cmd.args(args);
    for (name, value) in &injection.vars {
        cmd.env(name, value);
    }

    exec(cmd)
}

#[cfg(unix)]
fn exec(mut cmd: Command) -> Result<ExitCode> {
    use std::os::unix::process::CommandExt;

    // Replace current process with the command; only returns on failure
    let err = cmd.exec();
    bail!("Failed to execute command: {}", err);
}

#[cfg(not(unix))]
fn exec(mut cmd: Command) -> Result<ExitCode> {
    let status = cmd.status().context("Failed to execute command")?;
    Ok(match status.code() {
        Some(code) => ExitCode::from(code.clamp(0, 255) as u8),
        None => ExitCode::FAILURE,
    })
}

/// Import the legacy store
fn cmd_migrate(app: &App, remove: bool) -> Result<ExitCode> {
    let legacy = app.legacy();
    if !legacy.exists() {
        println!("Nothing to migrate: no legacy store at {}", legacy.path().display());
        return Ok(ExitCode::SUCCESS);
    }

    let vault = app.vault();
    if !vault.exists() {
        bail!(VaultError::NotInitialized);
    }

    let imported = legacy.migrate_into(&vault)?;
    if imported.is_empty() {
        println!("Legacy store is empty, nothing imported");
        return Ok(ExitCode::SUCCESS);
    }

    println!("Imported ({})", imported.len());
    for name in &imported {
        println!("  {}", name);
    }

    if remove {
        legacy.clear()?;
        eprintln!("info: Legacy store cleared");
    }

    Ok(ExitCode::SUCCESS)
}
