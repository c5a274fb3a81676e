//! Interactive input
//!
//! The vault never touches terminal modes itself. Anything that needs to ask
//! the user goes through `SecretInput`.

use crate::error::Result;
use std::io::{BufRead, IsTerminal, Write};

/// Source of user-typed values
pub trait SecretInput: Send + Sync {
    /// Read a value without echoing it
    fn prompt_hidden(&self, label: &str) -> Result<String>;

    /// Read a value with normal echo
    fn prompt_visible(&self, label: &str) -> Result<String>;
}

/// Reads from the controlling terminal, or from piped stdin when there is none.
///
/// Prompts go to stderr so stdout stays clean for piping.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalInput;

impl TerminalInput {
    fn read_line(label: &str) -> Result<String> {
        let mut stderr = std::io::stderr();
        write!(stderr, "{}", label)?;
        stderr.flush()?;

        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

impl SecretInput for TerminalInput {
    fn prompt_hidden(&self, label: &str) -> Result<String> {
        if std::io::stdin().is_terminal() {
            Ok(rpassword::prompt_password(label)?)
        } else {
            // Piped input: take one line verbatim, quotes and backslashes included
            Self::read_line(label)
        }
    }

    fn prompt_visible(&self, label: &str) -> Result<String> {
        Self::read_line(label)
    }
}
