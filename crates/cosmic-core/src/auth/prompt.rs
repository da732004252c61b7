//! Interactive credential prompts.

use dialoguer::{Input, Password};

use crate::error::{AuthError, AuthResult};

/// Asks the operator for credentials.
///
/// Prompts block the whole run until answered.
pub trait Prompter: Send + Sync {
    /// Asks for the username to use for `service`.
    fn username(&self, service: &str) -> AuthResult<String>;

    /// Asks for `username`'s password on `service`.
    fn password(&self, service: &str, username: &str) -> AuthResult<String>;
}

/// Prompts on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn username(&self, service: &str) -> AuthResult<String> {
        Input::<String>::new()
            .with_prompt(format!("{service} username"))
            .interact_text()
            .map_err(|e| AuthError::Prompt(e.to_string()))
    }

    fn password(&self, service: &str, username: &str) -> AuthResult<String> {
        Password::new()
            .with_prompt(format!("{service} password for {username}"))
            .interact()
            .map_err(|e| AuthError::Prompt(e.to_string()))
    }
}
