//! Test doubles shared by unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::Prompter;
use crate::error::AuthResult;

/// Answers every prompt with fixed values and counts how often it was asked.
pub(crate) struct ScriptedPrompter {
    username: String,
    password: String,
    usernames: AtomicUsize,
    passwords: AtomicUsize,
}

impl ScriptedPrompter {
    pub(crate) fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            usernames: AtomicUsize::new(0),
            passwords: AtomicUsize::new(0),
        }
    }

    pub(crate) fn username_prompts(&self) -> usize {
        self.usernames.load(Ordering::SeqCst)
    }

    pub(crate) fn password_prompts(&self) -> usize {
        self.passwords.load(Ordering::SeqCst)
    }

    pub(crate) fn prompts(&self) -> usize {
        self.username_prompts() + self.password_prompts()
    }
}

impl Prompter for ScriptedPrompter {
    fn username(&self, _service: &str) -> AuthResult<String> {
        self.usernames.fetch_add(1, Ordering::SeqCst);
        Ok(self.username.clone())
    }

    fn password(&self, _service: &str, _username: &str) -> AuthResult<String> {
        self.passwords.fetch_add(1, Ordering::SeqCst);
        Ok(self.password.clone())
    }
}
