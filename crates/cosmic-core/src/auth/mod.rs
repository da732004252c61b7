//! Credential resolution for services and for the environment itself.

mod directory;
mod prompt;
mod resolver;

pub use directory::{
    Attributes, BindMethod, Credentials, Directory, DirectoryConnector, DirectorySession,
    DirectorySettings, StaticDirectory,
};
pub use prompt::{Prompter, TerminalPrompter};
pub use resolver::{AuthRecord, AuthResolver, AuthScheme, EnvironmentAuth, PromptKey};
