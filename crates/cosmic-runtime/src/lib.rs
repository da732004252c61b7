//! Cosmic Runtime - the command-line layer of the Cosmic deployment harness.
//!
//! This crate provides:
//! - Configuration loading with figment (`config`)
//! - Logging setup (`logging`)
//! - An LDAP directory connector (`directory`, feature `ldap`)
//! - Console listeners for the message bus (`listeners`)
//! - Link-time task registration (`task`)
//! - The `cosmic` command line (`harness`)
//!
//! ```ignore
//! use cosmic_runtime::Harness;
//!
//! fn main() -> std::process::ExitCode {
//!     Harness::new().run()
//! }
//! ```

pub mod config;
#[cfg(feature = "ldap")]
pub mod directory;
pub mod error;
pub mod harness;
pub mod listeners;
pub mod logging;
pub mod task;

// Re-exports
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LogFormat, LogLevel, LogOutput, LoggingConfig,
    load_config, load_config_from_file,
};
#[cfg(feature = "ldap")]
pub use directory::LdapConnector;
pub use error::{RuntimeError, RuntimeResult};
pub use harness::{Cli, EXIT_OK, EXIT_TASK_FAILED, EXIT_USAGE, Harness};
pub use listeners::{ConsoleListener, console_listeners};
pub use logging::{LoggingBuilder, SpanEvents};
pub use task::{LIST_TASK, TASKS, TaskDescriptor, TaskFn, TaskRegistry};
