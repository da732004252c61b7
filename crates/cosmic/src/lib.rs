//! # Cosmic
//!
//! A harness for deployment scripts. Tasks reach external services through
//! named plugins, report progress on a tag-addressed message bus and obtain
//! credentials per service from configuration, a directory or a prompt.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────┐     ┌──────┐     ┌─────────────┐     ┌──────────────────────┐
//! │ Harness │────▶│ Task │────▶│ Environment │────▶│ Plugin "jira"        │──▶ service
//! │  (CLI)  │     └──────┘     │             │────▶│ Plugin "f5"          │──▶ service
//! └─────────┘                  └─────────────┘     └──────────────────────┘
//!                                     │ MessageBus
//!                                     ▼
//!                              ConsoleListener (stdout / stderr)
//! ```
//!
//! - **Harness**: parses the command line, loads configuration, runs one task
//! - **Environment**: resolves plugins by name, caches them, shuts them down
//! - **Plugins**: service facades built by factories registered in [`PLUGINS`](core::PLUGINS)
//! - **Tasks**: deployment scripts registered in [`TASKS`](runtime::TASKS)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cosmic::prelude::*;
//!
//! fn release(env: &Environment, args: &[String]) -> anyhow::Result<()> {
//!     env.plugin("jira")?.call("comment", &params)?;
//!     env.optional("f5").optional().call("disable_node", &params);
//!     Ok(())
//! }
//!
//! #[distributed_slice(TASKS)]
//! static RELEASE: TaskDescriptor = TaskDescriptor::new("release", "Cut a release", release);
//!
//! fn main() -> std::process::ExitCode {
//!     Harness::new().run()
//! }
//! ```
//!
//! ## Features
//!
//! - `yaml-config`: YAML configuration files (default)
//! - `toml-config`: TOML configuration files
//! - `json-log`: JSON log output

pub use cosmic_core as core;
pub use cosmic_runtime as runtime;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use cosmic::prelude::*;
/// ```
pub mod prelude {
    // Core plugin host
    pub use cosmic_core::prelude::*;

    // Registration
    pub use cosmic_core::PLUGINS;
    pub use cosmic_core::linkme::distributed_slice;
    pub use cosmic_runtime::{TASKS, TaskDescriptor};

    // Command line
    pub use cosmic_runtime::Harness;
}
