//! Configuration loading for the Cosmic runtime.
//!
//! Documents are read with figment, layered with `COSMIC_*` environment
//! variables, and handed to the core as a key-normalised
//! [`ConfigTree`](cosmic_core::ConfigTree).

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, load_config, load_config_from_file};
pub use schema::{LogFormat, LogLevel, LogOutput, LoggingConfig, SpanEventConfig};
