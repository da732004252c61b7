//! Typed views of harness-level configuration sections.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use cosmic_core::ConfigTree;
use serde::{Deserialize, Serialize};

use super::error::{ConfigError, ConfigResult};

/// Top-level key of the logging section.
pub const LOGGING_KEY: &str = "logging";

/// Log severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything.
    Trace,
    /// Resolution and authentication detail.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Recoverable problems.
    Warn,
    /// Failures only.
    Error,
}

impl LogLevel {
    /// Filter-directive spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// The matching `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Single line, abbreviated.
    #[default]
    Compact,
    /// Single line with all fields.
    Full,
    /// Multi-line, human oriented.
    Pretty,
    /// Newline-delimited JSON.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    /// Standard output.
    Stdout,
    /// Standard error. Keeps diagnostics apart from bus messages.
    #[default]
    Stderr,
    /// The file named by `file_path`.
    File,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    /// Span creation.
    #[serde(default)]
    pub new: bool,
    /// Span entry.
    #[serde(default)]
    pub enter: bool,
    /// Span exit.
    #[serde(default)]
    pub exit: bool,
    /// Span close.
    #[serde(default)]
    pub close: bool,
}

/// The `logging` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default level.
    #[serde(default)]
    pub level: LogLevel,

    /// Line layout.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file, used when `output` is `file`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Per-module level overrides, e.g. `cosmic_core: debug`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,
}

impl LoggingConfig {
    /// Reads the `logging` section, defaulting every absent field.
    pub fn from_tree(tree: &ConfigTree) -> ConfigResult<Self> {
        tree.section(LOGGING_KEY)
            .map(Option::unwrap_or_default)
            .map_err(|e| ConfigError::invalid_section(LOGGING_KEY, e))
    }
}
