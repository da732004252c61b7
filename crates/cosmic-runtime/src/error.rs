//! Runtime error types.

use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised by the harness around a task run.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// No task with this name is registered.
    #[error("Unknown task: {0}")]
    UnknownTask(String),

    /// A task with this name is already registered.
    #[error("Task already registered: {0}")]
    DuplicateTask(String),

    /// The name belongs to a built-in task.
    #[error("Task name is reserved: {0}")]
    ReservedTask(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
