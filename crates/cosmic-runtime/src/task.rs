//! Deployment tasks runnable from the command line.
//!
//! A task is a plain function over an [`Environment`]. Crates contribute tasks
//! at link time:
//!
//! ```rust,ignore
//! use cosmic_runtime::task::{TASKS, TaskDescriptor};
//! use cosmic_core::linkme::distributed_slice;
//!
//! #[distributed_slice(TASKS)]
//! static ROLL: TaskDescriptor = TaskDescriptor::new("roll", "Rolling restart", roll);
//! ```

use std::collections::BTreeMap;
use std::fmt;

use cosmic_core::Environment;
use linkme::distributed_slice;
use tracing::{debug, warn};

use crate::error::{RuntimeError, RuntimeResult};

/// Name of the built-in task listing tasks and plugin classes.
pub const LIST_TASK: &str = "list";

/// Entry point of a task: the environment and the trailing arguments.
pub type TaskFn = fn(&Environment, &[String]) -> anyhow::Result<()>;

/// A named task.
#[derive(Clone, Copy)]
pub struct TaskDescriptor {
    /// Name used on the command line.
    pub name: &'static str,
    /// One-line description shown by `list`.
    pub about: &'static str,
    /// Entry point.
    pub run: TaskFn,
}

impl TaskDescriptor {
    /// Creates a descriptor, usable in a `TASKS` static.
    pub const fn new(name: &'static str, about: &'static str, run: TaskFn) -> Self {
        Self { name, about, run }
    }
}

impl fmt::Debug for TaskDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDescriptor")
            .field("name", &self.name)
            .field("about", &self.about)
            .finish_non_exhaustive()
    }
}

/// Tasks contributed at link time.
#[distributed_slice]
pub static TASKS: [TaskDescriptor];

/// Tasks by name.
#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<&'static str, TaskDescriptor>,
}

impl TaskRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from every descriptor in [`TASKS`], keeping the
    /// first of any duplicates.
    pub fn collect_all() -> Self {
        let mut registry = Self::new();
        for descriptor in TASKS.iter() {
            if let Err(e) = registry.register(*descriptor) {
                warn!(error = %e, "Ignoring task");
            }
        }
        debug!(tasks = registry.len(), "Collected tasks");
        registry
    }

    /// Adds a task.
    pub fn register(&mut self, descriptor: TaskDescriptor) -> RuntimeResult<()> {
        if descriptor.name == LIST_TASK {
            return Err(RuntimeError::ReservedTask(descriptor.name.to_string()));
        }
        if self.tasks.contains_key(descriptor.name) {
            return Err(RuntimeError::DuplicateTask(descriptor.name.to_string()));
        }
        self.tasks.insert(descriptor.name, descriptor);
        Ok(())
    }

    /// Looks up a task by its command-line name.
    pub fn get(&self, name: &str) -> Option<&TaskDescriptor> {
        self.tasks.get(name)
    }

    /// Tasks sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &TaskDescriptor> {
        self.tasks.values()
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Returns `true` if no task is registered.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Environment, _: &[String]) -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn duplicates_and_reserved_names_are_rejected() {
        let mut registry = TaskRegistry::new();
        registry
            .register(TaskDescriptor::new("deploy", "Deploy", noop))
            .unwrap();

        assert!(matches!(
            registry.register(TaskDescriptor::new("deploy", "Again", noop)),
            Err(RuntimeError::DuplicateTask(name)) if name == "deploy"
        ));
        assert!(matches!(
            registry.register(TaskDescriptor::new(LIST_TASK, "Shadow", noop)),
            Err(RuntimeError::ReservedTask(_))
        ));
        assert_eq!(registry.get("deploy").map(|t| t.about), Some("Deploy"));
    }

    #[test]
    fn iterates_in_name_order() {
        let mut registry = TaskRegistry::new();
        for name in ["rollback", "deploy", "migrate"] {
            registry
                .register(TaskDescriptor::new(name, "", noop))
                .unwrap();
        }
        let names: Vec<_> = registry.iter().map(|t| t.name).collect();
        assert_eq!(names, ["deploy", "migrate", "rollback"]);
    }
}
