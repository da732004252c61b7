//! The `cosmic` command line: argument parsing and a single task run.
//!
//! A run loads configuration, initialises logging, builds one
//! [`Environment`] with the console listeners attached, runs the named task
//! and always shuts the environment down afterwards.

use std::any::Any;
use std::ffi::OsString;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cosmic_core::{
    DirectoryConnector, Environment, Listener, PluginCatalog, Prompter, Tag, TagSet,
};
use tracing::{error, info, warn};

use crate::config::{ConfigLoader, LoggingConfig};
use crate::error::RuntimeError;
use crate::listeners::console_listeners;
use crate::logging::LoggingBuilder;
use crate::task::{LIST_TASK, TaskRegistry};

/// The task ran to completion.
pub const EXIT_OK: u8 = 0;
/// The task returned an error.
pub const EXIT_TASK_FAILED: u8 = 1;
/// Bad arguments, bad configuration or an unknown task.
pub const EXIT_USAGE: u8 = 2;

/// Run a deployment task against configured services.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "cosmic", version, about)]
pub struct Cli {
    /// Report destructive actions instead of performing them.
    #[arg(long)]
    pub dry_run: bool,

    /// Configuration file to load instead of searching for one.
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Show trace messages and debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Task to run, or `list`.
    pub task: String,

    /// Arguments passed to the task.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Wires configuration, logging, listeners and tasks into a runnable binary.
pub struct Harness {
    tasks: TaskRegistry,
    catalog: Option<PluginCatalog>,
    prompter: Option<Arc<dyn Prompter>>,
    connector: Option<Arc<dyn DirectoryConnector>>,
    loader: ConfigLoader,
    listeners: Vec<(Arc<dyn Listener>, TagSet)>,
    init_logging: bool,
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

impl Harness {
    /// A harness with every linked task and plugin class.
    pub fn new() -> Self {
        Self {
            tasks: TaskRegistry::collect_all(),
            catalog: None,
            prompter: None,
            connector: default_connector(),
            loader: ConfigLoader::new(),
            listeners: Vec::new(),
            init_logging: true,
        }
    }

    /// Replaces the task registry.
    pub fn tasks(mut self, tasks: TaskRegistry) -> Self {
        self.tasks = tasks;
        self
    }

    /// Replaces the plugin catalog.
    pub fn catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Replaces the terminal prompter used for missing credentials.
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = Some(prompter);
        self
    }

    /// Connector used when the configuration selects `auth_type: ldap`.
    ///
    /// Defaults to `LdapConnector` when the
    /// `ldap` feature is enabled.
    pub fn directory_connector(mut self, connector: Arc<dyn DirectoryConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Base loader; `--config-file` is applied on top of it.
    pub fn config_loader(mut self, loader: ConfigLoader) -> Self {
        self.loader = loader;
        self
    }

    /// Subscribes `listener` after the console listeners.
    pub fn listener<T: Into<Tag>>(
        mut self,
        listener: Arc<dyn Listener>,
        tags: impl IntoIterator<Item = T>,
    ) -> Self {
        self.listeners.push((listener, tags.into_iter().collect()));
        self
    }

    /// Leaves the global `tracing` subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Parses the process arguments and runs.
    pub fn run(self) -> ExitCode {
        let cli = Cli::parse();
        ExitCode::from(self.execute(cli))
    }

    /// Parses `args` (including the binary name) and runs.
    pub fn run_from<I, T>(self, args: I) -> u8
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Cli::try_parse_from(args) {
            Ok(cli) => self.execute(cli),
            Err(e) => {
                let _ = e.print();
                if e.use_stderr() { EXIT_USAGE } else { EXIT_OK }
            }
        }
    }

    /// Runs one parsed command line and returns the exit code.
    pub fn execute(self, cli: Cli) -> u8 {
        let tree = match self.loader.maybe_file(cli.config_file.as_ref()).load() {
            Ok(tree) => tree,
            Err(e) => {
                eprintln!("error: failed to load configuration: {e}");
                return EXIT_USAGE;
            }
        };

        if self.init_logging {
            match LoggingConfig::from_tree(&tree) {
                Ok(config) => LoggingBuilder::from_config(&config)
                    .verbose(cli.verbose)
                    .init(),
                Err(e) => {
                    eprintln!("error: {e}");
                    return EXIT_USAGE;
                }
            }
        }

        if cli.task == LIST_TASK {
            let catalog = self.catalog.unwrap_or_else(PluginCatalog::collect_all);
            print!("{}", render_listing(&self.tasks, &catalog));
            return EXIT_OK;
        }

        let Some(task) = self.tasks.get(&cli.task).copied() else {
            eprintln!("error: {}", RuntimeError::UnknownTask(cli.task));
            eprintln!("run `cosmic {LIST_TASK}` to see available tasks");
            return EXIT_USAGE;
        };

        let mut builder = Environment::builder()
            .config(tree)
            .dry_run(cli.dry_run);
        if let Some(catalog) = self.catalog {
            builder = builder.catalog(catalog);
        }
        if let Some(prompter) = self.prompter {
            builder = builder.prompter(prompter);
        }
        if let Some(connector) = self.connector {
            builder = builder.directory_connector(connector);
        }
        for console in console_listeners(cli.verbose) {
            let tags = console.tags().clone();
            builder = builder.listener(Arc::new(console), tags.iter().cloned());
        }
        for (listener, tags) in self.listeners {
            builder = builder.listener(listener, tags.iter().cloned());
        }
        let env = builder.build();

        info!(task = task.name, dry_run = cli.dry_run, "Running task");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (task.run)(&env, &cli.args)));
        let code = match outcome {
            Ok(Ok(())) => EXIT_OK,
            Ok(Err(e)) => {
                error!(task = task.name, error = %e, "Task failed");
                eprintln!("error: task '{}' failed: {e:#}", task.name);
                EXIT_TASK_FAILED
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                error!(task = task.name, panic = %reason, "Task panicked");
                eprintln!("error: task '{}' panicked: {reason}", task.name);
                EXIT_TASK_FAILED
            }
        };

        let report = env.shutdown();
        if !report.is_clean() {
            warn!(failures = report.failures.len(), "Some plugins failed to shut down");
        }
        code
    }
}

#[cfg(feature = "ldap")]
fn default_connector() -> Option<Arc<dyn DirectoryConnector>> {
    Some(Arc::new(crate::directory::LdapConnector::new()))
}

#[cfg(not(feature = "ldap"))]
fn default_connector() -> Option<Arc<dyn DirectoryConnector>> {
    None
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

fn render_listing(tasks: &TaskRegistry, catalog: &PluginCatalog) -> String {
    let mut out = String::from("Tasks:\n");
    let width = tasks
        .iter()
        .map(|t| t.name.len())
        .fold(LIST_TASK.len(), usize::max);
    out.push_str(&format!("  {LIST_TASK:width$}  List tasks and plugin classes\n"));
    for task in tasks.iter() {
        out.push_str(&format!("  {:width$}  {}\n", task.name, task.about));
    }

    out.push_str("Plugin classes:\n");
    if catalog.is_empty() {
        out.push_str("  (none)\n");
    }
    for descriptor in catalog.descriptors() {
        out.push_str(&format!("  {}\n", descriptor.qualified_name()));
    }
    out
}
