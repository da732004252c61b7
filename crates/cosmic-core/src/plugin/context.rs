//! What a plugin factory sees of the environment.

use serde_json::{Map, Value};

use super::contract::Notifier;
use super::handle::PluginHandle;
use crate::auth::AuthRecord;
use crate::environment::Environment;
use crate::error::{PluginResult, ResolveResult};

/// Handed to a [`PluginFactory`](super::PluginFactory) while a plugin is built.
#[derive(Debug, Clone, Copy)]
pub struct PluginContext<'a> {
    environment: &'a Environment,
    name: &'a str,
}

impl<'a> PluginContext<'a> {
    pub(crate) fn new(environment: &'a Environment, name: &'a str) -> Self {
        Self { environment, name }
    }

    /// Lower-cased name the plugin is being resolved under.
    pub fn name(&self) -> &'a str {
        self.name
    }

    /// The plugin's configuration sub-tree, empty if none is configured.
    pub fn config(&self) -> Map<String, Value> {
        self.environment.get_plugin_config(self.name)
    }

    /// Resolves credentials for this plugin.
    ///
    /// The first successful resolution is stored under the plugin's `auth` key;
    /// later calls return it without prompting or querying the directory.
    pub fn authenticate(&self) -> PluginResult<Option<AuthRecord>> {
        Ok(self.environment.authenticate(self.name, false)?)
    }

    /// Discards stored credentials and any prompted answer, then resolves again.
    pub fn reauthenticate(&self) -> PluginResult<Option<AuthRecord>> {
        Ok(self.environment.authenticate(self.name, true)?)
    }

    /// A notifier tagged with this plugin's name.
    pub fn notifier(&self) -> Notifier {
        self.environment.notifier(self.name)
    }

    /// Whether destructive operations should be skipped.
    pub fn dry_run(&self) -> bool {
        self.environment.dry_run()
    }

    /// Resolves a plugin this one depends on.
    pub fn resolve(&self, name: &str) -> ResolveResult<PluginHandle> {
        self.environment.plugin(name)
    }

    /// Resolves an optional dependency.
    pub fn optional(&self, name: &str) -> PluginHandle {
        self.environment.optional(name)
    }

    /// The environment itself.
    pub fn environment(&self) -> &'a Environment {
        self.environment
    }
}
