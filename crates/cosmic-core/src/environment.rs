//! The environment: plugin resolution, caching and shutdown.
//!
//! An [`Environment`] owns the configuration tree, the message bus, the
//! credential resolver and the plugin cache for one run. Plugins are resolved
//! by name on first use and cached under their lower-cased name until
//! [`shutdown`](Environment::shutdown).
//!
//! # Lifecycle
//!
//! ```text
//!            resolve()                factory Ok
//!   (none) ───────────▶ Resolving ─────────────────▶ Active
//!                           │                          │
//!                           │ factory Err              │ shutdown()
//!                           ▼                          ▼
//!                        (none)                     ShutDown
//! ```
//!
//! Resolving a name that is already `Resolving` is a cycle and fails instead
//! of recursing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, debug_span, info, warn};

use crate::auth::{
    AuthRecord, AuthResolver, BindMethod, DirectoryConnector, DirectorySession,
    DirectorySettings, EnvironmentAuth, PromptKey, Prompter, TerminalPrompter,
};
use crate::bus::{Listener, MessageBus, PublishReport, Tag, TagSet};
use crate::config::{AUTH_KEY, ConfigTree, normalize_key};
use crate::error::{AuthError, AuthResult, ResolveError, ResolveResult};
use crate::plugin::{Notifier, Plugin, PluginCatalog, PluginContext, PluginHandle, HoneyPot};

enum PluginState {
    Resolving,
    Active(Arc<dyn Plugin>),
}

#[derive(Default)]
struct Registry {
    plugins: HashMap<String, PluginState>,
    shut_down: bool,
}

/// Outcome of [`Environment::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Plugins whose shutdown hook succeeded, sorted by name.
    pub stopped: Vec<String>,
    /// `(plugin, error)` for every hook that failed.
    pub failures: Vec<(String, String)>,
}

impl ShutdownReport {
    /// Returns `true` if every hook succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The plugin host for one run.
pub struct Environment {
    config: RwLock<ConfigTree>,
    catalog: PluginCatalog,
    bus: Arc<MessageBus>,
    resolver: AuthResolver,
    auth: EnvironmentAuth,
    dry_run: bool,
    registry: Mutex<Registry>,
}

impl Environment {
    /// Starts building an environment.
    pub fn builder() -> EnvironmentBuilder {
        EnvironmentBuilder::new()
    }

    /// Resolves `name` to a plugin.
    ///
    /// When `required` is `false` every failure yields a honeypot handle and is
    /// not cached. The failure is still published, tagged `trace` and the
    /// plugin name, so it is never silent. Listeners on `info`, `warn` or
    /// `error` do not see it; only verbose consoles and explicit `trace`
    /// subscribers do.
    pub fn resolve(&self, name: &str, required: bool) -> ResolveResult<PluginHandle> {
        let key = normalize_key(name).to_lowercase();
        let _span = debug_span!("resolve", plugin = %key, required).entered();

        match self.resolve_cached(&key) {
            Ok(plugin) => Ok(self.handle(plugin, &key)),
            Err(e) if required => Err(e),
            Err(e) => {
                debug!(error = %e, "Optional plugin unavailable");
                self.bus.publish(
                    format!("optional plugin '{key}' unavailable: {e}"),
                    [Tag::TRACE, Tag::new(key.clone())],
                );
                Ok(PluginHandle::Absent(HoneyPot))
            }
        }
    }

    /// Resolves a plugin that must exist.
    pub fn plugin(&self, name: &str) -> ResolveResult<PluginHandle> {
        self.resolve(name, true)
    }

    /// Resolves a plugin that may be absent; never fails.
    pub fn optional(&self, name: &str) -> PluginHandle {
        match self.resolve(name, false) {
            Ok(handle) => handle,
            Err(_) => PluginHandle::Absent(HoneyPot),
        }
    }

    fn resolve_cached(&self, key: &str) -> ResolveResult<Arc<dyn Plugin>> {
        {
            let mut registry = self.registry.lock();
            if registry.shut_down {
                return Err(ResolveError::ShutDown { name: key.to_string() });
            }
            match registry.plugins.get(key) {
                Some(PluginState::Active(plugin)) => {
                    debug!("Plugin cache hit");
                    return Ok(Arc::clone(plugin));
                }
                Some(PluginState::Resolving) => {
                    return Err(ResolveError::Cycle { name: key.to_string() });
                }
                None => {
                    registry
                        .plugins
                        .insert(key.to_string(), PluginState::Resolving);
                }
            }
        }

        let constructed = self.construct(key);

        let mut registry = self.registry.lock();
        match constructed {
            Ok(plugin) if registry.shut_down => {
                registry.plugins.remove(key);
                drop(registry);
                warn!("Environment shut down while plugin was being constructed");
                if let Err(e) = plugin.shutdown() {
                    warn!(error = %e, "Plugin shutdown failed");
                }
                Err(ResolveError::ShutDown { name: key.to_string() })
            }
            Ok(plugin) => {
                registry
                    .plugins
                    .insert(key.to_string(), PluginState::Active(Arc::clone(&plugin)));
                info!(plugin = %key, "Plugin resolved");
                Ok(plugin)
            }
            Err(e) => {
                registry.plugins.remove(key);
                Err(e)
            }
        }
    }

    fn construct(&self, key: &str) -> ResolveResult<Arc<dyn Plugin>> {
        let class_override = self
            .config
            .read()
            .plugin(key)
            .and_then(|section| section.get("plugin_class"))
            .and_then(Value::as_str)
            .map(str::to_owned);

        let descriptor = *self
            .catalog
            .find(key, class_override.as_deref())
            .map_err(|tried| ResolveError::ClassNotFound {
                name: key.to_string(),
                tried,
            })?;
        debug!(class = %descriptor.qualified_name(), "Constructing plugin");

        let context = PluginContext::new(self, key);
        (descriptor.create)(&context).map_err(|source| ResolveError::Construction {
            name: key.to_string(),
            source,
        })
    }

    fn handle(&self, plugin: Arc<dyn Plugin>, key: &str) -> PluginHandle {
        PluginHandle::Live {
            plugin,
            notifier: self.notifier(key),
        }
    }

    /// Returns `true` if `name` has a cached instance.
    pub fn is_cached(&self, name: &str) -> bool {
        let key = normalize_key(name).to_lowercase();
        matches!(
            self.registry.lock().plugins.get(&key),
            Some(PluginState::Active(_))
        )
    }

    /// Names of every cached plugin, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registry
            .lock()
            .plugins
            .iter()
            .filter(|(_, state)| matches!(state, PluginState::Active(_)))
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// A copy of the `plugins.<name>` sub-tree, or an empty mapping.
    pub fn get_plugin_config(&self, name: &str) -> Map<String, Value> {
        self.config.read().plugin(name).cloned().unwrap_or_default()
    }

    /// A copy of the whole configuration tree.
    pub fn config(&self) -> ConfigTree {
        self.config.read().clone()
    }

    /// Resolves credentials for plugin `name`, storing them under its `auth` key.
    ///
    /// With `force` any stored record and cached prompt answer are discarded first.
    pub fn authenticate(&self, name: &str, force: bool) -> AuthResult<Option<AuthRecord>> {
        let key = normalize_key(name).to_lowercase();
        let _span = debug_span!("authenticate", plugin = %key, force).entered();

        if force {
            self.resolver.forget(&PromptKey::service(key.as_str()));
            if let Some(section) = self.config.write().find_plugin_mut(&key) {
                section.remove(AUTH_KEY);
            }
        } else if let Some(stored) = self.get_plugin_config(&key).get(AUTH_KEY) {
            debug!("Using stored credentials");
            return AuthRecord::deserialize(stored)
                .map(Some)
                .map_err(|e| AuthError::InvalidField {
                    service: key.clone(),
                    field: AUTH_KEY.to_string(),
                    reason: e.to_string(),
                });
        }

        let service_config = self.get_plugin_config(&key);
        let record = self.resolver.resolve(&key, &service_config, &self.auth)?;
        if let Some(record) = &record {
            let value = serde_json::to_value(record).map_err(|e| AuthError::InvalidField {
                service: key.clone(),
                field: AUTH_KEY.to_string(),
                reason: e.to_string(),
            })?;
            self.config
                .write()
                .plugin_mut(&key)
                .insert(AUTH_KEY.to_string(), value);
        }
        Ok(record)
    }

    /// The message bus.
    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Subscribes `listener` to `tags` on the bus.
    pub fn subscribe<T: Into<Tag>>(
        &self,
        listener: Arc<dyn Listener>,
        tags: impl IntoIterator<Item = T>,
    ) {
        self.bus.subscribe(listener, tags);
    }

    /// Publishes on the bus.
    pub fn publish<T: Into<Tag>>(
        &self,
        payload: impl Into<Value>,
        tags: impl IntoIterator<Item = T>,
    ) -> PublishReport {
        self.bus.publish(payload, tags)
    }

    /// A notifier tagged with `name`.
    pub fn notifier(&self, name: &str) -> Notifier {
        Notifier::new(&self.bus, normalize_key(name).to_lowercase())
    }

    /// Whether destructive operations should be skipped.
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// How the environment authenticated.
    pub fn auth(&self) -> &EnvironmentAuth {
        &self.auth
    }

    /// The operator's identity, if known.
    pub fn operator(&self) -> Option<String> {
        self.auth.identity()
    }

    /// The plugin classes this environment resolves against.
    pub fn catalog(&self) -> &PluginCatalog {
        &self.catalog
    }

    /// Returns `true` once [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.registry.lock().shut_down
    }

    /// Shuts down every cached plugin and clears the bus.
    ///
    /// Every hook is attempted even if earlier ones fail; failures are
    /// published as `error` messages before the bus is cleared. Calling this
    /// again does nothing.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut plugins: Vec<(String, Arc<dyn Plugin>)> = {
            let mut registry = self.registry.lock();
            if registry.shut_down {
                return ShutdownReport::default();
            }
            registry.shut_down = true;
            registry
                .plugins
                .drain()
                .filter_map(|(name, state)| match state {
                    PluginState::Active(plugin) => Some((name, plugin)),
                    PluginState::Resolving => None,
                })
                .collect()
        };
        plugins.sort_by(|a, b| a.0.cmp(&b.0));
        info!(plugins = plugins.len(), "Shutting down environment");

        let mut report = ShutdownReport::default();
        for (name, plugin) in plugins {
            match plugin.shutdown() {
                Ok(()) => {
                    debug!(plugin = %name, "Plugin shut down");
                    report.stopped.push(name);
                }
                Err(e) => {
                    warn!(plugin = %name, error = %e, "Plugin shutdown failed");
                    self.bus.publish(
                        format!("{name}: shutdown failed: {e}"),
                        [Tag::ERROR, Tag::new(name.clone())],
                    );
                    report.failures.push((name, e.to_string()));
                }
            }
        }

        self.bus.clear();
        report
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("dry_run", &self.dry_run)
            .field("auth", &self.auth)
            .field("cached", &self.cached_names())
            .field("bus", &self.bus)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// EnvironmentBuilder
// =============================================================================

/// Builder for [`Environment`].
///
/// Listeners added here are subscribed before environment-level
/// authentication runs, so they see any bind failure it reports.
pub struct EnvironmentBuilder {
    config: ConfigTree,
    catalog: Option<PluginCatalog>,
    prompter: Arc<dyn Prompter>,
    connector: Option<Arc<dyn DirectoryConnector>>,
    dry_run: bool,
    listeners: Vec<(Arc<dyn Listener>, TagSet)>,
}

impl Default for EnvironmentBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvironmentBuilder {
    /// Creates a builder with an empty configuration and a terminal prompter.
    pub fn new() -> Self {
        Self {
            config: ConfigTree::new(),
            catalog: None,
            prompter: Arc::new(TerminalPrompter),
            connector: None,
            dry_run: false,
            listeners: Vec::new(),
        }
    }

    /// Sets the configuration tree.
    pub fn config(mut self, config: ConfigTree) -> Self {
        self.config = config;
        self
    }

    /// Sets the plugin catalog. Defaults to [`PluginCatalog::collect_all`].
    pub fn catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Sets how the operator is prompted for credentials.
    pub fn prompter(mut self, prompter: Arc<dyn Prompter>) -> Self {
        self.prompter = prompter;
        self
    }

    /// Sets the connector used when `auth_type: ldap` is configured.
    pub fn directory_connector(mut self, connector: Arc<dyn DirectoryConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Enables dry-run mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Subscribes `listener` to `tags` on the new bus.
    pub fn listener<T: Into<Tag>>(
        mut self,
        listener: Arc<dyn Listener>,
        tags: impl IntoIterator<Item = T>,
    ) -> Self {
        self.listeners.push((listener, tags.into_iter().collect()));
        self
    }

    /// Builds the environment, performing environment-level authentication.
    ///
    /// Authentication failures are published as `error` messages and leave the
    /// environment unauthenticated.
    pub fn build(self) -> Environment {
        let bus = Arc::new(MessageBus::new());
        for (listener, tags) in self.listeners {
            bus.subscribe(listener, tags.iter().cloned());
        }

        let resolver = AuthResolver::new(self.prompter);
        let auth = match authenticate_environment(
            &self.config,
            &resolver,
            self.connector.as_deref(),
        ) {
            Ok(auth) => auth,
            Err(e) => {
                warn!(error = %e, "Environment authentication failed");
                bus.publish(
                    format!("environment authentication failed: {e}"),
                    [Tag::ERROR],
                );
                EnvironmentAuth::None
            }
        };

        Environment {
            config: RwLock::new(self.config),
            catalog: self.catalog.unwrap_or_else(PluginCatalog::collect_all),
            bus,
            resolver,
            auth,
            dry_run: self.dry_run,
            registry: Mutex::new(Registry::default()),
        }
    }
}

fn authenticate_environment(
    config: &ConfigTree,
    resolver: &AuthResolver,
    connector: Option<&dyn DirectoryConnector>,
) -> AuthResult<EnvironmentAuth> {
    let Some(raw) = config.get_str("auth_type") else {
        return Ok(EnvironmentAuth::None);
    };

    match normalize_key(raw).as_str() {
        "ldap" => {
            let invalid = |reason: String| AuthError::InvalidField {
                service: PromptKey::Directory.to_string(),
                field: "ldap".to_string(),
                reason,
            };
            let settings: DirectorySettings = config
                .section("ldap")
                .map_err(|e| invalid(e.to_string()))?
                .ok_or_else(|| AuthError::MissingField {
                    service: PromptKey::Directory.to_string(),
                    field: "ldap.host".to_string(),
                })?;
            let connector = connector.ok_or_else(|| AuthError::DirectoryUnavailable {
                service: PromptKey::Directory.to_string(),
                scheme: "ldap".to_string(),
            })?;

            let credentials = match settings.method {
                BindMethod::Simple => Some(resolver.credentials_for(
                    &PromptKey::Directory,
                    settings.username.clone(),
                    settings.password.clone(),
                )?),
                BindMethod::Anonymous => None,
            };

            let _span = debug_span!("bind", host = %settings.host, port = settings.port).entered();
            let directory = connector.bind(&settings, credentials.as_ref())?;
            info!(host = %settings.host, "Bound to directory");
            Ok(EnvironmentAuth::Directory(DirectorySession::new(
                settings,
                credentials,
                directory,
            )))
        }
        "credentials" => {
            let field = |name: &str| {
                config
                    .get_path(&format!("credentials.{name}"))
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            };
            let credentials =
                resolver.credentials_for(&PromptKey::Environment, field("username"), field("password"))?;
            debug!(operator = %credentials.username, "Environment credentials captured");
            Ok(EnvironmentAuth::Credentials(credentials))
        }
        other => Err(AuthError::UnsupportedScheme {
            service: PromptKey::Environment.to_string(),
            scheme: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Credentials, StaticDirectory};
    use crate::bus::{Message, listener};
    use crate::error::{PluginError, PluginResult};
    use crate::plugin::{Params, PluginDescriptor};
    use crate::testing::ScriptedPrompter;
    use serde_json::json;
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recorder {
        name: String,
        auth: Option<AuthRecord>,
        fail_shutdown: bool,
        stopped: Arc<AtomicUsize>,
    }

    impl Plugin for Recorder {
        fn name(&self) -> &str {
            &self.name
        }

        fn invoke(&self, operation: &str, _params: &Params) -> PluginResult<Value> {
            match operation {
                "whoami" => Ok(json!(self.auth.as_ref().and_then(|a| a.username.clone()))),
                "fail" => Err(PluginError::failed("requested failure")),
                _ => Err(PluginError::UnknownOperation {
                    plugin: self.name.clone(),
                    operation: operation.to_string(),
                }),
            }
        }

        fn shutdown(&self) -> PluginResult<()> {
            self.stopped.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                Err(PluginError::failed("socket already closed"))
            } else {
                Ok(())
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn stop_counter() -> Arc<AtomicUsize> {
        Arc::new(AtomicUsize::new(0))
    }

    fn create_recorder(ctx: &PluginContext<'_>) -> PluginResult<Arc<dyn Plugin>> {
        let auth = ctx.authenticate()?;
        let fail_shutdown = ctx
            .config()
            .get("fail_shutdown")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(Arc::new(Recorder {
            name: ctx.name().to_string(),
            auth,
            fail_shutdown,
            stopped: stop_counter(),
        }))
    }

    fn create_loop(ctx: &PluginContext<'_>) -> PluginResult<Arc<dyn Plugin>> {
        ctx.resolve("ouroboros")?;
        Err(PluginError::failed("unreachable"))
    }

    fn create_broken(_ctx: &PluginContext<'_>) -> PluginResult<Arc<dyn Plugin>> {
        Err(PluginError::failed("missing endpoint"))
    }

    fn catalog() -> PluginCatalog {
        let mut catalog = PluginCatalog::new();
        catalog
            .register(PluginDescriptor::framework("Jira", create_recorder))
            .unwrap();
        catalog
            .register(PluginDescriptor::global("Recorder", create_recorder))
            .unwrap();
        catalog
            .register(PluginDescriptor::global("Ouroboros", create_loop))
            .unwrap();
        catalog
            .register(PluginDescriptor::global("Broken", create_broken))
            .unwrap();
        catalog
    }

    fn collect_messages(env: &Environment) -> Arc<parking_lot::Mutex<Vec<Message>>> {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        env.subscribe(
            listener(move |m| {
                sink.lock().push(m.clone());
                Ok(())
            }),
            [Tag::INFO, Tag::WARN, Tag::ERROR, Tag::DRYRUN, Tag::TRACE],
        );
        seen
    }

    fn env_with(config: Value, prompter: Arc<ScriptedPrompter>) -> Environment {
        Environment::builder()
            .config(ConfigTree::from_value(config))
            .catalog(catalog())
            .prompter(prompter)
            .build()
    }

    #[test]
    fn cache_is_case_insensitive_and_constructs_once() {
        let prompter = Arc::new(ScriptedPrompter::new("ann", "pw"));
        let env = env_with(
            json!({ "plugins": { "jira": { "auth_type": "credentials" } } }),
            prompter.clone(),
        );
        let first = env.plugin("jira").unwrap();
        let second = env.plugin("JIRA").unwrap();
        let third = env.plugin(":Jira").unwrap();

        let a = first.plugin().unwrap();
        assert!(Arc::ptr_eq(a, second.plugin().unwrap()));
        assert!(Arc::ptr_eq(a, third.plugin().unwrap()));
        assert_eq!(prompter.prompts(), 2);
        assert_eq!(env.cached_names(), vec!["jira"]);
    }

    #[test]
    fn auth_is_stored_in_plugin_config() {
        let env = env_with(
            json!({ "plugins": { "jira": {
                "credentials": { "username": "svc", "password": "pw" }
            } } }),
            Arc::new(ScriptedPrompter::new("x", "y")),
        );

        let handle = env.plugin("jira").unwrap();
        assert_eq!(
            handle.call("whoami", &Params::new()).unwrap().into_value(),
            Some(json!("svc"))
        );
        assert_eq!(
            env.get_plugin_config("jira")[AUTH_KEY],
            json!({ "username": "svc", "password": "pw" })
        );
    }

    #[test]
    fn reauthenticate_prompts_again() {
        let prompter = Arc::new(ScriptedPrompter::new("ann", "pw"));
        let env = env_with(
            json!({ "plugins": { "jira": { "auth_type": "credentials" } } }),
            prompter.clone(),
        );

        env.authenticate("jira", false).unwrap();
        env.authenticate("jira", false).unwrap();
        assert_eq!(prompter.username_prompts(), 1);

        env.authenticate("jira", true).unwrap();
        assert_eq!(prompter.username_prompts(), 2);
    }

    #[test]
    fn unknown_required_fails_and_optional_is_honeypot() {
        let env = env_with(json!({}), Arc::new(ScriptedPrompter::new("a", "b")));

        let err = env.plugin("nonesuch").unwrap_err();
        assert!(matches!(err, ResolveError::ClassNotFound { ref name, .. } if name == "nonesuch"));

        let handle = env.optional("nonesuch");
        assert!(handle.is_absent());
        assert_eq!(
            handle.call("anything", &Params::new()).unwrap(),
            crate::plugin::Reply::Absent(HoneyPot)
        );
        assert!(!env.is_cached("nonesuch"));
    }

    #[test]
    fn construction_errors_name_the_plugin() {
        let env = env_with(json!({}), Arc::new(ScriptedPrompter::new("a", "b")));
        let err = env.plugin("broken").unwrap_err();
        let rendered = err.to_string();
        assert!(rendered.contains("broken"));
        assert!(rendered.contains("missing endpoint"));
        assert!(!env.is_cached("broken"));
    }

    #[test]
    fn class_override_selects_plugin() {
        let env = env_with(
            json!({ "plugins": {
                "tracker": { "plugin_class": "cosmic::Jira" },
                "recorder2": { "plugin_class": "Recorder" },
                "bogus": { "plugin_class": "cosmic::Recorder" }
            } }),
            Arc::new(ScriptedPrompter::new("a", "b")),
        );

        assert!(env.plugin("tracker").unwrap().is_live());
        assert!(env.plugin("recorder2").unwrap().is_live());
        assert!(matches!(
            env.plugin("bogus"),
            Err(ResolveError::ClassNotFound { .. })
        ));
    }

    #[test]
    fn resolution_cycle_is_detected() {
        let env = env_with(json!({}), Arc::new(ScriptedPrompter::new("a", "b")));
        let err = env.plugin("ouroboros").unwrap_err();
        match err {
            ResolveError::Construction { source, .. } => {
                assert!(matches!(
                    source,
                    PluginError::Resolve(ref inner) if matches!(**inner, ResolveError::Cycle { .. })
                ));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!env.is_cached("ouroboros"));
    }

    #[test]
    fn optional_unknown_plugin_end_to_end() {
        let env = env_with(
            json!({ "plugins": { "x": { "url": "http://x" } } }),
            Arc::new(ScriptedPrompter::new("a", "b")),
        );
        let seen = collect_messages(&env);

        let x = env.optional("x");
        assert_eq!(
            x.optional().call("do_something", &Params::new()),
            Some(crate::plugin::Reply::Absent(HoneyPot))
        );

        assert!(seen.lock().iter().all(|m| m.has_tag(&Tag::TRACE)
            && !m.has_tag(&Tag::ERROR)
            && !m.has_tag(&Tag::INFO)));
        let report = env.shutdown();
        assert!(report.stopped.is_empty());
        assert!(report.is_clean());
    }

    #[test]
    fn shutdown_continues_past_failures() {
        let env = env_with(
            json!({ "plugins": {
                "jira": { "fail_shutdown": true },
                "recorder": {}
            } }),
            Arc::new(ScriptedPrompter::new("a", "b")),
        );
        let seen = collect_messages(&env);
        env.plugin("jira").unwrap();
        env.plugin("recorder").unwrap();

        let report = env.shutdown();

        assert_eq!(report.stopped, vec!["recorder"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "jira");
        assert!(seen.lock().iter().any(|m| m.has_tag(&Tag::ERROR)
            && m.text().contains("socket already closed")));
        assert!(env.bus().is_empty());
        assert!(env.is_shut_down());

        assert_eq!(env.shutdown(), ShutdownReport::default());
        assert!(matches!(
            env.plugin("recorder"),
            Err(ResolveError::ShutDown { .. })
        ));
        assert!(env.optional("recorder").is_absent());
    }

    #[test]
    fn shutdown_hook_runs_once_per_cached_plugin() {
        let stopped = stop_counter();
        let env = env_with(json!({}), Arc::new(ScriptedPrompter::new("a", "b")));
        env.registry.lock().plugins.insert(
            "manual".to_string(),
            PluginState::Active(Arc::new(Recorder {
                name: "manual".into(),
                auth: None,
                fail_shutdown: false,
                stopped: Arc::clone(&stopped),
            })),
        );

        env.shutdown();
        env.shutdown();
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn credentials_environment_exposes_operator() {
        let env = env_with(
            json!({ "auth_type": "credentials", "credentials": { "username": "ops" } }),
            Arc::new(ScriptedPrompter::new("ignored", "pw")),
        );
        assert_eq!(env.operator().as_deref(), Some("ops"));
        assert!(matches!(env.auth(), EnvironmentAuth::Credentials(_)));
    }

    #[test]
    fn plugins_named_like_environment_prompts_get_their_own_answers() {
        let prompter = Arc::new(ScriptedPrompter::new("ann", "pw"));
        let env = env_with(
            json!({
                "auth_type": "credentials",
                "plugins": {
                    "environment": { "plugin_class": "Recorder", "auth_type": "credentials" },
                    "ldap": { "plugin_class": "Recorder", "auth_type": "credentials" }
                }
            }),
            prompter.clone(),
        );
        assert_eq!(prompter.prompts(), 2);

        env.plugin("environment").unwrap();
        assert_eq!(prompter.prompts(), 4);
        env.plugin("ldap").unwrap();
        assert_eq!(prompter.prompts(), 6);

        env.authenticate("environment", true).unwrap();
        assert_eq!(prompter.prompts(), 8);
        assert_eq!(env.operator().as_deref(), Some("ann"));
    }

    #[test]
    fn directory_bind_and_failure() {
        let directory = StaticDirectory::new()
            .require_credentials(Credentials::new("ops", "secret"))
            .with_entry("uid=ops,dc=example,dc=com", [("sshPublicKey", "ssh-ed25519 AAA")]);
        let config = json!({
            "auth_type": "ldap",
            "ldap": { "host": "dir", "base": "dc=example,dc=com", "username": "ops" },
            "plugins": { "ssh": { "plugin_class": "Recorder", "auth_type": "keys_from_env" } }
        });

        let env = Environment::builder()
            .config(ConfigTree::from_value(config.clone()))
            .catalog(catalog())
            .prompter(Arc::new(ScriptedPrompter::new("unused", "secret")))
            .directory_connector(Arc::new(directory.clone()))
            .build();
        assert!(env.auth().directory().is_some());
        assert_eq!(env.operator().as_deref(), Some("ops"));
        env.plugin("ssh").unwrap();
        assert_eq!(
            env.get_plugin_config("ssh")[AUTH_KEY],
            json!({ "key_data": ["ssh-ed25519 AAA"] })
        );

        let errors = Arc::new(parking_lot::Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&errors);
        let failed = Environment::builder()
            .config(ConfigTree::from_value(config))
            .catalog(catalog())
            .prompter(Arc::new(ScriptedPrompter::new("unused", "wrong")))
            .directory_connector(Arc::new(directory))
            .listener(
                listener(move |m| {
                    sink.lock().push(m.text().into_owned());
                    Ok(())
                }),
                [Tag::ERROR],
            )
            .build();
        assert!(failed.auth().directory().is_none());
        assert_eq!(errors.lock().len(), 1);
        assert!(errors.lock()[0].contains("bind"));
    }

    #[test]
    fn dry_run_is_fixed_at_build() {
        let env = Environment::builder()
            .catalog(PluginCatalog::new())
            .dry_run(true)
            .build();
        assert!(env.dry_run());
    }
}
