//! Name-to-factory lookup for plugin classes.
//!
//! Plugin crates contribute a [`PluginDescriptor`] to the [`PLUGINS`]
//! distributed slice; [`PluginCatalog::collect_all`] gathers them at startup.
//! Classes live in one of two namespaces: the framework namespace, spelled
//! `cosmic::Class` in a `plugin_class` override, and the global namespace,
//! spelled `Class`.
//!
//! ```rust,ignore
//! #[distributed_slice(PLUGINS)]
//! static JIRA: PluginDescriptor = PluginDescriptor::framework("Jira", Jira::create);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use linkme::distributed_slice;
use tracing::{debug, warn};

use super::context::PluginContext;
use super::contract::Plugin;
use crate::error::{CatalogError, CatalogResult, PluginResult};

/// Prefix selecting the framework namespace in a `plugin_class` override.
pub const FRAMEWORK_PREFIX: &str = "cosmic::";

/// Where a plugin class is registered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Namespace {
    /// Classes shipped with the harness. Tried first.
    Framework,
    /// Classes supplied by the user.
    Global,
}

impl Namespace {
    /// Renders `class` as it would be written in a `plugin_class` override.
    pub fn qualify(&self, class: &str) -> String {
        match self {
            Self::Framework => format!("{FRAMEWORK_PREFIX}{class}"),
            Self::Global => class.to_string(),
        }
    }
}

/// Constructs a plugin instance.
pub type PluginFactory = fn(&PluginContext<'_>) -> PluginResult<Arc<dyn Plugin>>;

/// A registered plugin class.
#[derive(Clone, Copy)]
pub struct PluginDescriptor {
    /// Namespace the class lives in.
    pub namespace: Namespace,
    /// Class name, matched case-sensitively.
    pub class: &'static str,
    /// Factory.
    pub create: PluginFactory,
}

impl PluginDescriptor {
    /// A framework-namespace class.
    pub const fn framework(class: &'static str, create: PluginFactory) -> Self {
        Self {
            namespace: Namespace::Framework,
            class,
            create,
        }
    }

    /// A global-namespace class.
    pub const fn global(class: &'static str, create: PluginFactory) -> Self {
        Self {
            namespace: Namespace::Global,
            class,
            create,
        }
    }

    /// The qualified class name.
    pub fn qualified_name(&self) -> String {
        self.namespace.qualify(self.class)
    }
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("namespace", &self.namespace)
            .field("class", &self.class)
            .finish_non_exhaustive()
    }
}

/// Plugin classes contributed at link time.
#[distributed_slice]
pub static PLUGINS: [PluginDescriptor];

/// Registered plugin classes keyed by namespace and class name.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    classes: BTreeMap<(Namespace, String), PluginDescriptor>,
}

impl PluginCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from every descriptor in [`PLUGINS`].
    ///
    /// If two descriptors share a qualified name a warning is emitted and the
    /// first one wins.
    pub fn collect_all() -> Self {
        let mut catalog = Self::new();
        for descriptor in PLUGINS.iter() {
            if let Err(e) = catalog.register(*descriptor) {
                warn!(error = %e, "Ignoring plugin class");
            }
        }
        debug!(classes = catalog.len(), "Collected plugin classes");
        catalog
    }

    /// Adds a class.
    pub fn register(&mut self, descriptor: PluginDescriptor) -> CatalogResult<()> {
        let class = descriptor.class;
        if class.is_empty() || class.contains(char::is_whitespace) {
            return Err(CatalogError::InvalidClass(class.to_string()));
        }
        let key = (descriptor.namespace, class.to_string());
        if self.classes.contains_key(&key) {
            return Err(CatalogError::DuplicateClass(descriptor.qualified_name()));
        }
        self.classes.insert(key, descriptor);
        Ok(())
    }

    /// Looks up an exact class.
    pub fn get(&self, namespace: Namespace, class: &str) -> Option<&PluginDescriptor> {
        self.classes.get(&(namespace, class.to_string()))
    }

    /// Every registered class, framework namespace first.
    pub fn descriptors(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.classes.values()
    }

    /// Number of registered classes.
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Returns `true` if no class is registered.
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// Qualified class names tried for `name`, in priority order.
    ///
    /// With an override only that class is tried. Otherwise each derivation
    /// of `name` (verbatim, upper case, camel case) is tried in the framework
    /// namespace, then the global namespace.
    pub fn candidates(name: &str, class_override: Option<&str>) -> Vec<(Namespace, String)> {
        if let Some(raw) = class_override {
            let raw = raw.trim();
            return vec![match raw.strip_prefix(FRAMEWORK_PREFIX) {
                Some(class) => (Namespace::Framework, class.to_string()),
                None => (
                    Namespace::Global,
                    raw.strip_prefix("::").unwrap_or(raw).to_string(),
                ),
            }];
        }

        let derivations = derive_class_names(name);
        [Namespace::Framework, Namespace::Global]
            .into_iter()
            .flat_map(|ns| derivations.iter().map(move |class| (ns, class.clone())))
            .collect()
    }

    /// Finds the class for `name`.
    ///
    /// On failure returns the qualified names that were tried.
    pub fn find(
        &self,
        name: &str,
        class_override: Option<&str>,
    ) -> Result<&PluginDescriptor, Vec<String>> {
        let candidates = Self::candidates(name, class_override);
        candidates
            .iter()
            .find_map(|(ns, class)| self.get(*ns, class))
            .ok_or_else(|| {
                candidates
                    .iter()
                    .map(|(ns, class)| ns.qualify(class))
                    .collect()
            })
    }
}

/// Verbatim, upper case, then camel case; duplicates removed.
fn derive_class_names(name: &str) -> Vec<String> {
    let camel: String = name
        .split(['_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect();

    let mut names: Vec<String> = Vec::with_capacity(3);
    for candidate in [name.to_string(), name.to_uppercase(), camel] {
        if !candidate.is_empty() && !names.contains(&candidate) {
            names.push(candidate);
        }
    }
    names
}
