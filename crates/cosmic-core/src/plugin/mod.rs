//! Plugin contract, handles and the class catalog.

mod catalog;
mod context;
mod contract;
mod handle;

pub use catalog::{FRAMEWORK_PREFIX, Namespace, PLUGINS, PluginCatalog, PluginDescriptor, PluginFactory};
pub use context::PluginContext;
pub use contract::{Notifier, Params, Plugin, param, param_opt};
pub use handle::{HoneyPot, Optional, PluginHandle, Reply};
