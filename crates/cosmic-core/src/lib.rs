//! # Cosmic Core
//!
//! The plugin host at the centre of the Cosmic deployment harness.
//!
//! ## Components
//!
//! - **Configuration tree** ([`ConfigTree`]): key-normalised nested mapping
//! - **Message bus** ([`MessageBus`]): synchronous, tag-filtered publish/subscribe
//! - **Credential resolution** ([`AuthResolver`]): per-service auth schemes,
//!   prompting through a [`Prompter`] and reading from a [`Directory`]
//! - **Plugins** ([`Plugin`], [`PluginCatalog`]): the service-facade contract
//!   and the name-to-factory lookup
//! - **Environment** ([`Environment`]): resolves, caches and shuts down plugins
//!
//! ```text
//! ┌────────┐  plugin("jira")  ┌─────────────┐  PluginCatalog  ┌────────┐
//! │  Task  │─────────────────▶│ Environment │────────────────▶│ Plugin │
//! └────────┘                  └─────────────┘◀────────────────└────────┘
//!                                │       ▲      authenticate()    │
//!                                ▼       │                        │ notify()
//!                           ┌────────────┴┐                       │
//!                           │ MessageBus  │◀──────────────────────┘
//!                           └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use cosmic_core::prelude::*;
//!
//! let env = Environment::builder().config(tree).build();
//! env.optional("f5").optional().call("disable_node", &params);
//! env.shutdown();
//! ```

pub mod auth;
pub mod bus;
pub mod config;
pub mod environment;
pub mod error;
pub mod plugin;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{
    Attributes, AuthRecord, AuthResolver, AuthScheme, BindMethod, Credentials, Directory, DirectoryConnector,
    DirectorySession, DirectorySettings, EnvironmentAuth, PromptKey, Prompter, StaticDirectory,
    TerminalPrompter,
};
pub use bus::{
    DeliveryFailure, Listener, Message, MessageBus, PublishReport, Tag, TagSet, listener,
};
pub use config::ConfigTree;
pub use environment::{Environment, EnvironmentBuilder, ShutdownReport};
pub use error::{
    AuthError, AuthResult, BoxError, CatalogError, CatalogResult, DirectoryError,
    DirectoryResult, PluginError, PluginResult, ResolveError, ResolveResult,
};
pub use plugin::{
    HoneyPot, Namespace, Notifier, Optional, PLUGINS, Params, Plugin, PluginCatalog,
    PluginContext, PluginDescriptor, PluginFactory, PluginHandle, Reply,
};

// Used by plugin crates to register descriptors in `PLUGINS`.
pub use linkme;

/// Prelude for common imports.
pub mod prelude {
    pub use super::bus::{Message, Tag, listener};
    pub use super::environment::Environment;
    pub use super::error::{PluginError, PluginResult};
    pub use super::plugin::{
        Notifier, Params, Plugin, PluginContext, PluginDescriptor, PluginHandle, Reply, param,
        param_opt,
    };
}
