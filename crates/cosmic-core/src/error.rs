//! Unified error types for the Cosmic core.
//!
//! Each concern owns one enum; the environment converts between them where a
//! failure crosses a boundary (e.g. an [`AuthError`] raised while a plugin is
//! being constructed surfaces as [`ResolveError::Construction`]).

use thiserror::Error;

/// Boxed error type accepted from plugin and listener code.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// =============================================================================
// Directory Errors
// =============================================================================

/// Errors reported by a directory service connection.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// Binding to the directory server failed.
    #[error("directory bind to {host} failed: {reason}")]
    BindFailed {
        /// Directory host.
        host: String,
        /// Reason for failure.
        reason: String,
    },

    /// The requested entry does not exist.
    #[error("directory entry not found: {0}")]
    EntryNotFound(String),

    /// The entry exists but lacks the requested attribute.
    #[error("attribute '{attribute}' missing on directory entry {path}")]
    AttributeMissing {
        /// Entry path.
        path: String,
        /// Attribute name.
        attribute: String,
    },

    /// Any other directory failure.
    #[error("directory error: {0}")]
    Other(String),
}

// =============================================================================
// Authentication Errors
// =============================================================================

/// Errors that can occur while resolving credentials for a service.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// `auth_type` names a scheme the resolver does not know.
    #[error("unsupported auth_type '{scheme}' for {service}")]
    UnsupportedScheme {
        /// The service being authenticated.
        service: String,
        /// The configured scheme.
        scheme: String,
    },

    /// The scheme needs a directory connection but the environment has none.
    #[error("{service} uses '{scheme}' but the environment is not directory-authenticated")]
    DirectoryUnavailable {
        /// The service being authenticated.
        service: String,
        /// The configured scheme.
        scheme: String,
    },

    /// A required configuration field is absent.
    #[error("{service}: missing auth configuration field '{field}'")]
    MissingField {
        /// The service being authenticated.
        service: String,
        /// Dotted field name.
        field: String,
    },

    /// A configuration field has the wrong shape.
    #[error("{service}: invalid auth configuration field '{field}': {reason}")]
    InvalidField {
        /// The service being authenticated.
        service: String,
        /// Dotted field name.
        field: String,
        /// Deserialisation failure.
        reason: String,
    },

    /// Reading an answer from the operator failed.
    #[error("credential prompt failed: {0}")]
    Prompt(String),

    /// A directory lookup failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

// =============================================================================
// Plugin Errors
// =============================================================================

/// Errors raised by plugin construction or plugin operations.
#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin does not implement the requested operation.
    #[error("plugin '{plugin}' has no operation '{operation}'")]
    UnknownOperation {
        /// Plugin name.
        plugin: String,
        /// Operation name.
        operation: String,
    },

    /// A named parameter is missing or has the wrong shape.
    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The handle does not hold a plugin of the requested type.
    #[error("plugin '{plugin}' is not a {expected}")]
    TypeMismatch {
        /// Plugin name.
        plugin: String,
        /// Expected Rust type.
        expected: &'static str,
    },

    /// Credential resolution failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A dependent plugin could not be resolved.
    #[error(transparent)]
    Resolve(#[from] Box<ResolveError>),

    /// Free-form failure from the plugin's external system.
    #[error("{0}")]
    Failed(String),

    /// Wrapped error from a client library.
    #[error(transparent)]
    Other(BoxError),
}

impl PluginError {
    /// Creates a free-form failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wraps any error from a client library.
    pub fn other<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(err))
    }
}

impl From<ResolveError> for PluginError {
    fn from(err: ResolveError) -> Self {
        Self::Resolve(Box::new(err))
    }
}

// =============================================================================
// Resolution Errors
// =============================================================================

/// Errors that can occur while resolving a plugin name to an instance.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No registered class matched the name or its `plugin_class` override.
    #[error("no plugin class found for '{name}' (tried: {})", tried.join(", "))]
    ClassNotFound {
        /// Normalised plugin name.
        name: String,
        /// Qualified class names that were tried.
        tried: Vec<String>,
    },

    /// The factory returned an error.
    #[error("failed to construct plugin '{name}': {source}")]
    Construction {
        /// Normalised plugin name.
        name: String,
        /// Underlying cause.
        #[source]
        source: PluginError,
    },

    /// The plugin (transitively) requested itself while being constructed.
    #[error("plugin '{name}' requested itself while being constructed")]
    Cycle {
        /// Normalised plugin name.
        name: String,
    },

    /// The environment has already been shut down.
    #[error("environment is shut down; cannot resolve '{name}'")]
    ShutDown {
        /// Normalised plugin name.
        name: String,
    },
}

// =============================================================================
// Catalog Errors
// =============================================================================

/// Errors raised while registering plugin classes.
#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    /// A class with the same qualified name is already registered.
    #[error("plugin class '{0}' is already registered")]
    DuplicateClass(String),

    /// The class name is empty or contains whitespace.
    #[error("invalid plugin class name '{0}'")]
    InvalidClass(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for credential resolution.
pub type AuthResult<T> = Result<T, AuthError>;

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Result type for catalog registration.
pub type CatalogResult<T> = Result<T, CatalogError>;

/// Result type for plugin resolution.
pub type ResolveResult<T> = Result<T, ResolveError>;
