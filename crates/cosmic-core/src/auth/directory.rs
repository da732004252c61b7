//! Directory-service seam used for environment-level authentication.
//!
//! The harness never speaks a directory wire protocol itself. A
//! [`DirectoryConnector`] is handed to the environment builder; when the
//! configuration selects `auth_type: ldap` the environment binds through it and
//! keeps the resulting [`Directory`] for credential lookups on behalf of plugins.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::{DirectoryError, DirectoryResult};

/// Username/password pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    /// Secret.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// How the environment binds to the directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMethod {
    /// Bind with a username and password, prompting for whichever is missing.
    #[default]
    Simple,
    /// Bind without credentials.
    Anonymous,
}

/// The top-level `ldap` configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySettings {
    /// Directory server host.
    pub host: String,

    /// Directory server port.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Search base appended to relative entry paths.
    #[serde(default)]
    pub base: Option<String>,

    /// Bind method.
    #[serde(default)]
    pub method: BindMethod,

    /// Bind username.
    #[serde(default)]
    pub username: Option<String>,

    /// Bind password.
    #[serde(default)]
    pub password: Option<String>,

    /// Path of an operator's own entry; `{username}` is substituted.
    #[serde(default = "default_user_template")]
    pub user_template: String,
}

fn default_port() -> u16 {
    389
}

fn default_user_template() -> String {
    "uid={username}".to_string()
}

impl DirectorySettings {
    /// Creates settings for `host` with every other field defaulted.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_port(),
            base: None,
            method: BindMethod::default(),
            username: None,
            password: None,
            user_template: default_user_template(),
        }
    }

    /// Expands a relative entry path against the configured search base.
    pub fn qualify(&self, path: &str) -> String {
        match &self.base {
            Some(base) if !base.is_empty() && !path.ends_with(base.as_str()) => {
                format!("{path},{base}")
            }
            _ => path.to_string(),
        }
    }

    /// Path of the entry belonging to `username`.
    pub fn user_path(&self, username: &str) -> String {
        self.qualify(&self.user_template.replace("{username}", username))
    }
}

/// Attribute values of one directory entry.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// A bound directory connection.
pub trait Directory: Send + Sync {
    /// Reads the named attributes of the entry at `path`.
    ///
    /// Attributes absent on the entry are omitted from the result.
    fn lookup(&self, path: &str, attributes: &[String]) -> DirectoryResult<Attributes>;
}

/// Opens directory connections.
pub trait DirectoryConnector: Send + Sync {
    /// Binds to the directory described by `settings`.
    fn bind(
        &self,
        settings: &DirectorySettings,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<Box<dyn Directory>>;
}

/// A bound directory plus how it was bound.
pub struct DirectorySession {
    settings: DirectorySettings,
    credentials: Option<Credentials>,
    directory: Box<dyn Directory>,
}

impl DirectorySession {
    /// Wraps a bound directory.
    pub fn new(
        settings: DirectorySettings,
        credentials: Option<Credentials>,
        directory: Box<dyn Directory>,
    ) -> Self {
        Self {
            settings,
            credentials,
            directory,
        }
    }

    /// The settings used to bind.
    pub fn settings(&self) -> &DirectorySettings {
        &self.settings
    }

    /// The credentials used to bind, absent for anonymous binds.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Reads the first value of each attribute, failing on any missing one.
    pub fn read(&self, path: &str, attributes: &[String]) -> DirectoryResult<Vec<String>> {
        let path = self.settings.qualify(path);
        let mut found = self.directory.lookup(&path, attributes)?;
        attributes
            .iter()
            .map(|attribute| {
                found
                    .remove(attribute)
                    .and_then(|values| values.into_iter().next())
                    .ok_or_else(|| DirectoryError::AttributeMissing {
                        path: path.clone(),
                        attribute: attribute.clone(),
                    })
            })
            .collect()
    }

    /// Reads every value of the named attributes, in attribute order.
    pub fn read_all(&self, path: &str, attributes: &[String]) -> DirectoryResult<Vec<String>> {
        let path = self.settings.qualify(path);
        let mut found = self.directory.lookup(&path, attributes)?;
        Ok(attributes
            .iter()
            .filter_map(|attribute| found.remove(attribute))
            .flatten()
            .collect())
    }
}

impl fmt::Debug for DirectorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorySession")
            .field("settings", &self.settings)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// StaticDirectory
// =============================================================================

#[derive(Default)]
struct Counters {
    binds: AtomicUsize,
    lookups: AtomicUsize,
}

/// An in-memory directory, useful for dry runs and tests.
///
/// Acts as its own [`DirectoryConnector`]; when built with
/// [`require_credentials`](Self::require_credentials) a bind with different
/// credentials fails. Clones share their bind and lookup counters.
#[derive(Clone, Default)]
pub struct StaticDirectory {
    entries: BTreeMap<String, Attributes>,
    required: Option<Credentials>,
    counters: Arc<Counters>,
}

impl StaticDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry; repeated attribute names accumulate values.
    pub fn with_entry<'a>(
        mut self,
        path: impl Into<String>,
        attributes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let entry = self.entries.entry(path.into()).or_default();
        for (name, value) in attributes {
            entry
                .entry(name.to_string())
                .or_default()
                .push(value.to_string());
        }
        self
    }

    /// Only accept binds with exactly these credentials.
    pub fn require_credentials(mut self, credentials: Credentials) -> Self {
        self.required = Some(credentials);
        self
    }

    /// Number of successful binds so far.
    pub fn binds(&self) -> usize {
        self.counters.binds.load(Ordering::SeqCst)
    }

    /// Number of lookups served so far.
    pub fn lookups(&self) -> usize {
        self.counters.lookups.load(Ordering::SeqCst)
    }
}

impl Directory for StaticDirectory {
    fn lookup(&self, path: &str, attributes: &[String]) -> DirectoryResult<Attributes> {
        self.counters.lookups.fetch_add(1, Ordering::SeqCst);
        let entry = self
            .entries
            .get(path)
            .ok_or_else(|| DirectoryError::EntryNotFound(path.to_string()))?;
        Ok(attributes
            .iter()
            .filter_map(|name| entry.get(name).map(|v| (name.clone(), v.clone())))
            .collect())
    }
}

impl DirectoryConnector for StaticDirectory {
    fn bind(
        &self,
        settings: &DirectorySettings,
        credentials: Option<&Credentials>,
    ) -> DirectoryResult<Box<dyn Directory>> {
        if let Some(required) = &self.required
            && credentials != Some(required)
        {
            return Err(DirectoryError::BindFailed {
                host: settings.host.clone(),
                reason: "invalid credentials".to_string(),
            });
        }
        self.counters.binds.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.clone()))
    }
}
