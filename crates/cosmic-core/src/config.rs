//! The in-memory configuration tree.
//!
//! Documents are loaded once (see `cosmic-runtime`'s loader) and handed to the
//! environment as a [`ConfigTree`]. Every mapping key is normalised on the way
//! in, so a key written with symbol spelling (`:auth_type`) and one written as a
//! plain string (`auth_type`) resolve to the same entry.
//!
//! ```
//! use cosmic_core::config::ConfigTree;
//! use serde_json::json;
//!
//! let tree = ConfigTree::from_value(json!({
//!     ":plugins": { "jira": { ":auth_type": "keys" } }
//! }));
//! assert_eq!(tree.get_path("plugins.jira.auth_type"), Some(&json!("keys")));
//! ```

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Reserved key under which resolved credentials are cached in a plugin's sub-tree.
pub const AUTH_KEY: &str = "auth";

/// Top-level key holding per-plugin sub-trees.
pub const PLUGINS_KEY: &str = "plugins";

/// Canonical spelling of a configuration key.
///
/// Strips surrounding whitespace and a single leading `:`.
pub fn normalize_key(key: &str) -> String {
    let trimmed = key.trim();
    trimmed.strip_prefix(':').unwrap_or(trimmed).trim().to_string()
}

/// Recursively rewrites every mapping key in `value` to its canonical spelling.
///
/// When two spellings collide in one mapping the later one wins.
pub fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (normalize_key(&k), normalize_value(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_value).collect()),
        other => other,
    }
}

/// A key-normalised nested mapping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: Map<String, Value>,
}

impl ConfigTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from an arbitrary document.
    ///
    /// Non-mapping documents (a bare scalar or sequence) yield an empty tree.
    pub fn from_value(value: Value) -> Self {
        match normalize_value(value) {
            Value::Object(root) => Self { root },
            _ => Self::default(),
        }
    }

    /// Returns the whole tree as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    /// Looks up a top-level key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.root.get(&normalize_key(key))
    }

    /// Looks up a dotted path such as `plugins.jira.url`.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        segments.try_fold(self.get(first)?, |node, segment| {
            node.as_object()?.get(&normalize_key(segment))
        })
    }

    /// Looks up a top-level key and reads it as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Sets a top-level key, normalising the key and the value.
    pub fn insert(&mut self, key: &str, value: Value) -> Option<Value> {
        self.root.insert(normalize_key(key), normalize_value(value))
    }

    /// Returns `true` if the tree has no entries.
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// Deserialises the section under `key` into `T`.
    ///
    /// Returns `Ok(None)` when the section is absent.
    pub fn section<T: DeserializeOwned>(&self, key: &str) -> serde_json::Result<Option<T>> {
        self.get(key).map(|v| T::deserialize(v)).transpose()
    }

    /// Returns the names of every configured plugin, sorted.
    pub fn plugin_names(&self) -> Vec<String> {
        self.get(PLUGINS_KEY)
            .and_then(Value::as_object)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the `plugins.<name>` sub-tree, matching `name` case-insensitively.
    pub fn plugin(&self, name: &str) -> Option<&Map<String, Value>> {
        let plugins = self.get(PLUGINS_KEY)?.as_object()?;
        let wanted = normalize_key(name);
        plugins
            .get(&wanted)
            .or_else(|| {
                plugins
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(&wanted))
                    .map(|(_, v)| v)
            })
            .and_then(Value::as_object)
    }

    /// Mutable access to an existing `plugins.<name>` sub-tree.
    pub fn find_plugin_mut(&mut self, name: &str) -> Option<&mut Map<String, Value>> {
        let wanted = normalize_key(name);
        self.root
            .get_mut(PLUGINS_KEY)?
            .as_object_mut()?
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&wanted))
            .and_then(|(_, v)| v.as_object_mut())
    }

    /// Mutable access to the `plugins.<name>` sub-tree, creating it if needed.
    pub fn plugin_mut(&mut self, name: &str) -> &mut Map<String, Value> {
        let wanted = normalize_key(name);
        let plugins = ensure_object(
            self.root
                .entry(PLUGINS_KEY.to_string())
                .or_insert_with(|| Value::Object(Map::new())),
        );

        let key = plugins
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&wanted))
            .cloned()
            .unwrap_or(wanted);
        ensure_object(
            plugins
                .entry(key)
                .or_insert_with(|| Value::Object(Map::new())),
        )
    }
}

/// Replaces a non-mapping value with an empty mapping and borrows it as one.
fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just made a mapping"),
    }
}

impl From<Value> for ConfigTree {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn symbol_and_string_keys_resolve_identically() {
        let tree = ConfigTree::from_value(json!({
            ":auth_type": "ldap",
            "plugins": { ":jira": { ":credentials": { "username": "bob" } } }
        }));

        assert_eq!(tree.get_str("auth_type"), Some("ldap"));
        assert_eq!(tree.get_str(":auth_type"), Some("ldap"));
        assert_eq!(
            tree.get_path("plugins.jira.credentials.username"),
            Some(&json!("bob"))
        );
        assert_eq!(
            tree.get_path(":plugins.:jira.credentials.:username"),
            Some(&json!("bob"))
        );
    }

    #[test]
    fn normalizes_keys_inside_sequences() {
        let tree = ConfigTree::from_value(json!({
            "hosts": [ { ":name": "a" }, { "name": "b" } ]
        }));
        assert_eq!(tree.get("hosts"), Some(&json!([{ "name": "a" }, { "name": "b" }])));
    }

    #[test]
    fn non_mapping_document_is_empty() {
        assert!(ConfigTree::from_value(json!([1, 2, 3])).is_empty());
        assert!(ConfigTree::from_value(Value::Null).is_empty());
    }

    #[test]
    fn plugin_lookup_ignores_case() {
        let tree = ConfigTree::from_value(json!({
            "plugins": { "F5": { "host": "lb1" } }
        }));
        assert_eq!(tree.plugin("f5").and_then(|m| m.get("host")), Some(&json!("lb1")));
        assert!(tree.plugin("jira").is_none());
        assert_eq!(tree.plugin_names(), vec!["F5".to_string()]);
    }

    #[test]
    fn plugin_mut_reuses_existing_entry() {
        let mut tree = ConfigTree::from_value(json!({
            "plugins": { "F5": { "host": "lb1" } }
        }));
        tree.plugin_mut("f5").insert(AUTH_KEY.into(), json!({ "username": "ops" }));
        tree.plugin_mut("irc").insert("channel".into(), json!("#deploy"));

        assert_eq!(tree.get_path("plugins.F5.auth.username"), Some(&json!("ops")));
        assert_eq!(tree.get_path("plugins.irc.channel"), Some(&json!("#deploy")));
    }

    #[test]
    fn section_deserializes_typed_values() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Ldap {
            host: String,
            port: u16,
        }

        let tree = ConfigTree::from_value(json!({
            "ldap": { ":host": "dir.example.com", "port": 636 }
        }));
        let ldap: Option<Ldap> = tree.section("ldap").unwrap();
        assert_eq!(
            ldap,
            Some(Ldap {
                host: "dir.example.com".into(),
                port: 636
            })
        );
        assert!(tree.section::<Ldap>("missing").unwrap().is_none());
    }
}
