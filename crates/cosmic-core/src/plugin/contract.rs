//! The contract every service plugin implements.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::bus::{MessageBus, PublishReport, Tag};
use crate::error::{PluginError, PluginResult};

/// Named parameters of a single operation call.
pub type Params = Map<String, Value>;

/// A facade over one external system.
///
/// Every operation takes a single mapping of named parameters and returns an
/// opaque JSON value. Implementations are looked up by name through the
/// [`PluginCatalog`](super::PluginCatalog) and constructed at most once per
/// environment.
pub trait Plugin: Any + Send + Sync {
    /// The lower-cased name the plugin was resolved under.
    fn name(&self) -> &str;

    /// Runs `operation` with `params`.
    fn invoke(&self, operation: &str, params: &Params) -> PluginResult<Value>;

    /// Releases external resources. Called once when the environment shuts down.
    fn shutdown(&self) -> PluginResult<()> {
        Ok(())
    }

    /// Returns `self` as `Any` for typed access.
    fn as_any(&self) -> &dyn Any;
}

impl fmt::Debug for dyn Plugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugin").field("name", &self.name()).finish()
    }
}

/// Extracts a required parameter.
pub fn param<T: DeserializeOwned>(params: &Params, name: &str) -> PluginResult<T> {
    match params.get(name) {
        None | Some(Value::Null) => Err(PluginError::invalid_parameter(name, "missing")),
        Some(value) => {
            T::deserialize(value).map_err(|e| PluginError::invalid_parameter(name, e.to_string()))
        }
    }
}

/// Extracts an optional parameter.
pub fn param_opt<T: DeserializeOwned>(params: &Params, name: &str) -> PluginResult<Option<T>> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => T::deserialize(value)
            .map(Some)
            .map_err(|e| PluginError::invalid_parameter(name, e.to_string())),
    }
}

// =============================================================================
// Notifier
// =============================================================================

/// Publishes messages on behalf of one plugin.
///
/// Every message carries the plugin's own tag in addition to the tags passed
/// in. Once the environment is gone, messages are written to standard output.
#[derive(Clone)]
pub struct Notifier {
    bus: Weak<MessageBus>,
    tag: Tag,
}

impl Notifier {
    /// Creates a notifier bound to `bus`.
    pub fn new(bus: &Arc<MessageBus>, tag: impl Into<Tag>) -> Self {
        Self {
            bus: Arc::downgrade(bus),
            tag: tag.into(),
        }
    }

    /// Creates a notifier with no bus.
    pub fn detached(tag: impl Into<Tag>) -> Self {
        Self {
            bus: Weak::new(),
            tag: tag.into(),
        }
    }

    /// The plugin's own tag.
    pub fn tag(&self) -> &Tag {
        &self.tag
    }

    /// Publishes `payload` under `tags` plus the plugin tag.
    pub fn notify<T: Into<Tag>>(
        &self,
        payload: impl Into<Value>,
        tags: impl IntoIterator<Item = T>,
    ) -> PublishReport {
        let tags = tags
            .into_iter()
            .map(Into::into)
            .chain(std::iter::once(self.tag.clone()));
        match self.bus.upgrade() {
            Some(bus) => bus.publish(payload, tags),
            None => {
                let payload = payload.into();
                if !payload.is_null() {
                    match payload {
                        Value::String(text) => println!("{text}"),
                        other => println!("{other}"),
                    }
                }
                PublishReport::default()
            }
        }
    }

    /// Publishes an `info` message.
    pub fn info(&self, payload: impl Into<Value>) -> PublishReport {
        self.notify(payload, [Tag::INFO])
    }

    /// Publishes a `warn` message.
    pub fn warn(&self, payload: impl Into<Value>) -> PublishReport {
        self.notify(payload, [Tag::WARN])
    }

    /// Publishes an `error` message.
    pub fn error(&self, payload: impl Into<Value>) -> PublishReport {
        self.notify(payload, [Tag::ERROR])
    }

    /// Publishes a `dryrun` message describing a skipped action.
    pub fn dry_run(&self, payload: impl Into<Value>) -> PublishReport {
        self.notify(payload, [Tag::DRYRUN])
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("tag", &self.tag)
            .field("attached", &(self.bus.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Message, listener};
    use parking_lot::Mutex;
    use serde_json::json;

    #[test]
    fn notify_adds_plugin_tag() {
        let bus = Arc::new(MessageBus::new());
        let seen = Arc::new(Mutex::new(Vec::<Message>::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            listener(move |m| {
                sink.lock().push(m.clone());
                Ok(())
            }),
            ["jira"],
        );

        let notifier = Notifier::new(&bus, "jira");
        let report = notifier.info("ticket opened");

        assert_eq!(report.delivered, 1);
        let seen = seen.lock();
        assert!(seen[0].has_tag(&Tag::INFO));
        assert!(seen[0].has_tag(&Tag::new("jira")));
    }

    #[test]
    fn detached_notifier_does_not_fail() {
        let bus = Arc::new(MessageBus::new());
        let notifier = Notifier::new(&bus, "x");
        drop(bus);
        assert_eq!(notifier.warn("still here"), PublishReport::default());
        assert_eq!(Notifier::detached("y").info(json!(null)), PublishReport::default());
    }

    #[test]
    fn params_are_typed() {
        let params = json!({ "count": 3, "label": "a" });
        let params = params.as_object().unwrap();

        assert_eq!(param::<u32>(params, "count").unwrap(), 3);
        assert_eq!(param_opt::<String>(params, "missing").unwrap(), None);
        assert!(matches!(
            param::<String>(params, "missing"),
            Err(PluginError::InvalidParameter { .. })
        ));
        assert!(matches!(
            param::<u32>(params, "label"),
            Err(PluginError::InvalidParameter { .. })
        ));
    }
}
