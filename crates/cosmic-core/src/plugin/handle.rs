//! What callers hold after resolving a plugin.
//!
//! A [`PluginHandle`] is either a live plugin or the [`HoneyPot`] that stands in
//! for one that could not be resolved. Both accept every call; the honeypot
//! answers with itself and does nothing.
//!
//! ```rust,ignore
//! let lb = env.optional("f5");
//! // Absent plugin: no-op. Failing call: reported as an `error` message.
//! lb.optional().call("disable_node", &params);
//! ```

use std::any::type_name;
use std::sync::Arc;

use serde_json::Value;

use super::contract::{Notifier, Params, Plugin};
use crate::error::{PluginError, PluginResult};

/// Stand-in for a plugin that could not be resolved.
///
/// Every operation is a no-op that returns the honeypot again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HoneyPot;

impl HoneyPot {
    /// Accepts any operation and returns itself.
    pub fn call(&self, _operation: &str, _params: &Params) -> Reply {
        Reply::Absent(*self)
    }
}

/// Result of a successful call through a [`PluginHandle`].
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// The operation's return value.
    Value(Value),
    /// The call reached a honeypot.
    Absent(HoneyPot),
}

impl Reply {
    /// Returns `true` if the call reached a honeypot.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent(_))
    }

    /// The returned value, if a live plugin answered.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent(_) => None,
        }
    }

    /// Consumes the reply, returning the value if a live plugin answered.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Absent(_) => None,
        }
    }
}

/// A resolved plugin, or the honeypot standing in for one.
#[derive(Debug, Clone)]
pub enum PluginHandle {
    /// A cached plugin instance.
    Live {
        /// The instance.
        plugin: Arc<dyn Plugin>,
        /// Publishes on the plugin's behalf.
        notifier: Notifier,
    },
    /// Resolution failed for an optional reference.
    Absent(HoneyPot),
}

impl PluginHandle {
    /// Returns `true` if this handle holds a live plugin.
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live { .. })
    }

    /// Returns `true` if this handle is a honeypot.
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent(_))
    }

    /// The live instance, if any.
    pub fn plugin(&self) -> Option<&Arc<dyn Plugin>> {
        match self {
            Self::Live { plugin, .. } => Some(plugin),
            Self::Absent(_) => None,
        }
    }

    /// Invokes `operation`, propagating any error.
    pub fn call(&self, operation: &str, params: &Params) -> PluginResult<Reply> {
        match self {
            Self::Live { plugin, .. } => plugin.invoke(operation, params).map(Reply::Value),
            Self::Absent(pot) => Ok(pot.call(operation, params)),
        }
    }

    /// Runs `f` against the concrete plugin type.
    ///
    /// Returns `Ok(None)` for a honeypot and [`PluginError::TypeMismatch`] if the
    /// live plugin is not a `T`.
    pub fn with<T, R, F>(&self, f: F) -> PluginResult<Option<R>>
    where
        T: Plugin,
        F: FnOnce(&T) -> PluginResult<R>,
    {
        match self {
            Self::Live { plugin, .. } => {
                let typed = plugin.as_any().downcast_ref::<T>().ok_or_else(|| {
                    PluginError::TypeMismatch {
                        plugin: plugin.name().to_string(),
                        expected: type_name::<T>(),
                    }
                })?;
                f(typed).map(Some)
            }
            Self::Absent(_) => Ok(None),
        }
    }

    /// The optional-call view of this handle.
    pub fn optional(&self) -> Optional<'_> {
        Optional { handle: self }
    }
}

/// Calls through this wrapper never fail.
///
/// An error is published as an `error` message tagged with the plugin name and
/// the call yields `None`.
#[derive(Debug, Clone, Copy)]
pub struct Optional<'a> {
    handle: &'a PluginHandle,
}

impl Optional<'_> {
    /// Invokes `operation`, reporting instead of returning any error.
    pub fn call(&self, operation: &str, params: &Params) -> Option<Reply> {
        match self.handle.call(operation, params) {
            Ok(reply) => Some(reply),
            Err(e) => {
                self.report(operation, &e);
                None
            }
        }
    }

    /// Runs `f` against the concrete plugin type, reporting any error.
    ///
    /// Returns `None` for a honeypot.
    pub fn with<T, R, F>(&self, operation: &str, f: F) -> Option<R>
    where
        T: Plugin,
        F: FnOnce(&T) -> PluginResult<R>,
    {
        match self.handle.with(f) {
            Ok(result) => result,
            Err(e) => {
                self.report(operation, &e);
                None
            }
        }
    }

    fn report(&self, operation: &str, error: &PluginError) {
        if let PluginHandle::Live { plugin, notifier } = self.handle {
            tracing::debug!(plugin = %plugin.name(), operation, error = %error, "Optional call failed");
            notifier.error(format!("{}.{operation} failed: {error}", plugin.name()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Message, MessageBus, Tag, listener};
    use parking_lot::Mutex;
    use serde_json::json;
    use std::any::Any;

    struct Flaky {
        calls: Mutex<u32>,
    }

    impl Plugin for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn invoke(&self, operation: &str, _params: &Params) -> PluginResult<Value> {
            *self.calls.lock() += 1;
            match operation {
                "ok" => Ok(json!("fine")),
                "boom" => Err(PluginError::failed("exploded")),
                _ => Err(PluginError::UnknownOperation {
                    plugin: "flaky".into(),
                    operation: operation.into(),
                }),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Other;

    impl Plugin for Other {
        fn name(&self) -> &str {
            "other"
        }

        fn invoke(&self, _operation: &str, _params: &Params) -> PluginResult<Value> {
            Ok(Value::Null)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn live(bus: &Arc<MessageBus>) -> PluginHandle {
        PluginHandle::Live {
            plugin: Arc::new(Flaky {
                calls: Mutex::new(0),
            }),
            notifier: Notifier::new(bus, "flaky"),
        }
    }

    fn capture(bus: &MessageBus) -> Arc<Mutex<Vec<Message>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(
            listener(move |m| {
                sink.lock().push(m.clone());
                Ok(())
            }),
            [Tag::ERROR, Tag::INFO, Tag::TRACE],
        );
        seen
    }

    #[test]
    fn honeypot_absorbs_every_call() {
        let handle = PluginHandle::Absent(HoneyPot);
        let params = Params::new();

        assert_eq!(
            handle.call("anything", &params).unwrap(),
            Reply::Absent(HoneyPot)
        );
        assert_eq!(
            handle.optional().call("anything", &params),
            Some(Reply::Absent(HoneyPot))
        );
        assert_eq!(handle.with::<Flaky, _, _>(|_| Ok(1)).unwrap(), None);
        assert_eq!(handle.optional().with::<Flaky, _, _>("op", |_| Ok(1)), None);
    }

    #[test]
    fn required_call_propagates_errors() {
        let bus = Arc::new(MessageBus::new());
        let seen = capture(&bus);
        let handle = live(&bus);

        assert_eq!(
            handle.call("ok", &Params::new()).unwrap().into_value(),
            Some(json!("fine"))
        );
        assert!(handle.call("boom", &Params::new()).is_err());
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn optional_call_reports_errors() {
        let bus = Arc::new(MessageBus::new());
        let seen = capture(&bus);
        let handle = live(&bus);

        assert_eq!(handle.optional().call("boom", &Params::new()), None);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].has_tag(&Tag::ERROR));
        assert!(seen[0].has_tag(&Tag::new("flaky")));
        assert!(seen[0].text().contains("exploded"));
    }

    #[test]
    fn typed_access_checks_type() {
        let bus = Arc::new(MessageBus::new());
        let handle = live(&bus);

        let calls = handle
            .with::<Flaky, _, _>(|p| {
                p.invoke("ok", &Params::new())?;
                Ok(*p.calls.lock())
            })
            .unwrap();
        assert_eq!(calls, Some(1));

        assert!(matches!(
            handle.with::<Other, _, _>(|_| Ok(())),
            Err(PluginError::TypeMismatch { .. })
        ));
    }
}
