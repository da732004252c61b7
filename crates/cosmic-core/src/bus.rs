//! Tag-filtered, synchronous publish/subscribe.
//!
//! The [`MessageBus`] is the audit trail of a run: plugins publish
//! human-readable messages tagged with severity-like labels (`info`, `error`,
//! `dryrun`, ...) and their own name, and listeners registered for any of those
//! tags receive them.
//!
//! Delivery is synchronous. [`MessageBus::publish`] does not return until every
//! matching registration has been delivered to, in registration order, so
//! listener side effects are ordered relative to the publishing code.
//!
//! # Delivery failures
//!
//! Each delivery is isolated: a listener returning `Err` does not prevent later
//! listeners from receiving the message. Once the round completes, every failure
//! is re-published as an `error`-tagged message to the matching listeners other
//! than the one that failed. A failure while reporting a failure is only logged.
//!
//! ```
//! use cosmic_core::bus::{MessageBus, Tag, listener};
//!
//! let bus = MessageBus::new();
//! let printer = listener(|m| {
//!     println!("{}", m.text());
//!     Ok(())
//! });
//! bus.subscribe(printer, [Tag::INFO]);
//! bus.publish("deploying", [Tag::INFO]);
//! ```

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{error, trace};

use crate::error::BoxError;

// =============================================================================
// Tags
// =============================================================================

/// A symbolic label attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(Cow<'static, str>);

impl Tag {
    /// Informational progress.
    pub const INFO: Tag = Tag(Cow::Borrowed("info"));
    /// Something worth the operator's attention.
    pub const WARN: Tag = Tag(Cow::Borrowed("warn"));
    /// A failure, including errors suppressed by optional calls.
    pub const ERROR: Tag = Tag(Cow::Borrowed("error"));
    /// What a destructive operation would have done outside dry-run mode.
    pub const DRYRUN: Tag = Tag(Cow::Borrowed("dryrun"));
    /// Verbose diagnostics.
    pub const TRACE: Tag = Tag(Cow::Borrowed("trace"));

    /// Creates a tag, stripping a leading `:` written in symbol spelling.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        match name.into() {
            Cow::Borrowed(s) => Tag(Cow::Borrowed(s.strip_prefix(':').unwrap_or(s))),
            Cow::Owned(s) if s.starts_with(':') => Tag(Cow::Owned(s[1..].to_string())),
            Cow::Owned(s) => Tag(Cow::Owned(s)),
        }
    }

    /// Returns the tag name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Tag {
    fn from(name: &'static str) -> Self {
        Tag::new(name)
    }
}

impl From<String> for Tag {
    fn from(name: String) -> Self {
        Tag::new(name)
    }
}

/// An ordered, duplicate-free set of tags.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(BTreeSet<Tag>);

impl TagSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tag.
    pub fn insert(&mut self, tag: impl Into<Tag>) -> bool {
        self.0.insert(tag.into())
    }

    /// Returns `true` if the set contains `tag`.
    pub fn contains(&self, tag: &Tag) -> bool {
        self.0.contains(tag)
    }

    /// Returns `true` if the two sets share at least one tag.
    pub fn intersects(&self, other: &TagSet) -> bool {
        self.0.iter().any(|t| other.0.contains(t))
    }

    /// Returns `true` if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the tags in order.
    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }
}

impl<T: Into<Tag>> FromIterator<T> for TagSet {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for TagSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Tag::as_str).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

// =============================================================================
// Messages and Listeners
// =============================================================================

/// A published payload and the tags it was published with.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    payload: Value,
    tags: TagSet,
}

impl Message {
    /// Creates a message.
    pub fn new(payload: impl Into<Value>, tags: TagSet) -> Self {
        Self {
            payload: payload.into(),
            tags,
        }
    }

    /// The opaque payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The tags the message was published with.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Returns `true` if the message carries `tag`.
    pub fn has_tag(&self, tag: &Tag) -> bool {
        self.tags.contains(tag)
    }

    /// Human-readable rendering of the payload.
    ///
    /// String payloads are returned verbatim; anything else is rendered as JSON.
    pub fn text(&self) -> Cow<'_, str> {
        match &self.payload {
            Value::String(s) => Cow::Borrowed(s),
            other => Cow::Owned(other.to_string()),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text())
    }
}

/// Anything that accepts delivered messages.
///
/// Implemented for every `Fn(&Message) -> Result<(), BoxError>` closure.
pub trait Listener: Send + Sync {
    /// Receives one message.
    fn deliver(&self, message: &Message) -> Result<(), BoxError>;
}

impl<F> Listener for F
where
    F: Fn(&Message) -> Result<(), BoxError> + Send + Sync,
{
    fn deliver(&self, message: &Message) -> Result<(), BoxError> {
        self(message)
    }
}

/// Wraps a closure as a shareable listener.
pub fn listener<F>(f: F) -> Arc<dyn Listener>
where
    F: Fn(&Message) -> Result<(), BoxError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Compares two listeners by the address of their shared allocation.
fn same_listener(a: &Arc<dyn Listener>, b: &Arc<dyn Listener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

// =============================================================================
// MessageBus
// =============================================================================

struct Registration {
    listener: Arc<dyn Listener>,
    tags: TagSet,
}

/// One failed delivery within a [`PublishReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    /// Position of the failing listener among the matched registrations.
    pub position: usize,
    /// Rendered error.
    pub error: String,
}

/// Outcome of a single [`MessageBus::publish`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Number of successful deliveries.
    pub delivered: usize,
    /// Deliveries whose listener returned an error.
    pub failures: Vec<DeliveryFailure>,
}

impl PublishReport {
    /// Returns `true` if every matched delivery succeeded.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// In-process, tag-filtered publish/subscribe.
#[derive(Default)]
pub struct MessageBus {
    registrations: RwLock<Vec<Registration>>,
}

impl MessageBus {
    /// Creates a bus with no registrations.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `tags`.
    ///
    /// An empty tag set is ignored. Registering the same listener again adds an
    /// independent registration; tag sets are never merged.
    pub fn subscribe<T: Into<Tag>>(
        &self,
        listener: Arc<dyn Listener>,
        tags: impl IntoIterator<Item = T>,
    ) {
        let tags: TagSet = tags.into_iter().collect();
        if tags.is_empty() {
            return;
        }
        trace!(tags = %tags, "Listener subscribed");
        self.registrations
            .write()
            .push(Registration { listener, tags });
    }

    /// Removes every registration of `listener`.
    ///
    /// Returns the number of registrations removed.
    pub fn unsubscribe(&self, listener: &Arc<dyn Listener>) -> usize {
        let mut registrations = self.registrations.write();
        let before = registrations.len();
        registrations.retain(|r| !same_listener(&r.listener, listener));
        before - registrations.len()
    }

    /// Publishes `payload` under `tags`.
    ///
    /// Nothing happens if `tags` is empty or the payload is `null`. Otherwise
    /// every registration whose tags intersect `tags` is delivered to, in
    /// registration order, before this call returns.
    pub fn publish<T: Into<Tag>>(
        &self,
        payload: impl Into<Value>,
        tags: impl IntoIterator<Item = T>,
    ) -> PublishReport {
        let payload = payload.into();
        let tags: TagSet = tags.into_iter().collect();
        if tags.is_empty() || payload.is_null() {
            return PublishReport::default();
        }
        let message = Message::new(payload, tags);

        // Snapshot so listeners may publish or (un)subscribe re-entrantly.
        let targets = self.matching(&message.tags, None);
        trace!(tags = %message.tags, listeners = targets.len(), "Publishing message");

        let mut report = PublishReport::default();
        for (position, listener) in targets.iter().enumerate() {
            match listener.deliver(&message) {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failures.push(DeliveryFailure {
                    position,
                    error: e.to_string(),
                }),
            }
        }

        for failure in &report.failures {
            self.report_failure(&message, &targets[failure.position], &failure.error);
        }
        report
    }

    /// Removes every registration.
    pub fn clear(&self) {
        self.registrations.write().clear();
    }

    /// Number of registrations currently held.
    pub fn len(&self) -> usize {
        self.registrations.read().len()
    }

    /// Returns `true` if nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.registrations.read().is_empty()
    }

    fn matching(&self, tags: &TagSet, except: Option<&Arc<dyn Listener>>) -> Vec<Arc<dyn Listener>> {
        self.registrations
            .read()
            .iter()
            .filter(|r| r.tags.intersects(tags))
            .filter(|r| except.is_none_or(|skip| !same_listener(&r.listener, skip)))
            .map(|r| Arc::clone(&r.listener))
            .collect()
    }

    fn report_failure(&self, original: &Message, failed: &Arc<dyn Listener>, reason: &str) {
        let report = Message::new(
            format!(
                "listener failed to deliver message tagged {}: {}",
                original.tags, reason
            ),
            [Tag::ERROR].into_iter().collect(),
        );
        for listener in self.matching(report.tags(), Some(failed)) {
            if let Err(e) = listener.deliver(&report) {
                error!(error = %e, original = %report, "Listener failed while reporting a delivery failure");
            }
        }
    }
}

impl fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBus")
            .field("registrations", &self.len())
            .finish()
    }
}
