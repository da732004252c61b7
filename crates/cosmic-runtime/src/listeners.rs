//! Standard bus listeners wired by the harness.

use std::io::{self, Write};
use std::sync::Arc;

use cosmic_core::{BoxError, Listener, Message, MessageBus, Tag, TagSet};
use parking_lot::Mutex;

/// Writes every delivered message as one line to a writer.
///
/// `dryrun` messages are prefixed so they stand out from real actions.
pub struct ConsoleListener {
    writer: Mutex<Box<dyn Write + Send>>,
    tags: TagSet,
}

impl ConsoleListener {
    /// Creates a listener writing to `writer` for `tags`.
    pub fn new<T: Into<Tag>>(
        writer: impl Write + Send + 'static,
        tags: impl IntoIterator<Item = T>,
    ) -> Self {
        Self {
            writer: Mutex::new(Box::new(writer)),
            tags: tags.into_iter().collect(),
        }
    }

    /// Standard output for `dryrun`, `warn`, `info`, and `trace` when verbose.
    pub fn stdout(verbose: bool) -> Self {
        let mut tags: TagSet = [Tag::DRYRUN, Tag::WARN, Tag::INFO].into_iter().collect();
        if verbose {
            tags.insert(Tag::TRACE);
        }
        Self {
            writer: Mutex::new(Box::new(io::stdout())),
            tags,
        }
    }

    /// Standard error for `error`.
    pub fn stderr() -> Self {
        Self::new(io::stderr(), [Tag::ERROR])
    }

    /// Tags this listener should be subscribed to.
    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    /// Subscribes this listener to its own tags on `bus`.
    pub fn attach(self, bus: &MessageBus) -> Arc<dyn Listener> {
        let tags = self.tags.clone();
        let listener: Arc<dyn Listener> = Arc::new(self);
        bus.subscribe(Arc::clone(&listener), tags.iter().cloned());
        listener
    }
}

impl Listener for ConsoleListener {
    fn deliver(&self, message: &Message) -> Result<(), BoxError> {
        let mut writer = self.writer.lock();
        if message.has_tag(&Tag::DRYRUN) {
            write!(writer, "[dry-run] ")?;
        } else if message.has_tag(&Tag::WARN) {
            write!(writer, "warning: ")?;
        } else if message.has_tag(&Tag::ERROR) {
            write!(writer, "error: ")?;
        }
        writeln!(writer, "{}", message.text())?;
        writer.flush()?;
        Ok(())
    }
}

/// The pair of console listeners every run gets.
pub fn console_listeners(verbose: bool) -> [ConsoleListener; 2] {
    [ConsoleListener::stdout(verbose), ConsoleListener::stderr()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_matching_messages_only() {
        let bus = MessageBus::new();
        let out = SharedBuffer::default();
        ConsoleListener::new(out.clone(), [Tag::INFO, Tag::DRYRUN]).attach(&bus);

        bus.publish("deploying build 42", [Tag::INFO]);
        bus.publish("would restart web01", [Tag::DRYRUN]);
        bus.publish("lookup detail", [Tag::TRACE]);

        assert_eq!(
            out.contents(),
            "deploying build 42\n[dry-run] would restart web01\n"
        );
    }

    #[test]
    fn errors_are_prefixed() {
        let bus = MessageBus::new();
        let err = SharedBuffer::default();
        ConsoleListener::new(err.clone(), [Tag::ERROR]).attach(&bus);

        bus.publish("f5.disable_node failed: timeout", [Tag::ERROR]);
        assert_eq!(err.contents(), "error: f5.disable_node failed: timeout\n");
    }

    #[test]
    fn verbose_stdout_includes_trace() {
        assert!(!ConsoleListener::stdout(false).tags().contains(&Tag::TRACE));
        assert!(ConsoleListener::stdout(true).tags().contains(&Tag::TRACE));
        assert!(ConsoleListener::stderr().tags().contains(&Tag::ERROR));
    }
}
