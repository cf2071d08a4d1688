//! Operator log panel backend.
//!
//! [`CaptureLayer`] is a `tracing` layer that copies warnings and errors (or any
//! other minimum level) into a shared, fixed-capacity [`LogBuffer`]. Stability
//! violations and boundary alerts end up here, so a front end can show them next
//! to the data without parsing the console output.

use chrono::{DateTime, Local};
use std::collections::VecDeque;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Entries kept before the oldest is dropped.
pub const MAX_LOG_ENTRIES: usize = 1000;

/// Represents a single captured event.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub level: Level,
    pub target: String,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.level,
            self.message
        )
    }
}

/// A thread-safe, fixed-capacity log buffer.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<VecDeque<LogEntry>>>);

impl LogBuffer {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(VecDeque::with_capacity(MAX_LOG_ENTRIES))))
    }

    /// Append an entry, dropping the oldest one when full.
    pub fn push(&self, entry: LogEntry) {
        let mut buffer = self.lock();
        if buffer.len() >= MAX_LOG_ENTRIES {
            buffer.pop_front();
        }
        buffer.push_back(entry);
    }

    /// Copy of the current entries, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // A panic while holding the lock leaves a structurally valid deque behind.
    fn lock(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Layer that captures events at or above a minimum level into a [`LogBuffer`].
#[derive(Debug, Clone)]
pub struct CaptureLayer {
    buffer: LogBuffer,
    min_level: Level,
}

impl CaptureLayer {
    /// Capture `WARN` and `ERROR` events.
    pub fn new(buffer: LogBuffer) -> Self {
        Self {
            buffer,
            min_level: Level::WARN,
        }
    }

    /// Change the least severe level that is captured.
    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Returns a reference to the internal log buffer.
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        // tracing orders levels by verbosity: TRACE > ... > ERROR
        if *metadata.level() > self.min_level {
            return;
        }

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(LogEntry {
            timestamp: Local::now(),
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.finish(),
        });
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message.push_str(value);
        } else {
            self.record_debug(field, &value);
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            let _ = write!(self.message, "{value:?}");
            return;
        }
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{}={value:?}", field.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn captures_warnings_with_fields() {
        let buffer = LogBuffer::new();
        let subscriber =
            tracing_subscriber::registry().with(CaptureLayer::new(buffer.clone()));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("sweep complete");
            tracing::warn!(channel = 71, "channel not stable");
            tracing::error!("giving up");
        });

        let entries = buffer.snapshot();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, Level::WARN);
        assert_eq!(entries[0].message, "channel not stable channel=71");
        assert_eq!(entries[1].level, Level::ERROR);
        assert!(entries[1].to_string().ends_with("[ERROR] giving up"));
    }

    #[test]
    fn buffer_is_bounded() {
        let buffer = LogBuffer::new();
        for i in 0..(MAX_LOG_ENTRIES + 5) {
            buffer.push(LogEntry {
                timestamp: Local::now(),
                level: Level::WARN,
                target: "test".into(),
                message: i.to_string(),
            });
        }
        assert_eq!(buffer.len(), MAX_LOG_ENTRIES);
        assert_eq!(buffer.snapshot()[0].message, "5");
        buffer.clear();
        assert!(buffer.is_empty());
    }

    #[test]
    fn min_level_is_configurable() {
        let buffer = LogBuffer::new();
        let layer = CaptureLayer::new(buffer.clone()).with_min_level(Level::INFO);
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("kept");
            tracing::debug!("dropped");
        });
        assert_eq!(buffer.len(), 1);
    }
}
