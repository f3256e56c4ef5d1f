//! Structured logger handle and sinks.
//!
//! # Responsibilities
//! - Carry an accumulated set of structured fields per request
//! - Emit leveled events with a message and the nested field map
//! - Provide a no-op handle for code running outside a request
//!
//! # Design Decisions
//! - A `Logger` is immutable: adding fields returns a new handle, the
//!   original stays valid for anyone still holding it
//! - Field maps are `Arc`-shared so cloning a handle is cheap
//! - The sink is a trait object; `TracingSink` forwards to `tracing`,
//!   `MemorySink` records events for inspection

use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::Level;

/// Ordered structured field map attached to a logger.
pub type Fields = Map<String, Value>;

/// Tracing target used by [`TracingSink`].
pub const LOG_TARGET: &str = "request_logger";

/// Backend that receives emitted events.
///
/// Implementations are shared across concurrent requests and must
/// synchronize internally.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str, fields: &Fields);
}

/// Request-scoped structured logger handle.
#[derive(Clone)]
pub struct Logger {
    sink: Option<Arc<dyn LogSink>>,
    fields: Arc<Fields>,
}

impl Logger {
    /// Create a logger with no fields writing to `sink`.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self {
            sink: Some(sink),
            fields: Arc::new(Fields::new()),
        }
    }

    /// A logger that discards every event.
    pub fn nop() -> Self {
        Self {
            sink: None,
            fields: Arc::new(Fields::new()),
        }
    }

    /// Returns true if this logger discards events.
    pub fn is_nop(&self) -> bool {
        self.sink.is_none()
    }

    /// Derive a logger with one more field. Existing keys are replaced.
    pub fn with_field(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.with_fields([(key.into(), value.into())])
    }

    /// Derive a logger with additional fields. Existing keys are replaced.
    pub fn with_fields<I, K>(&self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut merged = (*self.fields).clone();
        for (key, value) in fields {
            merged.insert(key.into(), value);
        }
        Self {
            sink: self.sink.clone(),
            fields: Arc::new(merged),
        }
    }

    /// Fields accumulated on this handle.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn log(&self, level: Level, message: &str) {
        if let Some(sink) = &self.sink {
            sink.log(level, message, &self.fields);
        }
    }

    pub fn info(&self, message: &str) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(Level::WARN, message);
    }

    pub fn error(&self, message: &str) {
        self.log(Level::ERROR, message);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::nop()
    }
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger")
            .field("nop", &self.is_nop())
            .field("fields", &self.fields)
            .finish()
    }
}

/// Sink that emits events through the `tracing` dispatcher.
///
/// `httpRequest` and `httpResponse` are recorded as their own event fields
/// (`http_request`, `http_response`); any other entries are grouped under
/// `fields`. Each is rendered as JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn log(&self, level: Level, message: &str, fields: &Fields) {
        let http_request = fields.get("httpRequest").map(tracing::field::display);
        let http_response = fields.get("httpResponse").map(tracing::field::display);
        let rest: Fields = fields
            .iter()
            .filter(|(key, _)| key.as_str() != "httpRequest" && key.as_str() != "httpResponse")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        let rest = (!rest.is_empty()).then(|| Value::Object(rest));
        let rest = rest.as_ref().map(tracing::field::display);

        macro_rules! emit {
            ($event:ident) => {
                tracing::$event!(
                    target: LOG_TARGET,
                    http_request = http_request,
                    http_response = http_response,
                    fields = rest,
                    "{}",
                    message
                )
            };
        }

        if level == Level::ERROR {
            emit!(error);
        } else if level == Level::WARN {
            emit!(warn);
        } else if level == Level::INFO {
            emit!(info);
        } else if level == Level::DEBUG {
            emit!(debug);
        } else {
            emit!(trace);
        }
    }
}

/// One event captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub message: String,
    pub fields: Fields,
}

/// Sink that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: Level, message: &str, fields: &Fields) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(LogRecord {
                level,
                message: message.to_string(),
                fields: fields.clone(),
            });
    }
}
