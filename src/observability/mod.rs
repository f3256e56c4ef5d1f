//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Request logger entry
//!     → status.rs (severity + label from the final status)
//!     → logger.rs (Logger handle, fields merged per request)
//!     → LogSink (TracingSink by default)
//!     → logging.rs (subscriber: fmt or JSON to stdout)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through every request line
//! - The sink is pluggable so tests can capture events

pub mod logger;
pub mod logging;
pub mod status;

pub use logger::{Fields, LogRecord, LogSink, Logger, MemorySink, TracingSink};
pub use status::{status_label, status_level};
