//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, sample routes)
//!     → SetRequestId (tower-http: reuse or generate x-request-id)
//!     → middleware.rs (skip paths, request line, panic recovery)
//!         → entry.rs (field sets, redaction, response line)
//!         → context.rs (per-request logger for handlers)
//!     → capture.rs (byte count, error body capture, finish)
//!     → Send to client
//! ```

pub mod capture;
pub mod context;
pub mod entry;
pub mod middleware;
pub mod server;

pub use capture::{CaptureBuffer, LoggedBody, CAPTURE_LIMIT};
pub use context::{log_entry, log_entry_set_field, log_entry_set_fields, LogContext};
pub use entry::{LogEntry, RequestLogFormatter, ResponseSummary, TlsInfo};
pub use middleware::{
    request_logger, ErrorHandler, PanicReport, RequestLoggerLayer, RequestLoggerService,
};
pub use server::HttpServer;
