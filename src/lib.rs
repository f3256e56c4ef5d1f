//! HTTP request logging middleware.
//!
//! Wraps an Axum/tower service, emits a structured "request" line when a
//! request arrives and a "response" line when its body has been sent, and
//! redacts credentials, skip-listed headers and skip-listed query
//! parameters before anything reaches the log.
//!
//! ```no_run
//! use axum::{routing::get, Router};
//! use request_logger::{request_logger, RequestLoggerConfig, RequestLoggerLayer};
//!
//! let config = RequestLoggerConfig {
//!     skip_url_params: vec!["token".into()],
//!     skip_paths: vec!["/health".into()],
//!     ..Default::default()
//! };
//! let app: Router = Router::new()
//!     .route("/", get(|| async { "hello" }))
//!     .layer(request_logger(RequestLoggerLayer::new(config)));
//! ```

pub mod config;
pub mod http;
pub mod observability;
pub mod redact;

pub use config::{AppConfig, RequestLoggerConfig};
pub use http::context::{log_entry, log_entry_set_field, log_entry_set_fields, LogContext};
pub use http::middleware::{request_logger, RequestLoggerLayer};
pub use http::HttpServer;
pub use observability::{LogSink, Logger, MemorySink, TracingSink};
