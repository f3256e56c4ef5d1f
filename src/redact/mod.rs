//! Redaction of sensitive request and response data.
//!
//! # Data Flow
//! ```text
//! request URI ─→ query.rs (mask skip-listed query values) ─→ requestURL field
//! headers     ─→ headers.rs (mask credentials, skip-listed names,
//!                            query values inside `location`) ─→ header field
//! ```
//!
//! # Design Decisions
//! - Fail closed: anything that cannot be parsed is dropped or masked
//! - All functions are total; the worst outcome is over-redaction
//! - Masked values are replaced by the literal `***`

pub mod headers;
pub mod query;

pub use headers::redact_headers;
pub use query::{redact_query_params, redact_request_url};

/// Replacement for every redacted value.
pub const MASK: &str = "***";
