//! HTTP status classification.
//!
//! # Responsibilities
//! - Map a status code to the severity its response line is emitted at
//! - Map a status code to the human label used in the response message
//!
//! # Design Decisions
//! - Both functions are total over `i32`; zero and negative codes stand for
//!   aborted or unknown exchanges and are logged as warnings
//! - Client errors warn, server errors error, everything else is info

use tracing::Level;

/// Severity for a response with the given status.
pub fn status_level(status: i32) -> Level {
    match status {
        i32::MIN..=0 => Level::WARN,
        1..=399 => Level::INFO,
        400..=499 => Level::WARN,
        _ => Level::ERROR,
    }
}

/// Human label for a response with the given status.
pub fn status_label(status: i32) -> &'static str {
    match status {
        100..=299 => "OK",
        300..=399 => "Redirect",
        400..=499 => "Client Error",
        500.. => "Server Error",
        _ => "Unknown",
    }
}
