//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Reject skip lists that could never match
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::AppConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("skip path '{0}' must start with '/'")]
    SkipPath(String),

    #[error("empty name in logger.{0}")]
    EmptyName(&'static str),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }

    let logger = &config.logger;
    for path in &logger.skip_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::SkipPath(path.clone()));
        }
    }
    if logger.skip_url_params.iter().any(|name| name.is_empty()) {
        errors.push(ValidationError::EmptyName("skip_url_params"));
    }
    if logger.skip_headers.iter().any(|name| name.trim().is_empty()) {
        errors.push(ValidationError::EmptyName("skip_headers"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
