//! Request-scoped logger access for handlers.
//!
//! The middleware runs the downstream service inside a task-local
//! [`LogContext`] scope and also stores the context as a request extension.
//! Handlers use the free functions below, or extract `LogContext` directly
//! when they hand work to spawned tasks that lose the task-local scope.
//!
//! A `LogContext` never mutates a [`Logger`]: setting a field stores a new,
//! field-augmented handle in the context slot.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde_json::Value;
use std::convert::Infallible;
use std::future::Future;
use std::sync::{Arc, RwLock};

use crate::observability::Logger;

tokio::task_local! {
    static CURRENT: LogContext;
}

/// Slot holding the current logger of one request.
#[derive(Debug, Clone)]
pub struct LogContext {
    slot: Arc<RwLock<Logger>>,
}

impl LogContext {
    pub fn new(logger: Logger) -> Self {
        Self {
            slot: Arc::new(RwLock::new(logger)),
        }
    }

    /// The logger currently associated with the request.
    pub fn logger(&self) -> Logger {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn set_field(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.replace(|logger| logger.with_field(key, value));
    }

    pub fn set_fields<I, K>(&self, fields: I)
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        self.replace(|logger| logger.with_fields(fields));
    }

    fn replace(&self, derive: impl FnOnce(&Logger) -> Logger) {
        let mut slot = self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = derive(&slot);
    }

    /// Run `future` with this context as the task-local current context.
    pub fn scope<F: Future>(self, future: F) -> impl Future<Output = F::Output> {
        CURRENT.scope(self, future)
    }

    /// The context of the request being handled by the current task.
    pub fn current() -> Option<LogContext> {
        CURRENT.try_with(Clone::clone).ok()
    }
}

impl<S> FromRequestParts<S> for LogContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<LogContext>()
            .cloned()
            .unwrap_or_else(|| LogContext::new(Logger::nop())))
    }
}

/// Logger of the current request, or a no-op logger outside a request.
pub fn log_entry() -> Logger {
    CURRENT
        .try_with(LogContext::logger)
        .unwrap_or_else(|_| Logger::nop())
}

/// Add a field to the current request's logger. No-op outside a request.
pub fn log_entry_set_field(key: impl Into<String>, value: impl Into<Value>) {
    let _ = CURRENT.try_with(|ctx| ctx.set_field(key, value));
}

/// Add fields to the current request's logger. No-op outside a request.
pub fn log_entry_set_fields<I, K>(fields: I)
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let _ = CURRENT.try_with(|ctx| ctx.set_fields(fields));
}
