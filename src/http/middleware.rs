//! Request logging middleware.
//!
//! # Data Flow
//! ```text
//! Request
//!     → skip path?  ──yes──→ inner service, no logging
//!     → RequestLogFormatter::new_entry (request line unless concise)
//!     → inner service, inside the entry's LogContext scope
//!         └─ panic → LogEntry::panic → error handler / 500 response
//!     → LoggedBody (byte count, 512-byte capture)
//!     → body end/drop → LogEntry::finish (response line)
//! ```
//!
//! # Design Decisions
//! - The configuration is built by the caller and shared read-only
//! - Panics are recovered here so the response line always reflects them
//! - The stack trace is captured by a panic hook while the panicking frame
//!   is still on the stack; recovery only happens after unwinding
//! - Responses are re-boxed into `axum::body::Body` so the panic response
//!   and the handler response share a type

use axum::body::{Body, Bytes};
use axum::http::{Method, Request, Response, StatusCode};
use axum::BoxError;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use std::task::{Context, Poll};
use tower::layer::util::{Identity, Stack};
use tower::{Layer, Service, ServiceBuilder};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};

use crate::config::RequestLoggerConfig;
use crate::http::capture::LoggedBody;
use crate::http::context::LogContext;
use crate::http::entry::{RequestLogFormatter, ResponseSummary};
use crate::observability::{LogSink, Logger, TracingSink};

thread_local! {
    static PANIC_STACK: RefCell<Option<String>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Details of a recovered handler panic.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub message: String,
    pub stack: String,
    pub method: Method,
    pub path: String,
}

/// Renders the response sent after a handler panic.
pub type ErrorHandler = Arc<dyn Fn(&PanicReport) -> Response<Body> + Send + Sync>;

/// Layer that logs every request and response.
#[derive(Clone)]
pub struct RequestLoggerLayer {
    config: RequestLoggerConfig,
    sink: Arc<dyn LogSink>,
    error_handler: Option<ErrorHandler>,
}

impl RequestLoggerLayer {
    /// Log through `tracing` with the given settings.
    pub fn new(config: RequestLoggerConfig) -> Self {
        Self {
            config,
            sink: Arc::new(TracingSink),
            error_handler: None,
        }
    }

    /// Send events to `sink` instead of `tracing`.
    pub fn with_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Render panic responses with `handler` instead of an empty 500.
    pub fn with_error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&PanicReport) -> Response<Body> + Send + Sync + 'static,
    {
        self.error_handler = Some(Arc::new(handler));
        self
    }

    pub fn config(&self) -> &RequestLoggerConfig {
        &self.config
    }
}

impl Default for RequestLoggerLayer {
    fn default() -> Self {
        Self::new(RequestLoggerConfig::default())
    }
}

impl fmt::Debug for RequestLoggerLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLoggerLayer")
            .field("config", &self.config)
            .field("error_handler", &self.error_handler.is_some())
            .finish()
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLoggerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        install_panic_hook();
        let shared = Shared {
            formatter: RequestLogFormatter::new(Logger::new(self.sink.clone()), &self.config),
            skip_paths: self.config.skip_paths.iter().cloned().collect(),
            error_handler: self.error_handler.clone(),
        };
        RequestLoggerService {
            inner,
            shared: Arc::new(shared),
        }
    }
}

/// Request ID assignment, request logging, then request ID propagation.
pub type RequestLoggerStack = ServiceBuilder<
    Stack<
        PropagateRequestIdLayer,
        Stack<RequestLoggerLayer, Stack<SetRequestIdLayer<MakeRequestUuid>, Identity>>,
    >,
>;

/// Wrap `logger` in the `x-request-id` layers.
///
/// An inbound `x-request-id` is reused, otherwise a UUID v4 is generated
/// before the request line is logged. The ID is echoed on the response
/// inside the logger, so the logged response headers carry it too.
pub fn request_logger(logger: RequestLoggerLayer) -> RequestLoggerStack {
    ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(logger)
        .layer(PropagateRequestIdLayer::x_request_id())
}

struct Shared {
    formatter: RequestLogFormatter,
    skip_paths: HashSet<String>,
    error_handler: Option<ErrorHandler>,
}

/// Service produced by [`RequestLoggerLayer`].
#[derive(Clone)]
pub struct RequestLoggerService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RequestLoggerService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<ReqBody>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let shared = self.shared.clone();

        if shared.skip_paths.contains(request.uri().path()) {
            return Box::pin(async move {
                let response = inner.call(request).await?;
                Ok(response.map(Body::new))
            });
        }

        let mut entry = shared.formatter.new_entry(&request);
        let context = entry.context().clone();
        request.extensions_mut().insert(context.clone());

        let method = request.method().clone();
        let path = request.uri().path().to_string();

        Box::pin(async move {
            let downstream = async move { inner.call(request).await };
            let outcome = AssertUnwindSafe(context.scope(downstream))
                .catch_unwind()
                .await;

            let response = match outcome {
                Ok(Ok(response)) => response.map(Body::new),
                Ok(Err(err)) => {
                    let elapsed = entry.started_at().elapsed();
                    entry.finish(ResponseSummary::aborted(elapsed));
                    return Err(err);
                }
                Err(payload) => {
                    let report = PanicReport {
                        message: panic_message(payload.as_ref()),
                        stack: take_panic_stack(),
                        method,
                        path,
                    };
                    tracing::error!(
                        method = %report.method,
                        path = %report.path,
                        panic = %report.message,
                        stack = %report.stack,
                        "Recovered from handler panic"
                    );
                    entry.panic(&report.message, &report.stack);
                    recovery_response(shared.error_handler.as_ref(), &report)
                }
            };

            let (parts, body) = response.into_parts();
            let headers = if entry.is_concise() {
                Default::default()
            } else {
                parts.headers.clone()
            };
            let body = LoggedBody::new(body, entry, parts.status.as_u16(), headers);
            Ok(Response::from_parts(parts, Body::new(body)))
        })
    }
}

/// Chain a panic hook that records the stack of panics raised while a
/// request is being logged.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if LogContext::current().is_some() {
                let stack = Backtrace::force_capture().to_string();
                PANIC_STACK.with(|slot| *slot.borrow_mut() = Some(stack));
            }
            previous(info);
        }));
    });
}

/// Stack recorded by the hook for the panic just caught on this thread.
fn take_panic_stack() -> String {
    PANIC_STACK
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| Backtrace::force_capture().to_string())
}

/// Produce the response for a recovered panic.
///
/// A panicking error handler falls back to the bare 500.
fn recovery_response(handler: Option<&ErrorHandler>, report: &PanicReport) -> Response<Body> {
    let Some(handler) = handler else {
        return internal_error();
    };
    match std::panic::catch_unwind(AssertUnwindSafe(|| handler(report))) {
        Ok(response) => response,
        Err(_) => {
            tracing::error!(path = %report.path, "Error handler panicked");
            internal_error()
        }
    }
}

fn internal_error() -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
