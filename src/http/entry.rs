//! Request log entry formatting.
//!
//! # Lifecycle
//! ```text
//! RequestLogFormatter::new_entry   started   (request line unless concise)
//!     → LogEntry::panic            panicked  (optional, emits nothing)
//!     → LogEntry::finish           finished  (response line)
//! ```
//!
//! `finish` consumes the entry, so it can run at most once. An entry that is
//! dropped without being finished (the request future was cancelled) still
//! emits its response line, with status 0.
//!
//! # Fields
//! - `httpRequest`: requestURL, requestMethod, requestPath, remoteIP, proto,
//!   requestID; plus scheme and header outside concise mode
//! - `httpResponse`: status, bytes, elapsed (ms); plus body (status >= 400)
//!   and header outside concise mode

use axum::body::Bytes;
use axum::extract::ConnectInfo;
use axum::http::{header, uri::Scheme, HeaderMap, Request};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::request_id::RequestId;

use crate::config::RequestLoggerConfig;
use crate::http::context::LogContext;
use crate::observability::{status_label, status_level, Logger};
use crate::redact::{redact_headers, redact_request_url};

/// Marker extension set by a TLS acceptor on requests received over TLS.
#[derive(Debug, Clone, Copy, Default)]
pub struct TlsInfo;

/// What the middleware observed about a finished response.
#[derive(Debug, Clone)]
pub struct ResponseSummary {
    /// Final status code; 0 when no response was produced.
    pub status: i32,
    /// Body bytes written to the client.
    pub bytes: u64,
    pub headers: HeaderMap,
    pub elapsed: Duration,
    /// Captured prefix of the body, only present for error statuses.
    pub body: Option<Bytes>,
}

impl ResponseSummary {
    /// Summary of an exchange that ended without a response.
    pub fn aborted(elapsed: Duration) -> Self {
        Self {
            status: 0,
            bytes: 0,
            headers: HeaderMap::new(),
            elapsed,
            body: None,
        }
    }
}

/// Creates a [`LogEntry`] per request from the logger configuration.
#[derive(Clone)]
pub struct RequestLogFormatter {
    logger: Logger,
    concise: bool,
    skip_url_params: Arc<[String]>,
    skip_headers: Arc<[String]>,
}

impl RequestLogFormatter {
    /// Header names in the skip list are matched case-insensitively.
    pub fn new(logger: Logger, config: &RequestLoggerConfig) -> Self {
        Self {
            logger,
            concise: config.concise,
            skip_url_params: config.skip_url_params.clone().into(),
            skip_headers: config
                .skip_headers
                .iter()
                .map(|name| name.trim().to_ascii_lowercase())
                .collect(),
        }
    }

    /// Start logging `request`.
    pub fn new_entry<B>(&self, request: &Request<B>) -> LogEntry {
        let logger = self
            .logger
            .with_field("httpRequest", self.request_fields(request));

        if !self.concise {
            logger.info(&format!(
                "Request: {} {}",
                request.method(),
                request.uri().path()
            ));
        }

        LogEntry {
            context: LogContext::new(logger),
            panic_message: None,
            concise: self.concise,
            skip_url_params: self.skip_url_params.clone(),
            skip_headers: self.skip_headers.clone(),
            started_at: Instant::now(),
            finished: false,
        }
    }

    fn request_fields<B>(&self, request: &Request<B>) -> Value {
        let uri = request.uri();
        let is_tls = uri.scheme() == Some(&Scheme::HTTPS)
            || request.extensions().get::<TlsInfo>().is_some();
        let scheme = if is_tls { "https" } else { "http" };

        let host = uri
            .authority()
            .map(|a| a.as_str())
            .or_else(|| {
                request
                    .headers()
                    .get(header::HOST)
                    .and_then(|h| h.to_str().ok())
            })
            .unwrap_or_default();
        let request_uri = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

        let remote_ip = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();

        let mut fields = Map::new();
        fields.insert(
            "requestURL".into(),
            redact_request_url(scheme, host, uri.path(), request_uri, &self.skip_url_params).into(),
        );
        fields.insert("requestMethod".into(), request.method().as_str().into());
        fields.insert("requestPath".into(), uri.path().into());
        fields.insert("remoteIP".into(), remote_ip.into());
        fields.insert("proto".into(), format!("{:?}", request.version()).into());
        if let Some(id) = request
            .extensions()
            .get::<RequestId>()
            .and_then(|id| id.header_value().to_str().ok())
        {
            fields.insert("requestID".into(), id.into());
        }

        if !self.concise {
            fields.insert("scheme".into(), scheme.into());
            if !request.headers().is_empty() {
                fields.insert(
                    "header".into(),
                    header_value(redact_headers(
                        request.headers(),
                        &self.skip_headers,
                        &self.skip_url_params,
                    )),
                );
            }
        }

        Value::Object(fields)
    }
}

impl fmt::Debug for RequestLogFormatter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestLogFormatter")
            .field("concise", &self.concise)
            .field("skip_url_params", &self.skip_url_params)
            .field("skip_headers", &self.skip_headers)
            .finish()
    }
}

/// Log state of one in-flight request.
#[derive(Debug)]
pub struct LogEntry {
    context: LogContext,
    panic_message: Option<String>,
    concise: bool,
    skip_url_params: Arc<[String]>,
    skip_headers: Arc<[String]>,
    started_at: Instant,
    finished: bool,
}

impl LogEntry {
    /// Context through which handlers reach this entry's logger.
    pub fn context(&self) -> &LogContext {
        &self.context
    }

    pub fn logger(&self) -> Logger {
        self.context.logger()
    }

    pub fn is_concise(&self) -> bool {
        self.concise
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Record a handler panic. Nothing is emitted until [`finish`](Self::finish).
    pub fn panic(&mut self, message: &str, stack: &str) {
        self.context.set_fields([
            ("stacktrace", Value::from(stack)),
            ("panic", Value::from(message)),
        ]);
        self.panic_message = Some(message.to_string());
    }

    /// Emit the response line.
    pub fn finish(mut self, summary: ResponseSummary) {
        self.emit(summary);
    }

    fn emit(&mut self, summary: ResponseSummary) {
        if self.finished {
            return;
        }
        self.finished = true;

        let status = summary.status;
        let mut message = format!("Response: {} {}", status, status_label(status));
        if let Some(panic) = &self.panic_message {
            message = format!("{} - {}", message, panic);
        }

        let mut response = Map::new();
        response.insert("status".into(), status.into());
        response.insert("bytes".into(), summary.bytes.into());
        response.insert(
            "elapsed".into(),
            (summary.elapsed.as_nanos() as f64 / 1_000_000.0).into(),
        );

        if !self.concise {
            if status >= 400 {
                let body = summary.body.unwrap_or_default();
                response.insert(
                    "body".into(),
                    String::from_utf8_lossy(&body).into_owned().into(),
                );
            }
            if !summary.headers.is_empty() {
                response.insert(
                    "header".into(),
                    header_value(redact_headers(
                        &summary.headers,
                        &self.skip_headers,
                        &self.skip_url_params,
                    )),
                );
            }
        }

        self.context
            .logger()
            .with_field("httpResponse", Value::Object(response))
            .log(status_level(status), &message);
    }
}

impl Drop for LogEntry {
    fn drop(&mut self) {
        if !self.finished {
            let elapsed = self.started_at.elapsed();
            self.emit(ResponseSummary::aborted(elapsed));
        }
    }
}

fn header_value(headers: BTreeMap<String, String>) -> Value {
    Value::Object(
        headers
            .into_iter()
            .map(|(name, value)| (name, Value::String(value)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use axum::http::{HeaderValue, StatusCode};
    use serde_json::json;
    use tracing::Level;

    fn formatter(sink: &Arc<MemorySink>, config: RequestLoggerConfig) -> RequestLogFormatter {
        RequestLogFormatter::new(Logger::new(sink.clone()), &config)
    }

    fn summary(status: StatusCode, body: Option<&'static [u8]>) -> ResponseSummary {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, "text/plain".parse().unwrap());
        ResponseSummary {
            status: status.as_u16() as i32,
            bytes: body.map(|b| b.len() as u64).unwrap_or_default(),
            headers,
            elapsed: Duration::from_micros(1500),
            body: body.map(Bytes::from_static),
        }
    }

    fn request() -> Request<()> {
        let mut request = Request::builder()
            .method("GET")
            .uri("/users?token=abc123&page=2")
            .header(header::HOST, "api.example.com")
            .header(header::AUTHORIZATION, "Bearer secret")
            .header("x-custom", "value")
            .body(())
            .unwrap();
        request.extensions_mut().insert(TlsInfo);
        request
            .extensions_mut()
            .insert(ConnectInfo("10.1.2.3:4567".parse::<SocketAddr>().unwrap()));
        request
            .extensions_mut()
            .insert(RequestId::new(HeaderValue::from_static("req-1")));
        request
    }

    #[test]
    fn test_request_line_fields() {
        let sink = Arc::new(MemorySink::new());
        let config = RequestLoggerConfig {
            skip_url_params: vec!["token".into()],
            ..Default::default()
        };
        let entry = formatter(&sink, config).new_entry(&request());

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::INFO);
        assert_eq!(records[0].message, "Request: GET /users");

        let req = &records[0].fields["httpRequest"];
        assert_eq!(
            req["requestURL"],
            json!("https://api.example.com/users?page=2&token=***")
        );
        assert_eq!(req["requestMethod"], json!("GET"));
        assert_eq!(req["requestPath"], json!("/users"));
        assert_eq!(req["remoteIP"], json!("10.1.2.3:4567"));
        assert_eq!(req["proto"], json!("HTTP/1.1"));
        assert_eq!(req["requestID"], json!("req-1"));
        assert_eq!(req["scheme"], json!("https"));
        assert_eq!(req["header"]["authorization"], json!("***"));
        assert_eq!(req["header"]["x-custom"], json!("value"));

        entry.finish(summary(StatusCode::OK, None));
    }

    #[test]
    fn test_concise_emits_no_request_line() {
        let sink = Arc::new(MemorySink::new());
        let config = RequestLoggerConfig {
            concise: true,
            ..Default::default()
        };
        let entry = formatter(&sink, config).new_entry(&request());
        assert!(sink.is_empty());

        entry.finish(summary(StatusCode::INTERNAL_SERVER_ERROR, Some(b"boom")));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::ERROR);
        assert_eq!(records[0].message, "Response: 500 Server Error");

        let req = &records[0].fields["httpRequest"];
        assert!(req.get("header").is_none());
        assert!(req.get("scheme").is_none());

        let resp = &records[0].fields["httpResponse"];
        assert_eq!(resp["status"], json!(500));
        assert_eq!(resp["bytes"], json!(4));
        assert!(resp.get("body").is_none());
        assert!(resp.get("header").is_none());
    }

    #[test]
    fn test_error_response_includes_body_and_headers() {
        let sink = Arc::new(MemorySink::new());
        let entry = formatter(&sink, RequestLoggerConfig::default()).new_entry(&request());

        entry.finish(summary(StatusCode::NOT_FOUND, Some(b"not here")));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].level, Level::WARN);
        assert_eq!(records[1].message, "Response: 404 Client Error");

        let resp = &records[1].fields["httpResponse"];
        assert_eq!(resp["body"], json!("not here"));
        assert_eq!(resp["header"]["content-type"], json!("text/plain"));
        assert_eq!(resp["elapsed"], json!(1.5));
    }

    #[test]
    fn test_success_response_has_no_body_field() {
        let sink = Arc::new(MemorySink::new());
        let entry = formatter(&sink, RequestLoggerConfig::default()).new_entry(&request());

        entry.finish(summary(StatusCode::OK, Some(b"fine")));

        let resp = &sink.records()[1].fields["httpResponse"];
        assert!(resp.get("body").is_none());
        assert_eq!(sink.records()[1].level, Level::INFO);
    }

    #[test]
    fn test_panic_is_appended_to_message() {
        let sink = Arc::new(MemorySink::new());
        let mut entry = formatter(&sink, RequestLoggerConfig::default()).new_entry(&request());

        entry.panic("index out of bounds", "frame 0\nframe 1");
        assert_eq!(sink.len(), 1);

        entry.finish(summary(StatusCode::INTERNAL_SERVER_ERROR, None));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[1].message,
            "Response: 500 Server Error - index out of bounds"
        );
        assert_eq!(records[1].fields["panic"], json!("index out of bounds"));
        assert_eq!(records[1].fields["stacktrace"], json!("frame 0\nframe 1"));
    }

    #[test]
    fn test_dropped_entry_logs_aborted_response() {
        let sink = Arc::new(MemorySink::new());
        let config = RequestLoggerConfig {
            concise: true,
            ..Default::default()
        };
        drop(formatter(&sink, config).new_entry(&request()));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].level, Level::WARN);
        assert_eq!(records[0].message, "Response: 0 Unknown");
    }

    #[test]
    fn test_skip_headers_match_case_insensitively() {
        let sink = Arc::new(MemorySink::new());
        let config = RequestLoggerConfig {
            skip_headers: vec!["X-Custom".into()],
            ..Default::default()
        };
        let entry = formatter(&sink, config).new_entry(&request());
        let req = &sink.records()[0].fields["httpRequest"];
        assert_eq!(req["header"]["x-custom"], json!("***"));
        entry.finish(summary(StatusCode::OK, None));
    }

    #[test]
    fn test_plain_http_without_host_extensions() {
        let sink = Arc::new(MemorySink::new());
        let request = Request::builder()
            .uri("http://localhost:3000/ping")
            .body(())
            .unwrap();
        let entry = formatter(&sink, RequestLoggerConfig::default()).new_entry(&request);

        let req = &sink.records()[0].fields["httpRequest"];
        assert_eq!(req["requestURL"], json!("http://localhost:3000/ping"));
        assert_eq!(req["scheme"], json!("http"));
        assert_eq!(req["remoteIP"], json!(""));
        assert!(req.get("requestID").is_none());
        assert!(req.get("header").is_none());
        entry.finish(summary(StatusCode::OK, None));
    }
}
