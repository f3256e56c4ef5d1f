//! Shared utilities for integration tests.

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use axum::Router;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tower::ServiceExt;

use request_logger::{request_logger, MemorySink, RequestLoggerConfig, RequestLoggerLayer};

/// Wrap `routes` in the request logger, recording into a fresh memory sink.
pub fn logged_router(routes: Router, config: RequestLoggerConfig) -> (Router, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let layer = RequestLoggerLayer::new(config).with_sink(sink.clone());
    (routes.layer(request_logger(layer)), sink)
}

/// Send `request` through `router` and read the full body, which is what
/// finishes the log entry.
#[allow(dead_code)]
pub async fn send(router: Router, request: Request<Body>) -> (Response<()>, Bytes) {
    let response = router.oneshot(request).await.unwrap();
    let (parts, body) = response.into_parts();
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    (Response::from_parts(parts, ()), bytes)
}

#[allow(dead_code)]
pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

/// Serve `router` on an ephemeral port. Dropping the returned sender stops it.
#[allow(dead_code)]
pub async fn spawn_server(router: Router) -> (SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel::<()>();

    tokio::spawn(async move {
        let app = router.into_make_service_with_connect_info::<SocketAddr>();
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = rx.await;
            })
            .await;
    });

    (addr, tx)
}

/// JSON lines written by a test-scoped `tracing` subscriber.
#[derive(Clone, Default)]
#[allow(dead_code)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

#[allow(dead_code)]
impl CapturedLogs {
    pub fn lines(&self) -> Vec<serde_json::Value> {
        let output = self.0.lock().unwrap().clone();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Install a JSON subscriber for the current thread until the guard drops.
#[allow(dead_code)]
pub fn capture_tracing() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_writer(move || writer.clone())
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}
