//! Demo HTTP server.
//!
//! # Responsibilities
//! - Create the Axum Router with a handful of sample handlers
//! - Wire up middleware (timeout, request ID, request logging)
//! - Bind server to listener with connect info for `remoteIP`
//! - Stop on a caller-provided shutdown future

use axum::{
    extract::Query,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;

use crate::config::AppConfig;
use crate::http::context::{log_entry, log_entry_set_field, LogContext};
use crate::http::middleware::{request_logger, RequestLoggerLayer};

/// HTTP server wrapping the sample routes in the request logger.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
}

impl HttpServer {
    /// Create a server that logs through `tracing`.
    pub fn new(config: AppConfig) -> Self {
        let logger = RequestLoggerLayer::new(config.logger.clone());
        Self::with_logger(config, logger)
    }

    /// Create a server with a preconfigured logging layer.
    pub fn with_logger(config: AppConfig, logger: RequestLoggerLayer) -> Self {
        let router = Self::build_router(&config, logger);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, logger: RequestLoggerLayer) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/users", get(users_handler))
            .route("/fail", get(fail_handler))
            .route("/redirect", get(redirect_handler))
            .route("/panic", get(panic_handler))
            .layer(request_logger(logger))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
    }

    /// Run the server until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            concise = self.config.logger.concise,
            skip_paths = ?self.config.logger.skip_paths,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The router, for in-process use without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }
}

async fn root_handler() -> &'static str {
    log_entry().info("Serving root");
    "request-logger demo"
}

async fn health_handler() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct UsersQuery {
    page: Option<u32>,
}

async fn users_handler(ctx: LogContext, Query(query): Query<UsersQuery>) -> Json<serde_json::Value> {
    let page = query.page.unwrap_or(1);
    log_entry_set_field("page", page);

    // Work moved onto another task keeps logging through the extracted context.
    let lookup = tokio::spawn(async move {
        ctx.set_field("userCount", 2);
        vec!["alice", "bob"]
    });
    let users = lookup.await.unwrap_or_default();

    Json(json!({ "page": page, "users": users }))
}

async fn fail_handler() -> Response {
    (StatusCode::SERVICE_UNAVAILABLE, "upstream unavailable").into_response()
}

async fn redirect_handler() -> Response {
    (
        StatusCode::FOUND,
        [(header::LOCATION, "https://idp.example.com/callback?code=secret&state=abc")],
    )
        .into_response()
}

async fn panic_handler() -> &'static str {
    panic!("sample handler panic")
}

/// Wait for shutdown signal (Ctrl+C).
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
