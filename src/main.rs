//! Request logger demo server.
//!
//! ```text
//!     Client Request
//!     ──────────────▶ TimeoutLayer ─▶ SetRequestId ─▶ RequestLoggerLayer ─▶ PropagateRequestId ─▶ handlers
//!                                                            │
//!                                        request line ◀──────┤
//!                                       response line ◀──────┘ (after body is sent)
//! ```

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;

use request_logger::config::{load_config, AppConfig};
use request_logger::http::server::shutdown_signal;
use request_logger::observability::logging::init_logging;
use request_logger::HttpServer;

#[derive(Parser)]
#[command(name = "request-logger")]
#[command(about = "Demo server for the HTTP request logging middleware", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Log in concise mode.
    #[arg(long)]
    concise: bool,

    /// Emit JSON log lines.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    config.logger.concise |= cli.concise;
    config.observability.json |= cli.json;

    init_logging(&config.observability.log_filter, config.observability.json)?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        skip_url_params = ?config.logger.skip_url_params,
        skip_headers = ?config.logger.skip_headers,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        address = %local_addr,
        "Listening for connections"
    );

    let server = HttpServer::new(config);
    server.run(listener, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
