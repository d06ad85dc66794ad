//! request-deadline
//!
//! Serves the demo handler behind a request deadline.
//!
//! ```text
//! client → HttpServer → AccessLog → TimeoutHandler → Demo
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

use request_deadline::config::{load_config, validate_config, ConfigError, ServerConfig};
use request_deadline::demo::Demo;
use request_deadline::http::{access_log, chain, BoxHandler, HttpServer};
use request_deadline::lifecycle::{trigger_on_signal, Shutdown};
use request_deadline::observability::{logging, metrics};
use request_deadline::resilience::TimeoutHandler;

#[derive(Parser)]
#[command(name = "request-deadline")]
#[command(about = "HTTP server enforcing a deadline on every request", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(long)]
    bind: Option<String>,

    /// Override `timeouts.request_ms`.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.listener.bind_address = bind;
    }
    if let Some(ms) = cli.timeout_ms {
        config.timeouts.request_ms = ms;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init_logging(&config.observability);
    tracing::info!("request-deadline v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_ms = config.timeouts.request_ms,
        access_log = config.access_log.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let supervised: BoxHandler = Arc::new(TimeoutHandler::from_config(Demo, &config.timeouts));
    let mut middlewares = Vec::new();
    if config.access_log.enabled {
        middlewares.push(access_log(config.access_log.error_body_limit));
    }
    let handler = chain(supervised, middlewares);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let shutdown = Shutdown::new();
    trigger_on_signal(&shutdown);

    HttpServer::new(config, handler).run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
