//! OS signal handling.
//!
//! # Responsibilities
//! - Wait for Ctrl+C (SIGINT)
//! - Translate it into a [`Shutdown`](crate::lifecycle::Shutdown) trigger

use crate::lifecycle::Shutdown;

/// Resolve once Ctrl+C is received.
///
/// If the handler cannot be installed the future never resolves, so the
/// server keeps running instead of exiting at startup.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(err) => {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    }
}

/// Trigger `shutdown` on Ctrl+C.
pub fn trigger_on_signal(shutdown: &Shutdown) -> tokio::task::JoinHandle<()> {
    let shutdown = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown.trigger();
    })
}
