//! Signal handling for graceful shutdown.

use tracing::{info, warn};

/// Wait for a shutdown signal (SIGINT, SIGTERM, or SIGQUIT on Unix).
///
/// If a handler cannot be installed, falls back to Ctrl+C.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let handlers = (|| {
        Ok::<_, std::io::Error>((
            signal(SignalKind::interrupt())?,
            signal(SignalKind::terminate())?,
            signal(SignalKind::quit())?,
        ))
    })();

    let (mut sigint, mut sigterm, mut sigquit) = match handlers {
        Ok(handlers) => handlers,
        Err(e) => {
            warn!(error = %e, "Failed to install signal handlers, waiting for Ctrl+C");
            return ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            info!(message = "Signal received.", signal = "SIGINT");
        }
        _ = sigterm.recv() => {
            info!(message = "Signal received.", signal = "SIGTERM");
        }
        _ = sigquit.recv() => {
            info!(message = "Signal received.", signal = "SIGQUIT");
        }
    }
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(message = "Signal received.", signal = "Ctrl+C"),
        Err(e) => {
            // Never resolve: without any handler the process runs until killed.
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
