//! Signal driven shutdown of the agent

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Cancel the returned token on SIGINT or SIGTERM.
///
/// Must be called from within a tokio runtime.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                }
                return;
            }
            Err(e) => warn!(error = %e, "unable to install SIGTERM handler"),
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(e) => {
            // Without a handler there is nothing to wait for; keep running
            warn!(error = %e, "unable to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
