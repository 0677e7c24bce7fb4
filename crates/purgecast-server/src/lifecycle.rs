//! Signal handling.
//!
//! Two out-of-band controls exist: interrupt/terminate stops the HTTP server
//! gracefully, and hang-up reloads the cache configuration without a restart.
//! Reload failures never take the process down; the previous registry stays
//! in effect.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::Server;

/// Resolves when SIGINT (Ctrl+C) or SIGTERM arrives; drives axum's graceful
/// shutdown.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received interrupt, shutting down");
        }
        _ = terminate => {
            tracing::info!("received terminate, shutting down");
        }
    }
}

/// Spawns the SIGHUP handler: every hang-up reloads the configuration and
/// re-warms the caches of the new registry.
///
/// # Arguments
/// * `server` - Arc-wrapped server whose registry is reloaded
///
/// # Returns
/// The handler task; it runs for the life of the process and never takes it
/// down on a failed reload
pub fn spawn_reload_handler(server: Arc<Server>) -> JoinHandle<()> {
    #[cfg(unix)]
    {
        tokio::spawn(async move {
            let mut hangup =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
                    .expect("failed to install signal handler");
            while hangup.recv().await.is_some() {
                tracing::info!("received hang-up, reloading configuration");
                if let Err(err) = server.reload().await {
                    tracing::error!(error = %err, "reload failed, keeping previous registry");
                }
            }
        })
    }

    #[cfg(not(unix))]
    {
        let _ = server;
        tokio::spawn(std::future::pending())
    }
}
