use tokio::sync::broadcast;
use tracing::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Shutdown signal types
#[derive(Debug, Clone, Copy)]
pub enum ShutdownSignal {
    /// Stop accepting requests, then drain the log engine
    Graceful,
}

/// Setup signal handlers for the server
///
/// Returns a broadcast sender for shutdown signals and a join handle for the
/// signal task. SIGTERM and SIGINT both trigger a graceful shutdown.
#[cfg(unix)]
pub fn setup_signal_handlers() -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(term), Ok(int)) => (term, int),
                (Err(e), _) | (_, Err(e)) => {
                    error!("Failed to install signal handlers, falling back to Ctrl+C: {}", e);
                    wait_for_ctrl_c(&tx_clone).await;
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, initiating graceful shutdown");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, initiating graceful shutdown");
            }
        }
        let _ = tx_clone.send(ShutdownSignal::Graceful);
    });

    (shutdown_tx, handle)
}

/// Windows placeholder - only Ctrl+C is supported
#[cfg(not(unix))]
pub fn setup_signal_handlers() -> (
    broadcast::Sender<ShutdownSignal>,
    tokio::task::JoinHandle<()>,
) {
    let (shutdown_tx, _) = broadcast::channel(16);
    let tx_clone = shutdown_tx.clone();

    let handle = tokio::spawn(async move {
        wait_for_ctrl_c(&tx_clone).await;
    });

    (shutdown_tx, handle)
}

async fn wait_for_ctrl_c(tx: &broadcast::Sender<ShutdownSignal>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Ctrl+C received, initiating shutdown");
            let _ = tx.send(ShutdownSignal::Graceful);
        }
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
    }
}
