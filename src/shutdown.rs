use tokio::sync::mpsc;
use tracing::error;

/// A handle for managing graceful shutdown of the application
pub struct ShutdownManager {
    /// Receiver for shutdown signals
    rx: mpsc::Receiver<()>,
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownManager {
    /// Create a new ShutdownManager and setup signal handlers. Must be called from within a tokio
    /// runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);

        // Setup Ctrl+C handler
        let tx_clone = tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    let _ = tx_clone.send(()).await;
                }
                Err(err) => {
                    error!("error listening for ctrl+c: {err}");
                }
            }
        });

        // Setup SIGTERM handler on Unix platforms
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let tx_clone = tx.clone();
            tokio::spawn(async move {
                match signal(SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        let _ = tx_clone.send(()).await;
                    }
                    Err(err) => {
                        error!("error installing SIGTERM handler: {err}");
                    }
                }
            });
        }

        ShutdownManager { rx }
    }

    /// Resolves once a shutdown signal is received. Never resolves if no signal handler could be
    /// installed.
    pub async fn signalled(mut self) {
        if self.rx.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}
