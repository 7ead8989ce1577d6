//! Signal handling for graceful shutdown.
//!
//! SIGINT (Ctrl-C) and SIGTERM raise a stop flag. The watchdog checks it
//! before each tick and wakes from its inter-tick sleep when it is raised;
//! a tick already running is allowed to finish.
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

pub struct SignalHandler {
    stop: watch::Receiver<bool>,
}

impl SignalHandler {
    /// Install SIGINT/SIGTERM listeners. Must be called inside a tokio runtime.
    pub fn install() -> std::io::Result<SignalHandler> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            tokio::select! {
                _ = sigint.recv() => tracing::info!("received SIGINT, stopping after current tick"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, stopping after current tick"),
            }
            let _ = tx.send(true);
        });

        Ok(SignalHandler { stop: rx })
    }

    /// A handler driven by the returned sender instead of OS signals.
    #[cfg(test)]
    pub fn manual() -> (watch::Sender<bool>, SignalHandler) {
        let (tx, rx) = watch::channel(false);
        (tx, SignalHandler { stop: rx })
    }

    pub fn is_shutdown(&self) -> bool {
        *self.stop.borrow()
    }

    /// Resolves once shutdown is requested. Never resolves if the sender
    /// is dropped without requesting it.
    pub async fn wait(&mut self) {
        if self.stop.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_manual_starts_running() {
        let (_tx, handler) = SignalHandler::manual();
        assert!(!handler.is_shutdown());
    }

    #[tokio::test]
    async fn test_manual_shutdown_wakes_waiter() {
        let (tx, mut handler) = SignalHandler::manual();
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handler.wait())
            .await
            .unwrap();
        assert!(handler.is_shutdown());
    }

    #[tokio::test]
    async fn test_dropped_sender_never_wakes() {
        let (tx, mut handler) = SignalHandler::manual();
        drop(tx);
        let waited = tokio::time::timeout(Duration::from_millis(100), handler.wait()).await;
        assert!(waited.is_err());
        assert!(!handler.is_shutdown());
    }

    #[tokio::test]
    async fn test_install_succeeds() {
        let handler = SignalHandler::install().unwrap();
        assert!(!handler.is_shutdown());
    }
}
