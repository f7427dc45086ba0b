use anyhow::Result;
use tokio::sync::watch;
use tracing::info;

/// Graceful shutdown coordinator for the sweep loop and database pool.
///
/// Holds the sender half of a watch channel; long-running tasks subscribe and
/// stop when the flag flips.
pub struct ShutdownCoordinator {
    tx: watch::Sender<bool>,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Flip the shutdown flag; all subscribers observe it.
    pub fn trigger(&self) {
        info!("Shutdown triggered");
        let _ = self.tx.send(true);
    }

    /// Wait for SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) -> Result<()> {
        tokio::signal::ctrl_c().await?;
        info!("Received interrupt signal");
        self.trigger();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();
        assert!(!*rx.borrow());

        coordinator.trigger();
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }
}
