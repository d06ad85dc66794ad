//! Graceful shutdown signal for the server and its watchers.

use tokio::sync::broadcast;

/// Hands out the signal that stops the server.
///
/// Clones share one channel. `HttpServer::run` and the Ctrl+C watcher each
/// hold a handle.
#[derive(Clone)]
pub struct Shutdown {
    /// Sender end shared by every clone.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a coordinator nobody is listening to yet.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Receiver that resolves once [`Shutdown::trigger`] is called.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Tell every subscriber to stop. Without subscribers this is a no-op.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of receivers that have not been dropped.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_reaches_every_subscriber() {
        let shutdown = Shutdown::new();
        let mut a = shutdown.subscribe();
        let mut b = shutdown.clone().subscribe();
        assert_eq!(shutdown.receiver_count(), 2);

        shutdown.trigger();
        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn trigger_without_subscribers_is_harmless() {
        let shutdown = Shutdown::default();
        assert_eq!(shutdown.receiver_count(), 0);
        shutdown.trigger();

        let mut late = shutdown.subscribe();
        shutdown.trigger();
        assert!(late.recv().await.is_ok());
    }
}
