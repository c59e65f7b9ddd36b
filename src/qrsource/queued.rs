use futures::future::{BoxFuture, FutureExt};
use std::sync::Mutex;
use tokio::sync::mpsc;

use super::QrSource;

/// Test fixture (§4.4 implementation `(c)`): returns values pushed onto an
/// internal queue, or `None` once the deadline elapses with nothing
/// queued.
pub struct QueuedQrSource {
    rx: Mutex<mpsc::UnboundedReceiver<String>>,
    tx: mpsc::UnboundedSender<String>,
}

impl QueuedQrSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        QueuedQrSource {
            rx: Mutex::new(rx),
            tx,
        }
    }

    /// Queue a QR to be returned by a future `acquire` call.
    pub fn push(&self, qr: impl Into<String>) {
        let _ = self.tx.send(qr.into());
    }
}

impl Default for QueuedQrSource {
    fn default() -> Self {
        Self::new()
    }
}

impl QrSource for QueuedQrSource {
    fn acquire(&self, deadline: tokio::time::Instant) -> BoxFuture<'_, Option<String>> {
        async move {
            let mut rx = self.rx.lock().expect("queued QR source mutex poisoned");
            tokio::time::timeout_at(deadline, rx.recv()).await.ok().flatten()
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_queued_value() {
        let source = QueuedQrSource::new();
        source.push("1AANC00012345");
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(50);
        assert_eq!(source.acquire(deadline).await, Some("1AANC00012345".to_string()));
    }

    #[tokio::test]
    async fn times_out_with_nothing_queued() {
        let source = QueuedQrSource::new();
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(20);
        assert_eq!(source.acquire(deadline).await, None);
    }
}
