use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use super::QrSource;

/// Vendor trigger byte sent to request a single read from the imager.
const TRIGGER: u8 = 0x01;

/// Hardware imager adapter (§4.4 implementation `(a)`): sends a vendor
/// trigger byte over its own serial handle and reads a short
/// length-prefixed response frame `[len: u8][bytes...]`.
///
/// `acquire`'s caller races this against the link's own events, so the
/// returned future can be dropped mid-exchange (trigger sent, response
/// not yet fully read). The `desynced` flag, held in the same mutex as
/// the transport, remembers that an exchange didn't finish cleanly; the
/// next `exchange` drains whatever stale bytes the vendor still has in
/// flight before sending its own trigger, so a late straggler response
/// from the abandoned exchange can't be mistaken for the new one.
pub struct ImagerQrSource<T> {
    transport: Mutex<(T, bool)>,
}

impl<T> ImagerQrSource<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin,
{
    pub fn new(transport: T) -> Self {
        ImagerQrSource {
            transport: Mutex::new((transport, false)),
        }
    }

    async fn exchange(&self) -> std::io::Result<String> {
        let mut guard = self.transport.lock().await;
        let (transport, desynced) = &mut *guard;

        if *desynced {
            drain_stale_bytes(transport).await;
        }
        // Marked desynced up front: if this exchange is itself cancelled
        // or errors out before clearing it below, the next call drains.
        *desynced = true;

        transport.write_all(&[TRIGGER]).await?;
        transport.flush().await?;

        let mut len_buf = [0u8; 1];
        transport.read_exact(&mut len_buf).await?;
        let len = len_buf[0] as usize;
        let qr = if len == 0 {
            String::new()
        } else {
            let mut body = vec![0u8; len];
            transport.read_exact(&mut body).await?;
            String::from_utf8_lossy(&body).into_owned()
        };

        *desynced = false;
        Ok(qr)
    }
}

/// Reads and discards bytes until the transport is quiet for a short
/// grace period, resynchronizing after an abandoned exchange.
async fn drain_stale_bytes<T: AsyncRead + Unpin>(transport: &mut T) {
    let mut scratch = [0u8; 64];
    loop {
        match tokio::time::timeout(std::time::Duration::from_millis(20), transport.read(&mut scratch)).await {
            Ok(Ok(n)) if n > 0 => continue,
            _ => break,
        }
    }
}

impl<T> QrSource for ImagerQrSource<T>
where
    T: tokio::io::AsyncRead + tokio::io::AsyncWrite + Send + Unpin,
{
    fn acquire(&self, deadline: tokio::time::Instant) -> BoxFuture<'_, Option<String>> {
        async move {
            match tokio::time::timeout_at(deadline, self.exchange()).await {
                Ok(Ok(qr)) if !qr.is_empty() => Some(qr),
                Ok(Ok(_empty)) => None,
                Ok(Err(err)) => {
                    tracing::warn!(?err, "imager QR source transport error");
                    None
                }
                Err(_elapsed) => None,
            }
        }
        .boxed()
    }
}
