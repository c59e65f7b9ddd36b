use futures::future::{BoxFuture, FutureExt};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use super::QrSource;

/// Text-injecting external scanner adapter (§4.4 implementation `(b)`):
/// such scanners behave like a keyboard, emitting the QR payload followed
/// by a newline on an input-event style stream.
pub struct InputEventQrSource<R> {
    lines: Mutex<tokio::io::Lines<BufReader<R>>>,
}

impl<R> InputEventQrSource<R>
where
    R: tokio::io::AsyncRead + Unpin,
{
    pub fn new(reader: R) -> Self {
        InputEventQrSource {
            lines: Mutex::new(BufReader::new(reader).lines()),
        }
    }
}

impl<R> QrSource for InputEventQrSource<R>
where
    R: tokio::io::AsyncRead + Send + Unpin,
{
    fn acquire(&self, deadline: tokio::time::Instant) -> BoxFuture<'_, Option<String>> {
        async move {
            let mut lines = self.lines.lock().await;
            match tokio::time::timeout_at(deadline, lines.next_line()).await {
                Ok(Ok(Some(line))) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        Some(trimmed.to_string())
                    }
                }
                Ok(Ok(None)) => None, // stream closed
                Ok(Err(err)) => {
                    tracing::warn!(?err, "input-event QR source read error");
                    None
                }
                Err(_elapsed) => None,
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_a_newline_delimited_qr() {
        let (mut client, server) = tokio::io::duplex(64);
        let source = InputEventQrSource::new(server);

        let write = async move {
            use tokio::io::AsyncWriteExt;
            client.write_all(b"1AANC00012345\n").await.unwrap();
        };

        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(200);
        let (_, qr) = tokio::join!(write, source.acquire(deadline));
        assert_eq!(qr, Some("1AANC00012345".to_string()));
    }

    #[tokio::test]
    async fn times_out_with_no_input() {
        let (_client, server) = tokio::io::duplex(64);
        let source = InputEventQrSource::new(server);
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(20);
        assert_eq!(source.acquire(deadline).await, None);
    }
}
