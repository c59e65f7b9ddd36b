//! PLC Link (§4.5): the framed byte-level protocol handler over the
//! serial port, coordinated with the ready/busy GPIO line (via the
//! Supervisor, which is the HAL's sole owner per §3 "Ownership") and a
//! per-request timeout.
//!
//! A single task owns the UART and the link-side state machine
//! (`IDLE` / `AWAITING_SCAN` / `DOWN`), driven by `tokio::select!` over
//! three sources: bytes arriving from the PLC, response commands handed
//! down from the application task, and the link's own backstop deadline.
//! This mirrors §5's requirement that the link "emits exactly one
//! response byte per received scan command" even if the application
//! never decides.

mod tokenizer;

pub use tokenizer::{Frame, Token, Tokenizer};

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

/// Commands arriving from the PLC, outside of any `<TAG:...>` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanRequest {
    /// `0x14`: retry allowed.
    Retry,
    /// `0x13`: final attempt.
    Final,
}

/// Events the link emits to the application task (§5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    Scan(ScanRequest),
    /// `0x00`: informational STOP/idle indicator.
    Stop,
    Frame(Frame),
    /// A second scan command arrived while one was already pending
    /// (§4.5): the link has already discarded the pending scan and sent
    /// `'S'`; this informs the application so it can drop its
    /// `PendingScan` bookkeeping before the just-forwarded new `Scan`
    /// event arrives.
    ProtocolError,
    /// The link's own backstop deadline elapsed before the application
    /// decided; the link has already sent `'Q'`. Distinct from the
    /// application's own (shorter) QR-acquire timeout, which normally
    /// wins the race and calls [`LinkHandle::send_result`] first.
    DeadlineElapsed,
    LinkDown(String),
}

/// Commands the application hands down to the link task.
enum Command {
    SendResult(u8, oneshot::Sender<()>),
    SendOob(u8, oneshot::Sender<()>),
}

/// Handle the application task uses to talk to a running link task.
#[derive(Clone)]
pub struct LinkHandle {
    commands: mpsc::Sender<Command>,
}

impl LinkHandle {
    /// Send the single response byte for the currently pending scan
    /// (§6.1) and return the link to `IDLE`. A no-op send error (link
    /// task gone) is surfaced as `Err` so the caller can treat it the
    /// same as any other link-down condition.
    pub async fn send_result(&self, byte: u8) -> Result<(), LinkClosed> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::SendResult(byte, tx))
            .await
            .map_err(|_| LinkClosed)?;
        rx.await.map_err(|_| LinkClosed)
    }

    /// Send an out-of-band byte (`'G'`/`'H'`), not tied to a pending scan.
    pub async fn send_oob(&self, byte: u8) -> Result<(), LinkClosed> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::SendOob(byte, tx))
            .await
            .map_err(|_| LinkClosed)?;
        rx.await.map_err(|_| LinkClosed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("PLC link is no longer running")]
pub struct LinkClosed;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    Idle,
    AwaitingScan,
}

/// Reopens the transport after a transient I/O failure (§7: "up to one
/// reopen attempt; on second failure go to `DOWN`"). Boxed so callers with
/// a concrete reopen strategy (e.g. re-probing the serial device path)
/// don't need to name the future type.
pub type Reopen<P> = Box<dyn Fn() -> BoxFuture<'static, std::io::Result<P>> + Send>;

/// Spawn the link task over `port`, returning a [`LinkHandle`] for
/// sending responses and a receiver of [`LinkEvent`]s. No reopen strategy
/// is available: any I/O failure is reported as `LinkDown` immediately.
/// Used by tests driving an in-process duplex pair that can't be reopened.
pub fn spawn<P>(port: P, response_timeout: std::time::Duration) -> (LinkHandle, mpsc::Receiver<LinkEvent>)
where
    P: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    spawn_with_reopen(port, None, response_timeout)
}

/// Like [`spawn`], but given a `reopen` strategy, a transient read/write
/// failure gets one reopen attempt before the link declares itself down.
pub fn spawn_with_reopen<P>(
    port: P,
    reopen: Option<Reopen<P>>,
    response_timeout: std::time::Duration,
) -> (LinkHandle, mpsc::Receiver<LinkEvent>)
where
    P: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(32);
    let (command_tx, command_rx) = mpsc::channel(8);

    tokio::spawn(run(port, reopen, response_timeout, command_rx, event_tx));

    (LinkHandle { commands: command_tx }, event_rx)
}

/// Attempt the single allowed reopen (§7). Returns the fresh transport on
/// success; `None` means the caller should declare the link down.
async fn try_reopen<P>(reopen: &Option<Reopen<P>>) -> Option<P> {
    let strategy = reopen.as_ref()?;
    match strategy().await {
        Ok(port) => {
            tracing::info!("PLC serial port reopened after a transient I/O error");
            Some(port)
        }
        Err(err) => {
            tracing::error!(?err, "reopening PLC serial port failed; link going down");
            None
        }
    }
}

async fn run<P>(
    mut port: P,
    reopen: Option<Reopen<P>>,
    response_timeout: std::time::Duration,
    mut commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<LinkEvent>,
) where
    P: AsyncRead + AsyncWrite + Unpin,
{
    let mut tokenizer = Tokenizer::new();
    let mut state = LinkState::Idle;
    let mut buf = [0u8; 256];
    let mut deadline: Option<tokio::time::Instant> = None;

    loop {
        let sleep = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;

            read = port.read(&mut buf) => {
                match read {
                    Ok(0) | Err(_) => {
                        let reason = match &read {
                            Ok(_) => "serial port closed (EOF)".to_string(),
                            Err(err) => err.to_string(),
                        };
                        match try_reopen(&reopen).await {
                            Some(new_port) => {
                                port = new_port;
                                // Bytes buffered mid-frame on the old
                                // connection are unrecoverable; start the
                                // frame tokenizer over.
                                tokenizer = Tokenizer::new();
                            }
                            None => {
                                let _ = events.send(LinkEvent::LinkDown(reason)).await;
                                return;
                            }
                        }
                    }
                    Ok(n) => {
                        for token in tokenizer.feed(&buf[..n]) {
                            match token {
                                Token::Byte(0x14) | Token::Byte(0x13) => {
                                    let request = if token == Token::Byte(0x13) {
                                        ScanRequest::Final
                                    } else {
                                        ScanRequest::Retry
                                    };

                                    if state == LinkState::AwaitingScan {
                                        if !write_byte_reopening(&mut port, &mut tokenizer, &reopen, b'S').await {
                                            let _ = events.send(LinkEvent::LinkDown("write failed sending protocol-error byte".into())).await;
                                            return;
                                        }
                                        if events.send(LinkEvent::ProtocolError).await.is_err() {
                                            return;
                                        }
                                    }

                                    state = LinkState::AwaitingScan;
                                    deadline = Some(tokio::time::Instant::now() + response_timeout);
                                    if events.send(LinkEvent::Scan(request)).await.is_err() {
                                        return;
                                    }
                                }
                                Token::Byte(0x00) => {
                                    if events.send(LinkEvent::Stop).await.is_err() {
                                        return;
                                    }
                                }
                                Token::Byte(_other) => {
                                    // Unrecognized single byte outside a frame: ignored (§6.1).
                                }
                                Token::Frame(frame) => {
                                    // Framed payloads never alter the scan state machine (§4.5).
                                    if events.send(LinkEvent::Frame(frame)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    }
                }
            }

            Some(command) = commands.recv() => {
                match command {
                    Command::SendResult(byte, ack) => {
                        let ok = write_byte_reopening(&mut port, &mut tokenizer, &reopen, byte).await;
                        state = LinkState::Idle;
                        deadline = None;
                        if !ok {
                            let _ = events.send(LinkEvent::LinkDown("write failed sending scan response".into())).await;
                            return;
                        }
                        let _ = ack.send(());
                    }
                    Command::SendOob(byte, ack) => {
                        if !write_byte_reopening(&mut port, &mut tokenizer, &reopen, byte).await {
                            let _ = events.send(LinkEvent::LinkDown("write failed sending out-of-band byte".into())).await;
                            return;
                        }
                        let _ = ack.send(());
                    }
                }
            }

            () = sleep, if deadline.is_some() => {
                // §5: "if the application fails to decide in time, the
                // link itself emits 'Q'." Backstop only; the application
                // normally answers sooner via its own shorter deadline.
                if !write_byte_reopening(&mut port, &mut tokenizer, &reopen, b'Q').await {
                    let _ = events.send(LinkEvent::LinkDown("write failed sending timeout byte".into())).await;
                    return;
                }
                state = LinkState::Idle;
                deadline = None;
                if events.send(LinkEvent::DeadlineElapsed).await.is_err() {
                    return;
                }
            }
        }
    }
}

async fn write_byte<P: AsyncWrite + Unpin>(port: &mut P, byte: u8) -> std::io::Result<()> {
    port.write_all(&[byte]).await?;
    port.flush().await
}

/// Write `byte`, reopening the transport once and retrying on failure
/// (§7). Returns whether the byte ultimately made it out.
async fn write_byte_reopening<P: AsyncWrite + Unpin>(
    port: &mut P,
    tokenizer: &mut Tokenizer,
    reopen: &Option<Reopen<P>>,
    byte: u8,
) -> bool {
    if write_byte(port, byte).await.is_ok() {
        return true;
    }
    match try_reopen(reopen).await {
        Some(new_port) => {
            *port = new_port;
            *tokenizer = Tokenizer::new();
            write_byte(port, byte).await.is_ok()
        }
        None => false,
    }
}
