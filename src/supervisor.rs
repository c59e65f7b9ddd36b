//! Supervisor (§4.6): the top-level state machine tying the link's scan
//! requests to the validator, the duplicate store, the QR source, and
//! the outbound response byte, and emitting events to the UI
//! collaborator (§9).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::batch::Batch;
use crate::csvlog::{self, BatchLog, RecoverySnapshot};
use crate::dupstore::DuplicateStore;
use crate::error::SupervisorError;
use crate::events::{Counters, EventBus, SupervisorEvent};
use crate::hal::{ErrorThrottle, Hal, IndicatorColor};
use crate::link::{Frame, LinkEvent, LinkHandle, ScanRequest};
use crate::qrsource::QrSource;
use crate::validator::{self, ScanOutcome};

/// Minimum time reserved for transmitting the response byte before the
/// PLC's own deadline elapses (§4.6: "≥1 s reserved for response
/// transmission").
const RESPONSE_MARGIN: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Armed,
    Scanning {
        deadline: tokio::time::Instant,
        final_attempt: bool,
    },
    Halted,
}

/// Commands the operator UI collaborator (out of scope, §1) issues.
pub enum OperatorCommand {
    Arm { batch: Batch, reset_duplicates: bool },
    Stop,
    ResetCounters,
    ResetBatch { batch_id: String },
}

pub struct SupervisorConfig {
    pub response_timeout: Duration,
    pub busy_settle: Duration,
    pub qr_length: usize,
    pub batch_log_dir: std::path::PathBuf,
    pub setup_log_dir: std::path::PathBuf,
    pub recovery_file: std::path::PathBuf,
}

pub struct Supervisor {
    hal: Arc<dyn Hal>,
    dup_store: Arc<DuplicateStore>,
    qr_source: Box<dyn QrSource>,
    link: LinkHandle,
    config: SupervisorConfig,
    events: EventBus,

    state: State,
    batch: Option<Batch>,
    counters: Counters,
    batch_log: Option<BatchLog>,
    error_throttle: ErrorThrottle,
}

impl Supervisor {
    pub fn new(
        hal: Arc<dyn Hal>,
        dup_store: Arc<DuplicateStore>,
        qr_source: Box<dyn QrSource>,
        link: LinkHandle,
        config: SupervisorConfig,
        events: EventBus,
    ) -> Self {
        Supervisor {
            hal,
            dup_store,
            qr_source,
            link,
            config,
            events,
            state: State::Idle,
            batch: None,
            counters: Counters::default(),
            batch_log: None,
            error_throttle: ErrorThrottle::new(Duration::from_secs(5)),
        }
    }

    /// Drive the supervisor until both the operator and link channels
    /// close.
    pub async fn run(
        mut self,
        mut operator_rx: mpsc::Receiver<OperatorCommand>,
        mut link_events: mpsc::Receiver<LinkEvent>,
    ) {
        loop {
            let scanning = match self.state {
                State::Scanning { deadline, final_attempt } => Some((deadline, final_attempt)),
                _ => None,
            };

            if let Some((deadline, final_attempt)) = scanning {
                tokio::select! {
                    biased;

                    qr = self.qr_source.acquire(deadline) => {
                        self.finish_scan(qr, final_attempt).await;
                    }
                    Some(event) = link_events.recv() => {
                        self.handle_link_event_while_scanning(event).await;
                    }
                    Some(cmd) = operator_rx.recv() => {
                        self.handle_operator(cmd).await;
                    }
                    else => return,
                }
            } else {
                tokio::select! {
                    Some(event) = link_events.recv() => {
                        self.handle_link_event(event).await;
                    }
                    Some(cmd) = operator_rx.recv() => {
                        self.handle_operator(cmd).await;
                    }
                    else => return,
                }
            }
        }
    }

    async fn handle_operator(&mut self, cmd: OperatorCommand) {
        match cmd {
            OperatorCommand::Arm { batch, reset_duplicates } => self.arm(batch, reset_duplicates).await,
            OperatorCommand::Stop => self.stop().await,
            OperatorCommand::ResetCounters => {
                self.counters.reset();
                let _ = self.events.send(SupervisorEvent::CountersUpdated(self.counters));
            }
            OperatorCommand::ResetBatch { batch_id } => {
                if let Err(err) = self.dup_store.reset(&batch_id) {
                    tracing::warn!(?err, batch_id, "failed to reset duplicate store for batch");
                }
            }
        }
    }

    async fn arm(&mut self, batch: Batch, reset_duplicates: bool) {
        if reset_duplicates {
            if let Err(err) = self.dup_store.reset(batch.id.as_str()) {
                tracing::warn!(?err, batch_id = %batch.id, "failed to reset duplicate store on arm");
            }
        }

        if let Err(err) = csvlog::write_setup_log(&self.config.setup_log_dir, &batch) {
            tracing::warn!(?err, batch_id = %batch.id, "failed to write setup log");
        }

        match BatchLog::create(&self.config.batch_log_dir, batch.id.as_str()) {
            Ok(log) => self.batch_log = Some(log),
            Err(err) => tracing::warn!(?err, batch_id = %batch.id, "failed to open batch CSV log"),
        }

        self.counters = Counters::default();
        let result = self.hal.set_ready(true).await;
        self.report_hal(result).await;
        let _ = self.link.send_oob(b'G').await;

        tracing::info!(batch_id = %batch.id, "batch armed");
        let _ = self.events.send(SupervisorEvent::BatchArmed {
            batch_id: batch.id.to_string(),
        });

        self.batch = Some(batch);
        self.state = State::Armed;
    }

    async fn stop(&mut self) {
        if matches!(self.state, State::Scanning { .. }) {
            // §4.6: operator stop cancels any PendingScan and the link
            // sends 'S'. Dropping out of the Scanning branch on the next
            // loop iteration cancels the in-flight QR acquisition; we
            // just need to tell the link to answer the PLC now.
            let _ = self.link.send_result(b'S').await;
        }

        let result = self.hal.set_ready(false).await;
        self.report_hal(result).await;
        let _ = self.link.send_oob(b'H').await;

        let batch_id = self.batch.take().map(|b| b.id.to_string());
        self.batch_log = None;
        let _ = csvlog::remove_recovery_snapshot(&self.config.recovery_file);

        tracing::info!(?batch_id, "batch halted by operator");
        let _ = self.events.send(SupervisorEvent::BatchHalted { batch_id });

        self.state = State::Halted;
    }

    async fn handle_link_event(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::Scan(request) => {
                if self.state == State::Armed {
                    self.begin_scan(request).await;
                } else {
                    // §4.6: "a scan request received before a batch is
                    // armed" (or while halted) gets an immediate 'S' and
                    // the supervisor stays put.
                    let _ = self.link.send_result(b'S').await;
                }
            }
            LinkEvent::Stop => {}
            LinkEvent::Frame(frame) => self.forward_frame(frame),
            LinkEvent::ProtocolError | LinkEvent::DeadlineElapsed => {
                // Not currently scanning; nothing to reconcile.
            }
            LinkEvent::LinkDown(reason) => self.on_link_down(reason).await,
        }
    }

    async fn handle_link_event_while_scanning(&mut self, event: LinkEvent) {
        match event {
            LinkEvent::ProtocolError => {
                // The link already discarded our pending scan and sent
                // 'S' on its own; drop our bookkeeping. The superseding
                // Scan event follows right behind this one on the same
                // channel and will be handled once we're back in Armed.
                self.state = State::Armed;
            }
            LinkEvent::DeadlineElapsed => {
                // The link's own backstop fired before our (shorter)
                // deadline; it already sent 'Q'. Drop the in-flight QR
                // acquisition by returning to Armed and releasing busy,
                // same as the app's own timeout path in finish_scan.
                self.state = State::Armed;
                let result = self.hal.set_ready(true).await;
                self.report_hal(result).await;
                let _ = self.events.send(SupervisorEvent::ScanTimedOut);
            }
            LinkEvent::Frame(frame) => self.forward_frame(frame),
            LinkEvent::Stop => {}
            LinkEvent::Scan(_) => {
                tracing::warn!("unexpected bare Scan event while already scanning");
            }
            LinkEvent::LinkDown(reason) => self.on_link_down(reason).await,
        }
    }

    async fn begin_scan(&mut self, request: ScanRequest) {
        let result = self.hal.set_ready(false).await;
        self.report_hal(result).await;
        tokio::time::sleep(self.config.busy_settle).await;

        let qr_budget = self.config.response_timeout.saturating_sub(RESPONSE_MARGIN);
        let deadline = tokio::time::Instant::now() + qr_budget;

        self.state = State::Scanning {
            deadline,
            final_attempt: request == ScanRequest::Final,
        };
    }

    async fn finish_scan(&mut self, qr: Option<String>, _final_attempt: bool) {
        self.state = State::Armed;

        let Some(qr) = qr else {
            let _ = self.link.send_result(b'Q').await;
            let result = self.hal.set_ready(true).await;
            self.report_hal(result).await;
            let _ = self.events.send(SupervisorEvent::ScanTimedOut);
            return;
        };

        let batch = self.batch.clone().expect("Scanning state implies an armed batch");
        let dup_store = self.dup_store.clone();
        let batch_id = batch.id.as_str().to_string();

        let outcome = validator::validate(&qr, &batch, self.config.qr_length, |candidate| {
            dup_store.seen(&batch_id, candidate).unwrap_or(false)
        });

        self.fire_indicator(&outcome);

        if outcome.is_pass() {
            if let Err(err) = self.record_with_retry(&batch_id, &qr) {
                tracing::error!(?err, batch_id, qr, "duplicate store write failed twice; halting batch");
                let _ = self.link.send_result(b'B').await;
                let result = self.hal.set_ready(true).await;
                self.report_hal(result).await;
                self.teardown_on_fault().await;
                return;
            }
        }

        if let Err(err) = self.append_batch_log_with_retry(&batch_id, outcome.mould().unwrap_or("-"), &qr, &outcome) {
            tracing::error!(?err, batch_id, qr, "batch log append failed twice; halting batch");
            let _ = self.link.send_result(b'B').await;
            let result = self.hal.set_ready(true).await;
            self.report_hal(result).await;
            self.teardown_on_fault().await;
            return;
        }

        let _ = self.link.send_result(outcome.response_byte()).await;
        let result = self.hal.set_ready(true).await;
        self.report_hal(result).await;

        self.counters.record(&outcome);
        self.write_recovery(Some(&qr), &outcome);

        let _ = self.events.send(SupervisorEvent::ScanCompleted {
            qr: Some(qr),
            outcome: outcome.clone(),
        });
        let _ = self.events.send(SupervisorEvent::CountersUpdated(self.counters));
    }

    /// §7: duplicate-store write failures are retried once before
    /// escalating.
    fn record_with_retry(&self, batch_id: &str, qr: &str) -> Result<(), SupervisorError> {
        match self.dup_store.record(batch_id, qr) {
            Ok(()) => Ok(()),
            Err(_first) => self.dup_store.record(batch_id, qr),
        }
    }

    /// Same retry-once policy as [`Self::record_with_retry`], applied to
    /// the batch CSV log (§7): a log that isn't armed (open failed at
    /// `arm` time) is not itself a fault here, only a failing write once
    /// one is open.
    fn append_batch_log_with_retry(
        &mut self,
        batch_id: &str,
        mould: &str,
        qr: &str,
        outcome: &ScanOutcome,
    ) -> Result<(), SupervisorError> {
        let Some(log) = &mut self.batch_log else {
            return Ok(());
        };
        let status = csvlog::status_label(outcome);
        let now = chrono::Local::now();
        match log.append(now, batch_id, mould, qr, status) {
            Ok(()) => Ok(()),
            Err(_first) => log.append(now, batch_id, mould, qr, status),
        }
    }

    async fn teardown_on_fault(&mut self) {
        let batch_id = self.batch.take().map(|b| b.id.to_string());
        self.batch_log = None;
        tracing::error!(?batch_id, "batch halted due to unrecoverable logging/store fault");
        let _ = self.events.send(SupervisorEvent::BatchHalted { batch_id });
        self.state = State::Halted;
    }

    async fn on_link_down(&mut self, reason: String) {
        // §4.6: link-down pauses the batch rather than ending it; the
        // operator decides whether/when to resume. No byte can be sent
        // (the link is down), and the batch configuration is preserved.
        tracing::warn!(reason, "PLC link is down; batch paused, awaiting operator");
        let _ = self.events.send(SupervisorEvent::LinkDown { reason });
        self.state = State::Halted;
    }

    fn forward_frame(&self, frame: Frame) {
        let _ = self.events.send(SupervisorEvent::FrameReceived {
            tag: frame.tag,
            body: frame.body,
        });
    }

    /// Fire-and-forget per §4.3: scan completion answers the PLC without
    /// waiting on the indicator lamp or buzzer to finish.
    fn fire_indicator(&self, outcome: &ScanOutcome) {
        const FLASH_MS: u64 = 500;

        let (color, buzz) = match outcome {
            ScanOutcome::Pass { .. } => (IndicatorColor::Green, false),
            ScanOutcome::Duplicate { .. } => (IndicatorColor::Yellow, false),
            ScanOutcome::InvalidFormat | ScanOutcome::LineMismatch | ScanOutcome::OutOfBatch => {
                (IndicatorColor::Red, true)
            }
        };

        let hal = self.hal.clone();
        tokio::spawn(async move {
            if let Err(err) = hal.indicator(color, FLASH_MS).await {
                tracing::warn!(?err, "indicator lamp write failed");
            }
            if buzz {
                if let Err(err) = hal.buzz(FLASH_MS).await {
                    tracing::warn!(?err, "buzzer write failed");
                }
            }
        });
    }

    fn write_recovery(&self, last_qr: Option<&str>, outcome: &ScanOutcome) {
        let Some(batch) = &self.batch else { return };
        let snapshot = RecoverySnapshot {
            batch_id: batch.id.to_string(),
            counters: self.counters,
            last_qr: last_qr.map(str::to_string),
            last_status: Some(csvlog::status_label(outcome).to_string()),
        };
        if let Err(err) = csvlog::write_recovery_snapshot(&self.config.recovery_file, &snapshot) {
            tracing::warn!(?err, "failed to write recovery snapshot");
        }
    }

    /// Report a HAL failure through the throttle (§4.1, §7, §9): repeated
    /// identical errors within 5 seconds coalesce into a single emitted
    /// event.
    async fn report_hal(&mut self, result: Result<(), SupervisorError>) {
        if let Err(err) = result {
            let key = err.to_string();
            if let Some(suppressed) = self.error_throttle.should_emit(&key, std::time::Instant::now()) {
                tracing::error!(?err, suppressed, "hardware abstraction error");
                let _ = self.events.send(SupervisorEvent::HardwareError {
                    message: key,
                    suppressed,
                });
            }
        }
    }
}

