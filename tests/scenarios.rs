//! End-to-end seed scenarios S1-S6 (§8): a real `Supervisor` wired to a
//! real `link` task over an in-process `tokio::io::duplex` pair standing
//! in for the UART, a `MockHal`, a `QueuedQrSource`, and a tempfile-backed
//! `DuplicateStore`.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use cartridge_supervisor::batch::{Batch, BatchId, Line, MouldRange};
use cartridge_supervisor::dupstore::DuplicateStore;
use cartridge_supervisor::events::new_event_bus;
use cartridge_supervisor::hal::{HalCall, MockHal};
use cartridge_supervisor::link;
use cartridge_supervisor::qrsource::QueuedQrSource;
use cartridge_supervisor::supervisor::{OperatorCommand, Supervisor, SupervisorConfig};

fn sample_batch() -> Batch {
    let line = Line::parse('A').unwrap();
    let r = MouldRange::new("ANC", "1AANC00000001", "1AANC00099999", line, 14).unwrap();
    Batch::new(BatchId::parse("MVANC00001").unwrap(), line, vec![r]).unwrap()
}

struct Harness {
    operator_tx: mpsc::Sender<OperatorCommand>,
    plc: tokio::io::DuplexStream,
    hal: Arc<MockHal>,
    qr_source: Arc<QueuedQrSource>,
    dup_store: Arc<DuplicateStore>,
    supervisor_task: tokio::task::JoinHandle<()>,
}

impl Harness {
    async fn new() -> Self {
        let (plc, port) = tokio::io::duplex(256);
        // response_timeout must exceed the link's 1-second response
        // margin, or the QR-acquire budget saturates to zero.
        let (link_handle, link_events) = link::spawn(port, Duration::from_millis(1500));

        let hal = Arc::new(MockHal::new());
        let qr_source = Arc::new(QueuedQrSource::new());
        let dup_store = Arc::new(DuplicateStore::open_in_memory().unwrap());

        let dir = tempfile::tempdir().unwrap();
        let config = SupervisorConfig {
            response_timeout: Duration::from_millis(1500),
            busy_settle: Duration::from_millis(5),
            qr_length: 14,
            batch_log_dir: dir.path().join("batches"),
            setup_log_dir: dir.path().join("setup"),
            recovery_file: dir.path().join("recovery.json"),
        };
        // Keep the tempdir alive for the duration of the test by leaking
        // it; scenario tests don't assert on log file contents.
        std::mem::forget(dir);

        let events = new_event_bus();

        let supervisor = Supervisor::new(
            hal.clone(),
            dup_store.clone(),
            Box::new(qr_source.clone()),
            link_handle,
            config,
            events,
        );

        let (operator_tx, operator_rx) = mpsc::channel(8);
        let supervisor_task = tokio::spawn(supervisor.run(operator_rx, link_events));

        Harness {
            operator_tx,
            plc,
            hal,
            qr_source,
            dup_store,
            supervisor_task,
        }
    }

    async fn arm(&self, batch: Batch) {
        self.operator_tx
            .send(OperatorCommand::Arm {
                batch,
                reset_duplicates: false,
            })
            .await
            .unwrap();
        // Let the arm complete before the test proceeds.
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn send_scan_byte(&mut self, byte: u8) {
        self.plc.write_all(&[byte]).await.unwrap();
    }

    async fn read_response_byte(&mut self) -> u8 {
        let mut buf = [0u8; 1];
        tokio::time::timeout(Duration::from_secs(2), self.plc.read_exact(&mut buf))
            .await
            .expect("timed out waiting for a response byte")
            .unwrap();
        buf[0]
    }
}

#[tokio::test]
async fn s1_happy_path_pass() {
    let mut harness = Harness::new().await;
    harness.arm(sample_batch()).await;

    harness.qr_source.push("1AANC00012345");
    harness.send_scan_byte(0x14).await;

    let byte = harness.read_response_byte().await;
    assert_eq!(byte, b'A');

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(harness.dup_store.seen("MVANC00001", "1AANC00012345").unwrap());
    assert_eq!(harness.hal.last_ready(), Some(true));

    harness.supervisor_task.abort();
}

#[tokio::test]
async fn s2_duplicate() {
    let mut harness = Harness::new().await;
    harness.dup_store.record("MVANC00001", "1AANC00012345").unwrap();
    harness.arm(sample_batch()).await;

    harness.qr_source.push("1AANC00012345");
    harness.send_scan_byte(0x14).await;

    assert_eq!(harness.read_response_byte().await, b'D');

    harness.supervisor_task.abort();
}

#[tokio::test]
async fn s3_line_mismatch() {
    let mut harness = Harness::new().await;
    harness.arm(sample_batch()).await;

    harness.qr_source.push("1BANC00012345");
    harness.send_scan_byte(0x14).await;

    assert_eq!(harness.read_response_byte().await, b'L');

    harness.supervisor_task.abort();
}

#[tokio::test]
async fn s4_no_read_times_out_with_q() {
    let mut harness = Harness::new().await;
    harness.arm(sample_batch()).await;

    // No QR pushed to the queue: acquire() times out well inside the
    // link's response_timeout, and the supervisor answers 'Q' itself.
    harness.send_scan_byte(0x14).await;

    assert_eq!(harness.read_response_byte().await, b'Q');
    assert!(!harness.dup_store.seen("MVANC00001", "1AANC00012345").unwrap());
    assert_eq!(harness.hal.last_ready(), Some(true));

    harness.supervisor_task.abort();
}

#[tokio::test]
async fn s5_scan_before_arm_sends_scanner_error() {
    let mut harness = Harness::new().await;
    // No arm() call: supervisor stays IDLE.

    harness.send_scan_byte(0x14).await;

    let byte = tokio::time::timeout(Duration::from_millis(100), harness.read_response_byte())
        .await
        .expect("expected an 'S' byte within 100ms");
    assert_eq!(byte, b'S');

    harness.supervisor_task.abort();
}

#[tokio::test]
async fn s6_link_failure_mid_scan_halts_without_a_byte() {
    let mut harness = Harness::new().await;
    harness.arm(sample_batch()).await;

    // Don't push a QR: the scan sits pending while we sever the link.
    harness.send_scan_byte(0x14).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Dropping the PLC-side half of the duplex makes the link's next read
    // observe EOF, emitting LinkDown without ever sending a byte.
    drop(harness.plc);

    tokio::time::sleep(Duration::from_millis(100)).await;

    // No response byte was ever written (there's no one left to read it).
    // The HAL must still show busy: set_ready(true) happened once at
    // arm-time, but nothing releases busy again once the link goes down
    // mid-scan (§5: "cancelled synchronously, no byte sent").
    let calls = harness.hal.calls();
    let busy_idx = calls.iter().rposition(|c| *c == HalCall::SetReady(false)).unwrap();
    assert!(!calls[busy_idx..].contains(&HalCall::SetReady(true)));
    assert_eq!(harness.hal.last_ready(), Some(false));

    harness.supervisor_task.abort();
}
