//! CSV / recovery persistence (§6.3).

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::batch::Batch;
use crate::error::SupervisorError;
use crate::events::Counters;
use crate::validator::ScanOutcome;

/// Per-batch scan log: `Timestamp,BatchNumber,Mould,QRCode,Status`, one
/// row per validator invocation, flushed after every write so a crash
/// never loses the most recent row.
pub struct BatchLog {
    writer: csv::Writer<std::fs::File>,
}

impl BatchLog {
    pub fn create(dir: impl AsRef<Path>, batch_id: &str) -> Result<Self, SupervisorError> {
        std::fs::create_dir_all(&dir).map_err(SupervisorError::Logging)?;
        let path: PathBuf = dir.as_ref().join(format!("{batch_id}.csv"));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&path)
            .map_err(csv_err)?;
        writer
            .write_record(["Timestamp", "BatchNumber", "Mould", "QRCode", "Status"])
            .map_err(csv_err)?;
        writer.flush().map_err(SupervisorError::Logging)?;
        Ok(BatchLog { writer })
    }

    pub fn append(
        &mut self,
        timestamp: chrono::DateTime<chrono::Local>,
        batch_id: &str,
        mould: &str,
        qr: &str,
        status: &str,
    ) -> Result<(), SupervisorError> {
        self.writer
            .write_record([
                timestamp.format("%Y-%m-%d %H:%M:%S").to_string().as_str(),
                batch_id,
                mould,
                qr,
                status,
            ])
            .map_err(csv_err)?;
        self.writer.flush().map_err(SupervisorError::Logging)
    }
}

/// Setup log: `BatchNo,Line,MouldType,QR_Start,QR_End`, one row per mould
/// range, written once when a batch is armed.
pub fn write_setup_log(dir: impl AsRef<Path>, batch: &Batch) -> Result<(), SupervisorError> {
    std::fs::create_dir_all(&dir).map_err(SupervisorError::Logging)?;
    let path = dir.as_ref().join(format!("{}.csv", batch.id));
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .map_err(csv_err)?;
    writer
        .write_record(["BatchNo", "Line", "MouldType", "QR_Start", "QR_End"])
        .map_err(csv_err)?;
    for mould in batch.moulds() {
        writer
            .write_record([
                batch.id.as_str(),
                &batch.line.0.to_string(),
                &mould.name,
                &mould.start,
                &mould.end,
            ])
            .map_err(csv_err)?;
    }
    writer.flush().map_err(SupervisorError::Logging)
}

fn csv_err(err: csv::Error) -> SupervisorError {
    SupervisorError::Logging(std::io::Error::new(std::io::ErrorKind::Other, err))
}

/// Advisory JSON snapshot for the (out-of-scope) UI to resume from. The
/// core only writes and removes this file; it never reads it back
/// (§6.3).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RecoverySnapshot {
    pub batch_id: String,
    pub counters: Counters,
    pub last_qr: Option<String>,
    pub last_status: Option<String>,
}

pub fn write_recovery_snapshot(path: impl AsRef<Path>, snapshot: &RecoverySnapshot) -> Result<(), SupervisorError> {
    let json = serde_json::to_vec_pretty(snapshot)
        .map_err(|err| SupervisorError::Logging(std::io::Error::new(std::io::ErrorKind::Other, err)))?;
    let mut file = std::fs::File::create(path).map_err(SupervisorError::Logging)?;
    file.write_all(&json).map_err(SupervisorError::Logging)
}

pub fn remove_recovery_snapshot(path: impl AsRef<Path>) -> Result<(), SupervisorError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SupervisorError::Logging(err)),
    }
}

pub fn status_label(outcome: &ScanOutcome) -> &'static str {
    match outcome {
        ScanOutcome::Pass { .. } => "PASS",
        ScanOutcome::Duplicate { .. } => "DUPLICATE",
        ScanOutcome::InvalidFormat => "INVALID_FORMAT",
        ScanOutcome::LineMismatch => "LINE_MISMATCH",
        ScanOutcome::OutOfBatch => "OUT_OF_BATCH",
    }
}
