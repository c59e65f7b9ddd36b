//! Observer channel the UI (out of scope, §1) subscribes to (§9): the
//! supervisor emits typed events instead of calling into widgets
//! directly.

use crate::validator::ScanOutcome;

#[derive(Debug, Clone)]
pub enum SupervisorEvent {
    BatchArmed { batch_id: String },
    BatchHalted { batch_id: Option<String> },
    ScanCompleted { qr: Option<String>, outcome: ScanOutcome },
    ScanTimedOut,
    CountersUpdated(Counters),
    LinkDown { reason: String },
    HardwareError { message: String, suppressed: u32 },
    FrameReceived { tag: String, body: String },
}

#[derive(Debug, Clone, Copy, Default, serde::Serialize, serde::Deserialize)]
pub struct Counters {
    pub accepted: u64,
    pub duplicate: u64,
    pub rejected: u64,
    pub total: u64,
}

impl Counters {
    pub fn record(&mut self, outcome: &ScanOutcome) {
        self.total += 1;
        match outcome {
            ScanOutcome::Pass { .. } => self.accepted += 1,
            ScanOutcome::Duplicate { .. } => self.duplicate += 1,
            ScanOutcome::InvalidFormat | ScanOutcome::LineMismatch | ScanOutcome::OutOfBatch => {
                self.rejected += 1
            }
        }
    }

    /// "Operator reset counters" (§4.6 edge cases): soft state only, does
    /// not touch the duplicate store.
    pub fn reset(&mut self) {
        *self = Counters::default();
    }
}

/// Broadcasts [`SupervisorEvent`]s to any number of subscribers (the
/// out-of-scope operator console / HTTP dashboard, §1). A lagging
/// receiver simply misses events; the core never blocks on a subscriber.
pub type EventBus = tokio::sync::broadcast::Sender<SupervisorEvent>;

pub fn new_event_bus() -> EventBus {
    tokio::sync::broadcast::channel(256).0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_track_each_outcome_class() {
        let mut counters = Counters::default();
        counters.record(&ScanOutcome::Pass { mould: "ANC".into() });
        counters.record(&ScanOutcome::Duplicate { mould: "ANC".into() });
        counters.record(&ScanOutcome::LineMismatch);
        counters.record(&ScanOutcome::InvalidFormat);
        counters.record(&ScanOutcome::OutOfBatch);

        assert_eq!(counters.accepted, 1);
        assert_eq!(counters.duplicate, 1);
        assert_eq!(counters.rejected, 3);
        assert_eq!(counters.total, 5);
    }

    #[test]
    fn reset_zeroes_everything() {
        let mut counters = Counters::default();
        counters.record(&ScanOutcome::Pass { mould: "ANC".into() });
        counters.reset();
        assert_eq!(counters.total, 0);
    }
}
