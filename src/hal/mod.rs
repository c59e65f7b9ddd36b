//! Hardware abstraction (§4.1): a uniform interface over the READY
//! handshake line and indicator/buzzer outputs, with a mandatory mock
//! backend and a real `rppal`-backed GPIO backend for deployment on a
//! Linux SBC.

mod mock;

#[cfg(feature = "gpio")]
mod gpio;

#[cfg(feature = "gpio")]
pub use gpio::{GpioHal, GpioPins};
pub use mock::{HalCall, MockHal};

use crate::error::SupervisorError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorColor {
    Green,
    Yellow,
    Red,
}

use futures::future::BoxFuture;

/// Uniform interface over the handshake GPIO line and indicator outputs.
/// Implementations must never panic: a failed pin write is reported
/// through [`SupervisorError`] and throttled by the caller (§4.1, §7).
///
/// The supervisor picks a backend at startup based on `hardware.backend`
/// and holds it as `Box<dyn Hal>`, so methods return a boxed future
/// (`futures::future::BoxFuture`) rather than `impl Future`, the same
/// object-safety trick `automations::executors::ObjSafe` uses to turn an
/// `impl Future`-returning trait into a `dyn`-compatible one.
pub trait Hal: Send + Sync {
    /// Drive the READY handshake line. Idempotent: repeated calls with
    /// the same value are cheap and observably a no-op.
    fn set_ready(&self, ready: bool) -> BoxFuture<'_, Result<(), SupervisorError>>;

    /// Flash an indicator lamp for approximately `duration_ms`.
    /// Non-blocking or bounded by the requested duration.
    fn indicator(&self, color: IndicatorColor, duration_ms: u64) -> BoxFuture<'_, Result<(), SupervisorError>>;

    /// Sound the buzzer for approximately `duration_ms`.
    fn buzz(&self, duration_ms: u64) -> BoxFuture<'_, Result<(), SupervisorError>>;
}

/// Rate-limits repeated identical hardware error reports to one per
/// 5-second window (§4.1, §7, §9). Grounded on the same coalesce-by-key
/// idea the teacher uses to deduplicate retried task-failure log lines.
pub struct ErrorThrottle {
    window: std::time::Duration,
    last_emitted: std::collections::HashMap<String, (std::time::Instant, u32)>,
}

impl ErrorThrottle {
    pub fn new(window: std::time::Duration) -> Self {
        ErrorThrottle {
            window,
            last_emitted: std::collections::HashMap::new(),
        }
    }

    /// Returns `Some(suppressed_count)` if this error should be emitted
    /// now (carrying how many identical reports were suppressed since the
    /// last emission), or `None` if it falls inside the throttle window.
    pub fn should_emit(&mut self, key: &str, now: std::time::Instant) -> Option<u32> {
        match self.last_emitted.get_mut(key) {
            Some((last, suppressed)) if now.duration_since(*last) < self.window => {
                *suppressed += 1;
                None
            }
            Some(entry) => {
                let suppressed = entry.1;
                *entry = (now, 0);
                Some(suppressed)
            }
            None => {
                self.last_emitted.insert(key.to_string(), (now, 0));
                Some(0)
            }
        }
    }
}
