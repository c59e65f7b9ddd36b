use futures::future::{BoxFuture, FutureExt};
use std::sync::Mutex;

use super::{Hal, IndicatorColor};
use crate::error::SupervisorError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HalCall {
    SetReady(bool),
    Indicator(IndicatorColor, u64),
    Buzz(u64),
}

/// In-memory `Hal` backend, mandatory on development hosts (§4.1). Every
/// call is recorded so tests can assert on the exact sequence observed by
/// the supervisor.
#[derive(Default)]
pub struct MockHal {
    calls: Mutex<Vec<HalCall>>,
}

impl MockHal {
    pub fn new() -> Self {
        MockHal::default()
    }

    pub fn calls(&self) -> Vec<HalCall> {
        self.calls.lock().expect("mock HAL mutex poisoned").clone()
    }

    pub fn last_ready(&self) -> Option<bool> {
        self.calls()
            .into_iter()
            .rev()
            .find_map(|call| match call {
                HalCall::SetReady(ready) => Some(ready),
                _ => None,
            })
    }
}

impl Hal for MockHal {
    fn set_ready(&self, ready: bool) -> BoxFuture<'_, Result<(), SupervisorError>> {
        async move {
            self.calls
                .lock()
                .expect("mock HAL mutex poisoned")
                .push(HalCall::SetReady(ready));
            Ok(())
        }
        .boxed()
    }

    fn indicator(&self, color: IndicatorColor, duration_ms: u64) -> BoxFuture<'_, Result<(), SupervisorError>> {
        async move {
            self.calls
                .lock()
                .expect("mock HAL mutex poisoned")
                .push(HalCall::Indicator(color, duration_ms));
            Ok(())
        }
        .boxed()
    }

    fn buzz(&self, duration_ms: u64) -> BoxFuture<'_, Result<(), SupervisorError>> {
        async move {
            self.calls
                .lock()
                .expect("mock HAL mutex poisoned")
                .push(HalCall::Buzz(duration_ms));
            Ok(())
        }
        .boxed()
    }
}
