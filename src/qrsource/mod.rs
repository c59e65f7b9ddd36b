//! QR source (§4.4): an asynchronous acquirer returning a QR string or a
//! no-read indication, triggered on demand and cancellable.

mod imager;
mod input_event;
mod queued;

pub use imager::ImagerQrSource;
pub use input_event::InputEventQrSource;
pub use queued::QueuedQrSource;

use futures::future::BoxFuture;

/// `acquire` must produce at most one QR string or `None` (no-read) by
/// `deadline`, and must be cancel-safe: dropping the returned future
/// (e.g. via `tokio::select!` racing a link-down signal) must not leave
/// the source in a state where a later `acquire` observes a QR that
/// arrived during the cancelled call but was not delivered to it (§4.4
/// ordering guarantee — such a QR is simply discarded).
pub trait QrSource: Send + Sync {
    fn acquire(&self, deadline: tokio::time::Instant) -> BoxFuture<'_, Option<String>>;
}

impl<T: QrSource + ?Sized> QrSource for std::sync::Arc<T> {
    fn acquire(&self, deadline: tokio::time::Instant) -> BoxFuture<'_, Option<String>> {
        (**self).acquire(deadline)
    }
}
