use crate::{MappingError, Result};
use std::{
    future::Future,
    pin::pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Signal {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Cancellation signal shared between the caller and running operations.
#[derive(Debug, Clone, Default)]
pub struct Cancel {
    signal: Arc<Signal>,
}

impl Cancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.signal.cancelled.store(true, Ordering::Release);
        self.signal.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.cancelled.load(Ordering::Acquire)
    }

    /// Resolves once `cancel` has been called.
    pub async fn cancelled(&self) {
        let mut notified = pin!(self.signal.notify.notified());
        notified.as_mut().enable();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

/// Run `future` unless `cancel` fires first, in which case the future is
/// dropped (releasing whatever it owns) and `Cancelled` is returned.
pub async fn cancellable<T, F>(cancel: &Cancel, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(MappingError::Cancelled.raise());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(MappingError::Cancelled.raise()),
        result = future => result,
    }
}
