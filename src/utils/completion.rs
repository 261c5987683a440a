//! Single-shot completions for callback-driven operations
//!
//! Camera subsystem callbacks may fire more than once (an error after the
//! device opened, a late configure result after the waiter gave up). A
//! [`Completion`] hands the first result to the waiting task and reports
//! every later attempt as rejected, so each pending operation is resumed or
//! failed exactly once.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Sending half of a single-shot completion. Cheap to clone into callbacks.
pub struct Completion<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<T>>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Completion<T> {
    /// Create a completion and the receiver the waiting task awaits.
    pub fn new() -> (Self, oneshot::Receiver<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            rx,
        )
    }

    /// Deliver the result. Returns `false` if a result was already delivered
    /// or the waiter is gone.
    pub fn complete(&self, value: T) -> bool {
        match self.tx.lock().take() {
            Some(tx) => tx.send(value).is_ok(),
            None => false,
        }
    }

    /// Whether a waiter is still expecting a result.
    pub fn is_pending(&self) -> bool {
        self.tx
            .lock()
            .as_ref()
            .map(|tx| !tx.is_closed())
            .unwrap_or(false)
    }
}
