//! First-error-wins reporting for a fan-out.
//!
//! Any number of workers may report; only the first report is buffered
//! and every later one is dropped. The owner of the fan-out drains the
//! buffered error once `until` has returned.

use std::sync::{Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Capacity-1 error channel shared by the workers of one fan-out.
#[derive(Debug)]
pub struct ErrorChannel<E> {
    tx: mpsc::Sender<E>,
    rx: Mutex<mpsc::Receiver<E>>,
}

impl<E> ErrorChannel<E> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Buffer `err` unless an error is already buffered. Never blocks.
    pub fn send_error(&self, err: E) {
        // Full means another worker already reported; that report wins.
        let _ = self.tx.try_send(err);
    }

    /// Buffer `err` and cancel `ctx` so idle work is not started.
    pub fn send_error_with_cancel(&self, err: E, ctx: &CancellationToken) {
        self.send_error(err);
        ctx.cancel();
    }

    /// Take the buffered error, if any. Never blocks.
    pub fn receive_error(&self) -> Option<E> {
        self.rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }
}

impl<E> Default for ErrorChannel<E> {
    fn default() -> Self {
        Self::new()
    }
}
