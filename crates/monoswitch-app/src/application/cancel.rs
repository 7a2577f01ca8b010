//! Cancellation signals.
//!
//! A `CancelHandle`/`CancelSignal` pair built on `tokio::sync::watch`: the
//! handle flips the flag once, every signal clone observes it.  Waiting on a
//! signal is just a future, so suspend points can race it with their real
//! work via `tokio::select!` – dropping the losing branch detaches cleanly.

use tokio::sync::watch;

/// The triggering side.  Cancelling is idempotent; dropping the handle also
/// cancels every outstanding signal.
#[derive(Debug)]
pub struct CancelHandle {
    sender: watch::Sender<bool>,
}

/// The observing side, cheap to clone and hand to every suspend point.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: watch::Receiver<bool>,
}

/// Creates a connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (sender, receiver) = watch::channel(false);
    (CancelHandle { sender }, CancelSignal { receiver })
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.sender.send(true);
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: self.sender.subscribe(),
        }
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the signal is cancelled (or its handle is gone).
    pub async fn cancelled(&mut self) {
        if *self.receiver.borrow() {
            return;
        }
        while self.receiver.changed().await.is_ok() {
            if *self.receiver.borrow() {
                return;
            }
        }
        // The handle was dropped without an explicit cancel; treat that as
        // cancellation so waiters never hang on a dead handle.
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_signal_observes_cancel() {
        let (handle, signal) = cancel_pair();
        assert!(!signal.is_cancelled());

        handle.cancel();

        assert!(signal.is_cancelled());
        let mut signal = signal;
        signal.cancelled().await; // must not hang
    }

    #[tokio::test]
    async fn test_clones_share_the_flag() {
        let (handle, signal) = cancel_pair();
        let clone = signal.clone();
        handle.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn test_dropped_handle_releases_waiters() {
        let (handle, mut signal) = cancel_pair();
        drop(handle);
        signal.cancelled().await; // must not hang
    }
}
