use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// CancelSignal: cooperative cancellation for a fan-out batch
// ---------------------------------------------------------------------------

/// Watch-based cancellation flag shared by every task in a batch.
///
/// Clones observe the same flag. A task races its handler against
/// [`cancelled`](Self::cancelled); a signal cancelled before the task starts
/// is seen immediately because the watch channel keeps the latest value.
///
/// ```ignore
/// let cancel = CancelSignal::new();
/// tokio::select! {
///     _ = cancel.cancelled() => { /* record a cancelled outcome */ }
///     out = handler.handle(..) => { /* record the output */ }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        let changed = self.tx.send_if_modified(|flag| {
            if *flag {
                false
            } else {
                *flag = true;
                true
            }
        });
        if changed {
            info!("cancellation requested");
        } else {
            debug!("cancellation already requested");
        }
    }

    /// Check if cancellation has been requested (non-blocking).
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested. Never resolves otherwise.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|flag| *flag).await.is_err() {
            // Sender dropped: nobody can cancel any more.
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
