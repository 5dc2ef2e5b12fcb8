//! Ctrl-C to [`CancelSignal`] bridge.

use tokio::signal;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::application::cancel::{cancel_pair, CancelSignal};

/// Cancels the paired signal on Ctrl-C until dropped.
pub(super) struct InterruptWatch {
    task: JoinHandle<()>,
}

impl Drop for InterruptWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub(super) fn watch_interrupt() -> (InterruptWatch, CancelSignal) {
    let (handle, cancel) = cancel_pair();
    let task = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next checkpoint");
            handle.cancel();
        }
    });
    (InterruptWatch { task }, cancel)
}
