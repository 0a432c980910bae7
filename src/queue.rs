//! FIFO hand-off of detected alerts from all monitors to the processor.

use crate::alert::ActiveAlert;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use std::sync::Arc;
use std::time::Duration;

/// Producer half of the alert queue. Cheap to clone, one per monitor.
#[derive(Debug, Clone)]
pub struct AlertSender {
    tx: Sender<Arc<ActiveAlert>>,
}

impl AlertSender {
    /// Enqueue an alert. Never blocks.
    ///
    /// Returns `false` if the processor side has been dropped.
    pub fn push(&self, alert: Arc<ActiveAlert>) -> bool {
        self.tx.send(alert).is_ok()
    }
}

/// Multiple-producer / single-consumer FIFO of pending alerts.
///
/// Enqueue order is playback order regardless of which monitor produced the
/// alert.
#[derive(Debug)]
pub struct AlertQueue {
    tx: Sender<Arc<ActiveAlert>>,
    rx: Receiver<Arc<ActiveAlert>>,
}

impl AlertQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// A producer handle for a monitor.
    pub fn sender(&self) -> AlertSender {
        AlertSender {
            tx: self.tx.clone(),
        }
    }

    /// Enqueue an alert. Never blocks.
    pub fn push(&self, alert: Arc<ActiveAlert>) {
        if self.tx.send(alert).is_err() {
            log::error!("alert queue disconnected, alert dropped");
        }
    }

    /// Block until an alert is available.
    pub fn pop(&self) -> Option<Arc<ActiveAlert>> {
        self.rx.recv().ok()
    }

    /// Receiving end, for consumers that also wait on a shutdown channel.
    pub(crate) fn receiver(&self) -> &Receiver<Arc<ActiveAlert>> {
        &self.rx
    }

    /// Block until an alert is available or `timeout` elapses.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Arc<ActiveAlert>> {
        match self.rx.recv_timeout(timeout) {
            Ok(alert) => Some(alert),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Number of alerts waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for AlertQueue {
    fn default() -> Self {
        Self::new()
    }
}
