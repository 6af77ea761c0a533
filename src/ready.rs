use std::time::Duration;

use tokio::{sync::oneshot, time};

use crate::error::{Result, TrainerErr};

/// What the worker reported when it fired the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// The first `Progress` event has been emitted.
    Ready,
    /// The worker exited before producing anything observable.
    GaveUp,
}

/// Creates the one-shot readiness pair.
pub fn readiness() -> (ReadySignal, ReadyWaiter) {
    let (tx, rx) = oneshot::channel();
    (ReadySignal { tx: Some(tx) }, ReadyWaiter { rx })
}

/// Worker side. Firing more than once is a no-op.
#[derive(Debug)]
pub struct ReadySignal {
    tx: Option<oneshot::Sender<Readiness>>,
}

impl ReadySignal {
    pub fn fire(&mut self, readiness: Readiness) {
        if let Some(tx) = self.tx.take() {
            // The waiter may already have timed out.
            let _ = tx.send(readiness);
        }
    }

    pub fn is_fired(&self) -> bool {
        self.tx.is_none()
    }
}

/// Bootstrap side.
#[derive(Debug)]
pub struct ReadyWaiter {
    rx: oneshot::Receiver<Readiness>,
}

impl ReadyWaiter {
    /// Waits for the worker to become observable, for at most `timeout`.
    ///
    /// # Errors
    /// Returns `TrainerErr::ReadinessTimeout` if nothing was signalled in time.
    /// A signal dropped without firing counts as `Readiness::GaveUp`.
    pub async fn wait(self, timeout: Duration) -> Result<Readiness> {
        match time::timeout(timeout, self.rx).await {
            Ok(Ok(readiness)) => Ok(readiness),
            Ok(Err(_)) => Ok(Readiness::GaveUp),
            Err(_) => Err(TrainerErr::ReadinessTimeout(timeout)),
        }
    }
}
