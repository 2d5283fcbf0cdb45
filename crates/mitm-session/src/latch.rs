//! One-shot termination latch.

use tokio::sync::watch;

/// Turns "the session has died" into something every suspension point can
/// await or poll. Firing is idempotent; waiters registered after the fact
/// return immediately.
#[derive(Debug)]
pub struct Latch {
    tx: watch::Sender<bool>,
}

impl Default for Latch {
    fn default() -> Self {
        Self::new()
    }
}

impl Latch {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Mark the latch fired. Safe to call from multiple tasks.
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the latch has fired.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // wait_for returns immediately when the value already satisfies
        // the predicate; the sender lives in self, so this cannot error.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}
