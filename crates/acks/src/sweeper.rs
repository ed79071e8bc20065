//! Background expiry sweeper
//!
//! Periodically discards acknowledgement sets that outlived their expiry.
//! This is a leak-safety net: late releases against an expired set are
//! already ignored, the sweep only reclaims the table entries.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::manager::AcknowledgementSetManager;

/// Background task that sweeps expired acknowledgement sets
pub struct ExpirySweeper {
    manager: AcknowledgementSetManager,
    interval: Duration,
    cancel: CancellationToken,
}

/// Handle for stopping a running sweeper
pub struct ExpirySweeperHandle {
    task: JoinHandle<()>,
    cancel: CancellationToken,
}

impl ExpirySweeperHandle {
    /// Stop the sweeper and wait for it to exit
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "acknowledgement sweeper task failed");
        }
    }

    /// Whether the sweeper task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl ExpirySweeper {
    /// Create a sweeper; call [`spawn`](Self::spawn) to run it
    pub fn new(
        manager: AcknowledgementSetManager,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            manager,
            interval: interval.max(Duration::from_millis(1)),
            cancel,
        }
    }

    /// Spawn the sweeper onto the current tokio runtime
    pub fn spawn(self) -> ExpirySweeperHandle {
        let cancel = self.cancel.clone();
        let task = tokio::spawn(self.run());
        ExpirySweeperHandle { task, cancel }
    }

    /// Run until cancelled
    pub async fn run(self) {
        if !self.manager.is_active() {
            return;
        }

        tracing::debug!(
            interval_ms = self.interval.as_millis() as u64,
            "acknowledgement sweeper starting"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = interval.tick() => {
                    let swept = self.manager.sweep();
                    if swept > 0 {
                        tracing::debug!(
                            swept,
                            pending = self.manager.pending_sets(),
                            "expired acknowledgement sets discarded"
                        );
                    }
                }
            }
        }

        tracing::debug!("acknowledgement sweeper stopped");
    }
}
