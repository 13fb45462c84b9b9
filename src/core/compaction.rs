use crate::core::state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Background task that periodically folds the record log back into one
/// snapshot, so a long-running server does not grow it without bound.
pub struct CompactionTask {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl CompactionTask {
    pub fn spawn(state: Arc<AppState>, every: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(state, every, shutdown_rx));

        Self {
            shutdown_tx,
            handle,
        }
    }

    /// Stop the task. A compaction already in progress finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.handle.await {
            warn!(error = %e, "WAL compaction task ended abnormally");
        }
    }
}

async fn run(state: Arc<AppState>, every: Duration, mut shutdown_rx: oneshot::Receiver<()>) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    interval.tick().await;

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("WAL compaction task cancelled");
                break;
            }
            _ = interval.tick() => {
                compact_once(&state).await;
            }
        }
    }
}

async fn compact_once(state: &Arc<AppState>) {
    let folded = state.users.updates_since_compaction();
    if folded == 0 {
        debug!("WAL compaction skipped, no updates since last run");
        return;
    }

    let worker = Arc::clone(state);
    match tokio::task::spawn_blocking(move || worker.users.compact()).await {
        Ok(Ok(kept)) => {
            info!(
                updates_folded = folded,
                operations_kept = kept,
                "WAL compaction completed"
            );
        }
        Ok(Err(e)) => {
            error!(error = %e, "WAL compaction failed");
        }
        Err(e) => {
            error!(error = %e, "WAL compaction task panicked");
        }
    }
}
