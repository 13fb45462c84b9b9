use crate::bonus::window::{Activation, BonusWindow, Deadline};
use crate::core::config::BonusConfig;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Inclusive range of whole seconds between bonus activations
#[derive(Debug, Clone, Copy)]
pub struct DelayRange {
    min_secs: u64,
    max_secs: u64,
}

impl DelayRange {
    pub fn new(min_secs: u64, max_secs: u64) -> Self {
        Self {
            min_secs: min_secs.min(max_secs),
            max_secs: max_secs.max(min_secs),
        }
    }

    pub fn from_config(config: &BonusConfig) -> Self {
        Self::new(config.min_delay_secs, config.max_delay_secs)
    }

    pub fn sample(&self) -> Duration {
        Duration::from_secs(rand::rng().random_range(self.min_secs..=self.max_secs))
    }
}

/// Background task driving the bonus window.
///
/// One task owns every timer: it sleeps until the window's earliest
/// deadline, fires that transition, and loops. Once nothing is pending it
/// only waits for shutdown. Shutdown cancels the sleep and joins the task,
/// so no transition fires after `shutdown` returns.
pub struct BonusScheduler {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl BonusScheduler {
    pub fn spawn(window: Arc<BonusWindow>, delays: DelayRange) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(run(window, delays, shutdown_rx));

        Self {
            shutdown_tx,
            handle,
        }
    }

    pub async fn shutdown(self) {
        // The task may already be gone; the join below covers both cases
        let _ = self.shutdown_tx.send(());

        if let Err(e) = self.handle.await {
            warn!(error = %e, "Bonus scheduler task ended abnormally");
        }
    }
}

async fn run(window: Arc<BonusWindow>, delays: DelayRange, mut shutdown_rx: oneshot::Receiver<()>) {
    loop {
        let Some(deadline) = window.next_deadline() else {
            info!("No bonus activation pending, scheduler idle until shutdown");
            let _ = shutdown_rx.await;
            break;
        };

        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("Bonus scheduler cancelled");
                break;
            }
            _ = tokio::time::sleep_until(deadline.at()) => {
                fire(&window, deadline, delays);
            }
        }
    }
}

fn fire(window: &BonusWindow, deadline: Deadline, delays: DelayRange) {
    match deadline {
        Deadline::Activation(at) => {
            let next_delay = delays.sample();
            // Re-arm from the scheduled instant, not from when we woke up
            match window.activate(at, next_delay) {
                Activation::Started => {
                    info!(
                        duration_seconds = window.duration().as_secs(),
                        next_activation_seconds = next_delay.as_secs(),
                        "Bonus window started"
                    );
                }
                Activation::Collapsed => {
                    warn!("Bonus already active, activation collapsed and not re-armed");
                }
            }
        }
        Deadline::Deactivation(_) => {
            window.deactivate();
            info!("Bonus window ended");
        }
    }
}
