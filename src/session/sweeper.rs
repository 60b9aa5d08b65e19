//! Background task that expires idle sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::entry::now_millis;
use crate::transfer::TransferService;

/// Periodic expiry with an explicit `start`/`stop` lifecycle.
pub struct ExpirationSweeper {
    service: Arc<TransferService>,
    period: Duration,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ExpirationSweeper {
    pub fn new(service: Arc<TransferService>, period: Duration) -> Self {
        Self {
            service,
            period,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Spawns the sweep loop. Calling it twice keeps the first task.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        if self.cancel.is_cancelled() {
            self.cancel = CancellationToken::new();
        }

        let service = self.service.clone();
        let cancel = self.cancel.clone();
        let period = self.period;
        tracing::info!(period_secs = period.as_secs(), "session sweeper started");

        self.task = Some(tokio::spawn(async move {
            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately.
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        let removed = service.expire_idle_sessions(now_millis()).await;
                        if removed > 0 {
                            tracing::info!(removed, "expired idle sessions");
                        }
                    }
                }
            }
            tracing::debug!("session sweeper loop exited");
        }));
    }

    /// Signals the loop and waits for it to finish its current sweep.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "session sweeper task failed");
            }
        }
        tracing::info!("session sweeper stopped");
    }

    /// One sweep at a caller-supplied time.
    pub async fn sweep_once(&self, now: u64) -> usize {
        self.service.expire_idle_sessions(now).await
    }
}

impl Drop for ExpirationSweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
