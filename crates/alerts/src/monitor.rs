//! Periodic alert monitoring.
//!
//! A cancellable scheduled task around [`AlertEvaluator::evaluate_all`].
//! The timer path and the manual [`AlertMonitor::check_now`] path are the
//! same evaluation code; there is no separate fast path.

use crate::evaluator::{AlertEvaluator, SweepSummary};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

/// Owns the sweep schedule. Constructed explicitly by the composition
/// root and stopped through the shared shutdown channel.
pub struct AlertMonitor {
    evaluator: Arc<AlertEvaluator>,
    check_interval: Duration,
}

impl AlertMonitor {
    /// Creates a monitor sweeping every `check_interval`.
    #[must_use]
    pub fn new(evaluator: Arc<AlertEvaluator>, check_interval: Duration) -> Self {
        Self {
            evaluator,
            check_interval,
        }
    }

    /// Runs sweeps on the interval until `shutdown` flips. An in-flight
    /// sweep always completes before the loop exits.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.check_interval.as_secs(),
            "Alert monitor started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.evaluator.evaluate_all().await {
                        Ok(summary) => tracing::debug!(
                            triggered = summary.triggered,
                            skipped = summary.skipped,
                            errors = summary.errors,
                            "Alert check finished"
                        ),
                        Err(e) => tracing::error!("Alert sweep failed: {e:#}"),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!("Alert monitor stopped");
    }

    /// Runs one sweep immediately (the manual trigger path).
    ///
    /// # Errors
    /// Propagates a sweep that could not even list the active rules.
    pub async fn check_now(&self) -> Result<SweepSummary> {
        tracing::info!("Manual alert check triggered");
        self.evaluator.evaluate_all().await
    }
}
