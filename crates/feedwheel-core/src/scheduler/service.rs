use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info};

use super::{tick, SchedulerContext};

/// Background scheduler service that runs the tick loop
pub struct SchedulerService {
    ctx: SchedulerContext,
}

impl SchedulerService {
    /// Create a new scheduler service
    pub fn new(ctx: SchedulerContext) -> Self {
        Self { ctx }
    }

    /// Run ticks in a loop until shutdown signal
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let tick_secs = self.ctx.config.scheduler.tick_interval_secs;

        // Skip if ticking is disabled (0)
        if tick_secs == 0 {
            info!("Scheduler disabled (tick_interval_secs = 0)");
            let _ = shutdown.changed().await;
            return;
        }

        info!(
            "Scheduler started: tick={}s, concurrency={}",
            tick_secs, self.ctx.config.scheduler.concurrency
        );

        let mut interval = tokio::time::interval(Duration::from_secs(tick_secs));
        // Skip the first tick (fires immediately)
        interval.tick().await;

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_ok() && *shutdown.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    debug!("Running scheduler tick");
                    match tick::run_tick(&self.ctx).await {
                        Ok(summary) => {
                            if summary.outcome.failed > 0 {
                                info!(
                                    failed = summary.outcome.failed,
                                    "Tick finished with failed updates requeued"
                                );
                            }
                        }
                        Err(e) => {
                            // State is retried on the next tick; moves are atomic
                            error!("Scheduler tick failed: {}", e);
                        }
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Run a single tick immediately (for manual triggering)
    pub async fn tick_now(&self) -> crate::Result<tick::TickSummary> {
        tick::run_tick(&self.ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::scheduler::test_support::{context_with, MockUpdater};

    #[tokio::test]
    async fn scheduler_exits_on_shutdown() {
        let ctx = context_with(Arc::new(MockUpdater::default())).await;
        let service = SchedulerService::new(ctx);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(service.run(shutdown_rx));

        shutdown_tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(result.is_ok());
    }
}
