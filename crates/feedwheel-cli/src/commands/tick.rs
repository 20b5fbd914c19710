use std::sync::Arc;

use anyhow::Result;

use feedwheel_core::scheduler::tasks;
use feedwheel_core::AppConfig;

use super::build_context;

pub async fn run(config: &Arc<AppConfig>) -> Result<()> {
    let ctx = build_context(config.clone()).await?;

    println!("Running scheduler tick...\n");

    let summary = tasks::schedule_tick(&ctx).await?;

    println!(
        "Tick complete: {} promoted, {} reclaimed, {}/{}/{} regular/force/stale dispatched",
        summary.promoted, summary.reclaimed, summary.regular, summary.force, summary.stale
    );
    println!(
        "Updates: {} ok, {} skipped, {} missing, {} failed",
        summary.outcome.updated,
        summary.outcome.skipped,
        summary.outcome.missing,
        summary.outcome.failed
    );

    Ok(())
}
