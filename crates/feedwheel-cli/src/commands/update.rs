use std::sync::Arc;

use anyhow::Result;

use feedwheel_core::scheduler::tasks;
use feedwheel_core::AppConfig;

use super::build_context;

pub async fn run(config: &Arc<AppConfig>, feed_ids: &[i64], force: bool) -> Result<()> {
    if feed_ids.is_empty() {
        println!("No feed ids given.");
        return Ok(());
    }

    let ctx = build_context(config.clone()).await?;

    let outcome = if force {
        tasks::new_feeds(&ctx, feed_ids).await?
    } else {
        tasks::update_feeds(&ctx, feed_ids).await?
    };

    println!(
        "Updated {} feed(s): {} ok, {} skipped, {} missing, {} failed",
        feed_ids.len(),
        outcome.updated,
        outcome.skipped,
        outcome.missing,
        outcome.failed
    );

    Ok(())
}
