use std::sync::Arc;

use anyhow::Result;

use feedwheel_core::catalog::FeedRepository;
use feedwheel_core::feed::NewFeed;
use feedwheel_core::scheduler::tasks;
use feedwheel_core::AppConfig;

use super::build_context;

pub async fn run(config: &Arc<AppConfig>, url: &str, title: Option<&str>) -> Result<()> {
    let ctx = build_context(config.clone()).await?;

    let repo = FeedRepository::new(&ctx.db);
    let feed = repo
        .create(&NewFeed {
            url: url.to_string(),
            title: title.map(|t| t.to_string()),
        })
        .await?;

    // New feeds go straight onto the schedule
    tasks::schedule_immediate(&ctx, &[feed.id]).await?;

    println!("Added feed {} ({})", feed.id, feed.url);
    Ok(())
}
