use std::sync::Arc;

use anyhow::Result;

use feedwheel_core::catalog::{Database, FeedRepository};
use feedwheel_core::AppConfig;

pub async fn run(config: &Arc<AppConfig>) -> Result<()> {
    let db = Database::new(config).await?;
    let repo = FeedRepository::new(&db);
    let feeds = repo.list_all().await?;

    if feeds.is_empty() {
        println!("No feeds in the catalog yet.");
        println!("\nTo register a feed, run:");
        println!("  feedwheel add -u <url>");
        return Ok(());
    }

    println!("Feeds ({}):\n", feeds.len());

    for feed in &feeds {
        let state = if !feed.active {
            " [inactive]"
        } else if !feed.fetched_once {
            " [never fetched]"
        } else {
            ""
        };

        let error = if let Some(err) = &feed.fetch_error {
            format!(" [ERROR: {}]", err)
        } else {
            String::new()
        };

        let title = feed.title.as_deref().unwrap_or("(no title)");

        println!("  {} - {}{}{}", feed.id, title, state, error);
        println!("    URL: {}", feed.url);
        println!("    Subscribers: {}", feed.active_subscriber_count);
        if let Some(next) = feed.next_scheduled_update {
            println!("    Next update: {}", next.format("%Y-%m-%d %H:%M"));
        }
        if let Some(last) = feed.last_fetched_at {
            println!("    Last fetched: {}", last.format("%Y-%m-%d %H:%M"));
        }
        println!();
    }

    Ok(())
}
