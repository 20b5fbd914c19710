use std::path::Path;
use std::sync::Arc;

use anyhow::Result;

use feedwheel_core::{AppConfig, DaemonClient};

pub async fn run(config: &Arc<AppConfig>, feed_id: i64, file: &Path) -> Result<()> {
    let content = std::fs::read_to_string(file)?;

    // Push goes through the daemon so the update uses its catalog handles
    let client = DaemonClient::new(config.socket_path());
    client.push_update(feed_id, content).await?;

    println!("Pushed {} to feed {}", file.display(), feed_id);
    Ok(())
}
