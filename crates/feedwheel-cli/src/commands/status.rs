use std::sync::Arc;

use anyhow::Result;

use feedwheel_core::ipc::is_daemon_running;
use feedwheel_core::{AppConfig, DaemonClient};

pub async fn run(config: &Arc<AppConfig>) -> Result<()> {
    let socket_path = config.socket_path();

    if !is_daemon_running(&socket_path).await {
        println!("Daemon is not running.");
        println!("\nStart it with:");
        println!("  feedwheel daemon start");
        return Ok(());
    }

    let client = DaemonClient::new(socket_path);
    let status = client.status().await?;

    println!("Daemon is running (uptime: {}s)", status.uptime_secs);
    println!("  Scheduled: {}", status.scheduled);
    println!("  Pending:   {}", status.pending);
    println!("  Tasked:    {}", status.tasked);
    println!("  Backlog:   {}", status.backlog);

    Ok(())
}
