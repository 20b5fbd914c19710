use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub lease: LeaseConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            scheduler: SchedulerConfig::default(),
            fetch: FetchConfig::default(),
            lease: LeaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Data directory path
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Scheduler tick interval in seconds (0 = disabled)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Concurrent feed update workers
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound for a single feed update, in seconds
    #[serde(default = "default_update_timeout")]
    pub update_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            concurrency: default_concurrency(),
            update_timeout_secs: default_update_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Base interval between refreshes of the same feed, in seconds
    #[serde(default = "default_update_interval")]
    pub update_interval_secs: u64,
    /// Random jitter applied to the next due time, in seconds
    #[serde(default = "default_update_jitter")]
    pub update_jitter_secs: u64,
    /// HTTP proxy URL for feed fetching (e.g., "http://127.0.0.1:7890")
    #[serde(default)]
    pub proxy_url: Option<String>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout(),
            update_interval_secs: default_update_interval(),
            update_jitter_secs: default_update_jitter(),
            proxy_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaseConfig {
    /// Lease store backend: "memory" (single process) or "redis"
    #[serde(default = "default_lease_backend")]
    pub backend: String,
    /// Redis connection URL (for the redis backend)
    #[serde(default = "default_redis_url")]
    pub redis_url: String,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            backend: default_lease_backend(),
            redis_url: default_redis_url(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("feedwheel")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_tick_interval() -> u64 {
    60
}

fn default_concurrency() -> usize {
    4
}

fn default_update_timeout() -> u64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_update_interval() -> u64 {
    3600
}

fn default_update_jitter() -> u64 {
    300
}

fn default_lease_backend() -> String {
    "memory".to_string()
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379/0".to_string()
}

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &std::path::Path) -> PathBuf {
    if let Some(path_str) = path.to_str() {
        if let Some(stripped) = path_str.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if path_str == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

impl AppConfig {
    /// Load configuration from file or return defaults
    pub fn load() -> crate::Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self) -> crate::Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// Get the configuration file path
    /// Always uses ~/.config/feedwheel/config.toml on all platforms
    pub fn config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config")
            .join("feedwheel")
            .join("config.toml")
    }

    /// Get the database file path
    pub fn database_path(&self) -> PathBuf {
        self.data_dir().join("feedwheel.db")
    }

    /// Get the Unix socket path for IPC
    pub fn socket_path(&self) -> PathBuf {
        self.data_dir().join("feedwheel.sock")
    }

    /// Get the data directory (with tilde expansion)
    pub fn data_dir(&self) -> PathBuf {
        expand_tilde(&self.general.data_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert!(config.scheduler.concurrency >= 1);
        assert_eq!(config.lease.backend, "memory");
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [scheduler]
            concurrency = 16
            "#,
        )
        .unwrap();
        assert_eq!(config.scheduler.concurrency, 16);
        assert_eq!(config.scheduler.tick_interval_secs, 60);
        assert_eq!(config.fetch.request_timeout_secs, 30);
    }
}
