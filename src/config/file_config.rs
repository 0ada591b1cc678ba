use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    pub db_path: Option<String>,

    pub notifications: Option<NotificationsConfig>,
    pub in_app: Option<InAppConfig>,
    pub backend: Option<BackendConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct NotificationsConfig {
    pub max_active_notifications: Option<usize>,
    pub retention_days: Option<u64>,
    pub restore_delay_ms: Option<u64>,
    pub restore_on_startup: Option<bool>,
    pub sweep_interval_hours: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct InAppConfig {
    pub enabled: Option<bool>,
    /// Days after which statistics of messages not shown since are dropped.
    pub stats_retention_days: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: Option<String>,
    pub app_id: Option<String>,
    pub timeout_sec: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
