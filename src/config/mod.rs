mod file_config;

pub use file_config::{BackendConfig, FileConfig, InAppConfig, NotificationsConfig};

use anyhow::{bail, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_path: Option<PathBuf>,
    pub backend_url: Option<String>,
    pub app_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SdkConfig {
    pub db_path: PathBuf,
    pub notifications: NotificationSettings,
    pub in_app: InAppSettings,
    /// `None` when no backend URL is configured; receipts are then not sent.
    pub backend: Option<BackendSettings>,
}

#[derive(Debug, Clone)]
pub struct NotificationSettings {
    pub max_active_notifications: usize,
    pub retention_days: u64,
    pub restore_delay_ms: u64,
    pub restore_on_startup: bool,
    pub sweep_interval_hours: u64,
}

impl NotificationSettings {
    pub fn retention_secs(&self) -> i64 {
        (self.retention_days * 24 * 60 * 60) as i64
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_hours * 60 * 60)
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            max_active_notifications: 49,
            retention_days: 7,
            restore_delay_ms: 150,
            restore_on_startup: true,
            sweep_interval_hours: 24,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InAppSettings {
    pub enabled: bool,
    pub stats_retention_days: u64,
}

impl InAppSettings {
    pub fn stats_retention_secs(&self) -> i64 {
        (self.stats_retention_days * 24 * 60 * 60) as i64
    }
}

impl Default for InAppSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            stats_retention_days: 180,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendSettings {
    pub base_url: String,
    pub app_id: String,
    pub timeout_sec: u64,
}

impl SdkConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_path = file
            .db_path
            .map(PathBuf::from)
            .or_else(|| cli.db_path.clone())
            .unwrap_or_else(|| PathBuf::from("notifykit.db"));
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                bail!("Database directory does not exist: {:?}", parent);
            }
        }

        let defaults = NotificationSettings::default();
        let n_file = file.notifications.unwrap_or_default();
        let notifications = NotificationSettings {
            max_active_notifications: n_file
                .max_active_notifications
                .unwrap_or(defaults.max_active_notifications),
            retention_days: n_file.retention_days.unwrap_or(defaults.retention_days),
            restore_delay_ms: n_file.restore_delay_ms.unwrap_or(defaults.restore_delay_ms),
            restore_on_startup: n_file
                .restore_on_startup
                .unwrap_or(defaults.restore_on_startup),
            sweep_interval_hours: n_file
                .sweep_interval_hours
                .unwrap_or(defaults.sweep_interval_hours),
        };
        if notifications.max_active_notifications == 0 {
            bail!("notifications.max_active_notifications must be at least 1");
        }
        if notifications.sweep_interval_hours == 0 {
            bail!("notifications.sweep_interval_hours must be at least 1");
        }

        let in_app_defaults = InAppSettings::default();
        let ia_file = file.in_app.unwrap_or_default();
        let in_app = InAppSettings {
            enabled: ia_file.enabled.unwrap_or(in_app_defaults.enabled),
            stats_retention_days: ia_file
                .stats_retention_days
                .unwrap_or(in_app_defaults.stats_retention_days),
        };

        let b_file = file.backend.unwrap_or_default();
        let base_url = b_file.base_url.or_else(|| cli.backend_url.clone());
        let app_id = b_file.app_id.or_else(|| cli.app_id.clone());
        let backend = match (base_url, app_id) {
            (Some(base_url), Some(app_id)) => Some(BackendSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                app_id,
                timeout_sec: b_file.timeout_sec.unwrap_or(10),
            }),
            (Some(_), None) => bail!("backend.app_id is required when a backend URL is set"),
            (None, _) => None,
        };

        Ok(Self {
            db_path,
            notifications,
            in_app,
            backend,
        })
    }
}
