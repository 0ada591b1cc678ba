//! Small persistent scalars kept next to the notification table.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SharedConnection, SqlType, Table};
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, OptionalExtension};

pub const SDK_PREFERENCE_TABLE_V1: Table = Table {
    name: "sdk_preference",
    columns: &[
        sqlite_column!("key", &SqlType::Text, is_primary_key = true),
        sqlite_column!("value", &SqlType::Text, non_null = true),
    ],
    indices: &[],
};

/// Epoch seconds of the last push accepted for processing.
pub const PREF_LAST_NOTIFICATION_RECEIVED_AT: &str = "last_notification_received_at";
/// Epoch seconds of the last completed notification restore.
pub const PREF_LAST_RESTORE_AT: &str = "last_restore_at";
/// Overrides the configured notification retention, in days.
pub const PREF_RETENTION_DAYS_OVERRIDE: &str = "notification_retention_days";

pub trait Preferences: Send + Sync {
    fn get_string(&self, key: &str) -> Result<Option<String>>;

    fn set_string(&self, key: &str, value: &str) -> Result<()>;

    fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get_string(key)? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .with_context(|| format!("Preference {} is not an integer: {:?}", key, raw)),
            None => Ok(None),
        }
    }

    fn set_i64(&self, key: &str, value: i64) -> Result<()> {
        self.set_string(key, &value.to_string())
    }
}

#[derive(Clone)]
pub struct SqlitePreferences {
    conn: SharedConnection,
}

impl SqlitePreferences {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }
}

impl Preferences for SqlitePreferences {
    fn get_string(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Preference database lock poisoned"))?;
        let value = conn
            .query_row(
                "SELECT value FROM sdk_preference WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set_string(&self, key: &str, value: &str) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| anyhow!("Preference database lock poisoned"))?;
        conn.execute(
            "INSERT OR REPLACE INTO sdk_preference (key, value) VALUES (?1, ?2)",
            params![key, value],
        )
        .with_context(|| format!("Failed to store preference {}", key))?;
        Ok(())
    }
}
