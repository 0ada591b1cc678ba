//! Persisted display statistics of in-app messages.

use super::schema::IN_APP_MESSAGE_TABLE_NAME;
use crate::sqlite_persistence::SharedConnection;
use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::MutexGuard;

/// The persisted part of a message's redisplay statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredDisplayStats {
    pub display_quantity: u32,
    /// Epoch seconds, -1 when never displayed.
    pub last_display_time: i64,
}

pub trait InAppMessageStore: Send + Sync {
    fn load_stats(&self, message_id: &str) -> Result<Option<StoredDisplayStats>>;

    fn save_stats(&self, message_id: &str, stats: StoredDisplayStats) -> Result<()>;

    /// Delete statistics of messages last displayed before `cutoff`. Messages
    /// never displayed are kept.
    fn delete_displayed_before(&self, cutoff: i64) -> Result<usize>;
}

pub struct SqliteInAppMessageStore {
    conn: SharedConnection,
}

impl SqliteInAppMessageStore {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("In-app message database lock poisoned"))
    }
}

impl InAppMessageStore for SqliteInAppMessageStore {
    fn load_stats(&self, message_id: &str) -> Result<Option<StoredDisplayStats>> {
        let conn = self.lock()?;
        let stats = conn
            .query_row(
                &format!(
                    "SELECT display_quantity, last_display_time FROM {} WHERE message_id = ?1",
                    IN_APP_MESSAGE_TABLE_NAME
                ),
                params![message_id],
                |row| {
                    Ok(StoredDisplayStats {
                        display_quantity: row.get(0)?,
                        last_display_time: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }

    fn save_stats(&self, message_id: &str, stats: StoredDisplayStats) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO {} (message_id, display_quantity, last_display_time)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(message_id) DO UPDATE SET
                    display_quantity = excluded.display_quantity,
                    last_display_time = excluded.last_display_time",
                IN_APP_MESSAGE_TABLE_NAME
            ),
            params![message_id, stats.display_quantity, stats.last_display_time],
        )
        .with_context(|| format!("Failed to save display stats of message {}", message_id))?;
        Ok(())
    }

    fn delete_displayed_before(&self, cutoff: i64) -> Result<usize> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            &format!(
                "DELETE FROM {} WHERE last_display_time >= 0 AND last_display_time < ?1",
                IN_APP_MESSAGE_TABLE_NAME
            ),
            params![cutoff],
        )?;
        Ok(deleted)
    }
}
