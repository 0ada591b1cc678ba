//! Notification record storage.
//!
//! Provides SQLite-backed storage for received notifications. Every logical
//! operation runs through [`NotificationStore::read`] or
//! [`NotificationStore::write`]; a write is a single transaction that is rolled
//! back when the operation returns an error.

use super::models::{ConsumeAction, NewNotificationRecord, NotificationRecord};
use super::schema::NOTIFICATION_TABLE_NAME;
use crate::sqlite_persistence::SharedConnection;
use anyhow::{anyhow, Context, Result};
use rand::Rng;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::sync::MutexGuard;

/// Typed queries over the notification table.
///
/// Implementations are only reachable from inside a store operation, so every
/// statement they prepare is released before the operation returns.
pub trait NotificationQueries {
    /// Most recent row carrying this backend id.
    fn find_by_notification_id(&self, notification_id: &str)
        -> Result<Option<NotificationRecord>>;

    /// Most recent row displayed under this tray id.
    fn find_by_display_id(&self, local_display_id: i32) -> Result<Option<NotificationRecord>>;

    /// Insert a row, assigning its tray id when none is given.
    fn insert(&self, record: &NewNotificationRecord) -> Result<NotificationRecord>;

    /// Set the flag for `action` on one row. Returns false if the row is missing.
    fn mark_consumed(&self, row_id: i64, action: ConsumeAction) -> Result<bool>;

    /// Set the flag for `action` on every live row shown under one of `display_ids`.
    fn mark_consumed_by_display_ids(
        &self,
        display_ids: &[i32],
        action: ConsumeAction,
    ) -> Result<usize>;

    /// Consume every live row of a group, summary included. Returns the rows
    /// that were live before the update.
    fn mark_group_consumed(
        &self,
        group_id: &str,
        action: ConsumeAction,
    ) -> Result<Vec<NotificationRecord>>;

    /// Live non-summary rows of a group, newest first by insertion order.
    fn live_group_children(&self, group_id: &str) -> Result<Vec<NotificationRecord>>;

    /// The live summary row of a group, if any.
    fn live_group_summary(&self, group_id: &str) -> Result<Option<NotificationRecord>>;

    /// Live non-summary rows, oldest first by insertion order.
    fn live_notifications_oldest_first(&self) -> Result<Vec<NotificationRecord>>;

    /// Number of live non-summary rows.
    fn count_live_notifications(&self) -> Result<usize>;

    /// Live non-summary rows created after `created_after`, skipping rows shown
    /// under `excluded_display_ids`, newest first, at most `limit`.
    fn restorable_notifications(
        &self,
        created_after: i64,
        excluded_display_ids: &[i32],
        limit: usize,
    ) -> Result<Vec<NotificationRecord>>;

    /// Most recent rows regardless of state.
    fn recent_notifications(&self, limit: usize) -> Result<Vec<NotificationRecord>>;

    /// Delete rows created strictly before `cutoff`. Returns the number deleted.
    fn delete_created_before(&self, cutoff: i64) -> Result<usize>;
}

/// Store giving transactional access to the notification table.
pub trait NotificationStore: Send + Sync {
    /// Run `op` against the current committed state.
    fn read_with(&self, op: &mut dyn FnMut(&dyn NotificationQueries) -> Result<()>)
        -> Result<()>;

    /// Run `op` inside one write transaction, committed only if `op` succeeds.
    fn write_with(
        &self,
        op: &mut dyn FnMut(&dyn NotificationQueries) -> Result<()>,
    ) -> Result<()>;
}

impl dyn NotificationStore {
    pub fn read<T>(&self, op: impl FnOnce(&dyn NotificationQueries) -> Result<T>) -> Result<T> {
        let mut op = Some(op);
        let mut output = None;
        self.read_with(&mut |queries| {
            if let Some(op) = op.take() {
                output = Some(op(queries)?);
            }
            Ok(())
        })?;
        output.context("Notification store skipped the read operation")
    }

    pub fn write<T>(&self, op: impl FnOnce(&dyn NotificationQueries) -> Result<T>) -> Result<T> {
        let mut op = Some(op);
        let mut output = None;
        self.write_with(&mut |queries| {
            if let Some(op) = op.take() {
                output = Some(op(queries)?);
            }
            Ok(())
        })?;
        output.context("Notification store skipped the write operation")
    }
}

/// SQLite-backed notification store.
pub struct SqliteNotificationStore {
    conn: SharedConnection,
}

impl SqliteNotificationStore {
    /// Create a store on an already opened SDK database.
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Notification database lock poisoned"))
    }
}

impl NotificationStore for SqliteNotificationStore {
    fn read_with(
        &self,
        op: &mut dyn FnMut(&dyn NotificationQueries) -> Result<()>,
    ) -> Result<()> {
        let conn = self.lock()?;
        op(&SqliteQueries::new(&conn))
    }

    fn write_with(
        &self,
        op: &mut dyn FnMut(&dyn NotificationQueries) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .context("Failed to begin notification transaction")?;
        op(&SqliteQueries::new(&tx))?;
        tx.commit()
            .context("Failed to commit notification transaction")?;
        Ok(())
    }
}

const LIVE: &str = "opened = 0 AND dismissed = 0";

struct SqliteQueries<'c> {
    conn: &'c Connection,
}

impl<'c> SqliteQueries<'c> {
    fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<NotificationRecord> {
        Ok(NotificationRecord {
            row_id: row.get("id")?,
            notification_id: row.get("notification_id")?,
            local_display_id: row.get("local_display_id")?,
            group_id: row.get("group_id")?,
            is_summary: row.get("is_summary")?,
            opened: row.get("opened")?,
            dismissed: row.get("dismissed")?,
            title: row.get("title")?,
            message: row.get("message")?,
            full_payload: row.get("full_payload")?,
            created_time: row.get("created_time")?,
        })
    }

    fn query_records<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<NotificationRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let records = stmt
            .query_map(params, Self::row_to_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn query_record<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Option<NotificationRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        Ok(stmt.query_row(params, Self::row_to_record).optional()?)
    }

    /// Pick a random positive tray id that no row uses yet.
    fn allocate_display_id(&self) -> Result<i32> {
        let mut rng = rand::rng();
        loop {
            let candidate: i32 = rng.random_range(1..i32::MAX);
            let taken: i64 = self.conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE local_display_id = ?1",
                    NOTIFICATION_TABLE_NAME
                ),
                params![candidate],
                |row| row.get(0),
            )?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
    }
}

impl NotificationQueries for SqliteQueries<'_> {
    fn find_by_notification_id(
        &self,
        notification_id: &str,
    ) -> Result<Option<NotificationRecord>> {
        self.query_record(
            &format!(
                "SELECT * FROM {} WHERE notification_id = ?1 ORDER BY id DESC LIMIT 1",
                NOTIFICATION_TABLE_NAME
            ),
            params![notification_id],
        )
    }

    fn find_by_display_id(&self, local_display_id: i32) -> Result<Option<NotificationRecord>> {
        self.query_record(
            &format!(
                "SELECT * FROM {} WHERE local_display_id = ?1 ORDER BY id DESC LIMIT 1",
                NOTIFICATION_TABLE_NAME
            ),
            params![local_display_id],
        )
    }

    fn insert(&self, record: &NewNotificationRecord) -> Result<NotificationRecord> {
        let existing_display_id = match &record.notification_id {
            Some(notification_id) => self
                .find_by_notification_id(notification_id)?
                .map(|existing| existing.local_display_id),
            None => None,
        };
        let local_display_id = match record.local_display_id.or(existing_display_id) {
            Some(id) => id,
            None => self.allocate_display_id()?,
        };

        self.conn
            .execute(
                &format!(
                    "INSERT INTO {} (
                        notification_id, local_display_id, group_id, is_summary,
                        opened, dismissed, title, message, full_payload, created_time
                    ) VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?9)",
                    NOTIFICATION_TABLE_NAME
                ),
                params![
                    record.notification_id,
                    local_display_id,
                    record.group_id,
                    record.is_summary,
                    record.opened,
                    record.title,
                    record.message,
                    record.full_payload,
                    record.created_time,
                ],
            )
            .context("Could not insert notification")?;

        Ok(NotificationRecord {
            row_id: self.conn.last_insert_rowid(),
            notification_id: record.notification_id.clone(),
            local_display_id,
            group_id: record.group_id.clone(),
            is_summary: record.is_summary,
            opened: record.opened,
            dismissed: false,
            title: record.title.clone(),
            message: record.message.clone(),
            full_payload: record.full_payload.clone(),
            created_time: record.created_time,
        })
    }

    fn mark_consumed(&self, row_id: i64, action: ConsumeAction) -> Result<bool> {
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET {} = 1 WHERE id = ?1",
                NOTIFICATION_TABLE_NAME,
                action.column()
            ),
            params![row_id],
        )?;
        Ok(updated > 0)
    }

    fn mark_consumed_by_display_ids(
        &self,
        display_ids: &[i32],
        action: ConsumeAction,
    ) -> Result<usize> {
        if display_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; display_ids.len()].join(", ");
        let updated = self.conn.execute(
            &format!(
                "UPDATE {} SET {} = 1 WHERE {} AND local_display_id IN ({})",
                NOTIFICATION_TABLE_NAME,
                action.column(),
                LIVE,
                placeholders
            ),
            params_from_iter(display_ids.iter()),
        )?;
        Ok(updated)
    }

    fn mark_group_consumed(
        &self,
        group_id: &str,
        action: ConsumeAction,
    ) -> Result<Vec<NotificationRecord>> {
        let live = self.query_records(
            &format!(
                "SELECT * FROM {} WHERE group_id = ?1 AND {} ORDER BY id DESC",
                NOTIFICATION_TABLE_NAME, LIVE
            ),
            params![group_id],
        )?;
        self.conn.execute(
            &format!(
                "UPDATE {} SET {} = 1 WHERE group_id = ?1 AND {}",
                NOTIFICATION_TABLE_NAME,
                action.column(),
                LIVE
            ),
            params![group_id],
        )?;
        Ok(live)
    }

    fn live_group_children(&self, group_id: &str) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            &format!(
                "SELECT * FROM {} WHERE group_id = ?1 AND is_summary = 0 AND {} ORDER BY id DESC",
                NOTIFICATION_TABLE_NAME, LIVE
            ),
            params![group_id],
        )
    }

    fn live_group_summary(&self, group_id: &str) -> Result<Option<NotificationRecord>> {
        self.query_record(
            &format!(
                "SELECT * FROM {} WHERE group_id = ?1 AND is_summary = 1 AND {} ORDER BY id DESC LIMIT 1",
                NOTIFICATION_TABLE_NAME, LIVE
            ),
            params![group_id],
        )
    }

    fn live_notifications_oldest_first(&self) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            &format!(
                "SELECT * FROM {} WHERE is_summary = 0 AND {} ORDER BY id ASC",
                NOTIFICATION_TABLE_NAME, LIVE
            ),
            [],
        )
    }

    fn count_live_notifications(&self) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE is_summary = 0 AND {}",
                NOTIFICATION_TABLE_NAME, LIVE
            ),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn restorable_notifications(
        &self,
        created_after: i64,
        excluded_display_ids: &[i32],
        limit: usize,
    ) -> Result<Vec<NotificationRecord>> {
        let mut values = vec![Value::Integer(created_after)];
        let exclusion = if excluded_display_ids.is_empty() {
            String::new()
        } else {
            values.extend(
                excluded_display_ids
                    .iter()
                    .map(|id| Value::Integer(*id as i64)),
            );
            format!(
                " AND local_display_id NOT IN ({})",
                vec!["?"; excluded_display_ids.len()].join(", ")
            )
        };
        values.push(Value::Integer(limit as i64));

        self.query_records(
            &format!(
                "SELECT * FROM {} WHERE created_time > ? AND is_summary = 0 AND {}{} ORDER BY id DESC LIMIT ?",
                NOTIFICATION_TABLE_NAME, LIVE, exclusion
            ),
            params_from_iter(values),
        )
    }

    fn recent_notifications(&self, limit: usize) -> Result<Vec<NotificationRecord>> {
        self.query_records(
            &format!(
                "SELECT * FROM {} ORDER BY id DESC LIMIT ?1",
                NOTIFICATION_TABLE_NAME
            ),
            params![limit as i64],
        )
    }

    fn delete_created_before(&self, cutoff: i64) -> Result<usize> {
        let deleted = self.conn.execute(
            &format!(
                "DELETE FROM {} WHERE created_time < ?1",
                NOTIFICATION_TABLE_NAME
            ),
            params![cutoff],
        )?;
        Ok(deleted)
    }
}
