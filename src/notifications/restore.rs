//! Re-posting live notifications after the process starts.
//!
//! The tray is emptied when the device reboots or the app is updated, so on
//! startup every notification that was neither opened nor dismissed and is
//! still within the retention window is posted again, newest first, up to
//! the tray ceiling. Entries still visible in the tray are left alone.
//!
//! Restore runs at most once per process. The guard lives in memory only; a
//! new process always restores again.

use super::group::GroupReconciler;
use super::store::NotificationStore;
use super::tray::{DisplayRequest, NotificationDisplay, NotificationTray};
use crate::clock::Clock;
use crate::preferences::{Preferences, PREF_LAST_RESTORE_AT};
use anyhow::{anyhow, Result};
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Restore already completed in this process.
    AlreadyRan,
    Completed {
        restored: usize,
        skipped: usize,
        summaries: usize,
    },
}

pub struct RestoreScheduler {
    store: Arc<dyn NotificationStore>,
    tray: Arc<dyn NotificationTray>,
    reconciler: Arc<GroupReconciler>,
    preferences: Arc<dyn Preferences>,
    clock: Arc<dyn Clock>,
    max_notifications: usize,
    retention_secs: i64,
    delay_between_posts: Duration,
    has_run: Mutex<bool>,
}

impl RestoreScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn NotificationStore>,
        tray: Arc<dyn NotificationTray>,
        reconciler: Arc<GroupReconciler>,
        preferences: Arc<dyn Preferences>,
        clock: Arc<dyn Clock>,
        max_notifications: usize,
        retention_secs: i64,
        delay_between_posts: Duration,
    ) -> Self {
        Self {
            store,
            tray,
            reconciler,
            preferences,
            clock,
            max_notifications,
            retention_secs,
            delay_between_posts,
            has_run: Mutex::new(false),
        }
    }

    /// Re-post live notifications missing from the tray.
    ///
    /// Blocks for the inter-post delay between rows; call it from a blocking
    /// context. Concurrent callers wait for the first run and then get
    /// [`RestoreOutcome::AlreadyRan`].
    pub fn restore(&self) -> Result<RestoreOutcome> {
        let mut has_run = self
            .has_run
            .lock()
            .map_err(|_| anyhow!("Restore guard lock poisoned"))?;
        if *has_run {
            debug!("Notifications already restored in this process");
            return Ok(RestoreOutcome::AlreadyRan);
        }

        let now = self.clock.now_secs();
        let excluded = self.visible_display_ids();
        let created_after = now - self.retention_secs;
        let rows = self.store.read(|q| {
            q.restorable_notifications(created_after, &excluded, self.max_notifications)
        })?;
        info!("Restoring {} notifications", rows.len());

        let mut restored = 0;
        let mut skipped = 0;
        let mut groups = BTreeSet::new();
        for (index, row) in rows.iter().enumerate() {
            if index > 0 && !self.delay_between_posts.is_zero() {
                std::thread::sleep(self.delay_between_posts);
            }

            let display = match NotificationDisplay::from_record(row, true) {
                Ok(display) => display,
                Err(e) => {
                    warn!("Skipping restore of row {}: {}", row.row_id, e);
                    skipped += 1;
                    continue;
                }
            };
            if let Err(e) = self.tray.post(&DisplayRequest::Single(display)) {
                warn!("Failed to restore notification {}: {:#}", row.local_display_id, e);
                skipped += 1;
                continue;
            }
            restored += 1;
            if let Some(group_id) = &row.group_id {
                groups.insert(group_id.clone());
            }
        }

        let mut summaries = 0;
        for group_id in &groups {
            match self.reconciler.show_summary(group_id) {
                Ok(true) => summaries += 1,
                Ok(false) => {}
                Err(e) => warn!("Failed to restore summary of group {}: {:#}", group_id, e),
            }
        }

        self.update_badge();
        if let Err(e) = self.preferences.set_i64(PREF_LAST_RESTORE_AT, now) {
            warn!("Failed to record restore time: {:#}", e);
        }

        *has_run = true;
        info!(
            "Restore finished: {} restored, {} skipped, {} summaries",
            restored, skipped, summaries
        );
        Ok(RestoreOutcome::Completed {
            restored,
            skipped,
            summaries,
        })
    }

    fn visible_display_ids(&self) -> Vec<i32> {
        match self.tray.active_notifications() {
            Ok(Some(active)) => active
                .into_iter()
                .map(|n| n.local_display_id)
                .collect::<HashSet<_>>()
                .into_iter()
                .collect(),
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!("Tray listing failed, restoring without exclusions: {:#}", e);
                Vec::new()
            }
        }
    }

    fn update_badge(&self) {
        let result = self
            .store
            .read(|q| q.count_live_notifications())
            .and_then(|count| self.tray.set_badge_count(count));
        if let Err(e) = result {
            warn!("Failed to update badge count after restore: {:#}", e);
        }
    }
}
