//! Keeps the number of visible notifications under the per-app ceiling.

use super::group::GroupReconciler;
use super::models::ConsumeAction;
use super::store::NotificationStore;
use super::tray::NotificationTray;
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Simultaneous notifications the OS allows per app.
pub const DEFAULT_MAX_ACTIVE_NOTIFICATIONS: usize = 49;

pub struct NotificationLimitManager {
    store: Arc<dyn NotificationStore>,
    tray: Arc<dyn NotificationTray>,
    reconciler: Arc<GroupReconciler>,
    max_active: usize,
}

impl NotificationLimitManager {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        tray: Arc<dyn NotificationTray>,
        reconciler: Arc<GroupReconciler>,
        max_active: usize,
    ) -> Self {
        Self {
            store,
            tray,
            reconciler,
            max_active,
        }
    }

    pub fn max_active(&self) -> usize {
        self.max_active
    }

    /// Evict the oldest live notifications so that `incoming` more fit under
    /// the ceiling. Evicted rows are cancelled and marked dismissed, never
    /// deleted, and the summaries of their groups are reconciled. Returns the
    /// evicted display ids, oldest first.
    pub fn make_room_for(&self, incoming: usize) -> Result<Vec<i32>> {
        let keep = self.max_active.saturating_sub(incoming);
        let victims = match self.victims_from_tray(keep) {
            Some(victims) => victims,
            None => self.victims_from_store(keep)?,
        };
        if victims.is_empty() {
            return Ok(victims);
        }

        info!(
            "Evicting {} notifications to make room for {}",
            victims.len(),
            incoming
        );
        let groups = self.store.write(|q| {
            let mut groups = BTreeSet::new();
            for id in &victims {
                if let Some(record) = q.find_by_display_id(*id)? {
                    if !record.is_summary && !record.is_consumed() {
                        groups.extend(record.group_id);
                    }
                }
            }
            q.mark_consumed_by_display_ids(&victims, ConsumeAction::Dismissed)?;
            Ok(groups)
        })?;
        for id in &victims {
            if let Err(e) = self.tray.cancel(*id) {
                warn!("Failed to cancel evicted notification {}: {:#}", id, e);
            }
        }
        for group_id in &groups {
            if let Err(e) = self
                .reconciler
                .on_child_removed(group_id, ConsumeAction::Dismissed)
            {
                warn!("Failed to reconcile group {} after eviction: {:#}", group_id, e);
            }
        }
        Ok(victims)
    }

    /// Oldest excess entries by posted time, or `None` when the tray cannot be listed.
    fn victims_from_tray(&self, keep: usize) -> Option<Vec<i32>> {
        let mut active = match self.tray.active_notifications() {
            Ok(Some(active)) => active,
            Ok(None) => return None,
            Err(e) => {
                debug!("Tray listing failed, falling back to store: {:#}", e);
                return None;
            }
        };
        active.retain(|n| !n.is_group_summary);
        active.sort_by_key(|n| (n.posted_at_millis, n.local_display_id));

        let excess = active.len().saturating_sub(keep);
        Some(
            active
                .into_iter()
                .take(excess)
                .map(|n| n.local_display_id)
                .collect(),
        )
    }

    fn victims_from_store(&self, keep: usize) -> Result<Vec<i32>> {
        let live = self.store.read(|q| q.live_notifications_oldest_first())?;
        let excess = live.len().saturating_sub(keep);
        Ok(live
            .into_iter()
            .take(excess)
            .map(|record| record.local_display_id)
            .collect())
    }
}
