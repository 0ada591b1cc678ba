//! Keeps group summaries consistent with their live children.
//!
//! Store updates for one reconciliation pass happen in a single write
//! transaction; tray side effects are applied only after it commits.

use super::models::{ConsumeAction, NewNotificationRecord, NotificationRecord};
use super::store::NotificationStore;
use super::tray::{DisplayRequest, NotificationDisplay, NotificationTray, SummaryDisplay};
use crate::clock::Clock;
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// What a reconciliation pass did to a group.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    /// The group has no live summary, nothing to reconcile.
    NoSummary,
    /// No live child remains; the summary was consumed and cancelled.
    SummaryConsumed { summary_display_id: i32 },
    /// One child remains; the summary was consumed and the child re-posted alone.
    CollapsedToSingle {
        summary_display_id: i32,
        remaining: NotificationRecord,
    },
    /// Two or more children remain; the summary content was refreshed.
    SummaryRefreshed(SummaryDisplay),
}

pub struct GroupReconciler {
    store: Arc<dyn NotificationStore>,
    tray: Arc<dyn NotificationTray>,
    clock: Arc<dyn Clock>,
}

impl GroupReconciler {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        tray: Arc<dyn NotificationTray>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, tray, clock }
    }

    /// Refresh the summary of `group_id` after a child was posted. Never creates
    /// a summary.
    pub fn on_child_added(&self, group_id: &str) -> Result<Option<SummaryDisplay>> {
        let summary = self.store.read(|q| {
            let Some(summary) = q.live_group_summary(group_id)? else {
                return Ok(None);
            };
            let children = q.live_group_children(group_id)?;
            Ok(Some(SummaryDisplay::from_children(
                summary.local_display_id,
                group_id,
                &children,
            )))
        })?;

        if let Some(summary) = &summary {
            self.tray.post(&DisplayRequest::Summary(summary.clone()))?;
        }
        Ok(summary)
    }

    /// Summary to show for `group_id` when it has at least two live children,
    /// inserting the summary row if none is live.
    pub fn ensure_summary(&self, group_id: &str) -> Result<Option<SummaryDisplay>> {
        let now = self.clock.now_secs();
        self.store.write(|q| {
            let children = q.live_group_children(group_id)?;
            if children.len() < 2 {
                return Ok(None);
            }
            let summary = match q.live_group_summary(group_id)? {
                Some(summary) => summary,
                None => {
                    debug!("Creating summary row for group {}", group_id);
                    q.insert(&NewNotificationRecord::summary(group_id, None, now))?
                }
            };
            Ok(Some(SummaryDisplay::from_children(
                summary.local_display_id,
                group_id,
                &children,
            )))
        })
    }

    /// [`Self::ensure_summary`] followed by posting the summary. Returns whether
    /// a summary was posted.
    pub fn show_summary(&self, group_id: &str) -> Result<bool> {
        match self.ensure_summary(group_id)? {
            Some(summary) => {
                self.tray.post(&DisplayRequest::Summary(summary))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Recount the live children of `group_id` after one of them was consumed
    /// with `action`, and fix up the summary.
    pub fn on_child_removed(&self, group_id: &str, action: ConsumeAction) -> Result<GroupOutcome> {
        let outcome = self.store.write(|q| {
            let Some(summary) = q.live_group_summary(group_id)? else {
                return Ok(GroupOutcome::NoSummary);
            };
            let children = q.live_group_children(group_id)?;
            match children.as_slice() {
                [] => {
                    q.mark_consumed(summary.row_id, action)?;
                    Ok(GroupOutcome::SummaryConsumed {
                        summary_display_id: summary.local_display_id,
                    })
                }
                [remaining] => {
                    q.mark_consumed(summary.row_id, action)?;
                    Ok(GroupOutcome::CollapsedToSingle {
                        summary_display_id: summary.local_display_id,
                        remaining: remaining.clone(),
                    })
                }
                _ => Ok(GroupOutcome::SummaryRefreshed(SummaryDisplay::from_children(
                    summary.local_display_id,
                    group_id,
                    &children,
                ))),
            }
        })?;

        self.apply(group_id, &outcome);
        Ok(outcome)
    }

    fn apply(&self, group_id: &str, outcome: &GroupOutcome) {
        match outcome {
            GroupOutcome::NoSummary => {}
            GroupOutcome::SummaryConsumed { summary_display_id } => {
                debug!("Group {} exhausted, cancelling summary", group_id);
                self.cancel(*summary_display_id);
            }
            GroupOutcome::CollapsedToSingle {
                summary_display_id,
                remaining,
            } => {
                debug!(
                    "Group {} collapsed to notification {}",
                    group_id, remaining.local_display_id
                );
                self.cancel(*summary_display_id);
                match NotificationDisplay::from_record(remaining, true) {
                    Ok(display) => {
                        let request = DisplayRequest::Single(display.ungrouped());
                        if let Err(e) = self.tray.post(&request) {
                            warn!(
                                "Failed to re-post notification {} of group {}: {:#}",
                                remaining.local_display_id, group_id, e
                            );
                        }
                    }
                    Err(e) => warn!(
                        "Stored payload of row {} is unreadable, not re-posting: {}",
                        remaining.row_id, e
                    ),
                }
            }
            GroupOutcome::SummaryRefreshed(summary) => {
                if let Err(e) = self.tray.post(&DisplayRequest::Summary(summary.clone())) {
                    warn!("Failed to refresh summary of group {}: {:#}", group_id, e);
                }
            }
        }
    }

    fn cancel(&self, local_display_id: i32) {
        if let Err(e) = self.tray.cancel(local_display_id) {
            warn!("Failed to cancel summary {}: {:#}", local_display_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notifications::test_support::{insert_received, test_store, RecordingTray, TrayCall};

    fn reconciler(tray: Arc<RecordingTray>) -> (Arc<dyn NotificationStore>, GroupReconciler) {
        let store = test_store();
        let reconciler = GroupReconciler::new(
            store.clone(),
            tray,
            Arc::new(ManualClock::at_secs(1_000)),
        );
        (store, reconciler)
    }

    #[test]
    fn test_ensure_summary_needs_two_children() {
        let tray = Arc::new(RecordingTray::default());
        let (store, reconciler) = reconciler(tray);

        insert_received(&store, "a", Some("g"), 100);
        assert!(reconciler.ensure_summary("g").unwrap().is_none());
        assert!(store.read(|q| q.live_group_summary("g")).unwrap().is_none());

        insert_received(&store, "b", Some("g"), 100);
        let first = reconciler.ensure_summary("g").unwrap().unwrap();
        assert_eq!(first.count, 2);
        assert_eq!(first.lines, vec!["title b: message b", "title a: message a"]);

        // a second call reuses the live summary row
        let second = reconciler.ensure_summary("g").unwrap().unwrap();
        assert_eq!(first.local_display_id, second.local_display_id);
    }

    #[test]
    fn test_on_child_added_without_summary_creates_nothing() {
        let tray = Arc::new(RecordingTray::default());
        let (store, reconciler) = reconciler(tray.clone());

        insert_received(&store, "a", Some("g"), 100);
        insert_received(&store, "b", Some("g"), 100);
        assert!(reconciler.on_child_added("g").unwrap().is_none());
        assert!(store.read(|q| q.live_group_summary("g")).unwrap().is_none());
        assert!(tray.calls().is_empty());
    }

    #[test]
    fn test_on_child_added_refreshes_live_summary() {
        let tray = Arc::new(RecordingTray::default());
        let (store, reconciler) = reconciler(tray.clone());

        insert_received(&store, "a", Some("g"), 100);
        insert_received(&store, "b", Some("g"), 100);
        reconciler.ensure_summary("g").unwrap();
        insert_received(&store, "c", Some("g"), 100);

        let refreshed = reconciler.on_child_added("g").unwrap().unwrap();
        assert_eq!(refreshed.count, 3);
        assert_eq!(tray.posted_summaries().len(), 1);
    }

    #[test]
    fn test_collapse_to_single() {
        let tray = Arc::new(RecordingTray::default());
        let (store, reconciler) = reconciler(tray.clone());

        let a = insert_received(&store, "a", Some("g"), 100);
        let b = insert_received(&store, "b", Some("g"), 90);
        let summary = reconciler.ensure_summary("g").unwrap().unwrap();

        store
            .write(|q| q.mark_consumed(a.row_id, ConsumeAction::Dismissed))
            .unwrap();
        let outcome = reconciler
            .on_child_removed("g", ConsumeAction::Dismissed)
            .unwrap();

        match outcome {
            GroupOutcome::CollapsedToSingle {
                summary_display_id,
                remaining,
            } => {
                assert_eq!(summary_display_id, summary.local_display_id);
                assert_eq!(remaining.row_id, b.row_id);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(store.read(|q| q.live_group_summary("g")).unwrap().is_none());
        let calls = tray.calls();
        assert_eq!(calls[0], TrayCall::Cancel(summary.local_display_id));
        match &calls[1] {
            TrayCall::Post(DisplayRequest::Single(display)) => {
                assert_eq!(display.local_display_id, b.local_display_id);
                assert_eq!(display.created_time, 90);
                assert!(display.group_id.is_none());
            }
            other => panic!("unexpected call {:?}", other),
        }
    }

    #[test]
    fn test_exhaustion_consumes_summary_with_same_flag() {
        let tray = Arc::new(RecordingTray::default());
        let (store, reconciler) = reconciler(tray.clone());

        let a = insert_received(&store, "a", Some("g"), 100);
        let b = insert_received(&store, "b", Some("g"), 100);
        let summary = reconciler.ensure_summary("g").unwrap().unwrap();
        store
            .write(|q| {
                q.mark_consumed(a.row_id, ConsumeAction::Opened)?;
                q.mark_consumed(b.row_id, ConsumeAction::Opened)
            })
            .unwrap();

        let outcome = reconciler.on_child_removed("g", ConsumeAction::Opened).unwrap();
        assert_eq!(
            outcome,
            GroupOutcome::SummaryConsumed {
                summary_display_id: summary.local_display_id
            }
        );

        let row = store
            .read(|q| q.find_by_display_id(summary.local_display_id))
            .unwrap()
            .unwrap();
        assert!(row.opened);
        assert!(!row.dismissed);
        assert_eq!(tray.calls(), vec![TrayCall::Cancel(summary.local_display_id)]);
    }

    #[test]
    fn test_removal_with_many_children_refreshes() {
        let tray = Arc::new(RecordingTray::default());
        let (store, reconciler) = reconciler(tray.clone());

        let a = insert_received(&store, "a", Some("g"), 100);
        insert_received(&store, "b", Some("g"), 100);
        insert_received(&store, "c", Some("g"), 100);
        reconciler.ensure_summary("g").unwrap();
        store
            .write(|q| q.mark_consumed(a.row_id, ConsumeAction::Dismissed))
            .unwrap();

        match reconciler.on_child_removed("g", ConsumeAction::Dismissed).unwrap() {
            GroupOutcome::SummaryRefreshed(summary) => {
                assert_eq!(summary.count, 2);
                assert_eq!(summary.lines[0], "title c: message c");
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(store.read(|q| q.live_group_summary("g")).unwrap().is_some());
        assert_eq!(tray.posted_summaries().len(), 1);
    }

    #[test]
    fn test_removal_without_summary_is_noop() {
        let tray = Arc::new(RecordingTray::default());
        let (store, reconciler) = reconciler(tray.clone());
        insert_received(&store, "a", Some("g"), 100);

        let outcome = reconciler
            .on_child_removed("g", ConsumeAction::Dismissed)
            .unwrap();
        assert_eq!(outcome, GroupOutcome::NoSummary);
        assert!(tray.calls().is_empty());
    }
}
