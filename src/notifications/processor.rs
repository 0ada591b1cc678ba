//! Entry point for received pushes and user interaction with notifications.

use super::dedup::DedupGuard;
use super::extension::{ExtensionDecision, ExtensionRegistry, NotificationExtension};
use super::group::{GroupOutcome, GroupReconciler};
use super::limit::NotificationLimitManager;
use super::models::{ConsumeAction, NewNotificationRecord, NotificationPayload, PayloadError};
use super::restore::RestoreScheduler;
use super::store::NotificationStore;
use super::tray::{DisplayRequest, NotificationDisplay, NotificationTray};
use crate::backend::ReceiptReporter;
use crate::clock::Clock;
use crate::config::NotificationSettings;
use crate::preferences::{
    Preferences, PREF_LAST_NOTIFICATION_RECEIVED_AT, PREF_RETENTION_DAYS_OVERRIDE,
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of handling one received payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Already recorded, nothing was done.
    Duplicate,
    Displayed {
        local_display_id: i32,
        summary_posted: bool,
    },
    /// Nothing to show; recorded as opened.
    Silent { local_display_id: i32 },
    /// An extension vetoed display; recorded as opened.
    Suppressed { local_display_id: i32 },
    /// The write failed. A redelivery of the same push will be processed again.
    NotPersisted,
}

/// Result of an open or dismiss.
#[derive(Debug, Clone, PartialEq)]
pub enum ConsumeOutcome {
    /// No row is shown under this display id.
    Unknown,
    AlreadyConsumed,
    Consumed { group: Option<GroupOutcome> },
    /// A summary was consumed together with its children.
    GroupConsumed { group_id: String, count: usize },
}

/// Result of the insert transaction.
enum Persisted {
    Inserted { local_display_id: i32 },
    Duplicate,
    Failed,
}

pub struct NotificationProcessor {
    store: Arc<dyn NotificationStore>,
    tray: Arc<dyn NotificationTray>,
    preferences: Arc<dyn Preferences>,
    clock: Arc<dyn Clock>,
    settings: NotificationSettings,
    dedup: DedupGuard,
    limits: NotificationLimitManager,
    reconciler: Arc<GroupReconciler>,
    extensions: ExtensionRegistry,
    receipts: Option<Arc<ReceiptReporter>>,
}

impl NotificationProcessor {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        tray: Arc<dyn NotificationTray>,
        preferences: Arc<dyn Preferences>,
        clock: Arc<dyn Clock>,
        settings: NotificationSettings,
    ) -> Self {
        let reconciler = Arc::new(GroupReconciler::new(
            store.clone(),
            tray.clone(),
            clock.clone(),
        ));
        Self {
            dedup: DedupGuard::new(store.clone()),
            limits: NotificationLimitManager::new(
                store.clone(),
                tray.clone(),
                reconciler.clone(),
                settings.max_active_notifications,
            ),
            reconciler,
            extensions: ExtensionRegistry::default(),
            receipts: None,
            store,
            tray,
            preferences,
            clock,
            settings,
        }
    }

    pub fn with_receipts(mut self, receipts: Arc<ReceiptReporter>) -> Self {
        self.receipts = Some(receipts);
        self
    }

    pub fn register_extension(&self, extension: Arc<dyn NotificationExtension>) {
        self.extensions.register(extension);
    }

    pub fn store(&self) -> Arc<dyn NotificationStore> {
        self.store.clone()
    }

    pub fn reconciler(&self) -> Arc<GroupReconciler> {
        self.reconciler.clone()
    }

    /// A restore scheduler sharing this processor's collaborators.
    pub fn restore_scheduler(&self) -> RestoreScheduler {
        RestoreScheduler::new(
            self.store.clone(),
            self.tray.clone(),
            self.reconciler.clone(),
            self.preferences.clone(),
            self.clock.clone(),
            self.settings.max_active_notifications,
            self.retention_secs(),
            self.settings.restore_delay(),
        )
    }

    /// Retention window in seconds, honouring the preference override.
    pub fn retention_secs(&self) -> i64 {
        match self.preferences.get_i64(PREF_RETENTION_DAYS_OVERRIDE) {
            Ok(Some(days)) if days > 0 => days * 24 * 60 * 60,
            Ok(_) => self.settings.retention_secs(),
            Err(e) => {
                warn!("Ignoring retention override: {:#}", e);
                self.settings.retention_secs()
            }
        }
    }

    /// Handle a raw push payload.
    pub fn process(&self, raw_payload: &str) -> Result<ProcessOutcome, PayloadError> {
        let payload = NotificationPayload::parse(raw_payload)?;
        if !self.dedup.should_process(&payload.notification_id) {
            return Ok(ProcessOutcome::Duplicate);
        }

        let now = self.clock.now_secs();
        if let Err(e) = self
            .preferences
            .set_i64(PREF_LAST_NOTIFICATION_RECEIVED_AT, now)
        {
            warn!("Failed to record last received time: {:#}", e);
        }

        let mut record = NewNotificationRecord::from_payload(&payload, raw_payload, now);
        let silent = payload.is_silent();
        let suppressed =
            !silent && self.extensions.decide(&payload) == ExtensionDecision::Suppress;
        if silent || suppressed {
            record.opened = true;
            let local_display_id = match self.persist(&record, &payload.notification_id) {
                Persisted::Inserted { local_display_id } => local_display_id,
                Persisted::Duplicate => return Ok(ProcessOutcome::Duplicate),
                Persisted::Failed => return Ok(ProcessOutcome::NotPersisted),
            };
            self.report_received(&payload.notification_id);
            return Ok(if suppressed {
                ProcessOutcome::Suppressed { local_display_id }
            } else {
                ProcessOutcome::Silent { local_display_id }
            });
        }

        if let Err(e) = self.limits.make_room_for(1) {
            warn!("Failed to make room for notification: {:#}", e);
        }
        let local_display_id = match self.persist(&record, &payload.notification_id) {
            Persisted::Inserted { local_display_id } => local_display_id,
            Persisted::Duplicate => return Ok(ProcessOutcome::Duplicate),
            Persisted::Failed => return Ok(ProcessOutcome::NotPersisted),
        };

        let display = NotificationDisplay {
            local_display_id,
            notification_id: payload.notification_id.clone(),
            title: payload.title.clone(),
            message: payload.message.clone(),
            group_id: payload.group_id.clone(),
            created_time: now,
            data: payload.data.clone(),
            is_restoring: false,
        };
        if let Err(e) = self.tray.post(&DisplayRequest::Single(display)) {
            warn!(
                "Failed to post notification {}: {:#}",
                payload.notification_id, e
            );
        }

        let summary_posted = match &payload.group_id {
            Some(group_id) => self.reconciler.show_summary(group_id).unwrap_or_else(|e| {
                warn!("Failed to update summary of group {}: {:#}", group_id, e);
                false
            }),
            None => false,
        };

        self.report_received(&payload.notification_id);
        self.update_badge();
        info!(
            "Displayed notification {} as {}",
            payload.notification_id, local_display_id
        );
        Ok(ProcessOutcome::Displayed {
            local_display_id,
            summary_posted,
        })
    }

    pub fn on_opened(&self, local_display_id: i32) -> Result<ConsumeOutcome> {
        self.consume(local_display_id, ConsumeAction::Opened)
    }

    pub fn on_dismissed(&self, local_display_id: i32) -> Result<ConsumeOutcome> {
        self.consume(local_display_id, ConsumeAction::Dismissed)
    }

    /// Delete every row created before `now` minus the retention window.
    pub fn sweep_expired(&self, now: i64) -> Result<usize> {
        let cutoff = now - self.retention_secs();
        let deleted = self.store.write(|q| q.delete_created_before(cutoff))?;
        if deleted > 0 {
            info!("Deleted {} expired notifications", deleted);
        }
        Ok(deleted)
    }

    /// Insert `record` unless a row for `notification_id` was stored since
    /// the first dedup check. Lookup and insert share one transaction.
    fn persist(&self, record: &NewNotificationRecord, notification_id: &str) -> Persisted {
        let result = self.store.write(|q| {
            if !DedupGuard::should_insert(q, notification_id) {
                return Ok(Persisted::Duplicate);
            }
            let inserted = q.insert(record)?;
            Ok(Persisted::Inserted {
                local_display_id: inserted.local_display_id,
            })
        });
        match result {
            Ok(persisted) => persisted,
            Err(e) => {
                error!(
                    "Failed to persist notification {}: {:#}",
                    notification_id, e
                );
                Persisted::Failed
            }
        }
    }

    fn consume(&self, local_display_id: i32, action: ConsumeAction) -> Result<ConsumeOutcome> {
        let Some(record) = self
            .store
            .read(|q| q.find_by_display_id(local_display_id))?
        else {
            debug!("No notification shown as {}", local_display_id);
            return Ok(ConsumeOutcome::Unknown);
        };

        if record.is_summary {
            let Some(group_id) = record.group_id.clone() else {
                warn!("Summary row {} has no group", record.row_id);
                return Ok(ConsumeOutcome::Unknown);
            };
            let consumed = self
                .store
                .write(|q| q.mark_group_consumed(&group_id, action))?;
            for child in consumed.iter().filter(|r| !r.is_summary) {
                self.cancel(child.local_display_id);
            }
            if action == ConsumeAction::Opened {
                self.cancel(record.local_display_id);
            }
            self.update_badge();
            return Ok(ConsumeOutcome::GroupConsumed {
                group_id,
                count: consumed.iter().filter(|r| !r.is_summary).count(),
            });
        }

        if record.is_consumed() {
            return Ok(ConsumeOutcome::AlreadyConsumed);
        }

        self.store
            .write(|q| q.mark_consumed(record.row_id, action))?;
        debug!("Notification {} marked {}", local_display_id, action);
        if action == ConsumeAction::Opened {
            self.cancel(local_display_id);
            if let (Some(receipts), Some(notification_id)) =
                (&self.receipts, &record.notification_id)
            {
                receipts.report_opened(notification_id, None);
            }
        }

        let group = match &record.group_id {
            Some(group_id) => match self.reconciler.on_child_removed(group_id, action) {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    warn!("Failed to reconcile group {}: {:#}", group_id, e);
                    None
                }
            },
            None => None,
        };
        self.update_badge();
        Ok(ConsumeOutcome::Consumed { group })
    }

    fn cancel(&self, local_display_id: i32) {
        if let Err(e) = self.tray.cancel(local_display_id) {
            warn!("Failed to cancel notification {}: {:#}", local_display_id, e);
        }
    }

    fn report_received(&self, notification_id: &str) {
        if let Some(receipts) = &self.receipts {
            receipts.report_received(notification_id, None);
        }
    }

    fn update_badge(&self) {
        let result = self
            .store
            .read(|q| q.count_live_notifications())
            .and_then(|count| self.tray.set_badge_count(count));
        if let Err(e) = result {
            warn!("Failed to update badge count: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::notifications::models::NotificationPayload;
    use crate::notifications::store::NotificationQueries;
    use crate::notifications::test_support::{payload_json, test_store, RecordingTray};
    use crate::preferences::SqlitePreferences;
    use crate::sqlite_persistence::open_in_memory_sdk_database;
    use anyhow::bail;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Delegates to a real store, failing writes while `fail_writes` is set.
    struct FailingWrites {
        inner: Arc<dyn NotificationStore>,
        fail_writes: AtomicBool,
    }

    impl NotificationStore for FailingWrites {
        fn read_with(
            &self,
            op: &mut dyn FnMut(&dyn NotificationQueries) -> Result<()>,
        ) -> Result<()> {
            self.inner.read_with(op)
        }

        fn write_with(
            &self,
            op: &mut dyn FnMut(&dyn NotificationQueries) -> Result<()>,
        ) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                bail!("disk I/O error");
            }
            self.inner.write_with(op)
        }
    }

    const NOW: i64 = 1_700_000_000;

    struct Fixture {
        processor: NotificationProcessor,
        store: Arc<dyn NotificationStore>,
        tray: Arc<RecordingTray>,
        preferences: Arc<SqlitePreferences>,
    }

    fn fixture() -> Fixture {
        let store = test_store();
        let tray = Arc::new(RecordingTray::default());
        let preferences = Arc::new(SqlitePreferences::new(open_in_memory_sdk_database().unwrap()));
        let processor = NotificationProcessor::new(
            store.clone(),
            tray.clone(),
            preferences.clone(),
            Arc::new(ManualClock::at_secs(NOW)),
            NotificationSettings {
                restore_delay_ms: 0,
                ..Default::default()
            },
        );
        Fixture {
            processor,
            store,
            tray,
            preferences,
        }
    }

    fn displayed_id(outcome: ProcessOutcome) -> i32 {
        match outcome {
            ProcessOutcome::Displayed {
                local_display_id, ..
            } => local_display_id,
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_process_displays_and_records() {
        let f = fixture();
        let id = displayed_id(f.processor.process(&payload_json("n-1", None)).unwrap());

        let record = f
            .store
            .read(|q| q.find_by_notification_id("n-1"))
            .unwrap()
            .unwrap();
        assert_eq!(record.local_display_id, id);
        assert_eq!(record.created_time, NOW);
        assert!(!record.is_consumed());

        let posted = f.tray.posted_singles();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].local_display_id, id);
        assert!(!posted[0].is_restoring);
        assert_eq!(
            f.preferences
                .get_i64(PREF_LAST_NOTIFICATION_RECEIVED_AT)
                .unwrap(),
            Some(NOW)
        );
    }

    #[test]
    fn test_duplicate_is_ignored() {
        let f = fixture();
        f.processor.process(&payload_json("n-1", None)).unwrap();
        assert_eq!(
            f.processor.process(&payload_json("n-1", None)).unwrap(),
            ProcessOutcome::Duplicate
        );
        assert_eq!(f.tray.posted_singles().len(), 1);
    }

    #[test]
    fn test_failed_write_is_retried_on_redelivery() {
        let inner = test_store();
        let store = Arc::new(FailingWrites {
            inner: inner.clone(),
            fail_writes: AtomicBool::new(true),
        });
        let tray = Arc::new(RecordingTray::default());
        let processor = NotificationProcessor::new(
            store.clone(),
            tray.clone(),
            Arc::new(SqlitePreferences::new(open_in_memory_sdk_database().unwrap())),
            Arc::new(ManualClock::at_secs(NOW)),
            NotificationSettings::default(),
        );

        assert_eq!(
            processor.process(&payload_json("n-1", None)).unwrap(),
            ProcessOutcome::NotPersisted
        );
        assert!(tray.calls().is_empty());
        assert!(inner
            .read(|q| q.find_by_notification_id("n-1"))
            .unwrap()
            .is_none());

        store.fail_writes.store(false, Ordering::SeqCst);
        displayed_id(processor.process(&payload_json("n-1", None)).unwrap());
        assert_eq!(tray.posted_singles().len(), 1);
    }

    #[test]
    fn test_concurrent_deliveries_store_one_row() {
        let f = fixture();
        for round in 0..20 {
            let raw = payload_json(&format!("n-{round}"), None);
            let outcomes: Vec<ProcessOutcome> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|_| scope.spawn(|| f.processor.process(&raw).unwrap()))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            let stored = outcomes
                .iter()
                .filter(|o| **o != ProcessOutcome::Duplicate)
                .count();
            assert_eq!(stored, 1, "round {round}: {:?}", outcomes);
        }
        assert_eq!(f.store.read(|q| q.count_live_notifications()).unwrap(), 20);
        assert_eq!(f.tray.posted_singles().len(), 20);
    }

    #[test]
    fn test_bad_payload_is_an_error() {
        let f = fixture();
        assert!(f.processor.process("[]").is_err());
        assert!(f.processor.process(r#"{"title":"x"}"#).is_err());
    }

    #[test]
    fn test_silent_push_recorded_as_opened() {
        let f = fixture();
        let outcome = f
            .processor
            .process(r#"{"notification_id":"quiet","data":{"sync":true}}"#)
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Silent { .. }));
        assert!(f.tray.calls().is_empty());

        let record = f
            .store
            .read(|q| q.find_by_notification_id("quiet"))
            .unwrap()
            .unwrap();
        assert!(record.opened);
    }

    #[test]
    fn test_extension_can_suppress() {
        struct NoPromos;
        impl NotificationExtension for NoPromos {
            fn name(&self) -> &str {
                "no-promos"
            }
            fn on_notification_received(&self, payload: &NotificationPayload) -> ExtensionDecision {
                if payload.data["promo"] == true {
                    ExtensionDecision::Suppress
                } else {
                    ExtensionDecision::Display
                }
            }
        }

        let f = fixture();
        f.processor.register_extension(Arc::new(NoPromos));
        let outcome = f
            .processor
            .process(r#"{"notification_id":"p","message":"sale","data":{"promo":true}}"#)
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Suppressed { .. }));
        assert!(f.tray.posted_singles().is_empty());

        displayed_id(f.processor.process(&payload_json("regular", None)).unwrap());
    }

    #[test]
    fn test_second_group_member_posts_summary() {
        let f = fixture();
        let first = f.processor.process(&payload_json("a", Some("chat"))).unwrap();
        assert!(matches!(
            first,
            ProcessOutcome::Displayed {
                summary_posted: false,
                ..
            }
        ));
        let second = f.processor.process(&payload_json("b", Some("chat"))).unwrap();
        assert!(matches!(
            second,
            ProcessOutcome::Displayed {
                summary_posted: true,
                ..
            }
        ));
        assert_eq!(f.tray.posted_summaries()[0].count, 2);
    }

    #[test]
    fn test_open_marks_row_and_cancels() {
        let f = fixture();
        let id = displayed_id(f.processor.process(&payload_json("n-1", None)).unwrap());

        let outcome = f.processor.on_opened(id).unwrap();
        assert_eq!(outcome, ConsumeOutcome::Consumed { group: None });
        assert!(f.tray.cancelled().contains(&id));
        assert_eq!(
            f.processor.on_dismissed(id).unwrap(),
            ConsumeOutcome::AlreadyConsumed
        );
        assert_eq!(f.processor.on_opened(12345).unwrap(), ConsumeOutcome::Unknown);
    }

    #[test]
    fn test_opening_summary_consumes_group() {
        let f = fixture();
        let a = displayed_id(f.processor.process(&payload_json("a", Some("chat"))).unwrap());
        let b = displayed_id(f.processor.process(&payload_json("b", Some("chat"))).unwrap());
        displayed_id(f.processor.process(&payload_json("c", None)).unwrap());
        let summary_id = f.tray.posted_summaries()[0].local_display_id;

        let outcome = f.processor.on_opened(summary_id).unwrap();
        assert_eq!(
            outcome,
            ConsumeOutcome::GroupConsumed {
                group_id: "chat".to_string(),
                count: 2
            }
        );
        let cancelled = f.tray.cancelled();
        assert!(cancelled.contains(&a));
        assert!(cancelled.contains(&b));
        assert!(cancelled.contains(&summary_id));
        assert_eq!(f.store.read(|q| q.count_live_notifications()).unwrap(), 1);
    }

    #[test]
    fn test_sweep_uses_retention_override() {
        let f = fixture();
        f.processor.process(&payload_json("n-1", None)).unwrap();

        assert_eq!(f.processor.sweep_expired(NOW + 604_800).unwrap(), 0);

        f.preferences
            .set_i64(PREF_RETENTION_DAYS_OVERRIDE, 1)
            .unwrap();
        assert_eq!(f.processor.retention_secs(), 86_400);
        assert_eq!(f.processor.sweep_expired(NOW + 86_401).unwrap(), 1);
    }
}
