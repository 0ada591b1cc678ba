//! Periodic removal of expired notification rows and stale in-app statistics.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior},
};
use crate::in_app::InAppMessageStore;
use crate::notifications::NotificationProcessor;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Deletes notifications older than the retention window and in-app display
/// statistics of messages not shown for `in_app_retention_secs`.
pub struct NotificationRetentionJob {
    processor: Arc<NotificationProcessor>,
    in_app_store: Option<Arc<dyn InAppMessageStore>>,
    in_app_retention_secs: i64,
    interval: Duration,
}

impl NotificationRetentionJob {
    pub fn new(processor: Arc<NotificationProcessor>, interval: Duration) -> Self {
        Self {
            processor,
            in_app_store: None,
            in_app_retention_secs: 0,
            interval,
        }
    }

    pub fn with_in_app_store(
        mut self,
        store: Arc<dyn InAppMessageStore>,
        retention_secs: i64,
    ) -> Self {
        self.in_app_store = Some(store);
        self.in_app_retention_secs = retention_secs;
        self
    }
}

impl BackgroundJob for NotificationRetentionJob {
    fn id(&self) -> &'static str {
        "notification_retention"
    }

    fn name(&self) -> &'static str {
        "Notification Retention"
    }

    fn description(&self) -> &'static str {
        "Delete notifications and in-app statistics past their retention window"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: Some(self.interval),
            hooks: vec![HookEvent::OnStartup],
        }
    }

    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::Cancellable
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let now = ctx.clock.now_secs();
        let deleted = self.processor.sweep_expired(now)?;
        info!("Notification retention removed {} rows", deleted);

        let Some(store) = &self.in_app_store else {
            return Ok(());
        };
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }
        let cutoff = now - self.in_app_retention_secs;
        let deleted = store.delete_displayed_before(cutoff)?;
        if deleted > 0 {
            info!("Deleted statistics of {} in-app messages", deleted);
        }

        Ok(())
    }
}
