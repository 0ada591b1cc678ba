//! Re-posting notifications after a restart, reboot or app update.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior},
};
use crate::notifications::{RestoreOutcome, RestoreScheduler};
use std::sync::Arc;
use tracing::{debug, info};

pub struct NotificationRestoreJob {
    scheduler: Arc<RestoreScheduler>,
    run_on_startup: bool,
}

impl NotificationRestoreJob {
    pub fn new(scheduler: Arc<RestoreScheduler>) -> Self {
        Self {
            scheduler,
            run_on_startup: true,
        }
    }

    /// Only restore on boot and app update events.
    pub fn without_startup_run(mut self) -> Self {
        self.run_on_startup = false;
        self
    }
}

impl BackgroundJob for NotificationRestoreJob {
    fn id(&self) -> &'static str {
        "notification_restore"
    }

    fn name(&self) -> &'static str {
        "Notification Restore"
    }

    fn description(&self) -> &'static str {
        "Re-post live notifications that are missing from the tray"
    }

    fn schedule(&self) -> JobSchedule {
        let mut hooks = vec![HookEvent::OnBoot, HookEvent::OnAppUpdated];
        if self.run_on_startup {
            hooks.push(HookEvent::OnStartup);
        }
        JobSchedule::Combined {
            interval: None,
            hooks,
        }
    }

    // A half-finished restore is not retried in this process.
    fn shutdown_behavior(&self) -> ShutdownBehavior {
        ShutdownBehavior::WaitForCompletion
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        match self.scheduler.restore()? {
            RestoreOutcome::AlreadyRan => debug!("Notifications already restored"),
            RestoreOutcome::Completed {
                restored,
                skipped,
                summaries,
            } => info!(
                "Restored {} notifications ({} skipped, {} summaries)",
                restored, skipped, summaries
            ),
        }
        Ok(())
    }
}
