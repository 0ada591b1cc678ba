//! Background job scheduling and execution system.
//!
//! Runs periodic and lifecycle-triggered maintenance such as the retention
//! sweep and the post-reboot notification restore.

mod context;
mod handle;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use handle::{JobRun, JobRunStatus, SchedulerHandle, JOB_HISTORY_LEN};
pub use job::{BackgroundJob, HookEvent, JobError, JobSchedule, ShutdownBehavior};
pub use scheduler::{create_scheduler, JobScheduler};
