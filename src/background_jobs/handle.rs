use super::job::{BackgroundJob, HookEvent, JobError};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

/// Number of finished runs kept per job.
pub const JOB_HISTORY_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
            JobRunStatus::Cancelled => "cancelled",
        }
    }
}

/// A finished job execution.
#[derive(Debug, Clone)]
pub struct JobRun {
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

/// Command sent to the scheduler.
pub enum SchedulerCommand {
    TriggerJob {
        job_id: String,
        response: oneshot::Sender<Result<(), JobError>>,
    },
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub struct SharedJobState {
    pub jobs: HashMap<String, Arc<dyn BackgroundJob>>,
    pub running_jobs: HashSet<String>,
    /// Most recent runs first.
    pub history: HashMap<String, VecDeque<JobRun>>,
}

impl SharedJobState {
    pub fn record_run(&mut self, run: JobRun) {
        let runs = self.history.entry(run.job_id.clone()).or_default();
        runs.push_front(run);
        runs.truncate(JOB_HISTORY_LEN);
    }
}

/// Handle to interact with a running job scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    hook_tx: mpsc::Sender<HookEvent>,
    shared_state: Arc<RwLock<SharedJobState>>,
}

impl SchedulerHandle {
    pub fn new(
        command_tx: mpsc::Sender<SchedulerCommand>,
        hook_tx: mpsc::Sender<HookEvent>,
        shared_state: Arc<RwLock<SharedJobState>>,
    ) -> Self {
        Self {
            command_tx,
            hook_tx,
            shared_state,
        }
    }

    /// Deliver a lifecycle event to the jobs listening for it.
    pub async fn notify(&self, event: HookEvent) -> Result<(), JobError> {
        self.hook_tx
            .send(event)
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler is not running".to_string()))
    }

    /// Run a job now, regardless of its schedule.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(SchedulerCommand::TriggerJob {
                job_id: job_id.to_string(),
                response: response_tx,
            })
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler is not running".to_string()))?;
        response_rx
            .await
            .map_err(|_| JobError::ExecutionFailed("Scheduler dropped the request".to_string()))?
    }

    pub async fn is_job_running(&self, job_id: &str) -> bool {
        self.shared_state.read().await.running_jobs.contains(job_id)
    }

    pub async fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared_state.read().await.jobs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Finished runs of `job_id`, most recent first.
    pub async fn job_history(&self, job_id: &str, limit: usize) -> Vec<JobRun> {
        self.shared_state
            .read()
            .await
            .history
            .get(job_id)
            .map(|runs| runs.iter().take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
