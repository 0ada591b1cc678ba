//! Keyed, cancellable delayed tasks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

pub trait TaskScheduler: Send + Sync {
    /// Run `task` after `delay`. A task already scheduled under `key` is
    /// cancelled and replaced.
    fn schedule(&self, key: &str, delay: Duration, task: ScheduledTask);

    /// Returns whether a task was pending under `key`.
    fn cancel(&self, key: &str) -> bool;

    fn cancel_all(&self);
}

/// Runs tasks on a tokio runtime. Tasks execute on the blocking pool.
pub struct TokioTaskScheduler {
    runtime: Handle,
    tasks: Arc<Mutex<HashMap<String, (u64, CancellationToken)>>>,
    next_generation: AtomicU64,
}

impl TokioTaskScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            tasks: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
        }
    }

    pub fn pending(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl TaskScheduler for TokioTaskScheduler {
    fn schedule(&self, key: &str, delay: Duration, task: ScheduledTask) {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((_, previous)) =
                tasks.insert(key.to_string(), (generation, token.clone()))
            {
                debug!("Replacing scheduled task {}", key);
                previous.cancel();
            }
        }

        let tasks = self.tasks.clone();
        let key = key.to_string();
        self.runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    {
                        let mut tasks = tasks.lock().unwrap_or_else(PoisonError::into_inner);
                        if tasks.get(&key).is_some_and(|(g, _)| *g == generation) {
                            tasks.remove(&key);
                        }
                    }
                    let _ = tokio::task::spawn_blocking(task).await;
                }
            }
        });
    }

    fn cancel(&self, key: &str) -> bool {
        let removed = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn cancel_all(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, (_, token)) in tasks.drain() {
            token.cancel();
        }
    }
}

/// Scheduler whose tasks only run when fired explicitly.
#[derive(Default)]
pub struct ManualTaskScheduler {
    tasks: Mutex<HashMap<String, (Duration, ScheduledTask)>>,
    scheduled_count: AtomicU64,
}

impl ManualTaskScheduler {
    pub fn pending_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    pub fn delay_of(&self, key: &str) -> Option<Duration> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map(|(delay, _)| *delay)
    }

    /// Number of `schedule` calls so far, replacements included.
    pub fn scheduled_count(&self) -> u64 {
        self.scheduled_count.load(Ordering::SeqCst)
    }

    /// Run the task pending under `key`. Returns false if there was none.
    pub fn fire(&self, key: &str) -> bool {
        let task = self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match task {
            Some((_, task)) => {
                task();
                true
            }
            None => false,
        }
    }
}

impl TaskScheduler for ManualTaskScheduler {
    fn schedule(&self, key: &str, delay: Duration, task: ScheduledTask) {
        self.scheduled_count.fetch_add(1, Ordering::SeqCst);
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (delay, task));
    }

    fn cancel(&self, key: &str) -> bool {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
            .is_some()
    }

    fn cancel_all(&self) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
