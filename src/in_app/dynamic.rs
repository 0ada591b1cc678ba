//! Time-based triggers.
//!
//! A dynamic trigger compares the time elapsed since a reference instant with
//! the trigger value in seconds. When the comparison fails but will hold later
//! (the required interval lies ahead), a timer is scheduled for the moment it
//! becomes true. Firing the timer only tells observers to evaluate again; it
//! never shows anything by itself, so a stale timer is harmless.

use super::models::{as_number, Trigger, TriggerKind};
use super::task_scheduler::TaskScheduler;
use crate::clock::Clock;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;
use tracing::debug;

/// Interval assumed when no in-app message was dismissed yet.
pub const DEFAULT_TIME_SINCE_LAST_IN_APP_MS: i64 = 999_999 * 1000;

const NEVER: i64 = i64::MIN;

/// Notified when trigger conditions may have changed.
pub trait TriggerObserver: Send + Sync {
    fn on_trigger_conditions_changed(&self);
}

type Observers = Mutex<Vec<Weak<dyn TriggerObserver>>>;

pub struct DynamicTriggerScheduler {
    clock: Arc<dyn Clock>,
    tasks: Arc<dyn TaskScheduler>,
    pending: Arc<Mutex<HashSet<String>>>,
    observers: Arc<Observers>,
    session_started_at: AtomicI64,
    last_dismissed_at: AtomicI64,
    message_showing: AtomicBool,
}

impl DynamicTriggerScheduler {
    /// The session is considered started now.
    pub fn new(clock: Arc<dyn Clock>, tasks: Arc<dyn TaskScheduler>) -> Self {
        let now = clock.now_millis();
        Self {
            clock,
            tasks,
            pending: Arc::new(Mutex::new(HashSet::new())),
            observers: Arc::new(Mutex::new(Vec::new())),
            session_started_at: AtomicI64::new(now),
            last_dismissed_at: AtomicI64::new(NEVER),
            message_showing: AtomicBool::new(false),
        }
    }

    /// Observers are held weakly and dropped once they are gone.
    pub fn add_observer(&self, observer: &Arc<dyn TriggerObserver>) {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::downgrade(observer));
    }

    pub fn on_session_started(&self) {
        self.session_started_at
            .store(self.clock.now_millis(), Ordering::SeqCst);
    }

    pub fn on_message_showing(&self) {
        self.message_showing.store(true, Ordering::SeqCst);
    }

    pub fn on_message_dismissed(&self) {
        self.message_showing.store(false, Ordering::SeqCst);
        self.last_dismissed_at
            .store(self.clock.now_millis(), Ordering::SeqCst);
    }

    pub fn is_pending(&self, message_id: &str, trigger_id: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&timer_key(message_id, trigger_id))
    }

    /// Whether `trigger` of message `message_id` holds now. Schedules a
    /// re-evaluation timer when it will hold later and none is pending for
    /// the same message and trigger id.
    pub fn should_fire(&self, message_id: &str, trigger: &Trigger) -> bool {
        let Some(required_secs) = trigger.value.as_ref().and_then(as_number) else {
            debug!("Dynamic trigger {} has no numeric value", trigger.id);
            return false;
        };

        let now = self.clock.now_millis();
        let current_interval = match trigger.kind {
            TriggerKind::SessionTime => now - self.session_started_at.load(Ordering::SeqCst),
            TriggerKind::TimeSinceLastInApp => {
                if self.message_showing.load(Ordering::SeqCst) {
                    return false;
                }
                match self.last_dismissed_at.load(Ordering::SeqCst) {
                    NEVER => DEFAULT_TIME_SINCE_LAST_IN_APP_MS,
                    dismissed_at => now - dismissed_at,
                }
            }
            TriggerKind::Custom => return false,
        };
        let required_interval = (required_secs * 1000.0) as i64;

        if trigger
            .operator
            .compare_numbers(current_interval as f64, required_interval as f64)
        {
            return true;
        }

        let offset = required_interval - current_interval;
        if offset <= 0 {
            return false;
        }

        let key = timer_key(message_id, &trigger.id);
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if !pending.insert(key.clone()) {
                return false;
            }
        }

        debug!(
            "Scheduling re-evaluation for trigger {} of message {} in {} ms",
            trigger.id, message_id, offset
        );
        let pending = self.pending.clone();
        let observers = self.observers.clone();
        let fired_key = key.clone();
        self.tasks.schedule(
            &key,
            Duration::from_millis(offset as u64),
            Box::new(move || {
                pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&fired_key);
                notify_observers(&observers);
            }),
        );
        false
    }

    /// Drop every pending timer.
    pub fn reset(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        for key in pending.drain() {
            self.tasks.cancel(&key);
        }
    }
}

/// Trigger ids are only unique within a message.
fn timer_key(message_id: &str, trigger_id: &str) -> String {
    format!("{message_id}/{trigger_id}")
}

fn notify_observers(observers: &Observers) {
    let live: Vec<Arc<dyn TriggerObserver>> = {
        let mut observers = observers.lock().unwrap_or_else(PoisonError::into_inner);
        observers.retain(|o| o.strong_count() > 0);
        observers.iter().filter_map(Weak::upgrade).collect()
    };
    for observer in live {
        observer.on_trigger_conditions_changed();
    }
}
