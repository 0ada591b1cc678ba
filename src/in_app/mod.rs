//! In-app message triggers, timers and display gating.

mod controller;
mod dynamic;
mod evaluator;
mod models;
mod redisplay;
pub mod schema;
mod store;
mod task_scheduler;
mod trigger_store;

pub use controller::{InAppMessageController, InAppMessagePresenter};
pub use dynamic::{DynamicTriggerScheduler, TriggerObserver, DEFAULT_TIME_SINCE_LAST_IN_APP_MS};
pub use evaluator::TriggerEvaluator;
pub use models::{
    as_number, InAppMessage, RedisplayConfig, RedisplayStats, Trigger, TriggerKind,
    TriggerOperator, TriggerTree, NUMERIC_TOLERANCE,
};
pub use redisplay::RedisplayGate;
pub use store::{InAppMessageStore, SqliteInAppMessageStore, StoredDisplayStats};
pub use task_scheduler::{ManualTaskScheduler, ScheduledTask, TaskScheduler, TokioTaskScheduler};
pub use trigger_store::TriggerStore;
