//! Notification lifecycle: receipt, dedup, grouping, eviction and restore.

mod dedup;
mod extension;
mod group;
mod limit;
mod models;
mod processor;
mod restore;
pub mod schema;
mod store;
mod tray;

#[cfg(test)]
pub(crate) mod test_support;

pub use dedup::DedupGuard;
pub use extension::{ExtensionDecision, ExtensionRegistry, NotificationExtension};
pub use group::{GroupOutcome, GroupReconciler};
pub use limit::{NotificationLimitManager, DEFAULT_MAX_ACTIVE_NOTIFICATIONS};
pub use models::{
    ConsumeAction, NewNotificationRecord, NotificationPayload, NotificationRecord, PayloadError,
};
pub use processor::{ConsumeOutcome, NotificationProcessor, ProcessOutcome};
pub use restore::{RestoreOutcome, RestoreScheduler};
pub use store::{NotificationQueries, NotificationStore, SqliteNotificationStore};
pub use tray::{
    ActiveNotification, DisplayRequest, LoggingTray, NotificationDisplay, NotificationTray,
    SummaryDisplay, SUMMARY_MAX_LINES,
};
