use super::models::NotificationRecord;
use super::store::{NotificationQueries, NotificationStore};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, warn};

/// Skips notifications whose backend id is already recorded.
pub struct DedupGuard {
    store: Arc<dyn NotificationStore>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Returns false only when a row for `notification_id` is known to exist.
    /// Storage errors let the notification through.
    pub fn should_process(&self, notification_id: &str) -> bool {
        let lookup = self
            .store
            .read(|q| q.find_by_notification_id(notification_id));
        Self::decide(notification_id, lookup)
    }

    /// The same check inside an open write transaction. Running it in the
    /// transaction that inserts the row keeps concurrent deliveries of one
    /// push from both being stored.
    pub fn should_insert(queries: &dyn NotificationQueries, notification_id: &str) -> bool {
        Self::decide(
            notification_id,
            queries.find_by_notification_id(notification_id),
        )
    }

    fn decide(notification_id: &str, lookup: Result<Option<NotificationRecord>>) -> bool {
        match lookup {
            Ok(Some(existing)) => {
                debug!(
                    "Notification {} already recorded as row {}, skipping",
                    notification_id, existing.row_id
                );
                false
            }
            Ok(None) => true,
            Err(e) => {
                warn!(
                    "Dedup lookup for notification {} failed, processing anyway: {:#}",
                    notification_id, e
                );
                true
            }
        }
    }
}
