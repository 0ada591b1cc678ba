//! Host application hooks that run before a received notification is shown.

use super::models::NotificationPayload;
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtensionDecision {
    Display,
    /// Record the notification but never show it.
    Suppress,
}

pub trait NotificationExtension: Send + Sync {
    fn name(&self) -> &str;

    fn on_notification_received(&self, payload: &NotificationPayload) -> ExtensionDecision;
}

/// Extensions registered by the host application at startup.
#[derive(Default)]
pub struct ExtensionRegistry {
    extensions: RwLock<Vec<Arc<dyn NotificationExtension>>>,
}

impl ExtensionRegistry {
    pub fn register(&self, extension: Arc<dyn NotificationExtension>) {
        match self.extensions.write() {
            Ok(mut extensions) => {
                debug!("Registered notification extension {}", extension.name());
                extensions.push(extension);
            }
            Err(_) => warn!(
                "Extension registry lock poisoned, dropping {}",
                extension.name()
            ),
        }
    }

    pub fn len(&self) -> usize {
        self.extensions.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ask every extension in registration order; the first suppression wins.
    pub fn decide(&self, payload: &NotificationPayload) -> ExtensionDecision {
        let Ok(extensions) = self.extensions.read() else {
            warn!("Extension registry lock poisoned, displaying notification");
            return ExtensionDecision::Display;
        };
        for extension in extensions.iter() {
            if extension.on_notification_received(payload) == ExtensionDecision::Suppress {
                debug!(
                    "Notification {} suppressed by {}",
                    payload.notification_id,
                    extension.name()
                );
                return ExtensionDecision::Suppress;
            }
        }
        ExtensionDecision::Display
    }
}
