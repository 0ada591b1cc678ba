//! notifykit: push notification bookkeeping and in-app message triggering.
//!
//! This library exposes the SDK modules for embedding and for tests.

pub mod backend;
pub mod background_jobs;
pub mod clock;
pub mod config;
pub mod context;
pub mod in_app;
pub mod notifications;
pub mod preferences;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CliConfig, FileConfig, SdkConfig};
pub use context::SdkContext;
pub use in_app::{InAppMessage, InAppMessageController, InAppMessagePresenter, TriggerTree};
pub use notifications::{
    NotificationProcessor, NotificationTray, ProcessOutcome, RestoreOutcome,
};
