//! Background job implementations for SDK maintenance.

pub mod restore;
pub mod retention;

pub use restore::NotificationRestoreJob;
pub use retention::NotificationRetentionJob;
