//! Boundary to the system notification tray.

use super::models::{NotificationRecord, PayloadError};
use anyhow::Result;
use serde::Serialize;
use tracing::info;

/// Maximum number of lines rendered inside a group summary.
pub const SUMMARY_MAX_LINES: usize = 5;

/// A single notification as handed to the tray.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationDisplay {
    pub local_display_id: i32,
    pub notification_id: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub group_id: Option<String>,
    /// Epoch seconds the notification was originally received at.
    pub created_time: i64,
    pub data: serde_json::Value,
    /// Re-posted after a restart or a group collapse, should not alert again.
    pub is_restoring: bool,
}

impl NotificationDisplay {
    /// Build a display request from a stored row, re-reading its payload.
    pub fn from_record(record: &NotificationRecord, is_restoring: bool) -> Result<Self, PayloadError> {
        let payload = record.payload()?;
        Ok(Self {
            local_display_id: record.local_display_id,
            notification_id: payload.notification_id,
            title: payload.title,
            message: payload.message,
            group_id: record.group_id.clone(),
            created_time: record.created_time,
            data: payload.data,
            is_restoring,
        })
    }

    /// Same notification detached from its group.
    pub fn ungrouped(mut self) -> Self {
        self.group_id = None;
        self
    }
}

/// The aggregate entry representing a group in the tray.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDisplay {
    pub local_display_id: i32,
    pub group_id: String,
    /// Number of live children in the group.
    pub count: usize,
    /// Lines of the most recent children, newest first.
    pub lines: Vec<String>,
}

impl SummaryDisplay {
    /// `children` must already be ordered newest first.
    pub fn from_children(
        local_display_id: i32,
        group_id: &str,
        children: &[NotificationRecord],
    ) -> Self {
        Self {
            local_display_id,
            group_id: group_id.to_string(),
            count: children.len(),
            lines: children
                .iter()
                .take(SUMMARY_MAX_LINES)
                .map(NotificationRecord::summary_line)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DisplayRequest {
    Single(NotificationDisplay),
    Summary(SummaryDisplay),
}

impl DisplayRequest {
    pub fn local_display_id(&self) -> i32 {
        match self {
            DisplayRequest::Single(display) => display.local_display_id,
            DisplayRequest::Summary(summary) => summary.local_display_id,
        }
    }
}

/// An entry currently visible in the tray.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveNotification {
    pub local_display_id: i32,
    /// When the tray posted it, epoch milliseconds.
    pub posted_at_millis: i64,
    pub is_group_summary: bool,
}

/// The operating system's notification tray.
pub trait NotificationTray: Send + Sync {
    /// Post or update the entry with the request's display id.
    fn post(&self, request: &DisplayRequest) -> Result<()>;

    fn cancel(&self, local_display_id: i32) -> Result<()>;

    /// Entries currently visible, or `None` when the platform cannot list them.
    fn active_notifications(&self) -> Result<Option<Vec<ActiveNotification>>> {
        Ok(None)
    }

    fn set_badge_count(&self, _count: usize) -> Result<()> {
        Ok(())
    }
}

/// Tray that only logs what it is asked to do. Used by the CLI.
#[derive(Debug, Default)]
pub struct LoggingTray;

impl NotificationTray for LoggingTray {
    fn post(&self, request: &DisplayRequest) -> Result<()> {
        match request {
            DisplayRequest::Single(single) => info!(
                "Post notification {} ({}): {}",
                single.local_display_id,
                single.notification_id,
                single.message.as_deref().unwrap_or("")
            ),
            DisplayRequest::Summary(summary) => info!(
                "Post summary {} for group {} with {} notifications",
                summary.local_display_id, summary.group_id, summary.count
            ),
        }
        Ok(())
    }

    fn cancel(&self, local_display_id: i32) -> Result<()> {
        info!("Cancel notification {}", local_display_id);
        Ok(())
    }

    fn set_badge_count(&self, count: usize) -> Result<()> {
        info!("Badge count set to {}", count);
        Ok(())
    }
}
