//! Notification data models

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// How the user (or the system) consumed a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumeAction {
    Opened,
    Dismissed,
}

impl ConsumeAction {
    /// Name of the flag column this action sets.
    pub fn column(&self) -> &'static str {
        match self {
            ConsumeAction::Opened => "opened",
            ConsumeAction::Dismissed => "dismissed",
        }
    }
}

impl std::fmt::Display for ConsumeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// A row of the `notification` table.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub row_id: i64,
    /// Backend id, `None` for synthetic summary rows.
    pub notification_id: Option<String>,
    pub local_display_id: i32,
    pub group_id: Option<String>,
    pub is_summary: bool,
    pub opened: bool,
    pub dismissed: bool,
    pub title: Option<String>,
    pub message: Option<String>,
    pub full_payload: String,
    /// Epoch seconds.
    pub created_time: i64,
}

impl NotificationRecord {
    /// Opened or dismissed rows are excluded from restore and from the active count.
    pub fn is_consumed(&self) -> bool {
        self.opened || self.dismissed
    }

    pub fn payload(&self) -> Result<NotificationPayload, PayloadError> {
        NotificationPayload::parse(&self.full_payload)
    }

    /// Text shown for this notification inside a group summary.
    pub fn summary_line(&self) -> String {
        match (&self.title, &self.message) {
            (Some(title), Some(message)) if !title.is_empty() => format!("{title}: {message}"),
            (_, Some(message)) => message.clone(),
            (Some(title), None) => title.clone(),
            (None, None) => String::new(),
        }
    }
}

/// Values for inserting a new notification row.
#[derive(Debug, Clone, Default)]
pub struct NewNotificationRecord {
    pub notification_id: Option<String>,
    /// Explicit tray id. When `None` the store reuses the id of an existing row
    /// with the same `notification_id` or allocates a fresh one.
    pub local_display_id: Option<i32>,
    pub group_id: Option<String>,
    pub is_summary: bool,
    pub opened: bool,
    pub title: Option<String>,
    pub message: Option<String>,
    pub full_payload: String,
    pub created_time: i64,
}

impl NewNotificationRecord {
    pub fn from_payload(payload: &NotificationPayload, raw: &str, created_time: i64) -> Self {
        Self {
            notification_id: Some(payload.notification_id.clone()),
            local_display_id: None,
            group_id: payload.group_id.clone(),
            is_summary: false,
            opened: false,
            title: payload.title.clone(),
            message: payload.message.clone(),
            full_payload: raw.to_string(),
            created_time,
        }
    }

    pub fn summary(group_id: &str, local_display_id: Option<i32>, created_time: i64) -> Self {
        Self {
            notification_id: None,
            local_display_id,
            group_id: Some(group_id.to_string()),
            is_summary: true,
            opened: false,
            title: None,
            message: None,
            full_payload: "{}".to_string(),
            created_time,
        }
    }
}

/// Errors raised while reading a push payload.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("Malformed payload JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload is missing a notification id")]
    MissingNotificationId,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    #[serde(alias = "i")]
    notification_id: Option<String>,
    title: Option<String>,
    #[serde(alias = "body", alias = "alert")]
    message: Option<String>,
    #[serde(alias = "grp")]
    group_id: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

/// The parts of a push payload the lifecycle cares about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub notification_id: String,
    pub title: Option<String>,
    pub message: Option<String>,
    pub group_id: Option<String>,
    pub data: serde_json::Value,
}

impl NotificationPayload {
    pub fn parse(raw: &str) -> Result<Self, PayloadError> {
        let raw: RawPayload = serde_json::from_str(raw)?;
        let notification_id = raw
            .notification_id
            .filter(|id| !id.is_empty())
            .ok_or(PayloadError::MissingNotificationId)?;

        Ok(Self {
            notification_id,
            title: raw.title,
            message: raw.message,
            group_id: raw.group_id.filter(|g| !g.is_empty()),
            data: raw.data,
        })
    }

    /// A payload with nothing to show is recorded but never displayed.
    pub fn is_silent(&self) -> bool {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |s| s.trim().is_empty());
        blank(&self.title) && blank(&self.message)
    }
}
