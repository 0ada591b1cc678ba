//! Shared fixtures for the notification unit tests.

use super::models::{NewNotificationRecord, NotificationRecord};
use super::store::{NotificationStore, SqliteNotificationStore};
use super::tray::{ActiveNotification, DisplayRequest, NotificationDisplay, NotificationTray};
use crate::sqlite_persistence::open_in_memory_sdk_database;
use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub fn test_store() -> Arc<dyn NotificationStore> {
    Arc::new(SqliteNotificationStore::new(
        open_in_memory_sdk_database().unwrap(),
    ))
}

pub fn payload_json(notification_id: &str, group_id: Option<&str>) -> String {
    let mut payload = serde_json::json!({
        "notification_id": notification_id,
        "title": format!("title {notification_id}"),
        "message": format!("message {notification_id}"),
    });
    if let Some(group_id) = group_id {
        payload["group_id"] = group_id.into();
    }
    payload.to_string()
}

pub fn insert_received(
    store: &Arc<dyn NotificationStore>,
    notification_id: &str,
    group_id: Option<&str>,
    created_time: i64,
) -> NotificationRecord {
    let record = NewNotificationRecord {
        notification_id: Some(notification_id.to_string()),
        group_id: group_id.map(str::to_string),
        title: Some(format!("title {notification_id}")),
        message: Some(format!("message {notification_id}")),
        full_payload: payload_json(notification_id, group_id),
        created_time,
        ..Default::default()
    };
    store.write(|q| q.insert(&record)).unwrap()
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrayCall {
    Post(DisplayRequest),
    Cancel(i32),
}

#[derive(Default)]
pub struct RecordingTray {
    calls: Mutex<Vec<TrayCall>>,
    badges: Mutex<Vec<usize>>,
    active: Mutex<Option<Vec<ActiveNotification>>>,
    fail_listing: AtomicBool,
}

impl RecordingTray {
    pub fn with_active(active: Vec<ActiveNotification>) -> Self {
        let tray = Self::default();
        *tray.active.lock().unwrap() = Some(active);
        tray
    }

    pub fn fail_listing(&self) {
        self.fail_listing.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<TrayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TrayCall::Cancel(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn posted_singles(&self) -> Vec<NotificationDisplay> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TrayCall::Post(DisplayRequest::Single(display)) => Some(display),
                _ => None,
            })
            .collect()
    }

    pub fn posted_summaries(&self) -> Vec<super::tray::SummaryDisplay> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TrayCall::Post(DisplayRequest::Summary(summary)) => Some(summary),
                _ => None,
            })
            .collect()
    }

    pub fn badges(&self) -> Vec<usize> {
        self.badges.lock().unwrap().clone()
    }
}

impl NotificationTray for RecordingTray {
    fn post(&self, request: &DisplayRequest) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(TrayCall::Post(request.clone()));
        Ok(())
    }

    fn cancel(&self, local_display_id: i32) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(TrayCall::Cancel(local_display_id));
        Ok(())
    }

    fn active_notifications(&self) -> Result<Option<Vec<ActiveNotification>>> {
        if self.fail_listing.load(Ordering::SeqCst) {
            bail!("listing not permitted");
        }
        Ok(self.active.lock().unwrap().clone())
    }

    fn set_badge_count(&self, count: usize) -> Result<()> {
        self.badges.lock().unwrap().push(count);
        Ok(())
    }
}
