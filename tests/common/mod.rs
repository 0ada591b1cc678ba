//! Common test utilities for integration tests.

#![allow(dead_code)]

use anyhow::Result;
use notifykit::config::{InAppSettings, NotificationSettings, SdkConfig};
use notifykit::in_app::{InAppMessage, InAppMessagePresenter};
use notifykit::notifications::{ActiveNotification, DisplayRequest, NotificationTray};
use notifykit::{ManualClock, SdkContext};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::runtime::Handle;

pub const NOW: i64 = 1_700_000_000;

/// Seconds in the default seven day retention window.
pub const RETENTION_SECS: i64 = 604_800;

#[derive(Debug, Clone, PartialEq)]
pub enum TrayCall {
    Post(DisplayRequest),
    Cancel(i32),
}

/// Tray double recording every call.
#[derive(Default)]
pub struct RecordingTray {
    calls: Mutex<Vec<TrayCall>>,
    active: Mutex<Option<Vec<ActiveNotification>>>,
}

impl RecordingTray {
    pub fn calls(&self) -> Vec<TrayCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn set_active(&self, active: Vec<ActiveNotification>) {
        *self.active.lock().unwrap() = Some(active);
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

    pub fn posted(&self) -> Vec<DisplayRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                TrayCall::Post(request) => Some(request),
                _ => None,
            })
            .collect()
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
        Ok(self.active.lock().unwrap().clone())
    }
}

#[derive(Default)]
pub struct RecordingPresenter {
    presented: Mutex<Vec<String>>,
}

impl RecordingPresenter {
    pub fn presented(&self) -> Vec<String> {
        self.presented.lock().unwrap().clone()
    }
}

impl InAppMessagePresenter for RecordingPresenter {
    fn present(&self, message: &InAppMessage) -> Result<()> {
        self.presented.lock().unwrap().push(message.id.clone());
        Ok(())
    }
}

/// A context over an on-disk database in `dir`.
pub struct TestSdk {
    pub context: SdkContext,
    pub tray: Arc<RecordingTray>,
    pub presenter: Arc<RecordingPresenter>,
    pub clock: Arc<ManualClock>,
}

pub fn test_config(dir: &TempDir) -> SdkConfig {
    SdkConfig {
        db_path: dir.path().join("notifykit.db"),
        notifications: NotificationSettings {
            restore_delay_ms: 0,
            ..Default::default()
        },
        in_app: InAppSettings::default(),
        backend: None,
    }
}

pub fn open_sdk(dir: &TempDir, runtime: Option<Handle>) -> TestSdk {
    open_sdk_at(dir, runtime, NOW)
}

pub fn open_sdk_at(dir: &TempDir, runtime: Option<Handle>, now_secs: i64) -> TestSdk {
    let tray = Arc::new(RecordingTray::default());
    let presenter = Arc::new(RecordingPresenter::default());
    let clock = Arc::new(ManualClock::at_secs(now_secs));
    let context = SdkContext::initialize_with_clock(
        test_config(dir),
        tray.clone(),
        Some(presenter.clone()),
        runtime,
        clock.clone(),
    )
    .expect("Failed to initialize SDK");
    TestSdk {
        context,
        tray,
        presenter,
        clock,
    }
}

pub fn payload(notification_id: &str, group_id: Option<&str>) -> String {
    let mut payload = serde_json::json!({
        "notification_id": notification_id,
        "title": format!("Title {notification_id}"),
        "message": format!("Body of {notification_id}"),
    });
    if let Some(group_id) = group_id {
        payload["group_id"] = group_id.into();
    }
    payload.to_string()
}
