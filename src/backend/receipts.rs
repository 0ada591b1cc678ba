//! Fire-and-forget delivery and open receipts.

use super::client::{BackendClient, Method};
use anyhow::Result;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Called with the result of a receipt once the request finishes.
pub type ReceiptCallback = Box<dyn FnOnce(&Result<()>) + Send + 'static>;

pub struct ReceiptReporter {
    client: Arc<dyn BackendClient>,
    app_id: String,
    runtime: Option<Handle>,
}

impl ReceiptReporter {
    /// Receipts are spawned on `runtime`; without one they are dropped.
    pub fn new(client: Arc<dyn BackendClient>, app_id: String, runtime: Option<Handle>) -> Self {
        Self {
            client,
            app_id,
            runtime,
        }
    }

    pub fn report_received(
        &self,
        notification_id: &str,
        on_complete: Option<ReceiptCallback>,
    ) -> Option<JoinHandle<()>> {
        self.send(
            Method::Put,
            format!("notifications/{}/report_received", notification_id),
            json!({ "app_id": self.app_id }),
            on_complete,
        )
    }

    pub fn report_opened(
        &self,
        notification_id: &str,
        on_complete: Option<ReceiptCallback>,
    ) -> Option<JoinHandle<()>> {
        self.send(
            Method::Put,
            format!("notifications/{}", notification_id),
            json!({ "app_id": self.app_id, "opened": true }),
            on_complete,
        )
    }

    fn send(
        &self,
        method: Method,
        path: String,
        body: Value,
        on_complete: Option<ReceiptCallback>,
    ) -> Option<JoinHandle<()>> {
        let Some(runtime) = &self.runtime else {
            debug!("No runtime for receipts, dropping {}", path);
            return None;
        };
        let client = self.client.clone();
        Some(runtime.spawn(async move {
            let result = client.send_json(method, &path, &body).await;
            match &result {
                Ok(()) => debug!("Receipt {} delivered", path),
                Err(e) => warn!("Receipt {} failed: {:#}", path, e),
            }
            if let Some(on_complete) = on_complete {
                on_complete(&result);
            }
        }))
    }
}
