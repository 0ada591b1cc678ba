//! Everything the SDK needs, built once at initialization and passed around
//! explicitly.

use crate::background_jobs::jobs::{NotificationRestoreJob, NotificationRetentionJob};
use crate::background_jobs::{create_scheduler, JobContext, SchedulerHandle};
use crate::backend::{ReceiptReporter, ReqwestBackendClient};
use crate::clock::{Clock, SystemClock};
use crate::config::SdkConfig;
use crate::in_app::{
    DynamicTriggerScheduler, InAppMessageController, InAppMessagePresenter, InAppMessageStore,
    SqliteInAppMessageStore, TokioTaskScheduler,
};
use crate::notifications::{
    NotificationProcessor, NotificationStore, NotificationTray, RestoreScheduler,
    SqliteNotificationStore,
};
use crate::preferences::{Preferences, SqlitePreferences};
use crate::sqlite_persistence::{open_sdk_database, SharedConnection};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub struct SdkContext {
    pub config: SdkConfig,
    pub clock: Arc<dyn Clock>,
    pub connection: SharedConnection,
    pub preferences: Arc<dyn Preferences>,
    pub notification_store: Arc<dyn NotificationStore>,
    pub processor: Arc<NotificationProcessor>,
    pub restore: Arc<RestoreScheduler>,
    pub in_app_store: Arc<dyn InAppMessageStore>,
    /// `None` when in-app messaging is disabled, no presenter was given or
    /// there is no runtime to run trigger timers on.
    pub in_app: Option<Arc<InAppMessageController>>,
}

impl SdkContext {
    pub fn initialize(
        config: SdkConfig,
        tray: Arc<dyn NotificationTray>,
        presenter: Option<Arc<dyn InAppMessagePresenter>>,
        runtime: Option<Handle>,
    ) -> Result<Self> {
        Self::initialize_with_clock(config, tray, presenter, runtime, Arc::new(SystemClock))
    }

    pub fn initialize_with_clock(
        config: SdkConfig,
        tray: Arc<dyn NotificationTray>,
        presenter: Option<Arc<dyn InAppMessagePresenter>>,
        runtime: Option<Handle>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        info!("Opening SDK database at {:?}...", config.db_path);
        let connection = open_sdk_database(&config.db_path)
            .with_context(|| format!("Failed to open SDK database {:?}", config.db_path))?;

        let preferences: Arc<dyn Preferences> =
            Arc::new(SqlitePreferences::new(connection.clone()));
        let notification_store: Arc<dyn NotificationStore> =
            Arc::new(SqliteNotificationStore::new(connection.clone()));

        let mut processor = NotificationProcessor::new(
            notification_store.clone(),
            tray,
            preferences.clone(),
            clock.clone(),
            config.notifications.clone(),
        );
        if let Some(backend) = &config.backend {
            let client = ReqwestBackendClient::new(backend)?;
            info!("Sending receipts to {}", backend.base_url);
            processor = processor.with_receipts(Arc::new(ReceiptReporter::new(
                Arc::new(client),
                backend.app_id.clone(),
                runtime.clone(),
            )));
        }
        let processor = Arc::new(processor);
        let restore = Arc::new(processor.restore_scheduler());

        let in_app_store: Arc<dyn InAppMessageStore> =
            Arc::new(SqliteInAppMessageStore::new(connection.clone()));
        let in_app = match (config.in_app.enabled, presenter, runtime) {
            (true, Some(presenter), Some(runtime)) => {
                let dynamic = Arc::new(DynamicTriggerScheduler::new(
                    clock.clone(),
                    Arc::new(TokioTaskScheduler::new(runtime)),
                ));
                Some(InAppMessageController::new(
                    clock.clone(),
                    dynamic,
                    in_app_store.clone(),
                    presenter,
                ))
            }
            (true, Some(_), None) => {
                warn!("In-app messages disabled: no runtime for trigger timers");
                None
            }
            _ => None,
        };

        Ok(Self {
            config,
            clock,
            connection,
            preferences,
            notification_store,
            processor,
            restore,
            in_app_store,
            in_app,
        })
    }

    /// Register the maintenance jobs and run the scheduler until
    /// `shutdown_token` is cancelled. Must be called within a tokio runtime.
    pub async fn start_job_scheduler(
        &self,
        shutdown_token: CancellationToken,
    ) -> (JoinHandle<()>, SchedulerHandle) {
        let job_context = JobContext::new(shutdown_token.child_token(), self.clock.clone());
        let (mut scheduler, handle) = create_scheduler(shutdown_token, job_context);

        let retention = NotificationRetentionJob::new(
            self.processor.clone(),
            self.config.notifications.sweep_interval(),
        )
        .with_in_app_store(
            self.in_app_store.clone(),
            self.config.in_app.stats_retention_secs(),
        );
        scheduler.register_job(Arc::new(retention)).await;

        let mut restore = NotificationRestoreJob::new(self.restore.clone());
        if !self.config.notifications.restore_on_startup {
            restore = restore.without_startup_run();
        }
        scheduler.register_job(Arc::new(restore)).await;

        let join = tokio::spawn(async move {
            scheduler.run().await;
        });
        (join, handle)
    }
}
