use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use notifykit::background_jobs::HookEvent;
use notifykit::config::{CliConfig, FileConfig, SdkConfig};
use notifykit::in_app::{
    DynamicTriggerScheduler, TokioTaskScheduler, TriggerEvaluator, TriggerStore, TriggerTree,
};
use notifykit::notifications::{LoggingTray, ProcessOutcome, RestoreOutcome};
use notifykit::{Clock, SdkContext, SystemClock};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn parse_path(s: &str) -> Result<PathBuf> {
    let path = PathBuf::from(s);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(path))
}

#[derive(Parser, Debug)]
struct CliArgs {
    /// Path to a TOML config file. Values in the file override flags.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Path to the SQLite database file.
    #[clap(long, value_parser = parse_path)]
    pub db_path: Option<PathBuf>,

    /// Base URL of the backend receiving receipts.
    #[clap(long)]
    pub backend_url: Option<String>,

    #[clap(long)]
    pub app_id: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Shows the most recently received notifications.
    List {
        #[clap(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Processes a push payload read from a JSON file.
    Ingest { payload_file: PathBuf },

    /// Marks the notification shown under the given display id as opened.
    Open { local_display_id: i32 },

    /// Marks the notification shown under the given display id as dismissed.
    Dismiss { local_display_id: i32 },

    /// Deletes notifications older than the retention window.
    Sweep,

    /// Re-posts live notifications to the tray.
    Restore,

    /// Evaluates a trigger tree (JSON array of AND groups) against trigger
    /// values (JSON object).
    Evaluate {
        tree_file: PathBuf,

        #[clap(long)]
        triggers: Option<PathBuf>,
    },

    /// Runs the maintenance jobs until interrupted.
    Run {
        /// Deliver a boot event after startup.
        #[clap(long)]
        boot: bool,
    },
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    let file_config = match &cli_args.config {
        Some(path) => {
            info!("Loading config from {:?}", path);
            Some(FileConfig::load(path)?)
        }
        None => None,
    };
    let cli_config = CliConfig {
        db_path: cli_args.db_path.clone(),
        backend_url: cli_args.backend_url.clone(),
        app_id: cli_args.app_id.clone(),
    };
    let config = SdkConfig::resolve(&cli_config, file_config)?;

    if let Command::Evaluate {
        tree_file,
        triggers,
    } = &cli_args.command
    {
        return evaluate(tree_file, triggers.as_ref());
    }

    let context = SdkContext::initialize(
        config,
        Arc::new(LoggingTray),
        None,
        Some(Handle::current()),
    )?;

    match cli_args.command {
        Command::List { limit } => {
            let rows = context
                .notification_store
                .read(|q| q.recent_notifications(limit))?;
            for row in rows {
                let state = if row.opened {
                    "opened"
                } else if row.dismissed {
                    "dismissed"
                } else {
                    "live"
                };
                println!(
                    "{:>6} {:>11} {:<9} {:<12} {} {}",
                    row.row_id,
                    row.local_display_id,
                    state,
                    row.group_id.as_deref().unwrap_or("-"),
                    row.notification_id.as_deref().unwrap_or("(summary)"),
                    row.title.as_deref().unwrap_or(""),
                );
            }
        }
        Command::Ingest { payload_file } => {
            let raw = std::fs::read_to_string(&payload_file)
                .with_context(|| format!("Failed to read {:?}", payload_file))?;
            match context.processor.process(&raw)? {
                ProcessOutcome::Duplicate => println!("Duplicate, ignored"),
                ProcessOutcome::NotPersisted => bail!("Notification could not be stored"),
                outcome => println!("{:?}", outcome),
            }
        }
        Command::Open { local_display_id } => {
            println!("{:?}", context.processor.on_opened(local_display_id)?);
        }
        Command::Dismiss { local_display_id } => {
            println!("{:?}", context.processor.on_dismissed(local_display_id)?);
        }
        Command::Sweep => {
            let deleted = context
                .processor
                .sweep_expired(SystemClock.now_secs())?;
            println!("Deleted {} notifications", deleted);
        }
        Command::Restore => {
            let restore = context.restore.clone();
            let outcome = tokio::task::spawn_blocking(move || restore.restore()).await??;
            match outcome {
                RestoreOutcome::AlreadyRan => println!("Already restored"),
                RestoreOutcome::Completed {
                    restored,
                    skipped,
                    summaries,
                } => println!(
                    "Restored {} notifications, skipped {}, {} summaries",
                    restored, skipped, summaries
                ),
            }
        }
        Command::Run { boot } => {
            let shutdown_token = CancellationToken::new();
            let (join, handle) = context.start_job_scheduler(shutdown_token.clone()).await;
            if boot {
                handle.notify(HookEvent::OnBoot).await?;
            }
            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for ctrl-c")?;
            info!("Shutting down...");
            shutdown_token.cancel();
            join.await?;
        }
        Command::Evaluate { .. } => {}
    }

    Ok(())
}

fn evaluate(tree_file: &PathBuf, triggers_file: Option<&PathBuf>) -> Result<()> {
    let tree: TriggerTree = read_json(tree_file)?;
    let store = TriggerStore::default();
    if let Some(path) = triggers_file {
        let values: HashMap<String, Value> = read_json(path)?;
        store.set_all(values);
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dynamic = Arc::new(DynamicTriggerScheduler::new(
        clock,
        Arc::new(TokioTaskScheduler::new(Handle::current())),
    ));
    dynamic.on_session_started();
    let evaluator = TriggerEvaluator::new(dynamic);

    println!("{}", evaluator.evaluate("cli", &tree, &store));
    Ok(())
}
