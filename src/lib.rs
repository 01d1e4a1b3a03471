pub mod alerts;
pub mod capture;
pub mod db;
pub mod error;
pub mod inference;
pub mod ingestion;
pub mod intervention;
pub mod models;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod utils;

use std::{future, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use tokio::time::{self, Instant};

use capture::DirectoryCamera;
use inference::HttpInferenceClient;
use ingestion::{HttpIngestion, IngestionClient, LocalIngestion};
use intervention::{ContentLibrary, HttpContentLibrary, StaticLibrary};
use models::{ClientMeta, SessionContext, SessionRequest};
use session::{Collaborators, SessionHandle, SessionMonitor};
use settings::MonitorConfig;
use utils::init_logging;

pub use error::CaptureError;

const DEFAULT_CONFIG_FILE: &str = "attentio.json";

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ContextArg {
    Lesson,
    Quiz,
}

impl From<ContextArg> for SessionContext {
    fn from(value: ContextArg) -> Self {
        match value {
            ContextArg::Lesson => SessionContext::Lesson,
            ContextArg::Quiz => SessionContext::Quiz,
        }
    }
}

/// Run one monitored lesson session headless, reading frames from a directory.
#[derive(Debug, Parser)]
#[command(name = "attentio", version, about, long_about = None)]
pub struct Cli {
    /// Directory of still frames to replay as the camera
    #[arg(long)]
    pub frames: PathBuf,

    /// Lesson or quiz id to open the session for
    #[arg(long)]
    pub lesson: String,

    #[arg(long)]
    pub user: Option<String>,

    #[arg(long, value_enum, default_value_t = ContextArg::Lesson)]
    pub context: ContextArg,

    /// JSON settings file (missing file means defaults)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Record to this SQLite file instead of the remote API
    #[arg(long)]
    pub db: Option<PathBuf>,

    /// Stop after this many seconds (default: until ctrl-c)
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Dismiss each micro-break after this many seconds
    #[arg(long, default_value_t = 15)]
    pub auto_dismiss_secs: u64,
}

pub async fn run(cli: Cli) -> Result<()> {
    init_logging();
    info!("attentio {} starting up...", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
    let config = MonitorConfig::load(&config_path)?;

    let collaborators = Collaborators {
        inference: Arc::new(inference_client(&config)?),
        ingestion: ingestion_client(&cli, &config).await?,
        library: content_library(&config)?,
    };
    let monitor = SessionMonitor::new(collaborators, config);

    let request = SessionRequest {
        lesson_id: cli.lesson.clone(),
        meta: ClientMeta::new(
            cli.user.clone(),
            cli.context.into(),
            monitor.config().capture.interval_ms,
        ),
    };
    let camera = DirectoryCamera::new(&cli.frames);
    let handle = monitor.open(request, Box::new(camera)).await?;

    if let Err(err) = handle.start_tracking().await {
        handle.teardown().await?;
        return Err(err.context("could not start tracking"));
    }

    let result = supervise(&handle, &cli).await;

    match handle.snapshot().await {
        Ok(snapshot) => info!(
            "final state: {}",
            serde_json::to_string(&snapshot).unwrap_or_default()
        ),
        Err(err) => warn!("no final snapshot: {err:#}"),
    }
    handle.teardown().await?;
    result
}

fn inference_client(config: &MonitorConfig) -> Result<HttpInferenceClient> {
    let url = config
        .endpoints
        .inference_url
        .as_deref()
        .context("no inference endpoint configured (set ATTENTIO_INFERENCE_URL)")?;
    HttpInferenceClient::new(url, config.capture.inference_timeout())
}

async fn ingestion_client(cli: &Cli, config: &MonitorConfig) -> Result<Arc<dyn IngestionClient>> {
    if let Some(path) = &cli.db {
        let local = LocalIngestion::open(path.clone())?;
        let recovered = local.recover_interrupted().await?;
        if recovered > 0 {
            info!("marked {recovered} crashed sessions as interrupted");
        }
        return Ok(Arc::new(local));
    }

    let base = config
        .endpoints
        .api_base_url
        .as_deref()
        .context("no --db given and no API base URL configured (set ATTENTIO_API_URL)")?;
    Ok(Arc::new(HttpIngestion::new(
        base,
        config.endpoints.api_token.clone(),
        config.endpoints.request_timeout(),
    )?))
}

/// Breaks from the config file win; otherwise the backend's library.
fn content_library(config: &MonitorConfig) -> Result<Arc<dyn ContentLibrary>> {
    match &config.endpoints.api_base_url {
        Some(base) if config.micro_breaks.is_empty() => Ok(Arc::new(HttpContentLibrary::new(
            base,
            config.endpoints.api_token.clone(),
            config.endpoints.request_timeout(),
        )?)),
        _ => Ok(Arc::new(StaticLibrary::new(config.micro_breaks.clone()))),
    }
}

/// Log breaks as they open and stand in for the learner pressing "continue".
async fn supervise(handle: &SessionHandle, cli: &Cli) -> Result<()> {
    let mut episodes = handle.subscribe_episode();
    let deadline = cli
        .duration_secs
        .map(|secs| Instant::now() + Duration::from_secs(secs));
    let auto_dismiss = Duration::from_secs(cli.auto_dismiss_secs);
    let mut dismiss_at: Option<Instant> = None;

    loop {
        let until_deadline = async move {
            match deadline {
                Some(at) => time::sleep_until(at).await,
                None => future::pending().await,
            }
        };
        let until_dismiss = async move {
            match dismiss_at {
                Some(at) => time::sleep_until(at).await,
                None => future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, ending session");
                return Ok(());
            }
            _ = until_deadline => {
                info!("session duration elapsed");
                return Ok(());
            }
            _ = until_dismiss => {
                dismiss_at = None;
                if let Some(closed) = handle.dismiss_break().await? {
                    info!("auto-dismissed break after {}ms", closed.duration_ms);
                }
            }
            changed = episodes.changed() => {
                changed.context("session actor stopped")?;
                let episode = episodes.borrow_and_update().clone();
                dismiss_at = match episode {
                    Some(episode) => {
                        info!(
                            "break time: \"{}\" {} {}",
                            episode.content.title,
                            episode.content.youtube_url,
                            episode.content.booster_text
                        );
                        Some(Instant::now() + auto_dismiss)
                    }
                    None => None,
                };
            }
        }
    }
}
