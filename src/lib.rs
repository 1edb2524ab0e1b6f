pub mod error;
pub mod models;
pub mod services;
pub mod subsystems;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Mutex;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::{info, warn};

use crate::services::logging::init_logging;
use crate::services::orchestrator::Orchestrator;
use crate::services::settings::{AppConfig, load_config};
use crate::services::storage::FsDocumentStore;
use crate::subsystems::pipeline::{PipelineSubsystem, RunSummary};

/// How long the key in flight may take to wind down after Ctrl-C.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// High-level entrypoint: load config, init logging, run the pipeline once
pub async fn run_with_config_path(path: &str) -> std::io::Result<()> {
    let cfg: AppConfig = load_config(path)
        .map_err(|e| std::io::Error::other(format!("Failed to load {}: {}", path, e)))?;

    let _guard = init_logging(&cfg.paths.log_dir)?;

    let orchestrator = build_orchestrator(&cfg).map_err(|e| std::io::Error::other(format!("{:#}", e)))?;
    let summary = run_pipeline(&cfg, orchestrator).await?;
    if summary.failed > 0 {
        warn!(failed = summary.failed, total = summary.total, "some keys were not processed");
    }
    Ok(())
}

fn build_orchestrator(cfg: &AppConfig) -> anyhow::Result<Orchestrator> {
    let orchestrator = Orchestrator::from_config(cfg).context("failed to set up fetch strategies")?;
    info!(strategies = ?orchestrator.strategies(), "fetch chain ready");
    Ok(orchestrator)
}

/// Runs one pass over `paths.input_dir` under signal handling and reports the counts.
pub async fn run_pipeline(cfg: &AppConfig, orchestrator: Orchestrator) -> std::io::Result<RunSummary> {
    let summary = Arc::new(Mutex::new(RunSummary::default()));
    let store = FsDocumentStore::builder()
        .base_dir(cfg.paths.output_dir.clone())
        .build();
    let pipeline = PipelineSubsystem::builder()
        .orchestrator(Arc::new(orchestrator))
        .store(Arc::new(store))
        .input_dir(cfg.paths.input_dir.clone())
        .summary(Arc::clone(&summary))
        .build();

    Toplevel::new(async move |s: SubsystemHandle| {
        s.start(SubsystemBuilder::new(
            "pipeline",
            async move |mut h: SubsystemHandle| pipeline.run(&mut h).await,
        ));
    })
    .catch_signals()
    .handle_shutdown_requests(SHUTDOWN_TIMEOUT)
    .await
    .map_err(|e| std::io::Error::other(format!("pipeline shutdown: {}", e)))?;

    let summary = *summary.lock().await;
    Ok(summary)
}
