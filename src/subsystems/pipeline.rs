use std::path::PathBuf;
use std::sync::Arc;

use bon::Builder;
use tokio::sync::Mutex;
use tokio_graceful_shutdown::errors::CancelledByShutdown;
use tokio_graceful_shutdown::{FutureExt, SubsystemHandle};
use tracing::{error, info, warn};

use crate::models::types::{AccessKey, BranchCode, FetchResult};
use crate::services::key_source::collect_branch_keys;
use crate::services::orchestrator::Orchestrator;
use crate::services::storage::today;
use crate::traits::document_store::DocumentStore;

/// Counters for one pass over the input directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Processes every key found in the input directory, one at a time.
#[derive(Builder)]
pub struct PipelineSubsystem {
    pub(crate) orchestrator: Arc<Orchestrator>,
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) input_dir: PathBuf,
    /// Output date folder; today's local date when unset
    pub(crate) date: Option<String>,
    pub(crate) summary: Arc<Mutex<RunSummary>>,
}

impl PipelineSubsystem {
    pub async fn run(self, subsys: &mut SubsystemHandle) -> std::io::Result<()> {
        let started = chrono::Local::now();
        info!(started = %started.format("%Y-%m-%d %H:%M:%S"), input = %self.input_dir.display(), "Starting pipeline subsystem");

        let entries = collect_branch_keys(&self.input_dir).await;
        if entries.is_empty() {
            warn!(input = %self.input_dir.display(), "pipeline: no keys to process");
            subsys.request_shutdown();
            return Ok(());
        }
        let total = entries.len();
        self.summary.lock().await.total = total;
        info!(total, "pipeline: keys collected");

        for (idx, (branch, key)) in entries.iter().enumerate() {
            if subsys.is_shutdown_requested() {
                info!(done = idx, total, "pipeline: shutdown requested, stopping before next key");
                break;
            }
            info!(n = idx + 1, total, branch = %branch, key = %key.short(), "pipeline: processing key");

            // persistence stays outside the cancellable part so no half-written key is left behind
            let result = match self.orchestrator.process_key(key).cancel_on_shutdown(&*subsys).await {
                Ok(result) => result,
                Err(CancelledByShutdown) => {
                    info!(key = %key.short(), "pipeline: key cancelled by shutdown");
                    break;
                }
            };
            let saved = self.persist(branch, key, result).await;

            let mut summary = self.summary.lock().await;
            if saved {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        let summary = *self.summary.lock().await;
        let finished = chrono::Local::now();
        info!(
            finished = %finished.format("%Y-%m-%d %H:%M:%S"),
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Pipeline subsystem finished"
        );
        subsys.request_shutdown();
        Ok(())
    }

    async fn persist(&self, branch: &BranchCode, key: &AccessKey, result: FetchResult) -> bool {
        match result {
            FetchResult::Success {
                xml,
                pdf,
                invoice_number,
            } => {
                let date = self.date.clone().unwrap_or_else(today);
                match self.store.save(branch, &date, &invoice_number, &xml, &pdf).await {
                    Ok(_) => {
                        info!(key = %key.short(), nnf = %invoice_number, "pipeline: key done");
                        true
                    }
                    Err(e) => {
                        error!(key = %key.short(), nnf = %invoice_number, error = %e, "pipeline: saving documents failed");
                        false
                    }
                }
            }
            FetchResult::Failure(reason) => {
                error!(key = %key.short(), branch = %branch, reason = %reason, "pipeline: key failed");
                false
            }
        }
    }
}
