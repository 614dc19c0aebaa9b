use std::{sync::Arc, time::Duration};

use log::{info, warn};
use parking_lot::Mutex;
use protocol::{File, WorkKind};
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::{config::VersionConfig, dispatch::Scheduler};

/// Read side of the externally owned model/asset store.
///
/// The engine never touches disk itself; everything it needs to know about
/// versions and trained models comes through this seam.
pub trait ModelStore: Send + Sync {
    /// Number of models with evaluation metrics for this version. The
    /// provider may evaluate not-yet-evaluated models on the way.
    fn usable_model_count(&self, version: &str) -> usize;

    /// The model files of the usable models, one per model.
    fn usable_model_files(&self, version: &str) -> Vec<Arc<File>>;

    /// The version's static script and data files, excluding models.
    fn version_files(&self, version: &str) -> Vec<Arc<File>>;

    /// Validates and persists a training result. Returning `false` marks the
    /// result unusable; the job stays active until its watchdog retries it.
    fn save_training_result(&self, version: &str, job: Uuid, files: &[File]) -> bool;

    /// Files a worker error log for later inspection.
    fn record_error(&self, version: &str, job: Uuid, log: &[String]);
}

/// Keeps the trained-model count of every configured version at its target
/// by queueing training jobs for the deficit.
pub struct DemandController {
    scheduler: Scheduler,
    store: Arc<dyn ModelStore>,
    versions: Vec<VersionConfig>,
    /// Serializes `check_versions` against itself; overlapping runs would
    /// count the same deficit twice.
    gate: Mutex<()>,
}

impl DemandController {
    pub fn new(
        scheduler: Scheduler,
        store: Arc<dyn ModelStore>,
        versions: Vec<VersionConfig>,
    ) -> Self {
        Self {
            scheduler,
            store,
            versions,
            gate: Mutex::new(()),
        }
    }

    /// Compares the usable-model count of every version against its target
    /// and queues the difference as training jobs, minus whatever training
    /// is already queued or active for the version. Only one run is active
    /// at a time.
    pub fn check_versions(&self) {
        let _guard = self.gate.lock();

        info!("checking {} versions", self.versions.len());
        for version in &self.versions {
            let usable = self.store.usable_model_count(&version.name);
            if usable >= version.target_models {
                continue;
            }

            let missing = version.target_models - usable;
            info!(
                "not enough models found for {}: {missing} models are missing",
                version.name
            );

            let pending = self.scheduler.pending_training(&version.name);
            let deficit = missing.saturating_sub(pending);
            if deficit == 0 {
                continue;
            }

            let files = self.store.version_files(&version.name);
            let mut queued = 0;
            for _ in 0..deficit {
                match self.scheduler.enqueue(
                    &version.name,
                    files.clone(),
                    WorkKind::Training,
                    Uuid::new_v4(),
                ) {
                    Ok(()) => queued += 1,
                    Err(e) => {
                        warn!("training top-up for {} stopped: {e}", version.name);
                        break;
                    }
                }
            }
            if queued > 0 {
                info!("requested {queued} more models for training");
            }
        }
    }

    /// Periodic re-check; runs until the task is dropped.
    pub async fn run(self: Arc<Self>, every: Duration) {
        let mut tick = time::interval(every);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately; the startup check
        // has already run by the time we get here.
        tick.tick().await;

        loop {
            tick.tick().await;
            info!("periodic version check");
            self.check_versions();
        }
    }
}
