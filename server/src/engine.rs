use std::{sync::Arc, time::Duration};

use log::{debug, info, warn};
use protocol::{
    File, PredictionRequest, SinglePrediction, StatusSnapshot, WorkKind, WorkOrder,
    msg::{Event, Request},
};
use tokio::time;
use uuid::Uuid;

use crate::{
    config::Config,
    demand::{DemandController, ModelStore},
    dispatch::Scheduler,
    ensemble::EnsembleTracker,
    error::{Result, ServerError},
    registry::{PriorityView, WorkerRegistry},
};

/// Downstream consumer of outbound events (finished ensembles, status
/// updates), owned by the transport layer.
pub trait ResultSink: Send + Sync {
    fn push(&self, event: Event);
}

/// Central wiring of scheduler, ensemble tracker and demand controller.
///
/// Every inbound transport event funnels through one of the methods below;
/// the components call each other through this struct rather than through
/// subscriber callbacks, so the call graph stays explicit.
#[derive(Clone)]
pub struct Engine {
    scheduler: Scheduler,
    tracker: EnsembleTracker,
    demand: Arc<DemandController>,
    registry: Arc<dyn WorkerRegistry>,
    store: Arc<dyn ModelStore>,
    sink: Arc<dyn ResultSink>,
    reserve_fraction: f64,
    /// The version predictions run against; the newest configured version,
    /// picked once at startup.
    current_version: Option<String>,
    check_interval: Duration,
    status_interval: Duration,
}

impl Engine {
    /// Builds the engine from a validated configuration and the three
    /// external seams.
    ///
    /// # Errors
    /// Returns `ServerError::InvalidConfig` if the configuration does not
    /// validate.
    pub fn new(
        config: &Config,
        registry: Arc<dyn WorkerRegistry>,
        store: Arc<dyn ModelStore>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self> {
        config.validate()?;

        let scheduler = Scheduler::new(config.timeouts(), config.max_queued);
        let demand = Arc::new(DemandController::new(
            scheduler.clone(),
            Arc::clone(&store),
            config.versions.clone(),
        ));

        let current_version = config.current_version().map(|v| v.name.clone());
        match &current_version {
            Some(name) => info!("selected {name} as current version on startup"),
            None => warn!("no versions configured; predictions will be rejected"),
        }

        Ok(Self {
            scheduler,
            tracker: EnsembleTracker::new(),
            demand,
            registry,
            store,
            sink,
            reserve_fraction: config.reserve_fraction,
            current_version,
            check_interval: Duration::from_secs(config.check_interval_secs),
            status_interval: Duration::from_secs(config.status_interval_secs),
        })
    }

    /// Runs the startup demand check and spawns the periodic demand and
    /// status loops.
    pub fn start(&self) {
        self.demand.check_versions();
        tokio::spawn(Arc::clone(&self.demand).run(self.check_interval));

        let engine = self.clone();
        tokio::spawn(async move {
            let mut tick = time::interval(engine.status_interval);
            tick.tick().await;
            loop {
                tick.tick().await;
                engine.report_status();
            }
        });
    }

    /// Hands the next piece of work to a requesting worker, honoring the
    /// reserve policy. `None` when nothing suitable is queued.
    pub fn fetch_work(&self, worker: &str) -> Option<WorkOrder> {
        let view = PriorityView::new(self.registry.connected_workers(), self.reserve_fraction);
        self.scheduler.fetch(worker, &view)
    }

    /// Accepts a training result.
    ///
    /// A valid result settles the job and triggers an immediate demand
    /// re-check so lost capacity is refilled right away. A result that fails
    /// validation leaves the job active for its watchdog to retry; a failed
    /// run is handled like a worker error. Results for unknown jobs are
    /// already satisfied and ignored.
    pub fn report_training_result(&self, job: Uuid, files: &[File], success: bool) {
        if !success {
            warn!("training job {job} reported failure");
            self.scheduler.expire(job);
            return;
        }

        let Some(version) = self.scheduler.version_of(job) else {
            info!("training result for unknown job {job} ignored");
            return;
        };
        if !self.store.save_training_result(&version, job, files) {
            warn!("training result for {job} failed validation; job stays active");
            return;
        }

        self.scheduler.finish(job);
        self.demand.check_versions();
    }

    /// Accepts a single-model prediction, settles its job and forwards the
    /// ensemble downstream once the last member arrives. Late results settle
    /// quietly.
    pub fn report_prediction_result(&self, job: Uuid, prediction: SinglePrediction) {
        debug!("received prediction result for {job}: value={}", prediction.value);
        self.scheduler.finish(job);
        if let Some(done) = self.tracker.submit(job, prediction) {
            info!(
                "prediction finished: average={} median={}",
                done.average(),
                done.median()
            );
            self.sink.push(Event::EnsembleFinished(done));
        }
    }

    /// Files the worker's error log and accelerates the retry; an explicit
    /// error report is handled as an immediate timeout.
    pub fn report_worker_error(&self, job: Uuid, log: &[String]) {
        if let Some(version) = self.scheduler.active_version(job) {
            self.store.record_error(&version, job, log);
        }
        self.scheduler.expire(job);
    }

    /// Fans a prediction request out to one job per usable model of the
    /// current version and registers the ensemble.
    ///
    /// Every member job carries the version's static files, one model file
    /// and a single shared snapshot of the request payload.
    ///
    /// # Errors
    /// Returns `ServerError::NoCurrentVersion` or `NoUsableModel` when
    /// nothing can predict, and `QueueFull` when the fan-out ran into the
    /// queue cap — in that case every already-queued member job is retracted
    /// so no partial ensemble survives.
    pub fn request_prediction(&self, request: PredictionRequest) -> Result<()> {
        let Some(version) = self.current_version.as_deref() else {
            warn!("prediction requested, but no usable version found");
            return Err(ServerError::NoCurrentVersion);
        };

        let models = self.store.usable_model_files(version);
        if models.is_empty() {
            warn!("prediction requested, but {version} has no usable models");
            return Err(ServerError::NoUsableModel {
                version: version.to_string(),
            });
        }

        let statics = self.store.version_files(version);
        info!(
            "creating ensemble prediction for {version} with {} models",
            models.len()
        );

        // One payload snapshot, shared read-only by every member job.
        let payload = Arc::new(File::in_root(
            "predictiondata.csv",
            request.payload.join("\n").into_bytes(),
        ));

        let ensemble = self.tracker.begin(request, models.len());
        let mut members = Vec::with_capacity(models.len());
        for model in models {
            let mut files = statics.clone();
            files.push(model);
            files.push(Arc::clone(&payload));

            // Attach the member before the job becomes fetchable, or its
            // result could arrive unowned.
            let job = Uuid::new_v4();
            self.tracker.add_member(ensemble, job);
            if let Err(e) = self
                .scheduler
                .enqueue(version, files, WorkKind::Prediction, job)
            {
                warn!("ensemble fan-out for {version} aborted: {e}");
                self.scheduler.retract(&members);
                self.tracker.cancel(ensemble);
                return Err(e);
            }
            members.push(job);
        }

        Ok(())
    }

    /// Current queue/worker counters.
    pub fn status(&self) -> StatusSnapshot {
        let (queued, active) = self.scheduler.counts();
        StatusSnapshot {
            queued,
            active,
            connected: self.registry.connected_workers().len(),
        }
    }

    fn report_status(&self) {
        let status = self.status();
        info!(
            "[CL:{} QW:{} AW:{}] status report",
            status.connected, status.queued, status.active
        );
        self.sink.push(Event::Status(status));
    }

    /// Dispatches a transport-level request onto the matching operation.
    pub fn handle(&self, request: Request) -> Option<Event> {
        match request {
            Request::FetchWork { worker } => self.fetch_work(&worker).map(Event::Work),
            Request::TrainingResult {
                job,
                files,
                success,
            } => {
                self.report_training_result(job, &files, success);
                None
            }
            Request::PredictionResult { job, prediction } => {
                self.report_prediction_result(job, prediction);
                None
            }
            Request::WorkerError { job, log } => {
                self.report_worker_error(job, &log);
                None
            }
            Request::Predict { request } => {
                if let Err(e) = self.request_prediction(request) {
                    warn!("prediction request rejected: {e}");
                }
                None
            }
        }
    }
}
