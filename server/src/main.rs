use std::{
    collections::HashMap,
    env, io,
    sync::Arc,
    time::{Duration, SystemTime},
};

use log::{info, warn};
use parking_lot::Mutex;
use protocol::{
    File, Metric, ModelInfo, PredictionRequest, SinglePrediction, WorkKind,
    msg::{Event, Request},
};
use tokio::{signal, time};
use uuid::Uuid;

use server::{Config, Engine, ModelStore, ResultSink, VersionConfig, WorkerRegistry};

/// In-memory asset store backing the demo run.
#[derive(Default)]
struct MemoryStore {
    models: Mutex<HashMap<String, Vec<(ModelInfo, Arc<File>)>>>,
}

impl ModelStore for MemoryStore {
    fn usable_model_count(&self, version: &str) -> usize {
        self.models.lock().get(version).map_or(0, |models| {
            models.iter().filter(|(info, _)| info.is_usable()).count()
        })
    }

    fn usable_model_files(&self, version: &str) -> Vec<Arc<File>> {
        self.models.lock().get(version).map_or(Vec::new(), |models| {
            models
                .iter()
                .filter(|(info, _)| info.is_usable())
                .map(|(_, file)| Arc::clone(file))
                .collect()
        })
    }

    fn version_files(&self, _version: &str) -> Vec<Arc<File>> {
        vec![
            Arc::new(File::in_root("trainingscript.py", Vec::new())),
            Arc::new(File::in_root("predictionscript.py", Vec::new())),
        ]
    }

    fn save_training_result(&self, version: &str, job: Uuid, files: &[File]) -> bool {
        let Some(model) = files.iter().find(|f| f.name.ends_with(".h5")) else {
            return false;
        };

        let mut info = ModelInfo::new(format!("{job}.h5"), Duration::from_secs(1));
        info.metrics.push(Metric {
            name: "mcc".into(),
            value: 0.9,
        });
        self.models
            .lock()
            .entry(version.to_string())
            .or_default()
            .push((info, Arc::new(model.clone())));
        true
    }

    fn record_error(&self, version: &str, job: Uuid, log: &[String]) {
        warn!("worker error for {job} ({version}): {} log lines", log.len());
    }
}

struct FixedRegistry(Vec<String>);

impl WorkerRegistry for FixedRegistry {
    fn connected_workers(&self) -> Vec<String> {
        self.0.clone()
    }
}

struct LogSink;

impl ResultSink for LogSink {
    fn push(&self, event: Event) {
        match event {
            Event::EnsembleFinished(result) => info!(
                "ensemble of {} models finished: average={} median={}",
                result.target,
                result.average(),
                result.median()
            ),
            Event::Status(_) | Event::Work(_) => {}
        }
    }
}

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1).or_else(|| env::var("CONFIG_PATH").ok()) {
        Some(path) => Config::from_file(&path)?,
        None => demo_config(),
    };

    let workers: Vec<String> = (0..4).map(|i| format!("worker-{i}")).collect();
    let registry = Arc::new(FixedRegistry(workers.clone()));
    let store = Arc::new(MemoryStore::default());

    let engine = Engine::new(&config, registry, store, Arc::new(LogSink))?;
    engine.start();

    // Demo workers: poll for work and answer with synthetic results.
    for worker in workers {
        let engine = engine.clone();
        tokio::spawn(run_worker(engine, worker));
    }

    // Once training capacity has filled up, ask for one ensembled prediction.
    let predictor = engine.clone();
    tokio::spawn(async move {
        time::sleep(Duration::from_secs(3)).await;
        let request = PredictionRequest {
            payload: vec!["case,activity,timestamp".into()],
        };
        if let Err(e) = predictor.request_prediction(request) {
            warn!("demo prediction rejected: {e}");
        }
    });

    signal::ctrl_c().await?;
    info!("received SIGTERM");
    Ok(())
}

async fn run_worker(engine: Engine, worker: String) {
    loop {
        let request = Request::FetchWork {
            worker: worker.clone(),
        };
        let Some(Event::Work(order)) = engine.handle(request) else {
            time::sleep(Duration::from_millis(500)).await;
            continue;
        };

        // Pretend to run the version's scripts.
        time::sleep(Duration::from_millis(200)).await;
        let reply = match order.kind {
            WorkKind::Training => Request::TrainingResult {
                job: order.id,
                files: vec![File::in_root(format!("{}.h5", order.id), Vec::new())],
                success: true,
            },
            WorkKind::Prediction => Request::PredictionResult {
                job: order.id,
                prediction: SinglePrediction { value: 42.0 },
            },
        };
        engine.handle(reply);
    }
}

fn demo_config() -> Config {
    Config {
        versions: vec![VersionConfig {
            name: "v1".into(),
            dataset_type: Default::default(),
            target_models: 3,
            created: SystemTime::now(),
        }],
        reserve_fraction: 0.5,
        ..Config::default()
    }
}
