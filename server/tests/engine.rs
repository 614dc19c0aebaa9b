use std::{
    collections::HashMap,
    sync::Arc,
    time::SystemTime,
};

use parking_lot::Mutex;
use protocol::{
    DatasetType, EnsembleResult, File, PredictionRequest, SinglePrediction, WorkKind, msg::Event,
};
use uuid::Uuid;

use server::{Config, Engine, ModelStore, ResultSink, VersionConfig, WorkerRegistry};

/// Store whose usable models grow with every accepted training result.
#[derive(Default)]
struct TestStore {
    models: Mutex<HashMap<String, Vec<Arc<File>>>>,
    errors: Mutex<Vec<Uuid>>,
}

impl TestStore {
    fn with_models(version: &str, count: usize) -> Self {
        let models = (0..count)
            .map(|i| Arc::new(File::in_root(format!("model-{i}.h5"), Vec::new())))
            .collect();
        Self {
            models: Mutex::new(HashMap::from([(version.to_string(), models)])),
            errors: Mutex::default(),
        }
    }
}

impl ModelStore for TestStore {
    fn usable_model_count(&self, version: &str) -> usize {
        self.models.lock().get(version).map_or(0, Vec::len)
    }

    fn usable_model_files(&self, version: &str) -> Vec<Arc<File>> {
        self.models.lock().get(version).cloned().unwrap_or_default()
    }

    fn version_files(&self, _version: &str) -> Vec<Arc<File>> {
        vec![Arc::new(File::in_root("trainingscript.py", Vec::new()))]
    }

    fn save_training_result(&self, version: &str, job: Uuid, files: &[File]) -> bool {
        if !files.iter().any(|f| f.name.ends_with(".h5")) {
            return false;
        }
        self.models
            .lock()
            .entry(version.to_string())
            .or_default()
            .push(Arc::new(File::in_root(format!("{job}.h5"), Vec::new())));
        true
    }

    fn record_error(&self, _version: &str, job: Uuid, _log: &[String]) {
        self.errors.lock().push(job);
    }
}

struct TestRegistry(Vec<String>);

impl WorkerRegistry for TestRegistry {
    fn connected_workers(&self) -> Vec<String> {
        self.0.clone()
    }
}

#[derive(Default)]
struct CollectSink {
    ensembles: Mutex<Vec<EnsembleResult>>,
}

impl ResultSink for CollectSink {
    fn push(&self, event: Event) {
        if let Event::EnsembleFinished(result) = event {
            self.ensembles.lock().push(result);
        }
    }
}

fn config(target_models: usize, reserve_fraction: f64, max_queued: usize) -> Config {
    Config {
        versions: vec![VersionConfig {
            name: "v1".into(),
            dataset_type: DatasetType::Generic,
            target_models,
            created: SystemTime::now(),
        }],
        reserve_fraction,
        max_queued,
        ..Config::default()
    }
}

fn model_result(job: Uuid) -> Vec<File> {
    vec![File::in_root(format!("{job}.h5"), Vec::new())]
}

#[tokio::test]
async fn training_capacity_fills_and_an_ensemble_completes() {
    let workers = vec!["worker-0".to_string(), "worker-1".to_string()];
    let store = Arc::new(TestStore::default());
    let sink = Arc::new(CollectSink::default());
    let engine = Engine::new(
        &config(2, 0.0, 400),
        Arc::new(TestRegistry(workers)),
        Arc::clone(&store) as Arc<dyn ModelStore>,
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    )
    .unwrap();

    // The startup demand check queues the full target.
    engine.start();
    assert_eq!(engine.status().queued, 2);

    // Both workers train; capacity fills up and nothing new is requested.
    for worker in ["worker-0", "worker-1"] {
        let order = engine.fetch_work(worker).unwrap();
        assert_eq!(order.kind, WorkKind::Training);
        engine.report_training_result(order.id, &model_result(order.id), true);
    }
    assert_eq!(store.usable_model_count("v1"), 2);
    assert_eq!(engine.status().queued, 0);
    assert_eq!(engine.status().active, 0);

    // Fan out one prediction over both trained models.
    let request = PredictionRequest {
        payload: vec!["row".into()],
    };
    engine.request_prediction(request).unwrap();
    assert_eq!(engine.status().queued, 2);

    for (i, worker) in ["worker-0", "worker-1"].iter().enumerate() {
        let order = engine.fetch_work(worker).unwrap();
        assert_eq!(order.kind, WorkKind::Prediction);
        // Statics, one model file and the shared payload snapshot.
        assert_eq!(order.files.len(), 3);
        assert_eq!(order.files.last().unwrap().name, "predictiondata.csv");

        engine.report_prediction_result(order.id, SinglePrediction { value: i as f64 });
    }

    let ensembles = sink.ensembles.lock();
    assert_eq!(ensembles.len(), 1);
    assert_eq!(ensembles[0].predictions.len(), 2);
    assert_eq!(ensembles[0].average(), 0.5);
}

#[tokio::test]
async fn reserved_workers_never_receive_training_work() {
    let workers: Vec<String> = (0..4).map(|i| format!("worker-{i}")).collect();
    let store = Arc::new(TestStore::default());
    let engine = Engine::new(
        &config(4, 0.5, 400),
        Arc::new(TestRegistry(workers)),
        store,
        Arc::new(CollectSink::default()),
    )
    .unwrap();
    engine.start();
    assert_eq!(engine.status().queued, 4);

    // The first two connected workers are reserved and only training exists.
    assert!(engine.fetch_work("worker-0").is_none());
    assert!(engine.fetch_work("worker-1").is_none());

    // The other two drain it in FIFO order.
    assert_eq!(
        engine.fetch_work("worker-2").unwrap().kind,
        WorkKind::Training
    );
    assert_eq!(
        engine.fetch_work("worker-3").unwrap().kind,
        WorkKind::Training
    );
}

#[tokio::test]
async fn fan_out_aborts_whole_ensemble_when_queue_is_full() {
    let store = Arc::new(TestStore::with_models("v1", 5));
    let sink = Arc::new(CollectSink::default());
    let engine = Engine::new(
        &config(0, 0.0, 3),
        Arc::new(TestRegistry(vec!["worker-0".into()])),
        store,
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    )
    .unwrap();
    engine.start();

    let result = engine.request_prediction(PredictionRequest::default());
    assert!(result.is_err());

    // No partial ensemble survives: the queued members were retracted.
    assert_eq!(engine.status().queued, 0);
    assert!(sink.ensembles.lock().is_empty());
}

#[tokio::test]
async fn prediction_without_usable_models_is_rejected() {
    let engine = Engine::new(
        &config(3, 0.0, 400),
        Arc::new(TestRegistry(Vec::new())),
        Arc::new(TestStore::default()),
        Arc::new(CollectSink::default()),
    )
    .unwrap();

    assert!(engine.request_prediction(PredictionRequest::default()).is_err());
    // The rejection queued nothing; only the demand top-up may queue work.
    assert_eq!(engine.status().queued, 0);
}

#[tokio::test]
async fn late_results_are_ignored() {
    let engine = Engine::new(
        &config(0, 0.0, 400),
        Arc::new(TestRegistry(Vec::new())),
        Arc::new(TestStore::default()),
        Arc::new(CollectSink::default()),
    )
    .unwrap();

    let unknown = Uuid::new_v4();
    engine.report_training_result(unknown, &model_result(unknown), true);
    engine.report_prediction_result(unknown, SinglePrediction { value: 1.0 });

    assert_eq!(engine.status().queued, 0);
    assert_eq!(engine.status().active, 0);
}

#[tokio::test]
async fn worker_error_accelerates_the_retry() {
    let store = Arc::new(TestStore::default());
    let engine = Engine::new(
        &config(1, 0.0, 400),
        Arc::new(TestRegistry(vec!["worker-0".into()])),
        Arc::clone(&store) as Arc<dyn ModelStore>,
        Arc::new(CollectSink::default()),
    )
    .unwrap();
    engine.start();

    let order = engine.fetch_work("worker-0").unwrap();
    engine.report_worker_error(order.id, &["Traceback".into()]);

    // The error log was filed and the job went straight back to the queue.
    assert_eq!(store.errors.lock().as_slice(), &[order.id]);
    assert_eq!(engine.status().queued, 1);
    assert_eq!(engine.status().active, 0);

    // The retry keeps the job id.
    assert_eq!(engine.fetch_work("worker-0").unwrap().id, order.id);
}

#[tokio::test]
async fn invalid_training_result_leaves_the_job_active() {
    let store = Arc::new(TestStore::default());
    let engine = Engine::new(
        &config(1, 0.0, 400),
        Arc::new(TestRegistry(vec!["worker-0".into()])),
        Arc::clone(&store) as Arc<dyn ModelStore>,
        Arc::new(CollectSink::default()),
    )
    .unwrap();
    engine.start();

    let order = engine.fetch_work("worker-0").unwrap();
    // No model file in the upload: validation fails.
    engine.report_training_result(order.id, &[], true);

    assert_eq!(store.usable_model_count("v1"), 0);
    assert_eq!(engine.status().active, 1);
}
