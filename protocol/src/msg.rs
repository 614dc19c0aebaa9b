use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    files::File,
    prediction::{EnsembleResult, PredictionRequest, SinglePrediction},
    status::StatusSnapshot,
    work::WorkOrder,
};

/// Requests flowing into the server from workers and the downstream consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// A worker asks for its next piece of work.
    FetchWork { worker: String },
    /// A worker uploads the outcome of a training job.
    TrainingResult {
        job: Uuid,
        files: Vec<File>,
        success: bool,
    },
    /// A worker uploads a single-model prediction.
    PredictionResult {
        job: Uuid,
        prediction: SinglePrediction,
    },
    /// A worker reports a failed script run together with its log.
    WorkerError { job: Uuid, log: Vec<String> },
    /// The downstream consumer asks for an ensembled prediction.
    Predict { request: PredictionRequest },
}

/// Events pushed out of the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Work(WorkOrder),
    EnsembleFinished(EnsembleResult),
    Status(StatusSnapshot),
}
