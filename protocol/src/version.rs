use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Dataset flavor of a version; `Cargo2000` datasets get a special bucketing
/// treatment during evaluation, `Generic` ones none.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    #[default]
    Generic,
    Cargo2000,
}

/// A named evaluation metric (e.g. mcc) and its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: f64,
}

/// Information about one trained model of a version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    /// Filename of the model on the asset store.
    pub model_file_name: String,
    pub created_at: SystemTime,
    pub training_time: Duration,
    /// Evaluation metrics; empty until the model has been evaluated.
    pub metrics: Vec<Metric>,
}

impl ModelInfo {
    pub fn new(model_file_name: impl Into<String>, training_time: Duration) -> Self {
        Self {
            model_file_name: model_file_name.into(),
            created_at: SystemTime::now(),
            training_time,
            metrics: Vec::new(),
        }
    }

    /// A model is usable for predictions once its metrics exist.
    pub fn is_usable(&self) -> bool {
        !self.metrics.is_empty()
    }
}
