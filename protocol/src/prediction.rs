use serde::{Deserialize, Serialize};

/// A raw prediction request as received from the downstream consumer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// Input rows for the prediction scripts, one line per entry.
    pub payload: Vec<String>,
}

/// One model's prediction for a single request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SinglePrediction {
    pub value: f64,
}

/// The fanned-in result of one prediction request: one single-model
/// prediction per usable model, combined by the accessors below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleResult {
    pub request: PredictionRequest,
    /// Number of member jobs the request was fanned out to.
    pub target: usize,
    pub predictions: Vec<SinglePrediction>,
}

impl EnsembleResult {
    /// Mean of the collected predictions.
    pub fn average(&self) -> f64 {
        let sum: f64 = self.predictions.iter().map(|p| p.value).sum();
        sum / self.predictions.len() as f64
    }

    /// Median of the collected predictions; for an even count, the mean of
    /// the two middle values.
    pub fn median(&self) -> f64 {
        let mut values: Vec<f64> = self.predictions.iter().map(|p| p.value).collect();
        values.sort_by(|a, b| a.total_cmp(b));

        let mid = values.len() / 2;
        if values.len() % 2 == 1 {
            values[mid]
        } else {
            (values[mid - 1] + values[mid]) / 2.0
        }
    }
}
