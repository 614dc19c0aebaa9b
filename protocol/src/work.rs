use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::files::File;

/// The two kinds of work the server hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkKind {
    Training,
    Prediction,
}

impl WorkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkKind::Training => "training",
            WorkKind::Prediction => "prediction",
        }
    }
}

/// Immutable descriptor of one dispatched job, suitable for transmission to
/// the assigned worker. The id is stable across retries of the same job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: Uuid,
    pub kind: WorkKind,
    pub version: String,
    /// Ordered input files: static version files first, then any
    /// job-specific files (model, prediction payload).
    pub files: Vec<Arc<File>>,
}
