pub mod files;
pub mod msg;
pub mod prediction;
pub mod status;
pub mod version;
pub mod work;

pub use files::File;
pub use prediction::{EnsembleResult, PredictionRequest, SinglePrediction};
pub use status::StatusSnapshot;
pub use version::{DatasetType, Metric, ModelInfo};
pub use work::{WorkKind, WorkOrder};
