pub mod config;
pub mod demand;
pub mod dispatch;
pub mod engine;
pub mod ensemble;
pub mod error;
pub mod registry;
pub mod work;

pub use config::{Config, Timeouts, VersionConfig};
pub use demand::{DemandController, ModelStore};
pub use dispatch::Scheduler;
pub use engine::{Engine, ResultSink};
pub use ensemble::EnsembleTracker;
pub use error::{Result, ServerError};
pub use registry::{PriorityView, WorkerRegistry};
pub use work::{WorkItem, WorkState};
