use std::{sync::Arc, time::Instant};

use protocol::{File, WorkKind, WorkOrder};
use uuid::Uuid;

/// Lifecycle tag of a work item.
///
/// Retry is the explicit `Active → Queued` transition; the item keeps its id
/// across it, so ensemble membership stays valid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkState {
    Queued,
    Active { worker: String, since: Instant },
    Finished,
}

/// One unit of training or prediction work, dispatched to exactly one worker
/// at a time. Kind, version and input files never change after creation.
#[derive(Debug, Clone)]
pub struct WorkItem {
    id: Uuid,
    kind: WorkKind,
    version: String,
    files: Vec<Arc<File>>,
    state: WorkState,
}

impl WorkItem {
    pub fn new(version: impl Into<String>, files: Vec<Arc<File>>, kind: WorkKind, id: Uuid) -> Self {
        Self {
            id,
            kind,
            version: version.into(),
            files,
            state: WorkState::Queued,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> WorkKind {
        self.kind
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn state(&self) -> &WorkState {
        &self.state
    }

    /// The assigned worker while the item is active.
    pub fn worker(&self) -> Option<&str> {
        match &self.state {
            WorkState::Active { worker, .. } => Some(worker),
            _ => None,
        }
    }

    /// Moves the item to `Active`, recording the assigned worker and the
    /// dispatch time, and returns the immutable descriptor to send out.
    pub fn dispatch(&mut self, worker: impl Into<String>) -> WorkOrder {
        debug_assert_eq!(self.state, WorkState::Queued);
        self.state = WorkState::Active {
            worker: worker.into(),
            since: Instant::now(),
        };
        WorkOrder {
            id: self.id,
            kind: self.kind,
            version: self.version.clone(),
            files: self.files.clone(),
        }
    }

    /// Resets a timed-out or errored item for re-dispatch under the same id.
    pub fn requeue(&mut self) {
        debug_assert!(matches!(self.state, WorkState::Active { .. }));
        self.state = WorkState::Queued;
    }

    /// Terminal transition; the item leaves all collections afterwards.
    pub fn finish(&mut self) {
        debug_assert!(matches!(self.state, WorkState::Active { .. }));
        self.state = WorkState::Finished;
    }
}
