use std::{collections::HashMap, sync::Arc, time::Duration};

use log::{debug, info, warn};
use parking_lot::Mutex;
use protocol::{File, WorkKind, WorkOrder};
use tokio::{task::JoinHandle, time};
use uuid::Uuid;

use crate::{
    config::Timeouts,
    error::{Result, ServerError},
    registry::PriorityView,
    work::WorkItem,
};

/// An item handed to a worker, together with the watchdog that reclaims it
/// if no result arrives in time.
struct ActiveJob {
    item: WorkItem,
    watchdog: JoinHandle<()>,
}

#[derive(Default)]
struct JobBoard {
    /// Insertion-ordered; dispatch is strict FIFO for non-reserved workers.
    queued: Vec<WorkItem>,
    active: HashMap<Uuid, ActiveJob>,
}

/// Owns the queued and active work collections.
///
/// Every check-then-act sequence runs under one lock, so two workers can
/// never be handed the same queued item. The timeout is the only failure
/// detector: a job whose worker goes silent is reclaimed by its watchdog and
/// re-queued under the same id, indefinitely.
#[derive(Clone)]
pub struct Scheduler {
    board: Arc<Mutex<JobBoard>>,
    timeouts: Timeouts,
    max_queued: usize,
}

impl Scheduler {
    pub fn new(timeouts: Timeouts, max_queued: usize) -> Self {
        Self {
            board: Arc::new(Mutex::new(JobBoard::default())),
            timeouts,
            max_queued,
        }
    }

    /// Queues a new item under the caller-supplied id, so callers can record
    /// the id before the item becomes fetchable.
    ///
    /// # Errors
    /// Returns `ServerError::QueueFull` once `max_queued` items are waiting.
    /// Timeout retries re-enter through [`Scheduler::expire`] instead and are
    /// not subject to the cap.
    pub fn enqueue(
        &self,
        version: &str,
        files: Vec<Arc<File>>,
        kind: WorkKind,
        id: Uuid,
    ) -> Result<()> {
        let mut board = self.board.lock();
        if board.queued.len() >= self.max_queued {
            return Err(ServerError::QueueFull {
                limit: self.max_queued,
            });
        }

        debug!("queued {} job {id} for {version}", kind.as_str());
        board.queued.push(WorkItem::new(version, files, kind, id));
        Ok(())
    }

    /// Hands the next suitable queued item to the requesting worker.
    ///
    /// Non-reserved workers receive the first queued item of any kind, in
    /// strict FIFO order. Reserved workers only ever receive prediction
    /// work: the first queued `Prediction` item, or nothing.
    pub fn fetch(&self, worker: &str, view: &PriorityView) -> Option<WorkOrder> {
        let mut board = self.board.lock();
        if board.queued.is_empty() {
            return None;
        }

        let reserved = view.is_reserved(worker);
        let idx = if reserved {
            match board
                .queued
                .iter()
                .position(|item| item.kind() == WorkKind::Prediction)
            {
                Some(idx) => idx,
                None => {
                    info!("priority request from {worker}, but no prediction work is queued");
                    return None;
                }
            }
        } else {
            0
        };

        let mut item = board.queued.remove(idx);
        let id = item.id();
        let order = item.dispatch(worker);
        let watchdog = self.spawn_watchdog(id, self.timeouts.for_kind(item.kind()));
        board.active.insert(id, ActiveJob { item, watchdog });

        if reserved {
            info!("priority request from {worker} served with {id}");
        } else {
            debug!(worker = worker; "dispatched {id}");
        }
        Some(order)
    }

    fn spawn_watchdog(&self, id: Uuid, after: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            time::sleep(after).await;
            scheduler.expire(id);
        })
    }

    /// Reclaims a job whose worker went silent or reported an error, and
    /// re-queues it under the same id, kind, version and files. A no-op when
    /// the job is no longer active (the result won the race).
    pub fn expire(&self, id: Uuid) {
        let mut board = self.board.lock();
        let Some(job) = board.active.remove(&id) else {
            return;
        };
        // Still pending when the expiry came from an explicit worker error.
        job.watchdog.abort();

        let mut item = job.item;
        warn!(
            "removed {id} from active work because of timeout or error on {}",
            item.worker().unwrap_or("<unassigned>")
        );
        item.requeue();
        // Retries are exempt from the queue cap.
        board.queued.push(item);
    }

    /// Settles a job on any result: drops it from active (cancelling the
    /// watchdog) and, defensively, from queued — a timed-out job whose
    /// result arrives late has already been re-queued, and that copy is
    /// satisfied too. Returns the settled item, or `None` for a result that
    /// matches nothing (late duplicate, or a restart lost the state).
    pub fn finish(&self, id: Uuid) -> Option<WorkItem> {
        let mut board = self.board.lock();

        let mut settled = None;
        if let Some(job) = board.active.remove(&id) {
            job.watchdog.abort();
            let mut item = job.item;
            item.finish();
            info!("removed {id} from active work");
            settled = Some(item);
        }

        if let Some(idx) = board.queued.iter().position(|item| item.id() == id) {
            let item = board.queued.remove(idx);
            info!("removed {id} from queue");
            settled = settled.or(Some(item));
        }

        settled
    }

    /// Drops not-yet-dispatched items by id. The ensemble fan-out rolls its
    /// member jobs back through this when the queue cap aborts it.
    pub fn retract(&self, ids: &[Uuid]) {
        let mut board = self.board.lock();
        board.queued.retain(|item| !ids.contains(&item.id()));
    }

    /// The version a currently active job belongs to, if any.
    pub fn active_version(&self, id: Uuid) -> Option<String> {
        let board = self.board.lock();
        board
            .active
            .get(&id)
            .map(|job| job.item.version().to_string())
    }

    /// The version of a job that is still queued or active, if any.
    pub fn version_of(&self, id: Uuid) -> Option<String> {
        let board = self.board.lock();
        board
            .active
            .get(&id)
            .map(|job| job.item.version().to_string())
            .or_else(|| {
                board
                    .queued
                    .iter()
                    .find(|item| item.id() == id)
                    .map(|item| item.version().to_string())
            })
    }

    /// Queued and active item counts, for the status snapshot.
    pub fn counts(&self) -> (usize, usize) {
        let board = self.board.lock();
        (board.queued.len(), board.active.len())
    }

    /// Training jobs already queued or active for a version. The demand
    /// top-up subtracts these from its deficit so in-flight work is not
    /// requested twice.
    pub fn pending_training(&self, version: &str) -> usize {
        let board = self.board.lock();
        let queued = board
            .queued
            .iter()
            .filter(|item| item.kind() == WorkKind::Training && item.version() == version)
            .count();
        let active = board
            .active
            .values()
            .filter(|job| job.item.kind() == WorkKind::Training && job.item.version() == version)
            .count();
        queued + active
    }
}
