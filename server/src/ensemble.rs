use std::sync::Arc;

use log::info;
use parking_lot::Mutex;
use protocol::{EnsembleResult, PredictionRequest, SinglePrediction};
use uuid::Uuid;

/// Fan-in bookkeeping for one prediction request.
#[derive(Debug)]
struct EnsembleRequest {
    id: Uuid,
    request: PredictionRequest,
    /// Fixed at fan-out: the number of member jobs created for the request.
    target: usize,
    /// Member job ids still outstanding; each is consumed by its first
    /// accepted result.
    members: Vec<Uuid>,
    predictions: Vec<SinglePrediction>,
}

/// Collects the single-model predictions of many worker jobs back into one
/// ensembled answer.
///
/// Completion is a counting barrier: member results arrive in any order, and
/// the request completes exactly once, on the submission that reaches the
/// target.
#[derive(Clone, Default)]
pub struct EnsembleTracker {
    live: Arc<Mutex<Vec<EnsembleRequest>>>,
}

impl EnsembleTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a live request before its member jobs are queued. The target is
    /// the number of member jobs the fan-out will create; the returned handle
    /// attaches them.
    pub fn begin(&self, request: PredictionRequest, target: usize) -> Uuid {
        debug_assert!(target > 0);
        let id = Uuid::new_v4();
        self.live.lock().push(EnsembleRequest {
            id,
            request,
            target,
            members: Vec::with_capacity(target),
            predictions: Vec::with_capacity(target),
        });
        id
    }

    /// Attaches a member job to a live request. Must happen before the job
    /// becomes fetchable, or its result could arrive unowned and be dropped.
    pub fn add_member(&self, ensemble: Uuid, job: Uuid) {
        let mut live = self.live.lock();
        if let Some(req) = live.iter_mut().find(|req| req.id == ensemble) {
            req.members.push(job);
        }
    }

    /// Drops a live request whose fan-out was aborted.
    pub fn cancel(&self, ensemble: Uuid) {
        self.live.lock().retain(|req| req.id != ensemble);
    }

    /// Appends one member result to the owning live request.
    ///
    /// Returns the completed ensemble exactly once, on the submission that
    /// reaches the target. A job id owned by no live request — late,
    /// duplicate, or unknown — is ignored.
    pub fn submit(&self, job: Uuid, prediction: SinglePrediction) -> Option<EnsembleResult> {
        let mut live = self.live.lock();
        let idx = live.iter().position(|req| req.members.contains(&job))?;

        let req = &mut live[idx];
        req.members.retain(|id| *id != job);
        req.predictions.push(prediction);
        if req.predictions.len() < req.target {
            return None;
        }

        let done = live.swap_remove(idx);
        info!("ensemble complete with {} predictions", done.target);
        Some(EnsembleResult {
            request: done.request,
            target: done.target,
            predictions: done.predictions,
        })
    }

    /// Number of live (incomplete) requests.
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(value: f64) -> SinglePrediction {
        SinglePrediction { value }
    }

    /// Opens a request and attaches `n` fresh member jobs.
    fn fan_out(tracker: &EnsembleTracker, n: usize) -> (Uuid, Vec<Uuid>) {
        let ensemble = tracker.begin(PredictionRequest::default(), n);
        let jobs: Vec<Uuid> = (0..n).map(|_| Uuid::new_v4()).collect();
        for &job in &jobs {
            tracker.add_member(ensemble, job);
        }
        (ensemble, jobs)
    }

    #[test]
    fn test_completes_exactly_on_the_last_submission() {
        let tracker = EnsembleTracker::new();
        let (_, jobs) = fan_out(&tracker, 3);

        assert!(tracker.submit(jobs[0], prediction(1.0)).is_none());
        assert!(tracker.submit(jobs[2], prediction(2.0)).is_none());

        let done = tracker.submit(jobs[1], prediction(3.0)).unwrap();
        assert_eq!(done.target, 3);
        assert_eq!(done.predictions.len(), 3);
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn test_member_result_accepted_while_fan_out_is_incomplete() {
        let tracker = EnsembleTracker::new();
        let ensemble = tracker.begin(PredictionRequest::default(), 2);

        // The first member reports back before the second is attached.
        let first = Uuid::new_v4();
        tracker.add_member(ensemble, first);
        assert!(tracker.submit(first, prediction(1.0)).is_none());

        let second = Uuid::new_v4();
        tracker.add_member(ensemble, second);
        assert!(tracker.submit(second, prediction(2.0)).is_some());
    }

    #[test]
    fn test_duplicate_submission_is_a_noop() {
        let tracker = EnsembleTracker::new();
        let (_, jobs) = fan_out(&tracker, 2);

        assert!(tracker.submit(jobs[0], prediction(1.0)).is_none());
        // The first submission consumed the member id.
        assert!(tracker.submit(jobs[0], prediction(1.0)).is_none());
        assert_eq!(tracker.live_count(), 1);

        assert!(tracker.submit(jobs[1], prediction(2.0)).is_some());
    }

    #[test]
    fn test_unknown_job_is_ignored() {
        let tracker = EnsembleTracker::new();
        fan_out(&tracker, 1);
        assert!(tracker.submit(Uuid::new_v4(), prediction(1.0)).is_none());
        assert_eq!(tracker.live_count(), 1);
    }

    #[test]
    fn test_requests_track_their_own_members() {
        let tracker = EnsembleTracker::new();
        let (_, first) = fan_out(&tracker, 1);
        let (_, second) = fan_out(&tracker, 1);

        let done = tracker.submit(second[0], prediction(5.0)).unwrap();
        assert_eq!(done.predictions[0].value, 5.0);
        assert_eq!(tracker.live_count(), 1);

        assert!(tracker.submit(first[0], prediction(1.0)).is_some());
    }

    #[test]
    fn test_cancelled_request_ignores_results() {
        let tracker = EnsembleTracker::new();
        let (ensemble, jobs) = fan_out(&tracker, 2);

        tracker.cancel(ensemble);
        assert_eq!(tracker.live_count(), 0);
        assert!(tracker.submit(jobs[0], prediction(1.0)).is_none());
    }
}
