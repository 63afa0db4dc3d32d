//! In-memory job registry.
//!
//! All mutation happens under one mutex, so an item write, the `processed`
//! bump, and the terminal-status decision are a single step even when item
//! fetches finish concurrently.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::types::{unix_millis, ItemOutcome, Job, JobId, JobStatus, JobSummary, JobView, WebhookSpec};

#[derive(Debug, Default)]
pub struct JobStore {
    jobs: Mutex<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, Job>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, job: Job) -> JobId {
        let id = job.id.clone();
        self.lock().insert(id.clone(), job);
        id
    }

    pub fn get(&self, id: &str) -> Option<JobView> {
        self.lock().get(id).map(Job::view)
    }

    pub fn webhook(&self, id: &str) -> Option<WebhookSpec> {
        self.lock().get(id).and_then(|j| j.webhook.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Move a queued job to running. Returns true if this call made the transition.
    pub fn mark_running(&self, id: &str) -> bool {
        let mut jobs = self.lock();
        match jobs.get_mut(id) {
            Some(job) if job.status == JobStatus::Queued => {
                job.status = JobStatus::Running;
                true
            }
            _ => false,
        }
    }

    /// Record the outcome of item `index`.
    ///
    /// Returns the final view when this write completed the job, so exactly
    /// one caller observes the terminal transition. Writes for unknown jobs,
    /// out-of-range indexes, or already-resolved items are ignored.
    pub fn record_outcome(&self, id: &str, index: usize, outcome: ItemOutcome) -> Option<JobView> {
        if outcome.is_pending() {
            return None;
        }
        let mut jobs = self.lock();
        let job = jobs.get_mut(id)?;
        if job.status.is_terminal() {
            return None;
        }
        let item = job.items.get_mut(index)?;
        if !item.outcome.is_pending() {
            tracing::warn!(job_id = %id, index, "duplicate outcome ignored");
            return None;
        }
        item.outcome = outcome;
        job.processed += 1;
        if job.status == JobStatus::Queued {
            job.status = JobStatus::Running;
        }

        if job.processed < job.total() {
            return None;
        }
        let succeeded = job.items.iter().filter(|i| i.outcome.is_success()).count();
        job.status = JobStatus::from_outcomes(succeeded, job.total());
        job.completed_at = Some(unix_millis());
        Some(job.view())
    }

    pub fn list(&self) -> Vec<JobSummary> {
        let mut out: Vec<JobSummary> = self
            .lock()
            .values()
            .map(|j| JobSummary {
                job_id: j.id.clone(),
                status: j.status,
                total: j.total(),
                processed: j.processed,
                created_at: j.created_at,
            })
            .collect();
        out.sort_by_key(|s| s.created_at);
        out
    }

    /// Drop terminal jobs completed before `cutoff_ms`. Returns how many were removed.
    pub fn remove_finished(&self, cutoff_ms: i64) -> usize {
        let mut jobs = self.lock();
        let before = jobs.len();
        jobs.retain(|_, j| match j.completed_at {
            Some(done) => done >= cutoff_ms,
            None => true,
        });
        before - jobs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::jobs::types::{JobItemRequest, RequestSettings, SuccessPayload};
    use std::sync::Arc;

    fn job(n: usize) -> Job {
        let items = (0..n)
            .map(|i| JobItemRequest::new(format!("https://example.com/{i}")))
            .collect();
        Job::new(items, &RequestSettings::default(), None)
    }

    fn ok() -> ItemOutcome {
        ItemOutcome::Success(SuccessPayload {
            status_code: 200,
            content_type: Some("text/plain".into()),
            final_url: "https://example.com/".into(),
            bytes: 2,
            sha256: String::new(),
            body: Some("ok".into()),
        })
    }

    fn err() -> ItemOutcome {
        ItemOutcome::error(&ServiceError::FetchError("connection reset".into()))
    }

    #[test]
    fn two_successes_and_one_failure_is_partial() {
        let store = JobStore::new();
        let id = store.insert(job(3));
        assert!(store.record_outcome(&id, 2, ok()).is_none());
        assert_eq!(store.get(&id).unwrap().status, JobStatus::Running);
        assert!(store.record_outcome(&id, 0, err()).is_none());
        let done = store.record_outcome(&id, 1, ok()).expect("terminal view");
        assert_eq!(done.status, JobStatus::Partial);
        assert_eq!((done.processed, done.total), (3, 3));
        assert_eq!(done.error_count(), 1);
        assert!(done.completed_at.is_some());
        assert_eq!(done.results[0].index, 0);
        assert!(matches!(done.results[0].outcome, ItemOutcome::Error { .. }));
    }

    #[test]
    fn all_success_and_all_failure() {
        let store = JobStore::new();
        let a = store.insert(job(2));
        store.record_outcome(&a, 0, ok());
        assert_eq!(store.record_outcome(&a, 1, ok()).unwrap().status, JobStatus::Succeeded);

        let b = store.insert(job(2));
        store.record_outcome(&b, 0, err());
        assert_eq!(store.record_outcome(&b, 1, err()).unwrap().status, JobStatus::Failed);
    }

    #[test]
    fn duplicate_and_late_writes_do_not_change_counts() {
        let store = JobStore::new();
        let id = store.insert(job(1));
        let done = store.record_outcome(&id, 0, ok()).unwrap();
        let completed_at = done.completed_at;
        assert!(store.record_outcome(&id, 0, err()).is_none());
        assert!(store.record_outcome(&id, 7, err()).is_none());
        let view = store.get(&id).unwrap();
        assert_eq!(view.processed, 1);
        assert_eq!(view.status, JobStatus::Succeeded);
        assert_eq!(view.completed_at, completed_at);
    }

    #[test]
    fn mark_running_only_from_queued() {
        let store = JobStore::new();
        let id = store.insert(job(1));
        assert!(store.mark_running(&id));
        assert!(!store.mark_running(&id));
        assert!(!store.mark_running("missing"));
    }

    #[test]
    fn concurrent_writers_produce_one_terminal_view() {
        let store = Arc::new(JobStore::new());
        let n = 64;
        let id = store.insert(job(n));
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    let outcome = if i % 2 == 0 { ok() } else { err() };
                    store.record_outcome(&id, i, outcome).is_some()
                })
            })
            .collect();
        let terminal = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|t| *t)
            .count();
        assert_eq!(terminal, 1);
        let view = store.get(&id).unwrap();
        assert_eq!(view.processed, n);
        assert_eq!(view.status, JobStatus::Partial);
    }

    #[test]
    fn retention_sweep_keeps_unfinished_jobs() {
        let store = JobStore::new();
        let finished = store.insert(job(1));
        let running = store.insert(job(2));
        store.record_outcome(&finished, 0, ok());
        store.record_outcome(&running, 0, ok());
        assert_eq!(store.remove_finished(i64::MAX), 1);
        assert!(store.get(&finished).is_none());
        assert!(store.get(&running).is_some());
        assert_eq!(store.list().len(), 1);
    }
}
