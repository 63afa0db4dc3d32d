//! Batch job lifecycle.
//!
//! `create_job` stores the job and spawns one task per item. Items go through
//! the SSRF guard and the shared concurrency gate like single requests; the
//! gate is the only throttle. The item write that completes a job hands the
//! final view to the notifier.

mod item;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ServiceError, ServiceResult};
use crate::fetcher::Fetchers;
use crate::gate::ConcurrencyGate;
use crate::jobs::{
    Job, JobId, JobItemRequest, JobStore, JobSummary, JobView, RequestSettings, WebhookSpec,
};
use crate::shutdown::ShutdownCoordinator;
use crate::ssrf::SsrfGuard;
use crate::webhook::JobNotifier;

use self::item::ItemTask;

#[derive(Clone)]
pub struct JobOrchestrator {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    store: Arc<JobStore>,
    gate: Arc<ConcurrencyGate>,
    guard: SsrfGuard,
    fetchers: Fetchers,
    notifier: Option<Arc<dyn JobNotifier>>,
    default_timeout: Duration,
    /// Cancellation scope per unfinished job.
    scopes: Mutex<HashMap<JobId, CancellationToken>>,
    /// Counts live item tasks, including the webhook delivery run by the last one.
    tasks: ShutdownCoordinator,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("jobs", &self.inner.store.len())
            .field("default_timeout", &self.inner.default_timeout)
            .finish()
    }
}

impl Inner {
    fn scopes(&self) -> MutexGuard<'_, HashMap<JobId, CancellationToken>> {
        self.scopes.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn timeout_for(&self, settings: &RequestSettings) -> Duration {
        settings
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
    }

    /// Called once per job, by the item write that made it terminal.
    async fn finish(&self, view: JobView) {
        self.scopes().remove(&view.job_id);
        tracing::info!(
            job_id = %view.job_id,
            status = view.status.as_str(),
            total = view.total,
            errors = view.error_count(),
            "job finished"
        );
        let Some(spec) = self.store.webhook(&view.job_id) else {
            return;
        };
        let Some(notifier) = &self.notifier else {
            tracing::warn!(job_id = %view.job_id, "job has a webhook but no notifier is configured");
            return;
        };
        let report = notifier.notify(&spec, &view).await;
        tracing::debug!(
            job_id = %view.job_id,
            attempts = report.attempts,
            delivered = report.delivered,
            "webhook handoff complete"
        );
    }
}

impl JobOrchestrator {
    pub fn new(
        store: Arc<JobStore>,
        gate: Arc<ConcurrencyGate>,
        guard: SsrfGuard,
        fetchers: Fetchers,
        notifier: Option<Arc<dyn JobNotifier>>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                gate,
                guard,
                fetchers,
                notifier,
                default_timeout,
                scopes: Mutex::new(HashMap::new()),
                tasks: ShutdownCoordinator::new(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    /// Store a queued job and start its items. Returns immediately.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn create_job(
        &self,
        items: Vec<JobItemRequest>,
        common: &RequestSettings,
        webhook: Option<WebhookSpec>,
    ) -> ServiceResult<JobId> {
        if items.is_empty() {
            return Err(ServiceError::EmptyBatch);
        }
        if let Some(spec) = &webhook {
            SsrfGuard::parse(&spec.url)?;
        }

        let job = Job::new(items, common, webhook);
        let work: Vec<(String, RequestSettings)> = job
            .items
            .iter()
            .map(|i| (i.url.clone(), i.settings.clone()))
            .collect();
        let total = work.len();
        let job_id = self.inner.store.insert(job);
        let cancel = CancellationToken::new();
        self.inner.scopes().insert(job_id.clone(), cancel.clone());
        tracing::info!(job_id = %job_id, total, "job created");

        for (index, (url, settings)) in work.into_iter().enumerate() {
            let task = ItemTask {
                job_id: job_id.clone(),
                index,
                url,
                settings,
                cancel: cancel.clone(),
            };
            let live = self.inner.tasks.enter();
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                task.run(inner).await;
                drop(live);
            });
        }
        Ok(job_id)
    }

    pub fn get_job(&self, id: &str) -> ServiceResult<JobView> {
        self.inner
            .store
            .get(id)
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Cancel a job's outstanding items; they resolve to `cancelled`.
    /// Returns false if the job had already finished.
    pub fn cancel_job(&self, id: &str) -> ServiceResult<bool> {
        if self.inner.store.get(id).is_none() {
            return Err(ServiceError::NotFound(id.to_string()));
        }
        match self.inner.scopes().get(id) {
            Some(token) => {
                token.cancel();
                tracing::info!(job_id = %id, "job cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Wait up to `bound` for item tasks and their webhook deliveries.
    /// Returns true if nothing was left running.
    pub async fn wait_idle(&self, bound: Duration) -> bool {
        let outcome = self.inner.tasks.wait_for_drain(bound).await;
        if !outcome.drained {
            tracing::warn!(pending = outcome.remaining, "batch tasks still running");
        }
        outcome.drained
    }

    pub fn list_jobs(&self) -> Vec<JobSummary> {
        self.inner.store.list()
    }

    /// Drop finished jobs older than `retention`. Returns how many were removed.
    pub fn sweep_finished(&self, retention: Duration) -> usize {
        let cutoff = crate::jobs::unix_millis() - retention.as_millis() as i64;
        let removed = self.inner.store.remove_finished(cutoff);
        if removed > 0 {
            tracing::debug!(removed, "retention sweep");
        }
        removed
    }

    /// Run `sweep_finished` every `every` until `shutdown` turns true.
    pub fn spawn_retention_sweep(
        &self,
        every: Duration,
        retention: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        this.sweep_finished(retention);
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
