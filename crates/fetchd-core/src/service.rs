//! The assembled service: one entry point for single fetches and batch jobs.
//!
//! Every inbound call passes the shutdown acceptance gate first and holds a
//! [`RequestGuard`](crate::shutdown::RequestGuard) until it returns.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::FetchdConfig;
use crate::error::ServiceResult;
use crate::fetcher::{fetch_with_timeout, FetchOptions, FetchResponse, Fetchers, HttpFetcher};
use crate::gate::{ConcurrencyGate, GateSnapshot};
use crate::jobs::{BatchRequest, JobId, JobStore, JobSummary, JobView, RequestSettings};
use crate::orchestrator::JobOrchestrator;
use crate::shutdown::{DrainOutcome, ShutdownCoordinator};
use crate::ssrf::SsrfGuard;
use crate::webhook::{JobNotifier, WebhookDispatcher};

const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Service {
    config: FetchdConfig,
    guard: SsrfGuard,
    gate: Arc<ConcurrencyGate>,
    fetchers: Fetchers,
    orchestrator: JobOrchestrator,
    shutdown: ShutdownCoordinator,
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("gate", &self.gate)
            .field("shutdown", &self.shutdown)
            .finish()
    }
}

impl Service {
    /// Service with the libcurl HTTP engine only.
    pub fn from_config(config: FetchdConfig) -> Self {
        let guard = SsrfGuard::new(config.allow_loopback).with_dns_timeout(config.dns_timeout());
        let http = HttpFetcher::new(guard.clone(), config.max_redirects)
            .with_max_body_bytes(config.max_body_bytes);
        Self::with_guard(config, guard, Fetchers::new(Arc::new(http)))
    }

    pub fn new(config: FetchdConfig, fetchers: Fetchers) -> Self {
        let guard = SsrfGuard::new(config.allow_loopback).with_dns_timeout(config.dns_timeout());
        Self::with_guard(config, guard, fetchers)
    }

    /// Build with an explicit guard (e.g. one backed by a custom resolver).
    pub fn with_guard(config: FetchdConfig, guard: SsrfGuard, fetchers: Fetchers) -> Self {
        let gate = Arc::new(ConcurrencyGate::new(&config.gate));
        let dispatcher: Arc<dyn JobNotifier> =
            Arc::new(WebhookDispatcher::new(guard.clone(), &config.webhook));
        let orchestrator = JobOrchestrator::new(
            Arc::new(JobStore::new()),
            Arc::clone(&gate),
            guard.clone(),
            fetchers.clone(),
            Some(dispatcher),
            Duration::from_secs(config.default_timeout_secs.max(1)),
        );
        tracing::debug!(gate = ?config.gate, allow_loopback = guard.allow_loopback(), "service assembled");
        Self {
            config,
            guard,
            gate,
            fetchers,
            orchestrator,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    pub fn config(&self) -> &FetchdConfig {
        &self.config
    }

    pub fn orchestrator(&self) -> &JobOrchestrator {
        &self.orchestrator
    }

    pub fn shutdown_coordinator(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }

    /// Fetch one URL synchronously. Busy, blocked and failed fetches come back
    /// as distinct errors; non-2xx upstream responses are returned as data.
    pub async fn fetch_one(&self, url: &str, settings: &RequestSettings) -> ServiceResult<FetchResponse> {
        self.fetch_one_cancellable(url, settings, &CancellationToken::new())
            .await
    }

    pub async fn fetch_one_cancellable(
        &self,
        url: &str,
        settings: &RequestSettings,
        cancel: &CancellationToken,
    ) -> ServiceResult<FetchResponse> {
        let _request = self.shutdown.try_enter()?;
        let timeout = Duration::from_secs(
            settings
                .timeout_secs
                .unwrap_or(self.config.default_timeout_secs)
                .max(1),
        );
        let target = self.guard.validate_within(url, timeout).await?;
        let engine = settings.engine();
        let fetcher = self.fetchers.for_engine(engine)?;
        let mut opts = FetchOptions::new(engine, timeout);
        opts.headers = settings.headers.clone();
        opts.fingerprint = settings.fingerprint.clone();

        tracing::debug!(url = %target.url, engine = engine.as_str(), "single fetch");
        self.gate
            .admit(engine, cancel, || fetch_with_timeout(fetcher.as_ref(), &target, &opts))
            .await?
    }

    /// Accept a batch. Item failures never fail this call.
    pub fn submit_batch(&self, batch: BatchRequest) -> ServiceResult<JobId> {
        let _request = self.shutdown.try_enter()?;
        self.orchestrator
            .create_job(batch.items, &batch.common_settings, batch.webhook)
    }

    pub fn job(&self, id: &str) -> ServiceResult<JobView> {
        let _request = self.shutdown.try_enter()?;
        self.orchestrator.get_job(id)
    }

    pub fn cancel_job(&self, id: &str) -> ServiceResult<bool> {
        let _request = self.shutdown.try_enter()?;
        self.orchestrator.cancel_job(id)
    }

    pub fn list_jobs(&self) -> ServiceResult<Vec<JobSummary>> {
        let _request = self.shutdown.try_enter()?;
        Ok(self.orchestrator.list_jobs())
    }

    /// Periodically drop finished jobs past the configured retention; stops on shutdown.
    pub fn spawn_retention_sweep(&self) -> JoinHandle<()> {
        let retention = Duration::from_secs(self.config.job_retention_secs);
        let every = retention.clamp(Duration::from_secs(1), MAX_SWEEP_INTERVAL);
        self.orchestrator
            .spawn_retention_sweep(every, retention, self.shutdown.subscribe())
    }

    /// Stop accepting requests, wait (bounded) for in-flight ones, discard
    /// queued gate work, then give running batch items and webhook
    /// deliveries the same bound.
    pub async fn shutdown(&self) -> DrainOutcome {
        self.shutdown.mark_shutting_down();
        let outcome = self.shutdown.wait_for_drain(self.config.drain_wait()).await;
        self.gate.close();
        self.orchestrator
            .wait_idle(self.config.drain_wait())
            .await;
        tracing::info!(
            drained = outcome.drained,
            remaining = outcome.remaining,
            waited_ms = outcome.waited.as_millis() as u64,
            "shutdown drain finished"
        );
        outcome
    }
}
