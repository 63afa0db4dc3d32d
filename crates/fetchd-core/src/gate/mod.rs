//! Two-tier admission control.
//!
//! Every fetch runs under a global slot; browser-engine fetches additionally
//! hold a browser slot, acquired strictly inside the global one and released
//! before it. Each tier is a fair `tokio::sync::Semaphore` with a bounded
//! count of waiters. A full (or disabled) queue rejects immediately with
//! `ServiceBusy` instead of buffering.

mod permit;
mod tier;

pub use tier::TierSnapshot;

use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::config::GateConfig;
use crate::error::{ServiceError, ServiceResult, Tier};
use crate::fetcher::Engine;

use self::tier::TierLimiter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct GateSnapshot {
    pub global: TierSnapshot,
    pub browser: TierSnapshot,
}

pub struct ConcurrencyGate {
    global: TierLimiter,
    browser: TierLimiter,
}

impl std::fmt::Debug for ConcurrencyGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyGate")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

impl ConcurrencyGate {
    pub fn new(cfg: &GateConfig) -> Self {
        Self {
            global: TierLimiter::new(Tier::Global, cfg.global_max_concurrency, cfg.global_max_queue),
            browser: TierLimiter::new(
                Tier::Browser,
                cfg.browser_max_concurrency,
                cfg.browser_max_queue,
            ),
        }
    }

    /// Run `task` under a global slot.
    pub async fn admit_global<F, Fut, T>(&self, cancel: &CancellationToken, task: F) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let global = self.global.acquire(cancel).await?;
        if cancel.is_cancelled() {
            drop(global);
            return Err(ServiceError::Cancelled);
        }
        let out = task().await;
        drop(global);
        Ok(out)
    }

    /// Run `task` under a global slot and, nested inside it, a browser slot.
    pub async fn admit_browser<F, Fut, T>(&self, cancel: &CancellationToken, task: F) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        // Fail fast on a saturated browser tier before taking a global slot.
        self.browser.precheck()?;
        let global = self.global.acquire(cancel).await?;
        let browser = self.browser.acquire(cancel).await?;
        if cancel.is_cancelled() {
            drop(browser);
            drop(global);
            return Err(ServiceError::Cancelled);
        }
        let out = task().await;
        drop(browser);
        drop(global);
        Ok(out)
    }

    /// Pick the tier for `engine`.
    pub async fn admit<F, Fut, T>(
        &self,
        engine: Engine,
        cancel: &CancellationToken,
        task: F,
    ) -> ServiceResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        match engine {
            Engine::Http => self.admit_global(cancel, task).await,
            Engine::Browser => self.admit_browser(cancel, task).await,
        }
    }

    /// Wait until a `tier` slot is released (or the gate closes). Each release
    /// wakes a single waiter, oldest first, so callers that were turned away
    /// with `ServiceBusy` retry one at a time.
    pub async fn wait_for_capacity(&self, tier: Tier) {
        match tier {
            Tier::Global => self.global.wait_for_release().await,
            Tier::Browser => self.browser.wait_for_release().await,
        }
    }

    /// Fail all queued (not yet started) tasks with `Cancelled`; running tasks
    /// finish normally. Global is closed before browser.
    pub fn close(&self) {
        let global = self.global.close();
        let browser = self.browser.close();
        tracing::info!(
            discarded_global = global,
            discarded_browser = browser,
            "concurrency gate closed"
        );
    }

    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            global: self.global.snapshot(),
            browser: self.browser.snapshot(),
        }
    }
}
