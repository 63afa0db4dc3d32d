//! Graceful shutdown: in-flight request accounting and a bounded drain.
//!
//! The active-request count and the shutting-down flag share one atomic word,
//! so admission at the acceptance boundary and the one-way flag flip cannot
//! interleave: once the flag is set the count can only go down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use crate::error::{ServiceError, ServiceResult};

const SHUTTING_DOWN: u64 = 1 << 63;
const COUNT_MASK: u64 = SHUTTING_DOWN - 1;
const DRAIN_POLL: Duration = Duration::from_millis(25);

/// Result of a drain wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrainOutcome {
    pub drained: bool,
    /// Requests still active when the wait ended.
    pub remaining: u64,
    pub waited: Duration,
}

#[derive(Clone)]
pub struct ShutdownCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    state: AtomicU64,
    flag_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for ShutdownCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownCoordinator")
            .field("active_requests", &self.active_requests())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        let (flag_tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state: AtomicU64::new(0),
                flag_tx,
            }),
        }
    }

    /// Register an in-flight request unconditionally. For work that has
    /// already passed the acceptance boundary; new requests use [`try_enter`](Self::try_enter).
    pub fn enter(&self) -> RequestGuard {
        self.inner.state.fetch_add(1, Ordering::AcqRel);
        RequestGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Acceptance gate: register a new request, or reject it once shutting down.
    pub fn try_enter(&self) -> ServiceResult<RequestGuard> {
        self.inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & SHUTTING_DOWN != 0 {
                    None
                } else {
                    Some(s + 1)
                }
            })
            .map_err(|_| ServiceError::ShuttingDown)?;
        Ok(RequestGuard {
            inner: Arc::clone(&self.inner),
        })
    }

    /// Flip the one-way shutting-down flag. Returns true for the call that flipped it.
    pub fn mark_shutting_down(&self) -> bool {
        let prev = self.inner.state.fetch_or(SHUTTING_DOWN, Ordering::AcqRel);
        let first = prev & SHUTTING_DOWN == 0;
        if first {
            tracing::info!(active = prev & COUNT_MASK, "shutting down; new requests rejected");
            self.inner.flag_tx.send_replace(true);
        }
        first
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) & SHUTTING_DOWN != 0
    }

    pub fn active_requests(&self) -> u64 {
        self.inner.state.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Receiver that becomes `true` when shutdown begins.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.flag_tx.subscribe()
    }

    /// Poll the active count until it reaches zero or `bound` elapses.
    pub async fn wait_for_drain(&self, bound: Duration) -> DrainOutcome {
        let start = Instant::now();
        loop {
            let remaining = self.active_requests();
            let waited = start.elapsed();
            if remaining == 0 {
                return DrainOutcome {
                    drained: true,
                    remaining,
                    waited,
                };
            }
            if waited >= bound {
                tracing::warn!(remaining, "drain wait elapsed with requests still active");
                return DrainOutcome {
                    drained: false,
                    remaining,
                    waited,
                };
            }
            tracing::debug!(remaining, "waiting for in-flight requests");
            tokio::time::sleep(DRAIN_POLL.min(bound - waited)).await;
        }
    }
}

/// Paired exit for one registered request; decrements on drop, including on error paths.
#[must_use = "dropping the guard ends the request immediately"]
pub struct RequestGuard {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for RequestGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RequestGuard")
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        let _ = self
            .inner
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |s| {
                if s & COUNT_MASK == 0 {
                    None
                } else {
                    Some(s - 1)
                }
            });
    }
}
