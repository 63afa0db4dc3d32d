//! One admission tier: a fair semaphore plus a bounded count of waiters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Notify, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;

use crate::error::{BusyReason, ServiceError, ServiceResult, Tier};

use super::permit::TierPermit;

/// Counters for one tier at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TierSnapshot {
    pub active: usize,
    pub pending: usize,
    pub max: usize,
    pub max_queue: usize,
    /// `ServiceBusy` rejections since the gate was built.
    pub rejected: u64,
}

/// Holds one place in the wait queue; gives it back on drop.
struct Pending<'a>(&'a AtomicUsize);

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

pub(super) struct TierLimiter {
    tier: Tier,
    max: usize,
    max_queue: usize,
    slots: Arc<Semaphore>,
    pending: AtomicUsize,
    rejected: AtomicU64,
    /// Woken once per released slot; deferred callers wait here.
    freed: Arc<Notify>,
}

impl TierLimiter {
    pub(super) fn new(tier: Tier, max: usize, max_queue: usize) -> Self {
        if max == 0 {
            tracing::warn!(tier = %tier, "concurrency of 0 would admit nothing; using 1");
        }
        let max = max.max(1);
        Self {
            tier,
            max,
            max_queue,
            slots: Arc::new(Semaphore::new(max)),
            pending: AtomicUsize::new(0),
            rejected: AtomicU64::new(0),
            freed: Arc::new(Notify::new()),
        }
    }

    fn active(&self) -> usize {
        self.max.saturating_sub(self.slots.available_permits())
    }

    fn busy(&self, reason: BusyReason) -> ServiceError {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        ServiceError::ServiceBusy {
            tier: self.tier,
            reason,
        }
    }

    fn permit(&self, permit: tokio::sync::OwnedSemaphorePermit) -> TierPermit {
        TierPermit::new(permit, Arc::clone(&self.freed))
    }

    /// Synchronous capacity check without reserving anything.
    pub(super) fn precheck(&self) -> ServiceResult<()> {
        if self.slots.is_closed() {
            return Err(ServiceError::Cancelled);
        }
        let pending = self.pending.load(Ordering::Acquire);
        if self.max_queue == 0 {
            if self.active() > 0 || pending > 0 {
                return Err(self.busy(BusyReason::QueueDisabled));
            }
        } else if pending >= self.max_queue {
            return Err(self.busy(BusyReason::QueueFull));
        }
        Ok(())
    }

    /// Take a slot now, wait for one in FIFO order, or fail fast when the queue is full.
    pub(super) async fn acquire(&self, cancel: &CancellationToken) -> ServiceResult<TierPermit> {
        if cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        self.precheck()?;

        // Queue disabled: a free slot now or nothing.
        if self.max_queue == 0 {
            return match Arc::clone(&self.slots).try_acquire_owned() {
                Ok(permit) => Ok(self.permit(permit)),
                Err(TryAcquireError::NoPermits) => Err(self.busy(BusyReason::QueueDisabled)),
                Err(TryAcquireError::Closed) => Err(ServiceError::Cancelled),
            };
        }

        // The semaphore is fair: with waiters queued no permit is free, so
        // this never overtakes them.
        match Arc::clone(&self.slots).try_acquire_owned() {
            Ok(permit) => return Ok(self.permit(permit)),
            Err(TryAcquireError::Closed) => return Err(ServiceError::Cancelled),
            Err(TryAcquireError::NoPermits) => {}
        }

        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |p| {
                (p < self.max_queue).then_some(p + 1)
            });
        if reserved.is_err() {
            return Err(self.busy(BusyReason::QueueFull));
        }
        let _queued = Pending(&self.pending);
        tracing::debug!(
            tier = %self.tier,
            pending = self.pending.load(Ordering::Relaxed),
            active = self.active(),
            "task queued"
        );

        tokio::select! {
            res = Arc::clone(&self.slots).acquire_owned() => match res {
                Ok(permit) => Ok(self.permit(permit)),
                // Closed while waiting.
                Err(_) => Err(ServiceError::Cancelled),
            },
            _ = cancel.cancelled() => Err(ServiceError::Cancelled),
        }
    }

    /// Resolves after a slot is released or the tier is closed. A release
    /// that happened while nobody was waiting still counts once.
    pub(super) async fn wait_for_release(&self) {
        let notified = self.freed.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.slots.is_closed() {
            return;
        }
        notified.await;
    }

    /// Refuse further admissions and fail every queued waiter. Returns how
    /// many were waiting.
    pub(super) fn close(&self) -> usize {
        let discarded = self.pending.load(Ordering::Acquire);
        self.slots.close();
        self.freed.notify_waiters();
        discarded
    }

    pub(super) fn snapshot(&self) -> TierSnapshot {
        TierSnapshot {
            active: self.active(),
            pending: self.pending.load(Ordering::Acquire),
            max: self.max,
            max_queue: self.max_queue,
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}
