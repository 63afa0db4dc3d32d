//! RAII guard that releases a tier slot when dropped.

use std::sync::Arc;
use tokio::sync::{Notify, OwnedSemaphorePermit};

/// Holds one slot of a tier. On drop the slot goes back to the semaphore
/// (and so to the oldest queued waiter), then one deferred caller is woken.
pub(super) struct TierPermit {
    permit: Option<OwnedSemaphorePermit>,
    freed: Arc<Notify>,
}

impl TierPermit {
    pub(super) fn new(permit: OwnedSemaphorePermit, freed: Arc<Notify>) -> Self {
        Self {
            permit: Some(permit),
            freed,
        }
    }
}

impl Drop for TierPermit {
    fn drop(&mut self) {
        drop(self.permit.take());
        self.freed.notify_one();
    }
}
