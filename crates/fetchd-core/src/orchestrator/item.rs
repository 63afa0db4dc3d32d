//! One batch item: validate, admit, fetch, record.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::{ErrorKind, ServiceError, ServiceResult};
use crate::fetcher::{fetch_with_timeout, FetchOptions, FetchResponse};
use crate::jobs::{ItemOutcome, JobId, RequestSettings, SuccessPayload};

use super::Inner;

pub(super) struct ItemTask {
    pub job_id: JobId,
    pub index: usize,
    pub url: String,
    pub settings: RequestSettings,
    pub cancel: CancellationToken,
}

impl ItemTask {
    pub(super) async fn run(self, inner: Arc<Inner>) {
        let outcome = match self.execute(&inner).await {
            Ok(resp) if resp.is_success() => {
                ItemOutcome::Success(SuccessPayload::from_response(&resp))
            }
            Ok(resp) => ItemOutcome::Error {
                kind: ErrorKind::HttpStatus,
                message: format!("upstream responded with status {}", resp.status),
            },
            Err(e) => {
                tracing::debug!(job_id = %self.job_id, index = self.index, url = %self.url, "item failed: {}", e);
                ItemOutcome::error(&e)
            }
        };
        if let Some(view) = inner.store.record_outcome(&self.job_id, self.index, outcome) {
            inner.finish(view).await;
        }
    }

    async fn execute(&self, inner: &Inner) -> ServiceResult<FetchResponse> {
        if self.cancel.is_cancelled() {
            return Err(ServiceError::Cancelled);
        }
        let timeout = inner.timeout_for(&self.settings);
        let target = inner.guard.validate_within(&self.url, timeout).await?;
        let engine = self.settings.engine();
        let fetcher = inner.fetchers.for_engine(engine)?;
        let mut opts = FetchOptions::new(engine, timeout);
        opts.headers = self.settings.headers.clone();
        opts.fingerprint = self.settings.fingerprint.clone();

        loop {
            let admitted = inner
                .gate
                .admit(engine, &self.cancel, || async {
                    inner.store.mark_running(&self.job_id);
                    tokio::select! {
                        res = fetch_with_timeout(fetcher.as_ref(), &target, &opts) => res,
                        _ = self.cancel.cancelled() => Err(ServiceError::Cancelled),
                    }
                })
                .await;
            match admitted {
                Ok(res) => return res,
                Err(ServiceError::ServiceBusy { tier, reason }) => {
                    tracing::debug!(
                        job_id = %self.job_id,
                        index = self.index,
                        %tier,
                        %reason,
                        "item deferred until capacity frees"
                    );
                    // A closed gate wakes us too; the next admit then fails as cancelled.
                    tokio::select! {
                        _ = inner.gate.wait_for_capacity(tier) => {}
                        _ = self.cancel.cancelled() => return Err(ServiceError::Cancelled),
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
