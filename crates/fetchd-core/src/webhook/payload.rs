//! Body delivered to webhook callbacks.

use serde::{Deserialize, Serialize};

use crate::jobs::{ItemResult, JobId, JobStatus, JobView};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub results: Vec<ItemResult>,
}

impl From<&JobView> for WebhookPayload {
    fn from(view: &JobView) -> Self {
        Self {
            job_id: view.job_id.clone(),
            status: view.status,
            total: view.total,
            processed: view.processed,
            results: view.results.clone(),
        }
    }
}
