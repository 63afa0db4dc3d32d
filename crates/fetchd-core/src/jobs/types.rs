//! Types for batch jobs and their per-item outcomes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{ErrorKind, ServiceError};
use crate::fetcher::{Engine, FetchResponse};

/// Job identifier (UUID v4, hyphenated).
pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Partial,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Partial => "partial",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Partial | JobStatus::Failed
        )
    }

    /// Terminal status once every item has resolved.
    pub fn from_outcomes(succeeded: usize, total: usize) -> Self {
        if succeeded == total {
            JobStatus::Succeeded
        } else if succeeded == 0 {
            JobStatus::Failed
        } else {
            JobStatus::Partial
        }
    }
}

/// Optional per-request settings. On batch items, absent fields fall back to
/// the batch's common settings, then to service defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<Engine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<serde_json::Value>,
}

impl RequestSettings {
    /// `self` overrides `common`; headers are merged with `self` winning per name.
    pub fn merged_over(&self, common: &RequestSettings) -> RequestSettings {
        let mut headers = common.headers.clone();
        for (k, v) in &self.headers {
            headers.retain(|existing, _| !existing.eq_ignore_ascii_case(k));
            headers.insert(k.clone(), v.clone());
        }
        RequestSettings {
            mode: self.mode.or(common.mode),
            timeout_secs: self.timeout_secs.or(common.timeout_secs),
            headers,
            fingerprint: self
                .fingerprint
                .clone()
                .or_else(|| common.fingerprint.clone()),
        }
    }

    pub fn engine(&self) -> Engine {
        self.mode.unwrap_or_default()
    }
}

/// One entry of a batch submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobItemRequest {
    pub url: String,
    #[serde(flatten)]
    pub settings: RequestSettings,
}

impl JobItemRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            settings: RequestSettings::default(),
        }
    }
}

/// Callback announced once when the job reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookSpec {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// A batch submission: `{items, commonSettings, webhook?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub items: Vec<JobItemRequest>,
    #[serde(default)]
    pub common_settings: RequestSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookSpec>,
}

/// What a successful item fetch produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessPayload {
    pub status_code: u32,
    pub content_type: Option<String>,
    pub final_url: String,
    pub bytes: usize,
    pub sha256: String,
    /// Body as text; omitted for binary content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl SuccessPayload {
    pub fn from_response(resp: &FetchResponse) -> Self {
        let body = if resp.is_binary() {
            None
        } else {
            Some(String::from_utf8_lossy(&resp.body).into_owned())
        };
        Self {
            status_code: resp.status,
            content_type: resp.content_type.clone(),
            final_url: resp.final_url.clone(),
            bytes: resp.body.len(),
            sha256: crate::checksum::sha256_hex(&resp.body),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ItemOutcome {
    Pending,
    Success(SuccessPayload),
    Error { kind: ErrorKind, message: String },
}

impl ItemOutcome {
    pub fn error(err: &ServiceError) -> Self {
        ItemOutcome::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, ItemOutcome::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }
}

/// Item as stored on the job: URL plus its effective settings.
#[derive(Debug, Clone)]
pub struct JobItem {
    pub url: String,
    pub settings: RequestSettings,
    pub outcome: ItemOutcome,
}

/// Full job record owned by the [`JobStore`](super::JobStore).
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub items: Vec<JobItem>,
    pub processed: usize,
    pub webhook: Option<WebhookSpec>,
    pub created_at: i64,
    pub completed_at: Option<i64>,
}

impl Job {
    /// New queued job; item settings are resolved against `common` here.
    pub fn new(
        items: Vec<JobItemRequest>,
        common: &RequestSettings,
        webhook: Option<WebhookSpec>,
    ) -> Self {
        let items = items
            .into_iter()
            .map(|item| JobItem {
                settings: item.settings.merged_over(common),
                url: item.url,
                outcome: ItemOutcome::Pending,
            })
            .collect();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Queued,
            items,
            processed: 0,
            webhook,
            created_at: unix_millis(),
            completed_at: None,
        }
    }

    pub fn total(&self) -> usize {
        self.items.len()
    }

    pub fn view(&self) -> JobView {
        JobView {
            job_id: self.id.clone(),
            status: self.status,
            total: self.total(),
            processed: self.processed,
            results: self
                .items
                .iter()
                .enumerate()
                .map(|(index, item)| ItemResult {
                    index,
                    url: item.url.clone(),
                    outcome: item.outcome.clone(),
                })
                .collect(),
            created_at: self.created_at,
            completed_at: self.completed_at,
        }
    }
}

/// One entry of `results`, aligned with the submission order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub index: usize,
    pub url: String,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

/// Status response for a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobView {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub results: Vec<ItemResult>,
    pub created_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

impl JobView {
    pub fn error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ItemOutcome::Error { .. }))
            .count()
    }
}

/// Summary row for listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_id: JobId,
    pub status: JobStatus,
    pub total: usize,
    pub processed: usize,
    pub created_at: i64,
}

/// Current time as Unix milliseconds.
pub(crate) fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_status_rule() {
        assert_eq!(JobStatus::from_outcomes(3, 3), JobStatus::Succeeded);
        assert_eq!(JobStatus::from_outcomes(0, 3), JobStatus::Failed);
        assert_eq!(JobStatus::from_outcomes(2, 3), JobStatus::Partial);
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Partial.is_terminal());
    }

    #[test]
    fn item_settings_override_common() {
        let common = RequestSettings {
            mode: Some(Engine::Browser),
            timeout_secs: Some(30),
            headers: [("Accept".to_string(), "text/html".to_string())].into(),
            fingerprint: None,
        };
        let item = RequestSettings {
            timeout_secs: Some(5),
            headers: [("accept".to_string(), "application/json".to_string())].into(),
            ..Default::default()
        };
        let merged = item.merged_over(&common);
        assert_eq!(merged.mode, Some(Engine::Browser));
        assert_eq!(merged.timeout_secs, Some(5));
        assert_eq!(merged.headers.len(), 1);
        assert_eq!(merged.headers.get("accept").map(String::as_str), Some("application/json"));
    }

    #[test]
    fn item_request_parses_flat_json() {
        let item: JobItemRequest =
            serde_json::from_str(r#"{"url":"https://example.com","mode":"playwright","timeoutSecs":12}"#)
                .unwrap();
        assert_eq!(item.settings.engine(), Engine::Browser);
        assert_eq!(item.settings.timeout_secs, Some(12));
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let err = ItemOutcome::error(&ServiceError::FetchTimeout(3));
        let json = serde_json::to_value(ItemResult {
            index: 1,
            url: "https://example.com".into(),
            outcome: err,
        })
        .unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "fetch_timeout");
        assert_eq!(json["index"], 1);
    }

    #[test]
    fn new_job_is_queued_with_pending_results() {
        let job = Job::new(
            vec![JobItemRequest::new("https://a.example"), JobItemRequest::new("https://b.example")],
            &RequestSettings::default(),
            None,
        );
        let view = job.view();
        assert_eq!(view.status, JobStatus::Queued);
        assert_eq!(view.total, 2);
        assert_eq!(view.processed, 0);
        assert!(view.results.iter().all(|r| r.outcome.is_pending()));
        assert!(uuid::Uuid::parse_str(&view.job_id).is_ok());
    }

    #[test]
    fn batch_request_parses_camel_case_envelope() {
        let raw = r#"{
            "items": [{"url": "https://a.example"}, {"url": "https://b.example", "mode": "http"}],
            "commonSettings": {"timeoutSecs": 9, "headers": {"Accept": "text/html"}},
            "webhook": {"url": "https://hooks.example/cb", "headers": {"X-Token": "t"}}
        }"#;
        let batch: BatchRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(batch.items.len(), 2);
        assert_eq!(batch.common_settings.timeout_secs, Some(9));
        assert_eq!(batch.webhook.unwrap().headers.get("X-Token").map(String::as_str), Some("t"));

        let bare: BatchRequest = serde_json::from_str(r#"{"items": []}"#).unwrap();
        assert!(bare.webhook.is_none());
        assert_eq!(bare.common_settings, RequestSettings::default());
    }
}
