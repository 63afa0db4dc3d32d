//! Best-effort job completion callbacks.
//!
//! A terminal job's summary is POSTed to the client's callback URL. The URL
//! goes through the SSRF guard before every attempt, each attempt has its own
//! timeout, and a small retry budget applies. Failures are logged and
//! reported back to the caller as a [`DeliveryReport`]; they never touch the
//! job itself.

mod payload;

pub use payload::WebhookPayload;

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

use crate::config::WebhookConfig;
use crate::fetcher::http::{has_header, header_list, user_agent};
use crate::fetcher::parse::parse_headers;
use crate::jobs::{JobView, WebhookSpec};
use crate::retry::{parse_retry_after, run_with_retry, AttemptError, RetryPolicy};
use crate::ssrf::{ResolvedUrl, SsrfGuard};

/// Outcome of one `notify` call, for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempts: u32,
    pub delivered: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookDispatcher {
    guard: SsrfGuard,
    timeout: Duration,
    policy: RetryPolicy,
}

impl WebhookDispatcher {
    pub fn new(guard: SsrfGuard, cfg: &WebhookConfig) -> Self {
        Self {
            guard,
            timeout: Duration::from_secs(cfg.timeout_secs.max(1)),
            policy: RetryPolicy::from_config(&cfg.retry),
        }
    }

    /// Headers sent with every delivery: the client's, plus our content type
    /// (replacing any client value) and a default user agent.
    fn delivery_headers(spec: &WebhookSpec) -> HashMap<String, String> {
        let mut headers: HashMap<String, String> = spec
            .headers
            .iter()
            .filter(|(k, _)| !k.trim().eq_ignore_ascii_case("content-type"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if !has_header(&headers, "user-agent") {
            headers.insert("User-Agent".to_string(), user_agent());
        }
        headers
    }

    /// Deliver `view` to `spec.url`. Never fails from the caller's point of view.
    pub async fn notify(&self, spec: &WebhookSpec, view: &JobView) -> DeliveryReport {
        let payload = WebhookPayload::from(view);
        let body = match serde_json::to_vec(&payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(job_id = %view.job_id, "webhook payload serialization: {}", e);
                return DeliveryReport {
                    attempts: 0,
                    delivered: false,
                    last_error: Some(e.to_string()),
                };
            }
        };
        let headers = Self::delivery_headers(spec);

        let (result, attempts) = run_with_retry(&self.policy, |attempt| {
            let body = body.clone();
            let headers = headers.clone();
            async move {
                let target = self
                    .guard
                    .validate(&spec.url)
                    .await
                    .map_err(AttemptError::Rejected)?;
                tracing::debug!(job_id = %view.job_id, attempt, url = %target.url, "webhook attempt");
                let timeout = self.timeout;
                tokio::task::spawn_blocking(move || post_once(&target, &headers, &body, timeout))
                    .await
                    .map_err(|e| AttemptError::Join(e.to_string()))?
            }
        })
        .await;

        match result {
            Ok(status) => {
                tracing::info!(job_id = %view.job_id, status, attempts, "webhook delivered");
                DeliveryReport {
                    attempts,
                    delivered: true,
                    last_error: None,
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %view.job_id, attempts, "webhook delivery failed: {}", e);
                DeliveryReport {
                    attempts,
                    delivered: false,
                    last_error: Some(e.to_string()),
                }
            }
        }
    }
}

/// Announces a job's terminal state to its callback.
#[async_trait]
pub trait JobNotifier: Send + Sync {
    async fn notify(&self, spec: &WebhookSpec, view: &JobView) -> DeliveryReport;
}

#[async_trait]
impl JobNotifier for WebhookDispatcher {
    async fn notify(&self, spec: &WebhookSpec, view: &JobView) -> DeliveryReport {
        WebhookDispatcher::notify(self, spec, view).await
    }
}

/// One POST. Runs in the current thread; call from `spawn_blocking`.
fn post_once(
    target: &ResolvedUrl,
    headers: &HashMap<String, String>,
    body: &[u8],
    timeout: Duration,
) -> Result<u32, AttemptError> {
    let mut easy = curl::easy::Easy::new();
    easy.url(target.as_str()).map_err(AttemptError::Curl)?;
    easy.follow_location(false).map_err(AttemptError::Curl)?;
    easy.connect_timeout(timeout).map_err(AttemptError::Curl)?;
    easy.timeout(timeout).map_err(AttemptError::Curl)?;
    if let Some(entry) = target.pinned_resolve_entry() {
        let mut resolve = curl::easy::List::new();
        resolve.append(&entry).map_err(AttemptError::Curl)?;
        easy.resolve(resolve).map_err(AttemptError::Curl)?;
    }
    let mut list = header_list(headers).map_err(AttemptError::Curl)?;
    // No `Expect: 100-continue` round trip for larger payloads.
    list.append("Expect:").map_err(AttemptError::Curl)?;
    easy.http_headers(list).map_err(AttemptError::Curl)?;
    easy.post(true).map_err(AttemptError::Curl)?;
    easy.post_fields_copy(body).map_err(AttemptError::Curl)?;

    let mut header_lines: Vec<String> = Vec::new();
    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = std::str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(AttemptError::Curl)?;
        // Response body is not interesting; drain it.
        transfer
            .write_function(|data| Ok(data.len()))
            .map_err(AttemptError::Curl)?;
        transfer.perform().map_err(AttemptError::Curl)?;
    }

    let code = easy.response_code().map_err(AttemptError::Curl)?;
    if !(200..300).contains(&code) {
        let retry_after = parse_headers(&header_lines)
            .retry_after
            .as_deref()
            .and_then(parse_retry_after);
        return Err(AttemptError::Http {
            status: code,
            retry_after,
        });
    }
    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use crate::jobs::JobStatus;
    use crate::ssrf::StaticResolver;
    use std::sync::Arc;

    fn view() -> JobView {
        JobView {
            job_id: "job-1".into(),
            status: JobStatus::Failed,
            total: 1,
            processed: 1,
            results: Vec::new(),
            created_at: 0,
            completed_at: Some(1),
        }
    }

    #[test]
    fn content_type_is_forced_and_client_headers_kept() {
        let spec = WebhookSpec {
            url: "https://hooks.example/cb".into(),
            headers: [
                ("content-type".to_string(), "text/plain".to_string()),
                ("X-Token".to_string(), "abc".to_string()),
            ]
            .into(),
        };
        let headers = WebhookDispatcher::delivery_headers(&spec);
        assert_eq!(headers.get("Content-Type").map(String::as_str), Some("application/json"));
        assert!(!headers.contains_key("content-type"));
        assert_eq!(headers.get("X-Token").map(String::as_str), Some("abc"));
        assert!(headers.get("User-Agent").unwrap().starts_with("fetchd/"));
    }

    #[tokio::test]
    async fn private_callback_is_rejected_without_retry() {
        let resolver = StaticResolver::new().with_host("hooks.internal", &["10.0.0.8"]);
        let guard = SsrfGuard::with_resolver(Arc::new(resolver), false);
        let cfg = WebhookConfig {
            timeout_secs: 1,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_secs: 0.01,
                max_delay_secs: 1,
            },
        };
        let dispatcher = WebhookDispatcher::new(guard, &cfg);
        let spec = WebhookSpec {
            url: "http://hooks.internal/done".into(),
            headers: HashMap::new(),
        };
        let report = dispatcher.notify(&spec, &view()).await;
        assert!(!report.delivered);
        assert_eq!(report.attempts, 1);
        assert!(report.last_error.unwrap().contains("blocked"));
    }

    #[test]
    fn payload_carries_counts() {
        let json = serde_json::to_value(WebhookPayload::from(&view())).unwrap();
        assert_eq!(json["jobId"], "job-1");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["total"], 1);
        assert_eq!(json["processed"], 1);
        assert!(json.get("createdAt").is_none());
    }
}
