//! `fetchd batch` – submit a batch job, poll it to completion, print the result.
//!
//! Ctrl-C cancels the job and runs the bounded shutdown drain; a hard-exit
//! timer backs the drain up in case something hangs.

use anyhow::{Context, Result};
use fetchd_core::config::FetchdConfig;
use fetchd_core::jobs::{BatchRequest, JobItemRequest, JobStatus, JobView, RequestSettings, WebhookSpec};
use fetchd_core::Service;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Extra time after the drain bounds before the process is killed outright.
const HARD_EXIT_GRACE: Duration = Duration::from_secs(5);

#[derive(Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Request(BatchRequest),
    Items(Vec<ItemEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ItemEntry {
    Url(String),
    Item(JobItemRequest),
}

pub(crate) fn parse_batch(raw: &str) -> Result<BatchRequest> {
    let file: BatchFile = serde_json::from_str(raw).context("batch file is not a batch request or item list")?;
    Ok(match file {
        BatchFile::Request(req) => req,
        BatchFile::Items(entries) => BatchRequest {
            items: entries
                .into_iter()
                .map(|e| match e {
                    ItemEntry::Url(url) => JobItemRequest::new(url),
                    ItemEntry::Item(item) => item,
                })
                .collect(),
            common_settings: RequestSettings::default(),
            webhook: None,
        },
    })
}

pub async fn run_batch(
    cfg: FetchdConfig,
    path: &Path,
    webhook: Option<String>,
    poll: Duration,
) -> Result<()> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut batch = parse_batch(&raw).with_context(|| format!("parse {}", path.display()))?;
    if let Some(url) = webhook {
        let headers = batch.webhook.take().map(|w| w.headers).unwrap_or_default();
        batch.webhook = Some(WebhookSpec { url, headers });
    }

    let service = Arc::new(Service::from_config(cfg));
    let sweep = service.spawn_retention_sweep();
    let job_id = service.submit_batch(batch)?;
    eprintln!("job {} accepted", job_id);

    let view = tokio::select! {
        view = poll_until_done(&service, &job_id, poll) => view?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("interrupted; cancelling job {} and draining", job_id);
            let _ = service.cancel_job(&job_id);
            arm_hard_exit(service.config().drain_wait() * 2 + HARD_EXIT_GRACE);
            let outcome = service.shutdown().await;
            if !outcome.drained {
                tracing::warn!(remaining = outcome.remaining, "closing with requests still active");
            }
            let view = service.orchestrator().get_job(&job_id)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
            anyhow::bail!("interrupted after {}/{} items", view.processed, view.total);
        }
    };

    service.shutdown().await;
    let _ = sweep.await;
    println!("{}", serde_json::to_string_pretty(&view)?);
    if view.status == JobStatus::Failed {
        anyhow::bail!("all {} items failed", view.total);
    }
    Ok(())
}

async fn poll_until_done(service: &Service, job_id: &str, every: Duration) -> Result<JobView> {
    let mut last_processed = None;
    loop {
        let view = service.job(job_id)?;
        if last_processed != Some(view.processed) {
            eprintln!("  {}/{} processed ({})", view.processed, view.total, view.status.as_str());
            last_processed = Some(view.processed);
        }
        if view.status.is_terminal() {
            return Ok(view);
        }
        tokio::time::sleep(every).await;
    }
}

/// Kill the process after `after` regardless of what the runtime is doing.
fn arm_hard_exit(after: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(after);
        eprintln!("fetchd: drain did not finish in {}s, forcing exit", after.as_secs());
        std::process::exit(130);
    });
}
