//! `fetchd fetch` – retrieve one URL through the single-request path.

use anyhow::{Context, Result};
use fetchd_core::config::FetchdConfig;
use fetchd_core::fetcher::Engine;
use fetchd_core::jobs::RequestSettings;
use fetchd_core::Service;
use std::io::Write;
use std::path::Path;

/// Split a `Name: value` header argument.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header '{}' must look like 'Name: value'", raw))?;
    let name = name.trim();
    if name.is_empty() {
        anyhow::bail!("header '{}' has an empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

pub async fn run_fetch(
    cfg: FetchdConfig,
    url: &str,
    engine: Engine,
    timeout: Option<u64>,
    headers: &[String],
    output: Option<&Path>,
) -> Result<()> {
    let mut settings = RequestSettings {
        mode: Some(engine),
        timeout_secs: timeout,
        ..Default::default()
    };
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        settings.headers.insert(name, value);
    }

    let service = Service::from_config(cfg);
    let resp = match service.fetch_one(url, &settings).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::warn!(url, kind = ?e.kind(), "fetch rejected or failed: {}", e);
            let status = e.http_status();
            return Err(e).with_context(|| format!("fetch {} (would answer {})", url, status));
        }
    };

    eprintln!(
        "{} {} ({} bytes, {})",
        resp.status,
        resp.final_url,
        resp.body.len(),
        resp.content_type.as_deref().unwrap_or("no content type")
    );
    match output {
        Some(path) => {
            std::fs::write(path, &resp.body)
                .with_context(|| format!("write body to {}", path.display()))?;
        }
        None if resp.is_binary() => {
            eprintln!(
                "binary body not printed; sha256 {}",
                fetchd_core::checksum::sha256_hex(&resp.body)
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&resp.body)?;
            stdout.flush()?;
        }
    }

    if !resp.is_success() {
        anyhow::bail!("upstream responded with status {}", resp.status);
    }
    Ok(())
}
