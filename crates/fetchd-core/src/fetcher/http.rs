//! HTTP engine on libcurl.
//!
//! Transfers run on the blocking pool. Connections are pinned to the addresses
//! the SSRF guard validated, and redirects are followed by hand so every hop
//! goes back through the guard.

use async_trait::async_trait;
use std::collections::HashMap;
use std::str;
use std::time::Duration;

use crate::config::DEFAULT_MAX_BODY_BYTES;
use crate::error::{ServiceError, ServiceResult};
use crate::ssrf::{ResolvedUrl, SsrfGuard};

use super::parse::parse_headers;
use super::{FetchOptions, FetchResponse, Fetcher};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

pub(crate) fn user_agent() -> String {
    format!("fetchd/{}", env!("CARGO_PKG_VERSION"))
}

/// Build a curl header list from a map ("Name: value").
pub(crate) fn header_list(headers: &HashMap<String, String>) -> Result<curl::easy::List, curl::Error> {
    let mut list = curl::easy::List::new();
    for (k, v) in headers {
        list.append(&format!("{}: {}", k.trim(), v.trim()))?;
    }
    Ok(list)
}

pub(crate) fn has_header(headers: &HashMap<String, String>, name: &str) -> bool {
    headers.keys().any(|k| k.trim().eq_ignore_ascii_case(name))
}

pub(crate) fn map_curl_error(e: &curl::Error, timeout: Duration) -> ServiceError {
    if e.is_operation_timedout() {
        ServiceError::FetchTimeout(timeout.as_secs())
    } else {
        ServiceError::FetchError(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    guard: SsrfGuard,
    max_redirects: u32,
    max_body_bytes: usize,
}

struct HopResult {
    status: u32,
    content_type: Option<String>,
    location: Option<String>,
    body: Vec<u8>,
}

impl HttpFetcher {
    pub fn new(guard: SsrfGuard, max_redirects: u32) -> Self {
        Self {
            guard,
            max_redirects,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }

    /// One GET without following redirects. Runs in the current thread.
    fn get_once(
        target: &ResolvedUrl,
        opts: &FetchOptions,
        max_body_bytes: usize,
    ) -> ServiceResult<HopResult> {
        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        let timeout = opts.timeout;
        let curl_err = |e: curl::Error| map_curl_error(&e, timeout);

        let mut easy = curl::easy::Easy::new();
        easy.url(target.as_str()).map_err(curl_err)?;
        easy.follow_location(false).map_err(curl_err)?;
        easy.connect_timeout(CONNECT_TIMEOUT.min(timeout)).map_err(curl_err)?;
        easy.timeout(timeout).map_err(curl_err)?;
        easy.accept_encoding("").map_err(curl_err)?;
        if !has_header(&opts.headers, "user-agent") {
            easy.useragent(&user_agent()).map_err(curl_err)?;
        }
        if let Some(entry) = target.pinned_resolve_entry() {
            let mut resolve = curl::easy::List::new();
            resolve.append(&entry).map_err(curl_err)?;
            easy.resolve(resolve).map_err(curl_err)?;
        }
        if !opts.headers.is_empty() {
            easy.http_headers(header_list(&opts.headers).map_err(curl_err)?)
                .map_err(curl_err)?;
        }

        let mut too_large = false;
        {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|data| {
                    if let Ok(s) = str::from_utf8(data) {
                        header_lines.push(s.trim_end().to_string());
                    }
                    true
                })
                .map_err(curl_err)?;
            transfer
                .write_function(|data| {
                    if body.len() + data.len() > max_body_bytes {
                        too_large = true;
                        // Returning a short count makes curl abort the transfer.
                        return Ok(0);
                    }
                    body.extend_from_slice(data);
                    Ok(data.len())
                })
                .map_err(curl_err)?;
            if let Err(e) = transfer.perform() {
                drop(transfer);
                if too_large {
                    return Err(ServiceError::FetchError(format!(
                        "response body exceeds {} bytes",
                        max_body_bytes
                    )));
                }
                return Err(curl_err(e));
            }
        }

        let status = easy.response_code().map_err(curl_err)?;
        let headers = parse_headers(&header_lines);
        Ok(HopResult {
            status,
            content_type: headers.content_type,
            location: headers.location,
            body,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, target: &ResolvedUrl, opts: &FetchOptions) -> ServiceResult<FetchResponse> {
        let mut current = target.clone();
        let mut hops = 0u32;
        loop {
            let hop = tokio::task::spawn_blocking({
                let target = current.clone();
                let opts = opts.clone();
                let max = self.max_body_bytes;
                move || Self::get_once(&target, &opts, max)
            })
            .await
            .map_err(|e| ServiceError::FetchError(format!("fetch task join: {}", e)))??;

            let redirect = matches!(hop.status, 301 | 302 | 303 | 307 | 308);
            match (redirect, hop.location.as_deref()) {
                (true, Some(location)) if hops < self.max_redirects => {
                    let next = current.url.join(location).map_err(|e| {
                        ServiceError::FetchError(format!("bad redirect location '{}': {}", location, e))
                    })?;
                    tracing::debug!(from = %current.url, to = %next, "following redirect");
                    current = self
                        .guard
                        .validate_url(next, self.guard.allow_loopback())
                        .await?;
                    hops += 1;
                }
                (true, Some(_)) => {
                    return Err(ServiceError::FetchError(format!(
                        "too many redirects (max {})",
                        self.max_redirects
                    )));
                }
                _ => {
                    return Ok(FetchResponse {
                        status: hop.status,
                        content_type: hop.content_type,
                        body: hop.body,
                        final_url: current.url.to_string(),
                    });
                }
            }
        }
    }
}
