//! Fetcher boundary.
//!
//! The core never looks inside an engine: it hands a validated target and
//! options to a [`Fetcher`] and gets a status, a content-type hint, and a body
//! back. The HTTP engine ships here; a browser engine is plugged in by the
//! embedding process.

pub(crate) mod http;
pub(crate) mod parse;

pub use http::HttpFetcher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ServiceError, ServiceResult};
use crate::ssrf::ResolvedUrl;

/// Retrieval engine. `playwright` is the wire name for browser rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Engine {
    #[default]
    #[serde(rename = "http")]
    Http,
    #[serde(rename = "playwright", alias = "browser")]
    Browser,
}

impl Engine {
    pub fn as_str(self) -> &'static str {
        match self {
            Engine::Http => "http",
            Engine::Browser => "playwright",
        }
    }
}

impl std::str::FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Engine::Http),
            "playwright" | "browser" => Ok(Engine::Browser),
            other => Err(format!("unknown engine '{}'", other)),
        }
    }
}

/// Per-request options passed through to the engine.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub engine: Engine,
    pub timeout: Duration,
    pub headers: HashMap<String, String>,
    /// Opaque browser fingerprint; engines that do not understand it ignore it.
    pub fingerprint: Option<serde_json::Value>,
}

impl FetchOptions {
    pub fn new(engine: Engine, timeout: Duration) -> Self {
        Self {
            engine,
            timeout,
            headers: HashMap::new(),
            fingerprint: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u32,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    /// URL of the response after redirects.
    pub final_url: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// True when the content type suggests the body should be streamed as bytes
    /// rather than returned as structured text.
    pub fn is_binary(&self) -> bool {
        let Some(ct) = self.content_type.as_deref() else {
            return std::str::from_utf8(&self.body).is_err();
        };
        let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        !(mime.starts_with("text/")
            || mime.ends_with("+json")
            || mime.ends_with("+xml")
            || matches!(
                mime.as_str(),
                "application/json" | "application/xml" | "application/javascript" | "application/xhtml+xml"
            ))
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Retrieve `target`. Implementations should honor `opts.timeout`; the core
    /// also enforces it from outside.
    async fn fetch(&self, target: &ResolvedUrl, opts: &FetchOptions) -> ServiceResult<FetchResponse>;
}

/// The engines available to the service, selected per request.
#[derive(Clone)]
pub struct Fetchers {
    http: Arc<dyn Fetcher>,
    browser: Option<Arc<dyn Fetcher>>,
}

impl Fetchers {
    pub fn new(http: Arc<dyn Fetcher>) -> Self {
        Self { http, browser: None }
    }

    pub fn with_browser(mut self, browser: Arc<dyn Fetcher>) -> Self {
        self.browser = Some(browser);
        self
    }

    pub fn for_engine(&self, engine: Engine) -> ServiceResult<Arc<dyn Fetcher>> {
        match engine {
            Engine::Http => Ok(Arc::clone(&self.http)),
            Engine::Browser => self
                .browser
                .clone()
                .ok_or_else(|| ServiceError::FetchError("browser engine unavailable".to_string())),
        }
    }
}

/// Run `fetcher` with the request timeout enforced; expiry is `FetchTimeout`.
pub async fn fetch_with_timeout(
    fetcher: &dyn Fetcher,
    target: &ResolvedUrl,
    opts: &FetchOptions,
) -> ServiceResult<FetchResponse> {
    match tokio::time::timeout(opts.timeout, fetcher.fetch(target, opts)).await {
        Ok(res) => res,
        Err(_) => Err(ServiceError::FetchTimeout(opts.timeout.as_secs())),
    }
}
