//! `fetchd check` – SSRF verdict for a URL without fetching it.

use anyhow::Result;
use fetchd_core::config::FetchdConfig;
use fetchd_core::ssrf::SsrfGuard;

pub async fn run_check(cfg: &FetchdConfig, url: &str) -> Result<()> {
    let guard = SsrfGuard::new(cfg.allow_loopback);
    match guard.validate(url).await {
        Ok(resolved) => {
            let addrs: Vec<String> = resolved.addrs.iter().map(|a| a.to_string()).collect();
            println!("allowed  {} -> {}", resolved.host, addrs.join(", "));
            Ok(())
        }
        Err(e) => {
            println!("rejected {} ({:?})", e, e.kind());
            Err(e.into())
        }
    }
}
