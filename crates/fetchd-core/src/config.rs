use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on how long the shutdown drain may wait, whatever the close timeout.
pub const MAX_DRAIN_WAIT: Duration = Duration::from_secs(10);

/// Default cap on a buffered response body.
pub const DEFAULT_MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Retry policy parameters (used by webhook delivery).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per delivery (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 5,
        }
    }
}

/// Limits for the two admission tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Maximum tasks running concurrently across both engines.
    pub global_max_concurrency: usize,
    /// Maximum tasks waiting for a global slot (0 disables queueing).
    pub global_max_queue: usize,
    /// Maximum browser-engine tasks running concurrently.
    pub browser_max_concurrency: usize,
    /// Maximum tasks waiting for a browser slot (0 disables queueing).
    pub browser_max_queue: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            global_max_concurrency: 16,
            global_max_queue: 256,
            browser_max_concurrency: 4,
            browser_max_queue: 64,
        }
    }
}

/// Webhook delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-attempt timeout in seconds.
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retry: RetryConfig::default(),
        }
    }
}

/// Global configuration loaded from `~/.config/fetchd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchdConfig {
    /// Fetch timeout applied when neither the item nor the batch sets one.
    pub default_timeout_secs: u64,
    /// Permit loopback targets (127/8, ::1). Intended for local development and tests.
    #[serde(default)]
    pub allow_loopback: bool,
    /// Graceful-shutdown close timeout; the drain wait is further capped at 10s.
    pub shutdown_timeout_secs: u64,
    /// How long finished jobs stay queryable before the retention sweep drops them.
    #[serde(default = "default_job_retention_secs")]
    pub job_retention_secs: u64,
    /// Maximum redirects the HTTP fetcher follows (each hop is re-validated).
    #[serde(default = "default_max_redirects")]
    pub max_redirects: u32,
    /// Largest response body the HTTP fetcher buffers; bigger bodies fail the fetch.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Bound on one hostname lookup; a request's own timeout may shorten it.
    #[serde(default = "default_dns_timeout_secs")]
    pub dns_timeout_secs: u64,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

fn default_job_retention_secs() -> u64 {
    3600
}

fn default_max_redirects() -> u32 {
    5
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_dns_timeout_secs() -> u64 {
    5
}

impl Default for FetchdConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: 30,
            allow_loopback: false,
            shutdown_timeout_secs: 30,
            job_retention_secs: default_job_retention_secs(),
            max_redirects: default_max_redirects(),
            max_body_bytes: default_max_body_bytes(),
            dns_timeout_secs: default_dns_timeout_secs(),
            gate: GateConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl FetchdConfig {
    /// How long the shutdown drain waits for in-flight requests.
    pub fn drain_wait(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs).min(MAX_DRAIN_WAIT)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_secs(self.dns_timeout_secs)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.gate.global_max_concurrency == 0 {
            anyhow::bail!("gate.global_max_concurrency must be at least 1");
        }
        if self.gate.browser_max_concurrency == 0 {
            anyhow::bail!("gate.browser_max_concurrency must be at least 1");
        }
        if self.dns_timeout_secs == 0 {
            anyhow::bail!("dns_timeout_secs must be at least 1");
        }
        Ok(())
    }

    /// Apply `FETCHD_*` overrides using `lookup` (normally `std::env::var`).
    /// Unparsable values are ignored with a warning.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(name: &str, raw: Option<String>) -> Option<T> {
            let raw = raw?;
            match raw.trim().parse::<T>() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!(var = name, value = %raw, "ignoring unparsable override");
                    None
                }
            }
        }

        let overrides: [(&str, &mut usize); 4] = [
            (
                "FETCHD_GLOBAL_MAX_CONCURRENCY",
                &mut self.gate.global_max_concurrency,
            ),
            ("FETCHD_GLOBAL_MAX_QUEUE", &mut self.gate.global_max_queue),
            (
                "FETCHD_BROWSER_MAX_CONCURRENCY",
                &mut self.gate.browser_max_concurrency,
            ),
            ("FETCHD_BROWSER_MAX_QUEUE", &mut self.gate.browser_max_queue),
        ];
        for (name, slot) in overrides {
            if let Some(v) = parse::<usize>(name, lookup(name)) {
                *slot = v;
            }
        }
        if let Some(v) = parse::<u64>(
            "FETCHD_SHUTDOWN_TIMEOUT_SECS",
            lookup("FETCHD_SHUTDOWN_TIMEOUT_SECS"),
        ) {
            self.shutdown_timeout_secs = v;
        }
        if let Some(v) = parse::<bool>("FETCHD_ALLOW_LOOPBACK", lookup("FETCHD_ALLOW_LOOPBACK")) {
            self.allow_loopback = v;
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("fetchd")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
/// Environment overrides are applied on top.
pub fn load_or_init() -> Result<FetchdConfig> {
    let path = config_path()?;
    let mut cfg = if !path.exists() {
        let default_cfg = FetchdConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        default_cfg
    } else {
        load_from_path(&path)?
    };
    cfg.apply_overrides(|name| std::env::var(name).ok());
    cfg.validate().context("invalid configuration after FETCHD_* overrides")?;
    Ok(cfg)
}

/// Load configuration from an explicit file (no environment overrides).
pub fn load_from_path(path: &Path) -> Result<FetchdConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let cfg: FetchdConfig =
        toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn default_config_values() {
        let cfg = FetchdConfig::default();
        assert_eq!(cfg.gate.global_max_concurrency, 16);
        assert_eq!(cfg.gate.browser_max_concurrency, 4);
        assert_eq!(cfg.webhook.retry.max_attempts, 3);
        assert!(!cfg.allow_loopback);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = FetchdConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: FetchdConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.gate.global_max_queue, cfg.gate.global_max_queue);
        assert_eq!(parsed.gate.browser_max_queue, cfg.gate.browser_max_queue);
        assert_eq!(parsed.shutdown_timeout_secs, cfg.shutdown_timeout_secs);
    }

    #[test]
    fn config_toml_minimal_uses_section_defaults() {
        let toml = r#"
            default_timeout_secs = 5
            shutdown_timeout_secs = 60
        "#;
        let cfg: FetchdConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.default_timeout_secs, 5);
        assert_eq!(cfg.gate.global_max_concurrency, 16);
        assert_eq!(cfg.job_retention_secs, 3600);
        assert_eq!(cfg.max_redirects, 5);
        assert_eq!(cfg.dns_timeout_secs, 5);
        assert_eq!(cfg.webhook.timeout_secs, 10);
    }

    #[test]
    fn config_toml_gate_and_webhook_sections() {
        let toml = r#"
            default_timeout_secs = 20
            shutdown_timeout_secs = 30
            allow_loopback = true

            [gate]
            global_max_concurrency = 2
            global_max_queue = 1
            browser_max_concurrency = 1
            browser_max_queue = 0

            [webhook]
            timeout_secs = 3

            [webhook.retry]
            max_attempts = 2
            base_delay_secs = 0.1
            max_delay_secs = 1
        "#;
        let cfg: FetchdConfig = toml::from_str(toml).unwrap();
        assert!(cfg.allow_loopback);
        assert_eq!(cfg.gate.global_max_queue, 1);
        assert_eq!(cfg.gate.browser_max_queue, 0);
        assert_eq!(cfg.webhook.timeout_secs, 3);
        assert_eq!(cfg.webhook.retry.max_attempts, 2);
    }

    #[test]
    fn drain_wait_is_capped() {
        let mut cfg = FetchdConfig::default();
        cfg.shutdown_timeout_secs = 300;
        assert_eq!(cfg.drain_wait(), MAX_DRAIN_WAIT);
        cfg.shutdown_timeout_secs = 3;
        assert_eq!(cfg.drain_wait(), Duration::from_secs(3));
    }

    #[test]
    fn env_overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = [
            ("FETCHD_GLOBAL_MAX_CONCURRENCY", "8"),
            ("FETCHD_BROWSER_MAX_QUEUE", "0"),
            ("FETCHD_GLOBAL_MAX_QUEUE", "lots"),
            ("FETCHD_ALLOW_LOOPBACK", "true"),
        ]
        .into_iter()
        .collect();
        let mut cfg = FetchdConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.gate.global_max_concurrency, 8);
        assert_eq!(cfg.gate.browser_max_queue, 0);
        assert_eq!(cfg.gate.global_max_queue, 256);
        assert!(cfg.allow_loopback);
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "default_timeout_secs = 7\nshutdown_timeout_secs = 1\n",
        )
        .unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.default_timeout_secs, 7);
        assert!(load_from_path(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        assert!(FetchdConfig::default().validate().is_ok());

        let mut cfg = FetchdConfig::default();
        cfg.gate.browser_max_concurrency = 0;
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("browser_max_concurrency"));

        let vars: HashMap<&str, &str> = [("FETCHD_GLOBAL_MAX_CONCURRENCY", "0")].into_iter().collect();
        let mut cfg = FetchdConfig::default();
        cfg.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert!(cfg.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "default_timeout_secs = 7\nshutdown_timeout_secs = 1\n\n[gate]\nglobal_max_concurrency = 0\nglobal_max_queue = 1\nbrowser_max_concurrency = 1\nbrowser_max_queue = 1\n",
        )
        .unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("global_max_concurrency"));
    }
}
