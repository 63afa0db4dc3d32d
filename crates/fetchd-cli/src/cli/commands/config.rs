//! `fetchd config` – print the effective configuration.

use anyhow::Result;
use fetchd_core::config::{self, FetchdConfig};

pub fn run_config(cfg: &FetchdConfig) -> Result<()> {
    if let Ok(path) = config::config_path() {
        println!("# {}", path.display());
    }
    println!("{}", serde_json::to_string_pretty(cfg)?);
    println!("# drain wait: {}s", cfg.drain_wait().as_secs());
    Ok(())
}
