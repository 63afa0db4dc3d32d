//! CLI for the fetchd content retrieval service.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use fetchd_core::config;
use fetchd_core::fetcher::Engine;
use std::path::PathBuf;
use std::time::Duration;

use commands::{run_batch, run_check, run_config, run_fetch};

/// Top-level CLI for fetchd.
#[derive(Debug, Parser)]
#[command(name = "fetchd")]
#[command(about = "fetchd: admission-controlled content retrieval", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Fetch a single URL and print the body.
    Fetch {
        /// HTTP/HTTPS URL to fetch.
        url: String,
        /// Engine to use: http or playwright.
        #[arg(long, default_value = "http")]
        engine: Engine,
        /// Fetch timeout in seconds (defaults to the configured value).
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
        /// Extra request header, repeatable.
        #[arg(short = 'H', long = "header", value_name = "NAME: VALUE")]
        headers: Vec<String>,
        /// Write the body to a file instead of stdout.
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Run a batch job from a JSON file and print its final status.
    Batch {
        /// JSON file: `{items, commonSettings, webhook}` or a plain array of URLs/items.
        path: PathBuf,
        /// Callback URL notified when the job finishes (overrides the file's webhook URL).
        #[arg(long, value_name = "URL")]
        webhook: Option<String>,
        /// Status poll interval in milliseconds.
        #[arg(long, default_value = "250", value_name = "MS")]
        poll_ms: u64,
    },

    /// Show whether a URL passes the SSRF guard and what it resolves to.
    Check {
        url: String,
    },

    /// Print the effective configuration.
    Config,
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Fetch {
                url,
                engine,
                timeout,
                headers,
                output,
            } => run_fetch(cfg, &url, engine, timeout, &headers, output.as_deref()).await?,
            CliCommand::Batch {
                path,
                webhook,
                poll_ms,
            } => run_batch(cfg, &path, webhook, Duration::from_millis(poll_ms.max(10))).await?,
            CliCommand::Check { url } => run_check(&cfg, &url).await?,
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
