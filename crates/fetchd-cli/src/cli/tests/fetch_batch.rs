//! Tests for fetch and batch.

use super::parse;
use crate::cli::{Cli, CliCommand};
use clap::Parser;
use fetchd_core::fetcher::Engine;
use std::path::PathBuf;

#[test]
fn cli_parse_fetch_defaults() {
    match parse(&["fetchd", "fetch", "https://example.com/"]) {
        CliCommand::Fetch {
            url,
            engine,
            timeout,
            headers,
            output,
        } => {
            assert_eq!(url, "https://example.com/");
            assert_eq!(engine, Engine::Http);
            assert!(timeout.is_none());
            assert!(headers.is_empty());
            assert!(output.is_none());
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_with_engine_timeout_and_headers() {
    match parse(&[
        "fetchd",
        "fetch",
        "https://example.com/app",
        "--engine",
        "playwright",
        "--timeout",
        "12",
        "-H",
        "Accept: text/html",
        "--header",
        "X-Trace: 1",
        "-o",
        "/tmp/page.html",
    ]) {
        CliCommand::Fetch {
            engine,
            timeout,
            headers,
            output,
            ..
        } => {
            assert_eq!(engine, Engine::Browser);
            assert_eq!(timeout, Some(12));
            assert_eq!(headers, vec!["Accept: text/html", "X-Trace: 1"]);
            assert_eq!(output, Some(PathBuf::from("/tmp/page.html")));
        }
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_browser_alias() {
    match parse(&["fetchd", "fetch", "https://example.com/", "--engine", "browser"]) {
        CliCommand::Fetch { engine, .. } => assert_eq!(engine, Engine::Browser),
        _ => panic!("expected Fetch"),
    }
}

#[test]
fn cli_parse_fetch_rejects_unknown_engine() {
    assert!(Cli::try_parse_from(["fetchd", "fetch", "https://example.com/", "--engine", "lynx"]).is_err());
}

#[test]
fn cli_parse_batch_defaults() {
    match parse(&["fetchd", "batch", "jobs.json"]) {
        CliCommand::Batch {
            path,
            webhook,
            poll_ms,
        } => {
            assert_eq!(path, PathBuf::from("jobs.json"));
            assert!(webhook.is_none());
            assert_eq!(poll_ms, 250);
        }
        _ => panic!("expected Batch"),
    }
}

#[test]
fn cli_parse_batch_with_webhook() {
    match parse(&[
        "fetchd",
        "batch",
        "jobs.json",
        "--webhook",
        "https://hooks.example/done",
        "--poll-ms",
        "50",
    ]) {
        CliCommand::Batch {
            webhook, poll_ms, ..
        } => {
            assert_eq!(webhook.as_deref(), Some("https://hooks.example/done"));
            assert_eq!(poll_ms, 50);
        }
        _ => panic!("expected Batch"),
    }
}

#[test]
fn cli_parse_batch_requires_path() {
    assert!(Cli::try_parse_from(["fetchd", "batch"]).is_err());
}
