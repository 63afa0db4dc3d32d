//! Retry loop: run an async attempt until success or policy says stop.

use std::future::Future;

use super::classify;
use super::error::AttemptError;
use super::policy::{RetryDecision, RetryPolicy};

/// Runs `f` until it succeeds or the retry policy says to stop, sleeping for
/// the backoff between attempts. Returns the last result and the number of
/// attempts made.
pub async fn run_with_retry<F, Fut, T>(policy: &RetryPolicy, mut f: F) -> (Result<T, AttemptError>, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let mut attempt = 1u32;
    loop {
        match f(attempt).await {
            Ok(v) => return (Ok(v), attempt),
            Err(e) => {
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return (Err(e), attempt),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, delay_ms = d.as_millis() as u64, "retrying after: {}", e);
                        tokio::time::sleep(d).await;
                        attempt += 1;
                    }
                }
            }
        }
    }
}
