use std::time::Duration;

use crate::config::RetryConfig;

/// Why a delivery attempt failed, as far as retrying is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connect or transfer timed out.
    Timeout,
    /// Connection refused or reset, or nothing came back.
    Connection,
    /// 429 or 503, with the receiver's `Retry-After` when it sent one.
    Throttled(Option<Duration>),
    /// Any other 5xx.
    ServerError(u16),
    /// 4xx other than 429: the receiver refused the payload.
    ClientError(u16),
    /// Blocked by the guard, a TLS failure, or anything else that will not
    /// change on a second try.
    Permanent,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    NoRetry,
    RetryAfter(Duration),
}

/// Bounded exponential backoff for webhook deliveries.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap on any single wait, including one a receiver asks for.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &RetryConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            base_delay: Duration::from_secs_f64(cfg.base_delay_secs.max(0.0)),
            max_delay: Duration::from_secs(cfg.max_delay_secs),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = 1u32 << attempt.saturating_sub(1).min(8);
        self.base_delay.saturating_mul(exp).min(self.max_delay)
    }

    /// `attempt` is 1-based. A receiver that asks for a longer pause than
    /// `max_delay` gets no further attempts.
    pub fn decide(&self, attempt: u32, kind: FailureKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }
        match kind {
            FailureKind::ClientError(_) | FailureKind::Permanent => RetryDecision::NoRetry,
            FailureKind::Throttled(Some(asked)) if asked > self.max_delay => RetryDecision::NoRetry,
            FailureKind::Throttled(Some(asked)) => {
                RetryDecision::RetryAfter(asked.max(self.backoff(attempt)))
            }
            FailureKind::Throttled(None)
            | FailureKind::Timeout
            | FailureKind::Connection
            | FailureKind::ServerError(_) => RetryDecision::RetryAfter(self.backoff(attempt)),
        }
    }
}

/// `Retry-After` in delta-seconds form. HTTP-date values are ignored and the
/// normal backoff applies.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
