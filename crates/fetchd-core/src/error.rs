//! Error taxonomy shared by the single-request and batch paths.
//!
//! SSRF and admission failures are raised before any resource is consumed.
//! Fetch failures inside a batch are captured into the item outcome instead of
//! being returned; webhook failures never leave the dispatcher.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which concurrency pool rejected an admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Global,
    Browser,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Global => "global",
            Tier::Browser => "browser",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a tier refused new work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BusyReason {
    #[serde(rename = "queue disabled")]
    QueueDisabled,
    #[serde(rename = "queue full")]
    QueueFull,
}

impl BusyReason {
    pub fn as_str(self) -> &'static str {
        match self {
            BusyReason::QueueDisabled => "queue disabled",
            BusyReason::QueueFull => "queue full",
        }
    }
}

impl fmt::Display for BusyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable, serializable classification of a [`ServiceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    BlockedAddress,
    DnsResolutionFailed,
    ServiceBusy,
    Cancelled,
    FetchTimeout,
    FetchError,
    HttpStatus,
    NotFound,
    ShuttingDown,
    EmptyBatch,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("blocked address {addr} for host {host}")]
    BlockedAddress { host: String, addr: std::net::IpAddr },

    #[error("dns resolution failed for {host}: {message}")]
    DnsResolutionFailed { host: String, message: String },

    #[error("service busy: {tier} {reason}")]
    ServiceBusy { tier: Tier, reason: BusyReason },

    #[error("request cancelled")]
    Cancelled,

    #[error("fetch timed out after {0}s")]
    FetchTimeout(u64),

    #[error("fetch failed: {0}")]
    FetchError(String),

    #[error("job {0} not found")]
    NotFound(String),

    #[error("server is shutting down")]
    ShuttingDown,

    #[error("batch must contain at least one item")]
    EmptyBatch,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidUrl(_) => ErrorKind::InvalidUrl,
            ServiceError::BlockedAddress { .. } => ErrorKind::BlockedAddress,
            ServiceError::DnsResolutionFailed { .. } => ErrorKind::DnsResolutionFailed,
            ServiceError::ServiceBusy { .. } => ErrorKind::ServiceBusy,
            ServiceError::Cancelled => ErrorKind::Cancelled,
            ServiceError::FetchTimeout(_) => ErrorKind::FetchTimeout,
            ServiceError::FetchError(_) => ErrorKind::FetchError,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::ShuttingDown => ErrorKind::ShuttingDown,
            ServiceError::EmptyBatch => ErrorKind::EmptyBatch,
        }
    }

    /// Status code a request boundary should answer with for this error.
    pub fn http_status(&self) -> u16 {
        match self {
            ServiceError::InvalidUrl(_) | ServiceError::EmptyBatch => 400,
            ServiceError::BlockedAddress { .. } => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Cancelled => 499,
            ServiceError::DnsResolutionFailed { .. } | ServiceError::FetchError(_) => 502,
            ServiceError::ServiceBusy { .. } | ServiceError::ShuttingDown => 503,
            ServiceError::FetchTimeout(_) => 504,
        }
    }

    /// True for admission rejections (busy or shutting down) as opposed to fetch failures.
    pub fn is_backpressure(&self) -> bool {
        matches!(
            self,
            ServiceError::ServiceBusy { .. } | ServiceError::ShuttingDown
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_message_names_tier_and_reason() {
        let e = ServiceError::ServiceBusy {
            tier: Tier::Browser,
            reason: BusyReason::QueueDisabled,
        };
        assert_eq!(e.to_string(), "service busy: browser queue disabled");
        assert_eq!(e.http_status(), 503);
        assert!(e.is_backpressure());
    }

    #[test]
    fn status_codes_separate_busy_blocked_and_fetch_failures() {
        let blocked = ServiceError::BlockedAddress {
            host: "internal".into(),
            addr: "10.0.0.1".parse().unwrap(),
        };
        assert_eq!(blocked.http_status(), 403);
        assert_eq!(ServiceError::FetchError("reset".into()).http_status(), 502);
        assert_eq!(ServiceError::FetchTimeout(5).http_status(), 504);
        assert!(!blocked.is_backpressure());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::DnsResolutionFailed).unwrap();
        assert_eq!(json, "\"dns_resolution_failed\"");
        let reason = serde_json::to_string(&BusyReason::QueueFull).unwrap();
        assert_eq!(reason, "\"queue full\"");
    }
}
