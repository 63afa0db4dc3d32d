//! Single-attempt error type for retry classification.

use std::fmt;
use std::time::Duration;

use crate::error::ServiceError;

/// Failure of one webhook delivery attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// The receiver answered with a non-2xx status.
    Http {
        status: u32,
        retry_after: Option<Duration>,
    },
    /// Destination refused before sending (SSRF guard, DNS). Not retried.
    Rejected(ServiceError),
    /// Blocking task did not complete.
    Join(String),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Curl(e) => write!(f, "{}", e),
            AttemptError::Http { status, .. } => write!(f, "receiver responded {}", status),
            AttemptError::Rejected(e) => write!(f, "rejected: {}", e),
            AttemptError::Join(msg) => write!(f, "task join: {}", msg),
        }
    }
}

impl std::error::Error for AttemptError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AttemptError::Curl(e) => Some(e),
            AttemptError::Rejected(e) => Some(e),
            AttemptError::Http { .. } | AttemptError::Join(_) => None,
        }
    }
}
