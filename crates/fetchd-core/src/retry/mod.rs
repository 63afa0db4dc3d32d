//! Retry budget for webhook deliveries: classify each failed attempt, then
//! back off (honouring `Retry-After`) or give up.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_status, classify_transport};
pub use error::AttemptError;
pub use policy::{parse_retry_after, FailureKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
