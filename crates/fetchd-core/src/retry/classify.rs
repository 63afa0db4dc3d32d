//! Map a failed delivery attempt to a [`FailureKind`].

use super::error::AttemptError;
use super::policy::FailureKind;

/// Receiver status codes. 408 is a receiver-side timeout and worth repeating.
pub fn classify_status(status: u32, retry_after: Option<std::time::Duration>) -> FailureKind {
    match status {
        429 | 503 => FailureKind::Throttled(retry_after),
        408 => FailureKind::Timeout,
        400..=499 => FailureKind::ClientError(status as u16),
        500..=599 => FailureKind::ServerError(status as u16),
        _ => FailureKind::Permanent,
    }
}

/// Transport failures. TLS and certificate problems are permanent: the
/// receiver is misconfigured, not busy.
pub fn classify_transport(e: &curl::Error) -> FailureKind {
    if e.is_operation_timedout() {
        return FailureKind::Timeout;
    }
    if e.is_couldnt_connect()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
        || e.is_partial_file()
    {
        return FailureKind::Connection;
    }
    FailureKind::Permanent
}

pub fn classify(e: &AttemptError) -> FailureKind {
    match e {
        AttemptError::Curl(ce) => classify_transport(ce),
        AttemptError::Http {
            status,
            retry_after,
        } => classify_status(*status, *retry_after),
        AttemptError::Rejected(_) | AttemptError::Join(_) => FailureKind::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use std::time::Duration;

    #[test]
    fn throttling_carries_retry_after() {
        let e = AttemptError::Http {
            status: 429,
            retry_after: Some(Duration::from_secs(2)),
        };
        assert_eq!(classify(&e), FailureKind::Throttled(Some(Duration::from_secs(2))));
        assert_eq!(classify_status(503, None), FailureKind::Throttled(None));
    }

    #[test]
    fn receiver_statuses() {
        assert_eq!(classify_status(500, None), FailureKind::ServerError(500));
        assert_eq!(classify_status(404, None), FailureKind::ClientError(404));
        assert_eq!(classify_status(408, None), FailureKind::Timeout);
        assert_eq!(classify_status(302, None), FailureKind::Permanent);
    }

    #[test]
    fn curl_transport_errors() {
        // CURLE_COULDNT_CONNECT, CURLE_OPERATION_TIMEDOUT, CURLE_SSL_CONNECT_ERROR
        assert_eq!(classify_transport(&curl::Error::new(7)), FailureKind::Connection);
        assert_eq!(classify_transport(&curl::Error::new(28)), FailureKind::Timeout);
        assert_eq!(classify_transport(&curl::Error::new(35)), FailureKind::Permanent);
    }

    #[test]
    fn guard_rejections_are_final() {
        let e = AttemptError::Rejected(ServiceError::InvalidUrl("x".into()));
        assert_eq!(classify(&e), FailureKind::Permanent);
    }
}
