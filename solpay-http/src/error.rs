//! Status codes of the transaction-request endpoint.
//!
//! | Kind | Status |
//! |---|---|
//! | malformed input | 400 |
//! | not found | 404 |
//! | forbidden | 403 |
//! | upstream | 502 |
//! | internal | 500 |

use http::StatusCode;
use solpay::ErrorKind;

/// Returns the status code reporting a failure of `kind`.
#[must_use]
pub const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::MalformedInput => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Classifies a non-success status returned by an endpoint.
#[must_use]
pub fn kind_for_status(status: StatusCode) -> ErrorKind {
    match status {
        StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => ErrorKind::Forbidden,
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        s if s.is_client_error() => ErrorKind::MalformedInput,
        StatusCode::INTERNAL_SERVER_ERROR => ErrorKind::Internal,
        _ => ErrorKind::Upstream,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for kind in [
            ErrorKind::MalformedInput,
            ErrorKind::NotFound,
            ErrorKind::Forbidden,
            ErrorKind::Upstream,
            ErrorKind::Internal,
        ] {
            assert_eq!(kind_for_status(status_for(kind)), kind);
        }
    }

    #[test]
    fn test_unexpected_statuses() {
        assert_eq!(kind_for_status(StatusCode::METHOD_NOT_ALLOWED), ErrorKind::MalformedInput);
        assert_eq!(kind_for_status(StatusCode::SERVICE_UNAVAILABLE), ErrorKind::Upstream);
    }
}
