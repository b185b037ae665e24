//! Maps transport errors and HTTP status codes onto [`ErrorKind`].

use crate::error::{BoxError, ErrorKind, RequestError};
use crate::http_client::HttpError;

/// Classifies the outcome of one HTTP call.
///
/// Rules are applied in order:
///
/// 1. No error: the status code decides. `>= 500` is `Server`, `429` is
///    `RateLimited`, `401`/`403` are `Auth`, any other `>= 400` is `Client`.
///    Everything below 400 (including 3xx) is not an error.
/// 2. An error that already is a [`RequestError`] passes through unchanged.
/// 3. A transport error with an explicit timeout signal is `Timeout`,
///    otherwise `Network`.
/// 4. Anything else is `Timeout` when its text mentions "timeout" or
///    "deadline exceeded", and `Unknown` otherwise.
pub fn classify(error: Option<BoxError>, status: Option<u16>) -> Option<RequestError> {
    let Some(error) = error else {
        return status.and_then(classify_status);
    };

    let error = match error.downcast::<RequestError>() {
        Ok(classified) => return Some(*classified),
        Err(error) => error,
    };

    let (kind, message) = match transport_timeout_signal(error.as_ref()) {
        Some(true) => (ErrorKind::Timeout, format!("request timed out: {error}")),
        Some(false) => (ErrorKind::Network, format!("network error: {error}")),
        None => {
            let text = error.to_string();
            if mentions_timeout(&text) {
                (ErrorKind::Timeout, text)
            } else {
                (ErrorKind::Unknown, text)
            }
        }
    };

    let mut classified = RequestError::new(kind, message).with_cause(error);
    if let Some(status) = status.filter(|status| *status > 0) {
        classified = classified.with_status(status);
    }
    Some(classified)
}

/// Whether the retry policy may try this error again.
pub const fn is_retryable(error: &RequestError) -> bool {
    error.kind().is_retryable()
}

fn classify_status(status: u16) -> Option<RequestError> {
    let kind = match status {
        500.. => ErrorKind::Server,
        429 => ErrorKind::RateLimited,
        401 | 403 => ErrorKind::Auth,
        400..=499 => ErrorKind::Client,
        _ => return None,
    };

    let message = match kind {
        ErrorKind::Server => format!("server error: HTTP {status}"),
        ErrorKind::RateLimited => format!("rate limited: HTTP {status}"),
        ErrorKind::Auth => format!("authentication failed: HTTP {status}"),
        _ => format!("client error: HTTP {status}"),
    };

    Some(RequestError::new(kind, message).with_status(status))
}

/// `Some(is_timeout)` for error types that report timeouts explicitly.
fn transport_timeout_signal(error: &(dyn std::error::Error + Send + Sync + 'static)) -> Option<bool> {
    if let Some(http) = error.downcast_ref::<HttpError>() {
        return Some(http.is_timeout());
    }
    if let Some(reqwest) = error.downcast_ref::<reqwest::Error>() {
        return Some(reqwest.is_timeout());
    }
    if let Some(io) = error.downcast_ref::<std::io::Error>() {
        return Some(io.kind() == std::io::ErrorKind::TimedOut);
    }
    None
}

fn mentions_timeout(text: &str) -> bool {
    let lowered = text.to_ascii_lowercase();
    lowered.contains("timeout") || lowered.contains("deadline exceeded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Interrupted;

    fn kind_for_status(status: u16) -> Option<ErrorKind> {
        classify(None, Some(status)).map(|error| error.kind())
    }

    #[test]
    fn status_codes_map_onto_taxonomy() {
        for status in 100..=599u16 {
            let expected = match status {
                500.. => Some(ErrorKind::Server),
                429 => Some(ErrorKind::RateLimited),
                401 | 403 => Some(ErrorKind::Auth),
                400..=499 => Some(ErrorKind::Client),
                _ => None,
            };
            assert_eq!(kind_for_status(status), expected, "status {status}");
        }
    }

    #[test]
    fn success_and_redirect_statuses_are_not_errors() {
        assert!(classify(None, Some(200)).is_none());
        assert!(classify(None, Some(204)).is_none());
        assert!(classify(None, Some(301)).is_none());
        assert!(classify(None, Some(399)).is_none());
        assert!(classify(None, None).is_none());
    }

    #[test]
    fn status_errors_keep_status_code() {
        let error = classify(None, Some(503)).expect("503 is an error");
        assert_eq!(error.status(), Some(503));
        assert!(error.message().contains("503"));
    }

    #[test]
    fn classified_errors_pass_through_unchanged() {
        let original = RequestError::new(ErrorKind::Auth, "token expired").with_status(401);
        let classified = classify(Some(Box::new(original.clone())), Some(500))
            .expect("error stays an error");

        assert_eq!(classified, original);
    }

    #[test]
    fn transport_timeout_signal_wins_over_text() {
        let timeout = classify(Some(Box::new(HttpError::timeout("slow"))), None)
            .expect("timeout is an error");
        let network = classify(
            Some(Box::new(HttpError::new("timeout in the message only"))),
            None,
        )
        .expect("network is an error");

        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(network.kind(), ErrorKind::Network);
    }

    #[test]
    fn io_errors_are_transport_errors() {
        let timed_out = std::io::Error::new(std::io::ErrorKind::TimedOut, "read");
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connect");

        assert_eq!(
            classify(Some(Box::new(timed_out)), None).map(|e| e.kind()),
            Some(ErrorKind::Timeout)
        );
        assert_eq!(
            classify(Some(Box::new(refused)), None).map(|e| e.kind()),
            Some(ErrorKind::Network)
        );
    }

    #[test]
    fn text_fallback_detects_timeouts() {
        let deadline = classify(Some(Box::new(Interrupted::DeadlineExceeded)), None)
            .expect("deadline is an error");
        let cancelled = classify(Some(Box::new(Interrupted::Cancelled)), None)
            .expect("cancel is an error");
        let opaque = classify(Some("Gateway Timeout from proxy".into()), None)
            .expect("string error is an error");
        let other = classify(Some("malformed payload".into()), None).expect("still an error");

        assert_eq!(deadline.kind(), ErrorKind::Timeout);
        assert_eq!(cancelled.kind(), ErrorKind::Unknown);
        assert_eq!(cancelled.message(), "context canceled");
        assert_eq!(opaque.kind(), ErrorKind::Timeout);
        assert_eq!(other.kind(), ErrorKind::Unknown);
    }

    #[test]
    fn retryable_predicate_follows_kind() {
        for kind in ErrorKind::ALL {
            let error = RequestError::new(kind, "x");
            let expected = matches!(
                kind,
                ErrorKind::Network | ErrorKind::Timeout | ErrorKind::Server | ErrorKind::RateLimited
            );
            assert_eq!(is_retryable(&error), expected, "{kind}");
        }
    }
}
