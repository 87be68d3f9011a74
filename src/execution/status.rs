//! HTTP status classification.
//!
//! Maps status codes onto the executor's control-flow classes. The mapping is
//! total and deterministic; every code lands in exactly one class for a given
//! handler policy.

use reqwest::StatusCode;

/// Control-flow class of a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// 2xx.
    Success,
    /// 3xx; treated as success by the executor, with a warning.
    Redirect,
    /// 429; rate-limit headers are consulted before any backoff.
    RateLimited,
    /// Retryable server/transport-adjacent conditions.
    Transient,
    /// Token refresh then a single re-send without consuming an attempt.
    AuthExpired,
    /// Everything else in 4xx/5xx.
    NonRetryable,
}

/// Classify a status code. `auth_expired` is the handler's set of statuses
/// that signal an expired credential (401 always, 403 by handler opt-in).
pub fn classify(status: StatusCode, auth_expired: &[u16]) -> StatusClass {
    let code = status.as_u16();
    if auth_expired.contains(&code) {
        return StatusClass::AuthExpired;
    }
    match code {
        200..=299 => StatusClass::Success,
        300..=399 => StatusClass::Redirect,
        429 => StatusClass::RateLimited,
        408 | 425 | 500 | 502 | 503 | 504 => StatusClass::Transient,
        _ => StatusClass::NonRetryable,
    }
}

/// A short, stable phrase for logs, e.g. `"429 Too Many Requests"`.
pub fn describe(status: StatusCode) -> String {
    match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => format!("{} Unknown Status", status.as_u16()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_AUTH_EXPIRED: &[u16] = &[401];

    #[test]
    fn classification_is_total_over_the_status_range() {
        for code in 100..600 {
            if let Ok(status) = StatusCode::from_u16(code) {
                // Must not panic, and repeated calls agree.
                let a = classify(status, DEFAULT_AUTH_EXPIRED);
                let b = classify(status, DEFAULT_AUTH_EXPIRED);
                assert_eq!(a, b);
            }
        }
    }

    #[test]
    fn success_and_redirect_ranges() {
        assert_eq!(
            classify(StatusCode::OK, DEFAULT_AUTH_EXPIRED),
            StatusClass::Success
        );
        assert_eq!(
            classify(StatusCode::NO_CONTENT, DEFAULT_AUTH_EXPIRED),
            StatusClass::Success
        );
        assert_eq!(
            classify(StatusCode::MOVED_PERMANENTLY, DEFAULT_AUTH_EXPIRED),
            StatusClass::Redirect
        );
    }

    #[test]
    fn transient_codes() {
        for code in [408u16, 425, 500, 502, 503, 504] {
            assert_eq!(
                classify(StatusCode::from_u16(code).unwrap(), DEFAULT_AUTH_EXPIRED),
                StatusClass::Transient,
                "code {code}"
            );
        }
    }

    #[test]
    fn rate_limited_takes_precedence_over_transient() {
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, DEFAULT_AUTH_EXPIRED),
            StatusClass::RateLimited
        );
    }

    #[test]
    fn auth_expired_honors_handler_opt_in() {
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, DEFAULT_AUTH_EXPIRED),
            StatusClass::AuthExpired
        );
        assert_eq!(
            classify(StatusCode::FORBIDDEN, DEFAULT_AUTH_EXPIRED),
            StatusClass::NonRetryable
        );
        assert_eq!(
            classify(StatusCode::FORBIDDEN, &[401, 403]),
            StatusClass::AuthExpired
        );
    }

    #[test]
    fn other_client_errors_are_non_retryable() {
        for code in [400u16, 404, 409, 410, 418, 422, 451] {
            assert_eq!(
                classify(StatusCode::from_u16(code).unwrap(), DEFAULT_AUTH_EXPIRED),
                StatusClass::NonRetryable,
                "code {code}"
            );
        }
    }

    #[test]
    fn describe_produces_stable_phrases() {
        assert_eq!(
            describe(StatusCode::TOO_MANY_REQUESTS),
            "429 Too Many Requests"
        );
        assert_eq!(describe(StatusCode::NOT_FOUND), "404 Not Found");
        assert_eq!(
            describe(StatusCode::SERVICE_UNAVAILABLE),
            "503 Service Unavailable"
        );
    }
}
