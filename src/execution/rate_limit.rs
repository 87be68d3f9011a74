//! Rate-limit response header parsing.
//!
//! Extracts a server-advised wait duration from `Retry-After`,
//! `X-RateLimit-Remaining` and `X-RateLimit-Reset`. When no usable guidance is
//! present the executor falls back to its backoff policy.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;

/// Margin added to `X-RateLimit-Reset` waits to absorb clock skew between
/// client and server.
const CLOCK_SKEW_BUFFER: Duration = Duration::from_secs(5);

/// Parse rate-limit headers into a wait duration.
///
/// Precedence: integer `Retry-After` seconds, then HTTP-date `Retry-After`,
/// then `X-RateLimit-Remaining: 0` combined with an epoch `X-RateLimit-Reset`.
/// Unparseable values are logged at debug and treated as absent; this function
/// never fails — zero means "no guidance".
pub fn parse_rate_limit_headers(headers: &HeaderMap, now: DateTime<Utc>) -> Duration {
    if let Some(retry_after) = header_str(headers, "Retry-After") {
        if let Ok(seconds) = retry_after.trim().parse::<u64>() {
            return Duration::from_secs(seconds);
        }
        // RFC 1123 HTTP-date, e.g. "Wed, 21 Oct 2015 07:28:00 GMT".
        if let Ok(date) = DateTime::parse_from_rfc2822(retry_after.trim()) {
            let wait = date.with_timezone(&Utc) - now;
            return wait.to_std().unwrap_or(Duration::ZERO);
        }
        tracing::debug!(
            target: "manifold::rate_limit",
            value = retry_after,
            "unable to parse Retry-After header"
        );
    }

    if header_str(headers, "X-RateLimit-Remaining").map(str::trim) == Some("0") {
        if let Some(reset) = header_str(headers, "X-RateLimit-Reset") {
            match reset.trim().parse::<i64>() {
                Ok(epoch) => {
                    let reset_at = Utc.timestamp_opt(epoch, 0).single().unwrap_or(now);
                    let wait = (reset_at - now).to_std().unwrap_or(Duration::ZERO);
                    return wait + CLOCK_SKEW_BUFFER;
                }
                Err(_) => {
                    tracing::debug!(
                        target: "manifold::rate_limit",
                        value = reset,
                        "unable to parse X-RateLimit-Reset header"
                    );
                }
            }
        }
    }

    Duration::ZERO
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
