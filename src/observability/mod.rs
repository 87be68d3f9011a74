//! Logging setup and conveniences.
//!
//! The crate logs through `tracing` throughout; this module turns the
//! configured log level and output format into a subscriber, and provides the
//! structured request-error convenience used by the executor. Installing a
//! subscriber is optional — embedding applications that already have one keep
//! theirs, since initialization is strictly first-wins.

use reqwest::Method;
use tracing_subscriber::EnvFilter;

use crate::config::{ClientOptions, LogFormat};

/// Install a global `tracing` subscriber matching the client options.
///
/// No-op when a subscriber is already set. The returned flag reports whether
/// this call installed one.
pub fn init_logging(options: &ClientOptions) -> bool {
    let filter = EnvFilter::try_new(&options.log_level)
        .unwrap_or_else(|_| EnvFilter::new(crate::config::defaults::LOG_LEVEL));

    match options.log_output_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .is_ok(),
        LogFormat::Console => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .try_init()
            .is_ok(),
    }
}

/// Structured error line with the fields every request failure should carry:
/// an event code, method, URL, status when known, the error itself and a
/// stable status description.
pub fn log_request_error(
    event: &str,
    method: &Method,
    url: &str,
    status: Option<u16>,
    error: &dyn std::fmt::Display,
    description: &str,
) {
    match status {
        Some(status) => tracing::error!(
            target: "manifold::execution",
            event,
            method = %method,
            url,
            status,
            error = %error,
            description,
            "request failed"
        ),
        None => tracing::error!(
            target: "manifold::execution",
            event,
            method = %method,
            url,
            error = %error,
            description,
            "request failed"
        ),
    }
}
