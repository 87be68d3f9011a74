//! Type conversions for `ClientError`
//!
//! Centralizes conversions from common error types so call sites can use `?`.

use super::types::ClientError;

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout(format!("HTTP request timed out: {err}"))
        } else {
            ClientError::Transport(format!("HTTP request failed: {err}"))
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Parse(format!("JSON error: {err}"))
    }
}
