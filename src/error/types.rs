//! Core error types.

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors surfaced by the client.
///
/// Local recovery (retry, rate-limit waits, one-shot token refresh) happens
/// inside the request executor; everything that escapes it is one of these
/// variants. Each display string carries enough context (method, endpoint,
/// translated status) to be actionable in logs.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// Mandatory configuration missing or invalid; fatal at construction.
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential refresh failed; never retried by the pipeline.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Connection-level failure; retried on the idempotent path.
    #[error("transport error: {0}")]
    Transport(String),

    /// Per-request or total-retry deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Rate limiting outlasted the retry budget.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// A decoded API error response.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// Method outside GET/PUT/DELETE/HEAD/OPTIONS/POST/PATCH.
    #[error("unsupported HTTP method: {0}")]
    Unsupported(String),

    /// Request marshalling or response unmarshalling failed.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ClientError {
    /// Whether a fresh attempt of the same request could reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout(_) | Self::RateLimited(_) => true,
            Self::Api(api) => matches!(api.status, 408 | 425 | 429 | 500 | 502 | 503 | 504),
            _ => false,
        }
    }
}

/// Shape classification for decoded error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// `{"error": {"code": ..., "message": ...}}`
    Structured,
    /// A generic JSON map with `message`/`detail` keys.
    Generic,
    /// An HTML error page.
    HtmlPage,
    /// Unrecognized bytes.
    Opaque,
    /// The body could not be read at all.
    Transport,
}

/// A uniform record for API error responses, whatever shape the server sent.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status code of the response.
    pub status: u16,
    /// Which decode branch produced this record.
    pub kind: ApiErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Detailed error message, when the body carried one.
    pub detail: Option<String>,
    /// Remaining structured fields from a generic JSON error map.
    pub fields: Option<Map<String, Value>>,
    /// Raw body for unstructured errors, capped at the decoder's read bound.
    pub raw_body: Option<String>,
    /// HTTP method of the failed request, stamped by the executor.
    pub method: Option<String>,
    /// Full URL of the failed request, stamped by the executor.
    pub endpoint: Option<String>,
}

impl ApiError {
    /// An error record carrying nothing but the status code. Used when the
    /// response body cannot be read.
    pub fn status_only(status: u16) -> Self {
        Self {
            status,
            kind: ApiErrorKind::Transport,
            message: "failed to read error response body".to_string(),
            detail: None,
            fields: None,
            raw_body: None,
            method: None,
            endpoint: None,
        }
    }

    /// Attach the request context so the rendered error names what failed.
    pub fn with_context(mut self, method: &reqwest::Method, endpoint: &str) -> Self {
        self.method = Some(method.to_string());
        self.endpoint = Some(endpoint.to_string());
        self
    }

    fn status_text(&self) -> &'static str {
        reqwest::StatusCode::from_u16(self.status)
            .ok()
            .and_then(|s| s.canonical_reason())
            .unwrap_or("Unknown Status")
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let (Some(method), Some(endpoint)) = (&self.method, &self.endpoint) {
            write!(f, "{method} {endpoint}: ")?;
        }
        write!(
            f,
            "API error (kind: {:?}, status: {} {}): {}",
            self.kind,
            self.status,
            self.status_text(),
            self.message
        )
    }
}

impl std::error::Error for ApiError {}
