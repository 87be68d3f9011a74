//! Request header assembly.
//!
//! Populates exactly the four headers the pipeline owns — `Accept`,
//! `Content-Type`, `Authorization`, `User-Agent` — from the request envelope,
//! logs them with the authorization value redacted when sensitive-data hiding
//! is on, and surfaces `Deprecation`/`Sunset` response headers as warnings.

use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT,
};
use reqwest::Method;

use crate::error::ClientError;

use super::RequestEnvelope;

/// Header builder for outgoing requests.
struct RequestHeaderBuilder {
    headers: HeaderMap,
}

impl RequestHeaderBuilder {
    fn new() -> Self {
        Self {
            headers: HeaderMap::new(),
        }
    }

    fn with_accept(mut self, accept: &str) -> Result<Self, ClientError> {
        self.headers.insert(
            ACCEPT,
            HeaderValue::from_str(accept)
                .map_err(|e| ClientError::Config(format!("invalid Accept value: {e}")))?,
        );
        Ok(self)
    }

    /// `None` means the handler asked for no Content-Type at all.
    fn with_content_type(mut self, content_type: Option<&str>) -> Result<Self, ClientError> {
        if let Some(value) = content_type {
            self.headers.insert(
                CONTENT_TYPE,
                HeaderValue::from_str(value)
                    .map_err(|e| ClientError::Config(format!("invalid Content-Type value: {e}")))?,
            );
        }
        Ok(self)
    }

    fn with_authorization(mut self, value: &str) -> Result<Self, ClientError> {
        let mut header = HeaderValue::from_str(value)
            .map_err(|e| ClientError::Config(format!("invalid Authorization value: {e}")))?;
        header.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, header);
        Ok(self)
    }

    fn with_user_agent(mut self, user_agent: &str) -> Result<Self, ClientError> {
        self.headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| ClientError::Config(format!("invalid User-Agent value: {e}")))?,
        );
        Ok(self)
    }

    fn build(self) -> HeaderMap {
        self.headers
    }
}

/// Assemble the header map for a prepared request envelope.
pub(crate) fn assemble(envelope: &RequestEnvelope) -> Result<HeaderMap, ClientError> {
    Ok(RequestHeaderBuilder::new()
        .with_accept(&envelope.accept)?
        .with_content_type(envelope.content_type.as_deref())?
        .with_authorization(&envelope.authorization)?
        .with_user_agent(&envelope.user_agent)?
        .build())
}

/// Log the stamped headers at debug, redacting the authorization value when
/// sensitive-data hiding is enabled.
pub(crate) fn log_request_headers(headers: &HeaderMap, hide_sensitive: bool) {
    for (name, value) in headers {
        let rendered = if name == &AUTHORIZATION && hide_sensitive {
            "[REDACTED]"
        } else {
            value.to_str().unwrap_or("<non-ascii>")
        };
        tracing::debug!(target: "manifold::headers", header = %name, value = rendered, "request header");
    }
}

/// Warn when a response announces endpoint deprecation. Informational only.
pub(crate) fn check_deprecation_headers(headers: &HeaderMap, method: &Method, url: &str) {
    if let Some(deprecation) = headers.get("Deprecation").and_then(|v| v.to_str().ok()) {
        tracing::warn!(
            target: "manifold::headers",
            method = %method,
            url,
            deprecation,
            "endpoint is deprecated"
        );
    }
    if let Some(sunset) = headers.get("Sunset").and_then(|v| v.to_str().ok()) {
        tracing::warn!(
            target: "manifold::headers",
            method = %method,
            url,
            sunset,
            "endpoint has an announced sunset date"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(content_type: Option<&str>) -> RequestEnvelope {
        RequestEnvelope {
            method: Method::GET,
            url: "https://acme.api.example.com/things/1".to_string(),
            path: "/things/1".to_string(),
            body: None,
            content_type: content_type.map(str::to_string),
            accept: "application/json;q=1.0".to_string(),
            authorization: "Bearer tok".to_string(),
            user_agent: "manifold-http/test".to_string(),
        }
    }

    #[test]
    fn assembles_exactly_the_owned_headers() {
        let headers = assemble(&envelope(Some("application/json"))).unwrap();
        assert_eq!(headers.len(), 4);
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json;q=1.0");
        assert_eq!(headers.get(CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer tok");
        assert_eq!(headers.get(USER_AGENT).unwrap(), "manifold-http/test");
    }

    #[test]
    fn omits_content_type_when_handler_declines() {
        let headers = assemble(&envelope(None)).unwrap();
        assert_eq!(headers.len(), 3);
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn authorization_is_marked_sensitive() {
        let headers = assemble(&envelope(None)).unwrap();
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());
    }
}
