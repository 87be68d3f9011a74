//! Response decoding.
//!
//! Success bodies decode into the caller's type according to the handler's
//! wire format; error bodies — whatever shape the server sent — degrade
//! gracefully into a uniform [`ApiError`] record. Neither path panics.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::encoding::{self, WireFormat};
use crate::error::{ApiError, ApiErrorKind, ClientError};

/// Largest slice of an error body retained on the [`ApiError`] record.
const MAX_RAW_BODY: usize = 64 * 1024;

/// Decode a success response body.
///
/// `DELETE` responses are treated as body-less regardless of content: success
/// was already determined from the status class, so nothing is parsed and
/// `None` is returned. The same applies to `204 No Content` and empty bodies.
pub fn decode_success<T: DeserializeOwned>(
    method: &Method,
    status: StatusCode,
    format: WireFormat,
    body: &[u8],
) -> Result<Option<T>, ClientError> {
    if *method == Method::DELETE || status == StatusCode::NO_CONTENT || body.is_empty() {
        return Ok(None);
    }
    encoding::unmarshal(format, body).map(Some)
}

/// `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Deserialize)]
struct StructuredErrorBody {
    error: StructuredErrorInner,
}

#[derive(Debug, Deserialize)]
struct StructuredErrorInner {
    #[serde(default)]
    code: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

/// Decode an error response body into a uniform record.
///
/// Decode ladder: structured JSON, then a generic JSON map (extracting
/// `message`/`detail` when present), then HTML, then opaque bytes. Every
/// unparseable shape degrades to `Opaque`.
pub fn decode_error_body(status: StatusCode, content_type: Option<&str>, body: &[u8]) -> ApiError {
    let content_type = content_type.unwrap_or("");
    let raw = || Some(String::from_utf8_lossy(&body[..body.len().min(MAX_RAW_BODY)]).into_owned());

    if content_type.contains("application/json") {
        if let Ok(structured) = serde_json::from_slice::<StructuredErrorBody>(body) {
            if let Some(message) = structured.error.message.filter(|m| !m.is_empty()) {
                return ApiError {
                    status: status.as_u16(),
                    kind: ApiErrorKind::Structured,
                    message,
                    detail: structured.error.code.map(|c| match c {
                        Value::String(s) => s,
                        other => other.to_string(),
                    }),
                    fields: None,
                    raw_body: None,
                    method: None,
                    endpoint: None,
                };
            }
        }
        if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(body) {
            let message = map
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("an error occurred")
                .to_string();
            let detail = map
                .get("detail")
                .and_then(Value::as_str)
                .map(str::to_string);
            return ApiError {
                status: status.as_u16(),
                kind: ApiErrorKind::Generic,
                message,
                detail,
                fields: Some(map),
                raw_body: None,
                method: None,
                endpoint: None,
            };
        }
    } else if content_type.contains("text/html") {
        return ApiError {
            status: status.as_u16(),
            kind: ApiErrorKind::HtmlPage,
            message: "HTML error page received".to_string(),
            detail: None,
            fields: None,
            raw_body: raw(),
            method: None,
            endpoint: None,
        };
    }

    ApiError {
        status: status.as_u16(),
        kind: ApiErrorKind::Opaque,
        message: "non-JSON error response received".to_string(),
        detail: None,
        fields: None,
        raw_body: raw(),
        method: None,
        endpoint: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Thing {
        name: String,
    }

    #[test]
    fn success_json_body_decodes() {
        let decoded: Option<Thing> = decode_success(
            &Method::GET,
            StatusCode::OK,
            WireFormat::Json,
            br#"{"name":"x"}"#,
        )
        .unwrap();
        assert_eq!(decoded.unwrap().name, "x");
    }

    #[test]
    fn delete_skips_body_parsing() {
        // Even a garbage body must not be touched for DELETE.
        let decoded: Option<Thing> = decode_success(
            &Method::DELETE,
            StatusCode::OK,
            WireFormat::Xml,
            b"not xml at all",
        )
        .unwrap();
        assert!(decoded.is_none());
    }

    #[test]
    fn no_content_and_empty_bodies_decode_to_none() {
        let no_content: Option<Thing> =
            decode_success(&Method::GET, StatusCode::NO_CONTENT, WireFormat::Json, b"").unwrap();
        assert!(no_content.is_none());

        let empty: Option<Thing> =
            decode_success(&Method::GET, StatusCode::OK, WireFormat::Json, b"").unwrap();
        assert!(empty.is_none());
    }

    #[test]
    fn structured_error_is_detected() {
        let err = decode_error_body(
            StatusCode::CONFLICT,
            Some("application/json"),
            br#"{"error": {"code": "DUPLICATE", "message": "name already exists"}}"#,
        );
        assert_eq!(err.kind, ApiErrorKind::Structured);
        assert_eq!(err.message, "name already exists");
        assert_eq!(err.detail.as_deref(), Some("DUPLICATE"));
        assert_eq!(err.status, 409);
    }

    #[test]
    fn generic_json_map_extracts_message_and_detail() {
        let err = decode_error_body(
            StatusCode::BAD_REQUEST,
            Some("application/json; charset=utf-8"),
            br#"{"message": "bad field", "detail": "name must be unique", "field": "name"}"#,
        );
        assert_eq!(err.kind, ApiErrorKind::Generic);
        assert_eq!(err.message, "bad field");
        assert_eq!(err.detail.as_deref(), Some("name must be unique"));
        let fields = err.fields.unwrap();
        assert_eq!(fields.get("field").unwrap(), "name");
    }

    #[test]
    fn html_error_page_keeps_raw_body() {
        let err = decode_error_body(
            StatusCode::BAD_GATEWAY,
            Some("text/html"),
            b"<html><body>Bad Gateway</body></html>",
        );
        assert_eq!(err.kind, ApiErrorKind::HtmlPage);
        assert_eq!(err.message, "HTML error page received");
        assert!(err.raw_body.unwrap().contains("Bad Gateway"));
    }

    #[test]
    fn unknown_shapes_degrade_to_opaque() {
        let err = decode_error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("application/octet-stream"),
            b"\x00\x01binary",
        );
        assert_eq!(err.kind, ApiErrorKind::Opaque);
        assert!(err.raw_body.is_some());

        // Malformed JSON under a JSON content type also degrades.
        let err = decode_error_body(
            StatusCode::INTERNAL_SERVER_ERROR,
            Some("application/json"),
            b"{not json",
        );
        assert_eq!(err.kind, ApiErrorKind::Opaque);
    }

    #[test]
    fn missing_content_type_degrades_to_opaque() {
        let err = decode_error_body(StatusCode::IM_A_TEAPOT, None, b"short and stout");
        assert_eq!(err.kind, ApiErrorKind::Opaque);
    }
}
