//! Wire-format encoding and decoding.
//!
//! Handlers decide *which* format a request or response uses; this module does
//! the byte work. Requests are marshalled from a neutral `serde_json::Value`
//! (the client serializes caller types once, so handler trait objects stay
//! object-safe); responses are decoded straight into the caller's type.

use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::ClientError;

/// Response/request body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Xml,
}

/// A marshalled request body plus the content type it was encoded under.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Encode a value as JSON bytes.
pub fn marshal_json(value: &Value) -> Result<Vec<u8>, ClientError> {
    serde_json::to_vec(value).map_err(|e| ClientError::Parse(format!("JSON marshal failed: {e}")))
}

/// Encode a value as an XML document under the given root element.
///
/// Objects become nested elements, arrays repeat the element name per item,
/// scalars become text content, null becomes an empty element.
pub fn marshal_xml(root: &str, value: &Value) -> Result<Vec<u8>, ClientError> {
    let mut writer = Writer::new(Vec::new());
    write_element(&mut writer, root, value)?;
    Ok(writer.into_inner())
}

fn xml_err<E: std::fmt::Display>(err: E) -> ClientError {
    ClientError::Parse(format!("XML marshal failed: {err}"))
}

fn write_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    value: &Value,
) -> Result<(), ClientError> {
    match value {
        Value::Array(items) => {
            for item in items {
                write_element(writer, name, item)?;
            }
        }
        Value::Object(map) => {
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_err)?;
            for (key, child) in map {
                write_element(writer, key, child)?;
            }
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_err)?;
        }
        Value::Null => {
            writer
                .write_event(Event::Empty(BytesStart::new(name)))
                .map_err(xml_err)?;
        }
        scalar => {
            let text = match scalar {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            writer
                .write_event(Event::Start(BytesStart::new(name)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::Text(BytesText::new(&text)))
                .map_err(xml_err)?;
            writer
                .write_event(Event::End(BytesEnd::new(name)))
                .map_err(xml_err)?;
        }
    }
    Ok(())
}

/// Decode a response body into the caller's type according to the format the
/// active handler declared for the endpoint.
pub fn unmarshal<T: DeserializeOwned>(format: WireFormat, bytes: &[u8]) -> Result<T, ClientError> {
    match format {
        WireFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| ClientError::Parse(format!("JSON unmarshal failed: {e}"))),
        WireFormat::Xml => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| ClientError::Parse(format!("XML body is not valid UTF-8: {e}")))?;
            quick_xml::de::from_str(text)
                .map_err(|e| ClientError::Parse(format!("XML unmarshal failed: {e}")))
        }
    }
}

/// Build a `multipart/form-data` body from an object of fields.
///
/// A field whose value is an object carrying `filename` and `content` keys
/// becomes a file part (content bytes sent as-is, octet-stream); every other
/// field becomes a text part.
pub fn multipart_form(fields: &Map<String, Value>) -> Result<EncodedBody, ClientError> {
    let boundary = format!("manifold-{:016x}", rand::thread_rng().gen::<u64>());
    let mut bytes = Vec::new();

    for (name, value) in fields {
        bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        match value {
            Value::Object(file) if file.contains_key("filename") && file.contains_key("content") => {
                let filename = file
                    .get("filename")
                    .and_then(Value::as_str)
                    .unwrap_or("upload");
                let content = file.get("content").and_then(Value::as_str).unwrap_or("");
                bytes.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                );
                bytes.extend_from_slice(content.as_bytes());
            }
            other => {
                let text = match other {
                    Value::String(s) => s.clone(),
                    v => v.to_string(),
                };
                bytes.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
                bytes.extend_from_slice(text.as_bytes());
            }
        }
        bytes.extend_from_slice(b"\r\n");
    }
    bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    Ok(EncodedBody {
        bytes,
        content_type: format!("multipart/form-data; boundary={boundary}"),
    })
}
