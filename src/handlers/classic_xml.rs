//! Classic XML API handler.
//!
//! Speaks the older XML dialect: XML request and response bodies, an Accept
//! header weighting XML above JSON, Basic credential auth, and
//! `multipart/form-data` on recognized upload paths. `DELETE` responses are
//! body-less; success is determined from the status class alone.

use reqwest::Method;
use serde_json::Value;

use crate::config::Environment;
use crate::encoding::{self, EncodedBody, WireFormat};
use crate::error::ClientError;

use super::{base_url, xml_root_for_path, ApiHandler, AuthMethod, ContentTypeOverrides};

/// Path prefixes served by the vendor's file-upload surface; bodies for these
/// are sent as multipart/form-data rather than XML.
const UPLOAD_PATH_PREFIXES: &[&str] = &["/fileuploads"];

const XML_CONTENT_TYPE: &str = "application/xml";

pub struct ClassicXmlHandler {
    base: String,
    overrides: ContentTypeOverrides,
}

impl ClassicXmlHandler {
    pub fn new(environment: &Environment) -> Self {
        Self {
            base: base_url(environment),
            overrides: ContentTypeOverrides::new(),
        }
    }

    /// Replace the per-endpoint content-type override table.
    pub fn with_overrides(mut self, overrides: ContentTypeOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    fn is_upload_path(path: &str) -> bool {
        UPLOAD_PATH_PREFIXES
            .iter()
            .any(|prefix| path.starts_with(prefix))
    }
}

impl ApiHandler for ClassicXmlHandler {
    fn resource_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn auth_endpoint(&self) -> String {
        format!("{}/auth/token", self.base)
    }

    fn accept_header(&self) -> String {
        "application/xml;q=1.0,text/xml;q=0.9,application/json;q=0.8,\
         text/html;q=0.5,text/plain;q=0.4,*/*;q=0.1"
            .to_string()
    }

    fn content_type_header(&self, path: &str) -> Option<String> {
        if let Some(override_value) = self.overrides.lookup(path) {
            return override_value.clone();
        }
        if Self::is_upload_path(path) {
            // The multipart encoder supplies its own boundary-bearing value.
            return None;
        }
        Some(XML_CONTENT_TYPE.to_string())
    }

    fn marshal_request(
        &self,
        body: Option<&Value>,
        _method: &Method,
        path: &str,
    ) -> Result<Option<EncodedBody>, ClientError> {
        let Some(value) = body else {
            return Ok(None);
        };

        if Self::is_upload_path(path) {
            let fields = value.as_object().ok_or_else(|| {
                ClientError::Parse("multipart upload body must be an object of fields".to_string())
            })?;
            return encoding::multipart_form(fields).map(Some);
        }

        let bytes = encoding::marshal_xml(xml_root_for_path(path), value)?;
        Ok(Some(EncodedBody {
            bytes,
            content_type: XML_CONTENT_TYPE.to_string(),
        }))
    }

    fn response_format(&self, _path: &str) -> WireFormat {
        WireFormat::Xml
    }

    fn auth_method(&self) -> AuthMethod {
        AuthMethod::BasicCredentials
    }

    fn user_agent(&self) -> String {
        format!(
            "manifold-http/{} (classic-xml)",
            env!("CARGO_PKG_VERSION")
        )
    }
}
