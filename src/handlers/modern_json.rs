//! Modern JSON API handler.
//!
//! JSON request and response bodies, an Accept header weighting JSON above
//! XML, OAuth client-credentials bearer auth. Bearer tokens can expire
//! mid-session, so this handler also opts 403 into the auth-expired class.
//! `DELETE` responses are body-less.

use reqwest::Method;
use serde_json::Value;

use crate::config::Environment;
use crate::encoding::{self, EncodedBody, WireFormat};
use crate::error::ClientError;

use super::{base_url, ApiHandler, AuthMethod, ContentTypeOverrides};

const JSON_CONTENT_TYPE: &str = "application/json";

pub struct ModernJsonHandler {
    base: String,
    overrides: ContentTypeOverrides,
}

impl ModernJsonHandler {
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
}

impl ApiHandler for ModernJsonHandler {
    fn resource_endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn auth_endpoint(&self) -> String {
        format!("{}/oauth/token", self.base)
    }

    fn accept_header(&self) -> String {
        "application/json;q=1.0,application/xml;q=0.8,text/xml;q=0.7,\
         text/html;q=0.5,text/plain;q=0.4,*/*;q=0.1"
            .to_string()
    }

    fn content_type_header(&self, path: &str) -> Option<String> {
        if let Some(override_value) = self.overrides.lookup(path) {
            return override_value.clone();
        }
        Some(JSON_CONTENT_TYPE.to_string())
    }

    fn marshal_request(
        &self,
        body: Option<&Value>,
        _method: &Method,
        _path: &str,
    ) -> Result<Option<EncodedBody>, ClientError> {
        let Some(value) = body else {
            return Ok(None);
        };
        let bytes = encoding::marshal_json(value)?;
        Ok(Some(EncodedBody {
            bytes,
            content_type: JSON_CONTENT_TYPE.to_string(),
        }))
    }

    fn response_format(&self, _path: &str) -> WireFormat {
        WireFormat::Json
    }

    fn auth_method(&self) -> AuthMethod {
        AuthMethod::BearerOAuth
    }

    fn auth_expired_statuses(&self) -> &[u16] {
        &[401, 403]
    }

    fn user_agent(&self) -> String {
        format!(
            "manifold-http/{} (modern-json)",
            env!("CARGO_PKG_VERSION")
        )
    }
}
