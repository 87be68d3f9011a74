//! Vendor API handler strategies.
//!
//! An [`ApiHandler`] injects everything vendor-specific into the request
//! pipeline: endpoint construction, body encoding, header policy and the
//! choice of authentication flow. The pipeline itself never knows which
//! vendor is active. Variants are selected once at construction from
//! [`ApiKind`]; there is no runtime switching.

mod classic_xml;
mod modern_json;

pub use classic_xml::ClassicXmlHandler;
pub use modern_json::ModernJsonHandler;

use reqwest::Method;
use serde_json::Value;

use crate::config::{ApiKind, Environment};
use crate::encoding::{EncodedBody, WireFormat};
use crate::error::ClientError;

/// Which authentication flow a handler's vendor expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    /// OAuth client-credentials exchange producing a bearer token.
    BearerOAuth,
    /// Basic auth derived directly from username/password.
    BasicCredentials,
}

/// Per-vendor request/response strategy.
///
/// Object-safe by design: request bodies arrive as a neutral
/// `serde_json::Value` (serialized once by the client) and response decoding
/// is driven by [`response_format`](Self::response_format) rather than a
/// generic method.
pub trait ApiHandler: Send + Sync {
    /// Full URL for a resource path.
    fn resource_endpoint(&self, path: &str) -> String;

    /// Full URL of the vendor's token endpoint.
    fn auth_endpoint(&self) -> String;

    /// q-weighted `Accept` media-type list.
    fn accept_header(&self) -> String;

    /// `Content-Type` for the path, `None` meaning "do not set". Consults the
    /// per-endpoint override table before the vendor default.
    fn content_type_header(&self, path: &str) -> Option<String>;

    /// Encode a request body for the wire. `None` body means no bytes sent.
    fn marshal_request(
        &self,
        body: Option<&Value>,
        method: &Method,
        path: &str,
    ) -> Result<Option<EncodedBody>, ClientError>;

    /// Format success response bodies are decoded from.
    fn response_format(&self, path: &str) -> WireFormat;

    /// Authentication flow for this vendor.
    fn auth_method(&self) -> AuthMethod;

    /// Statuses that signal an expired credential. 401 always; 403 by opt-in.
    fn auth_expired_statuses(&self) -> &[u16] {
        &[401]
    }

    /// `User-Agent` value stamped on every request.
    fn user_agent(&self) -> String;
}

/// Instantiate the handler for the configured API kind.
pub fn handler_for(environment: &Environment) -> Box<dyn ApiHandler> {
    match environment.api_kind {
        ApiKind::ClassicXml => Box::new(ClassicXmlHandler::new(environment)),
        ApiKind::ModernJson => Box::new(ModernJsonHandler::new(environment)),
    }
}

/// Default domain suffix when no base-domain override is configured.
pub(crate) const DEFAULT_BASE_DOMAIN: &str = "api.example.com";

/// Resolve the base URL for an environment.
///
/// An override starting with a scheme is used verbatim (minus any trailing
/// slash); a bare domain replaces the suffix after the instance name.
pub(crate) fn base_url(environment: &Environment) -> String {
    match environment.override_base_domain.as_deref() {
        Some(override_domain)
            if override_domain.starts_with("http://")
                || override_domain.starts_with("https://") =>
        {
            override_domain.trim_end_matches('/').to_string()
        }
        Some(domain) => format!("https://{}.{}", environment.instance_name, domain),
        None => format!(
            "https://{}.{}",
            environment.instance_name, DEFAULT_BASE_DOMAIN
        ),
    }
}

/// Per-endpoint `Content-Type` override table.
///
/// Lookup is a deterministic longest-prefix match: entries are held sorted by
/// descending prefix length (ties broken lexicographically), so the most
/// specific prefix always wins regardless of insertion order.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeOverrides {
    entries: Vec<(String, Option<String>)>,
}

impl ContentTypeOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an override. `None` means "send no Content-Type" for matching
    /// paths.
    pub fn insert(&mut self, prefix: impl Into<String>, content_type: Option<String>) {
        let prefix = prefix.into();
        self.entries.retain(|(p, _)| *p != prefix);
        self.entries.push((prefix, content_type));
        self.entries
            .sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    }

    /// Longest-prefix lookup. Outer `None` = no override for this path.
    pub fn lookup(&self, path: &str) -> Option<&Option<String>> {
        self.entries
            .iter()
            .find(|(prefix, _)| path.starts_with(prefix.as_str()))
            .map(|(_, content_type)| content_type)
    }
}

/// Root element name for XML request documents: the last path segment that is
/// neither numeric nor the literal `id`.
pub(crate) fn xml_root_for_path(path: &str) -> &str {
    path.split('/')
        .rev()
        .find(|segment| {
            !segment.is_empty() && *segment != "id" && !segment.chars().all(|c| c.is_ascii_digit())
        })
        .unwrap_or("request")
}
