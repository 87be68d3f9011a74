//! Client configuration.
//!
//! `ClientConfig` is immutable after construction and is assembled through a
//! builder. Values come from three layers: compiled defaults, an optional JSON
//! file, and environment variables — each layer overriding the one below it.
//! Construction fails when a mandatory field is missing; out-of-range numeric
//! and duration values are coerced back to their defaults.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ClientError;

/// Default client option values, applied when neither file nor environment
/// provides a usable value.
pub mod defaults {
    use std::time::Duration;

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_CONSOLE_SEPARATOR: &str = ",";
    pub const HIDE_SENSITIVE_DATA: bool = true;
    pub const MAX_RETRY_ATTEMPTS: u32 = 3;
    pub const ENABLE_DYNAMIC_RATE_LIMITING: bool = true;
    pub const MAX_CONCURRENT_REQUESTS: usize = 5;
    pub const TOKEN_REFRESH_BUFFER: Duration = Duration::from_secs(5 * 60);
    pub const TOTAL_RETRY_DURATION: Duration = Duration::from_secs(5 * 60);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    pub const FOLLOW_REDIRECTS: bool = false;
}

/// Which vendor API dialect the client speaks. Selected once at construction
/// via `API_TYPE`; there is no runtime switching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKind {
    /// XML request/response bodies, Basic credential auth.
    ClassicXml,
    /// JSON request/response bodies, OAuth bearer auth.
    ModernJson,
}

impl FromStr for ApiKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "classic" | "classicxml" | "classic-xml" | "classic_xml" => Ok(Self::ClassicXml),
            "modern" | "modernjson" | "modern-json" | "modern_json" => Ok(Self::ModernJson),
            other => Err(ClientError::Config(format!(
                "unrecognized API type '{other}' (expected 'classic' or 'modern')"
            ))),
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClassicXml => write!(f, "classic"),
            Self::ModernJson => write!(f, "modern"),
        }
    }
}

/// Log output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Console,
}

impl FromStr for LogFormat {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "console" | "human-readable" | "pretty" => Ok(Self::Console),
            other => Err(ClientError::Config(format!(
                "unrecognized log output format '{other}'"
            ))),
        }
    }
}

/// Credentials for both auth flows. Secrets are wrapped in `SecretString` so
/// accidental `Debug` output never leaks them.
#[derive(Clone)]
pub struct AuthCredentials {
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub client_id: String,
    pub client_secret: SecretString,
}

impl fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Target instance descriptor.
#[derive(Debug, Clone)]
pub struct Environment {
    /// Instance name, used as the host prefix when no base-URL override is set.
    pub instance_name: String,
    /// Base-domain override. A value starting with `http://` or `https://` is
    /// treated as a full base URL (instance name ignored); anything else
    /// replaces the domain suffix after the instance name.
    pub override_base_domain: Option<String>,
    pub api_kind: ApiKind,
}

/// Tunable client behavior.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub log_level: String,
    pub log_output_format: LogFormat,
    pub log_console_separator: String,
    pub hide_sensitive_data: bool,
    pub max_retry_attempts: u32,
    pub enable_dynamic_rate_limiting: bool,
    pub max_concurrent_requests: usize,
    pub follow_redirects: bool,
}

/// Timeout and duration budget settings.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Minimum remaining token lifetime before a proactive refresh.
    pub token_refresh_buffer: Duration,
    /// Wall-clock bound on one call's whole retry loop.
    pub total_retry_duration: Duration,
    /// Per-attempt HTTP timeout.
    pub request_timeout: Duration,
}

/// Immutable client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub auth: AuthCredentials,
    pub environment: Environment,
    pub options: ClientOptions,
    pub timeouts: Timeouts,
}

impl ClientConfig {
    /// Returns a builder seeded with compiled defaults.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::new()
    }

    /// Build entirely from environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::builder().load_env().build()
    }

    /// Build from a JSON file, with environment variables overriding file
    /// values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        Self::builder().load_file(path)?.load_env().build()
    }
}

/// JSON file shape. Durations are Go-style strings ("5m", "10s", "250ms").
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    instance_name: Option<String>,
    override_base_domain: Option<String>,
    api_type: Option<String>,
    log_level: Option<String>,
    log_output_format: Option<String>,
    log_console_separator: Option<String>,
    hide_sensitive_data: Option<bool>,
    max_retry_attempts: Option<i64>,
    enable_dynamic_rate_limiting: Option<bool>,
    max_concurrent_requests: Option<i64>,
    token_refresh_buffer_period: Option<String>,
    total_retry_duration: Option<String>,
    custom_timeout: Option<String>,
    follow_redirects: Option<bool>,
}

/// Builder for [`ClientConfig`].
#[derive(Debug, Default, Clone)]
pub struct ClientConfigBuilder {
    username: Option<String>,
    password: Option<String>,
    client_id: Option<String>,
    client_secret: Option<String>,
    instance_name: Option<String>,
    override_base_domain: Option<String>,
    api_kind: Option<ApiKind>,
    log_level: Option<String>,
    log_output_format: Option<LogFormat>,
    log_console_separator: Option<String>,
    hide_sensitive_data: Option<bool>,
    max_retry_attempts: Option<u32>,
    enable_dynamic_rate_limiting: Option<bool>,
    max_concurrent_requests: Option<usize>,
    token_refresh_buffer: Option<Duration>,
    total_retry_duration: Option<Duration>,
    request_timeout: Option<Duration>,
    follow_redirects: Option<bool>,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn instance_name(mut self, instance_name: impl Into<String>) -> Self {
        self.instance_name = Some(instance_name.into());
        self
    }

    pub fn override_base_domain(mut self, domain: impl Into<String>) -> Self {
        self.override_base_domain = Some(domain.into());
        self
    }

    pub fn api_kind(mut self, kind: ApiKind) -> Self {
        self.api_kind = Some(kind);
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    pub fn log_output_format(mut self, format: LogFormat) -> Self {
        self.log_output_format = Some(format);
        self
    }

    pub fn hide_sensitive_data(mut self, hide: bool) -> Self {
        self.hide_sensitive_data = Some(hide);
        self
    }

    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = Some(attempts);
        self
    }

    pub fn enable_dynamic_rate_limiting(mut self, enable: bool) -> Self {
        self.enable_dynamic_rate_limiting = Some(enable);
        self
    }

    pub fn max_concurrent_requests(mut self, max: usize) -> Self {
        self.max_concurrent_requests = Some(max);
        self
    }

    pub fn token_refresh_buffer(mut self, buffer: Duration) -> Self {
        self.token_refresh_buffer = Some(buffer);
        self
    }

    pub fn total_retry_duration(mut self, total: Duration) -> Self {
        self.total_retry_duration = Some(total);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = Some(follow);
        self
    }

    /// Merge values from a JSON configuration file. Only keys present in the
    /// file override builder state.
    pub fn load_file(mut self, path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let raw = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ClientError::Config(format!(
                "failed to read configuration file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        let file: FileConfig = serde_json::from_str(&raw).map_err(|e| {
            ClientError::Config(format!(
                "failed to parse configuration file {}: {e}",
                path.as_ref().display()
            ))
        })?;

        merge_opt(&mut self.username, file.username);
        merge_opt(&mut self.password, file.password);
        merge_opt(&mut self.client_id, file.client_id);
        merge_opt(&mut self.client_secret, file.client_secret);
        merge_opt(&mut self.instance_name, file.instance_name);
        merge_opt(&mut self.override_base_domain, file.override_base_domain);
        if let Some(kind) = file.api_type {
            self.api_kind = Some(kind.parse()?);
        }
        merge_opt(&mut self.log_level, file.log_level);
        if let Some(format) = file.log_output_format {
            self.log_output_format = Some(format.parse()?);
        }
        merge_opt(&mut self.log_console_separator, file.log_console_separator);
        merge_opt(&mut self.hide_sensitive_data, file.hide_sensitive_data);
        if let Some(attempts) = file.max_retry_attempts {
            self.max_retry_attempts = Some(coerce_non_negative(
                attempts,
                defaults::MAX_RETRY_ATTEMPTS,
                "max_retry_attempts",
            ));
        }
        merge_opt(
            &mut self.enable_dynamic_rate_limiting,
            file.enable_dynamic_rate_limiting,
        );
        if let Some(max) = file.max_concurrent_requests {
            self.max_concurrent_requests = Some(coerce_positive(
                max,
                defaults::MAX_CONCURRENT_REQUESTS,
                "max_concurrent_requests",
            ));
        }
        if let Some(s) = file.token_refresh_buffer_period {
            self.token_refresh_buffer =
                Some(parse_duration_or(&s, defaults::TOKEN_REFRESH_BUFFER));
        }
        if let Some(s) = file.total_retry_duration {
            self.total_retry_duration = Some(parse_duration_or(&s, defaults::TOTAL_RETRY_DURATION));
        }
        if let Some(s) = file.custom_timeout {
            self.request_timeout = Some(parse_duration_or(&s, defaults::REQUEST_TIMEOUT));
        }
        merge_opt(&mut self.follow_redirects, file.follow_redirects);
        Ok(self)
    }

    /// Merge values from environment variables. Only variables that are set
    /// override builder state; malformed values fall back to defaults.
    pub fn load_env(self) -> Self {
        let env: HashMap<String, String> = std::env::vars().collect();
        self.load_env_map(&env)
    }

    /// Testable core of [`load_env`].
    pub(crate) fn load_env_map(mut self, env: &HashMap<String, String>) -> Self {
        let get = |key: &str| env.get(key).map(|v| v.to_string());

        merge_opt(&mut self.username, get("USERNAME"));
        merge_opt(&mut self.password, get("PASSWORD"));
        merge_opt(&mut self.client_id, get("CLIENT_ID"));
        merge_opt(&mut self.client_secret, get("CLIENT_SECRET"));
        merge_opt(&mut self.instance_name, get("INSTANCE_NAME"));
        merge_opt(&mut self.override_base_domain, get("OVERRIDE_BASE_DOMAIN"));
        if let Some(kind) = get("API_TYPE") {
            match kind.parse() {
                Ok(parsed) => self.api_kind = Some(parsed),
                Err(e) => tracing::warn!(target: "manifold::config", error = %e, "ignoring invalid API_TYPE"),
            }
        }
        merge_opt(&mut self.log_level, get("LOG_LEVEL"));
        if let Some(format) = get("LOG_OUTPUT_FORMAT") {
            match format.parse() {
                Ok(parsed) => self.log_output_format = Some(parsed),
                Err(e) => {
                    tracing::warn!(target: "manifold::config", error = %e, "ignoring invalid LOG_OUTPUT_FORMAT");
                }
            }
        }
        merge_opt(&mut self.log_console_separator, get("LOG_CONSOLE_SEPARATOR"));
        if let Some(v) = get("HIDE_SENSITIVE_DATA") {
            self.hide_sensitive_data = Some(parse_bool_or(&v, defaults::HIDE_SENSITIVE_DATA));
        }
        if let Some(v) = get("MAX_RETRY_ATTEMPTS") {
            let parsed = v
                .parse::<i64>()
                .unwrap_or(i64::from(defaults::MAX_RETRY_ATTEMPTS));
            self.max_retry_attempts = Some(coerce_non_negative(
                parsed,
                defaults::MAX_RETRY_ATTEMPTS,
                "MAX_RETRY_ATTEMPTS",
            ));
        }
        if let Some(v) = get("ENABLE_DYNAMIC_RATE_LIMITING") {
            self.enable_dynamic_rate_limiting =
                Some(parse_bool_or(&v, defaults::ENABLE_DYNAMIC_RATE_LIMITING));
        }
        if let Some(v) = get("MAX_CONCURRENT_REQUESTS") {
            let parsed = v
                .parse::<i64>()
                .unwrap_or(defaults::MAX_CONCURRENT_REQUESTS as i64);
            self.max_concurrent_requests = Some(coerce_positive(
                parsed,
                defaults::MAX_CONCURRENT_REQUESTS,
                "MAX_CONCURRENT_REQUESTS",
            ));
        }
        if let Some(v) = get("TOKEN_REFRESH_BUFFER_PERIOD") {
            self.token_refresh_buffer = Some(parse_duration_or(&v, defaults::TOKEN_REFRESH_BUFFER));
        }
        if let Some(v) = get("TOTAL_RETRY_DURATION") {
            self.total_retry_duration = Some(parse_duration_or(&v, defaults::TOTAL_RETRY_DURATION));
        }
        if let Some(v) = get("CUSTOM_TIMEOUT") {
            self.request_timeout = Some(parse_duration_or(&v, defaults::REQUEST_TIMEOUT));
        }
        if let Some(v) = get("FOLLOW_REDIRECTS") {
            self.follow_redirects = Some(parse_bool_or(&v, defaults::FOLLOW_REDIRECTS));
        }
        self
    }

    /// Validate mandatory fields and produce the immutable configuration.
    ///
    /// Every missing mandatory field is reported in a single error message so
    /// the caller learns about all of them at once.
    pub fn build(self) -> Result<ClientConfig, ClientError> {
        let mut missing = Vec::new();
        if self.client_id.as_deref().unwrap_or("").is_empty() {
            missing.push("client_id (CLIENT_ID)");
        }
        if self.client_secret.as_deref().unwrap_or("").is_empty() {
            missing.push("client_secret (CLIENT_SECRET)");
        }
        if self.instance_name.as_deref().unwrap_or("").is_empty() {
            missing.push("instance_name (INSTANCE_NAME)");
        }
        if self.api_kind.is_none() {
            missing.push("api_kind (API_TYPE)");
        }
        if !missing.is_empty() {
            return Err(ClientError::Config(format!(
                "mandatory configuration missing: {}",
                missing.join(", ")
            )));
        }
        let api_kind = self
            .api_kind
            .ok_or_else(|| ClientError::Config("mandatory configuration missing: api_kind".into()))?;

        let timeouts = Timeouts {
            token_refresh_buffer: coerce_duration(
                self.token_refresh_buffer,
                defaults::TOKEN_REFRESH_BUFFER,
                "token_refresh_buffer",
            ),
            total_retry_duration: coerce_duration(
                self.total_retry_duration,
                defaults::TOTAL_RETRY_DURATION,
                "total_retry_duration",
            ),
            request_timeout: coerce_duration(
                self.request_timeout,
                defaults::REQUEST_TIMEOUT,
                "request_timeout",
            ),
        };

        Ok(ClientConfig {
            auth: AuthCredentials {
                username: self.username,
                password: self.password.map(SecretString::new),
                client_id: self.client_id.unwrap_or_default(),
                client_secret: SecretString::new(self.client_secret.unwrap_or_default()),
            },
            environment: Environment {
                instance_name: self.instance_name.unwrap_or_default(),
                override_base_domain: self.override_base_domain.filter(|d| !d.is_empty()),
                api_kind,
            },
            options: ClientOptions {
                log_level: self
                    .log_level
                    .filter(|l| !l.is_empty())
                    .unwrap_or_else(|| defaults::LOG_LEVEL.to_string()),
                log_output_format: self.log_output_format.unwrap_or_default(),
                log_console_separator: self
                    .log_console_separator
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| defaults::LOG_CONSOLE_SEPARATOR.to_string()),
                hide_sensitive_data: self
                    .hide_sensitive_data
                    .unwrap_or(defaults::HIDE_SENSITIVE_DATA),
                max_retry_attempts: self
                    .max_retry_attempts
                    .unwrap_or(defaults::MAX_RETRY_ATTEMPTS),
                enable_dynamic_rate_limiting: self
                    .enable_dynamic_rate_limiting
                    .unwrap_or(defaults::ENABLE_DYNAMIC_RATE_LIMITING),
                max_concurrent_requests: self
                    .max_concurrent_requests
                    .unwrap_or(defaults::MAX_CONCURRENT_REQUESTS)
                    .max(1),
                follow_redirects: self.follow_redirects.unwrap_or(defaults::FOLLOW_REDIRECTS),
            },
            timeouts,
        })
    }
}

impl AuthCredentials {
    /// Whether username/password are both present and non-empty (required
    /// for Basic auth).
    pub fn has_basic_credentials(&self) -> bool {
        self.username.as_deref().map_or(false, |u| !u.is_empty())
            && self
                .password
                .as_ref()
                .map_or(false, |p| !p.expose_secret().is_empty())
    }

    pub fn client_secret_value(&self) -> &str {
        self.client_secret.expose_secret()
    }
}

fn merge_opt<T>(slot: &mut Option<T>, value: Option<T>) {
    if let Some(v) = value {
        *slot = Some(v);
    }
}

fn parse_bool_or(value: &str, default: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => default,
    }
}

fn coerce_non_negative(value: i64, default: u32, field: &str) -> u32 {
    if value < 0 {
        tracing::warn!(target: "manifold::config", field, value, "negative value coerced to default");
        default
    } else {
        u32::try_from(value).unwrap_or(default)
    }
}

fn coerce_positive(value: i64, default: usize, field: &str) -> usize {
    if value <= 0 {
        tracing::warn!(target: "manifold::config", field, value, "non-positive value coerced to default");
        default
    } else {
        usize::try_from(value).unwrap_or(default)
    }
}

fn coerce_duration(value: Option<Duration>, default: Duration, field: &str) -> Duration {
    match value {
        Some(d) if !d.is_zero() => d,
        Some(_) => {
            tracing::warn!(target: "manifold::config", field, "zero duration coerced to default");
            default
        }
        None => default,
    }
}

/// Parse a Go-style duration string ("250ms", "10s", "5m", "1h"). Plain
/// integers are taken as seconds. Malformed input yields the default.
pub(crate) fn parse_duration_or(value: &str, default: Duration) -> Duration {
    parse_duration(value).unwrap_or_else(|| {
        tracing::warn!(target: "manifold::config", value, "unparseable duration, using default");
        default
    })
}

fn parse_duration(value: &str) -> Option<Duration> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    let (number, unit) = match v.find(|c: char| c.is_ascii_alphabetic()) {
        Some(idx) => v.split_at(idx),
        None => (v, "s"),
    };
    let number: f64 = number.parse().ok()?;
    if number < 0.0 {
        return None;
    }
    let secs = match unit {
        "ms" => number / 1000.0,
        "s" => number,
        "m" => number * 60.0,
        "h" => number * 3600.0,
        _ => return None,
    };
    Some(Duration::from_secs_f64(secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_builder() -> ClientConfigBuilder {
        ClientConfig::builder()
            .client_id("id")
            .client_secret("s3cr3t-value")
            .instance_name("acme")
            .api_kind(ApiKind::ModernJson)
    }

    #[test]
    fn build_with_defaults() {
        let config = complete_builder().build().unwrap();
        assert_eq!(config.options.max_retry_attempts, 3);
        assert_eq!(config.options.max_concurrent_requests, 5);
        assert!(config.options.hide_sensitive_data);
        assert!(config.options.enable_dynamic_rate_limiting);
        assert_eq!(config.timeouts.request_timeout, Duration::from_secs(10));
        assert_eq!(
            config.timeouts.total_retry_duration,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn missing_mandatory_fields_are_all_reported() {
        let err = ClientConfig::builder().build().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("client_id"));
        assert!(msg.contains("client_secret"));
        assert!(msg.contains("instance_name"));
        assert!(msg.contains("api_kind"));
    }

    #[test]
    fn env_overrides_builder_values() {
        let mut env = HashMap::new();
        env.insert("CLIENT_ID".to_string(), "env-id".to_string());
        env.insert("MAX_RETRY_ATTEMPTS".to_string(), "7".to_string());
        env.insert("CUSTOM_TIMEOUT".to_string(), "30s".to_string());
        env.insert("HIDE_SENSITIVE_DATA".to_string(), "false".to_string());

        let config = complete_builder().load_env_map(&env).build().unwrap();
        assert_eq!(config.auth.client_id, "env-id");
        assert_eq!(config.options.max_retry_attempts, 7);
        assert_eq!(config.timeouts.request_timeout, Duration::from_secs(30));
        assert!(!config.options.hide_sensitive_data);
    }

    #[test]
    fn malformed_env_values_fall_back_to_defaults() {
        let mut env = HashMap::new();
        env.insert("MAX_RETRY_ATTEMPTS".to_string(), "-4".to_string());
        env.insert("MAX_CONCURRENT_REQUESTS".to_string(), "0".to_string());
        env.insert("TOTAL_RETRY_DURATION".to_string(), "soon".to_string());

        let config = complete_builder().load_env_map(&env).build().unwrap();
        assert_eq!(config.options.max_retry_attempts, 3);
        assert_eq!(config.options.max_concurrent_requests, 5);
        assert_eq!(
            config.timeouts.total_retry_duration,
            Duration::from_secs(300)
        );
    }

    #[test]
    fn duration_parsing_accepts_go_style_units() {
        assert_eq!(parse_duration("250ms"), Some(Duration::from_millis(250)));
        assert_eq!(parse_duration("10s"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("never"), None);
        assert_eq!(parse_duration("-5s"), None);
    }

    #[test]
    fn file_values_load_and_env_overrides_file() {
        let path = std::env::temp_dir().join("manifold-http-config-test.json");
        std::fs::write(
            &path,
            r#"{
                "client_id": "file-id",
                "client_secret": "file-secret",
                "instance_name": "file-instance",
                "api_type": "classic",
                "max_retry_attempts": 9,
                "custom_timeout": "20s"
            }"#,
        )
        .unwrap();

        let mut env = HashMap::new();
        env.insert("CLIENT_ID".to_string(), "env-id".to_string());

        let config = ClientConfig::builder()
            .load_file(&path)
            .unwrap()
            .load_env_map(&env)
            .build()
            .unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.auth.client_id, "env-id");
        assert_eq!(config.environment.instance_name, "file-instance");
        assert_eq!(config.environment.api_kind, ApiKind::ClassicXml);
        assert_eq!(config.options.max_retry_attempts, 9);
        assert_eq!(config.timeouts.request_timeout, Duration::from_secs(20));
    }

    #[test]
    fn api_kind_parsing() {
        assert_eq!("classic".parse::<ApiKind>().unwrap(), ApiKind::ClassicXml);
        assert_eq!(
            "modern-json".parse::<ApiKind>().unwrap(),
            ApiKind::ModernJson
        );
        assert!("legacy".parse::<ApiKind>().is_err());
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = complete_builder().password("hunter2").build().unwrap();
        let rendered = format!("{:?}", config.auth);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("s3cr3t-value"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
