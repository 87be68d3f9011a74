//! Public client surface.
//!
//! `ApiClient` wires the configured vendor handler, auth token handling,
//! concurrency control and the request executor together behind one
//! `execute` entry point. Construction validates configuration; the client is
//! cheap to share by reference across tasks.

use std::path::Path;

use reqwest::redirect;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenHandler;
use crate::concurrency::{ConcurrencyController, MetricsSnapshot};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::execution::{self, RequestContext, ResponseParts};
use crate::handlers::{self, ApiHandler};
use crate::response;
use crate::retry::BackoffPolicy;

/// Maximum redirect hops when redirect following is enabled.
const MAX_REDIRECT_HOPS: usize = 10;

/// A configured API client bound to one vendor handler.
pub struct ApiClient {
    http: reqwest::Client,
    handler: Box<dyn ApiHandler>,
    auth: TokenHandler,
    concurrency: ConcurrencyController,
    backoff: BackoffPolicy,
    config: ClientConfig,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Build a client from a validated configuration.
    ///
    /// Installs a `tracing` subscriber from the configured log options unless
    /// the embedding application already set one.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        crate::observability::init_logging(&config.options);

        let redirect_policy = if config.options.follow_redirects {
            redirect::Policy::limited(MAX_REDIRECT_HOPS)
        } else {
            // 3xx responses surface to the executor, which warns and treats
            // them as success.
            redirect::Policy::none()
        };

        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request_timeout)
            .redirect(redirect_policy)
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        let handler = handlers::handler_for(&config.environment);
        let concurrency = ConcurrencyController::new(
            config.options.max_concurrent_requests,
            config.options.enable_dynamic_rate_limiting,
        );

        tracing::info!(
            target: "manifold::client",
            instance = %config.environment.instance_name,
            api_kind = %config.environment.api_kind,
            max_concurrent = config.options.max_concurrent_requests,
            dynamic_rate_limiting = config.options.enable_dynamic_rate_limiting,
            "client constructed"
        );

        Ok(Self {
            http,
            handler,
            auth: TokenHandler::new(),
            concurrency,
            backoff: BackoffPolicy::default(),
            config,
        })
    }

    /// Build a client from environment variables alone.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Build a client from a JSON file, with environment variables taking
    /// precedence over file values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        Self::new(ClientConfig::from_file(path)?)
    }

    /// Execute a request.
    ///
    /// Idempotent methods (GET, PUT, DELETE, HEAD, OPTIONS) run with retries;
    /// POST and PATCH are sent exactly once. The decoded body is `None` for
    /// body-less responses (DELETE, 204, empty).
    pub async fn execute<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
    ) -> Result<(ResponseParts, Option<T>), ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute_with_cancellation(method, path, body, &CancellationToken::new())
            .await
    }

    /// [`execute`](Self::execute) with a caller-provided cancellation token.
    /// Cancellation releases any held permit and returns
    /// [`ClientError::Cancelled`] without further retries.
    pub async fn execute_with_cancellation<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        cancel: &CancellationToken,
    ) -> Result<(ResponseParts, Option<T>), ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body_value = body
            .map(|b| {
                serde_json::to_value(b).map_err(|e| {
                    ClientError::Parse(format!("failed to serialize request body: {e}"))
                })
            })
            .transpose()?;

        let ctx = RequestContext {
            http: &self.http,
            handler: self.handler.as_ref(),
            auth: &self.auth,
            concurrency: &self.concurrency,
            credentials: &self.config.auth,
            options: &self.config.options,
            timeouts: &self.config.timeouts,
            backoff: &self.backoff,
        };

        let (parts, bytes) = execution::execute(&ctx, &method, path, body_value.as_ref(), cancel).await?;
        let decoded = response::decode_success(
            &method,
            parts.status,
            self.handler.response_format(path),
            &bytes,
        )?;
        Ok((parts, decoded))
    }

    /// GET a resource.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
    ) -> Result<(ResponseParts, Option<T>), ClientError> {
        self.execute::<(), T>(Method::GET, path, None).await
    }

    /// POST a resource (single-shot: never retried).
    pub async fn post<B, T>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(ResponseParts, Option<T>), ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::POST, path, Some(body)).await
    }

    /// PUT a resource.
    pub async fn put<B, T>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(ResponseParts, Option<T>), ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.execute(Method::PUT, path, Some(body)).await
    }

    /// DELETE a resource. The response body, if any, is not parsed.
    pub async fn delete(&self, path: &str) -> Result<ResponseParts, ClientError> {
        let (parts, _) = self
            .execute::<(), serde_json::Value>(Method::DELETE, path, None)
            .await?;
        Ok(parts)
    }

    /// A consistent snapshot of the concurrency metrics.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.concurrency.snapshot()
    }

    /// The configuration the client was built from.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Release the client's resources. Dropping the client is equivalent;
    /// this exists for call sites that want the teardown to be explicit.
    pub fn close(self) {
        tracing::debug!(target: "manifold::client", "client closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKind;

    fn config() -> ClientConfig {
        ClientConfig::builder()
            .client_id("id")
            .client_secret("secret")
            .instance_name("acme")
            .api_kind(ApiKind::ModernJson)
            .build()
            .unwrap()
    }

    #[test]
    fn construction_succeeds_with_valid_config() {
        let client = ApiClient::new(config()).unwrap();
        assert_eq!(client.metrics().total_requests, 0);
        client.close();
    }

    #[test]
    fn construction_fails_on_missing_mandatory_config() {
        let err = ClientConfig::builder()
            .client_id("id")
            .build()
            .map(ApiClient::new)
            .unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let client = ApiClient::new(config()).unwrap();
        let err = client
            .execute::<(), serde_json::Value>(Method::TRACE, "/things", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Unsupported(_)));
    }
}
