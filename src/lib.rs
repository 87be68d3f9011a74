//! manifold-http
//!
//! A vendor-pluggable HTTP API client framework. One execution core —
//! idempotency-aware retries with exponential backoff and jitter,
//! server-advised rate-limit waits, coalesced token refresh and an adaptive
//! concurrency cap — composed with per-vendor handler strategies that supply
//! endpoint construction, wire encoding (XML or JSON), header policy and the
//! authentication flow.
//!
//! ```rust,no_run
//! use manifold_http::{ApiClient, ApiKind, ClientConfig};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Thing {
//!     name: String,
//! }
//!
//! async fn example() -> Result<(), manifold_http::ClientError> {
//!     let config = ClientConfig::builder()
//!         .client_id("client-id")
//!         .client_secret("client-secret")
//!         .instance_name("acme")
//!         .api_kind(ApiKind::ModernJson)
//!         .build()?;
//!     let client = ApiClient::new(config)?;
//!
//!     let (_parts, thing) = client.get::<Thing>("/things/1").await?;
//!     if let Some(thing) = thing {
//!         println!("{}", thing.name);
//!     }
//!     Ok(())
//! }
//! ```
#![deny(unsafe_code)]

pub mod auth;
pub mod client;
pub mod concurrency;
pub mod config;
pub mod encoding;
pub mod error;
pub mod execution;
pub mod handlers;
pub mod observability;
pub mod response;
pub mod retry;

pub use client::ApiClient;
pub use concurrency::MetricsSnapshot;
pub use config::{ApiKind, ClientConfig, ClientConfigBuilder, LogFormat};
pub use error::{ApiError, ApiErrorKind, ClientError};
pub use execution::ResponseParts;
pub use handlers::{ApiHandler, AuthMethod, ContentTypeOverrides};
pub use retry::BackoffPolicy;

/// HTTP method type accepted by [`ApiClient::execute`].
pub use reqwest::Method;

/// Cancellation token accepted by [`ApiClient::execute_with_cancellation`].
pub use tokio_util::sync::CancellationToken;
