//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::time::Duration;

use manifold_http::{ApiClient, ApiKind, ClientConfig, ClientConfigBuilder};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mount the modern handler's token endpoint, answering every exchange with a
/// long-lived bearer token.
pub async fn mount_token_endpoint(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "test-token",
            "expires_in": 3600,
        })))
        .mount(server)
        .await;
}

fn base_builder(server: &MockServer) -> ClientConfigBuilder {
    ClientConfig::builder()
        .client_id("client-id")
        .client_secret("client-secret")
        .instance_name("test")
        .override_base_domain(server.uri())
        .request_timeout(Duration::from_secs(5))
        .total_retry_duration(Duration::from_secs(30))
}

/// A modern-JSON client pointed at the mock server.
pub fn modern_client(server: &MockServer) -> ApiClient {
    modern_client_with(server, |builder| builder)
}

/// A modern-JSON client with extra configuration applied.
pub fn modern_client_with(
    server: &MockServer,
    customize: impl FnOnce(ClientConfigBuilder) -> ClientConfigBuilder,
) -> ApiClient {
    let builder = base_builder(server).api_kind(ApiKind::ModernJson);
    ApiClient::new(customize(builder).build().expect("valid test config"))
        .expect("client construction")
}

/// A classic-XML client (Basic auth) pointed at the mock server.
pub fn classic_client(server: &MockServer) -> ApiClient {
    classic_client_with(server, |builder| builder)
}

/// A classic-XML client with extra configuration applied.
pub fn classic_client_with(
    server: &MockServer,
    customize: impl FnOnce(ClientConfigBuilder) -> ClientConfigBuilder,
) -> ApiClient {
    let builder = base_builder(server)
        .api_kind(ApiKind::ClassicXml)
        .username("admin")
        .password("swordfish");
    ApiClient::new(customize(builder).build().expect("valid test config"))
        .expect("client construction")
}
