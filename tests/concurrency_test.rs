//! Concurrency behavior across a fleet of real requests: permit accounting,
//! cap enforcement, adaptive shrinking under rate limiting, and cancellation.

mod support;

use std::sync::Arc;
use std::time::{Duration, Instant};

use manifold_http::{CancellationToken, ClientError};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, serde::Deserialize)]
struct Thing {
    name: String,
}

#[tokio::test]
async fn a_drained_fleet_balances_permit_accounting() {
    let server = MockServer::start().await;
    support::mount_token_endpoint(&server).await;
    Mock::given(method("GET"))
        .and(path("/things/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(30))
                .set_body_json(json!({"name": "x"})),
        )
        .expect(10)
        .mount(&server)
        .await;

    let client = Arc::new(support::modern_client_with(&server, |builder| {
        builder.max_concurrent_requests(3)
    }));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        handles.push(tokio::spawn(
            async move { client.get::<Thing>("/things/1").await },
        ));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let metrics = client.metrics();
    assert_eq!(metrics.total_requests, 10);
    assert_eq!(metrics.successful, 10);
    assert_eq!(metrics.failed, 0);
    assert_eq!(metrics.permits_in_use, 0, "all permits must be released");
}

#[tokio::test]
async fn sustained_rate_limiting_shrinks_the_dynamic_cap() {
    let server = MockServer::start().await;
    support::mount_token_endpoint(&server).await;
    // 429 with no guidance headers: every call fails immediately once the
    // zero-attempt budget is spent, flagged as rate limited.
    Mock::given(method("GET"))
        .and(path("/things/1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = support::modern_client_with(&server, |builder| {
        builder
            .max_concurrent_requests(5)
            .max_retry_attempts(0)
            .enable_dynamic_rate_limiting(true)
    });

    for _ in 0..15 {
        let err = client.get::<Thing>("/things/1").await.unwrap_err();
        assert!(matches!(err, ClientError::RateLimited(_)));
    }

    let metrics = client.metrics();
    assert!(
        metrics.current_cap < 5,
        "cap should have shrunk, still {}",
        metrics.current_cap
    );
    assert!(metrics.current_cap >= 1, "cap must never drop below one");
    assert_eq!(metrics.rate_limited, 15);
}

#[tokio::test]
async fn static_cap_is_untouched_by_failures() {
    let server = MockServer::start().await;
    support::mount_token_endpoint(&server).await;
    Mock::given(method("GET"))
        .and(path("/things/1"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let client = support::modern_client_with(&server, |builder| {
        builder
            .max_concurrent_requests(5)
            .max_retry_attempts(0)
            .enable_dynamic_rate_limiting(false)
    });

    for _ in 0..15 {
        let _ = client.get::<Thing>("/things/1").await;
    }
    assert_eq!(client.metrics().current_cap, 5);
}

#[tokio::test]
async fn cancellation_interrupts_a_rate_limit_wait() {
    let server = MockServer::start().await;
    support::mount_token_endpoint(&server).await;
    Mock::given(method("GET"))
        .and(path("/things/1"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "30"))
        .mount(&server)
        .await;

    let client = Arc::new(support::modern_client(&server));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        canceller.cancel();
    });

    let started = Instant::now();
    let err = client
        .execute_with_cancellation::<(), Thing>(reqwest::Method::GET, "/things/1", None, &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ClientError::Cancelled), "{err:?}");
    assert!(
        started.elapsed() < Duration::from_secs(5),
        "cancellation should not wait out the advised delay"
    );
    assert_eq!(client.metrics().permits_in_use, 0);
}
