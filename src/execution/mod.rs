//! Request execution.
//!
//! The control flow binding every other component: dispatches idempotent
//! requests onto the retry path and non-idempotent ones onto the single-shot
//! path, runs the retry state machine (rate-limit waits, exponential backoff,
//! one-shot token refresh), and feeds the concurrency controller on every
//! exit.

pub(crate) mod headers;
pub mod rate_limit;
pub mod status;

use std::time::{Duration, Instant};

use chrono::Utc;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::auth::TokenHandler;
use crate::concurrency::ConcurrencyController;
use crate::config::{AuthCredentials, ClientOptions, Timeouts};
use crate::error::{ApiError, ClientError};
use crate::handlers::ApiHandler;
use crate::observability;
use crate::retry::BackoffPolicy;
use status::StatusClass;

/// Methods safe to replay, per their HTTP semantics.
const IDEMPOTENT_METHODS: &[Method] = &[
    Method::GET,
    Method::PUT,
    Method::DELETE,
    Method::HEAD,
    Method::OPTIONS,
];

/// Methods executed exactly once.
const NON_IDEMPOTENT_METHODS: &[Method] = &[Method::POST, Method::PATCH];

/// Everything the executor needs, borrowed from the client.
pub(crate) struct RequestContext<'a> {
    pub http: &'a reqwest::Client,
    pub handler: &'a dyn ApiHandler,
    pub auth: &'a TokenHandler,
    pub concurrency: &'a ConcurrencyController,
    pub credentials: &'a AuthCredentials,
    pub options: &'a ClientOptions,
    pub timeouts: &'a Timeouts,
    pub backoff: &'a BackoffPolicy,
}

/// One request's wire-ready state. Each call owns its envelope; nothing here
/// is shared across concurrent calls.
pub(crate) struct RequestEnvelope {
    pub method: Method,
    pub url: String,
    pub path: String,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
    pub accept: String,
    pub authorization: String,
    pub user_agent: String,
}

/// Status and headers of the final response, handed back alongside the
/// decoded body.
#[derive(Debug, Clone)]
pub struct ResponseParts {
    pub status: reqwest::StatusCode,
    pub headers: HeaderMap,
}

/// Execute a request to completion, returning the final response parts and
/// raw body bytes. The caller decodes the body according to the handler's
/// wire format.
pub(crate) async fn execute(
    ctx: &RequestContext<'_>,
    method: &Method,
    path: &str,
    body: Option<&Value>,
    cancel: &CancellationToken,
) -> Result<(ResponseParts, Vec<u8>), ClientError> {
    let retryable = if IDEMPOTENT_METHODS.contains(method) {
        true
    } else if NON_IDEMPOTENT_METHODS.contains(method) {
        false
    } else {
        return Err(ClientError::Unsupported(method.to_string()));
    };

    let deadline = Instant::now() + ctx.timeouts.total_retry_duration;
    ensure_token_with_retries(ctx, cancel, retryable, deadline).await?;

    let permit = ctx.concurrency.acquire(cancel).await?;
    tracing::debug!(
        target: "manifold::execution",
        request_id = permit.request_id(),
        method = %method,
        path,
        retryable,
        "executing request"
    );

    let started = Instant::now();
    let mut saw_rate_limit = false;
    let mut last_attempt_duration = Duration::ZERO;
    let result = run_attempts(
        ctx,
        method,
        path,
        body,
        cancel,
        retryable,
        deadline,
        &mut saw_rate_limit,
        &mut last_attempt_duration,
    )
    .await;

    let observed = if last_attempt_duration.is_zero() {
        started.elapsed()
    } else {
        last_attempt_duration
    };
    ctx.concurrency
        .record_completion(observed, result.is_ok(), saw_rate_limit);
    drop(permit);
    result
}

/// The Prepare → Send → Classify state machine. On the single-shot path the
/// wait states are unreachable: any non-success classification is terminal.
#[allow(clippy::too_many_arguments)]
async fn run_attempts(
    ctx: &RequestContext<'_>,
    method: &Method,
    path: &str,
    body: Option<&Value>,
    cancel: &CancellationToken,
    retryable: bool,
    deadline: Instant,
    saw_rate_limit: &mut bool,
    last_attempt_duration: &mut Duration,
) -> Result<(ResponseParts, Vec<u8>), ClientError> {
    let mut envelope = build_envelope(ctx, method, path, body)?;
    let mut request_headers = headers::assemble(&envelope)?;
    headers::log_request_headers(&request_headers, ctx.options.hide_sensitive_data);

    let max_attempts = ctx.options.max_retry_attempts as i32;
    let mut attempt: i32 = 0;
    let mut auth_refreshed = false;

    loop {
        let attempt_started = Instant::now();
        let sent = send(ctx, &envelope, &request_headers, cancel).await;
        *last_attempt_duration = attempt_started.elapsed();

        let response = match sent {
            Ok(response) => response,
            Err(ClientError::Cancelled) => return Err(ClientError::Cancelled),
            Err(err) => {
                observability::log_request_error(
                    "transport_error",
                    method,
                    &envelope.url,
                    None,
                    &err,
                    "request could not be sent",
                );
                if !retryable {
                    return Err(err);
                }
                attempt += 1;
                let delay = ctx.backoff.delay(attempt);
                if attempt > max_attempts || exceeds_deadline(deadline, delay) {
                    return Err(err);
                }
                tracing::warn!(
                    target: "manifold::execution",
                    method = %method,
                    path = envelope.path.as_str(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transport failure"
                );
                sleep_cancellable(delay, cancel).await?;
                continue;
            }
        };

        let response_status = response.status();
        match status::classify(response_status, ctx.handler.auth_expired_statuses()) {
            StatusClass::Success | StatusClass::Redirect => {
                if response_status.is_redirection() {
                    let location = response
                        .headers()
                        .get("Location")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("");
                    tracing::warn!(
                        target: "manifold::execution",
                        status = response_status.as_u16(),
                        location,
                        "redirect response returned to caller"
                    );
                }
                headers::check_deprecation_headers(response.headers(), method, &envelope.url);
                let parts = ResponseParts {
                    status: response_status,
                    headers: response.headers().clone(),
                };
                let bytes = response.bytes().await.map_err(ClientError::from)?;
                return Ok((parts, bytes.to_vec()));
            }

            StatusClass::AuthExpired if retryable && !auth_refreshed => {
                auth_refreshed = true;
                tracing::warn!(
                    target: "manifold::execution",
                    status = response_status.as_u16(),
                    "credential rejected, refreshing token"
                );
                ctx.auth.invalidate();
                ctx.auth
                    .ensure_valid(
                        ctx.handler,
                        ctx.http,
                        ctx.credentials,
                        ctx.timeouts.token_refresh_buffer,
                        cancel,
                    )
                    .await?;
                envelope.authorization = ctx
                    .auth
                    .authorization_header(ctx.handler.auth_method(), ctx.credentials)?;
                request_headers = headers::assemble(&envelope)?;
                // Refresh does not consume a retry attempt.
                continue;
            }

            StatusClass::RateLimited if retryable => {
                *saw_rate_limit = true;
                let wait = rate_limit::parse_rate_limit_headers(response.headers(), Utc::now());
                drop(response);
                if wait > Duration::ZERO {
                    if exceeds_deadline(deadline, wait) {
                        return Err(rate_limit_exhausted(method, &envelope.url, response_status));
                    }
                    tracing::warn!(
                        target: "manifold::execution",
                        wait_ms = wait.as_millis() as u64,
                        "rate limited, honoring server-advised wait"
                    );
                    sleep_cancellable(wait, cancel).await?;
                    // A server-advised wait does not consume a retry attempt.
                    continue;
                }
                // No header guidance; fall back to backoff.
                attempt += 1;
                let delay = ctx.backoff.delay(attempt);
                if attempt > max_attempts || exceeds_deadline(deadline, delay) {
                    return Err(rate_limit_exhausted(method, &envelope.url, response_status));
                }
                tracing::warn!(
                    target: "manifold::execution",
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "rate limited without guidance, backing off"
                );
                sleep_cancellable(delay, cancel).await?;
                continue;
            }

            StatusClass::Transient if retryable => {
                let api_error = decode_error_response(response)
                    .await
                    .with_context(method, &envelope.url);
                attempt += 1;
                let delay = ctx.backoff.delay(attempt);
                if attempt > max_attempts || exceeds_deadline(deadline, delay) {
                    tracing::warn!(
                        target: "manifold::execution",
                        method = %method,
                        path = envelope.path.as_str(),
                        attempt,
                        "retry budget exhausted"
                    );
                    return Err(api_error.into());
                }
                tracing::warn!(
                    target: "manifold::execution",
                    method = %method,
                    path = envelope.path.as_str(),
                    status = response_status.as_u16(),
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error"
                );
                sleep_cancellable(delay, cancel).await?;
                continue;
            }

            // Non-retryable outcomes, and any non-success on the single-shot
            // path.
            class => {
                if class == StatusClass::RateLimited {
                    *saw_rate_limit = true;
                }
                let api_error = decode_error_response(response)
                    .await
                    .with_context(method, &envelope.url);
                observability::log_request_error(
                    "request_error",
                    method,
                    &envelope.url,
                    Some(response_status.as_u16()),
                    &api_error,
                    &status::describe(response_status),
                );
                return Err(api_error.into());
            }
        }
    }
}

/// Ensure a usable credential exists before the first send. A transport
/// failure during the refresh is itself transient: on the idempotent path it
/// is retried with backoff under the same deadline and attempt budget as the
/// request proper.
async fn ensure_token_with_retries(
    ctx: &RequestContext<'_>,
    cancel: &CancellationToken,
    retryable: bool,
    deadline: Instant,
) -> Result<(), ClientError> {
    let max_attempts = ctx.options.max_retry_attempts as i32;
    let mut attempt: i32 = 0;
    loop {
        let err = match ctx
            .auth
            .ensure_valid(
                ctx.handler,
                ctx.http,
                ctx.credentials,
                ctx.timeouts.token_refresh_buffer,
                cancel,
            )
            .await
        {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        let transient = matches!(err, ClientError::Transport(_) | ClientError::Timeout(_));
        if !retryable || !transient {
            return Err(err);
        }
        attempt += 1;
        let delay = ctx.backoff.delay(attempt);
        if attempt > max_attempts || exceeds_deadline(deadline, delay) {
            return Err(err);
        }
        tracing::warn!(
            target: "manifold::execution",
            attempt,
            delay_ms = delay.as_millis() as u64,
            "retrying token refresh after transport failure"
        );
        sleep_cancellable(delay, cancel).await?;
    }
}

/// Marshal the body, build the URL and collect the header values the handler
/// dictates.
fn build_envelope(
    ctx: &RequestContext<'_>,
    method: &Method,
    path: &str,
    body: Option<&Value>,
) -> Result<RequestEnvelope, ClientError> {
    let encoded = ctx.handler.marshal_request(body, method, path)?;
    // An encoded body carries its own content type (e.g. a multipart
    // boundary); otherwise the handler's per-path policy applies.
    let (body_bytes, content_type) = match encoded {
        Some(encoded) => (Some(encoded.bytes), Some(encoded.content_type)),
        None => (None, ctx.handler.content_type_header(path)),
    };

    Ok(RequestEnvelope {
        method: method.clone(),
        url: ctx.handler.resource_endpoint(path),
        path: path.to_string(),
        body: body_bytes,
        content_type,
        accept: ctx.handler.accept_header(),
        authorization: ctx
            .auth
            .authorization_header(ctx.handler.auth_method(), ctx.credentials)?,
        user_agent: ctx.handler.user_agent(),
    })
}

/// Issue one HTTP attempt. The per-attempt timeout lives on the underlying
/// client; cancellation aborts the in-flight send.
async fn send(
    ctx: &RequestContext<'_>,
    envelope: &RequestEnvelope,
    request_headers: &HeaderMap,
    cancel: &CancellationToken,
) -> Result<reqwest::Response, ClientError> {
    let mut builder = ctx
        .http
        .request(envelope.method.clone(), envelope.url.as_str())
        .headers(request_headers.clone());
    if let Some(bytes) = &envelope.body {
        builder = builder.body(bytes.clone());
    }

    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(ClientError::Cancelled),
        result = builder.send() => result?,
    };
    tracing::debug!(
        target: "manifold::execution",
        method = %envelope.method,
        url = %envelope.url,
        status = response.status().as_u16(),
        "response received"
    );
    Ok(response)
}

/// Read and decode an error response, degrading to a status-only record when
/// the body cannot be read.
async fn decode_error_response(response: reqwest::Response) -> ApiError {
    let response_status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    match response.bytes().await {
        Ok(bytes) => {
            crate::response::decode_error_body(response_status, content_type.as_deref(), &bytes)
        }
        Err(_) => ApiError::status_only(response_status.as_u16()),
    }
}

fn rate_limit_exhausted(
    method: &Method,
    url: &str,
    response_status: reqwest::StatusCode,
) -> ClientError {
    ClientError::RateLimited(format!(
        "{method} {url} still rate limited after exhausting the retry budget ({})",
        status::describe(response_status)
    ))
}

fn exceeds_deadline(deadline: Instant, wait: Duration) -> bool {
    Instant::now() + wait > deadline
}

/// Cancellation-aware sleep; a fired token ends the call without further
/// retries.
async fn sleep_cancellable(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), ClientError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ClientError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_dispatch_sets() {
        for method in [
            Method::GET,
            Method::PUT,
            Method::DELETE,
            Method::HEAD,
            Method::OPTIONS,
        ] {
            assert!(IDEMPOTENT_METHODS.contains(&method));
            assert!(!NON_IDEMPOTENT_METHODS.contains(&method));
        }
        for method in [Method::POST, Method::PATCH] {
            assert!(NON_IDEMPOTENT_METHODS.contains(&method));
            assert!(!IDEMPOTENT_METHODS.contains(&method));
        }
        assert!(!IDEMPOTENT_METHODS.contains(&Method::TRACE));
        assert!(!NON_IDEMPOTENT_METHODS.contains(&Method::TRACE));
    }

    #[tokio::test]
    async fn cancellable_sleep_returns_early_on_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        let started = Instant::now();
        let result = sleep_cancellable(Duration::from_secs(30), &token).await;
        assert!(matches!(result, Err(ClientError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
