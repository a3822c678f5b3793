mod basic_ext;
mod json_ext;

use crate::prelude::*;
use async_trait::async_trait;
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use std::time::{Duration, Instant};

pub(crate) mod prelude {
    pub(crate) use super::basic_ext::RequestBuilderBasicExt as _;
    pub(crate) use super::json_ext::RequestBuilderJsonExt as _;
}

pub type Client = reqwest_middleware::ClientWithMiddleware;

const USER_AGENT: &str = concat!("egrz-leads/", env!("CARGO_PKG_VERSION"));

pub(crate) fn default_retry_policy() -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(100), Duration::from_secs(2))
        .build_with_max_retries(3)
}

/// Client with automatic retries of transient failures. Used for the
/// auxiliary requests where the exact number of attempts doesn't matter.
pub(crate) fn create_client(base: reqwest::Client) -> Client {
    reqwest_middleware::ClientBuilder::new(base)
        .with(OutermostObservingMiddleware)
        .with(RetryTransientMiddleware::new_with_policy(
            default_retry_policy(),
        ))
        .with(InnermostObservingMiddleware)
        .build()
}

/// Client that makes exactly one attempt per request. Callers that own
/// their retry budget (registry exports, LLM completions) use this one.
pub(crate) fn create_client_without_retries(base: reqwest::Client) -> Client {
    reqwest_middleware::ClientBuilder::new(base)
        .with(OutermostObservingMiddleware)
        .with(InnermostObservingMiddleware)
        .build()
}

pub(crate) fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder().user_agent(USER_AGENT)
}

struct OutermostObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for OutermostObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut task_local_extensions::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let span = info_span!(
            "request",
            method = %request.method(),
            host = request.url().host_str().unwrap_or("{unknown}"),
            path = request.url().path(),
        );
        measure_request(
            "http_request_effective_duration_seconds",
            request,
            extensions,
            next,
        )
        .instrument(span)
        .await
    }
}

struct InnermostObservingMiddleware;

#[async_trait]
impl reqwest_middleware::Middleware for InnermostObservingMiddleware {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut task_local_extensions::Extensions,
        next: reqwest_middleware::Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let (result, duration) =
            measure_request("http_request_duration_seconds", request, extensions, next)
                .with_duration()
                .await;

        let duration = tracing_duration(duration);

        let response = match &result {
            Ok(response) => response,
            Err(err) => {
                error!(duration, err = tracing_err(err), "Network request failed");
                return result;
            }
        };

        let status = response.status();

        let Err(err) = response.error_for_status_ref() else {
            debug!(duration, %status, "Network request succeeded");
            return result;
        };

        warn!(
            err = tracing_err(&err),
            duration,
            %status,
            "Network request failed (error status)"
        );

        result
    }
}

async fn measure_request(
    histogram: &'static str,
    request: reqwest::Request,
    extensions: &mut task_local_extensions::Extensions,
    next: reqwest_middleware::Next<'_>,
) -> reqwest_middleware::Result<reqwest::Response> {
    let method = request.method().to_string();
    let host = request.url().host_str().unwrap_or("{unknown}").to_owned();

    let start = Instant::now();
    let result = next.run(request, extensions).await;
    let elapsed = start.elapsed();

    let status = match &result {
        Ok(response) => response.status().as_u16().to_string(),
        Err(_) => "{fatal}".to_owned(),
    };

    metrics::histogram!(
        histogram,
        elapsed,
        "method" => method,
        "host" => host,
        "status" => status,
    );

    result
}

/// Errors at the layer of the HTTP API
#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpClientError {
    #[error("HTTP request failed")]
    Request { source: reqwest_middleware::Error },

    #[error("Failed to read HTTP response")]
    ReadPayload { source: reqwest::Error },

    #[error("HTTP request has failed (HTTP status code: {status}):\n{body}")]
    BadResponseStatusCode {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Received an unexpected response JSON object")]
    UnexpectedResponseJsonShape { source: serde_json::Error },
}

impl HttpClientError {
    /// Timeouts and connection failures. These are worth another attempt.
    pub(crate) fn is_transient_network(&self) -> bool {
        let err = match self {
            Self::Request { source } => match source {
                reqwest_middleware::Error::Reqwest(err) => err,
                reqwest_middleware::Error::Middleware(_) => return false,
            },
            Self::ReadPayload { source } => source,
            Self::BadResponseStatusCode { .. } | Self::UnexpectedResponseJsonShape { .. } => {
                return false
            }
        };
        err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
    }

    pub(crate) fn is_timeout(&self) -> bool {
        match self {
            Self::Request {
                source: reqwest_middleware::Error::Reqwest(err),
            } => err.is_timeout(),
            Self::ReadPayload { source } => source.is_timeout(),
            _ => false,
        }
    }
}
