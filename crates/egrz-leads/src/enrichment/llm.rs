//! OpenAI compatible chat completions client.
use crate::http::HttpClientError;
use crate::prelude::*;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub(crate) struct LlmConfig {
    #[serde(default = "default_api_url")]
    pub(crate) api_url: url::Url,

    pub(crate) api_key: String,

    #[serde(default = "default_model")]
    pub(crate) model: String,

    #[serde(default = "default_timeout_secs")]
    pub(crate) timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub(crate) max_tokens: u32,

    #[serde(default = "default_retry_attempts")]
    pub(crate) retry_attempts: u32,

    #[serde(default = "default_retry_delay_secs")]
    pub(crate) retry_delay_secs: u64,
}

fn default_api_url() -> url::Url {
    "https://api.openai.com/v1/chat/completions"
        .parse()
        .expect("BUG: invalid default LLM API URL")
}

fn default_model() -> String {
    "gpt-4o-mini".to_owned()
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_tokens() -> u32 {
    1200
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay_secs() -> u64 {
    5
}

/// Failure classes of the completion endpoint. They drive whether
/// the request is retried or the enrichment falls back right away.
#[derive(Debug, thiserror::Error)]
pub(crate) enum LlmError {
    #[error("LLM provider rate limit was hit")]
    RateLimited,

    #[error("LLM provider quota is exhausted")]
    QuotaExhausted,

    #[error("LLM request timed out")]
    Timeout,

    #[error("LLM request failed at the network level")]
    Network { source: HttpClientError },

    #[error("LLM provider responded with status {status}: {body}")]
    BadStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("LLM returned an empty completion")]
    EmptyResponse,

    #[error("LLM response has an unexpected shape")]
    UnexpectedShape { source: HttpClientError },
}

impl LlmError {
    pub(crate) fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::Timeout | Self::Network { .. } => true,
            Self::QuotaExhausted
            | Self::BadStatus { .. }
            | Self::EmptyResponse
            | Self::UnexpectedShape { .. } => false,
        }
    }

    /// Short name used as a metric label
    pub(crate) fn outcome(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::Timeout => "timeout",
            Self::Network { .. } => "network",
            Self::BadStatus { .. } => "bad_status",
            Self::EmptyResponse => "empty",
            Self::UnexpectedShape { .. } => "unexpected_shape",
        }
    }
}

impl From<HttpClientError> for LlmError {
    fn from(err: HttpClientError) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }
        match err {
            HttpClientError::BadResponseStatusCode { status, body } => {
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    if body.contains("insufficient_quota") {
                        Self::QuotaExhausted
                    } else {
                        Self::RateLimited
                    }
                } else if status == reqwest::StatusCode::PAYMENT_REQUIRED {
                    Self::QuotaExhausted
                } else {
                    Self::BadStatus { status, body }
                }
            }
            HttpClientError::UnexpectedResponseJsonShape { .. } => {
                Self::UnexpectedShape { source: err }
            }
            HttpClientError::Request { .. } | HttpClientError::ReadPayload { .. } => {
                Self::Network { source: err }
            }
        }
    }
}

/// Single request, single response text completion.
#[async_trait]
pub(crate) trait Completion: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError>;
}

pub(crate) struct ChatCompletionsClient {
    http: crate::http::Client,
    api_url: url::Url,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl ChatCompletionsClient {
    pub(crate) fn new(config: &LlmConfig) -> Result<Self> {
        let base = crate::http::base_client_builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .fatal_ctx(|| "Failed to build the LLM HTTP client")?;

        Ok(Self {
            http: crate::http::create_client_without_retries(base),
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[async_trait]
impl Completion for ChatCompletionsClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: 0.3,
            max_tokens: self.max_tokens,
        };

        let response: ChatResponse = self
            .http
            .post(self.api_url.clone())
            .bearer_auth(&self.api_key)
            .send_and_read_json(request)
            .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_owned())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(LlmError::EmptyResponse);
        }

        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn status(code: u16, body: &str) -> LlmError {
        HttpClientError::BadResponseStatusCode {
            status: reqwest::StatusCode::from_u16(code).unwrap(),
            body: body.to_owned(),
        }
        .into()
    }

    #[test]
    fn classifies_provider_errors() {
        assert_matches!(status(429, r#"{"error":{"type":"requests"}}"#), LlmError::RateLimited);
        assert_matches!(
            status(429, r#"{"error":{"code":"insufficient_quota"}}"#),
            LlmError::QuotaExhausted
        );
        assert_matches!(status(402, ""), LlmError::QuotaExhausted);
        assert_matches!(status(500, "oops"), LlmError::BadStatus { .. });
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(LlmError::RateLimited.is_retryable());
        assert!(LlmError::Timeout.is_retryable());
        assert!(!LlmError::QuotaExhausted.is_retryable());
        assert!(!LlmError::EmptyResponse.is_retryable());
        assert!(!status(400, "bad request").is_retryable());
    }
}
