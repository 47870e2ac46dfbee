//! HTTP gateway over the OpenAI-compatible chat-completions endpoints the
//! provider set exposes.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, LlmGateway};
use crate::config::PipelineConfig;
use crate::error::GatewayError;

/// Default bound on a single provider call.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Gateway that dispatches completion calls over HTTP.
///
/// Each provider variant supplies its own credential and endpoint; the wire
/// shape is identical across all of them. Calls are bounded by the configured
/// timeout and surface timeouts as [`GatewayError::Transport`].
#[derive(Debug)]
pub struct HttpGateway {
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

impl HttpGateway {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Build a gateway honoring the configured request timeout.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::with_timeout(config.request_timeout)
    }
}

impl Default for HttpGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmGateway for HttpGateway {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError> {
        let provider = request.provider;
        let api_key = env::var(provider.api_key_env_var()).map_err(|_| {
            GatewayError::Auth(format!("{} not set", provider.api_key_env_var()))
        })?;

        let body = ChatRequest {
            model: &request.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user_content,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            temperature: request.temperature,
        };

        tracing::debug!(
            provider = %provider,
            model = %request.model,
            temperature = request.temperature,
            "calling LLM API"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", provider.base_url()))
            .bearer_auth(&api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(GatewayError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            let message = parse_api_error(&text).unwrap_or(text);
            return Err(GatewayError::Auth(message));
        }
        if status.is_server_error() {
            return Err(GatewayError::Transport(format!(
                "provider returned {}: {}",
                status,
                parse_api_error(&text).unwrap_or(text)
            )));
        }
        if !status.is_success() {
            return Err(GatewayError::UnexpectedResponse(format!(
                "provider returned {}: {}",
                status,
                parse_api_error(&text).unwrap_or(text)
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&text)
            .map_err(|e| GatewayError::UnexpectedResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                GatewayError::UnexpectedResponse("no message content in response".to_string())
            })
    }
}

fn parse_api_error(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .map(|response| response.error.message)
}
