//! LLM gateway: a uniform call contract over interchangeable providers.
//!
//! Providers form a closed set; each variant owns its credential env var,
//! endpoint, and model table, but all expose the identical chat-completion
//! call shape. Retries are a caller policy decision - nothing here retries.

mod fake;
mod gateway;

pub use fake::FakeGateway;
pub use gateway::{HttpGateway, DEFAULT_TIMEOUT_SECS};

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, GatewayError};

/// The closed set of supported LLM providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    TogetherAi,
    VercelAi,
    MistralAi,
    DeepseekAi,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[
        Provider::TogetherAi,
        Provider::VercelAi,
        Provider::MistralAi,
        Provider::DeepseekAi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::TogetherAi => "together_ai",
            Provider::VercelAi => "vercel_ai",
            Provider::MistralAi => "mistral_ai",
            Provider::DeepseekAi => "deepseek_ai",
        }
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s {
            "together_ai" => Ok(Provider::TogetherAi),
            "vercel_ai" => Ok(Provider::VercelAi),
            "mistral_ai" => Ok(Provider::MistralAi),
            "deepseek_ai" => Ok(Provider::DeepseekAi),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env_var(&self) -> &'static str {
        match self {
            Provider::TogetherAi => "TOGETHER_AI_API_KEY",
            Provider::VercelAi => "AI_GATEWAY_API_KEY",
            Provider::MistralAi => "MISTRAL_API_KEY",
            Provider::DeepseekAi => "DEEPSEEK_API_KEY",
        }
    }

    /// Base URL of the provider's OpenAI-compatible API.
    pub fn base_url(&self) -> &'static str {
        match self {
            Provider::TogetherAi => "https://api.together.xyz/v1",
            Provider::VercelAi => "https://ai-gateway.vercel.sh/v1",
            Provider::MistralAi => "https://api.mistral.ai/v1",
            Provider::DeepseekAi => "https://api.deepseek.com/v1",
        }
    }

    /// Model table for this provider: short name -> provider model id.
    pub fn available_models(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Provider::TogetherAi => &[
                ("gpt-oss-20b", "openai/gpt-oss-20b"),
                ("llama-3.2-3b", "meta-llama/Llama-3.2-3B-Instruct-Turbo"),
                ("llama-3.2-11b", "meta-llama/Llama-3.2-11B-Instruct-Turbo"),
            ],
            Provider::VercelAi => &[
                ("gpt-4o-mini", "openai/gpt-4o-mini"),
                ("gpt-4o", "openai/gpt-4o"),
                ("gpt-4-turbo", "openai/gpt-4-turbo"),
                ("claude-opus", "anthropic/claude-opus-4.5"),
                ("claude-sonnet", "anthropic/claude-sonnet-4"),
            ],
            Provider::MistralAi => &[
                ("open-mistral-7b", "open-mistral-7b"),
                ("mistral-small-latest", "mistral-small-latest"),
                ("mistral-medium-latest", "mistral-medium-latest"),
            ],
            Provider::DeepseekAi => &[
                ("deepseek-chat", "deepseek-chat"),
                ("deepseek-coder", "deepseek-coder"),
            ],
        }
    }

    /// Resolve a short model name to the provider's model id.
    pub fn resolve_model(&self, name: &str) -> Result<&'static str, ConfigError> {
        self.available_models()
            .iter()
            .find(|(short, _)| *short == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| ConfigError::UnknownModel {
                provider: self.as_str().to_string(),
                model: name.to_string(),
            })
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completion call: system instructions plus user content.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub provider: Provider,
    /// Resolved provider model id.
    pub model: String,
    pub system_prompt: String,
    pub user_content: String,
    pub temperature: f32,
}

/// Uniform call contract over the provider set.
///
/// Implementations must be stateless and thread-safe. A bounded timeout is
/// applied by the HTTP implementation; timeouts surface as
/// [`GatewayError::Transport`].
#[async_trait]
pub trait LlmGateway: Send + Sync + fmt::Debug {
    /// Send the request and return the model's text response.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GatewayError>;
}
