//! Pipeline configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::Provider;
use crate::patches::PatchStore;

/// Default provider when none is configured.
pub const DEFAULT_PROVIDER: Provider = Provider::MistralAi;

/// Default model for recipe parsing (small and cheap).
pub const DEFAULT_PARSE_MODEL: &str = "open-mistral-7b";

/// Default model for error analysis. Diagnosis reads code and proposes
/// patches, so it gets a more capable model than parsing.
pub const DEFAULT_ANALYSIS_MODEL: &str = "mistral-small-latest";

/// Temperature for both parse and analysis calls.
pub const DEFAULT_TEMPERATURE: f32 = 0.1;

/// Number of successful recipes included as positive examples in analysis.
pub const DEFAULT_MAX_SUCCESSFUL_EXAMPLES: usize = 3;

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Default provider for parse and analysis calls.
    pub provider: Provider,
    /// Short model name used for parsing (resolved per provider).
    pub parse_model: String,
    /// Short model name used for error analysis.
    pub analysis_model: String,
    pub temperature: f32,
    pub max_successful_examples: usize,
    /// Directory holding the three patch artifacts.
    pub patches_dir: PathBuf,
    /// Bound on a single provider call.
    pub request_timeout: Duration,
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `SAMOVAR_LLM_PROVIDER`: "together_ai" | "vercel_ai" | "mistral_ai" | "deepseek_ai"
    /// - `SAMOVAR_PARSE_MODEL`: short model name (default: "open-mistral-7b")
    /// - `SAMOVAR_ANALYSIS_MODEL`: short model name (default: "mistral-small-latest")
    /// - `SAMOVAR_LLM_TEMPERATURE`: temperature (default: 0.1)
    /// - `SAMOVAR_PATCHES_DIR`: patches directory (default: ~/.samovar/patches)
    /// - `SAMOVAR_REQUEST_TIMEOUT_SECS`: per-call timeout (default: 120)
    ///
    /// Provider API keys are read lazily at call time by the gateway.
    pub fn from_env() -> Result<Self, ConfigError> {
        let provider = match env::var("SAMOVAR_LLM_PROVIDER") {
            Ok(name) => Provider::parse(&name)?,
            Err(_) => DEFAULT_PROVIDER,
        };

        let parse_model =
            env::var("SAMOVAR_PARSE_MODEL").unwrap_or_else(|_| DEFAULT_PARSE_MODEL.to_string());
        let analysis_model = env::var("SAMOVAR_ANALYSIS_MODEL")
            .unwrap_or_else(|_| DEFAULT_ANALYSIS_MODEL.to_string());

        let temperature = env::var("SAMOVAR_LLM_TEMPERATURE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        let patches_dir = env::var("SAMOVAR_PATCHES_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PatchStore::default_dir());

        let request_timeout = env::var("SAMOVAR_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(crate::llm::DEFAULT_TIMEOUT_SECS));

        Ok(Self {
            provider,
            parse_model,
            analysis_model,
            temperature,
            max_successful_examples: DEFAULT_MAX_SUCCESSFUL_EXAMPLES,
            patches_dir,
            request_timeout,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER,
            parse_model: DEFAULT_PARSE_MODEL.to_string(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_successful_examples: DEFAULT_MAX_SUCCESSFUL_EXAMPLES,
            patches_dir: PatchStore::default_dir(),
            request_timeout: Duration::from_secs(crate::llm::DEFAULT_TIMEOUT_SECS),
        }
    }
}
