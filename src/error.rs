use thiserror::Error;
use uuid::Uuid;

use crate::types::RecipeStatus;

/// Errors from the LLM gateway, provider-facing.
///
/// No retry logic lives behind these: `Transport` and `RateLimited` are
/// retryable by the caller, `Auth` is fatal until reconfigured.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing or rejected credential: {0}")]
    Auth(String),

    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Rate limited, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Unexpected provider payload: {0}")]
    UnexpectedResponse(String),
}

/// Errors from the scraping collaborator.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("No recipe found for query: {0}")]
    NotFound(String),

    #[error("Scrape failed: {0}")]
    Failed(String),
}

/// Errors from the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Configuration problems detected before any network call is made.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Unknown model '{model}' for provider '{provider}'")]
    UnknownModel { provider: String, model: String },
}

/// Top-level pipeline errors surfaced to callers.
///
/// Content-facing parse failures (`ResponseParse`, `SchemaValidation`) are
/// never carried here - they are recorded on the recipe as a
/// [`crate::types::RecipeError`] and returned inside
/// [`crate::types::ParseOutcome::Failure`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Recipe {0} not found")]
    RecipeNotFound(Uuid),

    #[error("Analysis {0} not found")]
    AnalysisNotFound(Uuid),

    #[error("Analysis {analysis_id} does not belong to recipe {recipe_id}")]
    AnalysisMismatch { analysis_id: Uuid, recipe_id: Uuid },

    #[error("Recipe {id} has status '{status}', expected '{expected}'")]
    InvalidState {
        id: Uuid,
        status: RecipeStatus,
        expected: RecipeStatus,
    },

    #[error("Recipe {0} has no raw text to parse")]
    MissingRawText(Uuid),

    #[error("Failed to parse analysis response as JSON: {0}")]
    AnalysisParse(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
