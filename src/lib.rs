pub mod analysis;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod llm;
pub mod orchestrator;
pub mod parser;
pub mod patches;
pub mod prompt;
pub mod scrape;
pub mod store;
pub mod types;
pub mod units;

pub use analysis::ErrorAnalyzer;
pub use config::PipelineConfig;
pub use error::{ConfigError, GatewayError, PipelineError, ScrapeError, StoreError};
pub use llm::{CompletionRequest, FakeGateway, HttpGateway, LlmGateway, Provider};
pub use orchestrator::{AnalyzeOptions, PipelineOrchestrator};
pub use parser::ParsingEngine;
pub use patches::PatchStore;
pub use scrape::{FakeScraper, ScrapedRecipe, Scraper};
pub use store::{DiskStore, MemoryStore, RecipeStore};
pub use types::{
    AnalysisReport, CleanupRule, ErrorAnalysis, FailureKind, Ingredient, ParseOutcome,
    ParsedRecipe, PatchBundle, RecipeError, RecipeRecord, RecipeStats, RecipeStatus,
    ReparseOutcome,
};
