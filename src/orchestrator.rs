//! The pipeline facade: scrape, parse, analyze, patch, reparse.
//!
//! Wires the engines to their collaborators and owns the multi-step analyze
//! flow. Each analysis is persisted exactly once, after any requested reparse
//! has run, so the stored record carries the reparse outcome.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::analysis::ErrorAnalyzer;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::{LlmGateway, Provider};
use crate::parser::ParsingEngine;
use crate::patches::PatchStore;
use crate::scrape::Scraper;
use crate::store::RecipeStore;
use crate::types::{
    ErrorAnalysis, ParseOutcome, RecipeRecord, RecipeStats, RecipeStatus,
};

/// Options for one analyze call.
///
/// `reparse` implies applying patches first: a reparse without the proposed
/// corrections in place would just reproduce the failure.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    /// Provider override for the analysis call (and any reparse).
    pub provider: Option<Provider>,
    /// Model override for the analysis call.
    pub model: Option<String>,
    /// Merge proposed patches into the global store.
    pub apply_patches: bool,
    /// Re-run the parse after patches are applied.
    pub reparse: bool,
}

/// Facade over the whole pipeline.
pub struct PipelineOrchestrator {
    store: Arc<dyn RecipeStore>,
    scraper: Arc<dyn Scraper>,
    patches: Arc<PatchStore>,
    parser: ParsingEngine,
    analyzer: ErrorAnalyzer,
}

impl PipelineOrchestrator {
    pub fn new(
        store: Arc<dyn RecipeStore>,
        scraper: Arc<dyn Scraper>,
        gateway: Arc<dyn LlmGateway>,
        patches: Arc<PatchStore>,
        config: PipelineConfig,
    ) -> Self {
        let parser = ParsingEngine::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&patches),
            config.clone(),
        );
        let analyzer = ErrorAnalyzer::new(
            Arc::clone(&store),
            Arc::clone(&gateway),
            Arc::clone(&patches),
            config,
        );
        Self {
            store,
            scraper,
            patches,
            parser,
            analyzer,
        }
    }

    /// Search for a recipe and store the scraped page as a `New` record.
    pub async fn search_and_save(&self, query: &str) -> Result<RecipeRecord, PipelineError> {
        let scraped = self.scraper.search(query).await?;
        let record = RecipeRecord::new(query, scraped);
        self.store.save(&record).await?;
        info!(recipe_id = %record.id, query, "recipe scraped and saved");
        Ok(record)
    }

    /// Run one parse attempt for a stored recipe.
    pub async fn parse(
        &self,
        recipe_id: Uuid,
        provider: Option<Provider>,
        model: Option<&str>,
    ) -> Result<ParseOutcome, PipelineError> {
        self.parser.parse(recipe_id, provider, model).await
    }

    /// Analyze a failed recipe, optionally applying proposed patches and
    /// reparsing.
    ///
    /// The analysis is stored once, at the end. If a requested reparse is
    /// aborted by a gateway error, the analysis is stored without a reparse
    /// outcome and the error propagates; applied patches stay applied.
    pub async fn analyze(
        &self,
        recipe_id: Uuid,
        options: AnalyzeOptions,
    ) -> Result<ErrorAnalysis, PipelineError> {
        let mut analysis = self
            .analyzer
            .diagnose(recipe_id, options.provider, options.model.as_deref())
            .await?;

        let apply = options.apply_patches || options.reparse;
        if apply {
            if let Some(bundle) = analysis.report.patches.as_ref().filter(|b| !b.is_empty()) {
                self.patches.merge(bundle).await?;
            }
        }

        if options.reparse {
            match self.parser.parse(recipe_id, options.provider, None).await {
                Ok(outcome) => {
                    info!(
                        recipe_id = %recipe_id,
                        status = %outcome.status(),
                        "reparse after analysis"
                    );
                    analysis.reparse_result = Some(outcome.into());
                }
                Err(e) => {
                    // Keep the diagnosis even though the reparse never ran.
                    warn!(recipe_id = %recipe_id, error = %e, "reparse aborted");
                    self.store.add_analysis(&analysis).await?;
                    return Err(e);
                }
            }
        }

        self.store.add_analysis(&analysis).await?;
        Ok(analysis)
    }

    /// Merge the patches of an already-stored analysis into the global store.
    pub async fn apply_patches_from_analysis(
        &self,
        recipe_id: Uuid,
        analysis_id: Uuid,
    ) -> Result<(), PipelineError> {
        self.store
            .get(recipe_id)
            .await?
            .ok_or(PipelineError::RecipeNotFound(recipe_id))?;
        let analysis = self
            .store
            .get_analysis(analysis_id)
            .await?
            .ok_or(PipelineError::AnalysisNotFound(analysis_id))?;
        if analysis.recipe_id != recipe_id {
            return Err(PipelineError::AnalysisMismatch {
                analysis_id,
                recipe_id,
            });
        }

        if let Some(bundle) = analysis.report.patches.as_ref().filter(|b| !b.is_empty()) {
            self.patches.merge(bundle).await?;
        }
        Ok(())
    }

    /// All stored analyses for a recipe, oldest first.
    pub async fn get_analyses(
        &self,
        recipe_id: Uuid,
    ) -> Result<Vec<ErrorAnalysis>, PipelineError> {
        self.store
            .get(recipe_id)
            .await?
            .ok_or(PipelineError::RecipeNotFound(recipe_id))?;
        Ok(self.store.analyses_for(recipe_id).await?)
    }

    pub async fn get_recipe(&self, recipe_id: Uuid) -> Result<RecipeRecord, PipelineError> {
        self.store
            .get(recipe_id)
            .await?
            .ok_or(PipelineError::RecipeNotFound(recipe_id))
    }

    /// List stored recipes, newest first, optionally filtered by status.
    pub async fn list_recipes(
        &self,
        status: Option<RecipeStatus>,
    ) -> Result<Vec<RecipeRecord>, PipelineError> {
        Ok(self.store.list_by_status(status).await?)
    }

    /// Delete a recipe and its analyses. Accumulated patches are untouched.
    pub async fn delete_recipe(&self, recipe_id: Uuid) -> Result<(), PipelineError> {
        if !self.store.delete(recipe_id).await? {
            return Err(PipelineError::RecipeNotFound(recipe_id));
        }
        info!(recipe_id = %recipe_id, "recipe deleted");
        Ok(())
    }

    /// Aggregate counts, optionally restricted to a created-at range.
    pub async fn stats(
        &self,
        date_from: Option<chrono::DateTime<chrono::Utc>>,
        date_to: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<RecipeStats, PipelineError> {
        Ok(self.store.stats(date_from, date_to).await?)
    }

    /// The global patch store.
    pub fn patches(&self) -> &PatchStore {
        &self.patches
    }
}
