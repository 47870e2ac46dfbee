//! LLM-backed diagnosis of failed parses.
//!
//! Only `Failure` records are analyzable. The analysis call gets the failed
//! record, the active parsing prompt, the pipeline's own cleanup and unit
//! code, and a handful of recent successes for contrast; the model answers
//! with a root cause, recommendations, and an optional patch bundle.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::cleanup;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::{CompletionRequest, LlmGateway, Provider};
use crate::patches::PatchStore;
use crate::prompt;
use crate::store::RecipeStore;
use crate::types::{AnalysisReport, ErrorAnalysis, RecipeRecord, RecipeStatus};

/// Runs error-analysis calls against failed recipe records.
pub struct ErrorAnalyzer {
    store: Arc<dyn RecipeStore>,
    gateway: Arc<dyn LlmGateway>,
    patches: Arc<PatchStore>,
    config: PipelineConfig,
}

impl ErrorAnalyzer {
    pub fn new(
        store: Arc<dyn RecipeStore>,
        gateway: Arc<dyn LlmGateway>,
        patches: Arc<PatchStore>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            patches,
            config,
        }
    }

    /// Diagnose a failed recipe without persisting anything.
    ///
    /// The caller decides when the returned analysis is stored; the
    /// orchestrator attaches a reparse outcome first when one was requested.
    pub async fn diagnose(
        &self,
        recipe_id: Uuid,
        provider: Option<Provider>,
        model: Option<&str>,
    ) -> Result<ErrorAnalysis, PipelineError> {
        let record = self
            .store
            .get(recipe_id)
            .await?
            .ok_or(PipelineError::RecipeNotFound(recipe_id))?;

        if record.status != RecipeStatus::Failure {
            return Err(PipelineError::InvalidState {
                id: recipe_id,
                status: record.status,
                expected: RecipeStatus::Failure,
            });
        }

        let provider = provider.unwrap_or(self.config.provider);
        let model_name = model.unwrap_or(&self.config.analysis_model);
        let model_id = provider.resolve_model(model_name)?;

        let examples = self.successful_examples(recipe_id).await?;
        let system_prompt = prompt::build_system_prompt(&self.patches.snapshot());

        let request = CompletionRequest {
            provider,
            model: model_id.to_string(),
            system_prompt: prompt::ANALYSIS_SYSTEM_PROMPT.to_string(),
            user_content: prompt::format_analysis_context(&record, &examples, &system_prompt),
            temperature: self.config.temperature,
        };

        let raw_response = self.gateway.complete(&request).await?;
        let report = parse_report(&raw_response)?;

        info!(
            recipe_id = %recipe_id,
            model = model_id,
            has_patches = report.patches.is_some(),
            "analysis produced"
        );

        Ok(ErrorAnalysis {
            id: Uuid::new_v4(),
            recipe_id,
            summary: report.root_cause.clone(),
            report,
            model_used: model_id.to_string(),
            created_at: Utc::now(),
            reparse_result: None,
        })
    }

    /// Diagnose a failed recipe and persist the analysis.
    pub async fn analyze(
        &self,
        recipe_id: Uuid,
        provider: Option<Provider>,
        model: Option<&str>,
    ) -> Result<ErrorAnalysis, PipelineError> {
        let analysis = self.diagnose(recipe_id, provider, model).await?;
        self.store.add_analysis(&analysis).await?;
        Ok(analysis)
    }

    /// Recent successful records for contrast, excluding the failed one,
    /// capped at the configured example count.
    async fn successful_examples(
        &self,
        exclude: Uuid,
    ) -> Result<Vec<RecipeRecord>, PipelineError> {
        let mut examples = self
            .store
            .list_by_status(Some(RecipeStatus::Success))
            .await?;
        examples.retain(|r| r.id != exclude);
        examples.truncate(self.config.max_successful_examples);
        Ok(examples)
    }
}

/// Parse the analysis response. The same fence/span cleanup the parse path
/// uses applies here, but with no patch rules; a malformed report is a
/// pipeline error rather than a recorded failure.
fn parse_report(raw_response: &str) -> Result<AnalysisReport, PipelineError> {
    let cleaned = cleanup::clean(raw_response, &[]);
    serde_json::from_str(&cleaned).map_err(|e| PipelineError::AnalysisParse(e.to_string()))
}
