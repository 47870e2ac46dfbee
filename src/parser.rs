//! The parsing engine: one LLM call, cleanup, validation, and exactly one
//! record write per attempt.
//!
//! Two failure planes are kept strictly apart. Gateway-level failures
//! (transport, auth, rate limit) abort the attempt and leave the record
//! untouched. Content-level failures (unparseable response, schema violation)
//! are a completed attempt and are recorded on the record as a failure.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::cleanup;
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::{CompletionRequest, LlmGateway, Provider};
use crate::patches::PatchStore;
use crate::prompt;
use crate::store::RecipeStore;
use crate::types::{
    FailureKind, ParseOutcome, ParsedRecipe, PatchBundle, RecipeError, RecipeRecord,
};
use crate::units;

/// Runs parse attempts against recipe records.
pub struct ParsingEngine {
    store: Arc<dyn RecipeStore>,
    gateway: Arc<dyn LlmGateway>,
    patches: Arc<PatchStore>,
    config: PipelineConfig,
}

impl ParsingEngine {
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

    /// Run one parse attempt for a stored recipe.
    ///
    /// Loads the record, calls the model with the patched system prompt,
    /// cleans and validates the response, then saves the record exactly once
    /// with the resulting status. Works from any status; a repeat parse of a
    /// `Success` record simply overwrites the result.
    ///
    /// Gateway errors propagate without touching the record.
    pub async fn parse(
        &self,
        recipe_id: Uuid,
        provider: Option<Provider>,
        model: Option<&str>,
    ) -> Result<ParseOutcome, PipelineError> {
        let mut record = self
            .store
            .get(recipe_id)
            .await?
            .ok_or(PipelineError::RecipeNotFound(recipe_id))?;

        if record.raw_text.is_empty() {
            return Err(PipelineError::MissingRawText(recipe_id));
        }

        let provider = provider.unwrap_or(self.config.provider);
        let model_name = model.unwrap_or(&self.config.parse_model);
        let model_id = provider.resolve_model(model_name)?;

        let patches = self.patches.snapshot();
        let request = CompletionRequest {
            provider,
            model: model_id.to_string(),
            system_prompt: prompt::build_system_prompt(&patches),
            user_content: prompt::format_recipe_prompt(&record),
            temperature: self.config.temperature,
        };

        // Aborts before any mutation on gateway failure.
        let raw_response = self.gateway.complete(&request).await?;

        let outcome = interpret_response(&raw_response, &patches);
        match &outcome {
            ParseOutcome::Success(result) => {
                info!(
                    recipe_id = %recipe_id,
                    provider = %provider,
                    model = model_id,
                    ingredients = result.ingredients.len(),
                    "parse succeeded"
                );
                record.mark_success(result.clone());
            }
            ParseOutcome::Failure(error) => {
                warn!(
                    recipe_id = %recipe_id,
                    provider = %provider,
                    model = model_id,
                    kind = error.kind.as_str(),
                    message = %error.message,
                    "parse failed"
                );
                record.mark_failure(error.clone());
            }
        }
        self.store.save(&record).await?;

        Ok(outcome)
    }
}

/// Clean a raw model response and validate it into a parse outcome.
fn interpret_response(raw_response: &str, patches: &PatchBundle) -> ParseOutcome {
    let cleaned = cleanup::clean(raw_response, &patches.cleanup_rules);

    let mut recipe: ParsedRecipe = match serde_json::from_str::<serde_json::Value>(&cleaned) {
        Err(e) => {
            return ParseOutcome::Failure(RecipeError {
                kind: FailureKind::ResponseParse,
                message: format!("response is not valid JSON: {}", e),
                raw_response: Some(raw_response.to_string()),
            });
        }
        Ok(value) => match serde_json::from_value(value) {
            Ok(recipe) => recipe,
            Err(e) => {
                return ParseOutcome::Failure(RecipeError {
                    kind: FailureKind::SchemaValidation,
                    message: format!("response does not match the recipe shape: {}", e),
                    raw_response: Some(raw_response.to_string()),
                });
            }
        },
    };

    if let Err(message) = normalize_recipe(&mut recipe, patches) {
        return ParseOutcome::Failure(RecipeError {
            kind: FailureKind::SchemaValidation,
            message,
            raw_response: Some(raw_response.to_string()),
        });
    }

    ParseOutcome::Success(recipe)
}

/// Semantic validation beyond the serde shape: non-empty title and steps,
/// parseable amounts, and units rewritten to their canonical form (overlay
/// entries win over the base table). An unmappable unit fails the recipe.
fn normalize_recipe(recipe: &mut ParsedRecipe, patches: &PatchBundle) -> Result<(), String> {
    if recipe.title.trim().is_empty() {
        return Err("recipe title is empty".to_string());
    }
    if recipe.instructions.is_empty() {
        return Err("recipe has no instruction steps".to_string());
    }

    for ingredient in &mut recipe.ingredients {
        if ingredient.name.trim().is_empty() {
            return Err("ingredient with empty name".to_string());
        }
        units::parse_amount(&ingredient.amount)
            .map_err(|e| format!("ingredient '{}': {}", ingredient.name, e))?;

        let unit = ingredient.unit.trim();
        if unit.is_empty() {
            continue;
        }
        if units::is_canonical(unit, &patches.unit_mapping) {
            ingredient.unit = unit.to_string();
            continue;
        }
        match units::map_unit(unit, &patches.unit_mapping) {
            Some(canonical) => ingredient.unit = canonical,
            None => {
                return Err(format!(
                    "ingredient '{}': unknown unit: {}",
                    ingredient.name, unit
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::FakeGateway;
    use crate::scrape::ScrapedRecipe;
    use crate::store::MemoryStore;
    use crate::types::RecipeStatus;

    const GOOD_RESPONSE: &str = r#"{
        "title": "Борщ",
        "ingredients": [
            {"name": "свекла", "amount": "2", "unit": "шт", "original_text": "Свекла - 2 шт"}
        ],
        "instructions": ["Варить час"],
        "cooking_time": 60,
        "servings": 4
    }"#;

    struct Fixture {
        store: Arc<MemoryStore>,
        gateway: Arc<FakeGateway>,
        patches: Arc<PatchStore>,
        engine: ParsingEngine,
        _dir: tempfile::TempDir,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let gateway = Arc::new(FakeGateway::new());
        let patches = Arc::new(PatchStore::open(dir.path()).unwrap());
        let engine = ParsingEngine::new(
            Arc::clone(&store) as Arc<dyn RecipeStore>,
            Arc::clone(&gateway) as Arc<dyn LlmGateway>,
            Arc::clone(&patches),
            PipelineConfig::default(),
        );
        Fixture {
            store,
            gateway,
            patches,
            engine,
            _dir: dir,
        }
    }

    async fn saved_record(store: &MemoryStore, paragraphs: Vec<&str>) -> RecipeRecord {
        let record = RecipeRecord::new(
            "борщ",
            ScrapedRecipe {
                title: "Борщ классический".to_string(),
                text_paragraphs: paragraphs.into_iter().map(String::from).collect(),
                url: "https://example.com/borscht".to_string(),
            },
        );
        store.save(&record).await.unwrap();
        record
    }

    #[tokio::test]
    async fn successful_parse_marks_record_success() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Свекла - 2 шт"]).await;
        f.gateway.set_default_response(GOOD_RESPONSE);

        let outcome = f.engine.parse(record.id, None, None).await.unwrap();
        assert!(outcome.is_success());

        let saved = f.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(saved.status, RecipeStatus::Success);
        assert!(saved.result.is_some());
        assert!(saved.error.is_none());
        assert!(saved.parsed_at.is_some());
    }

    #[tokio::test]
    async fn fenced_response_still_parses() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Свекла - 2 шт"]).await;
        f.gateway
            .set_default_response(&format!("```json\n{}\n```", GOOD_RESPONSE));

        let outcome = f.engine.parse(record.id, None, None).await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn invalid_json_records_response_parse_failure() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Свекла - 2 шт"]).await;
        f.gateway.set_default_response("Вот ваш рецепт, приятного!");

        let outcome = f.engine.parse(record.id, None, None).await.unwrap();
        assert!(!outcome.is_success());

        let saved = f.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(saved.status, RecipeStatus::Failure);
        let error = saved.error.unwrap();
        assert_eq!(error.kind, FailureKind::ResponseParse);
        assert!(error.raw_response.is_some());
    }

    #[tokio::test]
    async fn unknown_unit_records_schema_failure() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Соль - щепотка"]).await;
        f.gateway.set_default_response(
            r#"{
                "title": "Борщ",
                "ingredients": [
                    {"name": "соль", "amount": "1", "unit": "щепотка", "original_text": "Соль - щепотка"}
                ],
                "instructions": ["Посолить"]
            }"#,
        );

        let outcome = f.engine.parse(record.id, None, None).await.unwrap();
        assert!(!outcome.is_success());

        let saved = f.store.get(record.id).await.unwrap().unwrap();
        let error = saved.error.unwrap();
        assert_eq!(error.kind, FailureKind::SchemaValidation);
        assert!(error.message.contains("щепотка"));
    }

    #[tokio::test]
    async fn unit_overlay_rescues_unknown_unit() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Соль - щепотка"]).await;

        let mut bundle = PatchBundle::default();
        bundle
            .unit_mapping
            .insert("щепотка".to_string(), "pinch".to_string());
        f.patches.merge(&bundle).await.unwrap();

        f.gateway.set_default_response(
            r#"{
                "title": "Борщ",
                "ingredients": [
                    {"name": "соль", "amount": "1", "unit": "щепотка", "original_text": "Соль - щепотка"}
                ],
                "instructions": ["Посолить"]
            }"#,
        );

        let outcome = f.engine.parse(record.id, None, None).await.unwrap();
        assert!(outcome.is_success());

        // The stored result carries the mapped form, not the surface token.
        let saved = f.store.get(record.id).await.unwrap().unwrap();
        let ingredients = &saved.result.unwrap().ingredients;
        assert_eq!(ingredients[0].unit, "pinch");
    }

    #[tokio::test]
    async fn base_mapped_units_are_stored_canonically() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Мука - 200 грамм", "Вода - 1 стакан"]).await;
        f.gateway.set_default_response(
            r#"{
                "title": "Тесто",
                "ingredients": [
                    {"name": "мука", "amount": "200", "unit": "грамм", "original_text": "Мука - 200 грамм"},
                    {"name": "вода", "amount": "1", "unit": "стакан", "original_text": "Вода - 1 стакан"}
                ],
                "instructions": ["Замесить"]
            }"#,
        );

        let outcome = f.engine.parse(record.id, None, None).await.unwrap();
        assert!(outcome.is_success());

        let saved = f.store.get(record.id).await.unwrap().unwrap();
        let ingredients = saved.result.unwrap().ingredients;
        assert_eq!(ingredients[0].unit, "г");
        assert_eq!(ingredients[1].unit, "чашка");
        // original_text keeps the surface form for traceability.
        assert_eq!(ingredients[0].original_text, "Мука - 200 грамм");
    }

    #[tokio::test]
    async fn gateway_error_leaves_record_untouched() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Свекла - 2 шт"]).await;
        f.gateway.push_result(Err(
            crate::error::GatewayError::Transport("connection reset".to_string()),
        ));

        let result = f.engine.parse(record.id, None, None).await;
        assert!(matches!(
            result,
            Err(PipelineError::Gateway(crate::error::GatewayError::Transport(_)))
        ));

        let saved = f.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(saved.status, RecipeStatus::New);
        assert!(saved.error.is_none());
    }

    #[tokio::test]
    async fn missing_record_and_missing_text_error_out() {
        let f = fixture();
        let missing = f.engine.parse(Uuid::new_v4(), None, None).await;
        assert!(matches!(missing, Err(PipelineError::RecipeNotFound(_))));

        let empty = saved_record(&f.store, vec![]).await;
        let result = f.engine.parse(empty.id, None, None).await;
        assert!(matches!(result, Err(PipelineError::MissingRawText(_))));
    }

    #[tokio::test]
    async fn unknown_model_is_rejected_before_the_call() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Свекла - 2 шт"]).await;
        let result = f
            .engine
            .parse(record.id, Some(Provider::MistralAi), Some("gpt-4o"))
            .await;
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[tokio::test]
    async fn bad_amount_records_schema_failure() {
        let f = fixture();
        let record = saved_record(&f.store, vec!["Мука - много"]).await;
        f.gateway.set_default_response(
            r#"{
                "title": "Хлеб",
                "ingredients": [
                    {"name": "мука", "amount": "много", "unit": "г", "original_text": "Мука - много"}
                ],
                "instructions": ["Печь"]
            }"#,
        );

        let outcome = f.engine.parse(record.id, None, None).await.unwrap();
        assert!(!outcome.is_success());
        let saved = f.store.get(record.id).await.unwrap().unwrap();
        assert_eq!(saved.error.unwrap().kind, FailureKind::SchemaValidation);
    }
}
