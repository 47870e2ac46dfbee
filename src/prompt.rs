//! Prompt assembly for the parse and analysis calls.
//!
//! The parse system prompt is the base instruction plus whatever appendix has
//! accumulated in the patch store. The analysis context is deliberately rich:
//! it embeds the failed record, the active prompt, and the cleanup/unit code
//! the pipeline actually runs, so the model diagnoses against real behavior
//! rather than a description of it.

use crate::types::{PatchBundle, RecipeRecord};

/// Base system prompt for recipe parsing. The patch appendix is appended to
/// this, never edited into it.
pub const PARSE_SYSTEM_PROMPT: &str = "\
You are a recipe parser. You receive the raw text of a Russian-language \
recipe page and return a single JSON object with this exact structure:

{
  \"title\": \"recipe name\",
  \"ingredients\": [
    {\"name\": \"ingredient name\", \"amount\": \"quantity\", \"unit\": \"unit\", \"original_text\": \"source line\"}
  ],
  \"instructions\": [\"step 1\", \"step 2\"],
  \"cooking_time\": minutes as integer or null,
  \"servings\": integer or null
}

Rules:
- Respond with JSON only, no commentary and no markdown fences.
- amount may be a number, a decimal, or a range like \"2-3\"; use \"\" when the \
recipe says to taste.
- unit must be one of: г, мл, шт, ст.л, ч.л, чашка, л, кг.
- original_text must quote the source line the ingredient came from.
- Keep instruction steps in source order.";

/// Compose the effective parsing system prompt from the base instruction and
/// the accumulated patch appendix.
pub fn build_system_prompt(patches: &PatchBundle) -> String {
    let appendix = patches.system_prompt_append.trim();
    if appendix.is_empty() {
        PARSE_SYSTEM_PROMPT.to_string()
    } else {
        format!("{}\n\n{}", PARSE_SYSTEM_PROMPT, appendix)
    }
}

/// Format a recipe record as the user message for the parse call.
pub fn format_recipe_prompt(record: &RecipeRecord) -> String {
    format!(
        "Название: {}\nИсточник: {}\n\nТекст рецепта:\n{}",
        record.raw_title,
        record.source_url,
        record.raw_text.join("\n")
    )
}

/// System prompt for the error-analysis call. The model must answer with a
/// report that may carry a machine-applicable patch bundle.
pub const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are a senior engineer debugging a recipe-parsing pipeline. You receive a \
failed parse attempt together with the pipeline's parsing prompt, the exact \
cleanup and unit-mapping code it runs, and a few recently successful parses \
for contrast.

Diagnose why this parse failed and respond with a single JSON object:

{
  \"root_cause\": \"one-paragraph diagnosis\",
  \"recommendations\": [\"actionable suggestion\", ...],
  \"patches\": {
    \"unit_mapping\": {\"surface unit token\": \"canonical unit\"},
    \"cleanup_rules\": [
      {\"pattern\": \"text or regex to find\", \"replacement\": \"replacement\", \"regex\": false}
    ],
    \"system_prompt_append\": \"extra instruction for the parsing prompt\"
  }
}

Rules:
- Respond with JSON only, no commentary and no markdown fences.
- Only propose patches you are confident generalize beyond this one recipe; \
omit \"patches\" or leave its parts empty otherwise.
- unit_mapping values must come from the canonical unit list in the embedded \
code.
- cleanup_rules run against the raw model response before JSON parsing, in \
order, earliest first.";

// The analysis model reads the same source the pipeline compiles. Embedding
// the files keeps the diagnosis grounded when these modules change.
const CLEANUP_SOURCE: &str = include_str!("cleanup.rs");
const UNITS_SOURCE: &str = include_str!("units.rs");

/// Build the user message for the analysis call: the failed record, the
/// active parsing prompt, the relevant pipeline code, and up to a few
/// successful parses for contrast.
pub fn format_analysis_context(
    record: &RecipeRecord,
    successful_examples: &[RecipeRecord],
    parse_system_prompt: &str,
) -> String {
    let mut context = String::new();

    context.push_str("## Failed recipe\n\n");
    context.push_str(&format!("Query: {}\n", record.query));
    context.push_str(&format!("Title: {}\n", record.raw_title));
    context.push_str(&format!("Source: {}\n\n", record.source_url));
    context.push_str("Raw text:\n");
    context.push_str(&record.raw_text.join("\n"));
    context.push_str("\n\n");

    if let Some(error) = &record.error {
        context.push_str("## Recorded failure\n\n");
        context.push_str(&format!("Kind: {}\n", error.kind.as_str()));
        context.push_str(&format!("Message: {}\n", error.message));
        if let Some(raw) = &error.raw_response {
            context.push_str("\nRaw model response:\n");
            context.push_str(raw);
            context.push('\n');
        }
        context.push('\n');
    }

    context.push_str("## Active parsing system prompt\n\n");
    context.push_str(parse_system_prompt);
    context.push_str("\n\n");

    context.push_str("## Pipeline code (read-only context)\n\n");
    context.push_str("### Response cleanup\n\n```rust\n");
    context.push_str(CLEANUP_SOURCE);
    context.push_str("```\n\n### Unit mapping and amount parsing\n\n```rust\n");
    context.push_str(UNITS_SOURCE);
    context.push_str("```\n\n");

    if !successful_examples.is_empty() {
        context.push_str("## Recent successful parses\n\n");
        for example in successful_examples {
            context.push_str(&format!("### {}\n\n", example.raw_title));
            context.push_str("Raw text:\n");
            context.push_str(&example.raw_text.join("\n"));
            context.push_str("\n\nParsed result:\n");
            if let Some(result) = &example.result {
                match serde_json::to_string_pretty(result) {
                    Ok(json) => context.push_str(&json),
                    Err(_) => context.push_str("(unavailable)"),
                }
            }
            context.push_str("\n\n");
        }
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scrape::ScrapedRecipe;
    use crate::types::{FailureKind, RecipeError};

    fn failed_record() -> RecipeRecord {
        let mut record = RecipeRecord::new(
            "борщ",
            ScrapedRecipe {
                title: "Борщ классический".to_string(),
                text_paragraphs: vec!["Свекла - 2 шт".to_string(), "Соль - по вкусу".to_string()],
                url: "https://example.com/borscht".to_string(),
            },
        );
        record.mark_failure(RecipeError {
            kind: FailureKind::SchemaValidation,
            message: "unknown unit: щепотка".to_string(),
            raw_response: Some("{\"title\": \"Борщ\"}".to_string()),
        });
        record
    }

    #[test]
    fn system_prompt_without_appendix_is_the_base() {
        assert_eq!(
            build_system_prompt(&PatchBundle::default()),
            PARSE_SYSTEM_PROMPT
        );
    }

    #[test]
    fn system_prompt_appends_patch_text() {
        let bundle = PatchBundle {
            system_prompt_append: "Always translate units to Russian.".to_string(),
            ..Default::default()
        };
        let prompt = build_system_prompt(&bundle);
        assert!(prompt.starts_with(PARSE_SYSTEM_PROMPT));
        assert!(prompt.ends_with("Always translate units to Russian."));
    }

    #[test]
    fn recipe_prompt_includes_title_url_and_paragraphs() {
        let record = failed_record();
        let prompt = format_recipe_prompt(&record);
        assert!(prompt.contains("Борщ классический"));
        assert!(prompt.contains("https://example.com/borscht"));
        assert!(prompt.contains("Свекла - 2 шт\nСоль - по вкусу"));
    }

    #[test]
    fn analysis_context_embeds_failure_and_code() {
        let record = failed_record();
        let context = format_analysis_context(&record, &[], PARSE_SYSTEM_PROMPT);
        assert!(context.contains("unknown unit: щепотка"));
        assert!(context.contains("schema_validation"));
        assert!(context.contains("Raw model response:"));
        assert!(context.contains("pub fn clean"));
        assert!(context.contains("BASE_UNIT_MAPPING"));
        assert!(context.contains(PARSE_SYSTEM_PROMPT));
        assert!(!context.contains("Recent successful parses"));
    }

    #[test]
    fn analysis_context_lists_successful_examples() {
        let record = failed_record();
        let mut example = RecipeRecord::new(
            "плов",
            ScrapedRecipe {
                title: "Плов узбекский".to_string(),
                text_paragraphs: vec!["Рис - 400 г".to_string()],
                url: "https://example.com/plov".to_string(),
            },
        );
        example.mark_success(crate::types::ParsedRecipe {
            title: "Плов узбекский".to_string(),
            ingredients: vec![],
            instructions: vec!["Варить".to_string()],
            cooking_time: None,
            servings: None,
        });

        let context = format_analysis_context(&record, &[example], PARSE_SYSTEM_PROMPT);
        assert!(context.contains("Recent successful parses"));
        assert!(context.contains("Плов узбекский"));
    }
}
