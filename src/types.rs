//! Core data model: recipe records, parsed recipes, analyses, and patches.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::scrape::ScrapedRecipe;

/// Lifecycle status of a recipe record.
///
/// `New` is the initial state set by the scrape step. A parse moves the
/// record to `Success` or `Failure`; a record never returns to `New`.
/// `Failure` is re-enterable via reparse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipeStatus {
    New,
    Success,
    Failure,
}

impl RecipeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecipeStatus::New => "new",
            RecipeStatus::Success => "success",
            RecipeStatus::Failure => "failure",
        }
    }
}

impl fmt::Display for RecipeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a recorded parse failure. Both kinds mean the attempt genuinely
/// completed, just unsuccessfully, so they always mutate the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The cleaned model response was not valid JSON.
    ResponseParse,
    /// The JSON did not match the required recipe shape.
    SchemaValidation,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ResponseParse => "response_parse",
            FailureKind::SchemaValidation => "schema_validation",
        }
    }
}

/// Typed failure result recorded on a recipe. The raw model response is
/// carried here so a later analysis pass has full forensic context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeError {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<String>,
}

/// A single ingredient in a parsed recipe.
///
/// `amount` is kept as the surface string the model produced (a number,
/// comma-decimal, or range like "2-3"); it is validated as parseable during
/// schema validation. `original_text` preserves the source fragment for
/// traceability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ingredient {
    pub name: String,
    #[serde(deserialize_with = "de_amount")]
    pub amount: String,
    pub unit: String,
    pub original_text: String,
}

impl Ingredient {
    /// Numeric value of the amount, if it parses. Ranges average, "по вкусу"
    /// and empty amounts read as zero.
    pub fn amount_value(&self) -> Option<f64> {
        crate::units::parse_amount(&self.amount).ok()
    }
}

/// Accept a JSON number or string for the amount field; keep the surface form.
fn de_amount<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Null => Ok(String::new()),
        other => Err(serde::de::Error::custom(format!(
            "amount must be a number or string, got {}",
            other
        ))),
    }
}

/// The validated structured result of a successful parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedRecipe {
    pub title: String,
    pub ingredients: Vec<Ingredient>,
    pub instructions: Vec<String>,
    #[serde(default)]
    pub cooking_time: Option<u32>,
    #[serde(default)]
    pub servings: Option<u32>,
}

/// One recipe record, created by the scrape step with status `New`.
///
/// Invariant: `result` is `Some` iff status is `Success`; `error` is `Some`
/// iff status is `Failure`. The `mark_success` / `mark_failure` helpers are
/// the only mutation points and keep both fields in lockstep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub id: Uuid,
    /// Search query that produced this recipe.
    pub query: String,
    pub source_url: String,
    pub raw_title: String,
    /// Ordered raw text paragraphs extracted from the source page.
    pub raw_text: Vec<String>,
    pub status: RecipeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ParsedRecipe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecipeError>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed_at: Option<DateTime<Utc>>,
}

impl RecipeRecord {
    /// Create a fresh record from a scraped page, status `New`.
    pub fn new(query: impl Into<String>, scraped: ScrapedRecipe) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            query: query.into(),
            source_url: scraped.url,
            raw_title: scraped.title,
            raw_text: scraped.text_paragraphs,
            status: RecipeStatus::New,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
            parsed_at: None,
        }
    }

    /// Record a successful parse. Clears any prior error.
    pub fn mark_success(&mut self, result: ParsedRecipe) {
        let now = Utc::now();
        self.status = RecipeStatus::Success;
        self.result = Some(result);
        self.error = None;
        self.parsed_at = Some(now);
        self.updated_at = now;
    }

    /// Record a failed parse. Clears any prior result.
    pub fn mark_failure(&mut self, error: RecipeError) {
        self.status = RecipeStatus::Failure;
        self.result = None;
        self.error = Some(error);
        self.updated_at = Utc::now();
    }
}

/// Outcome of one parse attempt. A gateway-level failure (transport, auth,
/// rate limit) never reaches this type - it aborts the call instead.
#[derive(Debug, Clone)]
pub enum ParseOutcome {
    Success(ParsedRecipe),
    Failure(RecipeError),
}

impl ParseOutcome {
    pub fn status(&self) -> RecipeStatus {
        match self {
            ParseOutcome::Success(_) => RecipeStatus::Success,
            ParseOutcome::Failure(_) => RecipeStatus::Failure,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ParseOutcome::Success(_))
    }
}

/// A single find/replace cleanup rule. Literal by default; `regex: true`
/// switches the pattern to a regular expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupRule {
    pub pattern: String,
    pub replacement: String,
    #[serde(default)]
    pub regex: bool,
}

/// A correction bundle proposed by analysis, mergeable into the global
/// [`crate::patches::PatchStore`]. All three parts are independent and any
/// may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatchBundle {
    /// Surface unit token -> canonical unit. Keys unique, last value wins.
    #[serde(default)]
    pub unit_mapping: BTreeMap<String, String>,
    /// Ordered find/replace rules, applied earliest-registered first.
    #[serde(default)]
    pub cleanup_rules: Vec<CleanupRule>,
    /// Free text appended to the parsing system prompt.
    #[serde(default)]
    pub system_prompt_append: String,
}

impl PatchBundle {
    pub fn is_empty(&self) -> bool {
        self.unit_mapping.is_empty()
            && self.cleanup_rules.is_empty()
            && self.system_prompt_append.trim().is_empty()
    }
}

/// Structured diagnostic response from the analysis model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Root-cause narrative.
    pub root_cause: String,
    /// Free-text recommendations.
    #[serde(default)]
    pub recommendations: Vec<String>,
    /// Machine-applicable corrections, if the model proposed any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patches: Option<PatchBundle>,
}

/// Snapshot of a reparse attempt recorded on an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReparseOutcome {
    pub status: RecipeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ParsedRecipe>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RecipeError>,
}

impl From<ParseOutcome> for ReparseOutcome {
    fn from(outcome: ParseOutcome) -> Self {
        match outcome {
            ParseOutcome::Success(result) => Self {
                status: RecipeStatus::Success,
                result: Some(result),
                error: None,
            },
            ParseOutcome::Failure(error) => Self {
                status: RecipeStatus::Failure,
                result: None,
                error: Some(error),
            },
        }
    }
}

/// One persisted error analysis. Append-only: multiple analyses may exist
/// per recipe, and none is ever mutated after being stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub id: Uuid,
    pub recipe_id: Uuid,
    pub report: AnalysisReport,
    /// Human-readable summary (the report's root cause).
    pub summary: String,
    /// Model name used for the diagnosis.
    pub model_used: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reparse_result: Option<ReparseOutcome>,
}

/// Aggregate counts over stored recipes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecipeStats {
    pub total: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Failure-kind breakdown for failed recipes.
    pub by_error_kind: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraped() -> ScrapedRecipe {
        ScrapedRecipe {
            title: "Борщ".to_string(),
            text_paragraphs: vec!["Свекла - 2 шт".to_string()],
            url: "https://example.com/borscht".to_string(),
        }
    }

    #[test]
    fn new_record_starts_clean() {
        let record = RecipeRecord::new("борщ", scraped());
        assert_eq!(record.status, RecipeStatus::New);
        assert!(record.result.is_none());
        assert!(record.error.is_none());
        assert!(record.parsed_at.is_none());
    }

    #[test]
    fn mark_success_clears_error() {
        let mut record = RecipeRecord::new("борщ", scraped());
        record.mark_failure(RecipeError {
            kind: FailureKind::ResponseParse,
            message: "bad json".to_string(),
            raw_response: Some("not json".to_string()),
        });
        assert_eq!(record.status, RecipeStatus::Failure);
        assert!(record.error.is_some());

        record.mark_success(ParsedRecipe {
            title: "Борщ".to_string(),
            ingredients: vec![],
            instructions: vec!["Варить".to_string()],
            cooking_time: Some(60),
            servings: None,
        });
        assert_eq!(record.status, RecipeStatus::Success);
        assert!(record.result.is_some());
        assert!(record.error.is_none());
        assert!(record.parsed_at.is_some());
    }

    #[test]
    fn ingredient_amount_accepts_number_or_string() {
        let from_number: Ingredient =
            serde_json::from_str(r#"{"name":"сахар","amount":2,"unit":"ст.л","original_text":"сахар 2 ст.л"}"#)
                .unwrap();
        assert_eq!(from_number.amount, "2");
        assert_eq!(from_number.amount_value(), Some(2.0));

        let from_range: Ingredient =
            serde_json::from_str(r#"{"name":"соль","amount":"2-3","unit":"г","original_text":"соль 2-3 г"}"#)
                .unwrap();
        assert_eq!(from_range.amount, "2-3");
        assert_eq!(from_range.amount_value(), Some(2.5));
    }

    #[test]
    fn ingredient_amount_rejects_objects() {
        let result: Result<Ingredient, _> = serde_json::from_str(
            r#"{"name":"соль","amount":{"value":1},"unit":"г","original_text":"соль"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn patch_bundle_empty_check_ignores_whitespace_appendix() {
        let bundle = PatchBundle {
            system_prompt_append: "   \n".to_string(),
            ..Default::default()
        };
        assert!(bundle.is_empty());
    }
}
