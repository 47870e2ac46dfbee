//! Scraping collaborator seam.
//!
//! The actual page-driving mechanism lives outside this crate; the pipeline
//! only depends on this trait. A query either yields the raw page content or
//! fails with [`ScrapeError::NotFound`], which is surfaced upward unchanged.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ScrapeError;

/// Raw page content for one recipe, as produced by the scraper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapedRecipe {
    pub title: String,
    /// Ordered text paragraphs extracted from the page.
    pub text_paragraphs: Vec<String>,
    pub url: String,
}

/// Collaborator that turns a search query into raw page content.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn search(&self, query: &str) -> Result<ScrapedRecipe, ScrapeError>;
}

/// In-memory scraper for testing: serves pre-registered pages by query.
#[derive(Debug, Default)]
pub struct FakeScraper {
    pages: RwLock<HashMap<String, ScrapedRecipe>>,
}

impl FakeScraper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, query: &str, page: ScrapedRecipe) {
        self.pages
            .write()
            .unwrap()
            .insert(query.to_string(), page);
    }
}

#[async_trait]
impl Scraper for FakeScraper {
    async fn search(&self, query: &str) -> Result<ScrapedRecipe, ScrapeError> {
        self.pages
            .read()
            .unwrap()
            .get(query)
            .cloned()
            .ok_or_else(|| ScrapeError::NotFound(query.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fake_scraper_serves_registered_pages() {
        let scraper = FakeScraper::new();
        scraper.insert(
            "борщ",
            ScrapedRecipe {
                title: "Борщ классический".to_string(),
                text_paragraphs: vec!["Свекла - 2 шт".to_string()],
                url: "https://example.com/borscht".to_string(),
            },
        );

        let page = scraper.search("борщ").await.unwrap();
        assert_eq!(page.title, "Борщ классический");

        let missing = scraper.search("пельмени").await;
        assert!(matches!(missing, Err(ScrapeError::NotFound(_))));
    }
}
