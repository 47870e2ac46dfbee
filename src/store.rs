//! Recipe record store: simple key-indexed CRUD plus aggregate counting.
//!
//! Two implementations: `MemoryStore` for tests and embedding, and
//! `DiskStore` persisting one JSON file per record. Per-record mutation is an
//! atomic read-modify-write under the store's lock; there is deliberately no
//! transactional machinery beyond that.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::types::{ErrorAnalysis, RecipeRecord, RecipeStats, RecipeStatus};

/// Storage collaborator for recipe records and their analyses.
#[async_trait]
pub trait RecipeStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<RecipeRecord>, StoreError>;

    /// Insert or overwrite a record (atomic per record).
    async fn save(&self, record: &RecipeRecord) -> Result<(), StoreError>;

    /// List records, newest first, optionally filtered by status.
    async fn list_by_status(
        &self,
        status: Option<RecipeStatus>,
    ) -> Result<Vec<RecipeRecord>, StoreError>;

    /// Delete a record and its analyses. Returns false if it did not exist.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Aggregate counts, optionally restricted to a created-at range.
    async fn stats(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<RecipeStats, StoreError>;

    /// Append an analysis record. Analyses are never mutated afterwards.
    async fn add_analysis(&self, analysis: &ErrorAnalysis) -> Result<(), StoreError>;

    async fn get_analysis(&self, id: Uuid) -> Result<Option<ErrorAnalysis>, StoreError>;

    /// All analyses for a recipe, oldest first.
    async fn analyses_for(&self, recipe_id: Uuid) -> Result<Vec<ErrorAnalysis>, StoreError>;
}

fn compute_stats(
    records: &[RecipeRecord],
    date_from: Option<DateTime<Utc>>,
    date_to: Option<DateTime<Utc>>,
) -> RecipeStats {
    let mut stats = RecipeStats::default();
    for record in records {
        if let Some(from) = date_from {
            if record.created_at < from {
                continue;
            }
        }
        if let Some(to) = date_to {
            if record.created_at > to {
                continue;
            }
        }
        stats.total += 1;
        *stats
            .by_status
            .entry(record.status.as_str().to_string())
            .or_insert(0) += 1;
        if let Some(error) = &record.error {
            *stats
                .by_error_kind
                .entry(error.kind.as_str().to_string())
                .or_insert(0) += 1;
        }
    }
    stats
}

fn sort_newest_first(records: &mut [RecipeRecord]) {
    records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

// ============================================================================
// In-memory store
// ============================================================================

/// In-memory store backed by locked maps.
#[derive(Debug, Default)]
pub struct MemoryStore {
    recipes: RwLock<HashMap<Uuid, RecipeRecord>>,
    analyses: RwLock<Vec<ErrorAnalysis>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<RecipeRecord>, StoreError> {
        Ok(self.recipes.read().unwrap().get(&id).cloned())
    }

    async fn save(&self, record: &RecipeRecord) -> Result<(), StoreError> {
        self.recipes
            .write()
            .unwrap()
            .insert(record.id, record.clone());
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: Option<RecipeStatus>,
    ) -> Result<Vec<RecipeRecord>, StoreError> {
        let mut records: Vec<RecipeRecord> = self
            .recipes
            .read()
            .unwrap()
            .values()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .cloned()
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let removed = self.recipes.write().unwrap().remove(&id).is_some();
        if removed {
            self.analyses
                .write()
                .unwrap()
                .retain(|a| a.recipe_id != id);
        }
        Ok(removed)
    }

    async fn stats(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<RecipeStats, StoreError> {
        let records: Vec<RecipeRecord> =
            self.recipes.read().unwrap().values().cloned().collect();
        Ok(compute_stats(&records, date_from, date_to))
    }

    async fn add_analysis(&self, analysis: &ErrorAnalysis) -> Result<(), StoreError> {
        self.analyses.write().unwrap().push(analysis.clone());
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<ErrorAnalysis>, StoreError> {
        Ok(self
            .analyses
            .read()
            .unwrap()
            .iter()
            .find(|a| a.id == id)
            .cloned())
    }

    async fn analyses_for(&self, recipe_id: Uuid) -> Result<Vec<ErrorAnalysis>, StoreError> {
        let mut matching: Vec<ErrorAnalysis> = self
            .analyses
            .read()
            .unwrap()
            .iter()
            .filter(|a| a.recipe_id == recipe_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }
}

// ============================================================================
// Disk store
// ============================================================================

/// Disk-backed store: `recipes/{id}.json` and `analyses/{recipe_id}/{id}.json`
/// under the data directory.
#[derive(Debug)]
pub struct DiskStore {
    dir: PathBuf,
    /// Serializes read-modify-write cycles across records.
    lock: RwLock<()>,
}

impl DiskStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(dir.join("recipes"))?;
        fs::create_dir_all(dir.join("analyses"))?;
        Ok(Self {
            dir,
            lock: RwLock::new(()),
        })
    }

    /// Default data directory: `~/.samovar/data`.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".samovar").join("data"))
            .unwrap_or_else(|| PathBuf::from("data/recipes"))
    }

    fn recipe_path(&self, id: Uuid) -> PathBuf {
        self.dir.join("recipes").join(format!("{}.json", id))
    }

    fn analyses_dir(&self, recipe_id: Uuid) -> PathBuf {
        self.dir.join("analyses").join(recipe_id.to_string())
    }

    fn read_recipe(path: &Path) -> Result<RecipeRecord, StoreError> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))
    }

    fn read_all_recipes(&self) -> Result<Vec<RecipeRecord>, StoreError> {
        let mut records = Vec::new();
        for entry in fs::read_dir(self.dir.join("recipes"))? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                records.push(Self::read_recipe(&path)?);
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl RecipeStore for DiskStore {
    async fn get(&self, id: Uuid) -> Result<Option<RecipeRecord>, StoreError> {
        let _guard = self.lock.read().unwrap();
        let path = self.recipe_path(id);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_recipe(&path).map(Some)
    }

    async fn save(&self, record: &RecipeRecord) -> Result<(), StoreError> {
        let _guard = self.lock.write().unwrap();
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        fs::write(self.recipe_path(record.id), json)?;
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: Option<RecipeStatus>,
    ) -> Result<Vec<RecipeRecord>, StoreError> {
        let _guard = self.lock.read().unwrap();
        let mut records: Vec<RecipeRecord> = self
            .read_all_recipes()?
            .into_iter()
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .collect();
        sort_newest_first(&mut records);
        Ok(records)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let _guard = self.lock.write().unwrap();
        let path = self.recipe_path(id);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path)?;
        let analyses = self.analyses_dir(id);
        if analyses.exists() {
            fs::remove_dir_all(&analyses)?;
        }
        Ok(true)
    }

    async fn stats(
        &self,
        date_from: Option<DateTime<Utc>>,
        date_to: Option<DateTime<Utc>>,
    ) -> Result<RecipeStats, StoreError> {
        let _guard = self.lock.read().unwrap();
        let records = self.read_all_recipes()?;
        Ok(compute_stats(&records, date_from, date_to))
    }

    async fn add_analysis(&self, analysis: &ErrorAnalysis) -> Result<(), StoreError> {
        let _guard = self.lock.write().unwrap();
        let dir = self.analyses_dir(analysis.recipe_id);
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(analysis)
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        fs::write(dir.join(format!("{}.json", analysis.id)), json)?;
        Ok(())
    }

    async fn get_analysis(&self, id: Uuid) -> Result<Option<ErrorAnalysis>, StoreError> {
        let _guard = self.lock.read().unwrap();
        let analyses_root = self.dir.join("analyses");
        for entry in fs::read_dir(&analyses_root)? {
            let candidate = entry?.path().join(format!("{}.json", id));
            if candidate.exists() {
                let text = fs::read_to_string(&candidate)?;
                let analysis = serde_json::from_str(&text)
                    .map_err(|e| StoreError::Corrupt(format!("{}: {}", candidate.display(), e)))?;
                return Ok(Some(analysis));
            }
        }
        Ok(None)
    }

    async fn analyses_for(&self, recipe_id: Uuid) -> Result<Vec<ErrorAnalysis>, StoreError> {
        let _guard = self.lock.read().unwrap();
        let dir = self.analyses_dir(recipe_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut analyses = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                let text = fs::read_to_string(&path)?;
                let analysis: ErrorAnalysis = serde_json::from_str(&text)
                    .map_err(|e| StoreError::Corrupt(format!("{}: {}", path.display(), e)))?;
                analyses.push(analysis);
            }
        }
        analyses.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(analyses)
    }
}
