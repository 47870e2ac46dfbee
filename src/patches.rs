//! Process-wide patch accumulation.
//!
//! Corrections proposed by error analysis outlive the recipe that triggered
//! them: they are merged into a single global store and consumed by every
//! future parse. The store persists as three named artifacts in the patches
//! directory so an operator can inspect or hand-edit them:
//!
//! - `unit_mapping.json` - surface unit token -> canonical unit
//! - `cleanup_rules.json` - ordered find/replace rules
//! - `system_prompt_append.txt` - text appended to the parsing prompt
//!
//! Missing or malformed artifacts read as empty. Merges are serialized
//! through a single writer lock; readers always see a fully-merged snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::types::{CleanupRule, PatchBundle};

const UNIT_MAPPING_FILE: &str = "unit_mapping.json";
const CLEANUP_RULES_FILE: &str = "cleanup_rules.json";
const SYSTEM_PROMPT_APPEND_FILE: &str = "system_prompt_append.txt";

/// Separator between accumulated prompt-appendix entries.
pub const APPEND_SEPARATOR: &str = "\n\n---\n\n";

/// File-backed store of accumulated correction patches.
#[derive(Debug)]
pub struct PatchStore {
    dir: PathBuf,
    state: RwLock<PatchBundle>,
    /// Serializes merge-and-persist so concurrent merges never interleave.
    write_lock: Mutex<()>,
}

impl PatchStore {
    /// Open the store, creating the directory and loading any existing
    /// artifacts. Malformed artifacts are treated as empty.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let state = load_bundle(&dir);
        Ok(Self {
            dir,
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
        })
    }

    /// Default patches directory: `~/.samovar/patches`.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .map(|h| h.join(".samovar").join("patches"))
            .unwrap_or_else(|| PathBuf::from("data/patches"))
    }

    /// Immutable snapshot of the current merged state.
    pub fn snapshot(&self) -> PatchBundle {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Current cleanup rules, earliest-registered first.
    pub fn cleanup_rules(&self) -> Vec<CleanupRule> {
        self.snapshot().cleanup_rules
    }

    /// Current unit-mapping overlay.
    pub fn unit_mapping(&self) -> BTreeMap<String, String> {
        self.snapshot().unit_mapping
    }

    /// Current system-prompt appendix (empty string if none).
    pub fn prompt_appendix(&self) -> String {
        self.snapshot().system_prompt_append
    }

    /// Merge a bundle into the store, persist, and return the new snapshot.
    ///
    /// Merge rules per part, each idempotent:
    /// - unit mapping: key overwrite, last value wins;
    /// - cleanup rules: append, duplicate patterns are not re-added;
    /// - prompt appendix: concatenate with a separator unless the incoming
    ///   text already is the current suffix.
    pub async fn merge(&self, bundle: &PatchBundle) -> Result<PatchBundle, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut merged = self.snapshot();

        for (key, value) in &bundle.unit_mapping {
            merged
                .unit_mapping
                .insert(key.trim().to_lowercase(), value.clone());
        }

        for rule in &bundle.cleanup_rules {
            if !merged
                .cleanup_rules
                .iter()
                .any(|existing| existing.pattern == rule.pattern)
            {
                merged.cleanup_rules.push(rule.clone());
            }
        }

        let incoming = bundle.system_prompt_append.trim();
        if !incoming.is_empty() {
            let current = merged.system_prompt_append.trim().to_string();
            if current.is_empty() {
                merged.system_prompt_append = incoming.to_string();
            } else if current != incoming
                && !current.ends_with(&format!("{}{}", APPEND_SEPARATOR, incoming))
            {
                merged.system_prompt_append =
                    format!("{}{}{}", current, APPEND_SEPARATOR, incoming);
            } else {
                merged.system_prompt_append = current;
            }
        }

        persist_bundle(&self.dir, &merged)?;

        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *state = merged.clone();
        drop(state);

        tracing::info!(
            units = bundle.unit_mapping.len(),
            rules = bundle.cleanup_rules.len(),
            has_appendix = !incoming.is_empty(),
            "merged patch bundle"
        );

        Ok(merged)
    }

    /// Directory the artifacts live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn load_bundle(dir: &Path) -> PatchBundle {
    let unit_mapping = fs::read_to_string(dir.join(UNIT_MAPPING_FILE))
        .ok()
        .and_then(|text| serde_json::from_str::<BTreeMap<String, String>>(&text).ok())
        .unwrap_or_default();

    let cleanup_rules = fs::read_to_string(dir.join(CLEANUP_RULES_FILE))
        .ok()
        .and_then(|text| serde_json::from_str::<Vec<CleanupRule>>(&text).ok())
        .unwrap_or_default();

    let system_prompt_append = fs::read_to_string(dir.join(SYSTEM_PROMPT_APPEND_FILE))
        .map(|text| text.trim().to_string())
        .unwrap_or_default();

    PatchBundle {
        unit_mapping,
        cleanup_rules,
        system_prompt_append,
    }
}

fn persist_bundle(dir: &Path, bundle: &PatchBundle) -> Result<(), StoreError> {
    let unit_json = serde_json::to_string_pretty(&bundle.unit_mapping)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    fs::write(dir.join(UNIT_MAPPING_FILE), unit_json)?;

    let rules_json = serde_json::to_string_pretty(&bundle.cleanup_rules)
        .map_err(|e| StoreError::Corrupt(e.to_string()))?;
    fs::write(dir.join(CLEANUP_RULES_FILE), rules_json)?;

    fs::write(
        dir.join(SYSTEM_PROMPT_APPEND_FILE),
        &bundle.system_prompt_append,
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn bundle_with_unit(key: &str, value: &str) -> PatchBundle {
        let mut unit_mapping = BTreeMap::new();
        unit_mapping.insert(key.to_string(), value.to_string());
        PatchBundle {
            unit_mapping,
            ..Default::default()
        }
    }

    fn bundle_with_rule(pattern: &str, replacement: &str) -> PatchBundle {
        PatchBundle {
            cleanup_rules: vec![CleanupRule {
                pattern: pattern.to_string(),
                replacement: replacement.to_string(),
                regex: false,
            }],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn merge_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatchStore::open(dir.path()).unwrap();

        let bundle = PatchBundle {
            unit_mapping: bundle_with_unit("щепотка", "pinch").unit_mapping,
            cleanup_rules: bundle_with_rule("NaN", "0").cleanup_rules,
            system_prompt_append: "Always answer with bare JSON.".to_string(),
        };

        let once = store.merge(&bundle).await.unwrap();
        let twice = store.merge(&bundle).await.unwrap();
        assert_eq!(once, twice);
        assert_eq!(twice.cleanup_rules.len(), 1);
        assert_eq!(twice.system_prompt_append, "Always answer with bare JSON.");
    }

    #[tokio::test]
    async fn unit_mapping_last_value_wins() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatchStore::open(dir.path()).unwrap();

        store.merge(&bundle_with_unit("щепотка", "pinch")).await.unwrap();
        let merged = store.merge(&bundle_with_unit("щепотка", "dash")).await.unwrap();
        assert_eq!(merged.unit_mapping.get("щепотка").map(String::as_str), Some("dash"));
    }

    #[tokio::test]
    async fn duplicate_rule_patterns_are_not_readded() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatchStore::open(dir.path()).unwrap();

        store.merge(&bundle_with_rule("NaN", "0")).await.unwrap();
        let merged = store.merge(&bundle_with_rule("NaN", "null")).await.unwrap();
        assert_eq!(merged.cleanup_rules.len(), 1);
        assert_eq!(merged.cleanup_rules[0].replacement, "0");
    }

    #[tokio::test]
    async fn appendix_concatenates_with_separator() {
        let dir = tempfile::tempdir().unwrap();
        let store = PatchStore::open(dir.path()).unwrap();

        let first = PatchBundle {
            system_prompt_append: "Rule one.".to_string(),
            ..Default::default()
        };
        let second = PatchBundle {
            system_prompt_append: "Rule two.".to_string(),
            ..Default::default()
        };

        store.merge(&first).await.unwrap();
        let merged = store.merge(&second).await.unwrap();
        assert_eq!(
            merged.system_prompt_append,
            format!("Rule one.{}Rule two.", APPEND_SEPARATOR)
        );

        // Merging the same suffix again is a no-op.
        let again = store.merge(&second).await.unwrap();
        assert_eq!(again.system_prompt_append, merged.system_prompt_append);
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = PatchStore::open(dir.path()).unwrap();
            store.merge(&bundle_with_unit("щепотка", "pinch")).await.unwrap();
        }
        let reopened = PatchStore::open(dir.path()).unwrap();
        assert_eq!(
            reopened.unit_mapping().get("щепотка").map(String::as_str),
            Some("pinch")
        );
    }

    #[tokio::test]
    async fn malformed_artifacts_read_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(UNIT_MAPPING_FILE), "not json").unwrap();
        fs::write(dir.path().join(CLEANUP_RULES_FILE), "{}").unwrap();

        let store = PatchStore::open(dir.path()).unwrap();
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn concurrent_merges_keep_both_contributions() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(PatchStore::open(dir.path()).unwrap());

        let a = Arc::clone(&store);
        let b = Arc::clone(&store);
        let task_a =
            tokio::spawn(async move { a.merge(&bundle_with_unit("щепотка", "pinch")).await });
        let task_b = tokio::spawn(async move { b.merge(&bundle_with_rule("NaN", "0")).await });

        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();

        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.unit_mapping.get("щепотка").map(String::as_str),
            Some("pinch")
        );
        assert_eq!(snapshot.cleanup_rules.len(), 1);
    }
}
