//! Persistent lookup cache, one JSON file per enrichment dimension.
//!
//! The whole mapping is loaded at construction and rewritten atomically on
//! persist. Entries are additive: once a key holds any entry (success or
//! error marker) it is never fetched again by a later run.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache file {0} exists but could not be parsed: {1}")]
    Corrupt(PathBuf, serde_json::Error),
    #[error("cache I/O failed for {0}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("failed to encode cache: {0}")]
    Encode(#[from] serde_json::Error),
}

/// The resolved value for one key, or the reason resolution failed.
///
/// Serialized untagged: a successful payload is stored as-is (a genre list,
/// or a geo object), while a failure is stored as the reserved
/// `{"__error__": "<cause>"}` object so operators can tell "nothing to find"
/// from "couldn't check" when inspecting the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheEntry<V> {
    Failed {
        #[serde(rename = "__error__")]
        error: String,
    },
    /// An empty payload is a valid result: the service answered and had no
    /// match for the key.
    Resolved(V),
}

/// In-memory key→entry mapping for one dimension, backed by a JSON file.
pub struct CacheStore<V> {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry<V>>,
}

impl<V> CacheStore<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Load the persisted mapping, or start empty if the file does not
    /// exist yet. A file that exists but fails to parse is a hard error:
    /// silently discarding prior lookups would be worse than aborting.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                entries: BTreeMap::new(),
            });
        }
        let content =
            fs::read_to_string(path).map_err(|e| CacheError::Io(path.to_path_buf(), e))?;
        let entries = serde_json::from_str(&content)
            .map_err(|e| CacheError::Corrupt(path.to_path_buf(), e))?;
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    pub fn put(&mut self, key: String, entry: CacheEntry<V>) {
        self.entries.insert(key, entry);
    }

    /// Exactly `candidates − keys(cache)`, in sorted order.
    pub fn missing_keys(&self, candidates: &BTreeSet<String>) -> Vec<String> {
        candidates
            .iter()
            .filter(|key| !self.entries.contains_key(*key))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CacheEntry<V>)> {
        self.entries.iter()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Full rewrite of the backing file. Writes a sibling temp file first
    /// and renames it over the destination so a crash mid-write can never
    /// corrupt the previous state.
    pub fn persist(&self) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| CacheError::Io(parent.to_path_buf(), e))?;
            }
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, content).map_err(|e| CacheError::Io(tmp_path.clone(), e))?;
        fs::rename(&tmp_path, &self.path).map_err(|e| CacheError::Io(self.path.clone(), e))?;
        Ok(())
    }
}
