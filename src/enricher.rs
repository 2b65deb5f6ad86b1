//! One enrichment dimension: distinct-key extraction, missing-key
//! resolution, cache update, projection back onto the records.

use crate::cache::{CacheEntry, CacheStore};
use crate::lookup::{Lookup, LookupError};
use crate::model::RawEvent;
use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;

/// Bounded lookup concurrency. The shared rate limiter keeps the overall
/// call rate within quota no matter how many workers run.
pub const DEFAULT_WORKERS: usize = 4;

pub struct Enricher<C: Lookup> {
    cache: CacheStore<C::Payload>,
    client: C,
    workers: usize,
}

impl<C> Enricher<C>
where
    C: Lookup,
    C::Payload: Serialize + DeserializeOwned + Clone + Default + Send,
{
    pub fn new(cache: CacheStore<C::Payload>, client: C) -> Self {
        Self {
            cache,
            client,
            workers: DEFAULT_WORKERS,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn cache(&self) -> &CacheStore<C::Payload> {
        &self.cache
    }

    /// Resolve this dimension for a batch of records and project the values
    /// back, one slot per record in input order. `None` means unknown: the
    /// key was absent, the cached entry is an error marker, or the client
    /// is unconfigured.
    ///
    /// Keys already in the cache are never fetched again. Newly missing
    /// keys are resolved with bounded concurrency; a per-key failure never
    /// aborts the batch. The cache is persisted before projection so a
    /// crash later in the run cannot lose completed lookups.
    pub async fn enrich<F>(
        &mut self,
        records: &[RawEvent],
        key_fn: F,
    ) -> Result<Vec<Option<C::Payload>>>
    where
        F: Fn(&RawEvent) -> Option<&str>,
    {
        if !self.client.is_configured() {
            // Degraded mode is all-unknown even when the cache is warm:
            // the output must not depend on which earlier runs had
            // credentials. The cache itself is left untouched.
            return Ok(records.iter().map(|_| None).collect());
        }

        let keys: BTreeSet<String> = records
            .iter()
            .filter_map(&key_fn)
            .filter(|key| !key.is_empty())
            .map(str::to_owned)
            .collect();
        let missing = self.cache.missing_keys(&keys);
        if !missing.is_empty() {
            self.resolve_missing(missing).await;
            self.cache
                .persist()
                .context("Failed to persist lookup cache")?;
        }

        Ok(records
            .iter()
            .map(|record| self.project(key_fn(record)))
            .collect())
    }

    async fn resolve_missing(&mut self, missing: Vec<String>) {
        let Self {
            cache,
            client,
            workers,
        } = self;
        let client = &*client;

        let mut results = stream::iter(missing)
            .map(|key| async move {
                let outcome = client.resolve(&key).await;
                (key, outcome)
            })
            .buffer_unordered(*workers);

        // The collecting side is the single writer into the cache map.
        while let Some((key, outcome)) = results.next().await {
            let entry = match outcome {
                Ok(payload) => CacheEntry::Resolved(payload),
                // "No match" is a real answer; cache it so the key is
                // never asked about again.
                Err(LookupError::NotFound) => CacheEntry::Resolved(C::Payload::default()),
                Err(LookupError::Transient(cause)) => {
                    eprintln!("Lookup failed for '{key}': {cause}");
                    CacheEntry::Failed { error: cause }
                }
                // Configuration is checked before resolution starts; an
                // unconfigured error mid-batch is not cached.
                Err(LookupError::Unconfigured) => continue,
            };
            cache.put(key, entry);
        }
    }

    fn project(&self, key: Option<&str>) -> Option<C::Payload> {
        let key = key?;
        if key.is_empty() {
            return None;
        }
        match self.cache.get(key) {
            Some(CacheEntry::Resolved(value)) => Some(value.clone()),
            Some(CacheEntry::Failed { .. }) | None => None,
        }
    }
}
