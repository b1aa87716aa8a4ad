//! Lookup tables and the bounded TTL resolution cache.
//!
//! Tables translate coded values (currency codes, branch ids) during
//! transformation. Resolution results are cached per `(table, key)` with a
//! per-entry TTL taken from the table (falling back to the store default)
//! and a hard capacity bound; at capacity, new inserts are skipped until
//! `evict_expired` or an invalidation frees space.

use crate::error::TransformError;
use crate::rule::LookupTable;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct CacheEntry {
    value: Value,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn expired(&self) -> bool {
        self.inserted_at.elapsed() > self.ttl
    }
}

pub struct LookupStore {
    tables: DashMap<String, Arc<LookupTable>>,
    cache: DashMap<String, CacheEntry>,
    max_cache_entries: usize,
    default_ttl: Duration,
}

impl LookupStore {
    pub fn new(max_cache_entries: usize, default_ttl_secs: u64) -> Self {
        Self {
            tables: DashMap::new(),
            cache: DashMap::with_capacity(max_cache_entries),
            max_cache_entries,
            default_ttl: Duration::from_secs(default_ttl_secs),
        }
    }

    /// Register a new table (or replace one wholesale).
    pub fn add_table(&self, table: LookupTable) {
        tracing::debug!(table = %table.id, entries = table.mappings.len(), "lookup table added");
        self.invalidate_table(&table.id);
        self.tables.insert(table.id.clone(), Arc::new(table));
    }

    /// Replace a table's definition. Cached entries for the table are
    /// invalidated so stale translations never outlive the mapping change.
    pub fn update_table(&self, table: LookupTable) {
        tracing::info!(table = %table.id, "lookup table updated, cache invalidated");
        self.invalidate_table(&table.id);
        self.tables.insert(table.id.clone(), Arc::new(table));
    }

    /// Flip a table active/inactive without touching its mappings.
    pub fn set_active(&self, table_id: &str, active: bool) -> bool {
        let Some(existing) = self.tables.get(table_id).map(|t| t.clone()) else {
            return false;
        };
        let mut updated = (*existing).clone();
        updated.is_active = active;
        self.invalidate_table(table_id);
        self.tables.insert(table_id.to_string(), Arc::new(updated));
        true
    }

    pub fn table(&self, table_id: &str) -> Option<Arc<LookupTable>> {
        self.tables.get(table_id).map(|t| t.clone())
    }

    /// Resolve `key` against an active table. An absent or inactive table
    /// is a configuration error; a missing key is a normal `None` for the
    /// caller's fallback chain.
    pub fn resolve(&self, table_id: &str, key: &str) -> Result<Option<Value>, TransformError> {
        let table = self
            .tables
            .get(table_id)
            .map(|t| t.clone())
            .ok_or_else(|| TransformError::LookupTableNotFound(table_id.to_string()))?;
        if !table.is_active {
            return Err(TransformError::LookupTableInactive(table_id.to_string()));
        }

        let cache_key = format!("lookup_{table_id}_{key}");
        if table.cache_enabled {
            if let Some(entry) = self.cache.get(&cache_key) {
                if entry.expired() {
                    drop(entry);
                    self.cache.remove(&cache_key);
                } else {
                    metrics::counter!("gateway.lookup_cache_hits").increment(1);
                    return Ok(Some(entry.value.clone()));
                }
            }
        }

        let resolved = table.mappings.get(key).cloned();
        if table.cache_enabled {
            if let Some(value) = &resolved {
                self.cache_put(cache_key, value.clone(), table.ttl);
            }
        }
        metrics::counter!("gateway.lookup_cache_misses").increment(1);
        Ok(resolved)
    }

    fn cache_put(&self, key: String, value: Value, ttl_secs: Option<u64>) {
        // At capacity, skip inserts for unseen keys; eviction frees space.
        if self.cache.len() >= self.max_cache_entries && !self.cache.contains_key(&key) {
            return;
        }
        let ttl = ttl_secs.map(Duration::from_secs).unwrap_or(self.default_ttl);
        self.cache.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
                ttl,
            },
        );
    }

    /// Remove expired entries. Call periodically from a background task.
    pub fn evict_expired(&self) -> usize {
        let before = self.cache.len();
        self.cache.retain(|_, entry| !entry.expired());
        before - self.cache.len()
    }

    fn invalidate_table(&self, table_id: &str) {
        let prefix = format!("lookup_{table_id}_");
        self.cache.retain(|key, _| !key.starts_with(&prefix));
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn table(id: &str, pairs: &[(&str, &str)]) -> LookupTable {
        LookupTable {
            id: id.to_string(),
            mappings: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), json!(v)))
                .collect::<HashMap<_, _>>(),
            is_active: true,
            cache_enabled: true,
            ttl: None,
        }
    }

    #[test]
    fn resolves_and_caches() {
        let store = LookupStore::new(100, 300);
        store.add_table(table("currency", &[("INR", "356"), ("USD", "840")]));

        assert_eq!(store.resolve("currency", "INR").unwrap(), Some(json!("356")));
        assert_eq!(store.cached_entries(), 1);
        // Second resolve is served from cache.
        assert_eq!(store.resolve("currency", "INR").unwrap(), Some(json!("356")));
        assert_eq!(store.resolve("currency", "XXX").unwrap(), None);
    }

    #[test]
    fn missing_table_is_configuration_error() {
        let store = LookupStore::new(100, 300);
        let err = store.resolve("nope", "k").unwrap_err();
        assert_eq!(err.code(), "LOOKUP_TABLE_NOT_FOUND");
        assert!(err.is_configuration());
    }

    #[test]
    fn inactive_table_is_configuration_error() {
        let store = LookupStore::new(100, 300);
        store.add_table(table("t", &[("a", "b")]));
        assert!(store.set_active("t", false));
        let err = store.resolve("t", "a").unwrap_err();
        assert_eq!(err.code(), "LOOKUP_TABLE_INACTIVE");
    }

    #[test]
    fn update_invalidates_cached_entries() {
        let store = LookupStore::new(100, 300);
        store.add_table(table("codes", &[("A", "1")]));
        assert_eq!(store.resolve("codes", "A").unwrap(), Some(json!("1")));
        assert_eq!(store.cached_entries(), 1);

        store.update_table(table("codes", &[("A", "2")]));
        assert_eq!(store.cached_entries(), 0);
        assert_eq!(store.resolve("codes", "A").unwrap(), Some(json!("2")));
    }

    #[test]
    fn capacity_bound_skips_new_inserts() {
        let store = LookupStore::new(2, 300);
        store.add_table(table("t", &[("a", "1"), ("b", "2"), ("c", "3")]));
        store.resolve("t", "a").unwrap();
        store.resolve("t", "b").unwrap();
        store.resolve("t", "c").unwrap();
        assert_eq!(store.cached_entries(), 2);
        // Resolution still works without caching.
        assert_eq!(store.resolve("t", "c").unwrap(), Some(json!("3")));
    }

    #[test]
    fn expired_entries_are_evicted() {
        let store = LookupStore::new(100, 0);
        store.add_table(table("t", &[("a", "1")]));
        store.resolve("t", "a").unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(store.evict_expired(), 1);
        assert_eq!(store.cached_entries(), 0);
    }
}
