//! In-process TTL cache for pipeline results, keyed by a fingerprint of the
//! pipeline id and its applied filters.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use traffboard_core::types::{AppliedFilter, CacheConfig, ReportData};

struct CacheEntry {
    data: ReportData<Value>,
    expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub expired_entries: usize,
    /// Occupancy ratio (valid / total), not a historical hit rate.
    pub hit_ratio: f64,
}

/// TTL cache over report payloads. Expired entries are evicted lazily on
/// read; `cleanup_expired` sweeps the rest.
#[derive(Default)]
pub struct CacheManager {
    entries: DashMap<String, CacheEntry>,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fingerprint of `(pipeline_id, filters)`. Filters are compared by
    /// id and serialized value regardless of input order. A 32-bit rolling
    /// hash is enough here; collisions are accepted.
    pub fn generate_cache_key(&self, pipeline_id: &str, filters: &[AppliedFilter]) -> String {
        let mut pairs: Vec<String> = filters
            .iter()
            .map(|f| {
                let value = serde_json::to_string(&f.value)
                    .unwrap_or_else(|_| String::from("null"));
                format!("{}:{}", f.id, value)
            })
            .collect();
        pairs.sort();

        let hash_input = format!("{}:{}", pipeline_id, pairs.join("|"));

        let mut hash: i32 = 0;
        for c in hash_input.chars() {
            hash = hash
                .wrapping_shl(5)
                .wrapping_sub(hash)
                .wrapping_add(c as u32 as i32);
        }

        format!("pipeline_{}", hash.unsigned_abs())
    }

    /// Returns the cached payload, or `None` when caching is disabled, the
    /// entry is absent, or the entry has expired (expired entries are
    /// evicted on the spot).
    pub fn get_cached_data(&self, key: &str, config: &CacheConfig) -> Option<ReportData<Value>> {
        if !config.enabled {
            return None;
        }

        let Some(entry) = self.entries.get(key) else {
            metrics::counter!("report_cache.miss").increment(1);
            return None;
        };

        if entry.expires < Utc::now() {
            drop(entry);
            self.entries.remove(key);
            metrics::counter!("report_cache.expired").increment(1);
            return None;
        }

        metrics::counter!("report_cache.hit").increment(1);
        Some(entry.data.clone())
    }

    pub fn set_cached_data(&self, key: &str, data: ReportData<Value>, config: &CacheConfig) {
        if !config.enabled {
            return;
        }

        let expires = Utc::now() + Duration::seconds(config.ttl_secs as i64);
        self.entries.insert(key.to_string(), CacheEntry { data, expires });
    }

    /// Clear entries matching `pattern` (a regex), or everything when no
    /// pattern is given. An invalid pattern is a warning and a no-op;
    /// cache clearing is best-effort housekeeping.
    pub fn clear_cache(&self, pattern: Option<&str>) {
        let Some(pattern) = pattern else {
            self.entries.clear();
            return;
        };

        match regex::Regex::new(pattern) {
            Ok(re) => {
                let before = self.entries.len();
                self.entries.retain(|key, _| !re.is_match(key));
                debug!(
                    pattern = pattern,
                    removed = before - self.entries.len(),
                    "Cache entries cleared by pattern"
                );
            }
            Err(e) => {
                warn!(pattern = pattern, error = %e, "Invalid regex pattern for cache clearing");
            }
        }
    }

    pub fn get_cache_stats(&self) -> CacheStats {
        let now = Utc::now();
        let mut valid_entries = 0;
        let mut expired_entries = 0;

        for entry in self.entries.iter() {
            if entry.expires > now {
                valid_entries += 1;
            } else {
                expired_entries += 1;
            }
        }

        let total_entries = self.entries.len();
        CacheStats {
            total_entries,
            valid_entries,
            expired_entries,
            hit_ratio: valid_entries as f64 / total_entries.max(1) as f64,
        }
    }

    /// Remove expired entries. Call periodically from a background task.
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires > now);
        before - self.entries.len()
    }

    #[cfg(test)]
    pub(crate) fn insert_raw(&self, key: &str, data: ReportData<Value>, expires: DateTime<Utc>) {
        self.entries.insert(key.to_string(), CacheEntry { data, expires });
    }
}
