use serde::{Deserialize, Serialize};

/// Point-in-time cache counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub cached_entries: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
    /// Hits over lookups as a percentage with two decimals, e.g. `"33.33%"`.
    pub hit_rate: String,
    pub max_cache_size: usize,
}

impl CacheStats {
    pub fn new(cached_entries: usize, cache_hits: u64, cache_misses: u64, max_cache_size: usize) -> Self {
        Self {
            cached_entries,
            cache_hits,
            cache_misses,
            hit_rate: format_hit_rate(cache_hits, cache_misses),
            max_cache_size,
        }
    }
}

pub(crate) fn format_hit_rate(hits: u64, misses: u64) -> String {
    let total = hits + misses;
    if total == 0 {
        return "0.00%".to_string();
    }
    format!("{:.2}%", hits as f64 * 100.0 / total as f64)
}
