//! Rendered SQL and execution plan cache.

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::fifo::FifoMap;
use crate::cache::key::{self, QuerySummary};
use crate::cache::stats::CacheStats;
use crate::config::CacheConfig;
use crate::connection::QueryPlan;
use crate::context::DbContext;

/// Bounded SQL-text and plan cache keyed by query fingerprint.
///
/// Hits and misses from both maps feed one pair of counters. Eviction is
/// first-in first-out; lookups do not refresh an entry.
#[derive(Debug)]
pub struct SqlCache {
    inner: Mutex<SqlCacheState>,
}

#[derive(Debug)]
struct SqlCacheState {
    sql: FifoMap<String, String>,
    plans: FifoMap<String, QueryPlan>,
    hits: u64,
    misses: u64,
}

impl SqlCache {
    pub fn new(capacity: usize) -> Self {
        Self::with_capacities(capacity, capacity)
    }

    pub fn with_capacities(sql_capacity: usize, plan_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(SqlCacheState {
                sql: FifoMap::new(sql_capacity),
                plans: FifoMap::new(plan_capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::with_capacities(config.sql_capacity, config.plan_capacity)
    }

    /// Fingerprint a query for use as a cache key.
    pub fn generate_key(ctx: &DbContext, entity_type: &str, summary: &QuerySummary<'_>) -> String {
        key::generate_key(ctx, entity_type, summary)
    }

    pub fn get_sql(&self, key: &str) -> Option<String> {
        let mut state = self.inner.lock();
        let found = state.sql.get(key).cloned();
        record_lookup(&mut state, key, found.is_some(), "sql");
        found
    }

    pub fn set_sql(&self, key: impl Into<String>, sql: impl Into<String>) {
        if let Some(evicted) = self.inner.lock().sql.insert(key.into(), sql.into()) {
            debug!(key = %evicted, "sql cache evicted entry");
        }
    }

    pub fn get_query_plan(&self, key: &str) -> Option<QueryPlan> {
        let mut state = self.inner.lock();
        let found = state.plans.get(key).cloned();
        record_lookup(&mut state, key, found.is_some(), "plan");
        found
    }

    pub fn set_query_plan(&self, key: impl Into<String>, plan: QueryPlan) {
        if let Some(evicted) = self.inner.lock().plans.insert(key.into(), plan) {
            debug!(key = %evicted, "plan cache evicted entry");
        }
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        let mut state = self.inner.lock();
        state.sql.clear();
        state.plans.clear();
        state.hits = 0;
        state.misses = 0;
    }

    /// Counters over both maps; `cached_entries` counts SQL entries.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        CacheStats::new(state.sql.len(), state.hits, state.misses, state.sql.capacity())
    }

    pub fn plan_count(&self) -> usize {
        self.inner.lock().plans.len()
    }
}

fn record_lookup(state: &mut SqlCacheState, key: &str, hit: bool, kind: &str) {
    if hit {
        state.hits += 1;
        debug!(key, kind, "cache hit");
    } else {
        state.misses += 1;
        debug!(key, kind, "cache miss");
    }
}
