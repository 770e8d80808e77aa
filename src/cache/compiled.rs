//! Compiled-query cache.
//!
//! A compiled query is a reusable factory from `(context, parameters)` to a
//! [`QueryBuilder`]. Compiling the same key twice returns the stored factory;
//! the logic passed on later calls is discarded.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::fifo::FifoMap;
use crate::cache::stats::CacheStats;
use crate::config::CacheConfig;
use crate::connection::Row;
use crate::context::DbContext;
use crate::error::QueryResult;
use crate::expr::Value;
use crate::query::QueryBuilder;

/// Signature of compiled query logic.
pub type QueryFactory = dyn Fn(&DbContext, &[Value]) -> QueryBuilder + Send + Sync;

#[derive(Clone)]
pub struct CompiledQuery {
    key: Arc<str>,
    factory: Arc<QueryFactory>,
}

impl CompiledQuery {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run the stored logic without executing the result.
    pub fn build(&self, ctx: &DbContext, params: &[Value]) -> QueryBuilder {
        (self.factory)(ctx, params)
    }

    pub fn execute(&self, ctx: &DbContext, params: &[Value]) -> QueryResult<Vec<Row>> {
        self.build(ctx, params).to_list()
    }

    /// Both handles share one factory.
    pub fn ptr_eq(&self, other: &CompiledQuery) -> bool {
        Arc::ptr_eq(&self.factory, &other.factory)
    }
}

impl fmt::Debug for CompiledQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledQuery").field("key", &self.key).finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct CompiledQueryCache {
    inner: Mutex<CompiledState>,
}

#[derive(Debug)]
struct CompiledState {
    entries: FifoMap<String, CompiledQuery>,
    hits: u64,
    misses: u64,
}

impl CompiledQueryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CompiledState {
                entries: FifoMap::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.compiled_capacity)
    }

    /// Store `logic` under `key`, or return what is already stored there.
    ///
    /// Without an explicit key the caller's source location is used, so each
    /// call site compiles once.
    #[track_caller]
    pub fn compile<F>(&self, key: Option<&str>, logic: F) -> CompiledQuery
    where
        F: Fn(&DbContext, &[Value]) -> QueryBuilder + Send + Sync + 'static,
    {
        let key = match key {
            Some(key) => key.to_string(),
            None => call_site_key(Location::caller()),
        };

        let mut state = self.inner.lock();
        if let Some(existing) = state.entries.get(&key).cloned() {
            state.hits += 1;
            debug!(key = %key, "compiled query cache hit");
            return existing;
        }

        state.misses += 1;
        debug!(key = %key, "compiling query");
        let compiled = CompiledQuery {
            key: Arc::from(key.as_str()),
            factory: Arc::new(logic),
        };
        if let Some(evicted) = state.entries.insert(key, compiled.clone()) {
            debug!(key = %evicted, "compiled query cache evicted entry");
        }
        compiled
    }

    pub fn execute(&self, compiled: &CompiledQuery, ctx: &DbContext, params: &[Value]) -> QueryResult<Vec<Row>> {
        compiled.execute(ctx, params)
    }

    pub fn get(&self, key: &str) -> Option<CompiledQuery> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn clear_cache(&self) {
        let mut state = self.inner.lock();
        state.entries.clear();
        state.hits = 0;
        state.misses = 0;
    }

    /// Returns whether `key` was present.
    pub fn remove_from_cache(&self, key: &str) -> bool {
        self.inner.lock().entries.remove(key).is_some()
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        CacheStats::new(state.entries.len(), state.hits, state.misses, state.entries.capacity())
    }
}

fn call_site_key(location: &Location<'_>) -> String {
    format!("{}:{}:{}", location.file(), location.line(), location.column())
}
